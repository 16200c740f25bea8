//! Lazy enumeration of a backend tree, one directory level at a time.
use std::collections::{btree_map, BTreeMap};

use async_stream::try_stream;
use droidsync::{
    config::PatternList,
    path::{RelPath, RelPathBuf},
    Entry, EntryKind, Error,
};
use futures::{Stream, TryStreamExt};

use crate::storage::{DirEntries, FileSystem, Naming, Stat};

/// The entries of one directory that share a sanitized name.
/// More than one entry means a name collision.
#[derive(Debug, Clone)]
pub struct Slot {
    entries: Vec<Entry>,
}

impl Slot {
    /// The entry of this slot, unless names collide
    pub fn entry(&self) -> Option<&Entry> {
        match self.entries.as_slice() {
            [entry] => Some(entry),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_collision(&self) -> bool {
        self.entries.len() > 1
    }

    /// The raw names that map to this slot, in lexical order
    pub fn raw_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }
}

/// The children of one directory, indexed by sanitized name
#[derive(Debug, Clone, Default)]
pub struct Level {
    slots: BTreeMap<String, Slot>,
    excluded: usize,
}

impl Level {
    fn insert(&mut self, entry: Entry) {
        let slot = self
            .slots
            .entry(entry.sanitized().to_string())
            .or_insert_with(|| Slot {
                entries: Vec::new(),
            });
        let idx = slot
            .entries
            .partition_point(|e| e.name() < entry.name());
        slot.entries.insert(idx, entry);
    }

    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    /// Slots in sanitized name order
    pub fn iter(&self) -> btree_map::Iter<'_, String, Slot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of entries hidden by exclude patterns
    pub fn excluded(&self) -> usize {
        self.excluded
    }
}

impl IntoIterator for Level {
    type Item = (String, Slot);
    type IntoIter = btree_map::IntoIter<String, Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

/// A node of a walked tree. The children of a directory are listed on first access.
#[derive(Debug, Clone)]
pub struct Tree {
    path: RelPathBuf,
    entry: Entry,
    children: Option<Level>,
}

impl Tree {
    pub fn new(path: RelPathBuf, entry: Entry) -> Self {
        Self {
            path,
            entry,
            children: None,
        }
    }

    pub fn path(&self) -> &RelPath {
        &self.path
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The children of this node. Empty if it is not a directory.
    pub async fn children<F, P>(&mut self, walker: &Walker<'_, F, P>) -> droidsync::Result<&Level>
    where
        F: FileSystem,
        P: Naming + Sync,
    {
        if self.children.is_none() {
            let level = if self.entry.is_dir() {
                walker.level(self.entry.path(), &self.path).await?
            } else {
                Level::default()
            };
            self.children = Some(level);
        }
        Ok(self.children.get_or_insert_with(Level::default))
    }
}

/// Walks the tree of a backend.
///
/// Entries are paired across backends by their sanitized name, which
/// goes through the naming rules of both this backend and its `peer`.
pub struct Walker<'a, F, P> {
    fs: &'a F,
    peer: &'a P,
    excludes: &'a PatternList,
}

impl<'a, F, P> Walker<'a, F, P>
where
    F: FileSystem,
    P: Naming + Sync,
{
    pub fn new(fs: &'a F, peer: &'a P, excludes: &'a PatternList) -> Self {
        Self { fs, peer, excludes }
    }

    pub fn fs(&self) -> &'a F {
        self.fs
    }

    pub fn sanitize(&self, raw: &str) -> String {
        let own = self.fs.sanitize(raw);
        self.peer.sanitize(&own).into_owned()
    }

    /// Stat the root at `path`. Returns `None` if it doesn't exist.
    /// A root that is a symlink is followed, unlike symlinks inside the tree.
    pub async fn root(&self, path: &str) -> droidsync::Result<Option<Tree>> {
        let mut metadata = match self.fs.stat(path).await {
            Ok(metadata) => metadata,
            Err(Error::NotFound(..)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let mut native = path.to_string();
        if metadata.kind == EntryKind::Symlink {
            match self.fs.real_path(path).await {
                Ok(real) => {
                    log::debug!("root {path} resolves to {real}");
                    metadata = self.fs.stat(&real).await?;
                    native = real;
                }
                // dangling
                Err(Error::NotFound(..)) => (),
                Err(err) => return Err(err),
            }
        }
        let (_, name) = self.fs.split(path);
        let sanitized = self.sanitize(name);
        let entry = Entry::new(name.to_string(), sanitized, native, metadata);
        Ok(Some(Tree::new(RelPathBuf::root(), entry)))
    }

    /// List the directory at native path `dir`, located at `rel` in the walked tree
    pub async fn level(&self, dir: &str, rel: &RelPath) -> droidsync::Result<Level> {
        let listed: Vec<_> = self.fs.dir_entries(dir).try_collect().await?;

        let mut level = Level::default();
        for (name, metadata) in listed {
            let sanitized = self.sanitize(&name);
            let child_rel = rel.join(&sanitized);
            if self.excludes.matches_with(&child_rel) {
                log::debug!("excluding {child_rel} on {}", self.fs.label());
                level.excluded += 1;
                continue;
            }
            let path = self.fs.join(dir, &name);
            level.insert(Entry::new(name, sanitized, path, metadata));
        }
        Ok(level)
    }

    /// Depth-first stream of the entries under the directory at native path `root`.
    ///
    /// Children of a directory are yielded in sanitized name order, right after it.
    /// Symlinks and colliding directories are not descended into.
    pub fn walk(
        &self,
        root: &str,
    ) -> impl Stream<Item = droidsync::Result<(RelPathBuf, Entry)>> + Send + '_ {
        let root = root.to_string();
        try_stream! {
            let top = self
                .root(&root)
                .await?
                .ok_or_else(|| Error::NotFound(root.clone()))?;
            let first = self.level(top.entry().path(), RelPath::root()).await?;
            let mut stack = vec![flatten(RelPath::root(), first)];
            while let Some(iter) = stack.last_mut() {
                match iter.next() {
                    None => {
                        stack.pop();
                    }
                    Some((rel, entry, descend)) => {
                        let dir = (descend && entry.is_dir())
                            .then(|| (entry.path().to_string(), rel.clone()));
                        yield (rel, entry);
                        if let Some((path, rel)) = dir {
                            let level = self.level(&path, &rel).await?;
                            stack.push(flatten(&rel, level));
                        }
                    }
                }
            }
        }
    }
}

fn flatten(parent: &RelPath, level: Level) -> std::vec::IntoIter<(RelPathBuf, Entry, bool)> {
    let mut flat = Vec::new();
    for (name, slot) in level {
        let descend = !slot.is_collision();
        let rel = parent.join(&name);
        for entry in slot.entries {
            flat.push((rel.clone(), entry, descend));
        }
    }
    flat.into_iter()
}
