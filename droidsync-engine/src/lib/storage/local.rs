use std::borrow::Cow;

use async_stream::try_stream;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use droidsync::{EntryKind, Error, Metadata};
use futures::Stream;
use tokio::fs;

use super::Capabilities;

#[cfg(windows)]
const FILE_WRITE_ATTRIBUTES: u32 = 0x0100;

/// Immutable configuration of a [`LocalFs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalOptions {
    /// Replace characters that are invalid in Windows file names
    pub sanitize: bool,
    /// Apply the Windows rules when validating root paths
    pub windows_paths: bool,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            sanitize: cfg!(windows),
            windows_paths: cfg!(windows),
        }
    }
}

/// The file system of the host
#[derive(Debug, Clone, Default)]
pub struct LocalFs {
    opts: LocalOptions,
}

impl LocalFs {
    pub fn new(opts: LocalOptions) -> Self {
        log::debug!("Initializing local storage with {opts:?}");
        Self { opts }
    }

    pub fn options(&self) -> &LocalOptions {
        &self.opts
    }
}

impl LocalFs {
    /// Copy `from` to `to` through a temporary sibling of `to`,
    /// so that a failed copy never leaves a truncated `to` behind.
    async fn copy_file(&self, from: &str, to: &str) -> droidsync::Result<()> {
        let to_path = Utf8Path::new(to);
        let file_name = to_path
            .file_name()
            .ok_or_else(|| droidsync::transfer_error!(to, "no file name"))?;
        let tmp = to_path.with_file_name(format!(".{file_name}.droidsync-part"));

        log::trace!("cp {from} {tmp}");
        if let Err(err) = fs::copy(from, &tmp).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(droidsync::transfer_error!(from, "{err}"));
        }
        log::trace!("mv {tmp} {to}");
        if let Err(err) = fs::rename(&tmp, to).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(droidsync::transfer_error!(to, "{err}"));
        }
        Ok(())
    }
}

impl super::DirEntries for LocalFs {
    fn dir_entries(
        &self,
        path: &str,
    ) -> impl Stream<Item = droidsync::Result<(String, Metadata)>> + Send {
        log::trace!("listing entries of {path}");
        let path = path.to_string();
        try_stream! {
            let mut read_dir = fs::read_dir(&path).await.map_err(|err| Error::from_io(err, &path))?;
            loop {
                let direntry = read_dir.next_entry().await.map_err(|err| Error::from_io(err, &path))?;
                match direntry {
                    None => break,
                    Some(direntry) => {
                        let name = String::from_utf8(direntry.file_name().into_encoded_bytes())?;
                        let entry_path = direntry.path();
                        let metadata = fs::symlink_metadata(&entry_path)
                            .await
                            .map_err(|err| Error::from_io(err, &entry_path.to_string_lossy()))?;
                        yield (name, map_metadata(&metadata)?);
                    }
                }
            }
        }
    }
}

impl super::Stat for LocalFs {
    async fn stat(&self, path: &str) -> droidsync::Result<Metadata> {
        let metadata = fs::symlink_metadata(path)
            .await
            .map_err(|err| Error::from_io(err, path))?;
        map_metadata(&metadata)
    }

    async fn real_path(&self, path: &str) -> droidsync::Result<String> {
        let real = fs::canonicalize(path)
            .await
            .map_err(|err| Error::from_io(err, path))?;
        let real = real
            .into_os_string()
            .into_string()
            .map_err(|real| droidsync::invalid_path_error!(path, "resolves to non UTF-8 {real:?}"))?;
        // canonicalize gives verbatim paths on Windows
        Ok(match real.strip_prefix(r"\\?\") {
            Some(stripped) if !stripped.starts_with("UNC") => stripped.to_string(),
            _ => real,
        })
    }
}

impl super::MkDir for LocalFs {
    async fn make_dirs(&self, path: &str) -> droidsync::Result<()> {
        log::info!("mkdir -p {path}");
        match fs::symlink_metadata(path).await {
            Ok(md) if md.is_dir() => return Ok(()),
            Ok(_) => return Err(Error::NotADirectory(path.to_string())),
            Err(_) => (),
        }
        fs::create_dir_all(path)
            .await
            .map_err(|err| Error::from_io(err, path))
    }
}

impl super::Remove for LocalFs {
    async fn remove_file(&self, path: &str) -> droidsync::Result<()> {
        log::info!("deleting {path}");
        fs::remove_file(path)
            .await
            .map_err(|err| Error::from_io(err, path))
    }

    async fn remove_dir(&self, path: &str) -> droidsync::Result<()> {
        log::info!("rmdir {path}");
        let md = fs::symlink_metadata(path)
            .await
            .map_err(|err| Error::from_io(err, path))?;
        if !md.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|err| Error::from_io(err, path))?;
        if entries.next_entry().await?.is_some() {
            return Err(Error::NotEmpty(path.to_string()));
        }
        fs::remove_dir(path)
            .await
            .map_err(|err| Error::from_io(err, path))
    }
}

impl super::SetMtime for LocalFs {
    async fn set_mtime(&self, path: &str, mtime: DateTime<Utc>) -> droidsync::Result<()> {
        log::trace!("touch {path} at {mtime}");
        // timestamps only need ownership, not write access:
        // copies of read-only files stay read-only
        let mut opts = fs::OpenOptions::new();
        #[cfg(unix)]
        opts.read(true);
        #[cfg(windows)]
        opts.access_mode(FILE_WRITE_ATTRIBUTES);
        let f = opts
            .open(path)
            .await
            .map_err(|err| Error::from_io(err, path))?;
        let f = f.into_std().await;
        f.set_modified(mtime.into())?;
        Ok(())
    }
}

impl super::Transfer for LocalFs {
    async fn transfer_in(&self, remote: &str, local: &str) -> droidsync::Result<()> {
        log::info!("copying {remote} to {local}");
        self.copy_file(remote, local).await
    }

    async fn transfer_out(&self, local: &str, remote: &str) -> droidsync::Result<()> {
        log::info!("copying {local} to {remote}");
        self.copy_file(local, remote).await
    }
}

impl super::Naming for LocalFs {
    fn separator(&self) -> char {
        std::path::MAIN_SEPARATOR
    }

    fn join(&self, base: &str, name: &str) -> String {
        Utf8Path::new(base).join(name).into_string()
    }

    fn split<'a>(&self, path: &'a str) -> (&'a str, &'a str) {
        let path = Utf8Path::new(path);
        let parent = path.parent().map(Utf8Path::as_str).unwrap_or("");
        let name = path.file_name().unwrap_or("");
        (parent, name)
    }

    fn normalize(&self, path: &str) -> String {
        let mut normalized = Utf8PathBuf::new();
        for comp in Utf8Path::new(path).components() {
            match comp {
                Utf8Component::CurDir => (),
                Utf8Component::ParentDir => match normalized.components().next_back() {
                    Some(Utf8Component::Normal(_)) => {
                        normalized.pop();
                    }
                    Some(Utf8Component::RootDir) | Some(Utf8Component::Prefix(_)) => (),
                    _ => normalized.push(".."),
                },
                comp => normalized.push(comp.as_str()),
            }
        }
        if normalized.as_str().is_empty() {
            ".".to_string()
        } else {
            normalized.into_string()
        }
    }

    fn sanitize<'a>(&self, name: &'a str) -> Cow<'a, str> {
        super::sanitize_name(name, self.opts.sanitize)
    }

    fn validate_root(&self, path: &str) -> droidsync::Result<()> {
        if path.is_empty() {
            droidsync::invalid_path_bail!(path, "empty path");
        }
        if path.contains('\0') {
            droidsync::invalid_path_bail!(path, "contains a NUL character");
        }
        if self.opts.windows_paths {
            if let Some(c) = path.chars().find(|c| "*?\"<>|".contains(*c)) {
                droidsync::invalid_path_bail!(path, "contains invalid character '{c}'");
            }
            // a colon is only legal as drive letter separator, as in "C:\"
            for (idx, c) in path.char_indices() {
                if c == ':' && idx != 1 {
                    droidsync::invalid_path_bail!(path, "contains invalid character ':'");
                }
            }
        }
        Ok(())
    }
}

impl super::FileSystem for LocalFs {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            host_local: true,
            set_mtime: true,
        }
    }

    fn label(&self) -> String {
        "local".to_string()
    }
}

fn map_metadata(metadata: &std::fs::Metadata) -> droidsync::Result<Metadata> {
    let kind = if metadata.is_symlink() {
        EntryKind::Symlink
    } else if metadata.is_file() {
        EntryKind::File
    } else if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::Other
    };
    let mtime: DateTime<Utc> = metadata.modified().map(Into::into).unwrap_or_default();
    let size = if kind == EntryKind::File {
        metadata.len()
    } else {
        0
    };
    Ok(Metadata { kind, size, mtime })
}
