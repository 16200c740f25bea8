use anyhow::Context;
use glob::{MatchOptions, Pattern, PatternError};
use serde::{Deserialize, Serialize};

use crate::path::RelPath;

#[derive(Debug, Clone, Default)]
pub struct PatternList(Vec<Pattern>, MatchOptions);

impl PatternList {
    pub fn new<I>(patterns: I, opts: MatchOptions) -> Result<PatternList, PatternError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let patterns: Result<Vec<_>, _> = patterns
            .into_iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect();
        Ok(PatternList(patterns?, opts))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `path` matches any pattern.
    /// Patterns are tried against the whole relative path, then against its last name,
    /// so that `*.tmp` excludes temporary files at any depth.
    pub fn matches_with<P: AsRef<RelPath>>(&self, path: P) -> bool {
        let path = path.as_ref();
        let name = path.file_name();
        self.0.iter().any(|p| {
            p.matches_with(path.as_str(), self.1)
                || name.map(|n| p.matches_with(n, self.1)).unwrap_or(false)
        })
    }
}

/// Parse the content of an exclude file: one pattern per line,
/// blank lines and lines starting with '#' are ignored.
pub fn parse_pattern_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim_start().is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Which way entries flow during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Mirror the source onto the destination
    #[default]
    SourceToDestination,
    /// Mirror the destination onto the source
    DestinationToSource,
    /// Propagate changes both ways.
    ///
    /// No baseline of a previous run is kept, so the newest side wins
    /// whenever modification times differ by more than the tolerance.
    /// Differences within the tolerance leave both sides untouched, which is
    /// the same outcome as letting the source win.
    /// Entries present on one side only are copied to the other side:
    /// deletion is never planned in this mode.
    TwoWay,
}

/// What the executor does after a failed action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Halt the run at the first failure
    #[default]
    Abort,
    /// Record the failure and carry on with the rest of the plan
    Continue,
}

fn default_tolerance_ms() -> u64 {
    crate::MTIME_TOL.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub mode: SyncMode,
    /// Delete destination entries that are absent from the source
    pub delete: bool,
    /// Maximum modification time difference considered as "unchanged"
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,
    pub failure_policy: FailurePolicy,
    pub exclude: Vec<String>,
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            delete: false,
            tolerance_ms: default_tolerance_ms(),
            failure_policy: FailurePolicy::default(),
            exclude: Vec::new(),
            dry_run: false,
        }
    }
}

impl Config {
    pub async fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let config_json = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config_json = std::str::from_utf8(&config_json)?;
        Ok(serde_json::from_str(config_json)?)
    }

    /// Tolerances beyond `i64::MAX` milliseconds are clamped
    pub fn tolerance(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.tolerance_ms).unwrap_or(i64::MAX))
    }

    pub fn exclude_patterns(&self) -> Result<PatternList, PatternError> {
        PatternList::new(&self.exclude, MatchOptions::default())
    }

    /// Deletion is only meaningful when mirroring one way
    pub fn deletes(&self) -> bool {
        self.delete && self.mode != SyncMode::TwoWay
    }
}
