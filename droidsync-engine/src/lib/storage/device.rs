//! Android device storage, reached through the `adb` bridge.
//!
//! Every operation is one `adb` invocation. Metadata queries run a small
//! POSIX shell script on the device; whole files move with `adb pull` and
//! `adb push`. Errors detected by the scripts are reported on stdout with
//! sentinel lines starting with `?`, so that they do not depend on how the
//! installed adb version forwards exit codes of the remote shell.
use std::{borrow::Cow, process::Stdio};

use chrono::{DateTime, TimeZone, Utc};
use droidsync::{EntryKind, Error, Metadata};
use futures::Stream;
use tokio::process::Command;

use super::Capabilities;

const SENTINEL_NOT_FOUND: &str = "?notfound";
const SENTINEL_NOT_DIR: &str = "?notdir";
const SENTINEL_NOT_EMPTY: &str = "?notempty";
const SENTINEL_ERROR: &str = "?error";

const STAT_FORMAT: &str = "'%f %s %Y %n'";

const PART_SUFFIX: &str = ".droidsync.part";

/// The adb program and the arguments selecting the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adb {
    program: String,
    args: Vec<String>,
}

impl Default for Adb {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl Adb {
    pub fn new<P: Into<String>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Target the device with the given serial number (`-s`)
    pub fn serial(mut self, serial: &str) -> Self {
        self.args.extend(["-s".to_string(), serial.to_string()]);
        self
    }

    /// Target the only USB device (`-d`)
    pub fn usb(mut self) -> Self {
        self.args.push("-d".to_string());
        self
    }

    /// Target the only emulator (`-e`)
    pub fn emulator(mut self) -> Self {
        self.args.push("-e".to_string());
        self
    }

    /// Name of the adb server host (`-H`)
    pub fn server_host(mut self, host: &str) -> Self {
        self.args.extend(["-H".to_string(), host.to_string()]);
        self
    }

    /// Port of the adb server (`-P`)
    pub fn server_port(mut self, port: u16) -> Self {
        self.args.extend(["-P".to_string(), port.to_string()]);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run `script` with the device shell and return its standard output
    pub async fn shell(&self, script: &str) -> droidsync::Result<String> {
        log::trace!("adb shell {script}");
        let output = self
            .command()
            .arg("shell")
            .arg(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| droidsync::io_error!("failed to run {}: {err}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            droidsync::io_bail!("adb shell exited with {}: {}", output.status, stderr.trim());
        }
        Ok(String::from_utf8(output.stdout)?)
    }

    /// `adb pull`. Only the exit status is interpreted.
    pub async fn pull(&self, remote: &str, local: &str) -> droidsync::Result<()> {
        self.transfer("pull", remote, local, remote).await
    }

    /// `adb push`. Only the exit status is interpreted.
    pub async fn push(&self, local: &str, remote: &str) -> droidsync::Result<()> {
        self.transfer("push", local, remote, local).await
    }

    async fn transfer(
        &self,
        verb: &str,
        from: &str,
        to: &str,
        err_path: &str,
    ) -> droidsync::Result<()> {
        log::trace!("adb {verb} {from} {to}");
        let status = self
            .command()
            .arg(verb)
            .arg(from)
            .arg(to)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| droidsync::transfer_error!(err_path, "failed to run {}: {err}", self.program))?;
        if !status.success() {
            return Err(droidsync::transfer_error!(
                err_path,
                "adb {verb} exited with {status}"
            ));
        }
        Ok(())
    }
}

/// Quote `s` for the device shell
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Immutable configuration of a [`DeviceFs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Replace characters that are invalid on FAT-like storage
    pub sanitize: bool,
    /// Set modification times with `touch` after each transfer
    pub set_mtime: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            sanitize: false,
            set_mtime: true,
        }
    }
}

/// The storage of an Android device
#[derive(Debug, Clone)]
pub struct DeviceFs {
    adb: Adb,
    opts: DeviceOptions,
}

impl DeviceFs {
    pub fn new(adb: Adb, opts: DeviceOptions) -> Self {
        log::debug!("Initializing device storage with {adb:?} and {opts:?}");
        Self { adb, opts }
    }

    pub fn adb(&self) -> &Adb {
        &self.adb
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.opts
    }

    async fn run_checked(&self, path: &str, script: &str) -> droidsync::Result<String> {
        let output = self.adb.shell(script).await?;
        check_sentinel(path, &output)?;
        Ok(output)
    }

    async fn list(&self, path: &str) -> droidsync::Result<Vec<(String, Metadata)>> {
        let q = shell_quote(path);
        let script = format!(
            "if [ ! -e {q} ] && [ ! -L {q} ]; then echo {SENTINEL_NOT_FOUND}; \
             elif [ -L {q} ] || [ ! -d {q} ]; then echo {SENTINEL_NOT_DIR}; \
             else cd {q} && find . -mindepth 1 -maxdepth 1 -exec stat -c {STAT_FORMAT} {{}} + \
             || echo {SENTINEL_ERROR}; fi"
        );
        let output = self.run_checked(path, &script).await?;
        parse_listing(&output)
    }
}

/// Turn the first line of `output` into an error if it is a sentinel
fn check_sentinel(path: &str, output: &str) -> droidsync::Result<()> {
    match output.lines().next().map(str::trim_end) {
        Some(SENTINEL_NOT_FOUND) => Err(Error::NotFound(path.to_string())),
        Some(SENTINEL_NOT_DIR) => Err(Error::NotADirectory(path.to_string())),
        Some(SENTINEL_NOT_EMPTY) => Err(Error::NotEmpty(path.to_string())),
        Some(SENTINEL_ERROR) => Err(droidsync::io_error!("{path}: device command failed")),
        _ => Ok(()),
    }
}

/// Parse one line of `stat -c '%f %s %Y %n'`
fn parse_stat_line(line: &str) -> droidsync::Result<(String, Metadata)> {
    let mut parts = line.splitn(4, ' ');
    let (Some(mode), Some(size), Some(mtime), Some(name)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        droidsync::other_bail!("unexpected stat output: {line}");
    };
    let mode = u32::from_str_radix(mode, 16)
        .map_err(|err| droidsync::other_error!("bad mode in stat output '{line}': {err}"))?;
    let size: u64 = size
        .parse()
        .map_err(|err| droidsync::other_error!("bad size in stat output '{line}': {err}"))?;
    let mtime: i64 = mtime
        .parse()
        .map_err(|err| droidsync::other_error!("bad mtime in stat output '{line}': {err}"))?;
    let mtime = Utc
        .timestamp_opt(mtime, 0)
        .single()
        .ok_or_else(|| droidsync::other_error!("mtime out of range in stat output '{line}'"))?;

    let kind = match mode & 0o170000 {
        0o100000 => EntryKind::File,
        0o040000 => EntryKind::Directory,
        0o120000 => EntryKind::Symlink,
        _ => EntryKind::Other,
    };
    let size = if kind == EntryKind::File { size } else { 0 };
    Ok((name.to_string(), Metadata { kind, size, mtime }))
}

fn parse_listing(output: &str) -> droidsync::Result<Vec<(String, Metadata)>> {
    let mut entries = Vec::new();
    for line in output.lines().filter(|l| !l.is_empty()) {
        let (name, metadata) = parse_stat_line(line)?;
        let name = name.strip_prefix("./").unwrap_or(&name).to_string();
        entries.push((name, metadata));
    }
    Ok(entries)
}

impl super::DirEntries for DeviceFs {
    fn dir_entries(
        &self,
        path: &str,
    ) -> impl Stream<Item = droidsync::Result<(String, Metadata)>> + Send {
        log::trace!("listing entries of {path} on device");
        let this = self.clone();
        let path = path.to_string();
        async_stream::try_stream! {
            for entry in this.list(&path).await? {
                yield entry;
            }
        }
    }
}

impl super::Stat for DeviceFs {
    async fn stat(&self, path: &str) -> droidsync::Result<Metadata> {
        let q = shell_quote(path);
        let script = format!(
            "if [ -e {q} ] || [ -L {q} ]; then stat -c {STAT_FORMAT} {q}; \
             else echo {SENTINEL_NOT_FOUND}; fi"
        );
        let output = self.run_checked(path, &script).await?;
        let line = output
            .lines()
            .next()
            .ok_or_else(|| droidsync::other_error!("empty stat output for {path}"))?;
        Ok(parse_stat_line(line)?.1)
    }

    async fn real_path(&self, path: &str) -> droidsync::Result<String> {
        let q = shell_quote(path);
        let script = format!(
            "if [ -e {q} ]; then readlink -f {q} || echo {SENTINEL_ERROR}; \
             else echo {SENTINEL_NOT_FOUND}; fi"
        );
        let output = self.run_checked(path, &script).await?;
        match output.lines().next().map(str::trim_end) {
            Some(real) if real.starts_with('/') => Ok(real.to_string()),
            _ => droidsync::other_bail!("unexpected readlink output for {path}: {output}"),
        }
    }
}

impl super::MkDir for DeviceFs {
    async fn make_dirs(&self, path: &str) -> droidsync::Result<()> {
        log::info!("mkdir -p {path} on device");
        let q = shell_quote(path);
        let script = format!(
            "if [ -e {q} ] && [ ! -d {q} ]; then echo {SENTINEL_NOT_DIR}; \
             else mkdir -p {q} || echo {SENTINEL_ERROR}; fi"
        );
        self.run_checked(path, &script).await?;
        Ok(())
    }
}

impl super::Remove for DeviceFs {
    async fn remove_file(&self, path: &str) -> droidsync::Result<()> {
        log::info!("deleting {path} on device");
        let q = shell_quote(path);
        let script = format!(
            "if [ ! -e {q} ] && [ ! -L {q} ]; then echo {SENTINEL_NOT_FOUND}; \
             else rm -f {q} || echo {SENTINEL_ERROR}; fi"
        );
        self.run_checked(path, &script).await?;
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> droidsync::Result<()> {
        log::info!("rmdir {path} on device");
        let q = shell_quote(path);
        let script = format!(
            "if [ ! -e {q} ]; then echo {SENTINEL_NOT_FOUND}; \
             elif [ -L {q} ] || [ ! -d {q} ]; then echo {SENTINEL_NOT_DIR}; \
             elif [ -n \"$(ls -A {q})\" ]; then echo {SENTINEL_NOT_EMPTY}; \
             else rmdir {q} || echo {SENTINEL_ERROR}; fi"
        );
        self.run_checked(path, &script).await?;
        Ok(())
    }
}

impl super::SetMtime for DeviceFs {
    async fn set_mtime(&self, path: &str, mtime: DateTime<Utc>) -> droidsync::Result<()> {
        log::trace!("touch {path} at {mtime} on device");
        let q = shell_quote(path);
        let script = format!(
            "touch -c -m -d @{} {q} || echo {SENTINEL_ERROR}",
            mtime.timestamp()
        );
        self.run_checked(path, &script).await?;
        Ok(())
    }
}

impl super::Transfer for DeviceFs {
    async fn transfer_in(&self, remote: &str, local: &str) -> droidsync::Result<()> {
        log::info!("pulling {remote} to {local}");
        let part = format!("{local}{PART_SUFFIX}");
        if let Err(err) = self.adb.pull(remote, &part).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(err);
        }
        if let Err(err) = tokio::fs::rename(&part, local).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(droidsync::transfer_error!(local, "{err}"));
        }
        Ok(())
    }

    async fn transfer_out(&self, local: &str, remote: &str) -> droidsync::Result<()> {
        log::info!("pushing {local} to {remote}");
        let part = format!("{remote}{PART_SUFFIX}");
        self.adb.push(local, &part).await?;
        let script = format!(
            "mv -f {} {} || {{ rm -f {}; echo {SENTINEL_ERROR}; }}",
            shell_quote(&part),
            shell_quote(remote),
            shell_quote(&part),
        );
        self.run_checked(remote, &script)
            .await
            .map_err(|err| droidsync::transfer_error!(remote, "{err}"))?;
        Ok(())
    }
}

impl super::Naming for DeviceFs {
    fn separator(&self) -> char {
        '/'
    }

    fn join(&self, base: &str, name: &str) -> String {
        if base.is_empty() {
            name.to_string()
        } else if base.ends_with('/') {
            format!("{base}{name}")
        } else {
            format!("{base}/{name}")
        }
    }

    fn split<'a>(&self, path: &'a str) -> (&'a str, &'a str) {
        let trimmed = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        match trimmed.rfind('/') {
            Some(0) => ("/", &trimmed[1..]),
            Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
            None => ("", trimmed),
        }
    }

    fn normalize(&self, path: &str) -> String {
        let absolute = path.starts_with('/');
        let mut names: Vec<&str> = Vec::new();
        for name in path.split('/') {
            match name {
                "" | "." => (),
                ".." => match names.last() {
                    Some(&"..") | None if !absolute => names.push(".."),
                    Some(_) => {
                        names.pop();
                    }
                    None => (),
                },
                name => names.push(name),
            }
        }
        let joined = names.join("/");
        match (absolute, joined.is_empty()) {
            (true, _) => format!("/{joined}"),
            (false, true) => ".".to_string(),
            (false, false) => joined,
        }
    }

    fn sanitize<'a>(&self, name: &'a str) -> Cow<'a, str> {
        super::sanitize_name(name, self.opts.sanitize)
    }

    fn validate_root(&self, path: &str) -> droidsync::Result<()> {
        if !path.starts_with('/') {
            droidsync::invalid_path_bail!(path, "device paths must be absolute");
        }
        if path.contains('\0') {
            droidsync::invalid_path_bail!(path, "contains a NUL character");
        }
        Ok(())
    }
}

impl super::FileSystem for DeviceFs {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            host_local: false,
            set_mtime: self.opts.set_mtime,
        }
    }

    fn label(&self) -> String {
        match self.adb.args.iter().position(|a| a == "-s") {
            Some(idx) if idx + 1 < self.adb.args.len() => {
                format!("device {}", self.adb.args[idx + 1])
            }
            _ => "device".to_string(),
        }
    }
}
