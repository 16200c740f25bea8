use std::{error, fmt, io, string::FromUtf8Error};

use serde::{Deserialize, Serialize};

use crate::{path::RelPathBuf, Conflict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NotADirectory,
    NotEmpty,
    InvalidPath,
    Transfer,
    Conflict,
    Io,
    Other,
}

/// The error type of all backend and engine operations.
/// Paths held by the variants are backend native, except for
/// [`Error::Conflict`] which holds the relative path within the synchronized tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Error {
    NotFound(String),
    NotADirectory(String),
    NotEmpty(String),
    InvalidPath { path: String, reason: String },
    Transfer { path: String, reason: String },
    Conflict(RelPathBuf, Conflict),
    Io(String),
    Other(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(..) => ErrorKind::NotFound,
            Self::NotADirectory(..) => ErrorKind::NotADirectory,
            Self::NotEmpty(..) => ErrorKind::NotEmpty,
            Self::InvalidPath { .. } => ErrorKind::InvalidPath,
            Self::Transfer { .. } => ErrorKind::Transfer,
            Self::Conflict(..) => ErrorKind::Conflict,
            Self::Io(..) => ErrorKind::Io,
            Self::Other(..) => ErrorKind::Other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Map an io error on `path` to the matching structural error, if any.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => Self::Io(format!("{path}: {err}")),
            _ => match err.raw_os_error() {
                Some(code) if code == ENOTDIR => Self::NotADirectory(path.to_string()),
                Some(code) if code == ENOTEMPTY => Self::NotEmpty(path.to_string()),
                _ => Self::Io(format!("{path}: {err}")),
            },
        }
    }
}

#[cfg(unix)]
const ENOTDIR: i32 = 20;
#[cfg(unix)]
#[cfg(target_os = "linux")]
const ENOTEMPTY: i32 = 39;
#[cfg(unix)]
#[cfg(not(target_os = "linux"))]
const ENOTEMPTY: i32 = 66;
#[cfg(windows)]
const ENOTDIR: i32 = 267; // ERROR_DIRECTORY
#[cfg(windows)]
const ENOTEMPTY: i32 = 145; // ERROR_DIR_NOT_EMPTY

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "No such entry: {path}"),
            Self::NotADirectory(path) => write!(f, "Not a directory: {path}"),
            Self::NotEmpty(path) => write!(f, "Directory not empty: {path}"),
            Self::InvalidPath { path, reason } => write!(f, "Invalid path {path}: {reason}"),
            Self::Transfer { path, reason } => write!(f, "Transfer of {path} failed: {reason}"),
            Self::Conflict(path, conflict) => {
                write!(f, "Conflict at {}: {conflict}", path.or_root())
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Self::Other(format!(
            "Non UTF-8 string: {}",
            String::from_utf8_lossy(&value.into_bytes())
        ))
    }
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}


pub type Result<T> = std::result::Result<T, Error>;

#[macro_export]
macro_rules! io_bail {
    ($($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::Io(format!($($t)*)));
    };
}

#[macro_export]
macro_rules! other_bail {
    ($($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::Other(format!($($t)*)));
    };
}

#[macro_export]
macro_rules! invalid_path_bail {
    ($path:expr, $($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::InvalidPath {
            path: ::std::string::ToString::to_string(&$path),
            reason: format!($($t)*),
        });
    };
}

#[macro_export]
macro_rules! io_error {
    ($($t:tt)*) => {
        $crate::Error::Io(format!($($t)*))
    };
}

#[macro_export]
macro_rules! transfer_error {
    ($path:expr, $($t:tt)*) => {
        $crate::Error::Transfer {
            path: ::std::string::ToString::to_string(&$path),
            reason: format!($($t)*),
        }
    };
}

#[macro_export]
macro_rules! invalid_path_error {
    ($path:expr, $($t:tt)*) => {
        $crate::Error::InvalidPath {
            path: ::std::string::ToString::to_string(&$path),
            reason: format!($($t)*),
        }
    };
}

#[macro_export]
macro_rules! other_error {
    ($($t:tt)*) => {
        $crate::Error::Other(format!($($t)*))
    };
}
