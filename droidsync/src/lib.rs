use std::{cmp, time};

use chrono::{DateTime, Utc};

pub mod config;
pub mod path;

mod action;
mod conflict;
mod error;
mod metadata;
mod summary;

pub use crate::action::*;
pub use crate::config::{Config, FailurePolicy, SyncMode};
pub use crate::conflict::Conflict;
pub use crate::error::*;
pub use crate::metadata::*;
pub use crate::summary::*;

/// Default modification time tolerance.
/// Absorbs the resolution loss of FAT-like storage and of the transfer channel.
pub const MTIME_TOL: time::Duration = time::Duration::from_secs(2);

/// Compare two modification times, considering them equal if they are
/// no more than `tol` apart.
pub fn compare_mtime(lhs: DateTime<Utc>, rhs: DateTime<Utc>, tol: chrono::Duration) -> cmp::Ordering {
    let delta = lhs.signed_duration_since(rhs);
    if delta < -tol {
        cmp::Ordering::Less
    } else if delta > tol {
        cmp::Ordering::Greater
    } else {
        cmp::Ordering::Equal
    }
}
