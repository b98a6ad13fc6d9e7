//! Cooperative per-document locking with timeout reclaim.
//!
//! A document carries a lock state and the time that state was last set.
//! Writers take the lock before mutating, readers never do. A lock held for
//! longer than the configured timeout is treated as abandoned and may be
//! taken by the next writer.

mod document;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::WardenError;

pub use document::{DocumentLock, LockableDocument};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    #[default]
    Free,
    Locked,
}

impl LockState {
    pub fn as_str(self) -> &'static str {
        match self {
            LockState::Free => "free",
            LockState::Locked => "locked",
        }
    }
}

impl FromStr for LockState {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(LockState::Free),
            "locked" => Ok(LockState::Locked),
            other => Err(WardenError::Internal(format!("unknown lock state {other}"))),
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access mode requested when creating or loading a document.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    Read,
    Write,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Read => f.write_str("read"),
            LockMode::Write => f.write_str("write"),
        }
    }
}

/// Lock bookkeeping stored alongside every document body.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LockFields {
    pub state: LockState,
    pub lock_time: DateTime<Utc>,
}

impl Default for LockFields {
    fn default() -> Self {
        Self {
            state: LockState::Free,
            lock_time: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl LockFields {
    pub fn free_at(at: DateTime<Utc>) -> Self {
        Self {
            state: LockState::Free,
            lock_time: at,
        }
    }

    pub fn locked_at(at: DateTime<Utc>) -> Self {
        Self {
            state: LockState::Locked,
            lock_time: at,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == LockState::Free
    }
}

/// A record type that can live in the document store.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection the documents of this type are stored under.
    const COLLECTION: &'static str;
}
