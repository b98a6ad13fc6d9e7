//! Persistence of job groups between callbacks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_model::{GroupId, JobId};

use crate::error::Result;

/// Persisted form of a job group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobGroupRecord {
    pub id: GroupId,
    pub jobs: Vec<JobId>,
    pub created_at: DateTime<Utc>,
}

/// Storage for job groups, keyed by group id alone so progress and cancel
/// can be answered after a restart.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn save(&self, group: &JobGroupRecord) -> Result<()>;

    async fn restore(&self, id: GroupId) -> Result<Option<JobGroupRecord>>;

    /// Returns whether a group was removed.
    async fn delete(&self, id: GroupId) -> Result<bool>;
}
