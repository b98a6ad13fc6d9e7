//! Job queue and worker inspection seams.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_model::{JobId, Namespace, ScanId};

use crate::error::{Result, WardenError};

/// Completion state of a dispatched job as reported by the broker.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Succeeded,
    Failed,
    /// Revoked before completion; counts as a ready failure.
    Revoked,
}

impl JobState {
    pub fn is_ready(self) -> bool {
        !matches!(self, JobState::Pending)
    }

    pub fn is_successful(self) -> bool {
        matches!(self, JobState::Succeeded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Revoked => "revoked",
        }
    }
}

impl FromStr for JobState {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobState::Pending),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            "revoked" => Ok(JobState::Revoked),
            other => Err(WardenError::Broker(format!("unknown job state {other}"))),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments bound to the completion callback of a job.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallbackBinding {
    pub namespace: Namespace,
    pub scan_id: ScanId,
    pub filename: String,
    pub probe: String,
}

/// One unit of work: a file of a scan routed to one probe queue.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub queue: String,
    pub namespace: Namespace,
    pub scan_id: ScanId,
    pub filename: String,
    pub callback: CallbackBinding,
}

impl JobSpec {
    pub fn new(
        namespace: &Namespace,
        scan_id: &ScanId,
        filename: &str,
        probe: &str,
    ) -> Self {
        Self {
            queue: probe.to_string(),
            namespace: namespace.clone(),
            scan_id: scan_id.clone(),
            filename: filename.to_string(),
            callback: CallbackBinding {
                namespace: namespace.clone(),
                scan_id: scan_id.clone(),
                filename: filename.to_string(),
                probe: probe.to_string(),
            },
        }
    }
}

/// Queues a single worker is currently consuming.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkerQueues {
    pub worker: String,
    pub queues: Vec<String>,
}

/// Job submission and control surface of the broker.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Route a job to its probe queue and return its identity.
    async fn send_job(&self, spec: JobSpec) -> Result<JobId>;

    /// Current state of each job, in the order requested. Unknown jobs
    /// report as pending.
    async fn job_states(&self, jobs: &[JobId]) -> Result<Vec<JobState>>;

    /// Revoke a job that has not completed. With `terminate` a running
    /// worker is asked to stop as well.
    async fn revoke(&self, job: JobId, terminate: bool) -> Result<()>;
}

/// Worker/queue discovery surface of the broker.
#[async_trait]
pub trait BrokerInspector: Send + Sync {
    async fn active_queues(&self) -> Result<Vec<WorkerQueues>>;
}
