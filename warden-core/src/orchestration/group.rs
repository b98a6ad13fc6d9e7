//! Job groups and their progress counters.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use warden_model::{CancelSummary, GroupId, JobId, ScanProgress};

use crate::error::Result;
use crate::ports::{JobBroker, JobGroupRecord, JobState};

/// The jobs dispatched together for one scan, bound to the broker that
/// answers for them.
#[derive(Clone)]
pub struct JobGroup {
    record: JobGroupRecord,
    broker: Arc<dyn JobBroker>,
}

impl fmt::Debug for JobGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobGroup")
            .field("id", &self.record.id)
            .field("jobs", &self.record.jobs.len())
            .finish()
    }
}

impl JobGroup {
    pub fn new(record: JobGroupRecord, broker: Arc<dyn JobBroker>) -> Self {
        Self { record, broker }
    }

    pub fn id(&self) -> GroupId {
        self.record.id
    }

    pub fn jobs(&self) -> &[JobId] {
        &self.record.jobs
    }

    pub fn len(&self) -> usize {
        self.record.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.jobs.is_empty()
    }

    pub fn record(&self) -> &JobGroupRecord {
        &self.record
    }

    pub async fn states(&self) -> Result<Vec<JobState>> {
        self.broker.job_states(&self.record.jobs).await
    }

    /// Snapshot of how many jobs are ready and how many of those succeeded.
    pub async fn progress(&self) -> Result<ScanProgress> {
        let states = self.states().await?;
        Ok(ScanProgress {
            total: self.len(),
            finished: states.iter().filter(|s| s.is_ready()).count(),
            successful: states.iter().filter(|s| s.is_successful()).count(),
        })
    }

    /// Revoke, with termination, every job that is not ready yet.
    pub async fn revoke_pending(&self) -> Result<CancelSummary> {
        let states = self.states().await?;
        let mut summary = CancelSummary {
            total: self.len(),
            ..CancelSummary::default()
        };

        for (job, state) in self.record.jobs.iter().zip(states) {
            if state.is_ready() {
                summary.finished += 1;
            } else {
                self.broker.revoke(*job, true).await?;
                summary.cancelled += 1;
            }
        }

        debug!(
            group_id = %self.record.id,
            finished = summary.finished,
            cancelled = summary.cancelled,
            "pending jobs revoked"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::infra::memory::InProcBroker;
    use crate::ports::JobSpec;
    use warden_model::{Namespace, ScanId};

    async fn group_of(broker: &Arc<InProcBroker>, n: usize) -> JobGroup {
        let namespace = Namespace::new("acme");
        let scan_id = ScanId::new("scan-1");
        let mut jobs = Vec::new();
        for i in 0..n {
            let spec = JobSpec::new(&namespace, &scan_id, &format!("f{i}"), "clamav");
            jobs.push(broker.send_job(spec).await.unwrap());
        }
        JobGroup::new(
            JobGroupRecord {
                id: GroupId::new(),
                jobs,
                created_at: Utc::now(),
            },
            broker.clone(),
        )
    }

    #[tokio::test]
    async fn progress_counts_ready_and_successful() {
        let broker = Arc::new(InProcBroker::default());
        let group = group_of(&broker, 5).await;
        broker.complete(group.jobs()[0], JobState::Succeeded).await;
        broker.complete(group.jobs()[1], JobState::Succeeded).await;
        broker.complete(group.jobs()[2], JobState::Failed).await;

        let progress = group.progress().await.unwrap();
        assert_eq!(
            progress,
            ScanProgress {
                total: 5,
                finished: 3,
                successful: 2
            }
        );
        assert!(!progress.is_complete());
    }

    #[tokio::test]
    async fn revoke_pending_skips_ready_jobs() {
        let broker = Arc::new(InProcBroker::default());
        let group = group_of(&broker, 5).await;
        broker.complete(group.jobs()[0], JobState::Succeeded).await;
        broker.complete(group.jobs()[3], JobState::Failed).await;

        let summary = group.revoke_pending().await.unwrap();
        assert_eq!(
            summary,
            CancelSummary {
                total: 5,
                finished: 2,
                cancelled: 3
            }
        );

        let revoked = broker.revoked().await;
        assert_eq!(revoked.len(), 3);
        assert!(revoked.iter().all(|(_, terminate)| *terminate));
        assert!(!revoked.iter().any(|(job, _)| *job == group.jobs()[0]));
    }
}
