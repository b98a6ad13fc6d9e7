//! Per-job result callbacks and scan finalization.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use warden_model::{BrokerIdentity, Namespace, ScanId, ScanProgress, ScanStatus};

use crate::error::{Result, WardenError};
use crate::orchestration::ScanServices;
use crate::ports::ForwardedResult;

/// Completion callback payload of one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub namespace: Namespace,
    pub scan_id: ScanId,
    pub filename: String,
    pub probe: String,
    pub result: Value,
}

/// Where the scan stands after one job result was consumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Jobs are still outstanding.
    Pending(ScanProgress),
    /// This call moved the scan to `processed` and cleaned up.
    Finalized(ScanProgress),
    /// The scan had already left `launched` (cancelled, or finalized by an
    /// earlier result).
    AlreadySettled(ScanStatus),
    /// Another result finalized the scan between our progress read and our
    /// status transition.
    LostRace,
}

/// Consumes job results: forwards each downstream and finalizes the scan
/// once every job of its group is ready.
#[derive(Clone)]
pub struct ResultAggregator {
    services: ScanServices,
}

impl fmt::Debug for ResultAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultAggregator").finish_non_exhaustive()
    }
}

impl ResultAggregator {
    pub fn new(services: ScanServices) -> Self {
        Self { services }
    }

    /// Handle one job result.
    ///
    /// The result is forwarded before anything else; a forwarding failure is
    /// logged and does not stop aggregation. The owning tenant is found from
    /// the namespace bound to the job, whoever `caller` is. Finalization is
    /// a conditional `launched -> processed` transition and only its winner
    /// deletes the group and flushes storage.
    pub async fn on_job_result(
        &self,
        caller: &BrokerIdentity,
        result: JobResult,
    ) -> Result<Completion> {
        let JobResult {
            namespace,
            scan_id,
            filename,
            probe,
            result,
        } = result;

        let forwarded = ForwardedResult {
            scan_id: scan_id.clone(),
            filename,
            probe,
            result,
        };
        match self.services.sink.forward(&forwarded).await {
            Ok(()) => info!(%scan_id, probe = %forwarded.probe, %caller, "result forwarded"),
            Err(err) => error!(
                %scan_id,
                probe = %forwarded.probe,
                error = %err,
                "result forwarding failed"
            ),
        }

        let tenant = self.services.resolve_namespace(&namespace).await?;
        let record = self
            .services
            .scans
            .find(&scan_id, tenant.id)
            .await?
            .ok_or_else(|| WardenError::ScanNotFound(scan_id.to_string()))?;
        if record.status != ScanStatus::Launched {
            return Ok(Completion::AlreadySettled(record.status));
        }

        let group = self.services.restore_group(&record).await?;
        let progress = group.progress().await?;
        if !progress.is_complete() {
            return Ok(Completion::Pending(progress));
        }

        if !self.services.finalize(&tenant, &record, &group).await? {
            warn!(%scan_id, "scan finalized by a concurrent result");
            return Ok(Completion::LostRace);
        }

        Ok(Completion::Finalized(progress))
    }
}
