//! Progress, cancel and result queries against a launched scan.

use std::fmt;

use tracing::{info, warn};
use warden_model::{BrokerIdentity, CancelSummary, ScanId, ScanProgress, ScanStatus, TaskReturn};

use crate::error::Result;
use crate::orchestration::ScanServices;

/// Result of a progress or cancel request.
///
/// `Skipped` carries the status that made the operation a no-op; it maps to
/// a warning envelope, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlOutcome<T> {
    Applied(T),
    Skipped(ScanStatus),
}

impl<T> From<ControlOutcome<T>> for TaskReturn<T> {
    fn from(outcome: ControlOutcome<T>) -> Self {
        match outcome {
            ControlOutcome::Applied(payload) => TaskReturn::success(payload),
            ControlOutcome::Skipped(status) => TaskReturn::warning(status),
        }
    }
}

/// Answers progress queries and cancels launched scans.
#[derive(Clone)]
pub struct ScanController {
    services: ScanServices,
}

impl fmt::Debug for ScanController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanController").finish_non_exhaustive()
    }
}

impl ScanController {
    pub fn new(services: ScanServices) -> Self {
        Self { services }
    }

    /// Report `{total, finished, successful}` for a launched scan.
    ///
    /// A scan found complete here is finalized as well, which covers results
    /// that arrived before the scan record existed and were dropped.
    pub async fn progress(
        &self,
        caller: &BrokerIdentity,
        scan_id: &ScanId,
    ) -> Result<ControlOutcome<ScanProgress>> {
        let tenant = self.services.resolve_tenant(caller).await?;
        let Some(record) = self.services.scans.find(scan_id, tenant.id).await? else {
            return Ok(ControlOutcome::Skipped(ScanStatus::Created));
        };
        if record.status != ScanStatus::Launched {
            return Ok(ControlOutcome::Skipped(record.status));
        }

        let group = self.services.restore_group(&record).await?;
        let progress = group.progress().await?;
        if progress.is_complete() && self.services.finalize(&tenant, &record, &group).await? {
            info!(%scan_id, "scan finalized on progress query");
        }
        Ok(ControlOutcome::Applied(progress))
    }

    /// Cancel a launched scan.
    ///
    /// The scan is moved to `cancelling` before any job is touched, so only
    /// one of several concurrent cancels performs the sweep. The others, and
    /// any cancel on a scan that is no longer launched, are skipped.
    pub async fn cancel(
        &self,
        caller: &BrokerIdentity,
        scan_id: &ScanId,
    ) -> Result<ControlOutcome<CancelSummary>> {
        let tenant = self.services.resolve_tenant(caller).await?;
        let Some(record) = self.services.scans.find(scan_id, tenant.id).await? else {
            return Ok(ControlOutcome::Skipped(ScanStatus::Created));
        };
        if record.status != ScanStatus::Launched {
            return Ok(ControlOutcome::Skipped(record.status));
        }

        let won = self
            .services
            .scans
            .transition(scan_id, tenant.id, ScanStatus::Launched, ScanStatus::Cancelling)
            .await?;
        if !won {
            let current = self
                .services
                .scans
                .find(scan_id, tenant.id)
                .await?
                .map_or(ScanStatus::Created, |r| r.status);
            return Ok(ControlOutcome::Skipped(current));
        }

        let group = self.services.restore_group(&record).await?;
        let summary = group.revoke_pending().await?;

        if !self
            .services
            .scans
            .transition(scan_id, tenant.id, ScanStatus::Cancelling, ScanStatus::Cancelled)
            .await?
        {
            warn!(%scan_id, "scan left cancelling state during cancel");
        }
        self.services.storage.flush(&tenant.namespace, scan_id).await?;

        info!(
            %scan_id,
            total = summary.total,
            finished = summary.finished,
            cancelled = summary.cancelled,
            "scan cancelled"
        );
        Ok(ControlOutcome::Applied(summary))
    }
}
