//! Scan submission: quota check, job fan-out and scan bookkeeping.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};
use warden_model::{
    BrokerIdentity, GroupId, JobId, ScanId, ScanRecord, ScanRequest, Tenant,
};

use crate::clock::Clock;
use crate::config::AbortPolicy;
use crate::error::{Result, WardenError};
use crate::orchestration::probes::ProbeRegistry;
use crate::orchestration::quota::QuotaTracker;
use crate::orchestration::ScanServices;
use crate::ports::{JobGroupRecord, JobSpec};

/// What a dispatch call left behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub scan_id: ScanId,
    /// `None` when nothing was dispatched and no scan was recorded.
    pub group_id: Option<GroupId>,
    pub jobs: usize,
    pub files: usize,
}

impl DispatchOutcome {
    pub fn launched(&self) -> bool {
        self.group_id.is_some()
    }
}

/// Fans a scan request out to probe queues and records the launched scan.
pub struct ScanDispatcher {
    services: ScanServices,
    probes: Arc<ProbeRegistry>,
    quota: QuotaTracker,
    clock: Arc<dyn Clock>,
    on_abort: AbortPolicy,
}

impl fmt::Debug for ScanDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanDispatcher")
            .field("probes", &self.probes)
            .field("quota", &self.quota)
            .field("on_abort", &self.on_abort)
            .finish()
    }
}

impl ScanDispatcher {
    pub fn new(
        services: ScanServices,
        probes: Arc<ProbeRegistry>,
        quota: QuotaTracker,
        clock: Arc<dyn Clock>,
        on_abort: AbortPolicy,
    ) -> Self {
        Self {
            services,
            probes,
            quota,
            clock,
            on_abort,
        }
    }

    /// Dispatch one job per (file, probe) pair, in file-major order, until
    /// the tenant's quota runs out.
    ///
    /// A file without probes or naming an unavailable probe aborts the whole
    /// call and no scan is recorded. Jobs already sent for earlier files are
    /// kept or revoked according to the configured abort policy. A request
    /// throttled down to zero jobs records nothing and is not an error.
    pub async fn dispatch(
        &self,
        caller: &BrokerIdentity,
        scan_id: &ScanId,
        request: &ScanRequest,
    ) -> Result<DispatchOutcome> {
        let tenant = self.services.resolve_tenant(caller).await?;
        let mut quota = self.quota.remaining(&tenant).await?;
        let available = self.probes.available_probes().await?;
        info!(
            %scan_id,
            tenant = %tenant.name,
            %quota,
            ceiling = tenant.quota,
            "dispatching scan"
        );

        let mut dispatched: Vec<JobId> = Vec::new();
        for file in &request.files {
            let probes = match file.probes.as_deref() {
                Some(probes) if !probes.is_empty() => probes,
                _ => {
                    let err = WardenError::EmptyProbeList(file.filename.clone());
                    return Err(self.abort(scan_id, &dispatched, err).await);
                }
            };

            if let Some(unknown) = probes.iter().find(|p| !available.contains(*p)) {
                warn!(%scan_id, probe = %unknown, "unknown probe");
                let err = WardenError::UnknownProbe(unknown.clone());
                return Err(self.abort(scan_id, &dispatched, err).await);
            }

            for probe in probes {
                if quota.is_exhausted() {
                    warn!(%scan_id, filename = %file.filename, "quota exhausted");
                    break;
                }
                quota.consume();

                let spec = JobSpec::new(&tenant.namespace, scan_id, &file.filename, probe);
                match self.services.broker.send_job(spec).await {
                    Ok(job) => dispatched.push(job),
                    Err(err) => return Err(self.abort(scan_id, &dispatched, err).await),
                }
            }
        }

        let group_id = if dispatched.is_empty() {
            None
        } else {
            Some(self.record_launch(&tenant, scan_id, dispatched.clone()).await?)
        };

        info!(
            %scan_id,
            files = request.len(),
            active_probes = available.len(),
            jobs = dispatched.len(),
            "scan dispatched"
        );

        Ok(DispatchOutcome {
            scan_id: scan_id.clone(),
            group_id,
            jobs: dispatched.len(),
            files: request.len(),
        })
    }

    async fn record_launch(
        &self,
        tenant: &Tenant,
        scan_id: &ScanId,
        jobs: Vec<JobId>,
    ) -> Result<GroupId> {
        let now = self.clock.now();
        let group = JobGroupRecord {
            id: GroupId::new(),
            jobs,
            created_at: now,
        };
        self.services.groups.save(&group).await?;

        let file_count = u32::try_from(group.jobs.len())
            .map_err(|_| WardenError::Internal("job count overflow".into()))?;
        let record = ScanRecord::launched(scan_id.clone(), tenant.id, group.id, file_count, now);
        self.services.scans.insert(&record).await?;

        Ok(group.id)
    }

    /// Apply the abort policy to jobs already sent and hand back `err`.
    async fn abort(
        &self,
        scan_id: &ScanId,
        dispatched: &[JobId],
        err: WardenError,
    ) -> WardenError {
        if dispatched.is_empty() {
            return err;
        }

        match self.on_abort {
            AbortPolicy::Keep => {
                warn!(
                    %scan_id,
                    jobs = dispatched.len(),
                    error = %err,
                    "dispatch aborted, earlier jobs left running"
                );
            }
            AbortPolicy::Revoke => {
                warn!(
                    %scan_id,
                    jobs = dispatched.len(),
                    error = %err,
                    "dispatch aborted, revoking earlier jobs"
                );
                for job in dispatched {
                    if let Err(revoke_err) = self.services.broker.revoke(*job, true).await {
                        warn!(%scan_id, %job, error = %revoke_err, "revoke failed");
                    }
                }
            }
        }
        err
    }
}
