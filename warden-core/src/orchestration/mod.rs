//! Scan orchestration: dispatch, progress, cancel and result aggregation.
//!
//! Every entry point is an independent unit of work. Ordering between them
//! is established only through conditional status transitions on the scan
//! record, never through in-process locks.

pub mod aggregator;
pub mod controller;
pub mod dispatcher;
pub mod group;
pub mod probes;
pub mod quota;

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};
use warden_model::{BrokerIdentity, Namespace, ScanRecord, ScanStatus, Tenant};

use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::error::{Result, WardenError};
use crate::ports::{
    BrokerInspector, GroupStore, JobBroker, RemoteStorage, ResultSink, ScanRepository,
    TenantRepository,
};

pub use aggregator::{Completion, JobResult, ResultAggregator};
pub use controller::{ControlOutcome, ScanController};
pub use dispatcher::{DispatchOutcome, ScanDispatcher};
pub use group::JobGroup;
pub use probes::ProbeRegistry;
pub use quota::{Quota, QuotaTracker};

/// Collaborators shared by the dispatcher, controller and aggregator.
#[derive(Clone)]
pub struct ScanServices {
    pub tenants: Arc<dyn TenantRepository>,
    pub scans: Arc<dyn ScanRepository>,
    pub groups: Arc<dyn GroupStore>,
    pub broker: Arc<dyn JobBroker>,
    pub sink: Arc<dyn ResultSink>,
    pub storage: Arc<dyn RemoteStorage>,
}

impl fmt::Debug for ScanServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanServices").finish_non_exhaustive()
    }
}

impl ScanServices {
    pub async fn resolve_tenant(&self, caller: &BrokerIdentity) -> Result<Tenant> {
        self.tenants
            .find_by_broker_identity(caller)
            .await?
            .ok_or_else(|| WardenError::TenantNotFound(caller.to_string()))
    }

    pub async fn resolve_namespace(&self, namespace: &Namespace) -> Result<Tenant> {
        self.tenants
            .find_by_namespace(namespace)
            .await?
            .ok_or_else(|| WardenError::NamespaceNotFound(namespace.to_string()))
    }

    /// Load the job group a launched scan points at.
    pub async fn restore_group(&self, record: &ScanRecord) -> Result<JobGroup> {
        let group_id = record
            .group_id
            .ok_or_else(|| WardenError::GroupIdMissing(record.scan_id.to_string()))?;
        let stored = self
            .groups
            .restore(group_id)
            .await?
            .ok_or_else(|| WardenError::GroupNotFound(group_id.to_string()))?;
        Ok(JobGroup::new(stored, self.broker.clone()))
    }

    /// Move a scan whose jobs are all ready from `launched` to `processed`,
    /// then drop its group and flush its files.
    ///
    /// Returns `false` when the scan had already left `launched`. Cleanup
    /// failures after a won transition are logged only: the scan is no
    /// longer launched, so no later call would retry them.
    pub async fn finalize(
        &self,
        tenant: &Tenant,
        record: &ScanRecord,
        group: &JobGroup,
    ) -> Result<bool> {
        let scan_id = &record.scan_id;
        let won = self
            .scans
            .transition(scan_id, tenant.id, ScanStatus::Launched, ScanStatus::Processed)
            .await?;
        if !won {
            return Ok(false);
        }

        if let Err(err) = self.groups.delete(group.id()).await {
            error!(%scan_id, group_id = %group.id(), error = %err, "group delete failed");
        }
        if let Err(err) = self.storage.flush(&tenant.namespace, scan_id).await {
            error!(%scan_id, namespace = %tenant.namespace, error = %err, "flush failed");
        }
        info!(%scan_id, jobs = group.len(), "scan complete, files flushed");
        Ok(true)
    }
}

/// The assembled control plane: one dispatcher, controller and aggregator
/// over a shared set of collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    probes: Arc<ProbeRegistry>,
    dispatcher: Arc<ScanDispatcher>,
    controller: ScanController,
    aggregator: ResultAggregator,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        services: ScanServices,
        inspector: Arc<dyn BrokerInspector>,
        config: &OrchestratorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let probes = Arc::new(ProbeRegistry::new(
            inspector,
            clock.clone(),
            config.probe_cache_ttl(),
            config.results_queue.clone(),
        ));
        let quota = QuotaTracker::new(services.scans.clone(), clock.clone(), config.quota_window());
        let dispatcher = Arc::new(ScanDispatcher::new(
            services.clone(),
            probes.clone(),
            quota,
            clock,
            config.on_abort,
        ));

        Self {
            probes,
            dispatcher,
            controller: ScanController::new(services.clone()),
            aggregator: ResultAggregator::new(services),
        }
    }

    pub fn probes(&self) -> &ProbeRegistry {
        &self.probes
    }

    pub fn dispatcher(&self) -> &ScanDispatcher {
        &self.dispatcher
    }

    pub fn controller(&self) -> &ScanController {
        &self.controller
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }
}
