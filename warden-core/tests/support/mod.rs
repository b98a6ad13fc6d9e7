#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use warden_core::infra::memory::{
    InMemoryGroupStore, InMemoryRemoteStorage, InMemoryResultSink, InMemoryScanRepository,
    InMemoryTenantRepository, InProcBroker,
};
use warden_core::model::{
    BrokerIdentity, FileRequest, GroupId, Namespace, ScanId, ScanRecord, ScanRequest, ScanStatus,
    Tenant, TenantId,
};
use warden_core::orchestration::DispatchOutcome;
use warden_core::ports::ScanRepository;
use warden_core::{Clock, ManualClock, Orchestrator, OrchestratorConfig, ScanServices};

pub const CALLER: &str = "mqfrontend";
pub const TENANT_ID: TenantId = TenantId(1);

pub fn caller() -> BrokerIdentity {
    BrokerIdentity::new(CALLER)
}

pub fn tenant(quota: u32) -> Tenant {
    Tenant {
        id: TENANT_ID,
        name: "acme".into(),
        quota,
        namespace: Namespace::new("acme"),
        broker_identity: caller(),
    }
}

pub fn file(name: &str, probes: &[&str]) -> FileRequest {
    FileRequest::new(name, probes.iter().copied())
}

pub fn request(files: impl IntoIterator<Item = FileRequest>) -> ScanRequest {
    files.into_iter().collect()
}

/// Orchestrator wired to in-memory collaborators the test can inspect.
pub struct Harness {
    pub tenants: Arc<InMemoryTenantRepository>,
    pub scans: Arc<InMemoryScanRepository>,
    pub groups: Arc<InMemoryGroupStore>,
    pub broker: Arc<InProcBroker>,
    pub sink: Arc<InMemoryResultSink>,
    pub storage: Arc<InMemoryRemoteStorage>,
    pub clock: ManualClock,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(quota: u32) -> Self {
        Self::with_config(quota, OrchestratorConfig::default())
    }

    pub fn with_config(quota: u32, config: OrchestratorConfig) -> Self {
        let tenants = Arc::new(InMemoryTenantRepository::with_tenants([tenant(quota)]));
        let scans = Arc::new(InMemoryScanRepository::default());
        let groups = Arc::new(InMemoryGroupStore::default());
        let broker = Arc::new(InProcBroker::default());
        let sink = Arc::new(InMemoryResultSink::default());
        let storage = Arc::new(InMemoryRemoteStorage::default());
        let clock = ManualClock::default();

        let services = ScanServices {
            tenants: tenants.clone(),
            scans: scans.clone(),
            groups: groups.clone(),
            broker: broker.clone(),
            sink: sink.clone(),
            storage: storage.clone(),
        };
        let orchestrator =
            Orchestrator::new(services, broker.clone(), &config, Arc::new(clock.clone()));

        Self {
            tenants,
            scans,
            groups,
            broker,
            sink,
            storage,
            clock,
            orchestrator,
        }
    }

    /// Bring up one worker serving `probes` plus the results queue.
    pub async fn with_probes(self, probes: &[&str]) -> Self {
        let mut queues: Vec<&str> = probes.to_vec();
        queues.push("brain");
        self.broker.register_worker("probe-host", queues).await;
        self
    }

    /// Record an earlier scan of `files` jobs, an hour old.
    pub async fn consume_quota(&self, files: u32) {
        let record = ScanRecord {
            scan_id: ScanId::new(format!("earlier-{files}")),
            tenant_id: TENANT_ID,
            group_id: Some(GroupId::new()),
            file_count: files,
            status: ScanStatus::Processed,
            created_at: self.clock.now() - Duration::hours(1),
        };
        self.scans.insert(&record).await.unwrap();
    }

    pub async fn dispatch(
        &self,
        scan_id: &str,
        request: &ScanRequest,
    ) -> warden_core::Result<DispatchOutcome> {
        self.orchestrator
            .dispatcher()
            .dispatch(&caller(), &ScanId::new(scan_id), request)
            .await
    }

    pub async fn launch(&self, scan_id: &str, request: &ScanRequest) -> DispatchOutcome {
        let outcome = self.dispatch(scan_id, request).await.unwrap();
        assert!(outcome.launched(), "nothing dispatched for {scan_id}");
        outcome
    }

    pub async fn record(&self, scan_id: &str) -> Option<ScanRecord> {
        self.scans
            .find(&ScanId::new(scan_id), TENANT_ID)
            .await
            .unwrap()
    }
}
