//! In-process implementations of every port.
//!
//! Used by tests and by the server's `--in-memory` mode. State lives behind
//! `tokio::sync::Mutex` and is lost with the process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use warden_model::{
    BrokerIdentity, DocumentId, GroupId, JobId, Namespace, ScanId, ScanRecord, ScanStatus,
    Tenant, TenantId,
};

use crate::error::{Result, WardenError};
use crate::lock::LockFields;
use crate::ports::{
    BrokerInspector, DocumentStore, ForwardedResult, GroupStore, JobBroker, JobGroupRecord,
    JobSpec, JobState, RemoteStorage, ResultSink, ScanRepository, StoredDocument,
    TenantRepository, WorkerQueues,
};

#[derive(Debug, Default)]
pub struct InMemoryTenantRepository {
    tenants: Mutex<Vec<Tenant>>,
}

impl InMemoryTenantRepository {
    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        Self {
            tenants: Mutex::new(tenants.into_iter().collect()),
        }
    }

    pub async fn insert(&self, tenant: Tenant) {
        let mut tenants = self.tenants.lock().await;
        tenants.retain(|t| t.id != tenant.id);
        tenants.push(tenant);
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_broker_identity(&self, identity: &BrokerIdentity) -> Result<Option<Tenant>> {
        let tenants = self.tenants.lock().await;
        Ok(tenants
            .iter()
            .find(|t| &t.broker_identity == identity)
            .cloned())
    }

    async fn find_by_namespace(&self, namespace: &Namespace) -> Result<Option<Tenant>> {
        let tenants = self.tenants.lock().await;
        Ok(tenants.iter().find(|t| &t.namespace == namespace).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryScanRepository {
    scans: Mutex<HashMap<(TenantId, ScanId), ScanRecord>>,
}

impl InMemoryScanRepository {
    pub async fn all(&self) -> Vec<ScanRecord> {
        self.scans.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl ScanRepository for InMemoryScanRepository {
    async fn find(&self, scan_id: &ScanId, tenant: TenantId) -> Result<Option<ScanRecord>> {
        let scans = self.scans.lock().await;
        Ok(scans.get(&(tenant, scan_id.clone())).cloned())
    }

    async fn insert(&self, record: &ScanRecord) -> Result<()> {
        let mut scans = self.scans.lock().await;
        let key = (record.tenant_id, record.scan_id.clone());
        if scans.contains_key(&key) {
            return Err(WardenError::Internal(format!(
                "scan {} already recorded",
                record.scan_id
            )));
        }
        scans.insert(key, record.clone());
        Ok(())
    }

    async fn transition(
        &self,
        scan_id: &ScanId,
        tenant: TenantId,
        from: ScanStatus,
        to: ScanStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(WardenError::InvalidTransition { from, to });
        }
        let mut scans = self.scans.lock().await;
        match scans.get_mut(&(tenant, scan_id.clone())) {
            Some(record) if record.status == from => {
                record.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sum_file_counts_since(&self, tenant: TenantId, since: DateTime<Utc>) -> Result<u64> {
        let scans = self.scans.lock().await;
        Ok(scans
            .values()
            .filter(|r| r.tenant_id == tenant && r.created_at >= since)
            .map(|r| u64::from(r.file_count))
            .sum())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGroupStore {
    groups: Mutex<HashMap<GroupId, JobGroupRecord>>,
}

impl InMemoryGroupStore {
    pub async fn len(&self) -> usize {
        self.groups.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.groups.lock().await.is_empty()
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn save(&self, group: &JobGroupRecord) -> Result<()> {
        self.groups.lock().await.insert(group.id, group.clone());
        Ok(())
    }

    async fn restore(&self, id: GroupId) -> Result<Option<JobGroupRecord>> {
        Ok(self.groups.lock().await.get(&id).cloned())
    }

    async fn delete(&self, id: GroupId) -> Result<bool> {
        Ok(self.groups.lock().await.remove(&id).is_some())
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    workers: Vec<WorkerQueues>,
    jobs: HashMap<JobId, (JobSpec, JobState)>,
    sent: Vec<JobId>,
    revoked: Vec<(JobId, bool)>,
}

/// Broker double: records sent jobs and lets tests drive their completion.
#[derive(Debug, Default)]
pub struct InProcBroker {
    state: Mutex<BrokerState>,
}

impl InProcBroker {
    /// Declare a worker consuming `queues`, replacing any earlier declaration.
    pub async fn register_worker<I, S>(&self, worker: &str, queues: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock().await;
        state.workers.retain(|w| w.worker != worker);
        state.workers.push(WorkerQueues {
            worker: worker.to_string(),
            queues: queues.into_iter().map(Into::into).collect(),
        });
    }

    pub async fn unregister_worker(&self, worker: &str) {
        self.state.lock().await.workers.retain(|w| w.worker != worker);
    }

    pub async fn complete(&self, job: JobId, outcome: JobState) {
        if let Some((_, state)) = self.state.lock().await.jobs.get_mut(&job) {
            *state = outcome;
        }
    }

    /// Sent jobs in dispatch order.
    pub async fn sent(&self) -> Vec<(JobId, JobSpec)> {
        let state = self.state.lock().await;
        state
            .sent
            .iter()
            .filter_map(|id| state.jobs.get(id).map(|(spec, _)| (*id, spec.clone())))
            .collect()
    }

    pub async fn revoked(&self) -> Vec<(JobId, bool)> {
        self.state.lock().await.revoked.clone()
    }
}

#[async_trait]
impl JobBroker for InProcBroker {
    async fn send_job(&self, spec: JobSpec) -> Result<JobId> {
        let id = JobId::new();
        let mut state = self.state.lock().await;
        state.jobs.insert(id, (spec, JobState::Pending));
        state.sent.push(id);
        Ok(id)
    }

    async fn job_states(&self, jobs: &[JobId]) -> Result<Vec<JobState>> {
        let state = self.state.lock().await;
        Ok(jobs
            .iter()
            .map(|id| state.jobs.get(id).map_or(JobState::Pending, |(_, s)| *s))
            .collect())
    }

    async fn revoke(&self, job: JobId, terminate: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.revoked.push((job, terminate));
        if let Some((_, current)) = state.jobs.get_mut(&job)
            && !current.is_ready()
        {
            *current = JobState::Revoked;
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerInspector for InProcBroker {
    async fn active_queues(&self) -> Result<Vec<WorkerQueues>> {
        Ok(self.state.lock().await.workers.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryResultSink {
    forwarded: Mutex<Vec<ForwardedResult>>,
}

impl InMemoryResultSink {
    pub async fn forwarded(&self) -> Vec<ForwardedResult> {
        self.forwarded.lock().await.clone()
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn forward(&self, result: &ForwardedResult) -> Result<()> {
        self.forwarded.lock().await.push(result.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRemoteStorage {
    flushed: Mutex<Vec<(Namespace, ScanId)>>,
}

impl InMemoryRemoteStorage {
    pub async fn flushed(&self) -> Vec<(Namespace, ScanId)> {
        self.flushed.lock().await.clone()
    }
}

#[async_trait]
impl RemoteStorage for InMemoryRemoteStorage {
    async fn flush(&self, namespace: &Namespace, scan_id: &ScanId) -> Result<()> {
        self.flushed
            .lock()
            .await
            .push((namespace.clone(), scan_id.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<(String, DocumentId), StoredDocument>>,
}

impl InMemoryDocumentStore {
    fn missing(collection: &str, id: DocumentId) -> WardenError {
        WardenError::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load(&self, collection: &str, id: DocumentId) -> Result<Option<StoredDocument>> {
        let documents = self.documents.lock().await;
        Ok(documents.get(&(collection.to_string(), id)).cloned())
    }

    async fn insert(&self, document: &StoredDocument) -> Result<()> {
        let mut documents = self.documents.lock().await;
        let key = (document.collection.clone(), document.id);
        if documents.contains_key(&key) {
            return Err(WardenError::Internal(format!(
                "document {} n{} already exists",
                document.collection, document.id
            )));
        }
        documents.insert(key, document.clone());
        Ok(())
    }

    async fn update_body(&self, collection: &str, id: DocumentId, body: &Value) -> Result<()> {
        let mut documents = self.documents.lock().await;
        let document = documents
            .get_mut(&(collection.to_string(), id))
            .ok_or_else(|| Self::missing(collection, id))?;
        document.body = body.clone();
        Ok(())
    }

    async fn update_lock(&self, collection: &str, id: DocumentId, lock: LockFields) -> Result<()> {
        let mut documents = self.documents.lock().await;
        let document = documents
            .get_mut(&(collection.to_string(), id))
            .ok_or_else(|| Self::missing(collection, id))?;
        document.lock = lock;
        Ok(())
    }

    async fn remove(&self, collection: &str, id: DocumentId) -> Result<bool> {
        let mut documents = self.documents.lock().await;
        Ok(documents.remove(&(collection.to_string(), id)).is_some())
    }
}
