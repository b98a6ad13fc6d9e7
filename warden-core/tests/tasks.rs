mod support;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use serde_json::{Value, json};
use support::{Harness, caller, tenant};
use warden_core::infra::memory::{
    InMemoryGroupStore, InMemoryRemoteStorage, InMemoryResultSink, InMemoryTenantRepository,
    InProcBroker,
};
use warden_core::model::{ScanId, ScanRecord, ScanStatus, TenantId};
use warden_core::ports::{JobState, ScanRepository};
use warden_core::tasks::{SCAN, SCAN_CANCEL, SCAN_PROGRESS, SCAN_RESULT, PROBE_LIST};
use warden_core::{
    Orchestrator, OrchestratorConfig, ScanServices, SystemClock, TaskContext, TaskRegistry,
    WardenError,
};

mock! {
    Scans {}

    #[async_trait]
    impl ScanRepository for Scans {
        async fn find(
            &self,
            scan_id: &ScanId,
            tenant: TenantId,
        ) -> warden_core::Result<Option<ScanRecord>>;

        async fn insert(&self, record: &ScanRecord) -> warden_core::Result<()>;

        async fn transition(
            &self,
            scan_id: &ScanId,
            tenant: TenantId,
            from: ScanStatus,
            to: ScanStatus,
        ) -> warden_core::Result<bool>;

        async fn sum_file_counts_since(
            &self,
            tenant: TenantId,
            since: DateTime<Utc>,
        ) -> warden_core::Result<u64>;
    }
}

fn ctx() -> TaskContext {
    TaskContext::new(caller())
}

fn registry(h: &Harness) -> TaskRegistry {
    TaskRegistry::brain(&h.orchestrator)
}

#[tokio::test]
async fn registry_exposes_every_operation() {
    let h = Harness::new(0);
    let mut operations = registry(&h).operations();
    operations.sort_unstable();
    assert_eq!(
        operations,
        vec![PROBE_LIST, SCAN, SCAN_CANCEL, SCAN_PROGRESS, SCAN_RESULT]
    );
}

#[tokio::test]
async fn probe_list_hides_the_results_queue() {
    let h = Harness::new(0).with_probes(&["clamav", "comodo"]).await;
    let out = registry(&h).invoke(PROBE_LIST, &ctx(), Value::Null).await;
    assert_eq!(out, json!([0, ["clamav", "comodo"]]));
}

#[tokio::test]
async fn scan_lifecycle_over_the_wire() {
    let h = Harness::new(0).with_probes(&["clamav", "comodo"]).await;
    let tasks = registry(&h);

    let out = tasks
        .invoke(
            SCAN,
            &ctx(),
            json!({
                "scan_id": "scan-1",
                "scan_request": [["a.exe", ["clamav", "comodo"]], ["b.exe", ["clamav"]]]
            }),
        )
        .await;
    assert_eq!(out, json!([0, null]));

    let out = tasks
        .invoke(SCAN_PROGRESS, &ctx(), json!({"scan_id": "scan-1"}))
        .await;
    assert_eq!(out, json!([0, {"total": 3, "finished": 0, "successful": 0}]));

    let sent = h.broker.sent().await;
    h.broker.complete(sent[0].0, JobState::Succeeded).await;

    let out = tasks
        .invoke(SCAN_CANCEL, &ctx(), json!({"scan_id": "scan-1"}))
        .await;
    assert_eq!(out, json!([0, {"total": 3, "finished": 1, "cancelled": 2}]));

    let out = tasks
        .invoke(SCAN_CANCEL, &ctx(), json!({"scan_id": "scan-1"}))
        .await;
    assert_eq!(out, json!([1, ScanStatus::Cancelled.code()]));
}

#[tokio::test]
async fn scan_result_forwards_and_finalizes() {
    let h = Harness::new(0).with_probes(&["clamav"]).await;
    let tasks = registry(&h);
    tasks
        .invoke(
            SCAN,
            &ctx(),
            json!({"scan_id": "scan-1", "scan_request": [["a.exe", ["clamav"]]]}),
        )
        .await;
    let (job, _) = h.broker.sent().await[0].clone();
    h.broker.complete(job, JobState::Succeeded).await;

    let out = tasks
        .invoke(
            SCAN_RESULT,
            &ctx(),
            json!({
                "namespace": "acme",
                "scan_id": "scan-1",
                "filename": "a.exe",
                "probe": "clamav",
                "result": {"status": 1, "results": "Eicar-Test-Signature"}
            }),
        )
        .await;
    assert_eq!(out, json!([0, null]));
    assert_eq!(h.record("scan-1").await.unwrap().status, ScanStatus::Processed);

    let forwarded = h.sink.forwarded().await;
    assert_eq!(forwarded[0].result["results"], "Eicar-Test-Signature");

    let out = tasks
        .invoke(SCAN_PROGRESS, &ctx(), json!({"scan_id": "scan-1"}))
        .await;
    assert_eq!(out, json!([1, 30]));
}

#[tokio::test]
async fn failures_become_error_envelopes() {
    let h = Harness::new(0).with_probes(&["clamav"]).await;
    let tasks = registry(&h);

    let out = tasks
        .invoke(
            SCAN,
            &ctx(),
            json!({"scan_id": "scan-1", "scan_request": [["a.exe", ["zzz"]]]}),
        )
        .await;
    assert_eq!(out, json!([-1, "Unknown probe zzz"]));

    let out = tasks
        .invoke(SCAN_PROGRESS, &ctx(), json!({"scan_id": "never"}))
        .await;
    assert_eq!(out, json!([1, 0]));

    let stranger = TaskContext::new(warden_core::model::BrokerIdentity::new("stranger"));
    let out = tasks
        .invoke(SCAN_PROGRESS, &stranger, json!({"scan_id": "scan-1"}))
        .await;
    assert_eq!(out[0], -1);

    let out = tasks.invoke(SCAN_PROGRESS, &ctx(), json!({"id": 3})).await;
    assert_eq!(out[0], -1);
    assert!(out[1].as_str().unwrap().starts_with("Serialization error"));
}

#[tokio::test]
async fn store_outage_is_reported_with_its_cause() {
    let mut scans = MockScans::new();
    scans
        .expect_find()
        .returning(|_, _| Err(WardenError::StoreUnavailable("connection refused".into())));

    let broker = Arc::new(InProcBroker::default());
    let services = ScanServices {
        tenants: Arc::new(InMemoryTenantRepository::with_tenants([tenant(0)])),
        scans: Arc::new(scans),
        groups: Arc::new(InMemoryGroupStore::default()),
        broker: broker.clone(),
        sink: Arc::new(InMemoryResultSink::default()),
        storage: Arc::new(InMemoryRemoteStorage::default()),
    };
    let orchestrator = Orchestrator::new(
        services,
        broker,
        &OrchestratorConfig::default(),
        Arc::new(SystemClock),
    );
    let tasks = TaskRegistry::brain(&orchestrator);

    for operation in [SCAN_PROGRESS, SCAN_CANCEL] {
        let out = tasks
            .invoke(operation, &ctx(), json!({"scan_id": "scan-1"}))
            .await;
        assert_eq!(out, json!([-1, "Store unavailable: connection refused"]), "{operation}");
    }
}
