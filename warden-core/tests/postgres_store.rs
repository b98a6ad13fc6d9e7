#![cfg(feature = "database")]

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use warden_core::infra::PostgresStore;
use warden_core::lock::{Document, DocumentLock, LockMode};
use warden_core::model::{BrokerIdentity, GroupId, Namespace, ScanId, ScanRecord, ScanStatus};
use warden_core::ports::{ScanRepository, TenantRepository};
use warden_core::{LockConfig, ManualClock};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Report {
    verdict: String,
}

impl Document for Report {
    const COLLECTION: &'static str = "reports";
}

#[sqlx::test(migrator = "warden_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn scan_rows_follow_conditional_transitions(pool: PgPool) {
    let store = PostgresStore::new(pool);
    let tenant = store
        .upsert_tenant("acme", 10, &Namespace::new("acme"), &BrokerIdentity::new("mqfrontend"))
        .await
        .unwrap();
    let found = store
        .find_by_broker_identity(&BrokerIdentity::new("mqfrontend"))
        .await
        .unwrap();
    assert_eq!(found, Some(tenant.clone()));
    assert_eq!(
        store.find_by_namespace(&Namespace::new("acme")).await.unwrap(),
        Some(tenant.clone())
    );
    assert_eq!(store.find_by_namespace(&Namespace::new("other")).await.unwrap(), None);

    let now = Utc::now();
    let record = ScanRecord::launched(ScanId::new("scan-1"), tenant.id, GroupId::new(), 4, now);
    store.insert(&record).await.unwrap();

    assert!(
        store
            .transition(&record.scan_id, tenant.id, ScanStatus::Launched, ScanStatus::Processed)
            .await
            .unwrap()
    );
    assert!(
        !store
            .transition(&record.scan_id, tenant.id, ScanStatus::Launched, ScanStatus::Processed)
            .await
            .unwrap()
    );

    let stored = store.find(&record.scan_id, tenant.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScanStatus::Processed);
    assert_eq!(stored.group_id, record.group_id);

    let consumed = store
        .sum_file_counts_since(tenant.id, now - Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(consumed, 4);
}

#[sqlx::test(migrator = "warden_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn document_lock_round_trips_through_postgres(pool: PgPool) {
    let clock = ManualClock::default();
    let locks = DocumentLock::new(
        Arc::new(PostgresStore::new(pool)),
        Arc::new(clock.clone()),
        LockConfig::default(),
    );

    let holder = locks
        .create(
            Report {
                verdict: "clean".into(),
            },
            LockMode::Write,
        )
        .await
        .unwrap();

    let mut other = locks.load_transient::<Report>(holder.id()).await.unwrap();
    assert!(locks.take(&mut other, LockMode::Write).await.unwrap_err().is_lock_contention());

    clock.advance(Duration::seconds(61));
    locks.take(&mut other, LockMode::Write).await.unwrap();
    other.record_mut().verdict = "infected".into();
    locks.save(&other).await.unwrap();
    locks.release(&mut other).await.unwrap();

    let reread = locks.load::<Report>(holder.id(), LockMode::Read).await.unwrap();
    assert_eq!(reread.record().verdict, "infected");
    assert!(reread.lock().is_free());
}
