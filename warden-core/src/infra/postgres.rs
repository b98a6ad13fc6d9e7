//! Postgres-backed tenant and scan repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;
use warden_model::{
    BrokerIdentity, DocumentId, GroupId, Namespace, ScanId, ScanRecord, ScanStatus, Tenant,
    TenantId,
};

use crate::error::{Result, WardenError};
use crate::lock::{LockFields, LockState};
use crate::ports::{DocumentStore, ScanRepository, StoredDocument, TenantRepository};

/// Postgres-backed tenant, scan and document storage.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self::new(PgPool::connect(url).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        crate::MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| WardenError::StoreUnavailable(format!("migration failed: {e}")))
    }

    /// Insert or update a tenant keyed by broker identity and return it with
    /// its row id.
    pub async fn upsert_tenant(
        &self,
        name: &str,
        quota: u32,
        namespace: &Namespace,
        broker_identity: &BrokerIdentity,
    ) -> Result<Tenant> {
        let row = sqlx::query(
            r#"
            INSERT INTO tenants (name, quota, namespace, broker_identity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (broker_identity) DO UPDATE
                SET name = EXCLUDED.name,
                    quota = EXCLUDED.quota,
                    namespace = EXCLUDED.namespace
            RETURNING id, name, quota, namespace, broker_identity
            "#,
        )
        .bind(name)
        .bind(i32::try_from(quota).unwrap_or(i32::MAX))
        .bind(namespace.as_str())
        .bind(broker_identity.as_str())
        .fetch_one(&self.pool)
        .await?;

        Self::map_tenant(&row)
    }

    fn map_tenant(row: &PgRow) -> Result<Tenant> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| WardenError::Internal(format!("Failed to read tenant id: {e}")))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| WardenError::Internal(format!("Failed to read tenant name: {e}")))?;
        let quota: i32 = row
            .try_get("quota")
            .map_err(|e| WardenError::Internal(format!("Failed to read quota: {e}")))?;
        let namespace: String = row
            .try_get("namespace")
            .map_err(|e| WardenError::Internal(format!("Failed to read namespace: {e}")))?;
        let broker_identity: String = row
            .try_get("broker_identity")
            .map_err(|e| WardenError::Internal(format!("Failed to read broker identity: {e}")))?;

        Ok(Tenant {
            id: TenantId(id),
            name,
            quota: u32::try_from(quota).unwrap_or(0),
            namespace: Namespace::new(namespace),
            broker_identity: BrokerIdentity::new(broker_identity),
        })
    }

    fn map_scan(row: &PgRow) -> Result<ScanRecord> {
        let scan_id: String = row
            .try_get("scan_id")
            .map_err(|e| WardenError::Internal(format!("Failed to read scan id: {e}")))?;
        let tenant_id: i64 = row
            .try_get("tenant_id")
            .map_err(|e| WardenError::Internal(format!("Failed to read tenant id: {e}")))?;
        let group_id: Option<Uuid> = row
            .try_get("group_id")
            .map_err(|e| WardenError::Internal(format!("Failed to read group id: {e}")))?;
        let file_count: i32 = row
            .try_get("file_count")
            .map_err(|e| WardenError::Internal(format!("Failed to read file count: {e}")))?;
        let status: i32 = row
            .try_get("status")
            .map_err(|e| WardenError::Internal(format!("Failed to read status: {e}")))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| WardenError::Internal(format!("Failed to read created_at: {e}")))?;

        let status = u16::try_from(status)
            .map_err(|_| WardenError::Internal(format!("status {status} out of range")))?;

        Ok(ScanRecord {
            scan_id: ScanId::new(scan_id),
            tenant_id: TenantId(tenant_id),
            group_id: group_id.map(GroupId),
            file_count: u32::try_from(file_count).unwrap_or(0),
            status: ScanStatus::from_code(status)?,
            created_at,
        })
    }

    fn map_document(collection: &str, id: DocumentId, row: &PgRow) -> Result<StoredDocument> {
        let body: Value = row
            .try_get("body")
            .map_err(|e| WardenError::Internal(format!("Failed to read body: {e}")))?;
        let lock_state: String = row
            .try_get("lock_state")
            .map_err(|e| WardenError::Internal(format!("Failed to read lock state: {e}")))?;
        let lock_time: DateTime<Utc> = row
            .try_get("lock_time")
            .map_err(|e| WardenError::Internal(format!("Failed to read lock time: {e}")))?;

        Ok(StoredDocument {
            collection: collection.to_string(),
            id,
            body,
            lock: LockFields {
                state: lock_state.parse::<LockState>()?,
                lock_time,
            },
        })
    }
}

#[async_trait]
impl TenantRepository for PostgresStore {
    async fn find_by_broker_identity(&self, identity: &BrokerIdentity) -> Result<Option<Tenant>> {
        let row = sqlx::query(
            "SELECT id, name, quota, namespace, broker_identity FROM tenants WHERE broker_identity = $1",
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_tenant).transpose()
    }

    async fn find_by_namespace(&self, namespace: &Namespace) -> Result<Option<Tenant>> {
        let row = sqlx::query(
            "SELECT id, name, quota, namespace, broker_identity FROM tenants WHERE namespace = $1",
        )
        .bind(namespace.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_tenant).transpose()
    }
}

#[async_trait]
impl ScanRepository for PostgresStore {
    async fn find(&self, scan_id: &ScanId, tenant: TenantId) -> Result<Option<ScanRecord>> {
        let row = sqlx::query(
            r#"
            SELECT scan_id, tenant_id, group_id, file_count, status, created_at
            FROM scans
            WHERE scan_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(scan_id.as_str())
        .bind(tenant.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_scan).transpose()
    }

    async fn insert(&self, record: &ScanRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scans (scan_id, tenant_id, group_id, file_count, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.scan_id.as_str())
        .bind(record.tenant_id.0)
        .bind(record.group_id.map(|g| g.to_uuid()))
        .bind(i32::try_from(record.file_count).unwrap_or(i32::MAX))
        .bind(i32::from(record.status.code()))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
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

        let result = sqlx::query(
            "UPDATE scans SET status = $4 WHERE scan_id = $1 AND tenant_id = $2 AND status = $3",
        )
        .bind(scan_id.as_str())
        .bind(tenant.0)
        .bind(i32::from(from.code()))
        .bind(i32::from(to.code()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn sum_file_counts_since(&self, tenant: TenantId, since: DateTime<Utc>) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(file_count), 0)::BIGINT AS consumed FROM scans WHERE tenant_id = $1 AND created_at >= $2",
        )
        .bind(tenant.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let consumed: i64 = row
            .try_get("consumed")
            .map_err(|e| WardenError::Internal(format!("Failed to read consumed quota: {e}")))?;
        Ok(u64::try_from(consumed).unwrap_or(0))
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn load(&self, collection: &str, id: DocumentId) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT body, lock_state, lock_time FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id.to_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(|row| Self::map_document(collection, id, row))
            .transpose()
    }

    async fn insert(&self, document: &StoredDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, lock_state, lock_time)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&document.collection)
        .bind(document.id.to_uuid())
        .bind(&document.body)
        .bind(document.lock.state.as_str())
        .bind(document.lock.lock_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_body(&self, collection: &str, id: DocumentId, body: &Value) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET body = $3 WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id.to_uuid())
            .bind(body)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(WardenError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_lock(&self, collection: &str, id: DocumentId, lock: LockFields) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET lock_state = $3, lock_time = $4 WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id.to_uuid())
        .bind(lock.state.as_str())
        .bind(lock.lock_time)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(WardenError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn remove(&self, collection: &str, id: DocumentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id.to_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
