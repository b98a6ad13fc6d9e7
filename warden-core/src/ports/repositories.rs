//! Tenant and scan record persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_model::{BrokerIdentity, Namespace, ScanId, ScanRecord, ScanStatus, Tenant, TenantId};

use crate::error::Result;

/// Read access to tenant rows.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_broker_identity(
        &self,
        identity: &BrokerIdentity,
    ) -> Result<Option<Tenant>>;

    /// Tenant owning a file namespace. Workers report results against the
    /// namespace bound to their job, not under the tenant's identity.
    async fn find_by_namespace(&self, namespace: &Namespace) -> Result<Option<Tenant>>;
}

/// Persistence of scan records.
#[async_trait]
pub trait ScanRepository: Send + Sync {
    async fn find(
        &self,
        scan_id: &ScanId,
        tenant: TenantId,
    ) -> Result<Option<ScanRecord>>;

    async fn insert(&self, record: &ScanRecord) -> Result<()>;

    /// Move a scan from `from` to `to` only if it is currently in `from`.
    ///
    /// Returns `false` when the scan is missing or in another state.
    /// Implementations reject edges the lifecycle does not allow with
    /// `WardenError::InvalidTransition`.
    async fn transition(
        &self,
        scan_id: &ScanId,
        tenant: TenantId,
        from: ScanStatus,
        to: ScanStatus,
    ) -> Result<bool>;

    /// Total file count of the tenant's scans created at or after `since`.
    async fn sum_file_counts_since(
        &self,
        tenant: TenantId,
        since: DateTime<Utc>,
    ) -> Result<u64>;
}
