use crate::ids::{BrokerIdentity, Namespace, TenantId};

/// A tenant owning scans and quota.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Files per rolling window; `0` disables the quota.
    pub quota: u32,
    pub namespace: Namespace,
    pub broker_identity: BrokerIdentity,
}

impl Tenant {
    pub fn has_quota(&self) -> bool {
        self.quota != 0
    }
}
