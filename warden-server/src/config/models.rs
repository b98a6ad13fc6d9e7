use std::{net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use warden_core::OrchestratorConfig;
use warden_model::{BrokerIdentity, Namespace, Tenant, TenantId};

/// Fully resolved service configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WardenConfig {
    pub orchestrator: OrchestratorConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub result_sink: ResultSinkConfig,
    pub storage: StorageConfig,
    pub memory: MemoryConfig,
    /// Tenants seeded at startup. Upserted into Postgres, or held in memory
    /// when running with `--in-memory`.
    pub tenants: Vec<TenantConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8740)),
            log_filter: "info,warden_core=info,tower_http=warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: "warden".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResultSinkConfig {
    /// Frontend endpoint receiving per-job results. Results are kept in
    /// memory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
        }
    }
}

/// Settings only used by the `--in-memory` mode.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Queues announced by the in-process worker.
    pub probes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TenantConfig {
    pub name: String,
    #[serde(default)]
    pub quota: u32,
    pub namespace: String,
    pub broker_identity: String,
}

impl TenantConfig {
    /// In-memory tenant; ids follow declaration order starting at 1.
    pub fn to_tenant(&self, id: i64) -> Tenant {
        Tenant {
            id: TenantId(id),
            name: self.name.clone(),
            quota: self.quota,
            namespace: Namespace::new(self.namespace.clone()),
            broker_identity: BrokerIdentity::new(self.broker_identity.clone()),
        }
    }
}
