//! Builds the orchestrator and task registry from configuration.

use std::{fmt, sync::Arc};

use anyhow::{Context, Result};
use tracing::{info, warn};
use warden_core::infra::{
    FsRemoteStorage, HttpResultSink, LogResultSink, PostgresStore, RedisBroker, RedisGroupStore,
    memory::{
        InMemoryGroupStore, InMemoryScanRepository, InMemoryTenantRepository,
        InProcBroker,
    },
    redis,
};
use warden_core::model::{BrokerIdentity, Namespace};
use warden_core::ports::ResultSink;
use warden_core::{Orchestrator, ScanServices, SystemClock, TaskRegistry};

use crate::config::WardenConfig;

/// Name under which the in-process broker announces the configured probes.
pub const LOCAL_WORKER: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Memory,
    Durable,
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Durable => f.write_str("durable"),
        }
    }
}

/// Everything the HTTP layer needs to serve tasks.
#[derive(Clone)]
pub struct Runtime {
    pub mode: StoreMode,
    pub orchestrator: Orchestrator,
    pub tasks: Arc<TaskRegistry>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("mode", &self.mode)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    fn new(mode: StoreMode, orchestrator: Orchestrator) -> Self {
        let tasks = Arc::new(TaskRegistry::brain(&orchestrator));
        Self {
            mode,
            orchestrator,
            tasks,
        }
    }
}

/// Process-local stores; state is lost on restart.
pub async fn in_memory(config: &WardenConfig) -> Result<Runtime> {
    let tenants = config
        .tenants
        .iter()
        .zip(1..)
        .map(|(tenant, id)| tenant.to_tenant(id));
    let broker = Arc::new(InProcBroker::default());
    broker
        .register_worker(
            LOCAL_WORKER,
            config
                .memory
                .probes
                .iter()
                .cloned()
                .chain([config.orchestrator.results_queue.clone()]),
        )
        .await;

    let services = ScanServices {
        tenants: Arc::new(InMemoryTenantRepository::with_tenants(tenants)),
        scans: Arc::new(InMemoryScanRepository::default()),
        groups: Arc::new(InMemoryGroupStore::default()),
        broker: broker.clone(),
        sink: result_sink(config)?,
        storage: Arc::new(FsRemoteStorage::new(config.storage.root.clone())),
    };

    info!(
        tenants = config.tenants.len(),
        probes = config.memory.probes.len(),
        "in-memory stores ready"
    );
    let orchestrator = Orchestrator::new(
        services,
        broker,
        &config.orchestrator,
        Arc::new(SystemClock),
    );
    Ok(Runtime::new(StoreMode::Memory, orchestrator))
}

/// Postgres for tenants and scans, Redis for groups and the job queues.
pub async fn durable(config: &WardenConfig) -> Result<Runtime> {
    let database_url = config
        .database
        .url
        .as_deref()
        .context("database.url (or DATABASE_URL) is required unless --in-memory is set")?;
    let redis_url = config
        .redis
        .url
        .as_deref()
        .context("redis.url (or REDIS_URL) is required unless --in-memory is set")?;

    let postgres = connect_postgres(database_url).await?;
    postgres
        .migrate()
        .await
        .context("database migration failed")?;
    for tenant in &config.tenants {
        let stored = postgres
            .upsert_tenant(
                &tenant.name,
                tenant.quota,
                &Namespace::new(tenant.namespace.clone()),
                &BrokerIdentity::new(tenant.broker_identity.clone()),
            )
            .await
            .with_context(|| format!("failed to seed tenant {}", tenant.name))?;
        info!(tenant = %stored.name, id = %stored.id, quota = stored.quota, "tenant seeded");
    }
    let postgres = Arc::new(postgres);

    let conn = redis::connect(redis_url)
        .await
        .context("failed to connect to Redis")?;
    let prefix = config.redis.key_prefix.clone();
    let broker = Arc::new(RedisBroker::new(conn.clone(), prefix.clone()));

    let services = ScanServices {
        tenants: postgres.clone(),
        scans: postgres,
        groups: Arc::new(RedisGroupStore::new(conn, prefix)),
        broker: broker.clone(),
        sink: result_sink(config)?,
        storage: Arc::new(FsRemoteStorage::new(config.storage.root.clone())),
    };

    let orchestrator = Orchestrator::new(
        services,
        broker,
        &config.orchestrator,
        Arc::new(SystemClock),
    );
    Ok(Runtime::new(StoreMode::Durable, orchestrator))
}

pub async fn connect_postgres(database_url: &str) -> Result<PostgresStore> {
    PostgresStore::connect(database_url)
        .await
        .context("failed to connect to PostgreSQL")
}

fn result_sink(config: &WardenConfig) -> Result<Arc<dyn ResultSink>> {
    match config.result_sink.url.as_deref() {
        Some(url) => {
            let sink = HttpResultSink::new(url).context("failed to build result sink client")?;
            info!(url, "forwarding job results over HTTP");
            Ok(Arc::new(sink))
        }
        None => {
            warn!("result_sink.url not set; job results are logged and dropped");
            Ok(Arc::new(LogResultSink))
        }
    }
}
