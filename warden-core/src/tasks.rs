//! Named task handlers callable by the broker-facing boundary.
//!
//! The registry is built once at start-up and maps each operation name to a
//! handler. `TaskRegistry::invoke` never fails: unknown names, handler
//! errors and handler panics all come back as an error envelope.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};
use warden_model::{BrokerIdentity, ScanId, ScanRequest, TaskReturn};

use crate::error::{Result, WardenError};
use crate::orchestration::{JobResult, Orchestrator};

/// Lists probes with at least one live worker.
pub const PROBE_LIST: &str = "brain.probe_list";
/// Launches a scan.
pub const SCAN: &str = "brain.scan";
/// Reports group progress.
pub const SCAN_PROGRESS: &str = "brain.scan_progress";
/// Cancels pending jobs.
pub const SCAN_CANCEL: &str = "brain.scan_cancel";
/// Worker callback for one finished job.
pub const SCAN_RESULT: &str = "brain.scan_result";

/// Who issued the call, as authenticated by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskContext {
    pub caller: BrokerIdentity,
}

impl TaskContext {
    pub fn new(caller: BrokerIdentity) -> Self {
        Self { caller }
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: &TaskContext, args: Value) -> Result<TaskReturn<Value>>;
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: BTreeMap<&'static str, Arc<dyn TaskHandler>>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("operations", &self.operations())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the scan operations bound to `orchestrator`.
    pub fn brain(orchestrator: &Orchestrator) -> Self {
        let mut registry = Self::new();
        registry.register(PROBE_LIST, ProbeListTask(orchestrator.clone()));
        registry.register(SCAN, ScanTask(orchestrator.clone()));
        registry.register(SCAN_PROGRESS, ScanProgressTask(orchestrator.clone()));
        registry.register(SCAN_CANCEL, ScanCancelTask(orchestrator.clone()));
        registry.register(SCAN_RESULT, ScanResultTask(orchestrator.clone()));
        registry
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: &'static str, handler: impl TaskHandler + 'static) {
        self.handlers.insert(name, Arc::new(handler));
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run the named task and return its `[code, payload]` envelope.
    pub async fn invoke(&self, name: &str, ctx: &TaskContext, args: Value) -> Value {
        let Some(handler) = self.handlers.get(name) else {
            warn!(operation = name, "unknown operation");
            return envelope(TaskReturn::<Value>::error(format!("Unknown operation {name}")));
        };

        let outcome = AssertUnwindSafe(handler.handle(ctx, args))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(ret)) => envelope(ret),
            Ok(Err(err)) => {
                warn!(operation = name, caller = %ctx.caller, error = %err, "task failed");
                envelope(TaskReturn::<Value>::error(err.to_string()))
            }
            Err(_) => {
                error!(operation = name, caller = %ctx.caller, "task panicked");
                envelope(TaskReturn::<Value>::error(format!("Task {name} panicked")))
            }
        }
    }
}

fn envelope(ret: TaskReturn<Value>) -> Value {
    match serde_json::to_value(&ret) {
        Ok(value) => value,
        Err(err) => json!([-1, err.to_string()]),
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(WardenError::from)
}

fn payload<T: Serialize>(ret: TaskReturn<T>) -> Result<TaskReturn<Value>> {
    Ok(match ret {
        TaskReturn::Success(body) => TaskReturn::Success(serde_json::to_value(body)?),
        TaskReturn::Warning(status) => TaskReturn::Warning(status),
        TaskReturn::Error(message) => TaskReturn::Error(message),
    })
}

#[derive(Debug, Deserialize)]
struct ScanArgs {
    scan_id: ScanId,
    scan_request: ScanRequest,
}

#[derive(Debug, Deserialize)]
struct ScanIdArgs {
    scan_id: ScanId,
}

struct ProbeListTask(Orchestrator);

#[async_trait]
impl TaskHandler for ProbeListTask {
    async fn handle(&self, _ctx: &TaskContext, _args: Value) -> Result<TaskReturn<Value>> {
        let probes = self.0.probes().available_probes().await?;
        payload(TaskReturn::success(probes))
    }
}

struct ScanTask(Orchestrator);

#[async_trait]
impl TaskHandler for ScanTask {
    async fn handle(&self, ctx: &TaskContext, args: Value) -> Result<TaskReturn<Value>> {
        let args: ScanArgs = parse_args(args)?;
        self.0
            .dispatcher()
            .dispatch(&ctx.caller, &args.scan_id, &args.scan_request)
            .await?;
        Ok(TaskReturn::success(Value::Null))
    }
}

struct ScanProgressTask(Orchestrator);

#[async_trait]
impl TaskHandler for ScanProgressTask {
    async fn handle(&self, ctx: &TaskContext, args: Value) -> Result<TaskReturn<Value>> {
        let args: ScanIdArgs = parse_args(args)?;
        let outcome = self.0.controller().progress(&ctx.caller, &args.scan_id).await?;
        payload(outcome.into())
    }
}

struct ScanCancelTask(Orchestrator);

#[async_trait]
impl TaskHandler for ScanCancelTask {
    async fn handle(&self, ctx: &TaskContext, args: Value) -> Result<TaskReturn<Value>> {
        let args: ScanIdArgs = parse_args(args)?;
        let outcome = self.0.controller().cancel(&ctx.caller, &args.scan_id).await?;
        payload(outcome.into())
    }
}

struct ScanResultTask(Orchestrator);

#[async_trait]
impl TaskHandler for ScanResultTask {
    async fn handle(&self, ctx: &TaskContext, args: Value) -> Result<TaskReturn<Value>> {
        let result: JobResult = parse_args(args)?;
        self.0.aggregator().on_job_result(&ctx.caller, result).await?;
        Ok(TaskReturn::success(Value::Null))
    }
}
