//! Warden core library
//!
//! Control plane of a distributed malware scanning service: fans scan
//! requests out to probe queues, tracks group completion, enforces tenant
//! quota, cancels scans and finalizes them once every job is done. Also
//! provides the cooperative document lock used to guard shared records.
//!
//! ## Layout
//!
//! - `orchestration`: dispatcher, controller, aggregator and their helpers
//! - `lock`: timeout-reclaimable document locking
//! - `ports`: interfaces to the broker and the stores
//! - `infra`: in-memory, Postgres, Redis, HTTP and filesystem adapters
//! - `tasks`: the named operations exposed to callers

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod clock;
pub mod config;
pub mod error;
pub mod infra;
pub mod lock;
pub mod orchestration;
pub mod ports;
pub mod tasks;

pub use warden_model as model;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AbortPolicy, LockConfig, OrchestratorConfig};
pub use error::{Result, WardenError};
pub use orchestration::{Orchestrator, ScanServices};
pub use tasks::{TaskContext, TaskRegistry};

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
