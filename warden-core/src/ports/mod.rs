//! Narrow interfaces to the collaborators the orchestrator consumes: broker,
//! relational store, group store, document store, result sink and remote
//! storage.

pub mod broker;
pub mod collaborators;
pub mod documents;
pub mod groups;
pub mod repositories;

pub use broker::{BrokerInspector, CallbackBinding, JobBroker, JobSpec, JobState, WorkerQueues};
pub use collaborators::{ForwardedResult, RemoteStorage, ResultSink};
pub use documents::{DocumentStore, StoredDocument};
pub use groups::{GroupStore, JobGroupRecord};
pub use repositories::{ScanRepository, TenantRepository};
