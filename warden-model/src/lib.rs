//! Core data model definitions shared across Warden crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod envelope;
pub mod error;
pub mod ids;
pub mod scan;
pub mod status;
pub mod tenant;

pub use envelope::{ReturnCode, TaskReturn};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{
    BrokerIdentity, DocumentId, GroupId, JobId, Namespace, ScanId, TenantId,
};
pub use scan::{CancelSummary, FileRequest, ScanProgress, ScanRecord, ScanRequest};
pub use status::ScanStatus;
pub use tenant::Tenant;
