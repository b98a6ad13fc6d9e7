//! Result delivery and file storage seams.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_model::{Namespace, ScanId};

use crate::error::Result;

/// Individual probe result as handed to the downstream consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForwardedResult {
    pub scan_id: ScanId,
    pub filename: String,
    pub probe: String,
    pub result: Value,
}

/// Downstream consumer of per-job results (the frontend).
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn forward(&self, result: &ForwardedResult) -> Result<()>;
}

/// Remote file storage holding the uploaded samples of a scan.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Recursively delete the files of `scan_id` under `namespace`,
    /// including the scan directory itself. Missing paths are not an error.
    async fn flush(&self, namespace: &Namespace, scan_id: &ScanId) -> Result<()>;
}
