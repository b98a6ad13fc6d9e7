//! Result sink for deployments without a downstream consumer.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::ports::{ForwardedResult, ResultSink};

/// Logs each result at debug level and drops it. Holds no state, so a
/// long-running server without a frontend does not accumulate results.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogResultSink;

#[async_trait]
impl ResultSink for LogResultSink {
    async fn forward(&self, result: &ForwardedResult) -> Result<()> {
        debug!(
            scan_id = %result.scan_id,
            filename = %result.filename,
            probe = %result.probe,
            "no result sink configured; result dropped"
        );
        Ok(())
    }
}
