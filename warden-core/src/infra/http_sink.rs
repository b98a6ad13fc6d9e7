//! Result sink that posts results to the frontend over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, WardenError};
use crate::ports::{ForwardedResult, ResultSink};

/// Posts each job result as JSON to the frontend's result endpoint.
#[derive(Debug, Clone)]
pub struct HttpResultSink {
    client: reqwest::Client,
    url: String,
}

impl HttpResultSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WardenError::ResultSink(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ResultSink for HttpResultSink {
    async fn forward(&self, result: &ForwardedResult) -> Result<()> {
        self.client
            .post(&self.url)
            .json(result)
            .send()
            .await?
            .error_for_status()?;
        debug!(scan_id = %result.scan_id, probe = %result.probe, "result posted");
        Ok(())
    }
}
