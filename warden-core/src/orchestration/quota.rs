//! Rolling-window quota accounting per tenant.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use tracing::debug;
use warden_model::Tenant;

use crate::clock::Clock;
use crate::error::Result;
use crate::ports::ScanRepository;

/// Files a tenant may still submit in the current window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Quota {
    Unlimited,
    /// May be negative once a tenant is over its ceiling.
    Limited(i64),
}

impl Quota {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Quota::Limited(remaining) if *remaining <= 0)
    }

    /// Count one dispatched job against the quota.
    pub fn consume(&mut self) {
        if let Quota::Limited(remaining) = self {
            *remaining -= 1;
        }
    }

    pub fn remaining(&self) -> Option<i64> {
        match self {
            Quota::Unlimited => None,
            Quota::Limited(remaining) => Some(*remaining),
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quota::Unlimited => f.write_str("unlimited"),
            Quota::Limited(remaining) => write!(f, "{remaining}"),
        }
    }
}

/// Rolling-window quota computed from historical scan records.
pub struct QuotaTracker {
    scans: Arc<dyn ScanRepository>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("window", &self.window)
            .finish()
    }
}

impl QuotaTracker {
    pub fn new(
        scans: Arc<dyn ScanRepository>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            scans,
            clock,
            window,
        }
    }

    pub async fn remaining(&self, tenant: &Tenant) -> Result<Quota> {
        if !tenant.has_quota() {
            return Ok(Quota::Unlimited);
        }

        let since = self.clock.now() - self.window;
        let consumed = self.scans.sum_file_counts_since(tenant.id, since).await?;
        let remaining = i64::from(tenant.quota) - i64::try_from(consumed).unwrap_or(i64::MAX);
        debug!(
            tenant = %tenant.name,
            ceiling = tenant.quota,
            consumed,
            remaining,
            "quota computed"
        );
        Ok(Quota::Limited(remaining))
    }
}
