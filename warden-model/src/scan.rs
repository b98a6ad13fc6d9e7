use chrono::{DateTime, Utc};

use crate::ids::{GroupId, ScanId, TenantId};
use crate::status::ScanStatus;

/// One file of a scan request and the probes that must examine it.
///
/// On the wire this is a `[filename, probes]` pair where `probes` may be
/// `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        from = "(String, Option<Vec<String>>)",
        into = "(String, Option<Vec<String>>)"
    )
)]
pub struct FileRequest {
    pub filename: String,
    pub probes: Option<Vec<String>>,
}

impl FileRequest {
    pub fn new<I, S>(filename: impl Into<String>, probes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filename: filename.into(),
            probes: Some(probes.into_iter().map(Into::into).collect()),
        }
    }

    pub fn without_probes(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            probes: None,
        }
    }
}

impl From<(String, Option<Vec<String>>)> for FileRequest {
    fn from((filename, probes): (String, Option<Vec<String>>)) -> Self {
        Self { filename, probes }
    }
}

impl From<FileRequest> for (String, Option<Vec<String>>) {
    fn from(request: FileRequest) -> Self {
        (request.filename, request.probes)
    }
}

/// Ordered list of files to scan. Order drives quota consumption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ScanRequest {
    pub files: Vec<FileRequest>,
}

impl ScanRequest {
    pub fn new(files: Vec<FileRequest>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Upper bound on the number of jobs this request can produce.
    pub fn requested_jobs(&self) -> usize {
        self.files
            .iter()
            .map(|file| file.probes.as_ref().map_or(0, Vec::len))
            .sum()
    }
}

impl FromIterator<FileRequest> for ScanRequest {
    fn from_iter<T: IntoIterator<Item = FileRequest>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Persisted lifecycle record of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanRecord {
    pub scan_id: ScanId,
    pub tenant_id: TenantId,
    /// Present once the scan has been launched.
    pub group_id: Option<GroupId>,
    /// Number of jobs dispatched, used for quota accounting.
    pub file_count: u32,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
}

impl ScanRecord {
    pub fn launched(
        scan_id: ScanId,
        tenant_id: TenantId,
        group_id: GroupId,
        file_count: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scan_id,
            tenant_id,
            group_id: Some(group_id),
            file_count,
            status: ScanStatus::Launched,
            created_at,
        }
    }
}

/// Aggregate completion of a launched scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanProgress {
    pub total: usize,
    pub finished: usize,
    pub successful: usize,
}

impl ScanProgress {
    pub fn is_complete(&self) -> bool {
        self.finished == self.total
    }
}

/// Outcome of a cancel sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CancelSummary {
    pub total: usize,
    pub finished: usize,
    pub cancelled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_jobs_ignores_missing_probe_lists() {
        let request: ScanRequest = vec![
            FileRequest::new("a.exe", ["clamav", "comodo"]),
            FileRequest::without_probes("b.exe"),
            FileRequest::new("c.exe", ["clamav"]),
        ]
        .into_iter()
        .collect();

        assert_eq!(request.len(), 3);
        assert_eq!(request.requested_jobs(), 3);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn file_requests_use_pair_encoding() {
        let json = r#"[["a.exe", ["clamav"]], ["b.exe", null]]"#;
        let request: ScanRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.files[0], FileRequest::new("a.exe", ["clamav"]));
        assert_eq!(request.files[1].probes, None);

        let back = serde_json::to_value(&request).unwrap();
        assert_eq!(back, serde_json::json!([["a.exe", ["clamav"]], ["b.exe", null]]));
    }
}
