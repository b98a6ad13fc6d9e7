//! Filesystem remote storage.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use warden_model::{Namespace, ScanId};

use crate::error::{Result, WardenError};
use crate::ports::RemoteStorage;

/// Sample storage laid out as `<root>/<namespace>/<scan_id>/...`.
#[derive(Debug, Clone)]
pub struct FsRemoteStorage {
    root: PathBuf,
}

impl FsRemoteStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scan_dir(&self, namespace: &Namespace, scan_id: &ScanId) -> Result<PathBuf> {
        Ok(self
            .root
            .join(single_component(namespace.as_str())?)
            .join(single_component(scan_id.as_str())?))
    }
}

/// Reject anything that would escape its parent directory.
fn single_component(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(WardenError::InvalidId(format!("not a plain path component: {name:?}"))),
    }
}

#[async_trait]
impl RemoteStorage for FsRemoteStorage {
    async fn flush(&self, namespace: &Namespace, scan_id: &ScanId) -> Result<()> {
        let dir = self.scan_dir(namespace, scan_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(path = %dir.display(), "scan files flushed");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
