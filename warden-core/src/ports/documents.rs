//! Lockable document storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_model::DocumentId;

use crate::error::Result;
use crate::lock::LockFields;

/// Raw document as held by the document store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub collection: String,
    pub id: DocumentId,
    pub body: Value,
    pub lock: LockFields,
}

/// Document store addressed by collection and opaque id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(
        &self,
        collection: &str,
        id: DocumentId,
    ) -> Result<Option<StoredDocument>>;

    async fn insert(&self, document: &StoredDocument) -> Result<()>;

    /// Replace the body, leaving lock fields untouched.
    async fn update_body(
        &self,
        collection: &str,
        id: DocumentId,
        body: &Value,
    ) -> Result<()>;

    /// Replace the lock fields, leaving the body untouched.
    async fn update_lock(
        &self,
        collection: &str,
        id: DocumentId,
        lock: LockFields,
    ) -> Result<()>;

    async fn remove(&self, collection: &str, id: DocumentId) -> Result<bool>;
}
