//! Cooperative lock over a shared document, reclaimable after a timeout.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::debug;
use warden_model::DocumentId;

use super::{Document, LockFields, LockMode};
use crate::clock::Clock;
use crate::config::LockConfig;
use crate::error::{Result, WardenError};
use crate::ports::{DocumentStore, StoredDocument};

/// A record paired with the lock fields it was loaded with.
///
/// The record itself knows nothing about locking; `DocumentLock` owns every
/// lock decision.
#[derive(Clone, Debug, PartialEq)]
pub struct LockableDocument<T> {
    id: DocumentId,
    record: T,
    lock: LockFields,
}

impl<T> LockableDocument<T> {
    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn record(&self) -> &T {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut T {
        &mut self.record
    }

    pub fn into_record(self) -> T {
        self.record
    }

    /// Lock fields as last observed or written by this copy.
    pub fn lock(&self) -> LockFields {
        self.lock
    }
}

/// Cooperative lock manager for documents of any `Document` type.
#[derive(Clone)]
pub struct DocumentLock {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl fmt::Debug for DocumentLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentLock")
            .field("clock", &self.clock)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DocumentLock {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: LockConfig,
    ) -> Self {
        Self {
            store,
            clock,
            timeout: config.timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Persist a new document under a fresh id. In write mode the creator
    /// holds the lock from the start.
    pub async fn create<T: Document>(
        &self,
        record: T,
        mode: LockMode,
    ) -> Result<LockableDocument<T>> {
        self.create_with_id(DocumentId::new(), record, mode).await
    }

    pub async fn create_with_id<T: Document>(
        &self,
        id: DocumentId,
        record: T,
        mode: LockMode,
    ) -> Result<LockableDocument<T>> {
        let now = self.clock.now();
        let lock = match mode {
            LockMode::Read => LockFields::free_at(now),
            LockMode::Write => LockFields::locked_at(now),
        };
        let stored = StoredDocument {
            collection: T::COLLECTION.to_string(),
            id,
            body: serde_json::to_value(&record)?,
            lock,
        };
        self.store.insert(&stored).await?;
        debug!(collection = T::COLLECTION, %id, %mode, "document created");

        Ok(LockableDocument { id, record, lock })
    }

    /// Load a document, taking its lock in write mode.
    pub async fn load<T: Document>(
        &self,
        id: DocumentId,
        mode: LockMode,
    ) -> Result<LockableDocument<T>> {
        let mut document = self.load_transient(id).await?;
        if mode == LockMode::Write {
            self.take(&mut document, mode).await?;
        }
        Ok(document)
    }

    /// Load a document without any lock interaction.
    pub async fn load_transient<T: Document>(
        &self,
        id: DocumentId,
    ) -> Result<LockableDocument<T>> {
        let stored = self.fetch(T::COLLECTION, id).await?;
        Ok(LockableDocument {
            id,
            record: serde_json::from_value(stored.body)?,
            lock: stored.lock,
        })
    }

    /// Load the document with the given id, creating it from
    /// `T::default()` when it does not exist yet.
    pub async fn load_or_create<T: Document + Default>(
        &self,
        id: DocumentId,
        mode: LockMode,
    ) -> Result<LockableDocument<T>> {
        match self.store.load(T::COLLECTION, id).await? {
            Some(_) => self.load(id, mode).await,
            None => self.create_with_id(id, T::default(), mode).await,
        }
    }

    /// Take the write lock on `document`.
    ///
    /// Succeeds when the persisted lock is free or has been held for at least
    /// the timeout. Returns whether the persisted body differs from this
    /// copy; the flag is advisory and never blocks the take.
    pub async fn take<T: Document>(
        &self,
        document: &mut LockableDocument<T>,
        mode: LockMode,
    ) -> Result<bool> {
        if mode != LockMode::Write {
            return Err(WardenError::InvalidLockMode(mode.to_string()));
        }

        let fresh = self.fetch(T::COLLECTION, document.id).await?;
        let changed = serde_json::to_value(&document.record)? != fresh.body;
        let now = self.clock.now();

        if !fresh.lock.is_free() && !self.expired(fresh.lock.lock_time, now) {
            debug!(
                collection = T::COLLECTION,
                id = %document.id,
                locked_since = %fresh.lock.lock_time,
                "lock contention"
            );
            return Err(WardenError::LockHeld {
                collection: T::COLLECTION.to_string(),
                id: document.id.to_string(),
            });
        }

        if !fresh.lock.is_free() {
            debug!(
                collection = T::COLLECTION,
                id = %document.id,
                locked_since = %fresh.lock.lock_time,
                "reclaiming timed out lock"
            );
        }

        let lock = LockFields::locked_at(now);
        self.store
            .update_lock(T::COLLECTION, document.id, lock)
            .await?;
        document.lock = lock;

        Ok(changed)
    }

    /// Mark the document free. Any holder may release any lock.
    pub async fn release<T: Document>(
        &self,
        document: &mut LockableDocument<T>,
    ) -> Result<()> {
        let lock = LockFields::free_at(self.clock.now());
        self.store
            .update_lock(T::COLLECTION, document.id, lock)
            .await?;
        document.lock = lock;
        debug!(collection = T::COLLECTION, id = %document.id, "lock released");
        Ok(())
    }

    /// Whether the stored body differs from this copy, ignoring lock fields.
    pub async fn has_state_changed<T: Document>(
        &self,
        document: &LockableDocument<T>,
    ) -> Result<bool> {
        let fresh = self.fetch(T::COLLECTION, document.id).await?;
        Ok(serde_json::to_value(&document.record)? != fresh.body)
    }

    pub async fn is_lock_free<T: Document>(
        &self,
        document: &LockableDocument<T>,
    ) -> Result<bool> {
        let fresh = self.fetch(T::COLLECTION, document.id).await?;
        Ok(fresh.lock.is_free())
    }

    /// Whether the stored lock has been held for at least the timeout.
    pub async fn has_lock_timed_out<T: Document>(
        &self,
        document: &LockableDocument<T>,
    ) -> Result<bool> {
        let fresh = self.fetch(T::COLLECTION, document.id).await?;
        Ok(!fresh.lock.is_free() && self.expired(fresh.lock.lock_time, self.clock.now()))
    }

    /// Write the record body back. Lock fields are left as stored.
    pub async fn save<T: Document>(&self, document: &LockableDocument<T>) -> Result<()> {
        let body: Value = serde_json::to_value(&document.record)?;
        self.store
            .update_body(T::COLLECTION, document.id, &body)
            .await
    }

    pub async fn remove<T: Document>(&self, document: LockableDocument<T>) -> Result<bool> {
        self.store.remove(T::COLLECTION, document.id).await
    }

    fn expired(&self, lock_time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - lock_time >= self.timeout
    }

    async fn fetch(&self, collection: &str, id: DocumentId) -> Result<StoredDocument> {
        self.store
            .load(collection, id)
            .await?
            .ok_or_else(|| WardenError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::clock::ManualClock;
    use crate::infra::memory::InMemoryDocumentStore;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        hits: u32,
    }

    impl Document for Sample {
        const COLLECTION: &'static str = "samples";
    }

    fn fixture() -> (DocumentLock, ManualClock) {
        let clock = ManualClock::default();
        let lock = DocumentLock::new(
            Arc::new(InMemoryDocumentStore::default()),
            Arc::new(clock.clone()),
            LockConfig::default(),
        );
        (lock, clock)
    }

    fn sample() -> Sample {
        Sample {
            name: "report".into(),
            hits: 1,
        }
    }

    #[tokio::test]
    async fn take_on_free_document_succeeds() {
        let (locks, _) = fixture();
        let mut doc = locks.create(sample(), LockMode::Read).await.unwrap();
        assert!(doc.lock().is_free());

        let changed = locks.take(&mut doc, LockMode::Write).await.unwrap();
        assert!(!changed);
        assert!(!locks.is_lock_free(&doc).await.unwrap());
    }

    #[tokio::test]
    async fn held_lock_is_contended_until_timeout() {
        let (locks, clock) = fixture();
        let created = locks.create(sample(), LockMode::Write).await.unwrap();
        let t0 = created.lock().lock_time;

        let mut other: LockableDocument<Sample> =
            locks.load_transient(created.id()).await.unwrap();

        clock.advance(Duration::seconds(30));
        let err = locks.take(&mut other, LockMode::Write).await.unwrap_err();
        assert!(err.is_lock_contention());
        assert!(!locks.has_lock_timed_out(&other).await.unwrap());

        clock.advance(Duration::seconds(31));
        assert!(locks.has_lock_timed_out(&other).await.unwrap());
        locks.take(&mut other, LockMode::Write).await.unwrap();
        assert_eq!(other.lock().lock_time, t0 + Duration::seconds(61));
    }

    #[tokio::test]
    async fn lock_held_for_exactly_the_timeout_is_reclaimable() {
        let (locks, clock) = fixture();
        let created = locks.create(sample(), LockMode::Write).await.unwrap();
        let mut other: LockableDocument<Sample> =
            locks.load_transient(created.id()).await.unwrap();

        clock.advance(Duration::seconds(59));
        assert!(locks.take(&mut other, LockMode::Write).await.is_err());
        clock.advance(Duration::seconds(1));
        assert!(locks.take(&mut other, LockMode::Write).await.is_ok());
    }

    #[tokio::test]
    async fn only_write_mode_can_take() {
        let (locks, _) = fixture();
        let mut doc = locks.create(sample(), LockMode::Read).await.unwrap();
        let err = locks.take(&mut doc, LockMode::Read).await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidLockMode(mode) if mode == "read"));
    }

    #[tokio::test]
    async fn release_is_unconditional() {
        let (locks, _) = fixture();
        let holder = locks.create(sample(), LockMode::Write).await.unwrap();
        let mut stranger: LockableDocument<Sample> =
            locks.load_transient(holder.id()).await.unwrap();

        locks.release(&mut stranger).await.unwrap();
        assert!(locks.is_lock_free(&holder).await.unwrap());
    }

    #[tokio::test]
    async fn state_change_ignores_lock_fields() {
        let (locks, clock) = fixture();
        let mut mine = locks.create(sample(), LockMode::Read).await.unwrap();
        let mut theirs: LockableDocument<Sample> =
            locks.load_transient(mine.id()).await.unwrap();

        locks.take(&mut theirs, LockMode::Write).await.unwrap();
        assert!(!locks.has_state_changed(&mine).await.unwrap());

        theirs.record_mut().hits = 2;
        locks.save(&theirs).await.unwrap();
        locks.release(&mut theirs).await.unwrap();

        clock.advance(Duration::seconds(1));
        let changed = locks.take(&mut mine, LockMode::Write).await.unwrap();
        assert!(changed);
    }

    #[tokio::test]
    async fn load_in_write_mode_takes_the_lock() {
        let (locks, _) = fixture();
        let created = locks.create(sample(), LockMode::Read).await.unwrap();

        let loaded: LockableDocument<Sample> =
            locks.load(created.id(), LockMode::Write).await.unwrap();
        assert!(!loaded.lock().is_free());

        let err = locks
            .load::<Sample>(created.id(), LockMode::Write)
            .await
            .unwrap_err();
        assert!(err.is_lock_contention());

        let read: LockableDocument<Sample> =
            locks.load(created.id(), LockMode::Read).await.unwrap();
        assert_eq!(read.record(), &sample());
    }

    #[tokio::test]
    async fn missing_document_is_reported() {
        let (locks, _) = fixture();
        let err = locks
            .load::<Sample>(DocumentId::new(), LockMode::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::DocumentNotFound { collection, .. } if collection == "samples"));
    }

    #[tokio::test]
    async fn load_or_create_initializes_then_reuses() {
        let (locks, _) = fixture();
        let id = DocumentId::new();

        let mut created: LockableDocument<Sample> =
            locks.load_or_create(id, LockMode::Read).await.unwrap();
        assert_eq!(created.record(), &Sample::default());

        created.record_mut().name = "seeded".into();
        locks.save(&created).await.unwrap();

        let again: LockableDocument<Sample> =
            locks.load_or_create(id, LockMode::Read).await.unwrap();
        assert_eq!(again.record().name, "seeded");

        assert!(locks.remove(again).await.unwrap());
        assert!(locks.load_transient::<Sample>(id).await.is_err());
    }
}
