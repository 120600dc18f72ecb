//! Version record store: append-only publish log plus one pointer record per
//! module, updated under optimistic concurrency.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::{PublishError, StoreError, StoreKind};
use crate::retry::RetryPolicy;
pub use crate::types::WriteOutcome;
use crate::types::{Marker, ModuleLogEntry, ModuleName, ModulePointerRecord, VersionStamp};

/// Backend holding the publish log and the per-module pointer records.
///
/// Implementations must not cache reads: every `get_pointers` goes to the
/// backing store so the marker it returns is current.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Unconditional insert. Never conflicts.
    async fn append_log(&self, entry: &ModuleLogEntry) -> Result<(), StoreError>;

    /// Unexpired log entries for `module`, oldest first.
    async fn list_log(&self, module: &ModuleName) -> Result<Vec<ModuleLogEntry>, StoreError>;

    async fn get_pointers(
        &self,
        module: &ModuleName,
    ) -> Result<Option<ModulePointerRecord>, StoreError>;

    /// Write `record` only if no record is stored yet, or the stored
    /// last-write marker still equals `expected`. `expected == None` means the
    /// writer saw no record, so any stored record is a conflict.
    async fn put_pointers(
        &self,
        record: &ModulePointerRecord,
        expected: Option<&Marker>,
    ) -> Result<WriteOutcome, StoreError>;
}

/// Record one build in the publish log.
#[tracing::instrument(skip(store, stamp), fields(%module, version = %stamp.version), err)]
pub async fn append_log_entry(
    store: &dyn RecordStore,
    module: &ModuleName,
    stamp: &VersionStamp,
    ttl: chrono::Duration,
) -> Result<ModuleLogEntry, PublishError> {
    let entry = ModuleLogEntry::new(module, stamp, ttl);
    store
        .append_log(&entry)
        .await
        .map_err(|e| PublishError::unavailable(StoreKind::Records, e))?;
    Ok(entry)
}

/// Move the developer and qa pointers of `module` to `stamp`.
///
/// Read-modify-write against a fresh snapshot on every attempt; a lost race is
/// retried with backoff until `policy.max_attempts` is spent.
#[tracing::instrument(skip(store, stamp, policy), fields(%module, version = %stamp.version), err)]
pub async fn upsert_pointers(
    store: &dyn RecordStore,
    module: &ModuleName,
    stamp: &VersionStamp,
    policy: &RetryPolicy,
) -> Result<ModulePointerRecord, PublishError> {
    for attempt in 1..=policy.max_attempts {
        policy.wait(attempt).await;

        let current = store
            .get_pointers(module)
            .await
            .map_err(|e| PublishError::unavailable(StoreKind::Records, e))?;
        let expected = current.as_ref().map(|c| c.last_write.clone());
        let next = ModulePointerRecord::next(current.as_ref(), module, stamp);

        match store
            .put_pointers(&next, expected.as_ref())
            .await
            .map_err(|e| PublishError::unavailable(StoreKind::Records, e))?
        {
            WriteOutcome::Applied => {
                tracing::debug!(attempt, "pointer record written");
                return Ok(next);
            }
            WriteOutcome::Conflict => {
                tracing::debug!(attempt, "pointer record changed underneath us, retrying");
            }
        }
    }

    tracing::warn!(attempts = policy.max_attempts, "giving up on pointer record");
    Err(PublishError::ConcurrencyExhausted {
        store: StoreKind::Records,
        attempts: policy.max_attempts,
    })
}
