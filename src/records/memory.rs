use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{RecordStore, WriteOutcome};
use crate::error::StoreError;
use crate::types::{Marker, ModuleLogEntry, ModuleName, ModulePointerRecord};

#[derive(Default)]
struct Tables {
    log: HashMap<ModuleName, Vec<ModuleLogEntry>>,
    pointers: HashMap<ModuleName, ModulePointerRecord>,
}

/// In-process record store with the same conditional-write semantics as the
/// Postgres backend. Expired log entries are hidden on read.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn append_log(&self, entry: &ModuleLogEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let entries = tables.log.entry(entry.module.clone()).or_default();
        let now = Utc::now();
        entries.retain(|e| !e.is_expired(now));
        entries.push(entry.clone());
        Ok(())
    }

    async fn list_log(&self, module: &ModuleName) -> Result<Vec<ModuleLogEntry>, StoreError> {
        let tables = self.tables.lock().await;
        let now = Utc::now();
        let mut entries: Vec<_> = tables
            .log
            .get(module)
            .map(|entries| entries.iter().filter(|e| !e.is_expired(now)).cloned().collect())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.published_at);
        Ok(entries)
    }

    async fn get_pointers(
        &self,
        module: &ModuleName,
    ) -> Result<Option<ModulePointerRecord>, StoreError> {
        Ok(self.tables.lock().await.pointers.get(module).cloned())
    }

    async fn put_pointers(
        &self,
        record: &ModulePointerRecord,
        expected: Option<&Marker>,
    ) -> Result<WriteOutcome, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(stored) = tables.pointers.get(&record.module)
            && Some(&stored.last_write) != expected
        {
            return Ok(WriteOutcome::Conflict);
        }
        tables.pointers.insert(record.module.clone(), record.clone());
        Ok(WriteOutcome::Applied)
    }
}
