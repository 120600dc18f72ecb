#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use module_registry::artifact::Artifact;
use module_registry::error::StoreError;
use module_registry::records::RecordStore;
use module_registry::ring::memory::MemoryRingStore;
use module_registry::ring::{CreateOutcome, Feature, Revision, RingStore, SlotWrite, VariationSet};
use module_registry::types::{
    Marker, ModuleLogEntry, ModuleName, ModulePointerRecord, PromotionFlags, WriteOutcome,
};

pub const NO_FLAGS: PromotionFlags = PromotionFlags {
    force_beta: false,
    force_prod: false,
};

pub const PROD: PromotionFlags = PromotionFlags {
    force_beta: false,
    force_prod: true,
};

pub const BETA: PromotionFlags = PromotionFlags {
    force_beta: true,
    force_prod: false,
};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn artifact(module: &str, version: &str) -> Artifact {
    Artifact {
        module: ModuleName::new(module),
        version: version.into(),
        file_name: format!("{module}-{version}.js"),
    }
}

fn offline() -> StoreError {
    StoreError::UnexpectedStatus {
        status: 503,
        body: "service unavailable".into(),
    }
}

/// Record store whose backend is down.
pub struct OfflineRecords;

#[async_trait]
impl RecordStore for OfflineRecords {
    async fn append_log(&self, _entry: &ModuleLogEntry) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn list_log(&self, _module: &ModuleName) -> Result<Vec<ModuleLogEntry>, StoreError> {
        Err(offline())
    }

    async fn get_pointers(
        &self,
        _module: &ModuleName,
    ) -> Result<Option<ModulePointerRecord>, StoreError> {
        Err(offline())
    }

    async fn put_pointers(
        &self,
        _record: &ModulePointerRecord,
        _expected: Option<&Marker>,
    ) -> Result<WriteOutcome, StoreError> {
        Err(offline())
    }
}

/// Ring store that fails every call for one module and delegates the rest.
pub struct PartiallyOfflineRing {
    pub broken: ModuleName,
    pub inner: MemoryRingStore,
}

impl PartiallyOfflineRing {
    pub fn new(broken: &str) -> Self {
        Self {
            broken: ModuleName::new(broken),
            inner: MemoryRingStore::new(),
        }
    }

    fn check(&self, module: &ModuleName) -> Result<(), StoreError> {
        if *module == self.broken {
            Err(offline())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RingStore for PartiallyOfflineRing {
    async fn get_feature(&self, module: &ModuleName) -> Result<Option<Feature>, StoreError> {
        self.check(module)?;
        self.inner.get_feature(module).await
    }

    async fn create_feature(
        &self,
        module: &ModuleName,
        initial: &VariationSet,
    ) -> Result<CreateOutcome, StoreError> {
        self.check(module)?;
        self.inner.create_feature(module, initial).await
    }

    async fn update_variations(
        &self,
        module: &ModuleName,
        expected: Option<&Revision>,
        writes: &[SlotWrite],
    ) -> Result<WriteOutcome, StoreError> {
        self.check(module)?;
        self.inner.update_variations(module, expected, writes).await
    }
}
