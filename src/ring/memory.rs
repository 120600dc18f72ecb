use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CreateOutcome, Feature, Revision, RingStore, SlotWrite, VariationSet};
use crate::error::StoreError;
use crate::types::{ModuleName, WriteOutcome};

struct Entry {
    variations: VariationSet,
    revision: u64,
}

/// In-process ring store. Every applied update bumps a revision counter that
/// conditional updates are checked against.
#[derive(Default)]
pub struct MemoryRingStore {
    features: Mutex<HashMap<ModuleName, Entry>>,
}

impl MemoryRingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a module's feature, as an operator deleting it from the service would.
    pub async fn remove(&self, module: &ModuleName) -> bool {
        self.features.lock().await.remove(module).is_some()
    }
}

#[async_trait]
impl RingStore for MemoryRingStore {
    async fn get_feature(&self, module: &ModuleName) -> Result<Option<Feature>, StoreError> {
        Ok(self.features.lock().await.get(module).map(|entry| Feature {
            variations: entry.variations.clone(),
            revision: Some(Revision::new(entry.revision.to_string())),
        }))
    }

    async fn create_feature(
        &self,
        module: &ModuleName,
        initial: &VariationSet,
    ) -> Result<CreateOutcome, StoreError> {
        let mut features = self.features.lock().await;
        if features.contains_key(module) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        features.insert(
            module.clone(),
            Entry {
                variations: initial.clone(),
                revision: 1,
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn update_variations(
        &self,
        module: &ModuleName,
        expected: Option<&Revision>,
        writes: &[SlotWrite],
    ) -> Result<WriteOutcome, StoreError> {
        let mut features = self.features.lock().await;
        let Some(entry) = features.get_mut(module) else {
            return Ok(WriteOutcome::Conflict);
        };
        if let Some(expected) = expected
            && expected.as_str() != entry.revision.to_string()
        {
            return Ok(WriteOutcome::Conflict);
        }
        entry.variations.apply(writes);
        entry.revision += 1;
        Ok(WriteOutcome::Applied)
    }
}
