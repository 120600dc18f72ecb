//! Rollout ring store: per-module feature flag whose variations carry the
//! trunk, beta, release and two-deep release history.

pub mod http;
pub mod memory;
pub mod variation;

use std::fmt;

use async_trait::async_trait;

use crate::error::{PublishError, StoreError, StoreKind};
use crate::retry::RetryPolicy;
use crate::types::{ModuleName, PromotionFlags, VersionStamp, WriteOutcome};

pub use variation::{SlotWrite, Variation, VariationSet, plan_promotion};

/// Prefix of every module's feature name in the flag store.
pub const FEATURE_PREFIX: &str = "Module_";

/// Variation served when a flag evaluation has no targeting match.
pub const DEFAULT_VARIATION: Variation = Variation::Release;

pub const FEATURE_DESCRIPTION: &str = "Frontend module";

pub fn feature_name(module: &ModuleName) -> String {
    format!("{FEATURE_PREFIX}{module}")
}

/// Opaque revision token (an `ETag` for the HTTP store) a conditional update
/// is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision(String);

impl Revision {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A module's variation set as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub variations: VariationSet,
    /// `None` when the backend does not version features; updates are then
    /// unconditional.
    pub revision: Option<Revision>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// What one publish did to the ring.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RingOutcome {
    /// The variation set did not exist and this publish created it.
    pub created: bool,
    /// Variations rewritten by the promotion step, in write order.
    pub promoted: Vec<Variation>,
}

/// Feature-flag backend holding one variation set per module.
///
/// `get_feature` must read through to the backend; a cached read would let a
/// stale revision through the conditional update.
#[async_trait]
pub trait RingStore: Send + Sync {
    /// `Ok(None)` when the module has no feature yet.
    async fn get_feature(&self, module: &ModuleName) -> Result<Option<Feature>, StoreError>;

    async fn create_feature(
        &self,
        module: &ModuleName,
        initial: &VariationSet,
    ) -> Result<CreateOutcome, StoreError>;

    /// Apply `writes` as one batch, only if the feature is still at `expected`.
    async fn update_variations(
        &self,
        module: &ModuleName,
        expected: Option<&Revision>,
        writes: &[SlotWrite],
    ) -> Result<WriteOutcome, StoreError>;
}

/// Create the module's variation set if it is missing. Returns whether this
/// call created it; losing a create race to another publisher is fine.
#[tracing::instrument(skip(store, stamp), fields(%module, version = %stamp.version), err)]
pub async fn ensure_variation_set(
    store: &dyn RingStore,
    module: &ModuleName,
    stamp: &VersionStamp,
) -> Result<bool, PublishError> {
    let existing = store
        .get_feature(module)
        .await
        .map_err(|e| PublishError::unavailable(StoreKind::Ring, e))?;
    if existing.is_some() {
        return Ok(false);
    }
    create(store, module, stamp).await
}

async fn create(
    store: &dyn RingStore,
    module: &ModuleName,
    stamp: &VersionStamp,
) -> Result<bool, PublishError> {
    match store
        .create_feature(module, &VariationSet::initial(stamp))
        .await
        .map_err(|e| PublishError::unavailable(StoreKind::Ring, e))?
    {
        CreateOutcome::Created => {
            tracing::info!(%module, "rollout variations created");
            Ok(true)
        }
        CreateOutcome::AlreadyExists => {
            tracing::info!(%module, "rollout variations created concurrently by another publish");
            Ok(false)
        }
    }
}

/// Advance the ring for a publish of `stamp`.
///
/// Reads the current set, plans the slot writes, and submits them as one
/// batch conditioned on the revision that was read. Lost races are retried
/// with backoff; nothing is written when the plan is empty.
#[tracing::instrument(skip(store, stamp, policy), fields(%module, version = %stamp.version), err)]
pub async fn promote(
    store: &dyn RingStore,
    module: &ModuleName,
    stamp: &VersionStamp,
    flags: PromotionFlags,
    policy: &RetryPolicy,
) -> Result<Vec<Variation>, PublishError> {
    for attempt in 1..=policy.max_attempts {
        policy.wait(attempt).await;

        let Some(feature) = store
            .get_feature(module)
            .await
            .map_err(|e| PublishError::unavailable(StoreKind::Ring, e))?
        else {
            // Deleted between ensure and promote; recreate and re-read.
            tracing::warn!(%module, attempt, "rollout variations missing, recreating");
            create(store, module, stamp).await?;
            continue;
        };

        let writes = plan_promotion(&feature.variations, stamp, flags);
        if writes.is_empty() {
            tracing::debug!(attempt, "rollout already current");
            return Ok(Vec::new());
        }

        match store
            .update_variations(module, feature.revision.as_ref(), &writes)
            .await
            .map_err(|e| PublishError::unavailable(StoreKind::Ring, e))?
        {
            WriteOutcome::Applied => {
                let promoted: Vec<Variation> = writes.iter().map(|w| w.variation).collect();
                tracing::info!(
                    attempt,
                    variations = ?promoted.iter().map(|v| v.name()).collect::<Vec<_>>(),
                    "rollout variations updated"
                );
                return Ok(promoted);
            }
            WriteOutcome::Conflict => {
                tracing::debug!(attempt, "rollout variations changed underneath us, retrying");
            }
        }
    }

    tracing::warn!(attempts = policy.max_attempts, "giving up on rollout promotion");
    Err(PublishError::ConcurrencyExhausted {
        store: StoreKind::Ring,
        attempts: policy.max_attempts,
    })
}

/// `ensure_variation_set` followed by `promote`.
pub async fn publish(
    store: &dyn RingStore,
    module: &ModuleName,
    stamp: &VersionStamp,
    flags: PromotionFlags,
    policy: &RetryPolicy,
) -> Result<RingOutcome, PublishError> {
    let created = ensure_variation_set(store, module, stamp).await?;
    let promoted = promote(store, module, stamp, flags, policy).await?;
    Ok(RingOutcome { created, promoted })
}
