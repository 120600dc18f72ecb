use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use crate::artifact::{Artifact, ArtifactPattern};
use crate::error::PublishError;
use crate::records::{self, RecordStore};
use crate::retry::RetryPolicy;
use crate::ring::{self, RingOutcome, RingStore};
use crate::types::{ModuleName, ModulePointerRecord, PromotionFlags, VersionStamp};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of publishing one module. A `None` step was not configured.
#[derive(Debug)]
pub struct ModuleReport {
    pub module: ModuleName,
    pub version: String,
    pub records: Option<Result<ModulePointerRecord, PublishError>>,
    pub ring: Option<Result<RingOutcome, PublishError>>,
}

impl ModuleReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.records, Some(Err(_))) && !matches!(self.ring, Some(Err(_)))
    }

    pub fn errors(&self) -> impl Iterator<Item = &PublishError> {
        [
            self.records.as_ref().and_then(|step| step.as_ref().err()),
            self.ring.as_ref().and_then(|step| step.as_ref().err()),
        ]
        .into_iter()
        .flatten()
    }
}

impl fmt::Display for ModuleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:", self.module, self.version)?;
        match &self.records {
            None => {}
            Some(Ok(_)) => write!(f, " pointers=developer,qa")?,
            Some(Err(e)) => write!(f, " records FAILED ({}: {e})", e.kind())?,
        }
        match &self.ring {
            None => {}
            Some(Ok(outcome)) => {
                let mut slots: Vec<&str> = outcome.promoted.iter().map(|v| v.name()).collect();
                if outcome.created {
                    slots.insert(0, "created");
                }
                if slots.is_empty() {
                    write!(f, " ring=unchanged")?;
                } else {
                    write!(f, " ring={}", slots.join(","))?;
                }
            }
            Some(Err(e)) => write!(f, " ring FAILED ({}: {e})", e.kind())?,
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Sequences the record store and ring store updates for each built module.
///
/// The two stores are independent: a record-store failure is reported but the
/// ring is still advanced, and vice versa. Re-running a failed publish is safe
/// because both paths are conditional and idempotent.
#[derive(Clone)]
pub struct Publisher {
    records: Option<Arc<dyn RecordStore>>,
    ring: Option<Arc<dyn RingStore>>,
    retry: RetryPolicy,
    log_ttl: chrono::Duration,
}

impl Publisher {
    pub fn new() -> Self {
        Self {
            records: None,
            ring: None,
            retry: RetryPolicy::default(),
            log_ttl: chrono::Duration::days(10),
        }
    }

    #[must_use]
    pub fn with_records(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.records = Some(store);
        self
    }

    #[must_use]
    pub fn with_ring(mut self, store: Arc<dyn RingStore>) -> Self {
        self.ring = Some(store);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_log_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.log_ttl = ttl;
        self
    }

    /// Publish the module named by `file_name`, if it follows `pattern`.
    /// Non-matching files are not modules and produce no report.
    pub async fn publish_file(
        &self,
        file_name: &str,
        pattern: &ArtifactPattern,
        flags: PromotionFlags,
    ) -> Option<ModuleReport> {
        let Some(artifact) = pattern.parse(file_name) else {
            tracing::info!(
                file_name,
                pattern = pattern.as_str(),
                "not a module artifact, skipping"
            );
            return None;
        };
        Some(self.publish(&artifact, flags).await)
    }

    /// Publish one artifact, timestamped now.
    pub async fn publish(&self, artifact: &Artifact, flags: PromotionFlags) -> ModuleReport {
        self.publish_at(artifact, flags, Utc::now()).await
    }

    #[tracing::instrument(
        skip(self, artifact),
        fields(module = %artifact.module, version = %artifact.version)
    )]
    pub async fn publish_at(
        &self,
        artifact: &Artifact,
        flags: PromotionFlags,
        now: DateTime<Utc>,
    ) -> ModuleReport {
        let module = &artifact.module;
        let stamp = VersionStamp::new(artifact.version.clone(), now);

        let records = match &self.records {
            Some(store) => Some(self.publish_records(store.as_ref(), module, &stamp).await),
            None => None,
        };

        let ring = match &self.ring {
            Some(store) => {
                Some(ring::publish(store.as_ref(), module, &stamp, flags, &self.retry).await)
            }
            None => None,
        };

        let report = ModuleReport {
            module: module.clone(),
            version: artifact.version.clone(),
            records,
            ring,
        };

        if report.is_success() {
            tracing::info!(%report, "module published");
        } else {
            for err in report.errors() {
                tracing::error!(
                    store = %err.store(),
                    kind = err.kind(),
                    error = %err,
                    "module publish failed"
                );
            }
        }
        report
    }

    async fn publish_records(
        &self,
        store: &dyn RecordStore,
        module: &ModuleName,
        stamp: &VersionStamp,
    ) -> Result<ModulePointerRecord, PublishError> {
        records::append_log_entry(store, module, stamp, self.log_ttl).await?;
        records::upsert_pointers(store, module, stamp, &self.retry).await
    }

    /// Publish every artifact concurrently. Each module succeeds or fails on
    /// its own; the reports come back in input order.
    pub async fn publish_batch(
        &self,
        artifacts: &[Artifact],
        flags: PromotionFlags,
    ) -> Vec<ModuleReport> {
        join_all(artifacts.iter().map(|artifact| self.publish(artifact, flags))).await
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}
