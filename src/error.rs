use std::fmt;

/// Which backing store a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Records,
    Ring,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Records => f.write_str("record store"),
            Self::Ring => f.write_str("rollout ring store"),
        }
    }
}

/// Backend fault raised by a store implementation: I/O, protocol, or data damage.
///
/// Lost optimistic races are not errors at this level; stores report them as
/// [`crate::types::WriteOutcome::Conflict`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid store url: {0}")]
    InvalidUrl(String),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("corrupt stored state: {0}")]
    Corrupt(String),
}

/// Failure of one module's publish step. Always scoped to a single module.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("{store} unavailable: {source}")]
    StoreUnavailable {
        store: StoreKind,
        #[source]
        source: StoreError,
    },

    #[error("{store} write lost {attempts} optimistic races in a row")]
    ConcurrencyExhausted { store: StoreKind, attempts: u32 },
}

impl PublishError {
    pub fn unavailable(store: StoreKind, source: StoreError) -> Self {
        tracing::error!(%store, error = %source, "store unavailable");
        Self::StoreUnavailable { store, source }
    }

    pub fn store(&self) -> StoreKind {
        match self {
            Self::StoreUnavailable { store, .. } | Self::ConcurrencyExhausted { store, .. } => {
                *store
            }
        }
    }

    /// Short machine-readable kind for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::ConcurrencyExhausted { .. } => "concurrency_exhausted",
        }
    }
}
