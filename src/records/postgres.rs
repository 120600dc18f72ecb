use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use tokio::sync::OnceCell;

use super::{RecordStore, WriteOutcome};
use crate::error::StoreError;
use crate::types::{
    LOG_TARGET, Marker, ModuleLogEntry, ModuleName, ModulePointerRecord, VersionStamp,
};

/// Partition value shared by every pointer row.
const POINTER_KIND: &str = "module";

/// Postgres-backed record store. Optimistic concurrency rides on a guarded
/// `ON CONFLICT DO UPDATE .. WHERE last_write = $expected`.
///
/// Connections are opened on first use and migrations run once before the
/// first query, so an unreachable database fails each call instead of the
/// whole run.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    migrated: Arc<OnceCell<()>>,
}

#[derive(sqlx::FromRow)]
struct LogRow {
    module: String,
    published_at: DateTime<Utc>,
    version: String,
    expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PointerRow {
    module: String,
    developer: Json<VersionStamp>,
    qa: Json<VersionStamp>,
    deploy: Option<Json<VersionStamp>>,
    general: Option<Json<VersionStamp>>,
    last_write: String,
}

impl From<PointerRow> for ModulePointerRecord {
    fn from(row: PointerRow) -> Self {
        Self {
            module: ModuleName::new(&row.module),
            developer: row.developer.0,
            qa: row.qa.0,
            deploy: row.deploy.map(|j| j.0).into(),
            general: row.general.map(|j| j.0).into(),
            last_write: Marker::from_raw(row.last_write),
        }
    }
}

impl PgRecordStore {
    /// Build a store over a lazily connecting pool. Only a malformed URL fails
    /// here; `acquire_timeout` bounds how long each call waits for a connection.
    pub fn connect_lazy(url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)?;
        Ok(Self {
            pool,
            migrated: Arc::new(OnceCell::new()),
        })
    }

    /// Wrap a pool whose schema is already migrated.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            migrated: Arc::new(OnceCell::new_with(Some(()))),
        }
    }

    async fn ready(&self) -> Result<&PgPool, StoreError> {
        self.migrated
            .get_or_try_init(|| async {
                sqlx::migrate!().run(&self.pool).await?;
                tracing::info!("migrations applied");
                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(&self.pool)
    }

    /// Delete log rows past their expiry. Returns the number removed.
    #[tracing::instrument(skip(self), err)]
    pub async fn reap_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM module_log WHERE expires_at <= now()")
            .execute(self.ready().await?)
            .await?;
        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::info!(reaped, "expired log entries removed");
        }
        Ok(reaped)
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn append_log(&self, entry: &ModuleLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO module_log (module, published_at, version, target, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(entry.module.as_str())
        .bind(entry.published_at)
        .bind(&entry.version)
        .bind(LOG_TARGET)
        .bind(entry.expires_at)
        .execute(self.ready().await?)
        .await?;
        Ok(())
    }

    async fn list_log(&self, module: &ModuleName) -> Result<Vec<ModuleLogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, LogRow>(
            r"
            SELECT module, published_at, version, expires_at
            FROM module_log
            WHERE module = $1 AND expires_at > now()
            ORDER BY published_at, id
            ",
        )
        .bind(module.as_str())
        .fetch_all(self.ready().await?)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ModuleLogEntry {
                module: ModuleName::new(&row.module),
                published_at: row.published_at,
                version: row.version,
                expires_at: row.expires_at,
            })
            .collect())
    }

    async fn get_pointers(
        &self,
        module: &ModuleName,
    ) -> Result<Option<ModulePointerRecord>, StoreError> {
        let row = sqlx::query_as::<_, PointerRow>(
            r"
            SELECT module, developer, qa, deploy, general, last_write
            FROM module_pointers
            WHERE kind = $1 AND module = $2
            ",
        )
        .bind(POINTER_KIND)
        .bind(module.as_str())
        .fetch_optional(self.ready().await?)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn put_pointers(
        &self,
        record: &ModulePointerRecord,
        expected: Option<&Marker>,
    ) -> Result<WriteOutcome, StoreError> {
        // A NULL expectation never equals a stored marker, so "saw nothing"
        // only wins when the row is still missing.
        let written = sqlx::query_scalar::<_, String>(
            r"
            INSERT INTO module_pointers (kind, module, developer, qa, deploy, general, last_write)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (kind, module) DO UPDATE SET
                developer = EXCLUDED.developer,
                qa = EXCLUDED.qa,
                deploy = EXCLUDED.deploy,
                general = EXCLUDED.general,
                last_write = EXCLUDED.last_write,
                updated_at = now()
            WHERE module_pointers.last_write = $8
            RETURNING module
            ",
        )
        .bind(POINTER_KIND)
        .bind(record.module.as_str())
        .bind(Json(&record.developer))
        .bind(Json(&record.qa))
        .bind(record.deploy.as_stamp().map(Json))
        .bind(record.general.as_stamp().map(Json))
        .bind(record.last_write.as_str())
        .bind(expected.map(Marker::as_str))
        .fetch_optional(self.ready().await?)
        .await?;

        Ok(if written.is_some() {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Conflict
        })
    }
}
