use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use module_registry::artifact::{self, ArtifactPattern, ModuleFilter};
use module_registry::config::Config;
use module_registry::publish::Publisher;
use module_registry::records::postgres::PgRecordStore;
use module_registry::ring::http::HttpRingStore;

/// Record freshly built frontend modules and advance their rollout ring.
#[derive(Debug, Parser)]
#[command(name = "module-registry", version)]
struct Cli {
    /// Build output directory holding `<module>-<hash>.<ext>` artifacts.
    dist: PathBuf,

    /// Module to publish; repeatable.
    #[arg(long = "module", required_unless_present = "pattern")]
    modules: Vec<String>,

    /// Artifact extension used with `--module`.
    #[arg(long, default_value = "js")]
    ext: String,

    /// Raw artifact pattern with `(name)` and `(version)` capture groups; repeatable.
    #[arg(long)]
    pattern: Vec<String>,

    /// Only publish modules whose name contains this.
    #[arg(long, env = "MODULE_REGISTRY_ONLY")]
    only: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("MODULE_REGISTRY_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let cfg = Config::load();
    let flags = cfg.promotion_flags();

    let mut patterns = Vec::new();
    for module in &cli.modules {
        patterns.push(ArtifactPattern::for_module(module, &cli.ext)?);
    }
    for raw in &cli.pattern {
        patterns.push(ArtifactPattern::new(raw)?);
    }

    let filter = ModuleFilter::new(cli.only.as_deref());
    let mut artifacts = Vec::new();
    for pattern in &patterns {
        match artifact::discover(&cli.dist, pattern).await? {
            Some(found) if filter.matches(&found.module) => artifacts.push(found),
            Some(found) => tracing::info!(module = %found.module, "filtered out, skipping"),
            None => tracing::info!(pattern = pattern.as_str(), "no artifact found, skipping"),
        }
    }

    let mut publisher = Publisher::new()
        .with_retry(cfg.retry_policy())
        .with_log_ttl(cfg.log_ttl());

    // An unreachable database surfaces per module, not here.
    let records = match &cfg.database_url {
        Some(url) => Some(PgRecordStore::connect_lazy(url, cfg.db_acquire_timeout())?),
        None => {
            tracing::info!("no record store configured");
            None
        }
    };
    if let Some(store) = &records {
        publisher = publisher.with_records(Arc::new(store.clone()));
    }

    if let Some(url) = &cfg.ring_url {
        let store = HttpRingStore::new(url, &cfg.ring_project, cfg.ring_token.clone())?;
        publisher = publisher.with_ring(Arc::new(store));
    } else {
        tracing::info!("no rollout ring store configured");
    }

    tracing::info!(
        modules = artifacts.len(),
        force_beta = flags.force_beta,
        force_prod = flags.force_prod,
        "publishing"
    );

    let reports = publisher.publish_batch(&artifacts, flags).await;

    if let Some(store) = &records
        && let Err(e) = store.reap_expired().await
    {
        tracing::warn!(error = %e, "failed to reap expired log entries");
    }
    let mut failed = 0_usize;
    for report in &reports {
        println!("{report}");
        if !report.is_success() {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} module(s) failed to publish", reports.len());
    }
    Ok(())
}
