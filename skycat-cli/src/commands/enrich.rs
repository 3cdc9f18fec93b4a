//! One-shot enrichment command.

use crate::error::CliError;
use clap::Args;
use skycat::catalog::Identifier;
use skycat::config::{QueryConfig, StoreConfig};
use skycat::query::{BundledCatalog, EnrichmentPolicy, HttpResolver};
use skycat::service::CatalogService;
use std::sync::Arc;
use std::time::Duration;

/// Arguments for the enrich subcommand.
#[derive(Debug, Args)]
pub struct EnrichArgs {
    /// Identifiers to enrich (e.g. "HD 48915" "HIP 32349")
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Remote lookup endpoint; the identifier is appended as a path segment
    #[arg(long)]
    pub endpoint: String,

    /// Provenance name recorded for remote results
    #[arg(long, default_value = "simbad")]
    pub source: String,

    /// Re-query everything, replacing cached records
    #[arg(long)]
    pub force: bool,

    /// Treat cached records older than this many days as stale
    #[arg(long)]
    pub max_age_days: Option<u64>,

    /// Outbound queries per second
    #[arg(long, default_value_t = 5.0)]
    pub rate: f64,

    /// Per-lookup timeout in seconds
    #[arg(long, default_value_t = 20)]
    pub timeout_secs: u64,
}

/// Run the enrich subcommand.
pub fn run(store_config: StoreConfig, args: EnrichArgs) -> Result<(), CliError> {
    let timeout = Duration::from_secs(args.timeout_secs);
    let resolver = HttpResolver::new(&args.endpoint, &args.source, timeout)
        .map_err(|e| CliError::Resolver(e.to_string()))?;

    let query_config = QueryConfig::new()
        .with_queries_per_second(args.rate)
        .with_timeout(timeout);

    let mut policy = EnrichmentPolicy::new().with_force_refresh(args.force);
    if let Some(days) = args.max_age_days {
        policy = policy.with_max_age(Duration::from_secs(days * 24 * 3600));
    }

    let ids: Vec<Identifier> = args.ids.iter().map(|id| Identifier::new(id.as_str())).collect();

    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    runtime.block_on(async {
        let service = CatalogService::open(store_config, query_config, Arc::new(resolver))?
            .with_local_catalog(Box::new(BundledCatalog));

        let (records, summary) = service.enrich_objects(&ids, &policy).await?;

        for (id, record) in &records {
            if record.is_terminal() {
                println!("{}: unavailable", id);
            } else {
                let parts: Vec<String> = record
                    .fields
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect();
                println!("{}: {}", id, parts.join(", "));
            }
        }

        println!();
        println!(
            "{} resolved, {} failed, {} cache hits, {} retries in {:.1}s",
            summary.success_count,
            summary.failure_count,
            summary.cache_hit_count,
            summary.retry_count,
            summary.elapsed.as_secs_f64()
        );
        for failure in &summary.error_log {
            println!("  failed {}: {}", failure.id, failure.cause);
        }

        service.close();
        Ok(())
    })
}
