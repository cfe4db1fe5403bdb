use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveTime;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use seiva_config::SeivaConfig;
use seiva_core::{BatchResult, ProcessFilter, ScrapeScope};
use seiva_orchestrator::{Orchestrator, OrchestratorLimits, RetryPolicy};

use crate::cli::ScrapeArgs;

pub async fn handle(args: ScrapeArgs, config: &SeivaConfig) -> anyhow::Result<()> {
    let mut institutions = config
        .institution_configs()
        .context("invalid institution configuration")?;

    if !args.institutions.is_empty() {
        for id in &args.institutions {
            if !institutions.iter().any(|i| &i.id == id) {
                anyhow::bail!("unknown institution id: {id}");
            }
        }
        let wanted: HashSet<&str> = args.institutions.iter().map(String::as_str).collect();
        institutions.retain(|i| wanted.contains(i.id.as_str()));
    }
    if institutions.is_empty() {
        anyhow::bail!("no institutions configured; add [[institutions]] entries to the config");
    }

    let scope = ScrapeScope {
        filter: ProcessFilter {
            status: args.status,
            unit: args.unit,
            updated_since: args.since.map(|d| d.and_time(NaiveTime::MIN).and_utc()),
        },
        max_pages: args.max_pages,
    };

    let registry = crate::commands::build_registry(config);
    let sessions = crate::commands::session_manager(config);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(registry),
        sessions.clone(),
        OrchestratorLimits {
            max_concurrent_jobs: config.orchestrator.max_concurrent_jobs,
            per_institution_cap: config.orchestrator.per_institution_cap,
            max_pages: config.orchestrator.max_pages,
        },
        RetryPolicy {
            max_attempts: config.orchestrator.max_attempts,
            base_delay: Duration::from_millis(config.orchestrator.base_delay_ms),
            max_delay: Duration::from_secs(config.orchestrator.max_delay_secs),
        },
    ));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling running jobs");
                cancel.cancel();
            }
        });
    }

    let batch = orchestrator.run_batch(institutions, scope, cancel).await;
    sessions.logout_all().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        print_summary(&batch);
    }

    let failed = batch
        .outcomes
        .values()
        .filter(|outcome| !outcome.is_success())
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} institution(s) failed", batch.outcomes.len());
    }
    Ok(())
}

fn print_summary(batch: &BatchResult) {
    let mut ids: Vec<&String> = batch.outcomes.keys().collect();
    ids.sort();
    for id in ids {
        let outcome = &batch.outcomes[id];
        if let Some(result) = outcome.success() {
            println!(
                "{id:<12} ok      {} process(es) across {} page(s)",
                result.processes.len(),
                result.pages_fetched
            );
        } else if let Some(failure) = outcome.failure() {
            println!(
                "{id:<12} FAILED  {}: {} ({} attempt(s))",
                failure.kind, failure.message, failure.attempts
            );
        }
    }
}
