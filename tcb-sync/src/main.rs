//! tcb-sync binary entry point

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tcb_common::config::SyncConfig;
use tcb_sync::jobs::{self, JobOutcome};
use tcb_sync::{build_router, AppState, HubSpotClient, JobRegistry};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SyncConfig::load().context("loading configuration")?;
    let client = Arc::new(HubSpotClient::new(config.clone()).context("building CRM client")?);
    let state = Arc::new(AppState {
        jobs: JobRegistry::new(config.clone(), client),
        config,
    });

    if let Some(minutes) = state.config.schedule_minutes {
        let scheduled = Arc::clone(&state);
        tokio::spawn(async move {
            run_schedule(scheduled, minutes).await;
        });
        info!(minutes, "Scheduled runs enabled");
    }

    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Trigger API listening");

    axum::serve(listener, build_router(state))
        .await
        .context("serving trigger API")?;
    Ok(())
}

/// Periodic full pass: messages, then contacts, then associations. A failed
/// job is logged and the pass continues; the next tick starts fresh.
async fn run_schedule(state: Arc<AppState>, minutes: u64) {
    const SEQUENCE: [&str; 5] = [
        jobs::JOB_SYNC_MESSAGES_TIGO,
        jobs::JOB_SYNC_MESSAGES_CLARO,
        jobs::JOB_SYNC_CONTACTS_TIGO,
        jobs::JOB_SYNC_CONTACTS_CLARO,
        jobs::JOB_ASSOCIATE,
    ];

    let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        info!("Scheduled pass starting");
        for name in SEQUENCE {
            match state.jobs.run(name).await {
                Ok(JobOutcome::Completed(report)) => {
                    info!(job = name, %report, "Scheduled job finished");
                }
                Ok(JobOutcome::Skipped { job }) => {
                    warn!(job = %job, "Scheduled job skipped; previous run still active");
                }
                Err(e) => {
                    error!(job = name, error = %e, "Scheduled job failed");
                }
            }
        }
    }
}
