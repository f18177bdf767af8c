//! Causalyx batch assessor.
//!
//! Loads configuration and the knowledge base, builds the causality engine,
//! and runs every case bundle in the configured input file through it with
//! recorded collaborators and template explanations. The batch report is
//! written as JSON to the configured output path, or stdout.

mod collaborators;
mod config;
mod explanation;
mod runner;

use std::sync::Arc;

use anyhow::Context;
use causalyx_assess::CausalityEngine;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::collaborators::{RecordedAssessments, RecordedObservations};
use crate::config::{Config, ConfigSource, LoggingConfig};
use crate::explanation::TemplateExplanationService;
use crate::runner::{load_bundles, BatchRunner};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let (config, source) = Config::load()?;
    init_tracing(&config.logging);

    info!("Causalyx starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match &source {
        ConfigSource::File(path) => info!(
            path = %path.display(),
            input = %config.batch.input.display(),
            workers = config.batch.workers,
            "Configuration loaded"
        ),
        ConfigSource::Defaults(path) => {
            tracing::warn!("Config file not found: {}", path.display());
            tracing::warn!("Running with built-in defaults. Copy causalyx.example.toml to causalyx.toml to override.");
        }
    }

    let kb = Arc::new(config.load_knowledge_base()?);
    info!(
        version = %kb.version,
        subtypes = kb.subtypes.len(),
        protocols = kb.protocols.len(),
        "Knowledge base ready"
    );

    let engine = Arc::new(CausalityEngine::new(Arc::clone(&kb), config.engine_config())?);

    let bundles = load_bundles(&config.batch.input).await?;
    info!(bundles = bundles.len(), "Case bundles loaded");

    let runner = BatchRunner::new(
        engine,
        Arc::new(RecordedObservations::from_bundles(&bundles)),
        Arc::new(RecordedAssessments::from_bundles(&bundles)),
        Arc::new(TemplateExplanationService::new(kb)),
    )
    .with_workers(config.batch.workers);

    let cases = bundles.into_iter().map(|b| b.case).collect();
    let report = runner.run(cases).await;

    let json = serde_json::to_string_pretty(&report)?;
    match &config.batch.output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), run_id = %report.run_id, "Report written");
        }
        None => println!("{json}"),
    }

    Ok(())
}
