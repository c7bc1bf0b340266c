//! `genomen`: run a trait analysis over genotype datasets from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use genomen_common::{Config, DataSet};
use genomen_core::{
    AnalysisRegistry, AnalysisRequest, ImporterRegistry, InMemoryStore, Orchestrator,
    OrchestratorDeps, ReportBuilder, RequestEvent, Scheduler, TraitAnalyzer, TraitReporter,
    TwentyThreeAndMeImporter,
};
use genomen_logic::ScriptEngine;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "genomen", version, about = "Genomic trait analysis over expert-system rules")]
struct Cli {
    /// Rule catalog (JSON, or YAML by extension).
    #[arg(long)]
    rules: PathBuf,

    /// Dataset as NAME:FORMAT:FILE (repeatable).
    #[arg(long = "dataset", value_parser = parse_dataset)]
    datasets: Vec<DataSet>,

    /// Restrict the analysis to these sample ids (repeatable).
    #[arg(long = "sample")]
    samples: Vec<String>,

    /// Analyses to run (repeatable).
    #[arg(long = "analysis", default_values_t = [TraitAnalyzer::TAG.to_string()])]
    analyses: Vec<String>,

    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    name: Option<String>,

    /// Where to write the JSON report. Printed to stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Report formats requested from downstream renderers (repeatable).
    #[arg(long = "format")]
    formats: Vec<String>,

    /// Keep imported samples after the task finishes.
    #[arg(long, default_value_t = false)]
    persist: bool,

    /// Configuration file. Defaults to GENOMEN_CONFIG or ./genomen.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// `NAME:FORMAT:FILE`; the file part may itself contain `:`.
fn parse_dataset(arg: &str) -> std::result::Result<DataSet, String> {
    let mut parts = arg.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(format), Some(file)) if !name.is_empty() && !format.is_empty() && !file.is_empty() => {
            Ok(DataSet::new(name, vec![file.to_string()], format))
        }
        _ => Err(format!("expected NAME:FORMAT:FILE, got `{arg}`")),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_path(path)
            .with_context(|| format!("reading configuration {}", path.display()));
    }
    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            warn!("Using default configuration: {e}");
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("genomen=info,info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    if cli.datasets.is_empty() && cli.samples.is_empty() {
        bail!("nothing to analyse: pass at least one --dataset or --sample");
    }

    let store = Arc::new(
        InMemoryStore::from_catalog_file(&cli.rules)
            .with_context(|| format!("loading rules from {}", cli.rules.display()))?,
    );

    let mut importers = ImporterRegistry::new();
    importers.register(Arc::new(TwentyThreeAndMeImporter::new(store.clone())));

    let mut analyses = AnalysisRegistry::new();
    analyses.register(Arc::new(TraitAnalyzer::new(
        store.clone(),
        store.clone(),
        Arc::new(ScriptEngine::new()),
        &config.task,
    )));

    let orchestrator = Orchestrator::new(OrchestratorDeps {
        rules: store.clone(),
        data: store.clone(),
        tasks: store.clone(),
        importers,
        analyses,
        reports: ReportBuilder::new().with_reporter(Arc::new(TraitReporter::new(store.clone()))),
        config: config.task.clone(),
    });

    let scheduler = Scheduler::new(orchestrator, &config.scheduler);
    scheduler.start();

    let mut request = AnalysisRequest::new(cli.datasets, cli.analyses)
        .with_samples(cli.samples)
        .with_formats(cli.formats)
        .with_language(cli.language.unwrap_or_else(|| config.report.language.clone()))
        .with_name(cli.name.unwrap_or_else(|| config.report.name.clone()))
        .with_persist_datasets(cli.persist);
    if let Some(output) = &cli.output {
        request = request.with_output_path(output.display().to_string());
    }
    let request = Arc::new(request);

    let mut events = request.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RequestEvent::StateChanged { state, .. } => eprintln!("[{}] {}", state.id(), state),
                RequestEvent::ErrorAdded { error, .. } => eprintln!("error {}: {}", error.kind.id(), error),
            }
        }
    });

    scheduler.submit(request.clone());
    request.wait().await;
    scheduler.stop().await;
    if let Err(e) = printer.await {
        warn!(error = %e, "Progress printer failed");
    }

    let reports = request.reports();
    let json = serde_json::to_string_pretty(&reports)?;
    match request.output_path() {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing report to {path}"))?;
            info!(path, reports = reports.len(), "Report written");
        }
        None => println!("{json}"),
    }

    if !request.is_finished() {
        bail!("request did not run: {:?}", request.errors());
    }
    Ok(())
}
