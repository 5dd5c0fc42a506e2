mod cli;

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;

use stockcast_core::{Category, ConfidenceLevel, Subject};
use stockcast_forecast::{ForecastConfig, ForecastOrchestrator, SystemClock, ThreadPoolExecutor};
use stockcast_infra::{
    FileModelStore, ForecastRefreshRunner, InMemoryRefreshReportSink, InfraConfig, LoggingReportSink, PgRuntime,
    PostgresForecastCache, PostgresSalesSource,
};

use cli::{Cli, Command, SubjectArgs};

type Orchestrator = ForecastOrchestrator<PostgresSalesSource, FileModelStore, PostgresForecastCache, ThreadPoolExecutor>;

fn main() -> anyhow::Result<()> {
    stockcast_observability::init();
    let cli = Cli::parse();

    let infra = InfraConfig::from_env();
    infra.validate().context("invalid infrastructure configuration")?;
    let config = ForecastConfig::from_env();
    let orchestrator = build(&infra, config)?;

    match cli.command {
        Command::Train { subjects, no_evaluate } => {
            let subjects = resolve(&orchestrator, &subjects)?;
            let summary = orchestrator.train_all(&subjects, !no_evaluate);
            print_json(&summary)
        }
        Command::CrossValidate { subjects } => {
            let subjects = resolve(&orchestrator, &subjects)?;
            let mut reports = Vec::with_capacity(subjects.len());
            for subject in &subjects {
                match orchestrator.cross_validate(subject) {
                    Ok(report) => reports.push(report),
                    Err(e) => tracing::warn!(subject = %subject, error = %e, "cross-validation failed"),
                }
            }
            print_json(&reports)
        }
        Command::Forecast {
            subjects,
            horizon,
            confidence,
        } => {
            let subjects = resolve(&orchestrator, &subjects)?;
            let level = confidence
                .map(ConfidenceLevel::new)
                .transpose()
                .context("invalid --confidence")?;
            let mut results = Vec::with_capacity(subjects.len());
            for subject in &subjects {
                match orchestrator.get_forecast(subject, horizon, level) {
                    Ok(result) => results.push(result),
                    Err(e) => tracing::warn!(subject = %subject, error = %e, "forecast failed"),
                }
            }
            print_json(&results)
        }
        Command::Batch { horizon, category } => {
            let category = category.map(Category::new).transpose().context("invalid --category")?;
            let subjects = orchestrator.active_subjects(category.as_ref())?;
            let summary = orchestrator.run_batch(&subjects, horizon)?;
            print_json(&summary)
        }
        Command::Summary { category, horizon } => {
            let category = category.map(Category::new).transpose().context("invalid --category")?;
            let summary = orchestrator.forecast_summary(category.as_ref(), horizon)?;
            print_json(&summary)
        }
        Command::Refresh { once } => {
            let runner = ForecastRefreshRunner {
                check_interval: infra.refresh_check_interval,
                horizon_days: infra.refresh_horizon_days,
                max_retries: infra.refresh_max_retries,
                ..ForecastRefreshRunner::default()
            };
            if once {
                let sink = InMemoryRefreshReportSink::new();
                runner.refresh_once(&orchestrator, &sink);
                return print_json(&sink.all());
            }
            let _handle = runner.spawn(
                "forecast-refresh",
                Arc::new(orchestrator),
                Arc::new(LoggingReportSink),
                Arc::new(SystemClock),
            )?;
            loop {
                std::thread::park();
            }
        }
    }
}

fn build(infra: &InfraConfig, config: ForecastConfig) -> anyhow::Result<Orchestrator> {
    let Some(url) = infra.database_url.as_deref() else {
        bail!("DATABASE_URL must be set");
    };
    let db = PgRuntime::connect(url, infra.max_connections).context("connecting to postgres")?;
    let cache = PostgresForecastCache::new(db.clone());
    cache.ensure_schema().context("preparing forecast cache table")?;
    let store = FileModelStore::open(&infra.model_dir)
        .with_context(|| format!("opening model directory {}", infra.model_dir.display()))?;

    let timeout = config.subject_timeout_secs.map(std::time::Duration::from_secs);
    let executor = ThreadPoolExecutor::new(infra.workers).with_timeout(timeout);
    let orchestrator = ForecastOrchestrator::new(
        Arc::new(PostgresSalesSource::new(db)),
        Arc::new(store),
        Arc::new(cache),
        config,
        Arc::new(SystemClock),
    )
    .context("invalid forecast configuration")?
    .with_executor(executor);
    Ok(orchestrator)
}

fn resolve(orchestrator: &Orchestrator, args: &SubjectArgs) -> anyhow::Result<Vec<Subject>> {
    if args.is_empty() {
        bail!("specify --sku, --category or --all");
    }
    if args.all {
        return Ok(orchestrator.active_subjects(None)?);
    }
    let skus = args.skus.iter().map(Subject::sku);
    let categories = args.categories.iter().map(Subject::category);
    Ok(skus.chain(categories).collect::<Result<_, _>>()?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{json}");
    Ok(())
}
