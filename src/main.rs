use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use nextclose::application::PredictionPipeline;
use nextclose::application::system::CancellationFlag;
use nextclose::config::PipelineConfig;
use nextclose::domain::market::IndicatorFrame;
use nextclose::domain::ml::PipelineOutcome;
use nextclose::infrastructure::{InputFormat, load_path};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Forecast the next daily close from a price history",
    long_about = None
)]
struct Args {
    /// Price history (Alpha Vantage JSON, JSON records or CSV)
    #[arg(long)]
    input: PathBuf,

    /// Input format: auto, alpha-vantage, json or csv
    #[arg(long, default_value = "auto")]
    format: InputFormat,

    /// TOML pipeline configuration. Environment variables are used otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of training epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Seed weight init and shuffling for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Print indicator frames instead of forecasting
    #[arg(long)]
    indicators: bool,
}

#[derive(Serialize)]
struct IndicatorRow<'a> {
    date: NaiveDate,
    close: f64,
    #[serde(flatten)]
    frame: &'a IndicatorFrame,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load Env (before reading any configuration)
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::from_env()?,
    };
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(seed) = args.seed {
        config.model.seed = Some(seed);
    }

    let pipeline = PredictionPipeline::new(config).context("Invalid pipeline configuration")?;

    let series = match load_path(&args.input, args.format) {
        Ok(series) => series,
        Err(e) => {
            warn!("Failed to load {}: {}", args.input.display(), e);
            return finish(PipelineOutcome::from(Err(e)));
        }
    };

    if args.indicators {
        let frames = pipeline.indicators(&series);
        let rows: Vec<IndicatorRow> = series
            .points()
            .iter()
            .zip(&frames)
            .map(|(point, frame)| IndicatorRow {
                date: point.date,
                close: point.close,
                frame,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let cancel = CancellationFlag::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C signal.");
            handle.cancel();
        }
    });

    let result = pipeline.run_async_with_cancel(series, cancel).await;
    finish(PipelineOutcome::from(result))
}

fn finish(outcome: PipelineOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
