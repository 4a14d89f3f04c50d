//! Offline training entrypoint: ingest a daily CSV (or generate a seeded
//! synthetic history), engineer features, fit, and save the artifact pair.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use airwatch::config::Config;
use airwatch::domain::{Observation, ObservationStore};
use airwatch::ml::artifact;
use airwatch::ml::features::{FeatureEngineer, ImputationBaseline};
use airwatch::ml::training::{build_training_set, synthetic_observations, ModelTrainer};
use airwatch::telemetry;

#[derive(Debug, Parser)]
#[command(name = "train", about = "Train the AirWatch AQI classifier offline")]
struct Args {
    /// EPA-style daily CSV with Date,AQI,temp_max,wind_avg,precip,rh_avg columns
    #[arg(long, conflicts_with = "synthetic")]
    data: Option<PathBuf>,

    /// Generate a seeded synthetic history instead of reading a CSV
    #[arg(long)]
    synthetic: bool,

    #[arg(long, default_value_t = 1000)]
    synthetic_days: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output directory for the artifact pair; defaults to the configured one
    #[arg(long)]
    artifacts: Option<PathBuf>,

    #[arg(long, default_value = "statewide-nj")]
    location: String,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "AQI")]
    aqi: Option<f64>,
    temp_max: f64,
    wind_avg: f64,
    precip: f64,
    rh_avg: f64,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let args = Args::parse();
    let cfg = Config::load()?;

    let observations = if args.synthetic {
        info!(days = args.synthetic_days, seed = args.seed, "generating synthetic history");
        synthetic_observations(args.synthetic_days, args.seed, &args.location)
    } else {
        let path = args
            .data
            .as_deref()
            .context("pass --data <csv> or --synthetic")?;
        read_csv(path, &args.location)?
    };
    info!(days = observations.len(), "loaded observations");

    let mut store = ObservationStore::new();
    for obs in observations {
        obs.validate().map_err(anyhow::Error::msg)?;
        store.record(obs);
    }
    let history = store.full_history(&args.location);

    let baseline = ImputationBaseline::from_observations(&history);
    let engineer = FeatureEngineer::new(
        cfg.pipeline.feature_config(),
        cfg.pipeline.holiday_calendar(),
    );
    let samples = build_training_set(&history, &engineer, &baseline);
    info!(samples = samples.len(), "engineered training samples");

    let trainer = ModelTrainer::new(cfg.training.clone());
    let model = trainer.fit(&samples, baseline)?;

    let out = args
        .artifacts
        .unwrap_or_else(|| PathBuf::from(&cfg.model.artifact_dir));
    artifact::save(&model, &out)?;

    let m = &model.metadata;
    info!(
        model_id = %m.model_id,
        kind = %m.kind,
        threshold = model.threshold,
        precision = m.metrics.precision,
        recall = m.metrics.recall,
        pr_auc = m.metrics.pr_auc,
        roc_auc = m.metrics.roc_auc,
        brier = m.metrics.brier,
        dir = %out.display(),
        "training complete"
    );
    Ok(())
}

fn read_csv(path: &Path, location: &str) -> Result<Vec<Observation>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for row in reader.deserialize() {
        let row: CsvRow = row.context("malformed CSV row")?;
        out.push(Observation {
            date: row.date,
            location_id: location.to_string(),
            pm25: None,
            aqi: row.aqi.map(|a| a.round().clamp(0.0, 500.0) as u16),
            temp_max: row.temp_max,
            wind_avg: row.wind_avg,
            precip: row.precip,
            rh_avg: row.rh_avg,
        });
    }
    out.sort_by_key(|o| o.date);
    Ok(out)
}
