//! CLI for clothing size estimation.
//!
//! Usage:
//!   tryon-size predict measurements.json             # Human-readable output
//!   tryon-size predict measurements.json --json      # JSON output
//!   tryon-size train --synthetic 1000                # Train on generated data
//!   tryon-size train --data sizes.csv --model-type random_forest
//!   tryon-size generate 500 -o sizes.csv             # Write a synthetic table
//!   tryon-size measure landmarks.json --width 720 --height 1280

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tryon_size::{
    calculate_body_measurements, extract_key_points, generate_synthetic_data, pose_confidence, EstimatorConfig,
    Measurements, ModelType, PoseLandmark, Prediction, PredictionMethod, SizeEstimator, SizeLabel, Trainer, TrainingData,
    TrainingReport,
};

const DEFAULT_SYNTHETIC_SAMPLES: usize = 1000;

#[derive(Parser, Debug)]
#[command(name = "tryon-size")]
#[command(author, version, about = "Clothing size estimation from body measurements", long_about = None)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict a size from a JSON object of measurements
    Predict {
        measurements: PathBuf,

        /// Confidence below which the prediction is flagged
        #[arg(long)]
        threshold: Option<f64>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Train a size model and save it
    Train {
        /// Training table (CSV)
        #[arg(long, conflicts_with = "synthetic")]
        data: Option<PathBuf>,

        /// Train on this many synthetic samples
        #[arg(long)]
        synthetic: Option<usize>,

        /// xgboost / gradient_boosting or random_forest
        #[arg(long, default_value = "xgboost")]
        model_type: ModelType,

        /// Model output path (default: from config)
        #[arg(long)]
        model_out: Option<PathBuf>,

        /// Scaler output path (default: from config)
        #[arg(long)]
        scaler_out: Option<PathBuf>,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Write a synthetic training table
    Generate {
        samples: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output file (CSV)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Measure a body from a JSON array of 33 pose landmarks
    Measure {
        landmarks: PathBuf,

        /// Image width in pixels
        #[arg(long)]
        width: u32,

        /// Image height in pixels
        #[arg(long)]
        height: u32,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct MeasureOutput {
    landmarks: usize,
    key_points: usize,
    pose_confidence: f32,
    measurements: Measurements,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = EstimatorConfig::load(args.config.as_deref())?;
    init_logging(&config, args.verbose);
    debug!(?config, "Configuration loaded");

    match &args.command {
        Command::Predict {
            measurements,
            threshold,
            json,
        } => {
            let text = std::fs::read_to_string(measurements)?;
            let measurements: Measurements = serde_json::from_str(&text)?;

            let estimator = SizeEstimator::from_config(&config);
            let threshold = threshold.unwrap_or(config.confidence_threshold);
            let prediction = estimator.predict_size(&measurements, threshold);

            if *json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                print!("{}", format_prediction(&prediction, threshold));
            }
        }

        Command::Train {
            data,
            synthetic,
            model_type,
            model_out,
            scaler_out,
            seed,
            json,
        } => {
            let table = match data {
                Some(path) => {
                    info!("Loading training data from {}", path.display());
                    TrainingData::from_csv(path)?
                }
                None => {
                    let n = synthetic.unwrap_or(DEFAULT_SYNTHETIC_SAMPLES);
                    info!("Generating {} synthetic samples", n);
                    generate_synthetic_data(n, *seed)
                }
            };

            let trained = Trainer::new(*model_type).with_seed(*seed).train(&table)?;

            let model_path = model_out.as_ref().unwrap_or(&config.model_path);
            let scaler_path = scaler_out.as_ref().unwrap_or(&config.scaler_path);
            trained.save(model_path, Some(scaler_path.as_path()))?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&trained.report)?);
            } else {
                print!("{}", format_report(&trained.report));
                println!("\nModel:  {}", model_path.display());
                println!("Scaler: {}", scaler_path.display());
            }
        }

        Command::Generate { samples, seed, output } => {
            let table = generate_synthetic_data(*samples, *seed);
            table.to_csv(output)?;
            info!("Wrote {} samples to {}", table.len(), output.display());
        }

        Command::Measure {
            landmarks,
            width,
            height,
            json,
        } => {
            let text = std::fs::read_to_string(landmarks)?;
            let landmarks: Vec<PoseLandmark> = serde_json::from_str(&text)?;

            let key_points = extract_key_points(&landmarks);
            let output = MeasureOutput {
                landmarks: landmarks.len(),
                key_points: key_points.len(),
                pose_confidence: pose_confidence(&landmarks),
                measurements: calculate_body_measurements(&key_points, *width, *height),
            };

            if *json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print!("{}", format_measure(&output));
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` wins, then `--verbose`, then the configured level.
fn init_logging(config: &EstimatorConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_prediction(p: &Prediction, threshold: f64) -> String {
    let mut s = String::new();

    s.push_str(&format!("Predicted size: {}\n", p.predicted_size));
    s.push_str(&format!("Confidence:     {:.2}", p.confidence));
    if p.confidence < threshold {
        s.push_str(" (low)");
    }
    s.push('\n');
    s.push_str(&format!("Method:         {}\n", method_name(p)));

    if let Some(probs) = &p.all_probabilities {
        s.push_str("\nProbabilities:\n");
        for (label, prob) in SizeLabel::ALL.iter().zip(probs) {
            s.push_str(&format!("  {:<4} {:.3}\n", label.as_str(), prob));
        }
    }

    s.push_str("\nMeasurements used:\n");
    for (name, value) in p.measurements_used.iter() {
        match value.as_f64() {
            Some(v) => s.push_str(&format!("  {:<16} {:.1}\n", name, v)),
            None => s.push_str(&format!("  {:<16} {}\n", name, value)),
        }
    }

    s
}

fn method_name(p: &Prediction) -> &'static str {
    match p.method {
        PredictionMethod::Model => "model",
        PredictionMethod::RuleBased => "rule-based",
    }
}

fn format_report(report: &TrainingReport) -> String {
    let mut s = String::new();

    s.push_str(&format!("Model type: {}\n", report.model_type));
    s.push_str(&format!(
        "Samples:    {} train, {} test\n",
        report.train_samples, report.test_samples
    ));
    s.push_str(&format!("Accuracy:   {:.3}\n\n", report.accuracy));
    s.push_str(&report.classification_report.to_string());

    s.push_str("\nFeature importance:\n");
    let mut importance: Vec<_> = report.feature_importance.iter().collect();
    importance.sort_by(|a, b| b.1.total_cmp(a.1));
    for (name, value) in importance {
        s.push_str(&format!("  {:<16} {:.3}\n", name, value));
    }

    s
}

fn format_measure(output: &MeasureOutput) -> String {
    let mut s = String::new();

    s.push_str(&format!(
        "Landmarks: {} ({} key points visible)\n",
        output.landmarks, output.key_points
    ));
    s.push_str(&format!("Pose confidence: {:.2}\n", output.pose_confidence));

    if output.measurements.is_empty() {
        s.push_str("\nNo measurements available.\n");
        return s;
    }

    s.push_str("\nMeasurements (px):\n");
    for (name, value) in output.measurements.iter() {
        s.push_str(&format!("  {:<16} {}\n", name, value));
    }

    s
}
