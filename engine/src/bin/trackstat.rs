use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use shared::{AnalysisResult, FilterCriteria};
use track_engine::{
    TrackEngine,
    config::EngineConfig,
    error::{EngineError, TrackError},
    gpx_io::{self, TrackDocument},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "TRACKSTAT_CONFIG";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Trip statistics, filtering and simplification for GPX tracks"
)]
struct Cli {
    /// JSON file with engine thresholds (falls back to $TRACKSTAT_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print statistics for each GPX file as JSON
    Analyze {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Skip the resampled elevation profile
        #[arg(long)]
        no_profile: bool,
    },
    /// Keep only the points matching one criterion
    Filter {
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        criteria: FilterArgs,
    },
    /// Reduce point count with Ramer-Douglas-Peucker
    Simplify {
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Tolerance in meters
        #[arg(long)]
        tolerance: Option<f64>,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = true)]
struct FilterArgs {
    /// Start of the time window (RFC 3339)
    #[arg(long, requires = "end", conflicts_with_all = ["min_speed", "max_speed", "outliers"])]
    start: Option<DateTime<Utc>>,
    /// End of the time window (RFC 3339)
    #[arg(long, requires = "start")]
    end: Option<DateTime<Utc>>,
    /// Minimum speed in m/s
    #[arg(long, requires = "max_speed", conflicts_with = "outliers")]
    min_speed: Option<f64>,
    /// Maximum speed in m/s
    #[arg(long, requires = "min_speed")]
    max_speed: Option<f64>,
    /// Remove GPS glitches
    #[arg(long)]
    outliers: bool,
    /// Outlier speed threshold in m/s
    #[arg(long, requires = "outliers")]
    speed_threshold: Option<f64>,
    /// Outlier elevation jump threshold in meters
    #[arg(long, requires = "outliers")]
    elevation_threshold: Option<f64>,
}

impl FilterArgs {
    fn criteria(&self, engine: &TrackEngine) -> Option<FilterCriteria> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            return Some(FilterCriteria::TimeRange { start, end });
        }
        if let (Some(min), Some(max)) = (self.min_speed, self.max_speed) {
            return Some(FilterCriteria::SpeedRange { min, max });
        }
        if self.outliers {
            let config = engine.config();
            return Some(FilterCriteria::Outliers {
                speed_threshold: self
                    .speed_threshold
                    .unwrap_or(config.outlier_speed_threshold_mps),
                elevation_threshold: self
                    .elevation_threshold
                    .unwrap_or(config.outlier_elevation_threshold_m),
            });
        }
        None
    }
}

#[derive(Serialize)]
struct FileReport<'a> {
    file: &'a Path,
    result: AnalysisResult,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "track_engine=info,trackstat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let engine = TrackEngine::new(load_config(cli.config.as_deref())?);

    match cli.command {
        Command::Analyze { inputs, no_profile } => analyze(&engine, &inputs, no_profile)?,
        Command::Filter {
            input,
            output,
            criteria,
        } => {
            let criteria = criteria
                .criteria(&engine)
                .ok_or("choose one of --start/--end, --min-speed/--max-speed or --outliers")?;
            transform(&input, &output, |document| {
                document.map_sequences(|points| engine.apply(points, &criteria))
            })?;
        }
        Command::Simplify {
            input,
            output,
            tolerance,
        } => {
            transform(&input, &output, |document| {
                document.map_sequences(|points| engine.simplify(points, tolerance))
            })?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, TrackError> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            tracing::info!("loading engine config from {}", path.display());
            Ok(EngineConfig::from_path(&path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn analyze(engine: &TrackEngine, inputs: &[PathBuf], no_profile: bool) -> Result<(), TrackError> {
    let results = inputs
        .par_iter()
        .map(|path| {
            let document = gpx_io::read_path(path)?;
            let result = if no_profile {
                engine.analyze_summary(&document.sequences)?
            } else {
                engine.analyze(&document.sequences)?
            };
            tracing::info!(
                "{}: {:.2} km, +{:.0} m / -{:.0} m, moving {:?} of {:?}",
                path.display(),
                result.total_distance / 1000.0,
                result.total_ascent,
                result.total_descent,
                result.moving_time(),
                result.total_time()
            );
            Ok(FileReport { file: path, result })
        })
        .collect::<Result<Vec<_>, TrackError>>()?;

    for report in &results {
        let line = serde_json::to_string(report).map_err(std::io::Error::other)?;
        println!("{line}");
    }
    Ok(())
}

fn transform<F>(input: &Path, output: &Path, apply: F) -> Result<(), TrackError>
where
    F: FnOnce(&TrackDocument) -> Result<TrackDocument, EngineError>,
{
    let document = gpx_io::read_path(input)?;
    let transformed = apply(&document)?;
    tracing::info!(
        "{} -> {}: {} -> {} points",
        input.display(),
        output.display(),
        document.point_count(),
        transformed.point_count()
    );
    gpx_io::write_path(&transformed, output)?;
    Ok(())
}
