//! CLI entry point for the force-plate ingestion tool.
//!
//! Provides subcommands for running the full scoring pipeline, building a
//! population baseline, scoring a saved payload offline, listing profiles and
//! clearing checkpoint logs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use forceplate_ingest::analyzers::composite::{best_trial, outlier_metric};
use forceplate_ingest::analyzers::types::TestType;
use forceplate_ingest::analyzers::weights::CompositeWeights;
use forceplate_ingest::checkpoint;
use forceplate_ingest::config::{ApiConfig, BaselinePolicy, PipelineConfig, SamplingConfig};
use forceplate_ingest::infra::forcedecks::ForceDecksClient;
use forceplate_ingest::output::{CsvSink, S3Sink, Sink};
use forceplate_ingest::parser::{extract_table, parse_payload};
use forceplate_ingest::pipeline::{self, resilient_source};
use forceplate_ingest::stats::PopulationStats;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "forceplate_ingest")]
#[command(about = "Score force-plate tests and load them into the warehouse", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct PipelineArgs {
    /// Test protocol to process
    #[arg(short, long, value_enum, default_value_t = TestType::Cmj)]
    test_type: TestType,

    /// Only tests modified at or after this instant (RFC 3339)
    #[arg(long, default_value = "2021-01-01T00:00:00Z")]
    since: DateTime<Utc>,

    /// Minimum spacing between API requests, in milliseconds
    #[arg(long, default_value_t = 500)]
    min_interval_ms: u64,

    /// Maximum number of API requests in flight
    #[arg(long, default_value_t = 2)]
    max_in_flight: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 20)]
    timeout_secs: u64,

    /// Proactive token refresh interval in seconds
    #[arg(long, default_value_t = 1800)]
    token_refresh_secs: u64,

    /// Sample every Nth athlete for the population baseline
    #[arg(long, default_value_t = 1)]
    sample_stride: usize,

    /// Maximum number of tests fetched for the population baseline
    #[arg(long)]
    sample_cap: Option<usize>,

    /// Workers fetching the population sample
    #[arg(long, default_value_t = 3)]
    sample_workers: usize,

    /// Score against this saved baseline instead of sampling the population
    #[arg(long, value_name = "FILE")]
    fixed_baseline: Option<PathBuf>,

    /// Save the baseline used by this run
    #[arg(long, value_name = "FILE")]
    save_baseline: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct CheckpointArgs {
    /// Log of athletes already handled
    #[arg(long, default_value = "processed_athletes.txt")]
    processed_log: PathBuf,

    /// Log of athletes that failed, with the reason
    #[arg(long, default_value = "failed_athletes.txt")]
    failed_log: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full ingestion pipeline
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        checkpoint: CheckpointArgs,

        /// Directory to write CSV tables to
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Optional: S3 bucket to upload the batch to instead of local CSV
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: Gzip compress the uploaded CSV
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// Workers fetching tests for one athlete
        #[arg(long, default_value_t = 2)]
        test_workers: usize,

        /// Process athletes recorded in the failed log again
        #[arg(long, default_value_t = false)]
        retry_failed: bool,

        /// Keep tests whose best trial has a metric beyond 3 standard deviations
        #[arg(long, default_value_t = false)]
        keep_outlier_tests: bool,

        /// Pause between athletes, in milliseconds
        #[arg(long, default_value_t = 1000)]
        athlete_pause_ms: u64,
    },
    /// Build the population baseline and save it
    Baseline {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Where to write the baseline JSON
        #[arg(short, long, default_value = "baseline.json")]
        output: PathBuf,
    },
    /// Score a saved trial payload against a saved baseline
    Score {
        /// Path to the raw trials JSON
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Baseline JSON to score against
        #[arg(short, long, default_value = "baseline.json")]
        baseline: PathBuf,
    },
    /// List athlete profiles from the source
    ListProfiles,
    /// Delete the checkpoint logs
    ClearCheckpoints {
        #[command(flatten)]
        checkpoint: CheckpointArgs,
    },
}

impl PipelineArgs {
    fn into_config(self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            test_type: self.test_type,
            since: self.since,
            min_request_interval: Duration::from_millis(self.min_interval_ms),
            max_in_flight: self.max_in_flight,
            token_refresh_interval: Duration::from_secs(self.token_refresh_secs),
            fetch_timeout: Duration::from_secs(self.timeout_secs),
            sampling: SamplingConfig {
                stride: self.sample_stride,
                cap: self.sample_cap,
                workers: self.sample_workers,
            },
            baseline: match self.fixed_baseline {
                Some(path) => BaselinePolicy::Fixed(path),
                None => BaselinePolicy::Recompute,
            },
            save_baseline: self.save_baseline,
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/forceplate_ingest.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("forceplate_ingest.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(LevelFilter::INFO.into()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(LevelFilter::DEBUG.into()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline: args,
            checkpoint,
            output_dir,
            s3_bucket,
            gzip,
            test_workers,
            retry_failed,
            keep_outlier_tests,
            athlete_pause_ms,
        } => {
            let config = PipelineConfig {
                test_workers,
                retry_failed,
                reject_outlier_tests: !keep_outlier_tests,
                athlete_pause: Duration::from_millis(athlete_pause_ms),
                processed_log: checkpoint.processed_log,
                failed_log: checkpoint.failed_log,
                ..args.into_config()
            };

            let sink: Box<dyn Sink> = match s3_bucket {
                Some(bucket) => {
                    let run_id = uuid::Uuid::new_v4().to_string();
                    info!(bucket = %bucket, gzip, run_id = %run_id, "S3 sink enabled");
                    Box::new(S3Sink::from_env(bucket, gzip, run_id).await)
                }
                None => Box::new(CsvSink::new(output_dir)),
            };

            let client = Arc::new(source_client(&config)?);
            pipeline::run(client.clone(), client, sink.as_ref(), &config).await?;
        }
        Commands::Baseline {
            pipeline: args,
            output,
        } => {
            let mut config = args.into_config();
            config.save_baseline = Some(output);
            let client = Arc::new(source_client(&config)?);
            let stats = pipeline::build_baseline(client.clone(), client, &config).await?;
            for (metric, b) in &stats.metrics {
                info!(metric = %metric, mean = b.mean, std = b.std, count = b.count, "Baseline");
            }
        }
        Commands::Score { file, baseline } => {
            score_file(&file, &baseline)?;
        }
        Commands::ListProfiles => {
            list_profiles().await?;
        }
        Commands::ClearCheckpoints { checkpoint } => {
            let removed = checkpoint::clear(&checkpoint.processed_log, &checkpoint.failed_log)?;
            if removed.is_empty() {
                info!("No checkpoint logs to clear");
            }
        }
    }

    Ok(())
}

fn source_client(config: &PipelineConfig) -> Result<ForceDecksClient> {
    let api_config = ApiConfig::from_env()?;
    ForceDecksClient::new(api_config, config.fetch_timeout).context("building HTTP client")
}

/// Scores a saved payload and logs every trial's composite score.
#[tracing::instrument(skip_all, fields(file = %file.display()))]
fn score_file(file: &Path, baseline: &Path) -> Result<()> {
    let stats = PopulationStats::load(baseline)?;
    let bytes =
        std::fs::read(file).with_context(|| format!("reading payload {}", file.display()))?;
    let trials = parse_payload(&bytes)?;
    let table = extract_table(&trials);
    let weights = CompositeWeights::for_test_type(stats.test_type);

    info!(
        test_type = %stats.test_type,
        metrics = table.len(),
        trials = table.trial_count(),
        "Payload extracted"
    );

    let Some(best) = best_trial(&table, &weights, &stats) else {
        warn!("No trial produced a composite score");
        return Ok(());
    };

    for (i, score) in best.scores.iter().enumerate() {
        match score {
            Some(s) => info!(trial = i + 1, score = *s, "Trial score"),
            None => info!(trial = i + 1, "Trial has no contributing metric"),
        }
    }
    info!(
        best_trial = best.trial_number(),
        score = best.score,
        "Best trial"
    );
    if let Some(metric) = outlier_metric(&best, &weights, &stats) {
        warn!(metric, "Best trial would be discarded by the outlier gate");
    }
    Ok(())
}

/// Fetches the profile list and logs it with a short summary.
#[tracing::instrument]
async fn list_profiles() -> Result<()> {
    let config = PipelineConfig::default();
    let client = Arc::new(source_client(&config)?);
    let api = resilient_source(client.clone(), client, &config);

    let profiles = api.list_profiles().await?;
    info!(total = profiles.len(), "Profile list fetched");

    for profile in &profiles {
        info!(
            profile_id = %profile.profile_id,
            name = %profile.full_name(),
            date_of_birth = ?profile.date_of_birth,
            "Profile"
        );
    }

    let with_dob = profiles.iter().filter(|p| p.date_of_birth.is_some()).count();
    info!(
        total = profiles.len(),
        with_date_of_birth = with_dob,
        without_date_of_birth = profiles.len() - with_dob,
        "Profile list summary"
    );
    Ok(())
}
