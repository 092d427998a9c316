//! # API to S3
//!
//! One-shot ingestion run:
//!
//! 1. Load the layered configuration (files, then the encrypted cloud
//!    overlay if requested, then environment variables, then flags).
//! 2. Start run logging to the console and the run's log file.
//! 3. Fetch the API payload into a one-column table.
//! 4. Mask PII columns and append (or overwrite) the Parquet object in S3,
//!    then ship the log file next to it.
//!
//! Any failure ends the process with a non-zero exit code.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use lib_common::configs::config_cloud::cloud_config_requested;
use lib_common::configs::{
    apply_env_overrides, flatten_json, get_runtime_config, load_cloud_config, PipelineConfig,
};
use lib_common::core::{RunContext, WriteMode};
use lib_common::ingestors::JsonFieldIngestor;
use lib_common::loggers::LoggerLocal;
use lib_common::storage::ObjectStorage;
use lib_common::uploaders::S3Uploader;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fetches API data, masks PII and writes it to a Parquet object in S3", long_about = None)]
struct Args {
    /// Directory holding the JSON configuration files.
    #[arg(long, env = "CONFIGS_LOCATION")]
    config_dir: Option<PathBuf>,
    /// Object key of the data file. Overrides `Target:Path`.
    #[arg(long)]
    target: Option<String>,
    /// `append` or `overwrite`. Overrides `Target:Mode`.
    #[arg(long)]
    mode: Option<WriteMode>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config = load_config(&args).await?;
    let run = RunContext::new(
        config.task_name.clone(),
        config.environment.clone(),
        config.log_dir.clone(),
        config.scratch_dir.clone(),
    );

    LoggerLocal::new(&run, Some(config.log_options.clone()))
        .context("Failed to prepare logging")?
        .init()
        .context("Failed to initialize logging")?;

    info!(
        run = %run,
        bucket = %config.s3.bucket_name,
        target = %config.target_path,
        mode = %config.target_mode,
        "Starting pipeline"
    );

    if let Err(e) = execute(&config, &run).await {
        error!(error = %format!("{:#}", e), "Pipeline failed");
        return Err(e);
    }
    Ok(())
}

async fn load_config(args: &Args) -> Result<PipelineConfig> {
    let runtime_config =
        get_runtime_config(args.config_dir.as_deref()).context("Failed to load configuration files")?;
    let mut options = runtime_config.config_options.clone();

    if cloud_config_requested() {
        let cloud = load_cloud_config(None, None)
            .await
            .context("Failed to load cloud configuration")?;
        options.extend(flatten_json(&cloud));
    }
    apply_env_overrides(&mut options, |name| std::env::var(name).ok());

    let mut config = PipelineConfig::from_options(&options, &runtime_config.config_running_mode)
        .context("Invalid pipeline configuration")?;

    if let Some(target) = &args.target {
        config.target_path = target.clone();
    }
    if let Some(mode) = args.mode {
        config.target_mode = mode;
    }
    Ok(config)
}

async fn execute(config: &PipelineConfig, run: &RunContext) -> Result<()> {
    let ingestor = JsonFieldIngestor::new(config.api.clone())?;
    let table = ingestor.fetch().await.context("Failed to fetch API data")?;

    let storage = Arc::new(ObjectStorage::s3(&config.s3).context("Failed to create S3 client")?);
    let uploader = S3Uploader::new(storage, config.pii_columns.clone(), config.retry);

    let report = uploader
        .upload(table, &config.target_path, config.target_mode, run)
        .await
        .context("Upload failed")?;

    info!(
        data_url = %report.data_url,
        log_url = ?report.log_url,
        rows_uploaded = report.rows_uploaded,
        total_rows = report.total_rows,
        attempts = report.attempts,
        "Pipeline finished"
    );
    Ok(())
}
