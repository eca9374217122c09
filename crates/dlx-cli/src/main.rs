//! 🚀 dlx-cli: the front door.
//!
//! 🎬 *[narrator voice]* "An export landed in a bucket. Somebody had to carry it to the table."
//!
//! Thin wrapper: set up tracing, parse args, load config, build the AWS clients once,
//! hand the trigger to the library, print the report. JSON goes to stdout, everything
//! meant for eyes goes to stderr. Exit code 1 when the run failed.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dlx::{FileSource, ObjectLocation, Pipeline, RunReport, SourceBackend, WriterBackend};

/// 🚛 Load a gzip NDJSON export into a DynamoDB table.
#[derive(Debug, Parser)]
#[command(name = "dlx", version, about)]
struct Args {
    /// TOML file merged over the environment (TABLE_NAME, BATCH_SIZE, ...)
    #[arg(long)]
    config: Option<PathBuf>,

    /// S3 notification JSON to process; `-` reads stdin
    #[arg(long, default_value = "-", conflicts_with = "file")]
    event: String,

    /// Load a local .gz file instead of fetching from S3
    #[arg(long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 stderr only: stdout belongs to the report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Some(path) = &args.config {
        // 🔒 a missing file is a typo, not an empty layer
        let exists = path.try_exists().with_context(|| {
            format!("💀 Could not check whether config file '{}' exists", path.display())
        })?;
        if !exists {
            anyhow::bail!(
                "💀 Config file '{}' does not exist. Relative paths resolve against the current directory.",
                path.display()
            );
        }
    }

    let app_config = dlx::load_config(args.config.as_deref())
        .context("💀 In dlx-cli, main, the configuration did not load. TABLE_NAME is the usual suspect")?;

    let (s3, dynamodb) = dlx::aws_backends(&app_config).await;

    // 🛑 ctrl-c asks nicely: the run stops at the next batch boundary
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 interrupt received; finishing the current batch, then stopping");
            on_signal.cancel();
        }
    });

    let report = match &args.file {
        Some(path) => {
            info!("📂 development mode: loading {}", path.display());
            let mut pipeline = Pipeline::new(
                app_config,
                SourceBackend::File(FileSource::new(None)),
                WriterBackend::DynamoDb(dynamodb),
            )
            .context("💀 the pipeline refused its configuration")?;
            let location = ObjectLocation::new("local", path.to_string_lossy());
            pipeline.run(&location, &cancel).await
        }
        None => {
            let mut pipeline = Pipeline::new(
                app_config,
                SourceBackend::S3(s3),
                WriterBackend::DynamoDb(dynamodb),
            )
            .context("💀 the pipeline refused its configuration")?;
            run_event_from(&mut pipeline, &args.event, &cancel).await
        }
    };

    eprintln!("{}", dlx::report_table(&report));
    println!(
        "{}",
        serde_json::to_string(&report).context("💀 the report would not serialize")?
    );

    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

/// 📨 Read the trigger and run it. An unreadable trigger is a failed run, and a
/// failed run still gets a report.
async fn run_event_from(pipeline: &mut Pipeline, source: &str, cancel: &CancellationToken) -> RunReport {
    match read_event(source).await {
        Ok(payload) => pipeline.run_event(&payload, cancel).await,
        Err(err) => {
            let message = format!("{err:#}");
            error!("💀 {message}");
            RunReport::failed(message)
        }
    }
}

/// 📨 The trigger payload, from a file or from stdin.
async fn read_event(source: &str) -> Result<String> {
    if source == "-" {
        let mut payload = String::new();
        tokio::io::stdin()
            .read_to_string(&mut payload)
            .await
            .context("💀 could not read the S3 notification from stdin")?;
        return Ok(payload);
    }
    tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("💀 could not read the S3 notification from '{source}'"))
}
