// ai
//! 🚛 dlx: loads a gzip NDJSON export into a DynamoDB table.
//!
//! An S3 notification says an export landed. We stream the object, gunzip it on
//! the fly, decode one `{"Item": ...}` per line, write batches of up to 25 with
//! `BatchWriteItem`, and keep resending whatever the table hands back until it
//! has all of it. Then we say how it went in a [`RunReport`].
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! let config = dlx::app_config::load_config(None)?;
//! let (source, writer) = dlx::aws_backends(&config).await;
//! let mut pipeline = dlx::Pipeline::new(
//!     config,
//!     dlx::SourceBackend::S3(source),
//!     dlx::WriterBackend::DynamoDb(writer),
//! )?;
//! let report = pipeline
//!     .run(&dlx::ObjectLocation::new("exports", "daily/part-0001.json.gz"), &Default::default())
//!     .await;
//! println!("{}", serde_json::to_string(&report)?);
//! # Ok(())
//! # }
//! ```

pub mod app_config;
pub mod backends;
pub mod decoder;
pub mod error;
pub mod event;
pub mod item;
pub mod pipeline;
pub mod report;

mod batcher;
mod drainer;
mod executor;
mod lines;
mod progress;

use aws_config::{BehaviorVersion, Region};
use tracing::debug;

pub use app_config::{AppConfig, load_config};
pub use backends::{
    DynamoDbWriter, FileSource, InMemorySource, InMemoryWriter, S3Source, SourceBackend,
    WriteScript, WriterBackend,
};
pub use drainer::RetryConfig;
pub use error::PipelineError;
pub use event::{ObjectLocation, parse_notification};
pub use pipeline::Pipeline;
pub use progress::report_table;
pub use report::RunReport;

/// ☁️ Build the S3 source and DynamoDB writer from one shared AWS config.
///
/// Call once per process and reuse across runs. The region comes from
/// `config.region` when set, otherwise from the usual AWS provider chain.
pub async fn aws_backends(config: &AppConfig) -> (S3Source, DynamoDbWriter) {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let shared = loader.load().await;
    debug!("☁️ AWS clients configured for region {:?}", shared.region());

    (
        S3Source::new(aws_sdk_s3::Client::new(&shared)),
        DynamoDbWriter::new(aws_sdk_dynamodb::Client::new(&shared)),
    )
}
