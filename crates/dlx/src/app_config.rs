//! 🔧 App Configuration: the sacred env-to-struct pipeline.
//!
//! 📡 Every knob a run needs, read once, handed around by value. 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 📐 Layering, lowest to highest precedence:
//!   1. `AWS_REGION` (the variable the Lambda runtime hands everyone)
//!   2. `REGION`, `TABLE_NAME`, `BATCH_SIZE`, `PAYLOAD_KEY`, `PAYLOAD_ENCODING`
//!   3. `RETRY__MAX_ATTEMPTS`, `RETRY__INITIAL_BACKOFF_MS`, `RETRY__MAX_BACKOFF_MS`
//!   4. an optional TOML file with the same keys, lower-case, retry knobs under `[retry]`
//!
//! This is the ONE place the process environment is read. Everything downstream
//! receives an [`AppConfig`] by value. No statics, no globals, no surprises.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::decoder::PayloadEncoding;
use crate::drainer::RetryConfig;
use crate::error::PipelineError;

/// 🧱 DynamoDB's hard ceiling on items per `BatchWriteItem`. Not a suggestion.
pub const MAX_BATCH_SIZE: usize = 25;

// 🏷️ the plain, unprefixed names the loader has always answered to
const ENV_KEYS: [&str; 5] = [
    "REGION",
    "TABLE_NAME",
    "BATCH_SIZE",
    "PAYLOAD_KEY",
    "PAYLOAD_ENCODING",
];

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🌎 Region for both the bucket and the table. `None` lets the AWS default chain decide.
    #[serde(default)]
    pub region: Option<String>,
    /// 📋 Destination table. Required. A loader with nowhere to load is just a decompressor.
    pub table_name: String,
    /// 🧺 Items per bulk write, 1..=25.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 🔑 Wrapper key holding each row in the export.
    #[serde(default = "default_payload_key")]
    pub payload_key: String,
    #[serde(default)]
    pub payload_encoding: PayloadEncoding,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_payload_key() -> String {
    "Item".to_string()
}

impl AppConfig {
    /// ✅ Refuse impossible knobs before anything touches the network.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.table_name.trim().is_empty() {
            return Err(PipelineError::Config("TABLE_NAME must not be empty".to_string()));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(PipelineError::Config(format!(
                "BATCH_SIZE must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.payload_key.is_empty() {
            return Err(PipelineError::Config("PAYLOAD_KEY must not be empty".to_string()));
        }
        self.retry.validate()
    }
}

/// 🏗️ The layered figment, before extraction. Split out so tests can add layers of their own.
pub fn figment(config_file_name: Option<&Path>) -> Figment {
    let config = Figment::new()
        .merge(Env::raw().only(&["AWS_REGION"]).map(|_| "region".into()))
        .merge(Env::raw().only(&ENV_KEYS))
        .merge(
            Env::raw()
                .filter(|key| key.as_str().to_ascii_lowercase().starts_with("retry__"))
                .split("__"),
        );

    match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    }
}

/// ✅ Extract and validate from any figment.
pub fn from_figment(figment: Figment) -> anyhow::Result<AppConfig> {
    let config: AppConfig = figment
        .extract()
        .context("💀 Failed to parse configuration. TABLE_NAME is required; the rest have defaults.")?;
    config
        .validate()
        .context("💀 Configuration parsed, but the values make no sense together.")?;
    Ok(config)
}

/// 🚀 Load the config from the environment, plus a TOML file if one was given.
///
/// 📐 If `config_file_name` is None, env vars only. No file. No assumptions.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new("<environment only>"))
    );

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to load configuration from file '{}' and environment variables.",
            path.display()
        ),
        None => "💀 Failed to load configuration from environment variables. \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    from_figment(figment(config_file_name)).context(context_msg)
}
