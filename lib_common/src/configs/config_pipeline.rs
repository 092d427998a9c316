//! # Pipeline Configuration
//!
//! Turns the flattened, lowercased option map produced by
//! [`super::config_sys`] (optionally overlaid with the cloud configuration)
//! into the typed settings of one pipeline run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::WriteMode;
use crate::ingestors::{normalize_base_url, ApiSource};
use crate::loggers::LoggerLocalOptions;
use crate::storage::S3Settings;
use crate::uploaders::RetryPolicy;

use super::ConfigError;

const DEFAULT_TASK_NAME: &str = "api_to_s3";
const DEFAULT_TARGET_PATH: &str = "demo/api_data.parquet";
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 2000;

/// Environment variables and the option keys they override.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("S3_BUCKET_NAME", "s3:bucketname"),
    ("AWS_REGION", "s3:region"),
    ("AWS_ENDPOINT", "s3:endpoint"),
    ("AWS_ACCESS_KEY_ID", "s3:accesskeyid"),
    ("AWS_SECRET_ACCESS_KEY", "s3:secretaccesskey"),
    ("PII_COLUMNS", "piicolumns"),
    ("TASK_NAME", "taskname"),
    ("ENVIRONMENT", "environment"),
    ("RETRY_ATTEMPTS", "retry:attempts"),
];

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Task name used in log names and keys.
    pub task_name: String,
    /// Environment used in remote log keys.
    pub environment: String,
    /// Bucket and credentials.
    pub s3: S3Settings,
    /// Columns to mask before upload.
    pub pii_columns: Vec<String>,
    /// Upload retry policy.
    pub retry: RetryPolicy,
    /// Endpoint to ingest from.
    pub api: ApiSource,
    /// Key of the data object.
    pub target_path: String,
    /// How the data object is written.
    pub target_mode: WriteMode,
    /// Local directory of run log files.
    pub log_dir: PathBuf,
    /// Local directory of scratch Parquet files.
    pub scratch_dir: PathBuf,
    /// Console and file logging options.
    pub log_options: LoggerLocalOptions,
}

impl PipelineConfig {
    /// Parses `options`. `default_environment` applies when `Environment` is unset.
    ///
    /// # Errors
    /// `MissingValue` when `S3:BucketName` is absent, `InvalidValue` when a
    /// number, boolean or write mode does not parse.
    pub fn from_options(
        options: &BTreeMap<String, String>,
        default_environment: &str,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            options
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        let bucket_name = get("s3:bucketname")
            .ok_or_else(|| ConfigError::MissingValue("S3:BucketName".to_string()))?
            .to_string();

        let s3 = S3Settings {
            bucket_name,
            region: get("s3:region").map(str::to_string),
            endpoint: get("s3:endpoint").map(str::to_string),
            access_key_id: get("s3:accesskeyid").map(str::to_string),
            secret_access_key: get("s3:secretaccesskey").map(str::to_string),
            allow_http: parse_or(get("s3:allowhttp"), "S3:AllowHttp", false)?,
            conditional_writes: parse_or(get("s3:conditionalwrites"), "S3:ConditionalWrites", true)?,
        };

        let retry = RetryPolicy::new(
            parse_or(get("retry:attempts"), "Retry:Attempts", DEFAULT_RETRY_ATTEMPTS)?,
            Duration::from_millis(parse_or(get("retry:backoffms"), "Retry:BackoffMs", DEFAULT_BACKOFF_MS)?),
        );

        let default_api = ApiSource::default();
        let api = ApiSource {
            base_url: get("api:baseurl").map_or(default_api.base_url, normalize_base_url),
            path: get("api:path").map_or(default_api.path, str::to_string),
            field: get("api:field").map_or(default_api.field, str::to_string),
            column: get("api:column").map_or(default_api.column, str::to_string),
        };

        let target_mode = match get("target:mode") {
            Some(raw) => WriteMode::from_str(raw).map_err(|e| ConfigError::InvalidValue {
                key: "Target:Mode".to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            })?,
            None => WriteMode::default(),
        };

        let default_log_options = LoggerLocalOptions::default();
        let log_options = LoggerLocalOptions {
            use_tty: parse_or(get("log:console"), "Log:Console", default_log_options.use_tty)?,
            use_file: default_log_options.use_file,
            level: get("log:level").map_or(default_log_options.level, str::to_string),
        };

        Ok(Self {
            task_name: get("taskname").unwrap_or(DEFAULT_TASK_NAME).to_string(),
            environment: get("environment").unwrap_or(default_environment).to_string(),
            s3,
            pii_columns: pii_columns(options),
            retry,
            api,
            target_path: get("target:path").unwrap_or(DEFAULT_TARGET_PATH).to_string(),
            target_mode,
            log_dir: get("log:dir").map_or_else(std::env::temp_dir, PathBuf::from),
            scratch_dir: get("scratch:dir").map_or_else(std::env::temp_dir, PathBuf::from),
            log_options,
        })
    }
}

/// Overlays environment variables onto `options`.
///
/// `lookup` resolves a variable name; the binary passes `std::env::var`.
/// A `PII_COLUMNS` override replaces any indexed `piicolumns:N` entries.
pub fn apply_env_overrides(
    options: &mut BTreeMap<String, String>,
    lookup: impl Fn(&str) -> Option<String>,
) {
    for (var, key) in ENV_OVERRIDES {
        if let Some(value) = lookup(var) {
            if *key == "piicolumns" {
                options.retain(|k, _| !k.starts_with("piicolumns:"));
            }
            options.insert((*key).to_string(), value);
        }
    }
}

/// PII columns from `piicolumns:N` entries (in index order) and/or a comma list in `piicolumns`.
fn pii_columns(options: &BTreeMap<String, String>) -> Vec<String> {
    let mut indexed: Vec<(usize, &String)> = options
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix("piicolumns:")
                .and_then(|index| index.parse::<usize>().ok())
                .map(|index| (index, value))
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);

    let listed = options
        .get("piicolumns")
        .into_iter()
        .flat_map(|value| value.split(','));

    let mut columns: Vec<String> = Vec::new();
    for name in indexed.into_iter().map(|(_, v)| v.as_str()).chain(listed) {
        let name = name.trim();
        if !name.is_empty() && !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    }
    columns
}

fn parse_or<T>(raw: Option<&str>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .to_ascii_lowercase()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            }),
    }
}
