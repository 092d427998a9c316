//! # JSON Field Ingestor
//!
//! Issues one GET against a REST endpoint, expects a JSON object, and turns one
//! of its array fields into a single-column record table. The default source
//! is the Dog CEO random-image endpoint, whose `message` field holds image URLs.
//!
//! The fetch is deliberately single-shot: no retry, no pagination and no
//! rate-limit handling. A failed request is returned to the caller as-is.

use arrow::record_batch::RecordBatch;
use reqwest::{Method, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::retrieve::ky_http::ApiClient;
use crate::tables::{from_json_values, TableError};

/// Errors raised while fetching and shaping the API payload.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or its body could not be decoded as JSON.
    #[error("Request to {url} failed: {message}")]
    Request {
        /// Target URL.
        url: String,
        /// Transport or decode failure.
        message: String,
    },

    /// The server answered with a non-2xx status.
    #[error("Request to {url} returned HTTP {status}: {body}")]
    Status {
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Raw response body, if it could be read.
        body: String,
    },

    /// The JSON body does not have the expected shape.
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    /// The extracted values could not be turned into a table.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Where and what to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSource {
    /// Absolute base URL.
    pub base_url: String,
    /// Path joined onto `base_url`.
    pub path: String,
    /// Top-level JSON field holding the array of values.
    pub field: String,
    /// Name of the resulting table column.
    pub column: String,
}

impl Default for ApiSource {
    fn default() -> Self {
        Self {
            base_url: "https://dog.ceo/".to_string(),
            path: "api/breeds/image/random/5".to_string(),
            field: "message".to_string(),
            column: "image_url".to_string(),
        }
    }
}

impl ApiSource {
    /// The absolute URL `path` resolves to under `base_url`.
    ///
    /// # Errors
    /// Returns `FetchError::Request` if the base URL is not absolute.
    pub fn endpoint(&self) -> Result<Url, FetchError> {
        let base = normalize_base_url(&self.base_url);
        Url::parse(&base)
            .and_then(|url| url.join(&self.path))
            .map_err(|e| FetchError::Request {
                url: format!("{base}{}", self.path),
                message: e.to_string(),
            })
    }
}

/// Appends the trailing `/` that makes `path` resolve under the base URL's last segment.
pub fn normalize_base_url(base_url: &str) -> String {
    let base_url = base_url.trim();
    if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    }
}

/// # JSON Field Ingestor
///
/// Fetches [`ApiSource`] and projects `field` into a one-column table.
pub struct JsonFieldIngestor {
    client: ApiClient,
    source: ApiSource,
}

impl JsonFieldIngestor {
    /// Creates an ingestor whose client never retries.
    ///
    /// # Errors
    /// Returns `FetchError::Request` if the base URL is invalid.
    pub fn new(source: ApiSource) -> Result<Self, FetchError> {
        let base_url = normalize_base_url(&source.base_url);
        let client = ApiClient::new(&base_url, None, 0).map_err(|e| FetchError::Request {
            url: base_url.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { client, source })
    }

    /// The configured source.
    pub fn source(&self) -> &ApiSource {
        &self.source
    }

    /// Performs the GET and returns the projected table.
    pub async fn fetch(&self) -> Result<RecordBatch, FetchError> {
        let url = self.source.endpoint()?.to_string();

        let response = self
            .client
            .request::<Value, ()>(Method::GET, &self.source.path, None, None)
            .await
            .map_err(|e| FetchError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if !response.success {
            return Err(FetchError::Status {
                url,
                status: response.status,
                body: response.error_body.unwrap_or_default(),
            });
        }

        let body = response
            .data
            .ok_or_else(|| FetchError::UnexpectedShape("empty response body".to_string()))?;
        let table = project_field(&body, &self.source.field, &self.source.column)?;

        info!(url = %url, rows = table.num_rows(), column = %self.source.column, "Fetched API data");
        Ok(table)
    }
}

/// Extracts `body[field]` (an array of scalars) into a table column named `column`.
pub fn project_field(body: &Value, field: &str, column: &str) -> Result<RecordBatch, FetchError> {
    let values = match body.get(field) {
        Some(Value::Array(values)) => values,
        Some(other) => {
            return Err(FetchError::UnexpectedShape(format!(
                "field '{field}' is not an array (found {})",
                json_kind(other)
            )))
        }
        None => {
            return Err(FetchError::UnexpectedShape(format!(
                "field '{field}' is missing from the response"
            )))
        }
    };

    from_json_values(column, values).map_err(|e| match e {
        TableError::UnsupportedValue { index, kind, .. } => FetchError::UnexpectedShape(format!(
            "field '{field}' element {index} is an {kind}, expected a scalar"
        )),
        other => FetchError::Table(other),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
