use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the fetch/normalize/export pipeline.
///
/// Transient failures (network errors, 5xx statuses, malformed bodies) are
/// retried inside the client and never surface individually; only
/// [`Error::FetchExhausted`] does, carrying the last underlying failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Every retry attempt for one request failed.
    #[error("request failed after {attempts} attempts: {last}")]
    FetchExhausted { attempts: u32, last: String },

    /// Non-retryable HTTP status (4xx). Client errors such as an unknown
    /// endpoint do not consume the retry budget.
    #[error("request failed with HTTP {status} for {url}")]
    ClientStatus { status: u16, url: String },

    /// Response body did not match the expected shape. Only observed as the
    /// `last` text inside [`Error::FetchExhausted`]; shape mismatches are
    /// retried like transport failures.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// Bad or missing configuration (config file, date expression, output
    /// destination constraints).
    #[error("configuration error: {0}")]
    Config(String),

    /// Output format requested but not compiled in.
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "yaml")]
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}
