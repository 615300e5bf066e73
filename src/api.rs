//! Synchronous client for the World Bank Open Data API (v2).
//!
//! One [`Client`] is reused for a whole run (connection pooling only; there is
//! no shared state to synchronize). Every request is retried with exponential
//! backoff per [`RetryPolicy`]; pagination of the JSON envelope encoding is
//! handled by [`Client::fetch_paged`], and the single-shot CSV download
//! encoding by [`Client::fetch_table`]. Which encoding an endpoint is read
//! with is an explicit, typed choice ([`ResponseEncoding`]) made by the
//! calling operation, never inferred from response content.

use crate::error::{Error, Result};
use crate::models::Meta;
use log::warn;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::Client as HttpClient;
use reqwest::redirect::Policy;
use serde_json::Value;
use std::time::Duration;

/// Default page size requested from the API.
pub const DEFAULT_PER_PAGE: u32 = 1000;

/// How an endpoint's response is encoded, chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEncoding {
    /// Two-element `[header, rows]` JSON envelope with pagination metadata.
    Json,
    /// Raw comma-separated text body, complete in one response.
    Table,
}

/// Retry/backoff settings for individual HTTP requests.
///
/// Attempt `i` (0-indexed) that fails sleeps `base_backoff * 2^i` before the
/// next attempt; there is no sleep after the final attempt. Defaults match
/// the production behavior (4 attempts, 800 ms base); tests override with a
/// zero backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_backoff: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    /// Pause to take after failed attempt `attempt` (0-indexed).
    fn backoff_after(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt)
    }
}

/// Raw tabular response body: a header row plus string records, straight from
/// the CSV parser. Reshaping into observations happens in `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

// Allow -, _, . unescaped in codes (common for indicator ids)
const SAFE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Percent-encode each part and join with `;`, the API's multi-code separator.
pub(crate) fn enc_join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(|s| percent_encoding::utf8_percent_encode(s.trim(), SAFE).to_string())
        .collect::<Vec<_>>()
        .join(";")
}

#[derive(Debug, Clone)]
pub struct Client {
    pub base_url: String,
    retry: RetryPolicy,
    http: HttpClient,
}

impl Default for Client {
    fn default() -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30)) // total request timeout
            .connect_timeout(Duration::from_secs(10)) // connect timeout
            .redirect(Policy::limited(5)) // cap redirects
            .user_agent(concat!("wbpull/", env!("CARGO_PKG_VERSION"))) // set user agent
            .build()
            .expect("reqwest client build");
        Self {
            base_url: "https://api.worldbank.org/v2".into(),
            retry: RetryPolicy::default(),
            http,
        }
    }
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client against a non-default base URL (tests point this at a stub
    /// server).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every page of a `[header, rows]` endpoint and return the rows
    /// concatenated in page order.
    ///
    /// Sends `format=json`, `per_page`, and `page=1` plus `params`; the first
    /// response's header decides the page count (`pages` absent or
    /// non-numeric counts as 1). An empty first page ends the listing
    /// immediately. Each page request has its own retry budget.
    pub fn fetch_paged(
        &self,
        path: &str,
        params: &[(&str, String)],
        per_page: u32,
    ) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, path);
        let query_for = |page: u32| -> Vec<(&str, String)> {
            let mut q: Vec<(&str, String)> = vec![
                ("format", "json".to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ];
            q.extend(params.iter().map(|(k, v)| (*k, v.clone())));
            q
        };

        let (meta, first_rows) = self.get_with_retry(&url, &query_for(1), parse_envelope)?;
        if first_rows.is_empty() {
            return Ok(first_rows);
        }
        let mut out = first_rows;
        for page in 2..=meta.pages {
            let (_, rows) = self.get_with_retry(&url, &query_for(page), parse_envelope)?;
            out.extend(rows);
        }
        Ok(out)
    }

    /// Fetch a single `[header, rows]` envelope without paginating further.
    ///
    /// Used for endpoints addressed by a unique code (`indicator/{code}`),
    /// where the first page is the whole answer.
    pub fn fetch_envelope(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = vec![("format", "json".to_string())];
        query.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let (_, rows) = self.get_with_retry(&url, &query, parse_envelope)?;
        Ok(rows)
    }

    /// Fetch one endpoint as a raw CSV download (`downloadformat=csv`).
    ///
    /// This encoding carries no pagination metadata and is assumed complete
    /// in a single response. A UTF-8 byte-order mark is stripped before
    /// parsing.
    pub fn fetch_table(&self, path: &str, params: &[(&str, String)]) -> Result<RawTable> {
        let url = format!("{}/{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = vec![("downloadformat", "csv".to_string())];
        query.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        self.get_with_retry(&url, &query, parse_table)
    }

    /// One GET with the retry loop around it.
    ///
    /// Retried: network errors, 5xx statuses, and bodies `decode` rejects.
    /// Not retried: other error statuses (4xx), which fail immediately as
    /// [`Error::ClientStatus`]. After the attempt budget is spent, the last
    /// failure text is carried inside [`Error::FetchExhausted`].
    fn get_with_retry<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
        decode: impl Fn(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let mut last = String::from("no attempts made");
        for attempt in 0..self.retry.attempts {
            if attempt > 0 {
                let pause = self.retry.backoff_after(attempt - 1);
                warn!(
                    "GET {} failed ({}); retry {}/{} in {:?}",
                    url,
                    last,
                    attempt + 1,
                    self.retry.attempts,
                    pause
                );
                std::thread::sleep(pause);
            }
            match self.http.get(url).query(query).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.bytes() {
                            Ok(body) => match decode(&body) {
                                Ok(value) => return Ok(value),
                                Err(e) => last = e.to_string(),
                            },
                            Err(e) => last = format!("read body: {e}"),
                        }
                    } else if status.is_server_error() {
                        last = format!("HTTP {status}");
                    } else {
                        // Client errors are not transient; spending the retry
                        // budget on them only delays the failure.
                        return Err(Error::ClientStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                }
                Err(e) => last = format!("network error: {e}"),
            }
        }
        Err(Error::FetchExhausted {
            attempts: self.retry.attempts,
            last,
        })
    }
}

/// First 200 bytes of a body, for error messages.
fn snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(&body[..body.len().min(200)]).into_owned()
}

/// Parse the `[header, rows]` envelope. `rows` may be `null` (an empty page).
/// Anything else (non-array top level, fewer than two elements as in the
/// API's `message` error envelope, rows that are neither array nor null) is a
/// shape mismatch and gets retried by the caller like a transport failure.
fn parse_envelope(body: &[u8]) -> Result<(Meta, Vec<Value>)> {
    let v: Value =
        serde_json::from_slice(body).map_err(|e| Error::UnexpectedPayload(e.to_string()))?;
    let arr = v
        .as_array()
        .filter(|a| a.len() >= 2)
        .ok_or_else(|| Error::UnexpectedPayload(snippet(body)))?;
    let meta: Meta = serde_json::from_value(arr[0].clone())
        .map_err(|e| Error::UnexpectedPayload(format!("envelope header: {e}")))?;
    let rows = match &arr[1] {
        Value::Array(rows) => rows.clone(),
        Value::Null => Vec::new(),
        other => {
            return Err(Error::UnexpectedPayload(format!(
                "envelope rows are {}",
                match other {
                    Value::Object(_) => "an object",
                    Value::String(_) => "a string",
                    _ => "not a list",
                }
            )));
        }
    };
    Ok((meta, rows))
}

/// Parse a CSV body (UTF-8, optional BOM) into columns + string rows.
fn parse_table(body: &[u8]) -> Result<RawTable> {
    let text = String::from_utf8_lossy(body);
    let text: &str = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| Error::UnexpectedPayload(format!("table header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(Error::UnexpectedPayload("empty table body".to_string()));
    }
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| Error::UnexpectedPayload(format!("table row: {e}")))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTable { columns, rows })
}
