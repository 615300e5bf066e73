//! wbpull
//!
//! A small client for the World Bank Open Data API (v2): fetch country
//! metadata, indicator metadata, and indicator time series, and export them
//! to CSV, Parquet, or YAML. Pairs with the `wbpull` CLI.
//!
//! ### Features
//! - Paginated, retrying fetches of both response encodings: the JSON
//!   `[header, rows]` envelope and the single-shot CSV download
//! - Flat country/indicator metadata records, with per-code lookup and
//!   client-side search
//! - Long (tidy) or wide (one column per indicator) observation tables
//! - Output format chosen by destination extension; console preview when no
//!   destination is given
//!
//! ### Example
//! ```no_run
//! use wbpull::api::ResponseEncoding;
//! use wbpull::models::{CountrySelector, DateSpec};
//! use wbpull::{Client, storage};
//!
//! let client = Client::default();
//! let frame = client.get_data(
//!     &["SP.POP.TOTL".into()],
//!     &CountrySelector::parse("DEU,USA"),
//!     DateSpec::parse("2010:2020"),
//!     1000,
//!     ResponseEncoding::Json,
//!     true,
//! )?;
//! storage::save(&frame, Some(std::path::Path::new("pop_2010_2020.csv")))?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod api;
pub mod data;
pub mod error;
pub mod frame;
#[cfg(feature = "yaml")]
pub mod jobs;
pub mod metadata;
pub mod models;
pub mod storage;

pub use api::{Client, ResponseEncoding, RetryPolicy};
pub use error::{Error, Result};
pub use frame::{Cell, Frame};
pub use models::{CountrySelector, DateSpec};
