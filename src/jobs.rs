//! Batch orchestration: a declarative YAML job list, run strictly
//! sequentially through the time-series fetcher.
//!
//! Jobs are independent. A job with missing required fields, a bad date
//! expression, or (under `--validate`) no resolvable indicator codes is
//! skipped with a warning; a fetch exhaustion inside a running job is not
//! isolated and aborts the remaining jobs.

use crate::api::{Client, ResponseEncoding};
use crate::data::dedup_codes;
use crate::error::{Error, Result};
use crate::models::{CountrySelector, DateSpec};
use crate::storage;
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level config file shape: a `jobs:` list.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// One batch job. `name` is a label only; `indicators` and `out` are
/// required for the job to run.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub countries: Option<CountriesField>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub out: Option<PathBuf>,
    #[serde(default)]
    pub long: bool,
}

/// Country selection in config: `"all"`, a comma string, or a YAML list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CountriesField {
    One(String),
    Many(Vec<String>),
}

impl CountriesField {
    /// Selector for the job, `All` when the field is `"all"` or empty.
    pub fn to_selector(&self) -> CountrySelector {
        match self {
            CountriesField::One(s) => CountrySelector::parse(s),
            CountriesField::Many(list) => CountrySelector::parse(&list.join(",")),
        }
    }
}

/// Load a jobs config. A missing or unparseable file is a fatal
/// [`Error::Config`].
pub fn load_jobs(path: &Path) -> Result<JobsConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read config {}: {e}", path.display())))?;
    serde_yaml::from_str(&text)
        .map_err(|e| Error::Config(format!("cannot parse config {}: {e}", path.display())))
}

/// Run every job in order, returning the number that completed. Output paths
/// resolve relative to `config_dir` and parent directories are created. With
/// `validate`, indicator codes that don't resolve to metadata are dropped
/// before fetching.
pub fn run_jobs(
    client: &Client,
    config: &JobsConfig,
    config_dir: &Path,
    validate: bool,
    per_page: u32,
) -> Result<usize> {
    if config.jobs.is_empty() {
        warn!("no jobs in config");
        return Ok(0);
    }

    let mut completed = 0;
    for job in &config.jobs {
        let name = job.name.as_deref().unwrap_or("unnamed");
        let Some(out) = job.out.as_ref() else {
            warn!("skipping job {name}: `out` is required");
            continue;
        };
        if job.indicators.is_empty() {
            warn!("skipping job {name}: `indicators` is required");
            continue;
        }
        let date = match job.date.as_deref() {
            Some(expr) => match DateSpec::parse(expr) {
                Some(d) => Some(d),
                None => {
                    warn!("skipping job {name}: bad date expression {expr:?}");
                    continue;
                }
            },
            None => None,
        };

        let mut indicators = dedup_codes(&job.indicators);
        if validate {
            indicators = validated_codes(client, indicators, per_page)?;
            if indicators.is_empty() {
                warn!("skipping job {name}: no valid indicator codes");
                continue;
            }
        }
        let countries = job
            .countries
            .as_ref()
            .map_or(CountrySelector::All, CountriesField::to_selector);

        let frame = client.get_data(
            &indicators,
            &countries,
            date,
            per_page,
            ResponseEncoding::Json,
            job.long,
        )?;
        let path = resolve_out(config_dir, out);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        storage::save(&frame, Some(&path))?;
        completed += 1;
    }
    Ok(completed)
}

/// Keep only codes whose metadata exists. Case-insensitive against the ids
/// the API reports, since the API canonicalizes code casing.
fn validated_codes(client: &Client, codes: Vec<String>, per_page: u32) -> Result<Vec<String>> {
    let known = client.get_indicator_metadata(&codes, None, per_page)?;
    let ids: Vec<String> = known.into_iter().filter_map(|r| r.id).collect();
    Ok(codes
        .into_iter()
        .filter(|code| ids.iter().any(|id| id.eq_ignore_ascii_case(code)))
        .collect())
}

fn resolve_out(config_dir: &Path, out: &Path) -> PathBuf {
    if out.is_absolute() {
        out.to_path_buf()
    } else {
        config_dir.join(out)
    }
}
