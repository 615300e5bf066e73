//! Time-series fetch and reshape: per-indicator fetches assembled into one
//! long-form table, optionally pivoted wide.
//!
//! The long form is the canonical shape: one row per observation with columns
//! `countryiso3code, country, indicator, date, value`, keyed by
//! `(countryiso3code, indicator, date)`. The wide form pivots that key into
//! one row per `(countryiso3code, country, date)` with one column per
//! indicator; combinations with no observation are null cells, never zero.

use crate::api::{Client, RawTable, ResponseEncoding, enc_join};
use crate::error::Result;
use crate::frame::{Cell, Frame};
use crate::models::{CountrySelector, DateSpec, Observation};
use ahash::AHashSet;
use log::info;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Canonical long-form column order.
pub const LONG_COLUMNS: [&str; 5] = ["countryiso3code", "country", "indicator", "date", "value"];

/// Split comma-separated entries, trim, and drop duplicates preserving the
/// first occurrence.
pub fn dedup_codes(indicators: &[String]) -> Vec<String> {
    let mut seen = AHashSet::new();
    let mut out = Vec::new();
    for entry in indicators {
        for code in entry.split(',') {
            let code = code.trim();
            if !code.is_empty() && seen.insert(code.to_string()) {
                out.push(code.to_string());
            }
        }
    }
    out
}

impl Client {
    /// Fetch observations for `indicators` over the selected countries and
    /// optional date range, as a long or wide frame.
    ///
    /// Indicator entries may themselves be comma-separated; codes are
    /// deduplicated preserving first occurrence and fetched one at a time, in
    /// that order. An empty code list, or one where every indicator yields
    /// zero rows, returns an empty frame with the canonical long-form columns
    /// rather than an error. Rows are sorted by
    /// `(countryiso3code, indicator, date)` ascending with null dates last.
    pub fn get_data(
        &self,
        indicators: &[String],
        countries: &CountrySelector,
        date: Option<DateSpec>,
        per_page: u32,
        encoding: ResponseEncoding,
        long: bool,
    ) -> Result<Frame> {
        let codes = dedup_codes(indicators);
        if codes.is_empty() {
            return Ok(Frame::new(LONG_COLUMNS));
        }

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(d) = date {
            params.push(("date", d.to_query_param()));
        }

        let mut observations: Vec<Observation> = Vec::new();
        for code in &codes {
            let path = format!(
                "country/{}/indicator/{}",
                countries.path_segment(),
                enc_join([code.as_str()])
            );
            let rows = match encoding {
                ResponseEncoding::Json => {
                    observations_from_json(&self.fetch_paged(&path, &params, per_page)?, code)
                }
                ResponseEncoding::Table => melt_table(&self.fetch_table(&path, &params)?, code),
            };
            if rows.is_empty() {
                info!("indicator {code}: no observations, skipping");
                continue;
            }
            observations.extend(rows);
        }

        if observations.is_empty() {
            return Ok(Frame::new(LONG_COLUMNS));
        }
        sort_observations(&mut observations);
        if long {
            Ok(long_frame(&observations))
        } else {
            Ok(wide_frame(&observations))
        }
    }
}

/// Project JSON envelope rows into observations. Nothing is dropped here:
/// null values stay as null-valued rows in the long form.
fn observations_from_json(rows: &[Value], code: &str) -> Vec<Observation> {
    rows.iter()
        .map(|r| Observation {
            countryiso3code: r
                .get("countryiso3code")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            country: r
                .get("country")
                .and_then(|c| c.get("value"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            indicator: code.to_string(),
            date: r.get("date").and_then(parse_year),
            value: r.get("value").and_then(Value::as_f64),
        })
        .collect()
}

fn parse_year(v: &Value) -> Option<i32> {
    match v {
        Value::String(s) => s.trim().parse::<i32>().ok(),
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        _ => None,
    }
}

/// Melt a wide CSV download into long-form observations.
///
/// Header columns of exactly four ASCII digits are year columns; everything
/// else identifies the row. One output row per (input row, year column) whose
/// cell coerces to a number; empty and non-numeric cells are dropped. The
/// indicator is the requested code, not the table's `Indicator Code` column.
fn melt_table(table: &RawTable, code: &str) -> Vec<Observation> {
    let year_columns: Vec<(usize, i32)> = table
        .columns
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| year_of(name).map(|year| (idx, year)))
        .collect();
    let iso3_column = table.columns.iter().position(|c| c == "Country Code");
    let country_column = table.columns.iter().position(|c| c == "Country Name");

    let mut out = Vec::new();
    for row in &table.rows {
        let field = |column: Option<usize>| -> String {
            column
                .and_then(|idx| row.get(idx))
                .cloned()
                .unwrap_or_default()
        };
        let iso3 = field(iso3_column);
        let country = field(country_column);
        for &(idx, year) in &year_columns {
            let Some(value) = row.get(idx).and_then(|cell| parse_value(cell)) else {
                continue;
            };
            out.push(Observation {
                countryiso3code: iso3.clone(),
                country: country.clone(),
                indicator: code.to_string(),
                date: Some(year),
                value: Some(value),
            });
        }
    }
    out
}

/// Year columns are exactly four ASCII digits (`2010`), nothing else.
fn year_of(name: &str) -> Option<i32> {
    if name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse::<i32>().ok()
    } else {
        None
    }
}

fn parse_value(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok()
}

/// Stable sort by `(countryiso3code, indicator, date)`, null dates last.
fn sort_observations(observations: &mut [Observation]) {
    observations.sort_by(|a, b| {
        (&a.countryiso3code, &a.indicator, a.date.is_none(), a.date).cmp(&(
            &b.countryiso3code,
            &b.indicator,
            b.date.is_none(),
            b.date,
        ))
    });
}

fn long_frame(observations: &[Observation]) -> Frame {
    let mut frame = Frame::new(LONG_COLUMNS);
    for o in observations {
        frame.push_row(vec![
            Cell::Str(o.countryiso3code.clone()),
            Cell::Str(o.country.clone()),
            Cell::Str(o.indicator.clone()),
            o.date.into(),
            o.value.into(),
        ]);
    }
    frame
}

/// Pivot sorted long-form observations into one row per
/// `(countryiso3code, country, date)` with one column per indicator code, in
/// ascending code order. The first value wins when a key is duplicated.
fn wide_frame(observations: &[Observation]) -> Frame {
    let mut codes: BTreeSet<&str> = BTreeSet::new();
    for o in observations {
        codes.insert(&o.indicator);
    }

    // key sorts like the long form: empty iso3 first, null dates last
    type RowKey<'a> = (&'a str, &'a str, (bool, Option<i32>));
    let mut groups: BTreeMap<RowKey, BTreeMap<&str, Option<f64>>> = BTreeMap::new();
    for o in observations {
        let key = (
            o.countryiso3code.as_str(),
            o.country.as_str(),
            (o.date.is_none(), o.date),
        );
        groups
            .entry(key)
            .or_default()
            .entry(o.indicator.as_str())
            .or_insert(o.value);
    }

    let mut columns: Vec<String> = vec!["countryiso3code".into(), "country".into(), "date".into()];
    columns.extend(codes.iter().map(|c| (*c).to_string()));
    let mut frame = Frame::new(columns);
    for ((iso3, country, (_, date)), values) in &groups {
        let mut row: Vec<Cell> = vec![
            Cell::Str((*iso3).to_string()),
            Cell::Str((*country).to_string()),
            (*date).into(),
        ];
        for code in &codes {
            row.push(values.get(code).copied().flatten().into());
        }
        frame.push_row(row);
    }
    frame
}
