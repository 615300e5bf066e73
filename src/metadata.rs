//! Country and indicator metadata: pure normalizers over the API's raw JSON
//! records, plus the fetch operations that produce them.
//!
//! Normalization flattens two nested shapes. Single-object fields (`region`,
//! `adminregion`, `incomeLevel`, `lendingType`, `source`) become an
//! `<field>_id`/`<field>` pair from their `.id`/`.value` sub-keys; absent or
//! non-object nesting yields `None` for both. The list-of-objects `topics`
//! field projects into two parallel, position-aligned lists, keeping only
//! object entries in source order.

use crate::api::{Client, enc_join};
use crate::error::Result;
use crate::frame::{Cell, Frame};
use crate::models::{CountryRecord, IndicatorRecord};
use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;

/// Column order of the tabular country export.
const COUNTRY_COLUMNS: [&str; 14] = [
    "id",
    "iso2Code",
    "name",
    "region_id",
    "region",
    "adminregion_id",
    "adminregion",
    "incomeLevel_id",
    "incomeLevel",
    "lendingType_id",
    "lendingType",
    "capitalCity",
    "longitude",
    "latitude",
];

/// Column order of the tabular indicator export.
const INDICATOR_COLUMNS: [&str; 9] = [
    "id",
    "name",
    "unit",
    "source_id",
    "source",
    "source_note",
    "source_organization",
    "topics",
    "topic_ids",
];

/// String content of a scalar JSON value. The API is loose with types (ids
/// occasionally arrive as numbers), so numbers are rendered rather than
/// rejected.
fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(raw: &Value, field: &str) -> Option<String> {
    raw.get(field).and_then(scalar_to_string)
}

/// `.id`/`.value` of a nested single-object field, `(None, None)` when the
/// field is absent or not an object.
fn id_value(raw: &Value, field: &str) -> (Option<String>, Option<String>) {
    match raw.get(field) {
        Some(Value::Object(o)) => (
            o.get("id").and_then(scalar_to_string),
            o.get("value").and_then(scalar_to_string),
        ),
        _ => (None, None),
    }
}

/// Flatten one raw country record. Pure; never fails on missing fields.
pub fn normalize_country(raw: &Value) -> CountryRecord {
    let (region_id, region) = id_value(raw, "region");
    let (adminregion_id, adminregion) = id_value(raw, "adminregion");
    let (income_level_id, income_level) = id_value(raw, "incomeLevel");
    let (lending_type_id, lending_type) = id_value(raw, "lendingType");
    CountryRecord {
        id: str_field(raw, "id"),
        iso2_code: str_field(raw, "iso2Code"),
        name: str_field(raw, "name"),
        region_id,
        region,
        adminregion_id,
        adminregion,
        income_level_id,
        income_level,
        lending_type_id,
        lending_type,
        capital_city: str_field(raw, "capitalCity"),
        longitude: str_field(raw, "longitude"),
        latitude: str_field(raw, "latitude"),
    }
}

/// Flatten one raw indicator record. Pure; never fails on missing fields.
///
/// Non-object entries in `topics` are dropped silently; entries missing a
/// sub-key contribute `None` at their position so the two projections stay
/// aligned.
pub fn normalize_indicator(raw: &Value) -> IndicatorRecord {
    let (source_id, source) = id_value(raw, "source");
    let mut topics = Vec::new();
    let mut topic_ids = Vec::new();
    if let Some(Value::Array(entries)) = raw.get("topics") {
        for entry in entries {
            if let Value::Object(o) = entry {
                topic_ids.push(o.get("id").and_then(scalar_to_string));
                topics.push(o.get("value").and_then(scalar_to_string));
            }
        }
    }
    IndicatorRecord {
        id: str_field(raw, "id"),
        name: str_field(raw, "name"),
        unit: str_field(raw, "unit"),
        source_id,
        source,
        source_note: str_field(raw, "sourceNote"),
        source_organization: str_field(raw, "sourceOrganization"),
        topics,
        topic_ids,
    }
}

impl Client {
    /// Full country listing, normalized to flat records.
    pub fn get_country_metadata(&self, per_page: u32) -> Result<Vec<CountryRecord>> {
        let rows = self.fetch_paged("country", &[], per_page)?;
        Ok(rows.iter().map(normalize_country).collect())
    }

    /// Indicator metadata records.
    ///
    /// With `codes`, one request per code (the API has no batch metadata
    /// endpoint), concatenated in input order; a code that returns no record
    /// contributes nothing. Without `codes`, the full paginated catalog,
    /// optionally retaining only records whose code or name contains `search`
    /// as a case-insensitive substring. `search` is ignored when `codes` is
    /// non-empty.
    pub fn get_indicator_metadata(
        &self,
        codes: &[String],
        search: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<IndicatorRecord>> {
        if !codes.is_empty() {
            let mut out = Vec::new();
            for code in codes {
                let path = format!("indicator/{}", enc_join([code.as_str()]));
                let rows = self.fetch_envelope(&path, &[])?;
                if rows.is_empty() {
                    warn!("indicator {code}: no metadata record, skipping");
                }
                out.extend(rows.iter().map(normalize_indicator));
            }
            return Ok(out);
        }

        let rows = self.fetch_paged("indicator", &[], per_page)?;
        let mut records: Vec<IndicatorRecord> = rows.iter().map(normalize_indicator).collect();
        if let Some(term) = search {
            let needle = term.to_lowercase();
            records.retain(|r| {
                contains_ci(r.id.as_deref(), &needle) || contains_ci(r.name.as_deref(), &needle)
            });
        }
        Ok(records)
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

/// Country records as a frame with the canonical export columns.
pub fn countries_frame(records: &[CountryRecord]) -> Frame {
    let mut frame = Frame::new(COUNTRY_COLUMNS);
    for r in records {
        frame.push_row(vec![
            r.id.clone().into(),
            r.iso2_code.clone().into(),
            r.name.clone().into(),
            r.region_id.clone().into(),
            r.region.clone().into(),
            r.adminregion_id.clone().into(),
            r.adminregion.clone().into(),
            r.income_level_id.clone().into(),
            r.income_level.clone().into(),
            r.lending_type_id.clone().into(),
            r.lending_type.clone().into(),
            r.capital_city.clone().into(),
            r.longitude.clone().into(),
            r.latitude.clone().into(),
        ]);
    }
    frame
}

/// Indicator records as a frame with the canonical export columns. The two
/// topic lists are joined with `;` over their non-empty entries.
pub fn indicators_frame(records: &[IndicatorRecord]) -> Frame {
    let mut frame = Frame::new(INDICATOR_COLUMNS);
    for r in records {
        frame.push_row(vec![
            r.id.clone().into(),
            r.name.clone().into(),
            r.unit.clone().into(),
            r.source_id.clone().into(),
            r.source.clone().into(),
            r.source_note.clone().into(),
            r.source_organization.clone().into(),
            join_present(&r.topics),
            join_present(&r.topic_ids),
        ]);
    }
    frame
}

fn join_present(items: &[Option<String>]) -> Cell {
    let present: Vec<&str> = items
        .iter()
        .filter_map(|item| item.as_deref())
        .filter(|item| !item.is_empty())
        .collect();
    Cell::Str(present.join(";"))
}

/// Key country records by id for the keyed YAML export. Records without an
/// id are skipped with a warning.
pub fn keyed_countries(records: &[CountryRecord]) -> BTreeMap<String, &CountryRecord> {
    keyed_by(records, |r| r.id.as_deref(), "country")
}

/// Key indicator records by id for the keyed YAML export. Records without an
/// id are skipped with a warning.
pub fn keyed_indicators(records: &[IndicatorRecord]) -> BTreeMap<String, &IndicatorRecord> {
    keyed_by(records, |r| r.id.as_deref(), "indicator")
}

fn keyed_by<'a, T>(
    records: &'a [T],
    id_of: impl Fn(&T) -> Option<&str>,
    kind: &str,
) -> BTreeMap<String, &'a T> {
    let mut keyed = BTreeMap::new();
    for record in records {
        match id_of(record) {
            Some(id) if !id.is_empty() => {
                keyed.insert(id.to_string(), record);
            }
            _ => warn!("{kind} record without id skipped in keyed export"),
        }
    }
    keyed
}
