use serde::{Deserialize, Serialize};

/// How to specify dates in API queries.
///
/// `Year(2020)` → `2020`, `Range { 2000, 2023 }` → `2000:2023`,
/// `From(2010)` → `2010:` (open-ended to latest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSpec {
    /// Single year like 2020
    Year(i32),
    /// Inclusive range like 2000..=2023
    Range { start: i32, end: i32 },
    /// Open-ended range from a year to the latest available
    From(i32),
}

impl DateSpec {
    /// Parse `YYYY`, `YYYY:YYYY`, or `YYYY:`. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<DateSpec> {
        let s = s.trim();
        if let Some((a, b)) = s.split_once(':') {
            let start = a.trim().parse::<i32>().ok()?;
            if b.trim().is_empty() {
                return Some(DateSpec::From(start));
            }
            let end = b.trim().parse::<i32>().ok()?;
            Some(DateSpec::Range { start, end })
        } else {
            s.parse::<i32>().ok().map(DateSpec::Year)
        }
    }

    pub fn to_query_param(&self) -> String {
        match *self {
            DateSpec::Year(y) => y.to_string(),
            DateSpec::Range { start, end } => format!("{}:{}", start, end),
            DateSpec::From(start) => format!("{}:", start),
        }
    }
}

/// Which economies to request: every economy, or an explicit code list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountrySelector {
    /// The API's `all` sentinel.
    All,
    /// ISO3 / World Bank codes, requested together.
    Codes(Vec<String>),
}

impl CountrySelector {
    /// Parse a CLI/config string: `all` (case-insensitive) or a comma- or
    /// semicolon-separated code list. An empty list falls back to `All`.
    pub fn parse(s: &str) -> CountrySelector {
        if s.trim().eq_ignore_ascii_case("all") {
            return CountrySelector::All;
        }
        let codes: Vec<String> = s
            .split([',', ';'])
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if codes.is_empty() {
            CountrySelector::All
        } else {
            CountrySelector::Codes(codes)
        }
    }

    /// URL path segment for `country/{segment}/indicator/{code}`.
    pub(crate) fn path_segment(&self) -> String {
        match self {
            CountrySelector::All => "all".to_string(),
            CountrySelector::Codes(codes) => crate::api::enc_join(codes.iter().map(|s| s.as_str())),
        }
    }
}

/// Pagination header returned by the API (position 0 of the envelope).
///
/// The API is loose with types here: counts arrive as numbers or strings, and
/// some endpoints omit fields entirely. `pages` falls back to 1 when absent or
/// non-numeric, which also ends pagination after the first page.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    #[serde(default, deserialize_with = "de_count")]
    pub page: u32,
    #[serde(default = "default_pages", deserialize_with = "de_pages")]
    pub pages: u32,
    #[serde(default, deserialize_with = "de_count")]
    pub per_page: u32,
    #[serde(default, deserialize_with = "de_count")]
    pub total: u32,
}

fn default_pages() -> u32 {
    1
}

fn de_pages<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    de_lenient_u32(deserializer, 1)
}

fn de_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    de_lenient_u32(deserializer, 0)
}

/// Serde helper: parse `u32` from a JSON number or string, falling back to
/// `fallback` for null, negative, or non-numeric input.
fn de_lenient_u32<'de, D>(deserializer: D, fallback: u32) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    struct LenientU32(u32);

    impl<'de> Visitor<'de> for LenientU32 {
        type Value = u32;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a string or number")
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(u32::try_from(v).unwrap_or(self.0))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(u32::try_from(v).unwrap_or(self.0))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_finite() && v >= 0.0 && v <= f64::from(u32::MAX) {
                Ok(v as u32)
            } else {
                Ok(self.0)
            }
        }

        fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(s.trim().parse::<u32>().unwrap_or(self.0))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(self.0)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(self.0)
        }
    }

    deserializer.deserialize_any(LenientU32(fallback))
}

/// Flat country metadata row. Field names mirror the output columns; nested
/// `region`/`adminregion`/`incomeLevel`/`lendingType` objects are flattened
/// into `_id`/value pairs by [`crate::metadata::normalize_country`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub id: Option<String>,
    #[serde(rename = "iso2Code")]
    pub iso2_code: Option<String>,
    pub name: Option<String>,
    pub region_id: Option<String>,
    pub region: Option<String>,
    pub adminregion_id: Option<String>,
    pub adminregion: Option<String>,
    #[serde(rename = "incomeLevel_id")]
    pub income_level_id: Option<String>,
    #[serde(rename = "incomeLevel")]
    pub income_level: Option<String>,
    #[serde(rename = "lendingType_id")]
    pub lending_type_id: Option<String>,
    #[serde(rename = "lendingType")]
    pub lending_type: Option<String>,
    #[serde(rename = "capitalCity")]
    pub capital_city: Option<String>,
    pub longitude: Option<String>,
    pub latitude: Option<String>,
}

/// Flat indicator metadata row.
///
/// `topics` and `topic_ids` are parallel projections of the API's
/// list-of-objects `topics` field: same length, same order, with a `None` at
/// positions where a topic object lacks that sub-key. Tabular output joins
/// the non-empty entries with `;`; keyed YAML keeps the lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub source_id: Option<String>,
    pub source: Option<String>,
    pub source_note: Option<String>,
    pub source_organization: Option<String>,
    pub topics: Vec<Option<String>>,
    pub topic_ids: Vec<Option<String>>,
}

/// One long-form observation: `(countryiso3code, indicator, date)` is the key.
///
/// `countryiso3code` and `country` keep whatever string the API sent (empty
/// when absent); `date` is the year after numeric coercion, `None` when the
/// source date was not a number.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub countryiso3code: String,
    pub country: String,
    pub indicator: String,
    pub date: Option<i32>,
    pub value: Option<f64>,
}
