#![cfg(feature = "yaml")]

use mockito::Matcher;
use std::fs;
use std::time::Duration;
use wbpull::jobs::{self, CountriesField};
use wbpull::models::CountrySelector;
use wbpull::{Client, Error, RetryPolicy};

fn test_client(server: &mockito::ServerGuard, attempts: u32) -> Client {
    Client::with_base_url(server.url()).with_retry(RetryPolicy {
        attempts,
        base_backoff: Duration::ZERO,
    })
}

fn pop_envelope() -> &'static str {
    r#"[{"page":1,"pages":1,"per_page":1000,"total":1},
        [{"indicator":{"id":"SP.POP.TOTL","value":"Population, total"},
          "country":{"id":"DE","value":"Germany"},
          "countryiso3code":"DEU","date":"2020","value":83100000}]]"#
}

#[test]
fn config_file_parses_jobs_and_country_forms() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.yaml");
    fs::write(
        &path,
        r#"
jobs:
  - name: population
    indicators: [SP.POP.TOTL]
    countries: "DEU, IND"
    date: "2010:2020"
    out: population.csv
    long: true
  - name: gdp
    indicators: [NY.GDP.MKTP.CD]
    countries: [BRA, ZAF]
    out: gdp.parquet
"#,
    )
    .unwrap();

    let config = jobs::load_jobs(&path).unwrap();
    assert_eq!(config.jobs.len(), 2);
    assert_eq!(config.jobs[0].name.as_deref(), Some("population"));
    assert!(config.jobs[0].long);
    assert_eq!(
        config.jobs[0].countries.as_ref().map(CountriesField::to_selector),
        Some(CountrySelector::Codes(vec!["DEU".into(), "IND".into()]))
    );
    assert_eq!(
        config.jobs[1].countries.as_ref().map(CountriesField::to_selector),
        Some(CountrySelector::Codes(vec!["BRA".into(), "ZAF".into()]))
    );
    assert!(!config.jobs[1].long);
}

#[test]
fn missing_config_file_is_a_config_error() {
    let err = jobs::load_jobs(std::path::Path::new("/no/such/jobs.yaml")).unwrap_err();
    match err {
        Error::Config(msg) => assert!(msg.contains("cannot read config"), "got: {msg}"),
        other => panic!("expected Config, got {other:?}"),
    }
}

#[test]
fn incomplete_jobs_are_skipped_while_later_jobs_run() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/country/DEU/indicator/SP.POP.TOTL")
        .match_query(Matcher::Any)
        .with_body(pop_envelope())
        .expect(1)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("jobs.yaml");
    fs::write(
        &config_path,
        r#"
jobs:
  - name: no-out
    indicators: [SP.POP.TOTL]
  - name: no-indicators
    out: nothing.csv
  - name: bad-date
    indicators: [SP.POP.TOTL]
    date: "twenty-twenty"
    out: nothing.csv
  - name: good
    indicators: [SP.POP.TOTL]
    countries: DEU
    out: nested/pop.csv
"#,
    )
    .unwrap();

    let config = jobs::load_jobs(&config_path).unwrap();
    let completed = jobs::run_jobs(&test_client(&server, 1), &config, dir.path(), false, 1000)
        .unwrap();

    mock.assert();
    assert_eq!(completed, 1);
    // skipped jobs leave nothing behind
    assert!(!dir.path().join("nothing.csv").exists());
    // the good job's relative path resolves against the config dir, parents made
    let out = dir.path().join("nested/pop.csv");
    let text = fs::read_to_string(out).unwrap();
    assert!(text.contains("DEU"));
}

#[test]
fn validate_drops_codes_without_metadata() {
    let mut server = mockito::Server::new();
    let known = server
        .mock("GET", "/indicator/SP.POP.TOTL")
        .match_query(Matcher::Any)
        .with_body(
            r#"[{"page":1,"pages":1,"per_page":50,"total":1},
                [{"id":"SP.POP.TOTL","name":"Population, total"}]]"#,
        )
        .expect(1)
        .create();
    let unknown = server
        .mock("GET", "/indicator/XX.NOT.REAL")
        .match_query(Matcher::Any)
        .with_body(r#"[{"page":1,"pages":1,"per_page":50,"total":0},null]"#)
        .expect(1)
        .create();
    // only the surviving code is fetched
    let data = server
        .mock("GET", "/country/all/indicator/SP.POP.TOTL")
        .match_query(Matcher::Any)
        .with_body(pop_envelope())
        .expect(1)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("jobs.yaml");
    fs::write(
        &config_path,
        r#"
jobs:
  - name: mixed
    indicators: [SP.POP.TOTL, XX.NOT.REAL]
    out: mixed.csv
"#,
    )
    .unwrap();

    let config = jobs::load_jobs(&config_path).unwrap();
    let completed =
        jobs::run_jobs(&test_client(&server, 1), &config, dir.path(), true, 1000).unwrap();

    known.assert();
    unknown.assert();
    data.assert();
    assert_eq!(completed, 1);
}

#[test]
fn validate_skips_job_when_no_code_resolves() {
    let mut server = mockito::Server::new();
    let unknown = server
        .mock("GET", "/indicator/XX.NOT.REAL")
        .match_query(Matcher::Any)
        .with_body(r#"[{"page":1,"pages":1,"per_page":50,"total":0},null]"#)
        .expect(1)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("jobs.yaml");
    fs::write(
        &config_path,
        r#"
jobs:
  - name: hopeless
    indicators: [XX.NOT.REAL]
    out: hopeless.csv
"#,
    )
    .unwrap();

    let config = jobs::load_jobs(&config_path).unwrap();
    let completed =
        jobs::run_jobs(&test_client(&server, 1), &config, dir.path(), true, 1000).unwrap();

    unknown.assert();
    assert_eq!(completed, 0);
    assert!(!dir.path().join("hopeless.csv").exists());
}

#[test]
fn fetch_exhaustion_aborts_remaining_jobs() {
    let mut server = mockito::Server::new();
    let broken = server
        .mock("GET", "/country/all/indicator/SP.POP.TOTL")
        .match_query(Matcher::Any)
        .with_status(500)
        .expect(2)
        .create();
    let never_reached = server
        .mock("GET", "/country/all/indicator/NY.GDP.MKTP.CD")
        .match_query(Matcher::Any)
        .with_body(pop_envelope())
        .expect(0)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("jobs.yaml");
    fs::write(
        &config_path,
        r#"
jobs:
  - name: first
    indicators: [SP.POP.TOTL]
    out: first.csv
  - name: second
    indicators: [NY.GDP.MKTP.CD]
    out: second.csv
"#,
    )
    .unwrap();

    let config = jobs::load_jobs(&config_path).unwrap();
    let err = jobs::run_jobs(&test_client(&server, 2), &config, dir.path(), false, 1000)
        .unwrap_err();

    broken.assert();
    never_reached.assert();
    assert!(matches!(err, Error::FetchExhausted { attempts: 2, .. }));
    assert!(!dir.path().join("first.csv").exists());
    assert!(!dir.path().join("second.csv").exists());
}
