use mockito::Matcher;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wbpull::{Client, Error, RetryPolicy};

/// Client pointed at the stub server, with retries but no pauses.
fn test_client(server: &mockito::ServerGuard) -> Client {
    Client::with_base_url(server.url()).with_retry(RetryPolicy {
        attempts: 4,
        base_backoff: Duration::ZERO,
    })
}

fn page_query(page: u32, per_page: u32) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("format".into(), "json".into()),
        Matcher::UrlEncoded("page".into(), page.to_string()),
        Matcher::UrlEncoded("per_page".into(), per_page.to_string()),
    ])
}

#[test]
fn paginates_to_completion() {
    let mut server = mockito::Server::new();
    let m1 = server
        .mock("GET", "/country")
        .match_query(page_query(1, 2))
        .with_body(
            r#"[{"page":1,"pages":3,"per_page":"2","total":5},
                [{"id":"ABW"},{"id":"AFG"}]]"#,
        )
        .expect(1)
        .create();
    let m2 = server
        .mock("GET", "/country")
        .match_query(page_query(2, 2))
        .with_body(
            r#"[{"page":2,"pages":3,"per_page":"2","total":5},
                [{"id":"AGO"},{"id":"ALB"}]]"#,
        )
        .expect(1)
        .create();
    let m3 = server
        .mock("GET", "/country")
        .match_query(page_query(3, 2))
        .with_body(
            r#"[{"page":3,"pages":3,"per_page":"2","total":5},
                [{"id":"AND"}]]"#,
        )
        .expect(1)
        .create();

    let rows = test_client(&server).fetch_paged("country", &[], 2).unwrap();

    m1.assert();
    m2.assert();
    m3.assert();
    assert_eq!(rows.len(), 5);
    let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["ABW", "AFG", "AGO", "ALB", "AND"]);
}

#[test]
fn empty_first_page_stops_pagination() {
    let mut server = mockito::Server::new();
    // header promises more pages, but the rows slot is null
    let first = server
        .mock("GET", "/country")
        .match_query(page_query(1, 50))
        .with_body(r#"[{"page":1,"pages":4,"per_page":50,"total":0},null]"#)
        .expect(1)
        .create();
    let second = server
        .mock("GET", "/country")
        .match_query(page_query(2, 50))
        .with_body(r#"[{"page":2,"pages":4,"per_page":50,"total":0},null]"#)
        .expect(0)
        .create();

    let rows = test_client(&server).fetch_paged("country", &[], 50).unwrap();

    first.assert();
    second.assert();
    assert!(rows.is_empty());
}

#[test]
fn missing_pages_field_means_single_page() {
    let mut server = mockito::Server::new();
    let first = server
        .mock("GET", "/indicator")
        .match_query(page_query(1, 100))
        .with_body(r#"[{"page":1,"per_page":100,"total":1},[{"id":"SP.POP.TOTL"}]]"#)
        .expect(1)
        .create();
    let second = server
        .mock("GET", "/indicator")
        .match_query(page_query(2, 100))
        .with_body(r#"[{"page":2,"per_page":100,"total":1},null]"#)
        .expect(0)
        .create();

    let rows = test_client(&server)
        .fetch_paged("indicator", &[], 100)
        .unwrap();

    first.assert();
    second.assert();
    assert_eq!(rows.len(), 1);
}

#[test]
fn malformed_body_is_retried_until_it_parses() {
    let mut server = mockito::Server::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mock = server
        .mock("GET", "/country/DEU/indicator/SP.POP.TOTL")
        .match_query(Matcher::Any)
        .with_body_from_request(move |_| {
            // two truncated bodies, then a well-formed envelope
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                b"<html>bad gateway</html>".to_vec()
            } else {
                br#"[{"page":1,"pages":1,"per_page":1000,"total":1},
                    [{"countryiso3code":"DEU","date":"2020","value":83100000}]]"#
                    .to_vec()
            }
        })
        .expect(3)
        .create();

    let rows = test_client(&server)
        .fetch_paged("country/DEU/indicator/SP.POP.TOTL", &[], 1000)
        .unwrap();

    mock.assert();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["countryiso3code"], "DEU");
}

#[test]
fn server_errors_exhaust_the_attempt_budget() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/country")
        .match_query(Matcher::Any)
        .with_status(500)
        .expect(4)
        .create();

    let err = test_client(&server)
        .fetch_paged("country", &[], 10)
        .unwrap_err();

    mock.assert();
    match err {
        Error::FetchExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(last.contains("HTTP 500"), "last failure was: {last}");
        }
        other => panic!("expected FetchExhausted, got {other:?}"),
    }
}

#[test]
fn client_error_fails_without_retrying() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/country/XYZ/indicator/NOPE")
        .match_query(Matcher::Any)
        .with_status(404)
        .expect(1)
        .create();

    let err = test_client(&server)
        .fetch_paged("country/XYZ/indicator/NOPE", &[], 10)
        .unwrap_err();

    mock.assert();
    match err {
        Error::ClientStatus { status, url } => {
            assert_eq!(status, 404);
            assert!(url.ends_with("/country/XYZ/indicator/NOPE"));
        }
        other => panic!("expected ClientStatus, got {other:?}"),
    }
}

#[test]
fn table_download_sends_csv_param_and_strips_bom() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/country/BRA/indicator/NY.GDP.PCAP.PP.KD")
        .match_query(Matcher::UrlEncoded(
            "downloadformat".into(),
            "csv".into(),
        ))
        .with_body("\u{feff}Country Name,Country Code,2020\nBrazil,BRA,14063.98\n")
        .expect(1)
        .create();

    let table = test_client(&server)
        .fetch_table("country/BRA/indicator/NY.GDP.PCAP.PP.KD", &[])
        .unwrap();

    mock.assert();
    assert_eq!(table.columns, ["Country Name", "Country Code", "2020"]);
    assert_eq!(table.rows, [["Brazil", "BRA", "14063.98"]]);
}

#[test]
fn each_page_has_its_own_retry_budget() {
    let mut server = mockito::Server::new();
    let first = server
        .mock("GET", "/country")
        .match_query(page_query(1, 2))
        .with_body(r#"[{"page":1,"pages":2,"per_page":2,"total":3},[{"id":"ABW"},{"id":"AFG"}]]"#)
        .expect(1)
        .create();
    // page 2 flakes once, then recovers
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let second = server
        .mock("GET", "/country")
        .match_query(page_query(2, 2))
        .with_body_from_request(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                b"oops".to_vec()
            } else {
                br#"[{"page":2,"pages":2,"per_page":2,"total":3},[{"id":"AGO"}]]"#.to_vec()
            }
        })
        .expect(2)
        .create();

    let rows = test_client(&server).fetch_paged("country", &[], 2).unwrap();

    first.assert();
    second.assert();
    assert_eq!(rows.len(), 3);
}
