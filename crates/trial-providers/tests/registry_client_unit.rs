// crates/trial-providers/tests/registry_client_unit.rs
// ============================================================================
// Module: Registry Client Unit Tests
// Description: Focused tests for pagination, the client-side study filter,
//              and rate-limit/retry handling against a local fixture server.
// Purpose: Confirm the registry client behaves per the documented contract.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::thread;
use std::time::Duration;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;
use trial_core::RegistryClient;
use trial_providers::HttpRegistryClient;
use trial_providers::HttpRegistryClientConfig;

fn client_for(base_url: String) -> HttpRegistryClient {
    HttpRegistryClient::new(
        HttpRegistryClientConfig {
            base_url,
            page_size: 10,
            ..HttpRegistryClientConfig::default()
        },
        100,
        Duration::from_secs(1),
    )
    .unwrap()
}

#[test]
fn fetch_page_applies_client_side_filter_and_returns_next_token() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let base_url = format!("http://{addr}");

    let handle = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let body = serde_json::json!({
                "studies": [
                    {
                        "protocolSection": {
                            "designModule": {"studyType": "INTERVENTIONAL", "phases": ["PHASE2"]},
                            "armsInterventionsModule": {"interventions": [{"type": "DRUG"}]}
                        }
                    },
                    {
                        "protocolSection": {
                            "designModule": {"studyType": "OBSERVATIONAL", "phases": []}
                        }
                    }
                ],
                "nextPageToken": "page-2"
            })
            .to_string();
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let mut response = Response::from_string(body);
            response.add_header(header);
            let _ = request.respond(response);
        }
    });

    let client = client_for(base_url);
    let page = client.fetch_page(None).expect("page fetch succeeds");
    handle.join().unwrap();

    assert_eq!(page.records.len(), 1);
    assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
}

#[test]
fn fetch_page_reports_no_next_token_on_last_page() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let base_url = format!("http://{addr}");

    let handle = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let body = serde_json::json!({"studies": []}).to_string();
            let _ = request.respond(Response::from_string(body));
        }
    });

    let client = client_for(base_url);
    let page = client.fetch_page(Some("some-token")).expect("page fetch succeeds");
    handle.join().unwrap();

    assert!(page.records.is_empty());
    assert!(page.next_page_token.is_none());
}

#[test]
fn fetch_page_with_outcome_reports_retry_count_on_transient_error() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let base_url = format!("http://{addr}");

    let handle = thread::spawn(move || {
        // First request: server error, forcing one retry.
        if let Ok(request) = server.recv() {
            let _ = request.respond(Response::empty(503));
        }
        // Second request: success.
        if let Ok(request) = server.recv() {
            let body = serde_json::json!({"studies": []}).to_string();
            let _ = request.respond(Response::from_string(body));
        }
    });

    let client = HttpRegistryClient::new(
        HttpRegistryClientConfig {
            base_url,
            page_size: 10,
            ..HttpRegistryClientConfig::default()
        },
        100,
        Duration::from_secs(1),
    )
    .unwrap();

    let (page, outcome) = client.fetch_page_with_outcome(None).expect("eventually succeeds");
    handle.join().unwrap();

    assert!(page.records.is_empty());
    assert_eq!(outcome.retry_count, 1);
}

#[test]
fn fetch_page_surfaces_permanent_error_for_client_errors() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let base_url = format!("http://{addr}");

    let handle = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let _ = request.respond(Response::empty(404));
        }
    });

    let client = client_for(base_url);
    let err = client.fetch_page(None).expect_err("permanent error surfaced");
    handle.join().unwrap();

    assert!(matches!(err, trial_core::RegistryError::Permanent(_)));
}
