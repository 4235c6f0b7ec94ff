// crates/trial-providers/src/registry.rs
// ============================================================================
// Module: HTTP Registry Client
// Description: Paginated, rate-limited client for the upstream trial
//              registry's listing endpoint.
// Purpose: Implement `trial_core::RegistryClient` against a JSON HTTP API.
// Dependencies: trial-core, reqwest, url
// ============================================================================

//! ## Overview
//! [`HttpRegistryClient`] pages through the registry's study-listing endpoint
//! using server-assigned continuation tokens and a since-date filter. It
//! retries transient failures with capped exponential backoff, honors
//! server-reported rate-limit delays without charging them against the retry
//! budget, and applies the client-side study-type/intervention/phase filter
//! the server's filter surface does not reliably support.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::Response;
use serde_json::Value;
use time::Date;
use time::format_description::well_known::Iso8601;
use trial_core::RegistryClient;
use trial_core::RegistryError;
use trial_core::RegistryPage;

use crate::rate_limit::TokenBucket;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum exponential backoff between transient-fetch retries.
const MAX_BACKOFF_SECS: u64 = 30;
/// Interventional arm types the filter policy treats as drug-class studies.
const DRUG_CLASS_INTERVENTION_TYPES: [&str; 2] = ["DRUG", "BIOLOGICAL"];
/// Phases the filter policy treats as pivotal-stage.
const PIVOTAL_PHASES: [&str; 3] = ["PHASE2", "PHASE3", "PHASE2_PHASE3"];

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for [`HttpRegistryClient`].
///
/// # Invariants
/// - `page_size` is capped at `max_page_size` before being sent upstream.
/// - `max_retries` bounds only transient-error retries, not rate-limit waits.
#[derive(Debug, Clone)]
pub struct HttpRegistryClientConfig {
    /// Base URL of the registry API, e.g. `https://clinicaltrials.gov/api/v2`.
    pub base_url: String,
    /// Page size requested per fetch, capped at `max_page_size`.
    pub page_size: u32,
    /// Hard cap on requested page size regardless of configuration.
    pub max_page_size: u32,
    /// Maximum retries for a transient fetch error.
    pub max_retries: u32,
    /// Request timeout applied to each page fetch.
    pub timeout: Duration,
    /// User agent string for outbound requests.
    pub user_agent: String,
    /// Only studies updated on or after this date are requested, when set.
    pub since: Option<Date>,
}

impl Default for HttpRegistryClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://clinicaltrials.gov/api/v2".to_string(),
            page_size: 100,
            max_page_size: 1_000,
            max_retries: 3,
            timeout: Duration::from_secs(30),
            user_agent: "trial-risk-core/0.1".to_string(),
            since: None,
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking, rate-limited registry client.
///
/// # Invariants
/// - Every request passes through the configured [`TokenBucket`] first.
/// - Records returned from [`RegistryClient::fetch_page`] have already
///   passed the client-side study-type/intervention/phase filter.
pub struct HttpRegistryClient {
    /// Client configuration.
    config: HttpRegistryClientConfig,
    /// Underlying blocking HTTP client.
    http: Client,
    /// Token-bucket limiter shared across requests from this client.
    limiter: TokenBucket,
}

impl HttpRegistryClient {
    /// Creates a new client with the given configuration and rate limit.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Permanent`] when the HTTP client cannot be
    /// constructed.
    pub fn new(
        config: HttpRegistryClientConfig,
        rate_limit_requests: u32,
        rate_limit_window: Duration,
    ) -> Result<Self, RegistryError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| RegistryError::Permanent(format!("http client build failed: {err}")))?;
        Ok(Self {
            config,
            http,
            limiter: TokenBucket::new(rate_limit_requests, rate_limit_window),
        })
    }

    /// Builds the request URL for one page fetch.
    fn page_url(&self, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/studies?format=json&pageSize={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.page_size.min(self.config.max_page_size)
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(token);
        }
        if let Some(since) = self.config.since {
            if let Ok(formatted) = since.format(&Iso8601::DATE) {
                url.push_str("&filter.lastUpdatePostDate=");
                url.push_str(&formatted);
            }
        }
        url
    }

    /// Issues one request, without retry, translating transport/status
    /// failures into the registry error taxonomy.
    fn send_once(&self, url: &str) -> Result<Response, RegistryError> {
        self.limiter.acquire();
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|err| RegistryError::Transient(format!("request failed: {err}")))?;
        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RegistryError::RateLimited { retry_after_secs });
        }
        if status.is_server_error() {
            return Err(RegistryError::Transient(format!("server error: {status}")));
        }
        if status.is_client_error() {
            return Err(RegistryError::Permanent(format!("client error: {status}")));
        }
        Ok(response)
    }

    /// Issues one request, retrying transient errors with capped exponential
    /// backoff and waiting out rate-limit delays without charging them
    /// against the retry budget. Returns the response plus the number of
    /// transient-error retries consumed.
    fn send_with_retry(&self, url: &str) -> Result<(Response, u32), RegistryError> {
        let mut attempt: u32 = 0;
        loop {
            match self.send_once(url) {
                Ok(response) => return Ok((response, attempt)),
                Err(RegistryError::RateLimited { retry_after_secs }) => {
                    std::thread::sleep(Duration::from_secs(retry_after_secs));
                }
                Err(err @ RegistryError::Permanent(_)) => return Err(err),
                Err(err @ RegistryError::Transient(_)) => {
                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(2u64.pow(attempt).min(MAX_BACKOFF_SECS));
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
            }
        }
    }

    /// Fetches one page and returns both the page and a structured record of
    /// the fetch (record count, continuation token, retries consumed), for
    /// callers that want an auditable outcome instead of a log line.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] per the taxonomy documented on
    /// [`RegistryClient::fetch_page`].
    pub fn fetch_page_with_outcome(
        &self,
        page_token: Option<&str>,
    ) -> Result<(RegistryPage, PageFetchOutcome), RegistryError> {
        let url = self.page_url(page_token);
        let (response, retry_count) = self.send_with_retry(&url)?;
        let body: Value = response
            .json()
            .map_err(|err| RegistryError::Permanent(format!("malformed response body: {err}")))?;
        let next_page_token = body
            .get("nextPageToken")
            .and_then(Value::as_str)
            .map(str::to_string);
        let records: Vec<Value> = body
            .get("studies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(passes_client_side_filter)
            .collect();
        let outcome = PageFetchOutcome {
            record_count: records.len(),
            next_page_token: next_page_token.clone(),
            retry_count,
        };
        Ok((
            RegistryPage {
                records,
                next_page_token,
            },
            outcome,
        ))
    }
}

impl RegistryClient for HttpRegistryClient {
    fn fetch_page(&self, page_token: Option<&str>) -> Result<RegistryPage, RegistryError> {
        self.fetch_page_with_outcome(page_token).map(|(page, _)| page)
    }
}

// ============================================================================
// SECTION: Client-Side Filter Policy
// ============================================================================

/// Applies the registry client's local filter, since the server's filter
/// surface is unstable: study type must start with `INTERVENTIONAL`, at
/// least one intervention must be drug-class, and at least one phase must
/// be pivotal-stage.
fn passes_client_side_filter(record: &Value) -> bool {
    has_interventional_study_type(record)
        && has_drug_class_intervention(record)
        && has_pivotal_phase(record)
}

/// Returns true when `protocolSection.designModule.studyType` starts with
/// `INTERVENTIONAL`.
fn has_interventional_study_type(record: &Value) -> bool {
    record
        .pointer("/protocolSection/designModule/studyType")
        .and_then(Value::as_str)
        .is_some_and(|study_type| study_type.starts_with("INTERVENTIONAL"))
}

/// Returns true when at least one listed intervention's type is DRUG or
/// BIOLOGICAL.
fn has_drug_class_intervention(record: &Value) -> bool {
    record
        .pointer("/protocolSection/armsInterventionsModule/interventions")
        .and_then(Value::as_array)
        .is_some_and(|interventions| {
            interventions.iter().any(|intervention| {
                intervention
                    .get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|kind| DRUG_CLASS_INTERVENTION_TYPES.contains(&kind))
            })
        })
}

/// Returns true when at least one listed phase is PHASE2, PHASE3, or
/// PHASE2_PHASE3.
fn has_pivotal_phase(record: &Value) -> bool {
    record
        .pointer("/protocolSection/designModule/phases")
        .and_then(Value::as_array)
        .is_some_and(|phases| {
            phases
                .iter()
                .filter_map(Value::as_str)
                .any(|phase| PIVOTAL_PHASES.contains(&phase))
        })
}

/// The observable outcome of fetching one page, used by callers (the broker)
/// that want a structured record of the fetch instead of a log line.
#[derive(Debug, Clone)]
pub struct PageFetchOutcome {
    /// Number of records returned after the client-side filter was applied.
    pub record_count: usize,
    /// Continuation token for the next page, if any.
    pub next_page_token: Option<String>,
    /// Number of retry attempts consumed fetching this page.
    pub retry_count: u32,
}
