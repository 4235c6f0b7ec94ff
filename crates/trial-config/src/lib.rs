// crates/trial-config/src/lib.rs
// ============================================================================
// Module: Trial Configuration
// Description: Configuration loading and validation for the trial risk core.
// Purpose: Provide strict, fail-closed YAML config parsing with hard limits.
// Dependencies: serde, serde_yaml, trial-core
// ============================================================================

//! ## Overview
//! Configuration is loaded from a YAML file (`spec.md` §6) with a strict
//! file-size limit. Missing or invalid configuration fails closed: every
//! sub-config validates its own ranges and the top-level [`TrialConfig::load`]
//! refuses to return a config that failed any of them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "trial.yaml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "TRIAL_CONFIG";
/// Environment variable used to supply the store DSN when absent from the
/// config file. A missing DSN from both sources is a fatal startup error.
pub const DSN_ENV_VAR: &str = "TRIAL_DSN";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length accepted for a config path.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Top-Level Configuration
// ============================================================================

/// Top-level trial risk-core configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrialConfig {
    /// Persistent store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Registry client configuration.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Sponsor resolver configuration.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Gate and posterior engine configuration.
    #[serde(default)]
    pub gates: GateConfig,
    /// Change detector configuration.
    #[serde(default)]
    pub change_detector: ChangeDetectorConfig,
    /// Document linking configuration.
    #[serde(default)]
    pub linking: LinkingConfig,
}

impl TrialConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// an explicit `path`, else `TRIAL_CONFIG`, else `trial.yaml` in the
    /// current directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid(
                "config file exceeds size limit".to_string(),
            ));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            serde_yaml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.resolve_dsn()?;
        config.validate()?;
        Ok(config)
    }

    /// Fills `store.dsn` from `TRIAL_DSN` when the config file left it
    /// empty; fails closed when neither source supplies one.
    fn resolve_dsn(&mut self) -> Result<(), ConfigError> {
        if self.store.dsn.trim().is_empty() {
            self.store.dsn = env::var(DSN_ENV_VAR)
                .map_err(|_| ConfigError::Invalid("store.dsn is required (set it in the config file or TRIAL_DSN)".to_string()))?;
        }
        Ok(())
    }

    /// Validates every sub-config for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any sub-config is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.registry.validate()?;
        self.resolver.validate()?;
        self.gates.validate()?;
        self.change_detector.validate()?;
        self.linking.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Store Configuration
// ============================================================================

/// Persistent store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// SQLite data source name (file path, or `:memory:` for tests). Left
    /// empty to require `TRIAL_DSN`.
    #[serde(default)]
    pub dsn: String,
    /// Maximum number of versions retained per trial before the oldest are
    /// pruned; `None` disables pruning.
    #[serde(default)]
    pub max_versions_per_trial: Option<u32>,
}

impl StoreConfig {
    /// Validates store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `dsn` is empty after DSN resolution.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dsn.trim().is_empty() {
            return Err(ConfigError::Invalid("store.dsn must be set".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Registry Client Configuration
// ============================================================================

/// Registry client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Base URL of the upstream trial registry API.
    #[serde(default = "default_registry_base_url")]
    pub base_url: String,
    /// Requests allowed per rate-limit window.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    /// Rate-limit window, in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    /// Maximum retry attempts for a transient fetch error.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_base_url(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_registry_base_url() -> String {
    "https://clinicaltrials.gov/api/v2".to_string()
}

const fn default_rate_limit_requests() -> u32 {
    10
}

const fn default_rate_limit_window_ms() -> u64 {
    1_000
}

const fn default_max_retries() -> u32 {
    3
}

impl RegistryConfig {
    /// Validates registry configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `base_url` is empty or limits are zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "registry.base_url must be set".to_string(),
            ));
        }
        if self.rate_limit_requests == 0 {
            return Err(ConfigError::Invalid(
                "registry.rate_limit_requests must be positive".to_string(),
            ));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "registry.rate_limit_window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Sponsor Resolver Configuration
// ============================================================================

/// Sponsor resolver configuration (`spec.md` §4.4).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Logistic scorer weights, keyed by feature name (`jw_primary`,
    /// `token_set_ratio`, `acronym_exact`, `domain_root_match`,
    /// `ticker_string_hit`, `academic_keyword_penalty`,
    /// `strong_token_overlap`).
    #[serde(default = "default_resolver_weights")]
    pub weights: BTreeMap<String, f64>,
    /// Logistic scorer intercept.
    #[serde(default)]
    pub intercept: f64,
    /// Minimum leader probability to accept automatically.
    #[serde(default = "default_tau_accept")]
    pub tau_accept: f64,
    /// Minimum leader probability to route to human review (below this,
    /// the candidate is rejected outright).
    #[serde(default = "default_review_low")]
    pub review_low: f64,
    /// Minimum `p_top - p_second` margin required to accept automatically.
    #[serde(default = "default_min_top2_margin")]
    pub min_top2_margin: f64,
    /// Candidate-retrieval top-K per sponsor text.
    #[serde(default = "default_candidate_top_k")]
    pub candidate_top_k: usize,
    /// Candidate-retrieval batch size.
    #[serde(default = "default_candidate_batch")]
    pub candidate_batch: usize,
    /// Compiled-at-use regular expressions identifying academic/government
    /// sponsor text; a match forces `academic_keyword_penalty` on.
    #[serde(default = "default_academic_patterns")]
    pub academic_ignore_patterns: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            weights: default_resolver_weights(),
            intercept: 0.0,
            tau_accept: default_tau_accept(),
            review_low: default_review_low(),
            min_top2_margin: default_min_top2_margin(),
            candidate_top_k: default_candidate_top_k(),
            candidate_batch: default_candidate_batch(),
            academic_ignore_patterns: default_academic_patterns(),
        }
    }
}

fn default_resolver_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("jw_primary".to_string(), 2.5),
        ("token_set_ratio".to_string(), 1.8),
        ("acronym_exact".to_string(), 1.2),
        ("domain_root_match".to_string(), 1.5),
        ("ticker_string_hit".to_string(), 1.0),
        ("academic_keyword_penalty".to_string(), -2.0),
        ("strong_token_overlap".to_string(), 1.0),
    ])
}

const fn default_tau_accept() -> f64 {
    0.92
}

const fn default_review_low() -> f64 {
    0.55
}

const fn default_min_top2_margin() -> f64 {
    0.15
}

const fn default_candidate_top_k() -> usize {
    25
}

const fn default_candidate_batch() -> usize {
    50
}

fn default_academic_patterns() -> Vec<String> {
    vec![
        r"(?i)\buniversity\b".to_string(),
        r"(?i)\bnational institutes? of health\b".to_string(),
        r"(?i)\bnih\b".to_string(),
        r"(?i)\bhospital\b".to_string(),
        r"(?i)\bfoundation\b".to_string(),
        r"(?i)\bministry of health\b".to_string(),
    ]
}

impl ResolverConfig {
    /// Validates resolver configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any probability/threshold is out of
    /// `[0, 1]`, or `review_low > tau_accept`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("resolver.tau_accept", self.tau_accept),
            ("resolver.review_low", self.review_low),
            ("resolver.min_top2_margin", self.min_top2_margin),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be in [0, 1]")));
            }
        }
        if self.review_low > self.tau_accept {
            return Err(ConfigError::Invalid(
                "resolver.review_low must be <= resolver.tau_accept".to_string(),
            ));
        }
        if self.candidate_top_k == 0 {
            return Err(ConfigError::Invalid(
                "resolver.candidate_top_k must be positive".to_string(),
            ));
        }
        if self.candidate_batch == 0 {
            return Err(ConfigError::Invalid(
                "resolver.candidate_batch must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Gate & Posterior Engine Configuration
// ============================================================================

/// Global clamp bounds for the posterior computation (`spec.md` §4.7).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct GateGlobalConfig {
    /// Minimum allowed prior.
    #[serde(default = "default_prior_floor")]
    pub prior_floor: f64,
    /// Maximum allowed prior.
    #[serde(default = "default_prior_ceil")]
    pub prior_ceil: f64,
    /// Minimum allowed per-gate likelihood ratio.
    #[serde(default = "default_lr_min")]
    pub lr_min: f64,
    /// Maximum allowed per-gate likelihood ratio.
    #[serde(default = "default_lr_max")]
    pub lr_max: f64,
    /// Minimum allowed posterior logit.
    #[serde(default = "default_logit_min")]
    pub logit_min: f64,
    /// Maximum allowed posterior logit.
    #[serde(default = "default_logit_max")]
    pub logit_max: f64,
}

impl Default for GateGlobalConfig {
    fn default() -> Self {
        Self {
            prior_floor: default_prior_floor(),
            prior_ceil: default_prior_ceil(),
            lr_min: default_lr_min(),
            lr_max: default_lr_max(),
            logit_min: default_logit_min(),
            logit_max: default_logit_max(),
        }
    }
}

const fn default_prior_floor() -> f64 {
    0.02
}
const fn default_prior_ceil() -> f64 {
    0.95
}
const fn default_lr_min() -> f64 {
    1.0 / 20.0
}
const fn default_lr_max() -> f64 {
    20.0
}
const fn default_logit_min() -> f64 {
    -8.0
}
const fn default_logit_max() -> f64 {
    8.0
}

/// One gate's configured likelihood ratio and optional severity overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateDef {
    /// Baseline likelihood ratio used when no severity override applies.
    pub lr: f64,
    /// Severity-indexed likelihood ratio overrides (`"H"`, `"M"`, `"L"`).
    #[serde(default)]
    pub by_severity: BTreeMap<String, f64>,
}

/// One stop rule's forced probability level.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct StopRuleDef {
    /// Forced probability floor in `[0, 1]`.
    pub level: f64,
}

/// One multiplicative prior adjustment keyed by a trial-metadata predicate
/// name (`spec.md` §4.7: "pivotal ×1.2, oncology ×1.1, rare-disease ×0.9,
/// Phase 3 ×1.1, Phase 1 ×0.8").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriorAdjustmentRule {
    /// Predicate name the engine evaluates against trial metadata.
    pub predicate: String,
    /// Multiplicative factor applied when the predicate holds.
    pub factor: f64,
}

fn default_prior_adjustments() -> Vec<PriorAdjustmentRule> {
    vec![
        PriorAdjustmentRule {
            predicate: "pivotal".to_string(),
            factor: 1.2,
        },
        PriorAdjustmentRule {
            predicate: "oncology".to_string(),
            factor: 1.1,
        },
        PriorAdjustmentRule {
            predicate: "rare_disease".to_string(),
            factor: 0.9,
        },
        PriorAdjustmentRule {
            predicate: "phase3".to_string(),
            factor: 1.1,
        },
        PriorAdjustmentRule {
            predicate: "phase1".to_string(),
            factor: 0.8,
        },
    ]
}

fn default_gates() -> BTreeMap<String, GateDef> {
    let mut gates = BTreeMap::new();
    for id in ["G1", "G2", "G3", "G4"] {
        gates.insert(
            id.to_string(),
            GateDef {
                lr: 3.0,
                by_severity: BTreeMap::from([
                    ("H".to_string(), 6.0),
                    ("M".to_string(), 3.0),
                    ("L".to_string(), 1.5),
                ]),
            },
        );
    }
    gates
}

fn default_stop_rules() -> BTreeMap<String, StopRuleDef> {
    BTreeMap::from([
        (
            "endpoint_switched_after_LPR".to_string(),
            StopRuleDef { level: 0.90 },
        ),
        (
            "pp_only_success_with_missing_itt_gt20".to_string(),
            StopRuleDef { level: 0.85 },
        ),
        (
            "unblinded_subjective_primary_feasible_blinding".to_string(),
            StopRuleDef { level: 0.80 },
        ),
    ])
}

/// Gate and posterior engine configuration (`spec.md` §4.7, §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// Global clamp bounds.
    #[serde(default)]
    pub global: GateGlobalConfig,
    /// Per-gate likelihood-ratio configuration, keyed by gate id.
    #[serde(default = "default_gates")]
    pub gates: BTreeMap<String, GateDef>,
    /// Stop-rule forced-probability levels, keyed by rule id.
    #[serde(default = "default_stop_rules")]
    pub stop_rules: BTreeMap<String, StopRuleDef>,
    /// Prior construction adjustments.
    #[serde(default = "default_prior_adjustments")]
    pub prior_adjustments: Vec<PriorAdjustmentRule>,
    /// Default prior used before any adjustment is applied.
    #[serde(default = "default_base_prior")]
    pub base_prior: f64,
    /// Configuration revision string, recorded verbatim in every audit trail.
    #[serde(default = "default_config_revision")]
    pub revision: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            global: GateGlobalConfig::default(),
            gates: default_gates(),
            stop_rules: default_stop_rules(),
            prior_adjustments: default_prior_adjustments(),
            base_prior: default_base_prior(),
            revision: default_config_revision(),
        }
    }
}

const fn default_base_prior() -> f64 {
    0.15
}

fn default_config_revision() -> String {
    "unrevisioned".to_string()
}

impl GateConfig {
    /// Validates gate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when clamp bounds are inverted, or any stop
    /// rule's level is out of `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global.prior_floor > self.global.prior_ceil {
            return Err(ConfigError::Invalid(
                "gates.global.prior_floor must be <= prior_ceil".to_string(),
            ));
        }
        if self.global.lr_min > self.global.lr_max {
            return Err(ConfigError::Invalid(
                "gates.global.lr_min must be <= lr_max".to_string(),
            ));
        }
        if self.global.logit_min > self.global.logit_max {
            return Err(ConfigError::Invalid(
                "gates.global.logit_min must be <= logit_max".to_string(),
            ));
        }
        for (id, rule) in &self.stop_rules {
            if !(0.0..=1.0).contains(&rule.level) {
                return Err(ConfigError::Invalid(format!(
                    "gates.stop_rules.{id}.level must be in [0, 1]"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.base_prior) {
            return Err(ConfigError::Invalid(
                "gates.base_prior must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Change Detector Configuration
// ============================================================================

/// Change detector configuration (`original_source/.../ctgov_change_detector.py`).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ChangeDetectorConfig {
    /// Minimum relative difference to consider a numeric field materially
    /// changed.
    #[serde(default = "default_numeric_change_threshold")]
    pub numeric_change_threshold: f64,
    /// Minimum similarity below which a text field is considered materially
    /// changed.
    #[serde(default = "default_text_similarity_threshold")]
    pub text_similarity_threshold: f64,
}

impl Default for ChangeDetectorConfig {
    fn default() -> Self {
        Self {
            numeric_change_threshold: default_numeric_change_threshold(),
            text_similarity_threshold: default_text_similarity_threshold(),
        }
    }
}

const fn default_numeric_change_threshold() -> f64 {
    0.1
}

const fn default_text_similarity_threshold() -> f64 {
    0.8
}

impl ChangeDetectorConfig {
    /// Validates change-detector configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when either threshold is out of `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            (
                "change_detector.numeric_change_threshold",
                self.numeric_change_threshold,
            ),
            (
                "change_detector.text_similarity_threshold",
                self.text_similarity_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be in [0, 1]")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Linking Configuration
// ============================================================================

/// Auto-promotion policy for document linking heuristics (`spec.md` §4.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkingConfig {
    /// Global feature flag; promotion never happens while this is false.
    #[serde(default)]
    pub promotion_enabled: bool,
    /// Minimum labeled-link sample size required before a heuristic may be
    /// auto-promoted.
    #[serde(default = "default_min_labeled_links")]
    pub min_labeled_links: u32,
    /// Minimum reviewed-label precision required for auto-promotion.
    #[serde(default = "default_promotion_precision_threshold")]
    pub precision_threshold: f64,
    /// Character radius used by HP-1 (NCT accession near an asset alias).
    #[serde(default = "default_hp1_proximity_chars")]
    pub hp1_proximity_chars: usize,
    /// Confidence downgrade applied to non-leading candidates absent combo
    /// wording.
    #[serde(default = "default_conflict_downgrade")]
    pub conflict_downgrade: f64,
    /// Domains treated as wire services rather than company-hosted (HP-3).
    #[serde(default = "default_wire_service_domains")]
    pub wire_service_domains: Vec<String>,
    /// Phase keywords recognized by HP-4.
    #[serde(default = "default_phase_keywords")]
    pub phase_keywords: Vec<String>,
    /// Indication keywords recognized by HP-4.
    #[serde(default = "default_indication_keywords")]
    pub indication_keywords: Vec<String>,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            promotion_enabled: false,
            min_labeled_links: default_min_labeled_links(),
            precision_threshold: default_promotion_precision_threshold(),
            hp1_proximity_chars: default_hp1_proximity_chars(),
            conflict_downgrade: default_conflict_downgrade(),
            wire_service_domains: default_wire_service_domains(),
            phase_keywords: default_phase_keywords(),
            indication_keywords: default_indication_keywords(),
        }
    }
}

const fn default_min_labeled_links() -> u32 {
    50
}

const fn default_promotion_precision_threshold() -> f64 {
    0.95
}

const fn default_hp1_proximity_chars() -> usize {
    250
}

const fn default_conflict_downgrade() -> f64 {
    0.20
}

fn default_wire_service_domains() -> Vec<String> {
    vec![
        "prnewswire.com".to_string(),
        "businesswire.com".to_string(),
        "globenewswire.com".to_string(),
        "accesswire.com".to_string(),
    ]
}

fn default_phase_keywords() -> Vec<String> {
    vec![
        "phase 1".to_string(),
        "phase 2".to_string(),
        "phase 3".to_string(),
        "phase i".to_string(),
        "phase ii".to_string(),
        "phase iii".to_string(),
    ]
}

fn default_indication_keywords() -> Vec<String> {
    vec![
        "oncology".to_string(),
        "cancer".to_string(),
        "diabetes".to_string(),
        "cardiovascular".to_string(),
        "alzheimer".to_string(),
        "nash".to_string(),
        "obesity".to_string(),
    ]
}

impl LinkingConfig {
    /// Validates linking configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `precision_threshold` or
    /// `conflict_downgrade` is out of `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("linking.precision_threshold", self.precision_threshold),
            ("linking.conflict_downgrade", self.conflict_downgrade),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be in [0, 1]")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading the configuration file.
    #[error("config io error: {0}")]
    Io(String),
    /// YAML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid(
                "config path exceeds max length".to_string(),
            ));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(
            "config path exceeds max length".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_validates() {
        let config = TrialConfig {
            store: StoreConfig {
                dsn: "trial.sqlite3".to_string(),
                max_versions_per_trial: None,
            },
            ..default_config()
        };
        config.validate().unwrap();
    }

    #[test]
    fn empty_dsn_fails_validation() {
        let config = default_config();
        assert!(config.store.validate().is_err());
    }

    #[test]
    fn review_low_above_tau_accept_is_rejected() {
        let mut config = ResolverConfig::default();
        config.review_low = 0.99;
        config.tau_accept = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(
        unsafe_code,
        reason = "env::set_var requires unsafe; this test is single-threaded and scoped."
    )]
    fn load_reads_yaml_and_resolves_dsn_env_var() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial.yaml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "resolver:\n  tau_accept: 0.9\n").unwrap();
        // SAFETY-equivalent: single-threaded test process, scoped to this test.
        unsafe {
            env::set_var(DSN_ENV_VAR, "test.sqlite3");
        }
        let config = TrialConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store.dsn, "test.sqlite3");
        assert!((config.resolver.tau_accept - 0.9).abs() < f64::EPSILON);
        unsafe {
            env::remove_var(DSN_ENV_VAR);
        }
    }

    fn default_config() -> TrialConfig {
        TrialConfig {
            store: StoreConfig::default(),
            registry: RegistryConfig::default(),
            resolver: ResolverConfig::default(),
            gates: GateConfig::default(),
            change_detector: ChangeDetectorConfig::default(),
            linking: LinkingConfig::default(),
        }
    }
}
