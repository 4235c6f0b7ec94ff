// crates/trial-providers/src/env.rs
// ============================================================================
// Module: Provider Environment Variables
// Description: Named environment variables consumed by the network
//              collaborators in this crate.
// Purpose: Centralize env var names and optional-secret loading.
// Dependencies: std::env
// ============================================================================

//! ## Overview
//! The persistent store's DSN resolution is owned by `trial-config`
//! (fatal when absent from both the config file and its environment
//! override). This module covers the collaborators specific to this crate:
//! an optional registry base URL override and optional study-card-extractor
//! and LLM-decider API keys, neither of which is required for the workspace
//! to start since both collaborators are optional per their trait contracts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;

// ============================================================================
// SECTION: Environment Variable Names
// ============================================================================

/// Overrides the registry client's base URL from `trial-config`'s
/// `registry.base_url` when set.
pub const REGISTRY_BASE_URL_ENV_VAR: &str = "TRIAL_REGISTRY_BASE_URL";
/// API key for the optional study-card extractor collaborator.
pub const EXTRACTOR_API_KEY_ENV_VAR: &str = "TRIAL_EXTRACTOR_API_KEY";
/// API key for the optional LLM-assisted sponsor resolver collaborator.
pub const LLM_API_KEY_ENV_VAR: &str = "TRIAL_LLM_API_KEY";

// ============================================================================
// SECTION: Provider Environment
// ============================================================================

/// Optional, provider-specific environment state. Every field is optional:
/// absence means the corresponding collaborator is disabled, not a fatal
/// startup error.
#[derive(Debug, Clone, Default)]
pub struct ProviderEnv {
    /// Registry base URL override, if set.
    pub registry_base_url: Option<String>,
    /// Study-card extractor API key, if set.
    pub extractor_api_key: Option<String>,
    /// LLM decider API key, if set.
    pub llm_api_key: Option<String>,
}

impl ProviderEnv {
    /// Reads the provider environment from the process environment. Never
    /// fails: every field simply defaults to `None` when its variable is
    /// absent or not valid UTF-8.
    #[must_use]
    pub fn load() -> Self {
        Self {
            registry_base_url: read_optional(REGISTRY_BASE_URL_ENV_VAR),
            extractor_api_key: read_optional(EXTRACTOR_API_KEY_ENV_VAR),
            llm_api_key: read_optional(LLM_API_KEY_ENV_VAR),
        }
    }
}

/// Reads an environment variable, treating "unset" and "not valid UTF-8"
/// identically as absence.
fn read_optional(key: &str) -> Option<String> {
    env::var(key).ok()
}

#[cfg(test)]
mod tests {
    use super::ProviderEnv;
    use super::REGISTRY_BASE_URL_ENV_VAR;

    #[test]
    #[allow(
        unsafe_code,
        reason = "env::remove_var requires unsafe; this test is single-threaded and scoped."
    )]
    fn load_defaults_to_none_when_unset() {
        // SAFETY: test runs in a single thread within this process; no
        // concurrent env mutation is expected from this crate's test binary.
        unsafe {
            std::env::remove_var(REGISTRY_BASE_URL_ENV_VAR);
        }
        let env = ProviderEnv::load();
        assert!(env.registry_base_url.is_none());
    }

    #[test]
    #[allow(
        unsafe_code,
        reason = "env::set_var/remove_var require unsafe; this test is single-threaded and scoped."
    )]
    fn load_picks_up_registry_base_url_override() {
        // SAFETY: test runs in a single thread within this process; no
        // concurrent env mutation is expected from this crate's test binary.
        unsafe {
            std::env::set_var(REGISTRY_BASE_URL_ENV_VAR, "https://example.test/api");
        }
        let env = ProviderEnv::load();
        assert_eq!(env.registry_base_url.as_deref(), Some("https://example.test/api"));
        unsafe {
            std::env::remove_var(REGISTRY_BASE_URL_ENV_VAR);
        }
    }
}
