// crates/trial-engine/src/resolver.rs
// ============================================================================
// Module: Sponsor Resolver
// Description: Deterministic exact-match plus probabilistic logistic scoring
//              of a trial's free-text sponsor against the company graph.
// Purpose: Map `sponsor_text -> company_id` with accept/review/reject.
// Dependencies: trial-config, trial-core
// Grounded on: spec.md §4.4; no standalone scoring module survived in
//              original_source, so the feature/scoring shape follows the
//              spec directly.
// ============================================================================

//! ## Overview
//! Resolution is a two-stage pipeline (`spec.md` §4.4). Stage 1 looks for a
//! unique exact match against a company's normalized name. Stage 2 retrieves
//! candidates by character-trigram similarity, scores each with a logistic
//! model over hand-computed string-similarity features, and applies the
//! accept/review/reject decision rule. This module does no I/O: the caller
//! supplies the company universe and persists whatever [`ResolverOutcome`]
//! comes back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;

use regex::Regex;
use trial_config::ResolverConfig;
use trial_core::Company;
use trial_core::CompanyId;

// ============================================================================
// SECTION: Result Types
// ============================================================================

/// The named feature vector the logistic scorer consumes, in the order
/// `spec.md` §4.4 lists them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverFeatures {
    /// Jaro-Winkler similarity on the primary name.
    pub jw_primary: f64,
    /// Bag-of-tokens overlap ratio.
    pub token_set_ratio: f64,
    /// 1.0 if the sponsor text's acronym equals a known acronym of the candidate.
    pub acronym_exact: f64,
    /// 1.0 if a known company website root appears in the sponsor text.
    /// Always 0.0: this schema carries no website-domain data for companies.
    pub domain_root_match: f64,
    /// 1.0 if a known ticker token appears in the sponsor text.
    pub ticker_string_hit: f64,
    /// 1.0 if the sponsor text matches a configured academic/government pattern.
    pub academic_keyword_penalty: f64,
    /// Fraction of rare tokens shared between sponsor text and candidate name.
    pub strong_token_overlap: f64,
}

impl ResolverFeatures {
    fn as_map(self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("jw_primary".to_string(), self.jw_primary),
            ("token_set_ratio".to_string(), self.token_set_ratio),
            ("acronym_exact".to_string(), self.acronym_exact),
            ("domain_root_match".to_string(), self.domain_root_match),
            ("ticker_string_hit".to_string(), self.ticker_string_hit),
            ("academic_keyword_penalty".to_string(), self.academic_keyword_penalty),
            ("strong_token_overlap".to_string(), self.strong_token_overlap),
        ])
    }

    fn score(self, config: &ResolverConfig) -> f64 {
        let map = self.as_map();
        let linear: f64 = map
            .iter()
            .map(|(name, value)| config.weights.get(name).copied().unwrap_or(0.0) * value)
            .sum();
        sigmoid(config.intercept + linear)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// A candidate company scored against the sponsor text.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// The candidate company.
    pub company_id: CompanyId,
    /// Calibrated probability this candidate matches.
    pub probability: f64,
    /// The feature vector used to score this candidate.
    pub features: BTreeMap<String, f64>,
}

/// How an accepted decision was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptMethod {
    /// Stage 1 exact match against the company's normalized name.
    DetExact,
    /// Stage 2 probabilistic scoring cleared both thresholds.
    Auto,
}

/// An automatically accepted resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverAcceptance {
    /// The accepted company.
    pub company_id: CompanyId,
    /// How the acceptance was reached.
    pub method: AcceptMethod,
    /// Leader candidate's probability (`1.0` for a deterministic match).
    pub probability: f64,
    /// `p_top - p_second` (`1.0` for a deterministic match).
    pub top2_margin: f64,
    /// Feature vector backing this decision (empty for a deterministic match).
    pub features: BTreeMap<String, f64>,
}

/// The outcome of resolving one sponsor text.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverOutcome {
    /// The resolution should be recorded as an accepted decision.
    Accept(ResolverAcceptance),
    /// The resolution should be queued for human review, full ranked
    /// candidate list included.
    Review(Vec<ScoredCandidate>),
    /// No candidate cleared the review floor; by design not persisted.
    Reject,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves `sponsor_text` against `companies`, following the deterministic
/// then probabilistic pipeline of `spec.md` §4.4.
#[must_use]
pub fn resolve_sponsor(
    sponsor_text: &str,
    companies: &[Company],
    config: &ResolverConfig,
) -> ResolverOutcome {
    let sponsor_norm = normalize_name(sponsor_text);
    if let Some(exact) = companies.iter().find(|company| company.name_norm == sponsor_norm) {
        return ResolverOutcome::Accept(ResolverAcceptance {
            company_id: exact.id,
            method: AcceptMethod::DetExact,
            probability: 1.0,
            top2_margin: 1.0,
            features: BTreeMap::new(),
        });
    }

    let academic_patterns = compile_patterns(&config.academic_ignore_patterns);
    let is_academic = academic_patterns.iter().any(|pattern| pattern.is_match(sponsor_text));

    let mut by_trigram: Vec<(&Company, f64)> = companies
        .iter()
        .map(|company| (company, trigram_similarity(&sponsor_norm, &company.name_norm)))
        .collect();
    by_trigram.sort_by(|a, b| b.1.total_cmp(&a.1));
    by_trigram.truncate(config.candidate_batch);

    let mut scored: Vec<ScoredCandidate> = by_trigram
        .into_iter()
        .map(|(company, _sim)| {
            let features = extract_features(&sponsor_norm, sponsor_text, company, is_academic);
            ScoredCandidate {
                company_id: company.id,
                probability: features.score(config),
                features: features.as_map(),
            }
        })
        .collect();
    scored.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    scored.truncate(config.candidate_top_k);

    let Some(top) = scored.first().cloned() else {
        return ResolverOutcome::Reject;
    };
    let second_probability = scored.get(1).map_or(0.0, |candidate| candidate.probability);
    let top2_margin = top.probability - second_probability;

    if top.probability >= config.tau_accept && top2_margin >= config.min_top2_margin {
        ResolverOutcome::Accept(ResolverAcceptance {
            company_id: top.company_id,
            method: AcceptMethod::Auto,
            probability: top.probability,
            top2_margin,
            features: top.features,
        })
    } else if top.probability >= config.review_low {
        ResolverOutcome::Review(scored)
    } else {
        ResolverOutcome::Reject
    }
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

fn normalize_name(text: &str) -> String {
    let lowered = text.to_ascii_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = stripped
        .split_whitespace()
        .filter(|token| !is_corporate_suffix(token))
        .collect();
    tokens.join(" ")
}

fn is_corporate_suffix(token: &str) -> bool {
    matches!(
        token,
        "inc" | "incorporated" | "ltd" | "limited" | "corp" | "corporation" | "co" | "llc" | "plc" | "gmbh" | "sa" | "ag"
    )
}

fn tokenize(text: &str) -> Vec<String> {
    normalize_name(text).split_whitespace().map(str::to_string).collect()
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns.iter().filter_map(|pattern| Regex::new(pattern).ok()).collect()
}

// ============================================================================
// SECTION: Similarity Primitives
// ============================================================================

fn char_trigrams(text: &str) -> HashSet<[char; 3]> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 3 {
        return HashSet::new();
    }
    chars.windows(3).map(|w| [w[0], w[1], w[2]]).collect()
}

/// Dice coefficient over character trigrams, a pure-Rust stand-in for
/// `pg_trgm`-style similarity (`spec.md` §4.4's "trigram similarity").
fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = char_trigrams(a);
    let tb = char_trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    2.0 * intersection as f64 / (ta.len() + tb.len()) as f64
}

/// Jaro-Winkler similarity, standard algorithm with the conventional
/// prefix-scale `0.1` and max-prefix `4`.
fn jaro_winkler(a: &str, b: &str) -> f64 {
    let jaro = jaro_similarity(a, b);
    if jaro <= 0.0 {
        return jaro;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let prefix = a_chars
        .iter()
        .zip(b_chars.iter())
        .take(4)
        .take_while(|(x, y)| x == y)
        .count();
    jaro + (prefix as f64) * 0.1 * (1.0 - jaro)
}

fn jaro_similarity(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (a_len, b_len) = (a_chars.len(), b_chars.len());
    if a_len == 0 && b_len == 0 {
        return 1.0;
    }
    if a_len == 0 || b_len == 0 {
        return 0.0;
    }
    let match_distance = (a_len.max(b_len) / 2).saturating_sub(1);
    let mut a_matches = vec![false; a_len];
    let mut b_matches = vec![false; b_len];
    let mut matches = 0usize;

    for i in 0..a_len {
        let lo = i.saturating_sub(match_distance);
        let hi = (i + match_distance + 1).min(b_len);
        for j in lo..hi {
            if b_matches[j] || a_chars[i] != b_chars[j] {
                continue;
            }
            a_matches[i] = true;
            b_matches[j] = true;
            matches += 1;
            break;
        }
    }
    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for i in 0..a_len {
        if !a_matches[i] {
            continue;
        }
        while !b_matches[k] {
            k += 1;
        }
        if a_chars[i] != b_chars[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    (m / a_len as f64 + m / b_len as f64 + (m - (transpositions / 2) as f64) / m) / 3.0
}

/// A simplified token-set ratio: twice the shared-token count over the
/// combined token count of both sides (a Dice coefficient over token sets).
fn token_set_ratio(a_tokens: &[String], b_tokens: &[String]) -> f64 {
    let a: BTreeSet<&String> = a_tokens.iter().collect();
    let b: BTreeSet<&String> = b_tokens.iter().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    2.0 * intersection as f64 / (a.len() + b.len()) as f64
}

/// Rare tokens are those at least 4 characters long (excludes short
/// connector words without a full stop-word list).
fn strong_token_overlap(a_tokens: &[String], b_tokens: &[String]) -> f64 {
    let rare = |tokens: &[String]| -> BTreeSet<String> {
        tokens.iter().filter(|t| t.len() >= 4).cloned().collect()
    };
    let a = rare(a_tokens);
    let b = rare(b_tokens);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    intersection as f64 / a.len().min(b.len()) as f64
}

fn acronym_of(tokens: &[String]) -> String {
    tokens.iter().filter_map(|t| t.chars().next()).collect::<String>().to_ascii_uppercase()
}

fn extract_features(sponsor_norm: &str, sponsor_text: &str, company: &Company, is_academic: bool) -> ResolverFeatures {
    let sponsor_tokens = tokenize(sponsor_norm);
    let company_tokens = tokenize(&company.name_norm);
    let acronym_exact = f64::from(
        !sponsor_tokens.is_empty()
            && acronym_of(&sponsor_tokens) == acronym_of(&company_tokens)
            && sponsor_tokens.len() > 1,
    );
    let ticker_hit = company
        .ticker
        .as_deref()
        .is_some_and(|ticker| sponsor_text.to_ascii_uppercase().contains(ticker.to_ascii_uppercase().as_str()));
    ResolverFeatures {
        jw_primary: jaro_winkler(sponsor_norm, &company.name_norm),
        token_set_ratio: token_set_ratio(&sponsor_tokens, &company_tokens),
        acronym_exact,
        domain_root_match: 0.0,
        ticker_string_hit: f64::from(ticker_hit),
        academic_keyword_penalty: f64::from(is_academic),
        strong_token_overlap: strong_token_overlap(&sponsor_tokens, &company_tokens),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    fn company(id: u64, name: &str, ticker: Option<&str>) -> Company {
        Company {
            id: CompanyId::try_from(id).unwrap(),
            name: name.to_string(),
            name_norm: normalize_name(name),
            ticker: ticker.map(str::to_string),
        }
    }

    #[test]
    fn exact_match_accepts_deterministically() {
        let companies = vec![company(1, "Acme Biotech Inc.", None)];
        let outcome = resolve_sponsor("Acme Biotech Inc.", &companies, &ResolverConfig::default());
        match outcome {
            ResolverOutcome::Accept(acceptance) => {
                assert_eq!(acceptance.method, AcceptMethod::DetExact);
                assert_eq!(acceptance.probability, 1.0);
            }
            other => panic!("expected accept, got {other:?}"),
        }
    }

    #[test]
    fn unrelated_sponsor_is_rejected() {
        let companies = vec![company(1, "Acme Biotech Inc.", None)];
        let outcome = resolve_sponsor(
            "University of Somewhere Medical Center",
            &companies,
            &ResolverConfig::default(),
        );
        assert_eq!(outcome, ResolverOutcome::Reject);
    }

    #[test]
    fn ticker_hit_boosts_probability() {
        let mut config = ResolverConfig::default();
        config.tau_accept = 0.0;
        config.review_low = 0.0;
        config.min_top2_margin = 0.0;
        let companies = vec![company(1, "Acme Biotech", Some("ACME"))];
        let outcome = resolve_sponsor("ACME sponsor trial", &companies, &config);
        match outcome {
            ResolverOutcome::Accept(acceptance) => {
                assert_eq!(acceptance.features.get("ticker_string_hit"), Some(&1.0));
            }
            ResolverOutcome::Review(candidates) => {
                assert_eq!(candidates[0].features.get("ticker_string_hit"), Some(&1.0));
            }
            ResolverOutcome::Reject => panic!("expected a scored outcome"),
        }
    }

    #[test]
    fn jaro_winkler_identical_strings_is_one() {
        assert!((jaro_winkler("acme", "acme") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn academic_pattern_sets_penalty_feature() {
        let mut config = ResolverConfig::default();
        config.review_low = 0.0;
        let companies = vec![company(1, "Acme Biotech", None)];
        let outcome = resolve_sponsor("Harvard University Hospital", &companies, &config);
        let ResolverOutcome::Review(candidates) = outcome else {
            panic!("expected a review outcome");
        };
        assert_eq!(candidates[0].features.get("academic_keyword_penalty"), Some(&1.0));
    }
}
