// crates/trial-engine/src/catalyst.rs
// ============================================================================
// Module: Catalyst Window Engine
// Description: Hint parsing, slip adjustment, recency weighting, and window
//              fusion producing a trial's inferred readout window.
// Purpose: Fuse heterogeneous date hints and the registry's estimated
//          primary completion date into one scored window.
// Dependencies: regex, time, trial-core
// Grounded on: spec.md §4.8; original_source/src/ncfd/catalyst/infer.py,
//              models.py
// ============================================================================

//! ## Overview
//! [`infer_catalyst_window`] fuses a base anchor built from the registry's
//! estimated primary completion date with every parseable [`StudyHint`] found
//! in document text, after applying sponsor-specific slip adjustment and
//! recency weighting to each candidate window. A terminal-event date, when
//! known, overrides this fusion outright.
//!
//! Hint age is computed from `StudyHint::captured_at` when the caller
//! supplied one; hints extracted without a capture time fall back to
//! [`DEFAULT_HINT_AGE_DAYS`] rather than being silently treated as zero-age
//! (the original inference engine's hint age was a hardcoded placeholder in
//! every path; here it is the explicit, documented fallback for the one case
//! where the real age truly is unknown).

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use regex::RegexBuilder;
use time::Date;
use time::Duration;
use time::Month;
use time::OffsetDateTime;
use trial_core::CatalystWindow;
use trial_core::SlipStats;
use trial_core::StudyHint;
use trial_core::StudyHintKind;
use trial_core::TrialId;

/// Fallback hint age, in days, used when a hint carries no `captured_at`.
pub const DEFAULT_HINT_AGE_DAYS: i64 = 30;

/// A known terminal-event label (`spec.md` §4.8 step 4): a completed or
/// terminated trial with a recorded event date overrides all window fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalEvent {
    /// The date the terminal event (e.g. database lock, trial termination)
    /// occurred.
    pub event_date: Date,
}

// ============================================================================
// SECTION: Hint Parsing
// ============================================================================

fn build_regex(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern).case_insensitive(true).build().ok()
}

fn month_from_name(name: &str) -> Option<Month> {
    match name.to_ascii_lowercase().as_str() {
        "january" => Some(Month::January),
        "february" => Some(Month::February),
        "march" => Some(Month::March),
        "april" => Some(Month::April),
        "may" => Some(Month::May),
        "june" => Some(Month::June),
        "july" => Some(Month::July),
        "august" => Some(Month::August),
        "september" => Some(Month::September),
        "october" => Some(Month::October),
        "november" => Some(Month::November),
        "december" => Some(Month::December),
        _ => None,
    }
}

fn month_from_number(n: u8) -> Option<Month> {
    Month::try_from(n).ok()
}

fn end_of_month(year: i32, month: u8) -> Option<Date> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = Date::from_calendar_date(next_year, month_from_number(next_month)?, 1).ok()?;
    Some(first_of_next - Duration::days(1))
}

/// Parses `"Month D, YYYY"` → `[date-1d, date+2d]`, weight `0.95`.
fn parse_exact_date(text: &str) -> Option<(Date, Date, f64)> {
    let re = build_regex(
        r"\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),\s*(\d{4})\b",
    )?;
    let captures = re.captures(text)?;
    let month = month_from_name(&captures[1])?;
    let day: u8 = captures[2].parse().ok()?;
    let year: i32 = captures[3].parse().ok()?;
    let parsed = Date::from_calendar_date(year, month, day).ok()?;
    Some((parsed - Duration::days(1), parsed + Duration::days(2), 0.95))
}

/// Parses `"Q[1-4] YYYY"` → that quarter's month range, weight `0.60`.
fn parse_quarter(text: &str) -> Option<(Date, Date, f64)> {
    let re = build_regex(r"\bQ([1-4])\s*(20\d{2})\b")?;
    let captures = re.captures(text)?;
    let quarter: u8 = captures[1].parse().ok()?;
    let year: i32 = captures[2].parse().ok()?;
    let (start_month, end_month) = match quarter {
        1 => (1, 3),
        2 => (4, 6),
        3 => (7, 9),
        _ => (10, 12),
    };
    let start = Date::from_calendar_date(year, month_from_number(start_month)?, 1).ok()?;
    let end = end_of_month(year, end_month)?;
    Some((start, end, 0.60))
}

/// Parses `"H[12] YYYY"` → that half's month range, weight `0.60`.
fn parse_half(text: &str) -> Option<(Date, Date, f64)> {
    let re = build_regex(r"\bH([12])\s*(20\d{2})\b")?;
    let captures = re.captures(text)?;
    let half: u8 = captures[1].parse().ok()?;
    let year: i32 = captures[2].parse().ok()?;
    let (start_month, end_month) = if half == 1 { (1, 6) } else { (7, 12) };
    let start = Date::from_calendar_date(year, month_from_number(start_month)?, 1).ok()?;
    let end = end_of_month(year, end_month)?;
    Some((start, end, 0.60))
}

/// Parses a bare `YYYY` → that calendar year, weight `0.60`.
fn parse_year(text: &str) -> Option<(Date, Date, f64)> {
    let re = build_regex(r"\b(20\d{2})\b")?;
    let captures = re.captures(text)?;
    let year: i32 = captures[1].parse().ok()?;
    let start = Date::from_calendar_date(year, Month::January, 1).ok()?;
    let end = Date::from_calendar_date(year, Month::December, 31).ok()?;
    Some((start, end, 0.60))
}

/// Parses a known conference acronym with year → a fixed embargo band
/// around that conference's typical dates, weight `0.80`.
fn parse_conference(text: &str) -> Option<(Date, Date, f64)> {
    let re = build_regex(r"\b(ESMO|ASCO|ASH|AACR|ASCO-GI|ASCO-BC|ESMO-IO)\s+(20\d{2})\b")?;
    let captures = re.captures(text)?;
    let name = captures[1].to_ascii_uppercase();
    let year: i32 = captures[2].parse().ok()?;
    let (start_month, start_day, end_month, end_day) = match name.as_str() {
        "ESMO" | "ESMO-IO" => (9, 15, 9, 20),
        "ASCO" | "ASCO-GI" | "ASCO-BC" => (6, 1, 6, 5),
        "ASH" => (12, 5, 12, 9),
        _ => (6, 1, 6, 5),
    };
    let conf_start = Date::from_calendar_date(year, month_from_number(start_month)?, start_day).ok()?;
    let conf_end = Date::from_calendar_date(year, month_from_number(end_month)?, end_day).ok()?;
    Some((conf_start - Duration::days(2), conf_end + Duration::days(1), 0.80))
}

/// Parses the first hint pattern that matches `text`, trying `exact_date`,
/// `quarter`, `half`, `year`, then `conference` in order and returning the
/// first success (`spec.md` §4.8; original's "use first successful parse").
#[must_use]
pub fn parse_hint(
    text: &str,
    trial_id: TrialId,
    url: Option<String>,
    captured_at: Option<OffsetDateTime>,
) -> Option<StudyHint> {
    let parsers: [(&dyn Fn(&str) -> Option<(Date, Date, f64)>, StudyHintKind); 5] = [
        (&parse_exact_date, StudyHintKind::ExactDate),
        (&parse_quarter, StudyHintKind::Freeform),
        (&parse_half, StudyHintKind::Freeform),
        (&parse_year, StudyHintKind::Freeform),
        (&parse_conference, StudyHintKind::Conference),
    ];
    for (parser, kind) in parsers {
        if let Some((start, end, weight)) = parser(text) {
            return Some(StudyHint {
                kind,
                start,
                end,
                weight,
                raw_text: text.to_string(),
                trial_id,
                url,
                captured_at,
            });
        }
    }
    None
}

// ============================================================================
// SECTION: Slip Adjustment & Recency Weighting
// ============================================================================

/// `shift = clamp(mean_slip_days, -30, 75)`;
/// `widen_pad = min(14, (p90_days - p10_days) / 2)`.
fn apply_slip(start: Date, end: Date, slip: SlipStats) -> (Date, Date) {
    let shift = slip.mean_slip_days.clamp(-30, 75);
    let widen_days = (slip.p90_days - slip.p10_days).max(0) / 2;
    let widen_pad = widen_days.min(14);
    (start + Duration::days(shift - widen_pad), end + Duration::days(shift + widen_pad))
}

/// `w' = w * min(1.0, 0.5 + 0.5 * exp(-hint_age_days / 180))`.
fn recency_weight(weight: f64, hint_age_days: i64) -> f64 {
    #[allow(clippy::cast_precision_loss, reason = "hint age in days never approaches f64 precision limits")]
    let age = hint_age_days as f64;
    let factor = (0.5 + 0.5 * (-age / 180.0).exp()).min(1.0);
    weight * factor
}

fn hint_age_days(hint: &StudyHint, now: OffsetDateTime) -> i64 {
    hint.captured_at
        .map_or(DEFAULT_HINT_AGE_DAYS, |captured_at| (now - captured_at).whole_days().max(0))
}

fn clamp01(value: f64) -> f64 {
    value.max(0.0).min(1.0)
}

// ============================================================================
// SECTION: Fusion
// ============================================================================

type Candidate = (Date, Date, f64, StudyHint);

fn fuse_windows(trial_id: TrialId, mut candidates: Vec<Candidate>) -> Option<CatalystWindow> {
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
    let mut iter = candidates.into_iter();
    let (s1, e1, w1, h1) = iter.next()?;
    let Some((s2, e2, w2, h2)) = iter.next() else {
        #[allow(clippy::cast_precision_loss, reason = "window spans stay far below f64 precision limits")]
        let span = (e1 - s1).whole_days() as f64;
        let certainty = clamp01(1.0 - (span / 30.0) * (1.0 - w1));
        return Some(CatalystWindow {
            trial_id,
            window_start: s1,
            window_end: e1,
            certainty,
            sources: vec![h1],
        });
    };

    let best_weight = w1.max(w2);
    let inter_start = s1.max(s2);
    let inter_end = e1.min(e2);
    if inter_start <= inter_end {
        #[allow(clippy::cast_precision_loss, reason = "window spans stay far below f64 precision limits")]
        let span = (inter_end - inter_start).whole_days() as f64;
        let certainty = clamp01(1.0 - (span / 30.0) * (1.0 - best_weight));
        Some(CatalystWindow {
            trial_id,
            window_start: inter_start,
            window_end: inter_end,
            certainty,
            sources: vec![h1, h2],
        })
    } else {
        let union_start = s1.min(s2);
        let union_end = e1.max(e2);
        #[allow(clippy::cast_precision_loss, reason = "window spans stay far below f64 precision limits")]
        let span = (union_end - union_start).whole_days() as f64;
        let certainty = clamp01(1.0 - (span / 45.0) * (1.0 - best_weight));
        Some(CatalystWindow {
            trial_id,
            window_start: union_start,
            window_end: union_end,
            certainty,
            sources: vec![h1, h2],
        })
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Infers a trial's catalyst window (`spec.md` §4.8): a terminal-event label
/// overrides all other logic; otherwise an EPCD-anchored base window is
/// fused with every hint's slip-adjusted, recency-weighted candidate window.
#[must_use]
pub fn infer_catalyst_window(
    trial_id: TrialId,
    epcd: Date,
    epcd_version_age_days: i64,
    hints: &[StudyHint],
    slip: SlipStats,
    now: OffsetDateTime,
    terminal_event: Option<TerminalEvent>,
) -> CatalystWindow {
    if let Some(event) = terminal_event {
        return CatalystWindow {
            trial_id,
            window_start: event.event_date,
            window_end: event.event_date,
            certainty: 1.0,
            sources: Vec::new(),
        };
    }

    let (base_start, base_end) =
        apply_slip(epcd - Duration::days(14), epcd + Duration::days(28), slip);
    let base_weight = recency_weight(0.4, epcd_version_age_days);
    let base_hint = StudyHint {
        kind: StudyHintKind::Freeform,
        start: base_start,
        end: base_end,
        weight: base_weight,
        raw_text: "EPCD base".to_string(),
        trial_id,
        url: None,
        captured_at: None,
    };

    let mut candidates = vec![(base_start, base_end, base_weight, base_hint)];
    for hint in hints {
        let (start, end) = apply_slip(hint.start, hint.end, slip);
        let age = hint_age_days(hint, now);
        let weight = recency_weight(hint.weight, age);
        candidates.push((start, end, weight, hint.clone()));
    }

    fuse_windows(trial_id, candidates).unwrap_or(CatalystWindow {
        trial_id,
        window_start: epcd,
        window_end: epcd,
        certainty: 0.0,
        sources: Vec::new(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;
    use time::Month as TMonth;

    fn trial_id() -> TrialId {
        TrialId::new(NonZeroU64::new(7).unwrap())
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_785_000_000).unwrap()
    }

    #[test]
    fn parses_exact_date() {
        let hint = parse_hint("topline data on Nov 3, 2025", trial_id(), None, None).unwrap();
        assert_eq!(hint.kind, StudyHintKind::ExactDate);
        assert_eq!(hint.start, Date::from_calendar_date(2025, TMonth::November, 2).unwrap());
        assert_eq!(hint.end, Date::from_calendar_date(2025, TMonth::November, 5).unwrap());
        assert!((hint.weight - 0.95).abs() < 1e-9);
    }

    #[test]
    fn parses_quarter() {
        let hint = parse_hint("data expected Q1 2026", trial_id(), None, None).unwrap();
        assert_eq!(hint.start, Date::from_calendar_date(2026, TMonth::January, 1).unwrap());
        assert_eq!(hint.end, Date::from_calendar_date(2026, TMonth::March, 31).unwrap());
    }

    #[test]
    fn parses_conference() {
        let hint = parse_hint("results at ESMO 2025", trial_id(), None, None).unwrap();
        assert_eq!(hint.kind, StudyHintKind::Conference);
        assert_eq!(hint.start, Date::from_calendar_date(2025, TMonth::September, 13).unwrap());
        assert_eq!(hint.end, Date::from_calendar_date(2025, TMonth::September, 21).unwrap());
    }

    #[test]
    fn no_pattern_matches_returns_none() {
        assert!(parse_hint("no date information here", trial_id(), None, None).is_none());
    }

    #[test]
    fn hint_without_captured_at_uses_default_age() {
        let hint = StudyHint {
            kind: StudyHintKind::Freeform,
            start: Date::from_calendar_date(2025, TMonth::July, 1).unwrap(),
            end: Date::from_calendar_date(2025, TMonth::July, 1).unwrap(),
            weight: 0.6,
            raw_text: "Q3 2025".to_string(),
            trial_id: trial_id(),
            url: None,
            captured_at: None,
        };
        assert_eq!(hint_age_days(&hint, now()), DEFAULT_HINT_AGE_DAYS);
    }

    #[test]
    fn terminal_event_overrides_fusion() {
        let event_date = Date::from_calendar_date(2025, TMonth::December, 1).unwrap();
        let window = infer_catalyst_window(
            trial_id(),
            Date::from_calendar_date(2025, TMonth::July, 1).unwrap(),
            30,
            &[],
            SlipStats::unknown(),
            now(),
            Some(TerminalEvent { event_date }),
        );
        assert_eq!(window.window_start, event_date);
        assert_eq!(window.window_end, event_date);
        assert!((window.certainty - 1.0).abs() < 1e-9);
        assert!(window.sources.is_empty());
    }

    #[test]
    fn epcd_only_produces_base_anchor_window() {
        let window = infer_catalyst_window(
            trial_id(),
            Date::from_calendar_date(2025, TMonth::July, 1).unwrap(),
            30,
            &[],
            SlipStats::unknown(),
            now(),
            None,
        );
        assert_eq!(window.sources.len(), 1);
        assert!(window.certainty > 0.0);
    }

    #[test]
    fn non_overlapping_windows_fuse_to_union() {
        let exact_hint = StudyHint {
            kind: StudyHintKind::ExactDate,
            start: Date::from_calendar_date(2025, TMonth::November, 2).unwrap(),
            end: Date::from_calendar_date(2025, TMonth::November, 5).unwrap(),
            weight: 0.95,
            raw_text: "Nov 3, 2025".to_string(),
            trial_id: trial_id(),
            url: None,
            captured_at: Some(now()),
        };
        let window = infer_catalyst_window(
            trial_id(),
            Date::from_calendar_date(2025, TMonth::July, 1).unwrap(),
            30,
            std::slice::from_ref(&exact_hint),
            SlipStats::unknown(),
            now(),
            None,
        );
        assert_eq!(window.sources.len(), 2);
        // The EPCD base anchor (~early July) and the exact-date hint
        // (~early November) don't overlap, so fusion must return their
        // union, not either window alone.
        assert!(window.window_start < Date::from_calendar_date(2025, TMonth::September, 1).unwrap());
        assert!(window.window_end >= exact_hint.start);
        assert!(window.certainty > 0.0 && window.certainty < 1.0);
    }
}
