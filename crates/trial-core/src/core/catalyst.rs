// crates/trial-core/src/core/catalyst.rs
// ============================================================================
// Module: Catalyst Window
// Description: Inferred readout windows and the hints/statistics that feed
//              them.
// Purpose: Provide the typed output of the catalyst window engine and its
//          inputs.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`CatalystWindow`] is the engine's best estimate of when a trial's
//! primary readout is likely to be disclosed, fused from the trial's
//! estimated primary completion date and any [`StudyHint`]s extracted from
//! documents. It is recomputed on demand, not append-only.

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::OffsetDateTime;

use crate::core::identifiers::TrialId;

/// The kind of textual evidence a [`StudyHint`] was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyHintKind {
    /// An exact calendar date (e.g. "topline data on Nov 3, 2025").
    ExactDate,
    /// A named conference appearance (e.g. "data at ESMO 2025").
    Conference,
    /// Any other free-form date expression (quarter, half, bare year).
    Freeform,
}

/// A single date hint extracted from a document, prior to fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyHint {
    /// What kind of textual evidence this hint came from.
    pub kind: StudyHintKind,
    /// Candidate window start.
    pub start: Date,
    /// Candidate window end.
    pub end: Date,
    /// Base weight for this hint kind, before recency adjustment.
    pub weight: f64,
    /// The raw matched text.
    pub raw_text: String,
    /// The trial this hint concerns.
    pub trial_id: TrialId,
    /// Source document URL, if known.
    pub url: Option<String>,
    /// When this hint was captured (extracted from its source document).
    /// `None` when the caller cannot supply a capture time; the engine then
    /// falls back to a documented default hint age rather than silently
    /// treating the hint as having zero age.
    pub captured_at: Option<OffsetDateTime>,
}

/// Per-sponsor historical slip statistics used to widen/shift base windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlipStats {
    /// Mean days between an estimated and an actual readout date.
    pub mean_slip_days: i64,
    /// 10th percentile of observed slip, in days.
    pub p10_days: i64,
    /// 90th percentile of observed slip, in days.
    pub p90_days: i64,
    /// Number of historical events this statistic is based on.
    pub n_events: u32,
}

impl SlipStats {
    /// Slip statistics representing "no history": no shift, no widening.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            mean_slip_days: 0,
            p10_days: 0,
            p90_days: 0,
            n_events: 0,
        }
    }
}

/// The engine's fused estimate of a trial's catalyst (readout) window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalystWindow {
    /// The trial this window concerns.
    pub trial_id: TrialId,
    /// Window start date.
    pub window_start: Date,
    /// Window end date.
    pub window_end: Date,
    /// Certainty in `[0, 1]`; narrower, higher-weight windows score higher.
    pub certainty: f64,
    /// The hints fused to produce this window; empty when the window came
    /// from a terminal-event label rather than hint fusion.
    pub sources: Vec<StudyHint>,
}
