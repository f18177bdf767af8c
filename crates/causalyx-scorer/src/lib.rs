//! causalyx-scorer: Alternative-cause plausibility scoring engine.
//!
//! Per-indicator assessments pass through a plausibility gate; surviving
//! weights are summed per alternative-cause category and capped at 1.0.
//! The clinical maximum drives the step-level conclusion. Narrative-nuance
//! indicators bypass the gate but are reported as a separate epistemic score
//! that never enters the clinical maximum.

pub mod assessment;
pub mod gaps;
pub mod scorer;
pub mod weights;

pub use assessment::{
    AssessmentScope, IndicatorAssessment, IndicatorAssessments, PlausibilityTier,
    RawIndicatorAssessment,
};
pub use gaps::{identify_gaps, MAX_INVESTIGATION_GAPS};
pub use scorer::{
    AlternativeCauseConclusion, AlternativeEtiology, CategoryScore, EvidenceStatus, GateVerdict,
    GatedIndicator, PlausibilityScoringEngine, ScoringOutcome,
};
pub use weights::WeightTable;
