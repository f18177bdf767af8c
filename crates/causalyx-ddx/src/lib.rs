//! causalyx-ddx: Deterministic differential-cause matching.
//!
//! Matches domain-grouped clinical observations against the knowledge
//! base's alternative-cause subtypes. Identical observations and knowledge
//! base always yield identical candidates in identical order.

pub mod matcher;
pub mod observation;

pub use matcher::{
    CandidateEtiology, DifferentialMatcher, DifferentialResult, MatchSummary, MatchedIndicator,
    NEGATIVE_FINDING_KEYWORD_SPAN,
};
pub use observation::{
    DomainObservations, Observation, ObservationConfidence, ObservationSet,
    NARRATIVE_UNCERTAINTY_DOMAIN,
};
