//! External collaborators around the causality engine.
//!
//! The engine itself is pure computation. Everything it needs from the
//! outside (clinical observations, indicator assessments) and everything it
//! hands on (explanations) goes through the async traits below, so a
//! language-model service and a recorded fixture are interchangeable.
//!
//! Contract:
//!   - `ObservationService` and `IndicatorAssessor` feed the matcher and the
//!     scorer between engine stages.
//!   - `ExplanationService` only reads a finished `CaseOutcome`. Its output
//!     carries no category, so it cannot change the decision.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use causalyx_assess::{CaseInput, CaseOutcome};
use causalyx_common::ClinicalCase;
use causalyx_ddx::{DifferentialResult, ObservationSet};
use causalyx_scorer::RawIndicatorAssessment;
use tracing::debug;

use crate::explanation::Explanation;

// ─────────────────────────────────────────────
//  Collaborator traits
// ─────────────────────────────────────────────

/// Produces the domain-grouped clinical observations for one case.
#[async_trait]
pub trait ObservationService: Send + Sync {
    fn name(&self) -> &str;

    async fn observe(&self, case: &ClinicalCase) -> Result<ObservationSet>;
}

/// Answers the four-field indicator assessment for the indicators the
/// differential matcher surfaced.
#[async_trait]
pub trait IndicatorAssessor: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(
        &self,
        case: &ClinicalCase,
        differential: &DifferentialResult,
    ) -> Result<BTreeMap<String, RawIndicatorAssessment>>;
}

/// Turns a decided outcome into reviewer-facing text and guidance.
#[async_trait]
pub trait ExplanationService: Send + Sync {
    fn name(&self) -> &str;

    async fn explain(&self, case: &ClinicalCase, outcome: &CaseOutcome) -> Result<Explanation>;
}

// ─────────────────────────────────────────────
//  Recorded collaborators
// ─────────────────────────────────────────────

/// Serves observations captured in case bundles. A case with no recorded
/// observations gets an empty set.
#[derive(Debug, Default)]
pub struct RecordedObservations {
    by_case: HashMap<String, ObservationSet>,
}

impl RecordedObservations {
    pub fn from_bundles(bundles: &[CaseInput]) -> Self {
        let by_case = bundles
            .iter()
            .map(|b| (b.case.case_id.clone(), b.observations.clone()))
            .collect();
        Self { by_case }
    }
}

#[async_trait]
impl ObservationService for RecordedObservations {
    fn name(&self) -> &str { "recorded_observations" }

    async fn observe(&self, case: &ClinicalCase) -> Result<ObservationSet> {
        match self.by_case.get(&case.case_id) {
            Some(set) => Ok(set.clone()),
            None => {
                debug!(case_id = %case.case_id, "No recorded observations");
                Ok(ObservationSet::default())
            }
        }
    }
}

/// Serves indicator assessments captured in case bundles. Missing entries
/// are left to the scorer's ingestion step, which marks them absent.
#[derive(Debug, Default)]
pub struct RecordedAssessments {
    by_case: HashMap<String, BTreeMap<String, RawIndicatorAssessment>>,
}

impl RecordedAssessments {
    pub fn from_bundles(bundles: &[CaseInput]) -> Self {
        let by_case = bundles
            .iter()
            .map(|b| (b.case.case_id.clone(), b.assessments.clone()))
            .collect();
        Self { by_case }
    }
}

#[async_trait]
impl IndicatorAssessor for RecordedAssessments {
    fn name(&self) -> &str { "recorded_assessments" }

    async fn assess(
        &self,
        case: &ClinicalCase,
        differential: &DifferentialResult,
    ) -> Result<BTreeMap<String, RawIndicatorAssessment>> {
        let recorded = self.by_case.get(&case.case_id).cloned().unwrap_or_default();
        debug!(
            case_id = %case.case_id,
            recorded = recorded.len(),
            matched = differential.matched_indicator_names().len(),
            "Serving recorded assessments"
        );
        Ok(recorded)
    }
}
