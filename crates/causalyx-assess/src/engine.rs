//! Per-case causality engine.
//!
//! Chains grader → matcher → scorer → temporal auditor → classifier for one
//! case. Level 4 certainty stops the chain and returns the missing-criteria
//! guidance instead of a classification.
//!
//! The staged methods (`grade`, `match_differential`, `complete`) let a caller
//! fetch observations and assessments from external services between stages;
//! `assess` runs the whole chain over pre-collected inputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use causalyx_common::{ClinicalCase, EngineConfig, KnowledgeBase, Result};
use causalyx_ddx::{DifferentialMatcher, DifferentialResult, ObservationSet};
use causalyx_scorer::{
    identify_gaps, AssessmentScope, IndicatorAssessments, PlausibilityScoringEngine,
    RawIndicatorAssessment, ScoringOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::certainty::{missing_criteria, CertaintyGrade, DiagnosticCertaintyGrader, MissingCriterion};
use crate::classifier::{
    CausalityCategory, CausalityClassifier, CausalityDecision, ClassifierInput, ConfidenceTier,
};
use crate::temporal::{TemporalAssessment, TemporalAuditor};

/// Everything the engine needs for one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseInput {
    pub case: ClinicalCase,
    #[serde(default)]
    pub observations: ObservationSet,
    /// Raw indicator assessments keyed by indicator name.
    #[serde(default)]
    pub assessments: BTreeMap<String, RawIndicatorAssessment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyExitReport {
    pub case_id: String,
    pub grade: CertaintyGrade,
    pub missing_criteria: Vec<MissingCriterion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalityAssessment {
    pub case_id: String,
    pub grade: CertaintyGrade,
    pub differential: DifferentialResult,
    pub assessments: IndicatorAssessments,
    pub scoring: ScoringOutcome,
    pub investigation_gaps: Vec<String>,
    pub temporal: TemporalAssessment,
    pub decision: CausalityDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaseOutcome {
    EarlyExit(EarlyExitReport),
    Assessed(Box<CausalityAssessment>),
}

impl CaseOutcome {
    pub fn case_id(&self) -> &str {
        match self {
            CaseOutcome::EarlyExit(r) => &r.case_id,
            CaseOutcome::Assessed(a) => &a.case_id,
        }
    }

    /// Early exits are unclassifiable by definition.
    pub fn category(&self) -> CausalityCategory {
        match self {
            CaseOutcome::EarlyExit(_) => CausalityCategory::Unclassifiable,
            CaseOutcome::Assessed(a) => a.decision.category,
        }
    }

    pub fn confidence(&self) -> ConfidenceTier {
        self.category().confidence()
    }

    pub fn is_early_exit(&self) -> bool {
        matches!(self, CaseOutcome::EarlyExit(_))
    }
}

pub struct CausalityEngine {
    kb: Arc<KnowledgeBase>,
    config: EngineConfig,
    grader: DiagnosticCertaintyGrader,
    matcher: DifferentialMatcher,
    scorer: PlausibilityScoringEngine,
    auditor: TemporalAuditor,
    classifier: CausalityClassifier,
}

impl CausalityEngine {
    pub fn new(kb: Arc<KnowledgeBase>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let matcher = DifferentialMatcher::new(Arc::clone(&kb))?;
        let scorer = PlausibilityScoringEngine::new(&kb, config.scoring.clone());
        let auditor = TemporalAuditor::new(Arc::clone(&kb), config.temporal.clone())?;
        let classifier = CausalityClassifier::new(config.scoring.clone());

        debug!(
            kb_version = %kb.version,
            subtypes = kb.subtypes.len(),
            "Causality engine ready"
        );

        Ok(Self {
            kb,
            config,
            grader: DiagnosticCertaintyGrader::new(),
            matcher,
            scorer,
            auditor,
            classifier,
        })
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grade(&self, case: &ClinicalCase) -> CertaintyGrade {
        self.grader.grade(case)
    }

    pub fn early_exit(&self, case: &ClinicalCase, grade: CertaintyGrade) -> EarlyExitReport {
        let missing = missing_criteria(grade.condition, &grade.criteria);
        info!(
            case_id = %case.case_id,
            level = grade.level,
            missing = missing.len(),
            "Early exit: insufficient diagnostic certainty"
        );
        EarlyExitReport {
            case_id: case.case_id.clone(),
            grade,
            missing_criteria: missing,
        }
    }

    pub fn match_differential(&self, observations: &ObservationSet) -> DifferentialResult {
        self.matcher.match_observations(observations)
    }

    /// Score, audit and classify a graded case whose differential is known.
    pub fn complete(
        &self,
        case: &ClinicalCase,
        grade: CertaintyGrade,
        differential: DifferentialResult,
        raw_assessments: &BTreeMap<String, RawIndicatorAssessment>,
    ) -> CausalityAssessment {
        let scope = AssessmentScope::from_differential(&differential);
        let assessments = IndicatorAssessments::ingest(&self.kb, raw_assessments, &scope);
        let scoring = self.scorer.score(&assessments);
        let investigation_gaps = identify_gaps(&assessments, &scoring);
        let temporal = self.auditor.audit(case, grade.condition.as_str());

        let decision = self.classifier.classify(&ClassifierInput {
            certainty_level: grade.level,
            max_clinical_score: scoring.max_clinical_score,
            known_effect: temporal.known_effect.is_known_effect,
            step2_met: temporal.step2_met,
            zone: temporal.zone,
            conclusion: scoring.conclusion,
        });

        info!(
            case_id = %case.case_id,
            category = decision.category.code(),
            confidence = decision.confidence.as_str(),
            level = grade.level,
            score = scoring.max_clinical_score,
            zone = temporal.zone.as_str(),
            "Case assessed"
        );

        CausalityAssessment {
            case_id: case.case_id.clone(),
            grade,
            differential,
            assessments,
            scoring,
            investigation_gaps,
            temporal,
            decision,
        }
    }

    pub fn assess(&self, input: &CaseInput) -> CaseOutcome {
        let grade = self.grade(&input.case);
        if grade.early_exit {
            return CaseOutcome::EarlyExit(self.early_exit(&input.case, grade));
        }
        let differential = self.match_differential(&input.observations);
        CaseOutcome::Assessed(Box::new(self.complete(
            &input.case,
            grade,
            differential,
            &input.assessments,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::TemporalZone;

    fn engine() -> CausalityEngine {
        let kb = Arc::new(KnowledgeBase::embedded().unwrap());
        CausalityEngine::new(kb, EngineConfig::default()).unwrap()
    }

    fn input(json: serde_json::Value) -> CaseInput {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let kb = Arc::new(KnowledgeBase::embedded().unwrap());
        let mut config = EngineConfig::default();
        config.scoring.possible_alternative = 0.9;
        assert!(CausalityEngine::new(kb, config).is_err());
    }

    #[test]
    fn test_early_exit_skips_classification() {
        let out = engine().assess(&input(serde_json::json!({
            "case": { "case_id": "E-1", "event": { "primary_condition": "myocarditis" } }
        })));
        assert!(out.is_early_exit());
        assert_eq!(out.category(), CausalityCategory::Unclassifiable);
        match out {
            CaseOutcome::EarlyExit(r) => assert_eq!(r.missing_criteria.len(), 6),
            CaseOutcome::Assessed(_) => panic!("expected early exit"),
        }
    }

    #[test]
    fn test_full_chain_consistent_case() {
        let out = engine().assess(&input(serde_json::json!({
            "case": {
                "case_id": "E-2",
                "demographics": { "age": 19, "sex": "M" },
                "product": { "name": "Moderna", "dose_number": 2 },
                "event": {
                    "primary_condition": "myocarditis",
                    "days_to_onset": 3,
                    "symptoms": ["chest pain"]
                },
                "findings": {
                    "troponin": { "value": "8.1 ng/mL", "abnormal": true },
                    "cardiac_mri": { "value": "LGE consistent with myocarditis" }
                }
            }
        })));
        let CaseOutcome::Assessed(a) = out else {
            panic!("expected full assessment");
        };
        assert_eq!(a.grade.level, 1);
        assert_eq!(a.temporal.zone, TemporalZone::StrongCausal);
        assert!(a.temporal.high_risk.is_high_risk);
        assert_eq!(a.decision.category, CausalityCategory::A1);
        assert_eq!(a.scoring.max_clinical_score, 0.0);
    }

    #[test]
    fn test_unmatched_assessment_is_ignored() {
        // The service claims an indicator the matcher never found.
        let out = engine().assess(&input(serde_json::json!({
            "case": {
                "case_id": "E-3",
                "product": { "name": "Pfizer" },
                "event": { "primary_condition": "myocarditis", "days_to_onset": 2, "symptoms": ["chest pain"] },
                "findings": { "troponin": { "value": "high", "abnormal": true } }
            },
            "assessments": { "giant_cells_on_biopsy": true }
        })));
        let CaseOutcome::Assessed(a) = out else {
            panic!("expected full assessment");
        };
        assert_eq!(a.scoring.max_clinical_score, 0.0);
        assert_eq!(a.decision.category, CausalityCategory::A1);
    }
}
