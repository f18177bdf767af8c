//! Deterministic explanation generation.
//!
//! `TemplateExplanationService` writes the reviewer-facing reasoning, officer
//! summary and investigation guidance for a finished case. Inputs are the
//! engine's outcome and the knowledge base's investigation protocols; the
//! category itself is read, never produced, here.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use causalyx_assess::{
    CaseOutcome, CausalityAssessment, CausalityCategory, ConfidenceTier, Criterion,
    EarlyExitReport, RuleFired,
};
use causalyx_common::{ClinicalCase, InvestigationProtocol, KnowledgeBase, Sex};
use causalyx_scorer::AlternativeCauseConclusion;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::ExplanationService;

/// Upper bound on gaps, tests and actions surfaced per case.
const TOP_ITEMS: usize = 3;

const COVID_MARKER: &str = "active_covid19";
const COVID_SUBTYPE: &str = "covid19_related";
const NUCLEOCAPSID_TEST: &str = "Nucleocapsid antibody (anti-N) test";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationMode {
    Normal,
    OnsetUnknown,
    EarlyExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskSignal {
    High,
    Medium,
    Low,
    Unclassifiable,
}

impl RiskSignal {
    pub fn for_category(category: CausalityCategory) -> Self {
        match category {
            CausalityCategory::A1 => RiskSignal::High,
            CausalityCategory::B1 | CausalityCategory::B2 => RiskSignal::Medium,
            CausalityCategory::C | CausalityCategory::Unclassifiable => RiskSignal::Low,
            _ => RiskSignal::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GapPriority {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigativeGap {
    pub gap: String,
    pub action: String,
    pub priority: GapPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFlags {
    pub data_complete: bool,
    pub diagnostic_certainty: ConfidenceTier,
    pub onset_known: bool,
}

/// Reviewer-facing text for one case. Deliberately has no category field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub mode: ExplanationMode,
    pub risk_signal: RiskSignal,
    pub reasoning: String,
    pub officer_summary: String,
    pub investigative_gaps: Vec<InvestigativeGap>,
    pub required_tests: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub escalation_needed: bool,
    /// Temporal investigation guidance, normal mode only.
    pub investigation_focus: Option<String>,
    /// Protocol for the dominant alternative, when there is one.
    pub protocol: Option<InvestigationProtocol>,
    /// Onset-unknown mode: category each zone would lead to.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub possible_categories: BTreeMap<String, CausalityCategory>,
    pub quality_flags: Option<QualityFlags>,
}

pub struct TemplateExplanationService {
    kb: Arc<KnowledgeBase>,
}

impl TemplateExplanationService {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }

    fn early_exit(&self, case: &ClinicalCase, report: &EarlyExitReport) -> Explanation {
        let condition = report.grade.condition.as_str();
        let top = &report.missing_criteria[..report.missing_criteria.len().min(TOP_ITEMS)];

        let investigative_gaps = top
            .iter()
            .map(|m| InvestigativeGap {
                gap: m.label.clone(),
                action: format!("Obtain {}", first_two(&m.tests_needed).join(", ")),
                priority: match m.criterion {
                    Criterion::TroponinElevated | Criterion::CardiacMriPositive => GapPriority::High,
                    _ => GapPriority::Medium,
                },
            })
            .collect();

        let mut required_tests: Vec<String> = Vec::new();
        for test in top.iter().flat_map(|m| first_two(&m.tests_needed)) {
            if !required_tests.contains(test) {
                required_tests.push(test.clone());
            }
        }
        required_tests.truncate(TOP_ITEMS);

        let recommended_actions = top
            .iter()
            .filter_map(|m| {
                m.tests_needed
                    .first()
                    .map(|t| format!("Order {} to assess {}", t, m.label.to_lowercase()))
            })
            .collect();

        let priorities: Vec<&str> = top.iter().take(2).map(|m| m.label.as_str()).collect();
        let officer_summary = format!(
            "Certainty level {} ({}): insufficient diagnostic evidence. {} criteria missing. Priority: {}.",
            report.grade.level,
            condition,
            report.missing_criteria.len(),
            priorities.join(", ")
        );

        Explanation {
            mode: ExplanationMode::EarlyExit,
            risk_signal: RiskSignal::Unclassifiable,
            reasoning: format!(
                "Classification Unclassifiable: {} for {}. Causality was not assessed.",
                report.grade.justification,
                patient_phrase(case)
            ),
            officer_summary,
            investigative_gaps,
            required_tests,
            recommended_actions,
            escalation_needed: false,
            investigation_focus: None,
            protocol: None,
            possible_categories: BTreeMap::new(),
            quality_flags: Some(QualityFlags {
                data_complete: false,
                diagnostic_certainty: ConfidenceTier::Low,
                onset_known: case.event.days_to_onset.is_some() || case.event.onset_date.is_some(),
            }),
        }
    }

    fn onset_unknown(&self, case: &ClinicalCase, a: &CausalityAssessment) -> Explanation {
        let condition = a.grade.condition.as_str();
        let known = a.temporal.known_effect.is_known_effect;

        let possible = if a.scoring.conclusion == AlternativeCauseConclusion::DefiniteOtherCause {
            [CausalityCategory::C; 3]
        } else if known {
            [CausalityCategory::A1, CausalityCategory::B2, CausalityCategory::C]
        } else {
            [CausalityCategory::B1, CausalityCategory::B2, CausalityCategory::C]
        };
        let possible_categories = ["if_strong_causal", "if_plausible", "if_unlikely"]
            .iter()
            .zip(possible)
            .map(|(k, c)| (k.to_string(), c))
            .collect();

        Explanation {
            mode: ExplanationMode::OnsetUnknown,
            risk_signal: RiskSignal::Medium,
            reasoning: format!(
                "Classification Unclassifiable: onset date unknown, temporal criterion cannot be \
                 evaluated. Certainty level {}, alternative-cause score {:.2}.",
                a.grade.level, a.scoring.max_clinical_score
            ),
            officer_summary: format!(
                "{} {} classified as Unclassifiable due to unknown onset date. Contact reporter \
                 to establish symptom onset timing for definitive classification.",
                patient_phrase(case),
                condition
            ),
            investigative_gaps: vec![InvestigativeGap {
                gap: "Onset date unknown".to_string(),
                action: "Contact reporter for symptom onset date".to_string(),
                priority: GapPriority::Critical,
            }],
            required_tests: Vec::new(),
            recommended_actions: vec![
                "Verify onset date with reporter".to_string(),
                "Re-assess once onset date is established".to_string(),
            ],
            escalation_needed: false,
            investigation_focus: None,
            protocol: self.dominant_protocol(a).cloned(),
            possible_categories,
            quality_flags: Some(QualityFlags {
                data_complete: false,
                diagnostic_certainty: certainty_tier(a.grade.level),
                onset_known: false,
            }),
        }
    }

    fn normal(&self, case: &ClinicalCase, a: &CausalityAssessment) -> Explanation {
        let category = a.decision.category;
        let condition = a.grade.condition.as_str();
        let dominant = a.scoring.dominant_label.as_deref();
        let protocol = self.dominant_protocol(a);

        let mut investigative_gaps: Vec<InvestigativeGap> = a
            .investigation_gaps
            .iter()
            .take(TOP_ITEMS)
            .map(|g| InvestigativeGap {
                gap: g.clone(),
                action: format!("Investigate: {g}"),
                priority: GapPriority::High,
            })
            .collect();
        if investigative_gaps.is_empty() {
            investigative_gaps.push(InvestigativeGap {
                gap: "Standard cardiac follow-up".to_string(),
                action: "Schedule cardiac follow-up as appropriate".to_string(),
                priority: GapPriority::Medium,
            });
        }

        let mut required_tests: Vec<String> = protocol
            .map(|p| p.investigations.iter().take(TOP_ITEMS).map(|i| i.test.clone()).collect())
            .unwrap_or_default();
        if a.assessments.is_present(COVID_MARKER)
            && a.scoring.dominant_category.as_deref() != Some(COVID_SUBTYPE)
        {
            required_tests.push(NUCLEOCAPSID_TEST.to_string());
        }

        let recommended_actions: Vec<String> = match category {
            CausalityCategory::A1 => vec![
                "Standard post-myocarditis cardiac follow-up".to_string(),
                "Report to national pharmacovigilance center".to_string(),
                "Consider cardiac clearance before exercise".to_string(),
            ],
            CausalityCategory::C => vec![
                format!("Investigate dominant alternative: {}", dominant.unwrap_or("none identified")),
                "Complete differential diagnosis workup".to_string(),
                "Standard cardiac follow-up".to_string(),
            ],
            CausalityCategory::B1 | CausalityCategory::B2 => vec![
                "Additional investigations to resolve ambiguity".to_string(),
                "Report to national pharmacovigilance center".to_string(),
                "Cardiac follow-up recommended".to_string(),
            ],
            _ => vec![
                "Obtain missing diagnostic data".to_string(),
                "Consider re-assessment when data available".to_string(),
            ],
        };

        let follow_up = match (dominant, category) {
            (Some(label), _) => format!("Alternative cause: {label}. Directed workup recommended."),
            (None, CausalityCategory::A1) => {
                "No dominant alternative identified. Standard cardiac follow-up recommended.".to_string()
            }
            (None, CausalityCategory::B1 | CausalityCategory::B2) => {
                "No dominant alternative identified. Additional investigations needed.".to_string()
            }
            (None, _) => "Standard follow-up recommended.".to_string(),
        };
        let onset = a
            .temporal
            .days_to_onset
            .map(|d| format!(" {d} days after vaccination"))
            .unwrap_or_default();
        let officer_summary = format!(
            "{} {}{} classified as {} ({}). {}",
            patient_phrase(case),
            condition,
            onset,
            category,
            category.short_label(),
            follow_up
        );

        Explanation {
            mode: ExplanationMode::Normal,
            risk_signal: RiskSignal::for_category(category),
            reasoning: reasoning(a),
            officer_summary,
            investigative_gaps,
            required_tests,
            recommended_actions,
            escalation_needed: matches!(category, CausalityCategory::A1 | CausalityCategory::B1),
            investigation_focus: Some(a.temporal.guidance.description.clone()),
            protocol: protocol.cloned(),
            possible_categories: BTreeMap::new(),
            quality_flags: Some(QualityFlags {
                data_complete: a.investigation_gaps.is_empty(),
                diagnostic_certainty: certainty_tier(a.grade.level),
                onset_known: a.temporal.days_to_onset.is_some(),
            }),
        }
    }

    fn dominant_protocol(&self, a: &CausalityAssessment) -> Option<&InvestigationProtocol> {
        a.scoring
            .dominant_category
            .as_deref()
            .and_then(|key| self.kb.protocol(key))
    }
}

#[async_trait]
impl ExplanationService for TemplateExplanationService {
    fn name(&self) -> &str { "template_explanations" }

    async fn explain(&self, case: &ClinicalCase, outcome: &CaseOutcome) -> Result<Explanation> {
        let explanation = match outcome {
            CaseOutcome::EarlyExit(report) => self.early_exit(case, report),
            CaseOutcome::Assessed(a) if a.decision.decision_chain.onset_unknown == Some(true) => {
                self.onset_unknown(case, a)
            }
            CaseOutcome::Assessed(a) => self.normal(case, a),
        };
        debug!(
            case_id = %case.case_id,
            mode = ?explanation.mode,
            gaps = explanation.investigative_gaps.len(),
            "Explanation generated"
        );
        Ok(explanation)
    }
}

// ── Text helpers ──────────────────────────────────────────────────────────────

fn first_two(tests: &[String]) -> &[String] {
    &tests[..tests.len().min(2)]
}

fn certainty_tier(level: u8) -> ConfidenceTier {
    match level {
        1 | 2 => ConfidenceTier::High,
        3 => ConfidenceTier::Medium,
        _ => ConfidenceTier::Low,
    }
}

/// "19-year-old male", "Patient female", "Patient".
fn patient_phrase(case: &ClinicalCase) -> String {
    let age = case
        .demographics
        .age
        .map(|a| format!("{}-year-old", a.trunc() as i64))
        .unwrap_or_else(|| "Patient".to_string());
    match case.demographics.sex() {
        Sex::Male => format!("{age} male"),
        Sex::Female => format!("{age} female"),
        Sex::Unknown => age,
    }
}

fn reasoning(a: &CausalityAssessment) -> String {
    let d = &a.decision;
    let zone = a.temporal.zone;
    let score = a.scoring.max_clinical_score;
    let level = a.grade.level;
    let condition = a.grade.condition.as_str();

    match (d.category, d.decision_chain.rule_fired) {
        (CausalityCategory::A1, _) => format!(
            "Classification A1 ({}): {} is an established adverse event for this product. \
             Certainty level {} confirms the diagnosis. Onset falls within the {} window. \
             Alternative-cause score {:.2} indicates no significant alternative etiology.",
            d.category.short_label(), condition, level, zone, score
        ),
        (CausalityCategory::C, RuleFired::DefiniteAlternativeCause) => format!(
            "Classification C ({}): alternative-cause score {:.2} indicates a definite \
             alternative cause{}. Temporal zone {}. Certainty level {}.",
            d.category.short_label(),
            score,
            a.scoring
                .dominant_label
                .as_deref()
                .map(|l| format!(" ({l})"))
                .unwrap_or_default(),
            zone,
            level
        ),
        (CausalityCategory::C, _) => format!(
            "Classification C ({}): onset in the {} zone is inconsistent with a causal \
             association for {}. Alternative-cause score {:.2}. Certainty level {}.",
            d.category.short_label(), zone, condition, score, level
        ),
        (CausalityCategory::B1, _) => format!(
            "Classification B1 ({}): temporal relationship is {} but {} is not an \
             established adverse event for this product. Alternative-cause score {:.2}.",
            d.category.short_label(), zone, condition, score
        ),
        (CausalityCategory::B2, _) => format!(
            "Classification B2 ({}): evidence both for and against vaccine causation. \
             Alternative-cause score {:.2}, temporal zone {}.",
            d.category.short_label(), score, zone
        ),
        (category, _) => format!(
            "Classification {}: certainty level {}, alternative-cause score {:.2}, temporal zone {}.",
            category, level, score, zone
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causalyx_assess::{CaseInput, CausalityEngine};
    use causalyx_common::EngineConfig;
    use causalyx_ddx::ObservationSet;
    use causalyx_test_utils::{embedded_kb, observations, raw_assessments, CaseBuilder};
    use pretty_assertions::assert_eq;

    fn run(input: &CaseInput) -> (CaseOutcome, Explanation) {
        let kb = embedded_kb();
        let engine = CausalityEngine::new(Arc::clone(&kb), EngineConfig::default()).unwrap();
        let service = TemplateExplanationService::new(kb);
        let outcome = engine.assess(input);
        let explanation = tokio_test::block_on(service.explain(&input.case, &outcome)).unwrap();
        (outcome, explanation)
    }

    fn plain(builder: CaseBuilder) -> CaseInput {
        CaseInput {
            case: builder.build(),
            observations: ObservationSet::default(),
            assessments: BTreeMap::new(),
        }
    }

    #[test]
    fn test_a1_explanation() {
        let (outcome, e) = run(&plain(CaseBuilder::confirmed_myocarditis("X-1")));
        assert_eq!(outcome.category(), CausalityCategory::A1);
        assert_eq!(e.mode, ExplanationMode::Normal);
        assert_eq!(e.risk_signal, RiskSignal::High);
        assert!(e.escalation_needed);
        assert_eq!(
            e.officer_summary,
            "19-year-old male myocarditis 3 days after vaccination classified as A1 \
             (Consistent causal association). No dominant alternative identified. \
             Standard cardiac follow-up recommended."
        );
        assert!(e.reasoning.starts_with("Classification A1"));
        assert!(e.protocol.is_none());
    }

    #[test]
    fn test_early_exit_uses_top_missing_criteria() {
        let (outcome, e) = run(&plain(
            CaseBuilder::new("X-2").patient(40.0, "F").condition("myocarditis").days_to_onset(5),
        ));
        assert!(outcome.is_early_exit());
        assert_eq!(e.mode, ExplanationMode::EarlyExit);
        assert_eq!(e.risk_signal, RiskSignal::Unclassifiable);
        assert_eq!(e.investigative_gaps.len(), 3);
        assert!(e.required_tests.len() <= 3);
        assert!(e.officer_summary.starts_with("Certainty level 4 (myocarditis)"));
        assert!(e.officer_summary.contains("6 criteria missing"));
    }

    #[test]
    fn test_onset_unknown_lists_possible_categories() {
        let (outcome, e) = run(&plain(CaseBuilder::confirmed_myocarditis("X-3").no_onset()));
        assert_eq!(outcome.category(), CausalityCategory::Unclassifiable);
        assert_eq!(e.mode, ExplanationMode::OnsetUnknown);
        assert_eq!(e.possible_categories["if_strong_causal"], CausalityCategory::A1);
        assert_eq!(e.possible_categories["if_unlikely"], CausalityCategory::C);
        assert_eq!(e.investigative_gaps[0].priority, GapPriority::Critical);
    }

    #[test]
    fn test_dominant_alternative_brings_protocol() {
        let mut input = plain(CaseBuilder::confirmed_myocarditis("X-4").patient(67.0, "F"));
        input.observations = observations(&[
            ("medications", "pembrolizumab", "on pembrolizumab for melanoma"),
            ("musculoskeletal", "myositis", "concurrent myositis"),
        ]);
        input.assessments = raw_assessments(serde_json::json!({
            "ici_therapy_active": { "present": true, "mechanistically_concordant": true, "plausibility_tier": "high" },
            "concurrent_myositis": { "present": true, "mechanistically_concordant": true, "plausibility_tier": "high" }
        }));
        let (outcome, e) = run(&input);
        assert_eq!(outcome.category(), CausalityCategory::C);
        assert_eq!(e.risk_signal, RiskSignal::Low);
        let protocol = e.protocol.expect("dominant alternative has a protocol");
        assert_eq!(protocol.subtype, "toxin_ici_myocarditis");
        assert!(!e.required_tests.is_empty());
        assert!(e.recommended_actions[0].starts_with("Investigate dominant alternative"));
    }

    #[test]
    fn test_explanation_carries_no_category() {
        let (_, e) = run(&plain(CaseBuilder::confirmed_myocarditis("X-5")));
        let value = serde_json::to_value(&e).unwrap();
        assert!(value.get("category").is_none());
    }

    #[test]
    fn test_patient_phrase_without_demographics() {
        let case = CaseBuilder::new("X-6").build();
        assert_eq!(patient_phrase(&case), "Patient");
    }
}
