//! End-to-end case scenarios through the full engine.

use causalyx_assess::{
    CaseInput, CaseOutcome, CausalityAssessment, CausalityCategory, CausalityClassifier,
    ClassifierInput, ConfidenceTier, RuleFired, TemporalZone,
};
use causalyx_assess::CausalityEngine;
use causalyx_common::{EngineConfig, ScoringThresholds};
use causalyx_ddx::ObservationSet;
use causalyx_scorer::{AlternativeCauseConclusion, PlausibilityScoringEngine};
use causalyx_test_utils::{assessments, chronic, embedded_kb, observations, raw_assessments, CaseBuilder};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn engine() -> CausalityEngine {
    CausalityEngine::new(embedded_kb(), EngineConfig::default()).unwrap()
}

fn assessed(outcome: CaseOutcome) -> Box<CausalityAssessment> {
    match outcome {
        CaseOutcome::Assessed(a) => a,
        CaseOutcome::EarlyExit(r) => panic!("unexpected early exit for {}", r.case_id),
    }
}

fn input(builder: CaseBuilder) -> CaseInput {
    CaseInput {
        case: builder.build(),
        observations: ObservationSet::default(),
        assessments: BTreeMap::new(),
    }
}

fn classify(level: u8, score: f64, known: bool, step2: bool, zone: TemporalZone) -> CausalityCategory {
    CausalityClassifier::default()
        .classify(&ClassifierInput {
            certainty_level: level,
            max_clinical_score: score,
            known_effect: known,
            step2_met: step2,
            zone,
            conclusion: AlternativeCauseConclusion::from_score(score, &ScoringThresholds::default()),
        })
        .category
}

// ── Reference scenarios ───────────────────────────────────────────────────────

#[test]
fn test_insufficient_certainty_exits_before_classification() {
    let outcome = engine().assess(&input(
        CaseBuilder::new("S-1")
            .patient(24.0, "M")
            .product("Pfizer")
            .condition("myocarditis")
            .days_to_onset(2)
            .symptoms(&["fatigue"]),
    ));
    let CaseOutcome::EarlyExit(report) = outcome else {
        panic!("level 4 must exit early");
    };
    assert_eq!(report.grade.level, 4);
    assert!(!report.missing_criteria.is_empty());
}

#[test]
fn test_definite_alternative_fires_before_known_effect() {
    assert_eq!(classify(2, 0.75, true, true, TemporalZone::StrongCausal), CausalityCategory::C);
}

#[test]
fn test_known_effect_in_window_weak_alternative_is_a1() {
    assert_eq!(classify(2, 0.10, true, true, TemporalZone::StrongCausal), CausalityCategory::A1);
}

#[test]
fn test_unknown_onset_is_unclassifiable_not_c() {
    assert_eq!(classify(3, 0.0, false, false, TemporalZone::Unknown), CausalityCategory::Unclassifiable);
}

#[test]
fn test_non_concordant_indicator_contributes_nothing() {
    let kb = embedded_kb();
    let scorer = PlausibilityScoringEngine::new(&kb, ScoringThresholds::default());
    for (subtype, indicator) in kb.indicators().filter(|(s, _)| !s.is_nuance()) {
        let a = assessments(&kb, &[(indicator.name.as_str(), chronic("long-standing"))]);
        let out = scorer.score(&a);
        assert_eq!(out.score_of(&subtype.key), 0.0, "{} leaked weight", indicator.name);
    }
}

// ── Full-chain cases ──────────────────────────────────────────────────────────

#[test]
fn test_confirmed_young_male_case_is_a1() {
    let a = assessed(engine().assess(&input(CaseBuilder::confirmed_myocarditis("S-6"))));
    assert_eq!(a.grade.level, 1);
    assert_eq!(a.decision.category, CausalityCategory::A1);
    assert_eq!(a.decision.confidence, ConfidenceTier::High);
    assert!(a.temporal.high_risk.is_high_risk);
    assert!(a.temporal.step2_met);
}

#[test]
fn test_checkpoint_inhibitor_case_is_coincidental() {
    let mut case_input = input(CaseBuilder::confirmed_myocarditis("S-7").patient(67.0, "F"));
    case_input.observations = observations(&[
        ("medications", "pembrolizumab", "on pembrolizumab for metastatic melanoma since last month"),
        ("musculoskeletal", "myositis", "concurrent myositis with proximal weakness"),
    ]);
    case_input.assessments = raw_assessments(serde_json::json!({
        "ici_therapy_active": {
            "present": true, "mechanistically_concordant": true,
            "plausibility_tier": "high", "rationale": "ICI started 4 weeks before onset"
        },
        "concurrent_myositis": {
            "present": true, "mechanistically_concordant": true,
            "plausibility_tier": "moderate", "rationale": "ICI overlap syndrome"
        }
    }));

    let a = assessed(engine().assess(&case_input));
    assert_eq!(a.scoring.score_of("toxin_ici_myocarditis"), 1.0);
    assert_eq!(a.scoring.dominant_category.as_deref(), Some("toxin_ici_myocarditis"));
    assert_eq!(a.decision.category, CausalityCategory::C);
    assert_eq!(a.decision.decision_chain.rule_fired, RuleFired::DefiniteAlternativeCause);
}

#[test]
fn test_chronic_exposure_is_filtered_to_conflicting() {
    let mut case_input = input(CaseBuilder::confirmed_myocarditis("S-8"));
    case_input.observations = observations(&[
        ("medications", "pembrolizumab", "pembrolizumab course completed three years ago"),
        ("musculoskeletal", "myositis", "concurrent myositis"),
    ]);
    case_input.assessments = raw_assessments(serde_json::json!({
        "ici_therapy_active": {
            "present": true, "mechanistically_concordant": false,
            "plausibility_tier": "low", "rationale": "remote exposure"
        },
        "concurrent_myositis": {
            "present": true, "mechanistically_concordant": true,
            "plausibility_tier": "high", "rationale": ""
        }
    }));

    let a = assessed(engine().assess(&case_input));
    assert_eq!(a.scoring.score_of("toxin_ici_myocarditis"), 0.5);
    assert_eq!(a.scoring.noise_filtered_count, 1);
    assert_eq!(a.scoring.conclusion, AlternativeCauseConclusion::PossibleOtherCause);
    assert_eq!(a.decision.category, CausalityCategory::B2);
    assert_eq!(a.decision.decision_chain.q5_conflicting_alternatives, Some(true));
}

#[test]
fn test_missing_onset_full_chain() {
    let a = assessed(engine().assess(&input(CaseBuilder::confirmed_myocarditis("S-9").no_onset())));
    assert_eq!(a.temporal.zone, TemporalZone::Unknown);
    assert_eq!(a.decision.category, CausalityCategory::Unclassifiable);
    assert_eq!(a.decision.decision_chain.onset_unknown, Some(true));
    assert_eq!(a.decision.confidence, ConfidenceTier::Low);
}

#[test]
fn test_onset_from_dates_in_background_zone() {
    let a = assessed(engine().assess(&input(
        CaseBuilder::confirmed_myocarditis("S-10").dates("2021-06-01", "07/05/2021"),
    )));
    assert_eq!(a.temporal.days_to_onset, Some(34));
    assert_eq!(a.temporal.zone, TemporalZone::BackgroundRate);
    assert_eq!(a.decision.category, CausalityCategory::C);
    assert_eq!(a.decision.decision_chain.temporal_inconsistent, Some(true));
}

#[test]
fn test_pending_mri_downgrades_certainty_only() {
    let a = assessed(engine().assess(&input(
        CaseBuilder::confirmed_myocarditis("S-11").mri("Cardiac MRI scheduled for next week"),
    )));
    assert_eq!(a.grade.level, 3);
    assert_eq!(a.grade.pending_overrides.len(), 1);
    assert_eq!(a.decision.category, CausalityCategory::A1);
}

#[test]
fn test_pericarditis_without_established_evidence() {
    let a = assessed(engine().assess(&input(
        CaseBuilder::new("S-12")
            .patient(31.0, "M")
            .product("Pfizer-BioNTech")
            .condition("pericarditis")
            .days_to_onset(4)
            .symptoms(&["pleuritic chest pain"])
            .ecg("Diffuse ST elevation with PR depression"),
    )));
    assert_eq!(a.grade.level, 1);
    assert!(!a.temporal.known_effect.is_known_effect);
    assert!(!a.temporal.step2_met);
    assert_eq!(a.decision.category, CausalityCategory::C);
}

#[test]
fn test_narrative_uncertainty_never_reaches_clinical_max() {
    let mut case_input = input(CaseBuilder::confirmed_myocarditis("S-13"));
    case_input.observations = observations(&[(
        "narrative_uncertainty",
        "reporter unsure",
        "reporter states cause unclear, viral testing was not done",
    )]);
    case_input.assessments = raw_assessments(serde_json::json!({
        "reporter_uncertainty": { "present": true },
        "alternative_suspected": { "present": true },
        "lack_of_testing": true
    }));

    let a = assessed(engine().assess(&case_input));
    assert_eq!(a.scoring.epistemic_uncertainty, 0.6);
    assert_eq!(a.scoring.max_clinical_score, 0.0);
    assert_eq!(a.decision.category, CausalityCategory::A1);
    assert!(a
        .investigation_gaps
        .iter()
        .any(|g| g == "Treating clinician expressed diagnostic uncertainty"));
}
