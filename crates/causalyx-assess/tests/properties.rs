//! Exhaustive and sweep checks over the classifier and scorer.

use causalyx_assess::{
    CaseInput, CausalityCategory, CausalityClassifier, CausalityEngine, ClassifierInput,
    TemporalZone,
};
use causalyx_common::{EngineConfig, IndicatorFamily, ScoringThresholds};
use causalyx_scorer::{
    AlternativeCauseConclusion, IndicatorAssessment, PlausibilityScoringEngine, PlausibilityTier,
};
use causalyx_test_utils::{assessments, embedded_kb, observations, raw_assessments, strong, with_tier, CaseBuilder};

const SCORES: &[f64] = &[0.0, 0.1, 0.19, 0.2, 0.39, 0.4, 0.55, 0.69, 0.7, 0.85, 1.0];

fn classifier_input(level: u8, score: f64, known: bool, step2: bool, zone: TemporalZone) -> ClassifierInput {
    ClassifierInput {
        certainty_level: level,
        max_clinical_score: score,
        known_effect: known,
        step2_met: step2,
        zone,
        conclusion: AlternativeCauseConclusion::from_score(score, &ScoringThresholds::default()),
    }
}

#[test]
fn test_classifier_is_total() {
    let classifier = CausalityClassifier::default();
    let reachable = [
        CausalityCategory::A1,
        CausalityCategory::B1,
        CausalityCategory::B2,
        CausalityCategory::C,
        CausalityCategory::Unclassifiable,
    ];
    for level in 1..=4u8 {
        for &score in SCORES {
            for known in [true, false] {
                for step2 in [true, false] {
                    for zone in TemporalZone::ALL {
                        let d = classifier.classify(&classifier_input(level, score, known, step2, zone));
                        assert!(reachable.contains(&d.category));
                        assert_eq!(d.confidence, d.category.confidence());
                        assert_eq!(d.label, d.category.label());
                        assert_eq!(d.decision_chain.q1_valid_diagnosis, level <= 3);
                    }
                }
            }
        }
    }
}

#[test]
fn test_classifier_is_deterministic() {
    let classifier = CausalityClassifier::default();
    for zone in TemporalZone::ALL {
        let input = classifier_input(2, 0.45, true, zone.within_causal_window(), zone);
        let first = classifier.classify(&input);
        for _ in 0..100 {
            assert_eq!(classifier.classify(&input), first);
        }
    }
}

#[test]
fn test_engine_output_is_reproducible() {
    let engine = CausalityEngine::new(embedded_kb(), EngineConfig::default()).unwrap();
    let input = CaseInput {
        case: CaseBuilder::confirmed_myocarditis("P-1").build(),
        observations: observations(&[
            ("prodrome", "fever", "fever and cough one week before chest pain"),
            ("labs", "d-dimer", "d-dimer mildly elevated"),
        ]),
        assessments: raw_assessments(serde_json::json!({
            "fever_reported": { "present": true, "mechanistically_concordant": true, "plausibility_tier": "moderate" },
            "uri_symptoms": true,
            "elevated_d_dimer": { "present": true, "plausibility": "low" }
        })),
    };
    let first = serde_json::to_value(engine.assess(&input)).unwrap();
    for _ in 0..20 {
        assert_eq!(serde_json::to_value(engine.assess(&input)).unwrap(), first);
    }
}

#[test]
fn test_gate_is_monotone_in_plausibility() {
    let kb = embedded_kb();
    let scorer = PlausibilityScoringEngine::new(&kb, ScoringThresholds::default());
    let tiers = [
        PlausibilityTier::High,
        PlausibilityTier::Moderate,
        PlausibilityTier::Low,
        PlausibilityTier::None,
    ];
    for (subtype, indicator) in kb.indicators() {
        // A second present indicator in the same category keeps the sum non-trivial.
        let companion = subtype
            .indicators
            .iter()
            .find(|i| i.name != indicator.name)
            .map(|i| i.name.as_str());

        let mut previous = f64::INFINITY;
        for tier in tiers {
            let mut present = vec![(indicator.name.as_str(), with_tier(tier))];
            if let Some(other) = companion {
                present.push((other, strong("")));
            }
            let score = scorer.score(&assessments(&kb, &present)).score_of(&subtype.key);
            assert!(score <= previous, "{} rose when lowered to {:?}", indicator.name, tier);
            previous = score;
        }
    }
}

#[test]
fn test_scores_are_bounded() {
    let kb = embedded_kb();
    let scorer = PlausibilityScoringEngine::new(&kb, ScoringThresholds::default());
    let everything: Vec<(&str, IndicatorAssessment)> =
        kb.indicators().map(|(_, i)| (i.name.as_str(), strong(""))).collect();
    let out = scorer.score(&assessments(&kb, &everything));
    for c in &out.category_scores {
        assert!((0.0..=1.0).contains(&c.score), "{} = {}", c.key, c.score);
    }
    assert!((0.0..=1.0).contains(&out.max_clinical_score));
    assert!((0.0..=1.0).contains(&out.epistemic_uncertainty));
}

#[test]
fn test_uncertainty_never_escalates_conclusion() {
    let kb = embedded_kb();
    let scorer = PlausibilityScoringEngine::new(&kb, ScoringThresholds::default());
    let nuance: Vec<&str> = kb
        .indicators()
        .filter(|(_, i)| i.family == IndicatorFamily::NarrativeNuance)
        .map(|(_, i)| i.name.as_str())
        .collect();
    assert!(!nuance.is_empty());

    let baselines: Vec<Vec<(&str, IndicatorAssessment)>> = vec![
        vec![],
        vec![("fever_reported", strong(""))],
        vec![("elevated_d_dimer", strong("")), ("lymphocytosis", strong(""))],
    ];
    for baseline in baselines {
        let before = scorer.score(&assessments(&kb, &baseline));
        let mut with_nuance = baseline.clone();
        with_nuance.extend(nuance.iter().map(|n| (*n, strong(""))));
        let after = scorer.score(&assessments(&kb, &with_nuance));

        assert_eq!(before.max_clinical_score, after.max_clinical_score);
        assert_eq!(before.conclusion, after.conclusion);
        assert_ne!(after.conclusion, AlternativeCauseConclusion::DefiniteOtherCause);
        assert!(after.epistemic_uncertainty > 0.0);
    }
}

#[test]
fn test_risk_factors_never_move_scores() {
    let kb = embedded_kb();
    let scorer = PlausibilityScoringEngine::new(&kb, ScoringThresholds::default());
    let clinical = vec![("prior_cad_history", strong("")), ("focal_st_changes", strong(""))];
    let before = scorer.score(&assessments(&kb, &clinical));

    for (_, risk) in kb.indicators().filter(|(_, i)| i.family == IndicatorFamily::RiskFactor) {
        let mut with_risk = clinical.clone();
        with_risk.push((risk.name.as_str(), strong("")));
        let after = scorer.score(&assessments(&kb, &with_risk));
        for (b, a) in before.category_scores.iter().zip(&after.category_scores) {
            assert_eq!(b.score, a.score, "{} moved {}", risk.name, b.key);
        }
    }
}
