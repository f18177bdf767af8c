//! Causality classification decision tree.
//!
//! A single pass over fixed rule checkpoints, first match wins:
//!
//! 1. certainty level > 3                      → Unclassifiable
//! 2. clinical score ≥ definite threshold      → C
//! 3. zone unknown                             → Unclassifiable
//! 4. known effect: step 2 met, score < possible → A1; step 2 met otherwise → B2;
//!    step 2 failed in background-rate / unlikely zone → C; otherwise → B2
//! 5. not known effect: step 2 met, score ≥ possible → B2; step 2 met → B1;
//!    otherwise → C
//!
//! The order is load-bearing. The unknown-zone check must stay ahead of the
//! known-effect branches.
//!
//! Confidence is a lookup on the final category. The function is total;
//! an out-of-range score is a caller defect and panics.

use causalyx_common::ScoringThresholds;
use causalyx_scorer::AlternativeCauseConclusion;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::temporal::TemporalZone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CausalityCategory {
    A1,
    A2,
    A3,
    A4,
    B1,
    B2,
    C,
    Unclassifiable,
}

impl CausalityCategory {
    pub fn code(&self) -> &'static str {
        match self {
            CausalityCategory::A1 => "A1",
            CausalityCategory::A2 => "A2",
            CausalityCategory::A3 => "A3",
            CausalityCategory::A4 => "A4",
            CausalityCategory::B1 => "B1",
            CausalityCategory::B2 => "B2",
            CausalityCategory::C => "C",
            CausalityCategory::Unclassifiable => "Unclassifiable",
        }
    }

    /// Official category label.
    pub fn label(&self) -> &'static str {
        match self {
            CausalityCategory::A1 => "Consistent with causal association (Vaccine product-related)",
            CausalityCategory::A2 => "Consistent with causal association (Vaccine quality defect)",
            CausalityCategory::A3 => "Consistent with causal association (Immunization error)",
            CausalityCategory::A4 => "Consistent with causal association (Immunization anxiety)",
            CausalityCategory::B1 => "Indeterminate (potential signal)",
            CausalityCategory::B2 => "Indeterminate (conflicting factors)",
            CausalityCategory::C => "Inconsistent with causal association (Coincidental)",
            CausalityCategory::Unclassifiable => "Insufficient data for meaningful assessment",
        }
    }

    /// Short label for one-line summaries.
    pub fn short_label(&self) -> &'static str {
        match self {
            CausalityCategory::A1 => "Consistent causal association",
            CausalityCategory::A2 => "Consistent causal association, product defect",
            CausalityCategory::A3 => "Consistent causal association, immunization error",
            CausalityCategory::A4 => "Consistent causal association, stress response",
            CausalityCategory::B1 => "Indeterminate",
            CausalityCategory::B2 => "Indeterminate, conflicting evidence",
            CausalityCategory::C => "Coincidental",
            CausalityCategory::Unclassifiable => "Unclassifiable, insufficient data",
        }
    }

    pub fn confidence(&self) -> ConfidenceTier {
        match self {
            CausalityCategory::A1 | CausalityCategory::C => ConfidenceTier::High,
            CausalityCategory::B1 | CausalityCategory::B2 => ConfidenceTier::Medium,
            _ => ConfidenceTier::Low,
        }
    }
}

impl std::fmt::Display for CausalityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "HIGH",
            ConfidenceTier::Medium => "MEDIUM",
            ConfidenceTier::Low => "LOW",
        }
    }
}

/// Plain values the tree consumes; nothing here refers back to the
/// components that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierInput {
    pub certainty_level: u8,
    pub max_clinical_score: f64,
    pub known_effect: bool,
    pub step2_met: bool,
    pub zone: TemporalZone,
    /// Carried for audit only.
    pub conclusion: AlternativeCauseConclusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFired {
    InsufficientCertainty,
    DefiniteAlternativeCause,
    OnsetUnknown,
    KnownEffectConsistent,
    KnownEffectConflictingAlternative,
    KnownEffectTemporalInconsistent,
    KnownEffectTemporalUncertain,
    NotKnownEffectConflictingAlternative,
    PotentialSignal,
    NotKnownEffectOutsideWindow,
}

/// Every checkpoint of the tree. `None` means the rule was never reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionChain {
    pub q1_valid_diagnosis: bool,
    pub q2_definite_other_cause: Option<bool>,
    pub onset_unknown: Option<bool>,
    pub q3_known_effect: Option<bool>,
    pub q4_temporal_met: Option<bool>,
    pub q5_conflicting_alternatives: Option<bool>,
    pub temporal_inconsistent: Option<bool>,
    pub certainty_level: u8,
    pub max_clinical_score: f64,
    pub zone: TemporalZone,
    pub conclusion: AlternativeCauseConclusion,
    pub rule_fired: RuleFired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalityDecision {
    pub category: CausalityCategory,
    pub label: String,
    pub confidence: ConfidenceTier,
    pub decision_chain: DecisionChain,
    pub key_factors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CausalityClassifier {
    thresholds: ScoringThresholds,
}

impl CausalityClassifier {
    pub fn new(thresholds: ScoringThresholds) -> Self {
        Self { thresholds }
    }

    pub fn classify(&self, input: &ClassifierInput) -> CausalityDecision {
        let score = input.max_clinical_score;
        assert!(
            score.is_finite() && (0.0..=1.0).contains(&score),
            "clinical score out of range: {score}"
        );
        assert!(input.certainty_level >= 1, "certainty level must be 1-4");

        let definite = self.thresholds.definite_alternative;
        let possible = self.thresholds.possible_alternative;

        let mut chain = DecisionChain {
            q1_valid_diagnosis: input.certainty_level <= 3,
            q2_definite_other_cause: None,
            onset_unknown: None,
            q3_known_effect: None,
            q4_temporal_met: None,
            q5_conflicting_alternatives: None,
            temporal_inconsistent: None,
            certainty_level: input.certainty_level,
            max_clinical_score: score,
            zone: input.zone,
            conclusion: input.conclusion,
            rule_fired: RuleFired::InsufficientCertainty,
        };

        let category = 'tree: {
            // Rule 1
            if !chain.q1_valid_diagnosis {
                break 'tree CausalityCategory::Unclassifiable;
            }

            // Rule 2
            let definite_other = score >= definite;
            chain.q2_definite_other_cause = Some(definite_other);
            if definite_other {
                chain.rule_fired = RuleFired::DefiniteAlternativeCause;
                break 'tree CausalityCategory::C;
            }

            // Rule 3
            let onset_unknown = input.zone == TemporalZone::Unknown;
            chain.onset_unknown = Some(onset_unknown);
            if onset_unknown {
                chain.rule_fired = RuleFired::OnsetUnknown;
                break 'tree CausalityCategory::Unclassifiable;
            }

            chain.q3_known_effect = Some(input.known_effect);
            chain.q4_temporal_met = Some(input.step2_met);

            // Rule 4 / 5
            match (input.known_effect, input.step2_met) {
                (true, true) => {
                    let conflicting = score >= possible;
                    chain.q5_conflicting_alternatives = Some(conflicting);
                    if conflicting {
                        chain.rule_fired = RuleFired::KnownEffectConflictingAlternative;
                        CausalityCategory::B2
                    } else {
                        chain.rule_fired = RuleFired::KnownEffectConsistent;
                        CausalityCategory::A1
                    }
                }
                (true, false) => {
                    let inconsistent =
                        matches!(input.zone, TemporalZone::BackgroundRate | TemporalZone::Unlikely);
                    chain.temporal_inconsistent = Some(inconsistent);
                    if inconsistent {
                        chain.rule_fired = RuleFired::KnownEffectTemporalInconsistent;
                        CausalityCategory::C
                    } else {
                        chain.rule_fired = RuleFired::KnownEffectTemporalUncertain;
                        CausalityCategory::B2
                    }
                }
                (false, true) => {
                    let conflicting = score >= possible;
                    chain.q5_conflicting_alternatives = Some(conflicting);
                    if conflicting {
                        chain.rule_fired = RuleFired::NotKnownEffectConflictingAlternative;
                        CausalityCategory::B2
                    } else {
                        chain.rule_fired = RuleFired::PotentialSignal;
                        CausalityCategory::B1
                    }
                }
                (false, false) => {
                    chain.rule_fired = RuleFired::NotKnownEffectOutsideWindow;
                    CausalityCategory::C
                }
            }
        };

        let mut key_factors = vec![
            format!("Certainty level {}", input.certainty_level),
            format!("Alternative-cause score {score:.2}"),
            input.zone.as_str().to_string(),
        ];
        if input.known_effect {
            key_factors.push("Known effect (ESTABLISHED)".to_string());
        }
        if input.step2_met {
            key_factors.push(format!("Temporal met ({})", input.zone));
        }

        debug!(
            category = category.code(),
            rule = ?chain.rule_fired,
            level = input.certainty_level,
            score,
            zone = input.zone.as_str(),
            "Causality classified"
        );

        CausalityDecision {
            category,
            label: category.label().to_string(),
            confidence: category.confidence(),
            decision_chain: chain,
            key_factors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input(level: u8, score: f64, known: bool, step2: bool, zone: TemporalZone) -> ClassifierInput {
        ClassifierInput {
            certainty_level: level,
            max_clinical_score: score,
            known_effect: known,
            step2_met: step2,
            zone,
            conclusion: AlternativeCauseConclusion::from_score(score, &ScoringThresholds::default()),
        }
    }

    fn classify(i: ClassifierInput) -> CausalityDecision {
        CausalityClassifier::default().classify(&i)
    }

    #[test]
    fn test_level_four_is_unclassifiable() {
        let d = classify(input(4, 0.9, true, true, TemporalZone::StrongCausal));
        assert_eq!(d.category, CausalityCategory::Unclassifiable);
        assert_eq!(d.decision_chain.rule_fired, RuleFired::InsufficientCertainty);
        assert_eq!(d.decision_chain.q2_definite_other_cause, None);
        assert_eq!(d.confidence, ConfidenceTier::Low);
    }

    #[test]
    fn test_definite_alternative_before_known_effect() {
        let d = classify(input(2, 0.75, true, true, TemporalZone::StrongCausal));
        assert_eq!(d.category, CausalityCategory::C);
        assert_eq!(d.decision_chain.q2_definite_other_cause, Some(true));
        assert_eq!(d.decision_chain.q3_known_effect, None);
        assert_eq!(d.confidence, ConfidenceTier::High);
    }

    #[test]
    fn test_known_effect_consistent() {
        let d = classify(input(2, 0.10, true, true, TemporalZone::StrongCausal));
        assert_eq!(d.category, CausalityCategory::A1);
        assert_eq!(d.label, "Consistent with causal association (Vaccine product-related)");
        assert_eq!(d.decision_chain.q5_conflicting_alternatives, Some(false));
        assert_eq!(
            d.key_factors,
            vec![
                "Certainty level 2",
                "Alternative-cause score 0.10",
                "STRONG_CAUSAL",
                "Known effect (ESTABLISHED)",
                "Temporal met (STRONG_CAUSAL)",
            ]
        );
    }

    #[test]
    fn test_onset_unknown_beats_not_known_branch() {
        let d = classify(input(3, 0.0, false, false, TemporalZone::Unknown));
        assert_eq!(d.category, CausalityCategory::Unclassifiable);
        assert_eq!(d.decision_chain.onset_unknown, Some(true));
        assert_eq!(d.decision_chain.rule_fired, RuleFired::OnsetUnknown);
        assert_eq!(d.decision_chain.q3_known_effect, None);
    }

    #[test]
    fn test_known_effect_branches() {
        assert_eq!(classify(input(1, 0.40, true, true, TemporalZone::Plausible)).category, CausalityCategory::B2);
        assert_eq!(classify(input(1, 0.0, true, false, TemporalZone::BackgroundRate)).category, CausalityCategory::C);
        assert_eq!(classify(input(1, 0.0, true, false, TemporalZone::Unlikely)).category, CausalityCategory::C);
        let d = classify(input(1, 0.0, true, false, TemporalZone::PreExposure));
        assert_eq!(d.category, CausalityCategory::B2);
        assert_eq!(d.decision_chain.temporal_inconsistent, Some(false));
    }

    #[test]
    fn test_not_known_effect_branches() {
        assert_eq!(classify(input(2, 0.5, false, true, TemporalZone::StrongCausal)).category, CausalityCategory::B2);
        let d = classify(input(2, 0.39, false, true, TemporalZone::StrongCausal));
        assert_eq!(d.category, CausalityCategory::B1);
        assert_eq!(d.confidence, ConfidenceTier::Medium);
        assert_eq!(classify(input(2, 0.0, false, false, TemporalZone::Plausible)).category, CausalityCategory::C);
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let strict = CausalityClassifier::new(ScoringThresholds {
            definite_alternative: 0.9,
            possible_alternative: 0.6,
            weak_alternative: 0.3,
        });
        let d = strict.classify(&input(2, 0.75, true, true, TemporalZone::StrongCausal));
        assert_eq!(d.category, CausalityCategory::B2);
    }

    #[test]
    #[should_panic(expected = "clinical score out of range")]
    fn test_nan_score_panics() {
        classify(input(2, f64::NAN, true, true, TemporalZone::StrongCausal));
    }

    #[test]
    fn test_confidence_lookup() {
        assert_eq!(CausalityCategory::A1.confidence(), ConfidenceTier::High);
        assert_eq!(CausalityCategory::B2.confidence(), ConfidenceTier::Medium);
        assert_eq!(CausalityCategory::A3.confidence(), ConfidenceTier::Low);
        assert_eq!(CausalityCategory::Unclassifiable.confidence(), ConfidenceTier::Low);
    }
}
