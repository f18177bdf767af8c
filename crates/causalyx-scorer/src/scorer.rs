//! Gated category scoring.
//!
//! An indicator contributes its weight only when it is present,
//! mechanistically concordant, and rated high or moderate plausibility.
//! Narrative-nuance indicators bypass the gate. Risk factors pass through
//! the gate like any clinical indicator but carry weight 0, so they are
//! audited without moving a score.
//!
//! Category score = min(sum of passed weights, 1.0), rounded to 2 decimals.
//! The clinical maximum excludes the narrative-nuance category.

use causalyx_common::{IndicatorFamily, KnowledgeBase, ScoringThresholds, SubtypeKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assessment::{IndicatorAssessment, IndicatorAssessments, PlausibilityTier};
use crate::weights::WeightTable;

/// A passed indicator at or above this weight confirms its category.
const CONFIRMATORY_WEIGHT: f64 = 0.8;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ── Gate ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GateVerdict {
    Passed { plausibility: PlausibilityTier },
    /// Narrative nuance; gate not applied.
    Bypassed,
    Filtered { concordant: bool, plausibility: PlausibilityTier },
}

impl GateVerdict {
    /// Gate decision for a present indicator.
    pub fn evaluate(family: IndicatorFamily, assessment: &IndicatorAssessment) -> Self {
        if family == IndicatorFamily::NarrativeNuance {
            return GateVerdict::Bypassed;
        }
        let tier = assessment.plausibility_tier;
        if assessment.mechanistically_concordant && tier.opens_gate() {
            GateVerdict::Passed { plausibility: tier }
        } else {
            GateVerdict::Filtered {
                concordant: assessment.mechanistically_concordant,
                plausibility: tier,
            }
        }
    }

    pub fn contributes(&self) -> bool {
        !matches!(self, GateVerdict::Filtered { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatedIndicator {
    pub indicator: String,
    pub weight: f64,
    pub verdict: GateVerdict,
    pub rationale: String,
}

// ── Outputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub key: String,
    pub label: String,
    pub kind: SubtypeKind,
    /// In [0, 1].
    pub score: f64,
    pub passed: Vec<GatedIndicator>,
    pub filtered: Vec<GatedIndicator>,
    pub absent: Vec<String>,
    pub pass_count: usize,
    pub filter_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlternativeCauseConclusion {
    DefiniteOtherCause,
    PossibleOtherCause,
    WeakAlternative,
    NoAlternative,
}

impl AlternativeCauseConclusion {
    pub fn from_score(score: f64, thresholds: &ScoringThresholds) -> Self {
        if score >= thresholds.definite_alternative {
            AlternativeCauseConclusion::DefiniteOtherCause
        } else if score >= thresholds.possible_alternative {
            AlternativeCauseConclusion::PossibleOtherCause
        } else if score >= thresholds.weak_alternative {
            AlternativeCauseConclusion::WeakAlternative
        } else {
            AlternativeCauseConclusion::NoAlternative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlternativeCauseConclusion::DefiniteOtherCause => "DEFINITE_OTHER_CAUSE",
            AlternativeCauseConclusion::PossibleOtherCause => "POSSIBLE_OTHER_CAUSE",
            AlternativeCauseConclusion::WeakAlternative => "WEAK_ALTERNATIVE",
            AlternativeCauseConclusion::NoAlternative => "NO_ALTERNATIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceStatus {
    Confirmed,
    Suspected,
    Weak,
    Filtered,
}

/// One clinical category worth reporting as a possible alternative cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeEtiology {
    pub subtype: String,
    pub label: String,
    pub score: f64,
    pub status: EvidenceStatus,
    pub evidence_included: Vec<GatedIndicator>,
    pub evidence_excluded: Vec<GatedIndicator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringOutcome {
    /// Every category in knowledge-base order, nuance included.
    pub category_scores: Vec<CategoryScore>,
    /// Highest clinical category score; nuance excluded.
    pub max_clinical_score: f64,
    /// Subtype key of the highest clinical category, `None` when all are 0.
    pub dominant_category: Option<String>,
    pub dominant_label: Option<String>,
    /// Narrative-nuance score, reported separately.
    pub epistemic_uncertainty: f64,
    pub conclusion: AlternativeCauseConclusion,
    /// Present indicators stopped by the gate, over all categories.
    pub noise_filtered_count: usize,
    pub alternative_etiologies: Vec<AlternativeEtiology>,
}

impl ScoringOutcome {
    pub fn category(&self, key: &str) -> Option<&CategoryScore> {
        self.category_scores.iter().find(|c| c.key == key)
    }

    pub fn score_of(&self, key: &str) -> f64 {
        self.category(key).map(|c| c.score).unwrap_or(0.0)
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct PlausibilityScoringEngine {
    weights: WeightTable,
    thresholds: ScoringThresholds,
}

impl PlausibilityScoringEngine {
    pub fn new(kb: &KnowledgeBase, thresholds: ScoringThresholds) -> Self {
        Self {
            weights: WeightTable::from_knowledge_base(kb),
            thresholds,
        }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn thresholds(&self) -> &ScoringThresholds {
        &self.thresholds
    }

    /// Score a complete assessment mapping. Indicators missing from the
    /// mapping count as absent.
    pub fn score(&self, assessments: &IndicatorAssessments) -> ScoringOutcome {
        let absent = IndicatorAssessment::absent();
        let mut category_scores = Vec::with_capacity(self.weights.categories.len());

        for category in &self.weights.categories {
            let mut sum = 0.0;
            let mut passed = Vec::new();
            let mut filtered = Vec::new();
            let mut absent_names = Vec::new();

            for entry in &category.entries {
                let a = assessments.get(&entry.indicator).unwrap_or(&absent);
                if !a.present {
                    absent_names.push(entry.indicator.clone());
                    continue;
                }
                let verdict = GateVerdict::evaluate(entry.family, a);
                let gated = GatedIndicator {
                    indicator: entry.indicator.clone(),
                    weight: entry.weight,
                    rationale: a.rationale.clone(),
                    verdict,
                };
                if gated.verdict.contributes() {
                    sum += entry.weight;
                    passed.push(gated);
                } else {
                    filtered.push(gated);
                }
            }

            let score = round2(sum.min(1.0));
            category_scores.push(CategoryScore {
                key: category.key.clone(),
                label: category.label.clone(),
                kind: category.kind,
                score,
                pass_count: passed.len(),
                filter_count: filtered.len(),
                passed,
                filtered,
                absent: absent_names,
            });
        }

        // First maximum in knowledge-base order wins ties.
        let mut dominant: Option<&CategoryScore> = None;
        for c in category_scores.iter().filter(|c| c.kind == SubtypeKind::Clinical) {
            if dominant.map_or(true, |d| c.score > d.score) {
                dominant = Some(c);
            }
        }
        let max_clinical_score = dominant.map(|d| d.score).unwrap_or(0.0);
        let (dominant_category, dominant_label) = match dominant {
            Some(d) if d.score > 0.0 => (Some(d.key.clone()), Some(d.label.clone())),
            _ => (None, None),
        };

        let epistemic_uncertainty = category_scores
            .iter()
            .filter(|c| c.kind == SubtypeKind::NarrativeNuance)
            .map(|c| c.score)
            .fold(0.0, f64::max);

        let conclusion = AlternativeCauseConclusion::from_score(max_clinical_score, &self.thresholds);
        let noise_filtered_count = category_scores.iter().map(|c| c.filter_count).sum();
        let alternative_etiologies = self.summarize(&category_scores);

        debug!(
            max_clinical_score,
            epistemic_uncertainty,
            conclusion = conclusion.as_str(),
            dominant = dominant_category.as_deref().unwrap_or("none"),
            noise_filtered_count,
            "Plausibility scoring complete"
        );

        ScoringOutcome {
            category_scores,
            max_clinical_score,
            dominant_category,
            dominant_label,
            epistemic_uncertainty,
            conclusion,
            noise_filtered_count,
            alternative_etiologies,
        }
    }

    /// Clinical categories with a positive score or any filtered indicator,
    /// highest score first.
    fn summarize(&self, scores: &[CategoryScore]) -> Vec<AlternativeEtiology> {
        let mut out: Vec<AlternativeEtiology> = scores
            .iter()
            .filter(|c| c.kind == SubtypeKind::Clinical)
            .filter(|c| c.score > 0.0 || c.filter_count > 0)
            .map(|c| AlternativeEtiology {
                subtype: c.key.clone(),
                label: c.label.clone(),
                score: c.score,
                status: self.evidence_status(c),
                evidence_included: c.passed.clone(),
                evidence_excluded: c.filtered.clone(),
            })
            .collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        out
    }

    fn evidence_status(&self, c: &CategoryScore) -> EvidenceStatus {
        if c.score <= 0.0 {
            return EvidenceStatus::Filtered;
        }
        if c.passed.iter().any(|g| g.weight >= CONFIRMATORY_WEIGHT) {
            EvidenceStatus::Confirmed
        } else if c.score >= self.thresholds.possible_alternative {
            EvidenceStatus::Suspected
        } else {
            EvidenceStatus::Weak
        }
    }
}
