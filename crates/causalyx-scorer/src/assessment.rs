//! Indicator assessments and their ingestion.
//!
//! The assessment service may answer with the full four-field shape or, from
//! older prompts, with a bare boolean. Both are normalised here into
//! [`IndicatorAssessment`] so scoring never branches on shape. The result
//! always covers every knowledge-base indicator.

use causalyx_common::{IndicatorFamily, KnowledgeBase};
use causalyx_ddx::DifferentialResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const ABSENT_RATIONALE: &str = "Not identified in narrative.";
const LEGACY_RATIONALE: &str = "Legacy boolean conversion";

/// Biological plausibility as an acute cause. Ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlausibilityTier {
    #[default]
    None,
    Low,
    Moderate,
    High,
}

impl PlausibilityTier {
    /// Lenient parse; anything unrecognised is `None`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => PlausibilityTier::High,
            "moderate" | "medium" => PlausibilityTier::Moderate,
            "low" => PlausibilityTier::Low,
            _ => PlausibilityTier::None,
        }
    }

    pub fn opens_gate(&self) -> bool {
        matches!(self, PlausibilityTier::High | PlausibilityTier::Moderate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlausibilityTier::None => "none",
            PlausibilityTier::Low => "low",
            PlausibilityTier::Moderate => "moderate",
            PlausibilityTier::High => "high",
        }
    }
}

/// Canonical four-dimensional assessment of one indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorAssessment {
    pub present: bool,
    /// Can this finding cause the acute form of the condition?
    pub mechanistically_concordant: bool,
    pub plausibility_tier: PlausibilityTier,
    /// Audit only.
    pub rationale: String,
}

impl IndicatorAssessment {
    pub fn absent() -> Self {
        Self {
            present: false,
            mechanistically_concordant: false,
            plausibility_tier: PlausibilityTier::None,
            rationale: ABSENT_RATIONALE.to_string(),
        }
    }

    pub fn present(concordant: bool, tier: PlausibilityTier, rationale: impl Into<String>) -> Self {
        Self {
            present: true,
            mechanistically_concordant: concordant,
            plausibility_tier: tier,
            rationale: rationale.into(),
        }
    }

    pub fn from_legacy(present: bool) -> Self {
        Self {
            present,
            mechanistically_concordant: true,
            plausibility_tier: if present { PlausibilityTier::Moderate } else { PlausibilityTier::None },
            rationale: LEGACY_RATIONALE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// Four-field answer with every field optional, as returned by the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFullAssessment {
    #[serde(default)]
    pub present: Option<bool>,
    #[serde(default, alias = "is_acute_concordant")]
    pub mechanistically_concordant: Option<bool>,
    #[serde(default, alias = "plausibility")]
    pub plausibility_tier: Option<String>,
    #[serde(default, alias = "biological_rationale")]
    pub rationale: Option<String>,
}

/// Either shape the assessment service may produce for one indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawIndicatorAssessment {
    Legacy(bool),
    Full(RawFullAssessment),
    /// Any other JSON value; treated as not present.
    Malformed(serde_json::Value),
}

impl RawIndicatorAssessment {
    /// Normalise into the canonical shape. Nuance indicators default to
    /// concordant when the field is omitted.
    pub fn normalize(&self, family: IndicatorFamily) -> IndicatorAssessment {
        match self {
            RawIndicatorAssessment::Legacy(present) => IndicatorAssessment::from_legacy(*present),
            RawIndicatorAssessment::Full(full) => IndicatorAssessment {
                present: full.present.unwrap_or(false),
                mechanistically_concordant: full
                    .mechanistically_concordant
                    .unwrap_or(family == IndicatorFamily::NarrativeNuance),
                plausibility_tier: full
                    .plausibility_tier
                    .as_deref()
                    .map(PlausibilityTier::parse)
                    .unwrap_or_default(),
                rationale: full.rationale.clone().unwrap_or_default(),
            },
            RawIndicatorAssessment::Malformed(_) => IndicatorAssessment::absent(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which indicators the assessment service was asked about.
#[derive(Debug, Clone)]
pub enum AssessmentScope {
    /// Every answer is accepted.
    Unrestricted,
    /// Only matcher hits, plus nuance indicators when nuance observations exist.
    Matched {
        indicators: BTreeSet<String>,
        nuance: bool,
    },
}

impl AssessmentScope {
    pub fn from_differential(result: &DifferentialResult) -> Self {
        AssessmentScope::Matched {
            indicators: result.matched_indicator_names(),
            nuance: result.has_nuance_observations(),
        }
    }

    pub fn allows(&self, name: &str, family: IndicatorFamily) -> bool {
        match self {
            AssessmentScope::Unrestricted => true,
            AssessmentScope::Matched { indicators, nuance } => {
                if family == IndicatorFamily::NarrativeNuance {
                    *nuance
                } else {
                    indicators.contains(name)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Complete mapping
// ---------------------------------------------------------------------------

/// Assessment for every knowledge-base indicator, keyed by indicator name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorAssessments {
    entries: BTreeMap<String, IndicatorAssessment>,
}

impl IndicatorAssessments {
    /// Every indicator absent.
    pub fn all_absent(kb: &KnowledgeBase) -> Self {
        let entries = kb
            .indicators()
            .map(|(_, ind)| (ind.name.clone(), IndicatorAssessment::absent()))
            .collect();
        Self { entries }
    }

    /// Ingest a raw service answer. Indicators outside `scope` or missing
    /// from `raw` become absent; names unknown to the knowledge base are
    /// dropped with a warning.
    pub fn ingest(
        kb: &KnowledgeBase,
        raw: &BTreeMap<String, RawIndicatorAssessment>,
        scope: &AssessmentScope,
    ) -> Self {
        for name in raw.keys() {
            if kb.indicator(name).is_none() {
                warn!(indicator = %name, "Ignoring assessment for unknown indicator");
            }
        }

        let mut entries = BTreeMap::new();
        let mut assessed = 0usize;
        for (_, ind) in kb.indicators() {
            let assessment = match raw.get(&ind.name) {
                Some(r) if scope.allows(&ind.name, ind.family) => {
                    assessed += 1;
                    r.normalize(ind.family)
                }
                Some(_) => {
                    debug!(indicator = %ind.name, "Assessment outside matched scope, treated as absent");
                    IndicatorAssessment::absent()
                }
                None => IndicatorAssessment::absent(),
            };
            entries.insert(ind.name.clone(), assessment);
        }

        debug!(assessed, total = entries.len(), "Ingested indicator assessments");
        Self { entries }
    }

    /// Replace one indicator's assessment. Unknown names are accepted so
    /// callers can build mappings for alternate knowledge bases.
    pub fn set(&mut self, name: &str, assessment: IndicatorAssessment) -> &mut Self {
        self.entries.insert(name.to_string(), assessment);
        self
    }

    pub fn get(&self, name: &str) -> Option<&IndicatorAssessment> {
        self.entries.get(name)
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.get(name).map(|a| a.present).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndicatorAssessment)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
