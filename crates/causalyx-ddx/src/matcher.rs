//! Keyword matching of observations against knowledge-base indicators.
//!
//! For each indicator, observations are scanned in order and the first one
//! containing an indicator keyword (and none of its negative keywords) is
//! recorded. Later observations are never considered for that indicator.
//! An indicator whose leading keywords appear in the case's explicit
//! negative findings never matches.

use causalyx_common::keyword::{any_match, first_match};
use causalyx_common::{KeywordPattern, KnowledgeBase, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::observation::{Observation, ObservationSet};

/// Number of leading indicator keywords tested against the negative findings.
pub const NEGATIVE_FINDING_KEYWORD_SPAN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedIndicator {
    pub name: String,
    pub matched_keyword: String,
    pub source_observation: String,
    pub source_context: String,
    pub source_domain: String,
    pub differentiation_note: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEtiology {
    pub subtype: String,
    pub label: String,
    pub matched_indicators: Vec<MatchedIndicator>,
    pub unmatched_indicators: Vec<String>,
    pub differentiation_questions: Vec<String>,
}

impl CandidateEtiology {
    pub fn matched_weight(&self) -> f64 {
        self.matched_indicators.iter().map(|m| m.weight).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub total_candidates: usize,
    pub total_matched_indicators: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifferentialResult {
    /// Sorted by matched weight, descending; ties keep knowledge-base order.
    pub candidates: Vec<CandidateEtiology>,
    /// Narrative-uncertainty observations, passed through unchanged.
    pub narrative_nuance_observations: Vec<Observation>,
    pub summary: MatchSummary,
}

impl DifferentialResult {
    /// Names of every indicator the matcher found. Only these (plus the
    /// nuance indicators when nuance observations exist) are assessable.
    pub fn matched_indicator_names(&self) -> BTreeSet<String> {
        self.candidates
            .iter()
            .flat_map(|c| c.matched_indicators.iter().map(|m| m.name.clone()))
            .collect()
    }

    pub fn has_nuance_observations(&self) -> bool {
        !self.narrative_nuance_observations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Compiled knowledge base
// ---------------------------------------------------------------------------

struct CompiledIndicator {
    indicator_idx: usize,
    keywords: Vec<KeywordPattern>,
    negatives: Vec<KeywordPattern>,
}

struct CompiledSubtype {
    subtype_idx: usize,
    indicators: Vec<CompiledIndicator>,
}

/// Matcher with every knowledge-base keyword compiled once up front.
pub struct DifferentialMatcher {
    kb: Arc<KnowledgeBase>,
    subtypes: Vec<CompiledSubtype>,
}

impl DifferentialMatcher {
    pub fn new(kb: Arc<KnowledgeBase>) -> Result<Self> {
        let mut subtypes = Vec::new();
        for (subtype_idx, subtype) in kb.subtypes.iter().enumerate() {
            // Nuance indicators are assessed from pass-through observations.
            if subtype.is_nuance() {
                continue;
            }
            let indicators = subtype
                .indicators
                .iter()
                .enumerate()
                .map(|(indicator_idx, ind)| {
                    Ok(CompiledIndicator {
                        indicator_idx,
                        keywords: KeywordPattern::compile_all(&ind.keywords)?,
                        negatives: KeywordPattern::compile_all(&ind.negative_keywords)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            subtypes.push(CompiledSubtype { subtype_idx, indicators });
        }
        debug!(subtypes = subtypes.len(), "Compiled differential matcher");
        Ok(Self { kb, subtypes })
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn match_observations(&self, observations: &ObservationSet) -> DifferentialResult {
        let texts: Vec<(&str, &Observation, String)> = observations
            .iter()
            .map(|(domain, obs)| (domain, obs, obs.match_text()))
            .collect();
        let negatives_text = observations.negatives_text();

        let mut candidates = Vec::new();
        let mut total_matched = 0usize;

        for compiled in &self.subtypes {
            let subtype = &self.kb.subtypes[compiled.subtype_idx];
            let mut matched_indicators = Vec::new();
            let mut unmatched_indicators = Vec::new();
            let mut differentiation_questions = Vec::new();

            for ci in &compiled.indicators {
                let indicator = &subtype.indicators[ci.indicator_idx];
                let span = ci.keywords.len().min(NEGATIVE_FINDING_KEYWORD_SPAN);
                let negated_by_case = any_match(&ci.keywords[..span], &negatives_text);

                let hit = if negated_by_case {
                    None
                } else {
                    texts.iter().find_map(|(domain, obs, text)| {
                        let kw = first_match(&ci.keywords, text)?;
                        if any_match(&ci.negatives, text) {
                            return None;
                        }
                        Some(MatchedIndicator {
                            name: indicator.name.clone(),
                            matched_keyword: kw.keyword().to_string(),
                            source_observation: obs.finding.clone(),
                            source_context: obs.context.clone(),
                            source_domain: domain.to_string(),
                            differentiation_note: indicator.differentiation_note.clone(),
                            weight: indicator.weight,
                        })
                    })
                };

                match hit {
                    Some(m) => {
                        if !m.differentiation_note.is_empty() {
                            differentiation_questions.push(m.differentiation_note.clone());
                        }
                        matched_indicators.push(m);
                    }
                    None => unmatched_indicators.push(indicator.name.clone()),
                }
            }

            if !matched_indicators.is_empty() {
                total_matched += matched_indicators.len();
                candidates.push(CandidateEtiology {
                    subtype: subtype.key.clone(),
                    label: subtype.label.clone(),
                    matched_indicators,
                    unmatched_indicators,
                    differentiation_questions,
                });
            }
        }

        // Vec::sort_by is stable, so equal weights keep knowledge-base order.
        candidates.sort_by(|a, b| b.matched_weight().total_cmp(&a.matched_weight()));

        let narrative_nuance_observations = observations.nuance_observations().to_vec();

        debug!(
            observations = texts.len(),
            candidates = candidates.len(),
            matched_indicators = total_matched,
            nuance_observations = narrative_nuance_observations.len(),
            "Differential matching complete"
        );

        DifferentialResult {
            summary: MatchSummary {
                total_candidates: candidates.len(),
                total_matched_indicators: total_matched,
            },
            candidates,
            narrative_nuance_observations,
        }
    }
}
