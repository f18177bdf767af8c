//! Reference knowledge base.
//!
//! Two logical tables: alternative-cause subtypes with weighted indicators
//! (consumed by the matcher and the scorer) and investigation protocols
//! (consumed only by explanation generation). The known-effect registry,
//! product-family keywords and high-risk rules ride along in the same
//! document so a single file describes one condition domain.
//!
//! A `KnowledgeBase` is validated once when loaded and then shared
//! read-only (`Arc<KnowledgeBase>`) for the life of a batch.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::case::Sex;
use crate::{CausalyxError, Result};

/// Default knowledge base compiled into the binary.
const EMBEDDED_KNOWLEDGE_BASE: &str = include_str!("../data/knowledge_base.yaml");

// ── Subtypes and indicators ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtypeKind {
    #[default]
    Clinical,
    /// Reporting-quality meta-information. Scored separately, never part of
    /// the clinical maximum.
    NarrativeNuance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorFamily {
    #[default]
    Clinical,
    /// Demographic/behavioral risk factor. Weight is always 0.
    RiskFactor,
    /// Bypasses the plausibility gate.
    NarrativeNuance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorTier {
    #[default]
    Primary,
    Supporting,
    Confirmatory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub family: IndicatorFamily,
    #[serde(default)]
    pub tier: IndicatorTier,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub negative_keywords: Vec<String>,
    #[serde(default)]
    pub differentiation_note: String,
}

/// One candidate alternative etiology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtiologySubtype {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub kind: SubtypeKind,
    pub indicators: Vec<Indicator>,
}

impl EtiologySubtype {
    pub fn is_nuance(&self) -> bool {
        self.kind == SubtypeKind::NarrativeNuance
    }
}

// ── Known-effect registry ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductFamily {
    #[serde(rename = "mRNA")]
    Mrna,
    #[serde(rename = "viral_vector")]
    ViralVector,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ProductFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductFamily::Mrna => "mRNA",
            ProductFamily::ViralVector => "viral_vector",
            ProductFamily::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProductFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceTier {
    Established,
    Insufficient,
    NoData,
}

impl EvidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceTier::Established => "ESTABLISHED",
            EvidenceTier::Insufficient => "INSUFFICIENT",
            EvidenceTier::NoData => "NO_DATA",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownEffect {
    pub product_family: ProductFamily,
    /// Lower-case condition name, e.g. "myocarditis".
    pub condition: String,
    pub evidence: EvidenceTier,
    pub source: Option<String>,
    pub description: String,
    #[serde(default)]
    pub high_risk_group: Option<String>,
    /// Annotation only; never used to derive the temporal zone.
    #[serde(default)]
    pub temporal_window_days: Option<i64>,
}

/// Ordered product-name keyword rule. First matching rule wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductFamilyRule {
    pub family: ProductFamily,
    pub keywords: Vec<String>,
}

/// Demographic subgroup with elevated risk for an established effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighRiskRule {
    pub name: String,
    pub product_family: ProductFamily,
    pub condition: String,
    pub sex: Sex,
    pub min_age: f64,
    pub max_age: f64,
    /// Dose numbers at or above this are appended to the reason.
    #[serde(default)]
    pub dose_note_min: Option<u32>,
}

// ── Investigation protocols ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub test: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub rationale: String,
    #[serde(default)]
    pub expected_finding: Option<String>,
    #[serde(default)]
    pub differential_from_vaccine: Option<String>,
}

fn default_priority() -> String { "MEDIUM".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationProtocol {
    pub subtype: String,
    pub label: String,
    pub why_suspected: String,
    pub investigations: Vec<Investigation>,
}

// ── Knowledge base ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub version: String,
    /// Condition the subtype table differentiates, e.g. "myocarditis".
    pub condition_domain: String,
    pub subtypes: Vec<EtiologySubtype>,
    #[serde(default)]
    pub product_families: Vec<ProductFamilyRule>,
    #[serde(default)]
    pub known_effects: Vec<KnownEffect>,
    #[serde(default)]
    pub high_risk_rules: Vec<HighRiskRule>,
    #[serde(default)]
    pub protocols: Vec<InvestigationProtocol>,
}

impl KnowledgeBase {
    /// The knowledge base shipped with the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_yaml(EMBEDDED_KNOWLEDGE_BASE)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let kb: Self = serde_yaml::from_str(content)?;
        kb.validate()?;
        Ok(kb)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let kb: Self = serde_json::from_str(content)?;
        kb.validate()?;
        Ok(kb)
    }

    /// Load from disk; the format follows the file extension
    /// (`.json`, `.toml`, anything else is read as YAML).
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let kb = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content)?,
            Some("toml") => {
                let kb: Self = toml::from_str(&content)?;
                kb.validate()?;
                kb
            }
            _ => Self::from_yaml(&content)?,
        };
        tracing::debug!(
            path = %path.display(),
            version = %kb.version,
            subtypes = kb.subtypes.len(),
            "Loaded knowledge base"
        );
        Ok(kb)
    }

    pub fn validate(&self) -> Result<()> {
        let mut subtype_keys = HashSet::new();
        let mut indicator_names = HashSet::new();
        let mut nuance_subtypes = 0usize;

        for subtype in &self.subtypes {
            if !subtype_keys.insert(subtype.key.as_str()) {
                return Err(kb_error(format!("duplicate subtype key '{}'", subtype.key)));
            }
            if subtype.is_nuance() {
                nuance_subtypes += 1;
            }

            for ind in &subtype.indicators {
                if !indicator_names.insert(ind.name.as_str()) {
                    return Err(kb_error(format!("duplicate indicator name '{}'", ind.name)));
                }
                if !ind.weight.is_finite() || !(0.0..=1.0).contains(&ind.weight) {
                    return Err(kb_error(format!(
                        "indicator '{}' weight {} outside [0, 1]",
                        ind.name, ind.weight
                    )));
                }
                if ind.family == IndicatorFamily::RiskFactor && ind.weight != 0.0 {
                    return Err(kb_error(format!(
                        "risk-factor indicator '{}' must carry weight 0, found {}",
                        ind.name, ind.weight
                    )));
                }
                let nuance_indicator = ind.family == IndicatorFamily::NarrativeNuance;
                if nuance_indicator != subtype.is_nuance() {
                    return Err(kb_error(format!(
                        "indicator '{}' family does not match subtype '{}'",
                        ind.name, subtype.key
                    )));
                }
            }
        }

        if nuance_subtypes > 1 {
            return Err(kb_error(format!(
                "at most one narrative-nuance subtype allowed, found {}",
                nuance_subtypes
            )));
        }

        for protocol in &self.protocols {
            if !subtype_keys.contains(protocol.subtype.as_str()) {
                return Err(kb_error(format!(
                    "protocol references unknown subtype '{}'",
                    protocol.subtype
                )));
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn subtype(&self, key: &str) -> Option<&EtiologySubtype> {
        self.subtypes.iter().find(|s| s.key == key)
    }

    pub fn clinical_subtypes(&self) -> impl Iterator<Item = &EtiologySubtype> {
        self.subtypes.iter().filter(|s| !s.is_nuance())
    }

    pub fn nuance_subtype(&self) -> Option<&EtiologySubtype> {
        self.subtypes.iter().find(|s| s.is_nuance())
    }

    /// Every indicator with its owning subtype, in knowledge-base order.
    pub fn indicators(&self) -> impl Iterator<Item = (&EtiologySubtype, &Indicator)> {
        self.subtypes
            .iter()
            .flat_map(|s| s.indicators.iter().map(move |i| (s, i)))
    }

    pub fn indicator(&self, name: &str) -> Option<(&EtiologySubtype, &Indicator)> {
        self.indicators().find(|(_, i)| i.name == name)
    }

    pub fn label_for(&self, subtype_key: &str) -> String {
        self.subtype(subtype_key)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| subtype_key.to_string())
    }

    pub fn known_effect(&self, family: ProductFamily, condition: &str) -> Option<&KnownEffect> {
        let condition = condition.to_lowercase();
        self.known_effects
            .iter()
            .find(|e| e.product_family == family && e.condition == condition)
    }

    pub fn protocol(&self, subtype_key: &str) -> Option<&InvestigationProtocol> {
        self.protocols.iter().find(|p| p.subtype == subtype_key)
    }
}

fn kb_error(msg: String) -> CausalyxError {
    CausalyxError::KnowledgeBase(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml(extra_indicator: &str) -> String {
        format!(
            r#"
version: "test"
condition_domain: myocarditis
subtypes:
  - key: viral_etiology
    label: Viral
    indicators:
      - name: fever_reported
        weight: 0.2
        keywords: [fever]
{extra_indicator}
"#
        )
    }

    #[test]
    fn test_embedded_knowledge_base_is_valid() {
        let kb = KnowledgeBase::embedded().unwrap();
        assert_eq!(kb.condition_domain, "myocarditis");
        assert_eq!(kb.clinical_subtypes().count(), 7);
        assert!(kb.nuance_subtype().is_some());
        assert_eq!(kb.indicators().count(), 37);
    }

    #[test]
    fn test_embedded_weights() {
        let kb = KnowledgeBase::embedded().unwrap();
        let (subtype, ind) = kb.indicator("positive_viral_pcr").unwrap();
        assert_eq!(subtype.key, "viral_etiology");
        assert_eq!(ind.weight, 0.8);

        for name in ["age_over_50", "diabetes_hypertension", "smoking_history"] {
            let (_, ind) = kb.indicator(name).unwrap();
            assert_eq!(ind.family, IndicatorFamily::RiskFactor);
            assert_eq!(ind.weight, 0.0);
        }
    }

    #[test]
    fn test_every_clinical_subtype_has_protocol() {
        let kb = KnowledgeBase::embedded().unwrap();
        for subtype in kb.clinical_subtypes() {
            assert!(kb.protocol(&subtype.key).is_some(), "no protocol for {}", subtype.key);
        }
    }

    #[test]
    fn test_known_effect_lookup() {
        let kb = KnowledgeBase::embedded().unwrap();
        let effect = kb.known_effect(ProductFamily::Mrna, "Myocarditis").unwrap();
        assert_eq!(effect.evidence, EvidenceTier::Established);
        assert_eq!(effect.temporal_window_days, Some(7));
        assert!(kb.known_effect(ProductFamily::ViralVector, "myocarditis").is_none());
    }

    #[test]
    fn test_duplicate_indicator_rejected() {
        let yaml = minimal_yaml(
            "      - name: fever_reported\n        weight: 0.3\n        keywords: [febrile]",
        );
        let err = KnowledgeBase::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate indicator"));
    }

    #[test]
    fn test_weight_out_of_range_rejected() {
        let yaml = minimal_yaml("      - name: pcr\n        weight: 1.5\n        keywords: [pcr]");
        assert!(KnowledgeBase::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_weighted_risk_factor_rejected() {
        let yaml = minimal_yaml(
            "      - name: smoking\n        weight: 0.1\n        family: risk_factor\n        keywords: [smoker]",
        );
        let err = KnowledgeBase::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, CausalyxError::KnowledgeBase(_)));
    }

    #[test]
    fn test_json_round_trip_of_embedded() {
        let kb = KnowledgeBase::embedded().unwrap();
        let json = serde_json::to_string(&kb).unwrap();
        let reloaded = KnowledgeBase::from_json(&json).unwrap();
        assert_eq!(reloaded.indicators().count(), kb.indicators().count());
    }
}
