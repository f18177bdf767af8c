//! Temporal and known-effect audit.
//!
//! Classifies the exposure-to-onset interval into zones read from
//! [`TemporalWindows`], looks the product-family / condition pair up in the
//! knowledge base's known-effect registry, and applies the high-risk
//! subgroup rules. The step-2 result is the single boolean the classifier
//! consumes from here, alongside the zone itself.
//!
//! Investigation guidance and flags are annotation for the explanation
//! service. None of it feeds back into classification.

use std::collections::BTreeMap;
use std::sync::Arc;

use causalyx_common::case::{days_between, parse_case_date};
use causalyx_common::keyword::any_match;
use causalyx_common::{
    ClinicalCase, EvidenceTier, KeywordPattern, KnowledgeBase, ProductFamily, ProductInfo, Result,
    TemporalWindows,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ── Zones ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalZone {
    StrongCausal,
    Plausible,
    BackgroundRate,
    Unlikely,
    PreExposure,
    Unknown,
}

impl TemporalZone {
    pub const ALL: [TemporalZone; 6] = [
        TemporalZone::StrongCausal,
        TemporalZone::Plausible,
        TemporalZone::BackgroundRate,
        TemporalZone::Unlikely,
        TemporalZone::PreExposure,
        TemporalZone::Unknown,
    ];

    pub fn classify(days: Option<i64>, windows: &TemporalWindows) -> Self {
        match days {
            None => TemporalZone::Unknown,
            Some(d) if d < 0 => TemporalZone::PreExposure,
            Some(d) if d <= windows.strong_causal_max_days => TemporalZone::StrongCausal,
            Some(d) if d <= windows.plausible_max_days => TemporalZone::Plausible,
            Some(d) if d <= windows.background_rate_max_days => TemporalZone::BackgroundRate,
            Some(_) => TemporalZone::Unlikely,
        }
    }

    /// Zones that satisfy the temporal half of step 2.
    pub fn within_causal_window(&self) -> bool {
        matches!(self, TemporalZone::StrongCausal | TemporalZone::Plausible)
    }

    pub fn alignment(&self) -> WindowAlignment {
        match self {
            TemporalZone::StrongCausal | TemporalZone::Plausible => WindowAlignment::WithinWindow,
            TemporalZone::Unknown => WindowAlignment::Indeterminate,
            _ => WindowAlignment::OutsideWindow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalZone::StrongCausal => "STRONG_CAUSAL",
            TemporalZone::Plausible => "PLAUSIBLE",
            TemporalZone::BackgroundRate => "BACKGROUND_RATE",
            TemporalZone::Unlikely => "UNLIKELY",
            TemporalZone::PreExposure => "PRE_EXPOSURE",
            TemporalZone::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for TemporalZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowAlignment {
    WithinWindow,
    OutsideWindow,
    Indeterminate,
}

// ── Registry lookups ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownEffectAssessment {
    /// Only an established evidence tier counts as a known effect.
    pub is_known_effect: bool,
    pub evidence: EvidenceTier,
    pub source: Option<String>,
    pub description: String,
    /// Annotation only; the zone is never re-derived from it.
    pub expected_window_days: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighRiskAssessment {
    pub is_high_risk: bool,
    pub rule: Option<String>,
    pub reason: Option<String>,
}

// ── Guidance ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigationIntensity {
    Standard,
    Enhanced,
    Comprehensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigationFocus {
    ConfoundingExclusion,
    ActiveDifferentiation,
    AlternativeIdentification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationGuidance {
    pub intensity: InvestigationIntensity,
    pub focus: InvestigationFocus,
    pub description: String,
    pub query_requirements: BTreeMap<String, String>,
}

fn requirements(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

impl InvestigationGuidance {
    /// Guidance depends on the zone alone.
    pub fn for_zone(zone: TemporalZone, w: &TemporalWindows) -> Self {
        match zone {
            TemporalZone::StrongCausal => Self {
                intensity: InvestigationIntensity::Standard,
                focus: InvestigationFocus::ConfoundingExclusion,
                description: format!(
                    "Strong causal window (0-{}d). Standard diagnostics sufficient. \
                     Investigate alternatives only if clinical indicators present.",
                    w.strong_causal_max_days
                ),
                query_requirements: requirements(&[
                    ("bridging_symptoms", "NOT_REQUIRED"),
                    ("infection_history", "IF_PRODROMAL_PRESENT"),
                    ("medication_review", "STANDARD"),
                ]),
            },
            TemporalZone::Plausible => Self {
                intensity: InvestigationIntensity::Enhanced,
                focus: InvestigationFocus::ActiveDifferentiation,
                description: format!(
                    "Plausible but attenuated window ({}-{}d). Active differentiation \
                     required; investigate alternatives regardless of clinical indicators.",
                    w.strong_causal_max_days + 1,
                    w.plausible_max_days
                ),
                query_requirements: requirements(&[
                    ("bridging_symptoms", "NOT_REQUIRED"),
                    ("infection_history", "REQUIRED"),
                    ("medication_review", "REQUIRED"),
                    ("symptom_evolution", "RECOMMENDED"),
                ]),
            },
            TemporalZone::BackgroundRate => Self {
                intensity: InvestigationIntensity::Comprehensive,
                focus: InvestigationFocus::AlternativeIdentification,
                description: format!(
                    "Beyond mechanistic threshold ({}-{}d). Comprehensive alternative \
                     workup required. Bridging symptom verification CRITICAL.",
                    w.plausible_max_days + 1,
                    w.background_rate_max_days
                ),
                query_requirements: requirements(&[
                    ("bridging_symptoms", "CRITICAL"),
                    (
                        "bridging_symptom_detail",
                        "Query reporter: were there any cardiac symptoms (chest pain, dyspnea, \
                         palpitations, exercise intolerance, unusual fatigue) between exposure \
                         and formal diagnosis? Symptoms in the strong causal window would \
                         warrant temporal reclassification.",
                    ),
                    ("infection_history", "REQUIRED"),
                    ("medication_review", "REQUIRED"),
                    ("baseline_disease_change", "REQUIRED"),
                ]),
            },
            TemporalZone::Unlikely | TemporalZone::PreExposure | TemporalZone::Unknown => Self {
                intensity: InvestigationIntensity::Comprehensive,
                focus: InvestigationFocus::AlternativeIdentification,
                description: "Outside plausible causal window or onset unknown. \
                              Comprehensive workup required. Verify onset date accuracy."
                    .to_string(),
                query_requirements: requirements(&[
                    ("bridging_symptoms", "CRITICAL"),
                    (
                        "bridging_symptom_detail",
                        "Query reporter: verify the actual first symptom date and any cardiac \
                         symptoms between exposure and reported onset.",
                    ),
                    ("infection_history", "REQUIRED"),
                    ("medication_review", "REQUIRED"),
                    ("baseline_disease_change", "REQUIRED"),
                ]),
            },
        }
    }
}

// ── Flags ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagCode {
    BackgroundRateZone,
    BeyondWindow,
    MissingOnsetDate,
    PeakIncidenceWindow,
    HighRiskGroup,
    NotKnownEffect,
    ApproximateOnset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalFlag {
    pub code: FlagCode,
    pub detail: String,
}

impl TemporalFlag {
    fn new(code: FlagCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalAssessment {
    pub exposure_date: Option<String>,
    pub onset_date: Option<String>,
    pub days_to_onset: Option<i64>,
    /// The day count was derived from the two dates rather than reported.
    pub days_computed: bool,
    pub zone: TemporalZone,
    pub alignment: WindowAlignment,
    pub product_family: ProductFamily,
    pub condition: String,
    pub known_effect: KnownEffectAssessment,
    pub high_risk: HighRiskAssessment,
    /// Known effect AND zone within the causal window.
    pub step2_met: bool,
    pub guidance: InvestigationGuidance,
    pub flags: Vec<TemporalFlag>,
    pub note: String,
}

// ── Auditor ───────────────────────────────────────────────────────────────────

pub struct TemporalAuditor {
    kb: Arc<KnowledgeBase>,
    windows: TemporalWindows,
    families: Vec<(ProductFamily, Vec<KeywordPattern>)>,
}

impl TemporalAuditor {
    pub fn new(kb: Arc<KnowledgeBase>, windows: TemporalWindows) -> Result<Self> {
        let families = kb
            .product_families
            .iter()
            .map(|rule| Ok((rule.family, KeywordPattern::compile_all(&rule.keywords)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { kb, windows, families })
    }

    pub fn windows(&self) -> &TemporalWindows {
        &self.windows
    }

    /// First family rule whose keywords appear in the product name or
    /// manufacturer.
    pub fn identify_product_family(&self, product: &ProductInfo) -> ProductFamily {
        let combined = format!(
            "{} {}",
            product.name.as_deref().unwrap_or_default(),
            product.manufacturer.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        self.families
            .iter()
            .find(|(_, patterns)| any_match(patterns, &combined))
            .map(|(family, _)| *family)
            .unwrap_or(ProductFamily::Unknown)
    }

    pub fn known_effect(&self, family: ProductFamily, condition: &str) -> KnownEffectAssessment {
        match self.kb.known_effect(family, condition) {
            Some(entry) => KnownEffectAssessment {
                is_known_effect: entry.evidence == EvidenceTier::Established,
                evidence: entry.evidence,
                source: entry.source.clone(),
                description: entry.description.clone(),
                expected_window_days: entry.temporal_window_days,
            },
            None => KnownEffectAssessment {
                is_known_effect: false,
                evidence: EvidenceTier::NoData,
                source: None,
                description: format!("No established evidence for {family} -> {condition}"),
                expected_window_days: None,
            },
        }
    }

    /// High-risk rules only apply to a pair with an established effect.
    pub fn high_risk(
        &self,
        case: &ClinicalCase,
        family: ProductFamily,
        condition: &str,
        known: &KnownEffectAssessment,
    ) -> HighRiskAssessment {
        if known.evidence != EvidenceTier::Established {
            return HighRiskAssessment::default();
        }
        let Some(age) = case.demographics.age else {
            return HighRiskAssessment::default();
        };
        let sex = case.demographics.sex();
        let condition = condition.to_lowercase();

        let rule = self.kb.high_risk_rules.iter().find(|r| {
            r.product_family == family
                && r.condition == condition
                && r.sex == sex
                && (r.min_age..=r.max_age).contains(&age)
        });

        match rule {
            Some(rule) => {
                let mut reason = format!("{}, age {}", sex.as_str(), format_age(age));
                if let (Some(min), Some(dose)) = (rule.dose_note_min, case.product.dose_number) {
                    if dose >= min {
                        reason.push_str(&format!(", dose {dose}"));
                    }
                }
                HighRiskAssessment {
                    is_high_risk: true,
                    rule: Some(rule.name.clone()),
                    reason: Some(reason),
                }
            }
            None => HighRiskAssessment::default(),
        }
    }

    pub fn audit(&self, case: &ClinicalCase, condition: &str) -> TemporalAssessment {
        let exposure_date = case.product.administration_date.clone();
        let onset_date = case.event.onset_date.clone();

        let mut days_computed = false;
        let days_to_onset = match (case.event.days_to_onset, &exposure_date, &onset_date) {
            (Some(d), _, _) => Some(d),
            (None, Some(exposure), Some(onset)) => {
                let days = days_between(exposure, onset);
                if days.is_none() {
                    warn!(
                        case_id = %case.case_id,
                        exposure = %exposure,
                        onset = %onset,
                        unparsable_exposure = parse_case_date(exposure).is_none(),
                        "Unparsable case date, onset interval unknown"
                    );
                }
                days_computed = days.is_some();
                days
            }
            _ => None,
        };

        let zone = TemporalZone::classify(days_to_onset, &self.windows);
        let product_family = self.identify_product_family(&case.product);
        let known_effect = self.known_effect(product_family, condition);
        let high_risk = self.high_risk(case, product_family, condition, &known_effect);
        let step2_met = known_effect.is_known_effect && zone.within_causal_window();

        let flags = self.flags(case, days_to_onset, zone, &known_effect, &high_risk);
        let note = step2_note(&known_effect, days_to_onset, zone, &high_risk);

        debug!(
            case_id = %case.case_id,
            days_to_onset = ?days_to_onset,
            zone = zone.as_str(),
            product_family = product_family.as_str(),
            known_effect = known_effect.is_known_effect,
            step2_met,
            "Temporal audit complete"
        );

        TemporalAssessment {
            exposure_date,
            onset_date,
            days_to_onset,
            days_computed,
            zone,
            alignment: zone.alignment(),
            product_family,
            condition: condition.to_lowercase(),
            known_effect,
            high_risk,
            step2_met,
            guidance: InvestigationGuidance::for_zone(zone, &self.windows),
            flags,
            note,
        }
    }

    fn flags(
        &self,
        case: &ClinicalCase,
        days: Option<i64>,
        zone: TemporalZone,
        known: &KnownEffectAssessment,
        high_risk: &HighRiskAssessment,
    ) -> Vec<TemporalFlag> {
        let w = &self.windows;
        let mut flags = Vec::new();

        match zone {
            TemporalZone::BackgroundRate => flags.push(TemporalFlag::new(
                FlagCode::BackgroundRateZone,
                format!(
                    "{}-{}d, mechanistic threshold exceeded",
                    w.plausible_max_days + 1,
                    w.background_rate_max_days
                ),
            )),
            TemporalZone::Unlikely => flags.push(TemporalFlag::new(
                FlagCode::BeyondWindow,
                format!(
                    "Beyond {} days, causal association highly unlikely",
                    w.background_rate_max_days
                ),
            )),
            TemporalZone::Unknown => flags.push(TemporalFlag::new(
                FlagCode::MissingOnsetDate,
                "Cannot assess temporal plausibility",
            )),
            _ => {}
        }

        if let Some(d) = days {
            if (w.peak_incidence_start_day..=w.peak_incidence_end_day).contains(&d) {
                flags.push(TemporalFlag::new(
                    FlagCode::PeakIncidenceWindow,
                    format!(
                        "Days {}-{} peak incidence",
                        w.peak_incidence_start_day, w.peak_incidence_end_day
                    ),
                ));
            }
        }

        if let Some(reason) = high_risk.reason.as_ref().filter(|_| high_risk.is_high_risk) {
            flags.push(TemporalFlag::new(FlagCode::HighRiskGroup, reason.clone()));
        }

        if !known.is_known_effect {
            flags.push(TemporalFlag::new(
                FlagCode::NotKnownEffect,
                format!("{} evidence for this product-condition pair", known.evidence.as_str()),
            ));
        }

        if case.event.onset_approximate {
            flags.push(TemporalFlag::new(
                FlagCode::ApproximateOnset,
                "Onset date estimated from narrative, verify exact date",
            ));
        }

        flags
    }
}

fn format_age(age: f64) -> String {
    if age.fract() == 0.0 {
        format!("{age:.0}")
    } else {
        format!("{age}")
    }
}

fn step2_note(
    known: &KnownEffectAssessment,
    days: Option<i64>,
    zone: TemporalZone,
    high_risk: &HighRiskAssessment,
) -> String {
    let mut parts = Vec::with_capacity(3);
    if known.is_known_effect {
        match &known.source {
            Some(source) => parts.push(format!("Known effect: {} ({source}).", known.description)),
            None => parts.push(format!("Known effect: {}.", known.description)),
        }
    } else {
        parts.push(format!("Evidence: {}.", known.evidence.as_str()));
    }

    match days {
        Some(d) => parts.push(format!("Onset {d}d post-exposure -> {zone}.")),
        None => parts.push("Onset date unknown.".to_string()),
    }

    if let Some(reason) = high_risk.reason.as_ref().filter(|_| high_risk.is_high_risk) {
        parts.push(format!("High-risk group: {reason}."));
    }
    parts.join(" ")
}
