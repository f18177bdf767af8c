//! Shared fixtures for Causalyx tests: case builders, assessment helpers and
//! observation sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use causalyx_common::{ClinicalCase, Finding, KnowledgeBase};
use causalyx_ddx::{Observation, ObservationSet};
use causalyx_scorer::{IndicatorAssessment, IndicatorAssessments, PlausibilityTier, RawIndicatorAssessment};

/// The embedded knowledge base behind an `Arc`, as the engine expects it.
pub fn embedded_kb() -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::embedded().expect("embedded knowledge base must load"))
}

// ── Cases ─────────────────────────────────────────────────────────────────────

/// Fluent builder over [`ClinicalCase`]. Unset fields stay absent.
#[derive(Debug, Clone)]
pub struct CaseBuilder {
    case: ClinicalCase,
}

fn finding(value: &str, abnormal: Option<bool>) -> Option<Finding> {
    Some(Finding {
        value: Some(value.to_string()),
        abnormal,
    })
}

impl CaseBuilder {
    pub fn new(case_id: &str) -> Self {
        let case = serde_json::from_value(serde_json::json!({ "case_id": case_id }))
            .expect("minimal case deserializes");
        Self { case }
    }

    /// 19-year-old male, second mRNA dose, onset day 3, level-1 findings.
    pub fn confirmed_myocarditis(case_id: &str) -> Self {
        Self::new(case_id)
            .patient(19.0, "M")
            .product("COVID19 (COVID19 (MODERNA))")
            .dose(2)
            .condition("myocarditis")
            .days_to_onset(3)
            .symptoms(&["chest pain", "shortness of breath"])
            .troponin("12.5 ng/mL", true)
            .mri("Subepicardial LGE and edema consistent with myocarditis")
    }

    pub fn patient(mut self, age: f64, sex: &str) -> Self {
        self.case.demographics.age = Some(age);
        self.case.demographics.sex = Some(sex.to_string());
        self
    }

    pub fn product(mut self, name: &str) -> Self {
        self.case.product.name = Some(name.to_string());
        self
    }

    pub fn manufacturer(mut self, manufacturer: &str) -> Self {
        self.case.product.manufacturer = Some(manufacturer.to_string());
        self
    }

    pub fn dose(mut self, dose: u32) -> Self {
        self.case.product.dose_number = Some(dose);
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.case.event.primary_condition = Some(condition.to_string());
        self
    }

    pub fn days_to_onset(mut self, days: i64) -> Self {
        self.case.event.days_to_onset = Some(days);
        self
    }

    pub fn no_onset(mut self) -> Self {
        self.case.event.days_to_onset = None;
        self.case.event.onset_date = None;
        self
    }

    pub fn dates(mut self, exposure: &str, onset: &str) -> Self {
        self.case.product.administration_date = Some(exposure.to_string());
        self.case.event.onset_date = Some(onset.to_string());
        self.case.event.days_to_onset = None;
        self
    }

    pub fn symptoms(mut self, symptoms: &[&str]) -> Self {
        self.case.event.symptoms = symptoms.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn narrative(mut self, narrative: &str) -> Self {
        self.case.event.narrative_summary = Some(narrative.to_string());
        self
    }

    pub fn troponin(mut self, value: &str, elevated: bool) -> Self {
        self.case.findings.troponin = finding(value, Some(elevated));
        self
    }

    pub fn crp(mut self, value: &str, elevated: bool) -> Self {
        self.case.findings.inflammatory_markers = finding(value, Some(elevated));
        self
    }

    pub fn ecg(mut self, value: &str) -> Self {
        self.case.findings.ecg = finding(value, None);
        self
    }

    pub fn echo(mut self, value: &str) -> Self {
        self.case.findings.echo = finding(value, None);
        self
    }

    pub fn mri(mut self, value: &str) -> Self {
        self.case.findings.cardiac_mri = finding(value, None);
        self
    }

    pub fn build(self) -> ClinicalCase {
        self.case
    }
}

// ── Assessments ───────────────────────────────────────────────────────────────

/// Present, concordant, high plausibility.
pub fn strong(rationale: &str) -> IndicatorAssessment {
    IndicatorAssessment::present(true, PlausibilityTier::High, rationale)
}

/// Present but chronic: not mechanistically concordant.
pub fn chronic(rationale: &str) -> IndicatorAssessment {
    IndicatorAssessment::present(false, PlausibilityTier::High, rationale)
}

pub fn with_tier(tier: PlausibilityTier) -> IndicatorAssessment {
    IndicatorAssessment::present(true, tier, "")
}

/// Complete mapping: everything absent except `present`.
pub fn assessments(kb: &KnowledgeBase, present: &[(&str, IndicatorAssessment)]) -> IndicatorAssessments {
    let mut out = IndicatorAssessments::all_absent(kb);
    for (name, assessment) in present {
        out.set(name, assessment.clone());
    }
    out
}

/// Raw service answer parsed from JSON, e.g. `{"fever_reported": true}`.
pub fn raw_assessments(value: serde_json::Value) -> BTreeMap<String, RawIndicatorAssessment> {
    serde_json::from_value(value).expect("raw assessment map deserializes")
}

// ── Observations ──────────────────────────────────────────────────────────────

/// Observation set from `(domain, finding, context)` triples.
pub fn observations(items: &[(&str, &str, &str)]) -> ObservationSet {
    let mut set = ObservationSet::default();
    for (domain, finding, context) in items {
        set.add(domain, Observation::new(*finding, *context));
    }
    set
}
