//! Structured adverse-event case record.
//! Produced once per case by the upstream extraction service and never
//! mutated afterwards. Missing fields stay `None` / empty; nothing here
//! infers a value the extractor did not supply.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Date layouts accepted from extraction output.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalCase {
    pub case_id: String,
    #[serde(default)]
    pub demographics: Demographics,
    #[serde(default)]
    pub product: ProductInfo,
    #[serde(default)]
    pub event: AdverseEvent,
    #[serde(default)]
    pub findings: ClinicalFindings,
    #[serde(default)]
    pub history: MedicalHistory,
    #[serde(default)]
    pub outcomes: Outcomes,
}

// ---------------------------------------------------------------------------
// Demographics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    pub age: Option<f64>,
    /// Raw sex field as reported ("M", "female", "U", ...).
    pub sex: Option<String>,
}

impl Demographics {
    pub fn sex(&self) -> Sex {
        self.sex.as_deref().map(Sex::parse).unwrap_or(Sex::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "U")]
    Unknown,
}

impl Sex {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Sex::Male,
            "f" | "female" => Sex::Female,
            _ => Sex::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::Unknown => "Unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// Product / vaccine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub dose_number: Option<u32>,
    pub administration_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdverseEvent {
    pub onset_date: Option<String>,
    pub days_to_onset: Option<i64>,
    pub primary_condition: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub narrative_summary: Option<String>,
    /// Onset was estimated from narrative wording rather than a recorded date.
    #[serde(default)]
    pub onset_approximate: bool,
}

// ---------------------------------------------------------------------------
// Clinical findings
// ---------------------------------------------------------------------------

/// One named lab or imaging result: the raw reported text plus the
/// extractor's abnormal flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finding {
    pub value: Option<String>,
    pub abnormal: Option<bool>,
}

impl Finding {
    /// Trimmed raw text, `None` when missing or blank.
    pub fn text(&self) -> Option<&str> {
        self.value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_flagged_abnormal(&self) -> bool {
        self.abnormal == Some(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalFindings {
    pub troponin: Option<Finding>,
    /// CRP / ESR.
    pub inflammatory_markers: Option<Finding>,
    pub ecg: Option<Finding>,
    pub echo: Option<Finding>,
    pub cardiac_mri: Option<Finding>,
    #[serde(default)]
    pub other: BTreeMap<String, Finding>,
}

// ---------------------------------------------------------------------------
// History / outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicalHistory {
    #[serde(default)]
    pub prior_conditions: Vec<String>,
    pub concurrent_illness: Option<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outcomes {
    pub hospitalized: Option<bool>,
    pub hospital_days: Option<u32>,
    pub life_threatening: Option<bool>,
    pub died: Option<bool>,
    pub recovery_status: Option<String>,
}

impl ClinicalCase {
    /// Symptom list plus narrative summary, lower-cased, for keyword tests.
    pub fn clinical_text(&self) -> String {
        let mut text = self.event.symptoms.join(" ");
        if let Some(ref narrative) = self.event.narrative_summary {
            text.push(' ');
            text.push_str(narrative);
        }
        text.to_lowercase()
    }

    /// Lower-cased primary condition, empty when not reported.
    pub fn primary_condition(&self) -> String {
        self.event
            .primary_condition
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
    }
}

/// Parse a case date in any accepted layout.
pub fn parse_case_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Days from `exposure` to `onset`; `None` if either date is unparsable.
pub fn days_between(exposure: &str, onset: &str) -> Option<i64> {
    let start = parse_case_date(exposure)?;
    let end = parse_case_date(onset)?;
    Some((end - start).num_days())
}
