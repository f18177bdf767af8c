//! Diagnostic certainty grading.
//!
//! Assigns a certainty level (1 = definite … 4 = insufficient evidence) to the
//! reported condition from structured findings. Two condition families carry
//! separate rule cascades. Level 4 signals an early exit: the case is not
//! classified further.
//!
//! A finding whose text says the test was ordered or is still pending is
//! never read as positive, whatever the extractor's abnormal flag says.

use causalyx_common::{ClinicalCase, Finding};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Keyword tables ────────────────────────────────────────────────────────────

/// Wording that marks a test as ordered but not resulted.
pub const PENDING_KEYWORDS: &[&str] = &[
    "ordered",
    "pending",
    "not completed",
    "not yet",
    "scheduled",
    "awaiting",
    "planned",
    "requested",
    "to be done",
    "not available",
    "not performed",
    "not obtained",
    "awaited",
];

/// Positive ECG findings; any of these overrides a co-occurring "normal".
const ECG_POSITIVE: &[&str] = &[
    "abnormal",
    "st elevation",
    "st-elevation",
    "st depression",
    "st-depression",
    "st change",
    "st segment",
    "bundle branch block",
    "t wave",
    "pr depression",
];

const MRI_POSITIVE: &[&str] = &["abnormal", "enhancement", "lge", "edema", "oedema", "myocarditis"];

const NORMAL_MARKERS: &[&str] = &["normal", "negative", "unremarkable"];
const MRI_NORMAL_MARKERS: &[&str] = &["normal", "negative"];

/// Leading characters of an echo report searched for a "no " negation.
const ECHO_NEGATION_PREFIX_CHARS: usize = 20;

const BIOPSY_TERMS: &[&str] = &["biopsy", "endomyocardial", "histopath"];
const BIOPSY_NEGATIONS: &[&str] = &[
    "not performed",
    "no biopsy",
    "without biopsy",
    "biopsy was not",
    "no endomyocardial",
    "without pathological evidence",
    "biopsy not",
    "not done",
];

const COMPATIBLE_SYMPTOMS: &[&str] = &[
    "chest pain",
    "dyspnea",
    "palpitation",
    "heart failure",
    "shortness of breath",
    "cardiac",
    "myocarditis",
    "pericarditis",
];

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

/// True when `text` describes a test that was ordered but not completed.
pub fn is_pending(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    !lower.is_empty() && contains_any(&lower, PENDING_KEYWORDS)
}

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionFamily {
    Myocarditis,
    Pericarditis,
}

impl ConditionFamily {
    /// Pericarditis when the primary condition mentions it, otherwise myocarditis.
    pub fn from_case(case: &ClinicalCase) -> Self {
        if case.primary_condition().contains("pericarditis") {
            ConditionFamily::Pericarditis
        } else {
            ConditionFamily::Myocarditis
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionFamily::Myocarditis => "myocarditis",
            ConditionFamily::Pericarditis => "pericarditis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Histopathology,
    CardiacMriPositive,
    TroponinElevated,
    EcgAbnormal,
    EchoAbnormal,
    CompatibleSymptoms,
    PericardialEffusion,
    InflammatoryMarkersElevated,
}

/// Raw criteria map, kept on the grade for audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertaintyCriteria {
    pub histopathology: bool,
    pub cardiac_mri_positive: bool,
    pub troponin_elevated: bool,
    pub ecg_abnormal: bool,
    pub echo_abnormal: bool,
    pub compatible_symptoms: bool,
    pub pericardial_effusion: bool,
    pub inflammatory_markers_elevated: bool,
}

impl CertaintyCriteria {
    pub fn is_met(&self, criterion: Criterion) -> bool {
        match criterion {
            Criterion::Histopathology => self.histopathology,
            Criterion::CardiacMriPositive => self.cardiac_mri_positive,
            Criterion::TroponinElevated => self.troponin_elevated,
            Criterion::EcgAbnormal => self.ecg_abnormal,
            Criterion::EchoAbnormal => self.echo_abnormal,
            Criterion::CompatibleSymptoms => self.compatible_symptoms,
            Criterion::PericardialEffusion => self.pericardial_effusion,
            Criterion::InflammatoryMarkersElevated => self.inflammatory_markers_elevated,
        }
    }

    /// Supporting ECG / echo / MRI findings, in report order.
    fn supporting_findings(&self) -> Vec<&'static str> {
        [
            ("abnormal ECG", self.ecg_abnormal),
            ("abnormal Echo", self.echo_abnormal),
            ("positive MRI", self.cardiac_mri_positive),
        ]
        .into_iter()
        .filter_map(|(label, met)| met.then_some(label))
        .collect()
    }
}

/// A finding zeroed because its text reads as pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOverride {
    pub field: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertaintyGrade {
    pub condition: ConditionFamily,
    /// 1 (definite) to 4 (insufficient evidence).
    pub level: u8,
    pub justification: String,
    pub criteria: CertaintyCriteria,
    #[serde(default)]
    pub pending_overrides: Vec<PendingOverride>,
    pub early_exit: bool,
}

/// A criterion absent on an early-exit case, with the tests that would
/// establish it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingCriterion {
    pub criterion: Criterion,
    pub label: String,
    pub description: String,
    pub tests_needed: Vec<String>,
    pub achievable_level: String,
}

// ── Grader ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticCertaintyGrader;

impl DiagnosticCertaintyGrader {
    pub fn new() -> Self {
        Self
    }

    pub fn grade(&self, case: &ClinicalCase) -> CertaintyGrade {
        let condition = ConditionFamily::from_case(case);
        let (criteria, pending_overrides) = Self::derive_criteria(case);
        let (level, justification) = Self::grade_criteria(condition, &criteria);

        debug!(
            case_id = %case.case_id,
            condition = condition.as_str(),
            level,
            pending = pending_overrides.len(),
            "Diagnostic certainty graded"
        );

        CertaintyGrade {
            condition,
            level,
            justification,
            criteria,
            pending_overrides,
            early_exit: level == 4,
        }
    }

    /// Read the criteria map off a case, zeroing pending findings.
    pub fn derive_criteria(case: &ClinicalCase) -> (CertaintyCriteria, Vec<PendingOverride>) {
        let f = &case.findings;
        let mut overrides = Vec::new();

        let mut resolved = |field: &str, finding: Option<&Finding>| -> Option<(Option<String>, bool)> {
            let finding = finding?;
            match finding.text() {
                Some(text) if is_pending(text) => {
                    overrides.push(PendingOverride {
                        field: field.to_string(),
                        raw: text.to_string(),
                    });
                    None
                }
                text => Some((text.map(str::to_lowercase), finding.is_flagged_abnormal())),
            }
        };

        let troponin = resolved("troponin", f.troponin.as_ref());
        let inflammatory = resolved("inflammatory_markers", f.inflammatory_markers.as_ref());
        let ecg = resolved("ecg", f.ecg.as_ref());
        let echo = resolved("echo", f.echo.as_ref());
        let mri = resolved("cardiac_mri", f.cardiac_mri.as_ref());

        let ecg_abnormal = match &ecg {
            Some((Some(text), _)) => contains_any(text, ECG_POSITIVE) || !contains_any(text, NORMAL_MARKERS),
            Some((None, flagged)) => *flagged,
            None => false,
        };

        let echo_abnormal = match &echo {
            Some((Some(text), _)) => {
                let prefix: String = text.chars().take(ECHO_NEGATION_PREFIX_CHARS).collect();
                !contains_any(text, NORMAL_MARKERS) && !prefix.contains("no ")
            }
            Some((None, flagged)) => *flagged,
            None => false,
        };

        let cardiac_mri_positive = match &mri {
            Some((Some(text), _)) => contains_any(text, MRI_POSITIVE) || !contains_any(text, MRI_NORMAL_MARKERS),
            Some((None, flagged)) => *flagged,
            None => false,
        };

        let pericardial_effusion = [&echo, &mri].into_iter().any(|r| {
            matches!(r, Some((Some(text), _)) if text.contains("effusion") && !text.contains("no effusion"))
        });

        let text = case.clinical_text();
        let histopathology = contains_any(&text, BIOPSY_TERMS) && !contains_any(&text, BIOPSY_NEGATIONS);
        let compatible_symptoms = contains_any(&text, COMPATIBLE_SYMPTOMS);

        let criteria = CertaintyCriteria {
            histopathology,
            cardiac_mri_positive,
            troponin_elevated: troponin.map_or(false, |(_, flagged)| flagged),
            ecg_abnormal,
            echo_abnormal,
            compatible_symptoms,
            pericardial_effusion,
            inflammatory_markers_elevated: inflammatory.map_or(false, |(_, flagged)| flagged),
        };
        (criteria, overrides)
    }

    /// Level and justification for a criteria map. First matching rule wins.
    pub fn grade_criteria(condition: ConditionFamily, c: &CertaintyCriteria) -> (u8, String) {
        match condition {
            ConditionFamily::Myocarditis => Self::myocarditis_level(c),
            ConditionFamily::Pericarditis => Self::pericarditis_level(c),
        }
    }

    fn myocarditis_level(c: &CertaintyCriteria) -> (u8, String) {
        if c.histopathology {
            return (1, "Histopathological confirmation (endomyocardial biopsy)".into());
        }
        if c.cardiac_mri_positive && c.troponin_elevated && c.compatible_symptoms {
            return (1, "Cardiac MRI positive + elevated troponin + compatible symptoms".into());
        }

        let supporting = c.supporting_findings();
        if c.troponin_elevated && c.compatible_symptoms && !supporting.is_empty() {
            return (
                2,
                format!("Elevated troponin + {} + compatible symptoms", supporting.join(" + ")),
            );
        }

        if c.compatible_symptoms {
            if c.troponin_elevated {
                return (3, "Elevated troponin + compatible symptoms".into());
            }
            if !supporting.is_empty() {
                return (3, format!("{} + compatible symptoms", supporting.join(" + ")));
            }
        }

        (4, "Reported as myocarditis but insufficient documented evidence for Level 1-3".into())
    }

    fn pericarditis_level(c: &CertaintyCriteria) -> (u8, String) {
        let count = [c.compatible_symptoms, c.ecg_abnormal, c.pericardial_effusion]
            .into_iter()
            .filter(|met| *met)
            .count();

        if count >= 2 {
            (1, format!("{count} pericarditis criteria met (>=2 required for Level 1)"))
        } else if count >= 1 && c.inflammatory_markers_elevated {
            (2, ">=1 pericarditis criterion + elevated inflammatory markers".into())
        } else if count >= 1 {
            (3, ">=1 pericarditis criterion present".into())
        } else {
            (4, "Reported as pericarditis but insufficient documented evidence for Level 1-3".into())
        }
    }
}

// ── Missing-criteria guidance ─────────────────────────────────────────────────

struct CriterionGuide {
    criterion: Criterion,
    label: &'static str,
    description: &'static str,
    tests: &'static [&'static str],
    achievable: &'static str,
}

const PERICARDITIS_GUIDES: &[CriterionGuide] = &[
    CriterionGuide {
        criterion: Criterion::CompatibleSymptoms,
        label: "Compatible pericarditis symptoms",
        description: "Chest pain (pleuritic, positional), pericardial friction rub",
        tests: &["Detailed symptom review", "Physical examination for friction rub"],
        achievable: "Level 3 (with 1 criterion) or Level 1 (with 2+)",
    },
    CriterionGuide {
        criterion: Criterion::EcgAbnormal,
        label: "ECG abnormalities",
        description: "Diffuse ST elevation, PR depression, new T-wave changes",
        tests: &["12-lead ECG", "Serial ECGs if initial was normal"],
        achievable: "Level 3 (with 1 criterion) or Level 1 (with 2+)",
    },
    CriterionGuide {
        criterion: Criterion::PericardialEffusion,
        label: "Pericardial effusion",
        description: "Pericardial fluid collection on imaging",
        tests: &["Transthoracic echocardiogram (TTE)"],
        achievable: "Level 3 (with 1 criterion) or Level 1 (with 2+)",
    },
    CriterionGuide {
        criterion: Criterion::InflammatoryMarkersElevated,
        label: "Elevated inflammatory markers",
        description: "CRP, ESR elevation supporting pericardial inflammation",
        tests: &["CRP", "ESR", "CBC with differential"],
        achievable: "Supports Level 2 (with 1+ core criterion)",
    },
];

const MYOCARDITIS_GUIDES: &[CriterionGuide] = &[
    CriterionGuide {
        criterion: Criterion::CompatibleSymptoms,
        label: "Compatible myocarditis symptoms",
        description: "Chest pain, dyspnea, palpitations, syncope, heart failure symptoms",
        tests: &["Detailed symptom history review"],
        achievable: "Required for Level 2-3",
    },
    CriterionGuide {
        criterion: Criterion::TroponinElevated,
        label: "Elevated cardiac troponin",
        description: "Troponin I or T above 99th percentile upper reference limit",
        tests: &["High-sensitivity troponin I or T", "Serial troponin if initial borderline"],
        achievable: "Required for Level 1-2; supports Level 3",
    },
    CriterionGuide {
        criterion: Criterion::EcgAbnormal,
        label: "ECG abnormalities",
        description: "ST-T changes, conduction abnormalities, arrhythmias",
        tests: &["12-lead ECG", "Continuous telemetry if arrhythmia suspected"],
        achievable: "Supports Level 2 (with troponin + symptoms)",
    },
    CriterionGuide {
        criterion: Criterion::EchoAbnormal,
        label: "Echocardiographic abnormalities",
        description: "Wall motion abnormalities, reduced EF, pericardial effusion",
        tests: &["Transthoracic echocardiogram (TTE)"],
        achievable: "Supports Level 2 (with troponin + symptoms)",
    },
    CriterionGuide {
        criterion: Criterion::CardiacMriPositive,
        label: "Cardiac MRI positive (Lake Louise criteria)",
        description: "T2 edema + LGE (Late Gadolinium Enhancement) per Lake Louise criteria",
        tests: &[
            "Cardiac MRI with T2 mapping and LGE",
            "Assess for myocardial inflammation presence",
            "Evaluate involvement extent (focal vs diffuse)",
        ],
        achievable: "Level 1 (with troponin + symptoms) or Level 2 (with troponin + symptoms)",
    },
    CriterionGuide {
        criterion: Criterion::Histopathology,
        label: "Histopathological confirmation (EMB)",
        description: "Endomyocardial biopsy showing inflammatory infiltrate with myocyte necrosis (Dallas criteria)",
        tests: &["Endomyocardial biopsy (EMB), invasive, consider risk-benefit"],
        achievable: "Level 1 (definitive, standalone)",
    },
];

/// Criteria absent for `condition`, in the order they should be pursued.
pub fn missing_criteria(condition: ConditionFamily, criteria: &CertaintyCriteria) -> Vec<MissingCriterion> {
    let guides = match condition {
        ConditionFamily::Myocarditis => MYOCARDITIS_GUIDES,
        ConditionFamily::Pericarditis => PERICARDITIS_GUIDES,
    };
    guides
        .iter()
        .filter(|g| !criteria.is_met(g.criterion))
        .map(|g| MissingCriterion {
            criterion: g.criterion,
            label: g.label.to_string(),
            description: g.description.to_string(),
            tests_needed: g.tests.iter().map(|t| t.to_string()).collect(),
            achievable_level: g.achievable.to_string(),
        })
        .collect()
}
