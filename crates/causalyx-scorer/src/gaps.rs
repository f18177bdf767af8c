//! Investigation-gap analysis.
//!
//! Inspects indicator combinations for tests that would have resolved the
//! differential but were not reported. Informational only: nothing here
//! feeds back into scoring.

use crate::assessment::{IndicatorAssessments, PlausibilityTier};
use crate::scorer::ScoringOutcome;

pub const MAX_INVESTIGATION_GAPS: usize = 8;

pub fn identify_gaps(assessments: &IndicatorAssessments, outcome: &ScoringOutcome) -> Vec<String> {
    let present = |name: &str| assessments.is_present(name);
    let mut gaps = Vec::new();

    if !present("positive_viral_pcr") {
        if present("fever_reported") {
            gaps.push("Viral testing (PCR/serology) not performed despite fever".to_string());
        } else {
            gaps.push("Viral testing status unknown, cannot exclude viral etiology".to_string());
        }
    }

    let severe = present("rapid_heart_failure") || present("cardiogenic_shock");
    if severe && !present("giant_cells_on_biopsy") && !present("eosinophils_on_biopsy") {
        gaps.push("Endomyocardial biopsy not performed despite severe presentation".to_string());
    }

    if present("age_over_50") && !present("positive_catheterization") && !present("prior_cad_history") {
        gaps.push("Coronary evaluation not documented for patient over 50".to_string());
    }

    if present("systemic_inflammation") && !present("positive_ana_dsdna") {
        gaps.push(
            "Autoimmune markers (ANA, dsDNA) not tested despite systemic inflammation".to_string(),
        );
    }

    if let Some(covid) = assessments.get("active_covid19") {
        if covid.present && covid.plausibility_tier <= PlausibilityTier::Low {
            gaps.push(
                "COVID-19 infection documented but temporal relationship to cardiac onset unclear"
                    .to_string(),
            );
        }
    }

    if present("lack_of_testing") {
        gaps.push("Reporter explicitly noted testing was not performed".to_string());
    }
    if present("reporter_uncertainty") {
        gaps.push("Treating clinician expressed diagnostic uncertainty".to_string());
    }

    if outcome.noise_filtered_count > 0 {
        gaps.push(format!(
            "Plausibility gate filtered {} indicator(s); chronic or non-concordant findings excluded from scoring",
            outcome.noise_filtered_count
        ));
    }

    if outcome.score_of("viral_etiology") > 0.0 {
        gaps.push("Inflammatory markers (CRP, ESR) needed to differentiate viral vs vaccine".to_string());
    }

    gaps.truncate(MAX_INVESTIGATION_GAPS);
    gaps
}
