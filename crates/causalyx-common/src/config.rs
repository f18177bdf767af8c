//! Engine thresholds.
//!
//! Alternative-cause score bands and temporal window bounds are read from
//! here rather than hard-coded at each call site. Defaults follow the NAM
//! 2024 mRNA/myocarditis review and the WHO AEFI step-1 cut points.

use serde::{Deserialize, Serialize};

use crate::{CausalyxError, Result};

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scoring: ScoringThresholds,

    #[serde(default)]
    pub temporal: TemporalWindows,
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Cut points applied to the maximum clinical alternative-cause score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringThresholds {
    /// At or above: definite alternative cause (classifier rule 2).
    #[serde(default = "default_definite")]
    pub definite_alternative: f64,

    /// At or above: possible alternative cause (conflicting evidence).
    #[serde(default = "default_possible")]
    pub possible_alternative: f64,

    /// At or above: weak alternative.
    #[serde(default = "default_weak")]
    pub weak_alternative: f64,
}

fn default_definite() -> f64 { 0.70 }
fn default_possible() -> f64 { 0.40 }
fn default_weak()     -> f64 { 0.20 }

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            definite_alternative: default_definite(),
            possible_alternative: default_possible(),
            weak_alternative: default_weak(),
        }
    }
}

// ── Temporal ──────────────────────────────────────────────────────────────────

/// Inclusive upper bounds (in days after exposure) of each temporal zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalWindows {
    /// 0..=7 → strong causal window.
    #[serde(default = "default_strong_causal")]
    pub strong_causal_max_days: i64,

    /// 8..=21 → plausible but attenuated.
    #[serde(default = "default_plausible")]
    pub plausible_max_days: i64,

    /// 22..=42 → background-rate zone; beyond → unlikely.
    #[serde(default = "default_background_rate")]
    pub background_rate_max_days: i64,

    /// Peak-incidence annotation band (flag only).
    #[serde(default = "default_peak_start")]
    pub peak_incidence_start_day: i64,

    #[serde(default = "default_peak_end")]
    pub peak_incidence_end_day: i64,
}

fn default_strong_causal()   -> i64 { 7 }
fn default_plausible()       -> i64 { 21 }
fn default_background_rate() -> i64 { 42 }
fn default_peak_start()      -> i64 { 2 }
fn default_peak_end()        -> i64 { 4 }

impl Default for TemporalWindows {
    fn default() -> Self {
        Self {
            strong_causal_max_days: default_strong_causal(),
            plausible_max_days: default_plausible(),
            background_rate_max_days: default_background_rate(),
            peak_incidence_start_day: default_peak_start(),
            peak_incidence_end_day: default_peak_end(),
        }
    }
}

impl EngineConfig {
    /// Thresholds must be strictly ordered inside [0, 1]; windows strictly
    /// increasing from day 0.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scoring;
        let ordered = 0.0 < s.weak_alternative
            && s.weak_alternative < s.possible_alternative
            && s.possible_alternative < s.definite_alternative
            && s.definite_alternative <= 1.0;
        if !ordered {
            return Err(CausalyxError::Config(format!(
                "scoring thresholds must satisfy 0 < weak ({}) < possible ({}) < definite ({}) <= 1",
                s.weak_alternative, s.possible_alternative, s.definite_alternative
            )));
        }

        let t = &self.temporal;
        let increasing = 0 <= t.strong_causal_max_days
            && t.strong_causal_max_days < t.plausible_max_days
            && t.plausible_max_days < t.background_rate_max_days;
        if !increasing {
            return Err(CausalyxError::Config(format!(
                "temporal windows must be increasing: {} < {} < {}",
                t.strong_causal_max_days, t.plausible_max_days, t.background_rate_max_days
            )));
        }
        if t.peak_incidence_start_day > t.peak_incidence_end_day {
            return Err(CausalyxError::Config(
                "peak incidence band start is after its end".to_string(),
            ));
        }
        Ok(())
    }
}
