//! Batch runner.
//!
//! Cases run on a bounded pool of tokio tasks. Each task drives the engine's
//! stages and calls the collaborators between them. A task that errors or
//! panics is reported as Unclassifiable with low confidence; that fallback
//! lives here, never inside the classifier.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use causalyx_assess::{CaseInput, CaseOutcome, CausalityCategory, CausalityEngine, ConfidenceTier};
use causalyx_common::ClinicalCase;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::{ExplanationService, IndicatorAssessor, ObservationService};
use crate::explanation::Explanation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub case_id: String,
    /// Always the engine's category, or the fallback when the engine failed.
    pub category: CausalityCategory,
    pub label: String,
    pub confidence: ConfidenceTier,
    pub fallback: bool,
    pub error: Option<String>,
    pub outcome: Option<CaseOutcome>,
    pub explanation: Option<Explanation>,
}

impl CaseReport {
    fn from_outcome(outcome: CaseOutcome, explanation: Option<Explanation>) -> Self {
        let category = outcome.category();
        Self {
            case_id: outcome.case_id().to_string(),
            category,
            label: category.label().to_string(),
            confidence: outcome.confidence(),
            fallback: false,
            error: None,
            outcome: Some(outcome),
            explanation,
        }
    }

    fn fallback(case_id: String, error: String) -> Self {
        let category = CausalityCategory::Unclassifiable;
        Self {
            case_id,
            category,
            label: category.label().to_string(),
            confidence: ConfidenceTier::Low,
            fallback: true,
            error: Some(error),
            outcome: None,
            explanation: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub early_exits: usize,
    pub fallbacks: usize,
    pub by_category: BTreeMap<String, usize>,
}

impl BatchSummary {
    fn tally(cases: &[CaseReport]) -> Self {
        let mut summary = Self {
            total: cases.len(),
            ..Self::default()
        };
        for c in cases {
            *summary.by_category.entry(c.category.code().to_string()).or_default() += 1;
            if c.fallback {
                summary.fallbacks += 1;
            }
            if c.outcome.as_ref().is_some_and(CaseOutcome::is_early_exit) {
                summary.early_exits += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub knowledge_base_version: String,
    pub summary: BatchSummary,
    /// Input order.
    pub cases: Vec<CaseReport>,
}

/// Read a JSON array of case bundles.
pub async fn load_bundles(path: &Path) -> Result<Vec<CaseInput>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading case bundles from {}", path.display()))?;
    let bundles: Vec<CaseInput> = serde_json::from_str(&content)
        .with_context(|| format!("parsing case bundles from {}", path.display()))?;
    Ok(bundles)
}

pub struct BatchRunner {
    engine: Arc<CausalityEngine>,
    observations: Arc<dyn ObservationService>,
    assessor: Arc<dyn IndicatorAssessor>,
    explainer: Arc<dyn ExplanationService>,
    workers: usize,
}

impl BatchRunner {
    pub fn new(
        engine: Arc<CausalityEngine>,
        observations: Arc<dyn ObservationService>,
        assessor: Arc<dyn IndicatorAssessor>,
        explainer: Arc<dyn ExplanationService>,
    ) -> Self {
        Self {
            engine,
            observations,
            assessor,
            explainer,
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub async fn run(&self, cases: Vec<ClinicalCase>) -> BatchReport {
        let started = Instant::now();
        info!(
            cases = cases.len(),
            workers = self.workers,
            observations = self.observations.name(),
            assessor = self.assessor.name(),
            explainer = self.explainer.name(),
            "Batch started"
        );

        let mut indexed: Vec<(usize, CaseReport)> = stream::iter(cases.into_iter().enumerate())
            .map(|(idx, case)| {
                let engine = Arc::clone(&self.engine);
                let observations = Arc::clone(&self.observations);
                let assessor = Arc::clone(&self.assessor);
                let explainer = Arc::clone(&self.explainer);
                async move {
                    let case_id = case.case_id.clone();
                    let task = tokio::spawn(process_case(engine, observations, assessor, explainer, case));
                    (idx, report_for(case_id, task.await))
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);
        let cases: Vec<CaseReport> = indexed.into_iter().map(|(_, r)| r).collect();

        let summary = BatchSummary::tally(&cases);
        info!(
            total = summary.total,
            early_exits = summary.early_exits,
            fallbacks = summary.fallbacks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );

        BatchReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            knowledge_base_version: self.engine.knowledge_base().version.clone(),
            summary,
            cases,
        }
    }
}

async fn process_case(
    engine: Arc<CausalityEngine>,
    observations: Arc<dyn ObservationService>,
    assessor: Arc<dyn IndicatorAssessor>,
    explainer: Arc<dyn ExplanationService>,
    case: ClinicalCase,
) -> Result<(CaseOutcome, Option<Explanation>)> {
    let grade = engine.grade(&case);
    let outcome = if grade.early_exit {
        CaseOutcome::EarlyExit(engine.early_exit(&case, grade))
    } else {
        let observed = observations
            .observe(&case)
            .await
            .with_context(|| format!("{} failed", observations.name()))?;
        let differential = engine.match_differential(&observed);
        let raw = assessor
            .assess(&case, &differential)
            .await
            .with_context(|| format!("{} failed", assessor.name()))?;
        CaseOutcome::Assessed(Box::new(engine.complete(&case, grade, differential, &raw)))
    };

    // A failed explanation leaves the decided outcome intact.
    let explanation = match explainer.explain(&case, &outcome).await {
        Ok(e) => Some(e),
        Err(e) => {
            warn!(case_id = %case.case_id, error = %e, "Explanation unavailable");
            None
        }
    };
    Ok((outcome, explanation))
}

fn report_for(
    case_id: String,
    joined: std::result::Result<Result<(CaseOutcome, Option<Explanation>)>, tokio::task::JoinError>,
) -> CaseReport {
    match joined {
        Ok(Ok((outcome, explanation))) => {
            info!(
                case_id = %case_id,
                category = outcome.category().code(),
                confidence = outcome.confidence().as_str(),
                early_exit = outcome.is_early_exit(),
                "Case reported"
            );
            CaseReport::from_outcome(outcome, explanation)
        }
        Ok(Err(e)) => {
            let message = format!("{e:#}");
            warn!(case_id = %case_id, error = %message, "Case failed, reporting as Unclassifiable");
            CaseReport::fallback(case_id, message)
        }
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(case_id = %case_id, panic = %message, "Engine panicked, reporting as Unclassifiable");
            CaseReport::fallback(case_id, format!("panic: {message}"))
        }
        Err(join_err) => {
            error!(case_id = %case_id, error = %join_err, "Case task cancelled");
            CaseReport::fallback(case_id, join_err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{RecordedAssessments, RecordedObservations};
    use crate::explanation::TemplateExplanationService;
    use async_trait::async_trait;
    use causalyx_common::EngineConfig;
    use causalyx_ddx::ObservationSet;
    use causalyx_test_utils::{embedded_kb, observations, raw_assessments, CaseBuilder};
    use pretty_assertions::assert_eq;

    struct FailingObservations;

    #[async_trait]
    impl ObservationService for FailingObservations {
        fn name(&self) -> &str { "failing_observations" }

        async fn observe(&self, _case: &ClinicalCase) -> Result<ObservationSet> {
            anyhow::bail!("observation service unreachable")
        }
    }

    struct PanickingObservations;

    #[async_trait]
    impl ObservationService for PanickingObservations {
        fn name(&self) -> &str { "panicking_observations" }

        async fn observe(&self, case: &ClinicalCase) -> Result<ObservationSet> {
            panic!("corrupt observation payload for {}", case.case_id)
        }
    }

    fn bundles() -> Vec<CaseInput> {
        vec![
            CaseInput {
                case: CaseBuilder::confirmed_myocarditis("B-1").build(),
                observations: ObservationSet::default(),
                assessments: BTreeMap::new(),
            },
            CaseInput {
                case: CaseBuilder::new("B-2").patient(45.0, "F").condition("myocarditis").build(),
                observations: ObservationSet::default(),
                assessments: BTreeMap::new(),
            },
            CaseInput {
                case: CaseBuilder::confirmed_myocarditis("B-3").patient(67.0, "F").build(),
                observations: observations(&[
                    ("medications", "pembrolizumab", "on pembrolizumab for melanoma"),
                    ("musculoskeletal", "myositis", "concurrent myositis"),
                ]),
                assessments: raw_assessments(serde_json::json!({
                    "ici_therapy_active": { "present": true, "mechanistically_concordant": true, "plausibility_tier": "high" },
                    "concurrent_myositis": { "present": true, "mechanistically_concordant": true, "plausibility_tier": "high" }
                })),
            },
        ]
    }

    fn runner(observations: Arc<dyn ObservationService>, bundles: &[CaseInput]) -> BatchRunner {
        let kb = embedded_kb();
        let engine = Arc::new(CausalityEngine::new(Arc::clone(&kb), EngineConfig::default()).unwrap());
        BatchRunner::new(
            engine,
            observations,
            Arc::new(RecordedAssessments::from_bundles(bundles)),
            Arc::new(TemplateExplanationService::new(kb)),
        )
        .with_workers(2)
    }

    fn cases(bundles: &[CaseInput]) -> Vec<ClinicalCase> {
        bundles.iter().map(|b| b.case.clone()).collect()
    }

    #[tokio::test]
    async fn test_batch_keeps_input_order_and_categories() {
        let bundles = bundles();
        let report = runner(Arc::new(RecordedObservations::from_bundles(&bundles)), &bundles)
            .run(cases(&bundles))
            .await;

        let ids: Vec<&str> = report.cases.iter().map(|c| c.case_id.as_str()).collect();
        assert_eq!(ids, vec!["B-1", "B-2", "B-3"]);
        let categories: Vec<CausalityCategory> = report.cases.iter().map(|c| c.category).collect();
        assert_eq!(
            categories,
            vec![CausalityCategory::A1, CausalityCategory::Unclassifiable, CausalityCategory::C]
        );
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.early_exits, 1);
        assert_eq!(report.summary.fallbacks, 0);
        assert_eq!(report.summary.by_category.get("A1"), Some(&1));
        assert!(report.cases.iter().all(|c| c.explanation.is_some()));
    }

    #[tokio::test]
    async fn test_report_category_matches_engine() {
        let bundles = bundles();
        let report = runner(Arc::new(RecordedObservations::from_bundles(&bundles)), &bundles)
            .run(cases(&bundles))
            .await;
        for c in &report.cases {
            let outcome = c.outcome.as_ref().expect("engine outcome present");
            assert_eq!(c.category, outcome.category());
            assert_eq!(c.confidence, outcome.confidence());
        }
    }

    #[tokio::test]
    async fn test_collaborator_error_falls_back_to_unclassifiable() {
        let bundles = bundles();
        let report = runner(Arc::new(FailingObservations), &bundles).run(cases(&bundles)).await;

        // B-2 exits early before any observation call, so it is unaffected.
        let b2 = &report.cases[1];
        assert!(!b2.fallback);

        for c in [&report.cases[0], &report.cases[2]] {
            assert!(c.fallback);
            assert_eq!(c.category, CausalityCategory::Unclassifiable);
            assert_eq!(c.confidence, ConfidenceTier::Low);
            assert!(c.error.as_deref().unwrap_or_default().contains("unreachable"));
        }
        assert_eq!(report.summary.fallbacks, 2);
    }

    #[tokio::test]
    async fn test_panic_falls_back_without_aborting_batch() {
        let bundles = bundles();
        let report = runner(Arc::new(PanickingObservations), &bundles).run(cases(&bundles)).await;
        assert_eq!(report.cases.len(), 3);
        let first = &report.cases[0];
        assert!(first.fallback);
        assert_eq!(first.category, CausalityCategory::Unclassifiable);
        assert!(first.error.as_deref().unwrap_or_default().starts_with("panic: corrupt observation"));
    }

    #[tokio::test]
    async fn test_load_bundles_from_file() {
        let path = std::env::temp_dir().join(format!("causalyx-{}.json", Uuid::new_v4()));
        let json = serde_json::to_string(&bundles()).unwrap();
        tokio::fs::write(&path, json).await.unwrap();

        let loaded = load_bundles(&path).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[2].case.case_id, "B-3");
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_bundles_missing_file() {
        let err = load_bundles(Path::new("/nonexistent/cases.json")).await.unwrap_err();
        assert!(err.to_string().contains("reading case bundles"));
    }
}
