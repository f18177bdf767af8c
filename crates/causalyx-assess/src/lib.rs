//! causalyx-assess: Diagnostic certainty, temporal audit, causality
//! classification, and the per-case engine that chains every stage.
//!
//! A case flows grader → (early exit on level 4) → matcher → scorer →
//! temporal auditor → classifier. Everything here is synchronous and pure:
//! the only shared state is the immutable knowledge base behind an `Arc`.

pub mod certainty;
pub mod classifier;
pub mod engine;
pub mod temporal;

pub use certainty::{
    CertaintyCriteria, CertaintyGrade, ConditionFamily, Criterion, DiagnosticCertaintyGrader,
    MissingCriterion, PendingOverride, PENDING_KEYWORDS,
};
pub use classifier::{
    CausalityCategory, CausalityClassifier, CausalityDecision, ClassifierInput, ConfidenceTier,
    DecisionChain, RuleFired,
};
pub use engine::{CaseInput, CaseOutcome, CausalityAssessment, CausalityEngine, EarlyExitReport};
pub use temporal::{
    FlagCode, HighRiskAssessment, InvestigationFocus, InvestigationGuidance,
    InvestigationIntensity, KnownEffectAssessment, TemporalAssessment, TemporalAuditor,
    TemporalFlag, TemporalZone, WindowAlignment,
};
