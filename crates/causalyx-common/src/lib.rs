//! causalyx-common: Shared case model, knowledge base, thresholds and errors
//! used across all Causalyx crates.

pub mod error;
pub mod case;
pub mod config;
pub mod keyword;
pub mod knowledge;

// Re-export commonly used types
pub use case::{
    AdverseEvent, ClinicalCase, ClinicalFindings, Demographics, Finding, MedicalHistory, Outcomes,
    ProductInfo, Sex,
};
pub use config::{EngineConfig, ScoringThresholds, TemporalWindows};
pub use error::{CausalyxError, Result};
pub use keyword::{KeywordPattern, MatchStrategy, SHORT_KEYWORD_MAX_LEN};
pub use knowledge::{
    EtiologySubtype, EvidenceTier, HighRiskRule, Indicator, IndicatorFamily, IndicatorTier,
    Investigation, InvestigationProtocol, KnowledgeBase, KnownEffect, ProductFamily,
    ProductFamilyRule, SubtypeKind,
};
