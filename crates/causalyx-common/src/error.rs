use thiserror::Error;

#[derive(Debug, Error)]
pub enum CausalyxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Keyword pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CausalyxError>;
