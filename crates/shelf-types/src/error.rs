use thiserror::Error;

/// Errors produced by type parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },

    #[error("unknown time unit: {0}")]
    UnknownUnit(String),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
