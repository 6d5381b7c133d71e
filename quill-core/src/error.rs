//! Error types shared across the workspace

use crate::{ProviderKind, Role};
use thiserror::Error;

/// Front-matter configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("Provider not supported: {provider}")]
    UnknownProvider { provider: String },
}

/// A message part that a provider's wire format cannot represent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{provider} cannot represent {part} content in a {role} message: {reason}")]
pub struct UnsupportedContentError {
    pub provider: ProviderKind,
    pub role: Role,
    /// Kind of the offending content part (see [`crate::ContentPart::kind`]).
    pub part: String,
    pub reason: String,
}

impl UnsupportedContentError {
    pub fn new(
        provider: ProviderKind,
        role: Role,
        part: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            role,
            part: part.into(),
            reason: reason.into(),
        }
    }
}
