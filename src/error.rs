use thiserror::Error;

use crate::engine::DocumentKind;

/// Structural failures only. Unresolved tokens and stale positions travel in
/// reports, not here.
#[derive(Debug, Error)]
pub enum DocError {
    /// The buffer is not a readable zip archive, or `word/document.xml` is missing.
    #[error("package format error: {0}")]
    PackageFormat(String),

    /// A body/header/footer part is not well-formed XML.
    #[error("cannot parse part {part}: {message}")]
    PartParse { part: String, message: String },

    /// The template could not be reloaded or a touched part could not be re-serialized.
    #[error("regeneration failed: {0}")]
    Regeneration(String),

    #[error("{kind} template unavailable: {message}")]
    TemplateUnavailable { kind: DocumentKind, message: String },

    #[error("token delimiter must not be empty")]
    InvalidDelimiter,

    #[error("invalid replacement map: {0}")]
    InvalidReplacements(String),
}

pub type Result<T> = std::result::Result<T, DocError>;

impl DocError {
    pub(crate) fn part_parse(part: &str, err: anyhow::Error) -> Self {
        DocError::PartParse {
            part: part.to_string(),
            message: format!("{err:#}"),
        }
    }
}
