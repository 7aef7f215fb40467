use thiserror::Error;

use crate::template::TemplateError;

/// Errors raised while writing or reading a context snapshot.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("only a layered render context can be snapshotted")]
    NotAContext,

    #[error("context variable '{0}' cannot be carried to a later request")]
    NotPortable(String),

    #[error("snapshot payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Errors raised by the second rendering pass.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("deferred fragment failed to render: {0}")]
    Template(#[from] TemplateError),

    #[error("deferred fragments nested deeper than {max} levels")]
    DepthExceeded { max: usize },
}
