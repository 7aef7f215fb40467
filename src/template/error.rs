use thiserror::Error;

use crate::phased::{RenderError, SerializationError};

/// Errors raised while compiling or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("line {line}: {message}")]
    Syntax { message: String, line: usize },

    #[error("line {line}: unclosed tag, expected one of: {expected}")]
    UnclosedBlock { expected: String, line: usize },

    #[error("line {line}: invalid block tag '{name}', did you forget to register or load this tag?")]
    UnknownTag { name: String, line: usize },

    #[error("invalid filter: '{0}'")]
    UnknownFilter(String),

    #[error("'{0}' is not a registered tag library")]
    UnknownLibrary(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Deferred(Box<RenderError>),

    #[error("{0}")]
    Render(String),
}

impl TemplateError {
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
        }
    }

    /// Returns `true` for errors a template author fixes by editing the source.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. }
                | Self::UnclosedBlock { .. }
                | Self::UnknownTag { .. }
                | Self::UnknownFilter(_)
                | Self::UnknownLibrary(_)
        )
    }
}

impl From<RenderError> for TemplateError {
    fn from(err: RenderError) -> Self {
        Self::Deferred(Box::new(err))
    }
}
