//! Error types for the IR crate.

use thiserror::Error;

/// Errors that can occur in IR operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// An operation or program name was defined twice.
    #[error("'{0}' is defined more than once")]
    DuplicateDefinition(String),

    /// A generator met a construct its target cannot express.
    #[error("Target cannot express construct: {0}")]
    Unsupported(String),

    /// A register referenced by an instruction is not declared.
    #[error("Register '{0}' is not declared in this scope")]
    UnknownRegister(String),

    /// Rendering failed while writing the artifact text.
    #[error("Failed to render artifact: {0}")]
    Render(String),
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
