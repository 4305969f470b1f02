//! Compiler diagnostics.
//!
//! Every pass reports problems as [`Diagnostic`] values collected in
//! discovery order; nothing in the frontend panics or throws across the
//! compile boundary. Severity gates code generation (any error means no
//! targets) but warnings and notes never block it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Blocks target generation.
    Error,
    /// Reported but never blocks generation.
    Warning,
    /// Informational.
    Note,
}

impl Severity {
    /// Numeric code used at the result boundary: 0 error, 1 warning, 2 note.
    pub fn code(self) -> i32 {
        match self {
            Severity::Error => 0,
            Severity::Warning => 1,
            Severity::Note => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A line/column position in a source file, both 1-based.
///
/// Column 0 with line 0 marks a diagnostic with no source location
/// (config or I/O failures reported before any text is read).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    /// Create a position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The no-location position.
    pub fn none() -> Self {
        Self { line: 0, column: 0 }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Path of the source file the diagnostic refers to.
    pub source: String,
    /// Line in the source, 1-based; 0 when there is no location.
    pub line: u32,
    /// Column in the source, 1-based; 0 when there is no location.
    pub column: u32,
    /// Human-readable message.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(
        severity: Severity,
        source: impl Into<String>,
        pos: SourcePos,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            source: source.into(),
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    /// Create an error diagnostic.
    pub fn error(source: impl Into<String>, pos: SourcePos, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, source, pos, message)
    }

    /// Create a warning diagnostic.
    pub fn warning(source: impl Into<String>, pos: SourcePos, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, source, pos, message)
    }

    /// Create a note diagnostic.
    pub fn note(source: impl Into<String>, pos: SourcePos, message: impl Into<String>) -> Self {
        Self::new(Severity::Note, source, pos, message)
    }

    /// Check if this diagnostic blocks target generation.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// The position of this diagnostic.
    pub fn pos(&self) -> SourcePos {
        SourcePos::new(self.line, self.column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.source, self.line, self.column, self.severity, self.message
        )
    }
}
