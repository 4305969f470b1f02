//! Qubit references and control polarity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single qubit addressed by register name and index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QubitRef {
    /// The register this qubit belongs to.
    pub register: String,
    /// The index within the register.
    pub index: u32,
}

impl QubitRef {
    /// Create a new qubit reference.
    pub fn new(register: impl Into<String>, index: u32) -> Self {
        Self {
            register: register.into(),
            index,
        }
    }
}

impl fmt::Display for QubitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.register, self.index)
    }
}

/// A control qubit with polarity.
///
/// A negated control fires on |0⟩ instead of |1⟩; generators bracket it
/// with the anti-control form of their framing instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlRef {
    /// The controlling qubit.
    pub qubit: QubitRef,
    /// Whether the control fires on |0⟩.
    pub negated: bool,
}

impl ControlRef {
    /// A control that fires on |1⟩.
    pub fn positive(qubit: QubitRef) -> Self {
        Self {
            qubit,
            negated: false,
        }
    }

    /// A control that fires on |0⟩.
    pub fn negative(qubit: QubitRef) -> Self {
        Self {
            qubit,
            negated: true,
        }
    }

    /// Flip the polarity of this control.
    #[must_use]
    pub fn flipped(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

impl fmt::Display for ControlRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.qubit)
        } else {
            write!(f, "{}", self.qubit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qubit_ref_display() {
        let q = QubitRef::new("psi", 3);
        assert_eq!(format!("{q}"), "psi[3]");
    }

    #[test]
    fn test_control_ref_display() {
        let pos = ControlRef::positive(QubitRef::new("anc", 0));
        assert_eq!(format!("{pos}"), "anc[0]");
        assert_eq!(format!("{}", pos.flipped()), "!anc[0]");
    }
}
