//! Lowered instructions.

use serde::{Deserialize, Serialize};

use crate::gate::Gate;
use crate::qubit::QubitRef;

/// A single lowered instruction.
///
/// Control structure never survives lowering: controls live inside the
/// gate expression (as [`Gate::Controlled`]) and loops are expanded, so
/// an instruction list is a straight line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Apply a gate expression to an ordered list of target qubits.
    Gate {
        /// The gate to apply.
        gate: Gate,
        /// The target qubits, in wire order.
        targets: Vec<QubitRef>,
    },
    /// Measure qubits in the computational basis.
    Measure {
        /// The qubits to measure, in readout order.
        targets: Vec<QubitRef>,
    },
}

impl Instruction {
    /// Create a gate instruction.
    pub fn gate(gate: Gate, targets: impl IntoIterator<Item = QubitRef>) -> Self {
        Instruction::Gate {
            gate,
            targets: targets.into_iter().collect(),
        }
    }

    /// Create a measurement instruction.
    pub fn measure(targets: impl IntoIterator<Item = QubitRef>) -> Self {
        Instruction::Measure {
            targets: targets.into_iter().collect(),
        }
    }

    /// Check if this is a gate instruction.
    pub fn is_gate(&self) -> bool {
        matches!(self, Instruction::Gate { .. })
    }

    /// Check if this is a measurement.
    pub fn is_measure(&self) -> bool {
        matches!(self, Instruction::Measure { .. })
    }

    /// Get the gate if this is a gate instruction.
    pub fn as_gate(&self) -> Option<&Gate> {
        match self {
            Instruction::Gate { gate, .. } => Some(gate),
            Instruction::Measure { .. } => None,
        }
    }

    /// The qubits this instruction touches, excluding controls.
    pub fn targets(&self) -> &[QubitRef] {
        match self {
            Instruction::Gate { targets, .. } | Instruction::Measure { targets } => targets,
        }
    }

    /// The inverse of this instruction, if it has one.
    ///
    /// Measurement is not invertible; callers that need inverses (the
    /// uncompute half of a `with` block) reject measurements earlier.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        match self {
            Instruction::Gate { gate, targets } => Some(Instruction::Gate {
                gate: gate.inverse(),
                targets: targets.clone(),
            }),
            Instruction::Measure { .. } => None,
        }
    }
}
