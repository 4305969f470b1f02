//! The gate algebra.
//!
//! Gates form a small closed algebra: named primitives, parameterized
//! primitives, and three combinators (adjoint, tensor power, composition)
//! plus a control wrapper. Lowering produces values of this algebra and
//! code generators consume it; neither side ever sees raw matrices.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::qubit::ControlRef;

/// A gate expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gate {
    /// A named primitive gate, e.g. `H` or `CNOT`.
    Named(String),
    /// A named gate with classical arguments, e.g. `Ph(pi/2)`.
    Parametrized(String, Vec<f64>),
    /// The adjoint of a gate (`G!` in source form).
    Dagger(Box<Gate>),
    /// A gate tensored with itself a fixed number of times (`G @ n`).
    TensorPower(Box<Gate>, u32),
    /// Matrix composition (`G1 . G2 . … . Gk`), applied right to left.
    Concat(Vec<Gate>),
    /// A gate conditioned on a set of basis-state controls.
    Controlled(Box<Gate>, Vec<ControlRef>),
}

impl Gate {
    /// Create a named gate.
    pub fn named(name: impl Into<String>) -> Self {
        Gate::Named(name.into())
    }

    /// Create a parameterized gate.
    pub fn parametrized(name: impl Into<String>, args: Vec<f64>) -> Self {
        Gate::Parametrized(name.into(), args)
    }

    /// Wrap this gate in an adjoint.
    #[must_use]
    pub fn dagger(self) -> Self {
        Gate::Dagger(Box::new(self))
    }

    /// Tensor this gate with itself `count` times.
    #[must_use]
    pub fn tensor_power(self, count: u32) -> Self {
        Gate::TensorPower(Box::new(self), count)
    }

    /// Attach controls to this gate, merging with existing ones.
    ///
    /// Nested `qif` blocks and `ctrl` modifiers accumulate into a single
    /// control set so generators see one flat wrapper.
    #[must_use]
    pub fn controlled(self, controls: Vec<ControlRef>) -> Self {
        if controls.is_empty() {
            return self;
        }
        match self {
            Gate::Controlled(base, mut existing) => {
                existing.extend(controls);
                Gate::Controlled(base, existing)
            }
            other => Gate::Controlled(Box::new(other), controls),
        }
    }

    /// The inverse of this gate.
    ///
    /// Structural and involutive: `g.inverse().inverse() == g` for every
    /// gate expression. A bare adjoint unwraps rather than double-wraps,
    /// and a composition reverses with each element inverted.
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Gate::Named(_) | Gate::Parametrized(_, _) => Gate::Dagger(Box::new(self.clone())),
            Gate::Dagger(inner) => (**inner).clone(),
            Gate::TensorPower(base, count) => {
                Gate::TensorPower(Box::new(base.inverse()), *count)
            }
            Gate::Concat(parts) => {
                Gate::Concat(parts.iter().rev().map(Gate::inverse).collect())
            }
            Gate::Controlled(base, controls) => {
                Gate::Controlled(Box::new(base.inverse()), controls.clone())
            }
        }
    }

    /// The primitive name at the root of this expression, if there is
    /// exactly one.
    pub fn base_name(&self) -> Option<&str> {
        match self {
            Gate::Named(name) | Gate::Parametrized(name, _) => Some(name),
            Gate::Dagger(inner) | Gate::TensorPower(inner, _) | Gate::Controlled(inner, _) => {
                inner.base_name()
            }
            Gate::Concat(_) => None,
        }
    }

    /// Check if this gate carries a control set.
    pub fn is_controlled(&self) -> bool {
        matches!(self, Gate::Controlled(_, _))
    }

    /// Number of target qubits this gate spans, given that a primitive
    /// named gate spans one.
    ///
    /// Composition does not change the span; tensor power multiplies it.
    pub fn span(&self) -> u32 {
        match self {
            Gate::Named(_) | Gate::Parametrized(_, _) => 1,
            Gate::Dagger(inner) | Gate::Controlled(inner, _) => inner.span(),
            Gate::TensorPower(base, count) => base.span() * count,
            Gate::Concat(parts) => parts.first().map_or(1, Gate::span),
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Named(name) => write!(f, "{name}"),
            Gate::Parametrized(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Gate::Dagger(inner) => write!(f, "{inner}!"),
            Gate::TensorPower(base, count) => write!(f, "{base} @ {count}"),
            Gate::Concat(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " . ")?;
                    }
                    write!(f, "{part}")?;
                }
                Ok(())
            }
            Gate::Controlled(base, controls) => {
                write!(f, "{base} ctrl [")?;
                for (i, c) in controls.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "]")
            }
        }
    }
}
