//! Braid gate-algebra intermediate representation
//!
//! This crate provides the lowered form every Braid source file compiles
//! to, and the contract code generators implement to render it.
//!
//! # Overview
//!
//! The IR is a straight-line representation: control flow from the
//! surface language (loops, comprehensions, `qif`, `with`) is expanded
//! or folded into the gate algebra before a [`Module`] is built. What
//! remains is a list of [`Instruction`]s per operation and program.
//!
//! # Core Components
//!
//! - **Gates**: [`Gate`], a closed algebra of named primitives with
//!   adjoint, tensor-power, composition, and control wrappers
//! - **Qubits**: [`QubitRef`] register-addressed qubits and
//!   [`ControlRef`] controls with polarity
//! - **Instructions**: [`Instruction`] gate applications and measurements
//! - **Module**: [`Module`] holding [`ResolvedOperation`]s and
//!   [`ResolvedProgram`]s, rendered via [`Module::dump_code`]
//! - **Backends**: the [`CodeGenerator`] trait
//!
//! # Example: Building and Rendering a Module
//!
//! ```rust
//! use braid_ir::{
//!     Gate, Instruction, Module, QubitRef, RegisterDecl, ResolvedProgram,
//! };
//!
//! let mut module = Module::new();
//! module
//!     .add_program(ResolvedProgram {
//!         name: "bell".to_string(),
//!         shots: 1024,
//!         registers: vec![RegisterDecl::local("q", 2, 0)],
//!         body: vec![
//!             Instruction::gate(Gate::named("H"), [QubitRef::new("q", 0)]),
//!             Instruction::measure([QubitRef::new("q", 0), QubitRef::new("q", 1)]),
//!         ],
//!     })
//!     .unwrap();
//!
//! assert!(module.program("bell").is_some());
//! ```
//!
//! # Gate Algebra
//!
//! [`Gate::inverse`] is structural and involutive: inverting a named
//! gate wraps it in an adjoint, inverting an adjoint unwraps it, and
//! inverting a composition reverses it with every element inverted. The
//! uncompute half of a `with` block is produced purely through this
//! operation.

pub mod error;
pub mod gate;
pub mod generator;
pub mod instruction;
pub mod module;
pub mod qubit;

pub use error::{IrError, IrResult};
pub use gate::Gate;
pub use generator::CodeGenerator;
pub use instruction::Instruction;
pub use module::{Module, RegisterDecl, ResolvedOperation, ResolvedProgram};
pub use qubit::{ControlRef, QubitRef};
