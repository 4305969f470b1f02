//! The intermediate module: fully lowered operations and programs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::generator::CodeGenerator;
use crate::instruction::Instruction;

/// A quantum register owned or borrowed by an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDecl {
    /// The register name.
    pub name: String,
    /// Number of qubits.
    pub size: u32,
    /// Basis-state initialization for locally allocated registers.
    ///
    /// `None` for parameter registers, which arrive already prepared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<u64>,
    /// Whether the register is a parameter of the operation rather than
    /// a local allocation.
    pub is_param: bool,
}

impl RegisterDecl {
    /// Declare a parameter register.
    pub fn param(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
            init: None,
            is_param: true,
        }
    }

    /// Declare a local register initialized to a basis state.
    pub fn local(name: impl Into<String>, size: u32, init: u64) -> Self {
        Self {
            name: name.into(),
            size,
            init: Some(init),
            is_param: false,
        }
    }
}

/// An operation after resolution, inference, and lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOperation {
    /// The operation name.
    pub name: String,
    /// Registers in declaration order: parameters first, then locals.
    pub registers: Vec<RegisterDecl>,
    /// The lowered instruction sequence.
    pub body: Vec<Instruction>,
}

/// A program after resolution, inference, and lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProgram {
    /// The program name.
    pub name: String,
    /// Number of shots to execute.
    pub shots: u64,
    /// Registers allocated by the program.
    pub registers: Vec<RegisterDecl>,
    /// The lowered instruction sequence.
    pub body: Vec<Instruction>,
}

/// A fully lowered compilation unit.
///
/// Immutable once built; [`Module::dump_code`] walks it through a
/// [`CodeGenerator`] to render a target artifact. Name-keyed maps give
/// deterministic emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Lowered operations, keyed by name.
    pub operations: BTreeMap<String, ResolvedOperation>,
    /// Lowered programs, keyed by name.
    pub programs: BTreeMap<String, ResolvedProgram>,
}

impl Module {
    /// Create an empty module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lowered operation.
    ///
    /// Returns an error if an operation with the same name exists; the
    /// frontend reports duplicates before lowering, so a collision here
    /// is an internal inconsistency.
    pub fn add_operation(&mut self, op: ResolvedOperation) -> IrResult<()> {
        if self.operations.contains_key(&op.name) {
            return Err(IrError::DuplicateDefinition(op.name));
        }
        self.operations.insert(op.name.clone(), op);
        Ok(())
    }

    /// Add a lowered program.
    pub fn add_program(&mut self, prog: ResolvedProgram) -> IrResult<()> {
        if self.programs.contains_key(&prog.name) {
            return Err(IrError::DuplicateDefinition(prog.name));
        }
        self.programs.insert(prog.name.clone(), prog);
        Ok(())
    }

    /// Look up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&ResolvedOperation> {
        self.operations.get(name)
    }

    /// Look up a program by name.
    pub fn program(&self, name: &str) -> Option<&ResolvedProgram> {
        self.programs.get(name)
    }

    /// Check if the module has no content.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.programs.is_empty()
    }

    /// Render this module through a code generator.
    ///
    /// Operations are visited before programs, each set in name order,
    /// so output is deterministic for a given module.
    pub fn dump_code(&self, generator: &mut dyn CodeGenerator) -> IrResult<String> {
        generator.begin_module()?;
        for op in self.operations.values() {
            generator.operation(op)?;
        }
        for prog in self.programs.values() {
            generator.program(prog)?;
        }
        generator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;
    use crate::qubit::QubitRef;

    fn sample_op(name: &str) -> ResolvedOperation {
        ResolvedOperation {
            name: name.to_string(),
            registers: vec![RegisterDecl::param("psi", 1)],
            body: vec![Instruction::gate(
                Gate::named("H"),
                [QubitRef::new("psi", 0)],
            )],
        }
    }

    #[test]
    fn test_duplicate_operation_rejected() {
        let mut module = Module::new();
        module.add_operation(sample_op("Foo")).unwrap();
        assert!(module.add_operation(sample_op("Foo")).is_err());
    }

    #[test]
    fn test_lookup() {
        let mut module = Module::new();
        module.add_operation(sample_op("Foo")).unwrap();
        assert!(module.operation("Foo").is_some());
        assert!(module.operation("Bar").is_none());
        assert!(!module.is_empty());
    }

    struct CountingGenerator {
        ops: usize,
        progs: usize,
    }

    impl CodeGenerator for CountingGenerator {
        fn begin_module(&mut self) -> IrResult<()> {
            Ok(())
        }

        fn operation(&mut self, _op: &ResolvedOperation) -> IrResult<()> {
            self.ops += 1;
            Ok(())
        }

        fn program(&mut self, _prog: &ResolvedProgram) -> IrResult<()> {
            self.progs += 1;
            Ok(())
        }

        fn finish(&mut self) -> IrResult<String> {
            Ok(format!("{}/{}", self.ops, self.progs))
        }
    }

    #[test]
    fn test_dump_code_visits_everything() {
        let mut module = Module::new();
        module.add_operation(sample_op("A")).unwrap();
        module.add_operation(sample_op("B")).unwrap();
        module
            .add_program(ResolvedProgram {
                name: "Main".to_string(),
                shots: 1024,
                registers: vec![RegisterDecl::local("q", 2, 0)],
                body: vec![],
            })
            .unwrap();

        let mut generator = CountingGenerator { ops: 0, progs: 0 };
        let out = module.dump_code(&mut generator).unwrap();
        assert_eq!(out, "2/1");
    }
}
