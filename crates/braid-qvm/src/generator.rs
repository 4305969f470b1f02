//! QVM assembly generator.

use std::mem;

use braid_ir::{
    CodeGenerator, Gate, Instruction, IrError, IrResult, Module, QubitRef, RegisterDecl,
    ResolvedOperation, ResolvedProgram,
};

/// Extension used for QVM assembly artifacts.
pub const FILE_EXTENSION: &str = "qvm";

/// Render a module as QVM assembly.
pub fn generate(module: &Module) -> IrResult<String> {
    let mut generator = QvmGenerator::new();
    module.dump_code(&mut generator)
}

/// Code generator targeting the QVM assembly format.
///
/// Each operation becomes an `op NAME` block and each program a
/// `prog NAME shots N` block, both closed by `end`. Register
/// declarations come first (`reg name size`, with `init v` appended for
/// local allocations), followed by one line per primitive gate
/// application (`push GATE targets`). Structured gates unwind into
/// framing: `dagger`/`enddagger` inverts everything between them, and a
/// control set brackets its base with one `ctrl q` or `nctrl q` line
/// per control and a closing `endctrl`.
pub struct QvmGenerator {
    output: String,
    indent: usize,
}

impl QvmGenerator {
    /// Create a generator with an empty output buffer.
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    fn writeln(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(line);
        self.output.push('\n');
    }

    fn emit_register(&mut self, reg: &RegisterDecl) {
        match reg.init {
            Some(init) => self.writeln(&format!("reg {} {} init {init}", reg.name, reg.size)),
            None => self.writeln(&format!("reg {} {}", reg.name, reg.size)),
        }
    }

    fn emit_body(&mut self, registers: &[RegisterDecl], body: &[Instruction]) -> IrResult<()> {
        self.indent += 1;
        for reg in registers {
            self.emit_register(reg);
        }
        for instr in body {
            self.emit_instruction(instr)?;
        }
        self.indent -= 1;
        self.writeln("end");
        Ok(())
    }

    fn emit_instruction(&mut self, instr: &Instruction) -> IrResult<()> {
        match instr {
            Instruction::Gate { gate, targets } => self.emit_gate(gate, targets),
            Instruction::Measure { targets } => {
                self.writeln(&format!("measure {}", qubit_list(targets)));
                Ok(())
            }
        }
    }

    fn emit_gate(&mut self, gate: &Gate, targets: &[QubitRef]) -> IrResult<()> {
        match gate {
            Gate::Named(name) => {
                self.writeln(&format!("push {name} {}", qubit_list(targets)));
                Ok(())
            }
            Gate::Parametrized(name, args) => {
                let args = args
                    .iter()
                    .map(f64::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                self.writeln(&format!("push {name}({args}) {}", qubit_list(targets)));
                Ok(())
            }
            Gate::Dagger(inner) => {
                self.writeln("dagger");
                self.indent += 1;
                self.emit_gate(inner, targets)?;
                self.indent -= 1;
                self.writeln("enddagger");
                Ok(())
            }
            Gate::TensorPower(base, count) => {
                // Targets split into `count` equal chunks, one per factor.
                let count = usize::try_from(*count).map_err(|_| {
                    IrError::Render(format!("tensor power {count} exceeds the address space"))
                })?;
                if count == 0 || targets.len() % count != 0 {
                    return Err(IrError::Render(format!(
                        "tensor power {count} does not divide {} targets",
                        targets.len()
                    )));
                }
                for chunk in targets.chunks(targets.len() / count) {
                    self.emit_gate(base, chunk)?;
                }
                Ok(())
            }
            // Composition applies right to left, so the rightmost part
            // is pushed first.
            Gate::Concat(parts) => {
                for part in parts.iter().rev() {
                    self.emit_gate(part, targets)?;
                }
                Ok(())
            }
            Gate::Controlled(base, controls) => {
                for control in controls {
                    let frame = if control.negated { "nctrl" } else { "ctrl" };
                    self.writeln(&format!("{frame} {}", control.qubit));
                }
                self.indent += 1;
                self.emit_gate(base, targets)?;
                self.indent -= 1;
                self.writeln("endctrl");
                Ok(())
            }
        }
    }
}

impl Default for QvmGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for QvmGenerator {
    fn begin_module(&mut self) -> IrResult<()> {
        self.output.clear();
        self.indent = 0;
        Ok(())
    }

    fn operation(&mut self, op: &ResolvedOperation) -> IrResult<()> {
        self.writeln(&format!("op {}", op.name));
        self.emit_body(&op.registers, &op.body)
    }

    fn program(&mut self, prog: &ResolvedProgram) -> IrResult<()> {
        self.writeln(&format!("prog {} shots {}", prog.name, prog.shots));
        self.emit_body(&prog.registers, &prog.body)
    }

    fn finish(&mut self) -> IrResult<String> {
        Ok(mem::take(&mut self.output))
    }
}

fn qubit_list(qubits: &[QubitRef]) -> String {
    qubits
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_ir::ControlRef;

    fn bell_module() -> Module {
        let mut module = Module::new();
        module
            .add_program(ResolvedProgram {
                name: "Bell".to_string(),
                shots: 1024,
                registers: vec![RegisterDecl::local("q", 2, 0)],
                body: vec![
                    Instruction::gate(Gate::named("H"), [QubitRef::new("q", 0)]),
                    Instruction::gate(
                        Gate::named("CNOT"),
                        [QubitRef::new("q", 0), QubitRef::new("q", 1)],
                    ),
                    Instruction::measure([QubitRef::new("q", 0), QubitRef::new("q", 1)]),
                ],
            })
            .unwrap();
        module
    }

    #[test]
    fn test_bell_program() {
        let text = generate(&bell_module()).unwrap();
        assert!(text.contains("prog Bell shots 1024"));
        assert!(text.contains("reg q 2 init 0"));
        assert!(text.contains("push H q[0]"));
        assert!(text.contains("push CNOT q[0], q[1]"));
        assert!(text.contains("measure q[0], q[1]"));
        assert!(text.ends_with("end\n"));
    }

    #[test]
    fn test_operation_header_and_param_register() {
        let mut module = Module::new();
        module
            .add_operation(ResolvedOperation {
                name: "Foo".to_string(),
                registers: vec![RegisterDecl::param("psi", 3)],
                body: vec![Instruction::gate(Gate::named("X"), [QubitRef::new("psi", 0)])],
            })
            .unwrap();

        let text = generate(&module).unwrap();
        assert!(text.contains("op Foo"));
        assert!(text.contains("reg psi 3\n"));
        assert!(!text.contains("init"));
    }

    #[test]
    fn test_parametrized_gate() {
        let mut module = Module::new();
        module
            .add_operation(ResolvedOperation {
                name: "Rot".to_string(),
                registers: vec![RegisterDecl::param("q", 1)],
                body: vec![Instruction::gate(
                    Gate::parametrized("Rz", vec![0.5]),
                    [QubitRef::new("q", 0)],
                )],
            })
            .unwrap();

        let text = generate(&module).unwrap();
        assert!(text.contains("push Rz(0.5) q[0]"));
    }

    #[test]
    fn test_dagger_framing() {
        let mut module = Module::new();
        module
            .add_operation(ResolvedOperation {
                name: "Undo".to_string(),
                registers: vec![RegisterDecl::param("q", 1)],
                body: vec![Instruction::gate(
                    Gate::named("S").dagger(),
                    [QubitRef::new("q", 0)],
                )],
            })
            .unwrap();

        let text = generate(&module).unwrap();
        let dagger = text.find("dagger").unwrap();
        let push = text.find("push S q[0]").unwrap();
        let enddagger = text.find("enddagger").unwrap();
        assert!(dagger < push && push < enddagger);
    }

    #[test]
    fn test_control_framing_with_polarity() {
        let gate = Gate::named("X").controlled(vec![
            ControlRef::positive(QubitRef::new("c", 0)),
            ControlRef::negative(QubitRef::new("c", 1)),
        ]);
        let mut module = Module::new();
        module
            .add_operation(ResolvedOperation {
                name: "Branch".to_string(),
                registers: vec![RegisterDecl::param("q", 1), RegisterDecl::param("c", 2)],
                body: vec![Instruction::gate(gate, [QubitRef::new("q", 0)])],
            })
            .unwrap();

        let text = generate(&module).unwrap();
        assert!(text.contains("ctrl c[0]"));
        assert!(text.contains("nctrl c[1]"));
        assert!(text.contains("push X q[0]"));
        assert!(text.contains("endctrl"));
    }

    #[test]
    fn test_tensor_power_chunks_targets() {
        let mut module = Module::new();
        module
            .add_operation(ResolvedOperation {
                name: "Spread".to_string(),
                registers: vec![RegisterDecl::param("q", 3)],
                body: vec![Instruction::gate(
                    Gate::named("H").tensor_power(3),
                    [
                        QubitRef::new("q", 0),
                        QubitRef::new("q", 1),
                        QubitRef::new("q", 2),
                    ],
                )],
            })
            .unwrap();

        let text = generate(&module).unwrap();
        assert!(text.contains("push H q[0]"));
        assert!(text.contains("push H q[1]"));
        assert!(text.contains("push H q[2]"));
    }

    #[test]
    fn test_tensor_power_mismatch_is_render_error() {
        let mut module = Module::new();
        module
            .add_operation(ResolvedOperation {
                name: "Bad".to_string(),
                registers: vec![RegisterDecl::param("q", 3)],
                body: vec![Instruction::gate(
                    Gate::named("H").tensor_power(2),
                    [
                        QubitRef::new("q", 0),
                        QubitRef::new("q", 1),
                        QubitRef::new("q", 2),
                    ],
                )],
            })
            .unwrap();

        assert!(matches!(generate(&module), Err(IrError::Render(_))));
    }

    #[test]
    fn test_concat_pushes_right_to_left() {
        let mut module = Module::new();
        module
            .add_operation(ResolvedOperation {
                name: "Seq".to_string(),
                registers: vec![RegisterDecl::param("q", 1)],
                body: vec![Instruction::gate(
                    Gate::Concat(vec![Gate::named("Z"), Gate::named("X")]),
                    [QubitRef::new("q", 0)],
                )],
            })
            .unwrap();

        let text = generate(&module).unwrap();
        let x = text.find("push X q[0]").unwrap();
        let z = text.find("push Z q[0]").unwrap();
        assert!(x < z);
    }

    #[test]
    fn test_operations_precede_programs() {
        let mut module = bell_module();
        module
            .add_operation(ResolvedOperation {
                name: "Zz".to_string(),
                registers: vec![RegisterDecl::param("q", 1)],
                body: vec![],
            })
            .unwrap();

        let text = generate(&module).unwrap();
        let op = text.find("op Zz").unwrap();
        let prog = text.find("prog Bell").unwrap();
        assert!(op < prog);
    }

    #[test]
    fn test_deterministic_output() {
        let module = bell_module();
        assert_eq!(generate(&module).unwrap(), generate(&module).unwrap());
    }
}
