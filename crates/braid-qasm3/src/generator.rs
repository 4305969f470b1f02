//! OpenQASM 3 generator.

use std::mem;

use braid_ir::{
    CodeGenerator, Gate, Instruction, IrError, IrResult, Module, QubitRef, RegisterDecl,
    ResolvedOperation, ResolvedProgram,
};

/// Extension used for OpenQASM 3 artifacts.
pub const FILE_EXTENSION: &str = "qasm";

/// Render a module as OpenQASM 3 source.
pub fn generate(module: &Module) -> IrResult<String> {
    let mut generator = Qasm3Generator::new();
    module.dump_code(&mut generator)
}

/// Code generator targeting OpenQASM 3.
///
/// Operations and programs both become `def` subroutines, with parameter
/// registers passed as `qubit[n]` arguments and locals declared in the
/// body (`x` gates prepare a nonzero basis state). Structured gates map
/// onto gate modifiers: a control set becomes a `ctrl @` / `negctrl @`
/// chain with the control qubits prepended to the operand list, and
/// inversion distributes down to `inv @` on each primitive call.
/// Specialization names carry a `$`, which QASM identifiers do not
/// allow, so it is rewritten to `_`.
pub struct Qasm3Generator {
    output: String,
    indent: usize,
}

impl Qasm3Generator {
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

    fn emit_def(&mut self, registers: &[RegisterDecl], body: &[Instruction]) -> IrResult<()> {
        self.indent += 1;
        for reg in registers.iter().filter(|r| !r.is_param) {
            self.emit_local(reg);
        }
        for instr in body {
            self.emit_instruction(instr)?;
        }
        self.indent -= 1;
        self.writeln("}");
        self.writeln("");
        Ok(())
    }

    fn emit_local(&mut self, reg: &RegisterDecl) {
        self.writeln(&format!("qubit[{}] {};", reg.size, reg.name));
        if let Some(init) = reg.init {
            // Basis-state preparation, least significant bit at index 0.
            for i in 0..reg.size {
                if init >> i & 1 == 1 {
                    self.writeln(&format!("x {}[{i}];", reg.name));
                }
            }
        }
    }

    fn emit_instruction(&mut self, instr: &Instruction) -> IrResult<()> {
        match instr {
            Instruction::Gate { gate, targets } => self.emit_gate(gate, targets, false, "", ""),
            Instruction::Measure { targets } => {
                for target in targets {
                    self.writeln(&format!("measure {target};"));
                }
                Ok(())
            }
        }
    }

    /// Emit one gate term. `mods` and `controls` carry the modifier
    /// chain and its control operands accumulated from enclosing
    /// `Controlled` layers; `inverted` tracks an odd number of
    /// enclosing daggers.
    fn emit_gate(
        &mut self,
        gate: &Gate,
        targets: &[QubitRef],
        inverted: bool,
        mods: &str,
        controls: &str,
    ) -> IrResult<()> {
        match gate {
            Gate::Named(name) => {
                let inv = if inverted { "inv @ " } else { "" };
                self.writeln(&format!(
                    "{mods}{inv}{} {controls}{};",
                    gate_name(name),
                    qubit_list(targets)
                ));
                Ok(())
            }
            Gate::Parametrized(name, args) => {
                let inv = if inverted { "inv @ " } else { "" };
                let args = args
                    .iter()
                    .copied()
                    .map(format_angle)
                    .collect::<Vec<_>>()
                    .join(", ");
                self.writeln(&format!(
                    "{mods}{inv}{}({args}) {controls}{};",
                    gate_name(name),
                    qubit_list(targets)
                ));
                Ok(())
            }
            Gate::Dagger(inner) => self.emit_gate(inner, targets, !inverted, mods, controls),
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
                    self.emit_gate(base, chunk, inverted, mods, controls)?;
                }
                Ok(())
            }
            // Composition applies right to left; inverting the product
            // reverses that order and inverts every part.
            Gate::Concat(parts) => {
                if inverted {
                    for part in parts {
                        self.emit_gate(part, targets, true, mods, controls)?;
                    }
                } else {
                    for part in parts.iter().rev() {
                        self.emit_gate(part, targets, false, mods, controls)?;
                    }
                }
                Ok(())
            }
            Gate::Controlled(base, ctrls) => {
                let mut mods = mods.to_string();
                let mut controls = controls.to_string();
                for c in ctrls {
                    mods.push_str(if c.negated { "negctrl @ " } else { "ctrl @ " });
                    controls.push_str(&format!("{}, ", c.qubit));
                }
                self.emit_gate(base, targets, inverted, &mods, &controls)
            }
        }
    }
}

impl Default for Qasm3Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for Qasm3Generator {
    fn begin_module(&mut self) -> IrResult<()> {
        self.output.clear();
        self.indent = 0;
        self.writeln("OPENQASM 3.0;");
        self.writeln("");
        Ok(())
    }

    fn operation(&mut self, op: &ResolvedOperation) -> IrResult<()> {
        let params = op
            .registers
            .iter()
            .filter(|r| r.is_param)
            .map(|r| format!("qubit[{}] {}", r.size, r.name))
            .collect::<Vec<_>>()
            .join(", ");
        self.writeln(&format!("def {}({params}) {{", def_name(&op.name)));
        self.emit_def(&op.registers, &op.body)
    }

    fn program(&mut self, prog: &ResolvedProgram) -> IrResult<()> {
        self.writeln(&format!("// program {}, shots {}", prog.name, prog.shots));
        self.writeln(&format!("def {}() {{", def_name(&prog.name)));
        self.emit_def(&prog.registers, &prog.body)
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

fn def_name(name: &str) -> String {
    name.replace('$', "_")
}

/// Map a builtin gate name to its QASM spelling; user-defined operation
/// calls keep their (sanitized) name.
fn gate_name(name: &str) -> String {
    match name {
        "I" => "id",
        "H" => "h",
        "X" => "x",
        "Y" => "y",
        "Z" => "z",
        "S" => "s",
        "Sdg" => "sdg",
        "T" => "t",
        "Tdg" => "tdg",
        "Ph" => "p",
        "Rx" => "rx",
        "Ry" => "ry",
        "Rz" => "rz",
        "CNOT" => "cx",
        "CZ" => "cz",
        "SWAP" => "swap",
        "CCNOT" => "ccx",
        "CSWAP" => "cswap",
        other => return def_name(other),
    }
    .to_string()
}

/// Render an angle, preferring exact pi fractions over decimals.
fn format_angle(v: f64) -> String {
    let pi = std::f64::consts::PI;
    if (v - pi).abs() < 1e-10 {
        "pi".into()
    } else if (v - pi / 2.0).abs() < 1e-10 {
        "pi/2".into()
    } else if (v - pi / 4.0).abs() < 1e-10 {
        "pi/4".into()
    } else if (v + pi / 2.0).abs() < 1e-10 {
        "-pi/2".into()
    } else if (v + pi / 4.0).abs() < 1e-10 {
        "-pi/4".into()
    } else {
        format!("{v:.6}")
    }
}
