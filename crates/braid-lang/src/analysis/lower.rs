//! Lowering: emit the flat instruction sequence.
//!
//! Runs only on bodies that passed inference, so sizes are final and
//! every constant folds. Loops and comprehensions are expanded, `qif`
//! and `ctrl` predicates become control sets attached to each emitted
//! gate, and `with` blocks append the inverted setup after the body.
//! Gate terms in one statement each emit one instruction, in textual
//! left-to-right order.

use rustc_hash::FxHashMap;

use braid_ir::{ControlRef, Gate, Instruction, QubitRef, RegisterDecl};

use crate::ast::{
    Comprehension, Expr, GateExpr, IndexSpec, Predicate, Stmt, StmtKind, TargetRef,
};
use crate::diag::{Diagnostic, SourcePos};

use super::resolve::{builtin_gate, eval_expr, resolve_ket, Binding, Env, EvalFailure, Value};
use super::Analyzer;

/// State threaded through the lowering of one body.
pub(crate) struct LowerCtx {
    pub env: Env,
    /// Final size of every register in scope.
    pub sizes: FxHashMap<String, u32>,
    /// Parameter registers followed by locals in allocation order.
    pub registers: Vec<RegisterDecl>,
    /// Controls imposed by the enclosing `qif` nest.
    pub controls: Vec<ControlRef>,
    pub instrs: Vec<Instruction>,
    pub diags: Vec<Diagnostic>,
    /// Counter for anonymous ket-target registers.
    pub anon: u32,
}

/// An NNF predicate literal before expansion to control qubits.
type PredLiteral<'b> = (String, Option<&'b IndexSpec>, bool, SourcePos);

impl Analyzer<'_> {
    pub(crate) fn lower_stmts(&mut self, stmts: &[Stmt], ctx: &mut LowerCtx) {
        for stmt in stmts {
            self.lower_stmt(stmt, ctx);
        }
    }

    fn lower_block(&mut self, stmts: &[Stmt], ctx: &mut LowerCtx) {
        ctx.env.push_scope();
        self.lower_stmts(stmts, ctx);
        ctx.env.pop_scope();
    }

    fn lower_stmt(&mut self, stmt: &Stmt, ctx: &mut LowerCtx) {
        match &stmt.kind {
            StmtKind::GateApply {
                gates,
                targets,
                ctrl,
                comprehension,
            } => self.lower_gate_apply(gates, targets, ctrl.as_ref(), comprehension.as_ref(), ctx),
            StmtKind::Qif {
                predicate,
                then_body,
                else_body,
            } => {
                let depth = ctx.controls.len();
                let Some(controls) = self.predicate_controls(predicate, ctx) else {
                    return;
                };
                ctx.controls.extend(controls);
                self.lower_block(then_body, ctx);
                ctx.controls.truncate(depth);
                if let Some(body) = else_body {
                    // The complement predicate controls the else arm; a
                    // complement that is not a pure conjunction is
                    // rejected like any other disjunction.
                    let complement = Predicate::Not(Box::new(predicate.clone()));
                    let Some(controls) = self.predicate_controls(&complement, ctx) else {
                        return;
                    };
                    ctx.controls.extend(controls);
                    self.lower_block(body, ctx);
                    ctx.controls.truncate(depth);
                }
            }
            StmtKind::With { setup, body } => {
                let start = ctx.instrs.len();
                self.lower_stmt(setup, ctx);
                let setup_instrs: Vec<Instruction> = ctx.instrs[start..].to_vec();
                self.lower_block(body, ctx);
                for instr in setup_instrs.iter().rev() {
                    match instr.inverse() {
                        Some(inv) => ctx.instrs.push(inv),
                        None => {
                            ctx.diags
                                .push(self.error_at(stmt.pos, "with-setup must be invertible"));
                            return;
                        }
                    }
                }
            }
            StmtKind::For {
                variable,
                range,
                body,
            } => self.lower_loop(variable, range, body, ctx),
            StmtKind::Each {
                variable,
                source,
                body,
            } => self.lower_loop(variable, source, body, ctx),
            StmtKind::Let { name, value } => {
                let binding = match eval_expr(value, &ctx.env, self.externs()) {
                    Ok(v) => Binding::Value(v),
                    Err(EvalFailure::NotStatic { .. }) => Binding::Opaque,
                    Err(failure) => {
                        if let Some((pos, message)) = failure.message() {
                            ctx.diags.push(self.error_at(pos, message));
                        }
                        Binding::Opaque
                    }
                };
                ctx.env.bind(name.clone(), binding);
            }
            StmtKind::LetQuantum { name, init } => {
                let (value, width) = match resolve_ket(init, stmt.pos, &ctx.env, self.externs()) {
                    Ok(v) => v,
                    Err(failure) => {
                        if let Some((pos, message)) = failure.message() {
                            ctx.diags.push(self.error_at(pos, message));
                        }
                        return;
                    }
                };
                if ctx.sizes.contains_key(name) {
                    ctx.diags
                        .push(self.error_at(stmt.pos, format!("duplicate register '{name}'")));
                    return;
                }
                ctx.sizes.insert(name.clone(), width);
                ctx.registers
                    .push(RegisterDecl::local(name.clone(), width, value));
            }
            StmtKind::Measure { slice, target } => {
                self.lower_measure(stmt.pos, slice.as_ref(), target, ctx);
            }
        }
    }

    fn lower_loop(&mut self, variable: &str, source: &Expr, body: &[Stmt], ctx: &mut LowerCtx) {
        let Some(items) = self.iteration_items(source, &ctx.env, &mut ctx.diags) else {
            return;
        };
        for item in items {
            ctx.env.push_scope();
            ctx.env.bind(
                variable.to_string(),
                Binding::Value(Value::Int(item)),
            );
            let before = ctx.diags.len();
            self.lower_stmts(body, ctx);
            ctx.env.pop_scope();
            if ctx.diags.len() > before {
                break;
            }
        }
    }

    fn lower_gate_apply(
        &mut self,
        gates: &[GateExpr],
        targets: &[TargetRef],
        ctrl: Option<&Predicate>,
        comprehension: Option<&Comprehension>,
        ctx: &mut LowerCtx,
    ) {
        if let Some(comp) = comprehension {
            let Some(items) = self.iteration_items(&comp.source, &ctx.env, &mut ctx.diags) else {
                return;
            };
            for item in items {
                ctx.env.push_scope();
                ctx.env.bind(
                    comp.variable.clone(),
                    Binding::Value(Value::Int(item)),
                );
                let before = ctx.diags.len();
                self.lower_apply_core(gates, targets, ctrl, ctx);
                ctx.env.pop_scope();
                if ctx.diags.len() > before {
                    break;
                }
            }
        } else {
            self.lower_apply_core(gates, targets, ctrl, ctx);
        }
    }

    fn lower_apply_core(
        &mut self,
        gates: &[GateExpr],
        targets: &[TargetRef],
        ctrl: Option<&Predicate>,
        ctx: &mut LowerCtx,
    ) {
        let depth = ctx.controls.len();
        if let Some(p) = ctrl {
            let Some(controls) = self.predicate_controls(p, ctx) else {
                return;
            };
            ctx.controls.extend(controls);
        }

        let mut qubits: Vec<QubitRef> = Vec::new();
        for t in targets {
            match self.target_qubits(t, ctx) {
                Some(list) => qubits.extend(list),
                None => {
                    ctx.controls.truncate(depth);
                    return;
                }
            }
        }
        for (i, q) in qubits.iter().enumerate() {
            if qubits[..i].contains(q) {
                ctx.diags.push(self.error_at(
                    targets.first().map_or(SourcePos::none(), TargetRef::pos),
                    format!("gate targets repeat qubit '{q}'"),
                ));
                ctx.controls.truncate(depth);
                return;
            }
        }

        for g in gates {
            let Some(gate) = self.lower_gate_term(g, ctx) else {
                break;
            };
            let gate = gate.controlled(ctx.controls.clone());
            ctx.instrs
                .push(Instruction::gate(gate, qubits.iter().cloned()));
        }
        ctx.controls.truncate(depth);
    }

    fn lower_gate_term(&mut self, g: &GateExpr, ctx: &mut LowerCtx) -> Option<Gate> {
        if let Some((name, args, pos)) = self.as_operation_call(g) {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push((self.eval_in(a, &ctx.env, &mut ctx.diags)?, a.pos));
            }
            let info = self
                .resolve_operation_call(name, &values, pos, &mut ctx.diags)
                .ok()?;
            let gate = Gate::named(info.emitted);
            return Some(if dagger_parity(g) { gate.dagger() } else { gate });
        }
        self.build_gate(g, ctx)
    }

    fn build_gate(&mut self, g: &GateExpr, ctx: &mut LowerCtx) -> Option<Gate> {
        match g {
            GateExpr::Named { name, args, pos } => {
                if builtin_gate(name).is_none() {
                    ctx.diags
                        .push(self.error_at(*pos, format!("undefined symbol '{name}'")));
                    return None;
                }
                if args.is_empty() {
                    return Some(Gate::named(name.clone()));
                }
                let mut folded = Vec::with_capacity(args.len());
                for a in args {
                    let v = self.eval_in(a, &ctx.env, &mut ctx.diags)?;
                    match v.as_f64() {
                        Some(f) => folded.push(f),
                        None => {
                            ctx.diags.push(self.error_at(
                                a.pos,
                                format!("gate argument must be numeric, found {}", v.type_name()),
                            ));
                            return None;
                        }
                    }
                }
                Some(Gate::parametrized(name.clone(), folded))
            }
            GateExpr::Dagger(inner) => Some(self.build_gate(inner, ctx)?.dagger()),
            GateExpr::TensorPower { base, exponent } => {
                let base = self.build_gate(base, ctx)?;
                let v = self.eval_in(exponent, &ctx.env, &mut ctx.diags)?;
                let Some(count) = v
                    .as_int()
                    .and_then(|v| u32::try_from(v).ok())
                    .filter(|&v| v >= 1)
                else {
                    ctx.diags.push(self.error_at(
                        exponent.pos,
                        "tensor power exponent must be a positive Int",
                    ));
                    return None;
                };
                Some(base.tensor_power(count))
            }
            GateExpr::Concat(parts) => {
                let mut lowered = Vec::with_capacity(parts.len());
                for p in parts {
                    lowered.push(self.build_gate(p, ctx)?);
                }
                Some(Gate::Concat(lowered))
            }
        }
    }

    fn target_qubits(&mut self, t: &TargetRef, ctx: &mut LowerCtx) -> Option<Vec<QubitRef>> {
        match t {
            TargetRef::Register { name, index, pos } => {
                let Some(&size) = ctx.sizes.get(name) else {
                    ctx.diags
                        .push(self.error_at(*pos, format!("undefined register '{name}'")));
                    return None;
                };
                let indices = match index {
                    None => (0..size).collect(),
                    Some(spec) => self.index_list(name, size, spec, ctx)?,
                };
                Some(
                    indices
                        .into_iter()
                        .map(|i| QubitRef::new(name.clone(), i))
                        .collect(),
                )
            }
            TargetRef::Ket { lit, pos } => {
                let (value, width) = match resolve_ket(lit, *pos, &ctx.env, self.externs()) {
                    Ok(v) => v,
                    Err(failure) => {
                        if let Some((p, m)) = failure.message() {
                            ctx.diags.push(self.error_at(p, m));
                        }
                        return None;
                    }
                };
                let name = format!("k{}", ctx.anon);
                ctx.anon += 1;
                ctx.sizes.insert(name.clone(), width);
                ctx.registers
                    .push(RegisterDecl::local(name.clone(), width, value));
                Some((0..width).map(|i| QubitRef::new(name.clone(), i)).collect())
            }
        }
    }

    /// Expand an index spec to concrete qubit indices, bounds-checked.
    fn index_list(
        &mut self,
        reg: &str,
        size: u32,
        spec: &IndexSpec,
        ctx: &mut LowerCtx,
    ) -> Option<Vec<u32>> {
        match spec {
            IndexSpec::Single(e) => Some(vec![self.lower_index(e, reg, size, ctx)?]),
            IndexSpec::Multi(list) => list
                .iter()
                .map(|e| self.lower_index(e, reg, size, ctx))
                .collect(),
            IndexSpec::Range {
                start,
                end,
                inclusive,
            } => {
                let a = self.eval_index(start, &ctx.env, &mut ctx.diags)?;
                let b = self.eval_index(end, &ctx.env, &mut ctx.diags)?;
                let end_excl = b.checked_add(u32::from(*inclusive))?;
                if end_excl <= a {
                    ctx.diags
                        .push(self.error_at(start.pos, "slice is empty or reversed"));
                    return None;
                }
                if end_excl > size {
                    ctx.diags.push(self.error_at(
                        end.pos,
                        format!(
                            "index {} is out of range for register '{reg}' of size {size}",
                            end_excl - 1
                        ),
                    ));
                    return None;
                }
                Some((a..end_excl).collect())
            }
        }
    }

    fn lower_index(
        &mut self,
        e: &Expr,
        reg: &str,
        size: u32,
        ctx: &mut LowerCtx,
    ) -> Option<u32> {
        let i = self.eval_index(e, &ctx.env, &mut ctx.diags)?;
        if i >= size {
            ctx.diags.push(self.error_at(
                e.pos,
                format!("index {i} is out of range for register '{reg}' of size {size}"),
            ));
            return None;
        }
        Some(i)
    }

    /// Lower a predicate to a control set.
    ///
    /// The predicate is normalized to negation normal form; a pure
    /// conjunction of basis literals becomes one control per referenced
    /// qubit, anything with a surviving disjunction is rejected.
    fn predicate_controls(
        &mut self,
        p: &Predicate,
        ctx: &mut LowerCtx,
    ) -> Option<Vec<ControlRef>> {
        let mut literals = Vec::new();
        if !self.collect_literals(p, false, &mut literals, ctx) {
            return None;
        }
        let mut controls = Vec::new();
        for (register, index, negated, pos) in literals {
            let Some(&size) = ctx.sizes.get(&register) else {
                ctx.diags
                    .push(self.error_at(pos, format!("undefined register '{register}'")));
                return None;
            };
            let indices = match index {
                None => (0..size).collect(),
                Some(spec) => self.index_list(&register, size, spec, ctx)?,
            };
            // `not` over a multi-qubit reference would mean "not all
            // ones", a disjunction over its qubits.
            if negated && indices.len() > 1 {
                ctx.diags.push(
                    self.error_at(pos, "cannot negate a multi-qubit basis reference"),
                );
                return None;
            }
            for i in indices {
                let qubit = QubitRef::new(register.clone(), i);
                controls.push(if negated {
                    ControlRef::negative(qubit)
                } else {
                    ControlRef::positive(qubit)
                });
            }
        }
        Some(controls)
    }

    fn collect_literals<'b>(
        &mut self,
        p: &'b Predicate,
        negate: bool,
        out: &mut Vec<PredLiteral<'b>>,
        ctx: &mut LowerCtx,
    ) -> bool {
        match p {
            Predicate::Basis {
                register,
                index,
                pos,
            } => {
                out.push((register.clone(), index.as_ref(), negate, *pos));
                true
            }
            Predicate::Not(inner) => self.collect_literals(inner, !negate, out, ctx),
            Predicate::And(l, r) => {
                if negate {
                    ctx.diags.push(self.error_at(
                        p.pos(),
                        "predicate is a disjunction and cannot be lowered to a control set",
                    ));
                    false
                } else {
                    self.collect_literals(l, negate, out, ctx)
                        && self.collect_literals(r, negate, out, ctx)
                }
            }
            Predicate::Or(l, r) => {
                if negate {
                    self.collect_literals(l, negate, out, ctx)
                        && self.collect_literals(r, negate, out, ctx)
                } else {
                    ctx.diags.push(self.error_at(
                        p.pos(),
                        "predicate is a disjunction and cannot be lowered to a control set",
                    ));
                    false
                }
            }
        }
    }

    fn lower_measure(
        &mut self,
        pos: SourcePos,
        slice: Option<&IndexSpec>,
        target: &TargetRef,
        ctx: &mut LowerCtx,
    ) {
        if !ctx.controls.is_empty() {
            ctx.diags.push(
                self.error_at(pos, "measurement cannot appear under a qif predicate"),
            );
            return;
        }
        let TargetRef::Register {
            name,
            index,
            pos: tpos,
        } = target
        else {
            ctx.diags
                .push(self.error_at(target.pos(), "measure target must be a register"));
            return;
        };
        let Some(&size) = ctx.sizes.get(name) else {
            ctx.diags
                .push(self.error_at(*tpos, format!("undefined register '{name}'")));
            return;
        };
        let indices = match index.as_ref().or(slice) {
            None => (0..size).collect(),
            Some(spec) => match self.index_list(name, size, spec, ctx) {
                Some(list) => list,
                None => return,
            },
        };
        let qubits = indices.into_iter().map(|i| QubitRef::new(name.clone(), i));
        ctx.instrs.push(Instruction::measure(qubits));
    }
}

fn dagger_parity(g: &GateExpr) -> bool {
    match g {
        GateExpr::Dagger(inner) => !dagger_parity(inner),
        _ => false,
    }
}
