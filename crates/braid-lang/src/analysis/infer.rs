//! Inference sweep: register-size constraints and body checking.
//!
//! The sweep walks a body in execution order, expanding loops and
//! comprehensions with their folded iteration values so every index
//! expression is checked with concrete bindings. Registers with a
//! declared size are bounds-checked directly; registers with an
//! inferred size accumulate a minimum (one past the largest index
//! used) and at most one equality constraint imposed by a callee or a
//! gate span.

use rustc_hash::FxHashMap;

use crate::ast::{Comprehension, Expr, GateExpr, IndexSpec, Predicate, Stmt, StmtKind, TargetRef};
use crate::diag::{Diagnostic, SourcePos};

use super::resolve::{builtin_gate, eval_expr, resolve_ket, Binding, Env, EvalFailure, Value};
use super::{Analyzer, Symbol};

/// Size knowledge about one register during the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SizeState {
    Known(u32),
    Infer { min: u32, eq: Option<u32> },
}

/// One register visible in the body being scanned.
#[derive(Debug, Clone)]
pub(crate) struct RegSlot {
    pub name: String,
    pub borrowed: bool,
    pub is_param: bool,
    pub size: SizeState,
    /// The `?n` name bound to the resolved size, when declared.
    pub infer_name: Option<String>,
    pub pos: SourcePos,
}

impl RegSlot {
    /// Best current estimate of the size; exact once resolved.
    pub fn size_hint(&self) -> u32 {
        match self.size {
            SizeState::Known(n) => n,
            SizeState::Infer { min, eq } => eq.unwrap_or(min.max(1)),
        }
    }
}

/// Registers in declaration order with by-name lookup.
#[derive(Debug, Default)]
pub(crate) struct RegTable {
    slots: Vec<RegSlot>,
    by_name: FxHashMap<String, usize>,
}

impl RegTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a register; returns `false` if the name is taken.
    pub fn declare(&mut self, slot: RegSlot) -> bool {
        if self.by_name.contains_key(&slot.name) {
            return false;
        }
        self.by_name.insert(slot.name.clone(), self.slots.len());
        self.slots.push(slot);
        true
    }

    pub fn get(&self, name: &str) -> Option<&RegSlot> {
        self.by_name.get(name).map(|&i| &self.slots[i])
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut RegSlot> {
        self.by_name.get(name).map(|&i| &mut self.slots[i])
    }

    pub fn slots(&self) -> &[RegSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [RegSlot] {
        &mut self.slots
    }
}

/// State threaded through one inference sweep.
pub(crate) struct ScanCtx {
    pub env: Env,
    pub regs: RegTable,
    pub diags: Vec<Diagnostic>,
}

/// Shape of one resolved gate target.
struct TargetShape {
    /// The register name, `None` for ket literals.
    reg: Option<String>,
    /// Qubit count; `None` when it depends on an unresolved size.
    count: Option<u32>,
    /// Whole-register reference without an index, eligible for size
    /// unification.
    whole: bool,
    pos: SourcePos,
}

impl Analyzer<'_> {
    pub(crate) fn scan_stmts(&mut self, stmts: &[Stmt], ctx: &mut ScanCtx) {
        for stmt in stmts {
            self.scan_stmt(stmt, ctx);
        }
    }

    fn scan_block(&mut self, stmts: &[Stmt], ctx: &mut ScanCtx) {
        ctx.env.push_scope();
        self.scan_stmts(stmts, ctx);
        ctx.env.pop_scope();
    }

    fn scan_stmt(&mut self, stmt: &Stmt, ctx: &mut ScanCtx) {
        match &stmt.kind {
            StmtKind::GateApply {
                gates,
                targets,
                ctrl,
                comprehension,
            } => self.scan_gate_apply(gates, targets, ctrl.as_ref(), comprehension.as_ref(), ctx),
            StmtKind::Qif {
                predicate,
                then_body,
                else_body,
            } => {
                self.scan_predicate(predicate, ctx);
                self.scan_block(then_body, ctx);
                if let Some(body) = else_body {
                    self.scan_block(body, ctx);
                }
            }
            StmtKind::With { setup, body } => {
                self.scan_stmt(setup, ctx);
                self.scan_block(body, ctx);
            }
            StmtKind::For {
                variable,
                range,
                body,
            } => self.scan_loop(variable, range, body, ctx),
            StmtKind::Each {
                variable,
                source,
                body,
            } => self.scan_loop(variable, source, body, ctx),
            StmtKind::Let { name, value } => {
                let binding = match eval_expr(value, &ctx.env, self.externs()) {
                    Ok(v) => Binding::Value(v),
                    Err(EvalFailure::NotStatic { .. }) => Binding::Opaque,
                    Err(EvalFailure::Deferred) => Binding::Deferred,
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
                let size = match resolve_ket(init, stmt.pos, &ctx.env, self.externs()) {
                    Ok((_, width)) => SizeState::Known(width),
                    Err(failure) => {
                        if let Some((pos, message)) = failure.message() {
                            ctx.diags.push(self.error_at(pos, message));
                        }
                        // Placeholder so later uses resolve; the width is
                        // settled on the verification sweep.
                        SizeState::Infer { min: 0, eq: None }
                    }
                };
                let declared = ctx.regs.declare(RegSlot {
                    name: name.clone(),
                    borrowed: false,
                    is_param: false,
                    size,
                    infer_name: None,
                    pos: stmt.pos,
                });
                if !declared {
                    ctx.diags
                        .push(self.error_at(stmt.pos, format!("duplicate register '{name}'")));
                }
            }
            StmtKind::Measure { slice, target } => self.scan_measure(slice.as_ref(), target, ctx),
        }
    }

    fn scan_gate_apply(
        &mut self,
        gates: &[GateExpr],
        targets: &[TargetRef],
        ctrl: Option<&Predicate>,
        comprehension: Option<&Comprehension>,
        ctx: &mut ScanCtx,
    ) {
        if let Some(comp) = comprehension {
            let Some(items) = self.iteration_items(&comp.source, &ctx.env, &mut ctx.diags) else {
                return;
            };
            for item in items {
                ctx.env.push_scope();
                ctx.env
                    .bind(comp.variable.clone(), Binding::Value(Value::Int(item)));
                let before = ctx.diags.len();
                self.scan_apply_core(gates, targets, ctrl, ctx);
                ctx.env.pop_scope();
                // One faulty iteration is enough evidence.
                if ctx.diags.len() > before {
                    break;
                }
            }
        } else {
            self.scan_apply_core(gates, targets, ctrl, ctx);
        }
    }

    fn scan_apply_core(
        &mut self,
        gates: &[GateExpr],
        targets: &[TargetRef],
        ctrl: Option<&Predicate>,
        ctx: &mut ScanCtx,
    ) {
        if let Some(p) = ctrl {
            self.scan_predicate(p, ctx);
        }
        let mut shapes = Vec::with_capacity(targets.len());
        for t in targets {
            match self.target_shape(t, ctx) {
                Some(shape) => shapes.push(shape),
                None => return,
            }
        }
        for g in gates {
            self.scan_gate_term(g, &shapes, ctx);
        }
    }

    /// An operation invocation is a bare (possibly daggered) name that
    /// resolves to a declared operation.
    pub(super) fn as_operation_call<'b>(
        &self,
        g: &'b GateExpr,
    ) -> Option<(&'b str, &'b [Expr], SourcePos)> {
        match g {
            GateExpr::Named { name, args, pos }
                if matches!(self.symbol(name), Some(Symbol::Operation { .. })) =>
            {
                Some((name, args, *pos))
            }
            GateExpr::Dagger(inner) => self.as_operation_call(inner),
            _ => None,
        }
    }

    fn scan_gate_term(&mut self, g: &GateExpr, shapes: &[TargetShape], ctx: &mut ScanCtx) {
        if let Some((name, args, pos)) = self.as_operation_call(g) {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                match self.eval_in(a, &ctx.env, &mut ctx.diags) {
                    Some(v) => values.push((v, a.pos)),
                    None => return,
                }
            }
            let Ok(info) = self.resolve_operation_call(name, &values, pos, &mut ctx.diags) else {
                return;
            };
            if shapes.len() != info.sizes.len() {
                ctx.diags.push(self.error_at(
                    pos,
                    format!(
                        "operation '{name}' expects {} qubit arguments, found {}",
                        info.sizes.len(),
                        shapes.len()
                    ),
                ));
                return;
            }
            for (shape, &size) in shapes.iter().zip(&info.sizes) {
                if shape.whole {
                    if let Some(reg) = &shape.reg {
                        self.unify_size(ctx, reg, size, shape.pos);
                    }
                } else if let Some(count) = shape.count {
                    if count != size {
                        ctx.diags.push(self.error_at(
                            shape.pos,
                            format!("operation '{name}' requires {size} qubits here, found {count}"),
                        ));
                    }
                }
            }
            return;
        }

        let Ok(span) = self.builtin_span(g, ctx) else {
            return;
        };
        let mut known = 0u32;
        let mut unknown: Vec<&TargetShape> = Vec::new();
        for s in shapes {
            match s.count {
                Some(c) => known += c,
                None => unknown.push(s),
            }
        }
        let Some(span) = span else { return };
        if unknown.is_empty() {
            if known != span {
                ctx.diags.push(self.error_at(
                    g.pos(),
                    format!("gate spans {span} qubit(s) but targets provide {known}"),
                ));
            }
        } else if let [shape] = unknown.as_slice() {
            // A single whole reference to an unsized register takes
            // whatever the span leaves over.
            if shape.whole {
                if let Some(reg) = &shape.reg {
                    if span > known {
                        let reg = reg.clone();
                        self.unify_size(ctx, &reg, span - known, shape.pos);
                    } else {
                        ctx.diags.push(self.error_at(
                            g.pos(),
                            format!("gate spans {span} qubit(s) but targets provide more"),
                        ));
                    }
                }
            }
        }
    }

    /// Compute the qubit span of a builtin gate composition, reporting
    /// structural errors. `Ok(None)` means the span depends on a value
    /// that is not resolved yet.
    fn builtin_span(&mut self, g: &GateExpr, ctx: &mut ScanCtx) -> Result<Option<u32>, ()> {
        match g {
            GateExpr::Named { name, args, pos } => {
                let rejected = match self.symbol(name) {
                    Some(Symbol::Operation { .. }) => Some(format!(
                        "operation '{name}' cannot be combined with '@' or '.'"
                    )),
                    Some(Symbol::Program { .. }) => {
                        Some(format!("'{name}' is a program and cannot be applied as a gate"))
                    }
                    Some(Symbol::Extern(_)) => Some(format!(
                        "'{name}' is a classical function and cannot be applied as a gate"
                    )),
                    None => None,
                };
                if let Some(message) = rejected {
                    ctx.diags.push(self.error_at(*pos, message));
                    return Err(());
                }
                let Some(sig) = builtin_gate(name) else {
                    ctx.diags
                        .push(self.error_at(*pos, format!("undefined symbol '{name}'")));
                    return Err(());
                };
                if args.len() != sig.args {
                    ctx.diags.push(self.error_at(
                        *pos,
                        format!(
                            "gate '{name}' expects {} argument(s), found {}",
                            sig.args,
                            args.len()
                        ),
                    ));
                    return Err(());
                }
                for a in args {
                    if let Some(v) = self.eval_in(a, &ctx.env, &mut ctx.diags) {
                        if v.as_f64().is_none() {
                            ctx.diags.push(self.error_at(
                                a.pos,
                                format!("gate argument must be numeric, found {}", v.type_name()),
                            ));
                        }
                    }
                }
                Ok(Some(sig.qubits))
            }
            GateExpr::Dagger(inner) => self.builtin_span(inner, ctx),
            GateExpr::TensorPower { base, exponent } => {
                let base_span = self.builtin_span(base, ctx)?;
                let Some(v) = self.eval_in(exponent, &ctx.env, &mut ctx.diags) else {
                    return Ok(None);
                };
                let Some(count) = v
                    .as_int()
                    .and_then(|v| u32::try_from(v).ok())
                    .filter(|&v| v >= 1)
                else {
                    ctx.diags.push(self.error_at(
                        exponent.pos,
                        "tensor power exponent must be a positive Int",
                    ));
                    return Err(());
                };
                match base_span {
                    Some(b) => match b.checked_mul(count) {
                        Some(span) => Ok(Some(span)),
                        None => {
                            ctx.diags
                                .push(self.error_at(exponent.pos, "tensor power is too large"));
                            Err(())
                        }
                    },
                    None => Ok(None),
                }
            }
            GateExpr::Concat(parts) => {
                let mut spans = Vec::with_capacity(parts.len());
                for p in parts {
                    spans.push(self.builtin_span(p, ctx)?);
                }
                let mut known = spans.into_iter().flatten();
                let Some(first) = known.next() else {
                    return Ok(None);
                };
                for s in known {
                    if s != first {
                        ctx.diags.push(self.error_at(
                            g.pos(),
                            "gate terms joined with '.' must span the same number of qubits",
                        ));
                        return Err(());
                    }
                }
                Ok(Some(first))
            }
        }
    }

    fn target_shape(&mut self, t: &TargetRef, ctx: &mut ScanCtx) -> Option<TargetShape> {
        match t {
            TargetRef::Register { name, index, pos } => {
                let Some(slot) = ctx.regs.get(name) else {
                    ctx.diags
                        .push(self.error_at(*pos, format!("undefined register '{name}'")));
                    return None;
                };
                let size_known = match slot.size {
                    SizeState::Known(n) => Some(n),
                    SizeState::Infer { .. } => None,
                };
                match index {
                    None => Some(TargetShape {
                        reg: Some(name.clone()),
                        count: size_known,
                        whole: true,
                        pos: *pos,
                    }),
                    Some(spec) => {
                        let count = self.scan_index_spec(name, spec, ctx);
                        Some(TargetShape {
                            reg: Some(name.clone()),
                            count,
                            whole: false,
                            pos: *pos,
                        })
                    }
                }
            }
            TargetRef::Ket { lit, pos } => match resolve_ket(lit, *pos, &ctx.env, self.externs()) {
                Ok((_, width)) => Some(TargetShape {
                    reg: None,
                    count: Some(width),
                    whole: false,
                    pos: *pos,
                }),
                Err(failure) => {
                    if let Some((p, m)) = failure.message() {
                        ctx.diags.push(self.error_at(p, m));
                        return None;
                    }
                    Some(TargetShape {
                        reg: None,
                        count: None,
                        whole: false,
                        pos: *pos,
                    })
                }
            },
        }
    }

    /// Check an index spec against a register and return the number of
    /// qubits it selects, or `None` if that is not resolvable yet.
    fn scan_index_spec(
        &mut self,
        reg: &str,
        spec: &IndexSpec,
        ctx: &mut ScanCtx,
    ) -> Option<u32> {
        match spec {
            IndexSpec::Single(e) => {
                if let Some(i) = self.eval_index(e, &ctx.env, &mut ctx.diags) {
                    self.constrain_min(ctx, reg, i.saturating_add(1), e.pos);
                }
                Some(1)
            }
            IndexSpec::Multi(list) => {
                for e in list {
                    if let Some(i) = self.eval_index(e, &ctx.env, &mut ctx.diags) {
                        self.constrain_min(ctx, reg, i.saturating_add(1), e.pos);
                    }
                }
                u32::try_from(list.len()).ok()
            }
            IndexSpec::Range {
                start,
                end,
                inclusive,
            } => {
                let a = self.eval_index(start, &ctx.env, &mut ctx.diags);
                let b = self.eval_index(end, &ctx.env, &mut ctx.diags);
                let (Some(a), Some(b)) = (a, b) else {
                    return None;
                };
                let Some(end_excl) = b.checked_add(u32::from(*inclusive)) else {
                    ctx.diags.push(self.error_at(end.pos, "integer overflow"));
                    return None;
                };
                if end_excl <= a {
                    ctx.diags
                        .push(self.error_at(start.pos, "slice is empty or reversed"));
                    return None;
                }
                self.constrain_min(ctx, reg, end_excl, start.pos);
                Some(end_excl - a)
            }
        }
    }

    pub(super) fn eval_index(
        &mut self,
        e: &Expr,
        env: &Env,
        sink: &mut Vec<Diagnostic>,
    ) -> Option<u32> {
        let v = self.eval_in(e, env, sink)?;
        match v.as_int() {
            Some(i) if i >= 0 => match u32::try_from(i) {
                Ok(i) => Some(i),
                Err(_) => {
                    sink.push(self.error_at(e.pos, format!("register index {i} is too large")));
                    None
                }
            },
            Some(i) => {
                sink.push(
                    self.error_at(e.pos, format!("register index must be non-negative, got {i}")),
                );
                None
            }
            None => {
                sink.push(self.error_at(
                    e.pos,
                    format!("register index must be Int, found {}", v.type_name()),
                ));
                None
            }
        }
    }

    /// Record that `reg` needs at least `needed` qubits.
    fn constrain_min(&mut self, ctx: &mut ScanCtx, reg: &str, needed: u32, pos: SourcePos) {
        let mut out_of_range = None;
        if let Some(slot) = ctx.regs.get_mut(reg) {
            match &mut slot.size {
                SizeState::Known(k) => {
                    if needed > *k {
                        out_of_range = Some(*k);
                    }
                }
                SizeState::Infer { min, .. } => *min = (*min).max(needed),
            }
        }
        if let Some(k) = out_of_range {
            ctx.diags.push(self.error_at(
                pos,
                format!(
                    "index {} is out of range for register '{reg}' of size {k}",
                    needed - 1
                ),
            ));
        }
    }

    /// Record that `reg` must have exactly `size` qubits.
    fn unify_size(&mut self, ctx: &mut ScanCtx, reg: &str, size: u32, pos: SourcePos) {
        enum Outcome {
            Ok,
            KnownMismatch(u32),
            EqMismatch(u32),
        }
        let mut outcome = Outcome::Ok;
        if let Some(slot) = ctx.regs.get_mut(reg) {
            match &mut slot.size {
                SizeState::Known(k) => {
                    if *k != size {
                        outcome = Outcome::KnownMismatch(*k);
                    }
                }
                SizeState::Infer { eq, .. } => match eq {
                    Some(e) if *e != size => outcome = Outcome::EqMismatch(*e),
                    _ => *eq = Some(size),
                },
            }
        }
        match outcome {
            Outcome::Ok => {}
            Outcome::KnownMismatch(k) => ctx.diags.push(self.error_at(
                pos,
                format!("register '{reg}' has size {k} but {size} qubits are required here"),
            )),
            Outcome::EqMismatch(e) => ctx.diags.push(self.error_at(
                pos,
                format!(
                    "incompatible size for register '{reg}': both {e} and {size} qubits are required"
                ),
            )),
        }
    }

    fn scan_predicate(&mut self, p: &Predicate, ctx: &mut ScanCtx) {
        match p {
            Predicate::Basis {
                register,
                index,
                pos,
            } => {
                if ctx.regs.get(register).is_none() {
                    ctx.diags
                        .push(self.error_at(*pos, format!("undefined register '{register}'")));
                    return;
                }
                if let Some(spec) = index {
                    self.scan_index_spec(register, spec, ctx);
                }
            }
            Predicate::Not(inner) => self.scan_predicate(inner, ctx),
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                self.scan_predicate(l, ctx);
                self.scan_predicate(r, ctx);
            }
        }
    }

    fn scan_measure(
        &mut self,
        slice: Option<&IndexSpec>,
        target: &TargetRef,
        ctx: &mut ScanCtx,
    ) {
        match target {
            TargetRef::Ket { pos, .. } => {
                ctx.diags
                    .push(self.error_at(*pos, "measure target must be a register"));
            }
            TargetRef::Register { name, index, pos } => {
                let Some(slot) = ctx.regs.get(name) else {
                    ctx.diags
                        .push(self.error_at(*pos, format!("undefined register '{name}'")));
                    return;
                };
                if slot.borrowed {
                    let d = Diagnostic::warning(
                        self.path(),
                        *pos,
                        format!("measuring borrowed register '{name}'"),
                    );
                    ctx.diags.push(d);
                }
                if index.is_some() && slice.is_some() {
                    ctx.diags.push(self.error_at(
                        *pos,
                        "measure has both a slice and an indexed target",
                    ));
                    return;
                }
                if let Some(spec) = index.as_ref().or(slice) {
                    self.scan_index_spec(name, spec, ctx);
                }
            }
        }
    }

    /// Fold a loop or comprehension source into its iteration values.
    /// Bits iterate least-significant bit first, each bit as 0 or 1.
    pub(crate) fn iteration_items(
        &mut self,
        source: &Expr,
        env: &Env,
        sink: &mut Vec<Diagnostic>,
    ) -> Option<Vec<i64>> {
        let v = self.eval_in(source, env, sink)?;
        match v {
            Value::List(items) => Some(items),
            Value::Bits(bits) => Some(bits.iter().map(|&b| i64::from(b)).collect()),
            other => {
                sink.push(self.error_at(
                    source.pos,
                    format!(
                        "loop source must be a range, [Int], or Bits, found {}",
                        other.type_name()
                    ),
                ));
                None
            }
        }
    }

    fn scan_loop(&mut self, variable: &str, source: &Expr, body: &[Stmt], ctx: &mut ScanCtx) {
        let Some(items) = self.iteration_items(source, &ctx.env, &mut ctx.diags) else {
            return;
        };
        for item in items {
            ctx.env.push_scope();
            ctx.env
                .bind(variable.to_string(), Binding::Value(Value::Int(item)));
            let before = ctx.diags.len();
            self.scan_stmts(body, ctx);
            ctx.env.pop_scope();
            if ctx.diags.len() > before {
                break;
            }
        }
    }
}
