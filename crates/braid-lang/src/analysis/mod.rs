//! Semantic analysis: resolution, size inference, and lowering.
//!
//! Declarations are processed in source order. Operations without
//! classical parameters are analyzed standalone; operations with
//! classical parameters are specialized at each call site once the
//! argument values are folded, so every size expression and loop bound
//! inside the body sees concrete constants. A specialization is named
//! `Base$arg1$arg2` and analyzed at most once per distinct argument
//! tuple.
//!
//! Each operation body is analyzed in two phases. The inference phase
//! walks the body collecting register-size constraints (largest index
//! used, sizes required by callees) and reporting resolution and type
//! errors. Bodies that declare an inferred size (`?` or `?n`) are
//! walked a second time after resolution so constraints that depended
//! on the resolved size are verified against it. The lowering phase
//! runs only when inference produced no errors and emits the flat
//! [`Instruction`](braid_ir::Instruction) sequence.

pub(crate) mod infer;
pub(crate) mod lower;
pub mod resolve;

use rustc_hash::FxHashMap;

use braid_ir::{Module, RegisterDecl, ResolvedOperation, ResolvedProgram};

use crate::ast::{ClassicalType, Decl, Expr, OperationDecl, ParamDecl, ProgramDecl, SizeSpec, Unit};
use crate::diag::{Diagnostic, SourcePos};

use infer::{RegSlot, RegTable, ScanCtx, SizeState};
use lower::LowerCtx;
use resolve::{builtin_gate, eval_expr, Binding, Env, ExternSig, Value};

/// Specialization chains deeper than this are rejected; a well-formed
/// source never gets close, and the cap keeps mutually recursive
/// specializations from unrolling without bound.
const MAX_CALL_DEPTH: usize = 64;

/// Analyze a parsed unit into a lowered module.
///
/// Diagnostics are appended in declaration order; when any of them is
/// an error the module may be missing the declarations that failed.
pub fn analyze(unit: &Unit, path: &str) -> (Module, Vec<Diagnostic>) {
    let mut analyzer = Analyzer::new(&unit.decls, path);
    analyzer.collect_symbols();
    analyzer.run();
    (analyzer.module, analyzer.diags)
}

/// What a top-level name refers to.
#[derive(Debug, Clone)]
pub(crate) enum Symbol {
    Operation { index: usize },
    Program { index: usize },
    Extern(ExternSig),
}

/// A resolved operation call: the emitted (possibly specialized) name
/// and the final size of each qubit parameter.
#[derive(Debug, Clone)]
pub(crate) struct CalleeInfo {
    pub emitted: String,
    pub sizes: Vec<u32>,
}

pub(crate) struct Analyzer<'a> {
    decls: &'a [Decl],
    path: String,
    symbols: FxHashMap<String, Symbol>,
    externs: FxHashMap<String, ExternSig>,
    module: Module,
    diags: Vec<Diagnostic>,
    /// Qubit parameter sizes for every analyzed (emitted) operation.
    op_sizes: FxHashMap<String, Vec<u32>>,
    /// Index of the declaration whose body is currently being analyzed.
    current_index: usize,
    /// Emitted names on the active call chain, for recursion detection.
    in_progress: Vec<String>,
}

impl<'a> Analyzer<'a> {
    fn new(decls: &'a [Decl], path: &str) -> Self {
        Self {
            decls,
            path: path.to_string(),
            symbols: FxHashMap::default(),
            externs: FxHashMap::default(),
            module: Module::new(),
            diags: Vec::new(),
            op_sizes: FxHashMap::default(),
            current_index: 0,
            in_progress: Vec::new(),
        }
    }

    pub(crate) fn error_at(&self, pos: SourcePos, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(&self.path, pos, message)
    }

    fn push_error(&mut self, pos: SourcePos, message: impl Into<String>) {
        let d = self.error_at(pos, message);
        self.diags.push(d);
    }

    /// Fold an expression, reporting failures into `sink`.
    ///
    /// Returns `None` both on reported failures and on deferred
    /// evaluations (an inferred size not yet resolved); the latter are
    /// silent because the body is walked again after resolution.
    pub(crate) fn eval_in(
        &self,
        expr: &Expr,
        env: &Env,
        sink: &mut Vec<Diagnostic>,
    ) -> Option<Value> {
        match eval_expr(expr, env, &self.externs) {
            Ok(v) => Some(v),
            Err(failure) => {
                if let Some((pos, message)) = failure.message() {
                    sink.push(self.error_at(pos, message));
                }
                None
            }
        }
    }

    pub(crate) fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub(crate) fn externs(&self) -> &FxHashMap<String, ExternSig> {
        &self.externs
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    fn collect_symbols(&mut self) {
        for (index, decl) in self.decls.iter().enumerate() {
            let name = decl.name().to_string();
            if self.symbols.contains_key(&name) {
                self.push_error(decl.pos(), format!("duplicate definition of '{name}'"));
                continue;
            }
            let symbol = match decl {
                Decl::Operation(op) => {
                    if builtin_gate(&op.name).is_some() {
                        let d = Diagnostic::warning(
                            &self.path,
                            op.pos,
                            format!("operation '{}' shadows the builtin gate of the same name", op.name),
                        );
                        self.diags.push(d);
                    }
                    Symbol::Operation { index }
                }
                Decl::Program(_) => Symbol::Program { index },
                Decl::ExternFunc(f) => {
                    let sig = ExternSig {
                        param_types: f.param_types.clone(),
                        return_type: f.return_type,
                    };
                    self.externs.insert(name.clone(), sig.clone());
                    Symbol::Extern(sig)
                }
            };
            self.symbols.insert(name, symbol);
        }
    }

    fn run(&mut self) {
        let decls = self.decls;
        for (index, decl) in decls.iter().enumerate() {
            self.current_index = index;
            // Skip shadowed duplicates; only the first definition of a
            // name is analyzed.
            let owns_name = match self.symbols.get(decl.name()) {
                Some(Symbol::Operation { index: i } | Symbol::Program { index: i }) => *i == index,
                Some(Symbol::Extern(_)) => matches!(decl, Decl::ExternFunc(_)),
                None => false,
            };
            if !owns_name {
                continue;
            }
            match decl {
                Decl::Operation(op) => {
                    // Operations with classical parameters only exist as
                    // call-site specializations.
                    if op.classical_params().next().is_some() {
                        continue;
                    }
                    if self.op_sizes.contains_key(&op.name) {
                        continue; // already analyzed on demand from an earlier caller
                    }
                    let _ = self.analyze_operation(index, Vec::new(), op.name.clone(), None);
                }
                Decl::Program(p) => self.analyze_program(p),
                Decl::ExternFunc(_) => {}
            }
        }
    }

    /// Analyze one operation body under the given classical bindings and
    /// register the result as `emitted`.
    ///
    /// Returns the final qubit parameter sizes so callers can unify
    /// their argument registers against them.
    fn analyze_operation(
        &mut self,
        index: usize,
        bindings: Vec<(String, Value)>,
        emitted: String,
        call_pos: Option<SourcePos>,
    ) -> Result<Vec<u32>, ()> {
        let decls = self.decls;
        let Decl::Operation(op) = &decls[index] else {
            return Err(());
        };
        if self.in_progress.contains(&emitted) {
            self.push_error(
                call_pos.unwrap_or(op.pos),
                format!("recursive call to operation '{}'", op.name),
            );
            return Err(());
        }
        self.in_progress.push(emitted.clone());
        let saved = self.current_index;
        self.current_index = index;
        let result = self.analyze_operation_body(op, &bindings, &emitted);
        self.current_index = saved;
        self.in_progress.pop();
        result
    }

    fn analyze_operation_body(
        &mut self,
        op: &'a OperationDecl,
        bindings: &[(String, Value)],
        emitted: &str,
    ) -> Result<Vec<u32>, ()> {
        if op.qubit_params().next().is_none() {
            self.push_error(
                op.pos,
                format!("operation '{}' must declare at least one qubit parameter", op.name),
            );
            return Err(());
        }

        let start = self.diags.len();

        let mut env = Env::new();
        for (name, value) in bindings {
            env.bind(name.clone(), Binding::Value(value.clone()));
        }

        let mut regs = RegTable::new();
        let mut has_inferred = false;
        for p in op.qubit_params() {
            let ParamDecl::Quantum {
                name,
                borrowed,
                size,
                pos,
            } = p
            else {
                continue;
            };
            let state = match size {
                SizeSpec::Literal(n) => {
                    if *n == 0 {
                        self.push_error(*pos, format!("register '{name}' must have a positive size"));
                        return Err(());
                    }
                    SizeState::Known(*n)
                }
                SizeSpec::Bound(param) => match env.lookup(param) {
                    Some(Binding::Value(Value::Int(v))) => {
                        match u32::try_from(*v).ok().filter(|&v| v > 0) {
                            Some(v) => SizeState::Known(v),
                            None => {
                                self.push_error(
                                    *pos,
                                    format!("size of register '{name}' must be positive, got {v}"),
                                );
                                return Err(());
                            }
                        }
                    }
                    Some(Binding::Value(v)) => {
                        self.push_error(
                            *pos,
                            format!("size of register '{name}' must be Int, found {}", v.type_name()),
                        );
                        return Err(());
                    }
                    _ => {
                        self.push_error(*pos, format!("undefined symbol '{param}'"));
                        return Err(());
                    }
                },
                SizeSpec::Inferred(infer_name) => {
                    has_inferred = true;
                    if let Some(n) = infer_name {
                        env.bind(n.clone(), Binding::Deferred);
                    }
                    SizeState::Infer { min: 0, eq: None }
                }
            };
            let slot = RegSlot {
                name: name.clone(),
                borrowed: *borrowed,
                is_param: true,
                size: state,
                infer_name: match size {
                    SizeSpec::Inferred(n) => n.clone(),
                    _ => None,
                },
                pos: *pos,
            };
            if !regs.declare(slot) {
                self.push_error(*pos, format!("duplicate register '{name}'"));
            }
        }

        // Inference sweep.
        let mut ctx = ScanCtx {
            env,
            regs,
            diags: Vec::new(),
        };
        self.scan_stmts(&op.body, &mut ctx);

        // Resolve inferred sizes: a callee-imposed size wins, otherwise
        // one past the largest index used, never below one qubit.
        let mut resolved_names: Vec<(String, u32)> = Vec::new();
        for slot in ctx.regs.slots_mut() {
            if let SizeState::Infer { min, eq } = slot.size {
                let size = match eq {
                    Some(eq) if min > eq => {
                        self.diags.push(Diagnostic::error(
                            &self.path,
                            slot.pos,
                            format!(
                                "incompatible size for register '{}': index {} is used but size {eq} is required",
                                slot.name,
                                min - 1
                            ),
                        ));
                        eq
                    }
                    Some(eq) => eq,
                    None => min.max(1),
                };
                slot.size = SizeState::Known(size);
                if let Some(n) = &slot.infer_name {
                    resolved_names.push((n.clone(), size));
                }
            }
        }

        // Bodies with inferred sizes are walked again so constraints
        // that were deferred on the first sweep are verified; the first
        // sweep's diagnostics are superseded by the second's.
        let (regs_final, sweep_diags) = if has_inferred {
            let mut env = Env::new();
            for (name, value) in bindings {
                env.bind(name.clone(), Binding::Value(value.clone()));
            }
            for (name, size) in &resolved_names {
                env.bind(name.clone(), Binding::Value(Value::Int(i64::from(*size))));
            }
            let mut regs = RegTable::new();
            for p in op.qubit_params() {
                let ParamDecl::Quantum {
                    name,
                    borrowed,
                    pos,
                    ..
                } = p
                else {
                    continue;
                };
                let size = ctx.regs.get(name).map_or(1, RegSlot::size_hint);
                regs.declare(RegSlot {
                    name: name.clone(),
                    borrowed: *borrowed,
                    is_param: true,
                    size: SizeState::Known(size),
                    infer_name: None,
                    pos: *pos,
                });
            }
            let mut ctx2 = ScanCtx {
                env,
                regs,
                diags: Vec::new(),
            };
            self.scan_stmts(&op.body, &mut ctx2);
            (ctx2.regs, ctx2.diags)
        } else {
            (ctx.regs, ctx.diags)
        };

        let sizes: Vec<u32> = regs_final
            .slots()
            .iter()
            .filter(|s| s.is_param)
            .map(RegSlot::size_hint)
            .collect();
        self.op_sizes.insert(emitted.to_string(), sizes.clone());

        self.diags.extend(sweep_diags);
        let has_errors = self.diags[start..].iter().any(Diagnostic::is_error);
        if has_errors {
            return Ok(sizes);
        }

        // Lowering phase.
        let mut env = Env::new();
        for (name, value) in bindings {
            env.bind(name.clone(), Binding::Value(value.clone()));
        }
        for (name, size) in &resolved_names {
            env.bind(name.clone(), Binding::Value(Value::Int(i64::from(*size))));
        }
        let mut registers = Vec::new();
        let mut size_map = FxHashMap::default();
        for slot in regs_final.slots().iter().filter(|s| s.is_param) {
            registers.push(RegisterDecl::param(slot.name.clone(), slot.size_hint()));
            size_map.insert(slot.name.clone(), slot.size_hint());
        }
        let mut lctx = LowerCtx {
            env,
            sizes: size_map,
            registers,
            controls: Vec::new(),
            instrs: Vec::new(),
            diags: Vec::new(),
            anon: 0,
        };
        self.lower_stmts(&op.body, &mut lctx);
        let lower_ok = !lctx.diags.iter().any(Diagnostic::is_error);
        self.diags.extend(lctx.diags);
        if lower_ok {
            let resolved = ResolvedOperation {
                name: emitted.to_string(),
                registers: lctx.registers,
                body: lctx.instrs,
            };
            if let Err(e) = self.module.add_operation(resolved) {
                self.push_error(op.pos, e.to_string());
            }
        }
        Ok(sizes)
    }

    fn analyze_program(&mut self, p: &'a ProgramDecl) {
        if !p.params.is_empty() {
            self.push_error(
                p.pos,
                format!(
                    "program '{}' cannot declare parameters; parameter values are never known at compile time",
                    p.name
                ),
            );
            return;
        }

        let shots = match &p.shots {
            None => 1024,
            Some(expr) => {
                let mut sink = Vec::new();
                let shots = match self.eval_in(expr, &Env::new(), &mut sink) {
                    Some(Value::Int(v)) if v > 0 => Some(v.unsigned_abs()),
                    Some(_) => None,
                    None => Some(1024),
                };
                self.diags.extend(sink);
                match shots {
                    Some(v) => v,
                    None => {
                        self.push_error(expr.pos, "shot count must be a positive Int constant");
                        1024
                    }
                }
            }
        };

        let start = self.diags.len();
        let mut ctx = ScanCtx {
            env: Env::new(),
            regs: RegTable::new(),
            diags: Vec::new(),
        };
        self.scan_stmts(&p.body, &mut ctx);
        self.diags.extend(ctx.diags);
        if self.diags[start..].iter().any(Diagnostic::is_error) {
            return;
        }

        let mut lctx = LowerCtx {
            env: Env::new(),
            sizes: FxHashMap::default(),
            registers: Vec::new(),
            controls: Vec::new(),
            instrs: Vec::new(),
            diags: Vec::new(),
            anon: 0,
        };
        self.lower_stmts(&p.body, &mut lctx);
        let lower_ok = !lctx.diags.iter().any(Diagnostic::is_error);
        self.diags.extend(lctx.diags);
        if lower_ok {
            let resolved = ResolvedProgram {
                name: p.name.clone(),
                shots,
                registers: lctx.registers,
                body: lctx.instrs,
            };
            if let Err(e) = self.module.add_program(resolved) {
                self.push_error(p.pos, e.to_string());
            }
        }
    }

    /// Resolve an operation call with already-folded classical argument
    /// values, analyzing the callee (or its specialization) on demand.
    pub(crate) fn resolve_operation_call(
        &mut self,
        name: &str,
        args: &[(Value, SourcePos)],
        call_pos: SourcePos,
        sink: &mut Vec<Diagnostic>,
    ) -> Result<CalleeInfo, ()> {
        let Some(Symbol::Operation { index }) = self.symbols.get(name) else {
            sink.push(self.error_at(call_pos, format!("undefined symbol '{name}'")));
            return Err(());
        };
        let index = *index;
        let decls = self.decls;
        let Decl::Operation(op) = &decls[index] else {
            return Err(());
        };

        let params: Vec<(String, ClassicalType)> = op
            .classical_params()
            .map(|(n, t)| (n.to_string(), t))
            .collect();
        if params.len() != args.len() {
            sink.push(self.error_at(
                call_pos,
                format!(
                    "operation '{name}' expects {} classical arguments, found {}",
                    params.len(),
                    args.len()
                ),
            ));
            return Err(());
        }
        let mut ok = true;
        for (i, ((_, ty), (value, apos))) in params.iter().zip(args).enumerate() {
            if value.ty() != Some(*ty) {
                sink.push(self.error_at(
                    *apos,
                    format!(
                        "argument {} of '{name}' must be {ty}, found {}",
                        i + 1,
                        value.type_name()
                    ),
                ));
                ok = false;
            }
        }
        if !ok {
            return Err(());
        }

        let emitted = if params.is_empty() {
            name.to_string()
        } else {
            let key: Vec<String> = args.iter().map(|(v, _)| v.mangle()).collect();
            format!("{name}${}", key.join("$"))
        };
        if let Some(sizes) = self.op_sizes.get(&emitted) {
            return Ok(CalleeInfo {
                emitted,
                sizes: sizes.clone(),
            });
        }

        // A later declaration with an inferred size has nothing to unify
        // against at this point in the walk.
        let declared_later = index > self.current_index;
        let any_inferred = op.qubit_params().any(|p| {
            matches!(
                p,
                ParamDecl::Quantum {
                    size: SizeSpec::Inferred(_),
                    ..
                }
            )
        });
        if declared_later && any_inferred {
            sink.push(self.error_at(
                call_pos,
                format!("operation '{name}' used before its size is known"),
            ));
            return Err(());
        }
        if self.in_progress.len() >= MAX_CALL_DEPTH {
            sink.push(self.error_at(
                call_pos,
                format!("operation call nesting exceeds {MAX_CALL_DEPTH} levels"),
            ));
            return Err(());
        }

        let bindings: Vec<(String, Value)> = params
            .into_iter()
            .map(|(n, _)| n)
            .zip(args.iter().map(|(v, _)| v.clone()))
            .collect();
        let sizes = self.analyze_operation(index, bindings, emitted.clone(), Some(call_pos))?;
        Ok(CalleeInfo { emitted, sizes })
    }
}
