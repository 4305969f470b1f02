//! Name binding and constant evaluation.
//!
//! Classical expressions are folded eagerly wherever a literal value is
//! required (tensor-power exponents, slice and range bounds, ket repeat
//! counts, gate arguments, shot counts). An expression that cannot fold
//! is reported as "value must be statically known here" at the position
//! that demanded the value; an unknown name is "undefined symbol".

use rustc_hash::FxHashMap;

use crate::ast::ClassicalType;
use crate::diag::SourcePos;
use crate::{
    ast::{BinOp, Expr, ExprKind, UnaryOp},
    lexer::{KetLit, KetRepeat},
};

/// A folded classical value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Bit string, least-significant bit first.
    Bits(Vec<bool>),
    List(Vec<i64>),
}

impl Value {
    /// The classical type of this value, if it has a declarable one.
    pub fn ty(&self) -> Option<ClassicalType> {
        match self {
            Value::Int(_) => Some(ClassicalType::Int),
            Value::Bits(_) => Some(ClassicalType::Bits),
            Value::List(_) => Some(ClassicalType::IntList),
            Value::Float(_) | Value::Bool(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Bool",
            Value::Bits(_) => "Bits",
            Value::List(_) => "[Int]",
        }
    }

    /// Numeric view for gate arguments.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Key fragment used to name call-site specializations.
    pub fn mangle(&self) -> String {
        match self {
            Value::Int(v) => format!("{v}"),
            Value::Float(v) => format!("{v}"),
            Value::Bool(v) => format!("{v}"),
            Value::Bits(bits) => {
                let s: String = bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
                format!("b{s}")
            }
            Value::List(items) => {
                let s: Vec<String> = items.iter().map(ToString::to_string).collect();
                format!("l{}", s.join("_"))
            }
        }
    }
}

/// What a name is bound to in the current scope.
#[derive(Debug, Clone)]
pub enum Binding {
    /// A folded constant.
    Value(Value),
    /// A `let` whose initializer could not fold (an extern call); the
    /// error surfaces only where the value is actually demanded.
    Opaque,
    /// An inferred-size name (`?n`) before its size is resolved; only
    /// present during the first inference sweep.
    Deferred,
}

/// Lexically scoped constant bindings.
#[derive(Debug, Default)]
pub struct Env {
    scopes: Vec<FxHashMap<String, Binding>>,
}

impl Env {
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), binding);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }
}

/// Why an expression failed to fold.
#[derive(Debug, Clone)]
pub enum EvalFailure {
    /// Name not bound anywhere in scope.
    Undefined { name: String, pos: SourcePos },
    /// Bound but with no compile-time value (extern call).
    NotStatic { pos: SourcePos },
    /// Ill-typed constant expression.
    Type { message: String, pos: SourcePos },
    /// Depends on an inferred size that is not resolved yet; the
    /// inference sweep retries after resolution.
    Deferred,
}

impl EvalFailure {
    /// Render as a diagnostic message, with the position it refers to.
    pub fn message(&self) -> Option<(SourcePos, String)> {
        match self {
            EvalFailure::Undefined { name, pos } => {
                Some((*pos, format!("undefined symbol '{name}'")))
            }
            EvalFailure::NotStatic { pos } => {
                Some((*pos, "value must be statically known here".to_string()))
            }
            EvalFailure::Type { message, pos } => Some((*pos, message.clone())),
            EvalFailure::Deferred => None,
        }
    }
}

type EvalResult = Result<Value, EvalFailure>;

/// Largest number of elements a folded range may produce; ranges are
/// expanded eagerly, so an unbounded one would hang the compiler.
const MAX_RANGE_LEN: i64 = 1 << 20;

/// Extern function signature, resolved only for arity/type checking.
#[derive(Debug, Clone)]
pub struct ExternSig {
    pub param_types: Vec<ClassicalType>,
    pub return_type: Option<ClassicalType>,
}

/// Signature of a builtin primitive gate.
#[derive(Debug, Clone, Copy)]
pub struct GateSig {
    /// Target qubits the gate spans.
    pub qubits: u32,
    /// Number of classical arguments.
    pub args: usize,
}

/// The primitive gate set.
pub fn builtin_gate(name: &str) -> Option<GateSig> {
    let sig = match name {
        "I" | "H" | "X" | "Y" | "Z" | "S" | "Sdg" | "T" | "Tdg" => GateSig { qubits: 1, args: 0 },
        "Ph" | "Rx" | "Ry" | "Rz" => GateSig { qubits: 1, args: 1 },
        "CNOT" | "CZ" | "SWAP" => GateSig { qubits: 2, args: 0 },
        "CCNOT" | "CSWAP" => GateSig { qubits: 3, args: 0 },
        _ => return None,
    };
    Some(sig)
}

fn type_err(pos: SourcePos, message: impl Into<String>) -> EvalFailure {
    EvalFailure::Type {
        message: message.into(),
        pos,
    }
}

/// Fold an expression to a value.
pub fn eval_expr(
    expr: &Expr,
    env: &Env,
    externs: &FxHashMap<String, ExternSig>,
) -> EvalResult {
    let pos = expr.pos;
    match &expr.kind {
        ExprKind::Int(v) => Ok(Value::Int(*v)),
        ExprKind::Float(v) => Ok(Value::Float(*v)),
        ExprKind::Bool(v) => Ok(Value::Bool(*v)),
        ExprKind::Identifier(name) => match env.lookup(name) {
            Some(Binding::Value(v)) => Ok(v.clone()),
            Some(Binding::Opaque) => Err(EvalFailure::NotStatic { pos }),
            Some(Binding::Deferred) => Err(EvalFailure::Deferred),
            None => match name.as_str() {
                "pi" => Ok(Value::Float(std::f64::consts::PI)),
                "tau" => Ok(Value::Float(std::f64::consts::TAU)),
                "euler" => Ok(Value::Float(std::f64::consts::E)),
                _ => Err(EvalFailure::Undefined {
                    name: name.clone(),
                    pos,
                }),
            },
        },
        ExprKind::Paren(inner) => eval_expr(inner, env, externs),
        ExprKind::Unary { op, operand } => {
            let v = eval_expr(operand, env, externs)?;
            match (op, v) {
                (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(
                    v.checked_neg()
                        .ok_or_else(|| type_err(pos, "integer overflow in constant expression"))?,
                )),
                (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
                (UnaryOp::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
                (_, v) => Err(type_err(
                    pos,
                    format!("operator cannot be applied to {}", v.type_name()),
                )),
            }
        }
        ExprKind::Binary { left, op, right } => {
            let l = eval_expr(left, env, externs)?;
            let r = eval_expr(right, env, externs)?;
            eval_binary(*op, l, r, pos)
        }
        ExprKind::Call { name, args } => eval_call(name, args, pos, env, externs),
        ExprKind::List(elems) => {
            let mut items = Vec::with_capacity(elems.len());
            for e in elems {
                match eval_expr(e, env, externs)? {
                    Value::Int(v) => items.push(v),
                    other => {
                        return Err(type_err(
                            e.pos,
                            format!("list elements must be Int, found {}", other.type_name()),
                        ));
                    }
                }
            }
            Ok(Value::List(items))
        }
        ExprKind::Range {
            start,
            end,
            inclusive,
        } => {
            let s = eval_expr(start, env, externs)?
                .as_int()
                .ok_or_else(|| type_err(start.pos, "range bounds must be Int"))?;
            let e = eval_expr(end, env, externs)?
                .as_int()
                .ok_or_else(|| type_err(end.pos, "range bounds must be Int"))?;
            let e = if *inclusive {
                e.checked_add(1)
                    .ok_or_else(|| type_err(pos, "integer overflow in constant expression"))?
            } else {
                e
            };
            if e.saturating_sub(s) > MAX_RANGE_LEN {
                return Err(type_err(pos, "range is too large"));
            }
            Ok(Value::List((s..e).collect()))
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn promote(l: &Value, r: &Value) -> Option<(f64, f64)> {
    Some((l.as_f64()?, r.as_f64()?))
}

fn int_pair(l: &Value, r: &Value) -> Option<(i64, i64)> {
    Some((l.as_int()?, r.as_int()?))
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn eval_binary(op: BinOp, l: Value, r: Value, pos: SourcePos) -> EvalResult {
    let mismatch = || {
        type_err(
            pos,
            format!(
                "operator '{op}' cannot be applied to {} and {}",
                l.type_name(),
                r.type_name()
            ),
        )
    };
    let overflow = || type_err(pos, "integer overflow in constant expression");

    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            if let Some((a, b)) = int_pair(&l, &r) {
                let v = match op {
                    BinOp::Add => a.checked_add(b),
                    BinOp::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                return v.map(Value::Int).ok_or_else(overflow);
            }
            let (a, b) = promote(&l, &r).ok_or_else(mismatch)?;
            Ok(Value::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                _ => a * b,
            }))
        }
        BinOp::Div => {
            if let Some((a, b)) = int_pair(&l, &r) {
                return a
                    .checked_div(b)
                    .map(Value::Int)
                    .ok_or_else(|| type_err(pos, "division by zero in constant expression"));
            }
            let (a, b) = promote(&l, &r).ok_or_else(mismatch)?;
            Ok(Value::Float(a / b))
        }
        BinOp::Mod => {
            let (a, b) = int_pair(&l, &r).ok_or_else(mismatch)?;
            a.checked_rem_euclid(b)
                .map(Value::Int)
                .ok_or_else(|| type_err(pos, "division by zero in constant expression"))
        }
        BinOp::Pow => {
            if let Some((a, b)) = int_pair(&l, &r) {
                let exp = u32::try_from(b)
                    .map_err(|_| type_err(pos, "integer exponent must be non-negative"))?;
                return a.checked_pow(exp).map(Value::Int).ok_or_else(overflow);
            }
            let (a, b) = promote(&l, &r).ok_or_else(mismatch)?;
            Ok(Value::Float(a.powf(b)))
        }
        BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
            let (a, b) = int_pair(&l, &r).ok_or_else(mismatch)?;
            let v = match op {
                BinOp::Shl => {
                    let sh = u32::try_from(b).map_err(|_| overflow())?;
                    a.checked_shl(sh).ok_or_else(overflow)?
                }
                BinOp::Shr => {
                    let sh = u32::try_from(b).map_err(|_| overflow())?;
                    a.checked_shr(sh).ok_or_else(overflow)?
                }
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                _ => a ^ b,
            };
            Ok(Value::Int(v))
        }
        BinOp::Eq | BinOp::NotEq => {
            let eq = match (&l, &r) {
                (Value::Bool(a), Value::Bool(b)) => a == b,
                _ => {
                    let (a, b) = promote(&l, &r).ok_or_else(mismatch)?;
                    (a - b).abs() < f64::EPSILON
                }
            };
            Ok(Value::Bool(if op == BinOp::Eq { eq } else { !eq }))
        }
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            let (a, b) = promote(&l, &r).ok_or_else(mismatch)?;
            Ok(Value::Bool(match op {
                BinOp::Lt => a < b,
                BinOp::LtEq => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            }))
        }
        BinOp::And | BinOp::Or => match (&l, &r) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatch()),
        },
    }
}

#[allow(clippy::cast_sign_loss)]
fn eval_call(
    name: &str,
    args: &[Expr],
    pos: SourcePos,
    env: &Env,
    externs: &FxHashMap<String, ExternSig>,
) -> EvalResult {
    let values: Vec<Value> = args
        .iter()
        .map(|a| eval_expr(a, env, externs))
        .collect::<Result<_, _>>()?;

    match name {
        "log2i" => {
            let [Value::Int(v)] = values.as_slice() else {
                return Err(type_err(pos, "log2i expects one Int argument"));
            };
            if *v <= 0 {
                return Err(type_err(pos, "log2i argument must be positive"));
            }
            Ok(Value::Int(i64::from(63 - (*v).leading_zeros())))
        }
        "mpowi" => {
            let [Value::Int(base), Value::Int(exp), Value::Int(modulus)] = values.as_slice()
            else {
                return Err(type_err(pos, "mpowi expects three Int arguments"));
            };
            if *exp < 0 || *modulus <= 0 {
                return Err(type_err(
                    pos,
                    "mpowi exponent must be non-negative and modulus positive",
                ));
            }
            let mut result: i64 = 1;
            let mut base = base.rem_euclid(*modulus);
            let mut exp = *exp as u64;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result
                        .checked_mul(base)
                        .map(|v| v.rem_euclid(*modulus))
                        .ok_or_else(|| type_err(pos, "integer overflow in constant expression"))?;
                }
                base = base
                    .checked_mul(base)
                    .map(|v| v.rem_euclid(*modulus))
                    .ok_or_else(|| type_err(pos, "integer overflow in constant expression"))?;
                exp >>= 1;
            }
            Ok(Value::Int(result))
        }
        "len" => match values.as_slice() {
            [Value::Bits(bits)] => Ok(Value::Int(bits.len() as i64)),
            [Value::List(items)] => Ok(Value::Int(items.len() as i64)),
            _ => Err(type_err(pos, "len expects one Bits or [Int] argument")),
        },
        "bits" => {
            let [Value::Int(v), Value::Int(w)] = values.as_slice() else {
                return Err(type_err(pos, "bits expects two Int arguments"));
            };
            if *v < 0 || !(1..=64).contains(w) {
                return Err(type_err(pos, "bits expects a non-negative value and a width in 1..=64"));
            }
            let width = *w as u32;
            if width < 64 && *v >= (1i64 << width) {
                return Err(type_err(pos, format!("value {v} does not fit in {width} bits")));
            }
            Ok(Value::Bits(
                (0..width).map(|i| (*v >> i) & 1 == 1).collect(),
            ))
        }
        _ => {
            let Some(sig) = externs.get(name) else {
                return Err(EvalFailure::Undefined {
                    name: name.to_string(),
                    pos,
                });
            };
            if sig.param_types.len() != values.len() {
                return Err(type_err(
                    pos,
                    format!(
                        "extern function '{name}' expects {} arguments, found {}",
                        sig.param_types.len(),
                        values.len()
                    ),
                ));
            }
            for (i, (value, expected)) in values.iter().zip(&sig.param_types).enumerate() {
                if value.ty() != Some(*expected) {
                    return Err(type_err(
                        args[i].pos,
                        format!(
                            "argument {} of '{name}' must be {expected}, found {}",
                            i + 1,
                            value.type_name()
                        ),
                    ));
                }
            }
            // Signature checks out, but extern functions have no body to
            // fold; the error surfaces only if a value is demanded.
            Err(EvalFailure::NotStatic { pos })
        }
    }
}

/// Resolve a ket literal to its basis value and total width.
pub fn resolve_ket(
    lit: &KetLit,
    pos: SourcePos,
    env: &Env,
    externs: &FxHashMap<String, ExternSig>,
) -> Result<(u64, u32), EvalFailure> {
    let repeat = match &lit.repeat {
        None => 1u32,
        Some(KetRepeat::Count(n)) => *n,
        Some(KetRepeat::Binding(name)) => {
            let expr = Expr::new(ExprKind::Identifier(name.clone()), pos);
            match eval_expr(&expr, env, externs)? {
                Value::Int(v) if v > 0 => u32::try_from(v)
                    .map_err(|_| type_err(pos, "ket repeat count is too large"))?,
                other => {
                    return Err(type_err(
                        pos,
                        format!(
                            "ket repeat count must be a positive Int, found {}",
                            other.type_name()
                        ),
                    ));
                }
            }
        }
    };
    if repeat == 0 {
        return Err(type_err(pos, "ket repeat count must be positive"));
    }
    let width = lit
        .width
        .checked_mul(repeat)
        .filter(|&w| w <= 64)
        .ok_or_else(|| type_err(pos, "ket literal wider than 64 qubits"))?;
    let mut value = 0u64;
    for i in 0..repeat {
        value |= lit.value << (lit.width * i);
    }
    Ok((value, width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn eval_source(expr: &str) -> EvalResult {
        // Wrap the expression in a let so the full grammar applies.
        let source = format!("program P {{ let x = {expr}; }}");
        let (unit, diags) = parse(&source, "test.bd");
        assert!(diags.is_empty(), "{diags:?}");
        let crate::ast::Decl::Program(p) = &unit.decls[0] else {
            panic!("expected program");
        };
        let crate::ast::StmtKind::Let { value, .. } = &p.body[0].kind else {
            panic!("expected let");
        };
        eval_expr(value, &Env::new(), &FxHashMap::default())
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval_source("2 + 3 * 4").unwrap(), Value::Int(14));
        assert_eq!(eval_source("2 ** 3 ** 2").unwrap(), Value::Int(512));
        assert_eq!(eval_source("(2 + 3) * 4").unwrap(), Value::Int(20));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(
            eval_source("[0:3]").unwrap(),
            Value::List(vec![0, 1, 2])
        );
        assert_eq!(
            eval_source("[0..3]").unwrap(),
            Value::List(vec![0, 1, 2, 3])
        );
        assert_eq!(eval_source("[3:3]").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval_source("log2i(8)").unwrap(), Value::Int(3));
        assert_eq!(eval_source("log2i(7)").unwrap(), Value::Int(2));
        assert_eq!(eval_source("mpowi(2, 10, 1000)").unwrap(), Value::Int(24));
        assert_eq!(
            eval_source("bits(6, 3)").unwrap(),
            Value::Bits(vec![false, true, true])
        );
        assert_eq!(eval_source("len(bits(6, 3))").unwrap(), Value::Int(3));
        assert_eq!(eval_source("len([1, 2, 3])").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_pi_constant() {
        let Value::Float(v) = eval_source("pi / 2").unwrap() else {
            panic!("expected float");
        };
        assert!((v - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_undefined_symbol() {
        assert!(matches!(
            eval_source("nope + 1"),
            Err(EvalFailure::Undefined { name, .. }) if name == "nope"
        ));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            eval_source("1 / 0"),
            Err(EvalFailure::Type { .. })
        ));
    }

    #[test]
    fn test_ket_resolution() {
        let env = Env::new();
        let externs = FxHashMap::default();
        let lit = KetLit {
            value: 1,
            width: 1,
            repeat: Some(KetRepeat::Count(3)),
        };
        let (value, width) =
            resolve_ket(&lit, SourcePos::new(1, 1), &env, &externs).unwrap();
        assert_eq!(width, 3);
        assert_eq!(value, 0b111);
    }

    #[test]
    fn test_builtin_gate_table() {
        assert_eq!(builtin_gate("H").unwrap().qubits, 1);
        assert_eq!(builtin_gate("CNOT").unwrap().qubits, 2);
        assert_eq!(builtin_gate("Ph").unwrap().args, 1);
        assert!(builtin_gate("NotAGate").is_none());
    }
}
