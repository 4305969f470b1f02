//! Abstract syntax tree for the Braid language.

use serde::{Deserialize, Serialize};

use crate::diag::SourcePos;
use crate::lexer::KetLit;

/// A parsed compilation unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Unit {
    /// Top-level declarations in source order.
    pub decls: Vec<Decl>,
}

/// A top-level declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decl {
    Operation(OperationDecl),
    Program(ProgramDecl),
    ExternFunc(ExternFuncDecl),
}

impl Decl {
    /// The declared name.
    pub fn name(&self) -> &str {
        match self {
            Decl::Operation(op) => &op.name,
            Decl::Program(p) => &p.name,
            Decl::ExternFunc(f) => &f.name,
        }
    }

    /// The declaration position.
    pub fn pos(&self) -> SourcePos {
        match self {
            Decl::Operation(op) => op.pos,
            Decl::Program(p) => p.pos,
            Decl::ExternFunc(f) => f.pos,
        }
    }
}

/// `operation Name(params) { body }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub body: Vec<Stmt>,
    pub pos: SourcePos,
}

impl OperationDecl {
    /// The classical parameters, in declaration order.
    pub fn classical_params(&self) -> impl Iterator<Item = (&str, ClassicalType)> {
        self.params.iter().filter_map(|p| match p {
            ParamDecl::Classical { name, ty, .. } => Some((name.as_str(), *ty)),
            ParamDecl::Quantum { .. } => None,
        })
    }

    /// The qubit parameters, in declaration order.
    pub fn qubit_params(&self) -> impl Iterator<Item = &ParamDecl> {
        self.params
            .iter()
            .filter(|p| matches!(p, ParamDecl::Quantum { .. }))
    }
}

/// `program Name shot N { body }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    /// Shot-count expression; defaults to 1024 when absent.
    pub shots: Option<Expr>,
    pub body: Vec<Stmt>,
    pub pos: SourcePos,
}

/// `extern func name(types) -> type;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternFuncDecl {
    pub name: String,
    pub param_types: Vec<ClassicalType>,
    pub return_type: Option<ClassicalType>,
    pub pos: SourcePos,
}

/// A parameter of an operation or program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParamDecl {
    /// `name: Int`
    Classical {
        name: String,
        ty: ClassicalType,
        pos: SourcePos,
    },
    /// `$name: size` or `&name: size`
    Quantum {
        name: String,
        /// `&`-sigil parameters borrow an already-prepared register.
        borrowed: bool,
        size: SizeSpec,
        pos: SourcePos,
    },
}

impl ParamDecl {
    pub fn name(&self) -> &str {
        match self {
            ParamDecl::Classical { name, .. } | ParamDecl::Quantum { name, .. } => name,
        }
    }

    pub fn pos(&self) -> SourcePos {
        match self {
            ParamDecl::Classical { pos, .. } | ParamDecl::Quantum { pos, .. } => *pos,
        }
    }
}

/// Classical value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassicalType {
    Int,
    Bits,
    IntList,
}

impl std::fmt::Display for ClassicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassicalType::Int => write!(f, "Int"),
            ClassicalType::Bits => write!(f, "Bits"),
            ClassicalType::IntList => write!(f, "[Int]"),
        }
    }
}

/// Declared size of a qubit parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeSpec {
    /// `$psi: 4`
    Literal(u32),
    /// `$psi: n` where `n` is a classical parameter.
    Bound(String),
    /// `$psi: ?` or `$psi: ?n`; the optional name is bound to the
    /// resolved size as an `Int` constant in the body.
    Inferred(Option<String>),
}

/// A statement with its source position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: SourcePos,
}

/// Statement forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// `G1 G2 … Gk targets [ctrl P] [| i <- src];`
    ///
    /// Gate terms apply to the targets in textual left-to-right order.
    GateApply {
        gates: Vec<GateExpr>,
        targets: Vec<TargetRef>,
        ctrl: Option<Predicate>,
        comprehension: Option<Comprehension>,
    },
    /// `qif P { … } else { … }`
    Qif {
        predicate: Predicate,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    /// `with SETUP { body }` — compute/uncompute.
    With {
        setup: Box<Stmt>,
        body: Vec<Stmt>,
    },
    /// `for i in [a:b] { … }`
    For {
        variable: String,
        range: Expr,
        body: Vec<Stmt>,
    },
    /// `each i in xs { … }`
    Each {
        variable: String,
        source: Expr,
        body: Vec<Stmt>,
    },
    /// `let x = expr;`
    Let { name: String, value: Expr },
    /// `let $x = |0'4⟩;` — allocate a local register in a basis state.
    LetQuantum { name: String, init: KetLit },
    /// `measure[slice]? target;`
    Measure {
        slice: Option<IndexSpec>,
        target: TargetRef,
    },
}

/// A gate term before lowering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GateExpr {
    /// `H` or `Ph(pi/2)`; also an operation call when the name resolves
    /// to a declared operation.
    Named {
        name: String,
        args: Vec<Expr>,
        pos: SourcePos,
    },
    /// `G!`
    Dagger(Box<GateExpr>),
    /// `G @ n`
    TensorPower {
        base: Box<GateExpr>,
        exponent: Expr,
    },
    /// `G1 . G2 . … . Gk`
    Concat(Vec<GateExpr>),
}

impl GateExpr {
    /// The position of the leftmost named gate in this term.
    pub fn pos(&self) -> SourcePos {
        match self {
            GateExpr::Named { pos, .. } => *pos,
            GateExpr::Dagger(inner) => inner.pos(),
            GateExpr::TensorPower { base, .. } => base.pos(),
            GateExpr::Concat(parts) => parts.first().map_or(SourcePos::none(), GateExpr::pos),
        }
    }
}

/// A register (or ket) a gate or measurement applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TargetRef {
    Register {
        name: String,
        index: Option<IndexSpec>,
        pos: SourcePos,
    },
    /// An anonymous register allocated in the given basis state.
    Ket { lit: KetLit, pos: SourcePos },
}

impl TargetRef {
    pub fn pos(&self) -> SourcePos {
        match self {
            TargetRef::Register { pos, .. } | TargetRef::Ket { pos, .. } => *pos,
        }
    }
}

/// Index forms inside `[...]` on a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexSpec {
    /// `$psi[i]`
    Single(Expr),
    /// `$psi[i, j, k]`
    Multi(Vec<Expr>),
    /// `$psi[a:b]` (exclusive) or `$psi[a..b]` (inclusive).
    Range {
        start: Expr,
        end: Expr,
        inclusive: bool,
    },
}

/// A `| i <- source` statement modifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comprehension {
    pub variable: String,
    pub source: Expr,
    pub pos: SourcePos,
}

/// A `qif`/`ctrl` predicate over basis references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Predicate {
    /// `&reg` or `&reg[i]`.
    Basis {
        register: String,
        index: Option<IndexSpec>,
        pos: SourcePos,
    },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn pos(&self) -> SourcePos {
        match self {
            Predicate::Basis { pos, .. } => *pos,
            Predicate::Not(p) => p.pos(),
            Predicate::And(l, _) | Predicate::Or(l, _) => l.pos(),
        }
    }
}

/// A classical expression with its source position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: SourcePos,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: SourcePos) -> Self {
        Self { kind, pos }
    }
}

/// Classical expression forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// Extern or builtin function call.
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `[1, 2, 3]`
    List(Vec<Expr>),
    /// `[a:b]` (exclusive) or `[a..b]` (inclusive).
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    Paren(Box<Expr>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        };
        write!(f, "{s}")
    }
}
