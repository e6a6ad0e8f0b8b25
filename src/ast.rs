//! Abstract syntax tree for the imperative source language

use std::rc::Rc;

pub type Ident = String;

/// Source location for error reporting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A spanned AST node
#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

// ============================================================================
// Source map
// ============================================================================

/// 1-based line/column position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for LineCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Resolved start/end of a span
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub start: LineCol,
    pub end: LineCol,
}

/// Maps byte offsets back to lines and columns of the original source
#[derive(Debug, Clone)]
pub struct SourceMap {
    source: String,
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { source, line_starts }
    }

    pub fn position(&self, offset: usize) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        LineCol {
            line: line + 1,
            column: offset - self.line_starts[line] + 1,
        }
    }

    /// The text of a 1-based line, without its newline
    pub fn line(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map(|&e| e - 1)
            .unwrap_or(self.source.len());
        self.source.get(start..end)
    }

    pub fn locate(&self, span: &Span) -> Location {
        Location {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone)]
pub enum ExprKind {
    // Literals
    Int(i64),
    Bool(bool),
    NoneLit,

    // Variable or builtin reference
    Name(Ident),

    // Boolean connective: a and b, a or b
    BoolOp {
        op: BoolOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },

    // Arithmetic / bitwise operator
    BinOp {
        op: BinOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },

    UnaryOp {
        op: UnaryOp,
        operand: Rc<Expr>,
    },

    // Two-operand comparison; chains are split by the parser
    Compare {
        op: CmpOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },

    // lambda a, b: body
    Lambda {
        params: Vec<Ident>,
        body: Rc<Expr>,
    },

    // a if cond else b
    IfExp {
        cond: Rc<Expr>,
        then_branch: Rc<Expr>,
        else_branch: Rc<Expr>,
    },

    // [head for target in iter if cond]
    ListComp {
        head: Rc<Expr>,
        target: Target,
        iter: Rc<Expr>,
        cond: Option<Rc<Expr>>,
    },

    Call {
        func: Rc<Expr>,
        args: Vec<Expr>,
    },

    // Method-like attribute access: xs.count, xs.index, x.copy, ...
    Attribute {
        value: Rc<Expr>,
        attr: Ident,
    },

    Subscript {
        value: Rc<Expr>,
        index: Rc<Expr>,
    },

    // e[lo:hi:step], every part optional
    Slice {
        value: Rc<Expr>,
        lower: Option<Rc<Expr>>,
        upper: Option<Rc<Expr>>,
        step: Option<Rc<Expr>>,
    },

    Starred(Rc<Expr>),

    // List literal, optionally carrying an element type annotation
    List {
        elems: Vec<Expr>,
        elem_ty: Option<TypeExpr>,
    },

    Tuple(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// True division; parsed but rejected by lowering
    Div,
    FloorDiv,
    Mod,
    Pow,
    /// `@`; parsed but rejected by lowering
    MatMult,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    /// Binary maximum, introduced by desugaring only
    Max,
    /// Binary minimum, introduced by desugaring only
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

// ============================================================================
// Assignment targets
// ============================================================================

pub type Target = Spanned<TargetKind>;

#[derive(Debug, Clone)]
pub enum TargetKind {
    Name(Ident),
    Subscript {
        base: Rc<Target>,
        index: Rc<Expr>,
    },
    Tuple(Vec<Target>),
}

impl TargetKind {
    /// Every plain name bound by this target, in left-to-right order
    pub fn bound_names(&self, out: &mut Vec<Ident>) {
        match self {
            TargetKind::Name(n) => out.push(n.clone()),
            TargetKind::Subscript { .. } => {}
            TargetKind::Tuple(ts) => {
                for t in ts {
                    t.node.bound_names(out);
                }
            }
        }
    }
}

/// Reinterpret an expression as an assignment target, if it has that shape
pub fn expr_to_target(e: &Expr) -> Option<Target> {
    let kind = match &e.node {
        ExprKind::Name(n) => TargetKind::Name(n.clone()),
        ExprKind::Subscript { value, index } => TargetKind::Subscript {
            base: Rc::new(expr_to_target(value)?),
            index: index.clone(),
        },
        ExprKind::Tuple(elems) => {
            let mut ts = Vec::with_capacity(elems.len());
            for elem in elems {
                ts.push(expr_to_target(elem)?);
            }
            TargetKind::Tuple(ts)
        }
        _ => return None,
    };
    Some(Target::new(kind, e.span.clone()))
}

// ============================================================================
// Type annotations (surface syntax)
// ============================================================================

pub type TypeExpr = Spanned<TypeExprKind>;

#[derive(Debug, Clone)]
pub enum TypeExprKind {
    /// Capitalized bare name: a type variable
    Var(Ident),
    Int,
    Bool,
    /// Rejected by lowering outside the entry point
    Str,
    /// The side-effect annotation (`None`); only legal on procedures
    SideEffect,
    List(Rc<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    Callable {
        params: Vec<TypeExpr>,
        ret: Rc<TypeExpr>,
    },
}

// ============================================================================
// Statements
// ============================================================================

pub type Stmt = Spanned<StmtKind>;

#[derive(Debug, Clone)]
pub enum StmtKind {
    Return(Expr),

    // target = value, optionally annotated: target: T = value
    Assign {
        target: Target,
        ty: Option<TypeExpr>,
        value: Expr,
    },

    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },

    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },

    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },

    Assert(Expr),

    // xs.append(e), recognized by the parser as its own statement
    Append {
        seq: Expr,
        value: Expr,
    },

    // Any other expression in statement position; rejected by lowering
    ExprStmt(Expr),
}

// ============================================================================
// Toplevel items
// ============================================================================

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Item {
    Func(FuncDef),
    Assign {
        name: Ident,
        ty: Option<TypeExpr>,
        value: Expr,
        span: Span,
    },
    Assert(Expr),
}

#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<Item>,
}
