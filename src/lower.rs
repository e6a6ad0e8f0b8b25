//! Source-to-core lowering
//!
//! Rewrites imperative constructs into pure expressions: assignments become
//! `let` chains, `for` becomes a left fold over a tuple of live variables,
//! `if` statements join their written state through a tuple-valued
//! conditional, and subscripted assignment becomes a functional update.
//!
//! Variable rebinding is resolved here: assigning to a name that is already
//! in scope mints a versioned core name (`x$7`), so no `let` in the output
//! shadows a visible binder and reads always refer to the newest version.

use std::rc::Rc;

use indexmap::IndexSet;
use thiserror::Error;

use crate::analyze::{always_returns, analyze_max, analyze_min};
use crate::ast::{
    expr_to_target, BinOp, BoolOp, CmpOp, Expr, ExprKind, Item, Program, Span, Stmt, StmtKind,
    Target, TargetKind, TypeExpr, TypeExprKind, UnaryOp,
};
use crate::core_ir::{CoreExpr, CoreProgram, CoreType, Name, Prim, Supply, Toplevel};
use crate::eager;
use crate::lint::{self, LintError};
use crate::report::suggest_names;
use crate::typecheck::{self, TypeError};

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum LowerError {
    #[error("precondition violated: {0}")]
    Precondition(#[from] LintError),

    #[error("{msg}")]
    Semantic { msg: String, span: Span },

    #[error("{msg}")]
    Type { msg: String, span: Span },

    #[error("internal error: {msg}")]
    Internal { msg: String, span: Span },

    #[error("unbound name `{name}`")]
    Unbound {
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },

    #[error("core type check failed: {0}")]
    Check(#[from] TypeError),
}

impl LowerError {
    pub fn span(&self) -> Option<&Span> {
        match self {
            LowerError::Precondition(e) => Some(e.span()),
            LowerError::Semantic { span, .. } => Some(span),
            LowerError::Type { span, .. } => Some(span),
            LowerError::Internal { span, .. } => Some(span),
            LowerError::Unbound { span, .. } => Some(span),
            LowerError::Check(_) => None,
        }
    }

    fn semantic(msg: impl Into<String>, span: &Span) -> Self {
        LowerError::Semantic {
            msg: msg.into(),
            span: span.clone(),
        }
    }

    fn type_err(msg: impl Into<String>, span: &Span) -> Self {
        LowerError::Type {
            msg: msg.into(),
            span: span.clone(),
        }
    }

    fn internal(msg: impl Into<String>, span: &Span) -> Self {
        LowerError::Internal {
            msg: msg.into(),
            span: span.clone(),
        }
    }
}

/// Syntactic category approximation used by the cast builtins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Approx {
    Int,
    Bool,
    Seq,
    Tup,
    Func,
    Unknown,
}

/// Builtin names recognized in call position, for suggestions
const BUILTIN_NAMES: &[&str] = &[
    "abs", "all", "any", "argmax", "argmin", "bool", "ceildiv", "choose", "divmod", "enumerate",
    "fact", "filter", "floordiv", "gcd", "int", "lcm", "len", "list", "map", "max", "min", "mod",
    "modinv", "modpow", "multichoose", "permute", "pow", "product", "range", "reversed", "sorted",
    "sum", "tuple", "zip",
];

// ============================================================================
// Scope environment
// ============================================================================

#[derive(Debug, Clone)]
struct Binding {
    src: String,
    core: Name,
    cat: Approx,
}

/// One `let` to wrap around a continuation
struct Bind {
    name: Name,
    ty: CoreType,
    value: CoreExpr,
}

fn wrap(binds: Vec<Bind>, body: CoreExpr) -> CoreExpr {
    binds.into_iter().rev().fold(body, |acc, b| CoreExpr::Let {
        name: b.name,
        ty: b.ty,
        value: Rc::new(b.value),
        body: Rc::new(acc),
    })
}

pub struct LowerCtx {
    supply: Supply,
    scope: Vec<Binding>,
    /// Span of the function currently being lowered
    fn_span: Span,
}

impl LowerCtx {
    pub fn new(supply: Supply) -> Self {
        LowerCtx {
            supply,
            scope: Vec::new(),
            fn_span: Span::default(),
        }
    }

    fn snapshot(&self) -> usize {
        self.scope.len()
    }

    fn restore(&mut self, mark: usize) {
        self.scope.truncate(mark);
    }

    fn is_defined(&self, src: &str) -> bool {
        self.scope.iter().any(|b| b.src == src)
    }

    fn lookup(&self, src: &str) -> Option<(Name, Approx)> {
        self.scope
            .iter()
            .rev()
            .find(|b| b.src == src)
            .map(|b| (b.core.clone(), b.cat))
    }

    /// Bind a source name, minting a versioned core name when the source
    /// name is already visible so the emitted `let` never shadows
    fn define(&mut self, src: &str, cat: Approx) -> Name {
        let core = if self.is_defined(src) {
            self.supply.versioned(src)
        } else {
            src.to_string()
        };
        self.scope.push(Binding {
            src: src.to_string(),
            core: core.clone(),
            cat,
        });
        core
    }

    fn unbound(&self, name: &str, span: &Span) -> LowerError {
        let in_scope: Vec<&str> = self.scope.iter().map(|b| b.src.as_str()).collect();
        LowerError::Unbound {
            name: name.to_string(),
            span: span.clone(),
            suggestions: suggest_names(name, &in_scope, BUILTIN_NAMES),
        }
    }

    // ========================================================================
    // Type translation
    // ========================================================================

    fn translate_type(&mut self, ann: &TypeExpr) -> Result<CoreType, LowerError> {
        match &ann.node {
            TypeExprKind::Var(n) => Ok(CoreType::rigid(n.clone())),
            TypeExprKind::Int => Ok(CoreType::Int),
            TypeExprKind::Bool => Ok(CoreType::Bool),
            TypeExprKind::Str => Err(LowerError::semantic(
                "cannot use `str` type outside the entry point",
                &ann.span,
            )),
            TypeExprKind::SideEffect => Err(LowerError::semantic(
                "the side-effect type may only be used as an expression statement",
                &ann.span,
            )),
            TypeExprKind::List(inner) => Ok(CoreType::list(self.translate_type(inner)?)),
            TypeExprKind::Tuple(elems) => {
                let mut ts = Vec::with_capacity(elems.len());
                for e in elems {
                    ts.push(self.translate_type(e)?);
                }
                Ok(CoreType::Tuple(ts))
            }
            TypeExprKind::Callable { params, ret } => {
                let mut ps = Vec::with_capacity(params.len());
                for p in params {
                    ps.push(self.translate_type(p)?);
                }
                Ok(CoreType::arrows(ps, self.translate_type(ret)?))
            }
        }
    }

    // ========================================================================
    // Category approximation
    // ========================================================================

    fn approx_expr(&self, e: &Expr) -> Approx {
        match &e.node {
            ExprKind::Int(_) => Approx::Int,
            ExprKind::Bool(_) => Approx::Bool,
            ExprKind::NoneLit => Approx::Tup,
            ExprKind::Name(n) => self.lookup(n).map(|(_, c)| c).unwrap_or(Approx::Unknown),
            ExprKind::BoolOp { .. } | ExprKind::Compare { .. } => Approx::Bool,
            ExprKind::UnaryOp { op: UnaryOp::Not, .. } => Approx::Bool,
            ExprKind::UnaryOp { .. } | ExprKind::BinOp { .. } => Approx::Int,
            ExprKind::Lambda { .. } => Approx::Func,
            ExprKind::IfExp { then_branch, .. } => self.approx_expr(then_branch),
            ExprKind::ListComp { .. } | ExprKind::Slice { .. } | ExprKind::List { .. } => {
                Approx::Seq
            }
            ExprKind::Tuple(_) => Approx::Tup,
            ExprKind::Call { func, .. } => match &func.node {
                ExprKind::Name(n) if !self.is_defined(n) => builtin_result_approx(n),
                _ => Approx::Unknown,
            },
            _ => Approx::Unknown,
        }
    }

    // ========================================================================
    // Expression lowering
    // ========================================================================

    pub fn lower_expr(&mut self, e: &Expr) -> Result<CoreExpr, LowerError> {
        match &e.node {
            ExprKind::Int(n) => Ok(CoreExpr::Int(*n)),
            ExprKind::Bool(b) => Ok(CoreExpr::Bool(*b)),
            ExprKind::NoneLit => Ok(CoreExpr::Tuple(Vec::new())),

            ExprKind::Name(n) => {
                if let Some((core, _)) = self.lookup(n) {
                    return Ok(CoreExpr::Var(core));
                }
                if let Some(prim) = self.bare_builtin(n) {
                    return Ok(prim);
                }
                if BUILTIN_NAMES.contains(&n.as_str()) {
                    return Err(LowerError::semantic(
                        format!("builtin `{}` must be applied to arguments", n),
                        &e.span,
                    ));
                }
                Err(self.unbound(n, &e.span))
            }

            ExprKind::BoolOp { op, left, right } => {
                let prim = match op {
                    BoolOp::And => Prim::And,
                    BoolOp::Or => Prim::Or,
                };
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                Ok(CoreExpr::app(CoreExpr::prim(prim), vec![l, r]))
            }

            ExprKind::BinOp { op, left, right } => {
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                self.binop_apply(*op, l, r, &e.span)
            }

            ExprKind::UnaryOp { op, operand } => {
                let v = self.lower_expr(operand)?;
                let prim = match op {
                    UnaryOp::Not => Prim::Not,
                    UnaryOp::Invert => Prim::BitNot,
                    UnaryOp::Neg => Prim::Negate,
                    UnaryOp::Pos => {
                        // Elaborated to an identity lambda so the operand
                        // keeps its integer typing
                        let x = self.supply.fresh_name("x");
                        let lam = CoreExpr::Lam {
                            params: vec![(x.clone(), CoreType::Int)],
                            body: Rc::new(CoreExpr::Var(x)),
                        };
                        return Ok(CoreExpr::app(lam, vec![v]));
                    }
                };
                Ok(CoreExpr::app(CoreExpr::prim(prim), vec![v]))
            }

            ExprKind::Compare { op, left, right } => {
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                let cmp = match op {
                    CmpOp::Eq | CmpOp::Is => {
                        CoreExpr::prim_at(Prim::Eq, vec![self.supply.fresh_ty()])
                    }
                    CmpOp::NotEq | CmpOp::IsNot => {
                        CoreExpr::prim_at(Prim::Ne, vec![self.supply.fresh_ty()])
                    }
                    CmpOp::Lt => CoreExpr::prim(Prim::Lt),
                    CmpOp::LtE => CoreExpr::prim(Prim::Le),
                    CmpOp::Gt => CoreExpr::prim(Prim::Gt),
                    CmpOp::GtE => CoreExpr::prim(Prim::Ge),
                    CmpOp::In => CoreExpr::prim_at(Prim::Elem, vec![self.supply.fresh_ty()]),
                    CmpOp::NotIn => {
                        let t = self.supply.fresh_ty();
                        let x = self.supply.fresh_name("x");
                        let xs = self.supply.fresh_name("xs");
                        let elem = CoreExpr::app(
                            CoreExpr::prim_at(Prim::Elem, vec![t.clone()]),
                            vec![CoreExpr::Var(x.clone()), CoreExpr::Var(xs.clone())],
                        );
                        let lam = CoreExpr::Lam {
                            params: vec![(x, t.clone()), (xs, CoreType::list(t))],
                            body: Rc::new(CoreExpr::app(CoreExpr::prim(Prim::Not), vec![elem])),
                        };
                        return Ok(CoreExpr::app(lam, vec![l, r]));
                    }
                };
                Ok(CoreExpr::app(cmp, vec![l, r]))
            }

            ExprKind::Lambda { params, body } => {
                let mark = self.snapshot();
                let mut core_params = Vec::with_capacity(params.len());
                for p in params {
                    let t = self.supply.fresh_ty();
                    let name = self.define(p, Approx::Unknown);
                    core_params.push((name, t));
                }
                let b = self.lower_expr(body)?;
                self.restore(mark);
                Ok(CoreExpr::Lam {
                    params: core_params,
                    body: Rc::new(b),
                })
            }

            ExprKind::IfExp {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.lower_expr(cond)?;
                let t = self.lower_expr(then_branch)?;
                let f = self.lower_expr(else_branch)?;
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::If, vec![self.supply.fresh_ty()]),
                    vec![c, t, f],
                ))
            }

            ExprKind::ListComp {
                head,
                target,
                iter,
                cond,
            } => self.lower_comprehension(head, target, iter, cond.as_deref()),

            ExprKind::Call { func, args } => match &func.node {
                ExprKind::Name(n) if !self.is_defined(n) => {
                    self.lower_builtin_call(n, args, &e.span)
                }
                ExprKind::Attribute { value, attr } => {
                    self.lower_method_call(value, attr, args, &e.span)
                }
                _ => {
                    let f = self.lower_expr(func)?;
                    let mut lowered = Vec::with_capacity(args.len());
                    for a in args {
                        lowered.push(self.lower_expr(a)?);
                    }
                    Ok(CoreExpr::app(f, lowered))
                }
            },

            ExprKind::Attribute { attr, .. } => Err(LowerError::internal(
                format!("unresolved attribute `{}`", attr),
                &e.span,
            )),

            ExprKind::Subscript { value, index } => {
                let v = self.lower_expr(value)?;
                let i = self.lower_expr(index)?;
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::At, vec![self.supply.fresh_ty()]),
                    vec![v, i],
                ))
            }

            ExprKind::Slice {
                value,
                lower,
                upper,
                step,
            } => self.lower_slice(value, lower.as_deref(), upper.as_deref(), step.as_deref()),

            ExprKind::Starred(_) => Err(LowerError::semantic(
                "starred expressions are not supported",
                &e.span,
            )),

            ExprKind::List { elems, elem_ty } => {
                let t = match elem_ty {
                    Some(ann) => self.translate_type(ann)?,
                    None => self.supply.fresh_ty(),
                };
                let mut acc = CoreExpr::prim_at(Prim::Nil, vec![t.clone()]);
                for elem in elems.iter().rev() {
                    let v = self.lower_expr(elem)?;
                    acc = CoreExpr::app(
                        CoreExpr::prim_at(Prim::Cons, vec![t.clone()]),
                        vec![v, acc],
                    );
                }
                Ok(acc)
            }

            ExprKind::Tuple(elems) => {
                let mut lowered = Vec::with_capacity(elems.len());
                for e in elems {
                    lowered.push(self.lower_expr(e)?);
                }
                Ok(CoreExpr::Tuple(lowered))
            }
        }
    }

    fn binop_apply(
        &mut self,
        op: BinOp,
        left: CoreExpr,
        right: CoreExpr,
        span: &Span,
    ) -> Result<CoreExpr, LowerError> {
        let prim = match op {
            BinOp::Add => Prim::Add,
            BinOp::Sub => Prim::Sub,
            BinOp::Mul => Prim::Mul,
            BinOp::FloorDiv => Prim::FloorDiv,
            BinOp::Mod => Prim::Mod,
            BinOp::Pow => Prim::Pow,
            BinOp::BitAnd => Prim::BitAnd,
            BinOp::BitOr => Prim::BitOr,
            BinOp::BitXor => Prim::BitXor,
            BinOp::Shl => Prim::Shl,
            BinOp::Shr => Prim::Shr,
            BinOp::Max => Prim::Max2,
            BinOp::Min => Prim::Min2,
            BinOp::Div => {
                return Err(LowerError::semantic(
                    "true division is not supported; use `//`",
                    span,
                ))
            }
            BinOp::MatMult => {
                return Err(LowerError::semantic(
                    "matrix multiplication is not supported",
                    span,
                ))
            }
        };
        Ok(CoreExpr::app(CoreExpr::prim(prim), vec![left, right]))
    }

    /// `[head for target in iter if pred]` becomes
    /// `map (\y. head[target:=y]) (filter (\y. pred[target:=y]) iter)`
    fn lower_comprehension(
        &mut self,
        head: &Expr,
        target: &Target,
        iter: &Expr,
        cond: Option<&Expr>,
    ) -> Result<CoreExpr, LowerError> {
        let lowered_iter = self.lower_expr(iter)?;
        let elem_t = self.supply.fresh_ty();
        let y = self.supply.fresh_name("y");

        let iterable = match cond {
            Some(pred) => {
                let mark = self.snapshot();
                let binds = self.assign_target(
                    target,
                    CoreExpr::Var(y.clone()),
                    Some(elem_t.clone()),
                    Approx::Unknown,
                )?;
                let p = self.lower_expr(pred)?;
                self.restore(mark);
                let lam = CoreExpr::Lam {
                    params: vec![(y.clone(), elem_t.clone())],
                    body: Rc::new(wrap(binds, p)),
                };
                CoreExpr::app(
                    CoreExpr::prim_at(Prim::Filter, vec![elem_t.clone()]),
                    vec![lam, lowered_iter],
                )
            }
            None => lowered_iter,
        };

        let mark = self.snapshot();
        let binds = self.assign_target(
            target,
            CoreExpr::Var(y.clone()),
            Some(elem_t.clone()),
            Approx::Unknown,
        )?;
        let h = self.lower_expr(head)?;
        self.restore(mark);
        let lam = CoreExpr::Lam {
            params: vec![(y, elem_t.clone())],
            body: Rc::new(wrap(binds, h)),
        };
        let out_t = self.supply.fresh_ty();
        Ok(CoreExpr::app(
            CoreExpr::prim_at(Prim::Map, vec![elem_t, out_t]),
            vec![lam, iterable],
        ))
    }

    /// The eight slice forms, materialized as `map (\i. e[i]) range`
    fn lower_slice(
        &mut self,
        value: &Expr,
        lower: Option<&Expr>,
        upper: Option<&Expr>,
        step: Option<&Expr>,
    ) -> Result<CoreExpr, LowerError> {
        let elem_t = self.supply.fresh_ty();
        let i = self.supply.fresh_name("i");
        let indexed = CoreExpr::app(
            CoreExpr::prim_at(Prim::At, vec![elem_t.clone()]),
            vec![self.lower_expr(value)?, CoreExpr::Var(i.clone())],
        );
        let lam = CoreExpr::Lam {
            params: vec![(i, CoreType::Int)],
            body: Rc::new(indexed),
        };

        let len_of = |this: &mut Self| -> Result<CoreExpr, LowerError> {
            let t = this.supply.fresh_ty();
            Ok(CoreExpr::app(
                CoreExpr::prim_at(Prim::Len, vec![t]),
                vec![this.lower_expr(value)?],
            ))
        };

        let lo = match lower {
            Some(e) => Some(self.lower_expr(e)?),
            None => None,
        };
        let hi = match upper {
            Some(e) => Some(self.lower_expr(e)?),
            None => None,
        };
        let st = match step {
            Some(e) => Some(self.lower_expr(e)?),
            None => None,
        };

        let range = match (lo, hi, st) {
            (Some(l), Some(u), Some(s)) => {
                CoreExpr::app(CoreExpr::prim(Prim::Range3), vec![l, u, s])
            }
            (Some(l), Some(u), None) => CoreExpr::app(CoreExpr::prim(Prim::Range2), vec![l, u]),
            (Some(l), None, Some(s)) => {
                let len = len_of(self)?;
                CoreExpr::app(CoreExpr::prim(Prim::Range3), vec![l, len, s])
            }
            (Some(l), None, None) => {
                let len = len_of(self)?;
                CoreExpr::app(CoreExpr::prim(Prim::Range2), vec![l, len])
            }
            (None, Some(u), Some(s)) => {
                CoreExpr::app(CoreExpr::prim(Prim::Range3), vec![CoreExpr::Int(0), u, s])
            }
            (None, Some(u), None) => CoreExpr::app(CoreExpr::prim(Prim::Range1), vec![u]),
            (None, None, Some(s)) => {
                let len = len_of(self)?;
                CoreExpr::app(
                    CoreExpr::prim(Prim::Range3),
                    vec![CoreExpr::Int(0), len, s],
                )
            }
            (None, None, None) => {
                let len = len_of(self)?;
                CoreExpr::app(CoreExpr::prim(Prim::Range1), vec![len])
            }
        };

        Ok(CoreExpr::app(
            CoreExpr::prim_at(Prim::Map, vec![CoreType::Int, elem_t]),
            vec![lam, range],
        ))
    }

    // ========================================================================
    // Builtins
    // ========================================================================

    /// A builtin referenced as a value rather than called directly
    fn bare_builtin(&mut self, name: &str) -> Option<CoreExpr> {
        let prim = match name {
            "abs" => Prim::Abs,
            "fact" => Prim::Fact,
            "gcd" => Prim::Gcd,
            "lcm" => Prim::Lcm,
            "choose" => Prim::Choose,
            "permute" => Prim::Permute,
            "multichoose" => Prim::MultiChoose,
            "ceildiv" => Prim::CeilDiv,
            "floordiv" => Prim::FloorDiv,
            "mod" => Prim::Mod,
            "modinv" => Prim::ModInv,
            "modpow" => Prim::ModPow,
            "divmod" => Prim::DivMod,
            "sorted" => Prim::Sort,
            "sum" => Prim::Sum,
            "product" => Prim::Product,
            "all" => Prim::All,
            "any" => Prim::Any,
            "argmax" => Prim::Argmax,
            "argmin" => Prim::Argmin,
            "len" => Prim::Len,
            "reversed" => Prim::Reversed,
            "filter" => Prim::Filter,
            "map" => Prim::Map,
            _ => return None,
        };
        let tys = (0..prim.ty_arity())
            .map(|_| self.supply.fresh_ty())
            .collect();
        Some(CoreExpr::prim_at(prim, tys))
    }

    fn lower_builtin_call(
        &mut self,
        name: &str,
        args: &[Expr],
        span: &Span,
    ) -> Result<CoreExpr, LowerError> {
        let fixed = |this: &mut Self, prim: Prim, arity: usize| -> Result<CoreExpr, LowerError> {
            if args.len() != arity {
                return Err(LowerError::type_err(
                    format!("`{}` expects {} argument(s)", name, arity),
                    span,
                ));
            }
            let tys = (0..prim.ty_arity())
                .map(|_| this.supply.fresh_ty())
                .collect();
            let mut lowered = Vec::with_capacity(args.len());
            for a in args {
                lowered.push(this.lower_expr(a)?);
            }
            Ok(CoreExpr::app(CoreExpr::prim_at(prim, tys), lowered))
        };

        match name {
            "abs" => fixed(self, Prim::Abs, 1),
            "fact" => fixed(self, Prim::Fact, 1),
            "gcd" => fixed(self, Prim::Gcd, 2),
            "lcm" => fixed(self, Prim::Lcm, 2),
            "choose" => fixed(self, Prim::Choose, 2),
            "permute" => fixed(self, Prim::Permute, 2),
            "multichoose" => fixed(self, Prim::MultiChoose, 2),
            "ceildiv" => fixed(self, Prim::CeilDiv, 2),
            "floordiv" => fixed(self, Prim::FloorDiv, 2),
            "mod" => fixed(self, Prim::Mod, 2),
            "modinv" => fixed(self, Prim::ModInv, 2),
            "modpow" => fixed(self, Prim::ModPow, 3),
            "divmod" => fixed(self, Prim::DivMod, 2),
            "len" => fixed(self, Prim::Len, 1),
            "sorted" => fixed(self, Prim::Sort, 1),
            "reversed" => fixed(self, Prim::Reversed, 1),
            "sum" => fixed(self, Prim::Sum, 1),
            "product" => fixed(self, Prim::Product, 1),
            "all" => fixed(self, Prim::All, 1),
            "any" => fixed(self, Prim::Any, 1),
            "argmax" => fixed(self, Prim::Argmax, 1),
            "argmin" => fixed(self, Prim::Argmin, 1),
            "filter" => fixed(self, Prim::Filter, 2),

            "pow" => match args.len() {
                2 => fixed(self, Prim::Pow, 2),
                3 => fixed(self, Prim::ModPow, 3),
                _ => Err(LowerError::type_err("`pow` expects 2 or 3 arguments", span)),
            },

            "range" => match args.len() {
                1 => fixed(self, Prim::Range1, 1),
                2 => fixed(self, Prim::Range2, 2),
                3 => fixed(self, Prim::Range3, 3),
                _ => Err(LowerError::type_err(
                    "`range` expects 1 to 3 arguments",
                    span,
                )),
            },

            "map" => self.lower_map(args, span),
            "zip" => self.lower_zip(args, span),
            "enumerate" => self.lower_enumerate(args, span),

            "max" => self.lower_variadic_extremum("max", Prim::Max1, Prim::Max2, args, span),
            "min" => self.lower_variadic_extremum("min", Prim::Min1, Prim::Min2, args, span),

            "int" => self.lower_int_cast(args, span),
            "bool" => self.lower_bool_cast(args, span),
            "list" => self.lower_seq_cast(args, Approx::Seq, "list", span),
            "tuple" => self.lower_seq_cast(args, Approx::Tup, "tuple", span),

            "input" | "print" => Err(LowerError::semantic(
                format!("`{}` can only be used in the entry point", name),
                span,
            )),

            _ => Err(self.unbound(name, span)),
        }
    }

    /// `map(f, xs)` is the primitive; `map(f, xs, ys, ...)` walks a shared
    /// index range over all lists
    fn lower_map(&mut self, args: &[Expr], span: &Span) -> Result<CoreExpr, LowerError> {
        if args.len() < 2 {
            return Err(LowerError::type_err(
                "`map` expects a function and at least one list",
                span,
            ));
        }
        let f = self.lower_expr(&args[0])?;
        if args.len() == 2 {
            let a = self.supply.fresh_ty();
            let b = self.supply.fresh_ty();
            let xs = self.lower_expr(&args[1])?;
            return Ok(CoreExpr::app(
                CoreExpr::prim_at(Prim::Map, vec![a, b]),
                vec![f, xs],
            ));
        }
        let lists = &args[1..];
        let idx = self.supply.fresh_name("i");
        let mut applied_args = Vec::with_capacity(lists.len());
        for xs in lists {
            let t = self.supply.fresh_ty();
            applied_args.push(CoreExpr::app(
                CoreExpr::prim_at(Prim::At, vec![t]),
                vec![self.lower_expr(xs)?, CoreExpr::Var(idx.clone())],
            ));
        }
        let body = CoreExpr::app(f, applied_args);
        let bound = self.shared_length(lists)?;
        let out_t = self.supply.fresh_ty();
        Ok(CoreExpr::app(
            CoreExpr::prim_at(Prim::Map, vec![CoreType::Int, out_t]),
            vec![
                CoreExpr::Lam {
                    params: vec![(idx, CoreType::Int)],
                    body: Rc::new(body),
                },
                CoreExpr::app(CoreExpr::prim(Prim::Range1), vec![bound]),
            ],
        ))
    }

    fn lower_zip(&mut self, args: &[Expr], span: &Span) -> Result<CoreExpr, LowerError> {
        if args.len() < 2 {
            return Err(LowerError::type_err("`zip` expects at least 2 lists", span));
        }
        let idx = self.supply.fresh_name("i");
        let mut elems = Vec::with_capacity(args.len());
        for xs in args {
            let t = self.supply.fresh_ty();
            elems.push(CoreExpr::app(
                CoreExpr::prim_at(Prim::At, vec![t]),
                vec![self.lower_expr(xs)?, CoreExpr::Var(idx.clone())],
            ));
        }
        let bound = self.shared_length(args)?;
        let out_t = self.supply.fresh_ty();
        Ok(CoreExpr::app(
            CoreExpr::prim_at(Prim::Map, vec![CoreType::Int, out_t]),
            vec![
                CoreExpr::Lam {
                    params: vec![(idx, CoreType::Int)],
                    body: Rc::new(CoreExpr::Tuple(elems)),
                },
                CoreExpr::app(CoreExpr::prim(Prim::Range1), vec![bound]),
            ],
        ))
    }

    fn lower_enumerate(&mut self, args: &[Expr], span: &Span) -> Result<CoreExpr, LowerError> {
        if args.len() != 1 {
            return Err(LowerError::type_err("`enumerate` expects 1 argument", span));
        }
        let idx = self.supply.fresh_name("i");
        let t = self.supply.fresh_ty();
        let item = CoreExpr::app(
            CoreExpr::prim_at(Prim::At, vec![t.clone()]),
            vec![self.lower_expr(&args[0])?, CoreExpr::Var(idx.clone())],
        );
        let len_t = self.supply.fresh_ty();
        let len = CoreExpr::app(
            CoreExpr::prim_at(Prim::Len, vec![len_t]),
            vec![self.lower_expr(&args[0])?],
        );
        let out_t = self.supply.fresh_ty();
        Ok(CoreExpr::app(
            CoreExpr::prim_at(Prim::Map, vec![CoreType::Int, out_t]),
            vec![
                CoreExpr::Lam {
                    params: vec![(idx.clone(), CoreType::Int)],
                    body: Rc::new(CoreExpr::Tuple(vec![CoreExpr::Var(idx), item])),
                },
                CoreExpr::app(CoreExpr::prim(Prim::Range1), vec![len]),
            ],
        ))
    }

    /// `min(len xs0, len xs1, ...)` over every zipped list
    fn shared_length(&mut self, lists: &[Expr]) -> Result<CoreExpr, LowerError> {
        let mut lens = Vec::with_capacity(lists.len());
        for xs in lists {
            let t = self.supply.fresh_ty();
            lens.push(CoreExpr::app(
                CoreExpr::prim_at(Prim::Len, vec![t]),
                vec![self.lower_expr(xs)?],
            ));
        }
        let mut iter = lens.into_iter();
        let first = match iter.next() {
            Some(l) => l,
            None => CoreExpr::Int(0),
        };
        Ok(iter.fold(first, |acc, len| {
            CoreExpr::app(CoreExpr::prim(Prim::Min2), vec![acc, len])
        }))
    }

    /// 1-ary max/min reduces a list; N-ary builds the binary lambda tree
    fn lower_variadic_extremum(
        &mut self,
        name: &str,
        over_list: Prim,
        binary: Prim,
        args: &[Expr],
        span: &Span,
    ) -> Result<CoreExpr, LowerError> {
        match args.len() {
            0 => Err(LowerError::type_err(
                format!("`{}` expects at least 1 argument", name),
                span,
            )),
            1 => {
                let xs = self.lower_expr(&args[0])?;
                Ok(CoreExpr::app(CoreExpr::prim(over_list), vec![xs]))
            }
            n => {
                let params: Vec<(Name, CoreType)> = (0..n)
                    .map(|_| (self.supply.fresh_name("x"), CoreType::Int))
                    .collect();
                let mut body = CoreExpr::Var(params[n - 1].0.clone());
                for (name, _) in params[..n - 1].iter().rev() {
                    body = CoreExpr::app(
                        CoreExpr::prim(binary),
                        vec![CoreExpr::Var(name.clone()), body],
                    );
                }
                let lam = CoreExpr::Lam {
                    params,
                    body: Rc::new(body),
                };
                let mut lowered = Vec::with_capacity(n);
                for a in args {
                    lowered.push(self.lower_expr(a)?);
                }
                Ok(CoreExpr::app(lam, lowered))
            }
        }
    }

    fn lower_int_cast(&mut self, args: &[Expr], span: &Span) -> Result<CoreExpr, LowerError> {
        if args.len() != 1 {
            return Err(LowerError::type_err("`int` expects 1 argument", span));
        }
        match self.approx_expr(&args[0]) {
            Approx::Bool => {
                let v = self.lower_expr(&args[0])?;
                Ok(CoreExpr::app(CoreExpr::prim(Prim::BoolToInt), vec![v]))
            }
            Approx::Int | Approx::Unknown => self.lower_expr(&args[0]),
            _ => Err(LowerError::type_err(
                "`int` expects an int or bool argument",
                span,
            )),
        }
    }

    fn lower_bool_cast(&mut self, args: &[Expr], span: &Span) -> Result<CoreExpr, LowerError> {
        if args.len() != 1 {
            return Err(LowerError::type_err("`bool` expects 1 argument", span));
        }
        match self.approx_expr(&args[0]) {
            Approx::Bool | Approx::Unknown => self.lower_expr(&args[0]),
            Approx::Int => {
                let v = self.lower_expr(&args[0])?;
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::Ne, vec![CoreType::Int]),
                    vec![v, CoreExpr::Int(0)],
                ))
            }
            Approx::Seq => {
                let t = self.supply.fresh_ty();
                let len = CoreExpr::app(
                    CoreExpr::prim_at(Prim::Len, vec![t]),
                    vec![self.lower_expr(&args[0])?],
                );
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::Ne, vec![CoreType::Int]),
                    vec![len, CoreExpr::Int(0)],
                ))
            }
            _ => Err(LowerError::type_err(
                "`bool` expects a bool, int or list argument",
                span,
            )),
        }
    }

    /// `list(xs)` and `tuple(p)` are identities at the right category
    fn lower_seq_cast(
        &mut self,
        args: &[Expr],
        want: Approx,
        name: &str,
        span: &Span,
    ) -> Result<CoreExpr, LowerError> {
        if args.len() != 1 {
            return Err(LowerError::type_err(
                format!("`{}` expects 1 argument", name),
                span,
            ));
        }
        let got = self.approx_expr(&args[0]);
        if got == want || got == Approx::Unknown {
            self.lower_expr(&args[0])
        } else {
            Err(LowerError::type_err(
                format!("`{}` cannot convert this argument", name),
                span,
            ))
        }
    }

    fn lower_method_call(
        &mut self,
        obj: &Expr,
        attr: &str,
        args: &[Expr],
        span: &Span,
    ) -> Result<CoreExpr, LowerError> {
        match attr {
            // count(xs, x) = len (filter (\y. x == y) xs)
            "count" => {
                if args.len() != 1 {
                    return Err(LowerError::type_err("`count` expects 1 argument", span));
                }
                let xs = self.lower_expr(obj)?;
                let x = self.lower_expr(&args[0])?;
                let t = self.supply.fresh_ty();
                let y = self.supply.fresh_name("y");
                let pred = CoreExpr::Lam {
                    params: vec![(y.clone(), t.clone())],
                    body: Rc::new(CoreExpr::app(
                        CoreExpr::prim_at(Prim::Eq, vec![t.clone()]),
                        vec![x, CoreExpr::Var(y)],
                    )),
                };
                let filtered = CoreExpr::app(
                    CoreExpr::prim_at(Prim::Filter, vec![t.clone()]),
                    vec![pred, xs],
                );
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::Len, vec![t]),
                    vec![filtered],
                ))
            }

            // index(xs, x) = min1 (filter (\i. xs[i] == x) (range1 (len xs)))
            "index" => {
                if args.len() != 1 {
                    return Err(LowerError::type_err("`index` expects 1 argument", span));
                }
                let x = self.lower_expr(&args[0])?;
                let t = self.supply.fresh_ty();
                let i = self.supply.fresh_name("i");
                let item = CoreExpr::app(
                    CoreExpr::prim_at(Prim::At, vec![t.clone()]),
                    vec![self.lower_expr(obj)?, CoreExpr::Var(i.clone())],
                );
                let pred = CoreExpr::Lam {
                    params: vec![(i, CoreType::Int)],
                    body: Rc::new(CoreExpr::app(
                        CoreExpr::prim_at(Prim::Eq, vec![t.clone()]),
                        vec![item, x],
                    )),
                };
                let len_t = self.supply.fresh_ty();
                let len = CoreExpr::app(
                    CoreExpr::prim_at(Prim::Len, vec![len_t]),
                    vec![self.lower_expr(obj)?],
                );
                let indices = CoreExpr::app(CoreExpr::prim(Prim::Range1), vec![len]);
                let hits = CoreExpr::app(
                    CoreExpr::prim_at(Prim::Filter, vec![CoreType::Int]),
                    vec![pred, indices],
                );
                Ok(CoreExpr::app(CoreExpr::prim(Prim::Min1), vec![hits]))
            }

            "copy" => {
                if !args.is_empty() {
                    return Err(LowerError::type_err("`copy` expects no arguments", span));
                }
                self.lower_expr(obj)
            }

            "append" => Err(LowerError::semantic(
                "`append` can only be used as a statement",
                span,
            )),

            "split" => Err(LowerError::semantic(
                "`split` can only be used in the entry point",
                span,
            )),

            _ => Err(LowerError::internal(
                format!("unresolved attribute `{}`", attr),
                span,
            )),
        }
    }

    // ========================================================================
    // Target assignment
    // ========================================================================

    /// Thread `value` into the target: a name binds a `let`, a subscript
    /// becomes a functional update of its base, and a tuple pattern binds
    /// the value once and projects each component.
    fn assign_target(
        &mut self,
        target: &Target,
        value: CoreExpr,
        ann: Option<CoreType>,
        cat: Approx,
    ) -> Result<Vec<Bind>, LowerError> {
        match &target.node {
            TargetKind::Name(n) => {
                let ty = match ann {
                    Some(t) => t,
                    None => self.supply.fresh_ty(),
                };
                let core = self.define(n, cat);
                Ok(vec![Bind {
                    name: core,
                    ty,
                    value,
                }])
            }
            TargetKind::Subscript { base, index } => {
                let read = self.lower_target_read(base)?;
                let idx = self.lower_expr(index)?;
                let t = self.supply.fresh_ty();
                let updated = CoreExpr::app(
                    CoreExpr::prim_at(Prim::SetAt, vec![t]),
                    vec![read, idx, value],
                );
                self.assign_target(base, updated, None, Approx::Seq)
            }
            TargetKind::Tuple(ts) => {
                let y = self.supply.fresh_name("t");
                let tys: Vec<CoreType> = ts.iter().map(|_| self.supply.fresh_ty()).collect();
                let mut binds = vec![Bind {
                    name: y.clone(),
                    ty: CoreType::Tuple(tys.clone()),
                    value,
                }];
                for (i, sub) in ts.iter().enumerate() {
                    let proj = CoreExpr::Proj {
                        tuple: Rc::new(CoreExpr::Var(y.clone())),
                        index: i,
                    };
                    binds.extend(self.assign_target(
                        sub,
                        proj,
                        Some(tys[i].clone()),
                        Approx::Unknown,
                    )?);
                }
                Ok(binds)
            }
        }
    }

    /// Interpret a target as the expression reading its current value
    fn lower_target_read(&mut self, target: &Target) -> Result<CoreExpr, LowerError> {
        match &target.node {
            TargetKind::Name(n) => match self.lookup(n) {
                Some((core, _)) => Ok(CoreExpr::Var(core)),
                None => Err(self.unbound(n, &target.span)),
            },
            TargetKind::Subscript { base, index } => {
                let b = self.lower_target_read(base)?;
                let i = self.lower_expr(index)?;
                let t = self.supply.fresh_ty();
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::At, vec![t]),
                    vec![b, i],
                ))
            }
            TargetKind::Tuple(_) => Err(LowerError::semantic(
                "cannot read a tuple target as a value",
                &target.span,
            )),
        }
    }

    // ========================================================================
    // Statement lowering
    // ========================================================================

    /// Lower `stmts` followed by the pending tails of enclosing blocks.
    /// The tail of the list is the continuation of its head.
    fn lower_stmts(&mut self, stmts: &[Stmt], conts: &[&[Stmt]]) -> Result<CoreExpr, LowerError> {
        let Some((head, tail)) = stmts.split_first() else {
            if let Some((next, rest)) = conts.split_first() {
                return self.lower_stmts(next, rest);
            }
            return Err(LowerError::semantic(
                "function may not return",
                &self.fn_span,
            ));
        };

        match &head.node {
            // The continuation is dead after a return
            StmtKind::Return(e) => self.lower_expr(e),

            StmtKind::Assign { target, ty, value } => {
                let cat = match ty {
                    Some(ann) => approx_of_ann(ann),
                    None => self.approx_expr(value),
                };
                let v = self.lower_expr(value)?;
                let ann = match ty {
                    Some(t) => Some(self.translate_type(t)?),
                    None => None,
                };
                let mark = self.snapshot();
                let binds = self.assign_target(target, v, ann, cat)?;
                let rest = self.lower_stmts(tail, conts)?;
                self.restore(mark);
                Ok(wrap(binds, rest))
            }

            StmtKind::AugAssign { target, op, value } => {
                let read = self.lower_target_read(target)?;
                let v = self.lower_expr(value)?;
                let combined = self.binop_apply(*op, read, v, &head.span)?;
                let mark = self.snapshot();
                let binds = self.assign_target(target, combined, None, Approx::Int)?;
                let rest = self.lower_stmts(tail, conts)?;
                self.restore(mark);
                Ok(wrap(binds, rest))
            }

            StmtKind::For { target, iter, body } => {
                self.lower_for(head, target, iter, body, tail, conts)
            }

            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.lower_if(head, cond, then_body, else_body, tail, conts),

            StmtKind::Append { seq, value } => {
                let target = expr_to_target(seq).ok_or_else(|| {
                    LowerError::semantic("invalid `append` target", &head.span)
                })?;
                let read = self.lower_target_read(&target)?;
                let v = self.lower_expr(value)?;
                let t = self.supply.fresh_ty();
                let appended = CoreExpr::app(
                    CoreExpr::prim_at(Prim::Snoc, vec![t]),
                    vec![read, v],
                );
                let mark = self.snapshot();
                let binds = self.assign_target(&target, appended, None, Approx::Seq)?;
                let rest = self.lower_stmts(tail, conts)?;
                self.restore(mark);
                Ok(wrap(binds, rest))
            }

            // TODO: carry asserts into the core program as checker hints
            StmtKind::Assert(_) => self.lower_stmts(tail, conts),

            StmtKind::ExprStmt(_) => Err(LowerError::semantic(
                "expression statement has no effect",
                &head.span,
            )),
        }
    }

    /// The for-loop protocol: thread every previously live variable the
    /// body might write through a left fold as one tuple.
    fn lower_for(
        &mut self,
        stmt: &Stmt,
        target: &Target,
        iter: &Expr,
        body: &[Stmt],
        tail: &[Stmt],
        conts: &[&[Stmt]],
    ) -> Result<CoreExpr, LowerError> {
        let lowered_iter = self.lower_expr(iter)?;
        let elem_t = self.supply.fresh_ty();

        let writes = analyze_max(body).writes;
        let ys: Vec<String> = writes
            .iter()
            .filter(|w| self.is_defined(w.as_str()))
            .cloned()
            .collect();
        let tys: Vec<CoreType> = ys.iter().map(|_| self.supply.fresh_ty()).collect();
        let acc_ty = CoreType::Tuple(tys.clone());

        let mut init_elems = Vec::with_capacity(ys.len());
        for y in &ys {
            let (core, _) = self.lookup(y).ok_or_else(|| {
                LowerError::internal(format!("loop-carried variable `{}` vanished", y), &stmt.span)
            })?;
            init_elems.push(CoreExpr::Var(core));
        }
        let init = CoreExpr::Tuple(init_elems);

        let acc = self.supply.fresh_name("acc");
        let x = self.supply.fresh_name("x");

        let mark = self.snapshot();
        let mut step_binds = Vec::with_capacity(ys.len() + 1);
        for (i, y) in ys.iter().enumerate() {
            let cat = self.lookup(y).map(|(_, c)| c).unwrap_or(Approx::Unknown);
            let core = self.define(y, cat);
            step_binds.push(Bind {
                name: core,
                ty: tys[i].clone(),
                value: CoreExpr::Proj {
                    tuple: Rc::new(CoreExpr::Var(acc.clone())),
                    index: i,
                },
            });
        }
        step_binds.extend(self.assign_target(
            target,
            CoreExpr::Var(x.clone()),
            Some(elem_t.clone()),
            Approx::Unknown,
        )?);

        let mut step_body = body.to_vec();
        step_body.push(synthetic_return(&ys, &stmt.span));
        let lowered_body = self.lower_stmts(&step_body, &[])?;
        self.restore(mark);

        let step = CoreExpr::Lam {
            params: vec![(acc, acc_ty.clone()), (x, elem_t.clone())],
            body: Rc::new(wrap(step_binds, lowered_body)),
        };
        let fold = CoreExpr::app(
            CoreExpr::prim_at(Prim::Foldl, vec![acc_ty.clone(), elem_t]),
            vec![step, init, lowered_iter],
        );

        // Rebind the carried variables for the continuation
        let z = self.supply.fresh_name("z");
        let mark = self.snapshot();
        let mut out_binds = Vec::with_capacity(ys.len() + 1);
        out_binds.push(Bind {
            name: z.clone(),
            ty: acc_ty,
            value: fold,
        });
        for (i, y) in ys.iter().enumerate() {
            let cat = self.lookup(y).map(|(_, c)| c).unwrap_or(Approx::Unknown);
            let core = self.define(y, cat);
            out_binds.push(Bind {
                name: core,
                ty: tys[i].clone(),
                value: CoreExpr::Proj {
                    tuple: Rc::new(CoreExpr::Var(z.clone())),
                    index: i,
                },
            });
        }
        let rest = self.lower_stmts(tail, conts)?;
        self.restore(mark);
        Ok(wrap(out_binds, rest))
    }

    /// The if-statement protocol: four shapes depending on which branches
    /// always return. When neither does, the branches produce the tuple of
    /// names certainly written and read later, and the join unpacks it.
    fn lower_if(
        &mut self,
        stmt: &Stmt,
        cond: &Expr,
        then_body: &[Stmt],
        else_body: &[Stmt],
        tail: &[Stmt],
        conts: &[&[Stmt]],
    ) -> Result<CoreExpr, LowerError> {
        let c = self.lower_expr(cond)?;
        let ret_then = always_returns(then_body);
        let ret_else = always_returns(else_body);

        match (ret_then, ret_else) {
            (true, true) => {
                let t = self.lower_branch(then_body)?;
                let e = self.lower_branch(else_body)?;
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::If, vec![self.supply.fresh_ty()]),
                    vec![c, t, e],
                ))
            }
            (true, false) => {
                let t = self.lower_branch(then_body)?;
                let e = self.lower_branch_with_cont(else_body, tail, conts)?;
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::If, vec![self.supply.fresh_ty()]),
                    vec![c, t, e],
                ))
            }
            (false, true) => {
                let t = self.lower_branch_with_cont(then_body, tail, conts)?;
                let e = self.lower_branch(else_body)?;
                Ok(CoreExpr::app(
                    CoreExpr::prim_at(Prim::If, vec![self.supply.fresh_ty()]),
                    vec![c, t, e],
                ))
            }
            (false, false) => {
                let writes_then = analyze_min(then_body).writes;
                let writes_else = analyze_min(else_body).writes;

                let mut read_after: IndexSet<String> = IndexSet::new();
                read_after.extend(analyze_max(tail).reads);
                for block in conts {
                    read_after.extend(analyze_max(block).reads);
                }

                let mut joined: Vec<String> = Vec::new();
                for name in writes_then.iter().chain(writes_else.iter()) {
                    if read_after.contains(name) && !joined.contains(name) {
                        joined.push(name.clone());
                    }
                }

                let join_tys: Vec<CoreType> =
                    joined.iter().map(|_| self.supply.fresh_ty()).collect();
                let join_ty = CoreType::Tuple(join_tys.clone());

                let mut then_ext = then_body.to_vec();
                then_ext.push(synthetic_return(&joined, &stmt.span));
                let t = self.lower_branch(&then_ext)?;

                let mut else_ext = else_body.to_vec();
                else_ext.push(synthetic_return(&joined, &stmt.span));
                let e = self.lower_branch(&else_ext)?;

                let cond_app = CoreExpr::app(
                    CoreExpr::prim_at(Prim::If, vec![join_ty.clone()]),
                    vec![c, t, e],
                );

                let z = self.supply.fresh_name("z");
                let mark = self.snapshot();
                let mut out_binds = Vec::with_capacity(joined.len() + 1);
                out_binds.push(Bind {
                    name: z.clone(),
                    ty: join_ty,
                    value: cond_app,
                });
                for (i, name) in joined.iter().enumerate() {
                    let cat = self
                        .lookup(name)
                        .map(|(_, c)| c)
                        .unwrap_or(Approx::Unknown);
                    let core = self.define(name, cat);
                    out_binds.push(Bind {
                        name: core,
                        ty: join_tys[i].clone(),
                        value: CoreExpr::Proj {
                            tuple: Rc::new(CoreExpr::Var(z.clone())),
                            index: i,
                        },
                    });
                }
                let rest = self.lower_stmts(tail, conts)?;
                self.restore(mark);
                Ok(wrap(out_binds, rest))
            }
        }
    }

    fn lower_branch(&mut self, body: &[Stmt]) -> Result<CoreExpr, LowerError> {
        let mark = self.snapshot();
        let result = self.lower_stmts(body, &[]);
        self.restore(mark);
        result
    }

    fn lower_branch_with_cont(
        &mut self,
        body: &[Stmt],
        tail: &[Stmt],
        conts: &[&[Stmt]],
    ) -> Result<CoreExpr, LowerError> {
        let mark = self.snapshot();
        let mut pending: Vec<&[Stmt]> = Vec::with_capacity(conts.len() + 1);
        pending.push(tail);
        pending.extend_from_slice(conts);
        let result = self.lower_stmts(body, &pending);
        self.restore(mark);
        result
    }
}

/// `return (y0, y1, ...)` with the given names, used to close loop bodies
/// and joined branches
fn synthetic_return(names: &[String], span: &Span) -> Stmt {
    let elems: Vec<Expr> = names
        .iter()
        .map(|n| Expr::new(ExprKind::Name(n.clone()), span.clone()))
        .collect();
    let tuple = Expr::new(ExprKind::Tuple(elems), span.clone());
    Stmt::new(StmtKind::Return(tuple), span.clone())
}

fn approx_of_ann(ann: &TypeExpr) -> Approx {
    match &ann.node {
        TypeExprKind::Int => Approx::Int,
        TypeExprKind::Bool => Approx::Bool,
        TypeExprKind::List(_) => Approx::Seq,
        TypeExprKind::Tuple(_) => Approx::Tup,
        TypeExprKind::Callable { .. } => Approx::Func,
        _ => Approx::Unknown,
    }
}

fn builtin_result_approx(name: &str) -> Approx {
    match name {
        "len" | "sum" | "product" | "abs" | "fact" | "gcd" | "lcm" | "choose" | "permute"
        | "multichoose" | "ceildiv" | "floordiv" | "mod" | "modinv" | "modpow" | "pow" | "int"
        | "argmax" | "argmin" | "max" | "min" => Approx::Int,
        "bool" | "all" | "any" => Approx::Bool,
        "sorted" | "reversed" | "range" | "map" | "filter" | "zip" | "list" | "enumerate" => {
            Approx::Seq
        }
        "divmod" | "tuple" => Approx::Tup,
        _ => Approx::Unknown,
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Lower a whole program: preconditions, toplevel walk, thunk insertion,
/// then the core type check.
pub fn run(program: &Program) -> Result<CoreProgram, LowerError> {
    run_with(program, Supply::new())
}

pub fn run_with(program: &Program, supply: Supply) -> Result<CoreProgram, LowerError> {
    lint::check(program)?;

    let mut ctx = LowerCtx::new(supply);
    let mut defs = Vec::new();

    for item in &program.items {
        match item {
            Item::Assign {
                name, ty, value, ..
            } => {
                let cat = match ty {
                    Some(ann) => approx_of_ann(ann),
                    None => ctx.approx_expr(value),
                };
                let v = ctx.lower_expr(value)?;
                let ann = match ty {
                    Some(t) => ctx.translate_type(t)?,
                    None => ctx.supply.fresh_ty(),
                };
                let core = ctx.define(name, cat);
                defs.push(Toplevel::Let {
                    name: core,
                    ty: ann,
                    value: v,
                });
            }

            Item::Func(f) => {
                let mut param_tys = Vec::with_capacity(f.params.len());
                for p in &f.params {
                    let t = match &p.ty {
                        Some(ann) => ctx.translate_type(ann)?,
                        None => ctx.supply.fresh_ty(),
                    };
                    param_tys.push(t);
                }
                let ret_ty = match &f.ret {
                    Some(ann) => ctx.translate_type(ann)?,
                    None => ctx.supply.fresh_ty(),
                };
                let fn_ty = CoreType::arrows(param_tys.clone(), ret_ty);

                // Bound before the body so the function can call itself
                let core = ctx.define(&f.name, Approx::Func);

                let mark = ctx.snapshot();
                ctx.fn_span = f.span.clone();
                let mut core_params = Vec::with_capacity(f.params.len());
                for (p, t) in f.params.iter().zip(param_tys.into_iter()) {
                    let cat = p.ty.as_ref().map(approx_of_ann).unwrap_or(Approx::Unknown);
                    let pname = ctx.define(&p.name, cat);
                    core_params.push((pname, t));
                }
                let body = ctx.lower_stmts(&f.body, &[])?;
                ctx.restore(mark);

                defs.push(Toplevel::LetRec {
                    name: core,
                    ty: fn_ty,
                    value: CoreExpr::Lam {
                        params: core_params,
                        body: Rc::new(body),
                    },
                });
            }

            // TODO: surface toplevel asserts as hints on the core program
            Item::Assert(_) => {}
        }
    }

    let result = match ctx.lookup("solve") {
        Some((core, _)) => CoreExpr::Var(core),
        None => {
            return Err(LowerError::Semantic {
                msg: "entry function `solve` is not defined".into(),
                span: Span::default(),
            })
        }
    };

    let program = eager::eager_program(CoreProgram { defs, result });
    typecheck::check_program(&program)?;
    Ok(program)
}
