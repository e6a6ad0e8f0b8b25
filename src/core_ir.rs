//! Core intermediate representation
//!
//! A pure, typed lambda-calculus IR. Lowering emits it with fresh type
//! variables as holes; the checker solves the holes by unification. All
//! nodes are immutable values built bottom-up.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type Name = String;

// ============================================================================
// Types
// ============================================================================

/// A type variable ID
pub type TypeVarId = u32;

#[derive(Debug, Clone)]
pub enum CoreType {
    /// Type variable (possibly unified with another type)
    Var(Rc<RefCell<TyVar>>),

    Int,
    Bool,

    /// list t
    List(Rc<CoreType>),

    /// (t1, ..., tn)
    Tuple(Vec<CoreType>),

    /// Single-argument arrow; n-ary functions are curried chains
    Fun(Rc<CoreType>, Rc<CoreType>),

    /// Nullary function: () -> t
    Thunk(Rc<CoreType>),
}

#[derive(Debug, Clone)]
pub enum TyVar {
    /// Unbound hole with a unique ID
    Unbound { id: TypeVarId },
    /// Bound to another type
    Link(CoreType),
    /// A named type variable from a source annotation; unifies only with
    /// itself
    Rigid(String),
}

impl CoreType {
    pub fn new_unbound(id: TypeVarId) -> CoreType {
        CoreType::Var(Rc::new(RefCell::new(TyVar::Unbound { id })))
    }

    pub fn rigid(name: impl Into<String>) -> CoreType {
        CoreType::Var(Rc::new(RefCell::new(TyVar::Rigid(name.into()))))
    }

    pub fn list(elem: CoreType) -> CoreType {
        CoreType::List(Rc::new(elem))
    }

    /// Follow all links to the representative type
    pub fn resolve(&self) -> CoreType {
        match self {
            CoreType::Var(var) => match &*var.borrow() {
                TyVar::Link(ty) => ty.resolve(),
                _ => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Occurs check: does the unbound variable `id` appear in this type?
    pub fn occurs(&self, id: TypeVarId) -> bool {
        match self.resolve() {
            CoreType::Var(var) => match &*var.borrow() {
                TyVar::Unbound { id: vid } => *vid == id,
                TyVar::Rigid(_) => false,
                TyVar::Link(_) => unreachable!("resolve should have followed links"),
            },
            CoreType::Int | CoreType::Bool => false,
            CoreType::List(t) => t.occurs(id),
            CoreType::Tuple(ts) => ts.iter().any(|t| t.occurs(id)),
            CoreType::Fun(a, r) => a.occurs(id) || r.occurs(id),
            CoreType::Thunk(t) => t.occurs(id),
        }
    }

    /// Curried function type from N argument types and a return type.
    /// Zero arguments gives a thunk type.
    pub fn arrows(args: Vec<CoreType>, ret: CoreType) -> CoreType {
        if args.is_empty() {
            return CoreType::Thunk(Rc::new(ret));
        }
        args.into_iter()
            .rev()
            .fold(ret, |acc, arg| CoreType::Fun(Rc::new(arg), Rc::new(acc)))
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            CoreType::Var(var) => match &*var.borrow() {
                TyVar::Unbound { id } => write!(f, "t{}", id),
                TyVar::Rigid(name) => write!(f, "{}", name),
                TyVar::Link(_) => unreachable!(),
            },
            CoreType::Int => write!(f, "int"),
            CoreType::Bool => write!(f, "bool"),
            CoreType::List(t) => write!(f, "[{}]", t),
            CoreType::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
            CoreType::Fun(a, r) => {
                let a_str = match a.resolve() {
                    CoreType::Fun(_, _) | CoreType::Thunk(_) => format!("({})", a),
                    _ => format!("{}", a),
                };
                write!(f, "{} -> {}", a_str, r)
            }
            CoreType::Thunk(t) => write!(f, "() -> {}", t),
        }
    }
}

// ============================================================================
// Primitives
// ============================================================================

/// Builtin primitives. Type-indexed primitives carry their instantiation
/// holes in `CoreExpr::Prim::tys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    // Integer arithmetic
    Add,
    Sub,
    Mul,
    FloorDiv,
    CeilDiv,
    Mod,
    Pow,
    ModPow,
    ModInv,
    DivMod,
    Gcd,
    Lcm,
    Negate,
    Abs,
    Fact,
    Choose,
    Permute,
    MultiChoose,
    Max2,
    Min2,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    BitNot,

    // Booleans
    And,
    Or,
    Implies,
    Not,
    BoolToInt,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Elem,

    // Lists
    Len,
    Cons,
    Snoc,
    At,
    SetAt,
    Nil,
    Map,
    Filter,
    Foldl,
    Sort,
    Reversed,
    Range1,
    Range2,
    Range3,
    Sum,
    Product,
    All,
    Any,
    Max1,
    Min1,
    Argmax,
    Argmin,

    // Lazy-by-convention conditional; made strict-safe by the thunk pass
    If,
}

impl Prim {
    pub fn name(self) -> &'static str {
        match self {
            Prim::Add => "add",
            Prim::Sub => "sub",
            Prim::Mul => "mul",
            Prim::FloorDiv => "floordiv",
            Prim::CeilDiv => "ceildiv",
            Prim::Mod => "mod",
            Prim::Pow => "pow",
            Prim::ModPow => "modpow",
            Prim::ModInv => "modinv",
            Prim::DivMod => "divmod",
            Prim::Gcd => "gcd",
            Prim::Lcm => "lcm",
            Prim::Negate => "negate",
            Prim::Abs => "abs",
            Prim::Fact => "fact",
            Prim::Choose => "choose",
            Prim::Permute => "permute",
            Prim::MultiChoose => "multichoose",
            Prim::Max2 => "max2",
            Prim::Min2 => "min2",
            Prim::BitAnd => "bitand",
            Prim::BitOr => "bitor",
            Prim::BitXor => "bitxor",
            Prim::Shl => "shl",
            Prim::Shr => "shr",
            Prim::BitNot => "bitnot",
            Prim::And => "and",
            Prim::Or => "or",
            Prim::Implies => "implies",
            Prim::Not => "not",
            Prim::BoolToInt => "bool_to_int",
            Prim::Eq => "eq",
            Prim::Ne => "ne",
            Prim::Lt => "lt",
            Prim::Le => "le",
            Prim::Gt => "gt",
            Prim::Ge => "ge",
            Prim::Elem => "elem",
            Prim::Len => "len",
            Prim::Cons => "cons",
            Prim::Snoc => "snoc",
            Prim::At => "at",
            Prim::SetAt => "set_at",
            Prim::Nil => "nil",
            Prim::Map => "map",
            Prim::Filter => "filter",
            Prim::Foldl => "foldl",
            Prim::Sort => "sort",
            Prim::Reversed => "reversed",
            Prim::Range1 => "range1",
            Prim::Range2 => "range2",
            Prim::Range3 => "range3",
            Prim::Sum => "sum",
            Prim::Product => "product",
            Prim::All => "all",
            Prim::Any => "any",
            Prim::Max1 => "max1",
            Prim::Min1 => "min1",
            Prim::Argmax => "argmax",
            Prim::Argmin => "argmin",
            Prim::If => "if",
        }
    }

    /// How many instantiation type arguments this primitive carries
    pub fn ty_arity(self) -> usize {
        match self {
            Prim::Eq
            | Prim::Ne
            | Prim::Elem
            | Prim::Len
            | Prim::Cons
            | Prim::Snoc
            | Prim::At
            | Prim::SetAt
            | Prim::Nil
            | Prim::Filter
            | Prim::Reversed
            | Prim::If => 1,
            Prim::Map | Prim::Foldl => 2,
            _ => 0,
        }
    }

    /// How many value arguments the primitive consumes when saturated
    pub fn value_arity(self) -> usize {
        match self {
            Prim::Nil => 0,
            Prim::Negate
            | Prim::Abs
            | Prim::Fact
            | Prim::BitNot
            | Prim::Not
            | Prim::BoolToInt
            | Prim::Len
            | Prim::Sort
            | Prim::Reversed
            | Prim::Range1
            | Prim::Sum
            | Prim::Product
            | Prim::All
            | Prim::Any
            | Prim::Max1
            | Prim::Min1
            | Prim::Argmax
            | Prim::Argmin => 1,
            Prim::ModPow | Prim::SetAt | Prim::Foldl | Prim::Range3 | Prim::If => 3,
            _ => 2,
        }
    }

    /// The type of this primitive at the given instantiation. `None` when
    /// the number of type arguments is wrong.
    pub fn instance(self, tys: &[CoreType]) -> Option<CoreType> {
        use CoreType as T;
        if tys.len() != self.ty_arity() {
            return None;
        }
        let t = || tys[0].clone();
        let ty = match self {
            Prim::Add
            | Prim::Sub
            | Prim::Mul
            | Prim::FloorDiv
            | Prim::CeilDiv
            | Prim::Mod
            | Prim::Pow
            | Prim::ModInv
            | Prim::Gcd
            | Prim::Lcm
            | Prim::Choose
            | Prim::Permute
            | Prim::MultiChoose
            | Prim::Max2
            | Prim::Min2
            | Prim::BitAnd
            | Prim::BitOr
            | Prim::BitXor
            | Prim::Shl
            | Prim::Shr => T::arrows(vec![T::Int, T::Int], T::Int),
            Prim::ModPow => T::arrows(vec![T::Int, T::Int, T::Int], T::Int),
            Prim::DivMod => T::arrows(vec![T::Int, T::Int], T::Tuple(vec![T::Int, T::Int])),
            Prim::Negate | Prim::Abs | Prim::Fact | Prim::BitNot => {
                T::arrows(vec![T::Int], T::Int)
            }
            Prim::And | Prim::Or | Prim::Implies => T::arrows(vec![T::Bool, T::Bool], T::Bool),
            Prim::Not => T::arrows(vec![T::Bool], T::Bool),
            Prim::BoolToInt => T::arrows(vec![T::Bool], T::Int),
            Prim::Eq | Prim::Ne => T::arrows(vec![t(), t()], T::Bool),
            Prim::Lt | Prim::Le | Prim::Gt | Prim::Ge => {
                T::arrows(vec![T::Int, T::Int], T::Bool)
            }
            Prim::Elem => T::arrows(vec![t(), T::list(t())], T::Bool),
            Prim::Len => T::arrows(vec![T::list(t())], T::Int),
            Prim::Cons => T::arrows(vec![t(), T::list(t())], T::list(t())),
            Prim::Snoc => T::arrows(vec![T::list(t()), t()], T::list(t())),
            Prim::At => T::arrows(vec![T::list(t()), T::Int], t()),
            Prim::SetAt => T::arrows(vec![T::list(t()), T::Int, t()], T::list(t())),
            Prim::Nil => T::list(t()),
            Prim::Map => {
                let (a, b) = (tys[0].clone(), tys[1].clone());
                T::arrows(
                    vec![T::arrows(vec![a.clone()], b.clone()), T::list(a)],
                    T::list(b),
                )
            }
            Prim::Filter => T::arrows(
                vec![T::arrows(vec![t()], T::Bool), T::list(t())],
                T::list(t()),
            ),
            Prim::Foldl => {
                let (a, b) = (tys[0].clone(), tys[1].clone());
                T::arrows(
                    vec![
                        T::arrows(vec![a.clone(), b.clone()], a.clone()),
                        a.clone(),
                        T::list(b),
                    ],
                    a,
                )
            }
            Prim::Sort => T::arrows(vec![T::list(T::Int)], T::list(T::Int)),
            Prim::Reversed => T::arrows(vec![T::list(t())], T::list(t())),
            Prim::Range1 => T::arrows(vec![T::Int], T::list(T::Int)),
            Prim::Range2 => T::arrows(vec![T::Int, T::Int], T::list(T::Int)),
            Prim::Range3 => T::arrows(vec![T::Int, T::Int, T::Int], T::list(T::Int)),
            Prim::Sum | Prim::Product | Prim::Max1 | Prim::Min1 | Prim::Argmax | Prim::Argmin => {
                T::arrows(vec![T::list(T::Int)], T::Int)
            }
            Prim::All | Prim::Any => T::arrows(vec![T::list(T::Bool)], T::Bool),
            Prim::If => T::arrows(vec![T::Bool, t(), t()], t()),
        };
        Some(ty)
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone)]
pub enum CoreExpr {
    Var(Name),
    Int(i64),
    Bool(bool),

    /// A builtin at a concrete type instantiation
    Prim { prim: Prim, tys: Vec<CoreType> },

    /// Tuple constructor; the empty tuple is the unit value
    Tuple(Vec<CoreExpr>),

    /// Tuple projection
    Proj { tuple: Rc<CoreExpr>, index: usize },

    /// Application; zero arguments forces a thunk
    App {
        func: Rc<CoreExpr>,
        args: Vec<CoreExpr>,
    },

    /// Lambda with typed parameters; zero parameters is a thunk
    Lam {
        params: Vec<(Name, CoreType)>,
        body: Rc<CoreExpr>,
    },

    /// Monomorphic binding with an annotated type
    Let {
        name: Name,
        ty: CoreType,
        value: Rc<CoreExpr>,
        body: Rc<CoreExpr>,
    },
}

impl CoreExpr {
    pub fn prim(prim: Prim) -> CoreExpr {
        CoreExpr::Prim {
            prim,
            tys: Vec::new(),
        }
    }

    pub fn prim_at(prim: Prim, tys: Vec<CoreType>) -> CoreExpr {
        CoreExpr::Prim { prim, tys }
    }

    pub fn app(func: CoreExpr, args: Vec<CoreExpr>) -> CoreExpr {
        CoreExpr::App {
            func: Rc::new(func),
            args,
        }
    }

    pub fn var(name: impl Into<Name>) -> CoreExpr {
        CoreExpr::Var(name.into())
    }
}

// ============================================================================
// Programs
// ============================================================================

#[derive(Debug, Clone)]
pub enum Toplevel {
    /// Non-recursive binding
    Let {
        name: Name,
        ty: CoreType,
        value: CoreExpr,
    },
    /// Recursive binding; the name is in scope in its own value
    LetRec {
        name: Name,
        ty: CoreType,
        value: CoreExpr,
    },
}

#[derive(Debug, Clone)]
pub struct CoreProgram {
    pub defs: Vec<Toplevel>,
    /// The result expression; by convention the entry function `solve`
    pub result: CoreExpr,
}

// ============================================================================
// Fresh-name supply
// ============================================================================

/// Mints globally unique variable names and type variables from one
/// monotonic counter. Generated names carry a `$`, which the lexer never
/// produces, so they cannot collide with source names.
#[derive(Debug, Clone)]
pub struct Supply {
    next: u32,
}

impl Supply {
    pub fn new() -> Self {
        Supply { next: 0 }
    }

    pub fn with_start(next: u32) -> Self {
        Supply { next }
    }

    fn tick(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// A fresh variable name such as `$x3`
    pub fn fresh_name(&mut self, hint: &str) -> Name {
        let id = self.tick();
        format!("${}{}", hint, id)
    }

    /// A versioned rendering of a source name, e.g. `x$7`
    pub fn versioned(&mut self, base: &str) -> Name {
        let id = self.tick();
        format!("{}${}", base, id)
    }

    /// A fresh unbound type variable
    pub fn fresh_ty(&mut self) -> CoreType {
        CoreType::new_unbound(self.tick())
    }
}

impl Default for Supply {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Pretty printing
// ============================================================================

impl CoreExpr {
    pub fn pretty(&self, indent: usize) -> String {
        let pad = "  ".repeat(indent);
        match self {
            CoreExpr::Var(name) => name.clone(),
            CoreExpr::Int(n) => format!("{}", n),
            CoreExpr::Bool(b) => format!("{}", b),
            CoreExpr::Prim { prim, .. } => prim.name().to_string(),
            CoreExpr::Tuple(es) => {
                let parts: Vec<_> = es.iter().map(|e| e.pretty(indent)).collect();
                format!("({})", parts.join(", "))
            }
            CoreExpr::Proj { tuple, index } => {
                format!("{}.{}", atom(tuple, indent), index)
            }
            CoreExpr::App { func, args } => {
                if args.is_empty() {
                    return format!("{} ()", atom(func, indent));
                }
                let parts: Vec<_> = args.iter().map(|a| atom(a, indent)).collect();
                format!("{} {}", atom(func, indent), parts.join(" "))
            }
            CoreExpr::Lam { params, body } => {
                let params_str: Vec<_> = params
                    .iter()
                    .map(|(n, t)| format!("{}: {}", n, t))
                    .collect();
                format!(
                    "fun ({}) -> {}",
                    params_str.join(", "),
                    body.pretty(indent)
                )
            }
            CoreExpr::Let {
                name,
                ty,
                value,
                body,
            } => {
                format!(
                    "let {} : {} = {} in\n{}{}",
                    name,
                    ty,
                    value.pretty(indent),
                    pad,
                    body.pretty(indent)
                )
            }
        }
    }
}

/// Parenthesize non-atomic subexpressions
fn atom(e: &CoreExpr, indent: usize) -> String {
    match e {
        CoreExpr::Var(_)
        | CoreExpr::Int(_)
        | CoreExpr::Bool(_)
        | CoreExpr::Prim { .. }
        | CoreExpr::Tuple(_)
        | CoreExpr::Proj { .. } => e.pretty(indent),
        _ => format!("({})", e.pretty(indent)),
    }
}

impl fmt::Display for CoreExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty(0))
    }
}

impl fmt::Display for CoreProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for def in &self.defs {
            match def {
                Toplevel::Let { name, ty, value } => {
                    writeln!(f, "let {} : {} =\n  {}", name, ty, value.pretty(1))?;
                }
                Toplevel::LetRec { name, ty, value } => {
                    writeln!(f, "let rec {} : {} =\n  {}", name, ty, value.pretty(1))?;
                }
            }
        }
        write!(f, "{}", self.result.pretty(0))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supply_is_monotonic_and_unique() {
        let mut s = Supply::new();
        let a = s.fresh_name("x");
        let b = s.fresh_name("x");
        let c = s.versioned("x");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert!(a.starts_with('$'));
        assert!(c.contains('$'));
    }

    #[test]
    fn arrows_builds_curried_chain() {
        let t = CoreType::arrows(vec![CoreType::Int, CoreType::Bool], CoreType::Int);
        assert_eq!(format!("{}", t), "int -> bool -> int");
    }

    #[test]
    fn arrows_with_no_args_is_a_thunk() {
        let t = CoreType::arrows(vec![], CoreType::Int);
        assert_eq!(format!("{}", t), "() -> int");
    }

    #[test]
    fn prim_instance_checks_ty_arity() {
        assert!(Prim::Add.instance(&[]).is_some());
        assert!(Prim::At.instance(&[]).is_none());
        assert!(Prim::At.instance(&[CoreType::Int]).is_some());
    }

    #[test]
    fn resolve_follows_links() {
        let hole = CoreType::new_unbound(0);
        if let CoreType::Var(cell) = &hole {
            *cell.borrow_mut() = TyVar::Link(CoreType::Int);
        }
        assert!(matches!(hole.resolve(), CoreType::Int));
    }
}
