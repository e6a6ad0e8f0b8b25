//! Tree-walking evaluator for the core
//!
//! Strict in every argument position, which is exactly why the thunk pass
//! must run first: the `if` primitive selects between two already-built
//! nullary closures and only the chosen one is forced.
//!
//! Integer semantics follow the source language's host convention: floor
//! division and modulo round toward negative infinity, ranges with an
//! exhausted bound are empty, and negative subscripts count from the end.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::core_ir::{CoreExpr, CoreProgram, Name, Prim, Toplevel};

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {0} out of bounds for length {1}")]
    IndexOutOfBounds(i64, usize),
    #[error("empty sequence has no extremum")]
    EmptySequence,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("runtime error: {0}")]
    RuntimeError(String),
}

// ============================================================================
// Values and environments
// ============================================================================

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    List(Rc<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Closure {
        params: Rc<Vec<Name>>,
        body: Rc<CoreExpr>,
        env: Env,
    },
    PrimFn {
        prim: Prim,
        applied: Vec<Value>,
    },
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Closure { .. } => "function",
            Value::PrimFn { .. } => "builtin",
        }
    }

    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(values))
    }

    pub fn tuple(values: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(values))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other).unwrap_or(false)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Tuple(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Value::Closure { .. } => write!(f, "<function>"),
            Value::PrimFn { prim, .. } => write!(f, "<builtin {}>", prim.name()),
        }
    }
}

pub type Env = Rc<RefCell<EnvInner>>;

#[derive(Debug)]
pub struct EnvInner {
    bindings: HashMap<String, Value>,
    parent: Option<Env>,
}

impl EnvInner {
    pub fn new() -> Env {
        Rc::new(RefCell::new(EnvInner {
            bindings: HashMap::new(),
            parent: None,
        }))
    }

    pub fn with_parent(parent: &Env) -> Env {
        Rc::new(RefCell::new(EnvInner {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        }))
    }
}

fn env_define(env: &Env, name: impl Into<String>, value: Value) {
    env.borrow_mut().bindings.insert(name.into(), value);
}

fn env_lookup(env: &Env, name: &str) -> Option<Value> {
    let inner = env.borrow();
    if let Some(v) = inner.bindings.get(name) {
        return Some(v.clone());
    }
    match &inner.parent {
        Some(parent) => env_lookup(parent, name),
        None => None,
    }
}

// ============================================================================
// Evaluation
// ============================================================================

pub fn eval(env: &Env, e: &CoreExpr) -> Result<Value, EvalError> {
    match e {
        CoreExpr::Var(n) => {
            env_lookup(env, n).ok_or_else(|| EvalError::UnboundVariable(n.clone()))
        }
        CoreExpr::Int(n) => Ok(Value::Int(*n)),
        CoreExpr::Bool(b) => Ok(Value::Bool(*b)),

        CoreExpr::Prim { prim, .. } => {
            if prim.value_arity() == 0 {
                exec_prim(*prim, Vec::new())
            } else {
                Ok(Value::PrimFn {
                    prim: *prim,
                    applied: Vec::new(),
                })
            }
        }

        CoreExpr::Tuple(es) => {
            let mut vs = Vec::with_capacity(es.len());
            for e in es {
                vs.push(eval(env, e)?);
            }
            Ok(Value::tuple(vs))
        }

        CoreExpr::Proj { tuple, index } => match eval(env, tuple)? {
            Value::Tuple(vs) => vs
                .get(*index)
                .cloned()
                .ok_or_else(|| EvalError::TypeError(format!("no field {} in tuple", index))),
            other => Err(EvalError::TypeError(format!(
                "cannot project from {}",
                other.type_name()
            ))),
        },

        CoreExpr::App { func, args } => {
            let f = eval(env, func)?;
            let mut vs = Vec::with_capacity(args.len());
            for a in args {
                vs.push(eval(env, a)?);
            }
            apply(f, vs)
        }

        CoreExpr::Lam { params, body } => Ok(Value::Closure {
            params: Rc::new(params.iter().map(|(n, _)| n.clone()).collect()),
            body: body.clone(),
            env: env.clone(),
        }),

        CoreExpr::Let {
            name, value, body, ..
        } => {
            let v = eval(env, value)?;
            let child = EnvInner::with_parent(env);
            env_define(&child, name.clone(), v);
            eval(&child, body)
        }
    }
}

pub fn apply(f: Value, args: Vec<Value>) -> Result<Value, EvalError> {
    match f {
        Value::Closure { params, body, env } => {
            if args.is_empty() {
                return if params.is_empty() {
                    eval(&env, &body)
                } else {
                    Err(EvalError::TypeError(
                        "applied no arguments to a function".into(),
                    ))
                };
            }
            if args.len() < params.len() {
                let child = EnvInner::with_parent(&env);
                for (p, a) in params.iter().zip(args.iter()) {
                    env_define(&child, p.clone(), a.clone());
                }
                let remaining: Vec<Name> = params[args.len()..].to_vec();
                return Ok(Value::Closure {
                    params: Rc::new(remaining),
                    body,
                    env: child,
                });
            }
            let (now, later) = args.split_at(params.len());
            let child = EnvInner::with_parent(&env);
            for (p, a) in params.iter().zip(now.iter()) {
                env_define(&child, p.clone(), a.clone());
            }
            let result = eval(&child, &body)?;
            if later.is_empty() {
                Ok(result)
            } else {
                apply(result, later.to_vec())
            }
        }

        Value::PrimFn { prim, mut applied } => {
            applied.extend(args);
            let arity = prim.value_arity();
            if applied.len() < arity {
                return Ok(Value::PrimFn { prim, applied });
            }
            let later = applied.split_off(arity);
            let result = exec_prim(prim, applied)?;
            if later.is_empty() {
                Ok(result)
            } else {
                apply(result, later)
            }
        }

        other => Err(EvalError::TypeError(format!(
            "cannot apply a {}",
            other.type_name()
        ))),
    }
}

/// Evaluate every toplevel into a shared global environment and return the
/// program's result value
pub fn eval_program(program: &CoreProgram) -> Result<Value, EvalError> {
    let global = EnvInner::new();
    for def in &program.defs {
        let (name, value) = match def {
            Toplevel::Let { name, value, .. } => (name, value),
            Toplevel::LetRec { name, value, .. } => (name, value),
        };
        let v = eval(&global, value)?;
        env_define(&global, name.clone(), v);
    }
    eval(&global, &program.result)
}

/// Run the program's entry value applied to the given arguments
pub fn apply_entry(program: &CoreProgram, args: Vec<Value>) -> Result<Value, EvalError> {
    let entry = eval_program(program)?;
    if args.is_empty() {
        return Ok(entry);
    }
    apply(entry, args)
}

// ============================================================================
// Primitive execution
// ============================================================================

fn int_of(v: &Value) -> Result<i64, EvalError> {
    match v {
        Value::Int(n) => Ok(*n),
        other => Err(EvalError::TypeError(format!(
            "expected int, found {}",
            other.type_name()
        ))),
    }
}

fn bool_of(v: &Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(EvalError::TypeError(format!(
            "expected bool, found {}",
            other.type_name()
        ))),
    }
}

fn list_of(v: &Value) -> Result<Rc<Vec<Value>>, EvalError> {
    match v {
        Value::List(vs) => Ok(vs.clone()),
        other => Err(EvalError::TypeError(format!(
            "expected list, found {}",
            other.type_name()
        ))),
    }
}

fn ints_of(v: &Value) -> Result<Vec<i64>, EvalError> {
    list_of(v)?.iter().map(int_of).collect()
}

fn values_equal(a: &Value, b: &Value) -> Result<bool, EvalError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::List(xs), Value::List(ys)) | (Value::Tuple(xs), Value::Tuple(ys)) => {
            if xs.len() != ys.len() {
                return Ok(false);
            }
            for (x, y) in xs.iter().zip(ys.iter()) {
                if !values_equal(x, y)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Err(EvalError::TypeError(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn exec_prim(prim: Prim, args: Vec<Value>) -> Result<Value, EvalError> {
    match prim {
        // Integer arithmetic
        Prim::Add => int2(&args, |a, b| a.checked_add(b).ok_or(EvalError::Overflow)),
        Prim::Sub => int2(&args, |a, b| a.checked_sub(b).ok_or(EvalError::Overflow)),
        Prim::Mul => int2(&args, |a, b| a.checked_mul(b).ok_or(EvalError::Overflow)),
        Prim::FloorDiv => int2(&args, floordiv),
        Prim::CeilDiv => int2(&args, ceildiv),
        Prim::Mod => int2(&args, pymod),
        Prim::Pow => int2(&args, powi),
        Prim::ModPow => {
            let (b, e, m) = (int_of(&args[0])?, int_of(&args[1])?, int_of(&args[2])?);
            Ok(Value::Int(modpow(b, e, m)?))
        }
        Prim::ModInv => int2(&args, modinv),
        Prim::DivMod => {
            let (a, b) = (int_of(&args[0])?, int_of(&args[1])?);
            Ok(Value::tuple(vec![
                Value::Int(floordiv(a, b)?),
                Value::Int(pymod(a, b)?),
            ]))
        }
        Prim::Gcd => int2(&args, |a, b| gcd(a, b)),
        Prim::Lcm => int2(&args, lcm),
        Prim::Negate => int1(&args, |a| a.checked_neg().ok_or(EvalError::Overflow)),
        Prim::Abs => int1(&args, |a| a.checked_abs().ok_or(EvalError::Overflow)),
        Prim::Fact => int1(&args, fact),
        Prim::Choose => int2(&args, choose),
        Prim::Permute => int2(&args, permute),
        Prim::MultiChoose => int2(&args, |n, k| {
            if k == 0 {
                return Ok(1);
            }
            let m = n.checked_add(k).and_then(|s| s.checked_sub(1));
            choose(m.ok_or(EvalError::Overflow)?, k)
        }),
        Prim::Max2 => int2(&args, |a, b| Ok(a.max(b))),
        Prim::Min2 => int2(&args, |a, b| Ok(a.min(b))),

        // Bitwise
        Prim::BitAnd => int2(&args, |a, b| Ok(a & b)),
        Prim::BitOr => int2(&args, |a, b| Ok(a | b)),
        Prim::BitXor => int2(&args, |a, b| Ok(a ^ b)),
        Prim::Shl => int2(&args, shl),
        Prim::Shr => int2(&args, shr),
        Prim::BitNot => int1(&args, |a| Ok(!a)),

        // Booleans
        Prim::And => {
            let (a, b) = (bool_of(&args[0])?, bool_of(&args[1])?);
            Ok(Value::Bool(a && b))
        }
        Prim::Or => {
            let (a, b) = (bool_of(&args[0])?, bool_of(&args[1])?);
            Ok(Value::Bool(a || b))
        }
        Prim::Implies => {
            let (a, b) = (bool_of(&args[0])?, bool_of(&args[1])?);
            Ok(Value::Bool(!a || b))
        }
        Prim::Not => Ok(Value::Bool(!bool_of(&args[0])?)),
        Prim::BoolToInt => Ok(Value::Int(if bool_of(&args[0])? { 1 } else { 0 })),

        // Comparison
        Prim::Eq => Ok(Value::Bool(values_equal(&args[0], &args[1])?)),
        Prim::Ne => Ok(Value::Bool(!values_equal(&args[0], &args[1])?)),
        Prim::Lt => cmp2(&args, |a, b| a < b),
        Prim::Le => cmp2(&args, |a, b| a <= b),
        Prim::Gt => cmp2(&args, |a, b| a > b),
        Prim::Ge => cmp2(&args, |a, b| a >= b),
        Prim::Elem => {
            let xs = list_of(&args[1])?;
            for x in xs.iter() {
                if values_equal(&args[0], x)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }

        // Lists
        Prim::Len => Ok(Value::Int(list_of(&args[0])?.len() as i64)),
        Prim::Cons => {
            let xs = list_of(&args[1])?;
            let mut out = Vec::with_capacity(xs.len() + 1);
            out.push(args[0].clone());
            out.extend(xs.iter().cloned());
            Ok(Value::list(out))
        }
        Prim::Snoc => {
            let xs = list_of(&args[0])?;
            let mut out = Vec::with_capacity(xs.len() + 1);
            out.extend(xs.iter().cloned());
            out.push(args[1].clone());
            Ok(Value::list(out))
        }
        Prim::At => {
            let xs = list_of(&args[0])?;
            let i = int_of(&args[1])?;
            let idx = normalize_index(i, xs.len())?;
            Ok(xs[idx].clone())
        }
        Prim::SetAt => {
            let xs = list_of(&args[0])?;
            let i = int_of(&args[1])?;
            let idx = normalize_index(i, xs.len())?;
            let mut out: Vec<Value> = xs.iter().cloned().collect();
            out[idx] = args[2].clone();
            Ok(Value::list(out))
        }
        Prim::Nil => Ok(Value::list(Vec::new())),
        Prim::Map => {
            let f = args[0].clone();
            let xs = list_of(&args[1])?;
            let mut out = Vec::with_capacity(xs.len());
            for x in xs.iter() {
                out.push(apply(f.clone(), vec![x.clone()])?);
            }
            Ok(Value::list(out))
        }
        Prim::Filter => {
            let f = args[0].clone();
            let xs = list_of(&args[1])?;
            let mut out = Vec::new();
            for x in xs.iter() {
                if bool_of(&apply(f.clone(), vec![x.clone()])?)? {
                    out.push(x.clone());
                }
            }
            Ok(Value::list(out))
        }
        Prim::Foldl => {
            let f = args[0].clone();
            let mut acc = args[1].clone();
            let xs = list_of(&args[2])?;
            for x in xs.iter() {
                acc = apply(f.clone(), vec![acc, x.clone()])?;
            }
            Ok(acc)
        }
        Prim::Sort => {
            let mut ns = ints_of(&args[0])?;
            ns.sort_unstable();
            Ok(Value::list(ns.into_iter().map(Value::Int).collect()))
        }
        Prim::Reversed => {
            let xs = list_of(&args[0])?;
            Ok(Value::list(xs.iter().rev().cloned().collect()))
        }
        Prim::Range1 => {
            let n = int_of(&args[0])?;
            Ok(Value::list((0..n.max(0)).map(Value::Int).collect()))
        }
        Prim::Range2 => {
            let (a, b) = (int_of(&args[0])?, int_of(&args[1])?);
            Ok(Value::list((a..b.max(a)).map(Value::Int).collect()))
        }
        Prim::Range3 => {
            let (a, b, s) = (int_of(&args[0])?, int_of(&args[1])?, int_of(&args[2])?);
            if s == 0 {
                return Err(EvalError::RuntimeError("range step must not be zero".into()));
            }
            let mut out = Vec::new();
            let mut i = a;
            if s > 0 {
                while i < b {
                    out.push(Value::Int(i));
                    i = i.checked_add(s).ok_or(EvalError::Overflow)?;
                }
            } else {
                while i > b {
                    out.push(Value::Int(i));
                    i = i.checked_add(s).ok_or(EvalError::Overflow)?;
                }
            }
            Ok(Value::list(out))
        }
        Prim::Sum => {
            let mut total: i64 = 0;
            for n in ints_of(&args[0])? {
                total = total.checked_add(n).ok_or(EvalError::Overflow)?;
            }
            Ok(Value::Int(total))
        }
        Prim::Product => {
            let mut total: i64 = 1;
            for n in ints_of(&args[0])? {
                total = total.checked_mul(n).ok_or(EvalError::Overflow)?;
            }
            Ok(Value::Int(total))
        }
        Prim::All => {
            for v in list_of(&args[0])?.iter() {
                if !bool_of(v)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Prim::Any => {
            for v in list_of(&args[0])?.iter() {
                if bool_of(v)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Prim::Max1 => extremum(&args[0], true).map(|(_, v)| Value::Int(v)),
        Prim::Min1 => extremum(&args[0], false).map(|(_, v)| Value::Int(v)),
        Prim::Argmax => extremum(&args[0], true).map(|(i, _)| Value::Int(i as i64)),
        Prim::Argmin => extremum(&args[0], false).map(|(i, _)| Value::Int(i as i64)),

        // Both branches arrive as thunk closures; only the chosen one is
        // forced by the trailing nullary application
        Prim::If => {
            if bool_of(&args[0])? {
                Ok(args[1].clone())
            } else {
                Ok(args[2].clone())
            }
        }
    }
}

fn int1(args: &[Value], f: impl Fn(i64) -> Result<i64, EvalError>) -> Result<Value, EvalError> {
    Ok(Value::Int(f(int_of(&args[0])?)?))
}

fn int2(
    args: &[Value],
    f: impl Fn(i64, i64) -> Result<i64, EvalError>,
) -> Result<Value, EvalError> {
    Ok(Value::Int(f(int_of(&args[0])?, int_of(&args[1])?)?))
}

fn cmp2(args: &[Value], f: impl Fn(i64, i64) -> bool) -> Result<Value, EvalError> {
    Ok(Value::Bool(f(int_of(&args[0])?, int_of(&args[1])?)))
}

fn normalize_index(i: i64, len: usize) -> Result<usize, EvalError> {
    let adjusted = if i < 0 { i + len as i64 } else { i };
    if adjusted < 0 || adjusted as usize >= len {
        return Err(EvalError::IndexOutOfBounds(i, len));
    }
    Ok(adjusted as usize)
}

fn extremum(v: &Value, want_max: bool) -> Result<(usize, i64), EvalError> {
    let ns = ints_of(v)?;
    let mut best: Option<(usize, i64)> = None;
    for (i, n) in ns.into_iter().enumerate() {
        let better = match best {
            None => true,
            Some((_, b)) => {
                if want_max {
                    n > b
                } else {
                    n < b
                }
            }
        };
        if better {
            best = Some((i, n));
        }
    }
    best.ok_or(EvalError::EmptySequence)
}

// ============================================================================
// Integer helpers (host-language conventions)
// ============================================================================

fn floordiv(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let q = a.checked_div(b).ok_or(EvalError::Overflow)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn ceildiv(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let q = floordiv(a, b)?;
    if a % b != 0 && (a < 0) == (b < 0) {
        Ok(q + 1)
    } else {
        Ok(q)
    }
}

fn pymod(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn powi(base: i64, exp: i64) -> Result<i64, EvalError> {
    if exp < 0 {
        return Err(EvalError::RuntimeError(
            "negative exponent without a modulus".into(),
        ));
    }
    let mut result: i64 = 1;
    let mut base = base;
    let mut exp = exp as u64;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(base).ok_or(EvalError::Overflow)?;
        }
        exp >>= 1;
        if exp > 0 {
            base = base.checked_mul(base).ok_or(EvalError::Overflow)?;
        }
    }
    Ok(result)
}

fn modpow(base: i64, exp: i64, modulus: i64) -> Result<i64, EvalError> {
    if modulus == 0 {
        return Err(EvalError::DivisionByZero);
    }
    if exp < 0 {
        let inv = modinv(pymod(base, modulus)?, modulus)?;
        return modpow(inv, -exp, modulus);
    }
    let m = modulus as i128;
    let mut result: i128 = 1i128.rem_euclid(m);
    let mut base = (base as i128).rem_euclid(m);
    let mut exp = exp as u64;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * base % m;
        }
        exp >>= 1;
        base = base * base % m;
    }
    Ok(pymod(result as i64, modulus)?)
}

fn modinv(a: i64, m: i64) -> Result<i64, EvalError> {
    if m == 0 {
        return Err(EvalError::DivisionByZero);
    }
    // Extended Euclid on (a mod m, m)
    let (mut old_r, mut r) = (pymod(a, m)?, m);
    let (mut old_s, mut s) = (1i64, 0i64);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }
    if old_r != 1 && old_r != -1 {
        return Err(EvalError::RuntimeError(format!(
            "{} has no inverse modulo {}",
            a, m
        )));
    }
    pymod(old_s * old_r.signum(), m)
}

fn gcd(a: i64, b: i64) -> Result<i64, EvalError> {
    let (mut x, mut y) = (a.unsigned_abs(), b.unsigned_abs());
    while y != 0 {
        (x, y) = (y, x % y);
    }
    i64::try_from(x).map_err(|_| EvalError::Overflow)
}

fn lcm(a: i64, b: i64) -> Result<i64, EvalError> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    let g = gcd(a, b)?;
    (a / g)
        .checked_mul(b)
        .and_then(i64::checked_abs)
        .ok_or(EvalError::Overflow)
}

fn fact(n: i64) -> Result<i64, EvalError> {
    if n < 0 {
        return Err(EvalError::RuntimeError(
            "factorial of a negative number".into(),
        ));
    }
    let mut result: i64 = 1;
    for k in 2..=n {
        result = result.checked_mul(k).ok_or(EvalError::Overflow)?;
    }
    Ok(result)
}

fn choose(n: i64, k: i64) -> Result<i64, EvalError> {
    if n < 0 || k < 0 {
        return Err(EvalError::RuntimeError(
            "binomial with a negative argument".into(),
        ));
    }
    if k > n {
        return Ok(0);
    }
    let k = k.min(n - k);
    let mut result: i128 = 1;
    for i in 0..k {
        result = result * (n - i) as i128 / (i + 1) as i128;
        if result > i64::MAX as i128 {
            return Err(EvalError::Overflow);
        }
    }
    Ok(result as i64)
}

fn permute(n: i64, k: i64) -> Result<i64, EvalError> {
    if n < 0 || k < 0 {
        return Err(EvalError::RuntimeError(
            "permutation with a negative argument".into(),
        ));
    }
    if k > n {
        return Ok(0);
    }
    let mut result: i64 = 1;
    for i in 0..k {
        result = result.checked_mul(n - i).ok_or(EvalError::Overflow)?;
    }
    Ok(result)
}

fn shl(a: i64, b: i64) -> Result<i64, EvalError> {
    if b < 0 {
        return Err(EvalError::RuntimeError("negative shift count".into()));
    }
    let shift = u32::try_from(b).map_err(|_| EvalError::Overflow)?;
    a.checked_shl(shift).ok_or(EvalError::Overflow)
}

fn shr(a: i64, b: i64) -> Result<i64, EvalError> {
    if b < 0 {
        return Err(EvalError::RuntimeError("negative shift count".into()));
    }
    if b >= 64 {
        return Ok(if a < 0 { -1 } else { 0 });
    }
    Ok(a >> b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        assert_eq!(floordiv(7, 2).unwrap(), 3);
        assert_eq!(floordiv(-7, 2).unwrap(), -4);
        assert_eq!(floordiv(7, -2).unwrap(), -4);
        assert_eq!(floordiv(-7, -2).unwrap(), 3);
    }

    #[test]
    fn modulo_takes_sign_of_divisor() {
        assert_eq!(pymod(7, 3).unwrap(), 1);
        assert_eq!(pymod(-7, 3).unwrap(), 2);
        assert_eq!(pymod(7, -3).unwrap(), -2);
        assert_eq!(pymod(-7, -3).unwrap(), -1);
    }

    #[test]
    fn ceil_division_complements_floor() {
        assert_eq!(ceildiv(7, 2).unwrap(), 4);
        assert_eq!(ceildiv(-7, 2).unwrap(), -3);
        assert_eq!(ceildiv(6, 2).unwrap(), 3);
    }

    #[test]
    fn exhausted_ranges_are_empty() {
        let r = exec_prim(Prim::Range2, vec![Value::Int(5), Value::Int(2)]).unwrap();
        assert_eq!(r, Value::list(vec![]));
        let r = exec_prim(Prim::Range1, vec![Value::Int(-3)]).unwrap();
        assert_eq!(r, Value::list(vec![]));
    }

    #[test]
    fn negative_step_counts_down() {
        let r = exec_prim(
            Prim::Range3,
            vec![Value::Int(5), Value::Int(1), Value::Int(-2)],
        )
        .unwrap();
        assert_eq!(r, Value::list(vec![Value::Int(5), Value::Int(3)]));
    }

    #[test]
    fn negative_subscript_counts_from_the_end() {
        let xs = Value::list(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        let r = exec_prim(Prim::At, vec![xs, Value::Int(-1)]).unwrap();
        assert_eq!(r, Value::Int(30));
    }

    #[test]
    fn set_at_is_a_functional_update() {
        let xs = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let r = exec_prim(
            Prim::SetAt,
            vec![xs.clone(), Value::Int(0), Value::Int(9)],
        )
        .unwrap();
        assert_eq!(r, Value::list(vec![Value::Int(9), Value::Int(2)]));
        assert_eq!(xs, Value::list(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn modular_inverse_round_trips() {
        let inv = modinv(3, 11).unwrap();
        assert_eq!(pymod(3 * inv, 11).unwrap(), 1);
        assert!(modinv(2, 4).is_err());
    }

    #[test]
    fn modpow_matches_naive_power() {
        assert_eq!(modpow(3, 13, 1000).unwrap(), 3i64.pow(13) % 1000);
        assert_eq!(modpow(2, 10, 7).unwrap(), 1024 % 7);
    }

    #[test]
    fn combinatorics_basics() {
        assert_eq!(choose(10, 3).unwrap(), 120);
        assert_eq!(choose(3, 10).unwrap(), 0);
        assert_eq!(permute(5, 2).unwrap(), 20);
        assert_eq!(fact(6).unwrap(), 720);
    }

    #[test]
    fn argmax_returns_first_maximum() {
        let xs = Value::list(vec![
            Value::Int(1),
            Value::Int(9),
            Value::Int(9),
            Value::Int(2),
        ]);
        let r = exec_prim(Prim::Argmax, vec![xs]).unwrap();
        assert_eq!(r, Value::Int(1));
    }
}
