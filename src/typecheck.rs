//! Core type checker
//!
//! Syntax-directed checking by unification. Every binder in the core is
//! annotated, possibly with holes; the checker links holes to concrete
//! types and rejects anything that will not unify. No generalization:
//! core `let` is monomorphic.

use std::rc::Rc;

use thiserror::Error;

use crate::core_ir::{CoreExpr, CoreProgram, CoreType, Name, Toplevel, TyVar, TypeVarId};

/// Checker-minted holes live far above the ids the lowering supply issues,
/// so occurs checks never confuse the two
const CHECKER_VAR_BASE: TypeVarId = 1 << 30;

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("unbound core variable: {0}")]
    UnboundVariable(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch {
        expected: CoreType,
        found: CoreType,
    },
    #[error("occurs check failed: t{0} occurs in {1}")]
    Occurs(TypeVarId, CoreType),
    #[error("expected a function, found {0}")]
    NotFunction(CoreType),
    #[error("expected a thunk, found {0}")]
    NotThunk(CoreType),
    #[error("cannot project field {index} from {ty}")]
    BadProjection { index: usize, ty: CoreType },
    #[error("primitive `{0}` carries the wrong number of type arguments")]
    PrimInstance(&'static str),
}

pub fn check_program(program: &CoreProgram) -> Result<CoreType, TypeError> {
    let mut checker = Checker::new();
    checker.check_program(program)
}

pub struct Checker {
    env: Vec<(Name, CoreType)>,
    next_var: TypeVarId,
}

impl Checker {
    pub fn new() -> Self {
        Checker {
            env: Vec::new(),
            next_var: CHECKER_VAR_BASE,
        }
    }

    fn fresh(&mut self) -> CoreType {
        let id = self.next_var;
        self.next_var += 1;
        CoreType::new_unbound(id)
    }

    fn lookup(&self, name: &str) -> Result<CoreType, TypeError> {
        self.env
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| TypeError::UnboundVariable(name.to_string()))
    }

    pub fn check_program(&mut self, program: &CoreProgram) -> Result<CoreType, TypeError> {
        for def in &program.defs {
            match def {
                Toplevel::Let { name, ty, value } => {
                    let vt = self.infer(value)?;
                    unify(&vt, ty)?;
                    self.env.push((name.clone(), ty.clone()));
                }
                Toplevel::LetRec { name, ty, value } => {
                    self.env.push((name.clone(), ty.clone()));
                    let vt = self.infer(value)?;
                    unify(&vt, ty)?;
                }
            }
        }
        self.infer(&program.result)
    }

    pub fn infer(&mut self, e: &CoreExpr) -> Result<CoreType, TypeError> {
        match e {
            CoreExpr::Var(n) => self.lookup(n),
            CoreExpr::Int(_) => Ok(CoreType::Int),
            CoreExpr::Bool(_) => Ok(CoreType::Bool),

            CoreExpr::Prim { prim, tys } => prim
                .instance(tys)
                .ok_or(TypeError::PrimInstance(prim.name())),

            CoreExpr::Tuple(es) => {
                let mut ts = Vec::with_capacity(es.len());
                for e in es {
                    ts.push(self.infer(e)?);
                }
                Ok(CoreType::Tuple(ts))
            }

            CoreExpr::Proj { tuple, index } => {
                let t = self.infer(tuple)?;
                match t.resolve() {
                    CoreType::Tuple(ts) if *index < ts.len() => Ok(ts[*index].clone()),
                    other => Err(TypeError::BadProjection {
                        index: *index,
                        ty: other,
                    }),
                }
            }

            CoreExpr::App { func, args } => {
                let mut ft = self.infer(func)?;
                if args.is_empty() {
                    return match ft.resolve() {
                        CoreType::Thunk(r) => Ok((*r).clone()),
                        hole @ CoreType::Var(_) => {
                            let r = self.fresh();
                            unify(&hole, &CoreType::Thunk(Rc::new(r.clone())))?;
                            Ok(r)
                        }
                        other => Err(TypeError::NotThunk(other)),
                    };
                }
                for a in args {
                    let at = self.infer(a)?;
                    match ft.resolve() {
                        CoreType::Fun(param, ret) => {
                            unify(&param, &at)?;
                            ft = (*ret).clone();
                        }
                        hole @ CoreType::Var(_) => {
                            let r = self.fresh();
                            unify(
                                &hole,
                                &CoreType::Fun(Rc::new(at), Rc::new(r.clone())),
                            )?;
                            ft = r;
                        }
                        other => return Err(TypeError::NotFunction(other)),
                    }
                }
                Ok(ft)
            }

            CoreExpr::Lam { params, body } => {
                let mark = self.env.len();
                for (n, t) in params {
                    self.env.push((n.clone(), t.clone()));
                }
                let bt = self.infer(body)?;
                self.env.truncate(mark);
                Ok(CoreType::arrows(
                    params.iter().map(|(_, t)| t.clone()).collect(),
                    bt,
                ))
            }

            CoreExpr::Let {
                name,
                ty,
                value,
                body,
            } => {
                let vt = self.infer(value)?;
                unify(&vt, ty)?;
                self.env.push((name.clone(), ty.clone()));
                let bt = self.infer(body);
                self.env.pop();
                bt
            }
        }
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Unification
// ============================================================================

pub fn unify(t1: &CoreType, t2: &CoreType) -> Result<(), TypeError> {
    let t1 = t1.resolve();
    let t2 = t2.resolve();

    match (&t1, &t2) {
        (CoreType::Int, CoreType::Int) => Ok(()),
        (CoreType::Bool, CoreType::Bool) => Ok(()),

        (CoreType::Var(v1), CoreType::Var(v2)) if Rc::ptr_eq(v1, v2) => Ok(()),

        (CoreType::Var(v1), CoreType::Var(v2)) => {
            let r1 = v1.borrow().clone();
            let r2 = v2.borrow().clone();
            match (r1, r2) {
                // A named annotation variable equals itself wherever the
                // annotation was translated
                (TyVar::Rigid(a), TyVar::Rigid(b)) if a == b => Ok(()),
                (TyVar::Unbound { .. }, _) => {
                    *v1.borrow_mut() = TyVar::Link(t2.clone());
                    Ok(())
                }
                (_, TyVar::Unbound { .. }) => {
                    *v2.borrow_mut() = TyVar::Link(t1.clone());
                    Ok(())
                }
                _ => Err(TypeError::Mismatch {
                    expected: t1.clone(),
                    found: t2.clone(),
                }),
            }
        }

        (CoreType::Var(var), other) | (other, CoreType::Var(var)) => {
            let inner = var.borrow().clone();
            match inner {
                TyVar::Link(_) => unreachable!("resolve should have followed links"),
                TyVar::Unbound { id } => {
                    if other.occurs(id) {
                        return Err(TypeError::Occurs(id, other.clone()));
                    }
                    *var.borrow_mut() = TyVar::Link(other.clone());
                    Ok(())
                }
                TyVar::Rigid(_) => Err(TypeError::Mismatch {
                    expected: t1.clone(),
                    found: t2.clone(),
                }),
            }
        }

        (CoreType::List(a), CoreType::List(b)) => unify(a, b),

        (CoreType::Tuple(ts1), CoreType::Tuple(ts2)) if ts1.len() == ts2.len() => {
            for (a, b) in ts1.iter().zip(ts2.iter()) {
                unify(a, b)?;
            }
            Ok(())
        }

        (CoreType::Fun(a1, r1), CoreType::Fun(a2, r2)) => {
            unify(a1, a2)?;
            unify(r1, r2)
        }

        (CoreType::Thunk(a), CoreType::Thunk(b)) => unify(a, b),

        _ => Err(TypeError::Mismatch {
            expected: t1,
            found: t2,
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
