//! Strictness-safe conditionals
//!
//! The lowered `if` builtin is lazy by convention: only the taken branch
//! may be evaluated. A strict evaluator would diverge on recursive
//! definitions, so this bottom-up rewrite defers both branches behind
//! nullary lambdas and forces the chosen one:
//!
//! ```text
//! if p a b   ==>   (if p (fun () -> a) (fun () -> b)) ()
//! ```
//!
//! The `if` primitive is retyped at `() -> t` so the wrapped program still
//! checks.

use std::rc::Rc;

use crate::core_ir::{CoreExpr, CoreProgram, CoreType, Prim, Toplevel};

pub fn eager_program(program: CoreProgram) -> CoreProgram {
    CoreProgram {
        defs: program
            .defs
            .into_iter()
            .map(|def| match def {
                Toplevel::Let { name, ty, value } => Toplevel::Let {
                    name,
                    ty,
                    value: eager_expr(&value),
                },
                Toplevel::LetRec { name, ty, value } => Toplevel::LetRec {
                    name,
                    ty,
                    value: eager_expr(&value),
                },
            })
            .collect(),
        result: eager_expr(&program.result),
    }
}

pub fn eager_expr(e: &CoreExpr) -> CoreExpr {
    match e {
        CoreExpr::Var(_) | CoreExpr::Int(_) | CoreExpr::Bool(_) | CoreExpr::Prim { .. } => {
            e.clone()
        }

        CoreExpr::Tuple(es) => CoreExpr::Tuple(es.iter().map(eager_expr).collect()),

        CoreExpr::Proj { tuple, index } => CoreExpr::Proj {
            tuple: Rc::new(eager_expr(tuple)),
            index: *index,
        },

        CoreExpr::App { func, args } => {
            if let CoreExpr::Prim {
                prim: Prim::If,
                tys,
            } = &**func
            {
                if args.len() == 3 && tys.len() == 1 {
                    let cond = eager_expr(&args[0]);
                    let then_branch = eager_expr(&args[1]);
                    let else_branch = eager_expr(&args[2]);
                    let thunk_ty = CoreType::Thunk(Rc::new(tys[0].clone()));
                    let chosen = CoreExpr::App {
                        func: Rc::new(CoreExpr::Prim {
                            prim: Prim::If,
                            tys: vec![thunk_ty],
                        }),
                        args: vec![
                            cond,
                            CoreExpr::Lam {
                                params: Vec::new(),
                                body: Rc::new(then_branch),
                            },
                            CoreExpr::Lam {
                                params: Vec::new(),
                                body: Rc::new(else_branch),
                            },
                        ],
                    };
                    return CoreExpr::App {
                        func: Rc::new(chosen),
                        args: Vec::new(),
                    };
                }
            }
            CoreExpr::App {
                func: Rc::new(eager_expr(func)),
                args: args.iter().map(eager_expr).collect(),
            }
        }

        CoreExpr::Lam { params, body } => CoreExpr::Lam {
            params: params.clone(),
            body: Rc::new(eager_expr(body)),
        },

        CoreExpr::Let {
            name,
            ty,
            value,
            body,
        } => CoreExpr::Let {
            name: name.clone(),
            ty: ty.clone(),
            value: Rc::new(eager_expr(value)),
            body: Rc::new(eager_expr(body)),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn if_app(cond: CoreExpr, a: CoreExpr, b: CoreExpr) -> CoreExpr {
        CoreExpr::app(
            CoreExpr::prim_at(Prim::If, vec![CoreType::Int]),
            vec![cond, a, b],
        )
    }

    #[test]
    fn wraps_branches_in_thunks_and_forces() {
        let e = if_app(CoreExpr::Bool(true), CoreExpr::Int(1), CoreExpr::Int(2));
        let wrapped = eager_expr(&e);

        // Outermost: a nullary application
        let CoreExpr::App { func, args } = &wrapped else {
            panic!("expected application");
        };
        assert!(args.is_empty());

        // Inside: if applied to cond plus two thunks
        let CoreExpr::App { func: inner, args } = &**func else {
            panic!("expected inner application");
        };
        assert!(matches!(
            &**inner,
            CoreExpr::Prim {
                prim: Prim::If,
                ..
            }
        ));
        assert_eq!(args.len(), 3);
        assert!(matches!(&args[1], CoreExpr::Lam { params, .. } if params.is_empty()));
        assert!(matches!(&args[2], CoreExpr::Lam { params, .. } if params.is_empty()));
    }

    #[test]
    fn rewrites_nested_ifs_bottom_up() {
        let inner = if_app(CoreExpr::Bool(false), CoreExpr::Int(1), CoreExpr::Int(2));
        let outer = if_app(CoreExpr::Bool(true), inner, CoreExpr::Int(3));
        let wrapped = eager_expr(&outer);

        // Count `if` prims; both must survive, both thunked
        fn count_ifs(e: &CoreExpr) -> usize {
            match e {
                CoreExpr::Prim {
                    prim: Prim::If, ..
                } => 1,
                CoreExpr::App { func, args } => {
                    count_ifs(func) + args.iter().map(count_ifs).sum::<usize>()
                }
                CoreExpr::Lam { body, .. } => count_ifs(body),
                CoreExpr::Tuple(es) => es.iter().map(count_ifs).sum(),
                CoreExpr::Proj { tuple, .. } => count_ifs(tuple),
                CoreExpr::Let { value, body, .. } => count_ifs(value) + count_ifs(body),
                _ => 0,
            }
        }
        assert_eq!(count_ifs(&wrapped), 2);
    }

    #[test]
    fn leaves_other_applications_alone() {
        let e = CoreExpr::app(
            CoreExpr::prim(Prim::Add),
            vec![CoreExpr::Int(1), CoreExpr::Int(2)],
        );
        let wrapped = eager_expr(&e);
        let CoreExpr::App { args, .. } = &wrapped else {
            panic!("expected application");
        };
        assert_eq!(args.len(), 2);
    }
}
