//! Whole-output invariants: the thunked shape of every conditional,
//! binder uniqueness, determinism, and the syntactic inverse of the
//! thunk-wrapping pass.

use schist::core_ir::{CoreExpr, CoreProgram, CoreType, Prim};
use schist::eager;
use schist::test_support::{find_shadowed_binder, lower_source, lower_source_with, walk_program};
use std::rc::Rc;

const PROGRAMS: &[&str] = &[
    "def solve(n):\n    if n == 0:\n        return 1\n    else:\n        return n * solve(n - 1)\n",
    "def solve(n):\n    a = 0\n    b = 1\n    for _ in range(n):\n        c = a + b\n        a = b\n        b = c\n    return a\n",
    "def solve(xs):\n    return [x * x for x in xs if x > 0]\n",
    "def solve(x):\n    if x > 0:\n        a = 1\n    else:\n        a = 2\n    return a\n",
    "def solve(xs):\n    s = 0\n    for i, v in enumerate(xs):\n        if v > 0:\n            s += i * v\n    return s\n",
    "def solve(n):\n    xs = []\n    for i in range(n):\n        xs.append(i)\n    return xs[1::2]\n",
];

/// Every `if` must appear as `(if c (fun () -> a) (fun () -> b)) ()`;
/// anywhere else it is a violation.
fn assert_every_if_is_wrapped(e: &CoreExpr) {
    match e {
        CoreExpr::App { func, args } if args.is_empty() => {
            if let CoreExpr::App {
                func: head,
                args: if_args,
            } = &**func
            {
                if matches!(&**head, CoreExpr::Prim { prim: Prim::If, .. }) {
                    assert_eq!(if_args.len(), 3, "wrapped if must stay saturated");
                    let CoreExpr::Lam { params, body } = &if_args[1] else {
                        panic!("then branch must be a thunk");
                    };
                    assert!(params.is_empty());
                    assert_every_if_is_wrapped(body);
                    let CoreExpr::Lam { params, body } = &if_args[2] else {
                        panic!("else branch must be a thunk");
                    };
                    assert!(params.is_empty());
                    assert_every_if_is_wrapped(body);
                    assert_every_if_is_wrapped(&if_args[0]);
                    return;
                }
            }
            assert_every_if_is_wrapped(func);
        }
        CoreExpr::Prim { prim, .. } => {
            assert!(
                *prim != Prim::If,
                "found an if primitive outside the wrapped shape"
            );
        }
        CoreExpr::Var(_) | CoreExpr::Int(_) | CoreExpr::Bool(_) => {}
        CoreExpr::Tuple(es) => {
            for e in es {
                assert_every_if_is_wrapped(e);
            }
        }
        CoreExpr::Proj { tuple, .. } => assert_every_if_is_wrapped(tuple),
        CoreExpr::App { func, args } => {
            assert_every_if_is_wrapped(func);
            for a in args {
                assert_every_if_is_wrapped(a);
            }
        }
        CoreExpr::Lam { body, .. } => assert_every_if_is_wrapped(body),
        CoreExpr::Let { value, body, .. } => {
            assert_every_if_is_wrapped(value);
            assert_every_if_is_wrapped(body);
        }
    }
}

/// Invert the thunk wrapping, recovering `if c a b`
fn unwrap_expr(e: &CoreExpr) -> CoreExpr {
    if let CoreExpr::App { func, args } = e {
        if args.is_empty() {
            if let CoreExpr::App {
                func: head,
                args: if_args,
            } = &**func
            {
                if let CoreExpr::Prim {
                    prim: Prim::If,
                    tys,
                } = &**head
                {
                    if if_args.len() == 3 {
                        if let (
                            CoreExpr::Lam {
                                params: p1,
                                body: b1,
                            },
                            CoreExpr::Lam {
                                params: p2,
                                body: b2,
                            },
                        ) = (&if_args[1], &if_args[2])
                        {
                            if p1.is_empty() && p2.is_empty() {
                                let t = match tys.first().map(CoreType::resolve) {
                                    Some(CoreType::Thunk(inner)) => (*inner).clone(),
                                    Some(other) => other,
                                    None => CoreType::Int,
                                };
                                return CoreExpr::App {
                                    func: Rc::new(CoreExpr::Prim {
                                        prim: Prim::If,
                                        tys: vec![t],
                                    }),
                                    args: vec![
                                        unwrap_expr(&if_args[0]),
                                        unwrap_expr(b1),
                                        unwrap_expr(b2),
                                    ],
                                };
                            }
                        }
                    }
                }
            }
        }
    }
    match e {
        CoreExpr::Var(_) | CoreExpr::Int(_) | CoreExpr::Bool(_) | CoreExpr::Prim { .. } => {
            e.clone()
        }
        CoreExpr::Tuple(es) => CoreExpr::Tuple(es.iter().map(unwrap_expr).collect()),
        CoreExpr::Proj { tuple, index } => CoreExpr::Proj {
            tuple: Rc::new(unwrap_expr(tuple)),
            index: *index,
        },
        CoreExpr::App { func, args } => CoreExpr::App {
            func: Rc::new(unwrap_expr(func)),
            args: args.iter().map(unwrap_expr).collect(),
        },
        CoreExpr::Lam { params, body } => CoreExpr::Lam {
            params: params.clone(),
            body: Rc::new(unwrap_expr(body)),
        },
        CoreExpr::Let {
            name,
            ty,
            value,
            body,
        } => CoreExpr::Let {
            name: name.clone(),
            ty: ty.clone(),
            value: Rc::new(unwrap_expr(value)),
            body: Rc::new(unwrap_expr(body)),
        },
    }
}

fn unwrap_program(p: &CoreProgram) -> CoreProgram {
    let mut out = p.clone();
    for def in &mut out.defs {
        match def {
            schist::core_ir::Toplevel::Let { value, .. }
            | schist::core_ir::Toplevel::LetRec { value, .. } => {
                *value = unwrap_expr(value);
            }
        }
    }
    out.result = unwrap_expr(&out.result);
    out
}

#[test]
fn every_conditional_is_thunk_wrapped() {
    for src in PROGRAMS {
        let program = lower_source(src).unwrap();
        for def in &program.defs {
            let value = match def {
                schist::core_ir::Toplevel::Let { value, .. }
                | schist::core_ir::Toplevel::LetRec { value, .. } => value,
            };
            assert_every_if_is_wrapped(value);
        }
        assert_every_if_is_wrapped(&program.result);
    }
}

#[test]
fn no_binder_shadows_along_a_path() {
    for src in PROGRAMS {
        let program = lower_source(src).unwrap();
        assert_eq!(
            find_shadowed_binder(&program),
            None,
            "shadowed binder in output of:\n{}",
            src
        );
    }
}

#[test]
fn generated_names_cannot_collide_with_source_names() {
    for src in PROGRAMS {
        let program = lower_source(src).unwrap();
        let mut fresh = Vec::new();
        walk_program(&program, &mut |e| {
            if let CoreExpr::Let { name, .. } = e {
                if name.contains('$') {
                    fresh.push(name.clone());
                }
            }
        });
        // The `$` marker never lexes as a source identifier
        for name in fresh {
            assert!(name.contains('$'));
        }
    }
}

#[test]
fn lowering_is_deterministic_for_a_fixed_counter() {
    for src in PROGRAMS {
        let a = lower_source_with(src, 0).unwrap().to_string();
        let b = lower_source_with(src, 0).unwrap().to_string();
        assert_eq!(a, b, "nondeterministic output for:\n{}", src);
    }
}

#[test]
fn rewrapping_the_unwrapped_program_is_identity() {
    for src in PROGRAMS {
        let program = lower_source(src).unwrap();
        let rewrapped = eager::eager_program(unwrap_program(&program));
        assert_eq!(
            rewrapped.to_string(),
            program.to_string(),
            "wrap/unwrap mismatch for:\n{}",
            src
        );
    }
}
