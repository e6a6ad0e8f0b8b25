//! Structural tests for the lowered core
//!
//! Each test pins the shape of one lowering rule: recursion through a
//! conditional, loop threading through a fold, comprehension as
//! map-over-filter, functional update, branch joining, and slicing.
//! Fresh names vary, so assertions match structure rather than spelling.

use schist::core_ir::{CoreExpr, Prim};
use schist::test_support::{def_named, lower_source};

/// Undo the thunk wrapping around one conditional:
/// `(if c (fun () -> a) (fun () -> b)) ()` gives back `(c, a, b)`
fn unwrap_if(e: &CoreExpr) -> (&CoreExpr, &CoreExpr, &CoreExpr) {
    let CoreExpr::App { func, args } = e else {
        panic!("expected the forcing application, got {:?}", e);
    };
    assert!(args.is_empty(), "outermost application must be nullary");
    let CoreExpr::App { func: inner, args } = &**func else {
        panic!("expected the conditional application");
    };
    assert!(
        matches!(&**inner, CoreExpr::Prim { prim: Prim::If, .. }),
        "head must be the if primitive"
    );
    assert_eq!(args.len(), 3);
    let CoreExpr::Lam { params: p1, body: b1 } = &args[1] else {
        panic!("then branch must be a thunk");
    };
    let CoreExpr::Lam { params: p2, body: b2 } = &args[2] else {
        panic!("else branch must be a thunk");
    };
    assert!(p1.is_empty() && p2.is_empty());
    (&args[0], &**b1, &**b2)
}

fn body_of_solve(program: &schist::CoreProgram) -> &CoreExpr {
    let Some(CoreExpr::Lam { body, .. }) = def_named(program, "solve") else {
        panic!("expected solve to lower to a lambda");
    };
    body
}

fn prim_of(e: &CoreExpr) -> Option<Prim> {
    match e {
        CoreExpr::App { func, .. } => match &**func {
            CoreExpr::Prim { prim, .. } => Some(*prim),
            _ => None,
        },
        _ => None,
    }
}

#[test]
fn recursion_through_conditional() {
    let program = lower_source(
        "def solve(n):\n    if n == 0:\n        return 1\n    else:\n        return n * solve(n - 1)\n",
    )
    .unwrap();

    let (cond, then_branch, else_branch) = unwrap_if(body_of_solve(&program));

    assert_eq!(prim_of(cond), Some(Prim::Eq));
    assert!(matches!(then_branch, CoreExpr::Int(1)));

    // The else branch multiplies by a recursive call
    assert_eq!(prim_of(else_branch), Some(Prim::Mul));
    let CoreExpr::App { args, .. } = else_branch else {
        unreachable!();
    };
    let CoreExpr::App { func, .. } = &args[1] else {
        panic!("expected recursive call, got {:?}", args[1]);
    };
    assert!(matches!(&**func, CoreExpr::Var(n) if n == "solve"));
}

#[test]
fn loop_threads_carried_variables_through_a_fold() {
    let program = lower_source(
        "def solve(n):\n    a = 0\n    b = 1\n    for _ in range(n):\n        c = a + b\n        a = b\n        b = c\n    return a\n",
    )
    .unwrap();

    // let a = 0 in let b = 1 in let z = foldl step (a, b) (range1 n) in ...
    let CoreExpr::Let { name: a, body, .. } = body_of_solve(&program) else {
        panic!("expected let a");
    };
    assert_eq!(a, "a");
    let CoreExpr::Let { name: b, body, .. } = &**body else {
        panic!("expected let b");
    };
    assert_eq!(b, "b");
    let CoreExpr::Let { value: fold, body: after, .. } = &**body else {
        panic!("expected the fold binding");
    };

    assert_eq!(prim_of(fold), Some(Prim::Foldl));
    let CoreExpr::App { args, .. } = &**fold else {
        unreachable!();
    };
    // The step takes the accumulator pair and the counter
    let CoreExpr::Lam { params, .. } = &args[0] else {
        panic!("expected step lambda");
    };
    assert_eq!(params.len(), 2);
    // The seed reads both live variables
    let CoreExpr::Tuple(init) = &args[1] else {
        panic!("expected seed tuple");
    };
    assert_eq!(init.len(), 2);
    assert!(matches!(&init[0], CoreExpr::Var(n) if n == "a"));
    assert!(matches!(&init[1], CoreExpr::Var(n) if n == "b"));
    assert_eq!(prim_of(&args[2]), Some(Prim::Range1));

    // After the loop both carried variables are unpacked and `a` flows out
    let CoreExpr::Let { name: a2, value, body, .. } = &**after else {
        panic!("expected unpacking of the first carried variable");
    };
    assert!(matches!(&**value, CoreExpr::Proj { index: 0, .. }));
    let CoreExpr::Let { value: v2, body: result, .. } = &**body else {
        panic!("expected unpacking of the second carried variable");
    };
    assert!(matches!(&**v2, CoreExpr::Proj { index: 1, .. }));
    assert!(matches!(&**result, CoreExpr::Var(n) if n == a2));
}

#[test]
fn comprehension_is_map_over_filter() {
    let program =
        lower_source("def solve(xs):\n    return [x * x for x in xs if x > 0]\n").unwrap();

    let body = body_of_solve(&program);
    assert_eq!(prim_of(body), Some(Prim::Map));
    let CoreExpr::App { args, .. } = body else {
        unreachable!();
    };

    // The mapped function squares the bound name
    let CoreExpr::Lam { body: head, .. } = &args[0] else {
        panic!("expected map lambda");
    };
    let CoreExpr::Let { name: x, body: square, .. } = &**head else {
        panic!("expected the target binding");
    };
    assert_eq!(x, "x");
    assert_eq!(prim_of(square), Some(Prim::Mul));

    // The iterable is the filtered input
    assert_eq!(prim_of(&args[1]), Some(Prim::Filter));
    let CoreExpr::App { args: fargs, .. } = &args[1] else {
        unreachable!();
    };
    let CoreExpr::Lam { body: pred, .. } = &fargs[0] else {
        panic!("expected filter lambda");
    };
    let CoreExpr::Let { body: cmp, .. } = &**pred else {
        panic!("expected the target binding in the predicate");
    };
    assert_eq!(prim_of(cmp), Some(Prim::Gt));
    assert!(matches!(&fargs[1], CoreExpr::Var(n) if n == "xs"));
}

#[test]
fn subscript_assignment_is_functional_update() {
    let program =
        lower_source("def solve(xs, i, v):\n    xs[i] = v\n    return xs\n").unwrap();

    let CoreExpr::Let { name, value, body, .. } = body_of_solve(&program) else {
        panic!("expected the update binding");
    };
    assert_eq!(prim_of(value), Some(Prim::SetAt));
    let CoreExpr::App { args, .. } = &**value else {
        unreachable!();
    };
    assert!(matches!(&args[0], CoreExpr::Var(n) if n == "xs"));
    assert!(matches!(&args[1], CoreExpr::Var(n) if n == "i"));
    assert!(matches!(&args[2], CoreExpr::Var(n) if n == "v"));

    // The rebound list is what flows out, under its new version
    assert_ne!(name, "xs");
    assert!(name.starts_with("xs"));
    assert!(matches!(&**body, CoreExpr::Var(n) if n == name));
}

#[test]
fn branch_writes_join_through_a_tuple() {
    let program = lower_source(
        "def solve(x):\n    if x > 0:\n        a = 1\n    else:\n        a = 2\n    return a\n",
    )
    .unwrap();

    // let z = (if (x > 0) (fun () -> let a = 1 in (a)) ...) () in
    // let a = z.0 in a
    let CoreExpr::Let { value, body, .. } = body_of_solve(&program) else {
        panic!("expected the join binding");
    };
    let (cond, then_branch, else_branch) = unwrap_if(value);
    assert_eq!(prim_of(cond), Some(Prim::Gt));

    for (branch, expected) in [(then_branch, 1), (else_branch, 2)] {
        let CoreExpr::Let { name, value, body, .. } = branch else {
            panic!("branch must bind before returning its writes");
        };
        assert_eq!(name, "a");
        assert!(matches!(&**value, CoreExpr::Int(n) if *n == expected));
        let CoreExpr::Tuple(out) = &**body else {
            panic!("branch must return the tuple of joined names");
        };
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], CoreExpr::Var(n) if n == "a"));
    }

    let CoreExpr::Let { value: proj, body: result, name, .. } = &**body else {
        panic!("expected unpacking of the joined name");
    };
    assert!(matches!(&**proj, CoreExpr::Proj { index: 0, .. }));
    assert!(matches!(&**result, CoreExpr::Var(n) if n == name));
}

#[test]
fn stepped_slice_maps_over_range3() {
    let program = lower_source("def solve(xs):\n    return xs[1::2]\n").unwrap();

    let body = body_of_solve(&program);
    assert_eq!(prim_of(body), Some(Prim::Map));
    let CoreExpr::App { args, .. } = body else {
        unreachable!();
    };

    // fun (i: int) -> xs[i]
    let CoreExpr::Lam { params, body: at } = &args[0] else {
        panic!("expected index lambda");
    };
    assert_eq!(params.len(), 1);
    assert_eq!(prim_of(at), Some(Prim::At));

    // range3 1 (len xs) 2
    assert_eq!(prim_of(&args[1]), Some(Prim::Range3));
    let CoreExpr::App { args: range_args, .. } = &args[1] else {
        unreachable!();
    };
    assert!(matches!(&range_args[0], CoreExpr::Int(1)));
    assert_eq!(prim_of(&range_args[1]), Some(Prim::Len));
    assert!(matches!(&range_args[2], CoreExpr::Int(2)));
}

#[test]
fn unannotated_slice_bounds_default_to_whole_list() {
    let program = lower_source("def solve(xs):\n    return xs[:]\n").unwrap();
    let body = body_of_solve(&program);
    let CoreExpr::App { args, .. } = body else {
        panic!("expected map application");
    };
    // No bounds, no step: a plain index range over the length
    assert_eq!(prim_of(&args[1]), Some(Prim::Range1));
    let CoreExpr::App { args: range_args, .. } = &args[1] else {
        unreachable!();
    };
    assert_eq!(prim_of(&range_args[0]), Some(Prim::Len));
}

#[test]
fn list_literal_folds_cons_onto_nil() {
    let program = lower_source("def solve(n):\n    return [n, 2, 3]\n").unwrap();
    let mut e = body_of_solve(&program);
    for _ in 0..3 {
        assert_eq!(prim_of(e), Some(Prim::Cons));
        let CoreExpr::App { args, .. } = e else {
            unreachable!();
        };
        e = &args[1];
    }
    assert!(matches!(e, CoreExpr::Prim { prim: Prim::Nil, .. }));
}

#[test]
fn tuple_target_binds_value_once() {
    let program = lower_source("def solve(p):\n    a, b = p\n    return a + b\n").unwrap();

    // let t = p in let a = t.0 in let b = t.1 in a + b
    let CoreExpr::Let { name: tmp, value, body, .. } = body_of_solve(&program) else {
        panic!("expected the pattern binding");
    };
    assert!(tmp.starts_with('$'));
    assert!(matches!(&**value, CoreExpr::Var(n) if n == "p"));
    let CoreExpr::Let { name: a, value: pa, body, .. } = &**body else {
        panic!("expected first component");
    };
    assert_eq!(a, "a");
    assert!(matches!(&**pa, CoreExpr::Proj { index: 0, .. }));
    let CoreExpr::Let { name: b, value: pb, .. } = &**body else {
        panic!("expected second component");
    };
    assert_eq!(b, "b");
    assert!(matches!(&**pb, CoreExpr::Proj { index: 1, .. }));
}

#[test]
fn chained_comparison_splits_into_conjunction() {
    let program = lower_source("def solve(a, b, c):\n    return a < b <= c\n").unwrap();
    let body = body_of_solve(&program);
    assert_eq!(prim_of(body), Some(Prim::And));
    let CoreExpr::App { args, .. } = body else {
        unreachable!();
    };
    assert_eq!(prim_of(&args[0]), Some(Prim::Lt));
    assert_eq!(prim_of(&args[1]), Some(Prim::Le));
}

#[test]
fn variadic_max_builds_binary_tree() {
    let program = lower_source("def solve(a, b, c):\n    return max(a, b, c)\n").unwrap();
    let body = body_of_solve(&program);
    let CoreExpr::App { func, args } = body else {
        panic!("expected application of the max lambda");
    };
    assert_eq!(args.len(), 3);
    let CoreExpr::Lam { params, body: tree } = &**func else {
        panic!("expected the max lambda");
    };
    assert_eq!(params.len(), 3);
    assert_eq!(prim_of(tree), Some(Prim::Max2));
    let CoreExpr::App { args: outer, .. } = &**tree else {
        unreachable!();
    };
    assert_eq!(prim_of(&outer[1]), Some(Prim::Max2));
}

#[test]
fn zip_walks_a_shared_index_range() {
    let program = lower_source("def solve(xs, ys):\n    return zip(xs, ys)\n").unwrap();
    let body = body_of_solve(&program);
    assert_eq!(prim_of(body), Some(Prim::Map));
    let CoreExpr::App { args, .. } = body else {
        unreachable!();
    };
    let CoreExpr::Lam { body: pair, .. } = &args[0] else {
        panic!("expected pairing lambda");
    };
    assert!(matches!(&**pair, CoreExpr::Tuple(es) if es.len() == 2));
    // range1 (min2 (len xs) (len ys))
    assert_eq!(prim_of(&args[1]), Some(Prim::Range1));
    let CoreExpr::App { args: range_args, .. } = &args[1] else {
        unreachable!();
    };
    assert_eq!(prim_of(&range_args[0]), Some(Prim::Min2));
}
