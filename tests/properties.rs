//! Property tests over generated source expressions
//!
//! Random total expression trees (no division, bounded literals, so no
//! overflow or partiality) are rendered to source, pushed through the
//! whole pipeline, and evaluated in the core. The result must agree with
//! a direct reading of the tree, and the lowered output must keep its
//! structural promises.

use proptest::prelude::*;

use schist::interp::Value;
use schist::test_support::{eval_solve, find_shadowed_binder, int, lower_source_with};

#[derive(Debug, Clone)]
enum GenExpr {
    Lit(i64),
    A,
    B,
    Add(Box<GenExpr>, Box<GenExpr>),
    Sub(Box<GenExpr>, Box<GenExpr>),
    Mul(Box<GenExpr>, Box<GenExpr>),
    Min(Box<GenExpr>, Box<GenExpr>),
    Max(Box<GenExpr>, Box<GenExpr>),
    // (then if l < r else els)
    IfLt {
        l: Box<GenExpr>,
        r: Box<GenExpr>,
        then: Box<GenExpr>,
        els: Box<GenExpr>,
    },
}

fn render(e: &GenExpr) -> String {
    match e {
        GenExpr::Lit(n) => format!("({})", n),
        GenExpr::A => "a".to_string(),
        GenExpr::B => "b".to_string(),
        GenExpr::Add(x, y) => format!("({} + {})", render(x), render(y)),
        GenExpr::Sub(x, y) => format!("({} - {})", render(x), render(y)),
        GenExpr::Mul(x, y) => format!("({} * {})", render(x), render(y)),
        GenExpr::Min(x, y) => format!("min({}, {})", render(x), render(y)),
        GenExpr::Max(x, y) => format!("max({}, {})", render(x), render(y)),
        GenExpr::IfLt { l, r, then, els } => format!(
            "({} if {} < {} else {})",
            render(then),
            render(l),
            render(r),
            render(els)
        ),
    }
}

fn eval_direct(e: &GenExpr, a: i64, b: i64) -> i64 {
    match e {
        GenExpr::Lit(n) => *n,
        GenExpr::A => a,
        GenExpr::B => b,
        GenExpr::Add(x, y) => eval_direct(x, a, b) + eval_direct(y, a, b),
        GenExpr::Sub(x, y) => eval_direct(x, a, b) - eval_direct(y, a, b),
        GenExpr::Mul(x, y) => eval_direct(x, a, b) * eval_direct(y, a, b),
        GenExpr::Min(x, y) => eval_direct(x, a, b).min(eval_direct(y, a, b)),
        GenExpr::Max(x, y) => eval_direct(x, a, b).max(eval_direct(y, a, b)),
        GenExpr::IfLt { l, r, then, els } => {
            if eval_direct(l, a, b) < eval_direct(r, a, b) {
                eval_direct(then, a, b)
            } else {
                eval_direct(els, a, b)
            }
        }
    }
}

fn expr_strategy() -> impl Strategy<Value = GenExpr> {
    let leaf = prop_oneof![
        (-9i64..=9).prop_map(GenExpr::Lit),
        Just(GenExpr::A),
        Just(GenExpr::B),
    ];
    leaf.prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(x, y)| GenExpr::Add(Box::new(x), Box::new(y))),
            (inner.clone(), inner.clone())
                .prop_map(|(x, y)| GenExpr::Sub(Box::new(x), Box::new(y))),
            (inner.clone(), inner.clone())
                .prop_map(|(x, y)| GenExpr::Mul(Box::new(x), Box::new(y))),
            (inner.clone(), inner.clone())
                .prop_map(|(x, y)| GenExpr::Min(Box::new(x), Box::new(y))),
            (inner.clone(), inner.clone())
                .prop_map(|(x, y)| GenExpr::Max(Box::new(x), Box::new(y))),
            (inner.clone(), inner.clone(), inner.clone(), inner)
                .prop_map(|(l, r, then, els)| GenExpr::IfLt {
                    l: Box::new(l),
                    r: Box::new(r),
                    then: Box::new(then),
                    els: Box::new(els),
                }),
        ]
    })
}

fn source_of(e: &GenExpr) -> String {
    format!("def solve(a, b):\n    return {}\n", render(e))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn lowered_expressions_agree_with_direct_evaluation(
        e in expr_strategy(),
        a in -20i64..=20,
        b in -20i64..=20,
    ) {
        let src = source_of(&e);
        let expected = eval_direct(&e, a, b);
        let got = eval_solve(&src, vec![int(a), int(b)])
            .unwrap_or_else(|err| panic!("{}\nfor program:\n{}", err, src));
        prop_assert_eq!(got, Value::Int(expected));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn lowering_is_byte_deterministic(e in expr_strategy()) {
        let src = source_of(&e);
        let first = lower_source_with(&src, 0).unwrap().to_string();
        let second = lower_source_with(&src, 0).unwrap().to_string();
        prop_assert_eq!(first, second);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn no_generated_program_shadows_a_binder(e in expr_strategy()) {
        let src = source_of(&e);
        let program = lower_source_with(&src, 0).unwrap();
        prop_assert_eq!(find_shadowed_binder(&program), None);
    }
}
