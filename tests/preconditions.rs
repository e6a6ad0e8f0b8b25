//! Precondition checks surface through the pipeline before lowering runs

use schist::lower::LowerError;
use schist::test_support::lower_source;
use schist::PipelineError;

fn precondition_err(input: &str) {
    match lower_source(input) {
        Ok(_) => panic!("expected a precondition failure for:\n{}", input),
        Err(PipelineError::Lower(LowerError::Precondition(_))) => {}
        Err(other) => panic!("expected a precondition failure, got: {}", other),
    }
}

#[test]
fn return_inside_a_loop() {
    precondition_err("def solve(n):\n    for i in range(n):\n        return i\n    return 0\n");
}

#[test]
fn return_nested_under_a_conditional_inside_a_loop() {
    precondition_err(
        "def solve(n):\n    for i in range(n):\n        if i > 2:\n            return i\n    return 0\n",
    );
}

#[test]
fn assigning_the_loop_counter() {
    precondition_err("def solve(n):\n    for i in range(n):\n        i = 0\n    return 0\n");
}

#[test]
fn assigning_the_iterated_value() {
    precondition_err("def solve(xs):\n    for x in xs:\n        xs = []\n    return 0\n");
}

#[test]
fn reading_the_counter_after_the_loop() {
    precondition_err("def solve(n):\n    for i in range(n):\n        s = i\n    return i\n");
}

#[test]
fn subscripted_loop_counter() {
    precondition_err("def solve(xs, n):\n    for xs[0] in range(n):\n        s = 1\n    return 0\n");
}

#[test]
fn nested_subscript_assignment_inside_a_loop() {
    precondition_err(
        "def solve(m, n):\n    for i in range(n):\n        m[0][i] = 1\n    return m\n",
    );
}

#[test]
fn well_behaved_loops_pass() {
    let src = "def solve(n):\n    s = 0\n    for i in range(n):\n        s += i\n    return s\n";
    assert!(lower_source(src).is_ok());
}
