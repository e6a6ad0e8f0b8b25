//! End-to-end semantics: source programs run through the whole pipeline
//! and evaluated in the core must behave like their imperative reading.
//! Each test exercises at least one lowering rule.

use schist::test_support::{eval_solve, int, int_list};
use schist::interp::Value;

fn run(src: &str, args: Vec<Value>) -> Value {
    eval_solve(src, args).unwrap_or_else(|e| panic!("{}\nfor program:\n{}", e, src))
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn recursive_factorial() {
    let src = "def solve(n):\n    if n == 0:\n        return 1\n    else:\n        return n * solve(n - 1)\n";
    assert_eq!(run(src, vec![int(5)]), int(120));
    assert_eq!(run(src, vec![int(0)]), int(1));
}

#[test]
fn recursion_through_conditional_expression() {
    let src = "def solve(n):\n    return 1 if n <= 1 else n * solve(n - 1)\n";
    assert_eq!(run(src, vec![int(5)]), int(120));
}

#[test]
fn loop_carries_two_variables() {
    let src = "def solve(n):\n    a = 0\n    b = 1\n    for _ in range(n):\n        c = a + b\n        a = b\n        b = c\n    return a\n";
    assert_eq!(run(src, vec![int(10)]), int(55));
    assert_eq!(run(src, vec![int(0)]), int(0));
}

#[test]
fn accumulating_loop() {
    let src = "def solve(n):\n    s = 0\n    for i in range(n):\n        s += i\n    return s\n";
    assert_eq!(run(src, vec![int(5)]), int(10));
}

#[test]
fn nested_loops() {
    let src = "def solve(n):\n    s = 0\n    for i in range(n):\n        for j in range(n):\n            s += 1\n    return s\n";
    assert_eq!(run(src, vec![int(3)]), int(9));
}

#[test]
fn branch_join_reads_the_written_value() {
    let src = "def solve(x):\n    if x > 0:\n        a = 1\n    else:\n        a = 2\n    return a\n";
    assert_eq!(run(src, vec![int(5)]), int(1));
    assert_eq!(run(src, vec![int(-5)]), int(2));
}

#[test]
fn branch_without_else_keeps_the_outer_value() {
    let src = "def solve(n):\n    a = 0\n    if n > 0:\n        a = n\n    return a\n";
    assert_eq!(run(src, vec![int(5)]), int(5));
    assert_eq!(run(src, vec![int(-1)]), int(0));
}

#[test]
fn one_armed_return_falls_through() {
    let src = "def solve(n):\n    if n > 100:\n        return 100\n    return n\n";
    assert_eq!(run(src, vec![int(7)]), int(7));
    assert_eq!(run(src, vec![int(500)]), int(100));
}

#[test]
fn elif_chain() {
    let src = "def solve(n):\n    if n == 0:\n        return 10\n    elif n == 1:\n        return 20\n    else:\n        return 30\n";
    assert_eq!(run(src, vec![int(0)]), int(10));
    assert_eq!(run(src, vec![int(1)]), int(20));
    assert_eq!(run(src, vec![int(9)]), int(30));
}

#[test]
fn conditional_branch_writes_inside_loop() {
    let src = "def solve(n):\n    odd = 0\n    for i in range(n):\n        if i % 2 == 1:\n            odd = odd + i\n    return odd\n";
    assert_eq!(run(src, vec![int(6)]), int(9));
}

// ============================================================================
// Assignment forms
// ============================================================================

#[test]
fn rebinding_takes_the_newest_value() {
    let src = "def solve(x):\n    x = x + 1\n    x = x * 10\n    return x\n";
    assert_eq!(run(src, vec![int(1)]), int(20));
}

#[test]
fn tuple_swap() {
    let src = "def solve(a, b):\n    a, b = b, a\n    return a - b\n";
    assert_eq!(run(src, vec![int(3), int(4)]), int(1));
}

#[test]
fn subscript_assignment() {
    let src = "def solve(xs, i, v):\n    xs[i] = v\n    return xs\n";
    assert_eq!(
        run(src, vec![int_list(&[1, 2, 3]), int(1), int(9)]),
        int_list(&[1, 9, 3])
    );
}

#[test]
fn augmented_subscript_assignment() {
    let src = "def solve(xs, n):\n    for i in range(n):\n        xs[i] += 1\n    return xs\n";
    assert_eq!(
        run(src, vec![int_list(&[10, 20, 30]), int(2)]),
        int_list(&[11, 21, 30])
    );
}

#[test]
fn append_builds_a_list() {
    let src = "def solve(n):\n    xs = []\n    for i in range(n):\n        xs.append(i * i)\n    return xs\n";
    assert_eq!(run(src, vec![int(4)]), int_list(&[0, 1, 4, 9]));
}

#[test]
fn asserts_are_discarded() {
    let src = "def solve(n):\n    assert n > 0\n    return n\n";
    // Even a false assertion: the lowering drops it
    assert_eq!(run(src, vec![int(-5)]), int(-5));
}

// ============================================================================
// Expressions and builtins
// ============================================================================

#[test]
fn comprehension_with_filter() {
    let src = "def solve(xs):\n    return [x * x for x in xs if x > 0]\n";
    assert_eq!(
        run(src, vec![int_list(&[-2, 3, 0, 5])]),
        int_list(&[9, 25])
    );
}

#[test]
fn comprehension_over_range() {
    let src = "def solve(n):\n    return sum([i * i for i in range(n)])\n";
    assert_eq!(run(src, vec![int(4)]), int(14));
}

#[test]
fn stepped_slice() {
    let src = "def solve(xs):\n    return xs[1::2]\n";
    assert_eq!(
        run(src, vec![int_list(&[10, 20, 30, 40, 50])]),
        int_list(&[20, 40])
    );
}

#[test]
fn prefix_slice() {
    let src = "def solve(xs):\n    return xs[:3]\n";
    assert_eq!(
        run(src, vec![int_list(&[1, 2, 3, 4, 5])]),
        int_list(&[1, 2, 3])
    );
}

#[test]
fn suffix_slice() {
    let src = "def solve(xs):\n    return xs[2:]\n";
    assert_eq!(run(src, vec![int_list(&[1, 2, 3, 4])]), int_list(&[3, 4]));
}

#[test]
fn chained_comparison() {
    let src = "def solve(a, b, c):\n    if a < b < c:\n        return 1\n    else:\n        return 0\n";
    assert_eq!(run(src, vec![int(2), int(3), int(4)]), int(1));
    assert_eq!(run(src, vec![int(2), int(5), int(4)]), int(0));
}

#[test]
fn membership_tests() {
    let src = "def solve(x, lo):\n    return 1 if x not in [lo, lo + 1] else 0\n";
    assert_eq!(run(src, vec![int(5), int(1)]), int(1));
    assert_eq!(run(src, vec![int(2), int(1)]), int(0));
}

#[test]
fn count_and_index_methods() {
    let src = "def solve(xs, x):\n    return xs.count(x) * 10 + xs.index(x)\n";
    assert_eq!(run(src, vec![int_list(&[1, 2, 2, 3]), int(2)]), int(21));
}

#[test]
fn divmod_floors_toward_negative_infinity() {
    let src = "def solve(a, b):\n    q, r = divmod(a, b)\n    return q * 1000 + r\n";
    assert_eq!(run(src, vec![int(-7), int(3)]), int(-2998));
    assert_eq!(run(src, vec![int(7), int(3)]), int(2001));
}

#[test]
fn floor_division_and_modulo() {
    let src = "def solve(a, b):\n    return (a // b) * 1000 + a % b\n";
    assert_eq!(run(src, vec![int(-7), int(2)]), int(-3999));
}

#[test]
fn number_theory_builtins() {
    let src = "def solve(a, b):\n    return gcd(a, b) * 100 + lcm(4, 6)\n";
    assert_eq!(run(src, vec![int(12), int(18)]), int(612));
}

#[test]
fn pow_with_and_without_modulus() {
    let src = "def solve(a, b, m):\n    return pow(a, b, m) + pow(a, 2)\n";
    assert_eq!(run(src, vec![int(3), int(5), int(7)]), int(14));
}

#[test]
fn enumerate_pairs_indices_with_items() {
    let src = "def solve(xs):\n    s = 0\n    for i, v in enumerate(xs):\n        s += i * v\n    return s\n";
    assert_eq!(run(src, vec![int_list(&[5, 6, 7])]), int(20));
}

#[test]
fn zip_pairs_two_lists() {
    let src = "def solve(xs, ys):\n    s = 0\n    for a, b in zip(xs, ys):\n        s += a * b\n    return s\n";
    assert_eq!(
        run(src, vec![int_list(&[1, 2, 3]), int_list(&[4, 5, 6])]),
        int(32)
    );
}

#[test]
fn variadic_and_list_extrema() {
    let src = "def solve(a, b):\n    return max(a, b, 10) - min(a, b) + max([a, b])\n";
    assert_eq!(run(src, vec![int(3), int(8)]), int(15));
}

#[test]
fn list_reductions() {
    let src = "def solve(xs):\n    return sorted(xs)[0] * 100 + sum(xs) + argmax(xs)\n";
    assert_eq!(run(src, vec![int_list(&[3, 1, 2])]), int(106));
}

#[test]
fn map_with_a_lambda() {
    let src = "def solve(xs):\n    return sum(map(lambda x: x * 2, xs))\n";
    assert_eq!(run(src, vec![int_list(&[1, 2, 3])]), int(12));
}

#[test]
fn map_over_two_lists() {
    let src = "def solve(xs, ys):\n    return map(lambda a, b: a + b, xs, ys)\n";
    assert_eq!(
        run(src, vec![int_list(&[1, 2]), int_list(&[10, 20])]),
        int_list(&[11, 22])
    );
}

#[test]
fn bitwise_operators() {
    let src = "def solve(a, b):\n    return (a & b) + (a | b) + (a ^ b) + (a << 2) + (a >> 1) + ~a\n";
    assert_eq!(run(src, vec![int(6), int(3)]), int(34));
}

#[test]
fn unary_operators() {
    let src = "def solve(a, b):\n    return +a + -b\n";
    assert_eq!(run(src, vec![int(5), int(3)]), int(2));
}

#[test]
fn casts_between_int_and_bool() {
    let src = "def solve(n: int):\n    return int(n > 0) + int(True) + int(n)\n";
    assert_eq!(run(src, vec![int(7)]), int(9));
    assert_eq!(run(src, vec![int(-7)]), int(-6));
}

#[test]
fn bool_of_int_is_a_zero_test() {
    let src = "def solve(n: int):\n    return 1 if bool(n) else 0\n";
    assert_eq!(run(src, vec![int(3)]), int(1));
    assert_eq!(run(src, vec![int(0)]), int(0));
}

#[test]
fn copy_is_identity() {
    let src = "def solve(xs):\n    ys = xs.copy()\n    return ys\n";
    assert_eq!(run(src, vec![int_list(&[1, 2])]), int_list(&[1, 2]));
}

#[test]
fn toplevel_constants_are_in_scope() {
    let src = "base = 100\ndef solve(n):\n    return base + n\n";
    assert_eq!(run(src, vec![int(23)]), int(123));
}

#[test]
fn helper_functions_compose() {
    let src = "def double(x):\n    return x * 2\ndef solve(n):\n    return double(double(n))\n";
    assert_eq!(run(src, vec![int(3)]), int(12));
}

#[test]
fn reversed_and_membership() {
    let src = "def solve(xs):\n    ys = reversed(xs)\n    return ys[0]\n";
    assert_eq!(run(src, vec![int_list(&[1, 2, 3])]), int(3));
}
