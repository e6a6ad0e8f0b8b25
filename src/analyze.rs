//! Variable analyses over statement lists
//!
//! Two flavors feed lowering: `analyze_max` over-approximates (names
//! possibly read / possibly written on some path) and drives the set of
//! loop-carried variables; `analyze_min` under-approximates writes (names
//! certainly written on every path) and drives the joined state of an
//! `if`. Sets are insertion-ordered and deduplicated so downstream output
//! is deterministic.

use indexmap::IndexSet;

use crate::ast::{Expr, ExprKind, Stmt, StmtKind, Target, TargetKind};

#[derive(Debug, Clone, Default)]
pub struct VarSets {
    pub reads: IndexSet<String>,
    pub writes: IndexSet<String>,
}

/// May-analysis: every name possibly read and possibly written
pub fn analyze_max(stmts: &[Stmt]) -> VarSets {
    let mut sets = VarSets::default();
    for stmt in stmts {
        stmt_max(stmt, &mut sets);
    }
    sets
}

/// Must-analysis: reads as in `analyze_max`, writes restricted to names
/// assigned on every control path
pub fn analyze_min(stmts: &[Stmt]) -> VarSets {
    let mut sets = VarSets::default();
    for stmt in stmts {
        stmt_min(stmt, &mut sets);
    }
    sets
}

/// Does this block leave along a `return` on every path?
pub fn always_returns(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_always_returns)
}

fn stmt_always_returns(stmt: &Stmt) -> bool {
    match &stmt.node {
        StmtKind::Return(_) => true,
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => always_returns(then_body) && always_returns(else_body),
        _ => false,
    }
}

// ============================================================================
// Per-statement walkers
// ============================================================================

fn stmt_max(stmt: &Stmt, sets: &mut VarSets) {
    match &stmt.node {
        StmtKind::Return(e) | StmtKind::Assert(e) | StmtKind::ExprStmt(e) => {
            expr_reads(e, &mut sets.reads);
        }
        StmtKind::Assign { target, value, .. } => {
            expr_reads(value, &mut sets.reads);
            target_effects(target, sets);
        }
        StmtKind::AugAssign { target, value, .. } => {
            // The old value is read before being combined
            target_reads(target, &mut sets.reads);
            expr_reads(value, &mut sets.reads);
            target_effects(target, sets);
        }
        StmtKind::For { target, iter, body } => {
            expr_reads(iter, &mut sets.reads);
            target_effects(target, sets);
            let inner = analyze_max(body);
            sets.reads.extend(inner.reads);
            sets.writes.extend(inner.writes);
        }
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            expr_reads(cond, &mut sets.reads);
            let t = analyze_max(then_body);
            let e = analyze_max(else_body);
            sets.reads.extend(t.reads);
            sets.reads.extend(e.reads);
            sets.writes.extend(t.writes);
            sets.writes.extend(e.writes);
        }
        StmtKind::Append { seq, value } => {
            expr_reads(seq, &mut sets.reads);
            expr_reads(value, &mut sets.reads);
            if let Some(name) = root_name(seq) {
                sets.writes.insert(name);
            }
        }
    }
}

fn stmt_min(stmt: &Stmt, sets: &mut VarSets) {
    match &stmt.node {
        StmtKind::Return(e) | StmtKind::Assert(e) | StmtKind::ExprStmt(e) => {
            expr_reads(e, &mut sets.reads);
        }
        StmtKind::Assign { target, value, .. } => {
            expr_reads(value, &mut sets.reads);
            target_effects(target, sets);
        }
        StmtKind::AugAssign { target, value, .. } => {
            target_reads(target, &mut sets.reads);
            expr_reads(value, &mut sets.reads);
            target_effects(target, sets);
        }
        StmtKind::For { iter, body, .. } => {
            // The loop may run zero times: nothing in the body (nor the
            // counter) is certainly written
            expr_reads(iter, &mut sets.reads);
            let inner = analyze_min(body);
            sets.reads.extend(inner.reads);
        }
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            expr_reads(cond, &mut sets.reads);
            let t = analyze_min(then_body);
            let e = analyze_min(else_body);
            sets.reads.extend(t.reads);
            sets.reads.extend(e.reads);
            // Certainly written only if written by both branches
            for name in &t.writes {
                if e.writes.contains(name) {
                    sets.writes.insert(name.clone());
                }
            }
        }
        StmtKind::Append { seq, value } => {
            expr_reads(seq, &mut sets.reads);
            expr_reads(value, &mut sets.reads);
            if let Some(name) = root_name(seq) {
                sets.writes.insert(name);
            }
        }
    }
}

/// Writes (and, for subscript targets, reads) induced by assigning to a
/// target. Updating `xs[i]` rewrites `xs`, which also reads it.
fn target_effects(target: &Target, sets: &mut VarSets) {
    match &target.node {
        TargetKind::Name(n) => {
            sets.writes.insert(n.clone());
        }
        TargetKind::Subscript { base, index } => {
            expr_reads(index, &mut sets.reads);
            target_reads(base, &mut sets.reads);
            target_effects(base, sets);
        }
        TargetKind::Tuple(ts) => {
            for t in ts {
                target_effects(t, sets);
            }
        }
    }
}

/// Names read when a target is interpreted as an expression
fn target_reads(target: &Target, reads: &mut IndexSet<String>) {
    match &target.node {
        TargetKind::Name(n) => {
            reads.insert(n.clone());
        }
        TargetKind::Subscript { base, index } => {
            target_reads(base, reads);
            expr_reads(index, reads);
        }
        TargetKind::Tuple(ts) => {
            for t in ts {
                target_reads(t, reads);
            }
        }
    }
}

/// The base name of a subscript/name chain, e.g. `xs` in `xs[0][1]`
pub fn root_name(e: &Expr) -> Option<String> {
    match &e.node {
        ExprKind::Name(n) => Some(n.clone()),
        ExprKind::Subscript { value, .. } => root_name(value),
        _ => None,
    }
}

/// Every name occurring in read position within the expression
pub fn expr_reads(e: &Expr, reads: &mut IndexSet<String>) {
    match &e.node {
        ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::NoneLit => {}
        ExprKind::Name(n) => {
            reads.insert(n.clone());
        }
        ExprKind::BoolOp { left, right, .. }
        | ExprKind::BinOp { left, right, .. }
        | ExprKind::Compare { left, right, .. } => {
            expr_reads(left, reads);
            expr_reads(right, reads);
        }
        ExprKind::UnaryOp { operand, .. } => expr_reads(operand, reads),
        ExprKind::Lambda { params, body } => {
            let mut inner = IndexSet::new();
            expr_reads(body, &mut inner);
            for name in inner {
                if !params.contains(&name) {
                    reads.insert(name);
                }
            }
        }
        ExprKind::IfExp {
            cond,
            then_branch,
            else_branch,
        } => {
            expr_reads(cond, reads);
            expr_reads(then_branch, reads);
            expr_reads(else_branch, reads);
        }
        ExprKind::ListComp {
            head,
            target,
            iter,
            cond,
        } => {
            expr_reads(iter, reads);
            let mut bound = Vec::new();
            target.node.bound_names(&mut bound);
            let mut inner = IndexSet::new();
            expr_reads(head, &mut inner);
            if let Some(c) = cond {
                expr_reads(c, &mut inner);
            }
            for name in inner {
                if !bound.contains(&name) {
                    reads.insert(name);
                }
            }
        }
        ExprKind::Call { func, args } => {
            expr_reads(func, reads);
            for a in args {
                expr_reads(a, reads);
            }
        }
        ExprKind::Attribute { value, .. } => expr_reads(value, reads),
        ExprKind::Subscript { value, index } => {
            expr_reads(value, reads);
            expr_reads(index, reads);
        }
        ExprKind::Slice {
            value,
            lower,
            upper,
            step,
        } => {
            expr_reads(value, reads);
            for part in [lower, upper, step].into_iter().flatten() {
                expr_reads(part, reads);
            }
        }
        ExprKind::Starred(inner) => expr_reads(inner, reads),
        ExprKind::List { elems, .. } => {
            for e in elems {
                expr_reads(e, reads);
            }
        }
        ExprKind::Tuple(elems) => {
            for e in elems {
                expr_reads(e, reads);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
