//! Preconditions on source programs
//!
//! Lowering a `for` into a fold relies on a discipline around loop
//! counters and iterated values; these checks reject programs that break
//! it before lowering starts.

use indexmap::IndexSet;
use thiserror::Error;

use crate::analyze::{analyze_max, expr_reads};
use crate::ast::{Item, Program, Span, Stmt, StmtKind, Target, TargetKind};

#[derive(Error, Debug)]
pub enum LintError {
    #[error("loop counters must be plain names")]
    SubscriptCounter(Span),
    #[error("loop counter `{0}` is used after its loop ends")]
    CounterLeak(String, Span),
    #[error("loop body assigns its own counter `{0}`")]
    CounterAssigned(String, Span),
    #[error("loop body assigns `{0}`, which the loop iterates over")]
    IterAssigned(String, Span),
    #[error("`return` is not allowed inside a `for` body")]
    ReturnInLoop(Span),
    #[error("subscripted assignment inside a loop must target a plain name")]
    NestedSubscriptInLoop(Span),
}

impl LintError {
    pub fn span(&self) -> &Span {
        match self {
            LintError::SubscriptCounter(span) => span,
            LintError::CounterLeak(_, span) => span,
            LintError::CounterAssigned(_, span) => span,
            LintError::IterAssigned(_, span) => span,
            LintError::ReturnInLoop(span) => span,
            LintError::NestedSubscriptInLoop(span) => span,
        }
    }
}

pub fn check(program: &Program) -> Result<(), LintError> {
    for item in &program.items {
        if let Item::Func(f) = item {
            check_block(&f.body, false)?;
        }
    }
    Ok(())
}

fn check_block(stmts: &[Stmt], in_loop: bool) -> Result<(), LintError> {
    for (i, stmt) in stmts.iter().enumerate() {
        match &stmt.node {
            StmtKind::Return(_) => {
                if in_loop {
                    return Err(LintError::ReturnInLoop(stmt.span.clone()));
                }
            }
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                check_block(then_body, in_loop)?;
                check_block(else_body, in_loop)?;
            }
            StmtKind::For { target, iter, body } => {
                ensure_plain_counter(target)?;

                let mut counters = Vec::new();
                target.node.bound_names(&mut counters);
                let body_writes = analyze_max(body).writes;
                for c in &counters {
                    if body_writes.contains(c) {
                        return Err(LintError::CounterAssigned(c.clone(), stmt.span.clone()));
                    }
                }

                let mut iter_names = IndexSet::new();
                expr_reads(iter, &mut iter_names);
                for n in &iter_names {
                    if body_writes.contains(n) {
                        return Err(LintError::IterAssigned(n.clone(), stmt.span.clone()));
                    }
                }

                let after = analyze_max(&stmts[i + 1..]);
                for c in &counters {
                    if after.reads.contains(c) {
                        return Err(LintError::CounterLeak(c.clone(), stmt.span.clone()));
                    }
                }

                check_block(body, true)?;
            }
            StmtKind::Assign { target, .. } | StmtKind::AugAssign { target, .. } => {
                if in_loop {
                    ensure_trivial_subscript(target)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Counters bind names only; `for xs[i] in ...` makes no sense as a fold
fn ensure_plain_counter(target: &Target) -> Result<(), LintError> {
    match &target.node {
        TargetKind::Name(_) => Ok(()),
        TargetKind::Subscript { .. } => Err(LintError::SubscriptCounter(target.span.clone())),
        TargetKind::Tuple(ts) => {
            for t in ts {
                ensure_plain_counter(t)?;
            }
            Ok(())
        }
    }
}

/// Inside a loop, `xs[i] = v` is allowed but `xs[i][j] = v` is not: the
/// functional update must thread through a single carried name
fn ensure_trivial_subscript(target: &Target) -> Result<(), LintError> {
    match &target.node {
        TargetKind::Name(_) => Ok(()),
        TargetKind::Subscript { base, .. } => match &base.node {
            TargetKind::Name(_) => Ok(()),
            _ => Err(LintError::NestedSubscriptInLoop(target.span.clone())),
        },
        TargetKind::Tuple(ts) => {
            for t in ts {
                ensure_trivial_subscript(t)?;
            }
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
