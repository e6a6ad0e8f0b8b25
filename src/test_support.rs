//! Support infrastructure for pipeline tests
//!
//! Integration tests inspect intermediate stages: the parsed AST, the
//! lowered core program, and evaluation results. These helpers keep that
//! plumbing out of the test bodies.

use crate::ast::Program;
use crate::core_ir::{CoreExpr, CoreProgram, Supply, Toplevel};
use crate::interp::{self, Value};
use crate::lexer::Lexer;
use crate::lower;
use crate::parser::Parser;
use crate::PipelineError;

/// Parse a program and return the AST
pub fn parse_program(input: &str) -> Result<Program, String> {
    let tokens = Lexer::new(input)
        .tokenize()
        .map_err(|e| format!("lexer error: {}", e))?;
    Parser::new(tokens)
        .parse_program()
        .map_err(|e| format!("parse error: {}", e))
}

/// Run the full pipeline on source text
pub fn lower_source(input: &str) -> Result<CoreProgram, PipelineError> {
    crate::compile(input)
}

/// Run the full pipeline with an explicit initial counter
pub fn lower_source_with(input: &str, start: u32) -> Result<CoreProgram, PipelineError> {
    let program = crate::parse(input)?;
    Ok(lower::run_with(&program, Supply::with_start(start))?)
}

/// The value bound to a toplevel definition, by name
pub fn def_named<'a>(program: &'a CoreProgram, name: &str) -> Option<&'a CoreExpr> {
    program.defs.iter().find_map(|def| match def {
        Toplevel::Let { name: n, value, .. } | Toplevel::LetRec { name: n, value, .. }
            if n == name =>
        {
            Some(value)
        }
        _ => None,
    })
}

/// Compile and run `solve` on the given arguments
pub fn eval_solve(input: &str, args: Vec<Value>) -> Result<Value, String> {
    let program = lower_source(input).map_err(|e| format!("pipeline error: {}", e))?;
    interp::apply_entry(&program, args).map_err(|e| format!("eval error: {}", e))
}

pub fn int(n: i64) -> Value {
    Value::Int(n)
}

pub fn int_list(ns: &[i64]) -> Value {
    Value::list(ns.iter().copied().map(Value::Int).collect())
}

/// Walk every subexpression of a program, depth-first
pub fn walk_program(program: &CoreProgram, f: &mut impl FnMut(&CoreExpr)) {
    for def in &program.defs {
        let value = match def {
            Toplevel::Let { value, .. } | Toplevel::LetRec { value, .. } => value,
        };
        walk_expr(value, f);
    }
    walk_expr(&program.result, f);
}

/// The first binder that shadows another binder on its own root-to-leaf
/// path, if any. The lowering promises there is none.
pub fn find_shadowed_binder(program: &CoreProgram) -> Option<String> {
    fn check(e: &CoreExpr, stack: &mut Vec<String>) -> Option<String> {
        match e {
            CoreExpr::Var(_) | CoreExpr::Int(_) | CoreExpr::Bool(_) | CoreExpr::Prim { .. } => {
                None
            }
            CoreExpr::Tuple(es) => es.iter().find_map(|e| check(e, stack)),
            CoreExpr::Proj { tuple, .. } => check(tuple, stack),
            CoreExpr::App { func, args } => check(func, stack)
                .or_else(|| args.iter().find_map(|a| check(a, stack))),
            CoreExpr::Lam { params, body } => {
                for (name, _) in params {
                    if stack.contains(name) {
                        return Some(name.clone());
                    }
                }
                let mark = stack.len();
                stack.extend(params.iter().map(|(n, _)| n.clone()));
                let found = check(body, stack);
                stack.truncate(mark);
                found
            }
            CoreExpr::Let {
                name, value, body, ..
            } => {
                if let Some(hit) = check(value, stack) {
                    return Some(hit);
                }
                if stack.contains(name) {
                    return Some(name.clone());
                }
                stack.push(name.clone());
                let found = check(body, stack);
                stack.pop();
                found
            }
        }
    }

    let mut stack = Vec::new();
    for def in &program.defs {
        let value = match def {
            Toplevel::Let { value, .. } | Toplevel::LetRec { value, .. } => value,
        };
        if let Some(hit) = check(value, &mut stack) {
            return Some(hit);
        }
    }
    check(&program.result, &mut stack)
}

pub fn walk_expr(e: &CoreExpr, f: &mut impl FnMut(&CoreExpr)) {
    f(e);
    match e {
        CoreExpr::Var(_) | CoreExpr::Int(_) | CoreExpr::Bool(_) | CoreExpr::Prim { .. } => {}
        CoreExpr::Tuple(es) => {
            for e in es {
                walk_expr(e, f);
            }
        }
        CoreExpr::Proj { tuple, .. } => walk_expr(tuple, f),
        CoreExpr::App { func, args } => {
            walk_expr(func, f);
            for a in args {
                walk_expr(a, f);
            }
        }
        CoreExpr::Lam { body, .. } => walk_expr(body, f),
        CoreExpr::Let { value, body, .. } => {
            walk_expr(value, f);
            walk_expr(body, f);
        }
    }
}
