//! Schist - lowers a restricted imperative scripting subset into a pure
//! typed functional core

pub mod analyze;
pub mod ast;
pub mod core_ir;
pub mod eager;
pub mod interp;
pub mod lexer;
pub mod lint;
pub mod lower;
pub mod parser;
pub mod report;
pub mod test_support;
pub mod typecheck;

use thiserror::Error;

pub use ast::Program;
pub use core_ir::CoreProgram;
pub use lexer::Lexer;
pub use parser::Parser;

/// Any failure on the way from source text to checked core
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Lex(#[from] lexer::LexError),
    #[error("{0}")]
    Parse(#[from] parser::ParseError),
    #[error("[Source→Core] {0}")]
    Lower(#[from] lower::LowerError),
}

/// Tokenize and parse source text
pub fn parse(source: &str) -> Result<Program, PipelineError> {
    let tokens = Lexer::new(source).tokenize()?;
    Ok(Parser::new(tokens).parse_program()?)
}

/// The whole pipeline: parse, check preconditions, lower, thunk-wrap,
/// type-check
pub fn compile(source: &str) -> Result<CoreProgram, PipelineError> {
    let program = parse(source)?;
    Ok(lower::run(&program)?)
}
