//! Schist CLI - lower a script file to the functional core

use std::env;
use std::fs;
use std::io::IsTerminal;
use std::process;

use schist::ast::SourceMap;
use schist::interp::{self, Value};
use schist::report::{self, ReportConfig};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: schist FILE [--eval N...]");
        process::exit(2);
    }

    let path = &args[1];
    let mut eval_args: Option<Vec<i64>> = None;
    if args.len() > 2 {
        if args[2] != "--eval" {
            eprintln!("usage: schist FILE [--eval N...]");
            process::exit(2);
        }
        let mut ns = Vec::new();
        for raw in &args[3..] {
            match raw.parse::<i64>() {
                Ok(n) => ns.push(n),
                Err(_) => {
                    eprintln!("--eval arguments must be integers, got `{}`", raw);
                    process::exit(2);
                }
            }
        }
        eval_args = Some(ns);
    }

    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading {}: {}", path, e);
            process::exit(1);
        }
    };

    let source_map = SourceMap::new(source.clone());
    let config = ReportConfig::new(std::io::stderr().is_terminal()).with_filename(path.clone());

    let program = match schist::compile(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", report::render(&e, &source_map, &config));
            process::exit(1);
        }
    };

    match eval_args {
        None => println!("{}", program),
        Some(ns) => {
            let values: Vec<Value> = ns.into_iter().map(Value::Int).collect();
            match interp::apply_entry(&program, values) {
                Ok(v) => println!("{}", v),
                Err(e) => {
                    eprintln!("runtime error: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}
