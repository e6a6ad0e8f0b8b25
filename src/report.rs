//! Diagnostic rendering for the CLI
//!
//! Every pipeline error renders with a stage tag taken from the error
//! taxonomy (`syntax`, `source→core`, `types`, `internal`), an arrow line
//! pointing into the source, a gutter snippet with carets, and a help
//! line for misspelled names. Name suggestions know the conventions of
//! this compiler: generated `$` names are never offered, and the user's
//! own bindings outrank builtin names at equal distance.

use crate::ast::{SourceMap, Span};
use crate::lower::LowerError;
use crate::PipelineError;

/// Display settings; color stays off unless explicitly enabled
#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    pub color: bool,
    pub filename: Option<String>,
}

impl ReportConfig {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            filename: None,
        }
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }
}

/// Which part of the pipeline produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Syntax,
    SourceToCore,
    Types,
    Internal,
}

impl Stage {
    pub fn tag(self) -> &'static str {
        match self {
            Stage::Syntax => "syntax",
            Stage::SourceToCore => "source→core",
            Stage::Types => "types",
            Stage::Internal => "internal",
        }
    }
}

// ============================================================================
// Name suggestions
// ============================================================================

/// Candidates for an unknown name, closest first.
///
/// Two tiers: names from the scope environment beat builtin names at the
/// same edit distance, since a typo for one's own variable is the likelier
/// mistake. Names carrying the `$` marker are compiler-minted and never
/// suggested. The distance budget scales with the length of the unknown
/// name so that short names only match near misses.
pub fn suggest_names(unknown: &str, scope: &[&str], builtins: &[&str]) -> Vec<String> {
    let budget = match unknown.len() {
        0..=3 => 1,
        4..=7 => 2,
        _ => 3,
    };

    let mut ranked: Vec<(usize, usize, &str)> = Vec::new();
    for (tier, group) in [scope, builtins].into_iter().enumerate() {
        for cand in group {
            if cand.contains('$') || *cand == unknown {
                continue;
            }
            let d = edit_distance(unknown, cand);
            if d <= budget {
                ranked.push((d, tier, *cand));
            }
        }
    }
    ranked.sort();

    let mut out: Vec<String> = Vec::new();
    for (_, _, name) in ranked {
        if !out.iter().any(|n| n.as_str() == name) {
            out.push(name.to_string());
        }
        if out.len() == 3 {
            break;
        }
    }
    out
}

/// Levenshtein distance over a single rolling row
fn edit_distance(a: &str, b: &str) -> usize {
    let bs: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=bs.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = Vec::with_capacity(bs.len() + 1);
        cur.push(i + 1);
        for (j, &cb) in bs.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            let delete = prev[j + 1] + 1;
            let insert = cur[j] + 1;
            cur.push(substitute.min(delete).min(insert));
        }
        prev = cur;
    }
    prev[bs.len()]
}

// ============================================================================
// Rendering
// ============================================================================

/// Render a pipeline error:
///
/// ```text
/// error[source→core]: unbound name `rnge`
///  --> prog.sy:2:12
///  2 |     return rnge(n)
///    |            ^^^^
///    = help: did you mean `range`?
/// ```
pub fn render(err: &PipelineError, map: &SourceMap, config: &ReportConfig) -> String {
    let (stage, message, span, suggestions) = describe(err);

    let mut out = format!(
        "{}: {}",
        config.paint("31;1", &format!("error[{}]", stage.tag())),
        config.paint("1", &message),
    );

    let mut pad = String::new();
    if let Some(span) = &span {
        let loc = map.locate(span);
        pad = " ".repeat(loc.start.line.to_string().len());
        out.push('\n');
        out.push_str(&snippet(map, span, config));
    }

    if !suggestions.is_empty() {
        let list = suggestions
            .iter()
            .map(|s| format!("`{}`", s))
            .collect::<Vec<_>>()
            .join(" or ");
        out.push_str(&format!("\n{} = help: did you mean {}?", pad, list));
    }
    out
}

/// Stage tag, message, location and suggestions for one pipeline error
fn describe(err: &PipelineError) -> (Stage, String, Option<Span>, Vec<String>) {
    match err {
        PipelineError::Lex(e) => (Stage::Syntax, e.to_string(), Some(e.span().clone()), vec![]),
        PipelineError::Parse(e) => {
            (Stage::Syntax, e.to_string(), Some(e.span().clone()), vec![])
        }
        PipelineError::Lower(e) => {
            let stage = match e {
                LowerError::Precondition(_)
                | LowerError::Semantic { .. }
                | LowerError::Unbound { .. } => Stage::SourceToCore,
                LowerError::Type { .. } | LowerError::Check(_) => Stage::Types,
                LowerError::Internal { .. } => Stage::Internal,
            };
            let suggestions = match e {
                LowerError::Unbound { suggestions, .. } => suggestions.clone(),
                _ => vec![],
            };
            (stage, e.to_string(), e.span().cloned(), suggestions)
        }
    }
}

/// Arrow line plus the offending line with carets under the span
fn snippet(map: &SourceMap, span: &Span, config: &ReportConfig) -> String {
    let loc = map.locate(span);
    let line_no = loc.start.line;
    let text = map.line(line_no).unwrap_or("");
    let gutter = line_no.to_string();
    let pad = " ".repeat(gutter.len());
    let file = config.filename.as_deref().unwrap_or("<input>");

    let carets = if loc.end.line == line_no {
        (loc.end.column - loc.start.column).max(1)
    } else {
        1
    };

    let mut out = String::new();
    out.push_str(&config.paint(
        "36",
        &format!("{} --> {}:{}:{}", pad, file, line_no, loc.start.column),
    ));
    out.push('\n');
    out.push_str(&format!("{} | {}\n", config.paint("36", &gutter), text));
    out.push_str(&format!(
        "{} | {}{}",
        pad,
        " ".repeat(loc.start.column - 1),
        config.paint("31;1", &"^".repeat(carets)),
    ));
    out
}

// ============================================================================
// Tests
// ============================================================================
