//! Handwritten indentation-aware lexer for the source language

use crate::ast::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    True,
    False,
    NoneKw,

    // Identifiers
    Ident(String),

    // Keywords
    Def,
    Return,
    If,
    Elif,
    Else,
    For,
    In,
    Is,
    Not,
    And,
    Or,
    Lambda,
    Assert,

    // Delimiters
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Colon,    // :
    Dot,      // .
    Arrow,    // ->

    // Operators
    Plus,        // +
    Minus,       // -
    Star,        // *
    DoubleStar,  // **
    Slash,       // /
    DoubleSlash, // //
    Percent,     // %
    At,          // @
    Amp,         // &
    Pipe,        // |
    Caret,       // ^
    Tilde,       // ~
    Shl,         // <<
    Shr,         // >>
    Lt,          // <
    Gt,          // >
    Lte,         // <=
    Gte,         // >=
    EqEq,        // ==
    Neq,         // !=

    // Assignment
    Assign,         // =
    PlusEq,         // +=
    MinusEq,        // -=
    StarEq,         // *=
    DoubleStarEq,   // **=
    SlashEq,        // /=
    DoubleSlashEq,  // //=
    PercentEq,      // %=
    AmpEq,          // &=
    PipeEq,         // |=
    CaretEq,        // ^=
    ShlEq,          // <<=
    ShrEq,          // >>=

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

#[derive(Error, Debug)]
pub enum LexError {
    #[error("unexpected character: {0}")]
    UnexpectedChar(char, Span),
    #[error("string literals are not supported")]
    StringLiteral(Span),
    #[error("tabs are not allowed in indentation")]
    TabIndent(Span),
    #[error("unindent does not match any outer indentation level")]
    BadDedent(Span),
    #[error("integer literal too large")]
    IntOverflow(Span),
}

impl LexError {
    /// Get the source span where this error occurred
    pub fn span(&self) -> &Span {
        match self {
            LexError::UnexpectedChar(_, span) => span,
            LexError::StringLiteral(span) => span,
            LexError::TabIndent(span) => span,
            LexError::BadDedent(span) => span,
            LexError::IntOverflow(span) => span,
        }
    }
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    /// Stack of enclosing indentation widths; always starts with 0
    indents: Vec<usize>,
    /// Depth of open `(`/`[`; newlines inside brackets are ignored
    nesting: usize,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            indents: vec![0],
            nesting: 0,
            at_line_start: true,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut tokens = Vec::new();
        loop {
            if self.at_line_start && self.nesting == 0 {
                self.lex_indentation(&mut tokens)?;
            }
            if self.pos >= self.input.len() {
                break;
            }
            let tok = self.next_token()?;
            match tok {
                Some(t) => tokens.push(t),
                None => continue,
            }
        }
        // Close the final line and any open blocks
        let end = Span::new(self.pos, self.pos);
        if matches!(
            tokens.last().map(|t| &t.token),
            Some(tok) if *tok != Token::Newline
        ) {
            tokens.push(SpannedToken {
                token: Token::Newline,
                span: end.clone(),
            });
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            tokens.push(SpannedToken {
                token: Token::Dedent,
                span: end.clone(),
            });
        }
        tokens.push(SpannedToken {
            token: Token::Eof,
            span: end,
        });
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Measure the indentation of the upcoming line and emit Indent/Dedent
    /// tokens. Blank and comment-only lines are skipped entirely.
    fn lex_indentation(&mut self, tokens: &mut Vec<SpannedToken>) -> Result<(), LexError> {
        loop {
            let line_start = self.pos;
            let mut width = 0usize;
            loop {
                match self.peek() {
                    Some(b' ') => {
                        self.bump();
                        width += 1;
                    }
                    Some(b'\t') => {
                        return Err(LexError::TabIndent(Span::new(self.pos, self.pos + 1)));
                    }
                    _ => break,
                }
            }
            match self.peek() {
                // Blank line or comment-only line: swallow and retry
                Some(b'\n') | Some(b'\r') => {
                    self.skip_to_next_line();
                    continue;
                }
                Some(b'#') => {
                    self.skip_to_next_line();
                    continue;
                }
                None => {
                    self.at_line_start = false;
                    return Ok(());
                }
                Some(_) => {
                    self.at_line_start = false;
                    let span = Span::new(line_start, self.pos);
                    let current = *self.indents.last().unwrap_or(&0);
                    if width > current {
                        self.indents.push(width);
                        tokens.push(SpannedToken {
                            token: Token::Indent,
                            span,
                        });
                    } else if width < current {
                        while *self.indents.last().unwrap_or(&0) > width {
                            self.indents.pop();
                            tokens.push(SpannedToken {
                                token: Token::Dedent,
                                span: span.clone(),
                            });
                        }
                        if *self.indents.last().unwrap_or(&0) != width {
                            return Err(LexError::BadDedent(span));
                        }
                    }
                    return Ok(());
                }
            }
        }
    }

    fn skip_to_next_line(&mut self) {
        while let Some(b) = self.bump() {
            if b == b'\n' {
                break;
            }
        }
    }

    /// Lex one token after the indentation prefix. Returns None for
    /// skippable input (spaces, comments, newlines inside brackets).
    fn next_token(&mut self) -> Result<Option<SpannedToken>, LexError> {
        let start = self.pos;
        let b = match self.bump() {
            Some(b) => b,
            None => return Ok(None),
        };

        let tok = match b {
            b' ' | b'\r' => return Ok(None),
            b'#' => {
                self.skip_to_next_line();
                if self.nesting == 0 {
                    self.at_line_start = true;
                    Token::Newline
                } else {
                    return Ok(None);
                }
            }
            b'\n' => {
                if self.nesting == 0 {
                    self.at_line_start = true;
                    Token::Newline
                } else {
                    return Ok(None);
                }
            }
            b'"' | b'\'' => {
                return Err(LexError::StringLiteral(Span::new(start, self.pos)));
            }
            b'(' => {
                self.nesting += 1;
                Token::LParen
            }
            b')' => {
                self.nesting = self.nesting.saturating_sub(1);
                Token::RParen
            }
            b'[' => {
                self.nesting += 1;
                Token::LBracket
            }
            b']' => {
                self.nesting = self.nesting.saturating_sub(1);
                Token::RBracket
            }
            b',' => Token::Comma,
            b':' => Token::Colon,
            b'.' => Token::Dot,
            b'+' => self.with_eq(Token::Plus, Token::PlusEq),
            b'-' => {
                if self.peek() == Some(b'>') {
                    self.bump();
                    Token::Arrow
                } else {
                    self.with_eq(Token::Minus, Token::MinusEq)
                }
            }
            b'*' => {
                if self.peek() == Some(b'*') {
                    self.bump();
                    self.with_eq(Token::DoubleStar, Token::DoubleStarEq)
                } else {
                    self.with_eq(Token::Star, Token::StarEq)
                }
            }
            b'/' => {
                if self.peek() == Some(b'/') {
                    self.bump();
                    self.with_eq(Token::DoubleSlash, Token::DoubleSlashEq)
                } else {
                    self.with_eq(Token::Slash, Token::SlashEq)
                }
            }
            b'%' => self.with_eq(Token::Percent, Token::PercentEq),
            b'@' => Token::At,
            b'&' => self.with_eq(Token::Amp, Token::AmpEq),
            b'|' => self.with_eq(Token::Pipe, Token::PipeEq),
            b'^' => self.with_eq(Token::Caret, Token::CaretEq),
            b'~' => Token::Tilde,
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.bump();
                    self.with_eq(Token::Shl, Token::ShlEq)
                } else {
                    self.with_eq(Token::Lt, Token::Lte)
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.bump();
                    self.with_eq(Token::Shr, Token::ShrEq)
                } else {
                    self.with_eq(Token::Gt, Token::Gte)
                }
            }
            b'=' => self.with_eq(Token::Assign, Token::EqEq),
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Neq
                } else {
                    return Err(LexError::UnexpectedChar('!', Span::new(start, self.pos)));
                }
            }
            b'0'..=b'9' => {
                while matches!(self.peek(), Some(b'0'..=b'9') | Some(b'_')) {
                    self.bump();
                }
                let text: String = std::str::from_utf8(&self.input[start..self.pos])
                    .unwrap_or("")
                    .chars()
                    .filter(|c| *c != '_')
                    .collect();
                let n: i64 = text
                    .parse()
                    .map_err(|_| LexError::IntOverflow(Span::new(start, self.pos)))?;
                Token::Int(n)
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while matches!(
                    self.peek(),
                    Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'0'..=b'9') | Some(b'_')
                ) {
                    self.bump();
                }
                let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
                keyword(text).unwrap_or_else(|| Token::Ident(text.to_string()))
            }
            other => {
                return Err(LexError::UnexpectedChar(
                    other as char,
                    Span::new(start, self.pos),
                ));
            }
        };

        Ok(Some(SpannedToken {
            token: tok,
            span: Span::new(start, self.pos),
        }))
    }

    /// `bare` or, when the next character is `=`, the compound token
    fn with_eq(&mut self, bare: Token, with: Token) -> Token {
        if self.peek() == Some(b'=') {
            self.bump();
            with
        } else {
            bare
        }
    }
}

fn keyword(text: &str) -> Option<Token> {
    let tok = match text {
        "def" => Token::Def,
        "return" => Token::Return,
        "if" => Token::If,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "for" => Token::For,
        "in" => Token::In,
        "is" => Token::Is,
        "not" => Token::Not,
        "and" => Token::And,
        "or" => Token::Or,
        "lambda" => Token::Lambda,
        "assert" => Token::Assert,
        "True" => Token::True,
        "False" => Token::False,
        "None" => Token::NoneKw,
        _ => return None,
    };
    Some(tok)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn lexes_simple_line() {
        let toks = kinds("x = 1 + 2\n");
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Int(1),
                Token::Plus,
                Token::Int(2),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn emits_indent_and_dedent() {
        let toks = kinds("def f():\n    return 1\n");
        assert!(toks.contains(&Token::Indent));
        assert!(toks.contains(&Token::Dedent));
    }

    #[test]
    fn blank_and_comment_lines_do_not_change_indentation() {
        let toks = kinds("def f():\n    x = 1\n\n    # comment\n    return x\n");
        let indents = toks.iter().filter(|t| **t == Token::Indent).count();
        let dedents = toks.iter().filter(|t| **t == Token::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }

    #[test]
    fn newlines_inside_brackets_are_joined() {
        let toks = kinds("x = [1,\n     2]\n");
        let newlines = toks.iter().filter(|t| **t == Token::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn compound_operators() {
        let toks = kinds("x //= 2 ** 3\n");
        assert!(toks.contains(&Token::DoubleSlashEq));
        assert!(toks.contains(&Token::DoubleStar));
    }

    #[test]
    fn rejects_string_literals() {
        let err = Lexer::new("x = \"hello\"\n").tokenize().unwrap_err();
        assert!(matches!(err, LexError::StringLiteral(_)));
    }

    #[test]
    fn rejects_mismatched_dedent() {
        let err = Lexer::new("def f():\n    x = 1\n  y = 2\n").tokenize().unwrap_err();
        assert!(matches!(err, LexError::BadDedent(_)));
    }
}
