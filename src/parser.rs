//! Recursive-descent parser producing the source AST

use std::rc::Rc;

use thiserror::Error;

use crate::ast::{
    expr_to_target, BinOp, BoolOp, CmpOp, Expr, ExprKind, FuncDef, Item, Param, Program, Span,
    Stmt, StmtKind, Target, TypeExpr, TypeExprKind, UnaryOp,
};
use crate::lexer::{SpannedToken, Token};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("invalid assignment target")]
    InvalidTarget(Span),
    #[error("only `def`, assignments and `assert` are allowed at the top level")]
    ToplevelStmt(Span),
    #[error("unknown type name: {0}")]
    UnknownType(String, Span),
}

impl ParseError {
    pub fn span(&self) -> &Span {
        match self {
            ParseError::Unexpected { span, .. } => span,
            ParseError::InvalidTarget(span) => span,
            ParseError::ToplevelStmt(span) => span,
            ParseError::UnknownType(_, span) => span,
        }
    }
}

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ========================================================================
    // Token plumbing
    // ========================================================================

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.clone())
            .unwrap_or_default()
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span.clone())
            .unwrap_or_default()
    }

    fn advance(&mut self) -> SpannedToken {
        let t = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or(SpannedToken {
                token: Token::Eof,
                span: Span::default(),
            });
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token, expected: &str) -> Result<Span, ParseError> {
        if self.peek() == &tok {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::Unexpected {
            expected: expected.to_string(),
            found: format!("{:?}", self.peek()),
            span: self.peek_span(),
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Span), ParseError> {
        match self.peek() {
            Token::Ident(_) => {
                let t = self.advance();
                match t.token {
                    Token::Ident(name) => Ok((name, t.span)),
                    _ => unreachable!(),
                }
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    // ========================================================================
    // Program structure
    // ========================================================================

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Token::Eof => break,
                Token::Def => items.push(Item::Func(self.parse_func()?)),
                Token::Assert => {
                    self.advance();
                    let e = self.parse_testlist()?;
                    self.expect(Token::Newline, "end of line")?;
                    items.push(Item::Assert(e));
                }
                _ => {
                    let span = self.peek_span();
                    let stmt = self.parse_simple_stmt()?;
                    match stmt.node {
                        StmtKind::Assign {
                            target:
                                Target {
                                    node: crate::ast::TargetKind::Name(name),
                                    ..
                                },
                            ty,
                            value,
                        } => items.push(Item::Assign {
                            name,
                            ty,
                            value,
                            span: stmt.span,
                        }),
                        _ => return Err(ParseError::ToplevelStmt(span)),
                    }
                }
            }
        }
        Ok(Program { items })
    }

    fn parse_func(&mut self) -> Result<FuncDef, ParseError> {
        let start = self.expect(Token::Def, "`def`")?;
        let (name, _) = self.expect_ident("function name")?;
        self.expect(Token::LParen, "`(`")?;
        let mut params = Vec::new();
        if self.peek() != &Token::RParen {
            loop {
                let (pname, pspan) = self.expect_ident("parameter name")?;
                let ty = if self.eat(&Token::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                params.push(Param {
                    name: pname,
                    ty,
                    span: pspan,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "`)`")?;
        let ret = if self.eat(&Token::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        let end = self.prev_span();
        Ok(FuncDef {
            name,
            params,
            ret,
            body,
            span: start.merge(&end),
        })
    }

    /// `: NEWLINE INDENT stmt+ DEDENT`
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Token::Colon, "`:`")?;
        self.expect(Token::Newline, "end of line")?;
        self.expect(Token::Indent, "an indented block")?;
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&Token::Dedent) {
                break;
            }
            if self.peek() == &Token::Eof {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        if stmts.is_empty() {
            return Err(self.unexpected("at least one statement"));
        }
        Ok(stmts)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            _ => self.parse_simple_stmt(),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(Token::If, "`if`")?;
        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let else_body = if self.peek() == &Token::Elif {
            // `elif` is sugar for an `else` holding a nested `if`
            let nested = self.parse_elif()?;
            vec![nested]
        } else if self.eat(&Token::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        let end = self.prev_span();
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            start.merge(&end),
        ))
    }

    fn parse_elif(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(Token::Elif, "`elif`")?;
        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let else_body = if self.peek() == &Token::Elif {
            vec![self.parse_elif()?]
        } else if self.eat(&Token::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        let end = self.prev_span();
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            start.merge(&end),
        ))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(Token::For, "`for`")?;
        let target_expr = self.parse_testlist_no_in()?;
        let target = expr_to_target(&target_expr)
            .ok_or_else(|| ParseError::InvalidTarget(target_expr.span.clone()))?;
        self.expect(Token::In, "`in`")?;
        let iter = self.parse_testlist()?;
        let body = self.parse_block()?;
        let end = self.prev_span();
        Ok(Stmt::new(
            StmtKind::For { target, iter, body },
            start.merge(&end),
        ))
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Token::Return => {
                let start = self.advance().span;
                let value = self.parse_testlist()?;
                self.expect(Token::Newline, "end of line")?;
                let span = start.merge(&value.span);
                Ok(Stmt::new(StmtKind::Return(value), span))
            }
            Token::Assert => {
                let start = self.advance().span;
                let value = self.parse_testlist()?;
                self.expect(Token::Newline, "end of line")?;
                let span = start.merge(&value.span);
                Ok(Stmt::new(StmtKind::Assert(value), span))
            }
            _ => self.parse_assign_or_expr(),
        }
    }

    fn parse_assign_or_expr(&mut self) -> Result<Stmt, ParseError> {
        let first = self.parse_testlist()?;
        let start = first.span.clone();

        if self.eat(&Token::Colon) {
            // Annotated assignment: target : T = value
            let ty = self.parse_type()?;
            self.expect(Token::Assign, "`=`")?;
            let value = self.parse_testlist()?;
            self.expect(Token::Newline, "end of line")?;
            let target =
                expr_to_target(&first).ok_or_else(|| ParseError::InvalidTarget(start.clone()))?;
            let span = start.merge(&value.span);
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target,
                    ty: Some(ty),
                    value,
                },
                span,
            ));
        }

        if self.eat(&Token::Assign) {
            let value = self.parse_testlist()?;
            self.expect(Token::Newline, "end of line")?;
            let target =
                expr_to_target(&first).ok_or_else(|| ParseError::InvalidTarget(start.clone()))?;
            let span = start.merge(&value.span);
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target,
                    ty: None,
                    value,
                },
                span,
            ));
        }

        if let Some(op) = aug_op(self.peek()) {
            self.advance();
            let value = self.parse_testlist()?;
            self.expect(Token::Newline, "end of line")?;
            let target =
                expr_to_target(&first).ok_or_else(|| ParseError::InvalidTarget(start.clone()))?;
            let span = start.merge(&value.span);
            return Ok(Stmt::new(StmtKind::AugAssign { target, op, value }, span));
        }

        self.expect(Token::Newline, "end of line")?;

        // xs.append(e) is a statement of its own
        if let ExprKind::Call { func, args } = &first.node {
            if let ExprKind::Attribute { value, attr } = &func.node {
                if attr == "append" && args.len() == 1 {
                    let span = first.span.clone();
                    return Ok(Stmt::new(
                        StmtKind::Append {
                            seq: (**value).clone(),
                            value: args[0].clone(),
                        },
                        span,
                    ));
                }
            }
        }

        let span = first.span.clone();
        Ok(Stmt::new(StmtKind::ExprStmt(first), span))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Comma-separated expressions; two or more form a tuple display
    fn parse_testlist(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_expr()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let start = first.span.clone();
        let mut elems = vec![first];
        while self.eat(&Token::Comma) {
            if testlist_end(self.peek()) {
                break;
            }
            elems.push(self.parse_expr()?);
        }
        let end = elems.last().map(|e| e.span.clone()).unwrap_or_default();
        Ok(Expr::new(ExprKind::Tuple(elems), start.merge(&end)))
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == &Token::Lambda {
            return self.parse_lambda();
        }
        let value = self.parse_or()?;
        if self.eat(&Token::If) {
            let cond = self.parse_or()?;
            self.expect(Token::Else, "`else`")?;
            let orelse = self.parse_expr()?;
            let span = value.span.merge(&orelse.span);
            return Ok(Expr::new(
                ExprKind::IfExp {
                    cond: Rc::new(cond),
                    then_branch: Rc::new(value),
                    else_branch: Rc::new(orelse),
                },
                span,
            ));
        }
        Ok(value)
    }

    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(Token::Lambda, "`lambda`")?;
        let mut params = Vec::new();
        if self.peek() != &Token::Colon {
            loop {
                let (name, _) = self.expect_ident("parameter name")?;
                params.push(name);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::Colon, "`:`")?;
        let body = self.parse_expr()?;
        let span = start.merge(&body.span);
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Rc::new(body),
            },
            span,
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::Or,
                    left: Rc::new(left),
                    right: Rc::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::And,
                    left: Rc::new(left),
                    right: Rc::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == &Token::Not {
            let start = self.advance().span;
            let operand = self.parse_not()?;
            let span = start.merge(&operand.span);
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Rc::new(operand),
                },
                span,
            ));
        }
        self.parse_comparison()
    }

    /// A chain `a < b <= c` becomes `(a < b) and (b <= c)`, two operands
    /// per comparison node.
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_bitor()?;
        let mut prev = first;
        let mut chain: Option<Expr> = None;
        while let Some(op) = self.parse_cmp_op()? {
            let right = self.parse_bitor()?;
            let span = prev.span.merge(&right.span);
            let link = Expr::new(
                ExprKind::Compare {
                    op,
                    left: Rc::new(prev.clone()),
                    right: Rc::new(right.clone()),
                },
                span,
            );
            chain = Some(match chain {
                None => link,
                Some(acc) => {
                    let span = acc.span.merge(&link.span);
                    Expr::new(
                        ExprKind::BoolOp {
                            op: BoolOp::And,
                            left: Rc::new(acc),
                            right: Rc::new(link),
                        },
                        span,
                    )
                }
            });
            prev = right;
        }
        match chain {
            Some(e) => Ok(e),
            None => Ok(prev),
        }
    }

    fn parse_cmp_op(&mut self) -> Result<Option<CmpOp>, ParseError> {
        let op = match self.peek() {
            Token::EqEq => CmpOp::Eq,
            Token::Neq => CmpOp::NotEq,
            Token::Lt => CmpOp::Lt,
            Token::Lte => CmpOp::LtE,
            Token::Gt => CmpOp::Gt,
            Token::Gte => CmpOp::GtE,
            Token::In => CmpOp::In,
            Token::Is => {
                self.advance();
                if self.eat(&Token::Not) {
                    return Ok(Some(CmpOp::IsNot));
                }
                return Ok(Some(CmpOp::Is));
            }
            Token::Not => {
                // `not in` is the only comparison starting with `not`
                if self.tokens.get(self.pos + 1).map(|t| &t.token) == Some(&Token::In) {
                    self.advance();
                    self.advance();
                    return Ok(Some(CmpOp::NotIn));
                }
                return Ok(None);
            }
            _ => return Ok(None),
        };
        self.advance();
        Ok(Some(op))
    }

    fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_bitxor()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_bitxor()?;
            left = binop(BinOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_bitand()?;
        while self.eat(&Token::Caret) {
            let right = self.parse_bitand()?;
            left = binop(BinOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_shift()?;
        while self.eat(&Token::Amp) {
            let right = self.parse_shift()?;
            left = binop(BinOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_arith()?;
        loop {
            let op = match self.peek() {
                Token::Shl => BinOp::Shl,
                Token::Shr => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let right = self.parse_arith()?;
            left = binop(op, left, right);
        }
        Ok(left)
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = binop(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                Token::At => BinOp::MatMult,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = binop(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Plus => UnaryOp::Pos,
            Token::Minus => UnaryOp::Neg,
            Token::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        let start = self.advance().span;
        let operand = self.parse_factor()?;
        let span = start.merge(&operand.span);
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Rc::new(operand),
            },
            span,
        ))
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            // Right-associative, binds tighter than unary on the left
            let exp = self.parse_factor()?;
            return Ok(binop(BinOp::Pow, base, exp));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_atom()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    let end = self.expect(Token::RParen, "`)`")?;
                    let span = e.span.merge(&end);
                    e = Expr::new(
                        ExprKind::Call {
                            func: Rc::new(e),
                            args,
                        },
                        span,
                    );
                }
                Token::LBracket => {
                    self.advance();
                    e = self.parse_subscript_rest(e)?;
                }
                Token::Dot => {
                    self.advance();
                    let (attr, end) = self.expect_ident("attribute name")?;
                    let span = e.span.merge(&end);
                    e = Expr::new(
                        ExprKind::Attribute {
                            value: Rc::new(e),
                            attr,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == &Token::RParen {
            return Ok(args);
        }
        loop {
            if self.peek() == &Token::Star {
                let start = self.advance().span;
                let inner = self.parse_expr()?;
                let span = start.merge(&inner.span);
                args.push(Expr::new(ExprKind::Starred(Rc::new(inner)), span));
            } else {
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
            if self.peek() == &Token::RParen {
                break;
            }
        }
        Ok(args)
    }

    /// After the opening `[` of a subscript: index or slice
    fn parse_subscript_rest(&mut self, base: Expr) -> Result<Expr, ParseError> {
        let mut lower = None;
        if self.peek() != &Token::Colon {
            lower = Some(Rc::new(self.parse_expr()?));
            if self.peek() == &Token::RBracket {
                let end = self.advance().span;
                let span = base.span.merge(&end);
                return Ok(Expr::new(
                    ExprKind::Subscript {
                        value: Rc::new(base),
                        index: lower.unwrap(),
                    },
                    span,
                ));
            }
        }
        self.expect(Token::Colon, "`:` or `]`")?;
        let mut upper = None;
        if self.peek() != &Token::Colon && self.peek() != &Token::RBracket {
            upper = Some(Rc::new(self.parse_expr()?));
        }
        let mut step = None;
        if self.eat(&Token::Colon) {
            if self.peek() != &Token::RBracket {
                step = Some(Rc::new(self.parse_expr()?));
            }
        }
        let end = self.expect(Token::RBracket, "`]`")?;
        let span = base.span.merge(&end);
        Ok(Expr::new(
            ExprKind::Slice {
                value: Rc::new(base),
                lower,
                upper,
                step,
            },
            span,
        ))
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let span = self.peek_span();
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(n), span))
            }
            Token::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), span))
            }
            Token::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), span))
            }
            Token::NoneKw => {
                self.advance();
                Ok(Expr::new(ExprKind::NoneLit, span))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Name(name), span))
            }
            Token::LParen => {
                self.advance();
                if self.eat(&Token::RParen) {
                    let end = self.prev_span();
                    return Ok(Expr::new(ExprKind::Tuple(Vec::new()), span.merge(&end)));
                }
                let inner = self.parse_testlist()?;
                let end = self.expect(Token::RParen, "`)`")?;
                Ok(Expr::new(inner.node, span.merge(&end)))
            }
            Token::LBracket => {
                self.advance();
                self.parse_list_display(span)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// After the opening `[`: list literal or comprehension
    fn parse_list_display(&mut self, start: Span) -> Result<Expr, ParseError> {
        if self.eat(&Token::RBracket) {
            let end = self.prev_span();
            return Ok(Expr::new(
                ExprKind::List {
                    elems: Vec::new(),
                    elem_ty: None,
                },
                start.merge(&end),
            ));
        }
        let first = self.parse_expr()?;
        if self.eat(&Token::For) {
            let target_expr = self.parse_testlist_no_in()?;
            let target = expr_to_target(&target_expr)
                .ok_or_else(|| ParseError::InvalidTarget(target_expr.span.clone()))?;
            self.expect(Token::In, "`in`")?;
            let iter = self.parse_or()?;
            let cond = if self.eat(&Token::If) {
                Some(Rc::new(self.parse_or()?))
            } else {
                None
            };
            let end = self.expect(Token::RBracket, "`]`")?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    head: Rc::new(first),
                    target,
                    iter: Rc::new(iter),
                    cond,
                },
                start.merge(&end),
            ));
        }
        let mut elems = vec![first];
        while self.eat(&Token::Comma) {
            if self.peek() == &Token::RBracket {
                break;
            }
            elems.push(self.parse_expr()?);
        }
        let end = self.expect(Token::RBracket, "`]`")?;
        Ok(Expr::new(
            ExprKind::List {
                elems,
                elem_ty: None,
            },
            start.merge(&end),
        ))
    }

    /// Loop and comprehension targets, stopping before `in` so membership
    /// tests in the iterable are not swallowed
    fn parse_testlist_no_in(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_postfix()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let start = first.span.clone();
        let mut elems = vec![first];
        while self.eat(&Token::Comma) {
            if self.peek() == &Token::In {
                break;
            }
            elems.push(self.parse_postfix()?);
        }
        let end = elems.last().map(|e| e.span.clone()).unwrap_or_default();
        Ok(Expr::new(ExprKind::Tuple(elems), start.merge(&end)))
    }

    // ========================================================================
    // Type annotations
    // ========================================================================

    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let span = self.peek_span();
        match self.peek().clone() {
            Token::NoneKw => {
                self.advance();
                Ok(TypeExpr::new(TypeExprKind::SideEffect, span))
            }
            Token::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "int" => Ok(TypeExpr::new(TypeExprKind::Int, span)),
                    "bool" => Ok(TypeExpr::new(TypeExprKind::Bool, span)),
                    "str" => Ok(TypeExpr::new(TypeExprKind::Str, span)),
                    "List" => {
                        self.expect(Token::LBracket, "`[`")?;
                        let inner = self.parse_type()?;
                        let end = self.expect(Token::RBracket, "`]`")?;
                        Ok(TypeExpr::new(
                            TypeExprKind::List(Rc::new(inner)),
                            span.merge(&end),
                        ))
                    }
                    "Tuple" => {
                        self.expect(Token::LBracket, "`[`")?;
                        let mut elems = Vec::new();
                        loop {
                            elems.push(self.parse_type()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                        let end = self.expect(Token::RBracket, "`]`")?;
                        Ok(TypeExpr::new(TypeExprKind::Tuple(elems), span.merge(&end)))
                    }
                    "Callable" => {
                        self.expect(Token::LBracket, "`[`")?;
                        self.expect(Token::LBracket, "`[`")?;
                        let mut params = Vec::new();
                        if self.peek() != &Token::RBracket {
                            loop {
                                params.push(self.parse_type()?);
                                if !self.eat(&Token::Comma) {
                                    break;
                                }
                            }
                        }
                        self.expect(Token::RBracket, "`]`")?;
                        self.expect(Token::Comma, "`,`")?;
                        let ret = self.parse_type()?;
                        let end = self.expect(Token::RBracket, "`]`")?;
                        Ok(TypeExpr::new(
                            TypeExprKind::Callable {
                                params,
                                ret: Rc::new(ret),
                            },
                            span.merge(&end),
                        ))
                    }
                    _ if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) => {
                        Ok(TypeExpr::new(TypeExprKind::Var(name), span))
                    }
                    _ => Err(ParseError::UnknownType(name, span)),
                }
            }
            _ => Err(self.unexpected("a type")),
        }
    }
}

fn binop(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(&right.span);
    Expr::new(
        ExprKind::BinOp {
            op,
            left: Rc::new(left),
            right: Rc::new(right),
        },
        span,
    )
}

fn aug_op(tok: &Token) -> Option<BinOp> {
    let op = match tok {
        Token::PlusEq => BinOp::Add,
        Token::MinusEq => BinOp::Sub,
        Token::StarEq => BinOp::Mul,
        Token::SlashEq => BinOp::Div,
        Token::DoubleSlashEq => BinOp::FloorDiv,
        Token::PercentEq => BinOp::Mod,
        Token::DoubleStarEq => BinOp::Pow,
        Token::AmpEq => BinOp::BitAnd,
        Token::PipeEq => BinOp::BitOr,
        Token::CaretEq => BinOp::BitXor,
        Token::ShlEq => BinOp::Shl,
        Token::ShrEq => BinOp::Shr,
        _ => return None,
    };
    Some(op)
}

fn testlist_end(tok: &Token) -> bool {
    matches!(
        tok,
        Token::Newline
            | Token::Eof
            | Token::Assign
            | Token::Colon
            | Token::RParen
            | Token::RBracket
            | Token::In
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> Program {
        let tokens = Lexer::new(input).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    #[test]
    fn parses_function_with_annotations() {
        let prog = parse("def solve(n: int) -> int:\n    return n\n");
        let Item::Func(f) = &prog.items[0] else {
            panic!("expected a function");
        };
        assert_eq!(f.name, "solve");
        assert_eq!(f.params.len(), 1);
        assert!(f.ret.is_some());
    }

    #[test]
    fn comparison_chain_splits_into_pairs() {
        let prog = parse("def f(a, b, c):\n    return a < b <= c\n");
        let Item::Func(f) = &prog.items[0] else {
            panic!("expected a function");
        };
        let StmtKind::Return(e) = &f.body[0].node else {
            panic!("expected return");
        };
        let ExprKind::BoolOp { op: BoolOp::And, left, right } = &e.node else {
            panic!("expected a conjunction, got {:?}", e.node);
        };
        assert!(matches!(left.node, ExprKind::Compare { op: CmpOp::Lt, .. }));
        assert!(matches!(right.node, ExprKind::Compare { op: CmpOp::LtE, .. }));
    }

    #[test]
    fn append_call_becomes_statement() {
        let prog = parse("def f(xs):\n    xs.append(1)\n    return xs\n");
        let Item::Func(f) = &prog.items[0] else {
            panic!("expected a function");
        };
        assert!(matches!(f.body[0].node, StmtKind::Append { .. }));
    }

    #[test]
    fn elif_desugars_to_nested_if() {
        let prog = parse(
            "def f(x):\n    if x == 0:\n        return 0\n    elif x == 1:\n        return 1\n    else:\n        return 2\n",
        );
        let Item::Func(f) = &prog.items[0] else {
            panic!("expected a function");
        };
        let StmtKind::If { else_body, .. } = &f.body[0].node else {
            panic!("expected if");
        };
        assert_eq!(else_body.len(), 1);
        assert!(matches!(else_body[0].node, StmtKind::If { .. }));
    }

    #[test]
    fn slice_forms() {
        let prog = parse("def f(xs):\n    return xs[1::2]\n");
        let Item::Func(f) = &prog.items[0] else {
            panic!("expected a function");
        };
        let StmtKind::Return(e) = &f.body[0].node else {
            panic!("expected return");
        };
        let ExprKind::Slice { lower, upper, step, .. } = &e.node else {
            panic!("expected slice, got {:?}", e.node);
        };
        assert!(lower.is_some());
        assert!(upper.is_none());
        assert!(step.is_some());
    }

    #[test]
    fn tuple_assignment_target() {
        let prog = parse("def f(p):\n    a, b = p\n    return a\n");
        let Item::Func(f) = &prog.items[0] else {
            panic!("expected a function");
        };
        let StmtKind::Assign { target, .. } = &f.body[0].node else {
            panic!("expected assignment");
        };
        assert!(matches!(target.node, crate::ast::TargetKind::Tuple(_)));
    }

    #[test]
    fn for_over_range() {
        let prog = parse("def f(n):\n    s = 0\n    for i in range(n):\n        s += i\n    return s\n");
        let Item::Func(f) = &prog.items[0] else {
            panic!("expected a function");
        };
        assert!(matches!(f.body[1].node, StmtKind::For { .. }));
    }

    #[test]
    fn rejects_bare_statement_at_toplevel() {
        let tokens = Lexer::new("1 + 2\n").tokenize().unwrap();
        let err = Parser::new(tokens).parse_program().unwrap_err();
        assert!(matches!(err, ParseError::ToplevelStmt(_)));
    }
}
