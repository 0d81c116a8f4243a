//! Recursive-descent parser for PadScript.
//!
//! The parser stops at the first syntax error. Name resolution and type
//! checking happen later in the binder.

use super::ast::*;
use super::diagnostic::{Diagnostic, Pos};
use super::lexer::{Punct, Token, TokenKind, is_keyword, tokenize};

type PResult<T> = Result<T, Diagnostic>;

/// Deepest syntactic nesting accepted. Every later stage recurses over the
/// tree, so this bounds their native stack use.
const MAX_NESTING: usize = 128;

/// Built-in type keywords usable wherever a type is expected.
const TYPE_KEYWORDS: &[&str] = &[
    "int", "long", "double", "float", "bool", "string", "object", "void",
];

/// Tokenize and parse one source file.
pub fn parse_source(source: &str, file: u16) -> PResult<Submission> {
    let tokens = tokenize(source, file)?;
    Parser {
        tokens,
        index: 0,
        depth: 0,
    }
    .parse_submission()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        // The token stream always ends with Eof
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let index = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn pos(&self) -> Pos {
        self.peek().pos
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, punct: Punct) -> bool {
        self.peek().kind == TokenKind::Punct(punct)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.check(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: Punct) -> PResult<Pos> {
        if self.check(punct) {
            return Ok(self.advance().pos);
        }
        let pos = self.pos();
        Err(match punct {
            Punct::Semi => Diagnostic::new("SP1002", "; expected", pos),
            Punct::RBrace => Diagnostic::new("SP1513", "} expected", pos),
            Punct::RParen => Diagnostic::new("SP1026", ") expected", pos),
            other => Diagnostic::new("SP1003", format!("Syntax error, '{other}' expected"), pos),
        })
    }

    fn check_word(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name == word)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, Pos)> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) if !is_keyword(&name) => {
                self.advance();
                Ok((name, token.pos))
            }
            TokenKind::Ident(name) => Err(Diagnostic::new(
                "SP1041",
                format!("Identifier expected; '{name}' is a keyword"),
                token.pos,
            )),
            _ => Err(Diagnostic::new("SP1001", "Identifier expected", token.pos)),
        }
    }

    /// Descend one nesting level, failing once the tree would get too deep.
    /// Parsing stops at the first error, so only the success path unwinds.
    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(Diagnostic::new(
                "SP8078",
                "An expression is too long or complex to compile",
                self.pos(),
            ));
        }
        Ok(())
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.enter()?;
        let result = parse(self)?;
        self.depth -= 1;
        Ok(result)
    }

    fn is_plain_ident(kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Ident(name) if !is_keyword(name))
    }

    // ------------------------------------------------------------------
    // Submission structure
    // ------------------------------------------------------------------

    fn parse_submission(&mut self) -> PResult<Submission> {
        let mut items = Vec::new();
        let mut seen_code = false;
        while !self.at_eof() {
            let pos = self.pos();
            let item = self.parse_item()?;
            if item.is_directive() {
                if seen_code {
                    return Err(match item {
                        Item::Using { .. } => Diagnostic::new(
                            "SP1529",
                            "A using clause must precede all other elements",
                            pos,
                        ),
                        _ => Diagnostic::new(
                            "SP7102",
                            "#r and #load directives must precede all other elements",
                            pos,
                        ),
                    });
                }
            } else {
                seen_code = true;
            }
            items.push(item);
        }
        Ok(Submission { items })
    }

    fn parse_item(&mut self) -> PResult<Item> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Directive(name) => {
                self.advance();
                let target = self.peek().clone();
                let TokenKind::Str(value) = target.kind else {
                    return Err(Diagnostic::new(
                        "SP7010",
                        "Quoted file name expected",
                        target.pos,
                    ));
                };
                self.advance();
                match name.as_str() {
                    "r" => Ok(Item::Reference {
                        name: value,
                        pos: token.pos,
                    }),
                    "load" => Ok(Item::Load {
                        path: value,
                        pos: token.pos,
                    }),
                    _ => Err(Diagnostic::new(
                        "SP1024",
                        "Preprocessor directive expected",
                        token.pos,
                    )),
                }
            }
            TokenKind::Ident(word) if word == "using" => {
                self.advance();
                let is_static = self.eat_word("static");
                let mut path = vec![self.expect_ident()?.0];
                while self.eat(Punct::Dot) {
                    path.push(self.expect_ident()?.0);
                }
                self.expect(Punct::Semi)?;
                Ok(Item::Using {
                    path,
                    is_static,
                    pos: token.pos,
                })
            }
            _ => {
                if self.starts_function() {
                    return Ok(Item::Function(self.parse_function()?));
                }
                if self.starts_declaration() || self.starts_keyword_statement() {
                    return Ok(Item::Stmt(self.parse_statement()?));
                }
                let expr = self.parse_expr()?;
                if self.eat(Punct::Semi) {
                    Ok(Item::Stmt(Stmt::Expr(expr)))
                } else if self.at_eof() {
                    Ok(Item::Trailing(expr))
                } else {
                    Err(Diagnostic::new("SP1002", "; expected", self.pos()))
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Types and declarations
    // ------------------------------------------------------------------

    /// Speculatively parse a type name. Restores the position and returns
    /// `None` when the tokens do not form a type.
    fn try_type(&mut self) -> Option<TypeName> {
        let start = self.index;
        let result = self.try_type_inner();
        if result.is_none() {
            self.index = start;
        }
        result
    }

    fn try_type_inner(&mut self) -> Option<TypeName> {
        let token = self.peek().clone();
        let TokenKind::Ident(first) = token.kind else {
            return None;
        };
        if is_keyword(&first) && !TYPE_KEYWORDS.contains(&first.as_str()) {
            return None;
        }
        self.advance();
        let mut path = vec![first];
        while self.check(Punct::Dot) && Self::is_plain_ident(self.peek_kind_at(1)) {
            self.advance();
            if let TokenKind::Ident(name) = self.advance().kind {
                path.push(name);
            }
        }
        let args = if self.check(Punct::Lt) {
            // Too deep to be a type; the expression parser reports it.
            if self.depth >= MAX_NESTING {
                return None;
            }
            self.advance();
            self.depth += 1;
            let parsed = self.try_type_args();
            self.depth -= 1;
            parsed?
        } else {
            Vec::new()
        };
        Some(TypeName {
            path,
            args,
            pos: token.pos,
        })
    }

    fn try_type_args(&mut self) -> Option<Vec<TypeName>> {
        let mut args = Vec::new();
        loop {
            args.push(self.try_type_inner()?);
            if self.eat(Punct::Comma) {
                continue;
            }
            if self.eat(Punct::Gt) {
                return Some(args);
            }
            return None;
        }
    }

    fn parse_type(&mut self) -> PResult<TypeName> {
        let pos = self.pos();
        self.try_type()
            .ok_or_else(|| Diagnostic::new("SP1031", "Type expected", pos))
    }

    /// `Type Name (` at the current position.
    fn starts_function(&mut self) -> bool {
        let start = self.index;
        let result = self.try_type().is_some()
            && Self::is_plain_ident(&self.peek().kind)
            && *self.peek_kind_at(1) == TokenKind::Punct(Punct::LParen);
        self.index = start;
        result
    }

    /// `var Name` or `Type Name` at the current position.
    fn starts_declaration(&mut self) -> bool {
        if self.check_word("var") && Self::is_plain_ident(self.peek_kind_at(1)) {
            return true;
        }
        let start = self.index;
        let result = self.try_type().is_some() && Self::is_plain_ident(&self.peek().kind);
        self.index = start;
        result
    }

    fn starts_keyword_statement(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Ident(word) => matches!(
                word.as_str(),
                "if" | "while" | "for" | "foreach" | "break" | "continue" | "return" | "throw"
            ),
            TokenKind::Punct(Punct::LBrace | Punct::Semi) => true,
            _ => false,
        }
    }

    fn parse_function(&mut self) -> PResult<FunctionDecl> {
        let ret = self.parse_type()?;
        let (name, pos) = self.expect_ident()?;
        self.expect(Punct::LParen)?;
        let mut params = Vec::new();
        if !self.check(Punct::RParen) {
            loop {
                let ty = self.parse_type()?;
                let (name, pos) = self.expect_ident()?;
                params.push(Param { ty, name, pos });
                if !self.eat(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect(Punct::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            ret,
            name,
            params,
            body,
            pos,
        })
    }

    fn parse_var_decl(&mut self) -> PResult<Stmt> {
        let ty = if self.check_word("var") {
            DeclType::Var(self.advance().pos)
        } else {
            DeclType::Named(self.parse_type()?)
        };
        let mut declarators = Vec::new();
        loop {
            let (name, pos) = self.expect_ident()?;
            let init = if self.eat(Punct::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            declarators.push(Declarator { name, init, pos });
            if !self.eat(Punct::Comma) {
                break;
            }
        }
        Ok(Stmt::VarDecl { ty, declarators })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(Punct::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(Punct::RBrace) {
            if self.at_eof() {
                return Err(Diagnostic::new("SP1513", "} expected", self.pos()));
            }
            stmts.push(self.parse_statement()?);
        }
        self.advance();
        Ok(stmts)
    }

    /// A statement in a position where declarations are not allowed
    /// (the body of `if`, `while`, ...).
    fn parse_embedded(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        let stmt = self.parse_statement()?;
        if matches!(stmt, Stmt::VarDecl { .. }) {
            return Err(Diagnostic::new(
                "SP1023",
                "Embedded statement cannot be a declaration",
                pos,
            ));
        }
        Ok(stmt)
    }

    fn parse_paren_expr(&mut self) -> PResult<Expr> {
        self.expect(Punct::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(Punct::RParen)?;
        Ok(expr)
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        self.nested(Self::parse_statement_kind)
    }

    fn parse_statement_kind(&mut self) -> PResult<Stmt> {
        let token = self.peek().clone();
        let pos = token.pos;
        if let TokenKind::Ident(word) = &token.kind {
            match word.as_str() {
                "if" => {
                    self.advance();
                    let cond = self.parse_paren_expr()?;
                    let then = Box::new(self.parse_embedded()?);
                    let els = if self.eat_word("else") {
                        Some(Box::new(self.parse_embedded()?))
                    } else {
                        None
                    };
                    return Ok(Stmt::If { cond, then, els });
                }
                "while" => {
                    self.advance();
                    let cond = self.parse_paren_expr()?;
                    let body = Box::new(self.parse_embedded()?);
                    return Ok(Stmt::While { cond, body });
                }
                "for" => return self.parse_for(),
                "foreach" => return self.parse_foreach(),
                "break" => {
                    self.advance();
                    self.expect(Punct::Semi)?;
                    return Ok(Stmt::Break(pos));
                }
                "continue" => {
                    self.advance();
                    self.expect(Punct::Semi)?;
                    return Ok(Stmt::Continue(pos));
                }
                "return" => {
                    self.advance();
                    let value = if self.check(Punct::Semi) {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect(Punct::Semi)?;
                    return Ok(Stmt::Return(value, pos));
                }
                "throw" => {
                    self.advance();
                    let value = self.parse_expr()?;
                    self.expect(Punct::Semi)?;
                    return Ok(Stmt::Throw(value, pos));
                }
                "using" => {
                    return Err(Diagnostic::new(
                        "SP1529",
                        "A using clause must precede all other elements",
                        pos,
                    ));
                }
                _ => {}
            }
        }
        if let TokenKind::Directive(_) = token.kind {
            return Err(Diagnostic::new(
                "SP7102",
                "#r and #load directives must precede all other elements",
                pos,
            ));
        }
        if self.eat(Punct::Semi) {
            return Ok(Stmt::Empty);
        }
        if self.check(Punct::LBrace) {
            return Ok(Stmt::Block(self.parse_block()?));
        }
        if self.starts_function() {
            return Err(Diagnostic::new(
                "SP8321",
                "Functions can only be declared at the top level of a submission",
                pos,
            ));
        }
        if self.starts_declaration() {
            let decl = self.parse_var_decl()?;
            self.expect(Punct::Semi)?;
            return Ok(decl);
        }
        let expr = self.parse_expr()?;
        self.expect(Punct::Semi)?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect(Punct::LParen)?;
        let init = if self.check(Punct::Semi) {
            None
        } else if self.starts_declaration() {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expr()?)))
        };
        self.expect(Punct::Semi)?;
        let cond = if self.check(Punct::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(Punct::Semi)?;
        let mut step = Vec::new();
        if !self.check(Punct::RParen) {
            loop {
                step.push(self.parse_expr()?);
                if !self.eat(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect(Punct::RParen)?;
        let body = Box::new(self.parse_embedded()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_foreach(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect(Punct::LParen)?;
        let ty = if self.check_word("var") {
            DeclType::Var(self.advance().pos)
        } else {
            DeclType::Named(self.parse_type()?)
        };
        let (name, pos) = self.expect_ident()?;
        if !self.eat_word("in") {
            return Err(Diagnostic::new("SP1515", "'in' expected", self.pos()));
        }
        let iter = self.parse_expr()?;
        self.expect(Punct::RParen)?;
        let body = Box::new(self.parse_embedded()?);
        Ok(Stmt::Foreach {
            ty,
            name,
            iter,
            body,
            pos,
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        self.nested(Self::parse_assignment_kind)
    }

    fn parse_assignment_kind(&mut self) -> PResult<Expr> {
        let target = self.parse_conditional()?;
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Assign) => Some(None),
            TokenKind::Punct(Punct::PlusAssign) => Some(Some(BinaryOp::Add)),
            TokenKind::Punct(Punct::MinusAssign) => Some(Some(BinaryOp::Sub)),
            TokenKind::Punct(Punct::StarAssign) => Some(Some(BinaryOp::Mul)),
            TokenKind::Punct(Punct::SlashAssign) => Some(Some(BinaryOp::Div)),
            TokenKind::Punct(Punct::PercentAssign) => Some(Some(BinaryOp::Rem)),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(target);
        };
        self.advance();
        let value = self.parse_assignment()?;
        let pos = target.pos;
        Ok(Expr {
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            pos,
        })
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let cond = self.parse_binary(1)?;
        if !self.eat(Punct::Question) {
            return Ok(cond);
        }
        let then = self.parse_expr()?;
        self.expect(Punct::Colon)?;
        let els = self.parse_assignment()?;
        let pos = cond.pos;
        Ok(Expr {
            kind: ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
            pos,
        })
    }

    fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
        let TokenKind::Punct(punct) = kind else {
            return None;
        };
        Some(match punct {
            Punct::OrOr => (BinaryOp::Or, 1),
            Punct::AndAnd => (BinaryOp::And, 2),
            Punct::EqEq => (BinaryOp::Eq, 3),
            Punct::NotEq => (BinaryOp::Ne, 3),
            Punct::Lt => (BinaryOp::Lt, 4),
            Punct::Le => (BinaryOp::Le, 4),
            Punct::Gt => (BinaryOp::Gt, 4),
            Punct::Ge => (BinaryOp::Ge, 4),
            Punct::Plus => (BinaryOp::Add, 5),
            Punct::Minus => (BinaryOp::Sub, 5),
            Punct::Star => (BinaryOp::Mul, 6),
            Punct::Slash => (BinaryOp::Div, 6),
            Punct::Percent => (BinaryOp::Rem, 6),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        // Operator chains grow the tree leftwards, one level per operator.
        let entry = self.depth;
        let mut lhs = self.parse_unary()?;
        while let Some((op, prec)) = Self::binary_op(&self.peek().kind) {
            if prec < min_prec {
                break;
            }
            self.advance();
            self.enter()?;
            let rhs = self.parse_binary(prec + 1)?;
            let pos = lhs.pos;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            };
        }
        self.depth = entry;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Bang) => Some(UnaryOp::Not),
            TokenKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokenKind::Punct(Punct::Plus) => Some(UnaryOp::Plus),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                pos,
            });
        }
        if self.check(Punct::PlusPlus) || self.check(Punct::MinusMinus) {
            let increment = self.advance().kind == TokenKind::Punct(Punct::PlusPlus);
            let target = self.nested(Self::parse_unary)?;
            return Ok(Expr {
                kind: ExprKind::IncDec {
                    target: Box::new(target),
                    increment,
                    prefix: true,
                },
                pos,
            });
        }
        self.parse_postfix()
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(Punct::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect(Punct::RParen)?;
        Ok(args)
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let entry = self.depth;
        let mut expr = self.parse_primary()?;
        loop {
            let pos = expr.pos;
            let postfix = self.check(Punct::Dot)
                || self.check(Punct::LParen)
                || self.check(Punct::LBracket);
            if postfix {
                self.enter()?;
            }
            if self.eat(Punct::Dot) {
                let (name, _) = self.expect_ident()?;
                expr = Expr {
                    kind: ExprKind::Member {
                        target: Box::new(expr),
                        name,
                    },
                    pos,
                };
            } else if self.eat(Punct::LParen) {
                let args = self.parse_args()?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    pos,
                };
            } else if self.eat(Punct::LBracket) {
                let index = self.parse_expr()?;
                self.expect(Punct::RBracket)?;
                expr = Expr {
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    pos,
                };
            } else if self.check(Punct::PlusPlus) || self.check(Punct::MinusMinus) {
                let increment = self.advance().kind == TokenKind::Punct(Punct::PlusPlus);
                self.depth = entry;
                return Ok(Expr {
                    kind: ExprKind::IncDec {
                        target: Box::new(expr),
                        increment,
                        prefix: false,
                    },
                    pos,
                });
            } else {
                self.depth = entry;
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        let pos = token.pos;
        let kind = match token.kind {
            TokenKind::Int(v) => ExprKind::Int(v),
            TokenKind::Double(v) => ExprKind::Double(v),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Punct::RParen)?;
                return Ok(inner);
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" => ExprKind::Bool(true),
                "false" => ExprKind::Bool(false),
                "null" => ExprKind::Null,
                "new" => {
                    self.advance();
                    let ty = self.parse_type()?;
                    self.expect(Punct::LParen)?;
                    let args = self.parse_args()?;
                    return Ok(Expr {
                        kind: ExprKind::New { ty, args },
                        pos,
                    });
                }
                _ if is_keyword(&word) => {
                    return Err(Diagnostic::new(
                        "SP1525",
                        format!("Invalid expression term '{word}'"),
                        pos,
                    ));
                }
                _ => ExprKind::Name(word),
            },
            TokenKind::Eof => {
                return Err(Diagnostic::new("SP1733", "Expected expression", pos));
            }
            other => {
                return Err(Diagnostic::new(
                    "SP1525",
                    format!("Invalid expression term '{other}'"),
                    pos,
                ));
            }
        };
        self.advance();
        Ok(Expr { kind, pos })
    }
}
