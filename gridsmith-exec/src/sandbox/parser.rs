//! Recursive-descent parser for the script subset the sandbox executes.

use std::fmt;
use std::rc::Rc;

use gridsmith_core::script::{code_tokens, matching_close, tokenize, Token, TokenKind};

use super::ast::{DeclKind, Expr, FunctionBody, FunctionDef, Pattern, Property, Stmt, TemplatePart};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError: {} (line {})", self.message, self.line)
    }
}

type PResult<T> = Result<T, ParseError>;

const ASSIGN_OPS: [&str; 8] = ["=", "+=", "-=", "*=", "/=", "%=", "**=", "??="];

/// Parses a chunk. `max_nesting` bounds how deeply statements and
/// expressions may nest before the chunk is rejected.
pub(crate) fn parse_program(source: &str, max_nesting: usize) -> PResult<Vec<Stmt>> {
    let tokens: Vec<Token> = tokenize(source)
        .map_err(|e| ParseError {
            line: e.line(),
            message: e.to_string(),
        })?
        .into_iter()
        .filter(|t| t.kind != TokenKind::Comment)
        .collect();
    let mut p = Parser::new(tokens, max_nesting);
    let mut out = Vec::new();
    while !p.at_end() {
        out.push(p.statement()?);
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= self.max_depth {
            return Err(ParseError {
                line: self.line(),
                message: "nesting too deep".to_string(),
            });
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn is_punct(&self, p: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(p))
    }

    fn is_ident(&self, name: &str) -> bool {
        self.peek().is_some_and(|t| t.is_ident(name))
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        let hit = self.is_punct(p);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        let hit = self.is_ident(name);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn advance(&mut self) -> PResult<Token> {
        let t = self.peek().cloned().ok_or_else(|| self.error_here())?;
        self.pos += 1;
        Ok(t)
    }

    fn expect_punct(&mut self, p: &str) -> PResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.error_expected(p))
        }
    }

    fn error_here(&self) -> ParseError {
        match self.peek() {
            Some(t) => ParseError {
                line: t.line,
                message: format!("Unexpected token '{}'", t.text),
            },
            None => ParseError {
                line: self.line(),
                message: "Unexpected end of input".to_string(),
            },
        }
    }

    fn error_expected(&self, what: &str) -> ParseError {
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_string(), |t| format!("'{}'", t.text));
        ParseError {
            line: self.line(),
            message: format!("Unexpected token {found}, expected '{what}'"),
        }
    }

    fn ident_name(&mut self) -> PResult<String> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                let name = t.text.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_here()),
        }
    }

    /// Automatic semicolon insertion, in the forgiving form generated code needs.
    fn end_statement(&mut self) -> PResult<()> {
        if self.eat_punct(";") || self.at_end() || self.is_punct("}") {
            return Ok(());
        }
        let prev_line = self.tokens.get(self.pos.wrapping_sub(1)).map_or(0, |t| t.line);
        if self.line() > prev_line {
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    // statements

    fn statement(&mut self) -> PResult<Stmt> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> PResult<Stmt> {
        let Some(t) = self.peek() else {
            return Err(self.error_here());
        };
        if t.kind == TokenKind::Punct {
            return match t.text.as_str() {
                "{" => Ok(Stmt::Block(self.block()?)),
                ";" => {
                    self.pos += 1;
                    Ok(Stmt::Empty)
                }
                _ => self.expression_statement(),
            };
        }
        if t.kind != TokenKind::Ident {
            return self.expression_statement();
        }
        match t.text.as_str() {
            "const" | "let" | "var" => {
                let stmt = self.declaration()?;
                self.end_statement()?;
                Ok(stmt)
            }
            "if" => self.if_statement(),
            "for" => self.for_statement(),
            "while" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While {
                    test,
                    body,
                    at_least_once: false,
                })
            }
            "do" => {
                self.pos += 1;
                let body = Box::new(self.statement()?);
                if !self.eat_ident("while") {
                    return Err(self.error_expected("while"));
                }
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::While {
                    test,
                    body,
                    at_least_once: true,
                })
            }
            "switch" => self.switch_statement(),
            "try" => self.try_statement(),
            "throw" => {
                self.pos += 1;
                let e = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Throw(e))
            }
            "return" => {
                let line = t.line;
                self.pos += 1;
                let bare = self.at_end()
                    || self.is_punct(";")
                    || self.is_punct("}")
                    || self.line() > line;
                let value = if bare { None } else { Some(self.expression()?) };
                self.end_statement()?;
                Ok(Stmt::Return(value))
            }
            "break" | "continue" => {
                let is_break = t.text == "break";
                let line = t.line;
                self.pos += 1;
                // labels are accepted and ignored
                if self.peek().is_some_and(|n| n.kind == TokenKind::Ident && n.line == line) {
                    self.pos += 1;
                }
                self.end_statement()?;
                Ok(if is_break { Stmt::Break } else { Stmt::Continue })
            }
            "function" => Ok(Stmt::Function(self.function(false)?)),
            "async" if self.peek_at(1).is_some_and(|n| n.is_ident("function")) => {
                self.pos += 1;
                Ok(Stmt::Function(self.function(true)?))
            }
            "class" => Err(ParseError {
                line: t.line,
                message: "class declarations are not supported in chunks".to_string(),
            }),
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let e = self.expression()?;
        self.end_statement()?;
        Ok(Stmt::Expr(e))
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut out = Vec::new();
        while !self.is_punct("}") {
            if self.at_end() {
                return Err(self.error_expected("}"));
            }
            out.push(self.statement()?);
        }
        self.pos += 1;
        Ok(out)
    }

    fn decl_kind(&mut self) -> PResult<DeclKind> {
        let t = self.advance()?;
        Ok(match t.text.as_str() {
            "const" => DeclKind::Const,
            "let" => DeclKind::Let,
            _ => DeclKind::Var,
        })
    }

    fn declaration(&mut self) -> PResult<Stmt> {
        let kind = self.decl_kind()?;
        let mut decls = Vec::new();
        loop {
            let pattern = self.binding_pattern()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push((pattern, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Decl { kind, decls })
    }

    fn binding_pattern(&mut self) -> PResult<Pattern> {
        let base = if self.eat_punct("[") {
            let mut items = Vec::new();
            while !self.eat_punct("]") {
                if self.eat_punct(",") {
                    items.push(None);
                    continue;
                }
                items.push(Some(self.pattern_element()?));
                if !self.is_punct("]") {
                    self.expect_punct(",")?;
                }
            }
            Pattern::Array(items)
        } else if self.eat_punct("{") {
            let mut props = Vec::new();
            while !self.eat_punct("}") {
                if self.eat_punct("...") {
                    let rest = self.ident_name()?;
                    props.push((String::new(), Pattern::Rest(Box::new(Pattern::Ident(rest)))));
                } else {
                    let key = self.property_key()?;
                    let mut target = if self.eat_punct(":") {
                        self.binding_pattern()?
                    } else {
                        Pattern::Ident(key.clone())
                    };
                    if self.eat_punct("=") {
                        target = Pattern::Default(Box::new(target), self.assignment()?);
                    }
                    props.push((key, target));
                }
                if !self.is_punct("}") {
                    self.expect_punct(",")?;
                }
            }
            Pattern::Object(props)
        } else {
            Pattern::Ident(self.ident_name()?)
        };
        Ok(base)
    }

    fn pattern_element(&mut self) -> PResult<Pattern> {
        if self.eat_punct("...") {
            return Ok(Pattern::Rest(Box::new(self.binding_pattern()?)));
        }
        let p = self.binding_pattern()?;
        if self.eat_punct("=") {
            return Ok(Pattern::Default(Box::new(p), self.assignment()?));
        }
        Ok(p)
    }

    fn property_key(&mut self) -> PResult<String> {
        let t = self.advance()?;
        match t.kind {
            TokenKind::Ident | TokenKind::Str | TokenKind::Number => Ok(t.text),
            _ => Err(ParseError {
                line: t.line,
                message: format!("Unexpected token '{}'", t.text),
            }),
        }
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let test = self.expression()?;
        self.expect_punct(")")?;
        let then = Box::new(self.statement()?);
        let otherwise = if self.eat_ident("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let start = self.pos;

        // for (const x of xs) / for (const k in obj)
        let declared = self.is_ident("const") || self.is_ident("let") || self.is_ident("var");
        let kind = if declared { self.decl_kind()? } else { DeclKind::Let };
        if let Ok(pattern) = self.binding_pattern() {
            if self.is_ident("of") || self.is_ident("in") {
                let keys = self.is_ident("in");
                self.pos += 1;
                let iterable = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                return Ok(Stmt::ForOf {
                    kind,
                    pattern,
                    iterable,
                    keys,
                    body,
                });
            }
        }
        self.pos = start;

        let init = if self.is_punct(";") {
            None
        } else if declared {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn switch_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let discriminant = self.expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_ident("case") {
                Some(self.expression()?)
            } else if self.eat_ident("default") {
                None
            } else {
                return Err(self.error_here());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !(self.is_ident("case") || self.is_ident("default") || self.is_punct("}")) {
                if self.at_end() {
                    return Err(self.error_expected("}"));
                }
                body.push(self.statement()?);
            }
            cases.push((test, body));
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    fn try_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_ident("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_pattern()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_ident("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_expected("catch"));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    /// `function name(params) { body }`, positioned on `function`.
    fn function(&mut self, _is_async: bool) -> PResult<Rc<FunctionDef>> {
        self.pos += 1;
        self.eat_punct("*");
        let name = match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => Some(self.ident_name()?),
            _ => None,
        };
        let params = self.params()?;
        let body = FunctionBody::Block(self.block()?);
        Ok(Rc::new(FunctionDef { name, params, body }))
    }

    fn params(&mut self) -> PResult<Vec<Pattern>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            params.push(self.pattern_element()?);
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(params)
    }

    // expressions

    fn expression(&mut self) -> PResult<Expr> {
        let first = self.assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn arrow_ahead(&self) -> bool {
        let Some(t) = self.peek() else { return false };
        let offset = usize::from(t.is_ident("async") && self.peek_at(1).is_some_and(|n| n.line == t.line && (n.is_punct("(") || n.kind == TokenKind::Ident)));
        let Some(head) = self.peek_at(offset) else {
            return false;
        };
        if head.kind == TokenKind::Ident {
            return self.peek_at(offset + 1).is_some_and(|n| n.is_punct("=>"));
        }
        if head.is_punct("(") {
            return matching_close(&self.tokens, self.pos + offset)
                .and_then(|close| self.tokens.get(close + 1))
                .is_some_and(|n| n.is_punct("=>"));
        }
        false
    }

    fn arrow(&mut self) -> PResult<Expr> {
        if self.is_ident("async") && !self.peek_at(1).is_some_and(|n| n.is_punct("=>")) {
            self.pos += 1;
        }
        let params = if self.is_punct("(") {
            self.params()?
        } else {
            vec![Pattern::Ident(self.ident_name()?)]
        };
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(self.assignment()?)
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
        })))
    }

    fn assignment(&mut self) -> PResult<Expr> {
        self.nested(Self::assignment_inner)
    }

    fn assignment_inner(&mut self) -> PResult<Expr> {
        if self.arrow_ahead() {
            return self.arrow();
        }
        let line = self.line();
        let left = self.conditional()?;
        let Some(op) = self
            .peek()
            .filter(|t| t.kind == TokenKind::Punct && ASSIGN_OPS.contains(&t.text.as_str()))
            .map(|t| t.text.clone())
        else {
            return Ok(left);
        };
        if !matches!(left, Expr::Ident { .. } | Expr::Member { .. } | Expr::Index { .. } | Expr::Array(_) | Expr::Object(_)) {
            return Err(ParseError {
                line,
                message: "Invalid left-hand side in assignment".to_string(),
            });
        }
        self.pos += 1;
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(left),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let test = self.binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn binary_op(&self) -> Option<(String, u8)> {
        let t = self.peek()?;
        let prec = match (t.kind, t.text.as_str()) {
            (TokenKind::Punct, "??") => 1,
            (TokenKind::Punct, "||") => 2,
            (TokenKind::Punct, "&&") => 3,
            (TokenKind::Punct, "|") => 4,
            (TokenKind::Punct, "^") => 5,
            (TokenKind::Punct, "&") => 6,
            (TokenKind::Punct, "==" | "!=" | "===" | "!==") => 7,
            (TokenKind::Punct, "<" | ">" | "<=" | ">=") => 8,
            (TokenKind::Ident, "instanceof" | "in") => 8,
            (TokenKind::Punct, "<<" | ">>") => 9,
            (TokenKind::Punct, "+" | "-") => 10,
            (TokenKind::Punct, "*" | "/" | "%") => 11,
            (TokenKind::Punct, "**") => 12,
            _ => return None,
        };
        Some((t.text.clone(), prec))
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        while let Some((op, prec)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let next = if op == "**" { prec } else { prec + 1 };
            let right = self.binary(next)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        self.nested(Self::unary_inner)
    }

    fn unary_inner(&mut self) -> PResult<Expr> {
        let Some(t) = self.peek().cloned() else {
            return Err(self.error_here());
        };
        match (t.kind, t.text.as_str()) {
            (TokenKind::Punct, "!" | "-" | "+" | "~") | (TokenKind::Ident, "typeof" | "void" | "delete") => {
                self.pos += 1;
                let expr = self.unary()?;
                Ok(Expr::Unary {
                    op: t.text,
                    expr: Box::new(expr),
                })
            }
            (TokenKind::Punct, "++" | "--") => {
                self.pos += 1;
                let target = self.unary()?;
                Ok(Expr::Update {
                    op: t.text,
                    prefix: true,
                    target: Box::new(target),
                })
            }
            (TokenKind::Ident, "await") => {
                self.pos += 1;
                Ok(Expr::Await(Box::new(self.unary()?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let prev_line = self.line();
        let e = self.call_member()?;
        if let Some(t) = self.peek() {
            if (t.is_punct("++") || t.is_punct("--")) && t.line == prev_line {
                let op = t.text.clone();
                self.pos += 1;
                return Ok(Expr::Update {
                    op,
                    prefix: false,
                    target: Box::new(e),
                });
            }
        }
        Ok(e)
    }

    fn call_member(&mut self) -> PResult<Expr> {
        let mut e = if self.is_ident("new") {
            self.pos += 1;
            let callee = self.member_only()?;
            let args = if self.is_punct("(") { self.arguments()? } else { Vec::new() };
            Expr::New {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.primary()?
        };
        loop {
            if self.eat_punct(".") {
                let property = self.ident_name()?;
                e = Expr::Member {
                    object: Box::new(e),
                    property,
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                if self.is_punct("(") {
                    let args = self.arguments()?;
                    e = Expr::Call {
                        callee: Box::new(e),
                        args,
                    };
                } else if self.eat_punct("[") {
                    let index = self.expression()?;
                    self.expect_punct("]")?;
                    e = Expr::Index {
                        object: Box::new(e),
                        index: Box::new(index),
                    };
                } else {
                    let property = self.ident_name()?;
                    e = Expr::Member {
                        object: Box::new(e),
                        property,
                        optional: true,
                    };
                }
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                e = Expr::Index {
                    object: Box::new(e),
                    index: Box::new(index),
                };
            } else if self.is_punct("(") {
                let args = self.arguments()?;
                e = Expr::Call {
                    callee: Box::new(e),
                    args,
                };
            } else {
                return Ok(e);
            }
        }
    }

    fn member_only(&mut self) -> PResult<Expr> {
        let mut e = self.primary()?;
        loop {
            if self.eat_punct(".") {
                let property = self.ident_name()?;
                e = Expr::Member {
                    object: Box::new(e),
                    property,
                    optional: false,
                };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                e = Expr::Index {
                    object: Box::new(e),
                    index: Box::new(index),
                };
            } else {
                return Ok(e);
            }
        }
    }

    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                args.push(Expr::Spread(Box::new(self.assignment()?)));
            } else {
                args.push(self.assignment()?);
            }
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let t = self.advance()?;
        match t.kind {
            TokenKind::Number => Ok(Expr::Num(parse_number(&t.text))),
            TokenKind::Str => Ok(Expr::Str(t.text)),
            TokenKind::Template => self.template(&t.text, t.line),
            TokenKind::Ident => match t.text.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "function" => {
                    self.pos -= 1;
                    Ok(Expr::Function(self.function(false)?))
                }
                "async" if self.is_ident("function") => Ok(Expr::Function(self.function(true)?)),
                "class" => Err(ParseError {
                    line: t.line,
                    message: "class expressions are not supported in chunks".to_string(),
                }),
                _ => Ok(Expr::Ident { name: t.text }),
            },
            TokenKind::Punct => match t.text.as_str() {
                "(" => {
                    let e = self.expression()?;
                    self.expect_punct(")")?;
                    Ok(e)
                }
                "[" => self.array_literal(),
                "{" => self.object_literal(),
                _ => Err(ParseError {
                    line: t.line,
                    message: format!("Unexpected token '{}'", t.text),
                }),
            },
            TokenKind::Comment => Err(self.error_here()),
        }
    }

    fn array_literal(&mut self) -> PResult<Expr> {
        let mut items = Vec::new();
        while !self.eat_punct("]") {
            if self.at_end() {
                return Err(self.error_expected("]"));
            }
            if self.eat_punct(",") {
                items.push(Expr::Undefined);
                continue;
            }
            if self.eat_punct("...") {
                items.push(Expr::Spread(Box::new(self.assignment()?)));
            } else {
                items.push(self.assignment()?);
            }
            if !self.is_punct("]") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.at_end() {
                return Err(self.error_expected("}"));
            }
            if self.eat_punct("...") {
                props.push(Property::Spread(self.assignment()?));
            } else if self.eat_punct("[") {
                let key = self.assignment()?;
                self.expect_punct("]")?;
                self.expect_punct(":")?;
                props.push(Property::Computed(key, self.assignment()?));
            } else {
                let is_async = self.is_ident("async")
                    && self.peek_at(1).is_some_and(|n| n.kind == TokenKind::Ident);
                if is_async {
                    self.pos += 1;
                }
                let key = self.property_key()?;
                if self.eat_punct(":") {
                    props.push(Property::KeyValue(key, self.assignment()?));
                } else if self.is_punct("(") {
                    let params = self.params()?;
                    let body = FunctionBody::Block(self.block()?);
                    let def = FunctionDef {
                        name: Some(key.clone()),
                        params,
                        body,
                    };
                    props.push(Property::KeyValue(key, Expr::Function(Rc::new(def))));
                } else {
                    props.push(Property::KeyValue(key.clone(), Expr::Ident { name: key }));
                }
            }
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(props))
    }
}

fn parse_number(text: &str) -> f64 {
    let clean = text.replace('_', "");
    if let Some(hex) = clean.strip_prefix("0x").or_else(|| clean.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    clean.parse().unwrap_or(f64::NAN)
}

impl Parser {
    fn template(&self, raw: &str, line: usize) -> PResult<Expr> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut chars = raw.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, esc)) = chars.next() {
                        text.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    }
                }
                '$' if chars.peek().is_some_and(|(_, n)| *n == '{') => {
                    chars.next();
                    let start = i + 2;
                    let mut depth = 1usize;
                    let mut end = raw.len();
                    for (j, d) in chars.by_ref() {
                        match d {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    end = j;
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let mut sub = Parser::new(code_tokens(&raw[start..end]), self.max_depth);
                    sub.depth = self.depth;
                    let expr = sub.expression().map_err(|e| ParseError { line, ..e })?;
                    if !sub.at_end() {
                        return Err(ParseError {
                            line,
                            message: "Unexpected token in template expression".to_string(),
                        });
                    }
                    parts.push(TemplatePart::Expr(expr));
                }
                other => text.push(other),
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(Expr::Template(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> PResult<Vec<Stmt>> {
        parse_program(src, 128)
    }

    #[test]
    fn parses_wrapper_chunk() {
        let src = "await Excel.run(async (context) => {\n  const s = context.workbook.worksheets.getActiveWorksheet();\n  s.getRange(\"A1\").values = [[1]];\n  await context.sync();\n});";
        let program = parse(src).unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn accepts_missing_semicolons_across_lines() {
        let program = parse("let a = 1\nlet b = a + 2\nb++").unwrap();
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn reports_line_of_unexpected_token() {
        let err = parse("const a = 1;\nconst b = ;").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.to_string().starts_with("SyntaxError"));
    }

    #[test]
    fn parses_loops_and_destructuring() {
        let src = "for (const [i, row] of rows.entries()) { total += row; }\nfor (let i = 0; i < 3; i++) {}\nconst { a, b: c = 2 } = obj;";
        assert_eq!(parse(src).unwrap().len(), 3);
    }

    #[test]
    fn postfix_update_stays_on_its_line() {
        let program = parse("const d = new Date()\nx\n++y").unwrap();
        assert_eq!(program.len(), 3);
        let Stmt::Decl { decls, .. } = &program[0] else { panic!("not a declaration") };
        assert!(matches!(&decls[0].1, Some(Expr::New { args, .. }) if args.is_empty()));
        let Stmt::Expr(Expr::Update { prefix, target, .. }) = &program[2] else {
            panic!("not an update")
        };
        assert!(*prefix);
        assert!(matches!(target.as_ref(), Expr::Ident { name } if name == "y"));
    }

    #[test]
    fn template_interpolation() {
        let program = parse("const a = `A${i + 1}:B${i + 1}`;").unwrap();
        let Stmt::Decl { decls, .. } = &program[0] else { panic!("not a declaration") };
        let Some(Expr::Template(parts)) = &decls[0].1 else { panic!("not a template") };
        assert_eq!(parts.len(), 4);
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let src = format!("const x = {}1{};", "(".repeat(5_000), ")".repeat(5_000));
        let err = parse(&src).unwrap_err();
        assert_eq!(err.message, "nesting too deep");

        let src = format!("const y = {}1{};", "[".repeat(5_000), "]".repeat(5_000));
        assert_eq!(parse(&src).unwrap_err().message, "nesting too deep");
    }

    #[test]
    fn nesting_budget_is_per_path_not_per_chunk() {
        let stmt = format!("a = {}1{};\n", "(".repeat(20), ")".repeat(20));
        assert_eq!(parse(&stmt.repeat(200)).unwrap().len(), 200);
    }
}
