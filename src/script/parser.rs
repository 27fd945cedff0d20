use super::ScriptError;
use super::ast::*;
use super::lexer::{RegexLiteral, TemplateToken, Tok, Token, tokenize};
use super::value::{JsStr, number_to_string};
use std::sync::Arc;

/// Parses a payload as a function body; top-level `return` is allowed.
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    Parser::new(source, tokens).parse_program()
}

pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    current: usize,
    /// Inside a `for (…;` head, where `in` ends the expression.
    no_in: bool,
    strict: bool,
    /// `arguments` appeared since the enclosing non-arrow function began.
    arguments_seen: bool,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            current: 0,
            no_in: false,
            strict: false,
            arguments_seen: false,
        }
    }

    fn peek(&self) -> &Tok {
        &self.tokens[self.current].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let idx = (self.current + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn newline_before(&self) -> bool {
        self.tokens[self.current].newline_before
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.current].tok.clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        tok
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn check_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Ident(name) if &**name == word)
    }

    fn match_tok(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, tok: &Tok, expected: &str) -> Result<(), ScriptError> {
        if self.match_tok(tok) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ScriptError {
        let token = &self.tokens[self.current];
        let found = match &token.tok {
            Tok::Eof => "end of input".to_string(),
            _ => format!("token '{}'", &self.source[token.span.clone()]),
        };
        ScriptError::syntax(
            self.source,
            token.span.start,
            format!("Unexpected {found}, expected {expected}"),
        )
    }

    fn unsupported(&self, what: &str) -> ScriptError {
        ScriptError::syntax(
            self.source,
            self.tokens[self.current].span.start,
            format!("{what} are not supported"),
        )
    }

    /// `?.`: a `?` immediately followed by `.`.
    fn at_optional_dot(&self) -> bool {
        let (Some(q), Some(dot)) = (
            self.tokens.get(self.current),
            self.tokens.get(self.current + 1),
        ) else {
            return false;
        };
        q.tok == Tok::Question && dot.tok == Tok::Dot && q.span.end == dot.span.start
    }

    fn identifier(&mut self, expected: &str) -> Result<Ident, ScriptError> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// Identifier or keyword, as allowed after `.` and in object keys.
    fn property_name(&mut self) -> Option<JsStr> {
        let name = match self.peek() {
            Tok::Ident(name) => name.clone(),
            other => JsStr::from(other.as_property_name()?),
        };
        self.advance();
        Some(name)
    }

    fn consume_semicolon(&mut self) -> Result<(), ScriptError> {
        if self.match_tok(&Tok::Semi) {
            return Ok(());
        }
        if matches!(self.peek(), Tok::RBrace | Tok::Eof) || self.newline_before() {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    /// Runs `f` with `in` treated as an operator again.
    fn allow_in<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = f(self);
        self.no_in = saved;
        result
    }

    pub fn parse_program(&mut self) -> Result<Program, ScriptError> {
        let body = self.directive_body(|p| p.is_at_end())?;
        let mut var_names = Vec::new();
        collect_vars(&body, &mut var_names);
        Ok(Program {
            strict: self.strict,
            body,
            var_names,
        })
    }

    /// Statements up to `done`, switching to strict mode on a `"use strict"` prologue.
    fn directive_body(
        &mut self,
        done: impl Fn(&Self) -> bool,
    ) -> Result<Vec<Stmt>, ScriptError> {
        let mut body = Vec::new();
        let mut prologue = true;
        while !done(self) {
            let stmt = self.statement()?;
            if prologue {
                match &stmt {
                    Stmt::Expr(Expr::Str(s)) if &**s == "use strict" => self.strict = true,
                    Stmt::Expr(Expr::Str(_)) => {}
                    _ => prologue = false,
                }
            }
            body.push(stmt);
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        super::ensure_sufficient_stack(|| self.statement_inner())
    }

    fn statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Tok::LBrace => Ok(Stmt::Block(self.block()?)),
            Tok::Var | Tok::Let | Tok::Const => {
                let decl = self.var_declaration()?;
                self.consume_semicolon()?;
                Ok(Stmt::VarDecl(decl))
            }
            Tok::Function => {
                self.advance();
                let def = self.function_rest(FunctionKind::Normal, false)?;
                Ok(Stmt::Function(def))
            }
            Tok::Class => {
                self.advance();
                let class = self.class_rest(false)?;
                Ok(Stmt::Class(class))
            }
            Tok::If => self.if_statement(),
            Tok::For => self.for_statement(),
            Tok::While => {
                self.advance();
                let condition = self.paren_expression()?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { condition, body })
            }
            Tok::Do => {
                self.advance();
                let body = Box::new(self.statement()?);
                self.consume(&Tok::While, "'while' after do body")?;
                let condition = self.paren_expression()?;
                self.match_tok(&Tok::Semi);
                Ok(Stmt::DoWhile { body, condition })
            }
            Tok::Return => {
                self.advance();
                let value = if matches!(self.peek(), Tok::Semi | Tok::RBrace | Tok::Eof)
                    || self.newline_before()
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(value))
            }
            Tok::Break | Tok::Continue => {
                let is_break = matches!(self.advance(), Tok::Break);
                let label = match self.peek() {
                    Tok::Ident(name) if !self.newline_before() => {
                        let name = name.clone();
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                self.consume_semicolon()?;
                Ok(if is_break {
                    Stmt::Break(label)
                } else {
                    Stmt::Continue(label)
                })
            }
            Tok::Throw => {
                self.advance();
                let value = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(value))
            }
            Tok::Try => self.try_statement(),
            Tok::Switch => self.switch_statement(),
            Tok::Semi => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Tok::Debugger => {
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Debugger)
            }
            Tok::With => Err(self.unsupported("'with' statements")),
            Tok::Ident(name) if matches!(self.peek_at(1), Tok::Colon) => {
                let label = name.clone();
                self.advance();
                self.advance();
                let body = Box::new(self.statement()?);
                Ok(Stmt::Labeled { label, body })
            }
            Tok::Ident(name)
                if &**name == "async"
                    && matches!(self.peek_at(1), Tok::Function)
                    && !self.tokens[self.current + 1].newline_before =>
            {
                Err(self.unsupported("async functions"))
            }
            _ => {
                let expr = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn paren_expression(&mut self) -> Result<Expr, ScriptError> {
        self.consume(&Tok::LParen, "'('")?;
        let expr = self.allow_in(|p| p.expression())?;
        self.consume(&Tok::RParen, "')'")?;
        Ok(expr)
    }

    fn decl_kind(&mut self) -> Option<DeclKind> {
        let kind = match self.peek() {
            Tok::Var => DeclKind::Var,
            Tok::Let => DeclKind::Let,
            Tok::Const => DeclKind::Const,
            _ => return None,
        };
        self.advance();
        Some(kind)
    }

    fn var_declaration(&mut self) -> Result<VarDecl, ScriptError> {
        let kind = self
            .decl_kind()
            .ok_or_else(|| self.unexpected("'var', 'let' or 'const'"))?;
        let first = self.binding_target()?;
        self.declarators(kind, first)
    }

    fn declarators(&mut self, kind: DeclKind, first: Pattern) -> Result<VarDecl, ScriptError> {
        let mut declarations = Vec::new();
        let mut target = first;
        loop {
            let init = if self.match_tok(&Tok::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            declarations.push(Declarator { target, init });
            if !self.match_tok(&Tok::Comma) {
                break;
            }
            target = self.binding_target()?;
        }
        Ok(VarDecl { kind, declarations })
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        let condition = self.paren_expression()?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_tok(&Tok::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        if self.check_ident("await") {
            return Err(self.unsupported("'for await' loops"));
        }
        self.consume(&Tok::LParen, "'(' after for")?;

        let init = if self.check(&Tok::Semi) {
            None
        } else if let Some(kind) = self.decl_kind() {
            let target = self.binding_target()?;
            if let Some(stmt) = self.for_in_of_rest(ForBinding::Decl(kind, target.clone()))? {
                return Ok(stmt);
            }
            self.no_in = true;
            let decl = self.declarators(kind, target);
            self.no_in = false;
            Some(ForInit::Decl(decl?))
        } else {
            self.no_in = true;
            let expr = self.expression();
            self.no_in = false;
            let expr = expr?;
            if self.check(&Tok::In) || self.check_ident("of") {
                let target = self.expr_to_pattern(expr)?;
                if let Some(stmt) = self.for_in_of_rest(ForBinding::Target(target))? {
                    return Ok(stmt);
                }
                return Err(self.unexpected("for loop head"));
            }
            Some(ForInit::Expr(expr))
        };

        self.consume(&Tok::Semi, "';' after for initializer")?;
        let test = if self.check(&Tok::Semi) {
            None
        } else {
            Some(self.allow_in(|p| p.expression())?)
        };
        self.consume(&Tok::Semi, "';' after for condition")?;
        let update = if self.check(&Tok::RParen) {
            None
        } else {
            Some(self.allow_in(|p| p.expression())?)
        };
        self.consume(&Tok::RParen, "')' after for clauses")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    /// Finishes `for (left in right)` / `for (left of right)` when one follows.
    fn for_in_of_rest(&mut self, left: ForBinding) -> Result<Option<Stmt>, ScriptError> {
        let is_of = if self.check(&Tok::In) {
            false
        } else if self.check_ident("of") {
            true
        } else {
            return Ok(None);
        };
        self.advance();
        let right = if is_of {
            self.allow_in(|p| p.assignment())?
        } else {
            self.allow_in(|p| p.expression())?
        };
        self.consume(&Tok::RParen, "')' after for head")?;
        let body = Box::new(self.statement()?);
        Ok(Some(if is_of {
            Stmt::ForOf { left, right, body }
        } else {
            Stmt::ForIn { left, right, body }
        }))
    }

    fn try_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        let block = self.block()?;
        let handler = if self.match_tok(&Tok::Catch) {
            let param = if self.match_tok(&Tok::LParen) {
                let param = self.binding_target()?;
                self.consume(&Tok::RParen, "')' after catch parameter")?;
                Some(param)
            } else {
                None
            };
            Some(CatchClause {
                param,
                body: self.block()?,
            })
        } else {
            None
        };
        let finalizer = if self.match_tok(&Tok::Finally) {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected("'catch' or 'finally' after try block"));
        }
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn switch_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        let discriminant = self.paren_expression()?;
        self.consume(&Tok::LBrace, "'{' after switch")?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.match_tok(&Tok::RBrace) {
            let test = if self.match_tok(&Tok::Case) {
                Some(self.allow_in(|p| p.expression())?)
            } else if self.check(&Tok::Default) {
                if seen_default {
                    return Err(self.unexpected("at most one default clause"));
                }
                seen_default = true;
                self.advance();
                None
            } else {
                return Err(self.unexpected("'case', 'default' or '}'"));
            };
            self.consume(&Tok::Colon, "':' after case")?;
            let mut body = Vec::new();
            while !matches!(self.peek(), Tok::Case | Tok::Default | Tok::RBrace | Tok::Eof) {
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.consume(&Tok::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        self.allow_in(|p| {
            while !p.check(&Tok::RBrace) && !p.is_at_end() {
                stmts.push(p.statement()?);
            }
            Ok(())
        })?;
        self.consume(&Tok::RBrace, "'}'")?;
        Ok(stmts)
    }

    // ----- patterns -----

    /// Identifier or destructuring pattern in a declaration or parameter list.
    fn binding_target(&mut self) -> Result<Pattern, ScriptError> {
        match self.peek() {
            Tok::Ident(_) => Ok(Pattern::Ident(self.identifier("binding name")?)),
            Tok::LBrace => self.object_binding(),
            Tok::LBracket => self.array_binding(),
            _ => Err(self.unexpected("binding name")),
        }
    }

    /// A binding target with an optional `= default`.
    fn binding_element(&mut self) -> Result<Pattern, ScriptError> {
        let target = self.binding_target()?;
        if self.match_tok(&Tok::Assign) {
            let default = self.allow_in(|p| p.assignment())?;
            return Ok(Pattern::Default {
                target: Box::new(target),
                default: Box::new(default),
            });
        }
        Ok(target)
    }

    fn object_binding(&mut self) -> Result<Pattern, ScriptError> {
        self.consume(&Tok::LBrace, "'{'")?;
        let mut props = Vec::new();
        let mut rest = None;
        while !self.check(&Tok::RBrace) {
            if self.match_tok(&Tok::Ellipsis) {
                rest = Some(Box::new(Pattern::Ident(self.identifier("rest binding name")?)));
                break;
            }
            let (key, shorthand) = self.property_key()?;
            let value = if self.match_tok(&Tok::Colon) {
                self.binding_element()?
            } else {
                let name = shorthand.ok_or_else(|| self.unexpected("':' in object pattern"))?;
                let target = Pattern::Ident(name);
                if self.match_tok(&Tok::Assign) {
                    Pattern::Default {
                        target: Box::new(target),
                        default: Box::new(self.allow_in(|p| p.assignment())?),
                    }
                } else {
                    target
                }
            };
            props.push(PatternProp { key, value });
            if !self.match_tok(&Tok::Comma) {
                break;
            }
        }
        self.consume(&Tok::RBrace, "'}' after object pattern")?;
        Ok(Pattern::Object { props, rest })
    }

    fn array_binding(&mut self) -> Result<Pattern, ScriptError> {
        self.consume(&Tok::LBracket, "'['")?;
        let mut elements = Vec::new();
        let mut rest = None;
        while !self.check(&Tok::RBracket) {
            if self.match_tok(&Tok::Comma) {
                elements.push(None);
                continue;
            }
            if self.match_tok(&Tok::Ellipsis) {
                rest = Some(Box::new(self.binding_target()?));
                break;
            }
            elements.push(Some(self.binding_element()?));
            if !self.match_tok(&Tok::Comma) {
                break;
            }
        }
        self.consume(&Tok::RBracket, "']' after array pattern")?;
        Ok(Pattern::Array { elements, rest })
    }

    /// Reinterprets an already parsed expression as an assignment target.
    fn expr_to_pattern(&self, expr: Expr) -> Result<Pattern, ScriptError> {
        Ok(match expr {
            Expr::Ident(name) => Pattern::Ident(name),
            Expr::Member { optional: false, .. } | Expr::SuperMember { .. } => {
                Pattern::Member(Box::new(expr))
            }
            Expr::Assign {
                op: AssignOp::Assign,
                target,
                value,
            } => Pattern::Default {
                target,
                default: value,
            },
            Expr::Array(items) => {
                let mut elements = Vec::new();
                let mut rest = None;
                let count = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        ArrayElement::Hole => elements.push(None),
                        ArrayElement::Expr(expr) => elements.push(Some(self.expr_to_pattern(expr)?)),
                        ArrayElement::Spread(expr) if i + 1 == count => {
                            rest = Some(Box::new(self.expr_to_pattern(expr)?));
                        }
                        ArrayElement::Spread(_) => return Err(self.invalid_target()),
                    }
                }
                Pattern::Array { elements, rest }
            }
            Expr::Object(props) => {
                let mut out = Vec::new();
                let mut rest = None;
                let count = props.len();
                for (i, prop) in props.into_iter().enumerate() {
                    match prop {
                        ObjectProp::KeyValue(key, value) => out.push(PatternProp {
                            key,
                            value: self.expr_to_pattern(value)?,
                        }),
                        ObjectProp::Spread(expr) if i + 1 == count => {
                            rest = Some(Box::new(self.expr_to_pattern(expr)?));
                        }
                        _ => return Err(self.invalid_target()),
                    }
                }
                Pattern::Object { props: out, rest }
            }
            _ => return Err(self.invalid_target()),
        })
    }

    fn invalid_target(&self) -> ScriptError {
        let start = self.tokens[self.current.saturating_sub(1)].span.start;
        ScriptError::syntax(
            self.source,
            start,
            "Invalid left-hand side in assignment".into(),
        )
    }

    // ----- functions and classes -----

    /// After `function`: optional name, parameters and body.
    fn function_rest(
        &mut self,
        kind: FunctionKind,
        allow_anonymous: bool,
    ) -> Result<Arc<FunctionDef>, ScriptError> {
        if self.check(&Tok::Star) {
            return Err(self.unsupported("generator functions"));
        }
        let name = match self.peek() {
            Tok::Ident(_) => Some(self.identifier("function name")?),
            _ if allow_anonymous => None,
            _ => return Err(self.unexpected("function name")),
        };
        self.function_tail(name, kind)
    }

    /// Parameters and block body.
    fn function_tail(
        &mut self,
        name: Option<Ident>,
        kind: FunctionKind,
    ) -> Result<Arc<FunctionDef>, ScriptError> {
        let outer_arguments = std::mem::replace(&mut self.arguments_seen, false);
        let outer_strict = self.strict;
        let parsed = self.parameters().and_then(|(params, rest)| {
            self.consume(&Tok::LBrace, "'{' before function body")?;
            let body =
                self.allow_in(|p| p.directive_body(|p| p.check(&Tok::RBrace) || p.is_at_end()))?;
            self.consume(&Tok::RBrace, "'}' after function body")?;
            Ok((params, rest, body))
        });
        let strict = self.strict;
        self.strict = outer_strict;
        let uses_arguments = std::mem::replace(&mut self.arguments_seen, outer_arguments);
        let (params, rest, body) = parsed?;
        Ok(make_function(
            name,
            params,
            rest,
            FunctionBody::Block(body),
            kind,
            strict,
            uses_arguments,
        ))
    }

    fn parameters(&mut self) -> Result<(Vec<Pattern>, Option<Pattern>), ScriptError> {
        self.consume(&Tok::LParen, "'(' before parameters")?;
        let mut params = Vec::new();
        let mut rest = None;
        while !self.check(&Tok::RParen) {
            if self.match_tok(&Tok::Ellipsis) {
                rest = Some(self.binding_target()?);
                break;
            }
            params.push(self.binding_element()?);
            if !self.match_tok(&Tok::Comma) {
                break;
            }
        }
        self.consume(&Tok::RParen, "')' after parameters")?;
        Ok((params, rest))
    }

    fn class_rest(&mut self, allow_anonymous: bool) -> Result<Arc<ClassDef>, ScriptError> {
        let name = match self.peek() {
            Tok::Ident(_) => Some(self.identifier("class name")?),
            _ if allow_anonymous => None,
            _ => return Err(self.unexpected("class name")),
        };
        let outer_strict = std::mem::replace(&mut self.strict, true);
        let result = self.class_body(name);
        self.strict = outer_strict;
        result
    }

    fn class_body(&mut self, name: Option<Ident>) -> Result<Arc<ClassDef>, ScriptError> {
        let superclass = if self.match_tok(&Tok::Extends) {
            Some(self.allow_in(|p| p.call_member(false))?)
        } else {
            None
        };
        self.consume(&Tok::LBrace, "'{' before class body")?;
        let mut constructor = None;
        let mut members = Vec::new();
        while !self.match_tok(&Tok::RBrace) {
            if self.match_tok(&Tok::Semi) {
                continue;
            }
            let is_static = self.check_ident("static")
                && !matches!(self.peek_at(1), Tok::LParen | Tok::Assign | Tok::Semi | Tok::RBrace);
            if is_static {
                self.advance();
                if self.check(&Tok::LBrace) {
                    self.advance();
                    let body = self.allow_in(|p| p.directive_body(|p| p.check(&Tok::RBrace)))?;
                    self.consume(&Tok::RBrace, "'}' after static block")?;
                    let def = make_function(
                        None,
                        Vec::new(),
                        None,
                        FunctionBody::Block(body),
                        FunctionKind::Method,
                        true,
                        false,
                    );
                    members.push(ClassMember {
                        key: PropKey::Static("static".into()),
                        is_static: true,
                        kind: ClassMemberKind::StaticBlock(def),
                    });
                    continue;
                }
            }
            if self.check(&Tok::Star) || (self.check_ident("async") && !self.member_name_ends_here(1)) {
                return Err(self.unsupported("async and generator methods"));
            }
            let accessor = match self.peek() {
                Tok::Ident(word) if (&**word == "get" || &**word == "set") && !self.member_name_ends_here(1) => {
                    let is_get = &**word == "get";
                    self.advance();
                    Some(is_get)
                }
                _ => None,
            };
            let (key, _) = self.property_key()?;
            if let Some(is_get) = accessor {
                let kind = if is_get { FunctionKind::Getter } else { FunctionKind::Setter };
                let def = self.function_tail(key_name(&key), kind)?;
                members.push(ClassMember {
                    key,
                    is_static,
                    kind: if is_get {
                        ClassMemberKind::Getter(def)
                    } else {
                        ClassMemberKind::Setter(def)
                    },
                });
                continue;
            }
            if self.check(&Tok::LParen) {
                let is_constructor =
                    !is_static && matches!(&key, PropKey::Static(name) if &**name == "constructor");
                if is_constructor {
                    constructor = Some(self.function_tail(name.clone(), FunctionKind::ClassConstructor)?);
                } else {
                    let def = self.function_tail(key_name(&key), FunctionKind::Method)?;
                    members.push(ClassMember {
                        key,
                        is_static,
                        kind: ClassMemberKind::Method(def),
                    });
                }
                continue;
            }
            let value = if self.match_tok(&Tok::Assign) {
                Some(Arc::new(self.allow_in(|p| p.assignment())?))
            } else {
                None
            };
            self.consume_semicolon()?;
            members.push(ClassMember {
                key,
                is_static,
                kind: ClassMemberKind::Field(value),
            });
        }
        Ok(Arc::new(ClassDef {
            name,
            superclass,
            constructor,
            members,
        }))
    }

    /// True when the token at `offset` ends a member name (`(`, `=`, `;`, `}`).
    fn member_name_ends_here(&self, offset: usize) -> bool {
        matches!(
            self.peek_at(offset),
            Tok::LParen | Tok::Assign | Tok::Semi | Tok::RBrace | Tok::Colon | Tok::Comma
        )
    }

    /// Property key in an object literal, class body or object pattern.
    /// Also returns the name when the key could be a shorthand.
    fn property_key(&mut self) -> Result<(PropKey, Option<Ident>), ScriptError> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok((PropKey::Static(name.clone()), Some(name)))
            }
            Tok::Str(s) => {
                self.advance();
                Ok((PropKey::Static(s), None))
            }
            Tok::Number(n) => {
                self.advance();
                Ok((PropKey::Static(number_to_string(n).into()), None))
            }
            Tok::PrivateName(name) => {
                self.advance();
                Ok((PropKey::Private(name), None))
            }
            Tok::LBracket => {
                self.advance();
                let expr = self.allow_in(|p| p.assignment())?;
                self.consume(&Tok::RBracket, "']' after computed key")?;
                Ok((PropKey::Computed(Box::new(expr)), None))
            }
            _ => match self.property_name() {
                Some(name) => Ok((PropKey::Static(name), None)),
                None => Err(self.unexpected("property name")),
            },
        }
    }

    // ----- expressions -----

    pub fn expression(&mut self) -> Result<Expr, ScriptError> {
        let first = self.assignment()?;
        if !self.check(&Tok::Comma) {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.match_tok(&Tok::Comma) {
            exprs.push(self.assignment()?);
        }
        Ok(Expr::Sequence(exprs))
    }

    fn arrow_ahead(&self) -> bool {
        match self.peek() {
            Tok::Ident(_) => matches!(self.peek_at(1), Tok::FatArrow),
            Tok::LParen => {
                let mut depth = 0usize;
                let mut idx = self.current;
                while idx < self.tokens.len() {
                    match self.tokens[idx].tok {
                        Tok::LParen => depth += 1,
                        Tok::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(
                                    self.tokens.get(idx + 1),
                                    Some(Token { tok: Tok::FatArrow, newline_before: false, .. })
                                );
                            }
                        }
                        Tok::Eof => return false,
                        _ => {}
                    }
                    idx += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn arrow_function(&mut self) -> Result<Expr, ScriptError> {
        let (params, rest) = if self.check(&Tok::LParen) {
            self.parameters()?
        } else {
            (vec![Pattern::Ident(self.identifier("arrow parameter")?)], None)
        };
        self.consume(&Tok::FatArrow, "'=>'")?;
        let outer_strict = self.strict;
        let body = if self.check(&Tok::LBrace) {
            self.advance();
            let body = self.allow_in(|p| p.directive_body(|p| p.check(&Tok::RBrace) || p.is_at_end()));
            let body = body.and_then(|body| {
                self.consume(&Tok::RBrace, "'}' after arrow body")?;
                Ok(body)
            });
            FunctionBody::Block(body?)
        } else {
            FunctionBody::Expr(Box::new(self.assignment()?))
        };
        let strict = self.strict;
        self.strict = outer_strict;
        Ok(Expr::Function(make_function(
            None,
            params,
            rest,
            body,
            FunctionKind::Arrow,
            strict,
            false,
        )))
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        super::ensure_sufficient_stack(|| self.assignment_inner())
    }

    fn assignment_inner(&mut self) -> Result<Expr, ScriptError> {
        if self.arrow_ahead() {
            return self.arrow_function();
        }
        if self.check_ident("async")
            && (matches!(self.peek_at(1), Tok::Function)
                || matches!(self.peek_at(2), Tok::FatArrow))
        {
            return Err(self.unsupported("async functions"));
        }
        if self.check_ident("yield") && self.strict {
            return Err(self.unsupported("generator functions"));
        }
        let target = self.conditional()?;
        let op = match self.peek() {
            Tok::Assign => AssignOp::Assign,
            Tok::PlusAssign => AssignOp::Binary(BinaryOp::Add),
            Tok::MinusAssign => AssignOp::Binary(BinaryOp::Sub),
            Tok::StarAssign => AssignOp::Binary(BinaryOp::Mul),
            Tok::SlashAssign => AssignOp::Binary(BinaryOp::Div),
            Tok::PercentAssign => AssignOp::Binary(BinaryOp::Rem),
            Tok::StarStarAssign => AssignOp::Binary(BinaryOp::Exp),
            Tok::ShlAssign => AssignOp::Binary(BinaryOp::Shl),
            Tok::ShrAssign => AssignOp::Binary(BinaryOp::Shr),
            Tok::UShrAssign => AssignOp::Binary(BinaryOp::UShr),
            Tok::AmpAssign => AssignOp::Binary(BinaryOp::BitAnd),
            Tok::PipeAssign => AssignOp::Binary(BinaryOp::BitOr),
            Tok::CaretAssign => AssignOp::Binary(BinaryOp::BitXor),
            Tok::AndAssign => AssignOp::Logical(LogicalOp::And),
            Tok::OrAssign => AssignOp::Logical(LogicalOp::Or),
            Tok::NullishAssign => AssignOp::Logical(LogicalOp::Nullish),
            _ => return Ok(target),
        };
        self.advance();
        let pattern = match op {
            AssignOp::Assign => self.expr_to_pattern(target)?,
            _ => match target {
                Expr::Ident(name) => Pattern::Ident(name),
                Expr::Member { optional: false, .. } | Expr::SuperMember { .. } => {
                    Pattern::Member(Box::new(target))
                }
                _ => return Err(self.invalid_target()),
            },
        };
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(pattern),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let test = self.binary(0)?;
        if !self.check(&Tok::Question) || self.at_optional_dot() {
            return Ok(test);
        }
        self.advance();
        let consequent = self.allow_in(|p| p.assignment())?;
        self.consume(&Tok::Colon, "':' in conditional expression")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary_operator(&self) -> Option<(u8, BinaryKind)> {
        use BinaryKind::{Binary, Logical};
        Some(match self.peek() {
            Tok::NullishCoalesce => (1, Logical(LogicalOp::Nullish)),
            Tok::OrOr => (2, Logical(LogicalOp::Or)),
            Tok::AndAnd => (3, Logical(LogicalOp::And)),
            Tok::Pipe => (4, Binary(BinaryOp::BitOr)),
            Tok::Caret => (5, Binary(BinaryOp::BitXor)),
            Tok::Amp => (6, Binary(BinaryOp::BitAnd)),
            Tok::EqEq => (7, Binary(BinaryOp::Eq)),
            Tok::NotEq => (7, Binary(BinaryOp::NotEq)),
            Tok::EqEqEq => (7, Binary(BinaryOp::StrictEq)),
            Tok::NotEqEq => (7, Binary(BinaryOp::StrictNotEq)),
            Tok::Lt => (8, Binary(BinaryOp::Lt)),
            Tok::LtEq => (8, Binary(BinaryOp::LtEq)),
            Tok::Gt => (8, Binary(BinaryOp::Gt)),
            Tok::GtEq => (8, Binary(BinaryOp::GtEq)),
            Tok::Instanceof => (8, Binary(BinaryOp::Instanceof)),
            Tok::In if !self.no_in => (8, Binary(BinaryOp::In)),
            Tok::Shl => (9, Binary(BinaryOp::Shl)),
            Tok::Shr => (9, Binary(BinaryOp::Shr)),
            Tok::UShr => (9, Binary(BinaryOp::UShr)),
            Tok::Plus => (10, Binary(BinaryOp::Add)),
            Tok::Minus => (10, Binary(BinaryOp::Sub)),
            Tok::Star => (11, Binary(BinaryOp::Mul)),
            Tok::Slash => (11, Binary(BinaryOp::Div)),
            Tok::Percent => (11, Binary(BinaryOp::Rem)),
            Tok::StarStar => (12, Binary(BinaryOp::Exp)),
            _ => return None,
        })
    }

    /// Precedence climbing over every binary and logical operator.
    fn binary(&mut self, min_prec: u8) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        while let Some((prec, kind)) = self.binary_operator() {
            if prec < min_prec {
                break;
            }
            self.advance();
            // `**` is right-associative.
            let next_min = if prec == 12 { prec } else { prec + 1 };
            let right = super::ensure_sufficient_stack(|| self.binary(next_min))?;
            left = match kind {
                BinaryKind::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                BinaryKind::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Tok::Bang => UnaryOp::Not,
            Tok::Minus => UnaryOp::Neg,
            Tok::Plus => UnaryOp::Plus,
            Tok::Tilde => UnaryOp::BitNot,
            Tok::Typeof => UnaryOp::Typeof,
            Tok::Void => UnaryOp::Void,
            Tok::Delete => UnaryOp::Delete,
            Tok::PlusPlus | Tok::MinusMinus => {
                let op = if matches!(self.advance(), Tok::PlusPlus) {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                let target = super::ensure_sufficient_stack(|| self.unary())?;
                return self.update(op, true, target);
            }
            _ => return self.postfix(),
        };
        self.advance();
        let operand = super::ensure_sufficient_stack(|| self.unary())?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let expr = self.call_member(true)?;
        if self.newline_before() {
            return Ok(expr);
        }
        let op = match self.peek() {
            Tok::PlusPlus => UpdateOp::Increment,
            Tok::MinusMinus => UpdateOp::Decrement,
            _ => return Ok(expr),
        };
        self.advance();
        self.update(op, false, expr)
    }

    fn update(&self, op: UpdateOp, prefix: bool, target: Expr) -> Result<Expr, ScriptError> {
        if !matches!(
            target,
            Expr::Ident(_) | Expr::Member { optional: false, .. } | Expr::SuperMember { .. }
        ) {
            return Err(ScriptError::syntax(
                self.source,
                self.tokens[self.current.saturating_sub(1)].span.start,
                "Invalid left-hand side expression in update operation".into(),
            ));
        }
        Ok(Expr::Update {
            op,
            prefix,
            target: Box::new(target),
        })
    }

    /// Member accesses, calls, tagged templates and optional chains.
    /// With `allow_call` unset (a `new` callee or `extends` clause), stops before `(`.
    fn call_member(&mut self, allow_call: bool) -> Result<Expr, ScriptError> {
        let mut expr = if self.check(&Tok::New) {
            self.new_expression()?
        } else {
            self.primary()?
        };
        let mut in_chain = false;
        loop {
            if self.at_optional_dot() {
                if !allow_call {
                    break;
                }
                self.advance();
                self.advance();
                in_chain = true;
                expr = match self.peek() {
                    Tok::LParen => Expr::Call {
                        callee: Box::new(expr),
                        args: self.arguments()?,
                        optional: true,
                    },
                    Tok::LBracket => {
                        self.advance();
                        let property = self.allow_in(|p| p.expression())?;
                        self.consume(&Tok::RBracket, "']'")?;
                        Expr::Member {
                            object: Box::new(expr),
                            property: PropKey::Computed(Box::new(property)),
                            optional: true,
                        }
                    }
                    _ => Expr::Member {
                        object: Box::new(expr),
                        property: self.dot_property()?,
                        optional: true,
                    },
                };
                continue;
            }
            match self.peek() {
                Tok::Dot => {
                    self.advance();
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: self.dot_property()?,
                        optional: false,
                    };
                }
                Tok::LBracket => {
                    self.advance();
                    let property = self.allow_in(|p| p.expression())?;
                    self.consume(&Tok::RBracket, "']'")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: PropKey::Computed(Box::new(property)),
                        optional: false,
                    };
                }
                Tok::LParen if allow_call => {
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args: self.arguments()?,
                        optional: false,
                    };
                }
                Tok::Template(template) => {
                    if in_chain {
                        return Err(self.unexpected("no tagged template in an optional chain"));
                    }
                    let template = template.clone();
                    self.advance();
                    let exprs = self.template_exprs(&template)?;
                    expr = Expr::TaggedTemplate {
                        tag: Box::new(expr),
                        parts: Arc::new(TemplateParts {
                            cooked: template.cooked.clone(),
                            raw: template.raw.clone(),
                        }),
                        exprs,
                    };
                }
                _ => break,
            }
        }
        if in_chain {
            expr = Expr::OptionalChain(Box::new(expr));
        }
        Ok(expr)
    }

    fn dot_property(&mut self) -> Result<PropKey, ScriptError> {
        if let Tok::PrivateName(name) = self.peek().clone() {
            self.advance();
            return Ok(PropKey::Private(name));
        }
        self.property_name()
            .map(PropKey::Static)
            .ok_or_else(|| self.unexpected("property name after '.'"))
    }

    fn new_expression(&mut self) -> Result<Expr, ScriptError> {
        self.consume(&Tok::New, "'new'")?;
        if self.match_tok(&Tok::Dot) {
            return match self.property_name() {
                Some(name) if &*name == "target" => Ok(Expr::NewTarget),
                _ => Err(self.unexpected("'target' after 'new.'")),
            };
        }
        let callee = super::ensure_sufficient_stack(|| self.call_member(false))?;
        let args = if self.check(&Tok::LParen) {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn arguments(&mut self) -> Result<Vec<Argument>, ScriptError> {
        self.consume(&Tok::LParen, "'('")?;
        let args = self.allow_in(|p| {
            let mut args = Vec::new();
            while !p.check(&Tok::RParen) {
                if p.match_tok(&Tok::Ellipsis) {
                    args.push(Argument::Spread(p.assignment()?));
                } else {
                    args.push(Argument::Expr(p.assignment()?));
                }
                if !p.match_tok(&Tok::Comma) {
                    break;
                }
            }
            Ok(args)
        })?;
        self.consume(&Tok::RParen, "')' after arguments")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let tok = self.peek().clone();
        match tok {
            Tok::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Tok::Template(template) => {
                self.advance();
                let quasis = template
                    .cooked
                    .iter()
                    .map(|cooked| {
                        cooked.clone().ok_or_else(|| {
                            self.unexpected("valid escape sequence in template literal")
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let exprs = self.template_exprs(&template)?;
                Ok(Expr::Template { quasis, exprs })
            }
            Tok::Regex(RegexLiteral { pattern, flags }) => {
                self.advance();
                Ok(Expr::Regex { pattern, flags })
            }
            Tok::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Tok::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Tok::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Tok::This => {
                self.advance();
                Ok(Expr::This)
            }
            Tok::Ident(name) => {
                self.advance();
                if &*name == "arguments" {
                    self.arguments_seen = true;
                }
                Ok(Expr::Ident(name))
            }
            Tok::LParen => {
                self.advance();
                let expr = self.allow_in(|p| p.expression())?;
                self.consume(&Tok::RParen, "')'")?;
                Ok(expr)
            }
            Tok::LBracket => self.array_literal(),
            Tok::LBrace => self.object_literal(),
            Tok::Function => {
                self.advance();
                Ok(Expr::Function(self.function_rest(FunctionKind::Normal, true)?))
            }
            Tok::Class => {
                self.advance();
                Ok(Expr::Class(self.class_rest(true)?))
            }
            Tok::Super => {
                self.advance();
                match self.peek() {
                    Tok::LParen => Ok(Expr::SuperCall {
                        args: self.arguments()?,
                    }),
                    Tok::Dot => {
                        self.advance();
                        Ok(Expr::SuperMember {
                            property: self.dot_property()?,
                        })
                    }
                    Tok::LBracket => {
                        self.advance();
                        let property = self.allow_in(|p| p.expression())?;
                        self.consume(&Tok::RBracket, "']'")?;
                        Ok(Expr::SuperMember {
                            property: PropKey::Computed(Box::new(property)),
                        })
                    }
                    _ => Err(self.unexpected("'(', '.' or '[' after 'super'")),
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn template_exprs(&self, template: &TemplateToken) -> Result<Vec<Expr>, ScriptError> {
        template
            .exprs
            .iter()
            .map(|tokens| {
                let mut sub = Parser::new(self.source, tokens.clone());
                sub.strict = self.strict;
                let expr = sub.expression()?;
                if !sub.is_at_end() {
                    return Err(sub.unexpected("'}' after template substitution"));
                }
                Ok(expr)
            })
            .collect()
    }

    fn array_literal(&mut self) -> Result<Expr, ScriptError> {
        self.consume(&Tok::LBracket, "'['")?;
        let items = self.allow_in(|p| {
            let mut items = Vec::new();
            while !p.check(&Tok::RBracket) {
                if p.match_tok(&Tok::Comma) {
                    items.push(ArrayElement::Hole);
                    continue;
                }
                if p.match_tok(&Tok::Ellipsis) {
                    items.push(ArrayElement::Spread(p.assignment()?));
                } else {
                    items.push(ArrayElement::Expr(p.assignment()?));
                }
                if !p.match_tok(&Tok::Comma) {
                    break;
                }
            }
            Ok(items)
        })?;
        self.consume(&Tok::RBracket, "']' after array elements")?;
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> Result<Expr, ScriptError> {
        self.consume(&Tok::LBrace, "'{'")?;
        let props = self.allow_in(|p| p.object_props())?;
        self.consume(&Tok::RBrace, "'}' after object properties")?;
        Ok(Expr::Object(props))
    }

    fn object_props(&mut self) -> Result<Vec<ObjectProp>, ScriptError> {
        let mut props = Vec::new();
        while !self.check(&Tok::RBrace) {
            if self.match_tok(&Tok::Ellipsis) {
                props.push(ObjectProp::Spread(self.assignment()?));
            } else {
                props.push(self.object_prop()?);
            }
            if !self.match_tok(&Tok::Comma) {
                break;
            }
        }
        Ok(props)
    }

    fn object_prop(&mut self) -> Result<ObjectProp, ScriptError> {
        if self.check(&Tok::Star) || (self.check_ident("async") && !self.member_name_ends_here(1)) {
            return Err(self.unsupported("async and generator methods"));
        }
        if let Tok::Ident(word) = self.peek()
            && (&**word == "get" || &**word == "set")
            && !self.member_name_ends_here(1)
        {
            let is_get = &**word == "get";
            self.advance();
            let (key, _) = self.property_key()?;
            let kind = if is_get { FunctionKind::Getter } else { FunctionKind::Setter };
            let def = self.function_tail(key_name(&key), kind)?;
            return Ok(if is_get {
                ObjectProp::Getter(key, def)
            } else {
                ObjectProp::Setter(key, def)
            });
        }

        let (key, shorthand) = self.property_key()?;
        if matches!(key, PropKey::Private(_)) {
            return Err(self.unexpected("property name"));
        }
        if self.check(&Tok::LParen) {
            let def = self.function_tail(key_name(&key), FunctionKind::Method)?;
            return Ok(ObjectProp::Method(key, def));
        }
        if self.match_tok(&Tok::Colon) {
            return Ok(ObjectProp::KeyValue(key, self.assignment()?));
        }
        let Some(name) = shorthand else {
            return Err(self.unexpected("':' after property name"));
        };
        let value = if self.match_tok(&Tok::Assign) {
            // Only meaningful once the literal is reinterpreted as a pattern.
            Expr::Assign {
                op: AssignOp::Assign,
                target: Box::new(Pattern::Ident(name.clone())),
                value: Box::new(self.assignment()?),
            }
        } else {
            Expr::Ident(name)
        };
        Ok(ObjectProp::KeyValue(key, value))
    }
}

enum BinaryKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn key_name(key: &PropKey) -> Option<Ident> {
    match key {
        PropKey::Static(name) => Some(name.clone()),
        PropKey::Private(name) => Some(format!("#{name}").into()),
        PropKey::Computed(_) => None,
    }
}

fn make_function(
    name: Option<Ident>,
    params: Vec<Pattern>,
    rest: Option<Pattern>,
    body: FunctionBody,
    kind: FunctionKind,
    strict: bool,
    uses_arguments: bool,
) -> Arc<FunctionDef> {
    let mut var_names = Vec::new();
    if let FunctionBody::Block(stmts) = &body {
        collect_vars(stmts, &mut var_names);
    }
    let length = params
        .iter()
        .take_while(|p| !matches!(p, Pattern::Default { .. }))
        .count();
    Arc::new(FunctionDef {
        name,
        params,
        rest,
        body,
        kind,
        strict,
        var_names,
        length,
        uses_arguments,
    })
}

/// `var` names declared in `stmts`, not descending into nested functions.
fn collect_vars(stmts: &[Stmt], out: &mut Vec<Ident>) {
    for stmt in stmts {
        collect_stmt_vars(stmt, out);
    }
}

fn push_var_pattern(pattern: &Pattern, out: &mut Vec<Ident>) {
    let mut names = Vec::new();
    pattern.bound_names(&mut names);
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
}

fn collect_stmt_vars(stmt: &Stmt, out: &mut Vec<Ident>) {
    match stmt {
        Stmt::VarDecl(VarDecl {
            kind: DeclKind::Var,
            declarations,
        }) => {
            for decl in declarations {
                push_var_pattern(&decl.target, out);
            }
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_stmt_vars(then_branch, out);
            if let Some(else_branch) = else_branch {
                collect_stmt_vars(else_branch, out);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
            collect_stmt_vars(body, out)
        }
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Decl(VarDecl {
                kind: DeclKind::Var,
                declarations,
            })) = init
            {
                for decl in declarations {
                    push_var_pattern(&decl.target, out);
                }
            }
            collect_stmt_vars(body, out);
        }
        Stmt::ForIn { left, body, .. } | Stmt::ForOf { left, body, .. } => {
            if let ForBinding::Decl(DeclKind::Var, pattern) = left {
                push_var_pattern(pattern, out);
            }
            collect_stmt_vars(body, out);
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                collect_vars(&case.body, out);
            }
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            collect_vars(block, out);
            if let Some(handler) = handler {
                collect_vars(&handler.body, out);
            }
            if let Some(finalizer) = finalizer {
                collect_vars(finalizer, out);
            }
        }
        Stmt::Block(stmts) => collect_vars(stmts, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_expr(source: &str) -> Expr {
        let program = parse(source).unwrap();
        match program.body.into_iter().next() {
            Some(Stmt::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.into())
    }

    #[test]
    fn parses_member_assignment_with_keyword_property() {
        let expr = single_expr("window.default = 1");
        let Expr::Assign { target, .. } = expr else {
            panic!("expected assignment");
        };
        assert_eq!(
            *target,
            Pattern::Member(Box::new(Expr::Member {
                object: Box::new(ident("window")),
                property: PropKey::Static("default".into()),
                optional: false,
            }))
        );
    }

    #[test]
    fn parses_arrow_functions() {
        let Expr::Assign { value, .. } = single_expr("window.A = (a, { b } = {}, ...rest) => a + b")
        else {
            panic!("expected assignment");
        };
        let Expr::Function(def) = *value else {
            panic!("expected function");
        };
        assert!(def.is_arrow());
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.length, 1);
        assert_eq!(def.rest, Some(Pattern::Ident("rest".into())));
        assert!(matches!(def.body, FunctionBody::Expr(_)));

        let Expr::Function(def) = single_expr("(() => { return 1 })") else {
            panic!("expected function");
        };
        assert!(def.params.is_empty());
        assert!(matches!(def.body, FunctionBody::Block(_)));
    }

    #[test]
    fn parses_iife_wrapper() {
        let expr = single_expr("(function (global) { global.X = 1; })(this)");
        let Expr::Call { callee, args, .. } = expr else {
            panic!("expected call");
        };
        assert!(matches!(*callee, Expr::Function(_)));
        assert_eq!(args, vec![Argument::Expr(Expr::This)]);
    }

    #[test]
    fn precedence_follows_the_operator_table() {
        let Expr::Binary { op, right, .. } = single_expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));

        let Expr::Binary { op, left, .. } = single_expr("a | b & c << 1") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::BitOr);
        assert_eq!(*left, ident("a"));

        let Expr::Binary { op, right, .. } = single_expr("2 ** 3 ** 2") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Exp);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Exp, .. }));
    }

    #[test]
    fn object_literal_forms() {
        let Expr::Object(props) = single_expr(
            "({ a: 1, 'b': 2, default: 3, c, m() { return 4 }, get g() { return 5 }, [k]: 6, ...rest, 7: 8 })",
        ) else {
            panic!("expected object");
        };
        assert_eq!(props.len(), 9);
        assert!(matches!(&props[3], ObjectProp::KeyValue(PropKey::Static(k), Expr::Ident(v)) if &**k == "c" && &**v == "c"));
        assert!(matches!(&props[4], ObjectProp::Method(..)));
        assert!(matches!(&props[5], ObjectProp::Getter(..)));
        assert!(matches!(&props[6], ObjectProp::KeyValue(PropKey::Computed(_), _)));
        assert!(matches!(&props[7], ObjectProp::Spread(_)));
        assert!(matches!(&props[8], ObjectProp::KeyValue(PropKey::Static(k), _) if &**k == "7"));
    }

    #[test]
    fn loop_statements() {
        let program = parse(
            "for (var i = 0, n = a.length; i < n; i++) {}
             for (b in a) if (a.hasOwnProperty(b)) continue;
             for (const [k, v] of entries) break;
             do x--; while (x > 0)
             outer: while (true) { break outer }",
        )
        .unwrap();
        assert_eq!(program.body.len(), 5);
        assert!(matches!(program.body[0], Stmt::For { .. }));
        assert!(matches!(&program.body[1], Stmt::ForIn { left: ForBinding::Target(Pattern::Ident(b)), .. } if &**b == "b"));
        assert!(matches!(&program.body[2], Stmt::ForOf { left: ForBinding::Decl(DeclKind::Const, Pattern::Array { .. }), .. }));
        assert!(matches!(program.body[3], Stmt::DoWhile { .. }));
        assert!(matches!(&program.body[4], Stmt::Labeled { label, .. } if &**label == "outer"));
        assert_eq!(program.var_names, vec![JsStr::from("i"), JsStr::from("n")]);
    }

    #[test]
    fn in_operator_is_allowed_inside_for_head_parentheses() {
        let program = parse("for (var x = ('a' in o) ? 1 : 2; x; ) break;").unwrap();
        assert!(matches!(program.body[0], Stmt::For { .. }));
    }

    #[test]
    fn for_in_head_with_sequence_right_side() {
        let program = parse("for (b in a = c.defaultProps, a) d[b] = a[b];").unwrap();
        let Stmt::ForIn { right, .. } = &program.body[0] else {
            panic!("expected for-in");
        };
        assert!(matches!(right, Expr::Sequence(items) if items.len() == 2));
    }

    #[test]
    fn switch_with_default_in_the_middle() {
        let program = parse("switch (x) { case 1: a(); default: b(); case 2: { c() } }").unwrap();
        let Stmt::Switch { cases, .. } = &program.body[0] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 3);
        assert!(cases[1].test.is_none());
    }

    #[test]
    fn update_expressions_and_asi() {
        let program = parse("n++\n++m").unwrap();
        assert_eq!(program.body.len(), 2);
        assert!(matches!(&program.body[0], Stmt::Expr(Expr::Update { prefix: false, .. })));
        assert!(matches!(&program.body[1], Stmt::Expr(Expr::Update { prefix: true, .. })));
        assert!(parse("1++").is_err());
    }

    #[test]
    fn optional_chains_wrap_the_whole_chain() {
        let expr = single_expr("a?.b.c?.(d)");
        let Expr::OptionalChain(inner) = expr else {
            panic!("expected optional chain, got {expr:?}");
        };
        assert!(matches!(*inner, Expr::Call { optional: true, .. }));
        assert!(matches!(single_expr("a ? .5 : 1"), Expr::Conditional { .. }));
    }

    #[test]
    fn destructuring_assignment_and_declaration() {
        let Expr::Assign { target, .. } = single_expr("[a, , b = 2, ...c] = list") else {
            panic!("expected assignment");
        };
        let Pattern::Array { elements, rest } = *target else {
            panic!("expected array pattern");
        };
        assert_eq!(elements.len(), 3);
        assert!(elements[1].is_none());
        assert!(matches!(elements[2], Some(Pattern::Default { .. })));
        assert!(rest.is_some());

        let program = parse("var { x, y: [z] = [], ...others } = obj;").unwrap();
        assert_eq!(
            program.var_names,
            vec![JsStr::from("x"), JsStr::from("z"), JsStr::from("others")]
        );
    }

    #[test]
    fn classes_with_members() {
        let program = parse(
            "class A extends B.C { #count = 0; static tag = 'a'; constructor(x) { super(x) }
               get value() { return this.#count } static make() { return new A() } static { init() } }",
        )
        .unwrap();
        let Stmt::Class(class) = &program.body[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name.as_deref(), Some("A"));
        assert!(class.superclass.is_some());
        assert!(class.constructor.is_some());
        assert_eq!(class.members.len(), 5);
        assert!(matches!(class.members[0].key, PropKey::Private(_)));
        assert!(class.members[1].is_static);
        assert!(matches!(class.members[4].kind, ClassMemberKind::StaticBlock(_)));
    }

    #[test]
    fn templates_and_tagged_templates() {
        let Expr::Template { quasis, exprs } = single_expr("`a${b + 1}c`") else {
            panic!("expected template");
        };
        assert_eq!(quasis, vec![JsStr::from("a"), JsStr::from("c")]);
        assert!(matches!(exprs[0], Expr::Binary { op: BinaryOp::Add, .. }));
        assert!(matches!(single_expr("css`x`"), Expr::TaggedTemplate { .. }));
    }

    #[test]
    fn use_strict_prologue_marks_functions() {
        let Expr::Function(def) = single_expr("(function () { 'use strict'; return this })") else {
            panic!("expected function");
        };
        assert!(def.strict);
        assert!(!parse("var a = 1").unwrap().strict);
    }

    #[test]
    fn automatic_semicolons_at_newlines() {
        let program = parse("var a = 1\nvar b = 2\nwindow.c = a + b").unwrap();
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn bare_return_before_newline() {
        let program = parse("return\n42").unwrap();
        assert_eq!(program.body[0], Stmt::Return(None));
    }

    #[test]
    fn reports_position_of_syntax_errors() {
        let err = parse("var x = ;").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Unexpected token ';'"), "{message}");
        assert!(message.contains("1:9"), "{message}");
    }

    #[test]
    fn rejects_invalid_targets_and_unsupported_forms() {
        assert!(parse("1 = 2").is_err());
        let err = parse("function* gen() {}").unwrap_err();
        assert!(err.to_string().contains("generator functions are not supported"));
        let err = parse("async function f() {}").unwrap_err();
        assert!(err.to_string().contains("async functions are not supported"));
    }
}
