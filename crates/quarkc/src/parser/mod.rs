//! Token stream to abstract syntax tree (spec §4.2).
//!
//! One recursive-descent grammar, parameterized by an [`ErrorPolicy`] rather
//! than duplicated for the strict and recovering parsers (spec §9). Only
//! the `Strict` instantiation is exercised by the compilation driver; the
//! `Recovering` instantiation exists so the LSP front end (out of scope
//! here) can reuse this module without a second grammar.

pub mod policy;

use crate::ast::{
    BinaryOp, Expr, ExprKind, Field, FunctionDef, MatchArm, Param, Program, Stmt, StmtKind, StructLiteralField,
    TypeExpr, UnaryOp,
};
use crate::error::{CompileError, CompileResult};
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Keyword, Literal, Operator, Punct, Token, TokenKind, TypeKeyword};

pub use policy::{ErrorPolicy, Recovering, Strict};

pub struct Parser<P: ErrorPolicy> {
    tokens: Vec<Token>,
    pos: usize,
    policy: P,
    no_struct_literal: bool,
}

impl<P: ErrorPolicy> Parser<P> {
    #[must_use]
    pub fn new(source: &str, policy: P) -> Self {
        let tokens = Lexer::new(crate::lexer::strip_bom(source)).tokenize();
        Self { tokens, pos: 0, policy, no_struct_literal: false }
    }

    pub fn parse_program(&mut self) -> CompileResult<Program> {
        let mut statements = Vec::new();
        while !self.at_eof() {
            match self.parse_top_level_stmt() {
                Ok(stmt) => statements.push(stmt),
                Err(error) => {
                    self.policy.report(error)?;
                    self.synchronize();
                }
            }
        }
        Ok(Program::new(statements))
    }

    // ---- token stream plumbing ----------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check_punct(&self, punct: Punct) -> bool {
        matches!(self.peek_kind(), TokenKind::Punct(p) if *p == punct)
    }

    fn check_operator(&self, op: Operator) -> bool {
        matches!(self.peek_kind(), TokenKind::Operator(o) if *o == op)
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.check_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_operator(&mut self, op: Operator) -> bool {
        if self.check_operator(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> CompileResult<Span> {
        if self.check_punct(punct) {
            Ok(self.advance().span)
        } else {
            self.unexpected(format!("expected `{punct}`"))
        }
    }

    fn expect_identifier(&mut self) -> CompileResult<(String, Span)> {
        if matches!(self.peek_kind(), TokenKind::Identifier) {
            let token = self.advance();
            Ok((token.text, token.span))
        } else {
            self.unexpected("expected an identifier".to_owned())
        }
    }

    fn unexpected<T>(&self, message: String) -> CompileResult<T> {
        Err(CompileError::Syntactic {
            span: self.current_span(),
            message: format!("{message}, found `{}`", self.peek_kind()),
        })
    }

    /// Synchronizes to the nearest statement boundary: `;`, a closing
    /// brace, or the start of a top-level keyword (spec §4.2). Only
    /// meaningful under a policy that recovers; the strict policy already
    /// aborted via `?` before this is reached.
    fn synchronize(&mut self) {
        if !self.policy.recovers() {
            return;
        }
        while !self.at_eof() {
            if self.check_punct(Punct::Semi) {
                self.advance();
                return;
            }
            if self.check_punct(Punct::RBrace) {
                return;
            }
            if matches!(
                self.peek_kind(),
                TokenKind::Keyword(
                    Keyword::Fn
                        | Keyword::Struct
                        | Keyword::Impl
                        | Keyword::Extern
                        | Keyword::Var
                        | Keyword::If
                        | Keyword::While
                        | Keyword::For
                        | Keyword::Match
                        | Keyword::Ret
                        | Keyword::Import
                        | Keyword::Module
                )
            ) {
                return;
            }
            self.advance();
        }
    }

    // ---- types -----------------------------------------------------------

    fn parse_type_expr(&mut self) -> CompileResult<TypeExpr> {
        let mut base = self.parse_type_atom()?;
        loop {
            if self.eat_operator(Operator::Star) {
                base = TypeExpr::Pointer(Box::new(base));
                continue;
            }
            if self.check_punct(Punct::LBracket) {
                self.advance();
                let size = if matches!(self.peek_kind(), TokenKind::Literal(Literal::Int(_))) {
                    let TokenKind::Literal(Literal::Int(value)) = self.advance().kind else { unreachable!() };
                    Some(value as u32)
                } else {
                    None
                };
                self.expect_punct(Punct::RBracket)?;
                base = TypeExpr::Array(Box::new(base), size);
                continue;
            }
            break;
        }
        Ok(base)
    }

    fn parse_type_atom(&mut self) -> CompileResult<TypeExpr> {
        match self.peek_kind().clone() {
            TokenKind::TypeKeyword(tk) => {
                self.advance();
                Ok(match tk {
                    TypeKeyword::Int => TypeExpr::Int,
                    TypeKeyword::Float => TypeExpr::Float,
                    TypeKeyword::Double => TypeExpr::Double,
                    TypeKeyword::Bool => TypeExpr::Bool,
                    TypeKeyword::Str => TypeExpr::Str,
                    TypeKeyword::Char => TypeExpr::Char,
                })
            }
            TokenKind::Keyword(Keyword::Void) => {
                self.advance();
                Ok(TypeExpr::Void)
            }
            TokenKind::Keyword(Keyword::Map) => {
                self.advance();
                self.expect_punct(Punct::LBracket)?;
                let key = self.parse_type_expr()?;
                self.expect_punct(Punct::Comma)?;
                let value = self.parse_type_expr()?;
                self.expect_punct(Punct::RBracket)?;
                Ok(TypeExpr::Map(Box::new(key), Box::new(value)))
            }
            TokenKind::Keyword(Keyword::List) => {
                self.advance();
                self.expect_punct(Punct::LBracket)?;
                let element = self.parse_type_expr()?;
                self.expect_punct(Punct::RBracket)?;
                Ok(TypeExpr::List(Box::new(element)))
            }
            TokenKind::Identifier => {
                let (name, _) = self.expect_identifier()?;
                Ok(TypeExpr::Named(name))
            }
            _ => self.unexpected("expected a type".to_owned()),
        }
    }

    /// True if the current position starts a type (used to disambiguate a
    /// top-level function definition from an ordinary statement).
    fn looks_like_type_start(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::TypeKeyword(_) | TokenKind::Keyword(Keyword::Void | Keyword::Map | Keyword::List) | TokenKind::Identifier
        )
    }

    // ---- top level ---------------------------------------------------

    fn parse_top_level_stmt(&mut self) -> CompileResult<Stmt> {
        if self.check_keyword(Keyword::Module) {
            return self.parse_module_decl();
        }
        if self.check_keyword(Keyword::Import) {
            return self.parse_import();
        }
        if self.check_keyword(Keyword::Extern) {
            return self.parse_extern();
        }
        if self.check_keyword(Keyword::Struct) {
            return self.parse_struct_def();
        }
        if self.check_keyword(Keyword::Impl) || self.check_keyword(Keyword::Extend) {
            return self.parse_impl_block();
        }
        if let Some(func) = self.try_parse_function_def()? {
            return Ok(func);
        }
        self.parse_stmt()
    }

    fn parse_module_decl(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let (name, _) = self.expect_identifier()?;
        self.eat_punct(Punct::Semi);
        Ok(Stmt::new(StmtKind::Module(name), start))
    }

    fn parse_import(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let mut paths = Vec::new();
        loop {
            paths.push(self.parse_import_path()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semi)?;
        Ok(Stmt::new(StmtKind::Import(paths), start.to(self.current_span())))
    }

    fn parse_import_path(&mut self) -> CompileResult<String> {
        if let TokenKind::Literal(Literal::Str(text)) = self.peek_kind().clone() {
            self.advance();
            return Ok(text);
        }
        let (mut path, _) = self.expect_identifier()?;
        while self.eat_operator(Operator::Slash) {
            let (segment, _) = self.expect_identifier()?;
            path.push('/');
            path.push_str(&segment);
        }
        Ok(path)
    }

    fn parse_extern(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        if self.eat_keyword(Keyword::Struct) {
            let (name, _) = self.expect_identifier()?;
            self.expect_punct(Punct::Semi)?;
            return Ok(Stmt::new(StmtKind::ExternStructDecl(name), start.to(self.current_span())));
        }
        self.expect_keyword(Keyword::Fn)?;
        let (name, _) = self.expect_identifier()?;
        self.expect_punct(Punct::LParen)?;
        let params = self.parse_param_list()?;
        self.expect_punct(Punct::RParen)?;
        let return_type = if self.eat_operator(Operator::Arrow) { self.parse_type_expr()? } else { TypeExpr::Void };
        self.expect_punct(Punct::Semi)?;
        Ok(Stmt::new(StmtKind::ExternFn(name, return_type, params), start.to(self.current_span())))
    }

    fn expect_keyword(&mut self, kw: Keyword) -> CompileResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            self.unexpected(format!("expected `{kw}`"))
        }
    }

    fn parse_param_list(&mut self) -> CompileResult<Vec<Param>> {
        let mut params = Vec::new();
        while !self.check_punct(Punct::RParen) {
            if self.eat_keyword(Keyword::This) {
                params.push(Param { name: "this".to_owned(), ty: TypeExpr::Named("Self".to_owned()) });
            } else {
                let (name, _) = self.expect_identifier()?;
                self.expect_punct(Punct::Colon)?;
                let ty = self.parse_type_expr()?;
                params.push(Param { name, ty });
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_struct_def(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let (name, _) = self.expect_identifier()?;
        let parent = if self.eat_punct(Punct::Colon) { Some(self.expect_identifier()?.0) } else { None };
        self.expect_punct(Punct::LBrace)?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            if self.eat_keyword(Keyword::Data) {
                self.expect_punct(Punct::LBrace)?;
                while !self.check_punct(Punct::RBrace) {
                    let ty = self.parse_type_expr()?;
                    let (field_name, _) = self.expect_identifier()?;
                    self.expect_punct(Punct::Semi)?;
                    fields.push(Field { name: field_name, ty });
                }
                self.expect_punct(Punct::RBrace)?;
            } else if self.eat_keyword(Keyword::Impl) {
                self.expect_punct(Punct::LBrace)?;
                while !self.check_punct(Punct::RBrace) {
                    methods.push(self.parse_method_def()?);
                }
                self.expect_punct(Punct::RBrace)?;
            } else {
                return self.unexpected("expected `data` or `impl` in struct body".to_owned());
            }
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(Stmt::new(StmtKind::StructDef(name, parent, fields, methods), start.to(self.current_span())))
    }

    fn parse_impl_block(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let (name, _) = self.expect_identifier()?;
        self.expect_punct(Punct::LBrace)?;
        let mut methods = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            methods.push(self.parse_method_def()?);
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(Stmt::new(StmtKind::ImplBlock(name, methods), start.to(self.current_span())))
    }

    fn parse_method_def(&mut self) -> CompileResult<FunctionDef> {
        let start = self.current_span();
        let return_type = self.parse_type_expr()?;
        let (name, _) = self.expect_identifier()?;
        self.expect_punct(Punct::LParen)?;
        let params = self.parse_param_list()?;
        self.expect_punct(Punct::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDef { name, return_type, params, body, span: start.to(self.current_span()) })
    }

    /// Tries to parse `<Type> <ident> ( ... ) { ... }`; backtracks and
    /// returns `Ok(None)` if the lookahead doesn't commit to a function
    /// definition, since e.g. `var x = 1;` starts the same way a free
    /// function's return type atom would if `var` were ever a type name.
    fn try_parse_function_def(&mut self) -> CompileResult<Option<Stmt>> {
        if !self.looks_like_type_start() {
            return Ok(None);
        }
        let checkpoint = self.pos;
        let start = self.current_span();
        let Ok(return_type) = self.parse_type_expr() else {
            self.pos = checkpoint;
            return Ok(None);
        };
        if !matches!(self.peek_kind(), TokenKind::Identifier) || !matches!(self.peek_at(1).kind, TokenKind::Punct(Punct::LParen)) {
            self.pos = checkpoint;
            return Ok(None);
        }
        let (name, _) = self.expect_identifier()?;
        self.expect_punct(Punct::LParen)?;
        let params = self.parse_param_list()?;
        self.expect_punct(Punct::RParen)?;
        let body = self.parse_block()?;
        let span = start.to(self.current_span());
        Ok(Some(Stmt::new(StmtKind::FunctionDef(FunctionDef { name, return_type, params, body, span }), span)))
    }

    // ---- statements ----------------------------------------------------

    fn parse_block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.expect_punct(Punct::LBrace)?;
        let mut statements = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            match self.parse_stmt() {
                Ok(stmt) => statements.push(stmt),
                Err(error) => {
                    self.policy.report(error)?;
                    self.synchronize();
                }
            }
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(statements)
    }

    fn parse_stmt(&mut self) -> CompileResult<Stmt> {
        if let Some(func) = self.try_parse_function_def()? {
            return Ok(func);
        }
        match self.peek_kind().clone() {
            TokenKind::Keyword(Keyword::Var) => self.parse_var_decl(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Match) => self.parse_match(),
            TokenKind::Keyword(Keyword::Ret) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                let span = self.advance().span;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let span = self.advance().span;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::new(StmtKind::Continue, span))
            }
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct_def(),
            TokenKind::Keyword(Keyword::Impl) => self.parse_impl_block(),
            TokenKind::Keyword(Keyword::Extern) => self.parse_extern(),
            _ => self.parse_expr_or_assign_stmt(),
        }
    }

    fn parse_var_decl(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let (name, _) = self.expect_identifier()?;
        let ty = if self.eat_punct(Punct::Colon) { Some(self.parse_type_expr()?) } else { None };
        let init = if self.eat_operator(Operator::Assign) { Some(self.parse_expr()?) } else { None };
        self.expect_punct(Punct::Semi)?;
        Ok(Stmt::new(StmtKind::VarDecl(ty, name, init), start.to(self.current_span())))
    }

    fn parse_condition(&mut self) -> CompileResult<Expr> {
        self.no_struct_literal = true;
        let result = self.parse_expr();
        self.no_struct_literal = false;
        result
    }

    fn parse_if(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let cond = self.parse_condition()?;
        let then_body = self.parse_block()?;
        let mut elifs = Vec::new();
        while self.eat_keyword(Keyword::Elif) {
            let elif_cond = self.parse_condition()?;
            let elif_body = self.parse_block()?;
            elifs.push((elif_cond, elif_body));
        }
        let else_body = if self.eat_keyword(Keyword::Else) { Some(self.parse_block()?) } else { None };
        Ok(Stmt::new(StmtKind::If(cond, then_body, elifs, else_body), start.to(self.current_span())))
    }

    fn parse_while(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let cond = self.parse_condition()?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::While(cond, body), start.to(self.current_span())))
    }

    fn parse_for(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let (var, _) = self.expect_identifier()?;
        self.expect_keyword(Keyword::In)?;
        let range = self.parse_condition()?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::For(var, range, body), start.to(self.current_span())))
    }

    fn parse_match(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let scrutinee = self.parse_condition()?;
        self.expect_punct(Punct::LBrace)?;
        let mut arms = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            let arm_start = self.current_span();
            let pattern = if matches!(self.peek_kind(), TokenKind::Identifier) && self.peek().text == "_" {
                self.advance();
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect_operator_fat_arrow()?;
            let body = self.parse_block()?;
            arms.push(MatchArm { pattern, body, span: arm_start.to(self.current_span()) });
            self.eat_punct(Punct::Comma);
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(Stmt::new(StmtKind::Match(scrutinee, arms), start.to(self.current_span())))
    }

    fn expect_operator_fat_arrow(&mut self) -> CompileResult<()> {
        if self.eat_operator(Operator::FatArrow) {
            Ok(())
        } else {
            self.unexpected("expected `=>`".to_owned())
        }
    }

    fn parse_return(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance();
        let value = if self.check_punct(Punct::Semi) { None } else { Some(self.parse_expr()?) };
        self.expect_punct(Punct::Semi)?;
        Ok(Stmt::new(StmtKind::Return(value), start.to(self.current_span())))
    }

    /// Parses an expression, then decides whether it denotes an assignment
    /// target based on the trailing token; the common shape of parsing a
    /// general expression before disambiguating statement kind, rather than
    /// a separate lvalue grammar.
    fn parse_expr_or_assign_stmt(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        let expr = self.parse_expr()?;

        if let Some(op) = self.peek_compound_assign() {
            self.advance();
            let rhs = self.parse_expr()?;
            self.expect_punct(Punct::Semi)?;
            let value = match op {
                Some(bin_op) => Expr::new(ExprKind::Binary(bin_op, Box::new(expr.clone()), Box::new(rhs)), start),
                None => rhs,
            };
            return self.build_assign_stmt(expr, value, start);
        }

        self.expect_punct(Punct::Semi)?;
        Ok(Stmt::new(StmtKind::ExprStmt(expr), start.to(self.current_span())))
    }

    /// Returns `Some(Some(op))` for a compound assignment (desugared to a
    /// binary op on read-then-write), `Some(None)` for plain `=`, or `None`
    /// if the current token isn't an assignment operator at all.
    fn peek_compound_assign(&self) -> Option<Option<BinaryOp>> {
        match self.peek_kind() {
            TokenKind::Operator(Operator::Assign) => Some(None),
            TokenKind::Operator(Operator::PlusAssign) => Some(Some(BinaryOp::Add)),
            TokenKind::Operator(Operator::MinusAssign) => Some(Some(BinaryOp::Sub)),
            TokenKind::Operator(Operator::StarAssign) => Some(Some(BinaryOp::Mul)),
            TokenKind::Operator(Operator::SlashAssign) => Some(Some(BinaryOp::Div)),
            TokenKind::Operator(Operator::PercentAssign) => Some(Some(BinaryOp::Rem)),
            TokenKind::Operator(Operator::AmpAssign) => Some(Some(BinaryOp::BitAnd)),
            TokenKind::Operator(Operator::PipeAssign) => Some(Some(BinaryOp::BitOr)),
            TokenKind::Operator(Operator::CaretAssign) => Some(Some(BinaryOp::BitXor)),
            TokenKind::Operator(Operator::ShlAssign) => Some(Some(BinaryOp::Shl)),
            TokenKind::Operator(Operator::ShrAssign) => Some(Some(BinaryOp::Shr)),
            _ => None,
        }
    }

    fn build_assign_stmt(&self, target: Expr, value: Expr, span: Span) -> CompileResult<Stmt> {
        match target.kind {
            ExprKind::Variable(name) => Ok(Stmt::new(StmtKind::Assign(name, value), span)),
            ExprKind::MemberAccess(base, field) => Ok(Stmt::new(StmtKind::MemberAssign(*base, field, value), span)),
            ExprKind::Dereference(ptr) => Ok(Stmt::new(StmtKind::DerefAssign(*ptr, value), span)),
            ExprKind::ArrayAccess(arr, index) => Ok(Stmt::new(StmtKind::ArrayAssign(*arr, *index, value), span)),
            _ => Err(CompileError::Syntactic { span, message: "left-hand side of assignment is not an lvalue".to_owned() }),
        }
    }

    // ---- expressions: precedence climbing -------------------------------

    fn parse_expr(&mut self) -> CompileResult<Expr> {
        self.parse_binary(1)
    }

    fn binary_op_binding(&self) -> Option<(u8, BinaryOp)> {
        match self.peek_kind() {
            TokenKind::Operator(Operator::OrOr) => Some((1, BinaryOp::Or)),
            TokenKind::Operator(Operator::AndAnd) => Some((2, BinaryOp::And)),
            TokenKind::Operator(Operator::Pipe) => Some((3, BinaryOp::BitOr)),
            TokenKind::Operator(Operator::Caret) => Some((4, BinaryOp::BitXor)),
            TokenKind::Operator(Operator::Amp) => Some((5, BinaryOp::BitAnd)),
            TokenKind::Operator(Operator::EqEq) => Some((6, BinaryOp::Eq)),
            TokenKind::Operator(Operator::NotEq) => Some((6, BinaryOp::NotEq)),
            TokenKind::Operator(Operator::Lt) => Some((7, BinaryOp::Lt)),
            TokenKind::Operator(Operator::Gt) => Some((7, BinaryOp::Gt)),
            TokenKind::Operator(Operator::LtEq) => Some((7, BinaryOp::LtEq)),
            TokenKind::Operator(Operator::GtEq) => Some((7, BinaryOp::GtEq)),
            TokenKind::Operator(Operator::Shl) => Some((8, BinaryOp::Shl)),
            TokenKind::Operator(Operator::Shr) => Some((8, BinaryOp::Shr)),
            TokenKind::Operator(Operator::Plus) => Some((9, BinaryOp::Add)),
            TokenKind::Operator(Operator::Minus) => Some((9, BinaryOp::Sub)),
            TokenKind::Operator(Operator::Star) => Some((10, BinaryOp::Mul)),
            TokenKind::Operator(Operator::Slash) => Some((10, BinaryOp::Div)),
            TokenKind::Operator(Operator::Percent) => Some((10, BinaryOp::Rem)),
            _ => None,
        }
    }

    fn parse_binary(&mut self, min_prec: u8) -> CompileResult<Expr> {
        let mut lhs = self.parse_range()?;
        while let Some((prec, op)) = self.binary_op_binding() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span);
        }
        Ok(lhs)
    }

    /// `..` sits below additive precedence but is not itself a `BinaryOp`
    /// (spec §3 models it as a distinct `Range` expression), so it gets its
    /// own level between logical-or and the rest of `parse_binary`.
    fn parse_range(&mut self) -> CompileResult<Expr> {
        let lo = self.parse_unary()?;
        if self.eat_operator(Operator::DotDot) {
            let hi = self.parse_unary()?;
            let span = lo.span.to(hi.span);
            return Ok(Expr::new(ExprKind::Range(Box::new(lo), Box::new(hi)), span));
        }
        Ok(lo)
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let start = self.current_span();
        if self.eat_operator(Operator::Minus) {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expr::new(ExprKind::Unary(UnaryOp::Neg, Box::new(operand)), span));
        }
        if self.eat_operator(Operator::Bang) {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expr::new(ExprKind::Unary(UnaryOp::Not, Box::new(operand)), span));
        }
        if self.eat_operator(Operator::Tilde) {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expr::new(ExprKind::Unary(UnaryOp::BitNot, Box::new(operand)), span));
        }
        if self.eat_operator(Operator::Amp) {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expr::new(ExprKind::AddressOf(Box::new(operand)), span));
        }
        if self.eat_operator(Operator::Star) {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expr::new(ExprKind::Dereference(Box::new(operand)), span));
        }
        if let Some(cast) = self.try_parse_cast()? {
            return Ok(cast);
        }
        self.parse_postfix()
    }

    /// `(Type) expr` — tentative: only committed to if the parenthesized
    /// content parses as a complete type and is immediately followed by
    /// something that can start an expression.
    fn try_parse_cast(&mut self) -> CompileResult<Option<Expr>> {
        if !self.check_punct(Punct::LParen) {
            return Ok(None);
        }
        let checkpoint = self.pos;
        let start = self.current_span();
        self.advance();
        let Ok(ty) = self.parse_type_expr() else {
            self.pos = checkpoint;
            return Ok(None);
        };
        if !self.eat_punct(Punct::RParen) || !self.starts_expression() {
            self.pos = checkpoint;
            return Ok(None);
        }
        let operand = self.parse_unary()?;
        let span = start.to(operand.span);
        Ok(Some(Expr::new(ExprKind::Cast(ty, Box::new(operand)), span)))
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Identifier
                | TokenKind::Literal(_)
                | TokenKind::Punct(Punct::LParen)
                | TokenKind::Operator(Operator::Amp | Operator::Star | Operator::Minus | Operator::Bang | Operator::Tilde)
                | TokenKind::Keyword(Keyword::True | Keyword::False | Keyword::Null | Keyword::This)
        )
    }

    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(Punct::LParen) {
                let args = self.parse_arg_list()?;
                self.expect_punct(Punct::RParen)?;
                let span = expr.span.to(self.current_span());
                expr = Expr::new(ExprKind::Call(Box::new(expr), args), span);
                continue;
            }
            if self.eat_operator(Operator::Dot) {
                let (name, name_span) = self.expect_identifier()?;
                if self.eat_punct(Punct::LParen) {
                    let args = self.parse_arg_list()?;
                    self.expect_punct(Punct::RParen)?;
                    let span = expr.span.to(self.current_span());
                    expr = Expr::new(ExprKind::MethodCall(Box::new(expr), name, args), span);
                } else {
                    let span = expr.span.to(name_span);
                    expr = Expr::new(ExprKind::MemberAccess(Box::new(expr), name), span);
                }
                continue;
            }
            if self.eat_operator(Operator::Arrow) {
                let type_name = match &expr.kind {
                    ExprKind::Variable(name) => name.clone(),
                    _ => return self.unexpected("static call target must be a type name".to_owned()),
                };
                let (method, _) = self.expect_identifier()?;
                self.expect_punct(Punct::LParen)?;
                let args = self.parse_arg_list()?;
                self.expect_punct(Punct::RParen)?;
                let span = expr.span.to(self.current_span());
                expr = Expr::new(ExprKind::StaticCall(TypeExpr::Named(type_name), method, args), span);
                continue;
            }
            if self.eat_punct(Punct::LBracket) {
                let index = self.parse_expr()?;
                self.expect_punct(Punct::RBracket)?;
                let span = expr.span.to(self.current_span());
                expr = Expr::new(ExprKind::ArrayAccess(Box::new(expr), Box::new(index)), span);
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_arg_list(&mut self) -> CompileResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.check_punct(Punct::RParen) {
            args.push(self.parse_expr()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Literal(Literal::Int(value)) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(value), span))
            }
            TokenKind::Literal(Literal::Float(value)) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(value), span))
            }
            TokenKind::Literal(Literal::Str(value)) => {
                self.advance();
                Ok(Expr::new(ExprKind::String(value), span))
            }
            TokenKind::Literal(Literal::Char(value)) => {
                self.advance();
                Ok(Expr::new(ExprKind::Char(value), span))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), span))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), span))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, span))
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(Expr::new(ExprKind::Variable("this".to_owned()), span))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(inner)
            }
            TokenKind::Punct(Punct::LBrace) => self.parse_brace_literal(),
            TokenKind::Identifier => {
                let (name, name_span) = self.expect_identifier()?;
                if !self.no_struct_literal && self.check_punct(Punct::LBrace) {
                    return self.parse_struct_literal(name, name_span);
                }
                Ok(Expr::new(ExprKind::Variable(name), name_span))
            }
            _ => self.unexpected("expected an expression".to_owned()),
        }
    }

    fn parse_struct_literal(&mut self, name: String, start: Span) -> CompileResult<Expr> {
        self.advance();
        let mut fields = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            let (field_name, _) = self.expect_identifier()?;
            self.expect_punct(Punct::Colon)?;
            let value = self.parse_expr()?;
            fields.push(StructLiteralField { name: field_name, value });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)?;
        let span = start.to(self.current_span());
        Ok(Expr::new(ExprKind::StructLiteral(name, fields), span))
    }

    /// A bare `{ ... }` literal is an array unless its first entry is
    /// followed by `:`, in which case it's a map (spec §3 `ArrayLiteral`,
    /// `MapLiteral`); struct literals are only reached via
    /// `parse_struct_literal`, which requires a preceding type name.
    fn parse_brace_literal(&mut self) -> CompileResult<Expr> {
        let start = self.current_span();
        self.advance();
        if self.check_punct(Punct::RBrace) {
            self.advance();
            return Ok(Expr::new(ExprKind::ArrayLiteral(Vec::new()), start.to(self.current_span())));
        }
        let first = self.parse_expr()?;
        if self.eat_punct(Punct::Colon) {
            let first_value = self.parse_expr()?;
            let mut pairs = vec![(first, first_value)];
            while self.eat_punct(Punct::Comma) {
                if self.check_punct(Punct::RBrace) {
                    break;
                }
                let key = self.parse_expr()?;
                self.expect_punct(Punct::Colon)?;
                let value = self.parse_expr()?;
                pairs.push((key, value));
            }
            self.expect_punct(Punct::RBrace)?;
            return Ok(Expr::new(ExprKind::MapLiteral(pairs), start.to(self.current_span())));
        }
        let mut elems = vec![first];
        while self.eat_punct(Punct::Comma) {
            if self.check_punct(Punct::RBrace) {
                break;
            }
            elems.push(self.parse_expr()?);
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(Expr::new(ExprKind::ArrayLiteral(elems), start.to(self.current_span())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;

    fn parse(source: &str) -> Program {
        Parser::new(source, Strict).parse_program().expect("parses")
    }

    #[test]
    fn parses_hello_world() {
        let program = parse(r#"int main() { print("Hello"); ret 0; }"#);
        assert_eq!(program.statements.len(), 1);
        let StmtKind::FunctionDef(def) = &program.statements[0].kind else { panic!("expected function") };
        assert_eq!(def.name, "main");
        assert_eq!(def.body.len(), 2);
    }

    #[test]
    fn parses_struct_with_method() {
        let program = parse(
            "struct P { data { int x; } } impl P { int get(this) { ret this.x; } } \
             int main() { var p = P { x: 42 }; print(p.get()); ret 0; }",
        );
        assert_eq!(program.statements.len(), 3);
        assert!(matches!(program.statements[0].kind, StmtKind::StructDef(..)));
        assert!(matches!(program.statements[1].kind, StmtKind::ImplBlock(..)));
    }

    #[test]
    fn parses_range_for_with_break() {
        let program = parse("int main() { for i in 0..10 { if i == 3 { break; } print(i); } ret 0; }");
        let StmtKind::FunctionDef(def) = &program.statements[0].kind else { panic!("expected function") };
        assert!(matches!(def.body[0].kind, StmtKind::For(..)));
    }

    #[test]
    fn parses_array_literal_and_push() {
        let program = parse("int main() { var a: int[] = { 1, 2, 3 }; a = array_push(a, &4, 4); ret 0; }");
        let StmtKind::FunctionDef(def) = &program.statements[0].kind else { panic!("expected function") };
        assert!(matches!(def.body[0].kind, StmtKind::VarDecl(Some(TypeExpr::Array(..)), _, Some(_))));
        assert!(matches!(def.body[1].kind, StmtKind::Assign(..)));
    }

    #[test]
    fn precedence_binds_multiplicative_tighter_than_additive() {
        let program = parse("int main() { var a = 1 + 2 * 3; ret 0; }");
        let StmtKind::FunctionDef(def) = &program.statements[0].kind else { panic!("expected function") };
        let StmtKind::VarDecl(_, _, Some(init)) = &def.body[0].kind else { panic!("expected var decl") };
        let ExprKind::Binary(BinaryOp::Add, _, rhs) = &init.kind else { panic!("expected add at top") };
        assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Mul, ..)));
    }
}
