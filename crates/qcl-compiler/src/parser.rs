//! Recursive-descent parser for the QCL source language.

use num_bigint::BigInt;

use crate::ast::*;
use crate::error::{CompileError, Point};
use crate::lexer::{tokenize, Lexeme, Token};

/// Parse one source file into (or merging into) a package.
pub fn parse(source: &str, data: &str, mut pkg: Package) -> Result<Package, CompileError> {
    let lexemes = tokenize(source, data)?;
    let mut parser = Parser { lexemes, at: 0 };
    parser.file(&mut pkg)?;
    Ok(pkg)
}

struct Parser {
    lexemes: Vec<Lexeme>,
    at: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.lexemes.get(self.at).map(|l| &l.token)
    }

    fn point(&self) -> Point {
        self.lexemes
            .get(self.at.min(self.lexemes.len().saturating_sub(1)))
            .map(|l| l.point.clone())
            .unwrap_or_default()
    }

    fn bump(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.at).cloned();
        if lexeme.is_some() {
            self.at += 1;
        }
        lexeme
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<Point, CompileError> {
        let point = self.point();
        match self.bump() {
            Some(l) if l.token == token => Ok(l.point),
            Some(l) => Err(CompileError::user(
                &l.point,
                format!("expected '{token}', found '{}'", l.token),
            )),
            None => Err(CompileError::user(
                &point,
                format!("expected '{token}', found end of file"),
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Point), CompileError> {
        let point = self.point();
        match self.bump() {
            Some(Lexeme {
                token: Token::Ident(name),
                point,
            }) => Ok((name, point)),
            Some(l) => Err(CompileError::user(
                &l.point,
                format!("expected identifier, found '{}'", l.token),
            )),
            None => Err(CompileError::user(&point, "expected identifier")),
        }
    }

    fn skip_semicolons(&mut self) {
        while self.eat(&Token::Semicolon) {}
    }

    fn file(&mut self, pkg: &mut Package) -> Result<(), CompileError> {
        self.skip_semicolons();
        self.expect(Token::Package)?;
        let (name, point) = self.expect_ident()?;
        if pkg.name.is_empty() {
            pkg.name = name;
        } else if pkg.name != name {
            return Err(CompileError::user(
                &point,
                format!("package name '{name}' does not match '{}'", pkg.name),
            ));
        }
        self.skip_semicolons();

        while let Some(token) = self.peek() {
            match token {
                Token::Import => self.imports(pkg)?,
                Token::Const => {
                    let decl = self.const_decl()?;
                    pkg.consts.push(decl);
                }
                Token::Func => {
                    let func = self.func()?;
                    pkg.funcs.push(func);
                }
                Token::Semicolon => {
                    self.bump();
                }
                _ => {
                    let point = self.point();
                    return Err(CompileError::user(
                        &point,
                        format!("unexpected '{token}' at top level"),
                    ));
                }
            }
            self.skip_semicolons();
        }
        Ok(())
    }

    fn imports(&mut self, pkg: &mut Package) -> Result<(), CompileError> {
        self.expect(Token::Import)?;
        let mut one = |parser: &mut Self, pkg: &mut Package| -> Result<(), CompileError> {
            let point = parser.point();
            match parser.bump() {
                Some(Lexeme {
                    token: Token::Str(path),
                    ..
                }) => {
                    let alias = path.rsplit('/').next().unwrap_or(&path).to_string();
                    pkg.imports.push((alias, path));
                    Ok(())
                }
                _ => Err(CompileError::user(&point, "expected import path string")),
            }
        };
        if self.eat(&Token::LParen) {
            self.skip_semicolons();
            while self.peek() != Some(&Token::RParen) {
                one(self, pkg)?;
                self.skip_semicolons();
            }
            self.expect(Token::RParen)?;
        } else {
            one(self, pkg)?;
        }
        Ok(())
    }

    fn const_decl(&mut self) -> Result<ConstDecl, CompileError> {
        self.expect(Token::Const)?;
        let (name, point) = self.expect_ident()?;
        self.expect(Token::Assign)?;
        let init = self.expr()?;
        Ok(ConstDecl { name, init, point })
    }

    fn func(&mut self) -> Result<Func, CompileError> {
        let point = self.expect(Token::Func)?;
        let (name, _) = self.expect_ident()?;
        self.expect(Token::LParen)?;
        let params = self.params()?;
        self.expect(Token::RParen)?;

        let mut results = Vec::new();
        match self.peek() {
            Some(Token::LBrace) => {}
            Some(Token::LParen) => {
                self.bump();
                loop {
                    let point = self.point();
                    let typ = self.type_expr()?;
                    results.push(Param {
                        name: String::new(),
                        typ,
                        point,
                    });
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
            }
            _ => {
                let point = self.point();
                let typ = self.type_expr()?;
                results.push(Param {
                    name: String::new(),
                    typ,
                    point,
                });
            }
        }

        let body = self.block()?;
        Ok(Func {
            name,
            params,
            results,
            body,
            point,
        })
    }

    /// Parameter lists share trailing types: `a, b uint8, c bool`.
    fn params(&mut self) -> Result<Vec<Param>, CompileError> {
        let mut params = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            return Ok(params);
        }
        loop {
            let mut names = Vec::new();
            loop {
                let (name, point) = self.expect_ident()?;
                names.push((name, point));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            let typ = self.type_expr()?;
            for (name, point) in names {
                params.push(Param {
                    name,
                    typ: typ.clone(),
                    point,
                });
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn type_expr(&mut self) -> Result<TypeExpr, CompileError> {
        let point = self.point();
        if self.eat(&Token::LBracket) {
            let len = self.expr()?;
            self.expect(Token::RBracket)?;
            let elem = self.type_expr()?;
            return Ok(TypeExpr::Array {
                len: Box::new(len),
                elem: Box::new(elem),
            });
        }
        let (name, point) = match self.bump() {
            Some(Lexeme {
                token: Token::Ident(name),
                point,
            }) => (name, point),
            _ => return Err(CompileError::user(&point, "expected type")),
        };
        scalar_type(&name)
            .ok_or_else(|| CompileError::user(&point, format!("unknown type '{name}'")))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        self.skip_semicolons();
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                let point = self.point();
                return Err(CompileError::user(&point, "unterminated block"));
            }
            stmts.push(self.stmt()?);
            self.skip_semicolons();
        }
        self.expect(Token::RBrace)?;
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt, CompileError> {
        match self.peek() {
            Some(Token::Var) => self.var_stmt(),
            Some(Token::If) => self.if_stmt(),
            Some(Token::For) => self.for_stmt(),
            Some(Token::Return) => self.return_stmt(),
            _ => self.simple_stmt(),
        }
    }

    fn var_stmt(&mut self) -> Result<Stmt, CompileError> {
        let point = self.expect(Token::Var)?;
        let mut names = Vec::new();
        loop {
            let (name, _) = self.expect_ident()?;
            names.push(name);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let typ = self.type_expr()?;
        let init = if self.eat(&Token::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Stmt::Var {
            names,
            typ,
            init,
            point,
        })
    }

    fn if_stmt(&mut self) -> Result<Stmt, CompileError> {
        let point = self.expect(Token::If)?;
        let cond = self.expr()?;
        let then = self.block()?;
        let els = if self.eat(&Token::Else) {
            if self.peek() == Some(&Token::If) {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            els,
            point,
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt, CompileError> {
        let point = self.expect(Token::For)?;
        let init = self.simple_stmt()?;
        self.expect(Token::Semicolon)?;
        let cond = self.expr()?;
        self.expect(Token::Semicolon)?;
        let post = self.simple_stmt()?;
        let body = self.block()?;
        Ok(Stmt::For {
            init: Box::new(init),
            cond,
            post: Box::new(post),
            body,
            point,
        })
    }

    fn return_stmt(&mut self) -> Result<Stmt, CompileError> {
        let point = self.expect(Token::Return)?;
        let mut values = Vec::new();
        if !matches!(self.peek(), Some(Token::Semicolon) | Some(Token::RBrace)) {
            loop {
                values.push(self.expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        Ok(Stmt::Return { values, point })
    }

    /// Assignments, define statements, inc/dec and expression
    /// statements.
    fn simple_stmt(&mut self) -> Result<Stmt, CompileError> {
        let point = self.point();
        let first = self.expr()?;

        match self.peek() {
            Some(Token::Define) | Some(Token::Assign) | Some(Token::Comma) => {
                let mut targets = vec![lvalue(first)?];
                while self.eat(&Token::Comma) {
                    targets.push(lvalue(self.expr()?)?);
                }
                let define = match self.bump() {
                    Some(Lexeme {
                        token: Token::Define,
                        ..
                    }) => true,
                    Some(Lexeme {
                        token: Token::Assign,
                        ..
                    }) => false,
                    _ => {
                        return Err(CompileError::user(&point, "expected ':=' or '='"));
                    }
                };
                let mut values = vec![self.expr()?];
                while self.eat(&Token::Comma) {
                    values.push(self.expr()?);
                }
                Ok(Stmt::Assign {
                    targets,
                    op: None,
                    values,
                    define,
                    point,
                })
            }
            Some(Token::PlusPlus) | Some(Token::MinusMinus) => {
                let op = if self.bump().unwrap().token == Token::PlusPlus {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                Ok(Stmt::Assign {
                    targets: vec![lvalue(first)?],
                    op: Some(op),
                    values: vec![Expr::Int(BigInt::from(1), point.clone())],
                    define: false,
                    point,
                })
            }
            Some(token) if compound_op(token).is_some() => {
                let op = compound_op(token).unwrap();
                self.bump();
                let value = self.expr()?;
                Ok(Stmt::Assign {
                    targets: vec![lvalue(first)?],
                    op: Some(op),
                    values: vec![value],
                    define: false,
                    point,
                })
            }
            _ => Ok(Stmt::Expr(first)),
        }
    }

    fn expr(&mut self) -> Result<Expr, CompileError> {
        self.binary_expr(1)
    }

    fn binary_expr(&mut self, min_prec: u8) -> Result<Expr, CompileError> {
        let mut left = self.unary_expr()?;
        while let Some(token) = self.peek() {
            let Some((op, prec)) = binary_op(token) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            let point = self.point();
            self.bump();
            let right = self.binary_expr(prec + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                point,
            };
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<Expr, CompileError> {
        let point = self.point();
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Not) => Some(UnaryOp::Not),
            Some(Token::Caret) => Some(UnaryOp::Complement),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let expr = self.unary_expr()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
                point,
            });
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    let point = self.point();
                    self.bump();
                    // Either an index or a slice.
                    let lo = if self.peek() == Some(&Token::Colon) {
                        None
                    } else {
                        Some(Box::new(self.expr()?))
                    };
                    if self.eat(&Token::Colon) {
                        let hi = if self.peek() == Some(&Token::RBracket) {
                            None
                        } else {
                            Some(Box::new(self.expr()?))
                        };
                        self.expect(Token::RBracket)?;
                        expr = Expr::Slice {
                            expr: Box::new(expr),
                            lo,
                            hi,
                            point,
                        };
                    } else {
                        self.expect(Token::RBracket)?;
                        expr = Expr::Index {
                            expr: Box::new(expr),
                            index: lo.expect("index expression"),
                            point,
                        };
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary_expr(&mut self) -> Result<Expr, CompileError> {
        let point = self.point();
        match self.bump() {
            Some(Lexeme {
                token: Token::Int(value),
                point,
            }) => Ok(Expr::Int(value, point)),
            Some(Lexeme {
                token: Token::Str(value),
                point,
            }) => Ok(Expr::Str(value, point)),
            Some(Lexeme {
                token: Token::True,
                point,
            }) => Ok(Expr::Bool(true, point)),
            Some(Lexeme {
                token: Token::False,
                point,
            }) => Ok(Expr::Bool(false, point)),
            Some(Lexeme {
                token: Token::LParen,
                ..
            }) => {
                let expr = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Lexeme {
                token: Token::Ident(name),
                point,
            }) => {
                let name = if self.eat(&Token::Dot) {
                    let (member, _) = self.expect_ident()?;
                    Name {
                        package: Some(name),
                        name: member,
                    }
                } else {
                    Name::plain(name)
                };
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call { name, args, point })
                } else {
                    Ok(Expr::Name(name, point))
                }
            }
            Some(l) => Err(CompileError::user(
                &l.point,
                format!("unexpected '{}' in expression", l.token),
            )),
            None => Err(CompileError::user(&point, "unexpected end of file")),
        }
    }
}

fn lvalue(expr: Expr) -> Result<LValue, CompileError> {
    match expr {
        Expr::Name(name, point) => Ok(LValue::Name(name, point)),
        Expr::Index { expr, index, point } => match *expr {
            Expr::Name(name, _) => Ok(LValue::Index {
                name,
                index: *index,
                point,
            }),
            other => Err(CompileError::user(
                other.point(),
                "cannot assign through this expression",
            )),
        },
        other => Err(CompileError::user(
            other.point(),
            "expression is not assignable",
        )),
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    Some(match token {
        Token::OrOr => (BinaryOp::Or, 1),
        Token::AndAnd => (BinaryOp::And, 2),
        Token::EqEq => (BinaryOp::Eq, 3),
        Token::NotEq => (BinaryOp::Neq, 3),
        Token::Lt => (BinaryOp::Lt, 3),
        Token::Le => (BinaryOp::Le, 3),
        Token::Gt => (BinaryOp::Gt, 3),
        Token::Ge => (BinaryOp::Ge, 3),
        Token::Plus => (BinaryOp::Add, 4),
        Token::Minus => (BinaryOp::Sub, 4),
        Token::Pipe => (BinaryOp::Bor, 4),
        Token::Caret => (BinaryOp::Bxor, 4),
        Token::Star => (BinaryOp::Mul, 5),
        Token::Slash => (BinaryOp::Div, 5),
        Token::Percent => (BinaryOp::Mod, 5),
        Token::Amp => (BinaryOp::Band, 5),
        Token::Shl => (BinaryOp::Shl, 5),
        Token::Shr => (BinaryOp::Shr, 5),
        _ => return None,
    })
}

fn compound_op(token: &Token) -> Option<BinaryOp> {
    Some(match token {
        Token::PlusAssign => BinaryOp::Add,
        Token::MinusAssign => BinaryOp::Sub,
        Token::StarAssign => BinaryOp::Mul,
        Token::SlashAssign => BinaryOp::Div,
        Token::PercentAssign => BinaryOp::Mod,
        Token::AmpAssign => BinaryOp::Band,
        Token::PipeAssign => BinaryOp::Bor,
        Token::CaretAssign => BinaryOp::Bxor,
        Token::ShlAssign => BinaryOp::Shl,
        Token::ShrAssign => BinaryOp::Shr,
        _ => return None,
    })
}

/// Parse a scalar type name.
pub fn scalar_type(name: &str) -> Option<TypeExpr> {
    match name {
        "bool" => return Some(TypeExpr::Bool),
        "string" => return Some(TypeExpr::Str),
        "int" => return Some(TypeExpr::Int(0)),
        "uint" => return Some(TypeExpr::Uint(0)),
        _ => {}
    }
    if let Some(bits) = name.strip_prefix("int") {
        return bits.parse().ok().map(TypeExpr::Int);
    }
    if let Some(bits) = name.strip_prefix("uint") {
        return bits.parse().ok().map(TypeExpr::Uint);
    }
    None
}
