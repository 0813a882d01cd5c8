//! Lexer for the QCL source language.
//!
//! Go-style tokenization with automatic semicolon insertion at line
//! ends after tokens that can terminate a statement.

use num_bigint::BigInt;
use num_traits::Num;

use crate::error::{CompileError, Point};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Int(BigInt),
    Str(String),

    // Keywords.
    Package,
    Import,
    Func,
    Var,
    Const,
    If,
    Else,
    For,
    Return,
    True,
    False,

    // Punctuation.
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,

    // Operators.
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    Not,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    Assign,
    Define,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    PlusPlus,
    MinusMinus,
}

impl Token {
    /// Tokens after which a newline terminates the statement.
    fn ends_statement(&self) -> bool {
        matches!(
            self,
            Token::Ident(_)
                | Token::Int(_)
                | Token::Str(_)
                | Token::True
                | Token::False
                | Token::Return
                | Token::RParen
                | Token::RBrace
                | Token::RBracket
                | Token::PlusPlus
                | Token::MinusMinus
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{name}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Semicolon => write!(f, "newline"),
            other => write!(f, "{}", token_text(other)),
        }
    }
}

fn token_text(token: &Token) -> &'static str {
    match token {
        Token::Package => "package",
        Token::Import => "import",
        Token::Func => "func",
        Token::Var => "var",
        Token::Const => "const",
        Token::If => "if",
        Token::Else => "else",
        Token::For => "for",
        Token::Return => "return",
        Token::True => "true",
        Token::False => "false",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::LBracket => "[",
        Token::RBracket => "]",
        Token::Comma => ",",
        Token::Colon => ":",
        Token::Dot => ".",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Percent => "%",
        Token::Amp => "&",
        Token::Pipe => "|",
        Token::Caret => "^",
        Token::Shl => "<<",
        Token::Shr => ">>",
        Token::AndAnd => "&&",
        Token::OrOr => "||",
        Token::Not => "!",
        Token::Lt => "<",
        Token::Gt => ">",
        Token::Le => "<=",
        Token::Ge => ">=",
        Token::EqEq => "==",
        Token::NotEq => "!=",
        Token::Assign => "=",
        Token::Define => ":=",
        Token::PlusAssign => "+=",
        Token::MinusAssign => "-=",
        Token::StarAssign => "*=",
        Token::SlashAssign => "/=",
        Token::PercentAssign => "%=",
        Token::AmpAssign => "&=",
        Token::PipeAssign => "|=",
        Token::CaretAssign => "^=",
        Token::ShlAssign => "<<=",
        Token::ShrAssign => ">>=",
        Token::PlusPlus => "++",
        Token::MinusMinus => "--",
        _ => "?",
    }
}

/// A token with its source position.
#[derive(Debug, Clone)]
pub struct Lexeme {
    pub token: Token,
    pub point: Point,
}

/// Tokenize a whole source file.
pub fn tokenize(source: &str, data: &str) -> Result<Vec<Lexeme>, CompileError> {
    let mut lexer = Lexer {
        source,
        chars: data.chars().collect(),
        at: 0,
        line: 1,
        col: 1,
        out: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.out)
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    at: usize,
    line: usize,
    col: usize,
    out: Vec<Lexeme>,
}

impl Lexer<'_> {
    fn point(&self) -> Point {
        Point::new(self.source, self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.at).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.at + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.at += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, token: Token, point: Point) {
        self.out.push(Lexeme { token, point });
    }

    fn maybe_semicolon(&mut self, point: Point) {
        if self
            .out
            .last()
            .is_some_and(|l| l.token.ends_statement())
        {
            self.push(Token::Semicolon, point);
        }
    }

    fn run(&mut self) -> Result<(), CompileError> {
        while let Some(c) = self.peek() {
            let point = self.point();
            match c {
                '\n' => {
                    self.bump();
                    self.maybe_semicolon(point);
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '/' if self.peek2() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '/' if self.peek2() == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek2()) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(CompileError::user(&point, "unterminated comment"))
                            }
                        }
                    }
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            name.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let token = match name.as_str() {
                        "package" => Token::Package,
                        "import" => Token::Import,
                        "func" => Token::Func,
                        "var" => Token::Var,
                        "const" => Token::Const,
                        "if" => Token::If,
                        "else" => Token::Else,
                        "for" => Token::For,
                        "return" => Token::Return,
                        "true" => Token::True,
                        "false" => Token::False,
                        _ => Token::Ident(name),
                    };
                    self.push(token, point);
                }
                c if c.is_ascii_digit() => {
                    let token = self.number(&point)?;
                    self.push(token, point);
                }
                '"' => {
                    let token = self.string(&point)?;
                    self.push(token, point);
                }
                _ => {
                    let token = self.operator(&point)?;
                    self.push(token, point);
                }
            }
        }
        // Terminate a trailing statement on EOF.
        let point = self.point();
        self.maybe_semicolon(point);
        Ok(())
    }

    fn number(&mut self, point: &Point) -> Result<Token, CompileError> {
        let mut digits = String::new();
        let radix = if self.peek() == Some('0') && matches!(self.peek2(), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            16
        } else if self.peek() == Some('0') && matches!(self.peek2(), Some('b') | Some('B')) {
            self.bump();
            self.bump();
            2
        } else {
            10
        };
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() || c == '_' {
                if c != '_' {
                    digits.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }
        BigInt::from_str_radix(&digits, radix)
            .map(Token::Int)
            .map_err(|_| CompileError::user(point, format!("malformed number literal '{digits}'")))
    }

    fn string(&mut self, point: &Point) -> Result<Token, CompileError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Token::Str(value)),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('0') => value.push('\0'),
                    _ => return Err(CompileError::user(point, "bad escape in string literal")),
                },
                Some('\n') | None => {
                    return Err(CompileError::user(point, "unterminated string literal"))
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn operator(&mut self, point: &Point) -> Result<Token, CompileError> {
        let c = self.bump().unwrap();
        let next = self.peek();
        let mut two = |lexer: &mut Self, token| {
            lexer.bump();
            token
        };
        let token = match (c, next) {
            ('(', _) => Token::LParen,
            (')', _) => Token::RParen,
            ('{', _) => Token::LBrace,
            ('}', _) => Token::RBrace,
            ('[', _) => Token::LBracket,
            (']', _) => Token::RBracket,
            (',', _) => Token::Comma,
            (';', _) => Token::Semicolon,
            ('.', _) => Token::Dot,
            (':', Some('=')) => two(self, Token::Define),
            (':', _) => Token::Colon,
            ('+', Some('+')) => two(self, Token::PlusPlus),
            ('+', Some('=')) => two(self, Token::PlusAssign),
            ('+', _) => Token::Plus,
            ('-', Some('-')) => two(self, Token::MinusMinus),
            ('-', Some('=')) => two(self, Token::MinusAssign),
            ('-', _) => Token::Minus,
            ('*', Some('=')) => two(self, Token::StarAssign),
            ('*', _) => Token::Star,
            ('/', Some('=')) => two(self, Token::SlashAssign),
            ('/', _) => Token::Slash,
            ('%', Some('=')) => two(self, Token::PercentAssign),
            ('%', _) => Token::Percent,
            ('&', Some('&')) => two(self, Token::AndAnd),
            ('&', Some('=')) => two(self, Token::AmpAssign),
            ('&', _) => Token::Amp,
            ('|', Some('|')) => two(self, Token::OrOr),
            ('|', Some('=')) => two(self, Token::PipeAssign),
            ('|', _) => Token::Pipe,
            ('^', Some('=')) => two(self, Token::CaretAssign),
            ('^', _) => Token::Caret,
            ('<', Some('<')) => {
                self.bump();
                if self.peek() == Some('=') {
                    two(self, Token::ShlAssign)
                } else {
                    Token::Shl
                }
            }
            ('<', Some('=')) => two(self, Token::Le),
            ('<', _) => Token::Lt,
            ('>', Some('>')) => {
                self.bump();
                if self.peek() == Some('=') {
                    two(self, Token::ShrAssign)
                } else {
                    Token::Shr
                }
            }
            ('>', Some('=')) => two(self, Token::Ge),
            ('>', _) => Token::Gt,
            ('=', Some('=')) => two(self, Token::EqEq),
            ('=', _) => Token::Assign,
            ('!', Some('=')) => two(self, Token::NotEq),
            ('!', _) => Token::Not,
            _ => return Err(CompileError::user(point, format!("unexpected character '{c}'"))),
        };
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(data: &str) -> Vec<Token> {
        tokenize("test.qcl", data)
            .unwrap()
            .into_iter()
            .map(|l| l.token)
            .collect()
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            tokens("func main"),
            vec![Token::Func, Token::Ident("main".into()), Token::Semicolon]
        );
    }

    #[test]
    fn number_radices() {
        assert_eq!(
            tokens("15 0xF0 0b1101"),
            vec![
                Token::Int(BigInt::from(15)),
                Token::Int(BigInt::from(0xF0)),
                Token::Int(BigInt::from(13)),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn automatic_semicolons() {
        let toks = tokens("a = b\nreturn x\n");
        let semis = toks.iter().filter(|t| **t == Token::Semicolon).count();
        assert_eq!(semis, 2);
    }

    #[test]
    fn no_semicolon_after_operators() {
        let toks = tokens("a +\nb\n");
        assert_eq!(
            toks,
            vec![
                Token::Ident("a".into()),
                Token::Plus,
                Token::Ident("b".into()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let toks = tokens("a // comment\n/* block\ncomment */ b\n");
        assert_eq!(
            toks,
            vec![
                Token::Ident("a".into()),
                Token::Semicolon,
                Token::Ident("b".into()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            tokens("a <<= 1"),
            vec![
                Token::Ident("a".into()),
                Token::ShlAssign,
                Token::Int(BigInt::from(1)),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn positions_track_lines() {
        let lexemes = tokenize("t.qcl", "a\n  b").unwrap();
        assert_eq!(lexemes[0].point.line, 1);
        let b = lexemes.iter().find(|l| l.token == Token::Ident("b".into())).unwrap();
        assert_eq!(b.point.line, 2);
        assert_eq!(b.point.col, 3);
    }
}
