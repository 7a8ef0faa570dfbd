//! Lexical analysis: turns Pascal source text into a vector of tokens.
//!
//! Multi-character operators are matched before single-character ones.
//! Positions are tracked per character; a newline resets the column and
//! advances the line, every other character (tabs included) counts as one
//! column.

use crate::error::{CompileError, CompileResult};
use crate::token::{Pos, Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(1)
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn advance(&mut self) {
        let Some(c) = self.current() else {
            return;
        };
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    fn take_while(&mut self, into: &mut String, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.current() {
            if !pred(c) {
                break;
            }
            into.push(c);
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.current(), Some(' ' | '\t' | '\n' | '\r')) {
            self.advance();
        }
    }

    /// Skips one comment if the cursor sits on one. Comments do not nest.
    fn skip_comment(&mut self) -> CompileResult<bool> {
        match (self.current(), self.peek()) {
            (Some('{'), _) => {
                let start = self.here();
                self.advance();
                while let Some(c) = self.current() {
                    self.advance();
                    if c == '}' {
                        return Ok(true);
                    }
                }
                Err(CompileError::syntax("Unterminated comment", start))
            }
            (Some('('), Some('*')) => {
                let start = self.here();
                self.advance();
                self.advance();
                while self.current().is_some() {
                    if self.current() == Some('*') && self.peek() == Some(')') {
                        self.advance();
                        self.advance();
                        return Ok(true);
                    }
                    self.advance();
                }
                Err(CompileError::syntax("Unterminated comment", start))
            }
            (Some('/'), Some('/')) => {
                while self.current().is_some() && self.current() != Some('\n') {
                    self.advance();
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn read_number(&mut self) -> CompileResult<Token> {
        let start = self.here();
        let mut text = String::new();
        self.take_while(&mut text, |c| c.is_ascii_digit());

        // A '.' starts the fractional part only when a digit follows; '..'
        // is the range operator and ends the integer.
        if self.current() != Some('.') || self.peek() == Some('.') {
            return Ok(Token::new(TokenKind::IntLiteral, text, start));
        }
        if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return Err(CompileError::syntax("Invalid number", start));
        }
        text.push('.');
        self.advance();
        self.take_while(&mut text, |c| c.is_ascii_digit());

        if matches!(self.current(), Some('e' | 'E')) {
            let exponent_follows = match self.peek() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => matches!(self.peek_at(2), Some(c) if c.is_ascii_digit()),
                _ => false,
            };
            if exponent_follows {
                text.push('e');
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.current() {
                    text.push(sign);
                    self.advance();
                }
                self.take_while(&mut text, |c| c.is_ascii_digit());
            }
        }
        Ok(Token::new(TokenKind::RealLiteral, text, start))
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.here();
        let mut word = String::new();
        self.take_while(&mut word, |c| c.is_ascii_alphanumeric() || c == '_');
        let lower = word.to_ascii_lowercase();
        match TokenKind::keyword(&lower) {
            Some(kind) => Token::new(kind, lower, start),
            None => Token::new(TokenKind::Identifier, word, start),
        }
    }

    fn read_string(&mut self) -> CompileResult<Token> {
        let start = self.here();
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.current() {
                None | Some('\n') => {
                    return Err(CompileError::syntax("Unterminated string", start))
                }
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.advance();
                        self.advance();
                        value.push('\'');
                    } else {
                        self.advance();
                        return Ok(Token::new(TokenKind::StrLiteral, value, start));
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    pub fn tokenize(mut self) -> CompileResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            if self.skip_comment()? {
                continue;
            }
            let Some(c) = self.current() else {
                break;
            };
            let pos = self.here();

            if c.is_ascii_digit() {
                tokens.push(self.read_number()?);
                continue;
            }
            if c.is_ascii_alphabetic() {
                tokens.push(self.read_identifier());
                continue;
            }
            if c == '\'' {
                tokens.push(self.read_string()?);
                continue;
            }

            let two = match (c, self.peek()) {
                (':', Some('=')) => Some((TokenKind::Assign, ":=")),
                ('<', Some('=')) => Some((TokenKind::LessEqual, "<=")),
                ('>', Some('=')) => Some((TokenKind::GreaterEqual, ">=")),
                ('<', Some('>')) => Some((TokenKind::NotEqual, "<>")),
                ('.', Some('.')) => Some((TokenKind::DotDot, "..")),
                _ => None,
            };
            if let Some((kind, lexeme)) = two {
                self.advance();
                self.advance();
                tokens.push(Token::new(kind, lexeme, pos));
                continue;
            }

            let kind = match c {
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '=' => TokenKind::Equal,
                '<' => TokenKind::Less,
                '>' => TokenKind::Greater,
                ';' => TokenKind::Semicolon,
                ':' => TokenKind::Colon,
                ',' => TokenKind::Comma,
                '.' => TokenKind::Dot,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                _ => {
                    return Err(CompileError::syntax(
                        format!("Unexpected character '{c}'"),
                        pos,
                    ))
                }
            };
            self.advance();
            tokens.push(Token::new(kind, c.to_string(), pos));
        }

        tokens.push(Token::new(TokenKind::Eof, "", self.here()));
        Ok(tokens)
    }
}
