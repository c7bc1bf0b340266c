//! Tokenizer for rule scripts.

use crate::error::LogicError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    LParen,
    RParen,
    Comma,
    Assign,
    EqEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Pipe,
    /// Statement separator: a newline outside parentheses, or `;`.
    Separator,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, LogicError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        depth: 0,
        out: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.out)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    /// Parenthesis nesting; newlines inside parentheses are whitespace.
    depth: usize,
    out: Vec<Spanned>,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn push(&mut self, token: Token) {
        self.out.push(Spanned { token, line: self.line });
    }

    fn error(&self, message: impl Into<String>) -> LogicError {
        LogicError::Parse { line: self.line, message: message.into() }
    }

    fn run(&mut self) -> Result<(), LogicError> {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    if self.depth == 0 {
                        self.push(Token::Separator);
                    }
                    self.line += 1;
                    self.pos += 1;
                }
                ';' => {
                    self.push(Token::Separator);
                    self.pos += 1;
                }
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                c if c.is_whitespace() => self.pos += 1,
                '(' => {
                    self.depth += 1;
                    self.single(Token::LParen);
                }
                ')' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.single(Token::RParen);
                }
                ',' => self.single(Token::Comma),
                '+' => self.single(Token::Plus),
                '-' => self.single(Token::Minus),
                '*' => self.single(Token::Star),
                '/' => self.single(Token::Slash),
                '&' => self.single(Token::Amp),
                '|' => self.single(Token::Pipe),
                '=' => self.either('=', Token::EqEq, Token::Assign),
                '<' => self.either('=', Token::Le, Token::Lt),
                '>' => self.either('=', Token::Ge, Token::Gt),
                '"' | '\'' => self.string(c)?,
                c if c.is_ascii_digit() || (c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit())) => {
                    self.number()?
                }
                c if c.is_alphabetic() || c == '_' => self.ident(),
                other => return Err(self.error(format!("unexpected character {other:?}"))),
            }
        }
        self.push(Token::Eof);
        Ok(())
    }

    fn single(&mut self, token: Token) {
        self.push(token);
        self.pos += 1;
    }

    fn either(&mut self, next: char, paired: Token, alone: Token) {
        if self.peek_next() == Some(next) {
            self.push(paired);
            self.pos += 2;
        } else {
            self.single(alone);
        }
    }

    fn string(&mut self, quote: char) -> Result<(), LogicError> {
        let start_line = self.line;
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(LogicError::Parse {
                        line: start_line,
                        message: "unterminated string".into(),
                    })
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        self.pos += 1;
                    }
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
        self.out.push(Spanned { token: Token::Str(text), line: start_line });
        Ok(())
    }

    fn number(&mut self) -> Result<(), LogicError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        let value = literal
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number {literal:?}")))?;
        self.push(Token::Number(value));
        Ok(())
    }

    fn ident(&mut self) {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let token = match word.as_str() {
            "true" | "True" => Token::True,
            "false" | "False" => Token::False,
            _ => Token::Ident(word),
        };
        self.push(token);
    }
}
