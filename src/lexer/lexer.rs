use crate::error::{CompileError, InternalError, Result};

use super::{
    token::{KEYWORDS, ONE_SYMBOL_TOKENS, TWO_SYMBOLS_TOKENS},
    Token, TokenKind,
};

/// Streaming scanner. The parser pulls one token at a time with [`Lexer::scan`]
/// and may hand back at most one token with [`Lexer::push_back`].
#[derive(Debug)]
pub struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    rejected: Option<Token>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            index: 0,
            line: 1,
            rejected: None,
        }
    }

    pub fn push_back(&mut self, token: Token) -> Result<()> {
        if self.rejected.is_some() {
            return Err(InternalError::DoublePushBack.into());
        }
        self.rejected = Some(token);
        Ok(())
    }

    /// Returns the next token, or a [`TokenKind::Eof`] token once the input
    /// is exhausted (repeatedly).
    pub fn scan(&mut self) -> Result<Token> {
        if let Some(token) = self.rejected.take() {
            return Ok(token);
        }

        self.skip_whitespace_and_comments()?;

        let Some(&c) = self.chars.get(self.index) else {
            return Ok(self.new_token(TokenKind::Eof, 0));
        };
        let c2 = self.chars[self.index..].iter().take(2).collect::<String>();

        if c.is_ascii_digit() {
            self.parse_number()
        } else if c.is_ascii_alphabetic() || c == '_' {
            Ok(self.parse_identifier())
        } else if c == '\'' {
            self.parse_char()
        } else if c == '"' {
            self.parse_string()
        } else if let Some(kind) = TWO_SYMBOLS_TOKENS.get(c2.as_str()) {
            Ok(self.new_token(kind.clone(), 2))
        } else if let Some(kind) = ONE_SYMBOL_TOKENS.get(&c) {
            Ok(self.new_token(kind.clone(), 1))
        } else {
            Err(self.error(format!("unexpected character '{}'", c)))
        }
    }

    fn new_token(&mut self, kind: TokenKind, len: usize) -> Token {
        self.index += len;
        Token {
            kind,
            line: self.line,
        }
    }

    fn error(&self, message: String) -> CompileError {
        CompileError::Syntax {
            line: self.line,
            message,
        }
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        while let Some(c) = self.peek_char(0) {
            match (c, self.peek_char(1)) {
                ('\n', _) => {
                    self.line += 1;
                    self.index += 1;
                }
                (c, _) if c.is_whitespace() => self.index += 1,
                ('/', Some('/')) => {
                    while self.peek_char(0).is_some_and(|c| c != '\n') {
                        self.index += 1;
                    }
                }
                ('/', Some('*')) => {
                    let start_line = self.line;
                    self.index += 2;
                    loop {
                        match (self.peek_char(0), self.peek_char(1)) {
                            (Some('*'), Some('/')) => {
                                self.index += 2;
                                break;
                            }
                            (Some(c), _) => {
                                if c == '\n' {
                                    self.line += 1;
                                }
                                self.index += 1;
                            }
                            (None, _) => {
                                return Err(CompileError::Syntax {
                                    line: start_line,
                                    message: "unterminated comment".to_string(),
                                })
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn parse_number(&mut self) -> Result<Token> {
        let rest = &self.chars[self.index..];
        let (digits, radix, prefix) = if rest.len() > 1 && rest[0] == '0' && matches!(rest[1], 'x' | 'X')
        {
            let digits: String = rest[2..]
                .iter()
                .take_while(|c| c.is_ascii_hexdigit())
                .collect();
            (digits, 16, 2)
        } else {
            let digits: String = rest.iter().take_while(|c| c.is_ascii_digit()).collect();
            (digits, 10, 0)
        };

        let value = i64::from_str_radix(&digits, radix)
            .map_err(|_| self.error(format!("invalid integer literal '{}'", digits)))?;
        Ok(self.new_token(TokenKind::IntLit(value), prefix + digits.len()))
    }

    fn parse_identifier(&mut self) -> Token {
        let s: String = self.chars[self.index..]
            .iter()
            .take_while(|&&c| c.is_ascii_alphanumeric() || c == '_')
            .collect();
        let len = s.len();

        if let Some(kind) = KEYWORDS.get(s.as_str()) {
            self.new_token(kind.clone(), len)
        } else {
            self.new_token(TokenKind::Ident(s), len)
        }
    }

    /// Reads one possibly escaped character of a char or string literal.
    fn next_literal_char(&mut self) -> Result<char> {
        let Some(c) = self.peek_char(0) else {
            return Err(self.error("unterminated literal".to_string()));
        };
        self.index += 1;
        if c == '\n' {
            return Err(self.error("newline in literal".to_string()));
        }
        if c != '\\' {
            return Ok(c);
        }

        let Some(escaped) = self.peek_char(0) else {
            return Err(self.error("unterminated escape sequence".to_string()));
        };
        self.index += 1;
        match escaped {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '0' => Ok('\0'),
            'a' => Ok('\x07'),
            'b' => Ok('\x08'),
            'f' => Ok('\x0c'),
            '\\' | '\'' | '"' => Ok(escaped),
            other => Err(self.error(format!("unknown escape sequence '\\{}'", other))),
        }
    }

    fn parse_char(&mut self) -> Result<Token> {
        let line = self.line;
        self.index += 1;
        let c = self.next_literal_char()?;
        if self.peek_char(0) != Some('\'') {
            return Err(self.error("expected closing quote in character literal".to_string()));
        }
        self.index += 1;
        Ok(Token {
            kind: TokenKind::IntLit(c as i64),
            line,
        })
    }

    fn parse_string(&mut self) -> Result<Token> {
        let line = self.line;
        self.index += 1;
        let mut s = String::new();
        while self.peek_char(0) != Some('"') {
            s.push(self.next_literal_char()?);
        }
        self.index += 1;
        Ok(Token {
            kind: TokenKind::StrLit(s),
            line,
        })
    }
}
