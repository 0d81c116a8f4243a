//! Tokenizer for PadScript source text.

use std::fmt;

use super::diagnostic::{Diagnostic, Pos};

/// Punctuation and operator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    PlusPlus,
    MinusMinus,
}

impl Punct {
    pub fn as_str(self) -> &'static str {
        match self {
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBrace => "{",
            Punct::RBrace => "}",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::Semi => ";",
            Punct::Comma => ",",
            Punct::Dot => ".",
            Punct::Question => "?",
            Punct::Colon => ":",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Percent => "%",
            Punct::Bang => "!",
            Punct::Assign => "=",
            Punct::EqEq => "==",
            Punct::NotEq => "!=",
            Punct::Lt => "<",
            Punct::Le => "<=",
            Punct::Gt => ">",
            Punct::Ge => ">=",
            Punct::AndAnd => "&&",
            Punct::OrOr => "||",
            Punct::PlusAssign => "+=",
            Punct::MinusAssign => "-=",
            Punct::StarAssign => "*=",
            Punct::SlashAssign => "/=",
            Punct::PercentAssign => "%=",
            Punct::PlusPlus => "++",
            Punct::MinusMinus => "--",
        }
    }
}

impl fmt::Display for Punct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Double(f64),
    Str(String),
    /// Preprocessor-style directive such as `#load` or `#r` (name without the `#`).
    Directive(String),
    Punct(Punct),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => f.write_str(name),
            TokenKind::Int(v) => write!(f, "{v}"),
            TokenKind::Double(v) => write!(f, "{v}"),
            TokenKind::Str(s) => write!(f, "\"{s}\""),
            TokenKind::Directive(name) => write!(f, "#{name}"),
            TokenKind::Punct(p) => write!(f, "{p}"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

/// Words that cannot be used as identifiers.
pub const KEYWORDS: &[&str] = &[
    "bool", "break", "continue", "double", "else", "false", "float", "for", "foreach", "if", "in",
    "int", "long", "new", "null", "object", "return", "static", "string", "throw", "true", "using",
    "var", "void", "while",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    col: u32,
    file: u16,
}

/// Tokenize `source`, tagging every token with the given source file index.
///
/// Stops at the first lexical error.
pub fn tokenize(source: &str, file: u16) -> Result<Vec<Token>, Diagnostic> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        index: 0,
        line: 1,
        col: 1,
        file,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl Lexer {
    fn pos(&self) -> Pos {
        Pos {
            file: self.file,
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.index).copied()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), Diagnostic> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(Diagnostic::new(
                                    "SP1035",
                                    "End-of-file found, '*/' expected",
                                    start,
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_trivia()?;
        let pos = self.pos();
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos,
            });
        };

        let kind = if c.is_ascii_alphabetic() || c == '_' {
            TokenKind::Ident(self.word())
        } else if c.is_ascii_digit() {
            self.number(pos)?
        } else if c == '"' {
            TokenKind::Str(self.string(pos)?)
        } else if c == '#' {
            self.bump();
            let name = self.word();
            if name.is_empty() {
                return Err(Diagnostic::new(
                    "SP1024",
                    "Preprocessor directive expected",
                    pos,
                ));
            }
            TokenKind::Directive(name)
        } else {
            TokenKind::Punct(self.punct(pos)?)
        };
        Ok(Token { kind, pos })
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn number(&mut self, pos: Pos) -> Result<TokenKind, Diagnostic> {
        let mut text = String::new();
        let mut is_double = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_double && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
            {
                is_double = true;
                text.push(c);
                self.bump();
            } else if (c == 'e' || c == 'E')
                && (self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+' | '-'))
                        && self.peek_at(2).is_some_and(|n| n.is_ascii_digit())))
            {
                is_double = true;
                text.push(c);
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.bump();
                }
            } else {
                break;
            }
        }

        // Optional type suffixes: 1.5d, 2f, 10L
        match self.peek() {
            Some('d' | 'D' | 'f' | 'F') => {
                self.bump();
                is_double = true;
            }
            Some('l' | 'L') if !is_double => {
                self.bump();
            }
            _ => {}
        }

        if is_double {
            text.parse::<f64>()
                .map(TokenKind::Double)
                .map_err(|_| Diagnostic::new("SP1021", "Invalid real literal", pos))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| Diagnostic::new("SP1021", "Integral constant is too large", pos))
        }
    }

    fn string(&mut self, pos: Pos) -> Result<String, Diagnostic> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(value),
                Some('\\') => {
                    let escape_pos = self.pos();
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('\\') => '\\',
                        _ => {
                            return Err(Diagnostic::new(
                                "SP1009",
                                "Unrecognized escape sequence",
                                escape_pos,
                            ));
                        }
                    };
                    value.push(escaped);
                }
                Some('\n') | None => {
                    return Err(Diagnostic::new("SP1010", "Newline in constant", pos));
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn punct(&mut self, pos: Pos) -> Result<Punct, Diagnostic> {
        let c = self.bump().unwrap_or('\0');
        let next = self.peek();
        let (punct, wide) = match (c, next) {
            ('(', _) => (Punct::LParen, false),
            (')', _) => (Punct::RParen, false),
            ('{', _) => (Punct::LBrace, false),
            ('}', _) => (Punct::RBrace, false),
            ('[', _) => (Punct::LBracket, false),
            (']', _) => (Punct::RBracket, false),
            (';', _) => (Punct::Semi, false),
            (',', _) => (Punct::Comma, false),
            ('.', _) => (Punct::Dot, false),
            ('?', _) => (Punct::Question, false),
            (':', _) => (Punct::Colon, false),
            ('+', Some('+')) => (Punct::PlusPlus, true),
            ('+', Some('=')) => (Punct::PlusAssign, true),
            ('+', _) => (Punct::Plus, false),
            ('-', Some('-')) => (Punct::MinusMinus, true),
            ('-', Some('=')) => (Punct::MinusAssign, true),
            ('-', _) => (Punct::Minus, false),
            ('*', Some('=')) => (Punct::StarAssign, true),
            ('*', _) => (Punct::Star, false),
            ('/', Some('=')) => (Punct::SlashAssign, true),
            ('/', _) => (Punct::Slash, false),
            ('%', Some('=')) => (Punct::PercentAssign, true),
            ('%', _) => (Punct::Percent, false),
            ('!', Some('=')) => (Punct::NotEq, true),
            ('!', _) => (Punct::Bang, false),
            ('=', Some('=')) => (Punct::EqEq, true),
            ('=', _) => (Punct::Assign, false),
            ('<', Some('=')) => (Punct::Le, true),
            ('<', _) => (Punct::Lt, false),
            ('>', Some('=')) => (Punct::Ge, true),
            ('>', _) => (Punct::Gt, false),
            ('&', Some('&')) => (Punct::AndAnd, true),
            ('|', Some('|')) => (Punct::OrOr, true),
            (other, _) => {
                return Err(Diagnostic::new(
                    "SP1056",
                    format!("Unexpected character '{other}'"),
                    pos,
                ));
            }
        };
        if wide {
            self.bump();
        }
        Ok(punct)
    }
}
