//! Lexer for firestorm source.

use crate::error::CoreError;
use crate::span::{Location, Span};

/// Kind of a token produced by the lexer.
///
/// Datatype names (`int`, `str`, ...) and function attributes are
/// plain identifiers; the parser decides what they mean by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,

    // Identifiers and literals
    Ident,
    IntLiteral,
    CharLiteral,
    StringLiteral,

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Semi,     // ;
    Assign,   // =
    Arrow,    // ->

    // Operators
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    Percent,    // %
    Caret,      // ^
    Amp,        // &
    Pipe,       // |
    Tilde,      // ~
    Bang,       // !
    ShiftLeft,  // <<
    ShiftRight, // >>
    EqualEqual, // ==
    NotEqual,   // !=
    Less,       // <
    LessEqual,  // <=
    Greater,    // >
    GreaterEqual, // >=
    Increment,  // ++
    Decrement,  // --

    // Keywords
    Function,
    Offset,
    Return,
    If,
    Else,
    While,
    Do,
    Loop,
    End,
}

impl TokenKind {
    /// Stable name used in diagnostics.
    pub fn debug_name(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of input",
            TokenKind::Ident => "identifier",
            TokenKind::IntLiteral => "number",
            TokenKind::CharLiteral => "character",
            TokenKind::StringLiteral => "string",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::Assign => "=",
            TokenKind::Arrow => "->",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::ShiftLeft => "<<",
            TokenKind::ShiftRight => ">>",
            TokenKind::EqualEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Increment => "++",
            TokenKind::Decrement => "--",
            TokenKind::Function => "function",
            TokenKind::Offset => "offset",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Do => "do",
            TokenKind::Loop => "loop",
            TokenKind::End => "end",
        }
    }
}

/// A single token with its kind and span.
///
/// For string and character literals the span covers only the
/// contents between the quotes; escapes are decoded by [`unescape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Lex a source string into tokens, ending with [`TokenKind::Eof`].
pub fn lex(source: &str) -> Result<Vec<Token>, CoreError> {
    let mut lexer = Lexer {
        source,
        chars: source.as_bytes(),
        index: 0,
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    index: usize,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'/') {
                while let Some(c) = self.peek_char() {
                    if c == b'\n' {
                        break;
                    }
                    self.consume_char();
                }
                continue;
            }

            let start = self.index as u32;
            let token = match ch {
                b'(' => self.single(TokenKind::LParen, start),
                b')' => self.single(TokenKind::RParen, start),
                b'{' => self.single(TokenKind::LBrace, start),
                b'}' => self.single(TokenKind::RBrace, start),
                b'[' => self.single(TokenKind::LBracket, start),
                b']' => self.single(TokenKind::RBracket, start),
                b',' => self.single(TokenKind::Comma, start),
                b';' => self.single(TokenKind::Semi, start),
                b'*' => self.single(TokenKind::Star, start),
                b'/' => self.single(TokenKind::Slash, start),
                b'%' => self.single(TokenKind::Percent, start),
                b'^' => self.single(TokenKind::Caret, start),
                b'&' => self.single(TokenKind::Amp, start),
                b'|' => self.single(TokenKind::Pipe, start),
                b'~' => self.single(TokenKind::Tilde, start),
                b'=' => self.one_or_two(b'=', TokenKind::EqualEqual, TokenKind::Assign, start),
                b'!' => self.one_or_two(b'=', TokenKind::NotEqual, TokenKind::Bang, start),
                b'+' => self.one_or_two(b'+', TokenKind::Increment, TokenKind::Plus, start),
                b'<' => {
                    self.consume_char();
                    match self.peek_char() {
                        Some(b'=') => self.single(TokenKind::LessEqual, start),
                        Some(b'<') => self.single(TokenKind::ShiftLeft, start),
                        _ => self.simple_token(TokenKind::Less, start),
                    }
                }
                b'>' => {
                    self.consume_char();
                    match self.peek_char() {
                        Some(b'=') => self.single(TokenKind::GreaterEqual, start),
                        Some(b'>') => self.single(TokenKind::ShiftRight, start),
                        _ => self.simple_token(TokenKind::Greater, start),
                    }
                }
                b'-' => {
                    self.consume_char();
                    match self.peek_char() {
                        Some(b'>') => self.single(TokenKind::Arrow, start),
                        Some(b'-') => self.single(TokenKind::Decrement, start),
                        _ => self.simple_token(TokenKind::Minus, start),
                    }
                }
                b'"' => self.lex_quoted(b'"', TokenKind::StringLiteral, start)?,
                b'\'' => self.lex_quoted(b'\'', TokenKind::CharLiteral, start)?,
                b'0'..=b'9' => self.lex_number(start),
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(start),
                _ => {
                    let shown = self.source[self.index..].chars().next().unwrap_or('?');
                    return Err(self.error(start, format!("unexpected character '{shown}'")));
                }
            };
            tokens.push(token);
        }

        let end = self.chars.len() as u32;
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(end, end),
        });
        Ok(tokens)
    }

    fn simple_token(&self, kind: TokenKind, start: u32) -> Token {
        Token {
            kind,
            span: Span::new(start, self.index as u32),
        }
    }

    /// Consumes one byte and emits `kind`.
    fn single(&mut self, kind: TokenKind, start: u32) -> Token {
        self.consume_char();
        self.simple_token(kind, start)
    }

    fn one_or_two(&mut self, next: u8, double: TokenKind, one: TokenKind, start: u32) -> Token {
        self.consume_char();
        if self.peek_char() == Some(next) {
            self.single(double, start)
        } else {
            self.simple_token(one, start)
        }
    }

    fn error(&self, offset: u32, message: String) -> CoreError {
        CoreError::Syntax {
            location: Location::from_offset(self.source, offset),
            message,
        }
    }

    fn lex_quoted(&mut self, quote: u8, kind: TokenKind, start: u32) -> Result<Token, CoreError> {
        self.consume_char();
        let content_start = self.index as u32;
        while let Some(ch) = self.peek_char() {
            match ch {
                _ if ch == quote => {
                    let content_end = self.index as u32;
                    self.consume_char();
                    return Ok(Token {
                        kind,
                        span: Span::new(content_start, content_end),
                    });
                }
                b'\\' => {
                    self.consume_char();
                    if self.peek_char().is_some() {
                        self.consume_char();
                    }
                }
                b'\n' if quote == b'\'' => break,
                _ => self.consume_char(),
            }
        }
        let what = if quote == b'"' { "string" } else { "character" };
        Err(self.error(start, format!("unterminated {what} literal")))
    }

    fn lex_number(&mut self, start: u32) -> Token {
        if self.peek_char() == Some(b'0') && matches!(self.peek_next(), Some(b'x' | b'X')) {
            self.consume_char();
            self.consume_char();
            while self.peek_char().is_some_and(|c| c.is_ascii_hexdigit() || c == b'_') {
                self.consume_char();
            }
        } else {
            while self.peek_char().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
                self.consume_char();
            }
        }
        self.simple_token(TokenKind::IntLiteral, start)
    }

    fn lex_ident_or_keyword(&mut self, start: u32) -> Token {
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }

        let text = &self.source[start as usize..self.index];
        let kind = match text {
            "function" => TokenKind::Function,
            "offset" => TokenKind::Offset,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "loop" => TokenKind::Loop,
            "end" => TokenKind::End,
            _ => TokenKind::Ident,
        };
        self.simple_token(kind, start)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.chars.len() {
            self.index += 1;
        }
    }
}

/// Decodes the escapes of a string or character literal body.
///
/// Returns the offending escape character on failure.
pub fn unescape(raw: &str) -> Result<Vec<u8>, char> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0; 4];
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let byte = match chars.next() {
            Some('n') => b'\n',
            Some('t') => b'\t',
            Some('r') => b'\r',
            Some('0') => 0,
            Some('\\') => b'\\',
            Some('"') => b'"',
            Some('\'') => b'\'',
            Some(other) => return Err(other),
            None => return Err('\\'),
        };
        out.push(byte);
    }
    Ok(out)
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn disambiguates_multi_character_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("== != <= >= << >> ++ -- -> = ! < > + -"),
            vec![
                EqualEqual, NotEqual, LessEqual, GreaterEqual, ShiftLeft, ShiftRight, Increment,
                Decrement, Arrow, Assign, Bang, Less, Greater, Plus, Minus, Eof
            ]
        );
    }

    #[test]
    fn recognizes_keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("function offset int32 do_it end loop"),
            vec![Function, Offset, Ident, Ident, End, Loop, Eof]
        );
    }

    #[test]
    fn skips_line_comments() {
        use TokenKind::*;
        assert_eq!(kinds("x // ignored ;\n y / z"), vec![Ident, Ident, Slash, Ident, Eof]);
    }

    #[test]
    fn string_span_covers_contents() {
        let source = r#"str s = "hi\n";"#;
        let tokens = lex(source).expect("lex");
        let string = tokens
            .iter()
            .find(|t| t.kind == TokenKind::StringLiteral)
            .expect("string token");
        let raw = &source[string.span.start as usize..string.span.end as usize];
        assert_eq!(raw, r"hi\n");
        assert_eq!(unescape(raw).unwrap(), b"hi\n".to_vec());
    }

    #[test]
    fn rejects_unknown_character_with_position() {
        let err = lex("int x;\n  @").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        match err {
            CoreError::Syntax { location, .. } => {
                assert_eq!((location.line, location.column), (2, 3));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = lex("\"abc").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn debug_names_are_stable() {
        assert_eq!(TokenKind::Arrow.debug_name(), "->");
        assert_eq!(TokenKind::Ident.debug_name(), "identifier");
        assert_eq!(TokenKind::Eof.debug_name(), "end of input");
    }
}
