use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// Integer magnitude; the parser applies the sign and range check.
    Int(u64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

const RESERVED: [&str; 17] = [
    "as",
    "break",
    "const",
    "continue",
    "else",
    "for",
    "function",
    "if",
    "import",
    "let",
    "loop",
    "package",
    "namespace",
    "return",
    "var",
    "void",
    "while",
];

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
}

impl<'s> Lexer<'s> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            offset,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else if c == b'/' && self.peek_at(1) == Some(b'/') {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, ParseError> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Spanned {
                token: Token::Eof,
                offset: start,
            });
        };

        let token = match c {
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b'{' => self.single(Token::LBrace),
            b'}' => self.single(Token::RBrace),
            b',' => self.single(Token::Comma),
            b':' => self.single(Token::Colon),
            b'?' => self.single(Token::Question),
            b'+' => self.single(Token::Plus),
            b'-' => self.single(Token::Minus),
            b'*' => self.single(Token::Star),
            b'/' => self.single(Token::Slash),
            b'%' => self.single(Token::Percent),
            b'=' if self.peek_at(1) == Some(b'=') => self.double(Token::EqEq),
            b'!' if self.peek_at(1) == Some(b'=') => self.double(Token::NotEq),
            b'!' => self.single(Token::Bang),
            b'<' if self.peek_at(1) == Some(b'=') => self.double(Token::Le),
            b'<' => self.single(Token::Lt),
            b'>' if self.peek_at(1) == Some(b'=') => self.double(Token::Ge),
            b'>' => self.single(Token::Gt),
            b'&' if self.peek_at(1) == Some(b'&') => self.double(Token::AndAnd),
            b'|' if self.peek_at(1) == Some(b'|') => self.double(Token::OrOr),
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
            b'.' => self.single(Token::Dot),
            b'0'..=b'9' => self.number()?,
            b'"' | b'\'' => self.string(false, false)?,
            b'r' | b'R' | b'b' | b'B' if self.is_prefixed_literal() => self.prefixed_literal()?,
            c if c == b'_' || c.is_ascii_alphabetic() => self.ident()?,
            _ => {
                let ch = self.source[start..].chars().next().unwrap_or('?');
                return Err(self.error(start, format!("unexpected character '{ch}'")));
            }
        };

        Ok(Spanned {
            token,
            offset: start,
        })
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn double(&mut self, token: Token) -> Token {
        self.pos += 2;
        token
    }

    fn is_prefixed_literal(&self) -> bool {
        let is_quote = |c: Option<u8>| matches!(c, Some(b'"') | Some(b'\''));
        let is_prefix = |c: Option<u8>| matches!(c, Some(b'r' | b'R' | b'b' | b'B'));
        is_quote(self.peek_at(1)) || (is_prefix(self.peek_at(1)) && is_quote(self.peek_at(2)))
    }

    fn prefixed_literal(&mut self) -> Result<Token, ParseError> {
        let mut raw = false;
        let mut bytes = false;
        while let Some(c) = self.peek() {
            match c {
                b'r' | b'R' => raw = true,
                b'b' | b'B' => bytes = true,
                _ => break,
            }
            self.pos += 1;
        }
        self.string(raw, bytes)
    }

    fn ident(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'_' || c.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.source[start..self.pos];
        Ok(match text {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            reserved if RESERVED.contains(&reserved) => {
                return Err(self.error(start, format!("reserved identifier '{reserved}'")));
            }
            _ => Token::Ident(text.to_string()),
        })
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.source[digits_start..self.pos];
            let value = u64::from_str_radix(digits, 16)
                .map_err(|_| self.error(start, format!("invalid hex literal '0x{digits}'")))?;
            return Ok(self.integer_suffix(value));
        }

        let mut is_double = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some(b'+' | b'-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                self.pos += ahead;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text = &self.source[start..self.pos];
        if is_double {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(start, format!("invalid double literal '{text}'")))?;
            return Ok(Token::Double(value));
        }

        let value: u64 = text
            .parse()
            .map_err(|_| self.error(start, format!("integer literal '{text}' out of range")))?;
        Ok(self.integer_suffix(value))
    }

    fn integer_suffix(&mut self, value: u64) -> Token {
        if matches!(self.peek(), Some(b'u' | b'U')) {
            self.pos += 1;
            Token::Uint(value)
        } else {
            Token::Int(value)
        }
    }

    fn string(&mut self, raw: bool, bytes: bool) -> Result<Token, ParseError> {
        let start = self.pos;
        let quote = self.peek().unwrap_or(b'"');
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error(start, "unterminated string literal"));
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if !triple && (c == b'\n' || c == b'\r') {
                return Err(self.error(start, "newline in single-quoted string literal"));
            }

            if c == b'\\' && !raw {
                self.escape(bytes, &mut out)?;
                continue;
            }

            out.push(c);
            self.pos += 1;
        }

        if bytes {
            return Ok(Token::Bytes(out));
        }
        String::from_utf8(out)
            .map(Token::String)
            .map_err(|_| self.error(start, "string literal is not valid UTF-8"))
    }

    fn escape(&mut self, bytes: bool, out: &mut Vec<u8>) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        let Some(c) = self.peek() else {
            return Err(self.error(start, "unterminated escape sequence"));
        };
        self.pos += 1;

        let simple = match c {
            b'\\' => Some(b'\\'),
            b'\'' => Some(b'\''),
            b'"' => Some(b'"'),
            b'`' => Some(b'`'),
            b'?' => Some(b'?'),
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'f' => Some(0x0c),
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'v' => Some(0x0b),
            _ => None,
        };
        if let Some(byte) = simple {
            out.push(byte);
            return Ok(());
        }

        let (radix, digits) = match c {
            b'x' | b'X' => (16, 2),
            b'u' if !bytes => (16, 4),
            b'U' if !bytes => (16, 8),
            b'0'..=b'3' => {
                self.pos -= 1;
                (8, 3)
            }
            _ => {
                return Err(self.error(start, format!("invalid escape sequence '\\{}'", c as char)));
            }
        };

        let end = self.pos + digits;
        let text = self
            .source
            .get(self.pos..end)
            .ok_or_else(|| self.error(start, "truncated escape sequence"))?;
        let code = u32::from_str_radix(text, radix)
            .map_err(|_| self.error(start, format!("invalid escape sequence '\\{text}'")))?;
        self.pos = end;

        if bytes && code <= 0xff {
            out.push(code as u8);
            return Ok(());
        }
        let ch = char::from_u32(code)
            .ok_or_else(|| self.error(start, format!("invalid code point {code:#x}")))?;
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn lexes_operators_and_identifiers() {
        assert_eq!(
            tokens("self.a >= 1 && !b || c in [x]"),
            vec![
                Token::Ident("self".into()),
                Token::Dot,
                Token::Ident("a".into()),
                Token::Ge,
                Token::Int(1),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("b".into()),
                Token::OrOr,
                Token::Ident("c".into()),
                Token::In,
                Token::LBracket,
                Token::Ident("x".into()),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numeric_literals() {
        assert_eq!(
            tokens("0x1F 42u 1.5 2e3 .5"),
            vec![
                Token::Int(31),
                Token::Uint(42),
                Token::Double(1.5),
                Token::Double(2000.0),
                Token::Double(0.5),
                Token::Eof,
            ]
        );
        assert_eq!(tokens("9223372036854775808")[0], Token::Int(9223372036854775808));
        assert!(tokenize("99999999999999999999").is_err());
    }

    #[test]
    fn lexes_string_forms() {
        assert_eq!(tokens(r#"'a\nb'"#)[0], Token::String("a\nb".into()));
        assert_eq!(tokens(r#""é""#)[0], Token::String("é".into()));
        assert_eq!(tokens(r#"r'\d+'"#)[0], Token::String("\\d+".into()));
        assert_eq!(tokens("'''multi\nline'''")[0], Token::String("multi\nline".into()));
        assert_eq!(tokens(r#"b'\xff\101'"#)[0], Token::Bytes(vec![0xff, 0x41]));
        assert_eq!(tokens("'日本'")[0], Token::String("日本".into()));
    }

    #[test]
    fn skips_comments() {
        assert_eq!(tokens("a // trailing\n + b").len(), 4);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("a # b").is_err());
        assert!(tokenize("'\\q'").is_err());
        assert!(tokenize("let").is_err());
    }
}
