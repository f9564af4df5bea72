use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And,
    Or,
    Not,
    In,
    True,
    False,
    None,

    // Symbols
    EqEq,       // ==
    NotEq,      // !=
    Lt,         // <
    Le,         // <=
    Gt,         // >
    Ge,         // >=
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    SlashSlash, // //
    Percent,    // %
    Dot,        // .
    Comma,      // ,
    LBracket,   // [
    RBracket,   // ]
    LParen,     // (
    RParen,     // )

    // Data
    Ident(String),
    Int(i64),
    Float(f64),
    StringLit(String),
}

/// Two-character symbols must be tried before their one-character prefixes.
const SYMBOLS: &[(&str, Token)] = &[
    ("==", Token::EqEq),
    ("!=", Token::NotEq),
    ("<=", Token::Le),
    (">=", Token::Ge),
    ("//", Token::SlashSlash),
    ("<", Token::Lt),
    (">", Token::Gt),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("*", Token::Star),
    ("/", Token::Slash),
    ("%", Token::Percent),
    (".", Token::Dot),
    (",", Token::Comma),
    ("[", Token::LBracket),
    ("]", Token::RBracket),
    ("(", Token::LParen),
    (")", Token::RParen),
];

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, ExprError> {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());

        let rest = self.remaining();
        let first = match rest.chars().next() {
            Some(c) => c,
            None => return Ok(None),
        };

        for (symbol, token) in SYMBOLS {
            if rest.starts_with(symbol) {
                self.advance(symbol.len());
                return Ok(Some(token.clone()));
            }
        }

        if first == '\'' || first == '"' {
            return self.lex_string(first).map(Some);
        }

        if first.is_ascii_digit() {
            return self.lex_number().map(Some);
        }

        if first.is_alphabetic() || first == '_' {
            let len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let ident = &rest[..len];
            self.advance(len);

            let token = match ident {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                "true" | "True" => Token::True,
                "false" | "False" => Token::False,
                "none" | "None" | "null" => Token::None,
                _ => Token::Ident(ident.to_string()),
            };
            return Ok(Some(token));
        }

        Err(ExprError::new(format!(
            "unexpected character {:?} at offset {}",
            first, self.cursor
        )))
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, ExprError> {
        let start = self.cursor;
        let mut s = String::new();
        let mut chars = self.remaining().char_indices().skip(1);

        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + c.len_utf8());
                return Ok(Token::StringLit(s));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, esc)) => s.push(esc),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }

        Err(ExprError::new(format!(
            "unterminated string literal at offset {}",
            start
        )))
    }

    fn lex_number(&mut self) -> Result<Token, ExprError> {
        let rest = self.remaining();
        let int_len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());

        // A dot only belongs to the number when a digit follows it.
        let after = &rest[int_len..];
        let is_float = after.starts_with('.')
            && after[1..].chars().next().is_some_and(|c| c.is_ascii_digit());

        if is_float {
            let frac = &after[1..];
            let frac_len = frac
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(frac.len());
            let len = int_len + 1 + frac_len;
            let text = &rest[..len];
            self.advance(len);
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|e| ExprError::new(format!("invalid float literal {}: {}", text, e)))
        } else {
            let text = &rest[..int_len];
            self.advance(int_len);
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ExprError::new(format!("integer literal {} is too large", text)))
        }
    }
}

/// Tokenize a whole expression.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut lexer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
