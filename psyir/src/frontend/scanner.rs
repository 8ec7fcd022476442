use crate::frontend::token::Location;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use anyhow::Result;

const DOT_OPERATORS: &[&str] = &[
    "eq", "ne", "lt", "le", "gt", "ge", "and", "or", "not", "eqv", "neqv", "true", "false",
];

const TWO_CHAR_OPERATORS: &[&str] = &["**", "//", "==", "/=", "<=", ">=", "=>", "::"];

/// Lossless tokenizer for free-form Fortran.
///
/// Whitespace, newlines and comments are kept as tokens so that the
/// concatenation of all lexemes reproduces the source.
pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Scanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 0,
            column: 0,
        }
    }
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
    fn advance(&mut self) -> char {
        let c = self.peek();
        self.current += 1;
        self.column += 1;
        c
    }
    fn peek(&self) -> char {
        self.peek_n(0)
    }
    fn peek_n(&self, n: usize) -> char {
        self.source.get(self.current + n).copied().unwrap_or('\0')
    }
    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let diff = self.current - self.start;
        let column = self.column - diff;
        let location = Location::new(self.line, column, self.start);
        self.tokens.push(Token::new(kind, lexeme, location));
    }
    /// Length of the dot operator (such as `.and.`) starting at the current
    /// position, if any.
    fn dot_operator_len(&self) -> Option<usize> {
        if self.peek() != '.' {
            return None;
        }
        let mut word = String::new();
        let mut n = 1;
        while self.peek_n(n).is_ascii_alphabetic() {
            word.push(self.peek_n(n).to_ascii_lowercase());
            n += 1;
        }
        if self.peek_n(n) == '.' && DOT_OPERATORS.contains(&word.as_str()) {
            Some(n + 1)
        } else {
            None
        }
    }
    fn kind_suffix(&mut self) {
        if self.peek() == '_' && (self.peek_n(1).is_alphanumeric() || self.peek_n(1) == '_') {
            self.advance();
            while self.peek().is_alphanumeric() || self.peek() == '_' {
                self.advance();
            }
        }
    }
    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let mut is_real = self.source[self.start] == '.';
        if !is_real && self.peek() == '.' && self.dot_operator_len().is_none() {
            is_real = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        let exponent = matches!(self.peek(), 'e' | 'E' | 'd' | 'D');
        let signed = matches!(self.peek_n(1), '+' | '-') && self.peek_n(2).is_ascii_digit();
        if exponent && (self.peek_n(1).is_ascii_digit() || signed) {
            is_real = true;
            self.advance();
            if signed {
                self.advance();
            }
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        self.kind_suffix();
        if is_real {
            self.add_token(TokenKind::Real);
        } else {
            self.add_token(TokenKind::Integer);
        }
    }
    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        self.add_token(TokenKind::Identifier);
    }
    fn string(&mut self, quote: char) -> Result<()> {
        loop {
            if self.is_at_end() || self.peek() == '\n' {
                let location = Location::new(self.line, self.column, self.start);
                let source: String = self.source.iter().collect();
                return Err(anyhow::anyhow!(Self::error(
                    &source,
                    &location,
                    "Unterminated string"
                )));
            }
            let c = self.advance();
            if c == quote {
                // A doubled quote is an escaped quote.
                if self.peek() == quote {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.add_token(TokenKind::String);
        Ok(())
    }
    fn comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        self.add_token(TokenKind::Comment);
    }
    fn whitespace(&mut self) {
        while matches!(self.peek(), ' ' | '\t' | '\r') {
            self.advance();
        }
        self.add_token(TokenKind::Whitespace);
    }
    fn operator(&mut self, c: char) {
        let pair: String = [c, self.peek()].iter().collect();
        if TWO_CHAR_OPERATORS.contains(&pair.as_str()) {
            self.advance();
        }
        self.add_token(TokenKind::Operator);
    }
    fn scan_token(&mut self) -> Result<()> {
        if let Some(len) = self.dot_operator_len() {
            for _ in 0..len {
                self.advance();
            }
            self.add_token(TokenKind::DotOperator);
            return Ok(());
        }
        let c = self.advance();
        match c {
            ' ' | '\t' | '\r' => self.whitespace(),
            '\n' => {
                self.add_token(TokenKind::Newline);
                self.line += 1;
                self.column = 0;
            }
            '!' => self.comment(),
            '\'' | '"' => self.string(c)?,
            '.' if self.peek().is_ascii_digit() => self.number(),
            s if s.is_ascii_digit() => self.number(),
            s if s.is_alphabetic() || s == '_' => self.identifier(),
            _ => self.operator(c),
        }
        Ok(())
    }
    fn scan_tokens(&mut self) -> Result<()> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.start = self.current;
        self.add_token(TokenKind::Eof);
        Ok(())
    }
    pub fn scan(src: &str) -> Result<Vec<Token>> {
        let mut scanner = Scanner::new(src);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }
    pub fn error(src: &str, loc: &Location, msg: &str) -> String {
        let lines = src.split('\n').collect::<Vec<&str>>();
        let n = loc.line();
        let prev_line = if n > 0 {
            let prev_n = n - 1;
            let prev = lines.get(prev_n).unwrap_or(&"");
            format!("\n{prev_n}  | {prev}")
        } else {
            "".to_string()
        };
        let line = lines.get(n).unwrap_or(&"");
        let line_num_width = 4 + n.to_string().len();
        let err_indent = " ".repeat(loc.column() + line_num_width);
        format!("```{prev_line}\n{n}  | {line}\n{err_indent}^ {msg}\n```")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Scanner::scan(src)
            .unwrap()
            .iter()
            .filter(|t| !t.kind.is_trivia())
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_scanner() {
        let src = "  a(i) = 0.5_r_def*b%data(df) ! half\n";
        let tokens = Scanner::scan(src).unwrap();
        let text: std::string::String = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(text, src);
        assert_eq!(tokens[0].kind, TokenKind::Whitespace);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].lexeme, "a");
        assert_eq!(tokens[1].column(), 2);
        let real = tokens.iter().find(|t| t.kind == TokenKind::Real).unwrap();
        assert_eq!(real.lexeme, "0.5_r_def");
        let comment = tokens.iter().find(|t| t.kind == TokenKind::Comment).unwrap();
        assert_eq!(comment.lexeme, "! half");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);

        use TokenKind::*;
        assert_eq!(kinds("1.eq.2"), vec![Integer, DotOperator, Integer, Eof]);
        assert_eq!(kinds("x**2"), vec![Identifier, Operator, Integer, Eof]);
        assert_eq!(kinds("1.0d-3"), vec![Real, Eof]);
        assert_eq!(kinds(".5"), vec![Real, Eof]);
        assert_eq!(kinds("'it''s'"), vec![String, Eof]);
        assert_eq!(kinds(".true."), vec![DotOperator, Eof]);
    }

    #[test]
    fn test_error() {
        let src = "module m\n  x = 'abc\nend module";
        let err = Scanner::scan(src).unwrap_err();
        let lines = err.to_string();
        let lines = lines.split('\n').collect::<Vec<&str>>();
        assert_eq!(lines[0], "```");
        assert_eq!(lines[1], "0  | module m");
        assert_eq!(lines[2], "1  |   x = 'abc");
        assert_eq!(lines[4], "```");
    }
}
