use std::fmt::Display;
use std::fmt::Formatter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Markers
    Eof,

    /// foo
    Identifier,

    // Literals
    /// 42, 42_i_def
    Integer,
    /// 1.0, 1.0e-3, 0.5_r_def
    Real,
    /// 'foo' or "foo"
    String,

    // Operators
    /// .and., .eq., .true.
    DotOperator,
    /// Punctuation and symbolic operators such as `(`, `::` or `**`.
    Operator,

    // Trivia
    /// Spaces and tabs.
    Whitespace,
    Newline,
    /// `! ...` up to (not including) the end of the line.
    Comment,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// The line number of the token.
    line: usize,
    /// The column number of the token.
    column: usize,
    /// The character location in the raw source string.
    start: usize,
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "loc(:{}:{})", self.line, self.column)
    }
}

impl Location {
    pub fn new(line: usize, column: usize, start: usize) -> Self {
        Self {
            line,
            column,
            start,
        }
    }
    pub fn line(&self) -> usize {
        self.line
    }
    pub fn column(&self) -> usize {
        self.column
    }
    pub fn start(&self) -> usize {
        self.start
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// The kind of token, such as `foo` (Identifier) or `.and.` (DotOperator).
    pub kind: TokenKind,
    /// The exact source text of the token.
    pub lexeme: String,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, location: Location) -> Self {
        Self {
            kind,
            lexeme,
            location,
        }
    }
    pub fn line(&self) -> usize {
        self.location.line()
    }
    pub fn column(&self) -> usize {
        self.location.column()
    }
    /// Whether the token is the identifier `word`, ignoring case.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme.eq_ignore_ascii_case(word)
    }
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.lexeme == op
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} \"{}\" {}", self.kind, self.lexeme, self.location)
    }
}
