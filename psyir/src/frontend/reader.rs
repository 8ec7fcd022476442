//! Reader for the subset of free-form Fortran that kernel modules use.
//!
//! The reader works statement by statement. Statements that it does not
//! understand become [ParseClass::OtherStmt] nodes so that lowering can keep
//! them as opaque code blocks. Only the module, subroutine and declaration
//! structure must be well-formed.

use crate::error::generation_error;
use crate::frontend::ast::Attribute;
use crate::frontend::ast::Declaration;
use crate::frontend::ast::DimSpec;
use crate::frontend::ast::Entity;
use crate::frontend::ast::ModuleAst;
use crate::frontend::ast::ParseClass;
use crate::frontend::ast::ParseNode;
use crate::frontend::ast::SubroutineAst;
use crate::frontend::ast::TypeSpec;
use crate::frontend::scanner::Scanner;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use crate::ir::Intent;
use anyhow::Result;
use std::sync::Arc;

/// Names that are parsed as intrinsic calls instead of part references.
const INTRINSICS: &[&str] = &[
    "abs", "ceiling", "cos", "dble", "exp", "floor", "int", "log", "max", "min", "mod", "nint",
    "real", "sign", "sin", "size", "sqrt", "sum", "tan",
];

const TYPE_KEYWORDS: &[&str] = &[
    "real",
    "integer",
    "character",
    "logical",
    "complex",
    "doubleprecision",
];

const SPECIFICATION_KEYWORDS: &[&str] = &[
    "use",
    "implicit",
    "save",
    "parameter",
    "external",
    "intrinsic",
    "dimension",
    "common",
    "data",
];

const SUBROUTINE_PREFIXES: &[&str] = &["pure", "impure", "elemental", "recursive", "module"];

const RELATIONAL_OPERATORS: &[&str] = &[
    "==", "/=", "<", "<=", ">", ">=", ".eq.", ".ne.", ".lt.", ".le.", ".gt.", ".ge.",
];

/// One statement without trivia and continuation markers.
///
/// `spaced[i]` tells whether whitespace preceded `tokens[i]` in the source.
/// The last token is always an [TokenKind::Eof] marker.
#[derive(Clone, Debug)]
struct Statement {
    tokens: Vec<Token>,
    spaced: Vec<bool>,
}

impl Statement {
    fn starts_with(&self, words: &[&str]) -> bool {
        words
            .iter()
            .enumerate()
            .all(|(i, word)| self.tokens.get(i).is_some_and(|t| t.is_word(word)))
    }
    /// Whether this is `end {kind}`, `end{kind}` or (when `bare`) `end`.
    fn is_end(&self, kind: &str, bare: bool) -> bool {
        let first = match self.tokens.first() {
            Some(first) => first,
            None => return false,
        };
        if first.is_word(&format!("end{kind}")) {
            return true;
        }
        if !first.is_word("end") {
            return false;
        }
        match self.tokens.get(1) {
            Some(next) if next.kind == TokenKind::Eof => bare,
            Some(next) => next.is_word(kind),
            None => bare,
        }
    }
    fn text_from(&self, start: usize) -> String {
        let mut text = String::new();
        for (i, token) in self.tokens.iter().enumerate().skip(start) {
            if token.kind == TokenKind::Eof {
                break;
            }
            if i > start && self.spaced[i] {
                text.push(' ');
            }
            text.push_str(&token.lexeme);
        }
        text
    }
    fn text(&self) -> String {
        self.text_from(0)
    }
    /// The statement formed by `tokens[start..end]`.
    fn slice(&self, start: usize, end: usize) -> Statement {
        let end = end.min(self.tokens.len() - 1);
        let mut tokens = self.tokens[start..end].to_vec();
        let mut spaced = self.spaced[start..end].to_vec();
        let eof = &self.tokens[end];
        tokens.push(Token::new(TokenKind::Eof, String::new(), eof.location.clone()));
        spaced.push(false);
        Statement { tokens, spaced }
    }
    fn first_word(&self) -> Option<String> {
        self.tokens
            .first()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.lexeme.to_lowercase())
    }
    fn is_subroutine_header(&self) -> bool {
        for token in &self.tokens {
            if token.is_word("subroutine") {
                return true;
            }
            let is_prefix = SUBROUTINE_PREFIXES.iter().any(|p| token.is_word(p));
            if !is_prefix {
                return false;
            }
        }
        false
    }
    fn is_function_header(&self) -> bool {
        if self.starts_with(&["end"]) {
            return false;
        }
        self.tokens
            .iter()
            .take_while(|t| !t.is_op("(") && !t.is_op("::"))
            .any(|t| t.is_word("function"))
    }
    /// Whether this starts a derived type definition (not a `type(x)`
    /// declaration).
    fn is_type_definition(&self) -> bool {
        self.starts_with(&["type"]) && !self.tokens.get(1).is_some_and(|t| t.is_op("("))
    }
    fn is_declaration(&self) -> bool {
        let first = match self.first_word() {
            Some(first) => first,
            None => return false,
        };
        let opens_paren = self.tokens.get(1).is_some_and(|t| t.is_op("("));
        match first.as_str() {
            "type" | "class" => opens_paren,
            "double" => self.starts_with(&["double", "precision"]),
            _ => TYPE_KEYWORDS.contains(&first.as_str()) && !self.is_function_header(),
        }
    }
    fn is_specification(&self) -> bool {
        match self.first_word() {
            Some(first) => SPECIFICATION_KEYWORDS.contains(&first.as_str()),
            None => false,
        }
    }
    /// Index of the `=` at parenthesis depth zero, if any.
    fn assignment_operator(&self) -> Option<usize> {
        let mut depth = 0;
        for (i, token) in self.tokens.iter().enumerate() {
            if token.is_op("(") {
                depth += 1;
            } else if token.is_op(")") {
                depth -= 1;
            } else if depth == 0 && token.is_op("=") {
                return Some(i);
            }
        }
        None
    }
}

/// Split a token stream into statements.
///
/// Statements end at a newline or `;`. A trailing `&` continues the
/// statement on the next line and a leading `&` on that line is dropped.
fn split_statements(tokens: Vec<Token>) -> Vec<Statement> {
    let mut statements = vec![];
    let mut current = Statement {
        tokens: vec![],
        spaced: vec![],
    };
    let mut space = false;
    let mut continued = false;
    for token in tokens {
        let ends_statement = match token.kind {
            TokenKind::Comment => false,
            TokenKind::Whitespace => {
                space = true;
                false
            }
            TokenKind::Newline if continued => {
                continued = false;
                space = true;
                false
            }
            TokenKind::Newline | TokenKind::Eof => true,
            _ if token.is_op(";") => true,
            _ if token.is_op("&") => {
                continued = true;
                false
            }
            _ => {
                continued = false;
                current.tokens.push(token.clone());
                current.spaced.push(space);
                space = false;
                false
            }
        };
        if ends_statement {
            if !current.tokens.is_empty() {
                current
                    .tokens
                    .push(Token::new(TokenKind::Eof, String::new(), token.location));
                current.spaced.push(false);
                statements.push(current);
            }
            current = Statement {
                tokens: vec![],
                spaced: vec![],
            };
            space = false;
        }
    }
    statements
}

/// Parser for the tokens of a single statement.
struct StatementParser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    current: usize,
}

impl<'a> StatementParser<'a> {
    fn new(src: &'a str, statement: &'a Statement) -> Self {
        StatementParser {
            src,
            tokens: &statement.tokens,
            current: 0,
        }
    }
    fn peek_n(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.current + n).min(last)]
    }
    fn peek(&self) -> &Token {
        self.peek_n(0)
    }
    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }
    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }
    fn check_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }
    fn check_word(&self, word: &str) -> bool {
        self.peek().is_word(word)
    }
    fn match_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            return true;
        }
        false
    }
    /// Consume the next token if it is one of `ops` (ignoring case) and
    /// return it in lowercase.
    fn match_operator(&mut self, ops: &[&str]) -> Option<String> {
        let token = self.peek();
        let is_operator = matches!(token.kind, TokenKind::Operator | TokenKind::DotOperator);
        if is_operator && ops.iter().any(|op| token.lexeme.eq_ignore_ascii_case(op)) {
            return Some(self.advance().lexeme.to_lowercase());
        }
        None
    }
    fn error(&self, token: &Token, msg: &str) -> anyhow::Error {
        let msg = Scanner::error(self.src, &token.location, msg);
        anyhow::anyhow!(format!("\n\n{msg}\n"))
    }
    fn expect_op(&mut self, op: &str) -> Result<Token> {
        if self.check_op(op) {
            return Ok(self.advance());
        }
        Err(self.error(self.peek(), &format!("Expected '{op}'")))
    }
    fn expect_identifier(&mut self) -> Result<Token> {
        if self.peek().kind == TokenKind::Identifier {
            return Ok(self.advance());
        }
        Err(self.error(self.peek(), "Expected identifier"))
    }
    fn expect_end(&self) -> Result<()> {
        if self.is_at_end() {
            return Ok(());
        }
        Err(self.error(self.peek(), "Unexpected token"))
    }
    /// Consume a parenthesized group and return its text.
    fn balanced_text(&mut self) -> Result<String> {
        let mut text = self.expect_op("(")?.lexeme;
        let mut depth = 1;
        while depth > 0 {
            if self.is_at_end() {
                return Err(self.error(self.peek(), "Expected ')'"));
            }
            let token = self.advance();
            if token.is_op("(") {
                depth += 1;
            } else if token.is_op(")") {
                depth -= 1;
            }
            text.push_str(&token.lexeme);
        }
        Ok(text)
    }
}

/// Expressions.
impl StatementParser<'_> {
    fn expression(&mut self) -> Result<Arc<ParseNode>> {
        self.equiv()
    }
    fn binary_chain(
        &mut self,
        class: ParseClass,
        ops: &[&str],
        operand: fn(&mut Self) -> Result<Arc<ParseNode>>,
    ) -> Result<Arc<ParseNode>> {
        let mut lhs = operand(self)?;
        while let Some(op) = self.match_operator(ops) {
            let rhs = operand(self)?;
            lhs = ParseNode::new(class, &op, vec![lhs, rhs]);
        }
        Ok(lhs)
    }
    fn equiv(&mut self) -> Result<Arc<ParseNode>> {
        self.binary_chain(ParseClass::EquivExpr, &[".eqv.", ".neqv."], Self::or)
    }
    fn or(&mut self) -> Result<Arc<ParseNode>> {
        self.binary_chain(ParseClass::OrExpr, &[".or."], Self::and)
    }
    fn and(&mut self) -> Result<Arc<ParseNode>> {
        self.binary_chain(ParseClass::AndExpr, &[".and."], Self::not)
    }
    fn not(&mut self) -> Result<Arc<ParseNode>> {
        if let Some(op) = self.match_operator(&[".not."]) {
            let operand = self.not()?;
            return Ok(ParseNode::new(ParseClass::UnaryExpr, &op, vec![operand]));
        }
        self.rel()
    }
    fn rel(&mut self) -> Result<Arc<ParseNode>> {
        let lhs = self.concat()?;
        if let Some(op) = self.match_operator(RELATIONAL_OPERATORS) {
            let rhs = self.concat()?;
            return Ok(ParseNode::new(ParseClass::RelExpr, &op, vec![lhs, rhs]));
        }
        Ok(lhs)
    }
    fn concat(&mut self) -> Result<Arc<ParseNode>> {
        self.binary_chain(ParseClass::ConcatExpr, &["//"], Self::add)
    }
    fn add(&mut self) -> Result<Arc<ParseNode>> {
        let mut lhs = match self.match_operator(&["+", "-"]) {
            Some(op) => {
                let operand = self.mult()?;
                ParseNode::new(ParseClass::UnaryExpr, &op, vec![operand])
            }
            None => self.mult()?,
        };
        while let Some(op) = self.match_operator(&["+", "-"]) {
            let rhs = self.mult()?;
            lhs = ParseNode::new(ParseClass::AddExpr, &op, vec![lhs, rhs]);
        }
        Ok(lhs)
    }
    fn mult(&mut self) -> Result<Arc<ParseNode>> {
        self.binary_chain(ParseClass::MultExpr, &["*", "/"], Self::power)
    }
    /// Exponentiation is right-associative.
    fn power(&mut self) -> Result<Arc<ParseNode>> {
        let base = self.primary()?;
        if let Some(op) = self.match_operator(&["**"]) {
            let exponent = self.power()?;
            return Ok(ParseNode::new(ParseClass::PowerExpr, &op, vec![base, exponent]));
        }
        Ok(base)
    }
    fn primary(&mut self) -> Result<Arc<ParseNode>> {
        let token = self.peek().clone();
        let literal = match token.kind {
            TokenKind::Integer => Some(ParseClass::IntLiteral),
            TokenKind::Real => Some(ParseClass::RealLiteral),
            TokenKind::String => Some(ParseClass::CharLiteral),
            TokenKind::DotOperator
                if token.lexeme.eq_ignore_ascii_case(".true.")
                    || token.lexeme.eq_ignore_ascii_case(".false.") =>
            {
                Some(ParseClass::LogicalLiteral)
            }
            _ => None,
        };
        if let Some(class) = literal {
            self.advance();
            return Ok(ParseNode::leaf(class, &token.lexeme));
        }
        if self.match_op("(") {
            let inner = self.expression()?;
            self.expect_op(")")?;
            return Ok(ParseNode::new(ParseClass::Parenthesis, "()", vec![inner]));
        }
        if token.kind == TokenKind::Identifier {
            return self.designator();
        }
        Err(self.error(&token, "Expected expression"))
    }
    /// A name, part reference or structure component such as `f%data(df)`.
    fn designator(&mut self) -> Result<Arc<ParseNode>> {
        let name = self.expect_identifier()?;
        let first = self.part(&name)?;
        if !self.check_op("%") {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.match_op("%") {
            let name = self.expect_identifier()?;
            parts.push(self.part(&name)?);
        }
        Ok(ParseNode::new(ParseClass::DataRef, "%", parts))
    }
    fn part(&mut self, name: &Token) -> Result<Arc<ParseNode>> {
        if !self.match_op("(") {
            return Ok(ParseNode::leaf(ParseClass::Name, &name.lexeme));
        }
        let mut subscripts = vec![];
        if !self.check_op(")") {
            loop {
                subscripts.push(self.subscript()?);
                if !self.match_op(",") {
                    break;
                }
            }
        }
        self.expect_op(")")?;
        let lowercase = name.lexeme.to_lowercase();
        let class = if INTRINSICS.contains(&lowercase.as_str()) {
            ParseClass::IntrinsicCall
        } else {
            ParseClass::PartRef
        };
        Ok(ParseNode::new(class, &name.lexeme, subscripts))
    }
    /// A subscript or a section subscript such as `1:n` or `:`.
    fn subscript(&mut self) -> Result<Arc<ParseNode>> {
        if self.peek().kind == TokenKind::Identifier && self.peek_n(1).is_op("=") {
            return Err(self.error(self.peek(), "Keyword arguments are not supported"));
        }
        let lower = if self.check_op(":") {
            None
        } else {
            Some(self.expression()?)
        };
        if !self.match_op(":") {
            return match lower {
                Some(lower) => Ok(lower),
                None => Err(self.error(self.peek(), "Expected subscript")),
            };
        }
        let ends_bound = |p: &Self| p.check_op(")") || p.check_op(",") || p.check_op(":");
        let upper = if ends_bound(self) {
            None
        } else {
            Some(self.expression()?)
        };
        let stride = if self.match_op(":") {
            Some(self.expression()?)
        } else {
            None
        };
        let text = |bound: &Option<Arc<ParseNode>>| {
            bound.as_ref().map(|b| b.to_string()).unwrap_or_default()
        };
        let mut string = format!("{}:{}", text(&lower), text(&upper));
        if stride.is_some() {
            string = format!("{string}:{}", text(&stride));
        }
        let items = [lower, upper, stride].into_iter().flatten().collect();
        Ok(ParseNode::new(ParseClass::SectionSubscript, &string, items))
    }
}

/// Declarations.
impl StatementParser<'_> {
    fn type_spec(&mut self) -> Result<TypeSpec> {
        let token = self.expect_identifier()?;
        let name = token.lexeme.to_lowercase();
        if name == "type" || name == "class" {
            self.expect_op("(")?;
            let derived = if self.check_op("*") {
                self.advance().lexeme
            } else {
                self.expect_identifier()?.lexeme
            };
            self.expect_op(")")?;
            return Ok(TypeSpec::Derived(derived));
        }
        let name = match name.as_str() {
            "double" => {
                self.expect_identifier()?;
                "double precision".to_string()
            }
            "doubleprecision" => "double precision".to_string(),
            _ => name,
        };
        let kind = if self.match_op("(") {
            if self.peek().kind == TokenKind::Identifier && self.peek_n(1).is_op("=") {
                self.advance();
                self.advance();
            }
            let kind = if self.check_op("*") {
                self.advance().lexeme
            } else {
                self.expression()?.to_string()
            };
            self.expect_op(")")?;
            Some(kind)
        } else if self.match_op("*") {
            Some(self.advance().lexeme)
        } else {
            None
        };
        Ok(TypeSpec::Intrinsic { name, kind })
    }
    fn attribute(&mut self) -> Result<Attribute> {
        let word = self.expect_identifier()?;
        match word.lexeme.to_lowercase().as_str() {
            "intent" => {
                self.expect_op("(")?;
                let spec = self.expect_identifier()?;
                let mut spec = spec.lexeme.to_lowercase();
                if spec == "in" && self.check_word("out") {
                    self.advance();
                    spec = "inout".to_string();
                }
                let intent = match spec.as_str() {
                    "in" => Intent::In,
                    "out" => Intent::Out,
                    "inout" => Intent::InOut,
                    _ => return Err(self.error(&word, "Expected 'in', 'out' or 'inout'")),
                };
                self.expect_op(")")?;
                Ok(Attribute::Intent(intent))
            }
            "dimension" => {
                self.expect_op("(")?;
                let dims = self.dim_list()?;
                self.expect_op(")")?;
                Ok(Attribute::Dimension(dims))
            }
            _ => {
                let mut text = word.lexeme;
                if self.check_op("(") {
                    text.push_str(&self.balanced_text()?);
                }
                Ok(Attribute::Other(text))
            }
        }
    }
    fn dim_list(&mut self) -> Result<Vec<DimSpec>> {
        let mut dims = vec![];
        loop {
            dims.push(self.dim_spec()?);
            if !self.match_op(",") {
                break;
            }
        }
        Ok(dims)
    }
    fn dim_spec(&mut self) -> Result<DimSpec> {
        let closes = |p: &Self| p.check_op(",") || p.check_op(")");
        if self.match_op("*") {
            return Ok(DimSpec::AssumedSize);
        }
        if self.match_op(":") {
            return Ok(DimSpec::AssumedShape);
        }
        let first = self.expression()?;
        if !self.match_op(":") {
            return Ok(DimSpec::Explicit(first));
        }
        if self.match_op("*") {
            return Ok(DimSpec::AssumedSize);
        }
        if closes(self) {
            return Ok(DimSpec::AssumedShape);
        }
        Ok(DimSpec::Explicit(self.expression()?))
    }
    fn entity(&mut self) -> Result<Entity> {
        let name = self.expect_identifier()?.lexeme;
        let dims = if self.match_op("(") {
            let dims = self.dim_list()?;
            self.expect_op(")")?;
            Some(dims)
        } else {
            None
        };
        let char_len = if self.match_op("*") {
            if self.check_op("(") {
                Some(self.balanced_text()?)
            } else {
                Some(self.advance().lexeme)
            }
        } else {
            None
        };
        let initialization = if self.match_op("=") || self.match_op("=>") {
            Some(self.expression()?.to_string())
        } else {
            None
        };
        Ok(Entity {
            name,
            dims,
            char_len,
            initialization,
        })
    }
    fn declaration(&mut self, text: String) -> Result<Declaration> {
        let type_spec = self.type_spec()?;
        let mut attributes = vec![];
        while self.match_op(",") {
            attributes.push(self.attribute()?);
        }
        self.match_op("::");
        let mut entities = vec![];
        loop {
            entities.push(self.entity()?);
            if !self.match_op(",") {
                break;
            }
        }
        self.expect_end()?;
        Ok(Declaration {
            type_spec,
            attributes,
            entities,
            text,
        })
    }
}

struct Reader<'a> {
    src: &'a str,
    statements: Vec<Statement>,
    current: usize,
}

impl<'a> Reader<'a> {
    fn peek_statement(&self) -> Option<&Statement> {
        self.statements.get(self.current)
    }
    fn next_statement(&mut self) -> Option<Statement> {
        let statement = self.statements.get(self.current).cloned();
        self.current += 1;
        statement
    }
    fn skip_until_end(&mut self, kind: &str) {
        while let Some(statement) = self.next_statement() {
            if statement.is_end(kind, false) {
                break;
            }
        }
    }
    fn program(&mut self) -> Result<ModuleAst> {
        let mut modules = vec![];
        while let Some(statement) = self.next_statement() {
            let is_module = statement.starts_with(&["module"])
                && !statement.starts_with(&["module", "procedure"])
                && !statement.is_subroutine_header();
            if is_module {
                modules.push(self.module(&statement)?);
            }
        }
        if modules.len() > 1 {
            return Err(generation_error!(
                "Unexpected AST. Just one module definition per file supported."
            ));
        }
        modules.pop().ok_or_else(|| {
            generation_error!("Unexpected kernel AST. Could not find a module definition.")
        })
    }
    fn module(&mut self, header: &Statement) -> Result<ModuleAst> {
        let mut parser = StatementParser::new(self.src, header);
        parser.advance();
        let name = parser.expect_identifier()?.lexeme;
        let mut module = ModuleAst {
            name,
            subroutines: vec![],
        };
        while let Some(statement) = self.next_statement() {
            if statement.is_end("module", true) {
                return Ok(module);
            }
            if statement.is_subroutine_header() {
                let subroutine = self.subroutine(&statement)?;
                module.subroutines.push(subroutine);
            } else if statement.starts_with(&["interface"])
                || statement.starts_with(&["abstract", "interface"])
            {
                self.skip_until_end("interface");
            } else if statement.is_type_definition() {
                self.skip_until_end("type");
            } else if statement.is_function_header() {
                self.skip_until_end("function");
            }
        }
        Err(anyhow::anyhow!(
            "Unexpected end of source, expected 'end module {}'",
            module.name
        ))
    }
    fn subroutine(&mut self, header: &Statement) -> Result<SubroutineAst> {
        let mut parser = StatementParser::new(self.src, header);
        while !parser.check_word("subroutine") && !parser.is_at_end() {
            parser.advance();
        }
        parser.advance();
        let name = parser.expect_identifier()?.lexeme;
        let mut args = vec![];
        if parser.match_op("(") {
            if !parser.check_op(")") {
                loop {
                    args.push(parser.expect_identifier()?.lexeme);
                    if !parser.match_op(",") {
                        break;
                    }
                }
            }
            parser.expect_op(")")?;
        }

        let mut declarations = vec![];
        while let Some(statement) = self.peek_statement() {
            if statement.is_declaration() {
                let statement = statement.clone();
                self.current += 1;
                let mut parser = StatementParser::new(self.src, &statement);
                declarations.push(parser.declaration(statement.text())?);
            } else if statement.is_specification() {
                self.current += 1;
            } else {
                break;
            }
        }

        let expected = format!("end subroutine {name}");
        let (mut body, end) = self.block(|s| s.is_end("subroutine", true), &expected)?;
        body.push(ParseNode::leaf(ParseClass::EndSubroutineStmt, &end.text()));
        Ok(SubroutineAst {
            name,
            args,
            declarations,
            body,
        })
    }
    /// Read executable statements up to and including the terminator.
    fn block(
        &mut self,
        is_terminator: impl Fn(&Statement) -> bool,
        expected: &str,
    ) -> Result<(Vec<Arc<ParseNode>>, Statement)> {
        let mut nodes = vec![];
        while let Some(statement) = self.next_statement() {
            if is_terminator(&statement) {
                return Ok((nodes, statement));
            }
            nodes.push(self.executable(&statement)?);
        }
        Err(anyhow::anyhow!(
            "Unexpected end of source, expected '{expected}'"
        ))
    }
    fn executable(&mut self, statement: &Statement) -> Result<Arc<ParseNode>> {
        if statement.starts_with(&["if"]) {
            return self.if_statement(statement);
        }
        if statement.starts_with(&["do"]) {
            let (body, end) = self.block(|s| s.is_end("do", false), "end do")?;
            let mut items = vec![ParseNode::leaf(ParseClass::DoStmt, &statement.text())];
            items.extend(body);
            items.push(ParseNode::leaf(ParseClass::EndDoStmt, &end.text()));
            return Ok(ParseNode::new(
                ParseClass::DoConstruct,
                &statement.text(),
                items,
            ));
        }
        Ok(self.action(statement))
    }
    /// A statement that may follow a one-line `if`.
    fn action(&self, statement: &Statement) -> Arc<ParseNode> {
        if statement.starts_with(&["call"]) {
            return ParseNode::leaf(ParseClass::CallStmt, &statement.text());
        }
        if let Some(assignment) = self.assignment(statement) {
            return assignment;
        }
        ParseNode::leaf(ParseClass::OtherStmt, &statement.text())
    }
    fn expression(&self, statement: &Statement) -> Result<Arc<ParseNode>> {
        let mut parser = StatementParser::new(self.src, statement);
        let expression = parser.expression()?;
        parser.expect_end()?;
        Ok(expression)
    }
    fn assignment(&self, statement: &Statement) -> Option<Arc<ParseNode>> {
        let eq = statement.assignment_operator()?;
        let lhs = self.expression(&statement.slice(0, eq)).ok()?;
        let is_variable = matches!(
            lhs.class(),
            ParseClass::Name | ParseClass::PartRef | ParseClass::DataRef
        );
        if !is_variable {
            return None;
        }
        let end = statement.tokens.len() - 1;
        let rhs = self.expression(&statement.slice(eq + 1, end)).ok()?;
        Some(ParseNode::new(
            ParseClass::AssignmentStmt,
            &statement.text(),
            vec![lhs, rhs],
        ))
    }
    /// Index just past the `)` that closes the `(` at `open`.
    fn closing_paren(statement: &Statement, open: usize) -> Option<usize> {
        let mut depth = 0;
        for (i, token) in statement.tokens.iter().enumerate().skip(open) {
            if token.is_op("(") {
                depth += 1;
            } else if token.is_op(")") {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
        }
        None
    }
    fn if_statement(&mut self, statement: &Statement) -> Result<Arc<ParseNode>> {
        let text = statement.text();
        let other = || ParseNode::leaf(ParseClass::OtherStmt, &text);
        let opens = statement.tokens.get(1).is_some_and(|t| t.is_op("("));
        let close = match Self::closing_paren(statement, 1) {
            Some(close) if opens => close,
            _ => return Ok(other()),
        };
        let condition = match self.expression(&statement.slice(2, close - 1)) {
            Ok(condition) => condition,
            Err(_) => return Ok(other()),
        };
        let is_construct = statement.tokens[close].is_word("then")
            && statement.tokens.get(close + 1).map(|t| t.kind) == Some(TokenKind::Eof);
        if is_construct {
            let (body, _end) = self.block(|s| s.is_end("if", false), "end if")?;
            let mut items = vec![condition];
            items.extend(body);
            return Ok(ParseNode::new(ParseClass::IfConstruct, &text, items));
        }
        let end = statement.tokens.len() - 1;
        if close >= end {
            return Ok(other());
        }
        let action = self.action(&statement.slice(close, end));
        Ok(ParseNode::new(
            ParseClass::IfStmt,
            &text,
            vec![condition, action],
        ))
    }
}

/// Read the single module in `src`.
pub fn read_module(src: &str) -> Result<ModuleAst> {
    let tokens = Scanner::scan(src)?;
    let mut reader = Reader {
        src,
        statements: split_statements(tokens),
        current: 0,
    };
    reader.program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const KERNEL: &str = indoc! {"
        module testkern_mod
          use argument_mod
          implicit none
          type, extends(kernel_type) :: testkern_type
            type(arg_type) :: meta_args(1) = (/ arg_type(gh_field, gh_write, w3) /)
          contains
            procedure, nopass :: code => testkern_code
          end type testkern_type
        contains
          subroutine testkern_code(nlayers, a, &
                                   & b)
            integer, intent(in) :: nlayers
            real(kind=r_def), dimension(:), intent(inout) :: a
            real(r_def), intent(in) :: b(10) ! comment
            a(1) = 0.5_r_def * (b(2) + nlayers) ! half
            if (nlayers > 1) a(2) = -b(1)
            call helper(a)
          end subroutine testkern_code
        end module testkern_mod
    "};

    #[test]
    fn test_read_module() {
        let module = read_module(KERNEL).unwrap();
        assert_eq!(module.name, "testkern_mod");
        assert_eq!(module.subroutines.len(), 1);
        let sub = module.subroutine("TESTKERN_CODE").unwrap();
        assert_eq!(sub.args, vec!["nlayers", "a", "b"]);

        assert_eq!(sub.declarations.len(), 3);
        let decl = &sub.declarations[1];
        assert_eq!(decl.type_spec.to_string(), "real(kind=r_def)");
        assert_eq!(
            decl.attributes,
            vec![
                Attribute::Dimension(vec![DimSpec::AssumedShape]),
                Attribute::Intent(Intent::InOut)
            ]
        );
        assert_eq!(decl.entities[0].name, "a");
        let decl = &sub.declarations[2];
        assert_eq!(decl.text, "real(r_def), intent(in) :: b(10)");
        let dims = decl.entities[0].dims.as_ref().unwrap();
        assert_eq!(dims[0].to_string(), "10");

        let classes: Vec<ParseClass> = sub.body.iter().map(|n| n.class()).collect();
        assert_eq!(
            classes,
            vec![
                ParseClass::AssignmentStmt,
                ParseClass::IfStmt,
                ParseClass::CallStmt,
                ParseClass::EndSubroutineStmt
            ]
        );
        let assignment = &sub.body[0];
        assert_eq!(assignment.string(), "a(1) = 0.5_r_def * (b(2) + nlayers)");
        assert_eq!(assignment.item(0).unwrap().class(), ParseClass::PartRef);
        let rhs = assignment.item(1).unwrap();
        assert_eq!(rhs.class(), ParseClass::MultExpr);
        assert_eq!(rhs.to_string(), "0.5_r_def * (b(2) + nlayers)");

        let if_stmt = &sub.body[1];
        assert_eq!(if_stmt.item(0).unwrap().class(), ParseClass::RelExpr);
        let action = if_stmt.item(1).unwrap();
        assert_eq!(action.class(), ParseClass::AssignmentStmt);
        assert_eq!(action.string(), "a(2) = -b(1)");
    }

    #[test]
    fn test_precedence() {
        let module = read_module(indoc! {"
            module m
            contains
              subroutine s()
                x = a + b * c ** 2 ** d
                y = .not. p .and. q .or. r
                z(:, 1:n) = f%data(df)
              end subroutine
            end module
        "})
        .unwrap();
        let body = &module.subroutines[0].body;
        let rhs = body[0].item(1).unwrap();
        assert_eq!(rhs.class(), ParseClass::AddExpr);
        let mult = rhs.item(1).unwrap();
        assert_eq!(mult.class(), ParseClass::MultExpr);
        let power = mult.item(1).unwrap();
        assert_eq!(power.class(), ParseClass::PowerExpr);
        assert_eq!(power.item(1).unwrap().class(), ParseClass::PowerExpr);

        let rhs = body[1].item(1).unwrap();
        assert_eq!(rhs.class(), ParseClass::OrExpr);
        let and = rhs.item(0).unwrap();
        assert_eq!(and.class(), ParseClass::AndExpr);
        assert_eq!(and.item(0).unwrap().class(), ParseClass::UnaryExpr);

        let lhs = body[2].item(0).unwrap();
        assert_eq!(lhs.to_string(), "z(:, 1:n)");
        assert_eq!(lhs.item(0).unwrap().class(), ParseClass::SectionSubscript);
        let rhs = body[2].item(1).unwrap();
        assert_eq!(rhs.class(), ParseClass::DataRef);
        assert_eq!(rhs.to_string(), "f%data(df)");
    }

    #[test]
    fn test_constructs() {
        let module = read_module(indoc! {"
            module m
            contains
              subroutine s(a)
                real, intent(inout) :: a(10)
                do i = 1, 10
                  a(i) = 0.0
                end do
                if (a(1) > 0.0) then
                  a(1) = 1.0
                else
                  a(1) = 2.0
                end if
                write(*,*) a; a(2) = 1.0
              end subroutine s
            end module m
        "})
        .unwrap();
        let body = &module.subroutines[0].body;
        assert_eq!(body[0].class(), ParseClass::DoConstruct);
        assert_eq!(body[0].items().len(), 3);
        assert_eq!(body[0].item(2).unwrap().class(), ParseClass::EndDoStmt);
        assert_eq!(body[1].class(), ParseClass::IfConstruct);
        assert_eq!(body[1].items().len(), 4);
        assert_eq!(body[2].class(), ParseClass::OtherStmt);
        assert_eq!(body[3].class(), ParseClass::AssignmentStmt);
    }

    #[test]
    fn test_module_count() {
        let err = read_module("module a\nend module a\nmodule b\nend module b\n").unwrap_err();
        assert!(err.to_string().contains("Just one module definition"));
        let err = read_module("program p\nend program p\n").unwrap_err();
        assert!(err.to_string().contains("Could not find a module definition"));
    }
}
