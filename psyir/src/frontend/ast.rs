//! Low-level parse tree of kernel source code.
//!
//! These fragments are what the lowering in [crate::lower] consumes. They are
//! deliberately generic (a class, a string and a list of items) so that nodes
//! can keep a handle to the fragment they originate from.

use crate::ir::Intent;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParseClass {
    // Statements
    AssignmentStmt,
    IfStmt,
    IfConstruct,
    DoConstruct,
    DoStmt,
    EndDoStmt,
    EndSubroutineStmt,
    CallStmt,
    OtherStmt,

    // Expressions
    Name,
    PartRef,
    DataRef,
    IntrinsicCall,
    Parenthesis,
    SectionSubscript,
    UnaryExpr,
    PowerExpr,
    MultExpr,
    AddExpr,
    ConcatExpr,
    RelExpr,
    AndExpr,
    OrExpr,
    EquivExpr,
    IntLiteral,
    RealLiteral,
    CharLiteral,
    LogicalLiteral,

    // Abstract classes that only exist as supertypes.
    BinaryOpBase,
    NumberBase,
}

impl ParseClass {
    /// The class that this class specialises, if any.
    pub fn supertype(self) -> Option<ParseClass> {
        use ParseClass::*;
        match self {
            PowerExpr | MultExpr | AddExpr | ConcatExpr | RelExpr | AndExpr | OrExpr
            | EquivExpr => Some(BinaryOpBase),
            IntLiteral | RealLiteral => Some(NumberBase),
            _ => None,
        }
    }
    pub fn is_binary_op(self) -> bool {
        self.supertype() == Some(ParseClass::BinaryOpBase)
    }
}

/// One fragment of the parse tree.
///
/// For names and literals, `string` holds the lexeme. For operators it holds
/// the operator and for part references the name. For statements it holds
/// the whitespace-normalised source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseNode {
    class: ParseClass,
    string: String,
    items: Vec<Arc<ParseNode>>,
}

impl ParseNode {
    pub fn new(class: ParseClass, string: &str, items: Vec<Arc<ParseNode>>) -> Arc<ParseNode> {
        Arc::new(ParseNode {
            class,
            string: string.to_string(),
            items,
        })
    }
    pub fn leaf(class: ParseClass, string: &str) -> Arc<ParseNode> {
        Self::new(class, string, vec![])
    }
    pub fn class(&self) -> ParseClass {
        self.class
    }
    pub fn string(&self) -> &str {
        &self.string
    }
    pub fn items(&self) -> &[Arc<ParseNode>] {
        &self.items
    }
    pub fn item(&self, index: usize) -> Option<&Arc<ParseNode>> {
        self.items.get(index)
    }
}

impl ParseNode {
    fn joined(&self, separator: &str) -> String {
        self.items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl Display for ParseNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ParseClass::*;
        match (self.class, self.items.as_slice()) {
            (Parenthesis, [inner]) => write!(f, "({inner})"),
            (UnaryExpr, [operand]) => write!(f, "{}{operand}", self.string),
            (class, [lhs, rhs]) if class.is_binary_op() => {
                write!(f, "{lhs} {} {rhs}", self.string)
            }
            (PartRef | IntrinsicCall, _) => write!(f, "{}({})", self.string, self.joined(", ")),
            (DataRef, _) => write!(f, "{}", self.joined("%")),
            _ => write!(f, "{}", self.string),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSpec {
    Intrinsic { name: String, kind: Option<String> },
    Derived(String),
}

impl Display for TypeSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeSpec::Intrinsic { name, kind: None } => write!(f, "{name}"),
            TypeSpec::Intrinsic {
                name,
                kind: Some(kind),
            } => write!(f, "{name}(kind={kind})"),
            TypeSpec::Derived(name) => write!(f, "type({name})"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DimSpec {
    /// `:`
    AssumedShape,
    /// `*`
    AssumedSize,
    /// An explicit upper bound such as `10` or `n`.
    Explicit(Arc<ParseNode>),
}

impl Display for DimSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DimSpec::AssumedShape => write!(f, ":"),
            DimSpec::AssumedSize => write!(f, "*"),
            DimSpec::Explicit(bound) => write!(f, "{bound}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attribute {
    Intent(Intent),
    Dimension(Vec<DimSpec>),
    Other(String),
}

/// One declared name, such as `a(10) = 0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    /// Array specification after the name.
    pub dims: Option<Vec<DimSpec>>,
    /// Character length after the name (`*n`).
    pub char_len: Option<String>,
    pub initialization: Option<String>,
}

/// A type declaration statement such as `real, intent(in) :: a(10), b`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub type_spec: TypeSpec,
    pub attributes: Vec<Attribute>,
    pub entities: Vec<Entity>,
    pub text: String,
}

impl Display for Declaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubroutineAst {
    pub name: String,
    pub args: Vec<String>,
    pub declarations: Vec<Declaration>,
    pub body: Vec<Arc<ParseNode>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleAst {
    pub name: String,
    pub subroutines: Vec<SubroutineAst>,
}

impl ModuleAst {
    pub fn subroutine(&self, name: &str) -> Option<&SubroutineAst> {
        let name = name.to_lowercase();
        self.subroutines
            .iter()
            .find(|s| s.name.to_lowercase() == name)
    }
}

#[test]
fn test_supertype_chain() {
    assert_eq!(ParseClass::AddExpr.supertype(), Some(ParseClass::BinaryOpBase));
    assert_eq!(ParseClass::RealLiteral.supertype(), Some(ParseClass::NumberBase));
    assert_eq!(ParseClass::BinaryOpBase.supertype(), None);
    assert!(ParseClass::RelExpr.is_binary_op());
    assert!(!ParseClass::UnaryExpr.is_binary_op());
}
