use crate::frontend::ParseNode;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    name: String,
}

impl Reference {
    pub fn new(name: &str) -> Reference {
        Reference {
            name: name.to_string(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Literal {
    value: String,
}

impl Literal {
    pub fn new(value: &str) -> Literal {
        Literal {
            value: value.to_string(),
        }
    }
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Binary operation; the children are the two operands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryOperation {
    operator: String,
}

impl BinaryOperation {
    pub fn new(operator: &str) -> BinaryOperation {
        BinaryOperation {
            operator: operator.to_string(),
        }
    }
    pub fn operator(&self) -> &str {
        &self.operator
    }
}

/// Statements that are kept as parse-tree fragments because they could not
/// be lowered.
#[derive(Clone, Debug)]
pub struct CodeBlock {
    statements: Vec<Arc<ParseNode>>,
}

impl CodeBlock {
    pub fn new(statements: Vec<Arc<ParseNode>>) -> CodeBlock {
        CodeBlock { statements }
    }
    pub fn statements(&self) -> &[Arc<ParseNode>] {
        &self.statements
    }
    pub fn push(&mut self, statement: Arc<ParseNode>) {
        self.statements.push(statement);
    }
    pub fn label(&self) -> String {
        format!("CodeBlock[{} statements]", self.statements.len())
    }
}
