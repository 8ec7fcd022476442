//! Reading kernel source code.
//!
//! The [Scanner] turns Fortran text into a lossless token stream. On top of
//! that, [KernelSource] edits kernel files token by token and [read_module]
//! builds the parse tree that is lowered into the expression IR.

mod ast;
mod reader;
mod scanner;
mod source;
mod token;

pub use ast::Attribute;
pub use ast::Declaration;
pub use ast::DimSpec;
pub use ast::Entity;
pub use ast::ModuleAst;
pub use ast::ParseClass;
pub use ast::ParseNode;
pub use ast::SubroutineAst;
pub use ast::TypeSpec;
pub use reader::read_module;
pub use scanner::Scanner;
pub use source::KernelSource;
pub use token::Location;
pub use token::Token;
pub use token::TokenKind;
