//! Intermediate representation (IR) of the PSy layer.
//!
//! The tree is made of [Node]s that are shared via [crate::shared::Shared].
//! The kind of a node decides what it holds (for example a [Loop] or a
//! [Kern]) and how it is lowered to Fortran by [gen_code].

mod argument;
mod call;
mod dag;
mod data_access;
mod directive;
mod expr;
mod gen;
mod halo;
mod kern;
mod loops;
mod node;
mod schedule;
mod symbol;

pub use argument::Access;
pub use argument::ArgCategory;
pub use argument::ArgInfo;
pub use argument::ArgMeta;
pub use argument::ArgType;
pub use argument::Argument;
pub use argument::Intent;
pub use argument::ScalarType;
pub use call::BuiltIn;
pub use call::BuiltInKind;
pub use call::Call;
pub use dag::Dag;
pub use dag::DagEdge;
pub use data_access::DataAccess;
pub use directive::Directive;
pub use directive::VALID_OMP_SCHEDULES;
pub use expr::BinaryOperation;
pub use expr::CodeBlock;
pub use expr::Literal;
pub use expr::Reference;
pub use gen::gen_code;
pub use gen::GenContext;
pub use halo::GlobalSum;
pub use halo::HaloExchange;
pub use kern::new_name;
pub use kern::Kern;
pub use loops::Loop;
pub use loops::VALID_LOOP_TYPES;
pub use node::label;
pub use node::walk;
pub use node::GuardedNode;
pub use node::Node;
pub use node::NodeClass;
pub use node::NodeKind;
pub use node::Position;
pub use schedule::KernelSchedule;
pub use schedule::Schedule;
pub use symbol::DataType;
pub use symbol::Scope;
pub use symbol::Symbol;
pub use symbol::SymbolTable;

pub fn spaces(indent: i32) -> String {
    "  ".repeat(indent as usize)
}
