//! Lowering of kernel parse trees into the expression IR.
//!
//! Every parse-tree class is mapped to a handler. Classes without a handler
//! are not an error: the statements are collected into [CodeBlock] nodes so
//! that the resulting [KernelSchedule] still covers the whole kernel.

use crate::error::generation_error;
use crate::error::internal_error;
use crate::error::not_implemented;
use crate::frontend::read_module;
use crate::frontend::Attribute;
use crate::frontend::Declaration;
use crate::frontend::DimSpec;
use crate::frontend::ModuleAst;
use crate::frontend::ParseClass;
use crate::frontend::ParseNode;
use crate::frontend::TypeSpec;
use crate::ir::BinaryOperation;
use crate::ir::CodeBlock;
use crate::ir::DataType;
use crate::ir::GuardedNode;
use crate::ir::Intent;
use crate::ir::Kern;
use crate::ir::KernelSchedule;
use crate::ir::Literal;
use crate::ir::Node;
use crate::ir::NodeKind;
use crate::ir::Reference;
use crate::ir::Scope;
use crate::ir::Symbol;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Outcome of lowering one parse-tree fragment.
pub enum Lowered {
    Node(Shared<Node>),
    /// The fragment carries no information (such as `end do`).
    Ignored,
    /// There is no handler for the fragment.
    Unsupported,
}

pub type Handler = fn(&Arc<ParseNode>) -> Result<Lowered>;

fn handler(class: ParseClass) -> Option<Handler> {
    use ParseClass as P;
    let handler: Handler = match class {
        P::AssignmentStmt => assignment_handler,
        P::Name => name_handler,
        P::Parenthesis => parenthesis_handler,
        P::PartRef => part_ref_handler,
        P::IfStmt => if_stmt_handler,
        P::NumberBase => number_handler,
        P::BinaryOpBase => binary_op_handler,
        P::EndDoStmt | P::EndSubroutineStmt => ignore_handler,
        _ => return None,
    };
    Some(handler)
}

/// Handler for `class`, falling back along the chain of supertypes.
pub fn find_handler(class: ParseClass) -> Option<Handler> {
    let mut current = Some(class);
    while let Some(class) = current {
        if let Some(handler) = handler(class) {
            return Some(handler);
        }
        current = class.supertype();
    }
    None
}

fn create_child(node: &Arc<ParseNode>) -> Result<Lowered> {
    match find_handler(node.class()) {
        Some(handler) => handler(node),
        None => Ok(Lowered::Unsupported),
    }
}

fn flush_code_block(parent: &Shared<Node>, statements: &mut Vec<Arc<ParseNode>>) {
    if statements.is_empty() {
        return;
    }
    debug!(
        "Keeping {} unsupported statement(s) as a CodeBlock, starting at '{}'",
        statements.len(),
        statements[0]
    );
    let block = CodeBlock::new(std::mem::take(statements));
    parent.addchild(Node::new(NodeKind::CodeBlock(block)), None);
}

/// Lower `nodes` and append the results to `parent`.
///
/// Consecutive unsupported fragments end up in a single code block.
pub fn process_nodes(parent: &Shared<Node>, nodes: &[Arc<ParseNode>]) -> Result<()> {
    let mut unsupported = vec![];
    for node in nodes {
        match create_child(node)? {
            Lowered::Node(child) => {
                flush_code_block(parent, &mut unsupported);
                parent.addchild(child, None);
            }
            Lowered::Ignored => (),
            Lowered::Unsupported => unsupported.push(node.clone()),
        }
    }
    flush_code_block(parent, &mut unsupported);
    Ok(())
}

/// The first `n` items of `node`.
fn items(node: &Arc<ParseNode>, n: usize) -> Result<&[Arc<ParseNode>]> {
    node.items().get(..n).ok_or_else(|| {
        internal_error!(
            "Expected {n} items in '{node}' but found {}",
            node.items().len()
        )
    })
}

/// Create a node for `origin` with the given children lowered one by one.
fn with_children(
    kind: NodeKind,
    origin: &Arc<ParseNode>,
    children: &[Arc<ParseNode>],
) -> Result<Lowered> {
    let node = Node::with_origin(kind, origin.clone());
    for child in children {
        process_nodes(&node, std::slice::from_ref(child))?;
    }
    Ok(Lowered::Node(node))
}

fn ignore_handler(_node: &Arc<ParseNode>) -> Result<Lowered> {
    Ok(Lowered::Ignored)
}

fn if_stmt_handler(node: &Arc<ParseNode>) -> Result<Lowered> {
    with_children(NodeKind::IfBlock, node, items(node, 2)?)
}

fn assignment_handler(node: &Arc<ParseNode>) -> Result<Lowered> {
    with_children(NodeKind::Assignment, node, items(node, 2)?)
}

fn binary_op_handler(node: &Arc<ParseNode>) -> Result<Lowered> {
    let operation = BinaryOperation::new(node.string());
    with_children(NodeKind::BinaryOperation(operation), node, items(node, 2)?)
}

fn name_handler(node: &Arc<ParseNode>) -> Result<Lowered> {
    let reference = Reference::new(node.string());
    Ok(Lowered::Node(Node::with_origin(
        NodeKind::Reference(reference),
        node.clone(),
    )))
}

/// Parentheses disappear; the inner expression takes their place.
fn parenthesis_handler(node: &Arc<ParseNode>) -> Result<Lowered> {
    let inner = &items(node, 1)?[0];
    create_child(inner)
}

fn part_ref_handler(node: &Arc<ParseNode>) -> Result<Lowered> {
    let array = Node::with_origin(
        NodeKind::ArrayReference(Reference::new(node.string())),
        node.clone(),
    );
    process_nodes(&array, node.items())?;
    Ok(Lowered::Node(array))
}

/// The literal value excludes the kind parameter (`1.0_r_def` is `1.0`).
fn number_handler(node: &Arc<ParseNode>) -> Result<Lowered> {
    let value = match node.string().split_once('_') {
        Some((value, _kind)) => value,
        None => node.string(),
    };
    Ok(Lowered::Node(Node::with_origin(
        NodeKind::Literal(Literal::new(value)),
        node.clone(),
    )))
}

/// Shape of a dimension attribute; `None` marks an unknown extent.
fn parse_dimensions(decl: &Declaration, dims: &[DimSpec]) -> Result<Vec<Option<usize>>> {
    let mut shape = vec![];
    for dim in dims {
        match dim {
            DimSpec::AssumedSize => {
                return Err(not_implemented!(
                    "Could not process {decl}. Assumed-size arrays are not supported."
                ))
            }
            DimSpec::AssumedShape => shape.push(None),
            DimSpec::Explicit(bound) => {
                let extent = match bound.class() {
                    ParseClass::IntLiteral => bound.string().split('_').next(),
                    _ => None,
                };
                match extent.and_then(|e| e.parse::<usize>().ok()) {
                    Some(extent) => shape.push(Some(extent)),
                    None => {
                        return Err(not_implemented!(
                            "Could not process {decl}. Only integer literals are supported \
                             for explicit shape array declarations."
                        ))
                    }
                }
            }
        }
    }
    Ok(shape)
}

/// Declare the variables of `decls` in the symbol table of `schedule`.
///
/// Variables without an intent are provisionally local. Once all
/// declarations are processed, `arg_list` turns the arguments among them into
/// global arguments.
pub fn process_declarations(
    schedule: &Shared<Node>,
    decls: &[Declaration],
    arg_list: &[String],
) -> Result<()> {
    let mut node = schedule.wr();
    let kernel_schedule = node
        .as_kernel_schedule_mut()
        .ok_or_else(|| internal_error!("declarations can only be added to a kernel schedule"))?;
    let symbol_table = kernel_schedule.symbol_table_mut();
    for decl in decls {
        let datatype = match &decl.type_spec {
            TypeSpec::Intrinsic { name, .. }
                if matches!(name.as_str(), "real" | "integer" | "character") =>
            {
                DataType::from_str(name)?
            }
            _ => {
                return Err(not_implemented!(
                    "Could not process {decl}. Only 'real', 'integer' and 'character' \
                     intrinsic types are supported."
                ))
            }
        };
        let mut shape = vec![];
        let mut scope = Scope::Local;
        let mut is_input = false;
        let mut is_output = false;
        for attribute in &decl.attributes {
            match attribute {
                Attribute::Intent(intent) => {
                    scope = Scope::GlobalArgument;
                    match intent {
                        Intent::In => is_input = true,
                        Intent::Out => is_output = true,
                        Intent::InOut => {
                            is_input = true;
                            is_output = true;
                        }
                    }
                }
                Attribute::Dimension(dims) => shape = parse_dimensions(decl, dims)?,
                Attribute::Other(other) => {
                    return Err(not_implemented!(
                        "Could not process {decl}. Unrecognized attribute '{other}'."
                    ))
                }
            }
        }
        for entity in &decl.entities {
            if entity.dims.is_some() {
                return Err(not_implemented!(
                    "Could not process {decl}. Array specifications after the variable \
                     name are not supported."
                ));
            }
            if entity.initialization.is_some() {
                return Err(not_implemented!(
                    "Could not process {decl}. Initializations on the declaration \
                     statements are not supported."
                ));
            }
            if entity.char_len.is_some() {
                return Err(not_implemented!(
                    "Could not process {decl}. Character length specifications are not \
                     supported."
                ));
            }
            let symbol = Symbol::new(
                &entity.name,
                datatype,
                shape.clone(),
                scope,
                is_input,
                is_output,
            )?;
            symbol_table.declare(symbol)?;
        }
    }
    symbol_table.specify_argument_list(arg_list).map_err(|_| {
        internal_error!(
            "The kernel argument list '{}' does not match the variable declarations of \
             kernel '{}'.",
            arg_list.join(", "),
            kernel_schedule.name()
        )
    })
}

/// Build the [KernelSchedule] of subroutine `name` in `module`.
pub fn generate_schedule(name: &str, module: &ModuleAst) -> Result<Shared<Node>> {
    let subroutine = module.subroutine(name).ok_or_else(|| {
        generation_error!("Unexpected kernel AST. Could not find subroutine: {name}")
    })?;
    let schedule = Node::new(NodeKind::KernelSchedule(KernelSchedule::new(name)));
    process_declarations(&schedule, &subroutine.declarations, &subroutine.args)?;
    process_nodes(&schedule, &subroutine.body)?;
    debug!(
        "Lowered kernel {name} into {} top-level node(s)",
        schedule.children().len()
    );
    Ok(schedule)
}

/// Build the [KernelSchedule] of the kernel subroutine called by `kern`.
pub fn kernel_schedule(kern: &Kern) -> Result<Shared<Node>> {
    let source = kern.source().ok_or_else(|| {
        generation_error!("kernel '{}' has no source to build a schedule from", kern.name())
    })?;
    let module = read_module(&source.to_string())?;
    generate_schedule(kern.name(), &module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PsyError;
    use indoc::indoc;

    fn schedule(body: &str) -> Result<Shared<Node>> {
        let src = format!(
            "module m\ncontains\nsubroutine k(a, n)\n\
             real, dimension(:), intent(inout) :: a\n\
             integer :: n\n\
             {body}\nend subroutine k\nend module m\n"
        );
        let module = read_module(&src)?;
        generate_schedule("k", &module)
    }

    #[test]
    fn test_find_handler() {
        assert!(find_handler(ParseClass::AssignmentStmt).is_some());
        assert!(find_handler(ParseClass::MultExpr).is_some());
        assert!(find_handler(ParseClass::RealLiteral).is_some());
        assert!(find_handler(ParseClass::DoConstruct).is_none());
        assert!(find_handler(ParseClass::CharLiteral).is_none());
    }

    #[test]
    fn test_assignment() {
        let schedule = schedule("a(n) = (1.0_r_def + n) * 2").unwrap();
        let expected = indoc! {"
            Schedule[name:'k']
              Assignment[]
                ArrayReference[name:'a']
                  Reference[name:'n']
                BinaryOperation[operator:'*']
                  BinaryOperation[operator:'+']
                    Literal[value:'1.0']
                    Reference[name:'n']
                  Literal[value:'2']
        "};
        assert_eq!(schedule.view(), expected);
        let assignment = &schedule.children()[0];
        let origin = assignment.rd().origin().unwrap();
        assert_eq!(origin.class(), ParseClass::AssignmentStmt);
    }

    #[test]
    fn test_code_blocks() {
        let body = indoc! {"
            write(*,*) n
            call foo(a)
            if (n > 1) a(1) = abs(a(2))
            do n = 1, 2
            end do
        "};
        let schedule = schedule(body).unwrap();
        let expected = indoc! {"
            Schedule[name:'k']
              CodeBlock[2 statements]
              If[]
                BinaryOperation[operator:'>']
                  Reference[name:'n']
                  Literal[value:'1']
                Assignment[]
                  ArrayReference[name:'a']
                    Literal[value:'1']
                  CodeBlock[1 statements]
              CodeBlock[1 statements]
        "};
        assert_eq!(schedule.view(), expected);
    }

    #[test]
    fn test_declarations() {
        let schedule = schedule("").unwrap();
        let guard = schedule.rd();
        let table = guard.as_kernel_schedule().unwrap().symbol_table();
        let expected = indoc! {"
            Symbol Table:
            a<real, [:], global_argument>
            n<integer, [], global_argument>
        "};
        assert_eq!(table.to_string(), expected);
        let n = table.lookup("n").unwrap();
        assert!(n.is_input() && n.is_output());
        let args: Vec<&str> = table.argument_list().iter().map(|s| s.name()).collect();
        assert_eq!(args, vec!["a", "n"]);
    }

    #[test]
    fn test_unsupported_declarations() {
        let cases = [
            ("logical, intent(in) :: l", "Only 'real', 'integer' and 'character'"),
            ("real, save :: r", "Unrecognized attribute 'save'"),
            ("real, dimension(*) :: r", "Assumed-size arrays are not supported."),
            ("real, dimension(n) :: r", "Only integer literals are supported"),
            ("real :: r(10)", "Array specifications after the variable name"),
            ("real :: r = 1.0", "Initializations on the declaration statements"),
            ("character :: c*4", "Character length specifications"),
        ];
        for (decl, msg) in cases {
            let src = format!(
                "module m\ncontains\nsubroutine k()\n{decl}\nend subroutine k\nend module m\n"
            );
            let module = read_module(&src).unwrap();
            let err = generate_schedule("k", &module).unwrap_err();
            assert!(err.to_string().contains(msg), "{decl}: {err}");
            let err = err.downcast_ref::<PsyError>().unwrap();
            assert!(matches!(err, PsyError::NotImplemented(_)));
        }
    }

    #[test]
    fn test_generate_schedule_errors() {
        let module = read_module("module m\ncontains\nsubroutine k(x)\nend subroutine k\nend module m\n")
            .unwrap();
        let err = generate_schedule("other", &module).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Generation Error: Unexpected kernel AST. Could not find subroutine: other"
        );
        let err = generate_schedule("k", &module).unwrap_err();
        assert!(err
            .to_string()
            .contains("The kernel argument list 'x' does not match"));
    }
}
