//! Builder tree of Fortran fragments.

use crate::ir::spaces;
use crate::ir::Intent;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::shared::WeakShared;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sentinel {
    Omp,
    Acc,
}

impl Display for Sentinel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentinel::Omp => write!(f, "!$omp"),
            Sentinel::Acc => write!(f, "!$acc"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenKind {
    Module {
        name: String,
    },
    Subroutine {
        name: String,
        args: Vec<String>,
    },
    Use {
        module: String,
        only: Vec<String>,
    },
    Decl {
        datatype: String,
        kind: Option<String>,
        entities: Vec<String>,
        intent: Option<Intent>,
        attributes: Vec<String>,
        initial: Option<String>,
    },
    TypeDecl {
        type_name: String,
        entities: Vec<String>,
        intent: Option<Intent>,
    },
    Assign {
        lhs: String,
        rhs: String,
    },
    Call {
        name: String,
        args: Vec<String>,
    },
    Do {
        variable: String,
        start: String,
        stop: String,
        step: Option<String>,
    },
    IfThen {
        condition: String,
    },
    Directive {
        sentinel: Sentinel,
        content: String,
    },
    Comment(String),
    Allocate(String),
    Deallocate(String),
    /// Verbatim source such as an inlined kernel subroutine.
    Raw(String),
}

impl GenKind {
    pub fn decl(datatype: &str, entities: &[&str]) -> GenKind {
        GenKind::Decl {
            datatype: datatype.to_string(),
            kind: None,
            entities: entities.iter().map(|e| e.to_string()).collect(),
            intent: None,
            attributes: vec![],
            initial: None,
        }
    }
    pub fn use_only(module: &str, only: &[&str]) -> GenKind {
        GenKind::Use {
            module: module.to_string(),
            only: only.iter().map(|o| o.to_string()).collect(),
        }
    }
    pub fn assign(lhs: &str, rhs: &str) -> GenKind {
        GenKind::Assign {
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
        }
    }
    pub fn call(name: &str, args: Vec<String>) -> GenKind {
        GenKind::Call {
            name: name.to_string(),
            args,
        }
    }
    pub fn do_loop(variable: &str, start: &str, stop: &str) -> GenKind {
        GenKind::Do {
            variable: variable.to_string(),
            start: start.to_string(),
            stop: stop.to_string(),
            step: None,
        }
    }
    pub fn omp(content: &str) -> GenKind {
        GenKind::Directive {
            sentinel: Sentinel::Omp,
            content: content.to_string(),
        }
    }
    pub fn acc(content: &str) -> GenKind {
        GenKind::Directive {
            sentinel: Sentinel::Acc,
            content: content.to_string(),
        }
    }
    pub fn comment(text: &str) -> GenKind {
        GenKind::Comment(text.to_string())
    }
    /// Whether the fragment belongs in the specification part of the
    /// enclosing program unit.
    fn is_specification(&self) -> bool {
        matches!(
            self,
            GenKind::Use { .. } | GenKind::Decl { .. } | GenKind::TypeDecl { .. }
        )
    }
    fn is_program_unit(&self) -> bool {
        matches!(self, GenKind::Module { .. } | GenKind::Subroutine { .. })
    }
}

/// Fluent setters for declarations.
impl GenKind {
    pub fn with_kind(mut self, new_kind: &str) -> GenKind {
        if let GenKind::Decl { kind, .. } = &mut self {
            *kind = Some(new_kind.to_string());
        }
        self
    }
    pub fn with_intent(mut self, new_intent: Intent) -> GenKind {
        match &mut self {
            GenKind::Decl { intent, .. } | GenKind::TypeDecl { intent, .. } => {
                *intent = Some(new_intent)
            }
            _ => (),
        }
        self
    }
    pub fn with_attribute(mut self, attribute: &str) -> GenKind {
        if let GenKind::Decl { attributes, .. } = &mut self {
            attributes.push(attribute.to_string());
        }
        self
    }
    pub fn with_initial(mut self, value: &str) -> GenKind {
        if let GenKind::Decl { initial, .. } = &mut self {
            *initial = Some(value.to_string());
        }
        self
    }
}

#[derive(Debug)]
pub struct GenNode {
    kind: GenKind,
    specification: Vec<Shared<GenNode>>,
    children: Vec<Shared<GenNode>>,
    parent: Option<WeakShared<GenNode>>,
}

impl GenNode {
    pub fn new(kind: GenKind) -> Shared<GenNode> {
        Shared::new(
            GenNode {
                kind,
                specification: vec![],
                children: vec![],
                parent: None,
            }
            .into(),
        )
    }
    pub fn module(name: &str) -> Shared<GenNode> {
        GenNode::new(GenKind::Module {
            name: name.to_string(),
        })
    }
    pub fn subroutine(name: &str, args: Vec<String>) -> Shared<GenNode> {
        GenNode::new(GenKind::Subroutine {
            name: name.to_string(),
            args,
        })
    }
    pub fn kind(&self) -> &GenKind {
        &self.kind
    }
    pub fn children(&self) -> &[Shared<GenNode>] {
        &self.children
    }
    pub fn specification(&self) -> &[Shared<GenNode>] {
        &self.specification
    }
    fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        let pad = spaces(indent);
        let inner = |f: &mut Formatter<'_>, nodes: &[Shared<GenNode>]| -> std::fmt::Result {
            for node in nodes {
                node.rd().display(f, indent + 1)?;
            }
            Ok(())
        };
        // `use` statements have to precede the declarations.
        let (uses, declarations): (Vec<_>, Vec<_>) = self
            .specification
            .iter()
            .cloned()
            .partition(|s| matches!(s.rd().kind, GenKind::Use { .. }));
        match &self.kind {
            GenKind::Module { name } => {
                writeln!(f, "{pad}module {name}")?;
                inner(f, &uses)?;
                inner(f, &declarations)?;
                if !self.children.is_empty() {
                    writeln!(f, "{pad}contains")?;
                    inner(f, &self.children)?;
                }
                writeln!(f, "{pad}end module {name}")
            }
            GenKind::Subroutine { name, args } => {
                writeln!(f, "{pad}subroutine {name}({})", args.join(", "))?;
                inner(f, &uses)?;
                inner(f, &declarations)?;
                inner(f, &self.children)?;
                writeln!(f, "{pad}end subroutine {name}")
            }
            GenKind::Use { module, only } if only.is_empty() => writeln!(f, "{pad}use {module}"),
            GenKind::Use { module, only } => {
                writeln!(f, "{pad}use {module}, only: {}", only.join(", "))
            }
            GenKind::Decl {
                datatype,
                kind,
                entities,
                intent,
                attributes,
                initial,
            } => {
                write!(f, "{pad}{datatype}")?;
                if let Some(kind) = kind {
                    write!(f, "(kind={kind})")?;
                }
                for attribute in attributes {
                    write!(f, ", {attribute}")?;
                }
                if let Some(intent) = intent {
                    write!(f, ", intent({intent})")?;
                }
                write!(f, " :: {}", entities.join(", "))?;
                if let Some(initial) = initial {
                    write!(f, " = {initial}")?;
                }
                writeln!(f)
            }
            GenKind::TypeDecl {
                type_name,
                entities,
                intent,
            } => {
                write!(f, "{pad}type({type_name})")?;
                if let Some(intent) = intent {
                    write!(f, ", intent({intent})")?;
                }
                writeln!(f, " :: {}", entities.join(", "))
            }
            GenKind::Assign { lhs, rhs } => writeln!(f, "{pad}{lhs} = {rhs}"),
            GenKind::Call { name, args } => writeln!(f, "{pad}call {name}({})", args.join(", ")),
            GenKind::Do {
                variable,
                start,
                stop,
                step,
            } => {
                write!(f, "{pad}do {variable} = {start}, {stop}")?;
                if let Some(step) = step {
                    write!(f, ", {step}")?;
                }
                writeln!(f)?;
                inner(f, &self.children)?;
                writeln!(f, "{pad}end do")
            }
            GenKind::IfThen { condition } => {
                writeln!(f, "{pad}if ({condition}) then")?;
                inner(f, &self.children)?;
                writeln!(f, "{pad}end if")
            }
            GenKind::Directive { sentinel, content } => writeln!(f, "{pad}{sentinel} {content}"),
            GenKind::Comment(text) => writeln!(f, "{pad}! {text}"),
            GenKind::Allocate(text) => writeln!(f, "{pad}allocate ({text})"),
            GenKind::Deallocate(text) => writeln!(f, "{pad}deallocate ({text})"),
            GenKind::Raw(text) => {
                for line in text.lines() {
                    if line.trim().is_empty() {
                        writeln!(f)?;
                    } else {
                        writeln!(f, "{pad}{}", line.trim_end())?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl Display for GenNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f, 0)
    }
}

/// Tree operations on a shared [GenNode].
pub trait GuardedGenNode {
    /// Append a fragment.
    ///
    /// `use` statements and declarations move up to the specification part
    /// of the enclosing program unit, where exact duplicates are dropped.
    fn add(&self, kind: GenKind) -> Shared<GenNode>;
    fn parent(&self) -> Option<Shared<GenNode>>;
    /// The closest enclosing module or subroutine (including self).
    fn program_unit(&self) -> Option<Shared<GenNode>>;
}

impl GuardedGenNode for Shared<GenNode> {
    fn add(&self, kind: GenKind) -> Shared<GenNode> {
        if kind.is_specification() {
            if let Some(unit) = self.program_unit() {
                let existing = unit
                    .rd()
                    .specification
                    .iter()
                    .find(|s| s.rd().kind == kind)
                    .cloned();
                if let Some(existing) = existing {
                    return existing;
                }
                let node = GenNode::new(kind);
                node.wr().parent = Some(Arc::downgrade(&unit));
                unit.wr().specification.push(node.clone());
                return node;
            }
        }
        let node = GenNode::new(kind);
        node.wr().parent = Some(Arc::downgrade(self));
        self.wr().children.push(node.clone());
        node
    }
    fn parent(&self) -> Option<Shared<GenNode>> {
        self.rd().parent.as_ref().and_then(|p| p.upgrade())
    }
    fn program_unit(&self) -> Option<Shared<GenNode>> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.rd().kind.is_program_unit() {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_declarations_move_to_specification() {
        let sub = GenNode::subroutine("invoke_0", vec!["f1".to_string()]);
        sub.add(GenKind::TypeDecl {
            type_name: "field_type".to_string(),
            entities: vec!["f1".to_string()],
            intent: Some(Intent::InOut),
        });
        let outer = sub.add(GenKind::do_loop("cell", "1", "ncell"));
        outer.add(GenKind::decl("integer", &["cell"]));
        outer.add(GenKind::call("testkern_code", vec!["f1".to_string()]));
        outer.add(GenKind::use_only("testkern_mod", &["testkern_code"]));
        sub.add(GenKind::decl("integer", &["cell"]));
        let actual = sub.rd().to_string();
        let expected = indoc! {"
            subroutine invoke_0(f1)
              use testkern_mod, only: testkern_code
              type(field_type), intent(inout) :: f1
              integer :: cell
              do cell = 1, ncell
                call testkern_code(f1)
              end do
            end subroutine invoke_0
        "};
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_decl_attributes() {
        let sub = GenNode::subroutine("s", vec![]);
        sub.add(
            GenKind::decl("real", &["l_asum(:,:)"])
                .with_kind("r_def")
                .with_attribute("allocatable"),
        );
        sub.add(
            GenKind::decl("logical", &["first_time"])
                .with_attribute("save")
                .with_initial(".true."),
        );
        let actual = sub.rd().to_string();
        assert!(actual.contains("real(kind=r_def), allocatable :: l_asum(:,:)"));
        assert!(actual.contains("logical, save :: first_time = .true."));
    }
}
