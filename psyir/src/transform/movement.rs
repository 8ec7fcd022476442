use crate::error::transformation_error;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::Position;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::applied;
use crate::transform::validated;
use crate::transform::Memento;
use crate::transform::TransArgs;
use crate::transform::Transformation;
use anyhow::Result;
use std::str::FromStr;

/// Move a node to just before or just after a sibling.
///
/// The move is refused when it would reorder two nodes that depend on each
/// other.
pub struct MoveTrans;

const NAME: &str = "MoveTrans";

fn location(args: &TransArgs) -> Result<(Shared<Node>, Shared<Node>, Position)> {
    let node = args.target(NAME)?;
    let location = args.location.clone().ok_or_else(|| {
        transformation_error!("In the {NAME} transformation no location was supplied")
    })?;
    let position = Position::from_str(args.position.as_deref().unwrap_or("before"))?;
    Ok((node, location, position))
}

impl Transformation for MoveTrans {
    fn name(&self) -> &'static str {
        NAME
    }
    fn description(&self) -> &'static str {
        "Move a node to a different location"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let (node, location, _) = location(args)?;
        if !node.same_parent(&location) {
            return Err(transformation_error!(
                "In the {NAME} transformation the node '{}' and the location '{}' do not \
                 have the same parent",
                node.rd().type_name(),
                location.rd().type_name()
            ));
        }
        let position = args.position.as_deref().unwrap_or("before");
        if !node.is_valid_location(&location, position)? {
            return Err(transformation_error!(
                "In the {NAME} transformation it is not valid to move from '{}' to '{}' as \
                 this breaks data dependencies for node '{}'",
                node.abs_position()?,
                location.abs_position()?,
                node.rd().type_name()
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let (node, location, position) = location(args)?;
        let parent = node
            .parent()
            .ok_or_else(|| transformation_error!("In the {NAME} transformation no parent"))?;
        let mut memento = Memento::new(NAME);
        memento.record_children(&parent);
        node.detach();
        let index = match position {
            Position::Before => location.position(),
            Position::After => location.position() + 1,
        };
        parent.addchild(node.clone(), Some(index));
        applied(self, &node, memento)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Access;
    use crate::ir::ArgType;
    use crate::ir::Argument;
    use crate::ir::Call;
    use crate::ir::Kern;
    use crate::ir::Loop;
    use crate::ir::NodeKind;
    use crate::ir::Schedule;

    fn kern_loop(name: &str, args: &[(&str, Access)]) -> Shared<Node> {
        let args = args
            .iter()
            .map(|(text, access)| Argument::named(text, *access, ArgType::Field))
            .collect();
        let call = Call::new(name, args).unwrap();
        let l = Loop::new("cell", "1", "ncell")
            .with_field_space("w1")
            .with_iteration_space("cells");
        let node = Node::new(NodeKind::Loop(l));
        node.addchild(Node::new(NodeKind::Kern(Kern::new(call, "m_mod"))), None);
        node
    }

    fn names(schedule: &Shared<Node>) -> Vec<String> {
        schedule
            .kern_calls()
            .iter()
            .map(|k| k.rd().as_kern().unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_move() {
        let schedule = Node::new(NodeKind::Schedule(Schedule::standalone("invoke_0")));
        let a = kern_loop("a_code", &[("f1", Access::Write)]);
        let b = kern_loop("b_code", &[("f2", Access::Write)]);
        let c = kern_loop("c_code", &[("f1", Access::Read), ("f3", Access::Write)]);
        schedule.set_children(vec![a.clone(), b.clone(), c.clone()]);

        // c reads what a writes.
        let args = TransArgs::new(&c).with_location(&a);
        let err = MoveTrans.validate(&args).unwrap_err();
        assert!(err.to_string().contains("breaks data dependencies"));

        let args = TransArgs::new(&c).with_location(&b);
        let (_, memento) = MoveTrans.apply(&args).unwrap();
        assert_eq!(names(&schedule), vec!["a_code", "c_code", "b_code"]);
        memento.undo();
        assert_eq!(names(&schedule), vec!["a_code", "b_code", "c_code"]);

        let args = TransArgs::new(&a).with_location(&b).with_position("after");
        MoveTrans.apply(&args).unwrap();
        assert_eq!(names(&schedule), vec!["b_code", "a_code", "c_code"]);
    }

    #[test]
    fn test_missing_location() {
        let schedule = Node::new(NodeKind::Schedule(Schedule::standalone("invoke_0")));
        let a = kern_loop("a_code", &[("f1", Access::Write)]);
        schedule.addchild(a.clone(), None);
        let err = MoveTrans.validate(&TransArgs::new(&a)).unwrap_err();
        assert!(err.to_string().contains("no location was supplied"));
        let inner = a.children()[0].clone();
        let err = MoveTrans
            .validate(&TransArgs::new(&inner).with_location(&a))
            .unwrap_err();
        assert!(err.to_string().contains("do not have the same parent"));
    }
}
