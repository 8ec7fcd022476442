use crate::error::transformation_error;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::applied;
use crate::transform::validated;
use crate::transform::Memento;
use crate::transform::TransArgs;
use crate::transform::Transformation;
use anyhow::Result;

/// Generate the schedule as OpenCL host code.
///
/// The loops of the schedule are then left to the OpenCL runtime.
pub struct OCLTrans;

const NAME: &str = "OCLTrans";

impl Transformation for OCLTrans {
    fn name(&self) -> &'static str {
        NAME
    }
    fn description(&self) -> &'static str {
        "Switch on/off the generation of an OpenCL PSy layer"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let node = args.target(NAME)?;
        if node.rd().as_schedule().is_none() {
            return Err(transformation_error!(
                "Error in {NAME}: the supplied node must be a (sub-class of) Schedule but got \
                 '{}'",
                node.rd().type_name()
            ));
        }
        if !node.walk(NodeClass::Directive).is_empty() {
            return Err(transformation_error!(
                "Error in {NAME}: the schedule contains directives. Cannot generate OpenCL \
                 for such a schedule."
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let node = args.target(NAME)?;
        let mut memento = Memento::new(NAME);
        memento.record_kind(&node);
        if let Some(schedule) = node.wr().as_schedule_mut() {
            schedule.set_opencl(true);
        }
        applied(self, &node, memento)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Directive;
    use crate::ir::Loop;
    use crate::ir::NodeKind;
    use crate::ir::Schedule;
    use indoc::indoc;

    #[test]
    fn test_opencl() {
        let schedule = Node::new(NodeKind::Schedule(Schedule::standalone("invoke_0")));
        let l = Node::new(NodeKind::Loop(Loop::new("cell", "1", "ncell")));
        schedule.addchild(l.clone(), None);
        let (_, memento) = OCLTrans.apply(&TransArgs::new(&schedule)).unwrap();
        let expected = indoc! {"
            Schedule[invoke='invoke_0'][OpenCL]
              Loop[type='',field_space='',it_space='']
        "};
        assert_eq!(schedule.view(), expected);
        memento.undo();
        assert!(!schedule.rd().as_schedule().unwrap().opencl());

        let err = OCLTrans.validate(&TransArgs::new(&l)).unwrap_err();
        assert!(err.to_string().contains("must be a (sub-class of) Schedule but got 'Loop'"));

        let directive = Node::new(NodeKind::Directive(Directive::OmpParallel));
        schedule.addchild(directive, None);
        let err = OCLTrans.validate(&TransArgs::new(&schedule)).unwrap_err();
        assert!(err.to_string().contains("the schedule contains directives"));
    }
}
