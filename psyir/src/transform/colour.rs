use crate::error::transformation_error;
use crate::ir::GuardedNode;
use crate::ir::Loop;
use crate::ir::Node;
use crate::ir::NodeKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::applied;
use crate::transform::check_loop;
use crate::transform::validated;
use crate::transform::Memento;
use crate::transform::TransArgs;
use crate::transform::Transformation;
use anyhow::Result;

/// Split a loop over cells into a loop over colours and a loop over the
/// cells of each colour.
///
/// Cells of one colour share no dofs, so the inner loop can be run in
/// parallel even when kernels increment a field.
pub struct ColourTrans;

const NAME: &str = "ColourTrans";

/// Name of the colour loop variable, unique within the invoke.
fn colour_variable(node: &Shared<Node>) -> String {
    let root = node.root();
    let namespace = root.rd().as_schedule().map(|s| s.namespace());
    match namespace {
        Some(namespace) => namespace.wr().create_name_in("colour", "PSyVars", "colour"),
        None => "colour".to_string(),
    }
}

impl Transformation for ColourTrans {
    fn name(&self) -> &'static str {
        NAME
    }
    fn description(&self) -> &'static str {
        "Split a loop into colours"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let node = args.target(NAME)?;
        check_loop(&node, NAME)?;
        let node = node.rd();
        let l = node
            .as_loop()
            .ok_or_else(|| transformation_error!("Error in {NAME} transformation. Not a loop"))?;
        if l.iteration_space() != "cells" {
            return Err(transformation_error!(
                "Error in {NAME} transformation. Only loops over cells can be coloured but \
                 this loop iterates over '{}'",
                l.iteration_space()
            ));
        }
        if matches!(l.loop_type(), Some("colours") | Some("colour")) {
            return Err(transformation_error!(
                "Error in {NAME} transformation. The target loop is already coloured"
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let node = args.target(NAME)?;
        let parent = node
            .parent()
            .ok_or_else(|| transformation_error!("Error in {NAME} transformation. No parent"))?;
        let original = node
            .rd()
            .as_loop()
            .cloned()
            .ok_or_else(|| transformation_error!("Error in {NAME} transformation. Not a loop"))?;
        let mut memento = Memento::new(NAME);
        memento.record_children(&parent);
        memento.record_children(&node);

        let colour = colour_variable(&node);
        let outer = Loop::new(&colour, "1", "ncolour")
            .with_field_space(original.field_space())
            .with_iteration_space("colours")
            .with_loop_type("colours")?;
        let stop = format!("ncp_colour({colour})");
        let mut inner = Loop::new(original.variable_name(), "1", &stop)
            .with_field_space(original.field_space())
            .with_iteration_space("colour")
            .with_loop_type("colour")?;
        if let Some(step) = original.step() {
            inner = inner.with_step(step);
        }
        let outer = Node::new(NodeKind::Loop(outer));
        let inner = Node::new(NodeKind::Loop(inner));
        inner.set_children(node.children());
        outer.addchild(inner, None);
        node.replace_with(outer.clone())?;
        applied(self, &outer, memento)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Schedule;
    use indoc::indoc;

    fn schedule(l: Loop) -> (Shared<Node>, Shared<Node>) {
        let schedule = Node::new(NodeKind::Schedule(Schedule::standalone("invoke_0")));
        let node = Node::new(NodeKind::Loop(l));
        schedule.addchild(node.clone(), None);
        (schedule, node)
    }

    #[test]
    fn test_colour() {
        let (schedule, node) = schedule(
            Loop::new("cell", "1", "ncell")
                .with_field_space("w1")
                .with_iteration_space("cells"),
        );
        let body = Node::new(NodeKind::Extract);
        node.addchild(body.clone(), None);
        let (_, memento) = ColourTrans.apply(&TransArgs::new(&node)).unwrap();
        let expected = indoc! {"
            Schedule[invoke='invoke_0']
              Loop[type='colours',field_space='w1',it_space='colours']
                Loop[type='colour',field_space='w1',it_space='colour']
                  Extract[]
        "};
        assert_eq!(schedule.view(), expected);
        let inner = schedule.loops()[1].clone();
        assert_eq!(inner.rd().as_loop().unwrap().stop(), "ncp_colour(colour)");
        assert!(body.parent().unwrap().ptr_eq(&inner));

        let err = ColourTrans.validate(&TransArgs::new(&inner)).unwrap_err();
        assert!(err.to_string().contains("iterates over 'colour'"));

        memento.undo();
        assert!(schedule.children()[0].ptr_eq(&node));
        assert!(body.parent().unwrap().ptr_eq(&node));
    }

    #[test]
    fn test_dofs_loop() {
        let (_, node) = schedule(Loop::new("df", "1", "ndf").with_iteration_space("dofs"));
        let err = ColourTrans.apply(&TransArgs::new(&node)).err().unwrap();
        assert!(err.to_string().starts_with("Transformation Error: "));
        assert!(err.to_string().contains("Only loops over cells can be coloured"));
    }
}
