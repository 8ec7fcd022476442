use crate::error::transformation_error;
use crate::ir::GuardedNode;
use crate::ir::Loop;
use crate::ir::Node;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::applied;
use crate::transform::check_loop;
use crate::transform::validated;
use crate::transform::Memento;
use crate::transform::TransArgs;
use crate::transform::Transformation;
use anyhow::Result;

/// Fuse two adjacent loops into one.
///
/// The body of the second loop is appended to the body of the first.
pub struct LoopFuseTrans;

const NAME: &str = "LoopFuseTrans";

fn loops(args: &TransArgs) -> Result<(Shared<Node>, Shared<Node>)> {
    match args.targets.as_slice() {
        [first, second] => Ok((first.clone(), second.clone())),
        targets => Err(transformation_error!(
            "Error in {NAME} transformation. Expected two loops but got {} nodes",
            targets.len()
        )),
    }
}

fn loop_of(node: &Shared<Node>) -> Result<Loop> {
    node.rd()
        .as_loop()
        .cloned()
        .ok_or_else(|| transformation_error!("Error in {NAME} transformation. Not a loop"))
}

impl Transformation for LoopFuseTrans {
    fn name(&self) -> &'static str {
        NAME
    }
    fn description(&self) -> &'static str {
        "Fuses two adjacent loops together"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let (first, second) = loops(args)?;
        check_loop(&first, NAME)?;
        check_loop(&second, NAME)?;
        if !first.same_parent(&second) {
            return Err(transformation_error!(
                "Error in {NAME} transformation. Loops do not have the same parent"
            ));
        }
        if first.position() + 1 != second.position() {
            return Err(transformation_error!(
                "Error in {NAME} transformation. Nodes are not siblings who are next to each \
                 other"
            ));
        }
        let (l1, l2) = (loop_of(&first)?, loop_of(&second)?);
        if !args.same_space && l1.field_space() != l2.field_space() {
            return Err(transformation_error!(
                "Error in {NAME} transformation. Cannot fuse loops that are over different \
                 spaces: {} {}",
                l1.field_space(),
                l2.field_space()
            ));
        }
        if l1.iteration_space() != l2.iteration_space() {
            return Err(transformation_error!(
                "Error in {NAME} transformation. Loops do not have the same iteration space: \
                 {} {}",
                l1.iteration_space(),
                l2.iteration_space()
            ));
        }
        if l1.start() != l2.start() || l1.stop() != l2.stop() || l1.step() != l2.step() {
            return Err(transformation_error!(
                "Error in {NAME} transformation. Cannot fuse loops with different bounds: \
                 ({}, {}) and ({}, {})",
                l1.start(),
                l1.stop(),
                l2.start(),
                l2.stop()
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let (first, second) = loops(args)?;
        let parent = first
            .parent()
            .ok_or_else(|| transformation_error!("Error in {NAME} transformation. No parent"))?;
        let mut memento = Memento::new(NAME);
        memento.record_children(&parent);
        memento.record_children(&first);
        memento.record_children(&second);
        second.detach();
        for child in second.children() {
            first.addchild(child, None);
        }
        applied(self, &first, memento)
    }
}
