//! Transformations of the PSy-layer tree.
//!
//! A transformation first validates that the requested restructuring keeps
//! the meaning of the program and only then mutates the tree. It returns the
//! schedule together with a [Memento] that can undo the change.

use crate::error::transformation_error;
use crate::error::usage_error;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::ir::NodeKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use tracing::debug;
use tracing::info;

mod acc;
mod colour;
mod extract;
mod inline;
mod loop_fuse;
mod movement;
mod ocl;
mod omp;

pub use acc::ACCEnterDataTrans;
pub use acc::ACCLoopTrans;
pub use acc::ACCParallelTrans;
pub use acc::ACCRoutineTrans;
pub use colour::ColourTrans;
pub use extract::ExtractRegionTrans;
pub use extract::Extractor;
pub use inline::KernelModuleInlineTrans;
pub use loop_fuse::LoopFuseTrans;
pub use movement::MoveTrans;
pub use ocl::OCLTrans;
pub use omp::OMPLoopTrans;
pub use omp::OMPParallelLoopTrans;
pub use omp::OMPParallelTrans;

/// Nodes and options that a transformation is applied to.
///
/// Each transformation reads only the options that apply to it.
#[derive(Clone, Debug, Default)]
pub struct TransArgs {
    pub targets: Vec<Shared<Node>>,
    /// `before` or `after`, relative to `location`.
    pub position: Option<String>,
    pub location: Option<Shared<Node>>,
    pub omp_schedule: Option<String>,
    pub reprod: Option<bool>,
    pub collapse: Option<usize>,
    pub independent: Option<bool>,
    /// Fuse loops even when their field spaces differ.
    pub same_space: bool,
}

impl TransArgs {
    pub fn new(target: &Shared<Node>) -> Self {
        TransArgs {
            targets: vec![target.clone()],
            ..Default::default()
        }
    }
    pub fn nodes(targets: &[Shared<Node>]) -> Self {
        TransArgs {
            targets: targets.to_vec(),
            ..Default::default()
        }
    }
    pub fn with_position(mut self, position: &str) -> Self {
        self.position = Some(position.to_string());
        self
    }
    pub fn with_location(mut self, location: &Shared<Node>) -> Self {
        self.location = Some(location.clone());
        self
    }
    pub fn with_omp_schedule(mut self, omp_schedule: &str) -> Self {
        self.omp_schedule = Some(omp_schedule.to_string());
        self
    }
    pub fn with_reprod(mut self, reprod: bool) -> Self {
        self.reprod = Some(reprod);
        self
    }
    pub fn with_collapse(mut self, collapse: usize) -> Self {
        self.collapse = Some(collapse);
        self
    }
    pub fn with_independent(mut self, independent: bool) -> Self {
        self.independent = Some(independent);
        self
    }
    pub fn with_same_space(mut self, same_space: bool) -> Self {
        self.same_space = same_space;
        self
    }
    /// The first target.
    pub fn target(&self, name: &str) -> Result<Shared<Node>> {
        self.targets
            .first()
            .cloned()
            .ok_or_else(|| transformation_error!("No node was supplied to {name}"))
    }
}

enum Snapshot {
    Children {
        parent: Shared<Node>,
        children: Vec<Shared<Node>>,
    },
    Kind {
        node: Shared<Node>,
        kind: NodeKind,
    },
}

/// Record of the state that a transformation changed.
pub struct Memento {
    transformation: &'static str,
    snapshots: Vec<Snapshot>,
}

impl Memento {
    pub fn new(transformation: &'static str) -> Self {
        Memento {
            transformation,
            snapshots: vec![],
        }
    }
    pub fn transformation(&self) -> &'static str {
        self.transformation
    }
    /// Remember the current children of `parent`.
    pub fn record_children(&mut self, parent: &Shared<Node>) {
        self.snapshots.push(Snapshot::Children {
            parent: parent.clone(),
            children: parent.children(),
        });
    }
    /// Remember the current kind (and therefore the attributes) of `node`.
    pub fn record_kind(&mut self, node: &Shared<Node>) {
        let kind = node.rd().kind().clone();
        self.snapshots.push(Snapshot::Kind {
            node: node.clone(),
            kind,
        });
    }
    /// Restore the recorded state.
    pub fn undo(self) {
        debug!("Undoing {}", self.transformation);
        for snapshot in self.snapshots.into_iter().rev() {
            match snapshot {
                Snapshot::Children { parent, children } => parent.set_children(children),
                Snapshot::Kind { node, kind } => node.wr().set_kind(kind, &node),
            }
        }
    }
}

/// A restructuring of the tree that keeps the meaning of the program.
pub trait Transformation: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Check whether the transformation can be applied.
    ///
    /// This method is not allowed to mutate the tree.
    fn validate(&self, _args: &TransArgs) -> Result<()> {
        Ok(())
    }
    /// Apply the transformation and return the schedule.
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)>;
}

/// Run the validation of `trans` and log a rejection.
pub(crate) fn validated(trans: &dyn Transformation, args: &TransArgs) -> Result<()> {
    if let Err(err) = trans.validate(args) {
        debug!("Rejected {}: {err}", trans.name());
        return Err(err);
    }
    Ok(())
}

/// Log the application of `trans` and return the changed schedule.
pub(crate) fn applied(
    trans: &dyn Transformation,
    node: &Shared<Node>,
    memento: Memento,
) -> Result<(Shared<Node>, Memento)> {
    info!("Applied {}", trans.name());
    Ok((node.root(), memento))
}

/// Check that `node` is a loop.
pub(crate) fn check_loop(node: &Shared<Node>, trans: &str) -> Result<()> {
    let node = node.rd();
    if !node.is(NodeClass::Loop) {
        return Err(transformation_error!(
            "Target of {trans} transformation must be a sub-class of Loop but got '{}'",
            node.type_name()
        ));
    }
    Ok(())
}

/// Check that `nodes` are consecutive children of one parent and return
/// that parent.
pub(crate) fn check_siblings(nodes: &[Shared<Node>], trans: &str) -> Result<Shared<Node>> {
    let first = nodes.first().ok_or_else(|| {
        transformation_error!("Cannot apply {trans} to an empty list of nodes")
    })?;
    let parent = first.parent().ok_or_else(|| {
        transformation_error!("Cannot apply {trans} to a node that has no parent")
    })?;
    let mut previous = first.position();
    for node in &nodes[1..] {
        if !node.same_parent(first) {
            return Err(transformation_error!(
                "Error in {trans} transformation: supplied nodes are not children of the \
                 same parent."
            ));
        }
        if node.position() != previous + 1 {
            return Err(transformation_error!(
                "Children are not consecutive children of one parent: child '{}' has \
                 position {} but previous child had position {previous}.",
                node.rd().type_name(),
                node.position()
            ));
        }
        previous = node.position();
    }
    Ok(parent)
}

/// Refuse nodes (or their descendants) of the given classes.
pub(crate) fn check_excluded(
    nodes: &[Shared<Node>],
    excluded: &[NodeClass],
    trans: &str,
) -> Result<()> {
    for node in nodes {
        let mut all = vec![node.clone()];
        all.extend(node.walk(NodeClass::Node));
        for member in all {
            let member = member.rd();
            if excluded.iter().any(|class| member.is(*class)) {
                return Err(transformation_error!(
                    "Nodes of type '{}' cannot be enclosed by a {trans} transformation",
                    member.type_name()
                ));
            }
        }
    }
    Ok(())
}

/// Move the consecutive siblings `nodes` into a new node of `kind` that
/// takes their place.
pub(crate) fn wrap(
    parent: &Shared<Node>,
    nodes: &[Shared<Node>],
    kind: NodeKind,
) -> Result<Shared<Node>> {
    let first = nodes
        .first()
        .ok_or_else(|| transformation_error!("No nodes to enclose"))?;
    let index = first.position();
    let wrapper = Node::new(kind);
    for node in nodes {
        node.detach();
    }
    wrapper.set_children(nodes.to_vec());
    parent.addchild(wrapper.clone(), Some(index));
    Ok(wrapper)
}

/// Registry of the available transformations.
pub struct TransInfo {
    transformations: Vec<Box<dyn Transformation>>,
}

impl Default for TransInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl TransInfo {
    /// All transformations, ordered by name.
    pub fn new() -> Self {
        TransInfo::with(vec![
            Box::new(ACCEnterDataTrans),
            Box::new(ACCLoopTrans),
            Box::new(ACCParallelTrans),
            Box::new(ACCRoutineTrans),
            Box::new(ColourTrans),
            Box::new(ExtractRegionTrans),
            Box::new(KernelModuleInlineTrans),
            Box::new(LoopFuseTrans),
            Box::new(MoveTrans),
            Box::new(OCLTrans),
            Box::new(OMPLoopTrans),
            Box::new(OMPParallelLoopTrans),
            Box::new(OMPParallelTrans),
        ])
    }
    pub fn with(transformations: Vec<Box<dyn Transformation>>) -> Self {
        TransInfo { transformations }
    }
    /// Human readable list of the transformations.
    pub fn list(&self) -> String {
        let mut result = if self.transformations.len() == 1 {
            "There is 1 transformation available:\n".to_string()
        } else {
            format!(
                "There are {} transformations available:\n",
                self.transformations.len()
            )
        };
        for (i, trans) in self.transformations.iter().enumerate() {
            result.push_str(&format!(
                "  {}: {}: {}\n",
                i + 1,
                trans.name(),
                trans.description()
            ));
        }
        result
    }
    pub fn num_trans(&self) -> usize {
        self.transformations.len()
    }
    /// Transformation by its 1-based number in [TransInfo::list].
    pub fn get_trans_num(&self, number: usize) -> Result<&dyn Transformation> {
        if number < 1 || number > self.transformations.len() {
            return Err(usage_error!("Invalid transformation number supplied"));
        }
        Ok(self.transformations[number - 1].as_ref())
    }
    pub fn get_trans_name(&self, name: &str) -> Result<&dyn Transformation> {
        match self.transformations.iter().find(|t| t.name() == name) {
            Some(trans) => Ok(trans.as_ref()),
            None => {
                let names: Vec<&str> = self.transformations.iter().map(|t| t.name()).collect();
                Err(usage_error!(
                    "Invalid transformation name: got {name} but expected one of {names:?}"
                ))
            }
        }
    }
}
