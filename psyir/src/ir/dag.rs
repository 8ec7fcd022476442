use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;

/// Edge in the dependence graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DagEdge {
    pub from: String,
    pub to: String,
    /// `green` for forward dependences, `red` for backward dependences and
    /// `blue` for parent-child relations.
    pub colour: String,
}

/// Vertices and edges of the dependence graph of a tree.
///
/// A node with children is represented by a `_start` and an `_end` vertex.
#[derive(Clone, Debug, Default)]
pub struct Dag {
    pub vertices: Vec<String>,
    pub edges: Vec<DagEdge>,
}

/// Unique name of `node` in the dependence graph.
pub fn dag_name(node: &Shared<Node>) -> Result<String> {
    let kind = node.rd().kind().clone();
    let name = match kind {
        NodeKind::Schedule(_) | NodeKind::KernelSchedule(_) => "schedule".to_string(),
        NodeKind::Directive(directive) => {
            format!("{}_{}", directive.dag_prefix(), node.abs_position()?)
        }
        NodeKind::Loop(l) => match l.loop_type() {
            Some(loop_type) => format!("loop_[{loop_type}]_{}", node.abs_position()?),
            None => format!("loop_{}", node.abs_position()?),
        },
        NodeKind::Kern(kern) => {
            format!("kernel_{}_{}", kern.name(), node.abs_position()?)
        }
        NodeKind::BuiltIn(builtin) => {
            format!("builtin_{}_{}", builtin.call().name(), node.abs_position()?)
        }
        NodeKind::HaloExchange(halo) => {
            let name = format!("haloexchange({})_{}", halo.field().name(), node.position());
            if halo.check_dirty() {
                format!("check{name}")
            } else {
                name
            }
        }
        NodeKind::GlobalSum(sum) => {
            format!("globalsum({})_{}", sum.scalar().name(), node.position())
        }
        _ => format!("node_{}", node.abs_position()?),
    };
    Ok(name)
}

impl Dag {
    /// Dependence graph of `node` and everything below it.
    pub fn new(node: &Shared<Node>) -> Result<Dag> {
        let mut dag = Dag::default();
        dag.add(node)?;
        Ok(dag)
    }
    fn edge(&mut self, from: String, to: String, colour: &str) {
        self.edges.push(DagEdge {
            from,
            to,
            colour: colour.to_string(),
        });
    }
    fn add(&mut self, node: &Shared<Node>) -> Result<()> {
        let name = dag_name(node)?;
        let has_children = !node.children().is_empty();
        let vertex = |suffix: &str| {
            if has_children {
                format!("{name}{suffix}")
            } else {
                name.clone()
            }
        };
        if has_children {
            self.vertices.push(format!("{name}_start"));
            self.vertices.push(format!("{name}_end"));
        } else {
            self.vertices.push(name.clone());
        }
        let with_suffix = |remote: &Shared<Node>, suffix: &str| -> Result<String> {
            let remote_name = dag_name(remote)?;
            if remote.children().is_empty() {
                Ok(remote_name)
            } else {
                Ok(format!("{remote_name}{suffix}"))
            }
        };
        if let Some(remote) = node.forward_dependence()? {
            self.edge(vertex("_end"), with_suffix(&remote, "_start")?, "green");
        } else if let Some(parent) = node.parent() {
            self.edge(vertex("_end"), format!("{}_end", dag_name(&parent)?), "blue");
        }
        if let Some(remote) = node.backward_dependence()? {
            self.edge(with_suffix(&remote, "_end")?, vertex("_start"), "red");
        } else if let Some(parent) = node.parent() {
            self.edge(format!("{}_start", dag_name(&parent)?), vertex("_start"), "blue");
        }
        for child in node.children() {
            self.add(&child)?;
        }
        Ok(())
    }
}
