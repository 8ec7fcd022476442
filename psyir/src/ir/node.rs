use crate::error::generation_error;
use crate::error::internal_error;
use crate::error::usage_error;
use crate::frontend::ParseNode;
use crate::ir::spaces;
use crate::ir::Argument;
use crate::ir::BinaryOperation;
use crate::ir::BuiltIn;
use crate::ir::Call;
use crate::ir::CodeBlock;
use crate::ir::Dag;
use crate::ir::DagEdge;
use crate::ir::Directive;
use crate::ir::GlobalSum;
use crate::ir::HaloExchange;
use crate::ir::Kern;
use crate::ir::KernelSchedule;
use crate::ir::Literal;
use crate::ir::Loop;
use crate::ir::Reference;
use crate::ir::Schedule;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::shared::WeakShared;
use anyhow::Result;
use parking_lot::RwLock;
use std::str::FromStr;
use std::sync::Arc;

/// The node kinds of the tree.
#[derive(Clone, Debug)]
pub enum NodeKind {
    Schedule(Schedule),
    KernelSchedule(KernelSchedule),
    Kern(Kern),
    BuiltIn(BuiltIn),
    Loop(Loop),
    Directive(Directive),
    HaloExchange(HaloExchange),
    GlobalSum(GlobalSum),
    /// Region whose input and output data is extracted at run time.
    Extract,
    /// Children are the condition followed by the body.
    IfBlock,
    CodeBlock(CodeBlock),
    /// Children are the left-hand side followed by the right-hand side.
    Assignment,
    Reference(Reference),
    ArrayReference(Reference),
    Literal(Literal),
    BinaryOperation(BinaryOperation),
}

impl NodeKind {
    fn bind_arguments(&mut self, owner: &WeakShared<Node>) {
        match self {
            NodeKind::Kern(kern) => kern.call_mut().bind(owner),
            NodeKind::BuiltIn(builtin) => builtin.call_mut().bind(owner),
            NodeKind::HaloExchange(halo) => halo.field_mut().bind(owner),
            NodeKind::GlobalSum(sum) => sum.scalar_mut().bind(owner),
            _ => (),
        }
    }
}

/// Classification used to search the tree.
///
/// Some classes include others: every kernel is a call and an OpenMP
/// parallel do is both a parallel region and a worksharing loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeClass {
    Node,
    Schedule,
    KernelSchedule,
    Call,
    Kern,
    BuiltIn,
    Loop,
    Directive,
    OmpDirective,
    OmpParallel,
    OmpDo,
    OmpParallelDo,
    AccDirective,
    AccData,
    AccParallel,
    AccLoop,
    HaloExchange,
    GlobalSum,
    Extract,
    IfBlock,
    CodeBlock,
    Assignment,
    Reference,
    ArrayReference,
    Literal,
    BinaryOperation,
}

/// Where to put something relative to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Before,
    After,
}

impl FromStr for Position {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "before" => Ok(Position::Before),
            "after" => Ok(Position::After),
            _ => Err(usage_error!(
                "The position argument must be one of ['before', 'after'] but found '{s}'"
            )),
        }
    }
}

/// Element of the tree.
///
/// A node owns its children and holds a weak handle to its parent.
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    children: Vec<Shared<Node>>,
    parent: Option<WeakShared<Node>>,
    origin: Option<Arc<ParseNode>>,
}

impl Node {
    /// Create a detached node.
    ///
    /// Arguments held by the node are bound to it here so that dependence
    /// analysis can go from an argument back to its owner.
    pub fn new(kind: NodeKind) -> Shared<Node> {
        Arc::new_cyclic(|owner: &WeakShared<Node>| {
            let mut kind = kind;
            kind.bind_arguments(owner);
            RwLock::new(Node {
                kind,
                children: vec![],
                parent: None,
                origin: None,
            })
        })
    }
    pub fn with_origin(kind: NodeKind, origin: Arc<ParseNode>) -> Shared<Node> {
        let node = Node::new(kind);
        node.wr().origin = Some(origin);
        node
    }
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }
    /// Replace the kind, rebinding any arguments to `owner`.
    pub fn set_kind(&mut self, kind: NodeKind, owner: &Shared<Node>) {
        let mut kind = kind;
        kind.bind_arguments(&Arc::downgrade(owner));
        self.kind = kind;
    }
    pub fn children(&self) -> &[Shared<Node>] {
        &self.children
    }
    /// Handle to the parse-tree fragment this node was lowered from.
    pub fn origin(&self) -> Option<Arc<ParseNode>> {
        self.origin.clone()
    }
    pub fn set_origin(&mut self, origin: Option<Arc<ParseNode>>) {
        self.origin = origin;
    }
    pub fn is(&self, class: NodeClass) -> bool {
        use NodeKind as K;
        let directive = match &self.kind {
            K::Directive(directive) => Some(directive),
            _ => None,
        };
        match class {
            NodeClass::Node => true,
            NodeClass::Schedule => matches!(self.kind, K::Schedule(_) | K::KernelSchedule(_)),
            NodeClass::KernelSchedule => matches!(self.kind, K::KernelSchedule(_)),
            NodeClass::Call => matches!(self.kind, K::Kern(_) | K::BuiltIn(_)),
            NodeClass::Kern => matches!(self.kind, K::Kern(_)),
            NodeClass::BuiltIn => matches!(self.kind, K::BuiltIn(_)),
            NodeClass::Loop => matches!(self.kind, K::Loop(_)),
            NodeClass::Directive => directive.is_some(),
            NodeClass::OmpDirective => directive.is_some_and(|d| d.is_omp()),
            NodeClass::OmpParallel => {
                directive.is_some_and(|d| d.is_omp() && d.opens_parallel_region())
            }
            NodeClass::OmpDo => directive.is_some_and(|d| d.is_omp() && d.is_worksharing_loop()),
            NodeClass::OmpParallelDo => {
                directive.is_some_and(|d| matches!(d, Directive::OmpParallelDo { .. }))
            }
            NodeClass::AccDirective => directive.is_some_and(|d| d.is_acc()),
            NodeClass::AccData => directive.is_some_and(|d| matches!(d, Directive::AccData)),
            NodeClass::AccParallel => {
                directive.is_some_and(|d| matches!(d, Directive::AccParallel))
            }
            NodeClass::AccLoop => directive.is_some_and(|d| matches!(d, Directive::AccLoop { .. })),
            NodeClass::HaloExchange => matches!(self.kind, K::HaloExchange(_)),
            NodeClass::GlobalSum => matches!(self.kind, K::GlobalSum(_)),
            NodeClass::Extract => matches!(self.kind, K::Extract),
            NodeClass::IfBlock => matches!(self.kind, K::IfBlock),
            NodeClass::CodeBlock => matches!(self.kind, K::CodeBlock(_)),
            NodeClass::Assignment => matches!(self.kind, K::Assignment),
            NodeClass::Reference => matches!(self.kind, K::Reference(_) | K::ArrayReference(_)),
            NodeClass::ArrayReference => matches!(self.kind, K::ArrayReference(_)),
            NodeClass::Literal => matches!(self.kind, K::Literal(_)),
            NodeClass::BinaryOperation => matches!(self.kind, K::BinaryOperation(_)),
        }
    }
    /// Name of the concrete node type.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Schedule(_) => "Schedule",
            NodeKind::KernelSchedule(_) => "KernelSchedule",
            NodeKind::Kern(_) => "Kern",
            NodeKind::BuiltIn(_) => "BuiltIn",
            NodeKind::Loop(_) => "Loop",
            NodeKind::Directive(directive) => directive.type_name(),
            NodeKind::HaloExchange(_) => "HaloExchange",
            NodeKind::GlobalSum(_) => "GlobalSum",
            NodeKind::Extract => "ExtractNode",
            NodeKind::IfBlock => "IfBlock",
            NodeKind::CodeBlock(_) => "CodeBlock",
            NodeKind::Assignment => "Assignment",
            NodeKind::Reference(_) => "Reference",
            NodeKind::ArrayReference(_) => "Array",
            NodeKind::Literal(_) => "Literal",
            NodeKind::BinaryOperation(_) => "BinaryOperation",
        }
    }
    /// The arguments of a kernel call, halo exchange or global sum.
    pub fn own_args(&self) -> Option<Vec<Argument>> {
        match &self.kind {
            NodeKind::Kern(kern) => Some(kern.call().arguments().to_vec()),
            NodeKind::BuiltIn(builtin) => Some(builtin.call().arguments().to_vec()),
            NodeKind::HaloExchange(halo) => Some(vec![halo.field().clone()]),
            NodeKind::GlobalSum(sum) => Some(vec![sum.scalar().clone()]),
            _ => None,
        }
    }
    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            NodeKind::Kern(kern) => Some(kern.call()),
            NodeKind::BuiltIn(builtin) => Some(builtin.call()),
            _ => None,
        }
    }
    pub fn as_kern(&self) -> Option<&Kern> {
        match &self.kind {
            NodeKind::Kern(kern) => Some(kern),
            _ => None,
        }
    }
    pub fn as_kern_mut(&mut self) -> Option<&mut Kern> {
        match &mut self.kind {
            NodeKind::Kern(kern) => Some(kern),
            _ => None,
        }
    }
    pub fn as_loop(&self) -> Option<&Loop> {
        match &self.kind {
            NodeKind::Loop(l) => Some(l),
            _ => None,
        }
    }
    pub fn as_loop_mut(&mut self) -> Option<&mut Loop> {
        match &mut self.kind {
            NodeKind::Loop(l) => Some(l),
            _ => None,
        }
    }
    pub fn as_directive(&self) -> Option<&Directive> {
        match &self.kind {
            NodeKind::Directive(d) => Some(d),
            _ => None,
        }
    }
    pub fn as_halo_exchange(&self) -> Option<&HaloExchange> {
        match &self.kind {
            NodeKind::HaloExchange(h) => Some(h),
            _ => None,
        }
    }
    pub fn as_global_sum(&self) -> Option<&GlobalSum> {
        match &self.kind {
            NodeKind::GlobalSum(g) => Some(g),
            _ => None,
        }
    }
    pub fn as_schedule(&self) -> Option<&Schedule> {
        match &self.kind {
            NodeKind::Schedule(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_schedule_mut(&mut self) -> Option<&mut Schedule> {
        match &mut self.kind {
            NodeKind::Schedule(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_kernel_schedule(&self) -> Option<&KernelSchedule> {
        match &self.kind {
            NodeKind::KernelSchedule(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_kernel_schedule_mut(&mut self) -> Option<&mut KernelSchedule> {
        match &mut self.kind {
            NodeKind::KernelSchedule(s) => Some(s),
            _ => None,
        }
    }
}

/// Depth-first, pre-order list of `nodes` and all their descendants that are
/// of the given class.
pub fn walk(nodes: &[Shared<Node>], class: NodeClass) -> Vec<Shared<Node>> {
    let mut result = vec![];
    for node in nodes {
        let children = {
            let node_guard = node.rd();
            if node_guard.is(class) {
                result.push(node.clone());
            }
            node_guard.children.clone()
        };
        result.extend(walk(&children, class));
    }
    result
}

/// Tree operations on a shared [Node].
///
/// These need the handle (not only the node) because they depend on the
/// identity of the node within its parent.
pub trait GuardedNode {
    /// Insert a child at `index` (or append) and make this node its parent.
    fn addchild(&self, child: Shared<Node>, index: Option<usize>);
    fn children(&self) -> Vec<Shared<Node>>;
    /// Replace all children and make this node their parent.
    fn set_children(&self, children: Vec<Shared<Node>>);
    fn parent(&self) -> Option<Shared<Node>>;
    /// Rebind the parent handle only; the child lists are left untouched.
    fn set_parent(&self, parent: Option<&Shared<Node>>);
    fn position(&self) -> usize;
    fn abs_position(&self) -> Result<usize>;
    fn depth(&self) -> usize;
    fn root(&self) -> Shared<Node>;
    fn same_parent(&self, other: &Shared<Node>) -> bool;
    /// Descendants of the given class.
    fn walk(&self, class: NodeClass) -> Vec<Shared<Node>>;
    fn ancestor(&self, class: NodeClass, excluding: &[NodeClass]) -> Option<Shared<Node>>;
    /// All nodes after this one in a depth-first walk from the root.
    fn following(&self) -> Vec<Shared<Node>>;
    /// All nodes before this one in a depth-first walk from the root.
    fn preceding(&self, reverse: bool) -> Vec<Shared<Node>>;
    fn calls(&self) -> Vec<Shared<Node>>;
    fn kern_calls(&self) -> Vec<Shared<Node>>;
    fn loops(&self) -> Vec<Shared<Node>>;
    /// Calls with a reduction argument, optionally restricted to those that
    /// do (or do not) use reproducible reductions.
    fn reductions(&self, reprod: Option<bool>) -> Vec<Shared<Node>>;
    /// Whether this call is inside a worksharing loop that asks for
    /// reproducible reductions.
    fn reprod_reduction(&self) -> bool;
    fn is_openmp_parallel(&self) -> bool;
    /// Own arguments for calls, halo exchanges and global sums. Otherwise the
    /// arguments of all calls below this node.
    fn args(&self) -> Vec<Argument>;
    fn backward_dependence(&self) -> Result<Option<Shared<Node>>>;
    fn forward_dependence(&self) -> Result<Option<Shared<Node>>>;
    /// Whether this node can be moved before or after `new_node` without
    /// breaking a data dependence.
    fn is_valid_location(&self, new_node: &Shared<Node>, position: &str) -> Result<bool>;
    /// Remove this node from its parent and return its old position.
    fn detach(&self) -> Option<usize>;
    /// Put `new` in the place of this node.
    fn replace_with(&self, new: Shared<Node>) -> Result<()>;
    fn ptr_eq(&self, other: &Shared<Node>) -> bool;
    fn view(&self) -> String;
    /// Unique name of the node in the dependence graph.
    fn dag_name(&self) -> Result<String>;
    fn dag_edges(&self) -> Result<Vec<DagEdge>>;
}

impl GuardedNode for Shared<Node> {
    fn addchild(&self, child: Shared<Node>, index: Option<usize>) {
        child.set_parent(Some(self));
        let mut node = self.wr();
        match index {
            Some(index) => {
                let index = index.min(node.children.len());
                node.children.insert(index, child);
            }
            None => node.children.push(child),
        }
    }
    fn children(&self) -> Vec<Shared<Node>> {
        self.rd().children.clone()
    }
    fn set_children(&self, children: Vec<Shared<Node>>) {
        for child in &children {
            child.set_parent(Some(self));
        }
        self.wr().children = children;
    }
    fn parent(&self) -> Option<Shared<Node>> {
        self.rd().parent.as_ref().and_then(|p| p.upgrade())
    }
    fn set_parent(&self, parent: Option<&Shared<Node>>) {
        self.wr().parent = parent.map(Arc::downgrade);
    }
    fn position(&self) -> usize {
        match self.parent() {
            Some(parent) => parent
                .rd()
                .children
                .iter()
                .position(|c| Arc::ptr_eq(c, self))
                .unwrap_or(0),
            None => 0,
        }
    }
    fn abs_position(&self) -> Result<usize> {
        let root = self.root();
        if Arc::ptr_eq(&root, self) {
            return Ok(0);
        }
        let all = walk(&root.children(), NodeClass::Node);
        match all.iter().position(|n| Arc::ptr_eq(n, self)) {
            Some(index) => Ok(index + 1),
            None => Err(internal_error!(
                "Error in search for Node position in the tree"
            )),
        }
    }
    fn depth(&self) -> usize {
        let mut depth = 1;
        let mut node = self.parent();
        while let Some(current) = node {
            depth += 1;
            node = current.parent();
        }
        depth
    }
    fn root(&self) -> Shared<Node> {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }
    fn same_parent(&self, other: &Shared<Node>) -> bool {
        match (self.parent(), other.parent()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }
    fn walk(&self, class: NodeClass) -> Vec<Shared<Node>> {
        walk(&self.children(), class)
    }
    fn ancestor(&self, class: NodeClass, excluding: &[NodeClass]) -> Option<Shared<Node>> {
        let mut node = self.parent();
        while let Some(current) = node {
            {
                let guard = current.rd();
                if guard.is(class) && !excluding.iter().any(|e| guard.is(*e)) {
                    drop(guard);
                    return Some(current);
                }
            }
            node = current.parent();
        }
        None
    }
    fn following(&self) -> Vec<Shared<Node>> {
        let all = walk(&self.root().children(), NodeClass::Node);
        match all.iter().position(|n| Arc::ptr_eq(n, self)) {
            Some(index) => all[index + 1..].to_vec(),
            None => vec![],
        }
    }
    fn preceding(&self, reverse: bool) -> Vec<Shared<Node>> {
        let all = walk(&self.root().children(), NodeClass::Node);
        let end = all
            .iter()
            .position(|n| Arc::ptr_eq(n, self))
            .unwrap_or(all.len());
        let mut nodes = all[..end].to_vec();
        if reverse {
            nodes.reverse();
        }
        nodes
    }
    fn calls(&self) -> Vec<Shared<Node>> {
        self.walk(NodeClass::Call)
    }
    fn kern_calls(&self) -> Vec<Shared<Node>> {
        self.walk(NodeClass::Kern)
    }
    fn loops(&self) -> Vec<Shared<Node>> {
        self.walk(NodeClass::Loop)
    }
    fn reductions(&self, reprod: Option<bool>) -> Vec<Shared<Node>> {
        self.calls()
            .into_iter()
            .filter(|call| {
                let is_reduction = call.rd().as_call().is_some_and(|c| c.is_reduction());
                match reprod {
                    _ if !is_reduction => false,
                    None => true,
                    Some(reprod) => call.reprod_reduction() == reprod,
                }
            })
            .collect()
    }
    fn reprod_reduction(&self) -> bool {
        match self.ancestor(NodeClass::OmpDo, &[]) {
            Some(directive) => directive.rd().as_directive().is_some_and(|d| d.reprod()),
            None => false,
        }
    }
    fn is_openmp_parallel(&self) -> bool {
        self.ancestor(NodeClass::OmpParallel, &[]).is_some()
    }
    fn args(&self) -> Vec<Argument> {
        if let Some(args) = self.rd().own_args() {
            return args;
        }
        self.calls()
            .iter()
            .filter_map(|call| call.rd().own_args())
            .flatten()
            .collect()
    }
    fn backward_dependence(&self) -> Result<Option<Shared<Node>>> {
        closest_dependence(self, Direction::Backward)
    }
    fn forward_dependence(&self) -> Result<Option<Shared<Node>>> {
        closest_dependence(self, Direction::Forward)
    }
    fn is_valid_location(&self, new_node: &Shared<Node>, position: &str) -> Result<bool> {
        let position = Position::from_str(position)?;
        if !self.same_parent(new_node) {
            return Err(generation_error!(
                "In is_valid_location() the node and the location do not have the same parent"
            ));
        }
        let current = self.position();
        let mut new_position = new_node.position();
        if new_position < current && position == Position::After {
            new_position += 1;
        } else if new_position > current && position == Position::Before {
            new_position -= 1;
        }
        if current == new_position {
            return Err(generation_error!(
                "In is_valid_location() the node and the location are the same so this \
                 transformation would have no effect."
            ));
        }
        if new_position < current {
            match self.backward_dependence()? {
                None => Ok(true),
                Some(dependence) => Ok(dependence.position() < new_position),
            }
        } else {
            match self.forward_dependence()? {
                None => Ok(true),
                Some(dependence) => Ok(dependence.position() > new_position),
            }
        }
    }
    fn detach(&self) -> Option<usize> {
        let parent = self.parent()?;
        let index = parent
            .rd()
            .children
            .iter()
            .position(|c| Arc::ptr_eq(c, self))?;
        parent.wr().children.remove(index);
        self.set_parent(None);
        Some(index)
    }
    fn replace_with(&self, new: Shared<Node>) -> Result<()> {
        let parent = self
            .parent()
            .ok_or_else(|| internal_error!("cannot replace a node that has no parent"))?;
        let index = self
            .detach()
            .ok_or_else(|| internal_error!("node is not a child of its parent"))?;
        parent.addchild(new, Some(index));
        Ok(())
    }
    fn ptr_eq(&self, other: &Shared<Node>) -> bool {
        Arc::ptr_eq(self, other)
    }
    fn view(&self) -> String {
        let mut text = String::new();
        view_into(self, 0, &mut text);
        text
    }
    fn dag_name(&self) -> Result<String> {
        crate::ir::dag::dag_name(self)
    }
    fn dag_edges(&self) -> Result<Vec<DagEdge>> {
        Ok(Dag::new(self)?.edges)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

/// Closest node sharing the parent of `node` that one of its arguments
/// depends on. Dependences of descendants are attributed to the ancestor at
/// the depth of `node`.
fn closest_dependence(node: &Shared<Node>, direction: Direction) -> Result<Option<Shared<Node>>> {
    let depth = node.depth();
    let mut dependence: Option<Shared<Node>> = None;
    for arg in node.args() {
        let dependent = match direction {
            Direction::Backward => arg.backward_dependence()?,
            Direction::Forward => arg.forward_dependence()?,
        };
        let mut remote = match dependent.and_then(|d| d.call()) {
            Some(remote) => remote,
            None => continue,
        };
        while remote.depth() > depth {
            remote = match remote.parent() {
                Some(parent) => parent,
                None => break,
            };
        }
        if !node.same_parent(&remote) {
            continue;
        }
        let closer = match &dependence {
            None => true,
            Some(current) => match direction {
                Direction::Backward => current.position() < remote.position(),
                Direction::Forward => current.position() > remote.position(),
            },
        };
        if closer {
            dependence = Some(remote);
        }
    }
    Ok(dependence)
}

fn view_into(node: &Shared<Node>, indent: i32, text: &mut String) {
    text.push_str(&spaces(indent));
    text.push_str(&label(node));
    text.push('\n');
    for child in node.children() {
        view_into(&child, indent + 1, text);
    }
}

/// One-line description of a node as shown by [GuardedNode::view].
pub fn label(node: &Shared<Node>) -> String {
    let has_reductions =
        node.rd().is(NodeClass::Directive) && !node.reductions(None).is_empty();
    let guard = node.rd();
    match guard.kind() {
        NodeKind::Schedule(schedule) => schedule.label(),
        NodeKind::KernelSchedule(schedule) => schedule.label(),
        NodeKind::Kern(kern) => kern.label(),
        NodeKind::BuiltIn(builtin) => builtin.label(),
        NodeKind::Loop(l) => l.label(),
        NodeKind::Directive(directive) => directive.label(has_reductions),
        NodeKind::HaloExchange(halo) => halo.label(),
        NodeKind::GlobalSum(sum) => sum.label(),
        NodeKind::Extract => "Extract[]".to_string(),
        NodeKind::IfBlock => "If[]".to_string(),
        NodeKind::CodeBlock(block) => block.label(),
        NodeKind::Assignment => "Assignment[]".to_string(),
        NodeKind::Reference(reference) => format!("Reference[name:'{}']", reference.name()),
        NodeKind::ArrayReference(reference) => {
            format!("ArrayReference[name:'{}']", reference.name())
        }
        NodeKind::Literal(literal) => format!("Literal[value:'{}']", literal.value()),
        NodeKind::BinaryOperation(op) => format!("BinaryOperation[operator:'{}']", op.operator()),
    }
}
