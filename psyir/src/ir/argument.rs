use crate::error::internal_error;
use crate::error::usage_error;
use crate::ir::DataAccess;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::namespace::NameSpace;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::shared::WeakShared;
use anyhow::Result;
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;
use std::sync::Weak;

/// How a kernel accesses one of its arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
    Inc,
    /// Reduction into a scalar.
    Sum,
}

impl Access {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Access::Write | Access::ReadWrite | Access::Inc | Access::Sum
        )
    }
    pub fn is_read(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite | Access::Inc)
    }
    pub fn intent(self) -> Intent {
        match self {
            Access::Read => Intent::In,
            Access::Write | Access::Sum => Intent::Out,
            Access::ReadWrite | Access::Inc => Intent::InOut,
        }
    }
}

impl Display for Access {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::ReadWrite => "readwrite",
            Access::Inc => "inc",
            Access::Sum => "sum",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Access {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        let name = lower.strip_prefix("gh_").unwrap_or(&lower);
        match name {
            "read" => Ok(Access::Read),
            "write" => Ok(Access::Write),
            "readwrite" => Ok(Access::ReadWrite),
            "inc" => Ok(Access::Inc),
            "sum" => Ok(Access::Sum),
            _ => Err(usage_error!(
                "Unknown access type '{s}'. Expected one of read, write, readwrite, inc, sum."
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    In,
    Out,
    InOut,
}

impl Display for Intent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::In => write!(f, "in"),
            Intent::Out => write!(f, "out"),
            Intent::InOut => write!(f, "inout"),
        }
    }
}

impl FromStr for Intent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(' ', "").as_str() {
            "in" => Ok(Intent::In),
            "out" => Ok(Intent::Out),
            "inout" => Ok(Intent::InOut),
            _ => Err(usage_error!("Unknown intent '{s}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Real,
    Integer,
    Logical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgType {
    Field,
    Operator,
    Scalar(ScalarType),
}

impl ArgType {
    pub fn is_scalar(self) -> bool {
        matches!(self, ArgType::Scalar(_))
    }
    pub fn category(self) -> ArgCategory {
        match self {
            ArgType::Field => ArgCategory::Field,
            ArgType::Operator => ArgCategory::Operator,
            ArgType::Scalar(_) => ArgCategory::Scalar,
        }
    }
}

impl Display for ArgType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgType::Field => write!(f, "field"),
            ArgType::Operator => write!(f, "operator"),
            ArgType::Scalar(ScalarType::Real) => write!(f, "real"),
            ArgType::Scalar(ScalarType::Integer) => write!(f, "integer"),
            ArgType::Scalar(ScalarType::Logical) => write!(f, "logical"),
        }
    }
}

/// Argument types as grouped in declarations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgCategory {
    Field,
    Operator,
    Scalar,
}

/// Actual argument as written at the call site in the algorithm layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgInfo {
    pub text: String,
    pub is_literal: bool,
}

impl ArgInfo {
    pub fn variable(text: &str) -> Self {
        ArgInfo {
            text: text.to_string(),
            is_literal: false,
        }
    }
    pub fn literal(text: &str) -> Self {
        ArgInfo {
            text: text.to_string(),
            is_literal: true,
        }
    }
}

/// Formal argument as described by the kernel metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgMeta {
    pub access: Access,
    pub arg_type: ArgType,
    pub vector_size: usize,
}

impl ArgMeta {
    pub fn field(access: Access) -> Self {
        ArgMeta {
            access,
            arg_type: ArgType::Field,
            vector_size: 1,
        }
    }
    pub fn vector(access: Access, vector_size: usize) -> Self {
        ArgMeta {
            access,
            arg_type: ArgType::Field,
            vector_size,
        }
    }
    pub fn operator(access: Access) -> Self {
        ArgMeta {
            access,
            arg_type: ArgType::Operator,
            vector_size: 1,
        }
    }
    pub fn scalar(scalar_type: ScalarType, access: Access) -> Self {
        ArgMeta {
            access,
            arg_type: ArgType::Scalar(scalar_type),
            vector_size: 1,
        }
    }
}

/// One argument at a kernel call, halo exchange or global sum.
///
/// The argument keeps a weak handle to the node that owns it. The handle is
/// set when the owning node is created via [Node::new].
#[derive(Clone, Debug)]
pub struct Argument {
    name: String,
    text: Option<String>,
    form: String,
    is_literal: bool,
    access: Access,
    arg_type: ArgType,
    vector_size: usize,
    call: WeakShared<Node>,
}

impl Argument {
    /// Bind an actual argument to its formal description.
    ///
    /// Variables get a name that is unique within the invoke; literals are
    /// named after their text.
    pub fn new(info: &ArgInfo, meta: &ArgMeta, namespace: &mut NameSpace) -> Argument {
        let (name, text, form) = if info.is_literal {
            (info.text.clone(), None, "literal")
        } else {
            let name = namespace.create_name_in(&info.text, "AlgArgs", &info.text);
            (name, Some(info.text.clone()), "variable")
        };
        Argument {
            name,
            text,
            form: form.to_string(),
            is_literal: info.is_literal,
            access: meta.access,
            arg_type: meta.arg_type,
            vector_size: meta.vector_size.max(1),
            call: Weak::new(),
        }
    }
    /// An argument that is not bound to a call site.
    pub fn named(name: &str, access: Access, arg_type: ArgType) -> Argument {
        Argument {
            name: name.to_string(),
            text: Some(name.to_string()),
            form: "variable".to_string(),
            is_literal: false,
            access,
            arg_type,
            vector_size: 1,
            call: Weak::new(),
        }
    }
    pub fn with_vector_size(mut self, vector_size: usize) -> Self {
        self.vector_size = vector_size.max(1);
        self
    }
    /// Copy of this argument with a different access, not yet owned by any
    /// node.
    pub fn copy_with_access(&self, access: Access) -> Argument {
        Argument {
            access,
            call: Weak::new(),
            ..self.clone()
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
    pub fn form(&self) -> &str {
        &self.form
    }
    pub fn is_literal(&self) -> bool {
        self.is_literal
    }
    pub fn access(&self) -> Access {
        self.access
    }
    pub fn set_access(&mut self, access: Access) {
        self.access = access;
    }
    pub fn arg_type(&self) -> ArgType {
        self.arg_type
    }
    pub fn vector_size(&self) -> usize {
        self.vector_size
    }
    pub fn intent(&self) -> Intent {
        self.access.intent()
    }
    /// The node (kernel call, halo exchange or global sum) owning this
    /// argument.
    pub fn call(&self) -> Option<Shared<Node>> {
        self.call.upgrade()
    }
    pub(crate) fn bind(&mut self, owner: &WeakShared<Node>) {
        self.call = owner.clone();
    }
    /// Whether the owning node is a halo exchange.
    pub fn in_halo_exchange(&self) -> bool {
        match self.call() {
            Some(call) => call.rd().is(NodeClass::HaloExchange),
            None => false,
        }
    }
    /// Vector component exchanged by the owning halo exchange.
    pub fn halo_vector_index(&self) -> Option<usize> {
        let call = self.call()?;
        let node = call.rd();
        node.as_halo_exchange().and_then(|h| h.vector_index())
    }
    /// Whether there is a read-after-write, write-after-read or
    /// write-after-write dependence between the two arguments.
    pub fn depends_on(&self, other: &Argument) -> bool {
        if self.name != other.name {
            return false;
        }
        let (mine, theirs) = (self.access, other.access);
        (mine.is_write() && theirs.is_read())
            || (mine.is_read() && theirs.is_write())
            || (mine.is_write() && theirs.is_write())
    }
    fn owner(&self) -> Result<Shared<Node>> {
        self.call()
            .ok_or_else(|| internal_error!("argument '{}' is not attached to a node", self.name))
    }
    /// The closest preceding argument that this argument depends on.
    pub fn backward_dependence(&self) -> Result<Option<Argument>> {
        let nodes = self.owner()?.preceding(true);
        Ok(self.find_argument(&nodes))
    }
    /// The closest following argument that depends on this argument.
    pub fn forward_dependence(&self) -> Result<Option<Argument>> {
        let nodes = self.owner()?.following();
        Ok(self.find_argument(&nodes))
    }
    /// All preceding writers that together produce the value read by this
    /// argument.
    pub fn backward_write_dependencies(&self, ignore_halos: bool) -> Result<Vec<Argument>> {
        let nodes = self.owner()?.preceding(true);
        self.find_write_arguments(&nodes, ignore_halos)
    }
    /// All following readers of the value written by this argument.
    pub fn forward_read_dependencies(&self) -> Result<Vec<Argument>> {
        let nodes = self.owner()?.following();
        self.find_read_arguments(&nodes)
    }
    fn find_argument(&self, nodes: &[Shared<Node>]) -> Option<Argument> {
        nodes
            .iter()
            .filter_map(|node| node.rd().own_args())
            .flatten()
            .find(|arg| self.depends_on(arg))
    }
    /// Readers in `nodes` up to (and excluding) the writer that fully
    /// overwrites this argument.
    pub fn find_read_arguments(&self, nodes: &[Shared<Node>]) -> Result<Vec<Argument>> {
        if !self.access.is_write() {
            return Ok(vec![]);
        }
        let mut access = DataAccess::new(self);
        let mut arguments = vec![];
        for node in nodes {
            let args = match node.rd().own_args() {
                Some(args) => args,
                None => continue,
            };
            for argument in args {
                if argument.access.is_read() && access.overlaps(&argument)? {
                    arguments.push(argument.clone());
                }
                if argument.access.is_write() {
                    access.update_coverage(&argument)?;
                    if access.covered() {
                        return Ok(arguments);
                    }
                }
            }
        }
        Ok(arguments)
    }
    /// Writers in `nodes` that together cover everything this argument
    /// reads.
    ///
    /// Scanning stops as soon as coverage is complete. Outside of halo
    /// exchanges a single writer must provide the full coverage.
    pub fn find_write_arguments(
        &self,
        nodes: &[Shared<Node>],
        ignore_halos: bool,
    ) -> Result<Vec<Argument>> {
        if !self.access.is_read() {
            return Ok(vec![]);
        }
        let mut access = DataAccess::new(self);
        let mut arguments = vec![];
        for node in nodes {
            let (args, is_halo) = {
                let node = node.rd();
                let is_halo = node.is(NodeClass::HaloExchange);
                match node.own_args() {
                    Some(args) => (args, is_halo),
                    None => continue,
                }
            };
            if is_halo && ignore_halos {
                continue;
            }
            for argument in args {
                if !argument.access.is_write() || !access.overlaps(&argument)? {
                    continue;
                }
                arguments.push(argument.clone());
                access.update_coverage(&argument)?;
                if access.covered() {
                    if !is_halo && arguments.len() > 1 {
                        return Err(internal_error!(
                            "Found a writer dependence but there are already dependencies. \
                             This should not happen."
                        ));
                    }
                    return Ok(arguments);
                }
            }
        }
        if !arguments.is_empty() {
            return Err(internal_error!(
                "Argument::find_write_arguments() There are no more nodes but there are \
                 already dependencies. This should not happen."
            ));
        }
        Ok(vec![])
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.access == other.access
            && self.arg_type == other.arg_type
            && self.vector_size == other.vector_size
            && Weak::ptr_eq(&self.call, &other.call)
    }
}

impl Display for Argument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(name: &str, access: Access) -> Argument {
        Argument::named(name, access, ArgType::Field)
    }

    #[test]
    fn test_depends_on() {
        let accesses = [Access::Read, Access::Write, Access::ReadWrite];
        for a in accesses {
            for b in accesses {
                let expected = !(a == Access::Read && b == Access::Read);
                assert_eq!(arg("f1", a).depends_on(&arg("f1", b)), expected);
                assert_eq!(arg("f1", b).depends_on(&arg("f1", a)), expected);
            }
        }
        assert!(!arg("f1", Access::Write).depends_on(&arg("f2", Access::Write)));
        assert!(arg("f1", Access::Inc).depends_on(&arg("f1", Access::Read)));
        assert!(arg("s", Access::Sum).depends_on(&arg("s", Access::Read)));
    }

    #[test]
    fn test_access_sets() {
        assert!(Access::Sum.is_write());
        assert!(!Access::Sum.is_read());
        assert!(Access::Inc.is_read() && Access::Inc.is_write());
        assert_eq!("gh_inc".parse::<Access>().unwrap(), Access::Inc);
        assert!("gh_max".parse::<Access>().is_err());
    }

    #[test]
    fn test_literal_and_variable_names() {
        let mut ns = NameSpace::new();
        let meta = ArgMeta::field(Access::Read);
        let f = Argument::new(&ArgInfo::variable("F1"), &meta, &mut ns);
        assert_eq!(f.name(), "f1");
        assert_eq!(f.text(), Some("F1"));
        assert_eq!(f.form(), "variable");
        let again = Argument::new(&ArgInfo::variable("f1"), &meta, &mut ns);
        assert_eq!(again.name(), "f1");
        let literal = Argument::new(
            &ArgInfo::literal("0.0_r_def"),
            &ArgMeta::scalar(ScalarType::Real, Access::Read),
            &mut ns,
        );
        assert_eq!(literal.name(), "0.0_r_def");
        assert_eq!(literal.text(), None);
        assert!(literal.call().is_none());
    }
}
