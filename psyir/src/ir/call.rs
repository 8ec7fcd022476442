use crate::error::generation_error;
use crate::error::usage_error;
use crate::ir::gen::GenContext;
use crate::ir::Access;
use crate::ir::ArgMeta;
use crate::ir::ArgType;
use crate::ir::Argument;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::ir::ScalarType;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::shared::WeakShared;
use crate::targ3t::fortran::GenKind;
use crate::targ3t::fortran::GenNode;
use crate::targ3t::fortran::GuardedGenNode;
use anyhow::Result;
use std::str::FromStr;

/// A call from the PSy layer to a kernel or built-in.
#[derive(Clone, Debug)]
pub struct Call {
    name: String,
    arguments: Vec<Argument>,
    reduction_arg: Option<usize>,
    local_vars: Vec<String>,
}

impl Call {
    /// Create a call and check its arguments.
    ///
    /// An algorithm-layer variable may only be passed once and there is at
    /// most one scalar reduction per call.
    pub fn new(name: &str, arguments: Vec<Argument>) -> Result<Call> {
        let mut seen: Vec<String> = vec![];
        for arg in &arguments {
            if let Some(text) = arg.text() {
                let normalized = text.to_lowercase().replace(' ', "");
                if seen.contains(&normalized) {
                    return Err(generation_error!(
                        "Argument '{text}' is passed into kernel '{name}' code more than once \
                         from the algorithm layer. This is not allowed."
                    ));
                }
                seen.push(normalized);
            }
        }
        let reductions: Vec<usize> = arguments
            .iter()
            .enumerate()
            .filter(|(_, arg)| arg.arg_type().is_scalar() && arg.access() == Access::Sum)
            .map(|(i, _)| i)
            .collect();
        if reductions.len() > 1 {
            return Err(generation_error!(
                "Only a single reduction is supported in a kernel or builtin but '{name}' \
                 has {}",
                reductions.len()
            ));
        }
        Ok(Call {
            name: name.to_string(),
            arguments,
            reduction_arg: reductions.first().copied(),
            local_vars: vec![],
        })
    }
    pub fn with_local_vars(mut self, local_vars: Vec<String>) -> Self {
        self.local_vars = local_vars;
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }
    pub fn is_reduction(&self) -> bool {
        self.reduction_arg.is_some()
    }
    pub fn reduction_arg(&self) -> Option<&Argument> {
        self.reduction_arg.map(|i| &self.arguments[i])
    }
    /// Variables that have to be private to a thread.
    pub fn local_vars(&self) -> &[String] {
        &self.local_vars
    }
    pub(crate) fn bind(&mut self, owner: &WeakShared<Node>) {
        for arg in self.arguments.iter_mut() {
            arg.bind(owner);
        }
    }
    fn label(&self, prefix: &str) -> String {
        let args: Vec<&str> = self.arguments.iter().map(|a| a.name()).collect();
        format!("{prefix} {}({})", self.name, args.join(","))
    }
}

fn reduction_of(node: &Shared<Node>) -> Result<Argument> {
    let node = node.rd();
    let call = node
        .as_call()
        .ok_or_else(|| generation_error!("'{}' is not a call", node.type_name()))?;
    call.reduction_arg()
        .cloned()
        .ok_or_else(|| generation_error!("call '{}' has no reduction argument", call.name()))
}

fn local_reduction_name(name: &str, ctx: &GenContext) -> String {
    ctx.namespace
        .wr()
        .create_name_in(&format!("l_{name}"), "PSyVars", name)
}

pub(crate) fn thread_index_name(ctx: &GenContext) -> String {
    ctx.namespace
        .wr()
        .create_name_in("th_idx", "PSyVars", "thread_index")
}

fn nthreads_name(ctx: &GenContext) -> String {
    ctx.namespace
        .wr()
        .create_name_in("nthreads", "PSyVars", "nthreads")
}

/// How the reduction variable `name` is written to inside a kernel call.
///
/// Reproducible reductions accumulate into a padded per-thread buffer.
pub(crate) fn reduction_ref(node: &Shared<Node>, name: &str, ctx: &GenContext) -> String {
    if node.reprod_reduction() {
        let thread_index = thread_index_name(ctx);
        format!("{}(1,{thread_index})", local_reduction_name(name, ctx))
    } else {
        name.to_string()
    }
}

/// Zero the reduction variable of the call and, for reproducible
/// reductions, set up the per-thread buffer.
pub(crate) fn zero_reduction_variable(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    let arg = reduction_of(node)?;
    let name = arg.name();
    let (zero, datatype, kind) = match arg.arg_type() {
        ArgType::Scalar(ScalarType::Real) => ("0.0_r_def", "real", Some("r_def")),
        ArgType::Scalar(ScalarType::Integer) => ("0", "integer", None),
        other => {
            return Err(generation_error!(
                "zero_reduction variable should be one of ['real', 'integer'] but found \
                 '{other}'"
            ))
        }
    };
    let reprod = node.reprod_reduction();
    let pad_size = ctx.config.reprod_pad_size;
    if reprod && pad_size < 1 {
        return Err(generation_error!(
            "REPROD_PAD_SIZE should be a positive integer, but it is set to '{pad_size}'."
        ));
    }
    parent.add(GenKind::assign(name, zero));
    if reprod {
        let local_name = local_reduction_name(name, ctx);
        let mut decl = GenKind::decl(datatype, &[&format!("{local_name}(:,:)")])
            .with_attribute("allocatable");
        if let Some(kind) = kind {
            decl = decl.with_kind(kind);
        }
        parent.add(decl);
        let nthreads = nthreads_name(ctx);
        parent.add(GenKind::decl("integer", &[&nthreads]));
        parent.add(GenKind::use_only("omp_lib", &["omp_get_max_threads"]));
        parent.add(GenKind::assign(&nthreads, "omp_get_max_threads()"));
        parent.add(GenKind::Allocate(format!("{local_name}({pad_size},{nthreads})")));
        parent.add(GenKind::assign(&local_name, zero));
    }
    Ok(())
}

/// Zero the reduction variables of all `calls`.
pub(crate) fn zero_reduction_variables(
    calls: &[Shared<Node>],
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    if calls.is_empty() {
        return Ok(());
    }
    parent.add(GenKind::comment(""));
    parent.add(GenKind::comment(" Zero summation variables"));
    parent.add(GenKind::comment(""));
    for call in calls {
        zero_reduction_variable(call, parent, ctx)?;
    }
    parent.add(GenKind::comment(""));
    Ok(())
}

/// Sum the per-thread partial results of a reproducible reduction.
pub(crate) fn reduction_sum_loop(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    let arg = reduction_of(node)?;
    let name = arg.name();
    let thread_index = thread_index_name(ctx);
    let nthreads = nthreads_name(ctx);
    let local_name = local_reduction_name(name, ctx);
    parent.add(GenKind::decl("integer", &[&thread_index]));
    let do_loop = parent.add(GenKind::do_loop(&thread_index, "1", &nthreads));
    do_loop.add(GenKind::assign(
        name,
        &format!("{name} + {local_name}(1,{thread_index})"),
    ));
    parent.add(GenKind::Deallocate(local_name));
    Ok(())
}

/// The built-in operations that are expanded inline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltInKind {
    /// `f = c`
    SetvalC,
    /// `z = x + y`
    XPlusY,
    /// `x = x + y`
    IncXPlusY,
    /// `s = s + sum(x * y)`
    XInnerproductY,
    /// `s = s + sum(x)`
    SumX,
}

impl BuiltInKind {
    pub fn name(self) -> &'static str {
        match self {
            BuiltInKind::SetvalC => "setval_c",
            BuiltInKind::XPlusY => "X_plus_Y",
            BuiltInKind::IncXPlusY => "inc_X_plus_Y",
            BuiltInKind::XInnerproductY => "X_innerproduct_Y",
            BuiltInKind::SumX => "sum_X",
        }
    }
    /// Descriptions of the formal arguments.
    pub fn metadata(self) -> Vec<ArgMeta> {
        let real_scalar = |access| ArgMeta::scalar(ScalarType::Real, access);
        match self {
            BuiltInKind::SetvalC => vec![ArgMeta::field(Access::Write), real_scalar(Access::Read)],
            BuiltInKind::XPlusY => vec![
                ArgMeta::field(Access::Write),
                ArgMeta::field(Access::Read),
                ArgMeta::field(Access::Read),
            ],
            BuiltInKind::IncXPlusY => vec![ArgMeta::field(Access::Inc), ArgMeta::field(Access::Read)],
            BuiltInKind::XInnerproductY => vec![
                real_scalar(Access::Sum),
                ArgMeta::field(Access::Read),
                ArgMeta::field(Access::Read),
            ],
            BuiltInKind::SumX => vec![real_scalar(Access::Sum), ArgMeta::field(Access::Read)],
        }
    }
}

impl FromStr for BuiltInKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let all = [
            BuiltInKind::SetvalC,
            BuiltInKind::XPlusY,
            BuiltInKind::IncXPlusY,
            BuiltInKind::XInnerproductY,
            BuiltInKind::SumX,
        ];
        match all.iter().find(|k| k.name().eq_ignore_ascii_case(s)) {
            Some(kind) => Ok(*kind),
            None => {
                let names: Vec<&str> = all.iter().map(|k| k.name()).collect();
                Err(usage_error!(
                    "Unrecognised built-in call '{s}'. Supported built-ins are {names:?}"
                ))
            }
        }
    }
}

/// A call to an operation that is expanded inline in the PSy layer.
#[derive(Clone, Debug)]
pub struct BuiltIn {
    kind: BuiltInKind,
    call: Call,
}

impl BuiltIn {
    pub fn new(kind: BuiltInKind, call: Call) -> BuiltIn {
        BuiltIn { kind, call }
    }
    pub fn kind(&self) -> BuiltInKind {
        self.kind
    }
    pub fn call(&self) -> &Call {
        &self.call
    }
    pub fn call_mut(&mut self) -> &mut Call {
        &mut self.call
    }
    pub fn label(&self) -> String {
        self.call.label("Call")
    }
}

pub(crate) fn gen_builtin(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    let (kind, args) = {
        let node = node.rd();
        match node.kind() {
            crate::ir::NodeKind::BuiltIn(builtin) => {
                (builtin.kind(), builtin.call().arguments().to_vec())
            }
            _ => return Err(generation_error!("expected a built-in")),
        }
    };
    let index = node
        .ancestor(NodeClass::Loop, &[])
        .and_then(|l| l.rd().as_loop().map(|l| l.variable_name().to_string()))
        .unwrap_or_else(|| "df".to_string());
    let data = |i: usize| format!("{}%data({index})", args[i].name());
    let (lhs, rhs) = match kind {
        BuiltInKind::SetvalC => (data(0), args[1].name().to_string()),
        BuiltInKind::XPlusY => (data(0), format!("{} + {}", data(1), data(2))),
        BuiltInKind::IncXPlusY => (data(0), format!("{} + {}", data(0), data(1))),
        BuiltInKind::XInnerproductY => {
            let target = reduction_ref(node, args[0].name(), ctx);
            let rhs = format!("{target} + {}*{}", data(1), data(2));
            (target, rhs)
        }
        BuiltInKind::SumX => {
            let target = reduction_ref(node, args[0].name(), ctx);
            let rhs = format!("{target} + {}", data(1));
            (target, rhs)
        }
    };
    parent.add(GenKind::assign(&lhs, &rhs));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use crate::error::ErrorKind;

    fn field(text: &str, access: Access) -> Argument {
        Argument::named(text, access, ArgType::Field)
    }

    #[test]
    fn test_duplicate_argument() {
        let args = vec![field("f1", Access::Write), field("F1 ", Access::Read)];
        let err = Call::new("testkern_code", args).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::SemanticViolation));
        assert!(err
            .to_string()
            .contains("is passed into kernel 'testkern_code' code more than once"));
    }

    #[test]
    fn test_single_reduction() {
        let scalar = |name| Argument::named(name, Access::Sum, ArgType::Scalar(ScalarType::Real));
        let call = Call::new("sum_X", vec![scalar("asum"), field("f1", Access::Read)]).unwrap();
        assert!(call.is_reduction());
        assert_eq!(call.reduction_arg().map(|a| a.name()), Some("asum"));
        let err = Call::new("k", vec![scalar("a"), scalar("b")]).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::SemanticViolation));
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!("x_plus_y".parse::<BuiltInKind>().unwrap(), BuiltInKind::XPlusY);
        assert!("x_minus_y".parse::<BuiltInKind>().is_err());
        assert_eq!(BuiltInKind::SumX.metadata().len(), 2);
    }
}
