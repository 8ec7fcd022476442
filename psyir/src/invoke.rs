//! Construction of the PSy-layer schedule of one invoke.
//!
//! An invoke bundles the kernel and built-in calls of one `call invoke(...)`
//! in the algorithm layer. Every call becomes a loop over its iteration
//! space. With distributed memory, halo exchanges are placed in front of the
//! loops that read fields and global sums after the loops that reduce.

use crate::config::Config;
use crate::error::generation_error;
use crate::frontend::KernelSource;
use crate::ir::gen_code;
use crate::ir::Access;
use crate::ir::ArgCategory;
use crate::ir::ArgInfo;
use crate::ir::ArgMeta;
use crate::ir::ArgType;
use crate::ir::Argument;
use crate::ir::BuiltIn;
use crate::ir::BuiltInKind;
use crate::ir::Call;
use crate::ir::GenContext;
use crate::ir::GlobalSum;
use crate::ir::GuardedNode;
use crate::ir::HaloExchange;
use crate::ir::Intent;
use crate::ir::Kern;
use crate::ir::Loop;
use crate::ir::Node;
use crate::ir::NodeKind;
use crate::ir::ScalarType;
use crate::ir::Schedule;
use crate::namespace::NameSpace;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::targ3t::fortran::GenKind;
use crate::targ3t::fortran::GenNode;
use crate::targ3t::fortran::GuardedGenNode;
use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug)]
enum CallKind {
    Kernel {
        name: String,
        module_name: String,
        metadata: Vec<ArgMeta>,
        local_vars: Vec<String>,
        source: Option<KernelSource>,
    },
    BuiltIn(BuiltInKind),
}

/// One call inside an invoke as written in the algorithm layer.
#[derive(Clone, Debug)]
pub struct CallSite {
    kind: CallKind,
    args: Vec<ArgInfo>,
    field_space: String,
}

impl CallSite {
    /// Call to the user kernel `name` described by `metadata`.
    pub fn kernel(name: &str, module_name: &str, metadata: Vec<ArgMeta>) -> CallSite {
        CallSite {
            kind: CallKind::Kernel {
                name: name.to_string(),
                module_name: module_name.to_string(),
                metadata,
                local_vars: vec![],
                source: None,
            },
            args: vec![],
            field_space: "any_space_1".to_string(),
        }
    }
    pub fn builtin(kind: BuiltInKind) -> CallSite {
        CallSite {
            kind: CallKind::BuiltIn(kind),
            args: vec![],
            field_space: "any_space_1".to_string(),
        }
    }
    pub fn with_args(mut self, args: Vec<ArgInfo>) -> Self {
        self.args = args;
        self
    }
    pub fn with_field_space(mut self, field_space: &str) -> Self {
        self.field_space = field_space.to_string();
        self
    }
    /// Variables that are local to the kernel loop body.
    pub fn with_local_vars(mut self, vars: Vec<String>) -> Self {
        if let CallKind::Kernel { local_vars, .. } = &mut self.kind {
            *local_vars = vars;
        }
        self
    }
    pub fn with_source(mut self, kernel_source: KernelSource) -> Self {
        if let CallKind::Kernel { source, .. } = &mut self.kind {
            *source = Some(kernel_source);
        }
        self
    }
    pub fn name(&self) -> &str {
        match &self.kind {
            CallKind::Kernel { name, .. } => name,
            CallKind::BuiltIn(kind) => kind.name(),
        }
    }
    fn metadata(&self) -> Vec<ArgMeta> {
        match &self.kind {
            CallKind::Kernel { metadata, .. } => metadata.clone(),
            CallKind::BuiltIn(kind) => kind.metadata(),
        }
    }
    fn iteration_space(&self) -> &'static str {
        match &self.kind {
            CallKind::Kernel { .. } => "cells",
            CallKind::BuiltIn(_) => "dofs",
        }
    }
    fn is_kernel(&self) -> bool {
        matches!(self.kind, CallKind::Kernel { .. })
    }
    /// Create the call node with arguments named in `namespace`.
    fn node(&self, namespace: &mut NameSpace) -> Result<Shared<Node>> {
        let metadata = self.metadata();
        if metadata.len() != self.args.len() {
            return Err(generation_error!(
                "In kernel '{}' the number of arguments specified in the kernel metadata \
                 '{}', must equal the number of arguments in the algorithm layer. However, I \
                 found '{}'",
                self.name(),
                metadata.len(),
                self.args.len()
            ));
        }
        let args: Vec<Argument> = self
            .args
            .iter()
            .zip(metadata.iter())
            .map(|(info, meta)| Argument::new(info, meta, namespace))
            .collect();
        let kind = match &self.kind {
            CallKind::Kernel {
                name,
                module_name,
                local_vars,
                source,
                ..
            } => {
                let call = Call::new(name, args)?.with_local_vars(local_vars.clone());
                let mut kern = Kern::new(call, module_name);
                if let Some(source) = source {
                    kern = kern.with_source(source.clone());
                }
                NodeKind::Kern(kern)
            }
            CallKind::BuiltIn(kind) => {
                NodeKind::BuiltIn(BuiltIn::new(*kind, Call::new(kind.name(), args)?))
            }
        };
        Ok(Node::new(kind))
    }
}

/// Halo exchanges for every field (component) that `call` reads.
fn halo_exchanges(call: &Shared<Node>) -> Vec<Shared<Node>> {
    let mut exchanges = vec![];
    for arg in call.args() {
        if arg.arg_type() != ArgType::Field || !arg.access().is_read() {
            continue;
        }
        if arg.vector_size() > 1 {
            for index in 1..=arg.vector_size() {
                let halo = HaloExchange::new(&arg, Some(index), true);
                exchanges.push(Node::new(NodeKind::HaloExchange(halo)));
            }
        } else {
            let halo = HaloExchange::new(&arg, None, true);
            exchanges.push(Node::new(NodeKind::HaloExchange(halo)));
        }
        debug!("Added halo exchange for '{}'", arg.name());
    }
    exchanges
}

/// The generated subroutine for one algorithm-layer invoke.
#[derive(Debug)]
pub struct Invoke {
    name: String,
    schedule: Shared<Node>,
    namespace: Shared<NameSpace>,
    config: Config,
}

impl Invoke {
    /// Build the schedule of the invoke with index `idx`.
    ///
    /// Without an explicit `name`, an invoke of a single kernel is named
    /// after that kernel.
    pub fn new(
        call_sites: Vec<CallSite>,
        idx: usize,
        config: &Config,
        name: Option<&str>,
    ) -> Result<Invoke> {
        let namespace: Shared<NameSpace> = Arc::new(RwLock::new(NameSpace::new()));
        let name = match (name, call_sites.as_slice()) {
            (Some(name), _) => name.to_lowercase(),
            (None, [site]) if site.is_kernel() => {
                format!("invoke_{idx}_{}", site.name()).to_lowercase()
            }
            (None, _) => format!("invoke_{idx}"),
        };
        namespace.wr().add_reserved_name(&name)?;
        let schedule = Schedule::new(&name, namespace.clone())
            .with_reproducible_reductions(config.reproducible_reductions);
        let schedule = Node::new(NodeKind::Schedule(schedule));
        for site in &call_sites {
            let call = site.node(&mut namespace.wr())?;
            let variable = namespace.wr().create_name_in("cell", "PSyVars", "cell");
            let iteration_space = site.iteration_space();
            let l = Loop::new(&variable, "1", &format!("{iteration_space}_end"))
                .with_field_space(&site.field_space)
                .with_iteration_space(iteration_space);
            let loop_node = Node::new(NodeKind::Loop(l));
            loop_node.addchild(call.clone(), None);
            if config.distributed_memory {
                for halo in halo_exchanges(&call) {
                    schedule.addchild(halo, None);
                }
            }
            schedule.addchild(loop_node, None);
            let reduction = call.rd().as_call().and_then(|c| c.reduction_arg().cloned());
            if let (true, Some(scalar)) = (config.distributed_memory, reduction) {
                debug!("Added global sum for '{}'", scalar.name());
                let sum = Node::new(NodeKind::GlobalSum(GlobalSum::new(&scalar)));
                schedule.addchild(sum, None);
            }
        }
        debug!("Created invoke '{name}' with {} calls", call_sites.len());
        Ok(Invoke {
            name,
            schedule,
            namespace,
            config: config.clone(),
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn schedule(&self) -> Shared<Node> {
        self.schedule.clone()
    }
    pub fn namespace(&self) -> Shared<NameSpace> {
        self.namespace.clone()
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    /// Arguments of all calls in schedule order.
    fn call_args(&self) -> Vec<Argument> {
        self.schedule
            .calls()
            .iter()
            .filter_map(|call| call.rd().own_args())
            .flatten()
            .collect()
    }
    /// Algorithm-layer texts of the non-literal arguments, without
    /// duplicates.
    pub fn unique_args(&self) -> Vec<String> {
        let mut result: Vec<String> = vec![];
        for arg in self.call_args() {
            if let Some(text) = arg.text() {
                if !result.iter().any(|t| t == text) {
                    result.push(text.to_string());
                }
            }
        }
        result
    }
    /// PSy-layer names of the non-literal arguments, without duplicates.
    ///
    /// These are the dummy arguments of the generated subroutine.
    pub fn psy_unique_vars(&self) -> Vec<String> {
        self.unique_declarations(None, None)
    }
    /// Names of the non-literal arguments of the given category and access,
    /// without duplicates.
    pub fn unique_declarations(
        &self,
        category: Option<ArgCategory>,
        access: Option<Access>,
    ) -> Vec<String> {
        let mut result: Vec<String> = vec![];
        for arg in self.call_args() {
            if arg.is_literal() {
                continue;
            }
            if category.is_some_and(|c| arg.arg_type().category() != c) {
                continue;
            }
            if access.is_some_and(|a| arg.access() != a) {
                continue;
            }
            if !result.iter().any(|n| n == arg.name()) {
                result.push(arg.name().to_string());
            }
        }
        result
    }
    /// Intent of every argument of `category` as seen from the invoke.
    ///
    /// Arguments that are only read are `in`. Updated arguments are `inout`
    /// and so are written arguments whose first access is a read. All other
    /// written arguments are `out`.
    pub fn unique_declarations_by_intent(&self, category: ArgCategory) -> Vec<(String, Intent)> {
        let args: Vec<Argument> = self
            .call_args()
            .into_iter()
            .filter(|a| !a.is_literal() && a.arg_type().category() == category)
            .collect();
        self.unique_declarations(Some(category), None)
            .into_iter()
            .map(|name| {
                let accesses: Vec<Access> = args
                    .iter()
                    .filter(|a| a.name() == name)
                    .map(|a| a.access())
                    .collect();
                let updated = accesses
                    .iter()
                    .any(|a| matches!(a, Access::Inc | Access::ReadWrite));
                let written = accesses.iter().any(|a| a.is_write());
                let read_first = accesses.first().is_some_and(|a| a.is_read());
                let intent = match (updated, written, read_first) {
                    (true, _, _) => Intent::InOut,
                    (false, true, true) => Intent::InOut,
                    (false, true, false) => Intent::Out,
                    (false, false, _) => Intent::In,
                };
                (name, intent)
            })
            .collect()
    }
    fn scalar_type(&self, name: &str) -> Option<ScalarType> {
        self.call_args()
            .iter()
            .find(|a| a.name() == name)
            .and_then(|a| match a.arg_type() {
                ArgType::Scalar(scalar_type) => Some(scalar_type),
                _ => None,
            })
    }
    fn declare_arguments(&self, sub: &Shared<GenNode>) {
        let intents = [Intent::InOut, Intent::Out, Intent::In];
        let derived = [
            (ArgCategory::Field, "field_mod", "field_type"),
            (ArgCategory::Operator, "operator_mod", "operator_type"),
        ];
        for (category, module, type_name) in derived {
            let declarations = self.unique_declarations_by_intent(category);
            if declarations.is_empty() {
                continue;
            }
            sub.add(GenKind::use_only(module, &[type_name]));
            for intent in intents {
                let entities: Vec<String> = declarations
                    .iter()
                    .filter(|(_, i)| *i == intent)
                    .map(|(name, _)| name.clone())
                    .collect();
                if !entities.is_empty() {
                    sub.add(GenKind::TypeDecl {
                        type_name: type_name.to_string(),
                        entities,
                        intent: Some(intent),
                    });
                }
            }
        }
        let scalars = self.unique_declarations_by_intent(ArgCategory::Scalar);
        for (name, intent) in scalars {
            let (datatype, kind) = match self.scalar_type(&name) {
                Some(ScalarType::Real) => ("real", "r_def"),
                Some(ScalarType::Integer) => ("integer", "i_def"),
                Some(ScalarType::Logical) | None => ("logical", "l_def"),
            };
            sub.add(GenKind::use_only("constants_mod", &[kind]));
            sub.add(
                GenKind::decl(datatype, &[&name])
                    .with_kind(kind)
                    .with_intent(intent),
            );
        }
    }
    /// Add the subroutine of this invoke to `parent` and return it.
    pub fn gen_code(&self, parent: &Shared<GenNode>) -> Result<Shared<GenNode>> {
        let sub = parent.add(GenKind::Subroutine {
            name: self.name.clone(),
            args: self.psy_unique_vars(),
        });
        self.declare_arguments(&sub);
        let ctx = GenContext::new(&self.config, self.namespace.clone());
        gen_code(&self.schedule, &sub, &ctx)?;
        Ok(sub)
    }
}

/// Generate the PSy-layer module holding the subroutines of `invokes`.
///
/// The source of module-inlined kernels is placed in the module, once per
/// kernel.
pub fn gen_psy_module(name: &str, invokes: &[Invoke]) -> Result<Shared<GenNode>> {
    let module = GenNode::module(name);
    let mut inlined: Vec<String> = vec![];
    for invoke in invokes {
        invoke.gen_code(&module)?;
        for kern in invoke.schedule.kern_calls() {
            let kern = kern.rd();
            let kern = match kern.as_kern() {
                Some(kern) if kern.module_inline() => kern,
                _ => continue,
            };
            let kernel_name = kern.name().to_lowercase();
            if inlined.contains(&kernel_name) {
                continue;
            }
            let text = kern
                .source()
                .and_then(|source| source.subroutine_text(&kernel_name))
                .ok_or_else(|| {
                    generation_error!(
                        "Cannot module-inline kernel '{kernel_name}' because its source is \
                         not available"
                    )
                })?;
            module.add(GenKind::Raw(text));
            inlined.push(kernel_name);
        }
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use crate::error::ErrorKind;
    use indoc::indoc;

    fn testkern() -> CallSite {
        let metadata = vec![
            ArgMeta::scalar(ScalarType::Real, Access::Read),
            ArgMeta::field(Access::Write),
            ArgMeta::field(Access::Read),
        ];
        CallSite::kernel("testkern_code", "testkern_mod", metadata)
            .with_field_space("w1")
            .with_args(vec![
                ArgInfo::variable("a"),
                ArgInfo::variable("f1"),
                ArgInfo::variable("f2"),
            ])
    }

    #[test]
    fn test_single_kernel() {
        let invoke = Invoke::new(vec![testkern()], 0, &Config::default(), None).unwrap();
        assert_eq!(invoke.name(), "invoke_0_testkern_code");
        let expected = indoc! {"
            Schedule[invoke='invoke_0_testkern_code']
              HaloExchange[field='f2', type='region', depth=1, check_dirty=true]
              Loop[type='',field_space='w1',it_space='cells']
                KernCall testkern_code(a,f1,f2) [module_inline=false]
        "};
        assert_eq!(invoke.schedule().view(), expected);
        assert_eq!(invoke.unique_args(), vec!["a", "f1", "f2"]);

        let module = GenNode::module("psy_single");
        let sub = invoke.gen_code(&module).unwrap();
        let expected = indoc! {"
            subroutine invoke_0_testkern_code(a, f1, f2)
              use field_mod, only: field_type
              use constants_mod, only: r_def
              use testkern_mod, only: testkern_code
              type(field_type), intent(out) :: f1
              type(field_type), intent(in) :: f2
              real(kind=r_def), intent(in) :: a
              integer :: cell
              if (f2%is_dirty(depth=1)) then
                call f2%halo_exchange(depth=1)
              end if
              do cell = 1, cells_end
                call testkern_code(a, f1, f2)
              end do
            end subroutine invoke_0_testkern_code
        "};
        assert_eq!(sub.rd().to_string(), expected);
    }

    #[test]
    fn test_reduction() {
        let config = Config::default();
        let sum = CallSite::builtin(BuiltInKind::SumX)
            .with_args(vec![ArgInfo::variable("asum"), ArgInfo::variable("f1")]);
        let invoke = Invoke::new(vec![sum], 1, &config, None).unwrap();
        assert_eq!(invoke.name(), "invoke_1");
        let expected = indoc! {"
            Schedule[invoke='invoke_1']
              HaloExchange[field='f1', type='region', depth=1, check_dirty=true]
              Loop[type='',field_space='any_space_1',it_space='dofs']
                Call sum_X(asum,f1)
              GlobalSum[scalar='asum']
        "};
        assert_eq!(invoke.schedule().view(), expected);
        assert_eq!(
            invoke.unique_declarations_by_intent(ArgCategory::Scalar),
            vec![("asum".to_string(), Intent::Out)]
        );

        let config = config.with_distributed_memory(false);
        let sum = CallSite::builtin(BuiltInKind::SumX)
            .with_args(vec![ArgInfo::variable("asum"), ArgInfo::variable("f1")]);
        let invoke = Invoke::new(vec![sum], 1, &config, Some("Total")).unwrap();
        assert_eq!(invoke.name(), "total");
        assert_eq!(invoke.schedule().children().len(), 1);
    }

    #[test]
    fn test_intents() {
        let update = CallSite::builtin(BuiltInKind::IncXPlusY)
            .with_args(vec![ArgInfo::variable("f1"), ArgInfo::variable("f2")]);
        let write = CallSite::builtin(BuiltInKind::SetvalC)
            .with_args(vec![ArgInfo::variable("f2"), ArgInfo::literal("0.0_r_def")]);
        let config = Config::default().with_distributed_memory(false);
        let invoke = Invoke::new(vec![update, write], 0, &config, None).unwrap();
        let intents = invoke.unique_declarations_by_intent(ArgCategory::Field);
        assert_eq!(
            intents,
            vec![
                ("f1".to_string(), Intent::InOut),
                ("f2".to_string(), Intent::InOut)
            ]
        );
        assert!(invoke
            .unique_declarations(Some(ArgCategory::Scalar), None)
            .is_empty());
        assert_eq!(
            invoke.unique_declarations(Some(ArgCategory::Field), Some(Access::Write)),
            vec!["f2"]
        );
    }

    #[test]
    fn test_argument_count() {
        let site = testkern().with_args(vec![ArgInfo::variable("a")]);
        let err = Invoke::new(vec![site], 0, &Config::default(), None).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::SemanticViolation));
        assert!(err.to_string().contains(
            "In kernel 'testkern_code' the number of arguments specified in the kernel \
             metadata '3', must equal the number of arguments in the algorithm layer. \
             However, I found '1'"
        ));
    }

    #[test]
    fn test_vector_halo_exchanges() {
        let metadata = vec![ArgMeta::vector(Access::Inc, 3)];
        let site = CallSite::kernel("vec_code", "vec_mod", metadata)
            .with_args(vec![ArgInfo::variable("chi")]);
        let invoke = Invoke::new(vec![site], 2, &Config::default(), None).unwrap();
        let halos = invoke.schedule().children()[..3].to_vec();
        let indices: Vec<Option<usize>> = halos
            .iter()
            .map(|h| h.rd().as_halo_exchange().and_then(|h| h.vector_index()))
            .collect();
        assert_eq!(indices, vec![Some(1), Some(2), Some(3)]);
    }
}
