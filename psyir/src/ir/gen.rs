use crate::config::Config;
use crate::error::not_implemented;
use crate::ir::call::gen_builtin;
use crate::ir::directive::gen_directive;
use crate::ir::halo::gen_global_sum;
use crate::ir::halo::gen_halo_exchange;
use crate::ir::kern::gen_kern;
use crate::ir::loops::gen_loop;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeKind;
use crate::namespace::NameSpace;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::targ3t::fortran::GenKind;
use crate::targ3t::fortran::GenNode;
use crate::targ3t::fortran::GuardedGenNode;
use anyhow::Result;

/// State that is shared while lowering one invoke.
pub struct GenContext<'a> {
    pub config: &'a Config,
    /// Names of the generated PSy-layer variables.
    pub namespace: Shared<NameSpace>,
}

impl<'a> GenContext<'a> {
    pub fn new(config: &'a Config, namespace: Shared<NameSpace>) -> Self {
        GenContext { config, namespace }
    }
}

type GenFn = fn(&Shared<Node>, &Shared<GenNode>, &GenContext) -> Result<()>;

/// Lower `node` and its children into the builder tree below `parent`.
pub fn gen_code(node: &Shared<Node>, parent: &Shared<GenNode>, ctx: &GenContext) -> Result<()> {
    // The guard must be released before generating since generation may
    // modify the node (for example when a kernel is renamed).
    let gen: GenFn = match node.rd().kind() {
        NodeKind::Schedule(_) => gen_children,
        NodeKind::Kern(_) => gen_kern,
        NodeKind::BuiltIn(_) => gen_builtin,
        NodeKind::Loop(_) => gen_loop,
        NodeKind::Directive(_) => gen_directive,
        NodeKind::HaloExchange(_) => gen_halo_exchange,
        NodeKind::GlobalSum(_) => gen_global_sum,
        NodeKind::Extract => gen_extract,
        NodeKind::IfBlock
        | NodeKind::KernelSchedule(_)
        | NodeKind::CodeBlock(_)
        | NodeKind::Assignment
        | NodeKind::Reference(_)
        | NodeKind::ArrayReference(_)
        | NodeKind::Literal(_)
        | NodeKind::BinaryOperation(_) => gen_unsupported,
    };
    gen(node, parent, ctx)
}

pub(crate) fn gen_children(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    for child in node.children() {
        gen_code(&child, parent, ctx)?;
    }
    Ok(())
}

fn gen_extract(node: &Shared<Node>, parent: &Shared<GenNode>, ctx: &GenContext) -> Result<()> {
    parent.add(GenKind::comment(""));
    parent.add(GenKind::comment(" ExtractStart"));
    parent.add(GenKind::comment(""));
    gen_children(node, parent, ctx)?;
    parent.add(GenKind::comment(""));
    parent.add(GenKind::comment(" ExtractEnd"));
    parent.add(GenKind::comment(""));
    Ok(())
}

fn gen_unsupported(
    node: &Shared<Node>,
    _parent: &Shared<GenNode>,
    _ctx: &GenContext,
) -> Result<()> {
    Err(not_implemented!(
        "gen_code() is not supported for '{}' nodes",
        node.rd().type_name()
    ))
}
