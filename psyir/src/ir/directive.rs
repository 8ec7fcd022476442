use crate::error::generation_error;
use crate::error::internal_error;
use crate::ir::call::reduction_sum_loop;
use crate::ir::call::thread_index_name;
use crate::ir::call::zero_reduction_variables;
use crate::ir::gen::gen_children;
use crate::ir::gen::GenContext;
use crate::ir::ArgCategory;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::targ3t::fortran::GenKind;
use crate::targ3t::fortran::GenNode;
use crate::targ3t::fortran::GuardedGenNode;
use anyhow::Result;
use tracing::warn;

pub const VALID_OMP_SCHEDULES: &[&str] = &["runtime", "static", "dynamic", "guided", "auto"];

/// OpenMP and OpenACC directives.
///
/// A directive applies to its children; the children are the region (or
/// loop) that the directive annotates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    OmpParallel,
    /// Orphaned worksharing loop inside an [Directive::OmpParallel] region.
    OmpDo {
        omp_schedule: String,
        reprod: bool,
    },
    OmpParallelDo {
        omp_schedule: String,
    },
    /// `enter data`; has no children.
    AccData,
    AccParallel,
    AccLoop {
        collapse: Option<usize>,
        independent: bool,
    },
}

impl Directive {
    pub fn is_omp(&self) -> bool {
        matches!(
            self,
            Directive::OmpParallel | Directive::OmpDo { .. } | Directive::OmpParallelDo { .. }
        )
    }
    pub fn is_acc(&self) -> bool {
        !self.is_omp()
    }
    pub fn opens_parallel_region(&self) -> bool {
        matches!(self, Directive::OmpParallel | Directive::OmpParallelDo { .. })
    }
    pub fn is_worksharing_loop(&self) -> bool {
        matches!(self, Directive::OmpDo { .. } | Directive::OmpParallelDo { .. })
    }
    /// Whether reductions in the loop are computed reproducibly.
    pub fn reprod(&self) -> bool {
        match self {
            Directive::OmpDo { reprod, .. } => *reprod,
            _ => false,
        }
    }
    pub fn type_name(&self) -> &'static str {
        match self {
            Directive::OmpParallel => "OMPParallelDirective",
            Directive::OmpDo { .. } => "OMPDoDirective",
            Directive::OmpParallelDo { .. } => "OMPParallelDoDirective",
            Directive::AccData => "ACCEnterDataDirective",
            Directive::AccParallel => "ACCParallelDirective",
            Directive::AccLoop { .. } => "ACCLoopDirective",
        }
    }
    /// Prefix of the vertex name in the dependence graph.
    pub fn dag_prefix(&self) -> &'static str {
        match self {
            Directive::OmpParallel => "OMP_parallel",
            Directive::OmpDo { .. } => "OMP_do",
            Directive::OmpParallelDo { .. } => "OMP_parallel_do",
            Directive::AccData => "ACC_data",
            Directive::AccParallel => "ACC_parallel",
            Directive::AccLoop { .. } => "ACC_loop",
        }
    }
    pub fn label(&self, has_reductions: bool) -> String {
        match self {
            Directive::OmpParallel => "Directive[OMP parallel]".to_string(),
            Directive::OmpDo { reprod, .. } if has_reductions => {
                format!("Directive[OMP do][reprod={reprod}]")
            }
            Directive::OmpDo { .. } => "Directive[OMP do]".to_string(),
            Directive::OmpParallelDo { .. } => "Directive[OMP parallel do]".to_string(),
            Directive::AccData => "Directive[ACC enter data]".to_string(),
            Directive::AccParallel => "Directive[ACC Parallel]".to_string(),
            Directive::AccLoop {
                collapse,
                independent,
            } => {
                let mut text = "Directive[ACC Loop".to_string();
                if let Some(collapse) = collapse {
                    text.push_str(&format!(", collapse={collapse}"));
                }
                if *independent {
                    text.push_str(", independent");
                }
                text.push(']');
                text
            }
        }
    }
}

/// Loop variables and kernel local variables below `node`; these have to be
/// private to each thread.
pub(crate) fn private_list(node: &Shared<Node>) -> Result<Vec<String>> {
    let mut result: Vec<String> = vec![];
    let mut push = |name: String| {
        if !result.contains(&name) {
            result.push(name);
        }
    };
    for l in node.loops() {
        if let Some(l) = l.rd().as_loop() {
            if !l.variable_name().is_empty() {
                push(l.variable_name().to_lowercase());
            }
        }
    }
    for call in node.calls() {
        let call = call.rd();
        let call = match call.as_call() {
            Some(call) => call,
            None => continue,
        };
        for name in call.local_vars() {
            if name.is_empty() {
                return Err(internal_error!(
                    "call '{}' has a local variable but its name is not set.",
                    call.name()
                ));
            }
            push(name.to_lowercase());
        }
    }
    Ok(result)
}

fn not_within_omp_parallel_region(node: &Shared<Node>) -> Result<()> {
    if node.ancestor(NodeClass::OmpParallel, &[]).is_some() {
        return Err(generation_error!("Cannot nest OpenMP parallel regions."));
    }
    Ok(())
}

fn check_unique_reductions(calls: &[Shared<Node>]) -> Result<()> {
    let mut names: Vec<String> = vec![];
    for call in calls {
        let name = match call.rd().as_call().and_then(|c| c.reduction_arg()) {
            Some(arg) => arg.name().to_string(),
            None => continue,
        };
        if names.contains(&name) {
            return Err(generation_error!(
                "Reduction variables can only be used once in an invoke. '{name}' is used \
                 multiple times, please use a different reduction variable"
            ));
        }
        names.push(name);
    }
    Ok(())
}

fn check_homogeneous_children(node: &Shared<Node>) -> Result<()> {
    let children = node.children();
    let mut names = children.iter().map(|c| c.rd().type_name());
    if let Some(first) = names.next() {
        if names.any(|name| name != first) {
            return Err(generation_error!(
                "Cannot correctly generate code for an OpenMP parallel region containing \
                 children of different types"
            ));
        }
    }
    Ok(())
}

/// `, reduction(+:x)` for every reduction below `node`.
fn reduction_clauses(node: &Shared<Node>) -> String {
    node.reductions(None)
        .iter()
        .filter_map(|call| {
            let call = call.rd();
            call.as_call()
                .and_then(|c| c.reduction_arg())
                .map(|arg| format!(", reduction(+:{})", arg.name()))
        })
        .collect()
}

fn directive_of(node: &Shared<Node>) -> Result<Directive> {
    let node = node.rd();
    node.as_directive()
        .cloned()
        .ok_or_else(|| internal_error!("expected a directive but found '{}'", node.type_name()))
}

pub(crate) fn gen_directive(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    match directive_of(node)? {
        Directive::OmpParallel => gen_omp_parallel(node, parent, ctx),
        Directive::OmpDo {
            omp_schedule,
            reprod,
        } => gen_omp_do(node, parent, ctx, &omp_schedule, reprod),
        Directive::OmpParallelDo { omp_schedule } => {
            gen_omp_parallel_do(node, parent, ctx, &omp_schedule)
        }
        Directive::AccData => gen_acc_data(node, parent, ctx),
        Directive::AccParallel => gen_acc_parallel(node, parent, ctx),
        Directive::AccLoop {
            collapse,
            independent,
        } => gen_acc_loop(node, parent, ctx, collapse, independent),
    }
}

fn gen_omp_parallel(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    let mut private = private_list(node)?;
    let reprod_calls = node.reductions(Some(true));
    let thread_index = if reprod_calls.is_empty() {
        None
    } else {
        let name = thread_index_name(ctx);
        private.push(name.clone());
        parent.add(GenKind::decl("integer", &[&name]));
        Some(name)
    };
    not_within_omp_parallel_region(node)?;
    if node.walk(NodeClass::OmpDirective).is_empty() {
        warn!("OpenMP parallel region does not enclose any OpenMP directives");
    }
    let calls = node.reductions(None);
    check_unique_reductions(&calls)?;
    zero_reduction_variables(&calls, parent, ctx)?;
    parent.add(GenKind::omp(&format!(
        "parallel default(shared), private({})",
        private.join(",")
    )));
    if let Some(thread_index) = &thread_index {
        parent.add(GenKind::use_only("omp_lib", &["omp_get_thread_num"]));
        parent.add(GenKind::assign(thread_index, "omp_get_thread_num()+1"));
    }
    check_homogeneous_children(node)?;
    gen_children(node, parent, ctx)?;
    parent.add(GenKind::omp("end parallel"));
    if !reprod_calls.is_empty() {
        parent.add(GenKind::comment(""));
        parent.add(GenKind::comment(" sum the partial results sequentially"));
        parent.add(GenKind::comment(""));
        for call in &reprod_calls {
            reduction_sum_loop(call, parent, ctx)?;
        }
    }
    Ok(())
}

fn gen_omp_do(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
    omp_schedule: &str,
    reprod: bool,
) -> Result<()> {
    if node
        .ancestor(NodeClass::OmpParallel, &[NodeClass::OmpParallelDo])
        .is_none()
    {
        return Err(generation_error!(
            "OMPOrphanLoopDirective must have an OMPRegionDirective as ancestor"
        ));
    }
    let reductions = if reprod {
        String::new()
    } else {
        reduction_clauses(node)
    };
    parent.add(GenKind::omp(&format!(
        "do schedule({omp_schedule}){reductions}"
    )));
    gen_children(node, parent, ctx)?;
    parent.add(GenKind::omp("end do"));
    Ok(())
}

fn gen_omp_parallel_do(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
    omp_schedule: &str,
) -> Result<()> {
    not_within_omp_parallel_region(node)?;
    let count = node.children().len();
    if count != 1 {
        return Err(generation_error!(
            "An OpenMP PARALLEL DO can only be applied to a single loop but this Node has \
             {count} children"
        ));
    }
    let calls = node.reductions(None);
    check_unique_reductions(&calls)?;
    zero_reduction_variables(&calls, parent, ctx)?;
    let private = private_list(node)?;
    parent.add(GenKind::omp(&format!(
        "parallel do default(shared), private({}), schedule({omp_schedule}){}",
        private.join(","),
        reduction_clauses(node)
    )));
    gen_children(node, parent, ctx)?;
    parent.add(GenKind::omp("end parallel do"));
    Ok(())
}

/// Names of the arguments of the given category used by calls below
/// `node`, in order of first use.
fn call_args(node: &Shared<Node>, category: ArgCategory) -> Vec<String> {
    let mut names: Vec<String> = vec![];
    for call in node.calls() {
        for arg in call.rd().own_args().unwrap_or_default() {
            if arg.is_literal() || arg.arg_type().category() != category {
                continue;
            }
            if !names.iter().any(|n| n == arg.name()) {
                names.push(arg.name().to_string());
            }
        }
    }
    names
}

fn gen_acc_data(node: &Shared<Node>, parent: &Shared<GenNode>, ctx: &GenContext) -> Result<()> {
    let regions = node.root().walk(NodeClass::AccParallel);
    let mut fields: Vec<String> = vec![];
    let mut scalars: Vec<String> = vec![];
    for region in &regions {
        for category in [ArgCategory::Field, ArgCategory::Operator] {
            for name in call_args(region, category) {
                if !fields.contains(&name) {
                    fields.push(name);
                }
            }
        }
        for name in call_args(region, ArgCategory::Scalar) {
            if !scalars.contains(&name) {
                scalars.push(name);
            }
        }
    }
    let first_time = ctx
        .namespace
        .wr()
        .create_name_in("first_time", "PSyVars", "first_time");
    parent.add(
        GenKind::decl("logical", &[&first_time])
            .with_attribute("save")
            .with_initial(".True."),
    );
    parent.add(GenKind::comment(" Ensure all fields are on the device and"));
    parent.add(GenKind::comment(" copy them over if not."));
    let if_first = parent.add(GenKind::IfThen {
        condition: first_time.clone(),
    });
    if_first.add(GenKind::acc(&format!("enter data copyin({})", fields.join(","))));
    if_first.add(GenKind::assign(&first_time, ".false."));
    parent.add(GenKind::comment(""));
    if !scalars.is_empty() {
        parent.add(GenKind::use_only("openacc", &["acc_update_device"]));
        parent.add(GenKind::comment(
            " Ensure all scalars on the device are up-to-date",
        ));
        for scalar in &scalars {
            parent.add(GenKind::call(
                "acc_update_device",
                vec![scalar.clone(), "1".to_string()],
            ));
        }
        parent.add(GenKind::comment(""));
    }
    Ok(())
}

fn invoke_name(node: &Shared<Node>) -> String {
    let root = node.root();
    let root = root.rd();
    match root.as_schedule() {
        Some(schedule) => schedule.invoke_name().to_string(),
        None => root.type_name().to_string(),
    }
}

fn gen_acc_parallel(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    let data = node.root().walk(NodeClass::AccData);
    if data.len() != 1 {
        return Err(generation_error!(
            "A Schedule containing an ACC parallel region must also contain an ACC enter \
             data directive but none was found for {}",
            invoke_name(node)
        ));
    }
    if data[0].abs_position()? > node.abs_position()? {
        return Err(generation_error!(
            "An ACC parallel region must be preceeded by an ACC enter-data directive but in \
             {} this is not the case.",
            invoke_name(node)
        ));
    }
    parent.add(GenKind::acc("parallel default(present)"));
    gen_children(node, parent, ctx)?;
    parent.add(GenKind::acc("end parallel"));
    Ok(())
}

fn gen_acc_loop(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
    collapse: Option<usize>,
    independent: bool,
) -> Result<()> {
    if node.ancestor(NodeClass::AccParallel, &[]).is_none() {
        return Err(generation_error!(
            "ACCLoopDirective must have an ACCParallelDirective as an ancestor in the Schedule"
        ));
    }
    let mut options = vec![];
    if let Some(collapse) = collapse {
        options.push(format!("collapse({collapse})"));
    }
    if independent {
        options.push("independent".to_string());
    }
    let content = if options.is_empty() {
        "loop".to_string()
    } else {
        format!("loop {}", options.join(" "))
    };
    parent.add(GenKind::acc(&content));
    gen_children(node, parent, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        let omp_do = Directive::OmpDo {
            omp_schedule: "static".to_string(),
            reprod: true,
        };
        assert_eq!(omp_do.label(false), "Directive[OMP do]");
        assert_eq!(omp_do.label(true), "Directive[OMP do][reprod=true]");
        let acc_loop = Directive::AccLoop {
            collapse: Some(2),
            independent: true,
        };
        assert_eq!(acc_loop.label(false), "Directive[ACC Loop, collapse=2, independent]");
        assert!(acc_loop.is_acc());
        let parallel_do = Directive::OmpParallelDo {
            omp_schedule: "static".to_string(),
        };
        assert!(parallel_do.opens_parallel_region());
        assert!(parallel_do.is_worksharing_loop());
        assert!(!parallel_do.reprod());
    }
}
