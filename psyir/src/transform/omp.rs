use crate::error::transformation_error;
use crate::ir::Access;
use crate::ir::ArgCategory;
use crate::ir::Directive;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::ir::NodeKind;
use crate::ir::VALID_OMP_SCHEDULES;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::applied;
use crate::transform::check_excluded;
use crate::transform::check_loop;
use crate::transform::check_siblings;
use crate::transform::validated;
use crate::transform::wrap;
use crate::transform::Memento;
use crate::transform::TransArgs;
use crate::transform::Transformation;
use anyhow::Result;

/// Enclose a sequence of sibling nodes in an OpenMP parallel region.
pub struct OMPParallelTrans;

/// Add an orphaned OpenMP `do` directive to a loop.
///
/// The loop has to end up inside a parallel region before code is
/// generated.
pub struct OMPLoopTrans;

/// Add an OpenMP `parallel do` directive to a loop.
pub struct OMPParallelLoopTrans;

/// The schedule from the arguments, defaulting to `static`.
fn omp_schedule(args: &TransArgs, trans: &str) -> Result<String> {
    let omp_schedule = args.omp_schedule.as_deref().unwrap_or("static").to_lowercase();
    let base = omp_schedule.split(',').next().unwrap_or("").trim();
    if !VALID_OMP_SCHEDULES.contains(&base) {
        return Err(transformation_error!(
            "Valid OpenMP schedules are {VALID_OMP_SCHEDULES:?} but {trans} got '{omp_schedule}'"
        ));
    }
    Ok(omp_schedule)
}

/// Kernels that increment a field may only run in parallel over cells of
/// a single colour.
fn check_increments(node: &Shared<Node>, trans: &str) -> Result<()> {
    let loop_type = node
        .rd()
        .as_loop()
        .and_then(|l| l.loop_type().map(|t| t.to_string()));
    if loop_type.as_deref() == Some("colours") {
        return Err(transformation_error!(
            "Error in {trans} transformation. The target loop is over colours and must be \
             computed serially."
        ));
    }
    if loop_type.as_deref() == Some("colour") {
        return Ok(());
    }
    for kern in node.kern_calls() {
        let has_inc = kern.args().iter().any(|arg| {
            arg.access() == Access::Inc && arg.arg_type().category() == ArgCategory::Field
        });
        if has_inc {
            return Err(transformation_error!(
                "Error in {trans} transformation. The kernel '{}' has an argument with INC \
                 access and therefore the loop must be coloured in order to be parallelised \
                 with OpenMP",
                kern.rd().as_call().map(|c| c.name().to_string()).unwrap_or_default()
            ));
        }
    }
    Ok(())
}

fn check_omp_loop(args: &TransArgs, trans: &str) -> Result<Shared<Node>> {
    let node = args.target(trans)?;
    check_loop(&node, trans)?;
    omp_schedule(args, trans)?;
    check_increments(&node, trans)?;
    Ok(node)
}

/// Reproducible-reduction policy of the schedule that holds `node`.
fn default_reprod(node: &Shared<Node>) -> bool {
    let root = node.root();
    let root = root.rd();
    root.as_schedule().is_some_and(|s| s.reproducible_reductions())
}

fn parent_of(node: &Shared<Node>, trans: &str) -> Result<Shared<Node>> {
    node.parent()
        .ok_or_else(|| transformation_error!("Error in {trans} transformation. No parent"))
}

impl Transformation for OMPParallelTrans {
    fn name(&self) -> &'static str {
        "OMPParallelTrans"
    }
    fn description(&self) -> &'static str {
        "Create an OpenMP PARALLEL region"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let name = self.name();
        check_siblings(&args.targets, name)?;
        for node in &args.targets {
            let nested = node.is_openmp_parallel()
                || node.rd().is(NodeClass::OmpParallel)
                || !node.walk(NodeClass::OmpParallel).is_empty();
            if nested {
                return Err(transformation_error!(
                    "Error in {name}: cannot create an OpenMP PARALLEL region within another \
                     OpenMP PARALLEL region."
                ));
            }
        }
        check_excluded(
            &args.targets,
            &[NodeClass::HaloExchange, NodeClass::GlobalSum],
            name,
        )
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let parent = check_siblings(&args.targets, self.name())?;
        let mut memento = Memento::new("OMPParallelTrans");
        memento.record_children(&parent);
        let region = wrap(
            &parent,
            &args.targets,
            NodeKind::Directive(Directive::OmpParallel),
        )?;
        applied(self, &region, memento)
    }
}

impl Transformation for OMPLoopTrans {
    fn name(&self) -> &'static str {
        "OMPLoopTrans"
    }
    fn description(&self) -> &'static str {
        "Adds an OpenMP directive to a loop"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        check_omp_loop(args, self.name())?;
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let node = args.target(self.name())?;
        let parent = parent_of(&node, self.name())?;
        let directive = Directive::OmpDo {
            omp_schedule: omp_schedule(args, self.name())?,
            reprod: args.reprod.unwrap_or_else(|| default_reprod(&node)),
        };
        let mut memento = Memento::new("OMPLoopTrans");
        memento.record_children(&parent);
        let directive = wrap(&parent, &[node], NodeKind::Directive(directive))?;
        applied(self, &directive, memento)
    }
}

impl Transformation for OMPParallelLoopTrans {
    fn name(&self) -> &'static str {
        "OMPParallelLoopTrans"
    }
    fn description(&self) -> &'static str {
        "Add an 'OpenMP PARALLEL DO' directive with no gang-specific checks"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let name = self.name();
        let node = check_omp_loop(args, name)?;
        if node.is_openmp_parallel() {
            return Err(transformation_error!(
                "Error in {name} transformation. The target loop is already inside an OpenMP \
                 parallel region"
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let node = args.target(self.name())?;
        let parent = parent_of(&node, self.name())?;
        let directive = Directive::OmpParallelDo {
            omp_schedule: omp_schedule(args, self.name())?,
        };
        let mut memento = Memento::new("OMPParallelLoopTrans");
        memento.record_children(&parent);
        let directive = wrap(&parent, &[node], NodeKind::Directive(directive))?;
        applied(self, &directive, memento)
    }
}
