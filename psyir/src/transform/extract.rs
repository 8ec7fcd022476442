use crate::error::transformation_error;
use crate::error::usage_error;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::ir::NodeKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::applied;
use crate::transform::check_excluded;
use crate::transform::check_siblings;
use crate::transform::validated;
use crate::transform::wrap;
use crate::transform::Memento;
use crate::transform::TransArgs;
use crate::transform::Transformation;
use anyhow::Result;
use tracing::info;

/// Enclose a sequence of sibling nodes in a region whose inputs and
/// outputs can be written out for standalone testing.
pub struct ExtractRegionTrans;

const NAME: &str = "ExtractRegionTrans";

impl Transformation for ExtractRegionTrans {
    fn name(&self) -> &'static str {
        NAME
    }
    fn description(&self) -> &'static str {
        "Create a code region for extracting a kernel's input and output data"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        check_siblings(&args.targets, NAME)?;
        for node in &args.targets {
            if node.ancestor(NodeClass::Extract, &[]).is_some() {
                return Err(transformation_error!(
                    "Error in {NAME}: extraction regions cannot be nested; the node is already \
                     inside an extraction region."
                ));
            }
        }
        check_excluded(
            &args.targets,
            &[NodeClass::HaloExchange, NodeClass::GlobalSum, NodeClass::Extract],
            NAME,
        )
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let parent = check_siblings(&args.targets, NAME)?;
        let mut memento = Memento::new(NAME);
        memento.record_children(&parent);
        let region = wrap(&parent, &args.targets, NodeKind::Extract)?;
        applied(self, &region, memento)
    }
}

/// Extraction of kernels by name.
pub struct Extractor;

impl Extractor {
    /// Enclose every call of `kernel_name` in `schedule` in its own
    /// extraction region.
    ///
    /// The region encloses the ancestor of the call that is a direct child
    /// of the schedule, so that the loops around the kernel are extracted
    /// as well.
    pub fn extract_kernel(schedule: &Shared<Node>, kernel_name: &str) -> Result<Shared<Node>> {
        let name = kernel_name.to_lowercase();
        let mut regions: Vec<Shared<Node>> = vec![];
        for kern in schedule.calls() {
            let matches = kern
                .rd()
                .as_call()
                .is_some_and(|c| c.name().to_lowercase() == name);
            if !matches {
                continue;
            }
            let mut outer = kern.clone();
            while let Some(parent) = outer.parent() {
                if parent.ptr_eq(schedule) {
                    break;
                }
                outer = parent;
            }
            if !regions.iter().any(|r| r.ptr_eq(&outer)) {
                regions.push(outer);
            }
        }
        if regions.is_empty() {
            return Err(usage_error!(
                "No kernel named '{kernel_name}' was found in the schedule"
            ));
        }
        for region in &regions {
            ExtractRegionTrans.apply(&TransArgs::new(region))?;
        }
        info!("Extracted {} region(s) for kernel {kernel_name}", regions.len());
        Ok(schedule.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use crate::error::ErrorKind;
    use crate::ir::Access;
    use crate::ir::ArgType;
    use crate::ir::Argument;
    use crate::ir::Call;
    use crate::ir::HaloExchange;
    use crate::ir::Kern;
    use crate::ir::Loop;
    use crate::ir::Schedule;
    use indoc::indoc;

    fn kern_loop(name: &str) -> Shared<Node> {
        let arg = Argument::named("f1", Access::Read, ArgType::Field);
        let call = Call::new(name, vec![arg]).unwrap();
        let l = Loop::new("cell", "1", "ncell")
            .with_field_space("w1")
            .with_iteration_space("cells");
        let node = Node::new(NodeKind::Loop(l));
        node.addchild(Node::new(NodeKind::Kern(Kern::new(call, "m_mod"))), None);
        node
    }

    fn schedule(children: &[Shared<Node>]) -> Shared<Node> {
        let schedule = Node::new(NodeKind::Schedule(Schedule::standalone("invoke_0")));
        schedule.set_children(children.to_vec());
        schedule
    }

    #[test]
    fn test_extract_kernel() {
        let schedule = schedule(&[kern_loop("a_code"), kern_loop("b_code"), kern_loop("a_code")]);
        Extractor::extract_kernel(&schedule, "A_CODE").unwrap();
        let expected = indoc! {"
            Schedule[invoke='invoke_0']
              Extract[]
                Loop[type='',field_space='w1',it_space='cells']
                  KernCall a_code(f1) [module_inline=false]
              Loop[type='',field_space='w1',it_space='cells']
                KernCall b_code(f1) [module_inline=false]
              Extract[]
                Loop[type='',field_space='w1',it_space='cells']
                  KernCall a_code(f1) [module_inline=false]
        "};
        assert_eq!(schedule.view(), expected);

        let err = Extractor::extract_kernel(&schedule, "c_code").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Usage));
    }

    #[test]
    fn test_nested_and_excluded() {
        let l = kern_loop("a_code");
        let schedule = schedule(&[l.clone()]);
        let (_, memento) = ExtractRegionTrans.apply(&TransArgs::new(&l)).unwrap();
        let err = ExtractRegionTrans.validate(&TransArgs::new(&l)).unwrap_err();
        assert!(err.to_string().contains("cannot be nested"));
        let region = schedule.children()[0].clone();
        let err = ExtractRegionTrans.validate(&TransArgs::new(&region)).unwrap_err();
        assert!(err.to_string().contains("'ExtractNode' cannot be enclosed"));
        memento.undo();
        assert!(schedule.children()[0].ptr_eq(&l));

        let field = Argument::named("f1", Access::ReadWrite, ArgType::Field);
        let halo = Node::new(NodeKind::HaloExchange(HaloExchange::new(&field, None, true)));
        schedule.addchild(halo.clone(), Some(0));
        let err = ExtractRegionTrans
            .validate(&TransArgs::nodes(&[halo, l]))
            .unwrap_err();
        assert!(err.to_string().contains("'HaloExchange' cannot be enclosed"));
    }
}
