use crate::error::transformation_error;
use crate::ir::Directive;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::ir::NodeKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::applied;
use crate::transform::check_loop;
use crate::transform::check_siblings;
use crate::transform::validated;
use crate::transform::wrap;
use crate::transform::Memento;
use crate::transform::TransArgs;
use crate::transform::Transformation;
use anyhow::Result;

/// Enclose a sequence of sibling nodes in an OpenACC parallel region.
pub struct ACCParallelTrans;

/// Add an OpenACC `loop` directive to a loop.
pub struct ACCLoopTrans;

/// Add an OpenACC `enter data` directive at the start of a schedule.
pub struct ACCEnterDataTrans;

/// Mark a kernel as an OpenACC routine so that it can be called from
/// device code.
pub struct ACCRoutineTrans;

impl Transformation for ACCParallelTrans {
    fn name(&self) -> &'static str {
        "ACCParallelTrans"
    }
    fn description(&self) -> &'static str {
        "Create an OpenACC parallel region"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let name = self.name();
        check_siblings(&args.targets, name)?;
        for node in &args.targets {
            let nested = node.ancestor(NodeClass::AccParallel, &[]).is_some()
                || node.rd().is(NodeClass::AccParallel)
                || !node.walk(NodeClass::AccParallel).is_empty();
            if nested {
                return Err(transformation_error!(
                    "Error in {name}: cannot create an OpenACC parallel region within another \
                     OpenACC parallel region."
                ));
            }
            if node.rd().is(NodeClass::AccData) {
                return Err(transformation_error!(
                    "Error in {name}: an OpenACC enter data directive cannot be enclosed by a \
                     parallel region."
                ));
            }
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let parent = check_siblings(&args.targets, self.name())?;
        let mut memento = Memento::new("ACCParallelTrans");
        memento.record_children(&parent);
        let region = wrap(
            &parent,
            &args.targets,
            NodeKind::Directive(Directive::AccParallel),
        )?;
        applied(self, &region, memento)
    }
}

impl Transformation for ACCLoopTrans {
    fn name(&self) -> &'static str {
        "ACCLoopTrans"
    }
    fn description(&self) -> &'static str {
        "Adds an 'OpenACC loop' directive to a loop"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let name = self.name();
        let node = args.target(name)?;
        check_loop(&node, name)?;
        if args.collapse == Some(0) {
            return Err(transformation_error!(
                "Error in {name}: the number of loops to collapse must be at least 1."
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let node = args.target(self.name())?;
        let parent = node.parent().ok_or_else(|| {
            transformation_error!("Error in {}: the loop has no parent", self.name())
        })?;
        let directive = Directive::AccLoop {
            collapse: args.collapse,
            independent: args.independent.unwrap_or(true),
        };
        let mut memento = Memento::new("ACCLoopTrans");
        memento.record_children(&parent);
        let directive = wrap(&parent, &[node], NodeKind::Directive(directive))?;
        applied(self, &directive, memento)
    }
}

impl Transformation for ACCEnterDataTrans {
    fn name(&self) -> &'static str {
        "ACCEnterDataTrans"
    }
    fn description(&self) -> &'static str {
        "Adds an OpenACC 'enter data' directive"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let name = self.name();
        let node = args.target(name)?;
        let guard = node.rd();
        if !guard.is(NodeClass::Schedule) || guard.is(NodeClass::KernelSchedule) {
            return Err(transformation_error!(
                "Cannot apply an OpenACC enter-data directive to something that is not a \
                 Schedule; got '{}'",
                guard.type_name()
            ));
        }
        drop(guard);
        if !node.walk(NodeClass::AccData).is_empty() {
            return Err(transformation_error!(
                "Schedule already has an OpenACC data region - cannot add an enter data."
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let schedule = args.target(self.name())?;
        let mut memento = Memento::new("ACCEnterDataTrans");
        memento.record_children(&schedule);
        let directive = Node::new(NodeKind::Directive(Directive::AccData));
        schedule.addchild(directive.clone(), Some(0));
        applied(self, &directive, memento)
    }
}

impl Transformation for ACCRoutineTrans {
    fn name(&self) -> &'static str {
        "ACCRoutineTrans"
    }
    fn description(&self) -> &'static str {
        "Adds an OpenACC 'routine' directive to a kernel"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let name = self.name();
        let node = args.target(name)?;
        let node = node.rd();
        let kern = node.as_kern().ok_or_else(|| {
            transformation_error!(
                "The {name} must be applied to a sub-class of Kern but got '{}'",
                node.type_name()
            )
        })?;
        if kern.module_inline() {
            return Err(transformation_error!(
                "Cannot transform kernel '{}' because it will be module-inlined.",
                kern.name()
            ));
        }
        if kern.source().is_none() {
            return Err(transformation_error!(
                "Cannot transform kernel '{}' because its source is not available.",
                kern.name()
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let node = args.target(self.name())?;
        let mut memento = Memento::new("ACCRoutineTrans");
        memento.record_kind(&node);
        {
            let mut guard = node.wr();
            if let Some(kern) = guard.as_kern_mut() {
                let name = kern.name().to_string();
                if let Some(source) = kern.source_mut() {
                    source.insert_after_subroutine(&name, "!$acc routine")?;
                }
                kern.set_modified(true);
            }
        }
        applied(self, &node, memento)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::KernelSource;
    use crate::ir::Access;
    use crate::ir::ArgType;
    use crate::ir::Argument;
    use crate::ir::Call;
    use crate::ir::Kern;
    use crate::ir::Loop;
    use crate::ir::Schedule;
    use indoc::indoc;

    fn kern() -> Kern {
        let arg = Argument::named("f1", Access::Write, ArgType::Field);
        let call = Call::new("testkern_code", vec![arg]).unwrap();
        Kern::new(call, "testkern_mod")
    }

    fn schedule() -> (Shared<Node>, Shared<Node>) {
        let schedule = Node::new(NodeKind::Schedule(Schedule::standalone("invoke_0")));
        let l = Loop::new("cell", "1", "ncell")
            .with_field_space("w1")
            .with_iteration_space("cells");
        let l = Node::new(NodeKind::Loop(l));
        l.addchild(Node::new(NodeKind::Kern(kern())), None);
        schedule.addchild(l.clone(), None);
        (schedule, l)
    }

    #[test]
    fn test_parallel_loop_and_data() {
        let (schedule, l) = schedule();
        let args = TransArgs::new(&l).with_collapse(2);
        ACCLoopTrans.apply(&args).unwrap();
        let directive = schedule.children()[0].clone();
        ACCParallelTrans.apply(&TransArgs::new(&directive)).unwrap();
        let (_, memento) = ACCEnterDataTrans.apply(&TransArgs::new(&schedule)).unwrap();
        let expected = indoc! {"
            Schedule[invoke='invoke_0']
              Directive[ACC enter data]
              Directive[ACC Parallel]
                Directive[ACC Loop, collapse=2, independent]
                  Loop[type='',field_space='w1',it_space='cells']
                    KernCall testkern_code(f1) [module_inline=false]
        "};
        assert_eq!(schedule.view(), expected);

        let err = ACCEnterDataTrans.validate(&TransArgs::new(&schedule)).unwrap_err();
        assert!(err.to_string().contains("already has an OpenACC data region"));
        let err = ACCParallelTrans.validate(&TransArgs::new(&directive)).unwrap_err();
        assert!(err.to_string().contains("within another OpenACC parallel region"));
        let err = ACCEnterDataTrans.validate(&TransArgs::new(&l)).unwrap_err();
        assert!(err.to_string().contains("not a Schedule; got 'Loop'"));

        memento.undo();
        assert_eq!(schedule.children().len(), 1);
    }

    #[test]
    fn test_collapse() {
        let (_schedule, l) = schedule();
        let args = TransArgs::new(&l).with_collapse(0).with_independent(false);
        let err = ACCLoopTrans.validate(&args).unwrap_err();
        assert!(err.to_string().contains("must be at least 1"));
    }

    #[test]
    fn test_routine() {
        let src = indoc! {"
            module testkern_mod
            contains
              subroutine testkern_code(f1)
                real, intent(out) :: f1(:)
              end subroutine testkern_code
            end module testkern_mod
        "};
        let source = KernelSource::parse(src).unwrap();
        let node = Node::new(NodeKind::Kern(kern().with_source(source)));
        let (_, memento) = ACCRoutineTrans.apply(&TransArgs::new(&node)).unwrap();
        {
            let guard = node.rd();
            let kern = guard.as_kern().unwrap();
            assert!(kern.modified());
            let text = kern.source().unwrap().to_string();
            assert!(text.contains("subroutine testkern_code(f1)\n    !$acc routine\n"));
        }
        memento.undo();
        let guard = node.rd();
        assert!(!guard.as_kern().unwrap().modified());
        assert!(!guard.as_kern().unwrap().source().unwrap().to_string().contains("!$acc"));

        let err = ACCRoutineTrans
            .validate(&TransArgs::new(&Node::new(NodeKind::Kern(kern()))))
            .unwrap_err();
        assert!(err.to_string().contains("its source is not available"));
    }
}
