use crate::error::transformation_error;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::applied;
use crate::transform::validated;
use crate::transform::Memento;
use crate::transform::TransArgs;
use crate::transform::Transformation;
use anyhow::Result;

/// Put the subroutine of a kernel into the generated PSy-layer module
/// instead of `use`-ing the kernel module.
///
/// All calls of the same kernel in the schedule are inlined together.
pub struct KernelModuleInlineTrans;

const NAME: &str = "KernelModuleInlineTrans";

impl Transformation for KernelModuleInlineTrans {
    fn name(&self) -> &'static str {
        NAME
    }
    fn description(&self) -> &'static str {
        "Inline a kernel subroutine into the PSy module"
    }
    fn validate(&self, args: &TransArgs) -> Result<()> {
        let node = args.target(NAME)?;
        let node = node.rd();
        let kern = node.as_kern().ok_or_else(|| {
            transformation_error!(
                "Error in {NAME} transformation. The supplied node must be a Kern but got \
                 '{}'",
                node.type_name()
            )
        })?;
        if kern.modified() {
            return Err(transformation_error!(
                "Cannot inline kernel {} because it has previously been transformed.",
                kern.name()
            ));
        }
        Ok(())
    }
    fn apply(&self, args: &TransArgs) -> Result<(Shared<Node>, Memento)> {
        validated(self, args)?;
        let node = args.target(NAME)?;
        let name = node
            .rd()
            .as_kern()
            .map(|k| k.name().to_lowercase())
            .unwrap_or_default();
        let root = node.root();
        let mut kerns = vec![root.clone()];
        kerns.extend(root.kern_calls());
        let mut memento = Memento::new(NAME);
        for kern in kerns {
            let same = kern
                .rd()
                .as_kern()
                .is_some_and(|k| k.name().to_lowercase() == name);
            if same {
                memento.record_kind(&kern);
                if let Some(k) = kern.wr().as_kern_mut() {
                    k.set_module_inline(true);
                }
            }
        }
        applied(self, &node, memento)
    }
}
