use crate::error::usage_error;
use crate::ir::call::zero_reduction_variables;
use crate::ir::gen::gen_children;
use crate::ir::gen::GenContext;
use crate::ir::GuardedNode;
use crate::ir::Node;
use crate::ir::NodeClass;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::targ3t::fortran::GenKind;
use crate::targ3t::fortran::GenNode;
use crate::targ3t::fortran::GuardedGenNode;
use anyhow::Result;

pub const VALID_LOOP_TYPES: &[&str] = &["colours", "colour", "inner", "outer", "null"];

/// A loop over the cells or degrees of freedom of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loop {
    loop_type: Option<String>,
    variable_name: String,
    start: String,
    stop: String,
    step: Option<String>,
    field_space: String,
    iteration_space: String,
}

impl Loop {
    pub fn new(variable_name: &str, start: &str, stop: &str) -> Loop {
        Loop {
            loop_type: None,
            variable_name: variable_name.to_string(),
            start: start.to_string(),
            stop: stop.to_string(),
            step: None,
            field_space: String::new(),
            iteration_space: String::new(),
        }
    }
    pub fn with_field_space(mut self, field_space: &str) -> Self {
        self.field_space = field_space.to_string();
        self
    }
    pub fn with_iteration_space(mut self, iteration_space: &str) -> Self {
        self.iteration_space = iteration_space.to_string();
        self
    }
    pub fn with_step(mut self, step: &str) -> Self {
        self.step = Some(step.to_string());
        self
    }
    pub fn with_loop_type(mut self, loop_type: &str) -> Result<Self> {
        self.set_loop_type(loop_type)?;
        Ok(self)
    }
    pub fn loop_type(&self) -> Option<&str> {
        self.loop_type.as_deref()
    }
    pub fn set_loop_type(&mut self, loop_type: &str) -> Result<()> {
        if !VALID_LOOP_TYPES.contains(&loop_type) {
            return Err(usage_error!(
                "Error, loop_type value ({loop_type}) is invalid. Must be one of \
                 {VALID_LOOP_TYPES:?}."
            ));
        }
        self.loop_type = Some(loop_type.to_string());
        Ok(())
    }
    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }
    pub fn start(&self) -> &str {
        &self.start
    }
    pub fn stop(&self) -> &str {
        &self.stop
    }
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }
    pub fn field_space(&self) -> &str {
        &self.field_space
    }
    pub fn iteration_space(&self) -> &str {
        &self.iteration_space
    }
    /// Whether the loop iterates over a single value only.
    pub fn is_trivial(&self) -> bool {
        self.start == "1" && self.stop == "1"
    }
    pub fn label(&self) -> String {
        format!(
            "Loop[type='{}',field_space='{}',it_space='{}']",
            self.loop_type.as_deref().unwrap_or(""),
            self.field_space,
            self.iteration_space
        )
    }
}

fn in_opencl_schedule(node: &Shared<Node>) -> bool {
    match node.ancestor(NodeClass::Schedule, &[]) {
        Some(schedule) => schedule.rd().as_schedule().is_some_and(|s| s.opencl()),
        None => false,
    }
}

pub(crate) fn gen_loop(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    if !node.is_openmp_parallel() {
        zero_reduction_variables(&node.reductions(None), parent, ctx)?;
    }
    let l = match node.rd().as_loop() {
        Some(l) => l.clone(),
        None => return gen_children(node, parent, ctx),
    };
    if in_opencl_schedule(node) || l.is_trivial() {
        return gen_children(node, parent, ctx);
    }
    let do_loop = parent.add(GenKind::Do {
        variable: l.variable_name.clone(),
        start: l.start.clone(),
        stop: l.stop.clone(),
        step: l.step.clone(),
    });
    parent.add(GenKind::decl("integer", &[&l.variable_name]));
    gen_children(node, &do_loop, ctx)
}
