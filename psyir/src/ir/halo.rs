use crate::error::generation_error;
use crate::ir::gen::GenContext;
use crate::ir::Access;
use crate::ir::Argument;
use crate::ir::Node;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::targ3t::fortran::GenKind;
use crate::targ3t::fortran::GenNode;
use crate::targ3t::fortran::GuardedGenNode;
use anyhow::Result;

/// Refresh of the halo of a field (or of one component of a vector field).
#[derive(Clone, Debug)]
pub struct HaloExchange {
    field: Argument,
    vector_index: Option<usize>,
    halo_type: String,
    halo_depth: usize,
    check_dirty: bool,
}

impl HaloExchange {
    /// The exchange both reads and writes the field, so it takes a copy of
    /// the argument with `readwrite` access.
    pub fn new(field: &Argument, vector_index: Option<usize>, check_dirty: bool) -> HaloExchange {
        HaloExchange {
            field: field.copy_with_access(Access::ReadWrite),
            vector_index,
            halo_type: "region".to_string(),
            halo_depth: 1,
            check_dirty,
        }
    }
    pub fn field(&self) -> &Argument {
        &self.field
    }
    pub fn field_mut(&mut self) -> &mut Argument {
        &mut self.field
    }
    /// Component of a vector field that is exchanged, counting from 1.
    pub fn vector_index(&self) -> Option<usize> {
        self.vector_index
    }
    pub fn halo_type(&self) -> &str {
        &self.halo_type
    }
    pub fn halo_depth(&self) -> usize {
        self.halo_depth
    }
    pub fn set_halo_depth(&mut self, depth: usize) {
        self.halo_depth = depth;
    }
    pub fn check_dirty(&self) -> bool {
        self.check_dirty
    }
    /// Check that `other` exchanges a different component of the same
    /// vector field; only then the two exchanges are independent.
    pub fn check_vector_halos_differ(&self, other: &Shared<Node>) -> Result<()> {
        let other = other.rd();
        let other = other.as_halo_exchange().ok_or_else(|| {
            generation_error!(
                "Internal error, the argument passed to \
                 HaloExchange.check_vector_halos_differ() is not a halo exchange object"
            )
        })?;
        let name = self.field.name();
        if name != other.field.name() {
            return Err(generation_error!(
                "Internal error, the halo exchange object passed to \
                 HaloExchange.check_vector_halos_differ() has a different field name '{}' \
                 to self '{name}'",
                other.field.name()
            ));
        }
        if self.field.vector_size() <= 1 {
            return Err(generation_error!(
                "Internal error, HaloExchange.check_vector_halos_differ() a halo exchange \
                 depends on another halo exchange but the vector size of field '{name}' is 1"
            ));
        }
        if self.field.vector_size() != other.field.vector_size() {
            return Err(generation_error!(
                "Internal error, HaloExchange.check_vector_halos_differ() a halo exchange \
                 depends on another halo exchange but the vector sizes for field '{name}' \
                 differ"
            ));
        }
        if self.vector_index == other.vector_index {
            return Err(generation_error!(
                "Internal error, HaloExchange.check_vector_halos_differ() a halo exchange \
                 depends on another halo exchange but both vector id's ('{}') of field \
                 '{name}' are the same",
                self.vector_index.map(|i| i.to_string()).unwrap_or_default()
            ));
        }
        Ok(())
    }
    /// Reference to the exchanged field (component).
    fn field_ref(&self) -> String {
        match self.vector_index {
            Some(index) => format!("{}({index})", self.field.name()),
            None => self.field.name().to_string(),
        }
    }
    pub fn label(&self) -> String {
        format!(
            "HaloExchange[field='{}', type='{}', depth={}, check_dirty={}]",
            self.field.name(),
            self.halo_type,
            self.halo_depth,
            self.check_dirty
        )
    }
}

/// Sum of a scalar over all partitions.
#[derive(Clone, Debug)]
pub struct GlobalSum {
    scalar: Argument,
}

impl GlobalSum {
    pub fn new(scalar: &Argument) -> GlobalSum {
        GlobalSum {
            scalar: scalar.copy_with_access(Access::ReadWrite),
        }
    }
    pub fn scalar(&self) -> &Argument {
        &self.scalar
    }
    pub fn scalar_mut(&mut self) -> &mut Argument {
        &mut self.scalar
    }
    pub fn label(&self) -> String {
        format!("GlobalSum[scalar='{}']", self.scalar.name())
    }
}

pub(crate) fn gen_halo_exchange(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    _ctx: &GenContext,
) -> Result<()> {
    let halo = node
        .rd()
        .as_halo_exchange()
        .cloned()
        .ok_or_else(|| generation_error!("expected a halo exchange"))?;
    let field = halo.field_ref();
    let depth = halo.halo_depth;
    let exchange = GenKind::call(&format!("{field}%halo_exchange"), vec![format!("depth={depth}")]);
    if halo.check_dirty {
        let if_dirty = parent.add(GenKind::IfThen {
            condition: format!("{field}%is_dirty(depth={depth})"),
        });
        if_dirty.add(exchange);
    } else {
        parent.add(exchange);
    }
    Ok(())
}

pub(crate) fn gen_global_sum(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    let scalar = node
        .rd()
        .as_global_sum()
        .map(|sum| sum.scalar.name().to_string())
        .ok_or_else(|| generation_error!("expected a global sum"))?;
    let sum_name = ctx
        .namespace
        .wr()
        .create_name_in("global_sum", "PSyVars", "global_sum");
    parent.add(GenKind::use_only("scalar_mod", &["scalar_type"]));
    parent.add(GenKind::TypeDecl {
        type_name: "scalar_type".to_string(),
        entities: vec![sum_name.clone()],
        intent: None,
    });
    parent.add(GenKind::assign(&format!("{sum_name}%value"), &scalar));
    parent.add(GenKind::assign(&scalar, &format!("{sum_name}%get_sum()")));
    Ok(())
}
