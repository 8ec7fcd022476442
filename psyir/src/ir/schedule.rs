use crate::ir::SymbolTable;
use crate::namespace::NameSpace;
use crate::shared::Shared;
use parking_lot::RwLock;
use std::sync::Arc;

/// Root of the tree of one invoke.
#[derive(Clone, Debug)]
pub struct Schedule {
    invoke_name: String,
    opencl: bool,
    reproducible_reductions: bool,
    namespace: Shared<NameSpace>,
}

impl Schedule {
    pub fn new(invoke_name: &str, namespace: Shared<NameSpace>) -> Schedule {
        Schedule {
            invoke_name: invoke_name.to_string(),
            opencl: false,
            reproducible_reductions: false,
            namespace,
        }
    }
    /// Whether OpenMP loops added to this schedule default to reproducible
    /// reductions.
    pub fn with_reproducible_reductions(mut self, reprod: bool) -> Schedule {
        self.reproducible_reductions = reprod;
        self
    }
    /// Schedule with its own, empty name space.
    pub fn standalone(invoke_name: &str) -> Schedule {
        Schedule::new(invoke_name, Arc::new(RwLock::new(NameSpace::new())))
    }
    pub fn invoke_name(&self) -> &str {
        &self.invoke_name
    }
    pub fn opencl(&self) -> bool {
        self.opencl
    }
    pub fn set_opencl(&mut self, opencl: bool) {
        self.opencl = opencl;
    }
    pub fn reproducible_reductions(&self) -> bool {
        self.reproducible_reductions
    }
    pub fn namespace(&self) -> Shared<NameSpace> {
        self.namespace.clone()
    }
    pub fn label(&self) -> String {
        let mut text = format!("Schedule[invoke='{}']", self.invoke_name);
        if self.opencl {
            text.push_str("[OpenCL]");
        }
        text
    }
}

/// Root of the tree of one kernel subroutine.
#[derive(Clone, Debug)]
pub struct KernelSchedule {
    name: String,
    symbol_table: SymbolTable,
}

impl KernelSchedule {
    pub fn new(name: &str) -> KernelSchedule {
        KernelSchedule {
            name: name.to_string(),
            symbol_table: SymbolTable::default(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }
    pub fn symbol_table_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbol_table
    }
    pub fn label(&self) -> String {
        format!("Schedule[name:'{}']", self.name)
    }
}
