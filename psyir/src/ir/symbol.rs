use crate::error::not_implemented;
use crate::error::usage_error;
use anyhow::Result;
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Real,
    Integer,
    Character,
}

impl FromStr for DataType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "real" => Ok(DataType::Real),
            "integer" => Ok(DataType::Integer),
            "character" => Ok(DataType::Character),
            _ => Err(not_implemented!(
                "Symbol can only be initialized with ('real', 'integer', 'character') \
                 datatypes but found '{s}'."
            )),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Real => write!(f, "real"),
            DataType::Integer => write!(f, "integer"),
            DataType::Character => write!(f, "character"),
        }
    }
}

/// Whether a symbol only lives inside the kernel or is passed in as an
/// argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Local,
    GlobalArgument,
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Scope::Local),
            "global_argument" => Ok(Scope::GlobalArgument),
            _ => Err(usage_error!(
                "Symbol scope attribute can only be one of ['local', 'global_argument'] but \
                 got '{s}'."
            )),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Local => write!(f, "local"),
            Scope::GlobalArgument => write!(f, "global_argument"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    name: String,
    datatype: DataType,
    /// Extent per dimension, leftmost contiguous; `None` when unknown.
    shape: Vec<Option<usize>>,
    scope: Scope,
    is_input: bool,
    is_output: bool,
}

impl Symbol {
    pub fn new(
        name: &str,
        datatype: DataType,
        shape: Vec<Option<usize>>,
        scope: Scope,
        is_input: bool,
        is_output: bool,
    ) -> Result<Symbol> {
        let mut symbol = Symbol {
            name: name.to_string(),
            datatype,
            shape,
            scope,
            is_input: false,
            is_output: false,
        };
        symbol.set_is_input(is_input)?;
        symbol.set_is_output(is_output)?;
        Ok(symbol)
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn datatype(&self) -> DataType {
        self.datatype
    }
    pub fn shape(&self) -> &[Option<usize>] {
        &self.shape
    }
    pub fn scope(&self) -> Scope {
        self.scope
    }
    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
    }
    pub fn is_input(&self) -> bool {
        self.is_input
    }
    pub fn set_is_input(&mut self, is_input: bool) -> Result<()> {
        if is_input && self.scope == Scope::Local {
            return Err(usage_error!(
                "Symbol with 'local' scope can not have 'is_input' attribute set to True."
            ));
        }
        self.is_input = is_input;
        Ok(())
    }
    pub fn is_output(&self) -> bool {
        self.is_output
    }
    pub fn set_is_output(&mut self, is_output: bool) -> Result<()> {
        if is_output && self.scope == Scope::Local {
            return Err(usage_error!(
                "Symbol with 'local' scope can not have 'is_output' attribute set to True."
            ));
        }
        self.is_output = is_output;
        Ok(())
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let shape: Vec<String> = self
            .shape
            .iter()
            .map(|extent| match extent {
                Some(extent) => extent.to_string(),
                None => ":".to_string(),
            })
            .collect();
        write!(
            f,
            "{}<{}, [{}], {}>",
            self.name,
            self.datatype,
            shape.join(", "),
            self.scope
        )
    }
}

/// Single-scope table of the symbols of a kernel.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    argument_list: Vec<String>,
}

impl SymbolTable {
    pub fn declare(&mut self, symbol: Symbol) -> Result<()> {
        if self.contains(symbol.name()) {
            return Err(usage_error!(
                "Symbol table already contains a symbol with name '{}'.",
                symbol.name()
            ));
        }
        self.symbols.push(symbol);
        Ok(())
    }
    pub fn contains(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s.name == name)
    }
    pub fn lookup(&self, name: &str) -> Result<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| usage_error!("Could not find '{name}' in the Symbol Table."))
    }
    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut Symbol> {
        self.symbols
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| usage_error!("Could not find '{name}' in the Symbol Table."))
    }
    /// Record the order of the kernel arguments.
    ///
    /// Arguments declared without an intent are provisionally local; they
    /// become global arguments that are both read and written.
    pub fn specify_argument_list(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            let symbol = self.lookup_mut(name)?;
            if symbol.scope == Scope::Local {
                symbol.scope = Scope::GlobalArgument;
                symbol.set_is_input(true)?;
                symbol.set_is_output(true)?;
            }
            self.argument_list.push(name.clone());
        }
        Ok(())
    }
    pub fn argument_list(&self) -> Vec<&Symbol> {
        self.argument_list
            .iter()
            .filter_map(|name| self.symbols.iter().find(|s| &s.name == name))
            .collect()
    }
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
    pub fn view(&self) -> String {
        self.to_string()
    }
}

impl Display for SymbolTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Symbol Table:")?;
        for symbol in &self.symbols {
            writeln!(f, "{symbol}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use crate::error::ErrorKind;

    #[test]
    fn test_symbol() {
        let symbol = Symbol::new(
            "a",
            DataType::Real,
            vec![None, Some(10)],
            Scope::GlobalArgument,
            true,
            false,
        )
        .unwrap();
        assert_eq!(symbol.to_string(), "a<real, [:, 10], global_argument>");
        let err = Symbol::new("b", DataType::Integer, vec![], Scope::Local, true, false)
            .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Usage));
        let err = "logical".parse::<DataType>().unwrap_err();
        assert!(err.to_string().starts_with("Not implemented: Symbol can only"));
    }

    #[test]
    fn test_symbol_table() {
        let mut table = SymbolTable::default();
        let local = |name| Symbol::new(name, DataType::Integer, vec![], Scope::Local, false, false);
        table.declare(local("i").unwrap()).unwrap();
        table.declare(local("n").unwrap()).unwrap();
        let err = table.declare(local("i").unwrap()).unwrap_err();
        assert!(err.to_string().contains("already contains a symbol with name 'i'"));
        table.specify_argument_list(&["n".to_string()]).unwrap();
        let n = table.lookup("n").unwrap();
        assert_eq!(n.scope(), Scope::GlobalArgument);
        assert!(n.is_input() && n.is_output());
        assert_eq!(table.argument_list().len(), 1);
        let err = table.lookup("x").unwrap_err();
        assert_eq!(err.to_string(), "Could not find 'x' in the Symbol Table.");
        assert_eq!(
            table.to_string(),
            "Symbol Table:\ni<integer, [], local>\nn<integer, [], global_argument>\n"
        );
    }
}
