//! Generation of unique Fortran identifiers.

use crate::error::usage_error;
use anyhow::Result;
use std::collections::HashMap;

/// Name used when no root name is supplied.
pub const DEFAULT_ROOT_NAME: &str = "anon";

/// Registry of the names that have been handed out within one invoke.
///
/// Names are case insensitive (as in Fortran) and are stored in lower case. A name can be generated for a `(context, label)` pair in
/// which case asking for the same pair again returns the same name.
#[derive(Debug, Default)]
pub struct NameSpace {
    added_names: Vec<String>,
    reserved_names: Vec<String>,
    context: HashMap<(String, String), String>,
}

impl NameSpace {
    pub fn new() -> Self {
        Self::default()
    }
    fn normalise(&self, name: &str) -> String {
        name.to_lowercase()
    }
    fn is_taken(&self, name: &str) -> bool {
        self.added_names.iter().any(|n| n == name) || self.reserved_names.iter().any(|n| n == name)
    }
    /// Return a name based on `root_name` that has not been returned before.
    pub fn create_name(&mut self, root_name: &str) -> String {
        let root_name = if root_name.is_empty() {
            DEFAULT_ROOT_NAME
        } else {
            root_name
        };
        let lname = self.normalise(root_name);
        let mut candidate = lname.clone();
        let mut count = 1;
        while self.is_taken(&candidate) {
            candidate = format!("{lname}_{count}");
            count += 1;
        }
        self.added_names.push(candidate.clone());
        candidate
    }
    /// Like [NameSpace::create_name] but returns the previously created name
    /// when the same `(context, label)` pair was seen before.
    pub fn create_name_in(&mut self, root_name: &str, context: &str, label: &str) -> String {
        let key = (self.normalise(context), self.normalise(label.trim()));
        if let Some(name) = self.context.get(&key) {
            return name.clone();
        }
        let name = self.create_name(root_name);
        self.context.insert(key, name.clone());
        name
    }
    /// Exclude `name` from generation.
    ///
    /// Reserving a name twice is fine but reserving a name that was already
    /// generated is not.
    pub fn add_reserved_name(&mut self, name: &str) -> Result<()> {
        let lname = self.normalise(name);
        if self.reserved_names.contains(&lname) {
            return Ok(());
        }
        if self.added_names.contains(&lname) {
            return Err(usage_error!(
                "attempted to add a reserved name '{lname}' to the namespace but \
                 this name has already been generated"
            ));
        }
        self.reserved_names.push(lname);
        Ok(())
    }
    pub fn contains(&self, name: &str) -> bool {
        self.is_taken(&self.normalise(name))
    }
}
