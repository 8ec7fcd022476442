use crate::error::internal_error;
use crate::ir::Argument;
use anyhow::Result;

/// Tracks whether the memory accessed by one argument is covered by the
/// accesses of other arguments.
///
/// Accesses from a halo exchange on a vector field only touch one vector
/// component, so coverage of a full vector access is only reached once every
/// component has been seen.
#[derive(Clone, Debug)]
pub struct DataAccess {
    arg: Argument,
    covered: bool,
    vector_index_access: Vec<Option<usize>>,
}

impl DataAccess {
    pub fn new(arg: &Argument) -> Self {
        DataAccess {
            arg: arg.clone(),
            covered: false,
            vector_index_access: vec![],
        }
    }
    pub fn argument(&self) -> &Argument {
        &self.arg
    }
    pub fn covered(&self) -> bool {
        self.covered
    }
    pub fn reset_coverage(&mut self) {
        self.covered = false;
        self.vector_index_access.clear();
    }
    /// Whether the accesses of `arg` share at least one memory location with
    /// the accesses of the tracked argument.
    pub fn overlaps(&self, arg: &Argument) -> Result<bool> {
        if self.arg.name() != arg.name() {
            return Ok(false);
        }
        let both_halo = self.arg.in_halo_exchange() && arg.in_halo_exchange();
        if both_halo && (self.arg.vector_size() > 1 || arg.vector_size() > 1) {
            if self.arg.vector_size() != arg.vector_size() {
                return Err(internal_error!(
                    "DataAccess.overlaps(): vector sizes differ for field '{}' in two halo \
                     exchange calls. Found '{}' and '{}'",
                    arg.name(),
                    self.arg.vector_size(),
                    arg.vector_size()
                ));
            }
            if self.arg.halo_vector_index() != arg.halo_vector_index() {
                return Ok(false);
            }
        }
        Ok(true)
    }
    /// Record the accesses of `arg` and mark the tracked argument as covered
    /// once all of its accesses have been seen.
    pub fn update_coverage(&mut self, arg: &Argument) -> Result<()> {
        if !self.overlaps(arg)? {
            return Ok(());
        }
        if arg.in_halo_exchange() && self.arg.vector_size() > 1 {
            if self.arg.in_halo_exchange() {
                return Err(internal_error!(
                    "DataAccess::update_coverage() The halo exchange vector indices for \
                     '{}' are the same. This should never happen",
                    self.arg.name()
                ));
            }
            let index = arg.halo_vector_index();
            if self.vector_index_access.contains(&index) {
                return Err(internal_error!(
                    "DataAccess::update_coverage() Found more than one dependent halo \
                     exchange with the same vector index"
                ));
            }
            self.vector_index_access.push(index);
            if self.vector_index_access.len() != self.arg.vector_size() {
                return Ok(());
            }
        }
        self.covered = true;
        Ok(())
    }
}
