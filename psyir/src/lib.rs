//! psyir is the core of a PSy-layer code generator.
//!
//! Scientists write their model as kernels that operate on a single column
//! (or a single degree of freedom) and an algorithm layer that calls those
//! kernels via `invoke`. The glue in between, the Parallel System (PSy)
//! layer, is generated. This crate holds that layer as a tree:
//!
//! - An [Invoke] is built from the calls of one `invoke` and holds a
//!   schedule of loops, kernel calls, halo exchanges and global sums.
//! - Each argument knows its access mode, so the tree can answer which node
//!   depends on which (see [ir::GuardedNode::backward_dependence]).
//! - A [Transformation] restructures the tree (fuse loops, add OpenMP or
//!   OpenACC directives, move nodes, ...) but only after checking that the
//!   restructuring keeps these dependencies intact.
//! - Finally, [gen_psy_module] lowers the tree into a Fortran builder tree.
//!
//! Kernels whose source is changed by a transformation are written to the
//! kernel output directory under a new, unique name, see
//! [ir::Kern::rename_and_write].
//!
//! Kernel source itself can be lowered into an expression IR with a symbol
//! table, see [lower::kernel_schedule].

pub mod config;
pub mod error;
pub mod frontend;
mod invoke;
pub mod ir;
pub mod lower;
pub mod namespace;
pub mod shared;
pub mod targ3t;
#[cfg(feature = "test-utils")]
pub mod tester;
pub mod transform;

pub use config::Config;
pub use config::ConfigArgs;
pub use config::KernelNaming;
pub use error::error_kind;
pub use error::ErrorKind;
pub use error::PsyError;
pub use invoke::gen_psy_module;
pub use invoke::CallSite;
pub use invoke::Invoke;
pub use transform::Memento;
pub use transform::TransArgs;
pub use transform::TransInfo;
pub use transform::Transformation;

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;

/// Initialize the global tracing subscriber.
///
/// Fails when a subscriber was already set.
pub fn init_subscriber(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_test_writer()
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
