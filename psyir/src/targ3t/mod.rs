//! Target-side trees that code generation appends to.
//!
//! The core never produces text directly; it adds fragments to a builder tree
//! owned by the caller. Printing that tree is the emitter's business, the
//! [Display] implementations here are a plain rendering for inspection.

pub mod fortran;
