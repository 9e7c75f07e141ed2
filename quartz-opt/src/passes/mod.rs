//! Passes over the design tree.
pub mod const_fold;
mod unroll_loops;

pub use const_fold::ConstFold;
pub use unroll_loops::UnrollLoops;
