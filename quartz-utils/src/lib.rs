//! Shared utilities for the Quartz compiler.
mod errors;
mod id;
mod idx;
mod position;

pub use errors::{Error, MultiError, QuartzResult};
pub use id::{GSym, GetName, Id};
pub use idx::{IndexRef, IndexedMap};
pub use position::{FileIdx, GPosIdx, GlobalPositionTable, WithPos};
