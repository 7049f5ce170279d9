//! Work package module
//!
//! Work packages are the unit of work distribution. Each package holds one
//! chunk of the input record store.

mod chunker;
mod types;

pub use chunker::{chunk_count_for, Chunker};
pub use types::{Record, WorkPackage, DEFAULT_MAX_PACKAGE_BYTES};
