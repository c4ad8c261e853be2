//! Sources yielding archived records in stable order with bounded memory.

mod base;
pub mod memory;
pub mod postgres;

pub use base::*;
