//! Sinks receiving transformed documents.

pub mod archive;
mod base;
pub mod elasticsearch;
pub mod memory;

pub use base::*;
