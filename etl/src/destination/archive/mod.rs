//! Cold storage sink writing zstd compressed newline delimited JSON.

mod core;
mod writer;

pub use core::*;
pub use writer::*;
