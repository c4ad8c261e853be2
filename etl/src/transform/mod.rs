//! Per-record validation and reshaping into sink documents.

mod archive;
mod base;
mod index;

pub use archive::*;
pub use base::*;
pub use index::*;
