//! Search index sink speaking the Elasticsearch `_bulk` API.

mod client;
mod core;
mod encoding;

pub use client::*;
pub use core::*;
pub use encoding::*;
