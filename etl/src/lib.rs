//! Batch export of archived Postgres rows into cold storage archives and search indexes.
//!
//! An export run reads the configured tables through a [`source::RowSource`], reshapes every
//! [`types::Record`] with a [`transform::Transformer`] and hands the resulting documents to a
//! [`destination::Destination`]. [`pipeline::Pipeline`] drives the run and reports the latest
//! `archived_on` it saw, which callers persist as the [`types::Watermark`] of the next run.
//!
//! Two sinks are provided:
//!
//! - [`destination::archive::ArchiveDestination`] writes one zstd compressed newline delimited
//!   JSON file.
//! - [`destination::elasticsearch::BulkIndexer`] indexes documents through the `_bulk` API.

pub mod destination;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod source;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod transform;
pub mod types;
