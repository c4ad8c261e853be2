//! Records read from the source and the documents produced for each sink.

mod document;
mod record;
mod table_name;
mod watermark;

pub use document::*;
pub use record::*;
pub use table_name::*;
pub use watermark::*;
