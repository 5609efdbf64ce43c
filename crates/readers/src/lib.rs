//! Format readers for restable
//!
//! A reader turns a byte stream into a lazy sequence of typed records for one
//! resource schema. Readers are selected by format name through a
//! [`ReaderHolder`]:
//! - `json`: a JSON array of objects ([`JsonReader`])
//! - `sheet`: tab-separated tabular text addressed by marker rows ([`SheetReader`])

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::io::Read;

use restable_core::{Record, Result};
use restable_index::ResourceSchema;

pub mod holder;
pub mod json;
pub mod sheet;

pub use holder::ReaderHolder;
pub use json::JsonReader;
pub use sheet::SheetReader;

/// Lazily decoded records; the first `Err` ends the stream
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Decodes one backing format
pub trait ResourceReader: Send + Sync {
    /// Format name this reader is registered under
    fn format(&self) -> &str;

    /// Decode `input` into records of `schema`'s resource type
    ///
    /// Structural problems detected up front (unreadable input, wrong top
    /// level) are returned directly; per-record problems surface as `Err`
    /// items of the stream.
    fn read(&self, input: Box<dyn Read + Send>, schema: &ResourceSchema) -> Result<RecordStream>;
}
