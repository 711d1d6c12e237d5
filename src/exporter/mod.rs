//! Multi-source scrape registry and its HTTP server.
//!
//! Each bound path owns one [`crate::collector::DefinitionSet`]; a request
//! to that path runs exactly one pass and returns the drained metrics in the
//! text exposition format.

mod registry;
mod server;

pub use registry::SourceRegistry;
pub use server::{router, ExporterServer, ExporterServerConfig, ServerError};
