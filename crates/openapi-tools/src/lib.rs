//! OpenAPI -> MCP tooling for the Cekura MCP server.
//!
//! - [`spec`] loads an `OpenAPI` 3.0 document into an ordered operation list.
//! - [`whitelist`] models the set of documented operations allowed to become tools.
//! - [`extractor`] regenerates that whitelist from the documentation sources.
//! - [`projector`] intersects the two and produces tool descriptors.
//! - [`dispatch`] turns one tool call into one upstream HTTP request.
//!
//! It contains no MCP transport or session logic; the server crate owns those.

pub mod dispatch;
pub mod error;
pub mod extractor;
pub mod naming;
pub mod projector;
pub mod resolver;
pub mod schema;
pub mod spec;
pub mod whitelist;

pub use error::{OpenApiToolsError, Result};
