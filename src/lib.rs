//! # tiddly-mcp
//!
//! MCP (Model Context Protocol) gateway for a TiddlyWiki-style tiddler store.
//!
//! This crate exposes tiddler operations as tools for AI agents over the
//! streamable HTTP transport. Each client session gets its own transport,
//! tracked by id in a [`SessionRegistry`]; all sessions share one protocol
//! engine and one tool registry.
//!
//! ## Tools
//!
//! `read_tiddler`, `list_tiddlers`, `search_tiddlers`, and (unless the
//! gateway is read-only) `write_tiddler`, `delete_tiddler`.
//!
//! ## Usage
//!
//! The gateway is typically run as an executable and registered with an MCP
//! client as a streamable HTTP server:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "tiddlywiki": { "url": "http://127.0.0.1:3100/mcp" }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! For testing or embedding, build the gateway from its parts:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tiddly_mcp::{Gateway, GatewayConfig, McpEngine, MemoryWiki, ToolRegistry};
//!
//! let wiki = Arc::new(MemoryWiki::new());
//! let config = GatewayConfig::default();
//! let tools = ToolRegistry::new(wiki, config.read_only);
//! let engine = McpEngine::new(Arc::new(tools));
//! let gateway = Gateway::new(config, Arc::new(engine));
//! let app = gateway.router();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod convert;
pub mod engine;
mod error;
pub mod filter;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
pub mod wiki;

pub use config::{ConfigOverrides, GatewayConfig, LogLevel};
pub use engine::{McpEngine, ProtocolEngine, ToolHandlers};
pub use error::{McpError, Result};
pub use protocol::{Content, ToolResult};
pub use server::Gateway;
pub use session::SessionRegistry;
pub use tools::{ToolDef, ToolRegistry};
pub use transport::{StreamableHttpTransport, Transport};
pub use wiki::{FieldValue, MemoryWiki, SearchOptions, Tiddler, Wiki};
