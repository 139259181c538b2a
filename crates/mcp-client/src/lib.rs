//! `nhi-mcp-client`: client for MCP tool servers reached over a child
//! process's stdin/stdout.
//!
//! - [`transport`]: lazy process start, `initialize` handshake, one request
//!   in flight, notification filtering, graceful close.
//! - [`client`]: `tools/list`, `tools/call` (content envelope unwrapping),
//!   `resources/list`, `resources/read`.
//! - [`normalize`]: collapses the result shapes IAM tools return into a list
//!   of records.
//!
//! ```rust,ignore
//! use nhi_mcp_client::McpClient;
//!
//! let mut client = McpClient::from_config(&config.mcp, &config.aws);
//! let raw = client.call_tool("list_users", None).await?;
//! let users = nhi_mcp_client::normalize_collection(&raw, "Users");
//! client.close().await;
//! ```

pub mod client;
pub mod error;
pub mod normalize;
pub mod protocol;
pub mod transport;

pub use client::McpClient;
pub use error::{McpError, TransportError};
pub use normalize::normalize_collection;
pub use protocol::{ClientInfo, ResourceDescriptor, ToolDescriptor};
pub use transport::{McpTransport, ServerCommand, StdioTransport, TransportOptions};
