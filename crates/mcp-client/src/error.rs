use serde_json::Value;

/// Failures of the line-delimited pipe itself. Fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn MCP server `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON from MCP server: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP server closed its output")]
    ProcessExited,

    #[error("MCP server produced too many non-JSON lines on stdout")]
    TooManyNonJsonLines,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("reply id {got} does not match request id {expected}")]
    UnexpectedResponseId { expected: u64, got: Value },

    #[error("transport is closed")]
    Closed,
}

/// Errors surfaced by the transport and the tool invoker.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The `initialize` exchange failed. Fatal to the session.
    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The reply carried an `error` field. Fatal to that request only.
    #[error("MCP protocol error: {0}")]
    Protocol(Value),

    /// The tool ran but flagged its result with `isError`.
    #[error("tool `{tool}` failed: {message}")]
    Tool { tool: String, message: String },
}

impl McpError {
    /// True when the session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, McpError::Handshake(_) | McpError::Transport(_))
    }
}

impl From<McpError> for nhi_domain::Error {
    fn from(e: McpError) -> Self {
        nhi_domain::Error::Provider {
            provider: "mcp".into(),
            message: e.to_string(),
        }
    }
}
