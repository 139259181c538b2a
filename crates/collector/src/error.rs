use nhi_mcp_client::McpError;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// A direct IAM SDK call failed.
    #[error("IAM {operation} failed: {message}")]
    Direct {
        operation: &'static str,
        message: String,
    },
}

impl From<CollectorError> for nhi_domain::Error {
    fn from(e: CollectorError) -> Self {
        nhi_domain::Error::Provider {
            provider: "aws".into(),
            message: e.to_string(),
        }
    }
}
