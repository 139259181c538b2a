use std::sync::Arc;

use nhi_collector::{AwsIamClient, IdentityCollector, SdkIamApi};
use nhi_domain::config::{AwsConfig, Config, McpConfig};
use nhi_mcp_client::{McpClient, McpTransport, ServerCommand, StdioTransport, TransportOptions};
use nhi_providers::LlmProvider;

/// A collector over a type-erased transport.
pub type Collector = IdentityCollector<Box<dyn McpTransport>>;

/// Builds a fresh collector, and therefore a fresh server session, for
/// each request.
pub trait CollectorFactory: Send + Sync {
    fn collector(&self, aws: &AwsConfig) -> Collector;
}

/// Spawns the configured MCP server lazily, authenticated as `aws`.
pub struct StdioCollectors {
    mcp: McpConfig,
}

impl StdioCollectors {
    pub fn new(mcp: McpConfig) -> Self {
        Self { mcp }
    }
}

impl CollectorFactory for StdioCollectors {
    fn collector(&self, aws: &AwsConfig) -> Collector {
        let transport: Box<dyn McpTransport> = Box::new(StdioTransport::spawn_lazy(
            ServerCommand::from_config(&self.mcp, aws),
            TransportOptions::from_config(&self.mcp),
        ));
        IdentityCollector::new(AwsIamClient::new(
            McpClient::new(transport),
            Box::new(SdkIamApi::new(aws.clone())),
        ))
    }
}

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub collectors: Arc<dyn CollectorFactory>,
    /// `None` when no API key is configured.
    pub llm: Option<Arc<dyn LlmProvider>>,
}
