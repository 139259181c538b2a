//! AppState construction shared by `serve` and the one-shot CLI commands.

use std::sync::Arc;

use nhi_domain::config::{Config, ConfigSeverity};
use nhi_providers::{LlmProvider, OpenAiCompatProvider};

use crate::state::{AppState, StdioCollectors};

/// Log config issues, failing on any error-level issue.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

/// The chat provider, or `None` when its API key is not set.
pub fn build_llm(config: &Config) -> Option<Arc<dyn LlmProvider>> {
    match OpenAiCompatProvider::from_config(&config.llm) {
        Ok(provider) => {
            tracing::info!(
                base_url = %config.llm.base_url,
                model = %config.llm.default_model,
                "LLM provider ready"
            );
            Some(Arc::new(provider))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM provider disabled");
            None
        }
    }
}

pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    check_config(&config)?;

    let collectors = Arc::new(StdioCollectors::new(config.mcp.clone()));
    tracing::info!(
        command = %config.mcp.command,
        args = ?config.mcp.args,
        region = %config.aws.region,
        "IAM tool server configured"
    );

    let llm = build_llm(&config);

    Ok(AppState {
        config,
        collectors,
        llm,
    })
}
