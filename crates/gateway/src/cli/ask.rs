//! `nhi-agent ask` and `nhi-agent analyze`

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use nhi_analyzer::IdentityAnalyzer;
use nhi_domain::config::Config;
use nhi_domain::identity::CollectionReport;
use nhi_providers::{LlmProvider, OpenAiCompatProvider};

use super::ReportArgs;

/// Read a report written by `collect`.
pub fn load_report(path: &str) -> anyhow::Result<CollectionReport> {
    if !Path::new(path).exists() {
        anyhow::bail!("file {path} not found. Please collect identities first.");
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {path}"))
}

/// Analyzer over the report in `source.file`, backed by the configured
/// chat provider.
pub fn analyzer_for(config: &Config, source: &ReportArgs) -> anyhow::Result<IdentityAnalyzer> {
    eprintln!("Loading identities from {}...", source.file);
    let report = load_report(&source.file)?;

    let provider: Arc<dyn LlmProvider> = Arc::new(
        OpenAiCompatProvider::from_config(&config.llm).context("LLM provider unavailable")?,
    );

    let mut analyzer = IdentityAnalyzer::new()
        .with_provider(provider)
        .with_llm_config(&config.llm);
    analyzer.load_identities(report);
    Ok(analyzer)
}

pub fn print_panel(title: &str, body: &str) {
    println!("── {title} ──");
    println!("{body}");
    println!();
}

pub async fn ask(config: &Config, question: &str, source: ReportArgs) -> anyhow::Result<()> {
    let analyzer = analyzer_for(config, &source)?;
    eprintln!("Analyzing question: {question}");
    let answer = analyzer
        .ask_question(question, source.model.as_deref())
        .await
        .context("answering question")?;
    print_panel("Answer", &answer);
    Ok(())
}

pub async fn analyze(config: &Config, source: ReportArgs) -> anyhow::Result<()> {
    let analyzer = analyzer_for(config, &source)?;
    let model = source.model.as_deref();

    eprintln!("Generating summary...");
    let summary = analyzer
        .summarize_identities(model)
        .await
        .context("generating summary")?;
    print_panel("Identity Summary", &summary);

    eprintln!("Analyzing security concerns...");
    let security = analyzer
        .analyze_security_concerns(model)
        .await
        .context("analyzing security concerns")?;
    print_panel("Security Analysis", &security);
    Ok(())
}
