pub mod ask;
pub mod collect;
pub mod config;
pub mod interactive;

use clap::{Args, Parser, Subcommand};

/// NHI Agent: AWS IAM identity inventory and analysis.
#[derive(Debug, Parser)]
#[command(name = "nhi-agent", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP API (default when no subcommand is given).
    Serve,
    /// Collect identities from AWS and write them to a JSON file.
    Collect(CollectArgs),
    /// Ask a question about collected identities.
    Ask {
        /// The question to ask.
        question: String,
        #[command(flatten)]
        source: ReportArgs,
    },
    /// Summarize collected identities and report security concerns.
    Analyze {
        #[command(flatten)]
        source: ReportArgs,
    },
    /// Interactive question/answer session.
    Interactive {
        #[command(flatten)]
        source: ReportArgs,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Args)]
pub struct CollectArgs {
    /// AWS profile name (overrides config and AWS_PROFILE).
    #[arg(long)]
    pub aws_profile: Option<String>,
    /// AWS region (overrides config and AWS_REGION).
    #[arg(long)]
    pub aws_region: Option<String>,
    /// Collect only this user, through the least-privilege path.
    #[arg(long)]
    pub user: Option<String>,
    /// Output file for the identities JSON.
    #[arg(short, long, default_value = "identities.json")]
    pub output: String,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Identities JSON file written by `collect`.
    #[arg(short, long = "file", default_value = "identities.json")]
    pub file: String,
    /// Model override (defaults to `llm.default_model`).
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load `.env`, then the config from `NHI_CONFIG` (or `nhi.toml`), then
/// overlay the process environment. A missing file means all defaults.
pub fn load_config() -> anyhow::Result<(nhi_domain::config::Config, String)> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("NHI_CONFIG").unwrap_or_else(|_| "nhi.toml".into());
    let mut config = read_config(&config_path)?;
    config.apply_process_env();

    Ok((config, config_path))
}

fn read_config(path: &str) -> anyhow::Result<nhi_domain::config::Config> {
    if !std::path::Path::new(path).exists() {
        return Ok(nhi_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
}
