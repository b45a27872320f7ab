//! Forcelink MCP server binary.
//!
//! ## Usage
//!
//! ```bash
//! # Credentials from the environment (or a .env file), read-only by default
//! SALESFORCE_CLIENT_ID=... SALESFORCE_USERNAME=... forcelink-mcp
//!
//! # Allow create, update and delete
//! forcelink-mcp --allow-writes
//!
//! # Explicit config file and JSON logs
//! forcelink-mcp --config ./forcelink.toml --log-format json
//! ```
//!
//! Logs go to stderr; stdout carries the MCP protocol.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use forcelink_client::RestConnector;
use forcelink_core::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "forcelink-mcp",
    about = "Salesforce CRM tools over the Model Context Protocol",
    after_help = "Examples:\n  forcelink-mcp\n  forcelink-mcp --allow-writes --log-level debug"
)]
struct Args {
    #[arg(long, help = "Path to a forcelink.toml config file")]
    config: Option<PathBuf>,

    #[arg(long, conflicts_with = "allow_writes", help = "Refuse create, update and delete")]
    read_only: bool,

    #[arg(long, help = "Permit create, update and delete")]
    allow_writes: bool,

    #[arg(long, help = "Salesforce login URL, e.g. https://test.salesforce.com")]
    login_url: Option<String>,

    #[arg(long, help = "Log level (trace|debug|info|warn|error)")]
    log_level: Option<String>,

    #[arg(long, help = "Log format (compact|pretty|json)")]
    log_format: Option<String>,
}

impl Args {
    fn load_options(&self) -> Result<LoadOptions> {
        let read_only_mode = match (self.read_only, self.allow_writes) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        let log_format = self.log_format.as_deref().map(str::parse::<LogFormat>).transpose()?;

        Ok(LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                login_url: self.login_url.clone(),
                read_only_mode,
                api_version: None,
                log_level: self.log_level.clone(),
                log_format,
            },
        })
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load(args.load_options()?)?;
    init_logging(&config);

    info!(
        event_name = "system.mcp.config_loaded",
        login_url = %config.salesforce.login_url,
        api_version = %config.salesforce.api_version,
        read_only_mode = config.salesforce.read_only_mode,
        "configuration loaded"
    );

    let connector = Arc::new(RestConnector::new(&config.salesforce)?);
    let server = forcelink_mcp::build_server(&config, connector)?;
    server.run_stdio().await
}
