use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the weblog binary.
#[derive(Debug, Parser)]
#[command(name = "weblog", version, about = "Weblog tracking and summary server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "WEBLOG_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// PostHog project API key used for pixel events.
    #[arg(
        long = "analytics-api-key",
        env = "POSTHOG_API_KEY",
        value_name = "KEY",
        global = true,
        hide_env_values = true
    )]
    pub analytics_api_key: Option<String>,

    /// AI gateway key used for post summaries.
    #[arg(
        long = "summary-api-key",
        env = "AI_GATEWAY_API_KEY",
        value_name = "KEY",
        global = true,
        hide_env_values = true
    )]
    pub summary_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the PostHog ingestion host.
    #[arg(long = "analytics-host", value_name = "URL")]
    pub analytics_host: Option<String>,

    /// Override the per-call analytics timeout.
    #[arg(long = "analytics-timeout-ms", value_name = "MILLIS")]
    pub analytics_timeout_ms: Option<u64>,

    /// Override the AI gateway base URL.
    #[arg(long = "summary-gateway-url", value_name = "URL")]
    pub summary_gateway_url: Option<String>,

    /// Override the summary request timeout.
    #[arg(long = "summary-timeout-seconds", value_name = "SECONDS")]
    pub summary_timeout_seconds: Option<u64>,
}
