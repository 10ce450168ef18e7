//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::{BASE_URL_ENV, Config, MODEL_ENV};

/// PlanForge - staged LLM planning pipeline
#[derive(Parser)]
#[command(
    name = "pf",
    about = "Turn a one-line intent into architecture, schema, API design and an execution plan",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the stream relay in front of the model endpoint
    Serve {
        /// Address to listen on (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Drive every stage for an intent against a running relay
    Run {
        /// What you want to build
        intent: String,

        /// YAML or JSON list of answers, matched to questions by position
        #[arg(short, long, value_name = "FILE")]
        answers: Option<PathBuf>,

        /// Write the final plan as JSON
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Relay base URL (overrides config)
        #[arg(short, long)]
        relay: Option<String>,
    },

    /// Pull structured data out of a saved model answer
    Extract {
        /// Split out the mermaid diagram instead of extracting JSON
        #[arg(short, long)]
        diagram: bool,

        /// File holding the model's text
        file: PathBuf,
    },

    /// Check that a relay is up
    Health {
        /// Relay base URL (overrides config)
        #[arg(short, long)]
        relay: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for reporting commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

/// Where the `run` command writes its log
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planforge")
        .join("logs")
        .join("planforge.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// The after_help text: config search order, environment and log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Config files (first found wins):\n");
    for path in Config::candidates() {
        let icon = if path.exists() { "\u{2705}" } else { "  " };
        help.push_str(&format!("  {} {}\n", icon, path.display()));
    }

    help.push('\n');
    help.push_str("Environment:\n");
    for var in [BASE_URL_ENV, MODEL_ENV] {
        let value = std::env::var(var).unwrap_or_else(|_| "(unset)".to_string());
        help.push_str(&format!("  {:<14} {}\n", var, value));
    }

    help.push('\n');
    help.push_str(&format!("Logs: {}\n", get_log_path().display()));
    help
}
