//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// promptmill - layered prompt compiler for image generation
#[derive(Parser)]
#[command(
    name = "pm",
    about = "Compile layered prompt documents into image-generation requests",
    version,
    after_help = "Logs are written to stderr; stdout carries only command output."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Seed the engine's random source for reproducible runs
    #[arg(long, global = true, value_name = "N")]
    pub rng_seed: Option<u64>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Validate prompt documents (directories are searched for prompts)
    Validate {
        /// Prompt documents or directories
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Write all findings as JSON to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Show the resolved form of a prompt
    Inspect {
        /// Prompt document
        prompt: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the generated sequence of requests
    Generate {
        /// Prompt document
        prompt: PathBuf,

        /// Stop after this many outputs
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for inspect/generate
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
