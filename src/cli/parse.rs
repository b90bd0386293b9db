//! CLI parse: clap types for brandstage. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// brandstage - staged branding content generation
#[derive(Parser)]
#[command(name = "brandstage")]
#[command(about = "Generate branding dossiers step by step, prerequisites first")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the registered steps and their prerequisites
    Steps {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Show the generation state of every step in a project
    Status {
        #[arg(long)]
        project: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Generate one step (by id or key)
    Generate {
        #[arg(long)]
        project: String,
        step: String,
        /// Fail instead of generating missing prerequisites
        #[arg(long)]
        no_resolve: bool,
        /// Generate missing prerequisites without asking
        #[arg(long)]
        yes: bool,
    },
    /// Generate every step that has no content yet
    GenerateAll {
        #[arg(long)]
        project: String,
    },
    /// Print the content of one step
    Show {
        #[arg(long)]
        project: String,
        step: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show (or top up) the local credit balance
    Credits {
        /// Credits to add to the configured account
        #[arg(long)]
        grant: Option<u64>,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project from a name and a brief
    Create {
        #[arg(long)]
        name: String,
        /// Project description used as context for every step
        #[arg(long)]
        brief: String,
        /// Project id (defaults to a slug of the name)
        #[arg(long)]
        id: Option<String>,
    },
    /// List stored projects
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Delete a project and its content
    Delete {
        #[arg(long)]
        project: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the effective configuration
    Validate,
}
