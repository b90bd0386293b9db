//! CLI command-name contract for logging.

use crate::cli::parse::{Commands, ConfigCommands, ProjectCommands};

/// Command name string for log fields (e.g. "project.create", "generate").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Steps { .. } => "steps".to_string(),
        Commands::Project { command } => format!("project.{}", project_command_name(command)),
        Commands::Status { .. } => "status".to_string(),
        Commands::Generate { .. } => "generate".to_string(),
        Commands::GenerateAll { .. } => "generate_all".to_string(),
        Commands::Show { .. } => "show".to_string(),
        Commands::Credits { .. } => "credits".to_string(),
        Commands::Config { command } => format!("config.{}", config_command_name(command)),
    }
}

pub fn project_command_name(command: &ProjectCommands) -> &'static str {
    match command {
        ProjectCommands::Create { .. } => "create",
        ProjectCommands::List { .. } => "list",
        ProjectCommands::Delete { .. } => "delete",
    }
}

pub fn config_command_name(command: &ConfigCommands) -> &'static str {
    match command {
        ConfigCommands::Show => "show",
        ConfigCommands::Validate => "validate",
    }
}
