//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod gate;
mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use gate::TerminalGate;
pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands, ProjectCommands};
pub use presentation::{
    format_bulk_summary, format_notices, format_project_created, format_project_list,
    format_section_heading, format_status, format_step_content, format_step_outcome,
    format_steps, StepStatusRow,
};
pub use route::RunContext;
