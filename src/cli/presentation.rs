//! CLI presentation: text and json formatters per command family.

mod generation;
mod project;
mod shared;
mod steps;

pub use generation::{
    format_bulk_summary, format_notices, format_step_content, format_step_outcome,
};
pub use project::{format_project_created, format_project_list};
pub use shared::format_section_heading;
pub use steps::{format_status, format_steps, StepStatusRow};
