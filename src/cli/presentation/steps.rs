//! Step registry and project status presentation.

use super::shared::{format_section_heading, join_ids, to_json};
use crate::error::ApiError;
use crate::orchestrator::GenerationState;
use crate::step::{StepDefinition, StepId, StepRegistry};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

/// One line of `status` output.
#[derive(Debug, Clone)]
pub struct StepStatusRow {
    pub step: StepDefinition,
    pub state: GenerationState,
    /// Direct prerequisites without content
    pub missing: Vec<StepId>,
}

pub fn format_steps(registry: &StepRegistry, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        let steps: Vec<_> = registry.iter().collect();
        return to_json(&json!({ "steps": steps, "total": registry.len() }));
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Key", "Label", "Shape", "Prerequisites"]);
    for step in registry.iter() {
        table.add_row(vec![
            step.id.to_string(),
            step.key.clone(),
            step.label.clone(),
            step.shape.as_str().to_string(),
            join_ids(&step.prerequisites),
        ]);
    }
    Ok(format!("{}\n\n{}", format_section_heading("Steps"), table))
}

pub fn format_status(
    project_id: &str,
    rows: &[StepStatusRow],
    format: &str,
) -> Result<String, ApiError> {
    let satisfied = rows
        .iter()
        .filter(|row| row.state == GenerationState::Satisfied)
        .count();
    if format == "json" {
        let steps: Vec<_> = rows
            .iter()
            .map(|row| {
                json!({
                    "id": row.step.id,
                    "key": row.step.key,
                    "label": row.step.label,
                    "state": row.state,
                    "missing": row.missing,
                })
            })
            .collect();
        return to_json(&json!({
            "project": project_id,
            "steps": steps,
            "satisfied": satisfied,
            "total": rows.len(),
        }));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Label", "State", "Waiting on"]);
    for row in rows {
        let waiting = if row.state == GenerationState::Satisfied {
            String::new()
        } else {
            join_ids(&row.missing)
        };
        table.add_row(vec![
            row.step.id.to_string(),
            row.step.label.clone(),
            row.state.as_str().to_string(),
            waiting,
        ]);
    }

    let progress = format!("{} of {} steps have content", satisfied, rows.len());
    let progress = if satisfied == rows.len() {
        progress.green().to_string()
    } else {
        progress.yellow().to_string()
    };
    Ok(format!(
        "{}\n\n{}\n\n{}",
        format_section_heading(&format!("Project {}", project_id)),
        table,
        progress
    ))
}
