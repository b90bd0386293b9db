//! Project command presentation: create and list.

use super::shared::to_json;
use crate::content::ProjectState;
use crate::error::ApiError;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;

pub fn format_project_created(project: &ProjectState) -> String {
    format!(
        "Created project '{}' ({})\nNext: brandstage generate --project {} 1",
        project.name, project.project_id, project.project_id
    )
}

pub fn format_project_list(
    projects: &[ProjectState],
    total_steps: usize,
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        let list: Vec<_> = projects
            .iter()
            .map(|project| {
                json!({
                    "id": project.project_id,
                    "name": project.name,
                    "satisfied": project.content.satisfied_steps().len(),
                    "total": total_steps,
                    "updated_at": project.updated_at,
                })
            })
            .collect();
        return to_json(&json!({ "projects": list, "total": projects.len() }));
    }

    if projects.is_empty() {
        return Ok(
            "No projects found.\n\nUse 'brandstage project create --name <name> --brief <brief>' to add one."
                .to_string(),
        );
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Name", "Progress", "Updated"]);
    for project in projects {
        table.add_row(vec![
            project.project_id.clone(),
            project.name.clone(),
            format!("{}/{}", project.content.satisfied_steps().len(), total_steps),
            project.updated_at.clone(),
        ]);
    }
    Ok(format!("{}\n\nTotal: {} project(s)", table, projects.len()))
}
