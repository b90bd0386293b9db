//! Generation presentation: single-step outcomes, bulk summaries, step content.

use super::shared::{join_ids, to_json};
use crate::content::StepContent;
use crate::error::ApiError;
use crate::orchestrator::{BulkSummary, StepOutcome};
use crate::progress::{NoticeLevel, ProgressEvent};
use crate::step::{StepDefinition, StepRegistry};
use owo_colors::OwoColorize;
use serde_json::Value;

pub fn format_step_outcome(outcome: &StepOutcome, registry: &StepRegistry) -> String {
    match outcome {
        StepOutcome::AlreadyInFlight { step } => format!(
            "Step {} ({}) is already being generated; nothing to do.",
            step,
            registry.label(*step)
        ),
        StepOutcome::Generated(generated) => {
            let mut out = String::new();
            for dependency in &generated.dependencies {
                out.push_str(&format!(
                    "{} {} {}\n",
                    "+".green(),
                    dependency,
                    registry.label(*dependency)
                ));
            }
            out.push_str(&format!(
                "{} {} {} ({} credit(s))",
                "+".green(),
                generated.step,
                registry.label(generated.step),
                generated.credits
            ));
            if let Some(err) = generated.consumption_error() {
                out.push_str(&format!("\n{} {}", "warning:".yellow(), err));
            }
            out
        }
    }
}

pub fn format_bulk_summary(summary: &BulkSummary, registry: &StepRegistry) -> String {
    let mut out = String::new();
    let headline = summary.message();
    if summary.is_complete() {
        out.push_str(&headline.green().to_string());
    } else {
        out.push_str(&headline.yellow().to_string());
    }
    if !summary.already_satisfied.is_empty() {
        out.push_str(&format!(
            "\nAlready had content: {}",
            join_ids(&summary.already_satisfied)
        ));
    }
    if !summary.satisfied_elsewhere.is_empty() {
        out.push_str(&format!(
            "\nFilled by another request: {}",
            join_ids(&summary.satisfied_elsewhere)
        ));
    }
    for failure in &summary.failed {
        out.push_str(&format!(
            "\n{} {} {}: {}",
            "failed".red(),
            failure.step,
            registry.label(failure.step),
            failure.message
        ));
    }
    for step in &summary.blocked {
        out.push_str(&format!(
            "\n{} {} {} (a prerequisite did not generate)",
            "blocked".yellow(),
            step,
            registry.label(*step)
        ));
    }
    for step in &summary.in_flight {
        out.push_str(&format!(
            "\n{} {} {} (already being generated)",
            "skipped".dimmed(),
            step,
            registry.label(*step)
        ));
    }
    for err in &summary.consumption_errors {
        out.push_str(&format!("\n{} {}", "warning:".yellow(), err));
    }
    if summary.has_problems() {
        out.push_str(&format!(
            "\n{} some steps were not generated; run generate-all again to retry",
            "warning:".yellow()
        ));
    }
    out
}

pub fn format_step_content(
    step: &StepDefinition,
    content: Option<&StepContent>,
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(&serde_json::json!({
            "step": step.id,
            "key": step.key,
            "content": content,
        }));
    }
    let Some(content) = content else {
        return Ok(format!("Step {} ({}) has no content yet.", step.id, step.label));
    };
    let body = match content {
        StepContent::Text(text) => text.clone(),
        StepContent::List(items) => to_json(&Value::Array(items.clone()))?,
        StepContent::Structured(map) => to_json(&Value::Object(map.clone()))?,
    };
    Ok(format!("{}\n\n{}", step.label.bold(), body))
}

/// Warning and info notices collected while a command ran; errors are returned separately.
pub fn format_notices(events: &[ProgressEvent]) -> Option<String> {
    let lines: Vec<String> = events
        .iter()
        .filter(|event| event.is_notice())
        .filter_map(|event| {
            let level: NoticeLevel = serde_json::from_value(event.data["level"].clone()).ok()?;
            let message = event.data["message"].as_str()?;
            match level {
                NoticeLevel::Warning => Some(format!("{} {}", "warning:".yellow(), message)),
                NoticeLevel::Info => Some(message.to_string()),
                NoticeLevel::Error => None,
            }
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
