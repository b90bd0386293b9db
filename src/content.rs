//! Content Store
//!
//! Generated content per step and the project state that owns it. The three-way
//! emptiness rule in [`StepContent::is_usable`] is the only signal used to decide
//! whether a step still needs generation.

use crate::step::{ContentShape, StepId};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Content produced for a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepContent {
    Text(String),
    List(Vec<Value>),
    Structured(Map<String, Value>),
}

impl StepContent {
    /// Non-empty trimmed string, non-empty list, or a record with at least one key.
    pub fn is_usable(&self) -> bool {
        match self {
            StepContent::Text(text) => !text.trim().is_empty(),
            StepContent::List(items) => !items.is_empty(),
            StepContent::Structured(record) => !record.is_empty(),
        }
    }

    pub fn shape(&self) -> ContentShape {
        match self {
            StepContent::Text(_) => ContentShape::Text,
            StepContent::List(_) => ContentShape::List,
            StepContent::Structured(_) => ContentShape::Structured,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            StepContent::Text(text) => Value::String(text.clone()),
            StepContent::List(items) => Value::Array(items.clone()),
            StepContent::Structured(record) => Value::Object(record.clone()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("Expected {expected} content, got {actual}")]
    ShapeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Content is not valid JSON for a {expected} step: {message}")]
    InvalidJson {
        expected: &'static str,
        message: String,
    },
}

/// Per-project mapping from step to content. `set` is an unconditional overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentStore {
    entries: BTreeMap<StepId, StepContent>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step: StepId) -> Option<&StepContent> {
        self.entries.get(&step)
    }

    pub fn has_content(&self, step: StepId) -> bool {
        self.entries
            .get(&step)
            .map(StepContent::is_usable)
            .unwrap_or(false)
    }

    pub fn set(&mut self, step: StepId, content: StepContent) {
        self.entries.insert(step, content);
    }

    /// Steps holding usable content, ascending.
    pub fn satisfied_steps(&self) -> Vec<StepId> {
        self.entries
            .iter()
            .filter(|(_, content)| content.is_usable())
            .map(|(id, _)| *id)
            .collect()
    }

    /// True when no step holds usable content.
    pub fn is_empty(&self) -> bool {
        !self.entries.values().any(StepContent::is_usable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, &StepContent)> {
        self.entries.iter()
    }
}

/// Everything the orchestrating session owns for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_id: String,
    pub name: String,
    /// The user's prompt; context for every generation
    pub brief: String,
    #[serde(default)]
    pub content: ContentStore,
    pub updated_at: String,
}

impl ProjectState {
    pub fn new(project_id: impl Into<String>, name: impl Into<String>, brief: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            brief: brief.into(),
            content: ContentStore::new(),
            updated_at: now_rfc3339(),
        }
    }

    pub fn set_content(&mut self, step: StepId, content: StepContent) {
        self.content.set(step, content);
        self.updated_at = now_rfc3339();
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize raw generator output into the shape a step declares.
pub fn normalize(shape: ContentShape, raw: Value) -> Result<StepContent, ContentError> {
    match shape {
        ContentShape::Text => normalize_text(raw),
        ContentShape::List => normalize_list(raw),
        ContentShape::Structured => normalize_structured(raw),
    }
}

fn normalize_text(raw: Value) -> Result<StepContent, ContentError> {
    let text = match raw {
        Value::String(text) => text,
        Value::Array(items) => {
            let mut lines = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(line) => lines.push(line),
                    other => {
                        return Err(ContentError::ShapeMismatch {
                            expected: "text",
                            actual: json_kind(&other),
                        })
                    }
                }
            }
            lines.join("\n")
        }
        other => {
            return Err(ContentError::ShapeMismatch {
                expected: "text",
                actual: json_kind(&other),
            })
        }
    };
    Ok(StepContent::Text(normalize_newlines(&text)))
}

fn normalize_list(raw: Value) -> Result<StepContent, ContentError> {
    match raw {
        Value::Array(items) => Ok(StepContent::List(items)),
        Value::Object(record) => Ok(StepContent::List(vec![Value::Object(record)])),
        Value::String(text) => match parse_embedded_json(&text, "list")? {
            Value::Array(items) => Ok(StepContent::List(items)),
            Value::Object(record) => Ok(StepContent::List(vec![Value::Object(record)])),
            other => Err(ContentError::ShapeMismatch {
                expected: "list",
                actual: json_kind(&other),
            }),
        },
        other => Err(ContentError::ShapeMismatch {
            expected: "list",
            actual: json_kind(&other),
        }),
    }
}

fn normalize_structured(raw: Value) -> Result<StepContent, ContentError> {
    match raw {
        Value::Object(record) => Ok(StepContent::Structured(record)),
        Value::String(text) => match parse_embedded_json(&text, "structured")? {
            Value::Object(record) => Ok(StepContent::Structured(record)),
            other => Err(ContentError::ShapeMismatch {
                expected: "structured",
                actual: json_kind(&other),
            }),
        },
        other => Err(ContentError::ShapeMismatch {
            expected: "structured",
            actual: json_kind(&other),
        }),
    }
}

/// Line endings unified, escaped newlines expanded, trailing spaces and blank runs collapsed.
pub fn normalize_newlines(text: &str) -> String {
    let unified = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("\\n", "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.split('\n') {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Parse JSON that may be wrapped in a markdown code fence.
fn parse_embedded_json(text: &str, expected: &'static str) -> Result<Value, ContentError> {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    };
    serde_json::from_str(body).map_err(|e| ContentError::InvalidJson {
        expected,
        message: e.to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
