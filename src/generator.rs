//! Step Generator
//!
//! The remote service that produces content for a step. The orchestrator treats every
//! rejection uniformly as a failed attempt.

use crate::content::StepContent;
use crate::error::GeneratorError;
use crate::provider::{ChatMessage, CompletionOptions, ModelProviderClient};
use crate::step::{ContentShape, StepDefinition, StepId};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// A single generation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub step: StepDefinition,
    /// First generation ever made for this project
    pub is_initial: bool,
    /// Suppress user-facing error reporting (bulk runs)
    pub silent: bool,
    pub brief: String,
    /// Snapshot of usable project content at the time of the request
    pub context: BTreeMap<StepId, StepContent>,
}

impl GenerationRequest {
    pub fn step_id(&self) -> StepId {
        self.step.id
    }

    /// Content of the step's direct prerequisites, in declared order.
    pub fn prerequisite_content(&self) -> Vec<(StepId, &StepContent)> {
        self.step
            .prerequisites
            .iter()
            .filter_map(|id| self.context.get(id).map(|content| (*id, content)))
            .collect()
    }

    /// Length of the prompt material sent for this request; used for consumption records.
    pub fn prompt_length(&self) -> usize {
        let context_len: usize = self
            .prerequisite_content()
            .iter()
            .map(|(_, content)| content.to_json().to_string().len())
            .sum();
        self.brief.len() + context_len
    }
}

#[async_trait]
pub trait StepGenerator: Send + Sync {
    /// Produce raw content for the requested step.
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GeneratorError>;
}

/// Generator backed by a chat-completion provider.
pub struct ProviderStepGenerator {
    client: Box<dyn ModelProviderClient>,
    options: CompletionOptions,
}

impl ProviderStepGenerator {
    pub fn new(client: Box<dyn ModelProviderClient>, options: CompletionOptions) -> Self {
        Self { client, options }
    }

    pub fn build_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(system_prompt(&request.step)),
            ChatMessage::user(user_prompt(request)),
        ]
    }
}

#[async_trait]
impl StepGenerator for ProviderStepGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GeneratorError> {
        let messages = Self::build_messages(request);
        debug!(
            step = %request.step.id,
            provider = %self.client.provider_name(),
            model = %self.client.model_name(),
            "Requesting step completion"
        );
        let response = self.client.complete(messages, self.options.clone()).await?;
        if response.content.trim().is_empty() {
            return Err(GeneratorError::InvalidOutput(format!(
                "provider returned no content (finish reason: {})",
                response.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        // Shape normalization (and JSON parsing for list/structured steps) happens
        // in the orchestrator.
        Ok(Value::String(response.content))
    }
}

fn step_instruction(key: &str) -> &'static str {
    match key {
        "market-overview" => "Write a concise market overview for the brand: sector, size, dynamics and opportunities.",
        "target-audience" => "Describe the target audience: demographics, motivations, pains and buying behaviour.",
        "market-trends" => "List and explain the market trends most relevant to this brand.",
        "value-proposition" => "State the brand's value proposition and how it differentiates in this market.",
        "competitors" => "Identify the main competitors. Each item: name, positioning, strengths, weaknesses.",
        "references" => "Suggest visual and brand references. Each item: name, why it is relevant, what to borrow.",
        "swot" => "Produce a SWOT analysis with keys strengths, weaknesses, opportunities, threats (arrays of strings).",
        "color-palettes" => "Propose color palettes. Each item: name, hex colors (array), usage notes.",
        "visual-elements" => "Propose visual elements (typography, shapes, iconography). Each item: name, description.",
        "persona" => "Describe the primary persona with keys name, age, occupation, goals, frustrations, quote.",
        "moodboard" => "Describe a moodboard with keys theme, keywords, imagery, textures, palette_reference.",
        "mockup-directions" => "Propose mockup directions. Each item: medium, concept, key visual, copy idea.",
        _ => "Produce the requested branding content.",
    }
}

fn system_prompt(step: &StepDefinition) -> String {
    let format = match step.shape {
        ContentShape::Text => "Answer in plain prose paragraphs. No markdown headings.",
        ContentShape::List => "Answer with a JSON array of objects only, no commentary.",
        ContentShape::Structured => "Answer with a single JSON object only, no commentary.",
    };
    format!(
        "You are a brand strategist preparing the \"{}\" section of a branding dossier. {} {}",
        step.label,
        step_instruction(&step.key),
        format
    )
}

fn user_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!("Project brief:\n{}\n", request.brief.trim());
    let prerequisites = request.prerequisite_content();
    if !prerequisites.is_empty() {
        let context: BTreeMap<String, Value> = prerequisites
            .into_iter()
            .map(|(id, content)| (id.to_string(), content.to_json()))
            .collect();
        prompt.push_str("\nPrevious sections (by step id):\n");
        prompt.push_str(&json!(context).to_string());
        prompt.push('\n');
    }
    prompt
}
