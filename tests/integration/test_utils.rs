//! Shared test doubles and setup for integration tests
//!
//! Scripted generator, recording gate and persistence, and an admission controller whose
//! consumption recording can be made to fail.

use async_trait::async_trait;
use brandstage::admission::{AdmissionController, ConsumptionRecord, CreditLedger};
use brandstage::confirmation::{Confirmation, ConfirmationGate, ConfirmationPrompt};
use brandstage::content::{ProjectState, StepContent};
use brandstage::error::{AdmissionDenial, ConsumptionError, GeneratorError, StorageError};
use brandstage::generator::{GenerationRequest, StepGenerator};
use brandstage::orchestrator::{GenerationOrchestrator, OrchestratorSettings};
use brandstage::persistence::ProjectPersistence;
use brandstage::progress::{ProgressBus, ProgressEvent};
use brandstage::step::{ContentShape, StepId, StepRegistry};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// Config loading reads process-wide environment variables.
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Sets environment variables for the life of the guard and restores them on drop.
pub struct ScopedEnv {
    saved: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    pub fn new() -> Self {
        Self { saved: Vec::new() }
    }

    pub fn set(&mut self, key: &str, value: impl AsRef<std::ffi::OsStr>) {
        self.remember(key);
        std::env::set_var(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.remember(key);
        std::env::remove_var(key);
    }

    fn remember(&mut self, key: &str) {
        if !self.saved.iter().any(|(k, _)| k == key) {
            self.saved.push((key.to_string(), std::env::var(key).ok()));
        }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

pub const BRIEF: &str = "Independent specialty coffee roaster opening a second shop";

pub fn registry() -> Arc<StepRegistry> {
    Arc::new(StepRegistry::branding().unwrap())
}

pub fn ids(raw: &[u8]) -> Vec<StepId> {
    raw.iter().copied().map(StepId).collect()
}

/// Content of the right shape for a step, as the orchestrator would store it.
pub fn content_for(step: u8) -> StepContent {
    let registry = StepRegistry::branding().unwrap();
    let definition = registry.get(StepId(step)).unwrap();
    match definition.shape {
        ContentShape::Text => StepContent::Text(format!("Existing {}", definition.key)),
        ContentShape::List => StepContent::List(vec![json!({ "name": definition.key })]),
        ContentShape::Structured => {
            let mut record = serde_json::Map::new();
            record.insert("summary".to_string(), json!(definition.key));
            StepContent::Structured(record)
        }
    }
}

/// Project whose listed steps already hold content.
pub fn project_with(satisfied: &[u8]) -> ProjectState {
    let mut project = ProjectState::new("acme", "Acme Roasters", BRIEF);
    for step in satisfied {
        project.set_content(StepId(*step), content_for(*step));
    }
    project
}

/// Generator that answers by step shape, with optional failures, overrides and delay.
#[derive(Default)]
pub struct ScriptedGenerator {
    requests: Mutex<Vec<GenerationRequest>>,
    failures: Mutex<HashMap<StepId, usize>>,
    overrides: Mutex<HashMap<StepId, Value>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Fail the next `times` calls for `step`.
    pub fn fail_step(&self, step: u8, times: usize) {
        self.failures.lock().insert(StepId(step), times);
    }

    /// Return `value` verbatim for `step`.
    pub fn respond_with(&self, step: u8, value: Value) {
        self.overrides.lock().insert(StepId(step), value);
    }

    pub fn calls(&self) -> Vec<StepId> {
        self.requests.lock().iter().map(|r| r.step_id()).collect()
    }

    pub fn call_count(&self, step: u8) -> usize {
        self.calls().iter().filter(|id| **id == StepId(step)).count()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl StepGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GeneratorError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = request.step_id();
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&step) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(GeneratorError::Provider(format!(
                        "scripted failure for step {}",
                        step
                    )));
                }
            }
        }
        if let Some(value) = self.overrides.lock().get(&step) {
            return Ok(value.clone());
        }

        let key = &request.step.key;
        Ok(match request.step.shape {
            ContentShape::Text => json!(format!("Generated {}", key)),
            ContentShape::List => json!([{ "name": key }]),
            ContentShape::Structured => json!({ "summary": key }),
        })
    }
}

/// Gate with a fixed answer that remembers what it was asked.
pub struct RecordingGate {
    answer: Confirmation,
    prompts: Mutex<Vec<ConfirmationPrompt>>,
}

impl RecordingGate {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            answer: Confirmation::Accepted,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn declining() -> Arc<Self> {
        Arc::new(Self {
            answer: Confirmation::Declined,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<ConfirmationPrompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ConfirmationGate for RecordingGate {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> Confirmation {
        self.prompts.lock().push(prompt.clone());
        self.answer
    }
}

/// Persistence double; optionally fails every save.
#[derive(Default)]
pub struct RecordingPersistence {
    saves: Mutex<Vec<ProjectState>>,
    fail: bool,
}

impl RecordingPersistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            saves: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn saves(&self) -> Vec<ProjectState> {
        self.saves.lock().clone()
    }
}

impl ProjectPersistence for RecordingPersistence {
    fn save(&self, state: &ProjectState) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Database("disk full".to_string()));
        }
        self.saves.lock().push(state.clone());
        Ok(())
    }
}

/// Ledger whose consumption recording always fails after authorizing normally.
pub struct UnrecordableLedger {
    pub inner: CreditLedger,
}

#[async_trait]
impl AdmissionController for UnrecordableLedger {
    async fn authorize(&self, required_credits: u64) -> Result<(), AdmissionDenial> {
        self.inner.authorize(required_credits).await
    }

    async fn record_consumption(&self, record: &ConsumptionRecord) -> Result<(), ConsumptionError> {
        Err(ConsumptionError {
            step: record.step,
            reason: "billing service unavailable".to_string(),
        })
    }
}

pub fn funded_ledger(credits: u64) -> Arc<CreditLedger> {
    Arc::new(CreditLedger::new(Some("studio".to_string()), credits))
}

pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        dependency_delay: Duration::ZERO,
        generation_timeout: Duration::from_secs(5),
    }
}

/// Everything an orchestrator under test is wired to.
pub struct Harness {
    pub generator: Arc<ScriptedGenerator>,
    pub ledger: Arc<CreditLedger>,
    pub gate: Arc<RecordingGate>,
    pub persistence: Arc<RecordingPersistence>,
    pub progress: ProgressBus,
    pub settings: OrchestratorSettings,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            generator: ScriptedGenerator::new(),
            ledger: funded_ledger(100),
            gate: RecordingGate::accepting(),
            persistence: RecordingPersistence::new(),
            progress: ProgressBus::default(),
            settings: fast_settings(),
        }
    }

    pub fn orchestrator(&self, project: ProjectState) -> GenerationOrchestrator {
        self.orchestrator_with_admission(project, self.ledger.clone())
    }

    pub fn orchestrator_with_admission(
        &self,
        project: ProjectState,
        admission: Arc<dyn AdmissionController>,
    ) -> GenerationOrchestrator {
        GenerationOrchestrator::builder(registry(), project, self.generator.clone(), admission)
            .confirmation_gate(self.gate.clone())
            .persistence(self.persistence.clone())
            .settings(self.settings)
            .progress(self.progress.clone())
            .build()
    }
}

pub fn drain(receiver: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub fn event_types(events: &[ProgressEvent]) -> Vec<String> {
    events.iter().map(|e| e.event_type.clone()).collect()
}

pub fn notices(events: &[ProgressEvent], level: &str) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.is_notice() && e.data["level"] == level)
        .filter_map(|e| e.data["message"].as_str().map(str::to_string))
        .collect()
}
