//! Generation session for one project.
//!
//! Owns the project's content and per-step state, and sequences dependency checks,
//! confirmation, admission, generation, persistence and consumption recording.

use crate::admission::{AdmissionController, ConsumptionRecord, CreditPolicy};
use crate::config::GenerationConfig;
use crate::confirmation::{AutoConfirm, Confirmation, ConfirmationGate, ConfirmationPrompt};
use crate::content::{normalize, ProjectState, StepContent};
use crate::error::{GenerationError, GeneratorError};
use crate::generator::{GenerationRequest, StepGenerator};
use crate::orchestrator::outcome::{
    BulkSummary, ConsumptionStatus, GenerateOptions, GeneratedStep, StepFailure, StepOutcome,
};
use crate::orchestrator::state::{GenerationState, InFlightGuard, StepStateTracker};
use crate::persistence::ProjectPersistence;
use crate::progress::{NoticeLevel, ProgressBus};
use crate::resolver::DependencyResolver;
use crate::step::{StepDefinition, StepId, StepRegistry};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Pause after each prerequisite generated on the interactive path
    pub dependency_delay: Duration,
    /// Upper bound on a single generator call
    pub generation_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            dependency_delay: Duration::from_millis(750),
            generation_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&GenerationConfig> for OrchestratorSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            dependency_delay: Duration::from_millis(config.dependency_delay_ms),
            generation_timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

pub struct OrchestratorBuilder {
    registry: Arc<StepRegistry>,
    project: ProjectState,
    generator: Arc<dyn StepGenerator>,
    admission: Arc<dyn AdmissionController>,
    gate: Arc<dyn ConfirmationGate>,
    persistence: Option<Arc<dyn ProjectPersistence>>,
    credits: CreditPolicy,
    settings: OrchestratorSettings,
    progress: Option<ProgressBus>,
}

impl OrchestratorBuilder {
    /// Defaults to declining every confirmation.
    pub fn confirmation_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn ProjectPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn credit_policy(mut self, credits: CreditPolicy) -> Self {
        self.credits = credits;
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn progress(mut self, progress: ProgressBus) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> GenerationOrchestrator {
        GenerationOrchestrator {
            session: self.project.project_id.clone(),
            registry: self.registry,
            resolver: DependencyResolver::new(),
            project: RwLock::new(self.project),
            states: StepStateTracker::new(),
            generator: self.generator,
            admission: self.admission,
            gate: self.gate,
            persistence: self.persistence,
            credits: self.credits,
            settings: self.settings,
            progress: self.progress,
        }
    }
}

pub struct GenerationOrchestrator {
    session: String,
    registry: Arc<StepRegistry>,
    resolver: DependencyResolver,
    project: RwLock<ProjectState>,
    states: StepStateTracker,
    generator: Arc<dyn StepGenerator>,
    admission: Arc<dyn AdmissionController>,
    gate: Arc<dyn ConfirmationGate>,
    persistence: Option<Arc<dyn ProjectPersistence>>,
    credits: CreditPolicy,
    settings: OrchestratorSettings,
    progress: Option<ProgressBus>,
}

impl GenerationOrchestrator {
    pub fn builder(
        registry: Arc<StepRegistry>,
        project: ProjectState,
        generator: Arc<dyn StepGenerator>,
        admission: Arc<dyn AdmissionController>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            project,
            generator,
            admission,
            gate: Arc::new(AutoConfirm::Decline),
            persistence: None,
            credits: CreditPolicy::default(),
            settings: OrchestratorSettings::default(),
            progress: None,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.session
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> ProjectState {
        self.project.read().clone()
    }

    pub fn content(&self, step: StepId) -> Option<StepContent> {
        self.project.read().content.get(step).cloned()
    }

    pub fn has_content(&self, step: StepId) -> bool {
        self.project.read().content.has_content(step)
    }

    pub fn state_of(&self, step: StepId) -> GenerationState {
        self.states.state(step, self.has_content(step))
    }

    /// Every registered step with its current state, in ascending id order.
    pub fn step_states(&self) -> Vec<(StepDefinition, GenerationState)> {
        self.registry
            .iter()
            .map(|definition| (definition.clone(), self.state_of(definition.id)))
            .collect()
    }

    /// Direct prerequisites of `step` that still lack content.
    pub fn missing_prerequisites(&self, step: StepId) -> Vec<StepId> {
        let project = self.project.read();
        self.resolver
            .missing_prerequisites(&self.registry, &project.content, step)
    }

    /// Generate content for one step.
    ///
    /// With `auto_resolve_deps`, missing prerequisites (transitively) are generated
    /// first after the confirmation gate accepts. Otherwise missing prerequisites fail
    /// the call with `UnsatisfiedDependencies` before any admission check.
    pub async fn generate_step(
        &self,
        step: StepId,
        options: GenerateOptions,
    ) -> Result<StepOutcome, GenerationError> {
        let definition = self
            .registry
            .get(step)
            .cloned()
            .ok_or(GenerationError::UnknownStep(step));
        let result = match definition {
            Ok(definition) if options.auto_resolve_deps => {
                self.generate_with_dependencies(&definition, options.silent)
                    .await
            }
            Ok(definition) => self.generate_direct(&definition, options.silent).await,
            Err(err) => Err(err),
        };
        self.report(step, options.silent, &result);
        result
    }

    /// Generate every step lacking content in ascending id order, reaching back for a
    /// step's missing prerequisites before the step itself.
    ///
    /// Runs silently and never asks for confirmation. A failed step is not retried in
    /// the same pass; its dependents are recorded as blocked.
    pub async fn generate_all(&self) -> BulkSummary {
        let (already_satisfied, pending): (Vec<StepId>, Vec<StepId>) = self
            .registry
            .ids()
            .into_iter()
            .partition(|step| self.has_content(*step));
        info!(project = %self.session, pending = pending.len(), "Starting bulk generation");
        self.emit(
            "bulk_generation_started",
            json!({ "pending": pending.clone() }),
        );

        let mut pass = BulkPass {
            pending: pending.iter().copied().collect(),
            ..BulkPass::default()
        };
        for step in &pending {
            self.ensure_step(*step, &mut pass).await;
        }
        // A skipped step whose concurrent attempt has since landed is satisfied after all.
        let (landed, in_flight): (Vec<StepId>, Vec<StepId>) = pass
            .in_flight
            .into_iter()
            .partition(|step| self.has_content(*step));
        pass.satisfied_elsewhere.extend(landed);
        pass.satisfied_elsewhere.sort();

        let summary = BulkSummary {
            pending,
            already_satisfied,
            generated: pass.generated,
            satisfied_elsewhere: pass.satisfied_elsewhere,
            failed: pass.failed,
            blocked: pass.blocked,
            in_flight,
            consumption_errors: pass.consumption_errors,
        };
        info!(
            project = %self.session,
            generated = summary.generated.len(),
            failed = summary.failed.len(),
            blocked = summary.blocked.len(),
            "{}",
            summary.message()
        );
        self.emit(
            "bulk_generation_completed",
            serde_json::to_value(&summary).unwrap_or(Value::Null),
        );
        summary
    }

    fn ensure_step<'a>(&'a self, step: StepId, pass: &'a mut BulkPass) -> BoxFuture<'a, bool> {
        async move {
            if pass.succeeded.contains(&step) {
                return true;
            }
            if self.has_content(step) {
                if pass.pending.contains(&step) && !pass.settled.contains(&step) {
                    debug!(%step, "Filled by another request during the pass");
                    pass.satisfied_elsewhere.push(step);
                }
                pass.succeeded.insert(step);
                return true;
            }
            if pass.settled.contains(&step) {
                return false;
            }

            let prerequisites = self.registry.prerequisites_of(step).to_vec();
            for prerequisite in prerequisites {
                if !self.ensure_step(prerequisite, pass).await {
                    debug!(%step, %prerequisite, "Blocked by failed prerequisite");
                    pass.settled.insert(step);
                    pass.blocked.push(step);
                    return false;
                }
            }

            match self.generate_step(step, GenerateOptions::silent()).await {
                Ok(StepOutcome::Generated(generated)) => {
                    if let Some(err) = generated.consumption_error() {
                        pass.consumption_errors.push(err);
                    }
                    pass.succeeded.insert(step);
                    pass.generated.push(step);
                    true
                }
                Ok(StepOutcome::AlreadyInFlight { .. }) => {
                    pass.settled.insert(step);
                    pass.in_flight.push(step);
                    false
                }
                Err(err) => {
                    pass.settled.insert(step);
                    pass.failed.push(StepFailure::from_error(step, &err));
                    false
                }
            }
        }
        .boxed()
    }

    async fn generate_with_dependencies(
        &self,
        definition: &StepDefinition,
        silent: bool,
    ) -> Result<StepOutcome, GenerationError> {
        if !silent {
            self.check_brief()?;
        }
        let plan = {
            let project = self.project.read();
            self.resolver
                .resolution_plan(&self.registry, &project.content, definition.id)
        };
        let mut dependencies = Vec::new();
        if !plan.is_empty() {
            dependencies = self.confirm_and_generate(definition, plan).await?;
        }
        let outcome = self.generate_ready(definition, silent).await?;
        Ok(outcome.with_dependencies(dependencies))
    }

    async fn generate_direct(
        &self,
        definition: &StepDefinition,
        silent: bool,
    ) -> Result<StepOutcome, GenerationError> {
        if !silent {
            self.check_brief()?;
        }
        self.generate_ready(definition, silent).await
    }

    /// Confirm once for the whole plan, then generate each entry in order.
    async fn confirm_and_generate(
        &self,
        definition: &StepDefinition,
        plan: Vec<StepId>,
    ) -> Result<Vec<StepId>, GenerationError> {
        let step = definition.id;
        let missing: Vec<StepDefinition> = plan
            .iter()
            .filter_map(|id| self.registry.get(*id).cloned())
            .collect();
        let prompt = ConfirmationPrompt {
            target: definition.clone(),
            missing,
        };
        self.emit(
            "dependency_resolution_started",
            json!({ "step": step, "missing": plan.clone() }),
        );
        self.emit(
            "confirmation_requested",
            json!({ "step": step, "message": prompt.message() }),
        );

        if self.gate.ask(&prompt).await == Confirmation::Declined {
            info!(%step, "Dependency generation declined");
            return Err(GenerationError::UserDeclined { step });
        }

        let mut generated = Vec::new();
        for dependency in plan {
            // Another caller may have filled it since the plan was computed.
            if self.has_content(dependency) {
                continue;
            }
            let Some(dependency_definition) = self.registry.get(dependency).cloned() else {
                continue;
            };
            // The caller reports the wrapped failure once.
            match self.generate_direct(&dependency_definition, false).await {
                Ok(StepOutcome::Generated(_)) => generated.push(dependency),
                // The target's own prerequisite check catches it if it never lands.
                Ok(StepOutcome::AlreadyInFlight { .. }) => {}
                Err(cause) => {
                    return Err(GenerationError::DependencyGenerationFailed {
                        step,
                        dependency,
                        cause: Box::new(cause),
                    });
                }
            }
            if !self.settings.dependency_delay.is_zero() {
                tokio::time::sleep(self.settings.dependency_delay).await;
            }
        }
        Ok(generated)
    }

    /// Generate a step whose prerequisites are expected to be satisfied.
    async fn generate_ready(
        &self,
        definition: &StepDefinition,
        silent: bool,
    ) -> Result<StepOutcome, GenerationError> {
        let step = definition.id;
        let missing = self.missing_prerequisites(step);
        if !missing.is_empty() {
            return Err(GenerationError::UnsatisfiedDependencies { step, missing });
        }

        let Some(guard) = self.states.try_begin(step) else {
            debug!(%step, "Generation already in flight; skipping duplicate request");
            self.emit("step_generation_deduplicated", json!({ "step": step }));
            return Ok(StepOutcome::AlreadyInFlight { step });
        };

        let credits = self.credits.credits_for(step);
        if let Err(denial) = self.admission.authorize(credits).await {
            guard.release();
            return Err(denial.into());
        }

        let request = self.build_request(definition, silent);
        self.emit(
            "step_generation_started",
            json!({ "step": step, "label": definition.label, "initial": request.is_initial }),
        );
        debug!(%step, label = %definition.label, initial = request.is_initial, "Generating step");

        let content = match self.run_generator(definition, &request).await {
            Ok(content) => content,
            Err(source) => return Err(self.fail_attempt(guard, definition, source)),
        };

        let snapshot = {
            let mut project = self.project.write();
            project.set_content(step, content);
            project.clone()
        };
        guard.succeed();
        info!(project = %self.session, %step, label = %definition.label, "Step generated");
        self.emit(
            "step_generation_completed",
            json!({ "step": step, "label": definition.label }),
        );
        self.persist(&snapshot);

        let consumption = self
            .record_consumption(ConsumptionRecord {
                step,
                prompt_length: request.prompt_length(),
                credits,
            })
            .await;

        Ok(StepOutcome::Generated(GeneratedStep {
            step,
            dependencies: Vec::new(),
            credits,
            consumption,
        }))
    }

    async fn run_generator(
        &self,
        definition: &StepDefinition,
        request: &GenerationRequest,
    ) -> Result<StepContent, GeneratorError> {
        let timeout = self.settings.generation_timeout;
        let raw = tokio::time::timeout(timeout, self.generator.generate(request))
            .await
            .map_err(|_| GeneratorError::Timeout(timeout.as_secs()))??;
        let content = normalize(definition.shape, raw)?;
        if !content.is_usable() {
            return Err(GeneratorError::InvalidOutput(
                "generator returned empty content".to_string(),
            ));
        }
        Ok(content)
    }

    fn fail_attempt(
        &self,
        guard: InFlightGuard<'_>,
        definition: &StepDefinition,
        source: GeneratorError,
    ) -> GenerationError {
        guard.fail();
        let step = definition.id;
        warn!(project = %self.session, %step, error = %source, "Step generation failed");
        self.emit(
            "step_generation_failed",
            json!({ "step": step, "label": definition.label, "error": source.to_string() }),
        );
        GenerationError::GenerationFailed { step, source }
    }

    fn build_request(&self, definition: &StepDefinition, silent: bool) -> GenerationRequest {
        let project = self.project.read();
        let context: BTreeMap<StepId, StepContent> = project
            .content
            .iter()
            .filter(|(_, content)| content.is_usable())
            .map(|(id, content)| (*id, content.clone()))
            .collect();
        GenerationRequest {
            step: definition.clone(),
            is_initial: project.content.is_empty(),
            silent,
            brief: project.brief.clone(),
            context,
        }
    }

    fn check_brief(&self) -> Result<(), GenerationError> {
        if self.project.read().brief.trim().is_empty() {
            return Err(GenerationError::EmptyInput);
        }
        Ok(())
    }

    fn persist(&self, snapshot: &ProjectState) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(err) = persistence.save(snapshot) {
            warn!(project = %self.session, error = %err, "Failed to persist project state");
            self.emit("persistence_failed", json!({ "error": err.to_string() }));
        }
    }

    async fn record_consumption(&self, record: ConsumptionRecord) -> ConsumptionStatus {
        match self.admission.record_consumption(&record).await {
            Ok(()) => ConsumptionStatus::Recorded,
            Err(err) => {
                warn!(project = %self.session, step = %record.step, error = %err, "Consumption recording failed");
                self.emit(
                    "consumption_recording_failed",
                    json!({ "step": record.step, "credits": record.credits, "reason": err.reason }),
                );
                // Surfaced even for silent requests.
                self.notice(NoticeLevel::Warning, err.to_string());
                ConsumptionStatus::Failed { reason: err.reason }
            }
        }
    }

    fn report(&self, step: StepId, silent: bool, result: &Result<StepOutcome, GenerationError>) {
        let Err(err) = result else {
            return;
        };
        if silent {
            debug!(%step, code = err.code(), error = %err, "Silent generation request failed");
        } else {
            info!(%step, code = err.code(), error = %err, "Generation request failed");
            self.notice(NoticeLevel::Error, err.to_string());
        }
    }

    fn emit(&self, event_type: &str, data: Value) {
        if let Some(progress) = &self.progress {
            progress.emit(&self.session, event_type, data);
        }
    }

    fn notice(&self, level: NoticeLevel, message: String) {
        if let Some(progress) = &self.progress {
            progress.notice(&self.session, level, message);
        }
    }
}

#[derive(Default)]
struct BulkPass {
    pending: HashSet<StepId>,
    succeeded: HashSet<StepId>,
    settled: HashSet<StepId>,
    generated: Vec<StepId>,
    satisfied_elsewhere: Vec<StepId>,
    failed: Vec<StepFailure>,
    blocked: Vec<StepId>,
    in_flight: Vec<StepId>,
    consumption_errors: Vec<crate::error::ConsumptionError>,
}
