//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::admission::{admission_from_config, bypass_enabled, CreditPolicy, SledCreditLedger};
use crate::cli::gate::TerminalGate;
use crate::cli::help::command_name;
use crate::cli::parse::{Commands, ConfigCommands, ProjectCommands};
use crate::cli::presentation::{
    format_bulk_summary, format_notices, format_project_created, format_project_list,
    format_status, format_step_content, format_step_outcome, format_steps, StepStatusRow,
};
use crate::config::{BrandstageConfig, ConfigLoader};
use crate::confirmation::{AutoConfirm, ConfirmationGate};
use crate::content::ProjectState;
use crate::error::{ApiError, StorageError};
use crate::generator::ProviderStepGenerator;
use crate::orchestrator::{
    GenerateOptions, GenerationOrchestrator, GenerationState, OrchestratorSettings,
};
use crate::persistence::SledProjectStore;
use crate::progress::{ProgressBus, ProgressEvent};
use crate::provider::ProviderFactory;
use crate::resolver::DependencyResolver;
use crate::step::{StepDefinition, StepRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Runtime context for CLI execution: workspace, effective config, registry and store.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    config: BrandstageConfig,
    workspace_root: PathBuf,
    registry: Arc<StepRegistry>,
    store: SledProjectStore,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };

        let registry = Arc::new(StepRegistry::branding()?);
        config.validate_against(&registry).map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;

        let store_path = config.storage.resolve_store_path(&workspace_root);
        std::fs::create_dir_all(&store_path)
            .map_err(|e| ApiError::StorageError(StorageError::IoError(e)))?;
        let store = SledProjectStore::open(&store_path)?;
        debug!(store = %store_path.display(), "Project store opened");

        Ok(Self {
            config,
            workspace_root,
            registry,
            store,
        })
    }

    pub fn config(&self) -> &BrandstageConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let name = command_name(command);
        let started = Instant::now();
        info!(command = %name, "Executing command");
        let result = self.execute_inner(command);
        debug!(
            command = %name,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Steps { format } => format_steps(&self.registry, format),
            Commands::Project { command } => self.handle_project(command),
            Commands::Status { project, format } => self.handle_status(project, format),
            Commands::Generate {
                project,
                step,
                no_resolve,
                yes,
            } => self.handle_generate(project, step, *no_resolve, *yes),
            Commands::GenerateAll { project } => self.handle_generate_all(project),
            Commands::Show {
                project,
                step,
                format,
            } => self.handle_show(project, step, format),
            Commands::Credits { grant } => self.handle_credits(*grant),
            Commands::Config { command } => self.handle_config(command),
        }
    }

    fn handle_project(&self, command: &ProjectCommands) -> Result<String, ApiError> {
        match command {
            ProjectCommands::Create { name, brief, id } => {
                if name.trim().is_empty() {
                    return Err(ApiError::ConfigError(
                        "Project name cannot be empty".to_string(),
                    ));
                }
                let project_id = id.clone().unwrap_or_else(|| slugify(name));
                if project_id.is_empty() {
                    return Err(ApiError::ConfigError(format!(
                        "Cannot derive a project id from '{}'; pass --id",
                        name
                    )));
                }
                let project = ProjectState::new(project_id, name.trim(), brief.trim());
                self.store.create(&project)?;
                info!(project = %project.project_id, "Project created");
                Ok(format_project_created(&project))
            }
            ProjectCommands::List { format } => {
                let projects = self.store.list()?;
                format_project_list(&projects, self.registry.len(), format)
            }
            ProjectCommands::Delete { project } => {
                if self.store.delete(project)? {
                    Ok(format!("Deleted project '{}'", project))
                } else {
                    Err(StorageError::ProjectNotFound(project.clone()).into())
                }
            }
        }
    }

    fn handle_status(&self, project_id: &str, format: &str) -> Result<String, ApiError> {
        let project = self.store.load(project_id)?;
        let resolver = DependencyResolver::new();
        let rows: Vec<StepStatusRow> = self
            .registry
            .iter()
            .map(|step| {
                let state = if project.content.has_content(step.id) {
                    GenerationState::Satisfied
                } else {
                    GenerationState::Idle
                };
                StepStatusRow {
                    step: step.clone(),
                    state,
                    missing: resolver.missing_prerequisites(
                        &self.registry,
                        &project.content,
                        step.id,
                    ),
                }
            })
            .collect();
        format_status(project_id, &rows, format)
    }

    fn handle_generate(
        &self,
        project_id: &str,
        step_ref: &str,
        no_resolve: bool,
        yes: bool,
    ) -> Result<String, ApiError> {
        let step = self.resolve_step(step_ref)?.id;
        let project = self.store.load(project_id)?;
        let gate: Arc<dyn ConfirmationGate> = if yes {
            Arc::new(AutoConfirm::Accept)
        } else {
            Arc::new(TerminalGate)
        };
        let progress = ProgressBus::default();
        let mut events = progress.subscribe();
        let orchestrator = self.orchestrator(project, gate, progress)?;
        let options = if no_resolve {
            GenerateOptions::strict()
        } else {
            GenerateOptions::interactive()
        };

        let outcome = runtime()?.block_on(orchestrator.generate_step(step, options))?;
        let mut output = format_step_outcome(&outcome, &self.registry);
        if let Some(notices) = format_notices(&drain(&mut events)) {
            output.push('\n');
            output.push_str(&notices);
        }
        Ok(output)
    }

    fn handle_generate_all(&self, project_id: &str) -> Result<String, ApiError> {
        let project = self.store.load(project_id)?;
        let progress = ProgressBus::default();
        let orchestrator = self.orchestrator(project, Arc::new(AutoConfirm::Decline), progress)?;
        let summary = runtime()?.block_on(orchestrator.generate_all());
        Ok(format_bulk_summary(&summary, &self.registry))
    }

    fn handle_show(&self, project_id: &str, step_ref: &str, format: &str) -> Result<String, ApiError> {
        let step = self.resolve_step(step_ref)?;
        let project = self.store.load(project_id)?;
        format_step_content(step, project.content.get(step.id), format)
    }

    fn handle_credits(&self, grant: Option<u64>) -> Result<String, ApiError> {
        let admission = &self.config.admission;
        if bypass_enabled(admission) {
            return Ok("Admission bypass is active; generations are not charged.".to_string());
        }
        let Some(account) = admission.account_id.clone() else {
            return Ok("No account configured. Set admission.account_id to enable generation.".to_string());
        };
        let ledger = SledCreditLedger::open(self.store.db(), Some(account.clone()))?;
        ledger.ensure_initial_balance(admission.initial_balance)?;
        match grant {
            Some(credits) => {
                let balance = ledger.grant(credits)?;
                info!(account = %account, credits, balance, "Credits granted");
                Ok(format!(
                    "Granted {} credit(s) to '{}'. Balance: {}",
                    credits, account, balance
                ))
            }
            None => Ok(format!(
                "Account '{}': {} credit(s)",
                account,
                ledger.balance()?
            )),
        }
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, ApiError> {
        match command {
            ConfigCommands::Show => self
                .config
                .to_toml()
                .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e))),
            // Loading already validated it.
            ConfigCommands::Validate => Ok("Configuration is valid.".to_string()),
        }
    }

    fn resolve_step(&self, reference: &str) -> Result<&StepDefinition, ApiError> {
        self.registry
            .resolve(reference)
            .ok_or_else(|| ApiError::UnknownStep(reference.to_string()))
    }

    fn orchestrator(
        &self,
        project: ProjectState,
        gate: Arc<dyn ConfirmationGate>,
        progress: ProgressBus,
    ) -> Result<GenerationOrchestrator, ApiError> {
        let client = ProviderFactory::create_client(&self.config.provider)?;
        let generator = Arc::new(ProviderStepGenerator::new(
            client,
            self.config.provider.completion_options(),
        ));
        let admission = admission_from_config(&self.config.admission, self.store.db())?;
        let credits = CreditPolicy::from_config(&self.config.credits, &self.registry)?;

        Ok(GenerationOrchestrator::builder(
            Arc::clone(&self.registry),
            project,
            generator,
            admission,
        )
        .confirmation_gate(gate)
        .persistence(Arc::new(self.store.clone()))
        .credit_policy(credits)
        .settings(OrchestratorSettings::from(&self.config.generation))
        .progress(progress)
        .build())
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, ApiError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ApiError::ConfigError(format!("Failed to create async runtime: {}", e)))
}

fn drain(events: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Lowercase ascii alphanumerics, everything else collapsed to single dashes.
fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
