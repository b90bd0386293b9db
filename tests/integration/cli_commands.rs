//! Command routing through RunContext against a temporary store

use crate::integration::test_utils::{env_lock, project_with, ScopedEnv};
use brandstage::admission::BYPASS_ENV_VAR;
use brandstage::cli::{map_error, Cli, RunContext};
use brandstage::error::{ApiError, GenerationError};
use brandstage::persistence::{ProjectPersistence, SledProjectStore};
use brandstage::step::StepId;
use clap::Parser;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("store");
        let config = dir.path().join("brandstage.toml");
        let contents = format!(
            "[storage]\nstore_path = {:?}\n\n[admission]\naccount_id = \"studio\"\ninitial_balance = 5\n{}",
            store.display().to_string(),
            extra
        );
        std::fs::write(&config, contents).unwrap();
        Self { dir, config }
    }

    fn store_path(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    fn context(&self) -> RunContext {
        RunContext::new(self.dir.path().to_path_buf(), Some(self.config.clone())).unwrap()
    }

    fn run(&self, context: &RunContext, args: &[&str]) -> Result<String, ApiError> {
        let mut argv = vec!["brandstage", "--config", path_str(&self.config)];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        context.execute(&cli.command)
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn isolated() -> ScopedEnv {
    let mut env = ScopedEnv::new();
    env.remove(BYPASS_ENV_VAR);
    env.remove("BRANDSTAGE__ADMISSION__ACCOUNT_ID");
    env.remove("BRANDSTAGE__GENERATION__TIMEOUT_SECS");
    env
}

#[test]
fn steps_lists_the_registry() {
    let _lock = env_lock();
    let _env = isolated();
    let workspace = Workspace::new("");
    let context = workspace.context();

    let output = workspace.run(&context, &["steps", "--format", "json"]).unwrap();
    let json: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(json["total"], 12);
}

#[test]
fn project_create_list_and_delete() {
    let _lock = env_lock();
    let _env = isolated();
    let workspace = Workspace::new("");
    let context = workspace.context();

    let created = workspace
        .run(
            &context,
            &["project", "create", "--name", "Acme Roasters", "--brief", "Coffee"],
        )
        .unwrap();
    assert!(created.contains("'Acme Roasters' (acme-roasters)"));

    let duplicate = workspace.run(
        &context,
        &["project", "create", "--name", "Acme Roasters", "--brief", "Again"],
    );
    assert!(duplicate.is_err());

    let listed = workspace
        .run(&context, &["project", "list", "--format", "json"])
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(json["projects"][0]["id"], "acme-roasters");
    assert_eq!(json["projects"][0]["satisfied"], 0);

    let deleted = workspace
        .run(&context, &["project", "delete", "--project", "acme-roasters"])
        .unwrap();
    assert!(deleted.contains("acme-roasters"));
    assert!(workspace
        .run(&context, &["project", "delete", "--project", "acme-roasters"])
        .is_err());
}

#[test]
fn status_and_show_read_stored_content() {
    let _lock = env_lock();
    let _env = isolated();
    let workspace = Workspace::new("");
    {
        let store = SledProjectStore::open(workspace.store_path()).unwrap();
        store.create(&project_with(&[1, 2])).unwrap();
        store.save(&project_with(&[1, 2])).unwrap();
    }
    let context = workspace.context();

    let status = workspace
        .run(&context, &["status", "--project", "acme", "--format", "json"])
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(json["satisfied"], 2);
    assert_eq!(json["steps"][0]["state"], "satisfied");
    assert_eq!(json["steps"][3]["missing"], serde_json::json!([3]));

    let shown = workspace
        .run(
            &context,
            &["show", "--project", "acme", "target-audience", "--format", "json"],
        )
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&shown).unwrap();
    assert_eq!(json["step"], 2);
    assert_eq!(json["content"]["kind"], "text");
    assert_eq!(json["content"]["value"], "Existing target-audience");

    let empty = workspace
        .run(&context, &["show", "--project", "acme", "5"])
        .unwrap();
    assert!(empty.contains("has no content yet"));
}

#[test]
fn strict_generate_reports_missing_prerequisites() {
    let _lock = env_lock();
    let _env = isolated();
    let workspace = Workspace::new("");
    let context = workspace.context();
    workspace
        .run(
            &context,
            &["project", "create", "--name", "Acme", "--brief", "Coffee"],
        )
        .unwrap();

    let err = workspace
        .run(
            &context,
            &["generate", "--project", "acme", "--no-resolve", "3"],
        )
        .unwrap_err();
    match &err {
        ApiError::Generation(GenerationError::UnsatisfiedDependencies { step, missing }) => {
            assert_eq!(*step, StepId(3));
            assert_eq!(missing, &vec![StepId(1), StepId(2)]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(map_error(&err).contains("Run without --no-resolve"));
}

#[test]
fn unknown_step_and_project_are_errors() {
    let _lock = env_lock();
    let _env = isolated();
    let workspace = Workspace::new("");
    let context = workspace.context();

    assert!(matches!(
        workspace.run(&context, &["show", "--project", "acme", "logo"]),
        Err(ApiError::UnknownStep(_))
    ));
    assert!(matches!(
        workspace.run(&context, &["status", "--project", "ghost"]),
        Err(ApiError::StorageError(_))
    ));
}

#[test]
fn credits_are_seeded_and_granted() {
    let _lock = env_lock();
    let _env = isolated();
    let workspace = Workspace::new("");
    let context = workspace.context();

    let balance = workspace.run(&context, &["credits"]).unwrap();
    assert_eq!(balance, "Account 'studio': 5 credit(s)");

    let granted = workspace
        .run(&context, &["credits", "--grant", "10"])
        .unwrap();
    assert!(granted.ends_with("Balance: 15"));
}

#[test]
fn invalid_config_is_rejected_at_startup() {
    let _lock = env_lock();
    let _env = isolated();
    let workspace = Workspace::new("\n[generation]\ntimeout_secs = 0\n");

    let err = RunContext::new(
        workspace.dir.path().to_path_buf(),
        Some(workspace.config.clone()),
    )
    .err()
    .unwrap();
    assert!(err.to_string().contains("timeout_secs"));
}

#[test]
fn config_show_renders_effective_values() {
    let _lock = env_lock();
    let _env = isolated();
    let workspace = Workspace::new("");
    let context = workspace.context();

    let rendered = workspace.run(&context, &["config", "show"]).unwrap();
    assert!(rendered.contains("account_id = \"studio\""));
    assert_eq!(
        workspace.run(&context, &["config", "validate"]).unwrap(),
        "Configuration is valid."
    );
}
