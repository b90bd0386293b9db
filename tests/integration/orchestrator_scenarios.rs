//! Single-step generation: dependency resolution, confirmation, admission, dedupe
//! and failure handling.

use crate::integration::test_utils::*;
use brandstage::admission::CreditLedger;
use brandstage::content::{ProjectState, StepContent};
use brandstage::error::{GenerationError, GeneratorError};
use brandstage::orchestrator::{
    ConsumptionStatus, GenerateOptions, GenerationState, OrchestratorSettings, StepOutcome,
};
use brandstage::step::StepId;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn interactive_request_generates_missing_prerequisites_first() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(project_with(&[1, 2, 3, 4, 5]));

    let outcome = orchestrator
        .generate_step(StepId(8), GenerateOptions::interactive())
        .await
        .unwrap();

    let prompts = harness.gate.prompts();
    assert_eq!(prompts.len(), 1, "one confirmation for the whole chain");
    assert_eq!(prompts[0].missing_ids(), ids(&[6, 7]));
    assert_eq!(harness.generator.calls(), ids(&[6, 7, 8]));
    assert_eq!(outcome.generated().unwrap().dependencies, ids(&[6, 7]));
    for step in [6, 7, 8] {
        assert_eq!(
            orchestrator.state_of(StepId(step)),
            GenerationState::Satisfied
        );
    }
    assert_eq!(harness.ledger.balance(), 97);
}

#[tokio::test]
async fn resolution_is_transitive_and_ordered() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(project_with(&[]));

    orchestrator
        .generate_step(StepId(8), GenerateOptions::interactive())
        .await
        .unwrap();

    assert_eq!(harness.generator.calls(), ids(&[1, 2, 3, 4, 5, 6, 7, 8]));
    assert_eq!(harness.gate.prompts()[0].missing_ids(), ids(&[1, 2, 3, 4, 5, 6, 7]));
}

#[tokio::test]
async fn declined_confirmation_generates_nothing() {
    let mut harness = Harness::new();
    harness.gate = RecordingGate::declining();
    let orchestrator = harness.orchestrator(project_with(&[1]));

    let err = orchestrator
        .generate_step(StepId(3), GenerateOptions::interactive())
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::UserDeclined { step: StepId(3) });
    assert!(harness.generator.calls().is_empty());
    assert_eq!(orchestrator.state_of(StepId(2)), GenerationState::Idle);
    assert_eq!(orchestrator.state_of(StepId(3)), GenerationState::Idle);
    assert_eq!(harness.ledger.balance(), 100);
}

#[tokio::test]
async fn strict_request_fails_with_missing_list() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(project_with(&[1]));

    let err = orchestrator
        .generate_step(StepId(4), GenerateOptions::strict())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GenerationError::UnsatisfiedDependencies {
            step: StepId(4),
            missing: ids(&[2, 3]),
        }
    );
    assert!(harness.gate.prompts().is_empty());
    assert!(harness.generator.calls().is_empty());
}

#[tokio::test]
async fn zero_credits_is_denied_before_the_generator() {
    let harness = Harness::new();
    let empty = Arc::new(CreditLedger::new(Some("studio".to_string()), 0));
    let orchestrator = harness.orchestrator_with_admission(project_with(&[]), empty);

    let err = orchestrator
        .generate_step(StepId(1), GenerateOptions::interactive())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GenerationError::InsufficientCredits {
            required: 1,
            available: 0
        }
    );
    assert!(harness.generator.calls().is_empty());
    assert_eq!(orchestrator.state_of(StepId(1)), GenerationState::Idle);
}

#[tokio::test]
async fn anonymous_user_is_not_authenticated() {
    let harness = Harness::new();
    let orchestrator =
        harness.orchestrator_with_admission(project_with(&[]), Arc::new(CreditLedger::anonymous()));

    let err = orchestrator
        .generate_step(StepId(1), GenerateOptions::strict())
        .await
        .unwrap_err();
    assert_eq!(err, GenerationError::NotAuthenticated);
    assert!(harness.generator.calls().is_empty());
}

#[tokio::test]
async fn empty_brief_is_rejected_for_interactive_requests() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(ProjectState::new("blank", "Blank", "   "));

    let err = orchestrator
        .generate_step(StepId(1), GenerateOptions::interactive())
        .await
        .unwrap_err();
    assert_eq!(err, GenerationError::EmptyInput);
    assert!(harness.generator.calls().is_empty());
}

#[tokio::test]
async fn concurrent_requests_for_one_step_call_the_generator_once() {
    let mut harness = Harness::new();
    harness.generator = ScriptedGenerator::with_delay(Duration::from_millis(50));
    let orchestrator = harness.orchestrator(project_with(&[1]));

    let (first, second) = tokio::join!(
        orchestrator.generate_step(StepId(2), GenerateOptions::strict()),
        orchestrator.generate_step(StepId(2), GenerateOptions::strict()),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    let deduplicated = outcomes
        .iter()
        .filter(|o| matches!(o, StepOutcome::AlreadyInFlight { .. }))
        .count();
    assert_eq!(deduplicated, 1);
    assert_eq!(harness.generator.call_count(2), 1);
    assert_eq!(harness.ledger.balance(), 99);
    assert_eq!(orchestrator.state_of(StepId(2)), GenerationState::Satisfied);
}

#[tokio::test]
async fn generator_failure_leaves_content_and_credits_untouched() {
    let harness = Harness::new();
    harness.generator.fail_step(2, 1);
    let orchestrator = harness.orchestrator(project_with(&[1]));

    let err = orchestrator
        .generate_step(StepId(2), GenerateOptions::strict())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GenerationError::GenerationFailed {
            step: StepId(2),
            source: GeneratorError::Provider(_)
        }
    ));
    assert_eq!(orchestrator.state_of(StepId(2)), GenerationState::Failed);
    assert!(orchestrator.content(StepId(2)).is_none());
    assert_eq!(harness.ledger.balance(), 100);
    assert!(harness.ledger.history().is_empty());

    // Failed is retryable.
    orchestrator
        .generate_step(StepId(2), GenerateOptions::strict())
        .await
        .unwrap();
    assert_eq!(orchestrator.state_of(StepId(2)), GenerationState::Satisfied);
    assert_eq!(harness.ledger.balance(), 99);
}

#[tokio::test]
async fn failed_dependency_aborts_the_chain() {
    let harness = Harness::new();
    harness.generator.fail_step(7, 1);
    let orchestrator = harness.orchestrator(project_with(&[1, 2, 3, 4, 5]));
    let mut events = harness.progress.subscribe();

    let err = orchestrator
        .generate_step(StepId(8), GenerateOptions::interactive())
        .await
        .unwrap_err();

    // One notice for the aborted target, carrying the dependency's failure.
    let errors = notices(&drain(&mut events), "error");
    assert_eq!(errors, vec![err.to_string()]);
    assert!(errors[0].contains("dependency 7 failed"));

    match err {
        GenerationError::DependencyGenerationFailed {
            step, dependency, ..
        } => {
            assert_eq!(step, StepId(8));
            assert_eq!(dependency, StepId(7));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.generator.calls(), ids(&[6, 7]));
    assert_eq!(orchestrator.state_of(StepId(6)), GenerationState::Satisfied);
    assert_eq!(orchestrator.state_of(StepId(8)), GenerationState::Idle);
}

#[tokio::test]
async fn shape_mismatch_is_a_generation_failure() {
    let harness = Harness::new();
    harness.generator.respond_with(7, json!(42));
    let orchestrator = harness.orchestrator(project_with(&[1, 2, 3, 4, 5]));

    let err = orchestrator
        .generate_step(StepId(7), GenerateOptions::strict())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerationError::GenerationFailed {
            source: GeneratorError::InvalidOutput(_),
            ..
        }
    ));
    assert!(orchestrator.content(StepId(7)).is_none());
    assert_eq!(harness.ledger.balance(), 100);
}

#[tokio::test]
async fn embedded_json_is_normalized_to_the_step_shape() {
    let harness = Harness::new();
    harness
        .generator
        .respond_with(5, json!("```json\n[{\"name\": \"Blue Bottle\"}]\n```"));
    let orchestrator = harness.orchestrator(project_with(&[1, 2, 3, 4]));

    orchestrator
        .generate_step(StepId(5), GenerateOptions::strict())
        .await
        .unwrap();
    assert_eq!(
        orchestrator.content(StepId(5)),
        Some(StepContent::List(vec![json!({ "name": "Blue Bottle" })]))
    );
}

#[tokio::test]
async fn timeout_marks_the_step_failed() {
    let mut harness = Harness::new();
    harness.generator = ScriptedGenerator::with_delay(Duration::from_millis(200));
    harness.settings = OrchestratorSettings {
        dependency_delay: Duration::ZERO,
        generation_timeout: Duration::from_millis(20),
    };
    let orchestrator = harness.orchestrator(project_with(&[]));

    let err = orchestrator
        .generate_step(StepId(1), GenerateOptions::strict())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerationError::GenerationFailed {
            source: GeneratorError::Timeout(_),
            ..
        }
    ));
    assert_eq!(orchestrator.state_of(StepId(1)), GenerationState::Failed);
    assert_eq!(harness.ledger.balance(), 100);
}

#[tokio::test]
async fn consumption_failure_keeps_content_and_warns() {
    let harness = Harness::new();
    let mut events = harness.progress.subscribe();
    let ledger = Arc::new(UnrecordableLedger {
        inner: CreditLedger::new(Some("studio".to_string()), 10),
    });
    let orchestrator = harness.orchestrator_with_admission(project_with(&[]), ledger);

    let outcome = orchestrator
        .generate_step(StepId(1), GenerateOptions::strict())
        .await
        .unwrap();

    let generated = outcome.generated().unwrap();
    assert!(matches!(
        generated.consumption,
        ConsumptionStatus::Failed { .. }
    ));
    assert_eq!(orchestrator.state_of(StepId(1)), GenerationState::Satisfied);

    let events = drain(&mut events);
    assert!(event_types(&events).contains(&"consumption_recording_failed".to_string()));
    let warnings = notices(&events, "warning");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("credits may be out of sync"));
    assert!(notices(&events, "error").is_empty());
}

#[tokio::test]
async fn persistence_failure_does_not_roll_back() {
    let mut harness = Harness::new();
    harness.persistence = RecordingPersistence::failing();
    let mut events = harness.progress.subscribe();
    let orchestrator = harness.orchestrator(project_with(&[]));

    orchestrator
        .generate_step(StepId(1), GenerateOptions::strict())
        .await
        .unwrap();

    assert!(orchestrator.content(StepId(1)).is_some());
    assert_eq!(harness.ledger.balance(), 99);
    assert!(event_types(&drain(&mut events)).contains(&"persistence_failed".to_string()));
}

#[tokio::test]
async fn every_successful_write_is_persisted() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(project_with(&[1]));

    orchestrator
        .generate_step(StepId(3), GenerateOptions::interactive())
        .await
        .unwrap();

    let saves = harness.persistence.saves();
    assert_eq!(saves.len(), 2);
    assert!(saves[0].content.has_content(StepId(2)));
    assert!(saves[1].content.has_content(StepId(3)));
}

#[tokio::test]
async fn regenerating_a_satisfied_step_overwrites_it() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(project_with(&[1]));
    assert_eq!(
        orchestrator.content(StepId(1)),
        Some(StepContent::Text("Existing market-overview".to_string()))
    );

    orchestrator
        .generate_step(StepId(1), GenerateOptions::interactive())
        .await
        .unwrap();
    assert_eq!(
        orchestrator.content(StepId(1)),
        Some(StepContent::Text("Generated market-overview".to_string()))
    );
    assert!(harness.gate.prompts().is_empty());
}

#[tokio::test]
async fn first_generation_is_flagged_initial() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(project_with(&[]));

    orchestrator
        .generate_step(StepId(2), GenerateOptions::interactive())
        .await
        .unwrap();

    let requests = harness.generator.requests();
    assert!(requests[0].is_initial);
    assert!(!requests[1].is_initial);
    assert_eq!(requests[1].prerequisite_content().len(), 1);
    assert_eq!(requests[1].brief, BRIEF);
}

#[tokio::test]
async fn silent_requests_emit_no_error_notices() {
    let harness = Harness::new();
    let mut events = harness.progress.subscribe();
    let orchestrator = harness.orchestrator(project_with(&[]));

    let err = orchestrator
        .generate_step(StepId(3), GenerateOptions::silent())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerationError::UnsatisfiedDependencies { .. }
    ));
    assert!(notices(&drain(&mut events), "error").is_empty());

    let err = orchestrator
        .generate_step(StepId(3), GenerateOptions::strict())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerationError::UnsatisfiedDependencies { .. }
    ));
    assert_eq!(notices(&drain(&mut events), "error").len(), 1);
}

#[tokio::test]
async fn lifecycle_events_are_emitted_in_order() {
    let harness = Harness::new();
    let mut events = harness.progress.subscribe();
    let orchestrator = harness.orchestrator(project_with(&[1]));

    orchestrator
        .generate_step(StepId(2), GenerateOptions::strict())
        .await
        .unwrap();

    let events = drain(&mut events);
    assert_eq!(
        event_types(&events),
        vec!["step_generation_started", "step_generation_completed"]
    );
    assert!(events.iter().all(|e| e.session == "acme"));
    assert!(events[0].seq < events[1].seq);
}
