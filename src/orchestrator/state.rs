//! Per-step generation state.
//!
//! Tracks which steps have an attempt outstanding and which failed last. At most one
//! attempt per step is in flight at any time; [`StepStateTracker::try_begin`] is the
//! only way to start one.

use crate::step::StepId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// No content and nothing running
    Idle,
    /// Holds usable content
    Satisfied,
    /// A generation call is outstanding
    InFlight,
    /// The last attempt errored; content unchanged
    Failed,
}

impl GenerationState {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationState::Idle => "idle",
            GenerationState::Satisfied => "satisfied",
            GenerationState::InFlight => "in_flight",
            GenerationState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    InFlight,
    Failed,
}

#[derive(Debug, Default)]
pub struct StepStateTracker {
    attempts: Mutex<HashMap<StepId, Attempt>>,
}

impl StepStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark `step` in flight. `None` if an attempt is already outstanding.
    pub fn try_begin(&self, step: StepId) -> Option<InFlightGuard<'_>> {
        let mut attempts = self.attempts.lock();
        if attempts.get(&step) == Some(&Attempt::InFlight) {
            return None;
        }
        attempts.insert(step, Attempt::InFlight);
        Some(InFlightGuard {
            tracker: self,
            step,
            settled: false,
        })
    }

    pub fn is_in_flight(&self, step: StepId) -> bool {
        self.attempts.lock().get(&step) == Some(&Attempt::InFlight)
    }

    /// Observable state, given whether the step currently holds usable content.
    pub fn state(&self, step: StepId, has_content: bool) -> GenerationState {
        match self.attempts.lock().get(&step) {
            Some(Attempt::InFlight) => GenerationState::InFlight,
            _ if has_content => GenerationState::Satisfied,
            Some(Attempt::Failed) => GenerationState::Failed,
            None => GenerationState::Idle,
        }
    }

    fn settle(&self, step: StepId, next: Option<Attempt>) {
        let mut attempts = self.attempts.lock();
        match next {
            Some(attempt) => {
                attempts.insert(step, attempt);
            }
            None => {
                attempts.remove(&step);
            }
        }
    }
}

/// Holds the in-flight slot for one step until settled.
///
/// Dropping an unsettled guard (cancelled or panicked attempt) records `Failed`, which
/// releases the slot so the step can be retried.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    tracker: &'a StepStateTracker,
    step: StepId,
    settled: bool,
}

impl InFlightGuard<'_> {
    pub fn step(&self) -> StepId {
        self.step
    }

    /// Content was written.
    pub fn succeed(mut self) {
        self.settled = true;
        self.tracker.settle(self.step, None);
    }

    /// The attempt errored.
    pub fn fail(mut self) {
        self.settled = true;
        self.tracker.settle(self.step, Some(Attempt::Failed));
    }

    /// The attempt never reached the generator (e.g. admission denied).
    pub fn release(mut self) {
        self.settled = true;
        self.tracker.settle(self.step, None);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(step = %self.step, "Generation attempt abandoned; marking failed");
            self.tracker.settle(self.step, Some(Attempt::Failed));
        }
    }
}
