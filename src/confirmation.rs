//! Confirmation Gate
//!
//! Yes/no decision requested before missing prerequisites are generated on the
//! interactive path. Each request carries its own reply channel, so concurrent
//! requests never share state.

use crate::step::{StepDefinition, StepId};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Accepted,
    Declined,
}

/// What the user is asked to approve.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationPrompt {
    pub target: StepDefinition,
    /// Steps that will be generated first, in generation order
    pub missing: Vec<StepDefinition>,
}

impl ConfirmationPrompt {
    pub fn missing_ids(&self) -> Vec<StepId> {
        self.missing.iter().map(|step| step.id).collect()
    }

    pub fn message(&self) -> String {
        let labels: Vec<&str> = self.missing.iter().map(|step| step.label.as_str()).collect();
        format!(
            "\"{}\" needs {} earlier step(s) first: {}. Generate them now?",
            self.target.label,
            labels.len(),
            labels.join(", ")
        )
    }
}

#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> Confirmation;
}

/// Gate with a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoConfirm {
    Accept,
    Decline,
}

#[async_trait]
impl ConfirmationGate for AutoConfirm {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> Confirmation {
        debug!(target_step = %prompt.target.id, answer = ?self, "Auto-answering confirmation");
        match self {
            AutoConfirm::Accept => Confirmation::Accepted,
            AutoConfirm::Decline => Confirmation::Declined,
        }
    }
}

/// A confirmation waiting for an answer from the UI side.
#[derive(Debug)]
pub struct PendingConfirmation {
    pub prompt: ConfirmationPrompt,
    responder: oneshot::Sender<Confirmation>,
}

impl PendingConfirmation {
    pub fn respond(self, answer: Confirmation) {
        // The requester may have gone away; nothing to do then.
        let _ = self.responder.send(answer);
    }

    pub fn accept(self) {
        self.respond(Confirmation::Accepted)
    }

    pub fn decline(self) {
        self.respond(Confirmation::Declined)
    }
}

/// Gate that forwards prompts over a channel to whoever renders them.
#[derive(Debug, Clone)]
pub struct ChannelGate {
    sender: mpsc::Sender<PendingConfirmation>,
}

impl ChannelGate {
    pub fn new_pair(buffer: usize) -> (Self, mpsc::Receiver<PendingConfirmation>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ConfirmationGate for ChannelGate {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> Confirmation {
        let (responder, answer) = oneshot::channel();
        let pending = PendingConfirmation {
            prompt: prompt.clone(),
            responder,
        };
        if self.sender.send(pending).await.is_err() {
            debug!("Confirmation channel closed; treating as declined");
            return Confirmation::Declined;
        }
        // A dropped responder means nobody will answer.
        answer.await.unwrap_or(Confirmation::Declined)
    }
}
