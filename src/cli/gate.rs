//! Terminal confirmation: yes/no prompt on a blocking thread.

use crate::confirmation::{Confirmation, ConfirmationGate, ConfirmationPrompt};
use async_trait::async_trait;
use dialoguer::Confirm;
use tracing::warn;

#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalGate;

#[async_trait]
impl ConfirmationGate for TerminalGate {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> Confirmation {
        let message = prompt.message();
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(message)
                .default(true)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(true)) => Confirmation::Accepted,
            Ok(Ok(false)) => Confirmation::Declined,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read confirmation; declining");
                Confirmation::Declined
            }
            Err(e) => {
                warn!(error = %e, "Confirmation prompt task failed; declining");
                Confirmation::Declined
            }
        }
    }
}
