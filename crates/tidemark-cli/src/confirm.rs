//! Interactive confirmation prompt

use console::style;
use inquire::Confirm;
use tidemark_kube::{ConfirmationRequest, Confirmer, KubeError};

/// Asks on the terminal, defaulting to "no"
pub struct InquireConfirmer;

impl Confirmer for InquireConfirmer {
    fn confirm(&self, request: &ConfirmationRequest) -> tidemark_kube::Result<bool> {
        if request.decision.is_downgrade() {
            eprintln!(
                "{} Version {} is older than the installed {}",
                style("⚠").yellow().bold(),
                request.target,
                request.current
            );
        }

        let help = format!("Installation namespace: {}", request.namespace);
        Confirm::new(&request.prompt())
            .with_default(false)
            .with_help_message(&help)
            .prompt()
            .map_err(|e| KubeError::Prompt(e.to_string()))
    }
}
