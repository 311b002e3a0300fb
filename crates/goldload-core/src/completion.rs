//! Final summary shown once every policy has run.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::policy::PolicyId;
use crate::relay::RelayCommand;
use crate::runner::{RunOutputs, RunResult};
use crate::workflow::Workflow;

/// A failed policy as listed in the run-log summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPolicy {
    pub id: PolicyId,
    /// Resolved name, or the `policy <id>` fallback.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "failed", rename_all = "snake_case")]
pub enum CompletionState {
    AllSucceeded,
    SomeFailed(Vec<FailedPolicy>),
}

impl CompletionState {
    /// Depends only on whether any record failed, not on order.
    pub fn from_result(result: &RunResult) -> Self {
        if result.all_succeeded() {
            return CompletionState::AllSucceeded;
        }
        CompletionState::SomeFailed(
            result
                .failed_records()
                .map(|r| FailedPolicy {
                    id: r.id.clone(),
                    name: r.display_name(),
                })
                .collect(),
        )
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, CompletionState::AllSucceeded)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompletionState::AllSucceeded => "all_succeeded",
            CompletionState::SomeFailed(_) => "some_failed",
        }
    }

    /// Commands that turn the DEPNotify window into the final screen.
    pub fn relay_commands(&self, workflow: Workflow, caution_icon: &Path) -> Vec<RelayCommand> {
        match self {
            CompletionState::AllSucceeded => vec![
                RelayCommand::DeterminateOffReset,
                RelayCommand::Status(String::new()),
                RelayCommand::MainTitle(workflow.complete_title()),
                RelayCommand::ContinueButtonRestart("Restart".to_string()),
                RelayCommand::MainText(workflow.success_text()),
            ],
            CompletionState::SomeFailed(_) => vec![
                RelayCommand::DeterminateOffReset,
                RelayCommand::Image(caution_icon.to_path_buf()),
                RelayCommand::Status(format!("Check {} Log..", workflow.log_title())),
                RelayCommand::MainTitle(workflow.errors_title()),
                RelayCommand::ContinueButtonRestart("Restart".to_string()),
                RelayCommand::MainText(workflow.failure_text()),
            ],
        }
    }

    /// Run-log lines listing what failed (empty when nothing did).
    pub fn run_log_lines(&self) -> Vec<String> {
        match self {
            CompletionState::AllSucceeded => Vec::new(),
            CompletionState::SomeFailed(failed) => {
                let mut lines = vec!["The following policies failed:".to_string()];
                lines.extend(failed.iter().map(|f| format!("{}: {}", f.id, f.name)));
                lines
            }
        }
    }

    /// Write the summary to both outputs.
    pub fn publish(
        &self,
        workflow: Workflow,
        caution_icon: &Path,
        outputs: &mut RunOutputs,
    ) -> Result<()> {
        let lines = self.run_log_lines();
        outputs.run_log.write_all(lines.iter().map(String::as_str))?;
        outputs
            .relay
            .send_all(&self.relay_commands(workflow, caution_icon))?;
        outputs.flush()
    }
}
