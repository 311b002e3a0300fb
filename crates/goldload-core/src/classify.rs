//! Outcome classification.
//!
//! Classification is a pure function of the finalized record; the runner
//! applies the returned writes to the run log and the relay file.

use crate::policy::{PolicyCategory, PolicyRecord};
use crate::relay::RelayCommand;

/// Writes produced by classifying one record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
    pub run_log: Vec<String>,
    pub relay: Vec<RelayCommand>,
    /// Whether the policy belongs in the run's failed set.
    pub failed: bool,
}

pub fn classify(record: &PolicyRecord) -> Classification {
    let name = record.display_name();

    if !record.succeeded() {
        // Same handling for both categories: failures only surface to the
        // user through the completion summary.
        let mut run_log = vec![format!("Policy {name} failed to run")];
        if !record.stderr.is_empty() {
            run_log.push(record.stderr.clone());
        }
        return Classification {
            run_log,
            relay: Vec::new(),
            failed: true,
        };
    }

    match record.category {
        PolicyCategory::UserVisible => Classification {
            run_log: Vec::new(),
            relay: vec![
                RelayCommand::Status(format!("Successfully Installed {name}")),
                RelayCommand::DeterminateManualStep,
            ],
            failed: false,
        },
        PolicyCategory::Silent => {
            let line = format!("Policy: {name} ran successfully!");
            Classification {
                run_log: vec![line.clone()],
                relay: vec![RelayCommand::Status(line)],
                failed: false,
            }
        }
    }
}
