//! goldload core library
//!
//! Runs Jamf policies in sequence, correlates each run with the policy name
//! the agent writes to its log, and reports progress to DEPNotify.

pub mod agent;
pub mod classify;
pub mod cleanup;
pub mod completion;
pub mod config;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod policy;
pub mod prepare;
pub mod relay;
pub mod resolver;
pub mod run_log;
pub mod runner;
pub mod session;
pub mod tail;
pub mod telemetry;
pub mod workflow;

pub use agent::{AgentOutput, JamfAgent, ManagementAgent};
pub use cleanup::{Cleanup, CleanupConfig, CleanupReport};
pub use completion::{CompletionState, FailedPolicy};
pub use config::ProvisionConfig;
pub use error::{GoldloadError, Result};
pub use policy::{parse_policy_list, PolicyCategory, PolicyId, PolicyName, PolicyRecord};
pub use prepare::{rotate, Rotation};
pub use relay::{RelayCommand, RelayWriter};
pub use resolver::PolicyNameResolver;
pub use run_log::RunLog;
pub use runner::{PolicyRunner, RunOutputs, RunPlan, RunResult};
pub use session::{ProvisionReport, Provisioner};
pub use tail::LogTail;
pub use telemetry::init_tracing;
pub use workflow::Workflow;
