//! Structured lifecycle events for provisioning runs.
//!
//! Events carry an `event = "..."` field so they can be filtered out of the
//! JSON log stream. Verbosity follows `RUST_LOG`.

use tracing::{info, warn};

/// Span tagged with the run id; instrument the session future with it.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("goldload.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, workflow: &str, visible: usize, silent: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        workflow = %workflow,
        visible = visible,
        silent = silent,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, total: usize, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        total = total,
        failed = failed,
        success = failed == 0,
    );
}

pub fn emit_policy_finished(policy_id: &str, category: &str, exit_code: i32, name_resolved: bool) {
    info!(
        event = "policy.finished",
        policy_id = %policy_id,
        category = %category,
        exit_code = exit_code,
        name_resolved = name_resolved,
    );
}

pub fn emit_name_resolved(policy_id: &str, name: &str) {
    info!(event = "name.resolved", policy_id = %policy_id, name = %name);
}

/// Resolution gave up; the fallback name will be shown.
pub fn emit_name_unresolved(policy_id: &str, reason: &str, marker_seen: bool) {
    warn!(
        event = "name.unresolved",
        policy_id = %policy_id,
        reason = %reason,
        marker_seen = marker_seen,
    );
}

pub fn emit_completion(run_id: &str, state: &str, failed: usize) {
    info!(event = "run.completion", run_id = %run_id, state = %state, failed = failed);
}

pub fn emit_cleanup_step_failed(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "cleanup.step_failed", step = %step, error = %error);
}
