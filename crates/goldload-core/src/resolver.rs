//! Correlates a policy ID with the display name the agent logs for it.
//!
//! The agent announces each policy with a pair of lines in `jamf.log`:
//!
//! ```text
//! ... Checking for policy ID 42...
//! ... Executing Policy Install Foo
//! ```
//!
//! Scanning is forward-only over a [`LogTail`], and bounded by a timeout.

use std::time::Duration;

use crate::error::Result;
use crate::obs;
use crate::policy::{PolicyId, PolicyName};
use crate::tail::LogTail;

/// Prefix of the line that carries the policy's display name.
pub const NAME_PREFIX: &str = "Executing Policy ";

/// Default upper bound on waiting for the marker and name lines.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Marker line text for a policy ID.
pub fn marker_for(id: &PolicyId) -> String {
    format!("Checking for policy ID {id}...")
}

/// Extract the display name from an `Executing Policy` line.
pub fn extract_name(line: &str) -> Option<String> {
    line.split_once(NAME_PREFIX)
        .map(|(_, name)| name.trim_end().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    SeekingMarker,
    AwaitingName,
}

/// Line-at-a-time scanner for one policy's marker and name lines.
///
/// Kept outside the resolver's futures so that progress survives when a
/// wait is abandoned and resumed with [`PolicyNameResolver::drain`].
#[derive(Debug, Clone)]
pub struct NameScan {
    marker: String,
    state: ScanState,
}

impl NameScan {
    pub fn new(id: &PolicyId) -> Self {
        Self {
            marker: marker_for(id),
            state: ScanState::SeekingMarker,
        }
    }

    /// Whether the marker line has been seen.
    pub fn marker_seen(&self) -> bool {
        self.state == ScanState::AwaitingName
    }

    /// Feed one line; returns the name once the pair is complete.
    ///
    /// Lines between the marker and the name line are skipped rather than
    /// parsed as the name.
    pub fn feed(&mut self, line: &str) -> Option<String> {
        match self.state {
            ScanState::SeekingMarker => {
                if line.contains(&self.marker) {
                    self.state = ScanState::AwaitingName;
                }
                None
            }
            ScanState::AwaitingName => extract_name(line),
        }
    }
}

/// Resolves policy names from the live agent log.
#[derive(Debug, Clone)]
pub struct PolicyNameResolver {
    timeout: Duration,
}

impl Default for PolicyNameResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_TIMEOUT)
    }
}

impl PolicyNameResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait (up to the timeout) for the scan to complete.
    pub async fn resolve(
        &self,
        tail: &mut LogTail,
        id: &PolicyId,
        scan: &mut NameScan,
    ) -> Result<PolicyName> {
        match tokio::time::timeout(self.timeout, scan_until_named(tail, scan)).await {
            Ok(Ok(name)) => {
                obs::emit_name_resolved(id.as_str(), &name);
                Ok(PolicyName::Resolved(name))
            }
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => {
                obs::emit_name_unresolved(id.as_str(), "timeout", scan.marker_seen());
                Ok(PolicyName::Unresolved)
            }
        }
    }

    /// Consume only the lines already written, without waiting.
    ///
    /// Used once the agent has exited: anything it was going to log about
    /// the policy is already in the file.
    pub async fn drain(
        &self,
        tail: &mut LogTail,
        id: &PolicyId,
        scan: &mut NameScan,
    ) -> Result<PolicyName> {
        while let Some(line) = tail.try_next_line().await? {
            if let Some(name) = scan.feed(&line) {
                obs::emit_name_resolved(id.as_str(), &name);
                return Ok(PolicyName::Resolved(name));
            }
        }
        obs::emit_name_unresolved(id.as_str(), "agent_exited", scan.marker_seen());
        Ok(PolicyName::Unresolved)
    }
}

async fn scan_until_named(tail: &mut LogTail, scan: &mut NameScan) -> Result<String> {
    loop {
        let line = tail.next_line().await?;
        if let Some(name) = scan.feed(&line) {
            return Ok(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    const FAST_POLL: Duration = Duration::from_millis(5);

    fn id(raw: &str) -> PolicyId {
        PolicyId::new(raw).unwrap()
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_marker_text() {
        assert_eq!(marker_for(&id("42")), "Checking for policy ID 42...");
    }

    #[test]
    fn test_extract_name() {
        assert_eq!(
            extract_name("Mon Mar 18 10:00:01 mac jamf[123]: Executing Policy Install Foo"),
            Some("Install Foo".to_string())
        );
        assert_eq!(extract_name("Executing Policy Install Foo  "), Some("Install Foo".to_string()));
        assert_eq!(extract_name("Running script"), None);
    }

    #[test]
    fn test_scan_marker_then_name() {
        let mut scan = NameScan::new(&id("42"));
        assert_eq!(scan.feed("Checking for policy ID 42..."), None);
        assert!(scan.marker_seen());
        assert_eq!(
            scan.feed("Executing Policy Install Foo"),
            Some("Install Foo".to_string())
        );
    }

    #[test]
    fn test_scan_ignores_other_policy_ids() {
        let mut scan = NameScan::new(&id("4"));
        // "ID 4..." is not a substring of "ID 42..."
        assert_eq!(scan.feed("Checking for policy ID 42..."), None);
        assert!(!scan.marker_seen());
        assert_eq!(scan.feed("Executing Policy Wrong One"), None);
    }

    #[test]
    fn test_scan_skips_interleaved_lines() {
        let mut scan = NameScan::new(&id("7"));
        scan.feed("Checking for policy ID 7...");
        assert_eq!(scan.feed("Checking for patches..."), None);
        assert_eq!(scan.feed("Executing Policy Office"), Some("Office".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_from_live_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "Checking for policy ID 42...\nExecuting Policy Stale\n").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        append(
            &path,
            "Checking for policy ID 42...\nExecuting Policy Install Foo\n",
        );

        let resolver = PolicyNameResolver::new(Duration::from_secs(5));
        let mut scan = NameScan::new(&id("42"));
        let name = resolver.resolve(&mut tail, &id("42"), &mut scan).await.unwrap();
        assert_eq!(name, PolicyName::Resolved("Install Foo".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_times_out_to_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        append(&path, "Checking for policy ID 99...\n");

        let resolver = PolicyNameResolver::new(Duration::from_millis(50));
        let mut scan = NameScan::new(&id("42"));
        let name = resolver.resolve(&mut tail, &id("42"), &mut scan).await.unwrap();
        assert_eq!(name, PolicyName::Unresolved);
    }

    #[tokio::test]
    async fn test_drain_resumes_partial_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jamf.log");
        std::fs::write(&path, "").unwrap();

        let mut tail = LogTail::open(&path, FAST_POLL).await.unwrap();
        let resolver = PolicyNameResolver::new(Duration::from_secs(5));
        let mut scan = NameScan::new(&id("3"));

        append(&path, "Checking for policy ID 3...\n");
        assert_eq!(resolver.drain(&mut tail, &id("3"), &mut scan).await.unwrap(), PolicyName::Unresolved);
        assert!(scan.marker_seen());

        append(&path, "Executing Policy Dock Setup\n");
        assert_eq!(
            resolver.drain(&mut tail, &id("3"), &mut scan).await.unwrap(),
            PolicyName::Resolved("Dock Setup".to_string())
        );
    }
}
