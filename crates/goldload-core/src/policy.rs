//! Policy identifiers, categories and per-policy records.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GoldloadError, Result};

/// Opaque Jamf policy identifier.
///
/// Never empty and never contains whitespace or commas, since those are the
/// list delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c == ',') {
            return Err(GoldloadError::InvalidPolicyId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PolicyId {
    type Err = GoldloadError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for PolicyId {
    type Error = GoldloadError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PolicyId> for String {
    fn from(id: PolicyId) -> Self {
        id.0
    }
}

/// Parse a comma and/or whitespace delimited policy list.
///
/// Order is preserved. An empty or blank input yields an empty list.
pub fn parse_policy_list(raw: &str) -> Result<Vec<PolicyId>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(PolicyId::new)
        .collect()
}

/// Reject a run whose lists mention the same policy twice.
pub fn ensure_unique<'a>(ids: impl IntoIterator<Item = &'a PolicyId>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(GoldloadError::DuplicatePolicyId(id.to_string()));
        }
    }
    Ok(())
}

/// Whether a policy's progress is shown to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    /// Software installs that advance the DEPNotify progress bar.
    UserVisible,
    /// Security and configuration policies run after the visible ones.
    Silent,
}

impl PolicyCategory {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyCategory::UserVisible => "user_visible",
            PolicyCategory::Silent => "silent",
        }
    }
}

/// Display name of a policy as announced in the agent log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyName {
    Resolved(String),
    /// The marker line never showed up before the resolver gave up.
    Unresolved,
}

impl PolicyName {
    pub fn is_resolved(&self) -> bool {
        matches!(self, PolicyName::Resolved(_))
    }

    /// Text used in run-log and relay messages.
    pub fn display_for(&self, id: &PolicyId) -> String {
        match self {
            PolicyName::Resolved(name) => name.clone(),
            PolicyName::Unresolved => format!("policy {id}"),
        }
    }
}

/// A single policy execution, finalized once classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: PolicyId,
    pub category: PolicyCategory,
    pub name: PolicyName,
    /// Agent exit code (`-1` when the agent could not be run to completion).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl PolicyRecord {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn display_name(&self) -> String {
        self.name.display_for(&self.id)
    }
}
