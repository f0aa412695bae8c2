//! Target environment and run trigger

use serde::{Deserialize, Serialize};

/// Environment a run deploys to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
}

impl Environment {
    /// The only branch that deploys to production
    pub const PRODUCTION_BRANCH: &'static str = "main";

    /// Resolves the target environment for a branch
    ///
    /// `main` maps to production, every other branch name (including the
    /// empty string) maps to staging.
    pub fn from_branch(branch: &str) -> Self {
        if branch == Self::PRODUCTION_BRANCH {
            Environment::Production
        } else {
            Environment::Staging
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// A plain branch build
    Branch,
    /// A pull request (change request) build
    ChangeRequest { id: String },
}

impl Trigger {
    /// Derives the trigger from the CI change id
    ///
    /// CI servers only export a change id for pull request builds, so its
    /// presence is what marks a change request. Blank ids are ignored.
    pub fn from_change_id(change_id: Option<&str>) -> Self {
        match change_id.map(str::trim) {
            Some(id) if !id.is_empty() => Trigger::ChangeRequest { id: id.to_string() },
            _ => Trigger::Branch,
        }
    }

    pub fn is_change_request(&self) -> bool {
        matches!(self, Trigger::ChangeRequest { .. })
    }
}
