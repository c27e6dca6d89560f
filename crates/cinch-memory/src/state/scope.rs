//! The four disjoint state namespaces.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MemoryError;

/// A state namespace. Keys in different scopes never see each other; there
/// is no fallback from a narrow scope to a wider one.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    #[default]
    Workflow,
    Agent,
    Task,
}

impl Scope {
    /// Every scope, in declaration order.
    pub const ALL: [Scope; 4] = [Scope::Global, Scope::Workflow, Scope::Agent, Scope::Task];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Workflow => "workflow",
            Scope::Agent => "agent",
            Scope::Task => "task",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .into_iter()
            .find(|scope| scope.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MemoryError::UnknownScope(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_display() {
        for scope in Scope::ALL {
            assert_eq!(scope.to_string().parse::<Scope>().unwrap(), scope);
        }
        assert_eq!("TASK".parse::<Scope>().unwrap(), Scope::Task);
    }

    #[test]
    fn unknown_scope_is_error() {
        let err = "session".parse::<Scope>().unwrap_err();
        assert!(matches!(err, MemoryError::UnknownScope(ref s) if s == "session"));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Scope::Agent).unwrap(), "\"agent\"");
        let parsed: Scope = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(parsed, Scope::Global);
    }

    #[test]
    fn default_is_workflow() {
        assert_eq!(Scope::default(), Scope::Workflow);
    }
}
