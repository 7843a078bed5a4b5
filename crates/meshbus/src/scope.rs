//! # Delivery Scopes
//!
//! How far an emitted event or request should travel.

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target scope for an event or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// This node only.
    Immediate,
    /// Nodes reachable over local-only edges.
    Local,
    /// This node plus directly adjacent nodes.
    #[serde(alias = "neighbors")]
    Neighbours,
    /// The closest handling node.
    Nearest,
    /// Every known node.
    Global,
}

impl Scope {
    /// Wire name of the scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Local => "local",
            Self::Neighbours => "neighbours",
            Self::Nearest => "nearest",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Self::Immediate),
            "local" => Ok(Self::Local),
            "neighbours" | "neighbors" => Ok(Self::Neighbours),
            "nearest" => Ok(Self::Nearest),
            "global" => Ok(Self::Global),
            other => Err(GraphError::InvalidScope(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_scopes() {
        assert_eq!("immediate".parse::<Scope>().unwrap(), Scope::Immediate);
        assert_eq!("local".parse::<Scope>().unwrap(), Scope::Local);
        assert_eq!("neighbours".parse::<Scope>().unwrap(), Scope::Neighbours);
        assert_eq!("neighbors".parse::<Scope>().unwrap(), Scope::Neighbours);
        assert_eq!("nearest".parse::<Scope>().unwrap(), Scope::Nearest);
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
    }

    #[test]
    fn test_unknown_scope_rejected() {
        assert_eq!(
            "galaxy".parse::<Scope>(),
            Err(GraphError::InvalidScope("galaxy".into()))
        );
    }
}
