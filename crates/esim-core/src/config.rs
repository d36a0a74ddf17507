//! Engine configuration.
//!
//! Geometry is fixed by the `esim-types` constants and is not configurable.
//! Only behavioral knobs live here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What `create_file` leaves behind when data blocks were found but no block
/// is left for the indirect pointer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndirectionFailurePolicy {
    /// Nothing is mutated; the call fails as if it never started.
    #[default]
    Atomic,
    /// The data blocks destined for direct slots stay marked in the block
    /// bitmap with no owner. The inode stays free.
    LeakDirectBlocks,
}

impl IndirectionFailurePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::LeakDirectBlocks => "leak_direct_blocks",
        }
    }
}

impl fmt::Display for IndirectionFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndirectionFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atomic" => Ok(Self::Atomic),
            "leak" | "leak_direct_blocks" => Ok(Self::LeakDirectBlocks),
            other => Err(format!(
                "unknown indirection failure policy {other:?} (expected atomic or leak)"
            )),
        }
    }
}

/// Behavioral options for an [`AllocEngine`](crate::AllocEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub indirection_failure: IndirectionFailurePolicy,
    /// Append rejected operations to the history log as well.
    pub record_rejections: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict() {
        let config = EngineConfig::default();
        assert_eq!(config.indirection_failure, IndirectionFailurePolicy::Atomic);
        assert!(!config.record_rejections);
    }

    #[test]
    fn policy_parses_aliases() {
        assert_eq!("atomic".parse(), Ok(IndirectionFailurePolicy::Atomic));
        assert_eq!("leak".parse(), Ok(IndirectionFailurePolicy::LeakDirectBlocks));
        assert_eq!(
            "leak_direct_blocks".parse(),
            Ok(IndirectionFailurePolicy::LeakDirectBlocks)
        );
        assert!("rollback".parse::<IndirectionFailurePolicy>().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"record_rejections":true}"#).unwrap();
        assert!(config.record_rejections);
        assert_eq!(config.indirection_failure, IndirectionFailurePolicy::Atomic);

        let json = serde_json::to_string(&EngineConfig {
            indirection_failure: IndirectionFailurePolicy::LeakDirectBlocks,
            record_rejections: false,
        })
        .unwrap();
        assert!(json.contains("\"leak_direct_blocks\""));
    }
}
