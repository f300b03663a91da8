//! Step scripts
//!
//! The CLI takes its transitions as positional `kind:id` steps, e.g.
//! `preload:Level2 add:Title switch:Level2 revertable:Menu revert`.

use crate::error::DriverError;
use std::fmt;
use std::str::FromStr;

/// One scripted action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Start preloading a workspace
    Preload(String),
    /// Finalize a preload (or load fresh) and make it active
    Load(String),
    /// Load a workspace next to the current ones
    Add(String),
    /// Switch away from the current workspace
    Switch { id: String, wait_unload: bool },
    /// Switch keeping the current workspace for a revert
    Revertable(String),
    /// Undo the pending revertable switch
    Revert,
    /// Keep the pending revertable switch
    Commit,
    /// Reload the current workspace
    Reload,
}

impl Step {
    /// Parse every argument, failing on the first bad one
    pub fn parse_all<I, S>(args: I) -> Result<Vec<Step>, DriverError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter().map(|arg| arg.as_ref().parse()).collect()
    }
}

impl FromStr for Step {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DriverError::InvalidStep(s.to_string());

        let (kind, id) = match s.split_once(':') {
            Some((kind, id)) => {
                let id = id.trim();
                if id.is_empty() {
                    return Err(invalid());
                }
                (kind, Some(id.to_string()))
            }
            None => (s, None),
        };

        match (kind, id) {
            ("preload", Some(id)) => Ok(Step::Preload(id)),
            ("load", Some(id)) => Ok(Step::Load(id)),
            ("add", Some(id)) => Ok(Step::Add(id)),
            ("switch", Some(id)) => Ok(Step::Switch { id, wait_unload: true }),
            ("switch-nowait", Some(id)) => Ok(Step::Switch { id, wait_unload: false }),
            ("revertable", Some(id)) => Ok(Step::Revertable(id)),
            ("revert", None) => Ok(Step::Revert),
            ("commit", None) => Ok(Step::Commit),
            ("reload", None) => Ok(Step::Reload),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Preload(id) => write!(f, "preload:{}", id),
            Step::Load(id) => write!(f, "load:{}", id),
            Step::Add(id) => write!(f, "add:{}", id),
            Step::Switch { id, wait_unload: true } => write!(f, "switch:{}", id),
            Step::Switch { id, wait_unload: false } => write!(f, "switch-nowait:{}", id),
            Step::Revertable(id) => write!(f, "revertable:{}", id),
            Step::Revert => f.write_str("revert"),
            Step::Commit => f.write_str("commit"),
            Step::Reload => f.write_str("reload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_steps() {
        let steps = Step::parse_all(["preload:Level2", "add:Title", "switch-nowait:Level2", "revert"]).unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Preload("Level2".into()),
                Step::Add("Title".into()),
                Step::Switch {
                    id: "Level2".into(),
                    wait_unload: false
                },
                Step::Revert,
            ]
        );
    }

    #[test]
    fn test_ids_may_contain_paths() {
        assert_eq!(
            "switch:levels/level2".parse::<Step>().unwrap(),
            Step::Switch {
                id: "levels/level2".into(),
                wait_unload: true
            }
        );
    }

    #[test]
    fn test_rejects_malformed_steps() {
        for bad in ["switch", "switch:", "revert:Level1", "jump:Level1", ""] {
            assert!(bad.parse::<Step>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_display_matches_input() {
        for input in ["load:X", "switch:Y", "switch-nowait:Z", "revertable:Menu", "commit", "reload"] {
            assert_eq!(input.parse::<Step>().unwrap().to_string(), input);
        }
    }
}
