//! Environment-variable option loading. The orchestrator never passes flags:
//! every invocation is parameterized entirely through the environment.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::RunOptions;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("DEVCONTAINER_RUN_OPTIONS is not valid JSON: {0}")]
    InvalidRunOptions(#[source] serde_json::Error),
}

fn required(name: &'static str) -> Result<String, OptionsError> {
    env::var(name).map_err(|_| OptionsError::Missing(name))
}

/// `DEVCONTAINER_ID` and `TARGET_DIR`, required by every subcommand.
pub struct CoreOptions {
    pub id: String,
    pub target_dir: PathBuf,
}

impl CoreOptions {
    pub fn load() -> Result<Self, OptionsError> {
        Ok(Self {
            id: required("DEVCONTAINER_ID")?,
            target_dir: PathBuf::from(required("TARGET_DIR")?),
        })
    }
}

/// `DEVCONTAINER_RUN_OPTIONS`, required by `run` and indirectly by `create`.
pub fn load_run_options() -> Result<RunOptions, OptionsError> {
    let raw = required("DEVCONTAINER_RUN_OPTIONS")?;
    serde_json::from_str(&raw).map_err(OptionsError::InvalidRunOptions)
}

/// `DEVCONTAINER_USER`, optional, empty string treated as unset.
pub fn user() -> Option<String> {
    env::var("DEVCONTAINER_USER")
        .ok()
        .filter(|s| !s.is_empty())
}

/// `DEVCONTAINER_COMMAND`, required by `command`.
pub fn command() -> Result<String, OptionsError> {
    required("DEVCONTAINER_COMMAND")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn core_options_requires_both_variables() {
        env::remove_var("DEVCONTAINER_ID");
        env::remove_var("TARGET_DIR");
        assert!(CoreOptions::load().is_err());

        env::set_var("DEVCONTAINER_ID", "w1");
        env::set_var("TARGET_DIR", "/tmp/rootbox-test");
        let opts = CoreOptions::load().unwrap();
        assert_eq!(opts.id, "w1");
        assert_eq!(opts.target_dir, PathBuf::from("/tmp/rootbox-test"));

        env::remove_var("DEVCONTAINER_ID");
        env::remove_var("TARGET_DIR");
    }

    #[test]
    #[serial]
    fn user_treats_empty_string_as_unset() {
        env::set_var("DEVCONTAINER_USER", "");
        assert_eq!(user(), None);
        env::remove_var("DEVCONTAINER_USER");
    }
}
