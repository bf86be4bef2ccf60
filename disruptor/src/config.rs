//! Runtime configuration, read from the environment.
use crate::drain::DrainSettings;
use crate::error::{self, Result};
use models::constants::{DEFAULT_DRAIN_POLL_INTERVAL, DEFAULT_DRAIN_TIMEOUT};
use models::node::TaintIgnoreList;

use snafu::ResultExt;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::{event, Level};

// Path to a JSON document holding the taint ignore-list.
const TAINTS_IGNORE_LIST_ENV_VAR: &str = "CHAOS_TAINTS_IGNORE_LIST";
const DRAIN_TIMEOUT_ENV_VAR: &str = "DRAIN_TIMEOUT_SECONDS";
const DRAIN_POLL_INTERVAL_ENV_VAR: &str = "DRAIN_POLL_INTERVAL_SECONDS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisruptorConfig {
    pub ignore_list_path: Option<PathBuf>,
    pub drain_timeout: Duration,
    pub drain_poll_interval: Duration,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        DisruptorConfig {
            ignore_list_path: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
        }
    }
}

impl DisruptorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_env_values(
            env::var(TAINTS_IGNORE_LIST_ENV_VAR).ok(),
            env::var(DRAIN_TIMEOUT_ENV_VAR).ok(),
            env::var(DRAIN_POLL_INTERVAL_ENV_VAR).ok(),
        )
    }

    /// Builds the configuration from raw environment values. Unset or empty values take their
    /// defaults.
    pub fn from_env_values(
        ignore_list_path: Option<String>,
        drain_timeout: Option<String>,
        drain_poll_interval: Option<String>,
    ) -> Result<Self> {
        Ok(DisruptorConfig {
            ignore_list_path: non_empty(ignore_list_path).map(PathBuf::from),
            drain_timeout: seconds_from_env_value(
                DRAIN_TIMEOUT_ENV_VAR,
                drain_timeout,
                DEFAULT_DRAIN_TIMEOUT,
            )?,
            drain_poll_interval: seconds_from_env_value(
                DRAIN_POLL_INTERVAL_ENV_VAR,
                drain_poll_interval,
                DEFAULT_DRAIN_POLL_INTERVAL,
            )?,
        })
    }

    /// The configured ignore-list, or an empty one if no document was configured.
    pub fn ignore_list(&self) -> Result<TaintIgnoreList> {
        match &self.ignore_list_path {
            Some(path) => load_ignore_list(path),
            None => Ok(TaintIgnoreList::default()),
        }
    }

    pub fn drain_settings(&self, delete_pods_with_local_storage: bool) -> DrainSettings {
        DrainSettings {
            delete_pods_with_local_storage,
            timeout: self.drain_timeout,
            poll_interval: self.drain_poll_interval,
        }
    }
}

/// Reads a taint ignore-list document from `path`.
pub fn load_ignore_list(path: &Path) -> Result<TaintIgnoreList> {
    let document = fs::read_to_string(path).context(error::ReadIgnoreListSnafu {
        path: path.display().to_string(),
    })?;
    let ignore_list =
        TaintIgnoreList::from_json_str(&document).context(error::ParseIgnoreListSnafu {
            path: path.display().to_string(),
        })?;

    event!(
        Level::DEBUG,
        "Loaded {} taint(s) to ignore from '{}'",
        ignore_list.len(),
        path.display()
    );
    Ok(ignore_list)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn seconds_from_env_value(
    env_var: &str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration> {
    match non_empty(value) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .context(error::ParseEnvSnafu {
                env_var,
                env_value: value.as_str(),
            }),
        None => Ok(default),
    }
}
