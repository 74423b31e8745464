use crate::error::ProcessError;
use crate::poll::PollConfig;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the launching side waits for a forked worker's init phase to resolve
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeConfig {
    /// First sleep between handshake checks (in microseconds)
    #[serde(default = "default_min_poll_us")]
    pub min_poll_us: u64,

    /// Upper bound the check interval doubles up to (in microseconds)
    #[serde(default = "default_max_poll_us")]
    pub max_poll_us: u64,

    /// Give up after this long (in milliseconds); `None` waits for as long as the worker lives
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Whether to notice a worker that died before firing either handshake event
    #[serde(default = "default_detect_child_exit")]
    pub detect_child_exit: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            min_poll_us: default_min_poll_us(),
            max_poll_us: default_max_poll_us(),
            timeout_ms: None,
            detect_child_exit: default_detect_child_exit(),
        }
    }
}

impl HandshakeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default polling with a hard timeout, rounded up to whole milliseconds
    pub fn bounded(timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        Self {
            timeout_ms: Some(u64::try_from(millis).unwrap_or(u64::MAX)),
            ..Self::default()
        }
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.min_poll_us == 0 {
            return Err(ProcessError::InvalidConfig(
                "min_poll_us must be greater than zero".to_string(),
            ));
        }

        if self.min_poll_us > self.max_poll_us {
            return Err(ProcessError::InvalidConfig(
                "min_poll_us cannot be greater than max_poll_us".to_string(),
            ));
        }

        if self.max_poll_us > 1_000_000 {
            return Err(ProcessError::InvalidConfig(
                "max_poll_us should not exceed one second".to_string(),
            ));
        }

        Ok(())
    }

    pub fn poll(&self) -> PollConfig {
        PollConfig {
            min_interval: Duration::from_micros(self.min_poll_us),
            max_interval: Duration::from_micros(self.max_poll_us),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Construction-time settings of one worker process
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), default, build_fn(validate = "Self::validate"))]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    /// Instance name; empty is allowed and still distinct from every non-empty name
    #[serde(default)]
    pub name: String,

    /// Run the worker in a forked child (true) or synchronously in the caller (false)
    #[serde(default = "default_fork_enabled")]
    pub fork_enabled: bool,

    #[serde(default)]
    pub handshake: HandshakeConfig,

    /// Unlink the single-use handshake events once `start()` has observed one of them
    #[serde(default = "default_reclaim_handshake")]
    pub reclaim_handshake: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            fork_enabled: default_fork_enabled(),
            handshake: HandshakeConfig::default(),
            reclaim_handshake: default_reclaim_handshake(),
        }
    }
}

impl ProcessConfig {
    pub fn builder() -> ProcessConfigBuilder {
        ProcessConfigBuilder::default()
    }

    /// Forking worker with the given instance name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Worker that runs synchronously inside `start()`
    pub fn inline(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fork_enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ProcessError> {
        self.handshake.validate()
    }
}

impl ProcessConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match &self.handshake {
            Some(handshake) => handshake.validate().map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}

// Default value functions for serde
fn default_min_poll_us() -> u64 {
    10
}
fn default_max_poll_us() -> u64 {
    1_000
}
fn default_detect_child_exit() -> bool {
    true
}
fn default_fork_enabled() -> bool {
    true
}
fn default_reclaim_handshake() -> bool {
    true
}
