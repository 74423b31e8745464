//! Derivation of sync-object names.
//!
//! Every name is rooted at the worker kind. Instance-scoped objects append the instance name
//! and a purpose suffix; the two handshake events additionally carry an identity token so each
//! `start()` gets a pair nobody else can be waiting on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub const STOP: &str = "stop";
pub const RUNNING: &str = "running";
pub const INIT_OK: &str = "init_ok";
pub const INIT_FAILED: &str = "init_failed";

/// Logical, platform-independent name of a sync object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncName(String);

impl SyncName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SyncName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Names of the two events resolving one `start()` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeNames {
    pub init_ok: SyncName,
    pub init_failed: SyncName,
}

/// Name derivation for one `(kind, instance)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Naming {
    kind: String,
    instance: String,
}

impl Naming {
    pub fn new(kind: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            instance: instance.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// `kind` or `kind:suffix`
    pub fn base_name(&self, suffix: &str) -> SyncName {
        join(&self.kind, suffix)
    }

    /// `base_name(instance)` or `base_name(instance:purpose)`
    pub fn instance_name(&self, purpose: &str) -> SyncName {
        self.base_name(join(&self.instance, purpose).as_str())
    }

    pub fn stop(&self) -> SyncName {
        self.instance_name(STOP)
    }

    pub fn running(&self) -> SyncName {
        self.instance_name(RUNNING)
    }

    /// Shared by every instance of the kind, whatever its instance name
    pub fn global_stop(&self) -> SyncName {
        self.base_name("")
    }

    pub fn handshake(&self, token: &str) -> HandshakeNames {
        HandshakeNames {
            init_ok: self.instance_name(&format!("{INIT_OK}.{token}")),
            init_failed: self.instance_name(&format!("{INIT_FAILED}.{token}")),
        }
    }
}

fn join(head: &str, suffix: &str) -> SyncName {
    if suffix.is_empty() {
        SyncName::new(head)
    } else {
        SyncName::new(format!("{head}:{suffix}"))
    }
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Runtime identity of one constructed process instance
///
/// Unique within the process tree: the pid separates processes and the serial separates
/// instances built in the same process. Combined with the start attempt it yields a fresh
/// handshake token per `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pid: u32,
    serial: u64,
}

impl Identity {
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn token(&self, attempt: u64) -> String {
        format!("{}-{}-{}", self.pid, self.serial, attempt)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}
