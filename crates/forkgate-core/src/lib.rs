//! forkgate core - platform-independent worker lifecycle
//!
//! This crate provides the worker trait, the lifecycle orchestration and the name
//! derivation scheme, written against the [`SyncBackend`] and [`ProcessControl`] traits
//! that platform crates implement.

mod config;
mod error;
mod lifecycle;
mod local;
mod naming;
pub mod poll;
mod process;
mod routine;
mod sync;
mod worker;

pub use config::*;
pub use error::*;
pub use lifecycle::*;
pub use local::*;
pub use naming::{HandshakeNames, Identity, Naming, SyncName};
pub use process::*;
pub use sync::*;
pub use worker::*;
