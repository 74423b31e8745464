//! forkgate - start a worker in a forked child and supervise it through named shared objects.
//!
//! The facade picks the platform backend for the target and re-exports the core API, so
//! applications only depend on this crate.
//!
//! ```rust,no_run
//! use forkgate::{Context, ProcessConfig, Started, Worker};
//! use std::time::Duration;
//!
//! struct Ticker;
//!
//! impl Worker for Ticker {
//!     fn init(&mut self, _ctx: &Context<'_>) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn main(&mut self, ctx: &Context<'_>) -> anyhow::Result<()> {
//!         while ctx.sleep(Duration::from_secs(1)) {
//!             tracing::info!("tick");
//!         }
//!         Ok(())
//!     }
//!
//!     fn finally(&mut self, _ctx: &Context<'_>) {}
//! }
//!
//! let mut process = forkgate::process(Ticker, ProcessConfig::named("main"));
//! if let Started::Forked { pid } = process.start()? {
//!     process.stop()?;
//!     process.join(pid)?;
//! }
//! # Ok::<(), forkgate::ProcessError>(())
//! ```

#[cfg(not(unix))]
compile_error!("forkgate only supports Unix targets");

mod factory;
mod logging;

pub use factory::{NativePlatform, PlatformFactory};
pub use logging::{LogFormat, init_tracing, init_tracing_with};

// Re-export core functionality
pub use forkgate_core::*;

#[cfg(unix)]
pub use forkgate_unix::{STOP_SIGNALS, ShmPlatform};

pub type NativeProcess<W> = Process<W, NativePlatform>;

pub type NativeHandle = ProcessHandle<NativePlatform>;

/// Wrap `worker` for the native platform
pub fn process<W: Worker>(worker: W, config: ProcessConfig) -> NativeProcess<W> {
    Process::with_config(worker, config, PlatformFactory::shared())
}

/// Control an instance of `W` started elsewhere, possibly by another process
pub fn attach<W: Worker>(instance: impl Into<String>) -> NativeHandle {
    ProcessHandle::attach::<W>(PlatformFactory::shared(), instance)
}

/// Stop every instance of `W` that has not yet entered `main`
pub fn global_stop<W: Worker>() -> Result<(), ProcessError> {
    NativeProcess::<W>::global_stop(&PlatformFactory::shared())
}
