use crate::poll::{self, PollConfig};
use crate::sync::BoolSignal;
use std::time::Duration;

/// A unit of work with three lifecycle hooks
///
/// `init` and `main` may fail; `finally` runs on every path that got past `init` and is not
/// allowed to fail. Hooks receive a [`Context`] exposing the cooperative stop gate.
///
/// # Example
///
/// ```rust,no_run
/// use forkgate_core::{Context, Worker};
///
/// struct Indexer;
///
/// impl Worker for Indexer {
///     fn init(&mut self, _ctx: &Context<'_>) -> anyhow::Result<()> {
///         Ok(())
///     }
///
///     fn main(&mut self, ctx: &Context<'_>) -> anyhow::Result<()> {
///         while ctx.sleep(std::time::Duration::from_millis(100)) {
///             // index a batch
///         }
///         Ok(())
///     }
///
///     fn finally(&mut self, _ctx: &Context<'_>) {}
/// }
/// ```
pub trait Worker: Send + 'static {
    fn init(&mut self, ctx: &Context<'_>) -> anyhow::Result<()>;

    fn main(&mut self, ctx: &Context<'_>) -> anyhow::Result<()>;

    fn finally(&mut self, ctx: &Context<'_>);

    /// Root of every sync-object name used for this worker type.
    ///
    /// Override to keep names stable when the type is moved or renamed.
    fn kind() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// View of the worker's stop signals handed to each hook
pub struct Context<'a> {
    instance: &'a str,
    stop: &'a dyn BoolSignal,
    global_stop: &'a dyn BoolSignal,
}

impl<'a> Context<'a> {
    pub fn new(instance: &'a str, stop: &'a dyn BoolSignal, global_stop: &'a dyn BoolSignal) -> Self {
        Self {
            instance,
            stop,
            global_stop,
        }
    }

    pub fn instance_name(&self) -> &str {
        self.instance
    }

    /// False once this instance or the whole kind has been asked to stop
    pub fn continue_running(&self) -> bool {
        !(self.stop.is_fired() || self.global_stop.is_fired())
    }

    /// Fire this instance's stop event from inside a hook
    pub fn request_stop(&self) {
        self.stop.fire();
    }

    /// Sleep for up to `duration`, waking early on a stop request.
    ///
    /// Returns [`Context::continue_running`] as observed on wake-up.
    pub fn sleep(&self, duration: Duration) -> bool {
        poll::wait_until(Some(duration), &PollConfig::default(), || {
            !self.continue_running()
        });
        self.continue_running()
    }
}
