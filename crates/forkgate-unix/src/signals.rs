use crate::shm::ShmEvent;
use forkgate_core::{BoolSignal, FIRED, ProcessError};
use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::unistd::{self, ForkResult};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Signals translated into a stop request instead of killing the worker
pub const STOP_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

/// Inline workers that may route stop signals at the same time within one process
pub const MAX_STOP_TARGETS: usize = 32;

/// State bytes the handler fires; a slot is null when unused
static STOP_TARGETS: [AtomicPtr<AtomicU8>; MAX_STOP_TARGETS] =
    [const { AtomicPtr::new(ptr::null_mut()) }; MAX_STOP_TARGETS];

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    live: [const { None }; MAX_STOP_TARGETS],
    retired: Vec::new(),
    previous: Vec::new(),
});

/// Owner of every mapping a handler may touch, plus the dispositions to restore
struct Registry {
    live: [Option<ShmEvent>; MAX_STOP_TARGETS],
    /// Released slots; unmapped only once the handler is no longer installed
    retired: Vec<ShmEvent>,
    previous: Vec<(Signal, SigAction)>,
}

impl Registry {
    fn is_idle(&self) -> bool {
        self.live.iter().all(Option::is_none)
    }

    fn restore_dispositions(&mut self) {
        for (signal, old) in self.previous.drain(..).rev() {
            // SAFETY: reinstating a disposition that was in place before the first guard.
            if let Err(e) = unsafe { sigaction(signal, &old) } {
                warn!("failed to restore {signal:?} disposition: {e}");
            }
        }
    }

    /// Forget the targets inherited by a freshly forked child
    fn detach_inherited(&mut self) {
        for target in &STOP_TARGETS {
            target.store(ptr::null_mut(), Ordering::Release);
        }
        let inherited: Vec<ShmEvent> = self.live.iter_mut().filter_map(Option::take).collect();
        self.retired.extend(inherited);
        self.restore_dispositions();
    }
}

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

extern "C" fn fire_stop(_signal: c_int) {
    for target in &STOP_TARGETS {
        let state = target.load(Ordering::Acquire);
        // SAFETY: non-null slots point into mappings owned by REGISTRY, which keeps them
        // mapped until the handler has been uninstalled.
        if let Some(state) = unsafe { state.as_ref() } {
            state.store(FIRED, Ordering::Release);
        }
    }
}

fn route_stop_signals() -> Result<Vec<(Signal, SigAction)>, ProcessError> {
    let action = SigAction::new(
        SigHandler::Handler(fire_stop),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let mut previous = Vec::with_capacity(STOP_SIGNALS.len());
    for signal in STOP_SIGNALS {
        // SAFETY: the handler performs atomic loads and stores and nothing else.
        match unsafe { sigaction(signal, &action) } {
            Ok(old) => previous.push((signal, old)),
            Err(e) => {
                for (signal, old) in previous.into_iter().rev() {
                    // SAFETY: undoing the installs made just above.
                    let _ = unsafe { sigaction(signal, &old) };
                }
                return Err(ProcessError::Signal(format!("{signal:?}: {e}")));
            }
        }
    }
    Ok(previous)
}

/// Fork with the registry locked, so the child never inherits it mid-update.
///
/// The child starts with no stop targets and the dispositions that were in place before any
/// guard, so signals aimed at it cannot fire the parent's events.
pub(crate) fn fork() -> nix::Result<ForkResult> {
    let mut registry = registry();
    // SAFETY: the child only runs the worker routine and then leaves through `exit_child`,
    // never returning into code that assumes the parent's other threads exist.
    let result = unsafe { unistd::fork() };
    if let Ok(ForkResult::Child) = result {
        registry.detach_inherited();
    }
    result
}

/// Keeps SIGINT/SIGTERM routed to a stop event while alive
///
/// Guards may overlap, e.g. inline workers on several threads. A signal fires the stop event
/// of every live guard. The handler is installed with the first guard and the previous
/// dispositions come back when the last one drops, whatever the drop order.
pub struct StopSignalGuard {
    slot: usize,
}

impl StopSignalGuard {
    pub(crate) fn install(stop: &ShmEvent) -> Result<Self, ProcessError> {
        let mut registry = registry();
        let slot = registry
            .live
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                ProcessError::Signal(format!(
                    "more than {MAX_STOP_TARGETS} workers are routing stop signals"
                ))
            })?;

        if registry.is_idle() {
            registry.previous = route_stop_signals()?;
            debug!("routing SIGINT/SIGTERM to stop events");
        }
        STOP_TARGETS[slot].store(stop.state_ptr(), Ordering::Release);
        registry.live[slot] = Some(stop.clone());

        debug!(stop = %stop.name(), slot, "stop event registered for signals");
        Ok(Self { slot })
    }
}

impl Drop for StopSignalGuard {
    fn drop(&mut self) {
        let mut registry = registry();
        STOP_TARGETS[self.slot].store(ptr::null_mut(), Ordering::Release);
        if let Some(stop) = registry.live[self.slot].take() {
            registry.retired.push(stop);
        }
        if registry.is_idle() {
            registry.restore_dispositions();
            registry.retired.clear();
        }
    }
}
