//! In-process platform.
//!
//! Named objects live in a registry shared by every clone of a [`LocalPlatform`], so two
//! handles opened under the same name observe the same state, just as with OS-backed objects.
//! There is no fork: workers using this platform must run inline.

use crate::error::ProcessError;
use crate::naming::SyncName;
use crate::process::{ChildState, Forked, ProcessControl, WorkerPid};
use crate::sync::{BoolSignal, ByteCell, FIRED, NOT_RUNNING, SyncBackend};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
struct CellState {
    value: AtomicU8,
    writes: Mutex<Vec<u8>>,
}

#[derive(Default)]
struct Registry {
    signals: HashMap<SyncName, Arc<AtomicU8>>,
    cells: HashMap<SyncName, Arc<CellState>>,
}

#[derive(Clone, Default)]
pub struct LocalPlatform {
    registry: Arc<Mutex<Registry>>,
}

impl LocalPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an object of either sort currently exists under `name`
    pub fn contains(&self, name: &SyncName) -> bool {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.signals.contains_key(name) || registry.cells.contains_key(name)
    }
}

pub struct LocalSignal {
    name: SyncName,
    state: Arc<AtomicU8>,
}

impl BoolSignal for LocalSignal {
    fn name(&self) -> &SyncName {
        &self.name
    }

    fn fire(&self) {
        self.state.store(FIRED, Ordering::Release);
    }

    fn is_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }
}

pub struct LocalCell {
    name: SyncName,
    state: Arc<CellState>,
}

impl LocalCell {
    /// Every value written through any handle of this cell, oldest first
    pub fn writes(&self) -> Vec<u8> {
        self.state
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ByteCell for LocalCell {
    fn name(&self) -> &SyncName {
        &self.name
    }

    fn write(&self, value: u8) {
        self.state
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
        self.state.value.store(value, Ordering::Release);
    }

    fn read(&self) -> u8 {
        self.state.value.load(Ordering::Acquire)
    }
}

impl SyncBackend for LocalPlatform {
    type Signal = LocalSignal;
    type Cell = LocalCell;

    fn open_signal(&self, name: &SyncName) -> Result<Self::Signal, ProcessError> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let state = registry.signals.entry(name.clone()).or_default().clone();
        Ok(LocalSignal {
            name: name.clone(),
            state,
        })
    }

    fn open_cell(&self, name: &SyncName) -> Result<Self::Cell, ProcessError> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let state = registry
            .cells
            .entry(name.clone())
            .or_insert_with(|| {
                Arc::new(CellState {
                    value: AtomicU8::new(NOT_RUNNING),
                    writes: Mutex::default(),
                })
            })
            .clone();
        Ok(LocalCell {
            name: name.clone(),
            state,
        })
    }

    fn unlink(&self, name: &SyncName) -> Result<(), ProcessError> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.signals.remove(name);
        registry.cells.remove(name);
        Ok(())
    }
}

impl ProcessControl for LocalPlatform {
    type StopGuard = ();

    fn install_stop_handler(&self, _stop: &Self::Signal) -> Result<Self::StopGuard, ProcessError> {
        Ok(())
    }

    fn fork(&self) -> Result<Forked, ProcessError> {
        Err(ProcessError::ForkUnsupported)
    }

    fn exit_child(&self, code: i32) -> ! {
        std::process::exit(code)
    }

    fn child_state(&self, _pid: WorkerPid) -> Result<ChildState, ProcessError> {
        Err(ProcessError::ForkUnsupported)
    }

    fn wait_child(&self, _pid: WorkerPid) -> Result<ChildState, ProcessError> {
        Err(ProcessError::ForkUnsupported)
    }
}
