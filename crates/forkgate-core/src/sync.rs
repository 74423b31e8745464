use crate::error::ProcessError;
use crate::naming::SyncName;
use crate::poll::{self, PollConfig};
use std::time::Duration;

/// Byte value of a fired event
pub const FIRED: u8 = 1;
/// Running-cell value while the worker is between init and cleanup
pub const RUNNING: u8 = 1;
/// Running-cell value otherwise, and the content of a never-written cell
pub const NOT_RUNNING: u8 = 0;

/// Cross-process fire-once boolean signal identified by name
///
/// Every handle opened under the same name observes the same state. There is no reset:
/// a fired event stays fired until its name is unlinked.
pub trait BoolSignal: Send + Sync {
    fn name(&self) -> &SyncName;

    /// Set the event. Idempotent.
    fn fire(&self);

    /// Non-blocking check
    fn is_fired(&self) -> bool;

    /// Wait up to `timeout` for the event; a zero timeout polls once.
    fn wait(&self, timeout: Duration) -> bool {
        poll::wait_until(Some(timeout), &PollConfig::default(), || self.is_fired())
    }
}

/// One shared byte identified by name
pub trait ByteCell: Send + Sync {
    fn name(&self) -> &SyncName;

    fn write(&self, value: u8);

    /// Last written byte, or [`NOT_RUNNING`] if the cell was never written
    fn read(&self) -> u8;
}

/// Opens named sync objects, creating them on first access
pub trait SyncBackend: Send + Sync + 'static {
    type Signal: BoolSignal + 'static;
    type Cell: ByteCell + 'static;

    fn open_signal(&self, name: &SyncName) -> Result<Self::Signal, ProcessError>;

    fn open_cell(&self, name: &SyncName) -> Result<Self::Cell, ProcessError>;

    /// Remove the name. Existing handles keep working; later opens create a fresh object.
    /// Unlinking a name that does not exist is not an error.
    fn unlink(&self, name: &SyncName) -> Result<(), ProcessError>;
}

/// Async wait for a signal with the same contract as [`BoolSignal::wait`]
pub async fn wait_fired_async<S: BoolSignal + ?Sized>(signal: &S, timeout: Duration) -> bool {
    poll::wait_until_async(Some(timeout), &PollConfig::default(), || signal.is_fired()).await
}
