//! Unix platform for forkgate: POSIX shared-memory events and cells, signal routing, and
//! `fork`-based workers.

#[cfg(unix)]
mod platform;
#[cfg(unix)]
mod shm;
#[cfg(unix)]
mod signals;

#[cfg(unix)]
pub use platform::ShmPlatform;
#[cfg(unix)]
pub use shm::{ShmCell, ShmEvent, os_name};
#[cfg(unix)]
pub use signals::{MAX_STOP_TARGETS, STOP_SIGNALS, StopSignalGuard};

#[cfg(unix)]
pub struct UnixPlatformFactory;

#[cfg(unix)]
impl UnixPlatformFactory {
    pub fn create_platform() -> ShmPlatform {
        ShmPlatform::new()
    }

    pub fn platform_name() -> &'static str {
        "Unix"
    }
}
