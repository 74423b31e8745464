use forkgate_core::{BoolSignal, ByteCell, FIRED, ProcessError, SyncName};
use nix::fcntl::OFlag;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd;
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Every segment has the same size so concurrent `ftruncate` calls never shrink one
const SEGMENT_LEN: NonZeroUsize = NonZeroUsize::new(8).unwrap();

/// Longest object name `shm_open` accepts, leading slash included (PSHMNAMLEN)
#[cfg(target_os = "macos")]
const MAX_OS_NAME: usize = 31;

/// Stay well below NAME_MAX once the leading slash and prefix are added
#[cfg(not(target_os = "macos"))]
const MAX_OS_NAME: usize = 200;

/// Map a logical name to a POSIX shared-memory object name
///
/// `/` and NUL are not allowed after the leading slash and are replaced with `_`. Names
/// that would exceed the target's limit keep a readable head and end in a hash of the full
/// object name.
pub fn os_name(prefix: &str, name: &SyncName) -> String {
    os_name_within(prefix, name, MAX_OS_NAME)
}

fn os_name_within(prefix: &str, name: &SyncName, limit: usize) -> String {
    let encoded: String = name
        .as_str()
        .chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect();
    let mut full = format!("/{prefix}.{encoded}");
    if full.len() > limit {
        let digest = format!("{:016x}", fnv1a(full.as_bytes()));
        let mut cut = limit - digest.len() - 1;
        while !full.is_char_boundary(cut) {
            cut -= 1;
        }
        full.truncate(cut);
        full.push('~');
        full.push_str(&digest);
    }
    full
}

/// FNV-1a; stable across builds, unlike the std hasher
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// A shared mapping of one named segment; unmapped on drop, never unlinked
struct Mapping {
    ptr: NonNull<c_void>,
}

// SAFETY: the mapping is only accessed through `AtomicU8`.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    fn open(os_name: &str) -> Result<Self, ProcessError> {
        let fd = mman::shm_open(
            os_name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|e| ProcessError::sync_object(os_name, e))?;

        // A freshly created segment is zero-filled, which reads as unset / not running.
        unistd::ftruncate(&fd, SEGMENT_LEN.get() as nix::libc::off_t)
            .map_err(|e| ProcessError::sync_object(os_name, e))?;

        // SAFETY: fresh mapping of a descriptor we own; no existing memory is affected.
        let ptr = unsafe {
            mman::mmap(
                None,
                SEGMENT_LEN,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )
        }
        .map_err(|e| ProcessError::sync_object(os_name, e))?;

        Ok(Self { ptr })
    }

    fn byte(&self) -> &AtomicU8 {
        // SAFETY: the mapping is at least one byte long, page aligned and lives as long as self.
        unsafe { &*(self.ptr.as_ptr() as *const AtomicU8) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: ptr came from mmap with SEGMENT_LEN and no reference outlives self.
        if let Err(e) = unsafe { mman::munmap(self.ptr, SEGMENT_LEN.get()) } {
            tracing::warn!("munmap failed: {e}");
        }
    }
}

/// Named event backed by one byte of a POSIX shared-memory segment
#[derive(Clone)]
pub struct ShmEvent {
    name: SyncName,
    map: Arc<Mapping>,
}

impl ShmEvent {
    pub fn open(os_name: &str, name: SyncName) -> Result<Self, ProcessError> {
        Ok(Self {
            name,
            map: Arc::new(Mapping::open(os_name)?),
        })
    }

    /// Address of the state byte, valid while any clone of this event is alive
    pub(crate) fn state_ptr(&self) -> *mut AtomicU8 {
        self.map.byte() as *const AtomicU8 as *mut AtomicU8
    }
}

impl BoolSignal for ShmEvent {
    fn name(&self) -> &SyncName {
        &self.name
    }

    fn fire(&self) {
        self.map.byte().store(FIRED, Ordering::Release);
    }

    fn is_fired(&self) -> bool {
        self.map.byte().load(Ordering::Acquire) == FIRED
    }
}

/// Named one-byte cell backed by a POSIX shared-memory segment
#[derive(Clone)]
pub struct ShmCell {
    name: SyncName,
    map: Arc<Mapping>,
}

impl ShmCell {
    pub fn open(os_name: &str, name: SyncName) -> Result<Self, ProcessError> {
        Ok(Self {
            name,
            map: Arc::new(Mapping::open(os_name)?),
        })
    }
}

impl ByteCell for ShmCell {
    fn name(&self) -> &SyncName {
        &self.name
    }

    fn write(&self, value: u8) {
        self.map.byte().store(value, Ordering::Release);
    }

    fn read(&self) -> u8 {
        self.map.byte().load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_name_prefix_and_escaping() {
        let name = SyncName::new("app::Indexer:a/b:stop");
        assert_eq!(os_name("forkgate", &name), "/forkgate.app::Indexer:a_b:stop");
    }

    #[test]
    fn test_long_names_are_hashed() {
        let long = SyncName::new("k".repeat(300));
        let other = SyncName::new(format!("{}x", "k".repeat(299)));
        let encoded = os_name("forkgate", &long);

        assert!(encoded.len() <= MAX_OS_NAME);
        assert!(encoded.starts_with("/forkgate.kkk"));
        assert_eq!(encoded, os_name("forkgate", &long));
        assert_ne!(encoded, os_name("forkgate", &other));
    }

    #[test]
    fn test_short_limit_keeps_names_distinct() {
        let naming = forkgate_core::Naming::new("heartbeat::Heartbeat", "demo");
        let running = os_name_within("forkgate", &naming.running(), 31);
        let stop = os_name_within("forkgate", &naming.stop(), 31);
        let elsewhere = os_name_within("fgtest-1", &naming.running(), 31);

        assert_eq!(running.len(), 31);
        assert!(running.starts_with("/forkgate."));
        assert_ne!(running, stop);
        assert_ne!(running, elsewhere);
        assert_eq!(os_name_within("fg", &SyncName::new("a:stop"), 31), "/fg.a:stop");
    }

    #[test]
    fn test_default_names_fit_target_limit() {
        let naming = forkgate_core::Naming::new("heartbeat::Heartbeat", "demo");
        assert!(os_name("forkgate", &naming.running()).len() <= MAX_OS_NAME);
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
