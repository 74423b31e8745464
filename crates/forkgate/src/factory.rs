use std::sync::Arc;

/// Concrete platform selected for the compilation target
#[cfg(unix)]
pub type NativePlatform = forkgate_unix::ShmPlatform;

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformFactory;

impl PlatformFactory {
    pub fn create_platform() -> NativePlatform {
        #[cfg(unix)]
        return forkgate_unix::UnixPlatformFactory::create_platform();
    }

    /// Platform whose objects live under `prefix` instead of the default namespace
    pub fn create_platform_with_prefix(prefix: impl Into<String>) -> NativePlatform {
        #[cfg(unix)]
        return forkgate_unix::ShmPlatform::with_prefix(prefix);
    }

    pub fn shared() -> Arc<NativePlatform> {
        Arc::new(Self::create_platform())
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        return forkgate_unix::UnixPlatformFactory::platform_name();
    }
}
