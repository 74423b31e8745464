#![allow(dead_code)]

use forkgate_core::{ByteCell, SyncBackend, SyncName};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman;
use nix::sys::stat::Mode;
use forkgate_unix::ShmPlatform;
use std::sync::Arc;

/// Platform with a namespace private to this test run and tag
pub fn platform(tag: &str) -> Arc<ShmPlatform> {
    Arc::new(ShmPlatform::with_prefix(format!(
        "fgtest-{}-{tag}",
        std::process::id()
    )))
}

/// Shared byte a forked worker uses to report back to the test
pub fn marker(platform: &ShmPlatform, name: &str) -> SyncName {
    let name = SyncName::new(format!("marker:{name}"));
    platform
        .open_cell(&name)
        .expect("marker cell should open")
        .write(0);
    name
}

pub fn read_marker(platform: &ShmPlatform, name: &SyncName) -> u8 {
    platform
        .open_cell(name)
        .expect("marker cell should open")
        .read()
}

/// Whether the OS object behind `name` exists, checked without creating it
pub fn exists(platform: &ShmPlatform, name: &SyncName) -> bool {
    match mman::shm_open(platform.os_name(name).as_str(), OFlag::O_RDONLY, Mode::empty()) {
        Ok(_) => true,
        Err(Errno::ENOENT) => false,
        Err(e) => panic!("cannot open {name}: {e}"),
    }
}
