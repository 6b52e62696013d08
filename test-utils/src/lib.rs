//! Fakes for exercising kubelite without a machine, a hypervisor or a registry.

mod driver;
mod puller;
mod runner;

pub use driver::ScriptedDriver;
pub use puller::FakePuller;
pub use runner::{RecordedFile, RecordingRunner};

use kubelite::FilesystemLayout;
use tempfile::TempDir;

/// A kubelite home in a temporary directory, removed on drop.
pub struct TestHome {
    pub layout: FilesystemLayout,
    _dir: TempDir, // Dropped after test
}

impl TestHome {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = FilesystemLayout::new(dir.path().join(".kubelite"));
        layout.prepare().expect("Failed to prepare layout");
        Self { layout, _dir: dir }
    }

    /// Put a stand-in localkube binary where a local build would leave it.
    pub fn with_localkube_build(self) -> Self {
        let path = self.layout.localkube_build_path();
        std::fs::create_dir_all(path.parent().expect("build path has a parent"))
            .expect("Failed to create out dir");
        std::fs::write(&path, b"#!/bin/sh\n").expect("Failed to write localkube");
        self
    }
}

impl Default for TestHome {
    fn default() -> Self {
        Self::new()
    }
}
