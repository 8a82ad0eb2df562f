// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use storage_types::{FilesystemType, MountOptions};

use crate::BackendResult;

/// Filesystem creation, checking and mounting on the cleartext device
pub trait FilesystemBackend: Send + Sync {
    fn run_mkfs(
        &self,
        device: &Path,
        fs_type: FilesystemType,
        options: &[String],
    ) -> BackendResult<()>;

    fn run_fsck(
        &self,
        device: &Path,
        fs_type: FilesystemType,
        options: &[String],
    ) -> BackendResult<()>;

    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: FilesystemType,
        options: &MountOptions,
    ) -> BackendResult<()>;

    fn unmount(&self, target: &Path) -> BackendResult<()>;

    fn create_directory(&self, path: &Path) -> BackendResult<()>;

    fn remove_directory(&self, path: &Path) -> BackendResult<()>;

    fn directory_exists(&self, path: &Path) -> bool;
}
