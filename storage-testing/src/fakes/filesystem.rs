use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use storage_contracts::{BackendResult, FilesystemBackend};
use storage_types::{FilesystemType, MountOptions};

use super::journal::{CallKind, CallLog};

/// One filesystem tool run: target device, type and extra arguments
pub type ToolRun = (PathBuf, FilesystemType, Vec<String>);

#[derive(Debug, Default)]
struct FilesystemState {
    directories: BTreeSet<PathBuf>,
    mounts: BTreeMap<PathBuf, (PathBuf, FilesystemType, MountOptions)>,
    mkfs_runs: Vec<ToolRun>,
    fsck_runs: Vec<ToolRun>,
}

/// In-memory directory tree and mount table
#[derive(Debug)]
pub struct FakeFilesystem {
    log: CallLog,
    state: Mutex<FilesystemState>,
}

impl FakeFilesystem {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            state: Mutex::new(FilesystemState::default()),
        }
    }

    pub fn with_directory(self, path: impl Into<PathBuf>) -> Self {
        self.state().directories.insert(path.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, FilesystemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_directory(&self, path: &Path) -> bool {
        self.state().directories.contains(path)
    }

    /// Source device and type mounted at `target`
    pub fn mounted_at(&self, target: &Path) -> Option<(PathBuf, FilesystemType)> {
        self.state()
            .mounts
            .get(target)
            .map(|(source, fs_type, _)| (source.clone(), *fs_type))
    }

    pub fn mount_options(&self, target: &Path) -> Option<MountOptions> {
        self.state()
            .mounts
            .get(target)
            .map(|(_, _, options)| options.clone())
    }

    pub fn mkfs_runs(&self) -> Vec<ToolRun> {
        self.state().mkfs_runs.clone()
    }

    pub fn fsck_runs(&self) -> Vec<ToolRun> {
        self.state().fsck_runs.clone()
    }
}

impl FilesystemBackend for FakeFilesystem {
    fn run_mkfs(
        &self,
        device: &Path,
        fs_type: FilesystemType,
        options: &[String],
    ) -> BackendResult<()> {
        self.log.record(CallKind::RunMkfs)?;
        self.state()
            .mkfs_runs
            .push((device.to_path_buf(), fs_type, options.to_vec()));
        Ok(())
    }

    fn run_fsck(
        &self,
        device: &Path,
        fs_type: FilesystemType,
        options: &[String],
    ) -> BackendResult<()> {
        self.log.record(CallKind::RunFsck)?;
        self.state()
            .fsck_runs
            .push((device.to_path_buf(), fs_type, options.to_vec()));
        Ok(())
    }

    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: FilesystemType,
        options: &MountOptions,
    ) -> BackendResult<()> {
        self.log.record(CallKind::Mount)?;
        self.state().mounts.insert(
            target.to_path_buf(),
            (source.to_path_buf(), fs_type, options.clone()),
        );
        Ok(())
    }

    fn unmount(&self, target: &Path) -> BackendResult<()> {
        self.log.record(CallKind::Unmount)?;
        self.state().mounts.remove(target);
        Ok(())
    }

    fn create_directory(&self, path: &Path) -> BackendResult<()> {
        self.log.record(CallKind::CreateDirectory)?;
        self.state().directories.insert(path.to_path_buf());
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> BackendResult<()> {
        self.log.record(CallKind::RemoveDirectory)?;
        self.state().directories.remove(path);
        Ok(())
    }

    fn directory_exists(&self, path: &Path) -> bool {
        // a query cannot fail; injected failures only show in the log
        let _ = self.log.record(CallKind::DirectoryExists);
        self.state().directories.contains(path)
    }
}
