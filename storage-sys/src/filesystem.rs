// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem tools and mount syscalls

use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use nix::mount::{MntFlags, MsFlags};
use storage_contracts::{BackendError, BackendResult, FilesystemBackend};
use storage_types::{FilesystemType, MountOptions};

use crate::command;
use crate::error::{Result, SysError};

#[derive(Debug, Default)]
pub struct SystemFilesystem;

impl SystemFilesystem {
    pub fn new() -> Self {
        Self
    }
}

/// fsck exit codes 0 (clean) and 1 (errors corrected) both leave a usable filesystem
fn fsck_succeeded(code: Option<i32>) -> bool {
    matches!(code, Some(0) | Some(1))
}

fn mount_flags(options: &MountOptions) -> MsFlags {
    let mut flags = MsFlags::empty();
    if options.read_only {
        flags |= MsFlags::MS_RDONLY;
    }
    if options.no_dev {
        flags |= MsFlags::MS_NODEV;
    }
    if options.no_suid {
        flags |= MsFlags::MS_NOSUID;
    }
    if options.no_exec {
        flags |= MsFlags::MS_NOEXEC;
    }
    flags
}

fn errno_error(call: &'static str, errno: nix::errno::Errno) -> BackendError {
    BackendError::status(call, -(errno as i32))
}

fn tool_args<'a>(options: &'a [String], device: &'a Path) -> Vec<&'a OsStr> {
    options
        .iter()
        .map(OsStr::new)
        .chain(std::iter::once(device.as_os_str()))
        .collect()
}

fn mkfs(device: &Path, fs_type: FilesystemType, options: &[String]) -> Result<()> {
    let tool = fs_type.mkfs_command();
    let program = which::which(&tool)
        .map_err(|_| SysError::OperationFailed(format!("{tool} is not installed")))?;
    command::run_checked(&program, tool_args(options, device), None)?;
    Ok(())
}

fn fsck(device: &Path, fs_type: FilesystemType, options: &[String]) -> Result<()> {
    let program = command::find_tool("fsck")?;
    let mut args = vec![OsStr::new("-t"), OsStr::new(fs_type.as_str())];
    args.extend(tool_args(options, device));

    let output = command::run(&program, args, None)?;
    if fsck_succeeded(output.code) {
        if output.code == Some(1) {
            tracing::warn!("fsck corrected errors on {:?}", device);
        }
        return Ok(());
    }
    Err(SysError::CommandFailed {
        program: program.display().to_string(),
        code: output.code,
        stderr: output.stderr,
    })
}

impl FilesystemBackend for SystemFilesystem {
    fn run_mkfs(
        &self,
        device: &Path,
        fs_type: FilesystemType,
        options: &[String],
    ) -> BackendResult<()> {
        tracing::info!("Creating {} filesystem on {:?}", fs_type, device);
        mkfs(device, fs_type, options).map_err(|e| e.into_backend("run_mkfs"))
    }

    fn run_fsck(
        &self,
        device: &Path,
        fs_type: FilesystemType,
        options: &[String],
    ) -> BackendResult<()> {
        tracing::debug!("Checking {} filesystem on {:?}", fs_type, device);
        fsck(device, fs_type, options).map_err(|e| e.into_backend("run_fsck"))
    }

    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: FilesystemType,
        options: &MountOptions,
    ) -> BackendResult<()> {
        tracing::debug!("Mounting {:?} on {:?} ({})", source, target, fs_type);
        nix::mount::mount(
            Some(source),
            target,
            Some(fs_type.as_str()),
            mount_flags(options),
            options.data.as_deref(),
        )
        .map_err(|errno| errno_error("mount", errno))
    }

    fn unmount(&self, target: &Path) -> BackendResult<()> {
        tracing::debug!("Unmounting {:?}", target);
        nix::mount::umount2(target, MntFlags::empty())
            .map_err(|errno| errno_error("unmount", errno))
    }

    fn create_directory(&self, path: &Path) -> BackendResult<()> {
        fs::create_dir_all(path).map_err(|e| BackendError::io("create_directory", e))
    }

    fn remove_directory(&self, path: &Path) -> BackendResult<()> {
        fs::remove_dir(path).map_err(|e| BackendError::io("remove_directory", e))
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fsck_corrected_errors_count_as_success() {
        assert!(fsck_succeeded(Some(0)));
        assert!(fsck_succeeded(Some(1)));
        assert!(!fsck_succeeded(Some(4)));
        assert!(!fsck_succeeded(None));
    }

    #[test]
    fn mount_options_map_to_flags() {
        let options = MountOptions {
            no_dev: true,
            no_exec: true,
            ..MountOptions::default()
        };
        let flags = mount_flags(&options);
        assert!(flags.contains(MsFlags::MS_NODEV | MsFlags::MS_NOEXEC));
        assert!(!flags.contains(MsFlags::MS_RDONLY));
    }

    #[test]
    fn device_is_the_last_tool_argument() {
        let options = vec!["-E".to_string(), "lazy_itable_init=0".to_string()];
        let args = tool_args(&options, Path::new("/dev/mapper/emmc_luks"));
        assert_eq!(args.len(), 3);
        assert_eq!(args[2], "/dev/mapper/emmc_luks");
    }

    #[test]
    fn directories_are_created_and_removed() {
        let root = std::env::temp_dir().join(format!("emmc-fs-{}", uuid::Uuid::new_v4()));
        let backend = SystemFilesystem::new();
        assert!(!backend.directory_exists(&root));
        backend.create_directory(&root).expect("create");
        assert!(backend.directory_exists(&root));
        backend.remove_directory(&root).expect("remove");
        assert!(!backend.directory_exists(&root));
    }
}
