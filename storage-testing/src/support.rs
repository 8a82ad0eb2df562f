use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::{Result, TestingError};

pub fn skip<T>(reason: impl Into<String>) -> Result<T> {
    Err(TestingError::TestSkipped {
        reason: reason.into(),
    })
}

pub fn env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn require_env(name: &str) -> Result<String> {
    env(name).ok_or_else(|| TestingError::TestSkipped {
        reason: format!("set {name}"),
    })
}

pub fn destructive_enabled() -> bool {
    std::env::var("STORAGE_TESTING_ENABLE_DESTRUCTIVE")
        .ok()
        .as_deref()
        == Some("1")
}

pub fn require_destructive(label: &str) -> Result<()> {
    if destructive_enabled() {
        Ok(())
    } else {
        skip(format!("destructive test disabled for {label}"))
    }
}

/// A sparse file standing in for a device, removed on drop
pub struct ScratchImage {
    path: PathBuf,
}

impl ScratchImage {
    pub fn create(label: &str, size: u64) -> Result<Self> {
        let path = std::env::temp_dir().join(format!(
            "storage-testing-{label}-{}.img",
            uuid::Uuid::new_v4()
        ));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(size)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }
}

impl Drop for ScratchImage {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
