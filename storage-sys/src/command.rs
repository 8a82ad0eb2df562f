// SPDX-License-Identifier: GPL-3.0-only

//! Running external tools
//!
//! Secrets are only ever passed on stdin, never as arguments.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Result, SysError};

#[derive(Debug)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Locate a tool in PATH
pub fn find_tool(name: &'static str) -> Result<PathBuf> {
    which::which(name).map_err(|_| SysError::ToolNotFound(name))
}

/// Run `program` to completion, feeding `input` to its stdin when given
pub fn run<I, S>(program: &Path, args: I, input: Option<&[u8]>) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    tracing::debug!("Running {:?}", command);
    let mut child = command.spawn()?;
    if let Some(payload) = input
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin.write_all(payload)?;
        // stdin is closed on drop so the tool sees EOF
    }

    let output = child.wait_with_output()?;
    Ok(ToolOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Like [`run`], but a nonzero exit is an error
pub fn run_checked<I, S>(program: &Path, args: I, input: Option<&[u8]>) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run(program, args, input)?;
    if !output.success() {
        tracing::warn!("{} failed: {}", program.display(), output.stderr);
        return Err(SysError::CommandFailed {
            program: program.display().to_string(),
            code: output.code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}
