// src/system/executor.rs

//! External process invocation.
//!
//! Build tools (`./build`, `configure`, `make`, `git`) run through here.
//! `invoke` streams output to the terminal and polls a cancellation
//! token so Ctrl+C can kill the child promptly; `capture` collects
//! stdout for callers that parse it.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;

use crate::settings;
use crate::CancellationToken;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("command '{0}' was interrupted")]
    Interrupted(String),

    #[error("command '{command}' exited with status {code}")]
    NonZeroExit { command: String, code: i32 },

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while waiting for '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command line")]
    EmptyCommand,
}

fn display_command(argv: &[String]) -> String {
    argv.join(" ")
}

/// Run a command to completion, inheriting the terminal.
///
/// Honors dry-run (echoes the command instead of running it) and the
/// cancellation token (kills the child and reports `Interrupted`).
pub fn invoke(
    argv: &[String],
    cwd: &Path,
    token: &CancellationToken,
) -> Result<(), ExecutionError> {
    let program = argv.first().ok_or(ExecutionError::EmptyCommand)?;
    let shown = display_command(argv);
    let cwd = dunce::simplified(cwd);

    if settings::dry_run() {
        info!("would execute (in {}): {shown}", cwd.display());
        eprintln!("would execute (in {}): {shown}", cwd.display());
        return Ok(());
    }

    debug!("executing (in {}): {shown}", cwd.display());
    let mut child = Command::new(program)
        .args(&argv[1..])
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| ExecutionError::Spawn {
            command: shown.clone(),
            source,
        })?;

    loop {
        if token.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecutionError::Interrupted(shown));
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                return Err(ExecutionError::NonZeroExit {
                    command: shown,
                    code: status.code().unwrap_or(-1),
                });
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(source) => {
                return Err(ExecutionError::Wait {
                    command: shown,
                    source,
                });
            }
        }
    }
}

/// Run a command and collect its stdout. Runs even under dry-run, since
/// callers only use this for read-only queries.
pub fn capture(argv: &[String], cwd: &Path) -> Result<String, ExecutionError> {
    let program = argv.first().ok_or(ExecutionError::EmptyCommand)?;
    let shown = display_command(argv);
    let cwd = dunce::simplified(cwd);
    debug!("capturing (in {}): {shown}", cwd.display());

    let output = Command::new(program)
        .args(&argv[1..])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|source| ExecutionError::Spawn {
            command: shown.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ExecutionError::NonZeroExit {
            command: shown,
            code: output.status.code().unwrap_or(-1),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
