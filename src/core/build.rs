// src/core/build.rs

//! Build lifecycle tracking.
//!
//! A [`BuildRecord`] is one concrete configure+compile attempt: a stable
//! identity, a directory, a configuration snapshot, and an append-only
//! log of [`BuildMessage`]s. Everything else (current status, configured,
//! compiled) is derived from the log.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use colored::Colorize;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::registry::SaveFlag;
use crate::models::BuildConfiguration;
use crate::settings;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("no matching build to continue")]
    NoMatchingBuildToContinue,

    #[error("build '{0}' is already complete (use --force to rebuild)")]
    BuildAlreadyComplete(String),
}

/// The lifecycle states of a build, ordered by declaration.
///
/// `PreexistingBuild` and `InterruptedByUser` sit outside the normal
/// configure/compile progression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum BuildStatus {
    Unconfigured,
    Configuring,
    ConfigureFailed,
    Configured,
    Compiling,
    CompileFailed,
    Complete,
    PreexistingBuild,
    InterruptedByUser,
}

impl BuildStatus {
    pub fn is_completion(self) -> bool {
        matches!(self, Self::Configured | Self::Complete)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::ConfigureFailed | Self::CompileFailed | Self::InterruptedByUser
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configuring => "configuring",
            Self::ConfigureFailed => "configure failed",
            Self::Configured => "configured",
            Self::Compiling => "compiling",
            Self::CompileFailed => "compile failed",
            Self::Complete => "complete",
            Self::PreexistingBuild => "preexisting build",
            Self::InterruptedByUser => "interrupted by user",
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::Unconfigured => "build created",
            Self::Configuring => "configure started",
            Self::ConfigureFailed => "configure exited with an error",
            Self::Configured => "configure finished",
            Self::Compiling => "compilation started",
            Self::CompileFailed => "compilation exited with an error",
            Self::Complete => "compilation finished",
            Self::PreexistingBuild => "found preexisting build directory",
            Self::InterruptedByUser => "interrupted by user",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        let painted = if self.is_failure() {
            name.red()
        } else if self.is_completion() {
            name.green()
        } else {
            name.yellow()
        };
        write!(f, "{painted}")
    }
}

/// One entry in a build's status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMessage {
    pub time: DateTime<Utc>,
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BuildMessage {
    pub fn new(status: BuildStatus, message: Option<String>) -> Self {
        Self {
            time: Utc::now(),
            status,
            message,
        }
    }

    pub fn text(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.status.default_message())
    }
}

impl fmt::Display for BuildMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.time.format("%Y-%m-%d %H:%M:%S"),
            self.status,
            self.text()
        )
    }
}

/// One concrete build attempt and its full history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: Uuid,
    pub name: String,
    pub directory: PathBuf,
    pub config: BuildConfiguration,
    pub messages: Vec<BuildMessage>,
    #[serde(skip)]
    pub(crate) save_flag: SaveFlag,
}

impl BuildRecord {
    /// Create a record in its initial state.
    ///
    /// The record's name must equal the directory basename; a mismatch is
    /// a construction bug, not user error, and aborts.
    pub fn new(
        name: impl Into<String>,
        directory: PathBuf,
        config: BuildConfiguration,
        initial: BuildStatus,
        save_flag: SaveFlag,
    ) -> Self {
        let name = name.into();
        assert!(
            directory.file_name().is_some_and(|base| *base == *name.as_str()),
            "build name '{}' does not match directory '{}'",
            name,
            directory.display()
        );
        let mut record = Self {
            id: Uuid::new_v4(),
            name,
            directory,
            config,
            messages: Vec::new(),
            save_flag,
        };
        record.update(initial, None);
        record
    }

    /// Append a status message. The only mutator of the log.
    pub fn update(&mut self, status: BuildStatus, message: Option<String>) {
        let entry = BuildMessage::new(status, message);
        info!("build {}: {}", self.name, entry.text());
        eprintln!("  {} {entry}", self.name.bold());
        self.messages.push(entry);
        if !settings::dry_run() {
            self.save_flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn current_status(&self) -> BuildStatus {
        self.messages
            .last()
            .map_or(BuildStatus::Unconfigured, |m| m.status)
    }

    /// Whether configure has ever finished successfully.
    pub fn configured(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.status == BuildStatus::Configured)
    }

    pub fn compiled(&self) -> bool {
        self.current_status() == BuildStatus::Complete
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.time)
    }

    /// Validate a `--continue` request against this record's state.
    pub fn check_continue(&self, force: bool) -> Result<(), BuildError> {
        if self.compiled() && !force {
            return Err(BuildError::BuildAlreadyComplete(self.name.clone()));
        }
        Ok(())
    }

    pub(crate) fn attach_save_flag(&mut self, flag: SaveFlag) {
        self.save_flag = flag;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PackageKind;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn record() -> BuildRecord {
        let config = BuildConfiguration::new("net-linux-x86_64", "master", PackageKind::Runtime);
        BuildRecord::new(
            "net-linux-x86_64",
            PathBuf::from("/tmp/charm/net-linux-x86_64"),
            config,
            BuildStatus::Unconfigured,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn status_ordering_follows_declaration() {
        assert!(BuildStatus::Unconfigured < BuildStatus::Configuring);
        assert!(BuildStatus::Configured < BuildStatus::Compiling);
        assert!(BuildStatus::CompileFailed < BuildStatus::Complete);
    }

    #[test]
    fn update_appends_one_message_per_call() {
        let mut record = record();
        assert_eq!(record.messages.len(), 1);
        record.update(BuildStatus::Configuring, None);
        record.update(BuildStatus::Configured, Some("ok".into()));
        assert_eq!(record.messages.len(), 3);
        assert_eq!(record.current_status(), BuildStatus::Configured);
    }

    #[test]
    fn configured_looks_at_history_not_just_current() {
        let mut record = record();
        record.update(BuildStatus::Configuring, None);
        record.update(BuildStatus::Configured, None);
        record.update(BuildStatus::Compiling, None);
        record.update(BuildStatus::CompileFailed, None);
        assert!(record.configured());
        assert!(!record.compiled());
    }

    #[test]
    fn update_sets_the_save_flag() {
        let _serial = crate::settings::dry_run_test_lock();
        let flag = Arc::new(AtomicBool::new(false));
        let config = BuildConfiguration::new("net-linux-x86_64", "master", PackageKind::Runtime);
        let mut record = BuildRecord::new(
            "net-linux-x86_64",
            PathBuf::from("/tmp/charm/net-linux-x86_64"),
            config,
            BuildStatus::Unconfigured,
            Arc::clone(&flag),
        );
        flag.store(false, Ordering::SeqCst);
        record.update(BuildStatus::Configuring, None);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn continue_rules() {
        let mut record = record();
        record.update(BuildStatus::ConfigureFailed, None);
        assert!(record.check_continue(false).is_ok());

        record.update(BuildStatus::Complete, None);
        assert!(matches!(
            record.check_continue(false),
            Err(BuildError::BuildAlreadyComplete(_))
        ));
        assert!(record.check_continue(true).is_ok());
    }

    #[test]
    #[should_panic(expected = "does not match directory")]
    fn name_directory_mismatch_is_fatal() {
        let config = BuildConfiguration::new("net-linux-x86_64", "master", PackageKind::Runtime);
        let _ = BuildRecord::new(
            "wrong-name",
            PathBuf::from("/tmp/charm/net-linux-x86_64"),
            config,
            BuildStatus::Unconfigured,
            Arc::new(AtomicBool::new(false)),
        );
    }
}
