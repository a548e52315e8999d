// src/system/vcs.rs

//! Git collaborator.
//!
//! Fetching and branch queries shell out to the `git` binary; the rest
//! of the crate never parses repository internals itself.

use std::path::Path;

use log::info;
use thiserror::Error;

use crate::system::executor::{self, ExecutionError};
use crate::CancellationToken;

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("git operation failed: {0}")]
    Git(#[from] ExecutionError),
}

fn git(parts: &[&str]) -> Vec<String> {
    let mut argv = vec!["git".to_string()];
    argv.extend(parts.iter().map(|s| (*s).to_string()));
    argv
}

/// Clone `url` into `directory`, or pull if a checkout already exists.
pub fn clone_or_update(
    url: &str,
    directory: &Path,
    token: &CancellationToken,
) -> Result<(), VcsError> {
    if directory.join(".git").is_dir() {
        info!("updating checkout in {}", directory.display());
        executor::invoke(&git(&["pull", "origin"]), directory, token)?;
    } else {
        info!("cloning {url} into {}", directory.display());
        let parent = directory.parent().unwrap_or_else(|| Path::new("."));
        let target = directory
            .file_name()
            .map_or_else(|| directory.display().to_string(), |n| n.to_string_lossy().into_owned());
        executor::invoke(&git(&["clone", url, &target]), parent, token)?;
    }
    Ok(())
}

/// The branch the checkout currently has checked out.
pub fn current_branch(directory: &Path) -> Result<String, VcsError> {
    let out = executor::capture(&git(&["symbolic-ref", "HEAD"]), directory)?;
    Ok(strip_ref_prefix(out.trim()).to_string())
}

/// Local branch names, `heads/` prefix stripped.
pub fn branches(directory: &Path) -> Result<Vec<String>, VcsError> {
    let out = executor::capture(
        &git(&["for-each-ref", "--format=%(refname:short)", "refs/heads"]),
        directory,
    )?;
    Ok(out
        .lines()
        .map(|line| strip_ref_prefix(line.trim()).to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

fn strip_ref_prefix(name: &str) -> &str {
    let name = name.strip_prefix("refs/").unwrap_or(name);
    name.strip_prefix("heads/").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_prefixes_are_stripped() {
        assert_eq!(strip_ref_prefix("refs/heads/master"), "master");
        assert_eq!(strip_ref_prefix("heads/production"), "production");
        assert_eq!(strip_ref_prefix("master"), "master");
    }
}
