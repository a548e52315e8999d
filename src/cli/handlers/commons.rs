// src/cli/handlers/commons.rs

//! Helpers shared by the command handlers.

use anyhow::{Context, Result};

use crate::core::registry::PackageSet;

/// Locate the managed directory at or above the working directory and
/// load its package set.
pub fn load_package_set() -> Result<PackageSet> {
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    let directory = PackageSet::find_directory(&cwd)
        .context("no managed directory found; run 'chimi init' first")?;
    PackageSet::load(&directory).context("failed to load the package set manifest")
}
