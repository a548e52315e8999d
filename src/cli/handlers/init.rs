// src/cli/handlers/init.rs

use std::fs;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::cli::args::InitArgs;
use crate::constants::SET_FILE;
use crate::core::registry::PackageSet;
use crate::settings;

pub fn handle(args: &InitArgs) -> Result<()> {
    let directory = match &args.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };

    if directory.join(SET_FILE).is_file() {
        bail!("'{}' is already a managed directory", directory.display());
    }

    if settings::dry_run() {
        println!("would initialize managed directory {}", directory.display());
        return Ok(());
    }

    fs::create_dir_all(&directory)
        .with_context(|| format!("cannot create directory '{}'", directory.display()))?;
    let set = PackageSet::create(&directory)?;
    println!(
        "{} initialized managed directory {}",
        "✔".green(),
        set.directory.display()
    );
    println!("next: 'chimi fetch' to clone the source trees");
    Ok(())
}
