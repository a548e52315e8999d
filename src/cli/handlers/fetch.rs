// src/cli/handlers/fetch.rs

use anyhow::{bail, Result};
use colored::Colorize;

use crate::cli::args::FetchArgs;
use crate::cli::handlers::commons;
use crate::constants::{APPLICATION_REPOSITORY, RUNTIME_REPOSITORY};
use crate::models::PackageKind;
use crate::system::vcs;
use crate::CancellationToken;

pub fn handle(args: &FetchArgs, token: &CancellationToken) -> Result<()> {
    let set = commons::load_package_set()?;

    for requested in &args.packages {
        if !set.packages.contains_key(requested) {
            bail!("unknown package '{requested}'");
        }
    }

    for (name, package) in &set.packages {
        if !args.packages.is_empty() && !args.packages.contains(name) {
            continue;
        }
        let url = match package.definition {
            PackageKind::Runtime => RUNTIME_REPOSITORY,
            PackageKind::Application => APPLICATION_REPOSITORY,
        };
        vcs::clone_or_update(url, &package.directory, token)?;
        println!("{} {name} is up to date", "✔".green());
    }

    set.close()?;
    Ok(())
}
