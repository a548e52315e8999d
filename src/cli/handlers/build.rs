// src/cli/handlers/build.rs

use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};
use colored::Colorize;
use log::{info, warn};
use uuid::Uuid;

use crate::cli::args::{BuildArgs, BuildTarget};
use crate::cli::handlers::commons;
use crate::constants::{APPLICATION_PACKAGE, RUNTIME_PACKAGE};
use crate::core::arch::ArchitectureCatalog;
use crate::core::definition::{
    self, build_application, build_runtime, discover_preexisting_builds, BuildFlags,
};
use crate::core::registry::{PackageSet, PurgeSelector};
use crate::core::resolver::{self, ResolveRequest};
use crate::models::{BuildConfiguration, HostDefaults, PackageKind};
use crate::settings;
use crate::CancellationToken;

pub fn handle(args: &BuildArgs, token: &CancellationToken) -> Result<()> {
    let mut set = commons::load_package_set()?;

    let runtime_dir = set
        .package(RUNTIME_PACKAGE)
        .map(|p| p.directory.clone())
        .context("the package set has no runtime package")?;
    let catalog = ArchitectureCatalog::load(&runtime_dir)
        .context("cannot read architectures; run 'chimi fetch' first")?;

    let host = HostDefaults::load_for_current_host().unwrap_or_else(|err| {
        warn!("ignoring host defaults: {err}");
        HostDefaults::default()
    });

    let mut extras: Vec<String> = args.include_dirs.iter().map(|d| format!("-I{d}")).collect();
    extras.extend(args.lib_dirs.iter().map(|d| format!("-L{d}")));

    let runtime_branch = set
        .package(RUNTIME_PACKAGE)
        .and_then(|p| p.current_branch())
        .unwrap_or_else(|| "master".to_string());

    let arch_names: Vec<String> = catalog.names().map(str::to_string).collect();
    let found = discover_preexisting_builds(&mut set, &arch_names, &runtime_branch);
    if found > 0 {
        info!("registered {found} preexisting runtime build(s)");
    }

    let flags = BuildFlags {
        continue_build: args.continue_build,
        replace: args.replace,
        force: args.force,
    };

    match args.target {
        BuildTarget::Charm => {
            let branch = args.branch.as_deref().unwrap_or(&runtime_branch);
            let config = resolver::resolve(
                &ResolveRequest {
                    package: PackageKind::Runtime,
                    architecture: args.arch.as_deref(),
                    options: &args.options,
                    extras: &extras,
                    branch,
                    ignore_unknown: args.ignore_unknown,
                    force: args.force,
                },
                &catalog,
                &BTreeMap::new(),
                &host,
            )?;
            if let Some(values) = &args.purge {
                purge(&mut set, RUNTIME_PACKAGE, &config, values)?;
            } else {
                let directory = build_runtime(&mut set, &config, &flags, token)?;
                println!("{} runtime build at {}", "✔".green(), directory.display());
            }
        }
        BuildTarget::All | BuildTarget::Changa => {
            let app_dir = set
                .package(APPLICATION_PACKAGE)
                .map(|p| p.directory.clone())
                .context("the package set has no application package")?;
            let configure_options = match definition::load_configure_options(&app_dir) {
                Ok(options) => options,
                Err(err) => {
                    warn!("could not scrape configure options: {err}");
                    BTreeMap::new()
                }
            };

            let branch = match &args.branch {
                Some(branch) => branch.clone(),
                None => set
                    .package(APPLICATION_PACKAGE)
                    .and_then(|p| p.current_branch())
                    .unwrap_or_else(|| "master".to_string()),
            };

            let config = resolver::resolve(
                &ResolveRequest {
                    package: PackageKind::Application,
                    architecture: args.arch.as_deref(),
                    options: &args.options,
                    extras: &extras,
                    branch: &branch,
                    ignore_unknown: args.ignore_unknown,
                    force: args.force,
                },
                &catalog,
                &configure_options,
                &host,
            )?;

            if let Some(values) = &args.purge {
                purge(&mut set, APPLICATION_PACKAGE, &config, values)?;
            } else {
                // The matching runtime configuration reuses the same raw
                // tokens; anything the application's configure script owns
                // is simply not meaningful to Charm and gets skipped.
                let runtime_config = resolver::resolve(
                    &ResolveRequest {
                        package: PackageKind::Runtime,
                        architecture: Some(&config.architecture),
                        options: &args.options,
                        extras: &[],
                        branch: &runtime_branch,
                        ignore_unknown: true,
                        force: args.force,
                    },
                    &catalog,
                    &BTreeMap::new(),
                    &host,
                )?;
                let directory =
                    build_application(&mut set, &config, &runtime_config, &flags, token)?;
                println!("{} application build at {}", "✔".green(), directory.display());
            }
        }
    }

    set.close()?;
    Ok(())
}

/// Remove builds matching the resolved configuration, or the listed
/// names/ids, deleting their directories as they go.
fn purge(
    set: &mut PackageSet,
    package_name: &str,
    config: &BuildConfiguration,
    values: &[String],
) -> Result<()> {
    let selector = if values.is_empty() {
        PurgeSelector::Config(config.clone())
    } else if values.len() == 1 && values[0] == "all" {
        PurgeSelector::All
    } else {
        let mut names = Vec::new();
        let mut ids = Vec::new();
        for value in values {
            match Uuid::parse_str(value) {
                Ok(id) => ids.push(id),
                Err(_) => names.push(value.clone()),
            }
        }
        PurgeSelector::NamesOrIds { names, ids }
    };

    let save_flag = set.save_flag();
    let package = set
        .package_mut(package_name)
        .with_context(|| format!("the package set has no package '{package_name}'"))?;
    let count = package.purge_builds(&selector, &save_flag, |record| {
        if settings::dry_run() {
            println!("would remove {}", record.directory.display());
        } else {
            println!("removing {}", record.directory.display());
            if let Err(err) = fs::remove_dir_all(&record.directory) {
                warn!("could not remove '{}': {err}", record.directory.display());
            }
        }
    });
    println!("{count} build(s) purged");
    Ok(())
}
