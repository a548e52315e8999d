// src/cli/handlers/show.rs

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use colored::Colorize;
use log::debug;

use crate::cli::args::{ArchKind, ShowArchArgs, ShowArgs, ShowBuildsArgs, ShowCommand};
use crate::cli::handlers::commons;
use crate::constants::RUNTIME_PACKAGE;
use crate::core::arch::{Architecture, ArchitectureCatalog};
use crate::core::registry::PackageSet;

pub fn handle(args: &ShowArgs) -> Result<()> {
    match &args.what {
        ShowCommand::Arch(arch_args) => show_arch(arch_args),
        ShowCommand::Builds(build_args) => show_builds(build_args),
    }
}

fn load_catalog(set: &PackageSet) -> Result<ArchitectureCatalog> {
    let runtime_dir = set
        .package(RUNTIME_PACKAGE)
        .map(|p| p.directory.clone())
        .context("the package set has no runtime package")?;
    ArchitectureCatalog::load(&runtime_dir)
        .context("cannot read architectures; run 'chimi fetch' first")
}

fn kind_matches(kind: ArchKind, arch: &Architecture) -> bool {
    match kind {
        ArchKind::All => true,
        ArchKind::Base => arch.is_base,
        ArchKind::Build => !arch.is_base,
    }
}

fn show_arch(args: &ShowArchArgs) -> Result<()> {
    let set = commons::load_package_set()?;
    let catalog = load_catalog(&set)?;

    if !args.names.is_empty() {
        for name in &args.names {
            detail_arch(&catalog, name)?;
        }
        return Ok(());
    }

    if args.list {
        for arch in catalog.iter().filter(|a| kind_matches(args.kind, a)) {
            println!("{}", arch.name);
        }
        return Ok(());
    }

    for arch in catalog.iter().filter(|a| kind_matches(args.kind, a)) {
        let kind = if arch.is_base { "base" } else { "build" };
        println!(
            "{:<28} {kind:<6} {} option(s)",
            arch.name,
            arch.options.len()
        );
    }
    Ok(())
}

fn detail_arch(catalog: &ArchitectureCatalog, name: &str) -> Result<()> {
    let arch = catalog.get(name)?;
    println!("{}{}", arch.name.bold(), if arch.is_base { " (base)" } else { "" });
    if let Some(parent) = &arch.parent {
        println!("  parent: {parent}");
    }
    if !arch.children.is_empty() {
        println!("  children: {}", arch.children.join(", "));
    }
    let options = catalog.all_options(name)?;
    if !options.is_empty() {
        println!(
            "  options: {}",
            options.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if !arch.compilers.is_empty() {
        println!(
            "  compilers: {}",
            arch.compilers.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if !arch.fortran_compilers.is_empty() {
        println!(
            "  fortran compilers: {}",
            arch.fortran_compilers
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

/// The architecture filter accepts a base name and matches every
/// architecture beneath it. Falls back to exact matching when the
/// runtime tree is not available.
fn arch_filter(set: &PackageSet, name: &str) -> BTreeSet<String> {
    let mut accepted: BTreeSet<String> = BTreeSet::new();
    accepted.insert(name.to_string());
    match load_catalog(set) {
        Ok(catalog) => {
            if let Ok(descendants) = catalog.descendants(name) {
                accepted.extend(descendants);
            }
        }
        Err(err) => debug!("architecture filter is exact-match only: {err}"),
    }
    accepted
}

fn show_builds(args: &ShowBuildsArgs) -> Result<()> {
    let set = commons::load_package_set()?;
    let accepted_arches = args.arch.as_deref().map(|name| arch_filter(&set, name));

    for (name, package) in &set.packages {
        if args.package.as_deref().is_some_and(|p| p != name) {
            continue;
        }
        println!("{}", name.bold());
        let mut shown = 0;
        for build in &package.builds {
            if args.branch.as_deref().is_some_and(|b| b != build.config.branch) {
                continue;
            }
            if accepted_arches
                .as_ref()
                .is_some_and(|accepted| !accepted.contains(&build.config.architecture))
            {
                continue;
            }
            shown += 1;
            println!("  {} [{}]", build.name.bold(), build.id);
            println!("    directory: {}", build.directory.display());
            println!(
                "    branch: {}  architecture: {}",
                build.config.branch, build.config.architecture
            );
            if !build.config.components.is_empty() {
                println!("    components: {}", build.config.components.join(", "));
            }
            for message in &build.messages {
                println!("    {message}");
            }
        }
        if shown == 0 {
            println!("  (no matching builds)");
        }
    }
    Ok(())
}
