// src/core/definition.rs

//! Package build drivers.
//!
//! Turns a resolved [`BuildConfiguration`] into build-tool invocations
//! and the matching [`BuildRecord`] state transitions. The runtime
//! package builds via Charm++'s `./build` script; the application
//! configures against a finished runtime build and then runs `make`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;

use crate::constants::{APPLICATION_PACKAGE, BUILDS_DIR, RUNTIME_PACKAGE};
use crate::core::build::{BuildError, BuildRecord, BuildStatus};
use crate::core::options::{parse_configure_help, OptionParseError};
use crate::core::registry::{PackageSet, RegistryError};
use crate::models::{BuildConfiguration, ConfigureOption, PackageKind, SettingValue};
use crate::settings;
use crate::system::executor::{self, ExecutionError};
use crate::CancellationToken;

#[derive(Error, Debug)]
pub enum DriveError {
    #[error("build interrupted")]
    Interrupted,

    #[error("package '{0}' is not part of this package set")]
    MissingPackage(&'static str),

    #[error("package '{0}' has not been fetched yet")]
    NotFetched(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Options(#[from] OptionParseError),

    #[error("I/O error in build directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Flags carried from the CLI into a build run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildFlags {
    pub continue_build: bool,
    pub replace: bool,
    pub force: bool,
}

/// Human-readable build name, doubling as the directory basename.
///
/// Runtime builds are named after the architecture and component list;
/// application builds additionally carry the branch.
pub fn build_name(config: &BuildConfiguration) -> String {
    let mut name = config.architecture.clone();
    for component in &config.components {
        name.push('-');
        name.push_str(component);
    }
    match config.package {
        PackageKind::Runtime => name,
        PackageKind::Application => format!("{name}+{}", config.branch),
    }
}

/// Where a build of `config` lives under its package directory.
pub fn build_directory(config: &BuildConfiguration, package_dir: &Path) -> PathBuf {
    match config.package {
        PackageKind::Runtime => package_dir.join(build_name(config)),
        PackageKind::Application => package_dir.join(BUILDS_DIR).join(build_name(config)),
    }
}

/// Configure-script arguments for a configuration's features and settings.
///
/// Settings that double as architecture components (a `name=value` token
/// on an architecture option) are skipped; they already travel in the
/// component list.
pub fn configure_flags(config: &BuildConfiguration) -> Vec<String> {
    let mut flags = Vec::new();
    for (name, value) in &config.settings {
        if config.package == PackageKind::Runtime && config.has_component(name) {
            continue;
        }
        match value {
            SettingValue::Flag(true) => flags.push(format!("--with-{name}")),
            SettingValue::Flag(false) => flags.push(format!("--without-{name}")),
            SettingValue::Value(v) => flags.push(format!("--with-{name}={v}")),
        }
    }
    for (name, enabled) in &config.features {
        if *enabled {
            flags.push(format!("--enable-{name}"));
        } else {
            flags.push(format!("--disable-{name}"));
        }
    }
    flags
}

/// Fold `-I`/`-L` extras into the variable assignments autoconf expects;
/// anything else passes through untouched.
fn fold_extras(extras: &[String]) -> Vec<String> {
    let mut cppflags: Vec<&str> = Vec::new();
    let mut ldflags: Vec<&str> = Vec::new();
    let mut rest = Vec::new();
    for extra in extras {
        if extra.starts_with("-I") {
            cppflags.push(extra);
        } else if extra.starts_with("-L") {
            ldflags.push(extra);
        } else {
            rest.push(extra.clone());
        }
    }
    if !cppflags.is_empty() {
        rest.push(format!("CPPFLAGS={}", cppflags.join(" ")));
    }
    if !ldflags.is_empty() {
        rest.push(format!("LDFLAGS={}", ldflags.join(" ")));
    }
    rest
}

/// Scrape the switches a package's configure script exposes.
pub fn load_configure_options(
    package_dir: &Path,
) -> Result<BTreeMap<String, ConfigureOption>, DriveError> {
    let configure = package_dir.join("configure");
    if !configure.is_file() {
        return Err(DriveError::NotFetched(package_dir.display().to_string()));
    }
    let help = executor::capture(
        &[configure.display().to_string(), "--help".to_string()],
        package_dir,
    )?;
    Ok(parse_configure_help(&help)?)
}

fn update_build(
    set: &mut PackageSet,
    package_name: &str,
    config: &BuildConfiguration,
    status: BuildStatus,
    message: Option<String>,
) {
    if let Some(package) = set.package_mut(package_name) {
        if let Some(record) = package.find_build_mut(config) {
            record.update(status, message);
        }
    }
}

/// Translate an invocation outcome into status transitions.
///
/// An interrupt records `InterruptedByUser` and flushes the manifest
/// unconditionally, dry-run included, so the interruption itself is
/// never lost.
fn settle(
    set: &mut PackageSet,
    package_name: &str,
    config: &BuildConfiguration,
    outcome: Result<(), ExecutionError>,
    success: BuildStatus,
    failure: BuildStatus,
) -> Result<(), DriveError> {
    match outcome {
        Ok(()) => {
            update_build(set, package_name, config, success, None);
            Ok(())
        }
        Err(ExecutionError::Interrupted(command)) => {
            update_build(
                set,
                package_name,
                config,
                BuildStatus::InterruptedByUser,
                Some(format!("interrupted while running: {command}")),
            );
            set.save_forced()?;
            Err(DriveError::Interrupted)
        }
        Err(err) => {
            update_build(set, package_name, config, failure, Some(err.to_string()));
            set.save()?;
            Err(err.into())
        }
    }
}

/// Register (or locate) the record a build run will act on.
///
/// Returns the build directory. `continue_build` requires a matching
/// record; otherwise a new record is created unless a finished matching
/// build already exists.
fn prepare_record(
    set: &mut PackageSet,
    package_name: &'static str,
    config: &BuildConfiguration,
    flags: &BuildFlags,
) -> Result<(PathBuf, bool), DriveError> {
    let save_flag = set.save_flag();
    let package = set
        .package_mut(package_name)
        .ok_or(DriveError::MissingPackage(package_name))?;
    let directory = build_directory(config, &package.directory);

    if flags.continue_build {
        let record = package
            .find_build(config)
            .ok_or(BuildError::NoMatchingBuildToContinue)?;
        record.check_continue(flags.force)?;
        return Ok((record.directory.clone(), false));
    }

    if let Some(existing) = package.find_build(config) {
        if existing.compiled() && !flags.force {
            info!("build '{}' is already complete", existing.name);
            return Ok((existing.directory.clone(), true));
        }
        return Ok((existing.directory.clone(), false));
    }

    let initial = if directory.is_dir() {
        BuildStatus::PreexistingBuild
    } else {
        BuildStatus::Unconfigured
    };
    let record = BuildRecord::new(
        build_name(config),
        directory.clone(),
        config.clone(),
        initial,
        Arc::clone(&save_flag),
    );
    package.add_build(record, flags.replace, &save_flag)?;
    Ok((directory, false))
}

/// Build the runtime package. Returns the build directory.
pub fn build_runtime(
    set: &mut PackageSet,
    config: &BuildConfiguration,
    flags: &BuildFlags,
    token: &CancellationToken,
) -> Result<PathBuf, DriveError> {
    let (directory, finished) = prepare_record(set, RUNTIME_PACKAGE, config, flags)?;
    if finished {
        return Ok(directory);
    }
    let package_dir = set
        .package(RUNTIME_PACKAGE)
        .ok_or(DriveError::MissingPackage(RUNTIME_PACKAGE))?
        .directory
        .clone();
    if !package_dir.join("build").is_file() {
        return Err(DriveError::NotFetched(package_dir.display().to_string()));
    }

    update_build(set, RUNTIME_PACKAGE, config, BuildStatus::Compiling, None);
    let outcome = if flags.continue_build {
        // Charm's build script already configured this tree; re-enter the
        // compile step directly.
        executor::invoke(&["gmake".to_string()], &directory.join("tmp"), token)
    } else {
        let mut argv = vec![
            "./build".to_string(),
            "ChaNGa".to_string(),
            config.architecture.clone(),
        ];
        argv.extend(config.components.iter().cloned());
        argv.extend(configure_flags(config));
        argv.extend(config.extras.iter().cloned());
        executor::invoke(&argv, &package_dir, token)
    };
    settle(
        set,
        RUNTIME_PACKAGE,
        config,
        outcome,
        BuildStatus::Complete,
        BuildStatus::CompileFailed,
    )?;
    set.save()?;
    Ok(directory)
}

/// Build the application package against a matching runtime build,
/// creating that runtime build first if none is finished.
pub fn build_application(
    set: &mut PackageSet,
    config: &BuildConfiguration,
    runtime_config: &BuildConfiguration,
    flags: &BuildFlags,
    token: &CancellationToken,
) -> Result<PathBuf, DriveError> {
    let existing_runtime = set
        .package(RUNTIME_PACKAGE)
        .ok_or(DriveError::MissingPackage(RUNTIME_PACKAGE))?
        .find_builds(runtime_config)
        .into_iter()
        .find(|b| b.compiled())
        .map(|b| (b.name.clone(), b.directory.clone()));
    let runtime_dir = match existing_runtime {
        Some((name, directory)) => {
            info!("using runtime build '{name}'");
            directory
        }
        None => {
            info!("no finished runtime build matches; building one first");
            build_runtime(set, runtime_config, &BuildFlags::default(), token)?
        }
    };

    let (directory, finished) = prepare_record(set, APPLICATION_PACKAGE, config, flags)?;
    if finished {
        return Ok(directory);
    }
    let package_dir = set
        .package(APPLICATION_PACKAGE)
        .ok_or(DriveError::MissingPackage(APPLICATION_PACKAGE))?
        .directory
        .clone();
    if !package_dir.join("configure").is_file() {
        return Err(DriveError::NotFetched(package_dir.display().to_string()));
    }

    if !settings::dry_run() {
        fs::create_dir_all(&directory).map_err(|source| DriveError::Io {
            path: directory.clone(),
            source,
        })?;
    }

    let already_configured = set
        .package(APPLICATION_PACKAGE)
        .and_then(|p| p.find_build(config))
        .is_some_and(BuildRecord::configured);

    if !(flags.continue_build && already_configured) {
        update_build(set, APPLICATION_PACKAGE, config, BuildStatus::Configuring, None);
        let mut argv = vec![package_dir.join("configure").display().to_string()];
        argv.extend(configure_flags(config));
        argv.extend(fold_extras(&config.extras));
        argv.push(format!("CHARMC={}", runtime_dir.join("bin/charmc").display()));
        let outcome = executor::invoke(&argv, &directory, token);
        settle(
            set,
            APPLICATION_PACKAGE,
            config,
            outcome,
            BuildStatus::Configured,
            BuildStatus::ConfigureFailed,
        )?;
    }

    update_build(set, APPLICATION_PACKAGE, config, BuildStatus::Compiling, None);
    let outcome = executor::invoke(&["make".to_string()], &directory, token);
    settle(
        set,
        APPLICATION_PACKAGE,
        config,
        outcome,
        BuildStatus::Complete,
        BuildStatus::CompileFailed,
    )?;
    set.save()?;
    Ok(directory)
}

/// Register records for runtime build directories this tool did not
/// create, so they participate in lookup. The directory name is parsed
/// back into an architecture and component list; unparseable directories
/// are skipped. Returns how many records were added.
pub fn discover_preexisting_builds(
    set: &mut PackageSet,
    known_arch_names: &[String],
    branch: &str,
) -> usize {
    let save_flag = set.save_flag();
    let Some(package) = set.package_mut(RUNTIME_PACKAGE) else {
        return 0;
    };
    let Ok(entries) = fs::read_dir(&package.directory) else {
        return 0;
    };

    let mut added = 0;
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // Longest architecture prefix wins: "net-linux-x86_64-cuda-smp"
        // must match "net-linux-x86_64", not "net".
        let Some(arch) = known_arch_names
            .iter()
            .filter(|a| name == **a || name.starts_with(&format!("{a}-")))
            .max_by_key(|a| a.len())
        else {
            continue;
        };
        if package.builds.iter().any(|b| b.directory == entry.path()) {
            continue;
        }

        let mut config = BuildConfiguration::new(arch.clone(), branch, PackageKind::Runtime);
        if name.len() > arch.len() {
            config.components = name[arch.len() + 1..]
                .split('-')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.canonicalize();

        // The record keeps the on-disk name: the directory may list its
        // components in a different order than the canonical form.
        let record = BuildRecord::new(
            name.clone(),
            entry.path(),
            config,
            BuildStatus::PreexistingBuild,
            Arc::clone(&save_flag),
        );
        match package.add_build(record, false, &save_flag) {
            Ok(()) => added += 1,
            Err(err) => warn!("skipping preexisting build '{name}': {err}"),
        }
    }
    added
}
