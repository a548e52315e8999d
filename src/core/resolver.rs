// src/core/resolver.rs

//! Configuration resolution.
//!
//! Merges the user's raw option tokens, the architecture's legal option
//! set, the configure script's exposed switches, and the host defaults
//! into one canonical [`BuildConfiguration`]. The stage ordering is
//! load-bearing: negations are applied after host defaults so a
//! default-enabled component can still be turned off explicitly, and a
//! final legality filter drops, with a diagnostic, anything the host
//! rules pulled in that the architecture does not support.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

use crate::constants::{CUDA_CANDIDATE_DIRS, DEFAULT_COMMS_TYPE};
use crate::core::arch::{ArchError, ArchitectureCatalog};
use crate::core::options::{tokenize_options, OptionToken};
use crate::models::{
    BuildConfiguration, ConfigureOption, ConfigureOptionKind, HostDefaults, PackageKind,
    SettingValue,
};

/// How an architecture name entered the resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchQualifier {
    Explicit,
    AutoSelected,
    AutoCompleted,
}

impl fmt::Display for ArchQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicitly given"),
            Self::AutoSelected => write!(f, "auto-selected for this host"),
            Self::AutoCompleted => write!(f, "auto-completed from a base architecture"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid architecture '{name}' ({qualifier})")]
    InvalidArchitecture {
        name: String,
        qualifier: ArchQualifier,
    },

    #[error("invalid build option '{option}'{}", raw_context(.option, .raw_form))]
    InvalidBuildOption { option: String, raw_form: String },

    #[error("path '{path}' given to {flag} does not exist")]
    MissingPath { path: String, flag: String },

    #[error(transparent)]
    Arch(#[from] ArchError),
}

fn raw_context(option: &str, raw_form: &str) -> String {
    if option == raw_form {
        String::new()
    } else {
        format!(" (from '{raw_form}')")
    }
}

/// Everything the caller supplies for one resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub package: PackageKind,
    pub architecture: Option<&'a str>,
    /// Raw comma-separated option lists, one per `-o` occurrence.
    pub options: &'a [String],
    pub extras: &'a [String],
    pub branch: &'a str,
    /// Skip unknown option tokens instead of failing.
    pub ignore_unknown: bool,
    /// Skip the `-I`/`-L` path existence checks.
    pub force: bool,
}

/// The platform probe used when no architecture is given: communication
/// transport plus the OS/machine pair of the running host.
pub fn probe_architecture() -> String {
    format!(
        "{DEFAULT_COMMS_TYPE}-{}-{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn host_suffix() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Resolve a request into a canonical configuration.
pub fn resolve(
    req: &ResolveRequest<'_>,
    catalog: &ArchitectureCatalog,
    configure_options: &BTreeMap<String, ConfigureOption>,
    host: &HostDefaults,
) -> Result<BuildConfiguration, ResolveError> {
    let (arch_name, _qualifier) = choose_architecture(req.architecture, catalog, host)?;
    let arch_options = catalog.all_options(&arch_name)?;

    let mut config = BuildConfiguration::new(arch_name, req.branch, req.package);
    let mut negated: BTreeSet<String> = BTreeSet::new();

    for raw_list in req.options {
        for token in tokenize_options(raw_list) {
            classify_token(
                token,
                &arch_options,
                configure_options,
                req.ignore_unknown,
                &mut config,
                &mut negated,
            )?;
        }
    }

    for extra in req.extras {
        check_extra_path(extra, req.force)?;
        if !config.extras.contains(extra) {
            config.extras.push(extra.clone());
        }
    }

    // A cuda component without an explicit toolkit directory gets one
    // probed from the environment when possible.
    if config.has_component("cuda") && !config.settings.contains_key("cuda") {
        if let Some(dir) = find_cuda_dir() {
            debug!("detected CUDA toolkit at {dir}");
            config.settings.insert("cuda".into(), SettingValue::Value(dir));
        }
    }

    host.apply(&mut config, &arch_options, &negated);

    config.components.retain(|c| !negated.contains(c));

    // Legality backstop: a legal host rule can still name an illegal
    // prerequisite.
    let mut dropped: Vec<String> = Vec::new();
    config.components.retain(|c| {
        let legal = arch_options.contains(c);
        if !legal {
            dropped.push(c.clone());
        }
        legal
    });
    for name in dropped {
        warn!("dropping option '{name}': not supported by architecture '{}'", config.architecture);
    }

    config.canonicalize();
    Ok(config)
}

fn choose_architecture(
    requested: Option<&str>,
    catalog: &ArchitectureCatalog,
    host: &HostDefaults,
) -> Result<(String, ArchQualifier), ResolveError> {
    let (name, qualifier) = match requested {
        Some(name) => (name.to_string(), ArchQualifier::Explicit),
        None => {
            let name = host
                .default_architecture
                .clone()
                .unwrap_or_else(probe_architecture);
            (name, ArchQualifier::AutoSelected)
        }
    };

    let arch = catalog
        .get(&name)
        .map_err(|_| ResolveError::InvalidArchitecture {
            name: name.clone(),
            qualifier,
        })?;

    if !arch.is_base {
        return Ok((name, qualifier));
    }

    // A base name is shorthand; pick the child matching this host, or the
    // first child when none does.
    let qualifier = if qualifier == ArchQualifier::Explicit {
        ArchQualifier::AutoCompleted
    } else {
        qualifier
    };
    let suffix = host_suffix();
    let completed = arch
        .children
        .iter()
        .find(|child| child.ends_with(&suffix))
        .or_else(|| arch.children.first())
        .cloned()
        .ok_or(ResolveError::InvalidArchitecture { name, qualifier })?;
    debug!("completed base architecture to '{completed}'");
    Ok((completed, qualifier))
}

fn classify_token(
    token: OptionToken,
    arch_options: &BTreeSet<String>,
    configure_options: &BTreeMap<String, ConfigureOption>,
    ignore_unknown: bool,
    config: &mut BuildConfiguration,
    negated: &mut BTreeSet<String>,
) -> Result<(), ResolveError> {
    if arch_options.contains(token.name()) {
        match token {
            OptionToken::Enable { name, .. } => config.add_component(name),
            OptionToken::Negate { name, .. } => {
                negated.insert(name);
            }
            OptionToken::Assign { name, value, .. } => {
                config.add_component(name.clone());
                config.settings.insert(name, SettingValue::Value(value));
            }
        }
        return Ok(());
    }

    if let Some(option) = configure_options.get(token.name()) {
        match (option.kind, token) {
            (ConfigureOptionKind::Enable, OptionToken::Enable { name, .. }) => {
                config.features.insert(name, true);
            }
            (ConfigureOptionKind::Enable, OptionToken::Negate { name, .. }) => {
                config.features.insert(name, false);
            }
            (ConfigureOptionKind::With, OptionToken::Enable { name, .. }) => {
                config.settings.insert(name, SettingValue::Flag(true));
            }
            (ConfigureOptionKind::With, OptionToken::Negate { name, .. }) => {
                config.settings.insert(name, SettingValue::Flag(false));
            }
            (_, OptionToken::Assign { name, value, .. }) => {
                config.settings.insert(name, SettingValue::Value(value));
            }
        }
        return Ok(());
    }

    if ignore_unknown {
        debug!("ignoring unknown option '{}'", token.raw());
        return Ok(());
    }
    Err(ResolveError::InvalidBuildOption {
        option: token.name().to_string(),
        raw_form: token.raw().to_string(),
    })
}

fn check_extra_path(extra: &str, force: bool) -> Result<(), ResolveError> {
    if force {
        return Ok(());
    }
    for flag in ["-I", "-L"] {
        if let Some(path) = extra.strip_prefix(flag) {
            if !path.is_empty() && !Path::new(path).exists() {
                return Err(ResolveError::MissingPath {
                    path: path.to_string(),
                    flag: flag.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn find_cuda_dir() -> Option<String> {
    for (key, value) in std::env::vars() {
        if key.contains("CUDA_DIR") && Path::new(&value).is_dir() {
            return Some(value);
        }
    }
    CUDA_CANDIDATE_DIRS
        .iter()
        .find(|dir| Path::new(dir).is_dir())
        .map(|dir| (*dir).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ARCH_DIR;
    use crate::models::HostComponentRule;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn fixture_catalog() -> (TempDir, ArchitectureCatalog) {
        let tmp = TempDir::new().unwrap();
        let arch = tmp.path().join(ARCH_DIR);
        fs::create_dir_all(arch.join("net")).unwrap();
        fs::create_dir_all(arch.join("net-linux-x86_64")).unwrap();
        for name in ["cuda", "mpi", "ibverbs", "smp", "opt", "pthreads"] {
            File::create(arch.join(format!("net-linux-x86_64/conv-mach-{name}.h"))).unwrap();
        }
        let catalog = ArchitectureCatalog::load(tmp.path()).unwrap();
        (tmp, catalog)
    }

    fn host_with_ibverbs_default() -> HostDefaults {
        let mut host = HostDefaults::default();
        host.components.insert(
            "ibverbs".into(),
            HostComponentRule {
                enable_by_default: true,
                prerequisite_components: ["smp".to_string()].into_iter().collect(),
                ..Default::default()
            },
        );
        host
    }

    fn request<'a>(arch: Option<&'a str>, options: &'a [String]) -> ResolveRequest<'a> {
        ResolveRequest {
            package: PackageKind::Runtime,
            architecture: arch,
            options,
            extras: &[],
            branch: "master",
            ignore_unknown: false,
            force: false,
        }
    }

    #[test]
    fn negation_beats_host_default_and_its_prerequisites() {
        let (_tmp, catalog) = fixture_catalog();
        let options = vec!["cuda,mpi,-ibverbs,opt=5".to_string()];
        let config = resolve(
            &request(Some("net-linux-x86_64"), &options),
            &catalog,
            &BTreeMap::new(),
            &host_with_ibverbs_default(),
        )
        .unwrap();

        assert_eq!(config.components, vec!["cuda", "mpi", "opt"]);
        assert_eq!(config.settings.get("opt"), Some(&SettingValue::Value("5".into())));
        assert!(!config.has_component("ibverbs"));
        assert!(!config.has_component("smp"));
    }

    #[test]
    fn host_default_brings_prerequisites_when_not_negated() {
        let (_tmp, catalog) = fixture_catalog();
        let options = vec!["cuda".to_string()];
        let config = resolve(
            &request(Some("net-linux-x86_64"), &options),
            &catalog,
            &BTreeMap::new(),
            &host_with_ibverbs_default(),
        )
        .unwrap();
        assert!(config.has_component("ibverbs"));
        assert!(config.has_component("smp"));
    }

    #[test]
    fn stale_host_rule_has_no_effect() {
        let (_tmp, catalog) = fixture_catalog();
        let mut host = HostDefaults::default();
        let mut rule = HostComponentRule {
            enable_by_default: true,
            prerequisite_components: ["smp".to_string()].into_iter().collect(),
            ..Default::default()
        };
        rule.settings.insert("memory".into(), SettingValue::Value("os".into()));
        host.components.insert("pami".into(), rule);
        let config = resolve(
            &request(Some("net-linux-x86_64"), &[]),
            &catalog,
            &BTreeMap::new(),
            &host,
        )
        .unwrap();
        assert!(!config.has_component("pami"));
        assert!(!config.has_component("smp"));
        assert!(config.settings.is_empty());
    }

    #[test]
    fn base_architecture_name_is_completed() {
        let (_tmp, catalog) = fixture_catalog();
        let config = resolve(
            &request(Some("net"), &[]),
            &catalog,
            &BTreeMap::new(),
            &HostDefaults::default(),
        )
        .unwrap();
        assert_eq!(config.architecture, "net-linux-x86_64");
    }

    #[test]
    fn unknown_architecture_reports_qualifier() {
        let (_tmp, catalog) = fixture_catalog();
        let err = resolve(
            &request(Some("bluegene"), &[]),
            &catalog,
            &BTreeMap::new(),
            &HostDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidArchitecture { ref name, qualifier }
                if name == "bluegene" && qualifier == ArchQualifier::Explicit
        ));
    }

    #[test]
    fn unknown_option_reports_raw_form() {
        let (_tmp, catalog) = fixture_catalog();
        let options = vec!["cuda,bogus".to_string()];
        let err = resolve(
            &request(Some("net-linux-x86_64"), &options),
            &catalog,
            &BTreeMap::new(),
            &HostDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidBuildOption { ref option, .. } if option == "bogus"
        ));
    }

    #[test]
    fn ignore_unknown_skips_bad_tokens() {
        let (_tmp, catalog) = fixture_catalog();
        let options = vec!["cuda,bogus".to_string()];
        let config = resolve(
            &ResolveRequest {
                ignore_unknown: true,
                ..request(Some("net-linux-x86_64"), &options)
            },
            &catalog,
            &BTreeMap::new(),
            &HostDefaults::default(),
        )
        .unwrap();
        assert_eq!(config.components, vec!["cuda"]);
    }

    #[test]
    fn configure_options_become_features_and_settings() {
        let (_tmp, catalog) = fixture_catalog();
        let mut configure: BTreeMap<String, ConfigureOption> = BTreeMap::new();
        configure.insert(
            "rtc".into(),
            ConfigureOption {
                kind: ConfigureOptionKind::Enable,
                name: "rtc".into(),
                default: false,
            },
        );
        configure.insert(
            "fftw".into(),
            ConfigureOption {
                kind: ConfigureOptionKind::With,
                name: "fftw".into(),
                default: true,
            },
        );
        let options = vec!["rtc,-fftw".to_string()];
        let config = resolve(
            &ResolveRequest {
                package: PackageKind::Application,
                ..request(Some("net-linux-x86_64"), &options)
            },
            &catalog,
            &configure,
            &HostDefaults::default(),
        )
        .unwrap();
        assert_eq!(config.features.get("rtc"), Some(&true));
        assert_eq!(config.settings.get("fftw"), Some(&SettingValue::Flag(false)));
    }

    #[test]
    fn missing_include_path_errors_without_force() {
        let (_tmp, catalog) = fixture_catalog();
        let extras = vec!["-I/definitely/not/a/real/path".to_string()];
        let err = resolve(
            &ResolveRequest {
                extras: &extras,
                ..request(Some("net-linux-x86_64"), &[])
            },
            &catalog,
            &BTreeMap::new(),
            &HostDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::MissingPath { .. }));
    }

    #[test]
    fn force_skips_path_checks() {
        let (_tmp, catalog) = fixture_catalog();
        let extras = vec!["-I/definitely/not/a/real/path".to_string()];
        let config = resolve(
            &ResolveRequest {
                extras: &extras,
                force: true,
                ..request(Some("net-linux-x86_64"), &[])
            },
            &catalog,
            &BTreeMap::new(),
            &HostDefaults::default(),
        )
        .unwrap();
        assert_eq!(config.extras, extras);
    }
}
