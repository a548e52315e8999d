// src/core/host.rs

//! Host-specific build defaults.
//!
//! Each machine may carry a YAML file under the user's config directory
//! (`chimi/hosts/<hostname>.yaml`) declaring which components to enable
//! by default, what each component drags in, and an optional default
//! architecture. A host without a file gets empty defaults.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use crate::models::{BuildConfiguration, HostDefaults};

#[derive(Error, Debug)]
pub enum HostError {
    #[error("could not locate a user configuration directory")]
    NoConfigDir,

    #[error("failed to read host defaults file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed host defaults file '{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Best-effort hostname: environment first, then `/etc/hostname`.
pub fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    if let Ok(contents) = fs::read_to_string("/etc/hostname") {
        let name = contents.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    "localhost".to_string()
}

/// Path of the defaults file for a given hostname.
pub fn defaults_path(host: &str) -> Result<PathBuf, HostError> {
    let base = dirs::config_dir().ok_or(HostError::NoConfigDir)?;
    Ok(base.join("chimi").join("hosts").join(format!("{host}.yaml")))
}

impl HostDefaults {
    /// Load the defaults for the current host, or empty defaults when the
    /// host has no file.
    pub fn load_for_current_host() -> Result<Self, HostError> {
        Self::load_for_host(&hostname())
    }

    pub fn load_for_host(host: &str) -> Result<Self, HostError> {
        let path = defaults_path(host)?;
        if !path.is_file() {
            debug!("no host defaults at {}", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).map_err(|source| HostError::Io {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| HostError::Malformed { path, source })
    }

    /// Fold these defaults into a configuration.
    ///
    /// Ordering contract: default-enable first, then the transitive
    /// prerequisite closure over every enabled component, then injected
    /// settings and extras. A rule whose component the architecture does
    /// not support is skipped entirely (no enable, no prerequisites, no
    /// injection), and a component the user negated is never enabled
    /// here. The caller still runs a final legality filter, which catches
    /// an illegal prerequisite of an otherwise legal rule.
    pub fn apply(
        &self,
        config: &mut BuildConfiguration,
        arch_options: &BTreeSet<String>,
        negated: &BTreeSet<String>,
    ) {
        for (name, rule) in &self.components {
            if !arch_options.contains(name) {
                debug!("skipping host rule for '{name}': not supported by this architecture");
                continue;
            }
            if rule.enable_by_default && !negated.contains(name) && !config.has_component(name) {
                debug!("host defaults enable component '{name}'");
                config.add_component(name.clone());
            }
        }

        // Prerequisite closure over whatever is enabled now.
        let mut queue: Vec<String> = config.components.clone();
        while let Some(component) = queue.pop() {
            if !arch_options.contains(&component) {
                continue;
            }
            let Some(rule) = self.components.get(&component) else {
                continue;
            };
            for prereq in &rule.prerequisite_components {
                if !negated.contains(prereq) && !config.has_component(prereq) {
                    debug!("component '{component}' pulls in prerequisite '{prereq}'");
                    config.add_component(prereq.clone());
                    queue.push(prereq.clone());
                }
            }
        }

        for component in config.components.clone() {
            if !arch_options.contains(&component) {
                continue;
            }
            let Some(rule) = self.components.get(&component) else {
                continue;
            };
            for (key, value) in &rule.settings {
                config.settings.entry(key.clone()).or_insert_with(|| value.clone());
            }
            for extra in &rule.extras {
                if !config.extras.contains(extra) {
                    config.extras.push(extra.clone());
                }
            }
        }
        config.canonicalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HostComponentRule, PackageKind, SettingValue};

    fn defaults_with(entries: Vec<(&str, HostComponentRule)>) -> HostDefaults {
        HostDefaults {
            default_architecture: None,
            components: entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn legal(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn default_enable_respects_negation() {
        let defaults = defaults_with(vec![(
            "ibverbs",
            HostComponentRule {
                enable_by_default: true,
                ..Default::default()
            },
        )]);
        let mut config =
            BuildConfiguration::new("netlrts-linux-x86_64", "master", PackageKind::Runtime);
        let negated: BTreeSet<String> = ["ibverbs".to_string()].into_iter().collect();
        defaults.apply(&mut config, &legal(&["ibverbs", "smp"]), &negated);
        assert!(!config.has_component("ibverbs"));
    }

    #[test]
    fn negated_prerequisites_are_not_pulled_in() {
        let defaults = defaults_with(vec![(
            "ibverbs",
            HostComponentRule {
                enable_by_default: true,
                prerequisite_components: ["smp".to_string()].into_iter().collect(),
                ..Default::default()
            },
        )]);
        let mut config =
            BuildConfiguration::new("netlrts-linux-x86_64", "master", PackageKind::Runtime);
        let negated: BTreeSet<String> = ["ibverbs".to_string()].into_iter().collect();
        defaults.apply(&mut config, &legal(&["ibverbs", "smp"]), &negated);
        assert!(config.components.is_empty());
    }

    #[test]
    fn prerequisites_close_transitively() {
        let defaults = defaults_with(vec![
            (
                "cuda",
                HostComponentRule {
                    prerequisite_components: ["smp".to_string()].into_iter().collect(),
                    ..Default::default()
                },
            ),
            (
                "smp",
                HostComponentRule {
                    prerequisite_components: ["pthreads".to_string()].into_iter().collect(),
                    ..Default::default()
                },
            ),
        ]);
        let mut config =
            BuildConfiguration::new("netlrts-linux-x86_64", "master", PackageKind::Runtime);
        config.add_component("cuda");
        defaults.apply(&mut config, &legal(&["cuda", "smp", "pthreads"]), &BTreeSet::new());
        assert_eq!(config.components, vec!["cuda", "pthreads", "smp"]);
    }

    #[test]
    fn injected_settings_do_not_clobber_user_values() {
        let mut rule = HostComponentRule {
            enable_by_default: true,
            ..Default::default()
        };
        rule.settings.insert("opt".into(), SettingValue::Value("3".into()));
        rule.extras.push("-L/opt/cuda/lib".into());
        let defaults = defaults_with(vec![("cuda", rule)]);

        let mut config =
            BuildConfiguration::new("netlrts-linux-x86_64", "master", PackageKind::Runtime);
        config.settings.insert("opt".into(), SettingValue::Value("5".into()));
        defaults.apply(&mut config, &legal(&["cuda"]), &BTreeSet::new());

        assert_eq!(config.settings.get("opt"), Some(&SettingValue::Value("5".into())));
        assert!(config.extras.contains(&"-L/opt/cuda/lib".to_string()));
    }

    #[test]
    fn rules_for_unsupported_components_are_inert() {
        let mut rule = HostComponentRule {
            enable_by_default: true,
            prerequisite_components: ["smp".to_string()].into_iter().collect(),
            ..Default::default()
        };
        rule.settings.insert("memory".into(), SettingValue::Value("os".into()));
        rule.extras.push("-L/opt/pami/lib".into());
        let defaults = defaults_with(vec![("pami", rule)]);

        let mut config =
            BuildConfiguration::new("net-linux-x86_64", "master", PackageKind::Runtime);
        defaults.apply(&mut config, &legal(&["smp", "cuda"]), &BTreeSet::new());

        assert!(config.components.is_empty());
        assert!(config.settings.is_empty());
        assert!(config.extras.is_empty());
    }
}
