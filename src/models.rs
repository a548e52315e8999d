// src/models.rs

//! Serde-backed data model shared across the crate.
//!
//! Everything here is plain data: the build configuration value, the
//! configure-script option descriptors, and the host-defaults schema.
//! Behavior that consumes these types lives under `core/`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which of the two managed packages a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// The parallel runtime (Charm++).
    Runtime,
    /// The simulation application (ChaNGa).
    Application,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime => write!(f, "runtime"),
            Self::Application => write!(f, "application"),
        }
    }
}

/// A configure-script setting: either a boolean switch or a value.
///
/// Untagged so the manifest reads naturally (`cuda: true`,
/// `opt: "5"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Value(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Value(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

/// The full parameter set of one build.
///
/// `components` and `extras` are kept sorted and deduplicated; equality and
/// registry lookup depend on that canonical form. Call [`canonicalize`]
/// after any direct mutation.
///
/// [`canonicalize`]: BuildConfiguration::canonicalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
    pub architecture: String,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
    #[serde(default)]
    pub extras: Vec<String>,
    pub branch: String,
    pub package: PackageKind,
}

impl BuildConfiguration {
    pub fn new(architecture: impl Into<String>, branch: impl Into<String>, package: PackageKind) -> Self {
        Self {
            architecture: architecture.into(),
            components: Vec::new(),
            features: BTreeMap::new(),
            settings: BTreeMap::new(),
            extras: Vec::new(),
            branch: branch.into(),
            package,
        }
    }

    /// Sort and deduplicate the order-insensitive list fields.
    pub fn canonicalize(&mut self) {
        self.components.sort();
        self.components.dedup();
        self.extras.sort();
        self.extras.dedup();
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.components.iter().any(|c| c == name)
    }

    /// Add a component, preserving canonical form.
    pub fn add_component(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_component(&name) {
            self.components.push(name);
            self.components.sort();
        }
    }
}

/// The flavor of a configure-script switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigureOptionKind {
    /// `--enable-NAME` / `--disable-NAME`: a boolean feature.
    Enable,
    /// `--with-NAME[=value]` / `--without-NAME`: a setting.
    With,
}

/// One switch exposed by a package's configure script, as scraped from
/// `configure --help`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureOption {
    pub kind: ConfigureOptionKind,
    pub name: String,
    /// Whether the switch is on when unspecified, as declared by the
    /// help text's enable/disable (or with/without) spelling.
    pub default: bool,
}

/// Per-component host rule: when to enable it and what it drags in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostComponentRule {
    #[serde(default, alias = "default")]
    pub enable_by_default: bool,
    #[serde(default, alias = "prerequisites", alias = "components")]
    pub prerequisite_components: BTreeSet<String>,
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
    #[serde(default)]
    pub extras: Vec<String>,
}

/// Host-specific build defaults, loaded from a per-hostname YAML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDefaults {
    #[serde(default, alias = "architecture")]
    pub default_architecture: Option<String>,
    #[serde(default)]
    pub components: BTreeMap<String, HostComponentRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_idempotent() {
        let mut config = BuildConfiguration::new("net-linux-x86_64", "master", PackageKind::Runtime);
        config.components = vec!["smp".into(), "cuda".into(), "smp".into()];
        config.extras = vec!["-L/opt/lib".into(), "-I/opt/include".into(), "-L/opt/lib".into()];
        config.canonicalize();
        let once = config.clone();
        config.canonicalize();
        assert_eq!(config, once);
        assert_eq!(config.components, vec!["cuda", "smp"]);
        assert_eq!(config.extras, vec!["-I/opt/include", "-L/opt/lib"]);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = BuildConfiguration::new("net-linux-x86_64", "master", PackageKind::Application);
        a.components = vec!["cuda".into(), "mpi".into()];
        a.features.insert("rtc".into(), true);
        a.features.insert("sanitizer".into(), false);
        a.canonicalize();

        let mut b = BuildConfiguration::new("net-linux-x86_64", "master", PackageKind::Application);
        b.components = vec!["mpi".into(), "cuda".into()];
        b.features.insert("sanitizer".into(), false);
        b.features.insert("rtc".into(), true);
        b.canonicalize();

        assert_eq!(a, b);
    }

    #[test]
    fn equality_includes_branch() {
        let a = BuildConfiguration::new("net-linux-x86_64", "master", PackageKind::Application);
        let b = BuildConfiguration::new("net-linux-x86_64", "production", PackageKind::Application);
        assert_ne!(a, b);
    }

    #[test]
    fn setting_value_round_trips_through_yaml() {
        let mut settings: BTreeMap<String, SettingValue> = BTreeMap::new();
        settings.insert("cuda".into(), SettingValue::Flag(true));
        settings.insert("opt".into(), SettingValue::Value("5".into()));
        let text = serde_yaml::to_string(&settings).unwrap();
        let back: BTreeMap<String, SettingValue> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(settings, back);
    }

    #[test]
    fn host_rule_accepts_aliased_keys() {
        let rule: HostComponentRule = serde_yaml::from_str(
            "default: true\nprerequisites: [smp]\nsettings: {opt: '3'}\n",
        )
        .unwrap();
        assert!(rule.enable_by_default);
        assert!(rule.prerequisite_components.contains("smp"));
        assert_eq!(rule.settings.get("opt"), Some(&SettingValue::Value("3".into())));
    }
}
