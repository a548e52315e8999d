// src/core/registry.rs

//! Package registry and manifest persistence.
//!
//! A [`PackageSet`] owns the two managed packages and every build record
//! beneath them, persisted as a single `chimi.yaml` document in the
//! managed directory. Saving is dirty-flag gated and mutex guarded;
//! loading runs a reconciliation pass against the on-disk state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::SET_FILE;
use crate::core::build::BuildRecord;
use crate::models::{BuildConfiguration, PackageKind};
use crate::settings;
use crate::system::vcs;

/// Shared dirty bit: set by any mutation, cleared by a successful save.
pub type SaveFlag = Arc<AtomicBool>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("a build already occupies directory '{0}' (use --replace to overwrite)")]
    CannotOverwriteBuild(PathBuf),

    #[error("no package set found at or above '{0}'")]
    NotFound(PathBuf),

    #[error("package set I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed package set manifest '{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize package set: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Which builds a purge should remove.
#[derive(Debug, Clone)]
pub enum PurgeSelector {
    All,
    Config(BuildConfiguration),
    NamesOrIds { names: Vec<String>, ids: Vec<Uuid> },
}

impl PurgeSelector {
    fn matches(&self, record: &BuildRecord) -> bool {
        match self {
            Self::All => true,
            Self::Config(config) => record.config == *config,
            Self::NamesOrIds { names, ids } => {
                names.iter().any(|n| *n == record.name) || ids.contains(&record.id)
            }
        }
    }
}

/// One managed package and its recorded builds.
#[derive(Debug, Serialize, Deserialize)]
pub struct Package {
    pub directory: PathBuf,
    pub definition: PackageKind,
    #[serde(default)]
    pub builds: Vec<BuildRecord>,
    #[serde(skip)]
    branches: OnceLock<Vec<String>>,
}

impl Package {
    fn new(directory: PathBuf, definition: PackageKind) -> Self {
        Self {
            directory,
            definition,
            builds: Vec::new(),
            branches: OnceLock::new(),
        }
    }

    /// Every build whose configuration is structurally equal to `config`.
    pub fn find_builds(&self, config: &BuildConfiguration) -> Vec<&BuildRecord> {
        self.builds.iter().filter(|b| b.config == *config).collect()
    }

    /// First build matching `config`, registration order.
    pub fn find_build(&self, config: &BuildConfiguration) -> Option<&BuildRecord> {
        self.builds.iter().find(|b| b.config == *config)
    }

    pub fn find_build_mut(&mut self, config: &BuildConfiguration) -> Option<&mut BuildRecord> {
        self.builds.iter_mut().find(|b| b.config == *config)
    }

    pub fn have_build(&self, config: &BuildConfiguration) -> bool {
        self.find_build(config).is_some()
    }

    /// Register a build, enforcing one record per directory.
    ///
    /// A second record for an occupied directory is refused unless
    /// `replace` is set, in which case the old record is dropped with a
    /// warning.
    pub fn add_build(
        &mut self,
        record: BuildRecord,
        replace: bool,
        save_flag: &SaveFlag,
    ) -> Result<(), RegistryError> {
        if let Some(pos) = self.builds.iter().position(|b| b.directory == record.directory) {
            if !replace {
                return Err(RegistryError::CannotOverwriteBuild(record.directory));
            }
            let old = self.builds.remove(pos);
            warn!(
                "replacing existing build '{}' in {}",
                old.name,
                old.directory.display()
            );
        }
        self.builds.push(record);
        if !settings::dry_run() {
            save_flag.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Remove the selected builds, invoking `on_remove` for each so the
    /// caller can delete the on-disk directory. Returns how many matched.
    /// In dry-run mode nothing is removed, but the callback still runs so
    /// the caller can report what would happen.
    pub fn purge_builds<F>(
        &mut self,
        selector: &PurgeSelector,
        save_flag: &SaveFlag,
        mut on_remove: F,
    ) -> usize
    where
        F: FnMut(&BuildRecord),
    {
        let matched: Vec<usize> = self
            .builds
            .iter()
            .enumerate()
            .filter(|(_, b)| selector.matches(b))
            .map(|(i, _)| i)
            .collect();
        for &index in &matched {
            if let Some(record) = self.builds.get(index) {
                on_remove(record);
            }
        }
        if !settings::dry_run() && !matched.is_empty() {
            for &index in matched.iter().rev() {
                self.builds.remove(index);
            }
            save_flag.store(true, Ordering::SeqCst);
        }
        matched.len()
    }

    /// Branch list for this package's checkout, queried once per process.
    pub fn branches(&self) -> &[String] {
        self.branches
            .get_or_init(|| vcs::branches(&self.directory).unwrap_or_default())
    }

    pub fn current_branch(&self) -> Option<String> {
        vcs::current_branch(&self.directory).ok()
    }
}

/// The persisted collection of packages for one managed directory.
#[derive(Debug, Serialize, Deserialize)]
pub struct PackageSet {
    pub directory: PathBuf,
    pub packages: BTreeMap<String, Package>,
    #[serde(skip)]
    save_flag: SaveFlag,
    #[serde(skip)]
    save_lock: Mutex<()>,
}

impl PackageSet {
    /// Create a fresh set for `directory`, seeding the runtime and
    /// application packages, and write it out.
    pub fn create(directory: &Path) -> Result<Self, RegistryError> {
        let directory = dunce::simplified(directory).to_path_buf();
        let mut packages = BTreeMap::new();
        packages.insert(
            crate::constants::RUNTIME_PACKAGE.to_string(),
            Package::new(
                directory.join(crate::constants::RUNTIME_PACKAGE),
                PackageKind::Runtime,
            ),
        );
        packages.insert(
            crate::constants::APPLICATION_PACKAGE.to_string(),
            Package::new(
                directory.join(crate::constants::APPLICATION_PACKAGE),
                PackageKind::Application,
            ),
        );
        let set = Self {
            directory,
            packages,
            save_flag: Arc::new(AtomicBool::new(false)),
            save_lock: Mutex::new(()),
        };
        set.save_forced()?;
        Ok(set)
    }

    /// Load the set from `directory`, then reconcile it against the disk.
    pub fn load(directory: &Path) -> Result<Self, RegistryError> {
        let path = directory.join(SET_FILE);
        let contents = fs::read_to_string(&path).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        let mut set: Self =
            serde_yaml::from_str(&contents).map_err(|source| RegistryError::Malformed {
                path,
                source,
            })?;
        set.directory = dunce::simplified(directory).to_path_buf();

        let flag = Arc::clone(&set.save_flag);
        for package in set.packages.values_mut() {
            for build in &mut package.builds {
                build.attach_save_flag(Arc::clone(&flag));
            }
        }

        if set.reconcile() {
            // Reconciliation is a correctness fix, so it is written out
            // even under dry-run.
            set.save_forced()?;
        }
        Ok(set)
    }

    /// Walk up from `start` looking for a directory holding a manifest.
    pub fn find_directory(start: &Path) -> Result<PathBuf, RegistryError> {
        let mut cursor = Some(start);
        while let Some(dir) = cursor {
            if dir.join(SET_FILE).is_file() {
                return Ok(dir.to_path_buf());
            }
            cursor = dir.parent();
        }
        Err(RegistryError::NotFound(start.to_path_buf()))
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    pub fn package_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.packages.get_mut(name)
    }

    pub fn save_flag(&self) -> SaveFlag {
        Arc::clone(&self.save_flag)
    }

    /// Drop records whose directory disappeared, collapse duplicate
    /// directories to the most recently updated record, and re-derive
    /// branches no longer known to the checkout. Returns whether anything
    /// changed.
    fn reconcile(&mut self) -> bool {
        let mut changed = false;
        for package in self.packages.values_mut() {
            let before = package.builds.len();
            package.builds.retain(|b| {
                let keep = b.directory.is_dir();
                if !keep {
                    info!(
                        "forgetting build '{}': directory {} is gone",
                        b.name,
                        b.directory.display()
                    );
                }
                keep
            });
            changed |= package.builds.len() != before;

            // Last writer wins for duplicate directories.
            let mut seen: BTreeMap<PathBuf, usize> = BTreeMap::new();
            let mut drop_indices: Vec<usize> = Vec::new();
            for (index, build) in package.builds.iter().enumerate() {
                if let Some(&previous) = seen.get(&build.directory) {
                    let older = match (
                        package.builds.get(previous).and_then(BuildRecord::last_update),
                        build.last_update(),
                    ) {
                        (Some(a), Some(b)) if a > b => index,
                        _ => previous,
                    };
                    drop_indices.push(older);
                    if older == previous {
                        seen.insert(build.directory.clone(), index);
                    }
                } else {
                    seen.insert(build.directory.clone(), index);
                }
            }
            if !drop_indices.is_empty() {
                drop_indices.sort_unstable();
                for index in drop_indices.into_iter().rev() {
                    if index < package.builds.len() {
                        let dup = package.builds.remove(index);
                        warn!(
                            "dropping duplicate record for {}",
                            dup.directory.display()
                        );
                    }
                }
                changed = true;
            }

            if package.directory.is_dir() {
                let known = package.branches().to_vec();
                if !known.is_empty() {
                    let current = package.current_branch();
                    for build in &mut package.builds {
                        if !known.contains(&build.config.branch) {
                            if let Some(ref branch) = current {
                                debug!(
                                    "re-deriving branch for build '{}': {} -> {}",
                                    build.name, build.config.branch, branch
                                );
                                build.config.branch = branch.clone();
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
        changed
    }

    /// Write the manifest if anything changed since the last save.
    pub fn save(&self) -> Result<(), RegistryError> {
        if !self.save_flag.load(Ordering::SeqCst) {
            return Ok(());
        }
        if settings::dry_run() {
            debug!("dry run: skipping manifest save");
            return Ok(());
        }
        self.save_forced()
    }

    /// Write the manifest unconditionally (mutex guarded).
    pub fn save_forced(&self) -> Result<(), RegistryError> {
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.directory.join(SET_FILE);
        let text = serde_yaml::to_string(self)?;
        fs::write(&path, text).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        self.save_flag.store(false, Ordering::SeqCst);
        debug!("saved package set to {}", path.display());
        Ok(())
    }

    /// Flush and consume the set. The deterministic replacement for a
    /// finalizer-triggered save.
    pub fn close(self) -> Result<(), RegistryError> {
        self.save()
    }
}
