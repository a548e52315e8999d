// src/core/arch.rs

//! Architecture discovery.
//!
//! The runtime package's source tree declares its supported target
//! platforms as directories under `src/arch`, each holding per-option
//! header files (`conv-mach-NAME.h`) and per-compiler files
//! (`cc-NAME.h`). This module scans that layout once into an
//! [`ArchitectureCatalog`] the resolver queries.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::constants::{ARCH_DENYLIST, ARCH_DIR, COMMON_ARCH, FORTRAN_COMPILERS};

lazy_static! {
    static ref OPTION_FILE_RE: Regex =
        Regex::new(r"^conv-mach-([^.]+)\.h$").expect("static pattern");
    static ref COMPILER_FILE_RE: Regex =
        Regex::new(r"^cc-([^.]+)\.h$").expect("static pattern");
}

#[derive(Error, Debug)]
pub enum ArchError {
    #[error("'{0}' does not look like a runtime source tree (no architecture directory)")]
    InvalidSourceTree(PathBuf),

    #[error("unknown architecture '{0}'")]
    UnknownArchitecture(String),

    #[error("I/O error scanning architecture directory: {0}")]
    Io(#[from] std::io::Error),
}

/// One named target platform profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Architecture {
    pub name: String,
    /// Name of the parent architecture, if any. Base architectures point at
    /// the `common` sentinel; `common` itself has no parent.
    pub parent: Option<String>,
    /// Derived from the parent links after the scan, never mutated directly.
    pub children: Vec<String>,
    pub options: BTreeSet<String>,
    pub compilers: BTreeSet<String>,
    pub fortran_compilers: BTreeSet<String>,
    pub is_base: bool,
}

impl Architecture {
    fn new(name: impl Into<String>, parent: Option<String>, is_base: bool) -> Self {
        Self {
            name: name.into(),
            parent,
            children: Vec::new(),
            options: BTreeSet::new(),
            compilers: BTreeSet::new(),
            fortran_compilers: BTreeSet::new(),
            is_base,
        }
    }
}

/// All architectures discovered in one runtime source tree, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ArchitectureCatalog {
    arches: BTreeMap<String, Architecture>,
}

impl ArchitectureCatalog {
    /// Scan `runtime_src/src/arch` and build the catalog.
    pub fn load(runtime_src: &Path) -> Result<Self, ArchError> {
        let arch_dir = runtime_src.join(ARCH_DIR);
        if !arch_dir.is_dir() {
            return Err(ArchError::InvalidSourceTree(runtime_src.to_path_buf()));
        }

        let mut arches: BTreeMap<String, Architecture> = BTreeMap::new();
        arches.insert(COMMON_ARCH.to_string(), Architecture::new(COMMON_ARCH, None, true));

        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&arch_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if ARCH_DENYLIST.contains(&name.as_str()) || name == COMMON_ARCH {
                continue;
            }
            names.push(name);
        }
        names.sort();

        // A base architecture is any pre-hyphen prefix that exists as a
        // directory itself, whether or not enumeration surfaced it
        // (denylisted bases like `net` are resurrected here).
        let mut base_names: BTreeSet<String> = BTreeSet::new();
        for name in &names {
            if let Some((prefix, _)) = name.split_once('-') {
                if prefix != COMMON_ARCH && arch_dir.join(prefix).is_dir() {
                    base_names.insert(prefix.to_string());
                }
            }
        }
        for base in &base_names {
            let mut arch = Architecture::new(base.clone(), Some(COMMON_ARCH.to_string()), true);
            scan_arch_dir(&arch_dir.join(base), &mut arch)?;
            arches.insert(base.clone(), arch);
        }

        for name in names {
            if base_names.contains(&name) {
                continue;
            }
            let parent = match name.split_once('-') {
                Some((prefix, _)) if base_names.contains(prefix) => prefix.to_string(),
                _ => COMMON_ARCH.to_string(),
            };
            let mut arch = Architecture::new(name.clone(), Some(parent), false);
            scan_arch_dir(&arch_dir.join(&name), &mut arch)?;
            arches.insert(name, arch);
        }

        // Rebuild child lists from the parent links.
        let links: Vec<(String, String)> = arches
            .values()
            .filter_map(|a| a.parent.clone().map(|p| (p, a.name.clone())))
            .collect();
        for (parent, child) in links {
            if let Some(p) = arches.get_mut(&parent) {
                p.children.push(child);
            }
        }
        for arch in arches.values_mut() {
            arch.children.sort();
        }

        Ok(Self { arches })
    }

    pub fn get(&self, name: &str) -> Result<&Architecture, ArchError> {
        self.arches
            .get(name)
            .ok_or_else(|| ArchError::UnknownArchitecture(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arches.contains_key(name)
    }

    /// All architecture names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arches.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Architecture> {
        self.arches.values()
    }

    /// The union of an architecture's options, compilers, and Fortran
    /// compilers with those of all its ancestors. Sorted by the set order.
    pub fn all_options(&self, name: &str) -> Result<BTreeSet<String>, ArchError> {
        let mut out = BTreeSet::new();
        let mut cursor = Some(name.to_string());
        while let Some(current) = cursor {
            let arch = self.get(&current)?;
            out.extend(arch.options.iter().cloned());
            out.extend(arch.compilers.iter().cloned());
            out.extend(arch.fortran_compilers.iter().cloned());
            cursor = arch.parent.clone();
        }
        Ok(out)
    }

    /// Names of every architecture below `name` in the inheritance graph.
    pub fn descendants(&self, name: &str) -> Result<Vec<String>, ArchError> {
        let mut out = Vec::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            let arch = self.get(&current)?;
            for child in &arch.children {
                out.push(child.clone());
                stack.push(child.clone());
            }
        }
        out.sort();
        Ok(out)
    }
}

fn scan_arch_dir(dir: &Path, arch: &mut Architecture) -> Result<(), ArchError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some(caps) = OPTION_FILE_RE.captures(&file_name) {
            if let Some(m) = caps.get(1) {
                arch.options.insert(m.as_str().to_string());
            }
        } else if let Some(caps) = COMPILER_FILE_RE.captures(&file_name) {
            if let Some(m) = caps.get(1) {
                let name = m.as_str().to_string();
                if FORTRAN_COMPILERS.contains(&name.as_str()) {
                    arch.fortran_compilers.insert(name);
                } else {
                    arch.compilers.insert(name);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        File::create(path).unwrap();
    }

    /// Minimal runtime tree: a base with two children, a denylisted
    /// infrastructure directory, and a stray non-header file.
    fn fixture_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let arch = tmp.path().join(ARCH_DIR);
        fs::create_dir_all(arch.join("netlrts")).unwrap();
        fs::create_dir_all(arch.join("netlrts-linux-x86_64")).unwrap();
        fs::create_dir_all(arch.join("netlrts-darwin-x86_64")).unwrap();
        fs::create_dir_all(arch.join("CVS")).unwrap();
        fs::create_dir_all(arch.join("common")).unwrap();

        touch(&arch.join("netlrts/conv-mach-smp.h"));
        touch(&arch.join("netlrts/cc-gcc.h"));
        touch(&arch.join("netlrts-linux-x86_64/conv-mach-cuda.h"));
        touch(&arch.join("netlrts-linux-x86_64/conv-mach-ibverbs.h"));
        touch(&arch.join("netlrts-linux-x86_64/cc-clang.h"));
        touch(&arch.join("netlrts-linux-x86_64/cc-gfortran.h"));
        touch(&arch.join("netlrts-linux-x86_64/README"));
        tmp
    }

    #[test]
    fn discovery_builds_parent_child_links() {
        let tmp = fixture_tree();
        let catalog = ArchitectureCatalog::load(tmp.path()).unwrap();

        let base = catalog.get("netlrts").unwrap();
        assert!(base.is_base);
        assert_eq!(base.parent.as_deref(), Some("common"));
        assert_eq!(
            base.children,
            vec!["netlrts-darwin-x86_64", "netlrts-linux-x86_64"]
        );

        let child = catalog.get("netlrts-linux-x86_64").unwrap();
        assert!(!child.is_base);
        assert_eq!(child.parent.as_deref(), Some("netlrts"));
    }

    #[test]
    fn enumerated_base_directories_keep_base_status() {
        let tmp = fixture_tree();
        let catalog = ArchitectureCatalog::load(tmp.path()).unwrap();
        let bases: Vec<&str> = catalog
            .iter()
            .filter(|a| a.is_base)
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(bases, vec!["common", "netlrts"]);
        assert!(!catalog.get("netlrts-linux-x86_64").unwrap().is_base);
    }

    #[test]
    fn denylist_hides_infrastructure_dirs() {
        let tmp = fixture_tree();
        let catalog = ArchitectureCatalog::load(tmp.path()).unwrap();
        assert!(!catalog.contains("CVS"));
        assert!(catalog.contains("common"));
    }

    #[test]
    fn fortran_compilers_are_reclassified() {
        let tmp = fixture_tree();
        let catalog = ArchitectureCatalog::load(tmp.path()).unwrap();
        let child = catalog.get("netlrts-linux-x86_64").unwrap();
        assert!(child.compilers.contains("clang"));
        assert!(child.fortran_compilers.contains("gfortran"));
        assert!(!child.options.contains("gfortran"));
    }

    #[test]
    fn all_options_unions_ancestors() {
        let tmp = fixture_tree();
        let catalog = ArchitectureCatalog::load(tmp.path()).unwrap();
        let opts = catalog.all_options("netlrts-linux-x86_64").unwrap();
        for name in ["cuda", "ibverbs", "smp", "gcc", "clang", "gfortran"] {
            assert!(opts.contains(name), "missing {name}");
        }
    }

    #[test]
    fn unknown_architecture_is_an_error() {
        let tmp = fixture_tree();
        let catalog = ArchitectureCatalog::load(tmp.path()).unwrap();
        assert!(matches!(
            catalog.get("bluegene"),
            Err(ArchError::UnknownArchitecture(_))
        ));
    }

    #[test]
    fn missing_arch_dir_is_invalid_tree() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            ArchitectureCatalog::load(tmp.path()),
            Err(ArchError::InvalidSourceTree(_))
        ));
    }
}
