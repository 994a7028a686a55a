//! `depbuild.toml` manifest
//!
//! ```toml
//! [settings]
//! root = "build/_deps"
//! generator = "Ninja"
//!
//! [settings.ambient]
//! CMAKE_POSITION_INDEPENDENT_CODE = "ON"
//!
//! [[package]]
//! name = "fmt"
//! url = "https://github.com/fmtlib/fmt/archive/refs/tags/11.0.2.tar.gz"
//! digest = "SHA256=6cb1e6d37bdcb756dbbe59be438790db409cdb4868c66e888d5df9f13f7c027f"
//! definitions = ["FMT_TEST=OFF", "FMT_DOC=OFF"]
//!
//! [[locate]]
//! name = "fmt"
//! header = "fmt/core.h"
//! library = "fmt"
//! required = true
//! ```
//!
//! Relative paths in `[settings]` are resolved against the manifest's directory.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::command::{AmbientDefinitions, PROPAGATED_DEFINITIONS, Toolchain};
use crate::descriptor::{Declaration, DeclarationError, PackageDescriptor};
use crate::fetch::FetchOptions;
use crate::locate::LocateRequest;
use crate::pipeline::PipelineContext;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("package '{0}' is declared more than once")]
    DuplicatePackage(String),

    #[error("ambient definition '{0}' is not propagated (allowed: {allowed})", allowed = PROPAGATED_DEFINITIONS.join(", "))]
    UnknownAmbient(String),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub root: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub generator: Option<String>,
    pub cmake: Option<String>,
    pub jobs: Option<usize>,
    #[serde(default)]
    pub reverify: bool,
    #[serde(default)]
    pub ambient: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub package: Vec<Declaration>,
    #[serde(default)]
    pub locate: Vec<LocateRequest>,
    /// Directory relative settings paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Values given on the command line or in the environment. They win over the
/// manifest.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub verbose: bool,
    pub reverify: bool,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::parse(&content, base_dir).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(content: &str, base_dir: PathBuf) -> Result<Self, toml::de::Error> {
        let mut manifest: Manifest = toml::from_str(content)?;
        manifest.base_dir = base_dir;
        Ok(manifest)
    }

    /// Validate every declaration before anything touches the disk.
    pub fn descriptors(&self) -> Result<Vec<PackageDescriptor>, ManifestError> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.package.len());
        for decl in &self.package {
            if !seen.insert(decl.name.as_str()) {
                return Err(ManifestError::DuplicatePackage(decl.name.clone()));
            }
            out.push(PackageDescriptor::from_declaration(decl.clone())?);
        }
        Ok(out)
    }

    pub fn toolchain(&self) -> Toolchain {
        let s = &self.settings;
        Toolchain {
            cmake: s.cmake.clone().unwrap_or_else(|| Toolchain::default().cmake),
            generator: s.generator.clone(),
            jobs: Some(s.jobs.unwrap_or_else(num_cpus::get).max(1)),
        }
    }

    /// `[settings.ambient]` first, then the process environment.
    pub fn ambient(&self) -> Result<AmbientDefinitions, ManifestError> {
        self.ambient_with(|key| std::env::var(key).ok())
    }

    fn ambient_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<AmbientDefinitions, ManifestError> {
        if let Some(key) = self
            .settings
            .ambient
            .keys()
            .find(|k| !PROPAGATED_DEFINITIONS.contains(&k.as_str()))
        {
            return Err(ManifestError::UnknownAmbient(key.clone()));
        }
        Ok(AmbientDefinitions::collect(|key| {
            self.settings.ambient.get(key).cloned().or_else(|| env(key))
        }))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Root directory: override, then manifest, then the user cache directory.
    /// Always absolute.
    pub fn root(&self, overrides: &Overrides) -> PathBuf {
        let root = overrides
            .root
            .clone()
            .or_else(|| self.settings.root.as_deref().map(|p| self.resolve_path(p)))
            .unwrap_or_else(default_root);
        absolute(root)
    }

    /// Install prefix: override, then manifest, then `{root}/install`.
    /// Always absolute, since stage commands and locate results both carry it.
    pub fn install_root(&self, overrides: &Overrides) -> PathBuf {
        let prefix = overrides
            .install_root
            .clone()
            .or_else(|| {
                self.settings
                    .install_root
                    .as_deref()
                    .map(|p| self.resolve_path(p))
            })
            .unwrap_or_else(|| self.root(overrides).join("install"));
        absolute(prefix)
    }

    /// Settings for a pipeline run.
    pub fn context(&self, overrides: &Overrides) -> Result<PipelineContext, ManifestError> {
        Ok(PipelineContext {
            root: self.root(overrides),
            install_root: self.install_root(overrides),
            toolchain: self.toolchain(),
            ambient: self.ambient()?,
            fetch: FetchOptions {
                reverify: overrides.reverify || self.settings.reverify,
            },
            verbose: overrides.verbose,
        })
    }
}

pub(crate) fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn default_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("depbuild")
}
