//! Working directory layout for a package
//!
//! Every path the pipeline touches is derived here from the package name, the
//! per-run root and the shared install prefix. Nothing is created on disk.
//!
//! ```text
//! {root}/.downloads/{name}-{file}   download cache
//! {root}/{name}/tmp/                scratch extraction
//! {root}/{name}/src/                canonical source tree
//! {root}/{name}/build/              out-of-tree build directory
//! {root}/{name}/logs/               stage output when not verbose
//! {root}/{name}/*.stamp             stage markers
//! {root}/{name}.lock                package lock
//! {install_root}/                   shared by all packages
//! ```

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory under the root holding cached archives of every package.
/// Package names may not start with a dot, so this can never collide.
pub const DOWNLOAD_CACHE_DIR: &str = ".downloads";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    #[error("package name is empty")]
    EmptyName,

    #[error("invalid package name '{0}': use letters, digits, '.', '_', '+' or '-' and do not start with '.'")]
    InvalidName(String),
}

/// Paths used by one package's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingPaths {
    pub name: String,
    pub download_cache: PathBuf,
    pub scratch: PathBuf,
    pub source: PathBuf,
    pub build: PathBuf,
    pub install: PathBuf,
    pub logs: PathBuf,
    /// Directory holding the `*.stamp` markers.
    pub stamps: PathBuf,
    pub lock_file: PathBuf,
}

impl WorkingPaths {
    pub fn resolve(
        name: &str,
        root: impl AsRef<Path>,
        install_root: impl AsRef<Path>,
    ) -> Result<Self, LayoutError> {
        validate_name(name)?;

        let root = root.as_ref();
        let package_dir = root.join(name);

        Ok(Self {
            name: name.to_string(),
            download_cache: root.join(DOWNLOAD_CACHE_DIR),
            scratch: package_dir.join("tmp"),
            source: package_dir.join("src"),
            build: package_dir.join("build"),
            install: install_root.as_ref().to_path_buf(),
            logs: package_dir.join("logs"),
            stamps: package_dir,
            lock_file: root.join(format!("{}.lock", name)),
        })
    }

    /// Cache location for an archive with the given remote filename.
    pub fn cached_archive(&self, remote_filename: &str) -> PathBuf {
        self.download_cache
            .join(format!("{}-{}", self.name, remote_filename))
    }
}

/// Validate a package name for use as a directory component.
pub fn validate_name(name: &str) -> Result<(), LayoutError> {
    if name.is_empty() {
        return Err(LayoutError::EmptyName);
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));

    if !valid_chars || name.starts_with('.') {
        return Err(LayoutError::InvalidName(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_layout() {
        let paths = WorkingPaths::resolve("fmt", "/work/deps", "/work/prefix").unwrap();

        assert_eq!(paths.scratch, PathBuf::from("/work/deps/fmt/tmp"));
        assert_eq!(paths.source, PathBuf::from("/work/deps/fmt/src"));
        assert_eq!(paths.build, PathBuf::from("/work/deps/fmt/build"));
        assert_eq!(paths.logs, PathBuf::from("/work/deps/fmt/logs"));
        assert_eq!(paths.stamps, PathBuf::from("/work/deps/fmt"));
        assert_eq!(paths.install, PathBuf::from("/work/prefix"));
        assert_eq!(paths.lock_file, PathBuf::from("/work/deps/fmt.lock"));
    }

    #[test]
    fn test_cached_archive_keyed_by_name_and_filename() {
        let paths = WorkingPaths::resolve("fmt", "/work/deps", "/work/prefix").unwrap();
        assert_eq!(
            paths.cached_archive("11.0.2.tar.gz"),
            PathBuf::from("/work/deps/.downloads/fmt-11.0.2.tar.gz")
        );
    }

    #[test]
    fn test_install_prefix_shared_between_packages() {
        let a = WorkingPaths::resolve("fmt", "/r", "/prefix").unwrap();
        let b = WorkingPaths::resolve("boost", "/r", "/prefix").unwrap();
        assert_eq!(a.install, b.install);
        assert_ne!(a.source, b.source);
        assert_eq!(a.download_cache, b.download_cache);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let a = WorkingPaths::resolve("libiconv", "/r", "/p").unwrap();
        let b = WorkingPaths::resolve("libiconv", "/r", "/p").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_names() {
        assert_eq!(validate_name(""), Err(LayoutError::EmptyName));
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(".downloads").is_err());
        assert!(validate_name("foo/bar").is_err());
        assert!(validate_name("foo bar").is_err());
        assert!(validate_name("libc++").is_ok());
        assert!(validate_name("boost_1.86").is_ok());
    }
}
