//! Find installed headers and libraries under the install prefix
//!
//! Only the prefix is searched, never system directories. Headers are looked
//! up below `include/`, libraries in `lib/`, `lib64/` and one level of
//! `lib/<subdir>` for multiarch layouts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::output;

/// How deep below `include/` a header may sit (e.g. `include/boost-1_86/boost/config.hpp`).
const INCLUDE_SEARCH_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("required dependency '{name}' not found under {}{}", prefix.display(), describe_missing(.missing))]
    NotFound {
        name: String,
        prefix: PathBuf,
        missing: Vec<String>,
    },

    #[error("invalid library pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

fn describe_missing(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!(" (missing {})", missing.join(", "))
    }
}

/// One `[[locate]]` entry.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LocateRequest {
    pub name: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// What the host needs to consume the dependency.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Interface {
    pub include_dirs: Vec<PathBuf>,
    pub link_libraries: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Located {
    pub name: String,
    pub found: bool,
    pub interface: Interface,
}

/// Search `prefix` for what `request` asks for.
///
/// A request naming both a header and a library is found only if both are.
/// Not found is an error when the request is required and a warning otherwise.
pub fn locate(request: &LocateRequest, prefix: &Path) -> Result<Located, LocateError> {
    let mut missing = Vec::new();
    let mut interface = Interface::default();

    if let Some(header) = &request.header {
        match find_include_dir(prefix, header) {
            Some(dir) => interface.include_dirs.push(dir),
            None => missing.push(format!("header {}", header)),
        }
    }

    if let Some(library) = &request.library {
        match find_library(prefix, library)? {
            Some(path) => interface.link_libraries.push(path),
            None => missing.push(format!("library {}", library)),
        }
    }

    let nothing_requested = request.header.is_none() && request.library.is_none();
    if missing.is_empty() && !nothing_requested {
        return Ok(Located {
            name: request.name.clone(),
            found: true,
            interface,
        });
    }

    if request.required {
        return Err(LocateError::NotFound {
            name: request.name.clone(),
            prefix: prefix.to_path_buf(),
            missing,
        });
    }

    output::warning(&format!(
        "{} not found under {}{}",
        request.name,
        prefix.display(),
        describe_missing(&missing)
    ));
    Ok(Located {
        name: request.name.clone(),
        found: false,
        interface: Interface::default(),
    })
}

/// Run every request against the same prefix, stopping at the first
/// required one that is missing. Writes nothing to stdout.
pub fn locate_all(requests: &[LocateRequest], prefix: &Path) -> Result<Vec<Located>, LocateError> {
    requests.iter().map(|request| locate(request, prefix)).collect()
}

/// Directory `d` below `include/` such that `d/header` exists.
fn find_include_dir(prefix: &Path, header: &str) -> Option<PathBuf> {
    let include = prefix.join("include");
    if include.join(header).is_file() {
        return Some(include);
    }

    let header = Path::new(header);
    WalkDir::new(&include)
        .min_depth(1)
        .max_depth(INCLUDE_SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .find(|dir| dir.join(header).is_file())
}

fn library_dirs(prefix: &Path) -> Result<Vec<PathBuf>, LocateError> {
    let mut dirs = vec![prefix.join("lib"), prefix.join("lib64")];

    let pattern = format!(
        "{}/*",
        glob::Pattern::escape(&prefix.join("lib").to_string_lossy())
    );
    let mut nested: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| LocateError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?
        .filter_map(|p| p.ok())
        .filter(|p| p.is_dir())
        .collect();
    nested.sort();
    dirs.extend(nested);

    Ok(dirs)
}

/// File name patterns a library name may be installed under.
fn library_candidates(name: &str) -> Vec<String> {
    if Path::new(name).extension().is_some() {
        return vec![glob::Pattern::escape(name)];
    }
    let n = glob::Pattern::escape(name);
    vec![
        format!("lib{}.a", n),
        format!("lib{}.so", n),
        format!("lib{}.so.*", n),
        format!("lib{}.dylib", n),
        format!("{}.lib", n),
    ]
}

fn find_library(prefix: &Path, name: &str) -> Result<Option<PathBuf>, LocateError> {
    let candidates = library_candidates(name)
        .into_iter()
        .map(|c| {
            glob::Pattern::new(&c).map_err(|e| LocateError::Pattern {
                pattern: c.clone(),
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    for dir in library_dirs(prefix)? {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        for candidate in &candidates {
            let hit = files.iter().find(|p| {
                p.file_name()
                    .is_some_and(|f| candidate.matches(&f.to_string_lossy()))
            });
            if let Some(path) = hit {
                return Ok(Some(path.clone()));
            }
        }
    }

    Ok(None)
}
