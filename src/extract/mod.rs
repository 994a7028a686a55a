//! NORMALIZE step: unpack the cached archive into the canonical source tree
//!
//! Archives either wrap everything in one top-level directory
//! (`fmt-11.0.2/CMakeLists.txt`) or put files at the root. Both end up as
//! `{root}/{name}/src` with the project files directly inside.
//!
//! The source tree is created once. If it already exists nothing is
//! extracted, even if the archive changed; delete `src/` to force it.

pub mod archive;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::output::{self, ProgressGuard};
use crate::layout::WorkingPaths;
use crate::stage::ledger::{Ledger, LedgerError, Marker};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported archive format: {}", .0.display())]
    UnknownFormat(PathBuf),

    #[error("failed to extract {}: {message}", archive.display())]
    Archive { archive: PathBuf, message: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// How the canonical source tree was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalized {
    /// The single top-level directory of the archive became `src/`.
    Collapsed,
    /// The archive had several top-level entries; the scratch root became `src/`.
    ScratchRoot,
    /// `src/` already existed.
    Existing,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Produce `paths.source` from `archive` unless it already exists, then
/// record the source-normalized marker.
pub fn normalize(
    paths: &WorkingPaths,
    ledger: &Ledger,
    archive: &Path,
) -> Result<Normalized, ExtractError> {
    if paths.source.is_dir() {
        output::skip(&format!("{} already present", paths.source.display()));
        if !ledger.is_up_to_date(Marker::SourceReady) {
            ledger.mark(Marker::SourceReady)?;
        }
        return Ok(Normalized::Existing);
    }

    // Leftover from an interrupted extraction
    if paths.scratch.exists() {
        std::fs::remove_dir_all(&paths.scratch).map_err(io_err(&paths.scratch))?;
    }

    {
        let _guard = ProgressGuard::new(output::spinner(&format!(
            "extracting {}",
            archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        )));
        archive::extract(archive, &paths.scratch)?;
    }

    let outcome = match single_top_level_dir(&paths.scratch)? {
        Some(wrapper) => {
            std::fs::rename(&wrapper, &paths.source).map_err(io_err(&wrapper))?;
            std::fs::remove_dir(&paths.scratch).map_err(io_err(&paths.scratch))?;
            Normalized::Collapsed
        }
        None => {
            std::fs::rename(&paths.scratch, &paths.source).map_err(io_err(&paths.scratch))?;
            Normalized::ScratchRoot
        }
    };

    ledger.mark(Marker::SourceReady)?;
    output::detail(&format!("source tree at {}", paths.source.display()));
    Ok(outcome)
}

/// The only top-level entry of `dir`, if there is exactly one and it is a
/// real directory.
fn single_top_level_dir(dir: &Path) -> Result<Option<PathBuf>, ExtractError> {
    let mut entries = std::fs::read_dir(dir).map_err(io_err(dir))?;

    let Some(first) = entries.next() else {
        return Ok(None);
    };
    let first = first.map_err(io_err(dir))?;
    if entries.next().is_some() {
        return Ok(None);
    }

    let file_type = first.file_type().map_err(io_err(dir))?;
    Ok(file_type.is_dir().then(|| first.path()))
}
