//! One package through FETCH → NORMALIZE → CONFIGURE → BUILD → INSTALL
//!
//! Every step consults the marker ledger, so running the same declaration
//! again after success does nothing, and running it after a failure resumes
//! at the step that failed.

use std::path::PathBuf;
use thiserror::Error;

use crate::command::{self, AmbientDefinitions, Toolchain};
use crate::core::lock::{self, LockError};
use crate::core::output;
use crate::descriptor::PackageDescriptor;
use crate::extract::{self, ExtractError, Normalized};
use crate::fetch::{self, FetchError, FetchOptions, Verification};
use crate::layout::{LayoutError, WorkingPaths};
use crate::manifest::absolute;
use crate::stage::ledger::{Ledger, Marker};
use crate::stage::{self, Stage, StageError, StageOutcome};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("{name}: install marker missing after the install stage")]
    NotInstalled { name: String },
}

/// Settings shared by every package of a run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub root: PathBuf,
    pub install_root: PathBuf,
    pub toolchain: Toolchain,
    pub ambient: AmbientDefinitions,
    pub fetch: FetchOptions,
    /// Show stage output for every package, not only verbose ones.
    pub verbose: bool,
}

impl PipelineContext {
    /// Relative paths are resolved against the current directory, since stage
    /// commands run inside each package's build directory.
    pub fn new(root: impl Into<PathBuf>, install_root: impl Into<PathBuf>) -> Self {
        Self {
            root: absolute(root.into()),
            install_root: absolute(install_root.into()),
            toolchain: Toolchain::default(),
            ambient: AmbientDefinitions::default(),
            fetch: FetchOptions::default(),
            verbose: false,
        }
    }

    pub fn paths(&self, name: &str) -> Result<WorkingPaths, LayoutError> {
        WorkingPaths::resolve(name, &self.root, &self.install_root)
    }
}

/// What a successful run did.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub name: String,
    pub downloaded: bool,
    pub verification: Verification,
    pub normalized: Normalized,
    pub stages: Vec<(Stage, StageOutcome)>,
    pub warnings: Vec<String>,
}

impl PipelineReport {
    /// True when nothing had to be done.
    pub fn is_noop(&self) -> bool {
        !self.downloaded
            && self.normalized == Normalized::Existing
            && self
                .stages
                .iter()
                .all(|(_, outcome)| *outcome == StageOutcome::Skipped)
    }
}

/// Run the whole pipeline for one package.
pub fn run(
    descriptor: &PackageDescriptor,
    ctx: &PipelineContext,
) -> Result<PipelineReport, PipelineError> {
    let paths = ctx.paths(&descriptor.name)?;
    let _lock = lock::acquire_package_lock(&descriptor.name, &paths.lock_file)?;
    let ledger = Ledger::new(&paths.stamps);
    let commands = command::stage_commands(descriptor, &paths, &ctx.toolchain, &ctx.ambient);
    let mut warnings = Vec::new();

    output::action(&descriptor.name);

    let acquired = fetch::acquire(descriptor, &paths, &ledger, ctx.fetch)?;
    if acquired.verification == Verification::Unverified {
        let message = format!(
            "{}: no digest declared, {} was not verified",
            descriptor.name,
            acquired.archive.display()
        );
        output::warning(&message);
        warnings.push(message);
    }

    let normalized = extract::normalize(&paths, &ledger, &acquired.archive)?;

    let verbose = descriptor.verbose || ctx.verbose;
    let mut stages = Vec::with_capacity(Stage::ALL.len());
    for stage in Stage::ALL {
        let command = match stage {
            Stage::Configure => &commands.configure,
            Stage::Build => &commands.build,
            Stage::Install => &commands.install,
        };
        let outcome = stage::run_stage(stage, command, &paths, &ledger, verbose)?;
        stages.push((stage, outcome));
    }

    if !ledger.is_complete(Marker::Installed) {
        return Err(PipelineError::NotInstalled {
            name: descriptor.name.clone(),
        });
    }

    let report = PipelineReport {
        name: descriptor.name.clone(),
        downloaded: acquired.downloaded,
        verification: acquired.verification,
        normalized,
        stages,
        warnings,
    };
    if report.is_noop() {
        output::skip(&format!("{} is up to date", descriptor.name));
    } else {
        output::success(&format!("installed {} into {}", descriptor.name, paths.install.display()));
    }
    Ok(report)
}

/// Marker state of one package, for `depbuild status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStatus {
    pub name: String,
    /// Each marker with whether it is present and up to date.
    pub markers: Vec<(Marker, MarkerState)>,
    /// Where a rerun would resume from: the last marker of the unbroken chain.
    pub latest: Option<Marker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    Missing,
    Stale,
    Current,
}

impl PackageStatus {
    pub fn is_installed(&self) -> bool {
        self.markers
            .iter()
            .all(|(_, state)| *state == MarkerState::Current)
    }
}

/// Read the marker ledger of a package without touching anything.
pub fn status(name: &str, ctx: &PipelineContext) -> Result<PackageStatus, PipelineError> {
    let paths = ctx.paths(name)?;
    let ledger = Ledger::new(&paths.stamps);

    let markers = Marker::ALL
        .into_iter()
        .map(|marker| {
            let state = if !ledger.is_complete(marker) {
                MarkerState::Missing
            } else if ledger.is_up_to_date(marker) {
                MarkerState::Current
            } else {
                MarkerState::Stale
            };
            (marker, state)
        })
        .collect();

    Ok(PackageStatus {
        name: name.to_string(),
        markers,
        latest: ledger.latest(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Declaration;
    use std::fs::File;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let content = b"project(zlib)";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "zlib-1.3/CMakeLists.txt", &content[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn descriptor(dir: &Path) -> PackageDescriptor {
        let archive = dir.join("zlib-1.3.tar.gz");
        write_tar_gz(&archive);
        PackageDescriptor::from_declaration(Declaration {
            name: "zlib".to_string(),
            url: Some(format!("file://{}", archive.display())),
            configure: Some(vec!["true".to_string()]),
            build: Some(vec!["true".to_string()]),
            install: Some(vec!["true".to_string()]),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_run_then_noop() {
        let dir = TempDir::new().unwrap();
        let ctx = PipelineContext::new(dir.path().join("root"), dir.path().join("prefix"));
        let d = descriptor(dir.path());

        let first = run(&d, &ctx).unwrap();
        assert!(first.downloaded);
        assert_eq!(first.normalized, Normalized::Collapsed);
        assert!(!first.is_noop());
        assert_eq!(first.warnings.len(), 1);

        let second = run(&d, &ctx).unwrap();
        assert!(second.is_noop());
        assert!(second.warnings.is_empty());
        assert!(status("zlib", &ctx).unwrap().is_installed());
    }

    #[test]
    fn test_status_of_unknown_package() {
        let dir = TempDir::new().unwrap();
        let ctx = PipelineContext::new(dir.path(), dir.path().join("prefix"));
        let st = status("never-built", &ctx).unwrap();
        assert!(!st.is_installed());
        assert!(st.markers.iter().all(|(_, s)| *s == MarkerState::Missing));
        assert_eq!(st.latest, None);
    }

    #[test]
    fn test_status_latest_stops_at_first_missing_marker() {
        let dir = TempDir::new().unwrap();
        let ctx = PipelineContext::new(dir.path().join("root"), dir.path().join("prefix"));
        let d = descriptor(dir.path());
        run(&d, &ctx).unwrap();
        assert_eq!(status("zlib", &ctx).unwrap().latest, Some(Marker::Installed));

        let paths = ctx.paths("zlib").unwrap();
        let ledger = Ledger::new(&paths.stamps);
        std::fs::remove_file(ledger.path(Marker::Built)).unwrap();

        let st = status("zlib", &ctx).unwrap();
        assert_eq!(st.latest, Some(Marker::Configured));
        assert!(!st.is_installed());
    }

    #[test]
    fn test_new_context_makes_paths_absolute() {
        let ctx = PipelineContext::new("rel/root", "rel/prefix");
        let cwd = std::env::current_dir().unwrap();
        assert!(ctx.root.is_absolute());
        assert!(ctx.install_root.is_absolute());
        assert_eq!(ctx.root, cwd.join("rel/root"));
        assert_eq!(ctx.install_root, cwd.join("rel/prefix"));
    }

    #[test]
    fn test_concurrent_run_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = PipelineContext::new(dir.path().join("root"), dir.path().join("prefix"));
        let d = descriptor(dir.path());

        let paths = ctx.paths("zlib").unwrap();
        let _held = lock::acquire_package_lock("zlib", &paths.lock_file).unwrap();
        let err = run(&d, &ctx).unwrap_err();
        assert!(matches!(err, PipelineError::Lock(LockError::Busy { .. })));
        assert!(!paths.source.exists());
    }
}
