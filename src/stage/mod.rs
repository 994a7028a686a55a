//! Configure, build and install stages
//!
//! Each stage is gated by the marker of the step before it and skipped when
//! its own marker is up to date. Commands run in the package build directory
//! as plain child processes; no shell is involved unless the command itself
//! starts one.

pub mod ledger;

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;

use crate::command::{CommandLine, ResolvedCommand};
use crate::core::output;
use crate::layout::WorkingPaths;
use ledger::{Ledger, LedgerError, Marker};

/// Lines of the error log shown when a stage fails.
const FAILURE_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Configure,
    Build,
    Install,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Configure, Stage::Build, Stage::Install];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Build => "build",
            Stage::Install => "install",
        }
    }

    /// Marker written when the stage succeeds.
    pub fn marker(&self) -> Marker {
        match self {
            Stage::Configure => Marker::Configured,
            Stage::Build => Marker::Built,
            Stage::Install => Marker::Installed,
        }
    }

    /// Marker that must exist before the stage may run.
    pub fn precondition(&self) -> Marker {
        match self {
            Stage::Configure => Marker::SourceReady,
            Stage::Build => Marker::Configured,
            Stage::Install => Marker::Built,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage} cannot run: {missing} marker is missing")]
    PreconditionMissing { stage: Stage, missing: Marker },

    #[error("{stage}: program '{program}' not found in PATH")]
    ProgramNotFound { stage: Stage, program: String },

    #[error("{stage}: failed to start '{command}': {source}")]
    Spawn {
        stage: Stage,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} failed ({})\n  command: {command}{}", exit_description(.code), log_hint(.log))]
    Failed {
        stage: Stage,
        command: String,
        code: Option<i32>,
        log: Option<PathBuf>,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "terminated by signal".to_string(),
    }
}

fn log_hint(log: &Option<PathBuf>) -> String {
    match log {
        Some(path) => format!("\n  log: {}", path.display()),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ran,
    Skipped,
}

/// Run one stage if it is not already up to date.
pub fn run_stage(
    stage: Stage,
    command: &CommandLine,
    paths: &WorkingPaths,
    ledger: &Ledger,
    verbose: bool,
) -> Result<StageOutcome, StageError> {
    let missing = stage.precondition();
    if !ledger.is_complete(missing) {
        return Err(StageError::PreconditionMissing { stage, missing });
    }

    if ledger.is_up_to_date(stage.marker()) {
        output::skip(&format!("{} (up to date)", stage));
        return Ok(StageOutcome::Skipped);
    }

    std::fs::create_dir_all(&paths.build).map_err(|source| StageError::Io {
        path: paths.build.clone(),
        source,
    })?;

    let resolved = command.resolve(&paths.install);
    output::sub_action(stage.name());
    output::detail(&resolved.to_string());

    let status = execute(stage, &resolved, paths, verbose)?;
    if !status.success() {
        let log = (!verbose).then(|| log_path(paths, stage, "err"));
        if let Some(path) = &log {
            for line in tail_lines(path, FAILURE_TAIL_LINES) {
                output::detail(&line);
            }
        }
        return Err(StageError::Failed {
            stage,
            command: resolved.to_string(),
            code: status.code(),
            log,
        });
    }

    ledger.mark(stage.marker())?;
    Ok(StageOutcome::Ran)
}

/// `logs/{stage}.{stream}.log`
pub fn log_path(paths: &WorkingPaths, stage: Stage, stream: &str) -> PathBuf {
    paths.logs.join(format!("{}.{}.log", stage, stream))
}

fn execute(
    stage: Stage,
    resolved: &ResolvedCommand,
    paths: &WorkingPaths,
    verbose: bool,
) -> Result<ExitStatus, StageError> {
    let mut cmd = match resolve_program(stage, resolved)? {
        Some(program) => {
            let mut cmd = std::process::Command::new(program);
            cmd.args(&resolved.args);
            cmd
        }
        None => resolved.to_command(),
    };
    cmd.current_dir(&paths.build);

    if !verbose {
        std::fs::create_dir_all(&paths.logs).map_err(|source| StageError::Io {
            path: paths.logs.clone(),
            source,
        })?;
        cmd.stdout(create_log(&log_path(paths, stage, "out"))?);
        cmd.stderr(create_log(&log_path(paths, stage, "err"))?);
    }
    cmd.stdin(Stdio::null());

    cmd.status().map_err(|source| StageError::Spawn {
        stage,
        command: resolved.to_string(),
        source,
    })
}

/// Look up bare program names in PATH so a missing tool is reported by name.
/// Programs given with a path are left for the OS to resolve.
fn resolve_program(stage: Stage, resolved: &ResolvedCommand) -> Result<Option<PathBuf>, StageError> {
    let program = Path::new(&resolved.program);
    if program.components().count() != 1 || program.is_absolute() {
        return Ok(None);
    }

    which::which(program)
        .map(Some)
        .map_err(|_| StageError::ProgramNotFound {
            stage,
            program: program.display().to_string(),
        })
}

fn create_log(path: &Path) -> Result<File, StageError> {
    File::create(path).map_err(|source| StageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn tail_lines(path: &Path, n: usize) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines: Vec<&str> = content.lines().collect();
    lines[lines.len().saturating_sub(n)..]
        .iter()
        .map(|l| l.to_string())
        .collect()
}
