//! Command templating for the configure, build and install stages
//!
//! Commands are argument lists, never shell strings. An argument that refers
//! to the install prefix keeps that reference until the command is resolved
//! for execution, so paths with spaces or quotes need no escaping.
//!
//! Overrides may contain the placeholder [`INSTALL_DIR_PLACEHOLDER`] anywhere
//! in an argument:
//!
//! ```text
//! configure = ["./configure", "--prefix=<INSTALL_DIR>"]
//! ```

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::descriptor::PackageDescriptor;
use crate::layout::WorkingPaths;

/// Token substituted with the absolute install path.
pub const INSTALL_DIR_PLACEHOLDER: &str = "<INSTALL_DIR>";

/// Ambient definitions forwarded from the host build into the default
/// configure command, in this order, when set to a non-empty value.
pub const PROPAGATED_DEFINITIONS: &[&str] = &[
    "CMAKE_OSX_DEPLOYMENT_TARGET",
    "BUILD_SHARED_LIBS",
    "CMAKE_POSITION_INDEPENDENT_CODE",
];

const BUILD_CONFIG: &str = "Release";

/// Part of an argument that embeds the install prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    InstallPath,
}

/// One command-line argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Literal(String),
    Path(PathBuf),
    /// The whole argument is the install prefix.
    InstallPath,
    /// Text with one or more embedded install prefix references.
    Template(Vec<Fragment>),
}

impl Arg {
    /// Parse a user-supplied override argument, recognising the placeholder.
    pub fn from_override(raw: &str) -> Self {
        if raw == INSTALL_DIR_PLACEHOLDER {
            return Arg::InstallPath;
        }
        if !raw.contains(INSTALL_DIR_PLACEHOLDER) {
            return Arg::Literal(raw.to_string());
        }

        let mut fragments = Vec::new();
        let mut parts = raw.split(INSTALL_DIR_PLACEHOLDER).peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                fragments.push(Fragment::Text(part.to_string()));
            }
            if parts.peek().is_some() {
                fragments.push(Fragment::InstallPath);
            }
        }
        Arg::Template(fragments)
    }

    pub fn resolve(&self, install: &Path) -> OsString {
        match self {
            Arg::Literal(s) => OsString::from(s),
            Arg::Path(p) => p.clone().into_os_string(),
            Arg::InstallPath => install.as_os_str().to_os_string(),
            Arg::Template(fragments) => {
                let mut out = OsString::new();
                for fragment in fragments {
                    match fragment {
                        Fragment::Text(s) => out.push(s),
                        Fragment::InstallPath => out.push(install.as_os_str()),
                    }
                }
                out
            }
        }
    }
}

/// A program plus its arguments, still unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: Arg,
    pub args: Vec<Arg>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: Arg::Literal(program.into()),
            args: Vec::new(),
        }
    }

    /// Build from an override argument list. Returns `None` for an empty list.
    pub fn from_override<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self {
            program: Arg::from_override(program.as_ref()),
            args: rest.iter().map(|a| Arg::from_override(a.as_ref())).collect(),
        })
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn literal(self, s: impl Into<String>) -> Self {
        self.arg(Arg::Literal(s.into()))
    }

    pub fn resolve(&self, install: &Path) -> ResolvedCommand {
        ResolvedCommand {
            program: self.program.resolve(install),
            args: self.args.iter().map(|a| a.resolve(install)).collect(),
        }
    }
}

/// A command with every argument resolved, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl ResolvedCommand {
    pub fn to_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg.to_string_lossy()))?;
        }
        Ok(())
    }
}

/// Quote a value for display in logs and error messages.
pub fn shell_quote(s: impl fmt::Display) -> String {
    let s = s.to_string();
    if !s.is_empty()
        && s.chars().all(|c| {
            c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | ':' | '+' | ',')
        })
    {
        s
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

/// Build tool settings shared by every package in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub cmake: String,
    pub generator: Option<String>,
    pub jobs: Option<usize>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            cmake: "cmake".to_string(),
            generator: None,
            jobs: None,
        }
    }
}

/// Definitions inherited from the host build, restricted to
/// [`PROPAGATED_DEFINITIONS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmbientDefinitions {
    values: Vec<(String, String)>,
}

impl AmbientDefinitions {
    /// Collect allow-listed values through `lookup`, dropping unset and empty ones.
    pub fn collect(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let values = PROPAGATED_DEFINITIONS
            .iter()
            .filter_map(|key| {
                lookup(key)
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), v))
            })
            .collect();
        Self { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The three commands a pipeline run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommands {
    pub configure: CommandLine,
    pub build: CommandLine,
    pub install: CommandLine,
}

/// Produce the stage commands for a package. Pure: no I/O, no environment.
pub fn stage_commands(
    descriptor: &PackageDescriptor,
    paths: &WorkingPaths,
    toolchain: &Toolchain,
    ambient: &AmbientDefinitions,
) -> StageCommands {
    StageCommands {
        configure: descriptor
            .configure
            .clone()
            .unwrap_or_else(|| default_configure(descriptor, paths, toolchain, ambient)),
        build: descriptor
            .build
            .clone()
            .unwrap_or_else(|| default_build(paths, toolchain)),
        install: descriptor
            .install
            .clone()
            .unwrap_or_else(|| default_install(paths, toolchain)),
    }
}

fn default_configure(
    descriptor: &PackageDescriptor,
    paths: &WorkingPaths,
    toolchain: &Toolchain,
    ambient: &AmbientDefinitions,
) -> CommandLine {
    let mut cmd = CommandLine::new(&toolchain.cmake);

    if let Some(generator) = &toolchain.generator {
        cmd = cmd.literal("-G").literal(generator);
    }

    for (key, value) in &descriptor.definitions {
        cmd = cmd.literal(format!("-D{}={}", key, value));
    }

    for (key, value) in ambient.iter() {
        cmd = cmd.literal(format!("-D{}={}", key, value));
    }

    cmd.literal(format!("-DCMAKE_BUILD_TYPE={}", BUILD_CONFIG))
        .arg(Arg::Template(vec![
            Fragment::Text("-DCMAKE_INSTALL_PREFIX=".to_string()),
            Fragment::InstallPath,
        ]))
        .arg(Arg::Path(paths.source.clone()))
}

fn default_build(paths: &WorkingPaths, toolchain: &Toolchain) -> CommandLine {
    let cmd = CommandLine::new(&toolchain.cmake)
        .literal("--build")
        .arg(Arg::Path(paths.build.clone()))
        .literal("--config")
        .literal(BUILD_CONFIG);

    match toolchain.jobs {
        Some(jobs) => cmd.literal("--parallel").literal(jobs.to_string()),
        None => cmd,
    }
}

fn default_install(paths: &WorkingPaths, toolchain: &Toolchain) -> CommandLine {
    CommandLine::new(&toolchain.cmake)
        .literal("--install")
        .arg(Arg::Path(paths.build.clone()))
        .literal("--config")
        .literal(BUILD_CONFIG)
}
