//! depbuild CLI - fetch, build and install source dependencies
//!
//! Usage:
//!   depbuild build [manifest] [--only NAME]   Run the pipeline for each package
//!   depbuild locate [manifest]                Print the consumption interface as JSON
//!   depbuild status [manifest]                Show the marker state of each package
//!   depbuild hash <file>                      Print digests for a declaration

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use levitate_depbuild::fetch::verify;
use levitate_depbuild::locate;
use levitate_depbuild::pipeline::{self, MarkerState};
use levitate_depbuild::{Manifest, Overrides, output};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_MANIFEST: &str = "depbuild.toml";

#[derive(Parser)]
#[command(name = "depbuild")]
#[command(about = "Incremental fetch/configure/build/install of source dependencies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working root for caches, sources and build trees
    #[arg(long, global = true, env = "DEPBUILD_ROOT")]
    root: Option<PathBuf>,

    /// Shared install prefix
    #[arg(long, global = true, env = "DEPBUILD_INSTALL_ROOT")]
    install_root: Option<PathBuf>,

    /// Show configure/build/install output instead of writing logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Check archive digests on every run
    #[arg(long, global = true)]
    reverify: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, configure, build and install declared packages
    Build {
        /// Path to the manifest
        #[arg(default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,

        /// Only process these packages
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
    },

    /// Look up installed headers and libraries
    Locate {
        /// Path to the manifest
        #[arg(default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },

    /// Show which steps each package has completed
    Status {
        /// Path to the manifest
        #[arg(default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },

    /// Print the digests of a file
    Hash {
        /// File to hash
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let overrides = Overrides {
        root: cli.root,
        install_root: cli.install_root,
        verbose: cli.verbose,
        reverify: cli.reverify,
    };

    match cli.command {
        Commands::Build { manifest, only } => build(&manifest, &only, &overrides),
        Commands::Locate { manifest } => locate_all(&manifest, &overrides),
        Commands::Status { manifest } => status(&manifest, &overrides),
        Commands::Hash { file } => hash(&file),
    }
}

fn load(path: &Path) -> Result<Manifest> {
    Manifest::load(path).with_context(|| format!("Failed to load manifest {}", path.display()))
}

fn build(manifest_path: &Path, only: &[String], overrides: &Overrides) -> Result<()> {
    let manifest = load(manifest_path)?;
    // Every declaration is checked before the first download starts
    let descriptors = manifest.descriptors()?;
    let ctx = manifest.context(overrides)?;

    for name in only {
        if !descriptors.iter().any(|d| &d.name == name) {
            bail!("package '{}' is not declared in {}", name, manifest_path.display());
        }
    }

    let selected: Vec<_> = descriptors
        .iter()
        .filter(|d| only.is_empty() || only.contains(&d.name))
        .collect();
    if selected.is_empty() {
        output::info("no packages declared");
        return Ok(());
    }

    let total = selected.len();
    let mut warnings = 0;
    for (i, descriptor) in selected.into_iter().enumerate() {
        output::action_numbered(i + 1, total, &format!("Processing {}", descriptor.name));
        let report = pipeline::run(descriptor, &ctx)
            .with_context(|| format!("Failed to build {}", descriptor.name))?;
        warnings += report.warnings.len();
    }

    if warnings > 0 {
        output::info(&format!("{} package(s) done with {} warning(s)", total, warnings));
    } else {
        output::success(&format!("{} package(s) installed in {}", total, ctx.install_root.display()));
    }
    Ok(())
}

fn locate_all(manifest_path: &Path, overrides: &Overrides) -> Result<()> {
    let manifest = load(manifest_path)?;
    let prefix = manifest.install_root(overrides);

    // stdout carries only the JSON document
    let located = locate::locate_all(&manifest.locate, &prefix)?;
    let json = serde_json::to_string_pretty(&located).context("Failed to serialize locate results")?;
    println!("{}", json);
    Ok(())
}

fn status(manifest_path: &Path, overrides: &Overrides) -> Result<()> {
    let manifest = load(manifest_path)?;
    let ctx = manifest.context(overrides)?;

    for decl in &manifest.package {
        let st = pipeline::status(&decl.name, &ctx)?;
        if st.is_installed() {
            output::success(&format!("{}: installed", st.name));
            continue;
        }

        match st.latest {
            Some(marker) => output::info(&format!("{}: resumes after {}", st.name, marker)),
            None => output::info(&format!("{}: not started", st.name)),
        }
        for (marker, state) in &st.markers {
            let label = match state {
                MarkerState::Current => "done",
                MarkerState::Stale => "stale",
                MarkerState::Missing => "pending",
            };
            output::detail(&format!("{:<18} {}", marker.to_string(), label));
        }
    }
    Ok(())
}

fn hash(file: &Path) -> Result<()> {
    let hashes = verify::compute_all_hashes(file)
        .with_context(|| format!("Failed to hash {}", file.display()))?;

    println!("SHA256={}", hashes.sha256);
    println!("SHA512={}", hashes.sha512);
    println!("SHA3_256={}", hashes.sha3_256);
    println!("BLAKE3={}", hashes.blake3);
    Ok(())
}
