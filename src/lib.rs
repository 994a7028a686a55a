//! Incremental source-dependency builds for a host project
//!
//! Each declared package goes through the same pipeline:
//!
//! 1. FETCH: download the archive into a shared cache and check its digest
//! 2. NORMALIZE: extract it into a canonical `src/` tree
//! 3. CONFIGURE, BUILD, INSTALL: run the stage commands (CMake by default)
//!    in an out-of-tree build directory, installing into a shared prefix
//!
//! Progress is recorded as `*.stamp` markers next to the package's working
//! directories. A second run with nothing changed does nothing; a run after a
//! failure resumes at the failed step.
//!
//! # Example Manifest
//!
//! ```toml
//! [[package]]
//! name = "iconv"
//! url = "https://ftp.gnu.org/pub/gnu/libiconv/libiconv-1.17.tar.gz"
//! digest = "SHA256=8f74213b56238c85a50a5329f77e06198771e70dd9a739779f4c02f65d971313"
//! configure = ["../src/configure", "--prefix=<INSTALL_DIR>", "--enable-static"]
//! build = ["make"]
//! install = ["make", "install"]
//!
//! [[locate]]
//! name = "iconv"
//! header = "iconv.h"
//! library = "iconv"
//! required = true
//! ```
//!
//! After `depbuild build`, `depbuild locate` prints the include directories
//! and libraries the host should use.

pub mod command;
pub mod core;
pub mod descriptor;
pub mod extract;
pub mod fetch;
pub mod layout;
pub mod locate;
pub mod manifest;
pub mod pipeline;
pub mod stage;

pub use crate::core::output;
pub use descriptor::{Declaration, PackageDescriptor};
pub use layout::WorkingPaths;
pub use manifest::{Manifest, Overrides};
pub use pipeline::{PipelineContext, PipelineError, PipelineReport};
