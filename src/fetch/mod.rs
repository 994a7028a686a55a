//! FETCH step: get the archive into the cache and check its digest
//!
//! The cache key is `{name}-{remote filename}`. A cached archive is reused as
//! long as it exists. Its digest is checked after a transfer, and also when
//! the download-verified marker is missing, so an archive that once failed
//! verification keeps failing instead of being trusted on the next run.
//!
//! Once verified, a cached archive is trusted without re-hashing unless
//! re-verification was requested. Corruption that happens after that point
//! is only caught with `reverify`, or by deleting the cache file.

pub mod download;
pub mod url;
pub mod verify;

use std::path::PathBuf;
use thiserror::Error;

use crate::core::output;
use crate::descriptor::PackageDescriptor;
use crate::layout::WorkingPaths;
use crate::stage::ledger::{Ledger, LedgerError, Marker};

pub use download::TransferPolicy;
pub use verify::{ExpectedDigest, HashAlgorithm, VerifyError};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transfer from {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("transfer from {url} failed: HTTP status {code}")]
    HttpStatus { url: String, code: u16 },

    #[error("refusing unauthenticated transfer from {url}: only https:// is allowed")]
    InsecureTransport { url: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Outcome of checking the cached archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Digest computed and matched.
    Verified,
    /// No digest was declared, so nothing was checked.
    Unverified,
    /// Verified on an earlier run and trusted now.
    Trusted,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Check the digest on every run, not only until it first passes.
    pub reverify: bool,
}

#[derive(Debug, Clone)]
pub struct Acquired {
    pub archive: PathBuf,
    pub downloaded: bool,
    pub verification: Verification,
}

/// Make sure the package archive is cached and, when a digest is declared,
/// that it matches.
///
/// On mismatch the archive stays in the cache for inspection and no marker is
/// written.
pub fn acquire(
    descriptor: &PackageDescriptor,
    paths: &WorkingPaths,
    ledger: &Ledger,
    options: FetchOptions,
) -> Result<Acquired, FetchError> {
    let archive = paths.cached_archive(&descriptor.remote_filename());

    let downloaded = if archive.is_file() {
        output::detail(&format!("using cached {}", archive.display()));
        false
    } else {
        output::detail(&format!("downloading {}", descriptor.url));
        download::fetch_to(
            &descriptor.url,
            &archive,
            TransferPolicy::new(descriptor.require_authenticated_transfer),
        )?;
        true
    };

    let already_verified = ledger.is_complete(Marker::Downloaded);
    if !downloaded && already_verified && !options.reverify {
        return Ok(Acquired {
            archive,
            downloaded,
            verification: Verification::Trusted,
        });
    }

    let verification = match &descriptor.expected_digest {
        None => Verification::Unverified,
        Some(expected) => {
            output::detail(&format!("verifying {} of {}", expected.algorithm, archive.display()));
            verify::verify_file(&archive, expected)?;
            Verification::Verified
        }
    };

    // The marker keeps its first timestamp; later steps stay up to date
    if !already_verified {
        ledger.mark(Marker::Downloaded)?;
    }

    Ok(Acquired {
        archive,
        downloaded,
        verification,
    })
}
