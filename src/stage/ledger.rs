//! Marker ledger: durable record of which pipeline steps completed
//!
//! Each marker is a `*.stamp` file whose modification time records when its
//! step last succeeded. A marker may only be written once its predecessor
//! exists, so the files on disk always form a prefix of the chain below, each
//! no older than the one before it.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("cannot record {marker} marker before {predecessor} has completed")]
    OutOfOrder { marker: Marker, predecessor: Marker },

    #[error("cannot write marker {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Completion markers, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Marker {
    Downloaded,
    SourceReady,
    Configured,
    Built,
    Installed,
}

impl Marker {
    pub const ALL: [Marker; 5] = [
        Marker::Downloaded,
        Marker::SourceReady,
        Marker::Configured,
        Marker::Built,
        Marker::Installed,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Marker::Downloaded => "download.stamp",
            Marker::SourceReady => "source.stamp",
            Marker::Configured => "config.stamp",
            Marker::Built => "build.stamp",
            Marker::Installed => "install.stamp",
        }
    }

    pub fn predecessor(&self) -> Option<Marker> {
        match self {
            Marker::Downloaded => None,
            Marker::SourceReady => Some(Marker::Downloaded),
            Marker::Configured => Some(Marker::SourceReady),
            Marker::Built => Some(Marker::Configured),
            Marker::Installed => Some(Marker::Built),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Marker::Downloaded => "download-verified",
            Marker::SourceReady => "source-normalized",
            Marker::Configured => "configured",
            Marker::Built => "built",
            Marker::Installed => "installed",
        })
    }
}

/// The markers of one package, rooted at its stamp directory.
#[derive(Debug, Clone)]
pub struct Ledger {
    dir: PathBuf,
}

impl Ledger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, marker: Marker) -> PathBuf {
        self.dir.join(marker.file_name())
    }

    /// When the marker was last written, if it exists.
    pub fn recorded_at(&self, marker: Marker) -> Option<SystemTime> {
        std::fs::metadata(self.path(marker))
            .and_then(|m| m.modified())
            .ok()
    }

    pub fn is_complete(&self, marker: Marker) -> bool {
        self.path(marker).is_file()
    }

    /// The marker exists and is not older than its predecessor.
    pub fn is_up_to_date(&self, marker: Marker) -> bool {
        let Some(own) = self.recorded_at(marker) else {
            return false;
        };
        match marker.predecessor() {
            None => true,
            Some(pred) => self.recorded_at(pred).is_some_and(|p| own >= p),
        }
    }

    /// Write or refresh a marker. Refuses when the predecessor is missing.
    pub fn mark(&self, marker: Marker) -> Result<(), LedgerError> {
        if let Some(pred) = marker.predecessor()
            && !self.is_complete(pred)
        {
            return Err(LedgerError::OutOfOrder {
                marker,
                predecessor: pred,
            });
        }

        let path = self.path(marker);
        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;

        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        std::fs::write(&path, format!("{}\n", secs)).map_err(io_err)?;
        Ok(())
    }

    /// Furthest marker in the unbroken chain from the start, if any.
    pub fn latest(&self) -> Option<Marker> {
        Marker::ALL
            .into_iter()
            .take_while(|m| self.is_complete(*m))
            .last()
    }
}
