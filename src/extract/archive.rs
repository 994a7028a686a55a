//! Native archive extraction (no external tools needed)
//!
//! Entries that would land outside the destination are rejected: absolute
//! paths, `..` components, link targets escaping the tree, and writes through
//! a symlink created earlier in the same archive.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use super::{ExtractError, io_err};

/// Archive formats understood by [`extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarXz,
    TarBz2,
    TarZst,
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from a filename extension.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Self::TarZst)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

fn bad(archive: &Path, message: impl Into<String>) -> ExtractError {
    ExtractError::Archive {
        archive: archive.to_path_buf(),
        message: message.into(),
    }
}

/// Extract `archive` into `dest`, creating `dest` if needed.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let format = ArchiveFormat::detect(archive)
        .ok_or_else(|| ExtractError::UnknownFormat(archive.to_path_buf()))?;

    std::fs::create_dir_all(dest).map_err(|source| ExtractError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    let file = File::open(archive).map_err(|source| ExtractError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    match format {
        ArchiveFormat::Tar => extract_tar(reader, archive, dest),
        ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(reader), archive, dest),
        ArchiveFormat::TarXz => extract_tar(xz2::read::XzDecoder::new(reader), archive, dest),
        ArchiveFormat::TarBz2 => extract_tar(bzip2::read::BzDecoder::new(reader), archive, dest),
        ArchiveFormat::TarZst => {
            let decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|e| bad(archive, format!("zstd init error: {}", e)))?;
            extract_tar(decoder, archive, dest)
        }
        ArchiveFormat::Zip => extract_zip(archive, dest),
    }
}

/// Lexically normalize a path without touching the filesystem.
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut has_root = false;

    for c in path.components() {
        match c {
            Component::Prefix(p) => {
                out.clear();
                out.push(p.as_os_str());
                has_root = true;
            }
            Component::RootDir => {
                out.push(Component::RootDir.as_os_str());
                has_root = true;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = out
                    .components()
                    .next_back()
                    .is_some_and(|last| matches!(last, Component::Normal(_)));
                if popped {
                    out.pop();
                } else if !has_root {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
        }
    }

    out
}

fn ensure_no_symlink_components(
    archive: &Path,
    dest: &Path,
    full_path: &Path,
) -> Result<(), ExtractError> {
    let rel = full_path.strip_prefix(dest).map_err(|_| {
        bad(
            archive,
            format!("entry outside destination: {}", full_path.display()),
        )
    })?;

    let mut cur = dest.to_path_buf();
    for comp in rel.components() {
        cur.push(comp);
        if let Ok(md) = std::fs::symlink_metadata(&cur)
            && md.file_type().is_symlink()
        {
            return Err(bad(
                archive,
                format!("symlink in path component: {}", cur.display()),
            ));
        }
    }

    Ok(())
}

fn ensure_link_target_within_dest(
    archive: &Path,
    dest: &Path,
    link_parent: &Path,
    link_name: &Path,
) -> Result<(), ExtractError> {
    if link_name.is_absolute()
        || link_name
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(bad(
            archive,
            format!("unsafe link target (absolute): {}", link_name.display()),
        ));
    }

    let candidate = normalize_lexical(&link_parent.join(link_name));
    if candidate.strip_prefix(normalize_lexical(dest)).is_err() {
        return Err(bad(
            archive,
            format!(
                "unsafe link target (escapes destination): {} -> {}",
                link_parent.display(),
                link_name.display()
            ),
        ));
    }

    Ok(())
}

fn extract_tar<R: Read>(reader: R, archive_path: &Path, dest: &Path) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    let entries = archive
        .entries()
        .map_err(|e| bad(archive_path, format!("tar read error: {}", e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| bad(archive_path, format!("tar entry error: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| bad(archive_path, format!("tar path error: {}", e)))?
            .into_owned();

        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            return Err(bad(archive_path, format!("unsafe path: {}", path.display())));
        }

        // Some archives contain a "." entry
        if path.as_os_str().is_empty() || path == Path::new(".") {
            continue;
        }

        // pax_global_header and similar metadata entries carry no files
        let entry_type = entry.header().entry_type();
        if matches!(
            entry_type,
            tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
        ) {
            continue;
        }

        let full_path = dest.join(&path);
        ensure_no_symlink_components(archive_path, dest, &full_path)?;

        if entry_type == tar::EntryType::Symlink || entry_type == tar::EntryType::Link {
            let link_name = entry
                .link_name()
                .map_err(|e| bad(archive_path, format!("tar link_name error: {}", e)))?
                .ok_or_else(|| {
                    bad(
                        archive_path,
                        format!("link without target: {}", path.display()),
                    )
                })?;
            // Hard link targets are relative to the archive root, symlinks to their parent
            let link_parent = if entry_type == tar::EntryType::Link {
                dest
            } else {
                full_path.parent().unwrap_or(dest)
            };
            ensure_link_target_within_dest(archive_path, dest, link_parent, &link_name)?;
        }

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ExtractError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        entry
            .unpack_in(dest)
            .map_err(|e| bad(archive_path, format!("unpack error for {}: {}", path.display(), e)))?;
    }

    Ok(())
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path).map_err(|source| ExtractError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| bad(archive_path, format!("zip read error: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| bad(archive_path, format!("zip entry error: {}", e)))?;

        let Some(rel) = file.enclosed_name() else {
            return Err(bad(
                archive_path,
                format!("unsafe path: {}", file.name()),
            ));
        };
        let outpath = dest.join(rel);
        ensure_no_symlink_components(archive_path, dest, &outpath)?;

        if file.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(io_err(&outpath))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut outfile = File::create(&outpath).map_err(io_err(&outpath))?;
        std::io::copy(&mut file, &mut outfile).map_err(io_err(&outpath))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(io_err(&outpath))?;
            }
        }
    }

    Ok(())
}
