//! Root filesystem download and extraction.
//!
//! Base layers are populated from a gzip-compressed tar archive fetched
//! over HTTP(S). The build engine consumes this through the
//! [`RootfsFetcher`] trait so tests can substitute a recording fake.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use containy_core::error::{ContainyError, Result};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::overlay::ensure_directories;

/// Name of the temporary archive inside the destination directory.
const ARCHIVE_NAME: &str = "rootfs.tar.gz";

/// Source of base-layer root filesystems.
pub trait RootfsFetcher {
    /// Populate the empty `dest` directory from `url`.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Fetches root filesystems over HTTP(S).
#[derive(Debug, Default)]
pub struct HttpFetcher;

impl RootfsFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        download_rootfs(url, dest)
    }
}

/// Download a gzip-compressed tar root filesystem and extract it into
/// `dest`.
///
/// `dest` is created if missing and must be empty. The downloaded archive
/// is removed once extraction succeeds.
pub fn download_rootfs(url: &str, dest: &Path) -> Result<()> {
    tracing::debug!(url, dest = %dest.display(), "Downloading root filesystem");
    ensure_empty_dir(dest)?;

    let archive_path = dest.join(ARCHIVE_NAME);
    download_file(url, &archive_path)?;
    extract_tar_gz(&archive_path, dest)?;

    fs::remove_file(&archive_path).map_err(|e| {
        ContainyError::Io(format!(
            "failed to remove archive {}: {}",
            archive_path.display(),
            e
        ))
    })
}

/// Create `dest` if needed and verify it holds no entries.
fn ensure_empty_dir(dest: &Path) -> Result<()> {
    if dest.exists() {
        let mut entries = fs::read_dir(dest).map_err(|e| {
            ContainyError::Io(format!(
                "failed to read directory {}: {}",
                dest.display(),
                e
            ))
        })?;
        if entries.next().is_some() {
            return Err(ContainyError::Io(format!(
                "destination directory {} is not empty",
                dest.display()
            )));
        }
    } else {
        ensure_directories(&[dest])?;
    }
    Ok(())
}

/// Stream `url` into a file at `dest`.
fn download_file(url: &str, dest: &Path) -> Result<()> {
    tracing::debug!(url, dest = %dest.display(), "Downloading file");
    let mut response = reqwest::blocking::get(url)
        .map_err(|e| ContainyError::Network(format!("failed to fetch {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(ContainyError::Network(format!(
            "failed to fetch {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let mut out = File::create(dest).map_err(|e| {
        ContainyError::Io(format!("failed to create {}: {}", dest.display(), e))
    })?;
    io::copy(&mut response, &mut out).map_err(|e| {
        ContainyError::Network(format!("failed to write {}: {}", dest.display(), e))
    })?;
    Ok(())
}

/// Extract directories, regular files, and symlinks from a tar.gz archive,
/// preserving mode bits. Other entry types are skipped with a warning.
fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    tracing::debug!(archive = %archive_path.display(), dest = %dest.display(), "Extracting archive");
    let file = File::open(archive_path).map_err(|e| {
        ContainyError::Io(format!(
            "failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);

    let entries = archive.entries().map_err(|e| {
        ContainyError::Archive(format!(
            "failed to read archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| {
            ContainyError::Archive(format!(
                "corrupt entry in {}: {}",
                archive_path.display(),
                e
            ))
        })?;
        let kind = entry.header().entry_type();
        let path = entry.path().map(|p| p.into_owned()).unwrap_or_default();

        match kind {
            EntryType::Directory | EntryType::Regular | EntryType::Symlink => {
                let unpacked = entry.unpack_in(dest).map_err(|e| {
                    ContainyError::Archive(format!(
                        "failed to extract {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                if !unpacked {
                    tracing::warn!(path = %path.display(), "Skipping entry that escapes the destination");
                }
            }
            other => {
                tracing::warn!(path = %path.display(), kind = ?other, "Skipping unsupported tar entry type");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Build a small tar.gz archive on disk for extraction tests.
    fn create_test_rootfs(path: &Path) {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use tar::{Builder, Header};

        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);

        // Directory
        let mut dir = Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_cksum();
        builder.append_data(&mut dir, "bin/", io::empty()).unwrap();

        // Regular file with a distinctive mode
        let content = b"#!/bin/sh\n";
        let mut exe = Header::new_gnu();
        exe.set_size(content.len() as u64);
        exe.set_mode(0o755);
        exe.set_cksum();
        builder.append_data(&mut exe, "bin/busybox", &content[..]).unwrap();

        // Symlink
        let mut link = Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        link.set_cksum();
        builder.append_link(&mut link, "bin/sh", "busybox").unwrap();

        // FIFO, which the extractor should skip
        let mut fifo = Header::new_gnu();
        fifo.set_entry_type(EntryType::Fifo);
        fifo.set_size(0);
        fifo.set_mode(0o644);
        fifo.set_cksum();
        builder.append_data(&mut fifo, "dev/pipe", io::empty()).unwrap();

        builder.finish().unwrap();
    }

    #[test]
    fn test_extract_files_directories_and_symlinks() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("fs.tar.gz");
        let dest = tmp.path().join("rootfs");
        fs::create_dir_all(&dest).unwrap();
        create_test_rootfs(&archive);

        extract_tar_gz(&archive, &dest).unwrap();

        assert!(dest.join("bin").is_dir());
        assert_eq!(fs::read(dest.join("bin/busybox")).unwrap(), b"#!/bin/sh\n");
        assert_eq!(
            fs::read_link(dest.join("bin/sh")).unwrap(),
            Path::new("busybox")
        );
    }

    #[test]
    fn test_extract_preserves_file_mode() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("fs.tar.gz");
        let dest = tmp.path().join("rootfs");
        fs::create_dir_all(&dest).unwrap();
        create_test_rootfs(&archive);

        extract_tar_gz(&archive, &dest).unwrap();

        let mode = fs::metadata(dest.join("bin/busybox"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_skips_unsupported_entry_types() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("fs.tar.gz");
        let dest = tmp.path().join("rootfs");
        fs::create_dir_all(&dest).unwrap();
        create_test_rootfs(&archive);

        extract_tar_gz(&archive, &dest).unwrap();

        assert!(!dest.join("dev/pipe").exists());
    }

    #[test]
    fn test_extract_missing_archive_fails() {
        let tmp = TempDir::new().unwrap();
        let err =
            extract_tar_gz(&tmp.path().join("nope.tar.gz"), tmp.path()).unwrap_err();
        assert!(matches!(err, ContainyError::Io(_)));
    }

    #[test]
    fn test_ensure_empty_dir_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("fresh");

        ensure_empty_dir(&dest).unwrap();
        assert!(dest.is_dir());
    }

    #[test]
    fn test_download_rootfs_rejects_populated_destination() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("rootfs");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("existing"), b"data").unwrap();

        // Fails on the precondition, before any network access
        let err = download_rootfs("http://127.0.0.1:1/fs.tgz", &dest).unwrap_err();
        assert!(matches!(err, ContainyError::Io(_)));
    }
}
