//! File helpers for Dropline.
//!
//! - Human-readable size formatting for progress messages
//! - Validation of files before they are sent
//! - Sanitizing names received from the wire
//! - Collision-free creation of destination files

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::error::{Error, Result};

/// Characters replaced by `_` in received file names.
const UNSAFE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Name used when a received name sanitizes to nothing.
const FALLBACK_NAME: &str = "unnamed";

/// Upper bound on numeric suffixes tried before giving up.
pub const MAX_COLLISION_ATTEMPTS: u32 = 10_000;

/// Format a file size for display.
///
/// Uses binary units with at most two decimals; trailing zeros are dropped
/// (`1536` → `1.5 KB`, `2048` → `2 KB`).
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    let (value, unit) = if bytes >= GB {
        (bytes as f64 / GB as f64, "GB")
    } else if bytes >= MB {
        (bytes as f64 / MB as f64, "MB")
    } else if bytes >= KB {
        (bytes as f64 / KB as f64, "KB")
    } else {
        return format!("{bytes} B");
    };

    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {unit}")
}

/// Split a file name into stem and extension at the last dot.
///
/// A leading dot does not start an extension (`.bashrc` has none), and a
/// trailing dot yields an empty extension.
#[must_use]
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => (&name[..idx], &name[idx + 1..]),
    }
}

/// Build the `n`-th collision candidate for `name`: `stem_n.ext`.
#[must_use]
pub fn suffixed_name(name: &str, n: u32) -> String {
    let (stem, ext) = split_name(name);
    if ext.is_empty() {
        format!("{stem}_{n}")
    } else {
        format!("{stem}_{n}.{ext}")
    }
}

/// Reduce a name received from a peer to a safe single path component.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if UNSAFE_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// A destination file created exclusively inside the storage directory.
#[derive(Debug)]
pub struct UniqueFile {
    /// Open handle, positioned at the start of an empty file
    pub file: File,
    /// Full path of the created file
    pub path: PathBuf,
    /// Final file name (differs from the requested one after collisions)
    pub name: String,
}

/// Create `name` inside `dir`, or the first free `stem_n.ext` variant.
///
/// Each candidate is opened with `create_new`, so choosing the name and
/// creating the file are one atomic step even when several peers deliver
/// the same name concurrently.
///
/// # Errors
///
/// Returns an error if a candidate cannot be created for a reason other
/// than already existing, or if [`MAX_COLLISION_ATTEMPTS`] is reached.
pub async fn create_unique_file(dir: &Path, name: &str) -> Result<UniqueFile> {
    let mut candidate = name.to_string();
    let mut counter = 0u32;

    loop {
        let path = dir.join(&candidate);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                return Ok(UniqueFile {
                    file,
                    path,
                    name: candidate,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                counter += 1;
                if counter > MAX_COLLISION_ATTEMPTS {
                    return Err(Error::Internal(format!(
                        "no free name for '{name}' after {MAX_COLLISION_ATTEMPTS} attempts"
                    )));
                }
                tracing::debug!(taken = %candidate, "Destination exists, trying next suffix");
                candidate = suffixed_name(name, counter);
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// Check that `path` can be sent and return its size.
///
/// # Errors
///
/// Returns an error if the path does not exist, is not a regular file,
/// cannot be opened for reading, or exceeds `max_size`.
pub async fn validate_for_transfer(path: &Path, max_size: Option<u64>) -> Result<u64> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(path.display().to_string()));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    if !metadata.is_file() {
        return Err(Error::NotAFile(path.display().to_string()));
    }

    let size = metadata.len();
    if let Some(limit) = max_size {
        if size > limit {
            return Err(Error::FileTooLarge { size, limit });
        }
    }

    File::open(path).await?;
    Ok(size)
}

/// Display name of a local path (its final component).
#[must_use]
pub fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1 MB");
        assert_eq!(format_size(1024 * 1024 * 1024 * 2), "2 GB");
        assert_eq!(format_size(1_234_567), "1.18 MB");
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("report.pdf"), ("report", "pdf"));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", "gz"));
        assert_eq!(split_name("README"), ("README", ""));
        assert_eq!(split_name(".bashrc"), (".bashrc", ""));
        assert_eq!(split_name("file."), ("file", ""));
    }

    #[test]
    fn test_suffixed_name() {
        assert_eq!(suffixed_name("report.pdf", 1), "report_1.pdf");
        assert_eq!(suffixed_name("report.pdf", 12), "report_12.pdf");
        assert_eq!(suffixed_name("README", 2), "README_2");
        assert_eq!(suffixed_name(".bashrc", 1), ".bashrc_1");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\a.txt"), "a.txt");
        assert_eq!(sanitize_file_name("what?<>.txt"), "what___.txt");
        assert_eq!(sanitize_file_name(".."), "unnamed");
        assert_eq!(sanitize_file_name("dir/"), "unnamed");
        assert_eq!(sanitize_file_name(""), "unnamed");
    }

    #[tokio::test]
    async fn test_create_unique_file_suffixes_in_order() {
        let temp_dir = TempDir::new().unwrap();

        let first = create_unique_file(temp_dir.path(), "report.pdf")
            .await
            .unwrap();
        let second = create_unique_file(temp_dir.path(), "report.pdf")
            .await
            .unwrap();
        let third = create_unique_file(temp_dir.path(), "report.pdf")
            .await
            .unwrap();

        assert_eq!(first.name, "report.pdf");
        assert_eq!(second.name, "report_1.pdf");
        assert_eq!(third.name, "report_2.pdf");
        assert!(third.path.exists());
    }

    #[tokio::test]
    async fn test_create_unique_file_fills_lowest_gap() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"a").unwrap();
        std::fs::write(temp_dir.path().join("notes_2.txt"), b"b").unwrap();

        let created = create_unique_file(temp_dir.path(), "notes.txt")
            .await
            .unwrap();
        assert_eq!(created.name, "notes_1.txt");
    }

    #[tokio::test]
    async fn test_create_unique_file_concurrent() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dir = dir.clone();
            handles.push(tokio::spawn(async move {
                create_unique_file(&dir, "same.bin").await.unwrap().name
            }));
        }

        let mut names = Vec::new();
        for handle in handles {
            names.push(handle.await.unwrap());
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8, "every task must get a distinct name");
    }

    #[tokio::test]
    async fn test_validate_for_transfer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, vec![0u8; 100]).unwrap();

        assert_eq!(validate_for_transfer(&path, None).await.unwrap(), 100);
        assert!(matches!(
            validate_for_transfer(&path, Some(50)).await,
            Err(Error::FileTooLarge { size: 100, limit: 50 })
        ));
        assert!(matches!(
            validate_for_transfer(&temp_dir.path().join("missing"), None).await,
            Err(Error::FileNotFound(_))
        ));
        assert!(matches!(
            validate_for_transfer(temp_dir.path(), None).await,
            Err(Error::NotAFile(_))
        ));
    }
}
