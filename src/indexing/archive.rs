//! Zip extraction and archive fingerprinting

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Keep only normal components of an entry path, dropping `..`, `.`,
/// roots and drive prefixes. `None` when nothing is left.
fn sanitize_path(path: &str) -> Option<PathBuf> {
    let mut sanitized = PathBuf::new();
    for component in Path::new(path).components() {
        if let Component::Normal(part) = component {
            sanitized.push(part);
        }
    }

    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Unpack `archive` into `dest`, replacing whatever was there.
///
/// Returns the number of files written.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize> {
    if dest.exists() {
        fs::remove_dir_all(dest)
            .with_context(|| format!("Failed to clear extraction directory {:?}", dest))?;
    }
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create extraction directory {:?}", dest))?;

    let file =
        File::open(archive).with_context(|| format!("Failed to open archive {:?}", archive))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Invalid zip archive {:?}", archive))?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .with_context(|| format!("Failed to read entry {} of {:?}", i, archive))?;

        let Some(relative) = sanitize_path(entry.name()) else {
            warn!("Skipping archive entry with unusable path: {}", entry.name());
            continue;
        };
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory {:?}", target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create {:?}", target))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", entry.name()))?;
        written += 1;
    }

    debug!("Extracted {} files from {:?}", written, archive);
    Ok(written)
}

/// The directory holding the comic: the only top-level entry if it is a
/// directory, otherwise the extraction root itself.
pub fn comic_root(extracted: &Path) -> Result<PathBuf> {
    let entries: Vec<_> = fs::read_dir(extracted)
        .with_context(|| format!("Failed to list {:?}", extracted))?
        .collect::<io::Result<_>>()?;

    if let [only] = entries.as_slice() {
        if only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(extracted.to_path_buf())
}

/// Display name for an uploaded archive: its single top-level folder, or
/// the stem of `file_name` when the entries are not wrapped in one folder.
pub fn default_comic_name(archive: &Path, file_name: &str) -> Result<String> {
    let file =
        File::open(archive).with_context(|| format!("Failed to open archive {:?}", archive))?;
    let zip = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Invalid zip archive {:?}", archive))?;

    let mut top: Option<String> = None;
    let mut wrapped = zip.len() > 0;
    for name in zip.file_names() {
        let Some(path) = sanitize_path(name) else {
            continue;
        };
        let mut components = path.components();
        let first = components
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default();
        let is_folder = components.next().is_some() || name.ends_with('/');

        if !is_folder || top.as_ref().is_some_and(|t| *t != first) {
            wrapped = false;
            break;
        }
        top = Some(first);
    }

    match top {
        Some(folder) if wrapped => Ok(folder),
        _ => Ok(Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string())),
    }
}

/// sha256 of a file as lowercase hex
pub fn content_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("Failed to hash {:?}", path))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, bytes) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("a/b.png"), Some(PathBuf::from("a/b.png")));
        assert_eq!(sanitize_path("../../etc/passwd"), Some(PathBuf::from("etc/passwd")));
        assert_eq!(sanitize_path("/abs/x"), Some(PathBuf::from("abs/x")));
        assert_eq!(sanitize_path(".."), None);
    }

    #[test]
    fn test_extract_single_folder_becomes_root() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("book.zip");
        write_zip(&archive, &[("Book/ch1/1.png", b"a"), ("Book/ch2/1.png", b"b")]);

        let dest = dir.path().join("out");
        fs::create_dir_all(dest.join("stale")).unwrap();
        assert_eq!(extract_zip(&archive, &dest).unwrap(), 2);

        assert!(!dest.join("stale").exists());
        assert_eq!(comic_root(&dest).unwrap(), dest.join("Book"));
    }

    #[test]
    fn test_extract_flat_archive_root() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("flat.zip");
        write_zip(&archive, &[("1.png", b"a"), ("2.png", b"b")]);

        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();
        assert_eq!(comic_root(&dest).unwrap(), dest);
    }

    #[test]
    fn test_extract_contains_traversal() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.png", b"x")]);

        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();
        assert!(dest.join("escape.png").exists());
        assert!(!dir.path().join("escape.png").exists());
    }

    #[test]
    fn test_default_comic_name() {
        let dir = TempDir::new().unwrap();

        let wrapped = dir.path().join("a.zip");
        write_zip(&wrapped, &[("Night Sky/ch1/1.png", b"a"), ("Night Sky/ch2/1.png", b"b")]);
        assert_eq!(default_comic_name(&wrapped, "upload.zip").unwrap(), "Night Sky");

        let flat = dir.path().join("b.zip");
        write_zip(&flat, &[("ch1/1.png", b"a"), ("ch2/1.png", b"b")]);
        assert_eq!(default_comic_name(&flat, "Dawn.zip").unwrap(), "Dawn");

        let loose = dir.path().join("c.zip");
        write_zip(&loose, &[("1.png", b"a")]);
        assert_eq!(default_comic_name(&loose, "Loose.zip").unwrap(), "Loose");
    }

    #[test]
    fn test_content_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            content_hash(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
