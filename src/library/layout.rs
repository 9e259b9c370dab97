//! On-disk layout of the comic library
//!
//! ```text
//! <base>/index.json                         display name -> hash
//! <base>/<hash>/info.json                   {"name": ...}
//! <base>/<hash>/cover.png
//! <base>/<hash>/pic/<chapter>/<page>        original page images
//! <base>/<hash>/pic_detail/<chapter>/manifest.json
//! <base>/<hash>/pic_detail/<chapter>/<stem>.txt
//! <base>/<hash>/cap_summary/<chapter>/summary.txt
//! ```
//!
//! The synthetic chapter `.` of a flat archive lives directly in `pic/`,
//! `pic_detail/` and `cap_summary/`.

use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the chapter used when an archive has no chapter folders
pub const ROOT_CHAPTER: &str = ".";

pub const COVER_FILE: &str = "cover.png";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SUMMARY_FILE: &str = "summary.txt";

const INFO_FILE: &str = "info.json";
const INDEX_FILE: &str = "index.json";

/// Per-chapter areas of a comic directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Pages,
    Details,
    Summary,
}

impl Area {
    pub const ALL: [Area; 3] = [Area::Pages, Area::Details, Area::Summary];

    fn dir_name(self) -> &'static str {
        match self {
            Area::Pages => "pic",
            Area::Details => "pic_detail",
            Area::Summary => "cap_summary",
        }
    }
}

/// Metadata stored in `info.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComicInfo {
    pub name: String,
}

/// Path helpers rooted at the library data directory
#[derive(Debug, Clone)]
pub struct Library {
    base: PathBuf,
}

impl Library {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn index_path(&self) -> PathBuf {
        self.base.join(INDEX_FILE)
    }

    pub fn comic_dir(&self, hash: &str) -> PathBuf {
        self.base.join(hash)
    }

    pub fn info_path(&self, hash: &str) -> PathBuf {
        self.comic_dir(hash).join(INFO_FILE)
    }

    pub fn cover_path(&self, hash: &str) -> PathBuf {
        self.comic_dir(hash).join(COVER_FILE)
    }

    pub fn area_dir(&self, hash: &str, area: Area) -> PathBuf {
        self.comic_dir(hash).join(area.dir_name())
    }

    /// Directory of one chapter inside an area
    pub fn chapter_dir(&self, hash: &str, area: Area, chapter: &str) -> PathBuf {
        let dir = self.area_dir(hash, area);
        if chapter == ROOT_CHAPTER {
            dir
        } else {
            dir.join(chapter)
        }
    }

    pub fn manifest_path(&self, hash: &str, chapter: &str) -> PathBuf {
        self.chapter_dir(hash, Area::Details, chapter).join(MANIFEST_FILE)
    }

    pub fn description_path(&self, hash: &str, chapter: &str, page_stem: &str) -> PathBuf {
        self.chapter_dir(hash, Area::Details, chapter)
            .join(format!("{}.txt", page_stem))
    }

    pub fn summary_path(&self, hash: &str, chapter: &str) -> PathBuf {
        self.chapter_dir(hash, Area::Summary, chapter).join(SUMMARY_FILE)
    }

    pub fn page_path(&self, hash: &str, chapter: &str, image: &str) -> PathBuf {
        self.chapter_dir(hash, Area::Pages, chapter).join(image)
    }

    /// Read `info.json` of a comic
    pub fn read_info(&self, hash: &str) -> Result<ComicInfo> {
        read_json(&self.info_path(hash))
    }

    pub fn write_info(&self, hash: &str, info: &ComicInfo) -> Result<()> {
        write_json_atomic(&self.info_path(hash), info)
    }

    /// Hashes of every comic directory carrying an `info.json`
    pub fn comic_hashes(&self) -> Result<Vec<String>> {
        if !self.base.exists() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.base)
            .with_context(|| format!("Failed to list library {:?}", self.base))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let hash = entry.file_name().to_string_lossy().into_owned();
                if self.info_path(&hash).exists() {
                    hashes.push(hash);
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Chapters with a stored summary, in natural order
    pub fn summarized_chapters(&self, hash: &str) -> Result<Vec<String>> {
        let dir = self.area_dir(hash, Area::Summary);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut chapters = Vec::new();
        for entry in
            fs::read_dir(&dir).with_context(|| format!("Failed to list chapters in {:?}", dir))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                chapters.push(entry.file_name().to_string_lossy().into_owned());
            } else if entry.file_name() == SUMMARY_FILE {
                chapters.push(ROOT_CHAPTER.to_string());
            }
        }
        crate::natural::sort_natural(&mut chapters);
        Ok(chapters)
    }

    /// Remove one chapter from the given areas. Missing directories are fine.
    pub fn remove_chapter(&self, hash: &str, chapter: &str, areas: &[Area]) -> Result<()> {
        for &area in areas {
            // For the root chapter this is the whole area; a flat comic has no other chapters.
            let dir = self.chapter_dir(hash, area, chapter);
            if dir.exists() {
                fs::remove_dir_all(&dir).with_context(|| format!("Failed to remove {:?}", dir))?;
                debug!(chapter, area = ?area, "Removed chapter directory");
            }
        }
        Ok(())
    }
}

/// Reject names that could escape their directory
pub fn validate_component(kind: &str, name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(anyhow!("invalid {} name: {:?}", kind, name));
    }
    Ok(())
}

/// Read and parse a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

/// Write JSON through a temp file and rename, so readers never see a partial file
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let content = serde_json::to_string_pretty(value).with_context(|| "Failed to serialize JSON")?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {:?}", temp_path))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {:?}", temp_path))?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_root_chapter_maps_to_area_dir() {
        let lib = Library::new("/data");
        assert_eq!(
            lib.chapter_dir("h", Area::Pages, ROOT_CHAPTER),
            PathBuf::from("/data/h/pic")
        );
        assert_eq!(
            lib.summary_path("h", "ch1"),
            PathBuf::from("/data/h/cap_summary/ch1/summary.txt")
        );
        assert_eq!(
            lib.description_path("h", "ch1", "001"),
            PathBuf::from("/data/h/pic_detail/ch1/001.txt")
        );
    }

    #[test]
    fn test_info_roundtrip_and_listing() {
        let dir = TempDir::new().unwrap();
        let lib = Library::new(dir.path());
        lib.write_info("h2", &ComicInfo { name: "Two".into() }).unwrap();
        lib.write_info("h1", &ComicInfo { name: "One".into() }).unwrap();
        fs::create_dir_all(dir.path().join("stray")).unwrap();

        assert_eq!(lib.read_info("h1").unwrap().name, "One");
        assert_eq!(lib.comic_hashes().unwrap(), vec!["h1", "h2"]);
    }

    #[test]
    fn test_summarized_chapters_natural_order() {
        let dir = TempDir::new().unwrap();
        let lib = Library::new(dir.path());
        for ch in ["ch10", "ch2", "ch1"] {
            let path = lib.summary_path("h", ch);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "s").unwrap();
        }

        assert_eq!(lib.summarized_chapters("h").unwrap(), vec!["ch1", "ch2", "ch10"]);
    }

    #[test]
    fn test_flat_summary_is_root_chapter() {
        let dir = TempDir::new().unwrap();
        let lib = Library::new(dir.path());
        let path = lib.summary_path("h", ROOT_CHAPTER);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "s").unwrap();

        assert_eq!(lib.summarized_chapters("h").unwrap(), vec!["."]);
    }

    #[test]
    fn test_validate_component() {
        assert!(validate_component("chapter", "ch1").is_ok());
        assert!(validate_component("chapter", "..").is_err());
        assert!(validate_component("chapter", "a/b").is_err());
        assert!(validate_component("chapter", "").is_err());
    }
}
