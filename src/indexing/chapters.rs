//! Chapter and page discovery inside an extracted comic, plus cover selection

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::LibraryConfig;
use crate::library::{page_stem, ROOT_CHAPTER};
use crate::natural::sort_natural;

/// Which files count as pages and which as covers
#[derive(Debug, Clone)]
pub struct ImageFilter {
    extensions: Vec<String>,
    cover_keywords: Vec<String>,
}

impl ImageFilter {
    pub fn new(config: &LibraryConfig) -> Self {
        Self {
            extensions: config
                .image_extensions
                .iter()
                .map(|e| format!(".{}", e.trim_start_matches('.').to_lowercase()))
                .collect(),
            cover_keywords: config
                .cover_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    pub fn is_image(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }

    pub fn is_cover(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.cover_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    pub fn is_page(&self, name: &str) -> bool {
        self.is_image(name) && !self.is_cover(name)
    }
}

/// Names of the files (not directories) in `dir`
fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    sort_natural(&mut names);
    Ok(names)
}

/// A chapter found in the extracted archive
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterSource {
    pub name: String,
    pub dir: PathBuf,
    /// Page file names, natural order
    pub pages: Vec<String>,
}

/// Chapters of a comic root: its subdirectories in natural order, or the
/// root itself as chapter `.` when there are none.
pub fn discover_chapters(root: &Path, filter: &ImageFilter) -> Result<Vec<ChapterSource>> {
    let mut dirs: Vec<(String, PathBuf)> = subdirectories(root)?
        .into_iter()
        .map(|name| {
            let dir = root.join(&name);
            (name, dir)
        })
        .collect();
    if dirs.is_empty() {
        dirs.push((ROOT_CHAPTER.to_string(), root.to_path_buf()));
    }

    dirs.into_iter()
        .map(|(name, dir)| {
            let pages = list_pages(&dir, filter)?;
            Ok(ChapterSource { name, dir, pages })
        })
        .collect()
}

/// Page images of one directory, covers excluded, natural order.
///
/// Descriptions and streams are keyed by file stem, so only the first page
/// of each stem is kept.
pub fn list_pages(dir: &Path, filter: &ImageFilter) -> Result<Vec<String>> {
    let mut pages: Vec<String> = file_names(dir)?
        .into_iter()
        .filter(|name| filter.is_page(name))
        .collect();
    sort_natural(&mut pages);

    let mut stems = HashSet::new();
    pages.retain(|page| {
        let unique = stems.insert(page_stem(page).to_string());
        if !unique {
            warn!(dir = ?dir, page = %page, "Skipping page whose name stem is already used");
        }
        unique
    });
    Ok(pages)
}

/// Write `cover` from the first decodable cover candidate under `root`.
///
/// The root is searched first, then each immediate subdirectory in natural
/// order. An existing cover is left alone. Returns whether a cover exists
/// afterwards.
pub fn ensure_cover(root: &Path, cover: &Path, filter: &ImageFilter) -> Result<bool> {
    if cover.exists() {
        return Ok(true);
    }

    let mut search = vec![root.to_path_buf()];
    search.extend(subdirectories(root)?.into_iter().map(|d| root.join(d)));

    for dir in search {
        let mut candidates: Vec<String> = file_names(&dir)?
            .into_iter()
            .filter(|name| filter.is_cover(name) && filter.is_image(name))
            .collect();
        sort_natural(&mut candidates);

        for name in candidates {
            let path = dir.join(&name);
            match write_cover(&path, cover) {
                Ok(()) => {
                    info!("Saved cover from {:?}", path);
                    return Ok(true);
                }
                Err(e) => error!("Failed to convert cover candidate {:?}: {:#}", path, e),
            }
        }
    }

    warn!("No cover image found under {:?}", root);
    Ok(false)
}

fn write_cover(source: &Path, cover: &Path) -> Result<()> {
    let img = image::open(source).with_context(|| format!("Failed to decode {:?}", source))?;
    if let Some(parent) = cover.parent() {
        fs::create_dir_all(parent)?;
    }
    img.to_rgb8()
        .save_with_format(cover, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write cover {:?}", cover))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter() -> ImageFilter {
        ImageFilter::new(&LibraryConfig::default())
    }

    fn png(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbaImage::new(2, 2).save(path).unwrap();
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_filter() {
        let f = filter();
        assert!(f.is_page("001.PNG"));
        assert!(!f.is_page("Cover.jpg"));
        assert!(!f.is_page("folder.png"));
        assert!(!f.is_page("notes.txt"));
        assert!(f.is_cover("my_cover.webp"));
    }

    #[test]
    fn test_discover_chapters_natural_order() {
        let dir = TempDir::new().unwrap();
        for p in ["ch10/1.png", "ch2/2.png", "ch2/10.png", "ch2/cover.png", "ch1/a.txt"] {
            touch(&dir.path().join(p));
        }

        let chapters = discover_chapters(dir.path(), &filter()).unwrap();
        let names: Vec<&str> = chapters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ch1", "ch2", "ch10"]);
        assert!(chapters[0].pages.is_empty());
        assert_eq!(chapters[1].pages, vec!["2.png", "10.png"]);
    }

    #[test]
    fn test_pages_sharing_a_stem_keep_the_first() {
        let dir = TempDir::new().unwrap();
        for p in ["1.png", "1.jpg", "2.png"] {
            touch(&dir.path().join(p));
        }

        let pages = list_pages(dir.path(), &filter()).unwrap();
        assert_eq!(pages, vec!["1.jpg", "2.png"]);
    }

    #[test]
    fn test_flat_archive_is_root_chapter() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("p2.jpg"));
        touch(&dir.path().join("p1.jpg"));

        let chapters = discover_chapters(dir.path(), &filter()).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].name, ".");
        assert_eq!(chapters[0].pages, vec!["p1.jpg", "p2.jpg"]);
    }

    #[test]
    fn test_cover_prefers_root_and_skips_bad_candidates() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("comic");
        touch(&root.join("cover_broken.png"));
        png(&root.join("ch1/folder.png"));
        let cover = dir.path().join("lib/cover.png");

        assert!(ensure_cover(&root, &cover, &filter()).unwrap());
        let written = image::open(&cover).unwrap();
        assert_eq!(written.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_existing_cover_kept() {
        let dir = TempDir::new().unwrap();
        let cover = dir.path().join("cover.png");
        fs::write(&cover, b"keep").unwrap();
        png(&dir.path().join("root/cover.png"));

        assert!(ensure_cover(&dir.path().join("root"), &cover, &filter()).unwrap());
        assert_eq!(fs::read(&cover).unwrap(), b"keep");
    }

    #[test]
    fn test_no_cover() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("1.png"));
        let cover = dir.path().join("out/cover.png");
        assert!(!ensure_cover(dir.path(), &cover, &filter()).unwrap());
        assert!(!cover.exists());
    }
}
