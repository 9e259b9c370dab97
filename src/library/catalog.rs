//! Browsing and editing of processed comics

use serde::Serialize;
use std::fs;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::index::ComicIndex;
use super::layout::{read_json, validate_component, Area, ComicInfo, Library};
use crate::storage::{chapter_id, VectorIndex};
use crate::tasks::TaskStore;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("comic {0} not found")]
    ComicNotFound(String),

    #[error("chapter {0} not found")]
    ChapterNotFound(String),

    #[error("chapter name '{0}' already exists")]
    ChapterExists(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        CatalogError::Other(e.into())
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Row of the comic listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComicSummary {
    pub hash: String,
    pub name: String,
    pub chapters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageDetails {
    pub image: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterDetails {
    pub name: String,
    pub summary: String,
    /// Only filled for the chapter that was asked for
    pub pages: Vec<PageDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComicDetails {
    pub hash: String,
    pub name: String,
    pub chapters: Vec<ChapterDetails>,
}

/// Catalog operations over the library, the vector index and the task store
#[derive(Clone)]
pub struct Catalog {
    library: Library,
    index: Arc<dyn VectorIndex>,
    tasks: Arc<TaskStore>,
}

impl Catalog {
    pub fn new(library: Library, index: Arc<dyn VectorIndex>, tasks: Arc<TaskStore>) -> Self {
        Self {
            library,
            index,
            tasks,
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    fn require_comic(&self, hash: &str) -> CatalogResult<ComicInfo> {
        validate_component("comic", hash).map_err(|e| CatalogError::Invalid(e.to_string()))?;
        if !self.library.info_path(hash).exists() {
            return Err(CatalogError::ComicNotFound(hash.to_string()));
        }
        Ok(self.library.read_info(hash)?)
    }

    fn check_chapter(name: &str) -> CatalogResult<()> {
        if name == super::ROOT_CHAPTER {
            return Ok(());
        }
        validate_component("chapter", name).map_err(|e| CatalogError::Invalid(e.to_string()))
    }

    /// Every comic with its chapter count, sorted by name
    pub fn list_comics(&self) -> CatalogResult<Vec<ComicSummary>> {
        let mut comics = Vec::new();
        for hash in self.library.comic_hashes()? {
            match self.library.read_info(&hash) {
                Ok(info) => {
                    let chapters = self.library.summarized_chapters(&hash)?.len();
                    comics.push(ComicSummary {
                        hash,
                        name: info.name,
                        chapters,
                    });
                }
                Err(e) => warn!("Skipping comic {}: {:#}", hash, e),
            }
        }
        comics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(comics)
    }

    /// Chapters with summaries, plus page descriptions of `chapter` if given
    pub fn comic_details(&self, hash: &str, chapter: Option<&str>) -> CatalogResult<ComicDetails> {
        let info = self.require_comic(hash)?;

        let mut chapters = Vec::new();
        for name in self.library.summarized_chapters(hash)? {
            let summary = fs::read_to_string(self.library.summary_path(hash, &name))
                .unwrap_or_default();
            let pages = if chapter == Some(name.as_str()) {
                self.page_details(hash, &name)?
            } else {
                Vec::new()
            };
            chapters.push(ChapterDetails {
                name,
                summary,
                pages,
            });
        }

        Ok(ComicDetails {
            hash: hash.to_string(),
            name: info.name,
            chapters,
        })
    }

    fn page_details(&self, hash: &str, chapter: &str) -> CatalogResult<Vec<PageDetails>> {
        let manifest_path = self.library.manifest_path(hash, chapter);
        if !manifest_path.exists() {
            return Ok(Vec::new());
        }
        let manifest: Vec<String> = read_json(&manifest_path)?;

        Ok(manifest
            .into_iter()
            .map(|image| {
                let stem = page_stem(&image);
                let description =
                    fs::read_to_string(self.library.description_path(hash, chapter, stem)).ok();
                PageDetails { image, description }
            })
            .collect())
    }

    /// Change the display name of a comic
    pub fn update_name(&self, hash: &str, name: &str) -> CatalogResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::Invalid("name must not be empty".to_string()));
        }
        self.require_comic(hash)?;

        self.library.write_info(hash, &ComicInfo { name: name.to_string() })?;

        ComicIndex::update(&self.library, |index| index.rename_hash(hash, name))?;

        info!("Renamed comic {} to {}", hash, name);
        Ok(())
    }

    /// Remove a comic from disk, the vector index, the task list and the name index
    pub async fn delete_comic(&self, hash: &str) -> CatalogResult<()> {
        validate_component("comic", hash).map_err(|e| CatalogError::Invalid(e.to_string()))?;
        let dir = self.library.comic_dir(hash);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            info!("Removed comic directory {:?}", dir);
        }

        let removed = self.index.delete_by_comic(hash).await?;
        info!("Removed {} chapter vectors of {}", removed, hash);

        if self.tasks.remove(hash) {
            info!("Removed task record {}", hash);
        }

        ComicIndex::update(&self.library, |index| index.remove_hash(hash))?;
        Ok(())
    }

    /// Remove a chapter's summary, descriptions and vector
    pub async fn delete_chapter(&self, hash: &str, chapter: &str) -> CatalogResult<()> {
        self.require_comic(hash)?;
        Self::check_chapter(chapter)?;

        self.library
            .remove_chapter(hash, chapter, &[Area::Summary, Area::Details])?;
        self.index.delete(&chapter_id(hash, chapter)).await?;

        info!("Deleted chapter {}/{}", hash, chapter);
        Ok(())
    }

    /// Rename a chapter on disk, then its vector entry
    pub async fn rename_chapter(&self, hash: &str, old: &str, new: &str) -> CatalogResult<()> {
        self.require_comic(hash)?;
        Self::check_chapter(old)?;
        if new == super::ROOT_CHAPTER || old == super::ROOT_CHAPTER {
            return Err(CatalogError::Invalid(
                "the root chapter cannot be renamed".to_string(),
            ));
        }
        validate_component("chapter", new).map_err(|e| CatalogError::Invalid(e.to_string()))?;

        if self.library.chapter_dir(hash, Area::Summary, new).exists() {
            return Err(CatalogError::ChapterExists(new.to_string()));
        }
        if !self.library.chapter_dir(hash, Area::Summary, old).exists() {
            return Err(CatalogError::ChapterNotFound(old.to_string()));
        }

        for area in Area::ALL {
            let from = self.library.chapter_dir(hash, area, old);
            if from.exists() {
                fs::rename(&from, self.library.chapter_dir(hash, area, new))?;
            }
        }

        if !self.index.rename_chapter(hash, old, new).await? {
            warn!("No vector entry for {}/{} to rename", hash, old);
        }

        info!("Renamed chapter {}/{} to {}", hash, old, new);
        Ok(())
    }

    /// Raw bytes of a stored page image
    pub fn page_image(&self, hash: &str, chapter: &str, image: &str) -> CatalogResult<Vec<u8>> {
        validate_component("comic", hash).map_err(|e| CatalogError::Invalid(e.to_string()))?;
        Self::check_chapter(chapter)?;
        validate_component("image", image).map_err(|e| CatalogError::Invalid(e.to_string()))?;

        let path = self.library.page_path(hash, chapter, image);
        if !path.is_file() {
            warn!("Image not found: {:?}", path);
            return Err(CatalogError::ChapterNotFound(format!("{}/{}", chapter, image)));
        }
        Ok(fs::read(&path)?)
    }

    /// Bytes of `cover.png`
    pub fn cover(&self, hash: &str) -> CatalogResult<Vec<u8>> {
        validate_component("comic", hash).map_err(|e| CatalogError::Invalid(e.to_string()))?;
        let path = self.library.cover_path(hash);
        if !path.is_file() {
            return Err(CatalogError::ComicNotFound(hash.to_string()));
        }
        Ok(fs::read(&path)?)
    }
}

/// File name without its extension
pub fn page_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}
