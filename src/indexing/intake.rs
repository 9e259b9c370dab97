//! Turning an uploaded archive into a queued job

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::archive::{content_hash, default_comic_name};
use crate::tasks::Job;

/// Reduce an uploaded file name to a safe single path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload.zip".to_string()
    } else {
        cleaned
    }
}

/// `<unix seconds>-<file name>`
pub fn task_id_for(file_name: &str) -> String {
    format!("{}-{}", Utc::now().timestamp(), file_name)
}

/// Another upload already claimed the staging path
#[derive(Debug, Error)]
#[error("an archive is already staged at {0:?}")]
pub struct AlreadyStaged(pub PathBuf);

/// Archive written to the upload directory, waiting to become a job
#[derive(Debug, Clone)]
pub struct StagedArchive {
    pub task_id: String,
    pub file_name: String,
    pub path: PathBuf,
}

impl StagedArchive {
    /// Reserve a task id and upload path for `file_name`. Nothing is written yet.
    pub fn new(upload_dir: &Path, file_name: &str) -> Result<Self> {
        let file_name = sanitize_file_name(file_name);
        if !file_name.to_lowercase().ends_with(".zip") {
            bail!("only .zip archives are accepted, got {}", file_name);
        }
        let task_id = task_id_for(&file_name);
        let path = upload_dir.join(&task_id);
        Ok(Self {
            task_id,
            file_name,
            path,
        })
    }

    /// Store uploaded bytes.
    ///
    /// Fails with [`AlreadyStaged`] when the path is taken.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut file = self.create()?;
        file.write_all(bytes)
            .with_context(|| format!("Failed to save upload {:?}", self.path))
    }

    /// Copy a local archive into the upload directory
    pub fn copy_from(&self, source: &Path) -> Result<()> {
        let mut input =
            File::open(source).with_context(|| format!("Failed to open {:?}", source))?;
        let mut file = self.create()?;
        io::copy(&mut input, &mut file)
            .with_context(|| format!("Failed to copy {:?} to {:?}", source, self.path))?;
        Ok(())
    }

    /// Create the staging file, never replacing an existing one
    fn create(&self) -> Result<File> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create upload directory {:?}", dir))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(AlreadyStaged(self.path.clone()).into())
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to create upload {:?}", self.path))
            }
        }
    }

    /// Fingerprint the archive and pick its display name.
    ///
    /// A blank `name` falls back to the archive's single top-level folder or
    /// the file stem.
    pub fn into_job(self, name: Option<&str>) -> Result<Job> {
        let content_hash = content_hash(&self.path)?;
        let comic_name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => default_comic_name(&self.path, &self.file_name)?,
        };
        debug!(task_id = %self.task_id, comic = %comic_name, "Archive staged");

        Ok(Job {
            task_id: self.task_id,
            filename: self.file_name,
            archive_path: self.path,
            comic_name,
            content_hash,
        })
    }
}
