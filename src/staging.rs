use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::error::Result;

/// Parent directory under which every run gets its own staging area.
#[derive(Debug, Clone)]
pub struct StagingRoot {
    root: PathBuf,
}

impl StagingRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens a fresh, empty staging area for one run.
    ///
    /// `folder` becomes the single top-level folder of the packaged archive.
    pub fn begin_run(&self, folder: &str) -> Result<StagingArea> {
        std::fs::create_dir_all(&self.root)?;
        let run_id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("run-{run_id}-"))
            .tempdir_in(&self.root)?;
        let content = dir.path().join(sanitize_component(folder));
        std::fs::create_dir_all(&content)?;
        Ok(StagingArea {
            run_id,
            dir,
            content,
        })
    }

    /// Directory holding packaged exports waiting to be downloaded.
    pub fn exports_dir(&self) -> Result<PathBuf> {
        let dir = self.root.join("exports");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// One run's private working directory. Removed from disk on drop.
#[derive(Debug)]
pub struct StagingArea {
    run_id: Uuid,
    dir: TempDir,
    content: PathBuf,
}

impl StagingArea {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Folder that gets packaged.
    pub fn content_dir(&self) -> &Path {
        &self.content
    }

    /// Location for files produced about the content, outside the packaged folder.
    pub fn scratch_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(file_name)
    }

    /// Cloneable handle for tasks writing into the content folder.
    pub fn writer(&self) -> ArtifactWriter {
        ArtifactWriter {
            content: self.content.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    content: PathBuf,
}

impl ArtifactWriter {
    /// Writes `bytes` under the content folder, creating parent directories.
    pub async fn write(&self, relative: &Path, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.content.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Makes a display name safe to use as a single path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
