//! Frame staging on disk.
//!
//! Video predictors typically read a clip from a directory of
//! sequentially numbered JPEGs. [`SymlinkStager`] builds such a directory
//! for every clip by symlinking the original frames as `00000000.jpg`,
//! `00000001.jpg`, ... inside a fresh temporary directory, which is removed
//! when the [`StagedClip`] is dropped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use vos_harness_core::models::Frame;
use vos_harness_core::predictor::{FrameStager, InPlaceStager, StagedClip};

use crate::config::StagingMode;

#[derive(Debug, Default, Clone)]
pub struct SymlinkStager {
    /// Where temporary clip directories are created. System temp dir when
    /// `None`.
    parent: Option<PathBuf>,
}

impl SymlinkStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: Some(parent.into()),
        }
    }

    fn temp_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vos-clip-");
        let dir = match &self.parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        dir.context("Failed to create clip staging directory")
    }
}

impl FrameStager for SymlinkStager {
    fn stage(&self, frames: &[Frame]) -> Result<StagedClip> {
        let dir = self.temp_dir()?;
        let mut staged = Vec::with_capacity(frames.len());
        for (idx, frame) in frames.iter().enumerate() {
            let link = dir.path().join(format!("{idx:08}.jpg"));
            symlink(&frame.path, &link).with_context(|| {
                format!(
                    "Failed to link {} -> {}",
                    link.display(),
                    frame.path.display()
                )
            })?;
            staged.push(link);
        }
        let (width, height) = frames
            .first()
            .map(|f| (f.width, f.height))
            .unwrap_or((0, 0));
        tracing::trace!(dir = %dir.path().display(), frames = frames.len(), "clip staged");
        let root = dir.path().to_path_buf();
        Ok(StagedClip::new(staged, width, height).with_root(root, Box::new(dir)))
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

pub fn make_stager(mode: StagingMode) -> Box<dyn FrameStager> {
    match mode {
        StagingMode::Symlink => Box::new(SymlinkStager::new()),
        StagingMode::InPlace => Box::new(InPlaceStager),
    }
}
