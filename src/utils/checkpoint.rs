//! Checkpoint save/load utilities
//!
//! Each checkpoint is a directory `ckpt-NNNN` holding both variable stores
//! and a `meta.json` with the epoch counter and global step. Only the most
//! recent checkpoints are kept. A checkpoint that fails to load is renamed to
//! `unreadable-ckpt-NNNN` so later restarts fall back to older ones.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::CycleGan;

const PREFIX: &str = "ckpt-";
const UNREADABLE_PREFIX: &str = "unreadable-";
const GENERATORS_FILE: &str = "generators.ot";
const DISCRIMINATORS_FILE: &str = "discriminators.ot";
const META_FILE: &str = "meta.json";

/// Checkpoint metadata
///
/// Adam moment estimates are not part of a checkpoint; they restart from zero
/// on resume while weights, epoch counter and schedule position continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Completed epochs
    pub epoch: usize,
    /// Optimizer iterations so far
    pub global_step: u64,
    /// Timestamp of checkpoint
    pub timestamp: String,
    /// Settings snapshot
    pub settings: serde_json::Value,
}

impl CheckpointMeta {
    pub fn new(epoch: usize, global_step: u64, settings: serde_json::Value) -> Self {
        Self {
            epoch,
            global_step,
            timestamp: chrono::Utc::now().to_rfc3339(),
            settings,
        }
    }
}

/// Rotating checkpoint directory
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    max_to_keep: usize,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, max_to_keep: usize) -> Self {
        Self {
            dir: dir.into(),
            max_to_keep: max_to_keep.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a complete checkpoint and drop the oldest beyond `max_to_keep`
    ///
    /// # Returns
    ///
    /// Path to saved checkpoint
    pub fn save(&self, model: &CycleGan, meta: &CheckpointMeta) -> anyhow::Result<PathBuf> {
        let checkpoint_dir = self.dir.join(format!("{}{:04}", PREFIX, meta.epoch));
        std::fs::create_dir_all(&checkpoint_dir)?;

        model.save(
            &checkpoint_dir.join(GENERATORS_FILE),
            &checkpoint_dir.join(DISCRIMINATORS_FILE),
        )?;

        let meta_json = serde_json::to_string_pretty(meta)?;
        std::fs::write(checkpoint_dir.join(META_FILE), meta_json)?;

        tracing::info!("Saved checkpoint to {}", checkpoint_dir.display());
        self.rotate()?;
        Ok(checkpoint_dir)
    }

    /// Checkpoint directories ordered by epoch, oldest first
    pub fn list(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return vec![],
        };

        let mut checkpoints: Vec<(usize, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| {
                let epoch = e.file_name().to_str()?.strip_prefix(PREFIX)?.parse().ok()?;
                Some((epoch, e.path()))
            })
            .collect();

        checkpoints.sort();
        checkpoints.into_iter().map(|(_, path)| path).collect()
    }

    /// Find the latest checkpoint
    pub fn latest(&self) -> Option<PathBuf> {
        self.list().pop()
    }

    fn rotate(&self) -> anyhow::Result<()> {
        let checkpoints = self.list();
        if checkpoints.len() <= self.max_to_keep {
            return Ok(());
        }

        for stale in &checkpoints[..checkpoints.len() - self.max_to_keep] {
            std::fs::remove_dir_all(stale)?;
            tracing::debug!("Removed old checkpoint {}", stale.display());
        }
        Ok(())
    }

    /// Load the newest readable checkpoint into `model`
    ///
    /// Checkpoints that fail to load are set aside and the next older one is
    /// tried. `model` is only modified by a successful load.
    ///
    /// # Returns
    ///
    /// Its metadata, or `None` when no checkpoint could be loaded
    pub fn restore(&self, model: &mut CycleGan) -> anyhow::Result<Option<CheckpointMeta>> {
        for dir in self.list().into_iter().rev() {
            match load_checkpoint(model, &dir) {
                Ok(meta) => return Ok(Some(meta)),
                Err(e) => {
                    tracing::warn!("Checkpoint {} unreadable: {:#}", dir.display(), e);
                    self.set_aside(&dir)?;
                }
            }
        }
        Ok(None)
    }

    fn set_aside(&self, checkpoint_dir: &Path) -> anyhow::Result<()> {
        let name = checkpoint_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = self.dir.join(format!("{}{}", UNREADABLE_PREFIX, name));

        if target.exists() {
            std::fs::remove_dir_all(&target)?;
        }
        std::fs::rename(checkpoint_dir, &target)?;
        tracing::warn!("Moved {} to {}", checkpoint_dir.display(), target.display());
        Ok(())
    }
}

/// Load checkpoint metadata
pub fn load_checkpoint_meta(checkpoint_dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let content = std::fs::read_to_string(checkpoint_dir.join(META_FILE))?;
    let meta: CheckpointMeta = serde_json::from_str(&content)?;
    Ok(meta)
}

/// Load a complete checkpoint
pub fn load_checkpoint(model: &mut CycleGan, checkpoint_dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta = load_checkpoint_meta(checkpoint_dir)?;
    model.load(
        &checkpoint_dir.join(GENERATORS_FILE),
        &checkpoint_dir.join(DISCRIMINATORS_FILE),
    )?;

    tracing::info!(
        "Loaded checkpoint from {} (epoch {}, step {})",
        checkpoint_dir.display(),
        meta.epoch,
        meta.global_step
    );
    Ok(meta)
}
