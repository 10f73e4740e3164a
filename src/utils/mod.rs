//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load with rotation
//! - Scalar summaries
//! - Image grids and PNG output

mod checkpoint;
mod config;
pub mod imaging;
mod summary;

pub use checkpoint::{load_checkpoint, load_checkpoint_meta, CheckpointManager, CheckpointMeta};
pub use config::{ensure_config_exists, Config, DataConfig, ModelConfig, TrainingConfigFile};
pub use summary::SummaryWriter;
