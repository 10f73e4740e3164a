//! # CycleGAN for CBCT to CT Translation
//!
//! This crate trains a CycleGAN on unpaired cone-beam CT (domain A) and CT
//! (domain B) slices so that CBCT images can be translated to CT-like images.
//!
//! ## Modules
//!
//! - `data`: Image loading, unpaired batching and the fake image pool
//! - `model`: ResNet generators and PatchGAN discriminators
//! - `training`: Losses, learning-rate schedule, training loop and metrics
//! - `utils`: Configuration, checkpoints, summaries and image grids

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{ItemPool, Sample, ZipDataLoader};
pub use error::{Error, Result};
pub use model::{CycleGan, Discriminator, Generator};
pub use training::{AdversarialLossMode, GradientPenaltyMode, Trainer, TrainingConfig, TrainingSession};
pub use utils::{CheckpointManager, Config};
