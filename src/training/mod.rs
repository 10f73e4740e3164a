//! Training module for CycleGAN
//!
//! This module provides:
//! - Training session and epoch driver
//! - Adversarial, cycle and identity losses with gradient penalties
//! - Linear learning-rate decay
//! - Translation quality metrics and loss history

mod losses;
mod metrics;
mod schedule;
mod trainer;

pub use losses::{gradient_penalty, mean_absolute_error, AdversarialLossMode, GradientPenaltyMode};
pub use metrics::{mse, ncc, ssim, EMATracker, LossHistory, TranslationReport, SSIM_WINDOW};
pub use schedule::LinearDecay;
pub use trainer::{
    DiscriminatorLosses, GeneratorLosses, RunSummary, StepOutput, Trainer, TrainingConfig, TrainingSession,
};
