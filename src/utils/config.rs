//! Configuration management
//!
//! Provides unified configuration for the entire CycleGAN pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::{CropMode, ImageSpec, LoaderConfig};
use crate::model::{DiscriminatorConfig, GeneratorConfig};
use crate::training::{AdversarialLossMode, GradientPenaltyMode, TrainingConfig, SSIM_WINDOW};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Training configuration
    pub training: TrainingConfigFile,
}

/// Data-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Dataset name, a directory under `datasets_dir`
    pub dataset: String,
    /// Root holding the datasets
    pub datasets_dir: String,
    /// Root of all training outputs
    pub output_root: String,
    /// Images are resized to this size before cropping
    pub load_size: u32,
    /// Final training image size
    pub crop_size: u32,
    /// Batch size
    pub batch_size: usize,
}

/// Model-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base filters for the generators
    pub gen_base_filters: i64,
    /// Stride-2 stages of the generators
    pub gen_n_downsamplings: i64,
    /// Residual blocks of the generators
    pub gen_n_blocks: i64,
    /// Base filters for the discriminators
    pub disc_base_filters: i64,
    /// Downsampling stages of the discriminators
    pub disc_n_downsamplings: i64,
}

/// Training-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfigFile {
    /// Number of epochs
    pub epochs: usize,
    /// Epoch to start decaying the learning rate
    pub epoch_decay: usize,
    /// Initial learning rate of both optimizers
    pub lr: f64,
    /// Adam beta1
    pub beta_1: f64,
    pub adversarial_loss_mode: AdversarialLossMode,
    pub gradient_penalty_mode: GradientPenaltyMode,
    pub gradient_penalty_weight: f64,
    pub cycle_loss_weight: f64,
    pub identity_loss_weight: f64,
    /// Capacity of each fake image pool
    pub pool_size: usize,
    /// Write test samples every N iterations
    pub sample_every: u64,
    /// Checkpoints kept on disk
    pub max_checkpoints: usize,
    /// Device: "cpu" or "cuda"
    pub device: String,
    /// Seed for shuffling, cropping and pooling
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                dataset: "CBCT2CT".to_string(),
                datasets_dir: "datasets".to_string(),
                output_root: "output".to_string(),
                load_size: 464,
                crop_size: 400,
                batch_size: 1,
            },
            model: ModelConfig {
                gen_base_filters: 64,
                gen_n_downsamplings: 2,
                gen_n_blocks: 9,
                disc_base_filters: 64,
                disc_n_downsamplings: 3,
            },
            training: TrainingConfigFile {
                epochs: 150,
                epoch_decay: 75,
                lr: 2e-4,
                beta_1: 0.5,
                adversarial_loss_mode: AdversarialLossMode::Lsgan,
                gradient_penalty_mode: GradientPenaltyMode::None,
                gradient_penalty_weight: 10.0,
                cycle_loss_weight: 10.0,
                identity_loss_weight: 0.0,
                pool_size: 25,
                sample_every: 100,
                max_checkpoints: 5,
                device: "cpu".to_string(),
                seed: 42,
            },
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `.toml` or JSON depending on the extension
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if is_toml(path) {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Save as `.toml` or JSON depending on the extension
    pub fn save_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if is_toml(path) {
            self.save_toml(path)
        } else {
            self.save_json(path)
        }
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        match self.training.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data.dataset.is_empty() {
            anyhow::bail!("Dataset name must not be empty");
        }
        if self.data.load_size == 0 || self.data.crop_size == 0 {
            anyhow::bail!("Load and crop sizes must be > 0");
        }
        if self.data.crop_size > self.data.load_size {
            anyhow::bail!(
                "Crop size {} exceeds load size {}",
                self.data.crop_size,
                self.data.load_size
            );
        }
        if (self.data.crop_size as usize) < SSIM_WINDOW {
            anyhow::bail!(
                "Crop size {} is smaller than the {}x{} SSIM window",
                self.data.crop_size,
                SSIM_WINDOW,
                SSIM_WINDOW
            );
        }
        if self.data.batch_size == 0 {
            anyhow::bail!("Batch size must be > 0");
        }
        if self.model.gen_base_filters <= 0 || self.model.disc_base_filters <= 0 {
            anyhow::bail!("Base filters must be > 0");
        }
        if self.training.epochs == 0 {
            anyhow::bail!("Number of epochs must be > 0");
        }
        if self.training.epoch_decay > self.training.epochs {
            anyhow::bail!(
                "Decay epoch {} exceeds number of epochs {}",
                self.training.epoch_decay,
                self.training.epochs
            );
        }
        if !(self.training.lr > 0.0) {
            anyhow::bail!("Learning rate must be > 0");
        }
        if !(0.0..1.0).contains(&self.training.beta_1) {
            anyhow::bail!("beta_1 must be in [0, 1)");
        }
        if self.training.sample_every == 0 {
            anyhow::bail!("Sample interval must be > 0");
        }
        if self.training.max_checkpoints == 0 {
            anyhow::bail!("At least one checkpoint must be kept");
        }
        Ok(())
    }

    /// `<output_root>/<dataset>`
    pub fn output_dir(&self) -> PathBuf {
        Path::new(&self.data.output_root).join(&self.data.dataset)
    }

    /// `<datasets_dir>/<dataset>/<split>` for `trainA`, `trainB`, `testA`, `testB`
    pub fn split_dir(&self, split: &str) -> PathBuf {
        Path::new(&self.data.datasets_dir)
            .join(&self.data.dataset)
            .join(split)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.output_dir().join("checkpoints")
    }

    pub fn summary_dir(&self) -> PathBuf {
        self.output_dir().join("summaries").join("train")
    }

    pub fn sample_dir(&self) -> PathBuf {
        self.output_dir().join("samples_training")
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            base_filters: self.model.gen_base_filters,
            n_downsamplings: self.model.gen_n_downsamplings,
            n_blocks: self.model.gen_n_blocks,
            ..Default::default()
        }
    }

    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig {
            base_filters: self.model.disc_base_filters,
            n_downsamplings: self.model.disc_n_downsamplings,
            ..Default::default()
        }
    }

    pub fn training_config(&self) -> TrainingConfig {
        let t = &self.training;
        TrainingConfig {
            lr: t.lr,
            beta_1: t.beta_1,
            adversarial_loss_mode: t.adversarial_loss_mode,
            gradient_penalty_mode: t.gradient_penalty_mode,
            gradient_penalty_weight: t.gradient_penalty_weight,
            cycle_loss_weight: t.cycle_loss_weight,
            identity_loss_weight: t.identity_loss_weight,
            pool_size: t.pool_size,
            seed: t.seed,
        }
    }

    /// Loader options; the evaluation loader repeats endlessly
    pub fn loader_config(&self, mode: CropMode) -> anyhow::Result<LoaderConfig> {
        Ok(LoaderConfig {
            batch_size: self.data.batch_size,
            spec: ImageSpec::new(self.data.load_size, self.data.crop_size)?,
            mode,
            repeat: mode == CropMode::Eval,
            seed: self.training.seed,
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if path.exists() {
        Config::from_file(path)
    } else {
        let config = Config::default();
        config.save_file(path)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.data.load_size, 464);
        assert_eq!(config.data.crop_size, 400);
        assert_eq!(config.training.epochs, 150);
        assert_eq!(config.training.epoch_decay, 75);
        assert_eq!(config.training.adversarial_loss_mode, AdversarialLossMode::Lsgan);
        assert_eq!(config.training.pool_size, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.training.gradient_penalty_mode = GradientPenaltyMode::WganGp;
        config.save_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(config, loaded);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"wgan-gp\""));
        assert!(raw.contains("\"lsgan\""));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.save_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.data.crop_size = 500;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.data.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.data.load_size = 18;
        config.data.crop_size = 6;
        assert!(config.validate().is_err());
        config.data.crop_size = 7;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.training.epoch_decay = 200;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.lr = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.beta_1 = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_layout() {
        let config = Config::default();
        assert_eq!(config.output_dir(), Path::new("output/CBCT2CT"));
        assert_eq!(config.split_dir("trainA"), Path::new("datasets/CBCT2CT/trainA"));
        assert_eq!(
            config.summary_dir(),
            Path::new("output/CBCT2CT/summaries/train")
        );
    }

    #[test]
    fn test_ensure_config_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let created = ensure_config_exists(&path).unwrap();
        assert!(path.exists());
        assert_eq!(ensure_config_exists(&path).unwrap(), created);
    }
}
