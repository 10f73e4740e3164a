//! CycleGAN for CBCT to CT Translation
//!
//! Main entry point providing CLI interface for:
//! - Training the CycleGAN
//! - Translating CBCT images with a trained checkpoint
//! - Writing a default configuration file

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rust_cyclegan_ct::{
    data::{list_images, load_image, CropMode, ImageSpec},
    model::CycleGan,
    training::{AdversarialLossMode, GradientPenaltyMode, Trainer},
    utils::{ensure_config_exists, imaging, load_checkpoint, CheckpointManager, Config},
};

/// CycleGAN for unpaired CBCT to CT translation
#[derive(Parser)]
#[command(name = "cyclegan_ct")]
#[command(author = "ML Trading Examples")]
#[command(version = "0.1.0")]
#[command(about = "Translate CBCT images to CT with a CycleGAN")]
struct Cli {
    /// Path to configuration file (.json or .toml)
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the CycleGAN, resuming from the latest checkpoint
    Train {
        /// Dataset name under the datasets directory
        #[arg(long)]
        dataset: Option<String>,

        /// Datasets directory
        #[arg(long)]
        datasets_dir: Option<String>,

        /// Output root
        #[arg(long)]
        output_root: Option<String>,

        #[arg(long)]
        load_size: Option<u32>,

        #[arg(long)]
        crop_size: Option<u32>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Epoch to start decaying the learning rate
        #[arg(long)]
        epoch_decay: Option<usize>,

        #[arg(long)]
        lr: Option<f64>,

        #[arg(long)]
        beta_1: Option<f64>,

        /// gan, hinge_v1, hinge_v2, lsgan or wgan
        #[arg(long)]
        adversarial_loss_mode: Option<AdversarialLossMode>,

        /// none, dragan or wgan-gp
        #[arg(long)]
        gradient_penalty_mode: Option<GradientPenaltyMode>,

        #[arg(long)]
        gradient_penalty_weight: Option<f64>,

        #[arg(long)]
        cycle_loss_weight: Option<f64>,

        #[arg(long)]
        identity_loss_weight: Option<f64>,

        /// Capacity of each fake image pool
        #[arg(long)]
        pool_size: Option<usize>,

        /// Device: cpu or cuda
        #[arg(long)]
        device: Option<String>,
    },

    /// Translate CBCT images with the latest checkpoint's A2B generator
    Translate {
        /// Directory of input images
        #[arg(short, long)]
        input: String,

        /// Directory for translated images
        #[arg(short, long)]
        output: String,

        /// Checkpoint directory (defaults to the latest one)
        #[arg(long)]
        checkpoint: Option<String>,
    },

    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.json")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Train {
            dataset,
            datasets_dir,
            output_root,
            load_size,
            crop_size,
            batch_size,
            epochs,
            epoch_decay,
            lr,
            beta_1,
            adversarial_loss_mode,
            gradient_penalty_mode,
            gradient_penalty_weight,
            cycle_loss_weight,
            identity_loss_weight,
            pool_size,
            device,
        } => {
            let mut config = load_config(&cli.config)?;

            let data = &mut config.data;
            override_with(&mut data.dataset, dataset);
            override_with(&mut data.datasets_dir, datasets_dir);
            override_with(&mut data.output_root, output_root);
            override_with(&mut data.load_size, load_size);
            override_with(&mut data.crop_size, crop_size);
            override_with(&mut data.batch_size, batch_size);

            let training = &mut config.training;
            override_with(&mut training.epochs, epochs);
            override_with(&mut training.epoch_decay, epoch_decay);
            override_with(&mut training.lr, lr);
            override_with(&mut training.beta_1, beta_1);
            override_with(&mut training.adversarial_loss_mode, adversarial_loss_mode);
            override_with(&mut training.gradient_penalty_mode, gradient_penalty_mode);
            override_with(&mut training.gradient_penalty_weight, gradient_penalty_weight);
            override_with(&mut training.cycle_loss_weight, cycle_loss_weight);
            override_with(&mut training.identity_loss_weight, identity_loss_weight);
            override_with(&mut training.pool_size, pool_size);
            override_with(&mut training.device, device);

            train(config)?;
        }
        Commands::Translate {
            input,
            output,
            checkpoint,
        } => {
            let config = load_config(&cli.config)?;
            translate(&config, Path::new(&input), Path::new(&output), checkpoint.map(PathBuf::from))?;
        }
        Commands::Init { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

fn override_with<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        info!("Loading configuration from {}", path);
        Config::from_file(path)
    } else {
        info!("Configuration {} not found, using defaults", path);
        Ok(Config::default())
    }
}

/// Train the CycleGAN
fn train(config: Config) -> Result<()> {
    info!(
        "Training on {} ({} -> {} px, {} loss, gp {})",
        config.data.dataset,
        config.data.load_size,
        config.data.crop_size,
        config.training.adversarial_loss_mode,
        config.training.gradient_penalty_mode
    );

    let mut trainer = Trainer::new(config)?;
    let summary = trainer.run()?;

    info!(
        "Training complete. Epochs this run: {}, global step: {}, final G_loss: {:.4}, D_loss: {:.4}",
        summary.epochs_run,
        summary.global_step,
        trainer.history().latest_gen_loss().unwrap_or(0.0),
        trainer.history().latest_disc_loss().unwrap_or(0.0)
    );

    Ok(())
}

/// Translate every image of `input` from domain A to domain B
fn translate(config: &Config, input: &Path, output: &Path, checkpoint: Option<PathBuf>) -> Result<()> {
    let device = config.get_device();
    let mut model = CycleGan::new(config.generator_config(), config.discriminator_config(), device);

    let checkpoint = match checkpoint {
        Some(dir) => dir,
        None => CheckpointManager::new(config.checkpoint_dir(), config.training.max_checkpoints)
            .latest()
            .ok_or_else(|| anyhow::anyhow!("No checkpoint found in {}", config.checkpoint_dir().display()))?,
    };
    load_checkpoint(&mut model, &checkpoint)?;

    std::fs::create_dir_all(output)?;
    let spec = ImageSpec::new(config.data.crop_size, config.data.crop_size)?;
    let mut rng = StdRng::seed_from_u64(config.training.seed);

    let paths = list_images(input)?;
    info!("Translating {} images from {}", paths.len(), input.display());

    for path in &paths {
        let image = load_image(path, spec, CropMode::Eval, &mut rng)?
            .unsqueeze(0)
            .to_device(device);
        let translated = tch::no_grad(|| model.g_a2b.translate(&image));

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        imaging::save_image(&translated, output.join(format!("{}.png", name)))?;
    }

    info!("Saved translated images to {}", output.display());
    Ok(())
}

/// Initialize default configuration file
fn init_config(output_path: &str) -> Result<()> {
    if Path::new(output_path).exists() {
        anyhow::bail!("{} already exists", output_path);
    }
    ensure_config_exists(output_path)?;

    info!("Created default configuration at {}", output_path);
    Ok(())
}
