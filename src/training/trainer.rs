//! Training loop implementation for CycleGAN
//!
//! `TrainingSession` owns the models, optimizers, fake pools and schedule and
//! performs one generator update followed by one discriminator update per
//! batch. `Trainer` drives epochs over the dataset with checkpointing,
//! summaries and periodic test samples.

use indicatif::{ProgressBar, ProgressStyle};
use tch::{nn, Tensor};
use tracing::{error, info, warn};

use super::losses::{gradient_penalty, mean_absolute_error, AdversarialLossMode, GradientPenaltyMode};
use super::metrics::{EMATracker, LossHistory, TranslationReport};
use super::schedule::LinearDecay;
use crate::data::{CropMode, ItemPool, Sample, ZipDataLoader};
use crate::model::{CycleGan, Translation};
use crate::utils::{imaging, CheckpointManager, CheckpointMeta, Config, SummaryWriter};

/// Session hyperparameters
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Initial learning rate of both optimizers
    pub lr: f64,
    /// Adam beta1
    pub beta_1: f64,
    pub adversarial_loss_mode: AdversarialLossMode,
    pub gradient_penalty_mode: GradientPenaltyMode,
    pub gradient_penalty_weight: f64,
    pub cycle_loss_weight: f64,
    pub identity_loss_weight: f64,
    /// Capacity of each fake pool
    pub pool_size: usize,
    /// Seed of the fake pools
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            lr: 2e-4,
            beta_1: 0.5,
            adversarial_loss_mode: AdversarialLossMode::Lsgan,
            gradient_penalty_mode: GradientPenaltyMode::None,
            gradient_penalty_weight: 10.0,
            cycle_loss_weight: 10.0,
            identity_loss_weight: 0.0,
            pool_size: 25,
            seed: 42,
        }
    }
}

/// Scalar losses of a generator update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeneratorLosses {
    pub a2b_g_loss: f64,
    pub b2a_g_loss: f64,
    pub a2b2a_cycle_loss: f64,
    pub b2a2b_cycle_loss: f64,
    pub a2a_id_loss: f64,
    pub b2b_id_loss: f64,
}

impl GeneratorLosses {
    pub fn scalars(&self) -> [(&'static str, f64); 6] {
        [
            ("A2B_g_loss", self.a2b_g_loss),
            ("B2A_g_loss", self.b2a_g_loss),
            ("A2B2A_cycle_loss", self.a2b2a_cycle_loss),
            ("B2A2B_cycle_loss", self.b2a2b_cycle_loss),
            ("A2A_id_loss", self.a2a_id_loss),
            ("B2B_id_loss", self.b2b_id_loss),
        ]
    }

    /// Unweighted sum of all terms
    pub fn total(&self) -> f64 {
        self.scalars().iter().map(|(_, v)| v).sum()
    }
}

/// Scalar losses of a discriminator update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiscriminatorLosses {
    /// Real plus fake loss of D_A
    pub a_d_loss: f64,
    /// Real plus fake loss of D_B
    pub b_d_loss: f64,
    pub d_a_gp: f64,
    pub d_b_gp: f64,
}

impl DiscriminatorLosses {
    pub fn scalars(&self) -> [(&'static str, f64); 4] {
        [
            ("A_d_loss", self.a_d_loss),
            ("B_d_loss", self.b_d_loss),
            ("D_A_gp", self.d_a_gp),
            ("D_B_gp", self.d_b_gp),
        ]
    }

    pub fn total(&self) -> f64 {
        self.scalars().iter().map(|(_, v)| v).sum()
    }
}

/// Result of one training step
#[derive(Debug)]
pub struct StepOutput {
    /// Detached A to B translation of the batch
    pub a2b: Tensor,
    /// Detached B to A translation of the batch
    pub b2a: Tensor,
    pub generator: GeneratorLosses,
    pub discriminator: DiscriminatorLosses,
    /// Learning rate used for both updates
    pub lr: f64,
}

/// Mutable training state
pub struct TrainingSession {
    model: CycleGan,
    gen_opt: nn::Optimizer,
    disc_opt: nn::Optimizer,
    a2b_pool: ItemPool<Sample>,
    b2a_pool: ItemPool<Sample>,
    schedule: LinearDecay,
    step: u64,
    config: TrainingConfig,
}

impl TrainingSession {
    pub fn new(model: CycleGan, config: TrainingConfig, schedule: LinearDecay) -> anyhow::Result<Self> {
        let gen_opt = model.gen_optimizer(config.lr, config.beta_1)?;
        let disc_opt = model.disc_optimizer(config.lr, config.beta_1)?;

        Ok(Self {
            model,
            gen_opt,
            disc_opt,
            a2b_pool: ItemPool::seeded(config.pool_size, config.seed),
            b2a_pool: ItemPool::seeded(config.pool_size, config.seed.wrapping_add(1)),
            schedule,
            step: 0,
            config,
        })
    }

    pub fn model(&self) -> &CycleGan {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut CycleGan {
        &mut self.model
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Optimizer iterations performed so far
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Continue counting from a restored step
    pub fn set_step(&mut self, step: u64) {
        self.step = step;
    }

    pub fn schedule(&self) -> &LinearDecay {
        &self.schedule
    }

    pub fn current_lr(&self) -> f64 {
        self.schedule.lr_at(self.step)
    }

    pub fn a2b_pool(&self) -> &ItemPool<Sample> {
        &self.a2b_pool
    }

    pub fn b2a_pool(&self) -> &ItemPool<Sample> {
        &self.b2a_pool
    }

    /// Generator update over both directions
    ///
    /// # Returns
    ///
    /// Detached `(A2B, B2A)` and the six loss terms
    pub fn train_g(&mut self, a: &Tensor, b: &Tensor) -> anyhow::Result<(Tensor, Tensor, GeneratorLosses)> {
        let model = &self.model;
        let mode = self.config.adversarial_loss_mode;

        let a2b = model.g_a2b.forward_t(a, true);
        let b2a = model.g_b2a.forward_t(b, true);
        let a2b2a = model.g_b2a.forward_t(&a2b, true);
        let b2a2b = model.g_a2b.forward_t(&b2a, true);
        let a2a = model.g_b2a.forward_t(a, true);
        let b2b = model.g_a2b.forward_t(b, true);

        let a2b_d_logits = model.d_b.forward_t(&a2b, true);
        let b2a_d_logits = model.d_a.forward_t(&b2a, true);

        let a2b_g_loss = mode.generator_loss(&a2b_d_logits);
        let b2a_g_loss = mode.generator_loss(&b2a_d_logits);
        let a2b2a_cycle_loss = mean_absolute_error(a, &a2b2a);
        let b2a2b_cycle_loss = mean_absolute_error(b, &b2a2b);
        let a2a_id_loss = mean_absolute_error(a, &a2a);
        let b2b_id_loss = mean_absolute_error(b, &b2b);

        let g_loss = (&a2b_g_loss + &b2a_g_loss)
            + (&a2b2a_cycle_loss + &b2a2b_cycle_loss) * self.config.cycle_loss_weight
            + (&a2a_id_loss + &b2b_id_loss) * self.config.identity_loss_weight;
        ensure_finite("G_loss", g_loss.double_value(&[]), self.step)?;

        self.gen_opt.set_lr(self.schedule.lr_at(self.step));
        self.gen_opt.zero_grad();
        g_loss.backward();
        self.gen_opt.step();

        let losses = GeneratorLosses {
            a2b_g_loss: a2b_g_loss.double_value(&[]),
            b2a_g_loss: b2a_g_loss.double_value(&[]),
            a2b2a_cycle_loss: a2b2a_cycle_loss.double_value(&[]),
            b2a2b_cycle_loss: b2a2b_cycle_loss.double_value(&[]),
            a2a_id_loss: a2a_id_loss.double_value(&[]),
            b2b_id_loss: b2b_id_loss.double_value(&[]),
        };

        Ok((a2b.detach(), b2a.detach(), losses))
    }

    /// Discriminator update on real images and (pooled) fakes
    pub fn train_d(&mut self, a: &Tensor, b: &Tensor, a2b: &Tensor, b2a: &Tensor) -> anyhow::Result<DiscriminatorLosses> {
        let model = &self.model;
        let mode = self.config.adversarial_loss_mode;
        let gp_mode = self.config.gradient_penalty_mode;

        let a_d_logits = model.d_a.forward_t(a, true);
        let b2a_d_logits = model.d_a.forward_t(b2a, true);
        let b_d_logits = model.d_b.forward_t(b, true);
        let a2b_d_logits = model.d_b.forward_t(a2b, true);

        let (a_d_loss, b2a_d_loss) = mode.discriminator_loss(&a_d_logits, &b2a_d_logits);
        let (b_d_loss, a2b_d_loss) = mode.discriminator_loss(&b_d_logits, &a2b_d_logits);
        let d_a_gp = gradient_penalty(|x| model.d_a.forward_t(x, true), a, b2a, gp_mode);
        let d_b_gp = gradient_penalty(|x| model.d_b.forward_t(x, true), b, a2b, gp_mode);

        let a_total = &a_d_loss + &b2a_d_loss;
        let b_total = &b_d_loss + &a2b_d_loss;
        let d_loss = &a_total + &b_total + (&d_a_gp + &d_b_gp) * self.config.gradient_penalty_weight;
        ensure_finite("D_loss", d_loss.double_value(&[]), self.step)?;

        self.disc_opt.set_lr(self.schedule.lr_at(self.step));
        self.disc_opt.zero_grad();
        d_loss.backward();
        self.disc_opt.step();

        Ok(DiscriminatorLosses {
            a_d_loss: a_total.double_value(&[]),
            b_d_loss: b_total.double_value(&[]),
            d_a_gp: d_a_gp.double_value(&[]),
            d_b_gp: d_b_gp.double_value(&[]),
        })
    }

    /// One generator update, pool buffering, one discriminator update
    pub fn train_step(&mut self, a: &Tensor, b: &Tensor) -> anyhow::Result<StepOutput> {
        let lr = self.current_lr();
        let (a2b, b2a, generator) = self.train_g(a, b)?;

        let pooled_a2b = self.a2b_pool.query(&a2b);
        let pooled_b2a = self.b2a_pool.query(&b2a);

        let discriminator = self.train_d(a, b, &pooled_a2b, &pooled_b2a)?;
        self.step += 1;

        Ok(StepOutput {
            a2b,
            b2a,
            generator,
            discriminator,
            lr,
        })
    }

    /// Inference translation of a test batch
    pub fn sample(&self, a: &Tensor, b: &Tensor) -> Translation {
        self.model.sample(a, b)
    }
}

fn ensure_finite(name: &str, value: f64, step: u64) -> anyhow::Result<()> {
    if !value.is_finite() {
        error!("{} is {} at step {}", name, value, step);
        anyhow::bail!("Non-finite {} ({}) at step {}", name, value, step);
    }
    Ok(())
}

/// Outcome of a `Trainer::run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Epochs found complete in the restored checkpoint
    pub resumed_from_epoch: usize,
    /// Epochs trained by this run
    pub epochs_run: usize,
    /// Optimizer iterations after the run
    pub global_step: u64,
}

/// Epoch driver with checkpointing, summaries and test samples
pub struct Trainer {
    config: Config,
    session: TrainingSession,
    train_loader: ZipDataLoader,
    test_loader: ZipDataLoader,
    checkpoints: CheckpointManager,
    history: LossHistory,
}

impl Trainer {
    /// Build datasets, models and session from a validated configuration
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let device = config.get_device();

        let train_loader = ZipDataLoader::from_dirs(
            config.split_dir("trainA"),
            config.split_dir("trainB"),
            config.loader_config(CropMode::Train)?,
            device,
        )?;
        let test_loader = ZipDataLoader::from_dirs(
            config.split_dir("testA"),
            config.split_dir("testB"),
            config.loader_config(CropMode::Eval)?,
            device,
        )?;

        let steps_per_epoch = train_loader.num_batches();
        if steps_per_epoch == 0 {
            anyhow::bail!(
                "Batch size {} larger than the training set ({} images)",
                config.data.batch_size,
                train_loader.pass_len()
            );
        }

        let model = CycleGan::new(config.generator_config(), config.discriminator_config(), device);
        info!(
            "Model created: {} generator / {} discriminator parameters on {:?}",
            model.gen_parameter_count(),
            model.disc_parameter_count(),
            device
        );

        let schedule = LinearDecay::from_epochs(
            config.training.lr,
            config.training.epochs,
            config.training.epoch_decay,
            steps_per_epoch,
        );
        let session = TrainingSession::new(model, config.training_config(), schedule)?;
        let checkpoints = CheckpointManager::new(config.checkpoint_dir(), config.training.max_checkpoints);

        Ok(Self {
            config,
            session,
            train_loader,
            test_loader,
            checkpoints,
            history: LossHistory::new(),
        })
    }

    pub fn session(&self) -> &TrainingSession {
        &self.session
    }

    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Restore the latest checkpoint, returning the completed epoch count
    fn restore(&mut self) -> usize {
        match self.checkpoints.restore(self.session.model_mut()) {
            Ok(Some(meta)) => {
                self.session.set_step(meta.global_step);
                let history_path = self.config.output_dir().join("loss_history.csv");
                if history_path.exists() {
                    match LossHistory::load_csv(&history_path) {
                        Ok(history) => self.history = history,
                        Err(e) => warn!("Failed to load loss history: {}", e),
                    }
                }
                meta.epoch
            }
            Ok(None) => {
                warn!("No checkpoint found in {}, training from scratch", self.checkpoints.dir().display());
                0
            }
            Err(e) => {
                warn!("Failed to restore checkpoint: {:#}, training from scratch", e);
                0
            }
        }
    }

    /// Train for the configured number of epochs
    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        let output_dir = self.config.output_dir();
        let sample_dir = self.config.sample_dir();
        std::fs::create_dir_all(&output_dir)?;
        std::fs::create_dir_all(&sample_dir)?;
        self.config.save_json(output_dir.join("settings.json"))?;

        let mut summary = SummaryWriter::create(self.config.summary_dir())?;
        let settings = serde_json::to_value(&self.config)?;

        let epochs = self.config.training.epochs;
        let sample_every = self.config.training.sample_every;
        let num_batches = self.train_loader.num_batches();

        let mut ep_cnt = self.restore();
        let resumed_from_epoch = ep_cnt;
        let mut epochs_run = 0;

        info!(
            "Starting training for {} epochs, {} batches per epoch (resuming after epoch {})",
            epochs, num_batches, resumed_from_epoch
        );

        for epoch in 0..epochs {
            if epoch < ep_cnt {
                continue;
            }
            ep_cnt += 1;

            let mut epoch_gen_loss = 0.0;
            let mut epoch_disc_loss = 0.0;
            let mut batch_count = 0;
            let mut gen_ema = EMATracker::new(0.1);

            let pb = ProgressBar::new(num_batches as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                    .progress_chars("##-"),
            );

            for batch in self.train_loader.iter() {
                let (a, b) = batch?;
                let out = self.session.train_step(&a, &b)?;
                let step = self.session.step();

                summary.scalars(step, "G_losses", out.generator.scalars())?;
                summary.scalars(step, "D_losses", out.discriminator.scalars())?;
                summary.scalar(step, "learning rate", "learning rate", out.lr)?;

                epoch_gen_loss += out.generator.total();
                epoch_disc_loss += out.discriminator.total();
                batch_count += 1;
                gen_ema.update(out.generator.total());

                pb.set_message(format!(
                    "G: {:.4}, D: {:.4}",
                    gen_ema.value(),
                    epoch_disc_loss / batch_count as f64
                ));
                pb.inc(1);

                if step % sample_every == 0 {
                    summary.flush()?;
                    Self::write_sample(
                        &self.session,
                        &mut self.test_loader,
                        &mut summary,
                        &sample_dir,
                        step,
                    )?;
                }
            }

            pb.finish_with_message("done");
            summary.flush()?;

            let avg_gen_loss = epoch_gen_loss / batch_count.max(1) as f64;
            let avg_disc_loss = epoch_disc_loss / batch_count.max(1) as f64;
            self.history.record_epoch(avg_gen_loss, avg_disc_loss);
            epochs_run += 1;

            info!(
                "Epoch {}/{}: G_loss={:.4}, D_loss={:.4}, lr={:.2e}",
                epoch + 1,
                epochs,
                avg_gen_loss,
                avg_disc_loss,
                self.session.current_lr()
            );

            if self.history.check_mode_collapse(10) {
                warn!("Possible mode collapse detected! Consider adjusting the loss weights.");
            }

            let meta = CheckpointMeta::new(ep_cnt, self.session.step(), settings.clone());
            self.checkpoints.save(self.session.model(), &meta)?;
            self.history.save_csv(output_dir.join("loss_history.csv"))?;
        }

        info!(
            "Training complete after {} epochs ({} this run), step {}",
            ep_cnt,
            epochs_run,
            self.session.step()
        );

        Ok(RunSummary {
            resumed_from_epoch,
            epochs_run,
            global_step: self.session.step(),
        })
    }

    /// Translate the next test batch, log its metrics and write image grids
    ///
    /// Metrics that cannot be computed are skipped with a warning; the images
    /// are written regardless.
    fn write_sample(
        session: &TrainingSession,
        test_loader: &mut ZipDataLoader,
        summary: &mut SummaryWriter,
        sample_dir: &std::path::Path,
        step: u64,
    ) -> anyhow::Result<()> {
        let (a, b) = match test_loader.next_batch()? {
            Some(batch) => batch,
            None => return Ok(()),
        };
        let Translation {
            a2b,
            b2a,
            a2b2a,
            b2a2b,
        } = session.sample(&a, &b);

        let source = imaging::immerge(&a, 1);
        let translated = imaging::immerge(&a2b, 1);
        let target = imaging::immerge(&b, 1);

        match TranslationReport::compute(&source, &translated, &target) {
            Ok(report) => {
                info!(
                    "Step {}: MSE {:.4} -> {:.4}, NCC {:.4} -> {:.4}, SSIM {:.4} -> {:.4}",
                    step,
                    report.mse_before,
                    report.mse_after,
                    report.ncc_before,
                    report.ncc_after,
                    report.ssim_before,
                    report.ssim_after
                );
                summary.scalars(step, "metrics", report.scalars())?;
                summary.flush()?;
            }
            Err(e) => warn!("Skipping metrics at step {}: {}", step, e),
        }

        let overview = imaging::immerge(&Tensor::cat(&[&a, &a2b, &a2b2a, &b, &b2a, &b2a2b], 0), 2);
        let prefix = format!("iter-{:09}", step);
        imaging::save_image(&overview, sample_dir.join(format!("{}-overview.png", prefix)))?;
        imaging::save_image(&source, sample_dir.join(format!("{}-source.png", prefix)))?;
        imaging::save_image(&translated, sample_dir.join(format!("{}-translated.png", prefix)))?;
        imaging::save_image(&target, sample_dir.join(format!("{}-target.png", prefix)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ImageSpec, LoaderConfig};
    use crate::model::{DiscriminatorConfig, GeneratorConfig};
    use tch::{Device, Kind};
    use tempfile::TempDir;

    fn small_session(config: TrainingConfig) -> TrainingSession {
        let model = CycleGan::new(
            GeneratorConfig {
                base_filters: 4,
                n_blocks: 1,
                ..Default::default()
            },
            DiscriminatorConfig {
                base_filters: 4,
                n_downsamplings: 2,
                ..Default::default()
            },
            Device::Cpu,
        );
        TrainingSession::new(model, config, LinearDecay::new(2e-4, 10, 5)).unwrap()
    }

    fn batch(value: f64) -> Tensor {
        Tensor::full([1, 1, 16, 16], value, (Kind::Float, Device::Cpu))
    }

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.pool_size, 25);
        assert_eq!(config.cycle_loss_weight, 10.0);
        assert_eq!(config.adversarial_loss_mode, AdversarialLossMode::Lsgan);
    }

    #[test]
    fn test_train_g_outputs_detached() {
        let mut session = small_session(TrainingConfig::default());
        let (a2b, b2a, losses) = session.train_g(&batch(0.0), &batch(1.0)).unwrap();

        assert_eq!(a2b.size(), vec![1, 1, 16, 16]);
        assert!(!a2b.requires_grad());
        assert!(!b2a.requires_grad());
        assert!(losses.scalars().iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn test_step_counter_and_schedule() {
        let mut session = small_session(TrainingConfig::default());
        for _ in 0..6 {
            session.train_step(&batch(-0.5), &batch(0.5)).unwrap();
        }
        assert_eq!(session.step(), 6);
        assert!(session.current_lr() < 2e-4);
    }

    #[test]
    fn test_every_loss_family_trains() {
        let modes = [
            (AdversarialLossMode::Gan, GradientPenaltyMode::None),
            (AdversarialLossMode::HingeV1, GradientPenaltyMode::Dragan),
            (AdversarialLossMode::HingeV2, GradientPenaltyMode::None),
            (AdversarialLossMode::Wgan, GradientPenaltyMode::WganGp),
        ];

        for (adversarial_loss_mode, gradient_penalty_mode) in modes {
            let mut session = small_session(TrainingConfig {
                adversarial_loss_mode,
                gradient_penalty_mode,
                identity_loss_weight: 1.0,
                ..Default::default()
            });
            let out = session.train_step(&batch(0.0), &batch(1.0)).unwrap();
            assert!(out.generator.total().is_finite(), "{}", adversarial_loss_mode);
            assert!(out.discriminator.total().is_finite(), "{}", adversarial_loss_mode);
            if gradient_penalty_mode == GradientPenaltyMode::None {
                assert_eq!(out.discriminator.d_a_gp, 0.0);
            }
        }
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let mut session = small_session(TrainingConfig::default());
        let nan = Tensor::full([1, 1, 16, 16], f64::NAN, (Kind::Float, Device::Cpu));
        assert!(session.train_step(&nan, &batch(1.0)).is_err());
        assert_eq!(session.step(), 0);
    }

    #[test]
    fn test_sample_smaller_than_ssim_window_still_saved() {
        let dir = TempDir::new().unwrap();
        let mut paths = vec![];
        for (name, value) in [("a.png", 30u8), ("b.png", 220u8)] {
            let path = dir.path().join(name);
            image::GrayImage::from_pixel(4, 4, image::Luma([value])).save(&path).unwrap();
            paths.push(path);
        }
        let mut test_loader = ZipDataLoader::new(
            vec![paths[0].clone()],
            vec![paths[1].clone()],
            LoaderConfig {
                batch_size: 1,
                spec: ImageSpec::new(4, 4).unwrap(),
                mode: CropMode::Eval,
                repeat: true,
                seed: 0,
            },
            Device::Cpu,
        );

        let model = CycleGan::new(
            GeneratorConfig {
                base_filters: 2,
                n_downsamplings: 1,
                n_blocks: 1,
                ..Default::default()
            },
            DiscriminatorConfig {
                base_filters: 2,
                n_downsamplings: 1,
                ..Default::default()
            },
            Device::Cpu,
        );
        let session =
            TrainingSession::new(model, TrainingConfig::default(), LinearDecay::new(2e-4, 10, 5)).unwrap();

        let sample_dir = dir.path().join("samples");
        std::fs::create_dir_all(&sample_dir).unwrap();
        let mut summary = SummaryWriter::create(dir.path().join("summaries")).unwrap();

        Trainer::write_sample(&session, &mut test_loader, &mut summary, &sample_dir, 3).unwrap();
        summary.flush().unwrap();

        for kind in ["overview", "source", "translated", "target"] {
            assert!(sample_dir.join(format!("iter-000000003-{}.png", kind)).exists());
        }
        let scalars = std::fs::read_to_string(summary.path()).unwrap();
        assert!(!scalars.contains(",metrics,"));
    }

    fn tiny_config(root: &std::path::Path) -> Config {
        for (split, value) in [("trainA", 10u8), ("trainB", 200), ("testA", 20), ("testB", 180)] {
            let dir = root.join("datasets/tiny").join(split);
            std::fs::create_dir_all(&dir).unwrap();
            image::GrayImage::from_pixel(20, 20, image::Luma([value]))
                .save(dir.join("000.png"))
                .unwrap();
        }

        let mut config = Config::default();
        config.data.dataset = "tiny".to_string();
        config.data.datasets_dir = root.join("datasets").to_string_lossy().to_string();
        config.data.output_root = root.join("output").to_string_lossy().to_string();
        config.data.load_size = 18;
        config.data.crop_size = 16;
        config.model.gen_base_filters = 2;
        config.model.gen_n_blocks = 1;
        config.model.disc_base_filters = 2;
        config.model.disc_n_downsamplings = 2;
        config.training.epochs = 2;
        config.training.epoch_decay = 1;
        config.training.device = "cpu".to_string();
        config
    }

    #[test]
    fn test_half_readable_checkpoint_leaves_fresh_model() {
        let root = TempDir::new().unwrap();
        let config = tiny_config(root.path());
        let mut trainer = Trainer::new(config.clone()).unwrap();

        let fresh: Vec<(String, Tensor)> = trainer
            .session()
            .model()
            .gen_vs
            .variables()
            .into_iter()
            .map(|(name, t)| (name, t.copy()))
            .collect();

        let other = CycleGan::new(config.generator_config(), config.discriminator_config(), Device::Cpu);
        let saved = CheckpointManager::new(config.checkpoint_dir(), 5)
            .save(&other, &CheckpointMeta::new(1, 3, serde_json::Value::Null))
            .unwrap();
        let disc_file = saved.join("discriminators.ot");
        let bytes = std::fs::read(&disc_file).unwrap();
        std::fs::write(&disc_file, &bytes[..bytes.len() / 2]).unwrap();

        assert_eq!(trainer.restore(), 0);
        assert_eq!(trainer.session().step(), 0);

        let current = trainer.session().model().gen_vs.variables();
        let checkpointed = other.gen_vs.variables();
        for (name, tensor) in &fresh {
            assert!(current[name].equal(tensor), "{}", name);
        }
        assert!(fresh.iter().any(|(name, tensor)| !checkpointed[name].equal(tensor)));
    }
}
