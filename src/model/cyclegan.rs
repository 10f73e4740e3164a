//! CycleGAN wrapper holding both translation directions
//!
//! Generators share one variable store and discriminators another, so a
//! single optimizer updates each pair jointly.

use std::path::Path;

use tch::{nn, nn::OptimizerConfig, nn::VarStore, Device, Tensor};

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::generator::{Generator, GeneratorConfig};

/// Outputs of an inference pass over a test batch
#[derive(Debug)]
pub struct Translation {
    pub a2b: Tensor,
    pub b2a: Tensor,
    pub a2b2a: Tensor,
    pub b2a2b: Tensor,
}

/// Complete CycleGAN model
pub struct CycleGan {
    /// Translates domain A (CBCT) to domain B (CT)
    pub g_a2b: Generator,
    /// Translates domain B to domain A
    pub g_b2a: Generator,
    /// Scores domain A images
    pub d_a: Discriminator,
    /// Scores domain B images
    pub d_b: Discriminator,
    /// Variable store for both generators
    pub gen_vs: VarStore,
    /// Variable store for both discriminators
    pub disc_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
}

impl CycleGan {
    /// Create a new CycleGAN model
    pub fn new(gen_config: GeneratorConfig, disc_config: DiscriminatorConfig, device: Device) -> Self {
        let gen_vs = VarStore::new(device);
        let disc_vs = VarStore::new(device);

        let g_a2b = Generator::new(&(gen_vs.root() / "G_A2B"), gen_config.clone());
        let g_b2a = Generator::new(&(gen_vs.root() / "G_B2A"), gen_config);
        let d_a = Discriminator::new(&(disc_vs.root() / "D_A"), disc_config.clone());
        let d_b = Discriminator::new(&(disc_vs.root() / "D_B"), disc_config);

        Self {
            g_a2b,
            g_b2a,
            d_a,
            d_b,
            gen_vs,
            disc_vs,
            device,
        }
    }

    /// Adam optimizer over both generators
    pub fn gen_optimizer(&self, lr: f64, beta1: f64) -> anyhow::Result<nn::Optimizer> {
        Ok(adam(beta1).build(&self.gen_vs, lr)?)
    }

    /// Adam optimizer over both discriminators
    pub fn disc_optimizer(&self, lr: f64, beta1: f64) -> anyhow::Result<nn::Optimizer> {
        Ok(adam(beta1).build(&self.disc_vs, lr)?)
    }

    /// Translate a test batch in both directions and back, without gradients
    pub fn sample(&self, a: &Tensor, b: &Tensor) -> Translation {
        tch::no_grad(|| {
            let a2b = self.g_a2b.translate(a);
            let b2a = self.g_b2a.translate(b);
            let a2b2a = self.g_b2a.translate(&a2b);
            let b2a2b = self.g_a2b.translate(&b2a);
            Translation {
                a2b,
                b2a,
                a2b2a,
                b2a2b,
            }
        })
    }

    /// Save both variable stores
    pub fn save(&self, gen_path: &Path, disc_path: &Path) -> anyhow::Result<()> {
        self.gen_vs.save(gen_path)?;
        self.disc_vs.save(disc_path)?;
        Ok(())
    }

    /// Load both variable stores in place
    ///
    /// Both files are read into a scratch model first; on any error the
    /// current weights are left untouched.
    pub fn load(&mut self, gen_path: &Path, disc_path: &Path) -> anyhow::Result<()> {
        let mut staged = CycleGan::new(self.g_a2b.config().clone(), self.d_a.config().clone(), self.device);
        staged.gen_vs.load(gen_path)?;
        staged.disc_vs.load(disc_path)?;

        self.gen_vs.copy(&staged.gen_vs)?;
        self.disc_vs.copy(&staged.disc_vs)?;
        Ok(())
    }

    /// Number of trainable generator parameters
    pub fn gen_parameter_count(&self) -> i64 {
        parameter_count(&self.gen_vs)
    }

    /// Number of trainable discriminator parameters
    pub fn disc_parameter_count(&self) -> i64 {
        parameter_count(&self.disc_vs)
    }
}

fn adam(beta1: f64) -> nn::Adam {
    nn::Adam {
        beta1,
        beta2: 0.999,
        wd: 0.0,
        ..Default::default()
    }
}

fn parameter_count(vs: &VarStore) -> i64 {
    vs.trainable_variables().iter().map(|t| t.numel() as i64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn small_model() -> CycleGan {
        CycleGan::new(
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
        )
    }

    #[test]
    fn test_pairs_share_stores() {
        let model = small_model();

        let gen_names: Vec<String> = model.gen_vs.variables().into_keys().collect();
        assert!(gen_names.iter().any(|n| n.starts_with("G_A2B.")));
        assert!(gen_names.iter().any(|n| n.starts_with("G_B2A.")));

        let disc_names: Vec<String> = model.disc_vs.variables().into_keys().collect();
        assert!(disc_names.iter().any(|n| n.starts_with("D_A.")));
        assert!(disc_names.iter().any(|n| n.starts_with("D_B.")));

        assert!(model.gen_parameter_count() > 0);
        assert!(model.disc_parameter_count() > 0);
    }

    #[test]
    fn test_sample_shapes() {
        let model = small_model();
        let a = Tensor::zeros([1, 1, 16, 16], (Kind::Float, Device::Cpu));
        let b = Tensor::ones([1, 1, 16, 16], (Kind::Float, Device::Cpu));

        let out = model.sample(&a, &b);
        for t in [&out.a2b, &out.b2a, &out.a2b2a, &out.b2a2b] {
            assert_eq!(t.size(), vec![1, 1, 16, 16]);
            assert!(!t.requires_grad());
        }
    }

    fn snapshot(vs: &VarStore) -> Vec<(String, Tensor)> {
        let mut vars: Vec<(String, Tensor)> = vs.variables().into_iter().map(|(k, v)| (k, v.copy())).collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }

    fn same_weights(vs: &VarStore, expected: &[(String, Tensor)]) -> bool {
        let current = snapshot(vs);
        current.len() == expected.len()
            && current.iter().zip(expected).all(|((na, ta), (nb, tb))| {
                na == nb && (ta - tb).abs().max().double_value(&[]) == 0.0
            })
    }

    #[test]
    fn test_failed_load_keeps_current_weights() {
        let dir = tempfile::TempDir::new().unwrap();
        let gen_path = dir.path().join("gen.ot");
        let disc_path = dir.path().join("disc.ot");

        // valid generators, truncated discriminators
        let checkpoint = small_model();
        checkpoint.save(&gen_path, &disc_path).unwrap();
        let bytes = std::fs::read(&disc_path).unwrap();
        std::fs::write(&disc_path, &bytes[..bytes.len() / 2]).unwrap();

        let mut model = small_model();
        let gen_before = snapshot(&model.gen_vs);
        let disc_before = snapshot(&model.disc_vs);

        assert!(model.load(&gen_path, &disc_path).is_err());
        assert!(same_weights(&model.gen_vs, &gen_before));
        assert!(same_weights(&model.disc_vs, &disc_before));
        assert!(!same_weights(&model.gen_vs, &snapshot(&checkpoint.gen_vs)));
    }

    #[test]
    fn test_load_with_other_architecture_fails_cleanly() {
        let dir = tempfile::TempDir::new().unwrap();
        let gen_path = dir.path().join("gen.ot");
        let disc_path = dir.path().join("disc.ot");

        let other = CycleGan::new(
            GeneratorConfig {
                base_filters: 4,
                n_blocks: 1,
                ..Default::default()
            },
            DiscriminatorConfig {
                base_filters: 4,
                n_downsamplings: 3,
                ..Default::default()
            },
            Device::Cpu,
        );
        other.save(&gen_path, &disc_path).unwrap();

        let mut model = small_model();
        let gen_before = snapshot(&model.gen_vs);
        assert!(model.load(&gen_path, &disc_path).is_err());
        assert!(same_weights(&model.gen_vs, &gen_before));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let gen_path = dir.path().join("gen.ot");
        let disc_path = dir.path().join("disc.ot");

        let model = small_model();
        model.save(&gen_path, &disc_path).unwrap();

        let mut restored = small_model();
        restored.load(&gen_path, &disc_path).unwrap();

        let a = Tensor::rand([1, 1, 16, 16], (Kind::Float, Device::Cpu));
        let diff = (model.g_a2b.translate(&a) - restored.g_a2b.translate(&a))
            .abs()
            .max()
            .double_value(&[]);
        assert!(diff < 1e-6);
    }
}
