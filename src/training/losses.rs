//! Loss functions for CycleGAN training
//!
//! Adversarial loss families, mean absolute error for the cycle and identity
//! terms, and discriminator gradient penalties.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tch::{Kind, Reduction, Tensor};

/// Adversarial loss formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdversarialLossMode {
    /// Binary cross entropy on logits
    Gan,
    /// Hinge loss for both networks
    HingeV1,
    /// Hinge loss for the discriminator, `-E[D(G(x))]` for the generator
    HingeV2,
    /// Least squares
    Lsgan,
    /// Wasserstein critic
    Wgan,
}

impl AdversarialLossMode {
    /// Discriminator loss as `(real_loss, fake_loss)`
    ///
    /// # Arguments
    ///
    /// * `real_logits` - Discriminator output on real images
    /// * `fake_logits` - Discriminator output on generated images
    pub fn discriminator_loss(&self, real_logits: &Tensor, fake_logits: &Tensor) -> (Tensor, Tensor) {
        match self {
            Self::Gan => (
                bce_with_logits(real_logits, 1.0),
                bce_with_logits(fake_logits, 0.0),
            ),
            Self::HingeV1 | Self::HingeV2 => (
                (1.0f64 - real_logits).relu().mean(Kind::Float),
                (1.0f64 + fake_logits).relu().mean(Kind::Float),
            ),
            Self::Lsgan => (
                real_logits.mse_loss(&Tensor::ones_like(real_logits), Reduction::Mean),
                fake_logits.mse_loss(&Tensor::zeros_like(fake_logits), Reduction::Mean),
            ),
            Self::Wgan => (
                -real_logits.mean(Kind::Float),
                fake_logits.mean(Kind::Float),
            ),
        }
    }

    /// Generator loss on the discriminator's output for generated images
    pub fn generator_loss(&self, fake_logits: &Tensor) -> Tensor {
        match self {
            Self::Gan => bce_with_logits(fake_logits, 1.0),
            Self::HingeV1 => (1.0f64 - fake_logits).relu().mean(Kind::Float),
            Self::HingeV2 | Self::Wgan => -fake_logits.mean(Kind::Float),
            Self::Lsgan => fake_logits.mse_loss(&Tensor::ones_like(fake_logits), Reduction::Mean),
        }
    }
}

impl fmt::Display for AdversarialLossMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gan => "gan",
            Self::HingeV1 => "hinge_v1",
            Self::HingeV2 => "hinge_v2",
            Self::Lsgan => "lsgan",
            Self::Wgan => "wgan",
        };
        f.write_str(name)
    }
}

impl FromStr for AdversarialLossMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gan" => Ok(Self::Gan),
            "hinge_v1" => Ok(Self::HingeV1),
            "hinge_v2" => Ok(Self::HingeV2),
            "lsgan" => Ok(Self::Lsgan),
            "wgan" => Ok(Self::Wgan),
            other => anyhow::bail!("Unknown adversarial loss mode: {}", other),
        }
    }
}

fn bce_with_logits(logits: &Tensor, target: f64) -> Tensor {
    let targets = Tensor::full_like(logits, target);
    logits.binary_cross_entropy_with_logits::<Tensor>(&targets, None, None, Reduction::Mean)
}

/// Mean absolute error, used for cycle and identity terms
pub fn mean_absolute_error(target: &Tensor, prediction: &Tensor) -> Tensor {
    prediction.l1_loss(target, Reduction::Mean)
}

/// Gradient penalty formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradientPenaltyMode {
    /// No penalty
    #[serde(rename = "none")]
    None,
    /// Penalty around locally perturbed real samples
    #[serde(rename = "dragan")]
    Dragan,
    /// Penalty on real/fake interpolates
    #[serde(rename = "wgan-gp")]
    WganGp,
}

impl fmt::Display for GradientPenaltyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Dragan => "dragan",
            Self::WganGp => "wgan-gp",
        };
        f.write_str(name)
    }
}

impl FromStr for GradientPenaltyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "dragan" => Ok(Self::Dragan),
            "wgan-gp" | "wgan_gp" => Ok(Self::WganGp),
            other => anyhow::bail!("Unknown gradient penalty mode: {}", other),
        }
    }
}

/// Random point on the segment from `a` to `b`, one mixing factor per sample
///
/// Without `b`, the far end is `a` perturbed by half its standard deviation.
fn interpolate(a: &Tensor, b: Option<&Tensor>) -> Tensor {
    let b = match b {
        Some(b) => b.shallow_clone(),
        None => {
            let beta = Tensor::rand_like(a);
            a + a.std(false) * 0.5 * beta
        }
    };

    let mut shape = vec![1i64; a.dim()];
    shape[0] = a.size()[0];
    let alpha = Tensor::rand(shape.as_slice(), (a.kind(), a.device()));

    a + alpha * (b - a)
}

/// Gradient penalty `E[(||grad_x D(x)|| - 1)^2]`
///
/// The returned tensor stays attached to the graph so it can be minimized.
///
/// # Arguments
///
/// * `discriminator` - Network to penalize, called in training mode
/// * `real` - Real images
/// * `fake` - Generated images (used by `WganGp`)
/// * `mode` - Penalty formulation
pub fn gradient_penalty<F>(discriminator: F, real: &Tensor, fake: &Tensor, mode: GradientPenaltyMode) -> Tensor
where
    F: Fn(&Tensor) -> Tensor,
{
    let x = match mode {
        GradientPenaltyMode::None => {
            return Tensor::from(0f32).to_device(real.device());
        }
        GradientPenaltyMode::Dragan => interpolate(&real.detach(), None),
        GradientPenaltyMode::WganGp => interpolate(&real.detach(), Some(&fake.detach())),
    };
    let x = x.detach().set_requires_grad(true);

    let pred = discriminator(&x);
    let grads = Tensor::run_backward(&[pred.sum(Kind::Float)], &[&x], true, true);
    let grad = &grads[0];

    let batch = grad.size()[0];
    let norm = grad
        .view([batch, -1])
        .square()
        .sum_dim_intlist([1].as_slice(), false, Kind::Float)
        .sqrt();

    (norm - 1.0).square().mean(Kind::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    const ALL_MODES: [AdversarialLossMode; 5] = [
        AdversarialLossMode::Gan,
        AdversarialLossMode::HingeV1,
        AdversarialLossMode::HingeV2,
        AdversarialLossMode::Lsgan,
        AdversarialLossMode::Wgan,
    ];

    fn full(value: f64) -> Tensor {
        Tensor::full([2, 1, 3, 3], value, (Kind::Float, Device::Cpu))
    }

    fn scalar(t: &Tensor) -> f64 {
        t.double_value(&[])
    }

    #[test]
    fn test_lsgan_known_values() {
        let (real, fake) = AdversarialLossMode::Lsgan.discriminator_loss(&full(0.5), &full(0.5));
        assert!((scalar(&real) - 0.25).abs() < 1e-6);
        assert!((scalar(&fake) - 0.25).abs() < 1e-6);

        let g = AdversarialLossMode::Lsgan.generator_loss(&full(1.0));
        assert_eq!(scalar(&g), 0.0);
    }

    #[test]
    fn test_hinge_known_values() {
        let (real, fake) = AdversarialLossMode::HingeV1.discriminator_loss(&full(2.0), &full(-2.0));
        assert_eq!(scalar(&real), 0.0);
        assert_eq!(scalar(&fake), 0.0);

        let g1 = AdversarialLossMode::HingeV1.generator_loss(&full(-1.0));
        assert!((scalar(&g1) - 2.0).abs() < 1e-6);

        let g2 = AdversarialLossMode::HingeV2.generator_loss(&full(-1.0));
        assert!((scalar(&g2) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_wgan_known_values() {
        let (real, fake) = AdversarialLossMode::Wgan.discriminator_loss(&full(3.0), &full(1.0));
        assert!((scalar(&real) + 3.0).abs() < 1e-6);
        assert!((scalar(&fake) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gan_confident_discriminator() {
        let (real, fake) = AdversarialLossMode::Gan.discriminator_loss(&full(10.0), &full(-10.0));
        assert!(scalar(&real) < 1e-3);
        assert!(scalar(&fake) < 1e-3);

        let g = AdversarialLossMode::Gan.generator_loss(&full(0.0));
        assert!((scalar(&g) - std::f64::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_nonnegative_families() {
        let real = Tensor::randn([4, 1, 3, 3], (Kind::Float, Device::Cpu));
        let fake = Tensor::randn([4, 1, 3, 3], (Kind::Float, Device::Cpu));

        for mode in [AdversarialLossMode::Gan, AdversarialLossMode::HingeV1, AdversarialLossMode::Lsgan] {
            let (r, f) = mode.discriminator_loss(&real, &fake);
            assert!(scalar(&r) >= 0.0 && scalar(&f) >= 0.0, "{}", mode);
            assert!(scalar(&mode.generator_loss(&fake)) >= 0.0, "{}", mode);
        }
    }

    #[test]
    fn test_cycle_loss_of_identical_images_is_zero() {
        let x = Tensor::randn([2, 1, 8, 8], (Kind::Float, Device::Cpu));
        assert_eq!(scalar(&mean_absolute_error(&x, &x)), 0.0);
    }

    #[test]
    fn test_mode_parsing() {
        for mode in ALL_MODES {
            assert_eq!(mode.to_string().parse::<AdversarialLossMode>().unwrap(), mode);
        }
        assert!("bogus".parse::<AdversarialLossMode>().is_err());
        assert_eq!("wgan-gp".parse::<GradientPenaltyMode>().unwrap(), GradientPenaltyMode::WganGp);
    }

    #[test]
    fn test_gradient_penalty_none_is_zero() {
        let real = full(1.0);
        let gp = gradient_penalty(|x| x * 3.0, &real, &real, GradientPenaltyMode::None);
        assert_eq!(scalar(&gp), 0.0);
    }

    #[test]
    fn test_gradient_penalty_linear_critic() {
        // D(x) = sum(x) has gradient 1 everywhere: norm = 3 per 1x3x3 sample
        let real = Tensor::randn([2, 1, 3, 3], (Kind::Float, Device::Cpu));
        let fake = Tensor::randn([2, 1, 3, 3], (Kind::Float, Device::Cpu));
        let expected = 4.0;

        for mode in [GradientPenaltyMode::Dragan, GradientPenaltyMode::WganGp] {
            let gp = gradient_penalty(|x| x.sum(Kind::Float), &real, &fake, mode);
            assert!((scalar(&gp) - expected).abs() < 1e-4, "{}", mode);
        }
    }

    #[test]
    fn test_gradient_penalty_is_differentiable() {
        let w = Tensor::ones([1], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let real = Tensor::randn([2, 1, 3, 3], (Kind::Float, Device::Cpu));

        let gp = gradient_penalty(|x| (x * &w * &w).sum(Kind::Float), &real, &real, GradientPenaltyMode::WganGp);
        gp.backward();

        assert!(w.grad().defined());
        assert!(w.grad().double_value(&[0]).is_finite());
    }
}
