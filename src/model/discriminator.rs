//! Convolutional (PatchGAN) discriminator
//!
//! Scores overlapping patches of an image as real or generated instead of
//! producing a single logit per image.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Input channels
    pub channels: i64,
    /// Filters of the first convolution
    pub base_filters: i64,
    /// Number of stride-2 stages
    pub n_downsamplings: i64,
    /// Negative slope of the leaky relu
    pub leaky_slope: f64,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            base_filters: 64,
            n_downsamplings: 3,
            leaky_slope: 0.2,
        }
    }
}

/// Discriminator network
///
/// Architecture:
/// 1. 4x4 stride-2 conv with LeakyReLU
/// 2. Further 4x4 stride-2 convs with norm and LeakyReLU (filters capped at 8x)
/// 3. 4x4 stride-1 conv with norm and LeakyReLU
/// 4. 4x4 stride-1 conv to a one-channel score map (logits)
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    stem: nn::Conv2D,
    blocks: Vec<(nn::Conv2D, nn::GroupNorm)>,
    head: nn::Conv2D,
}

impl Discriminator {
    /// Create a new Discriminator network
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let base = config.base_filters;
        let conv_config = |stride: i64, bias: bool| nn::ConvConfig {
            stride,
            padding: 1,
            bias,
            ..Default::default()
        };

        let stem = nn::conv2d(vs / "stem", config.channels, base, 4, conv_config(2, true));

        let mut dim = base;
        let mut blocks = Vec::new();
        for i in 0..config.n_downsamplings {
            // the last block keeps the resolution
            let stride = if i + 1 == config.n_downsamplings { 1 } else { 2 };
            let out = (dim * 2).min(base * 8);
            let conv = nn::conv2d(vs / format!("conv{}", i), dim, out, 4, conv_config(stride, false));
            let norm = nn::group_norm(vs / format!("norm{}", i), out, out, Default::default());
            blocks.push((conv, norm));
            dim = out;
        }

        let head = nn::conv2d(vs / "head", dim, 1, 4, conv_config(1, true));

        Self {
            config,
            stem,
            blocks,
            head,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch, channels, H, W)
    /// * `train` - Whether in training mode
    ///
    /// # Returns
    ///
    /// Score map of shape (batch, 1, h, w) with logits (not sigmoid)
    pub fn forward_t(&self, input: &Tensor, _train: bool) -> Tensor {
        let slope = self.config.leaky_slope;
        let mut x = leaky_relu(&self.stem.forward(input), slope);

        for (conv, norm) in &self.blocks {
            x = leaky_relu(&norm.forward(&conv.forward(&x)), slope);
        }

        self.head.forward(&x)
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

fn leaky_relu(x: &Tensor, slope: f64) -> Tensor {
    x.maximum(&(x * slope))
}

impl ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Discriminator::forward_t(self, xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    fn small_config() -> DiscriminatorConfig {
        DiscriminatorConfig {
            base_filters: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_discriminator_score_map_shape() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), small_config());

        let input = Tensor::randn([2, 1, 32, 32], (Kind::Float, Device::Cpu));
        let output = disc.forward_t(&input, true);

        // 32 -> 16 -> 8 -> 4 -> 3 -> 2
        assert_eq!(output.size(), vec![2, 1, 2, 2]);
    }
}
