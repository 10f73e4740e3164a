//! ResNet generator
//!
//! Translates an image of one domain into the other. Downsamples twice,
//! runs a stack of residual blocks, then upsamples back to the input size.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Input and output channels (1 for CT slices)
    pub channels: i64,
    /// Filters of the first convolution
    pub base_filters: i64,
    /// Number of stride-2 down/upsampling stages
    pub n_downsamplings: i64,
    /// Number of residual blocks
    pub n_blocks: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            base_filters: 64,
            n_downsamplings: 2,
            n_blocks: 9,
        }
    }
}

/// Instance normalization with learned affine parameters
fn instance_norm(vs: nn::Path, channels: i64) -> nn::GroupNorm {
    nn::group_norm(vs, channels, channels, Default::default())
}

fn no_bias(stride: i64, padding: i64) -> nn::ConvConfig {
    nn::ConvConfig {
        stride,
        padding,
        bias: false,
        ..Default::default()
    }
}

/// Two reflection-padded 3x3 convolutions with a skip connection
#[derive(Debug)]
struct ResidualBlock {
    conv1: nn::Conv2D,
    norm1: nn::GroupNorm,
    conv2: nn::Conv2D,
    norm2: nn::GroupNorm,
}

impl ResidualBlock {
    fn new(vs: &nn::Path, dim: i64) -> Self {
        Self {
            conv1: nn::conv2d(vs / "conv1", dim, dim, 3, no_bias(1, 0)),
            norm1: instance_norm(vs / "norm1", dim),
            conv2: nn::conv2d(vs / "conv2", dim, dim, 3, no_bias(1, 0)),
            norm2: instance_norm(vs / "norm2", dim),
        }
    }

    fn forward(&self, x: &Tensor) -> Tensor {
        let h = x.reflection_pad2d([1, 1, 1, 1]);
        let h = self.norm1.forward(&self.conv1.forward(&h)).relu();
        let h = h.reflection_pad2d([1, 1, 1, 1]);
        let h = self.norm2.forward(&self.conv2.forward(&h));
        x + h
    }
}

/// Generator network
///
/// Architecture:
/// 1. Reflection pad + 7x7 conv, norm, relu
/// 2. Stride-2 3x3 convs doubling the filters
/// 3. Residual blocks
/// 4. Stride-2 transposed convs halving the filters
/// 5. Reflection pad + 7x7 conv back to `channels`, tanh
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    stem: nn::Conv2D,
    stem_norm: nn::GroupNorm,
    down: Vec<(nn::Conv2D, nn::GroupNorm)>,
    blocks: Vec<ResidualBlock>,
    up: Vec<(nn::ConvTranspose2D, nn::GroupNorm)>,
    head: nn::Conv2D,
}

impl Generator {
    /// Create a new Generator network
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let mut dim = config.base_filters;

        let stem = nn::conv2d(vs / "stem", config.channels, dim, 7, no_bias(1, 0));
        let stem_norm = instance_norm(vs / "stem_norm", dim);

        let mut down = Vec::new();
        for i in 0..config.n_downsamplings {
            let conv = nn::conv2d(vs / format!("down{}", i), dim, dim * 2, 3, no_bias(2, 1));
            dim *= 2;
            down.push((conv, instance_norm(vs / format!("down{}_norm", i), dim)));
        }

        let blocks = (0..config.n_blocks)
            .map(|i| ResidualBlock::new(&(vs / format!("block{}", i)), dim))
            .collect();

        // stride 2, padding 1, output_padding 1 exactly doubles the spatial size
        let up_config = nn::ConvTransposeConfig {
            stride: 2,
            padding: 1,
            output_padding: 1,
            bias: false,
            ..Default::default()
        };
        let mut up = Vec::new();
        for i in 0..config.n_downsamplings {
            let conv = nn::conv_transpose2d(vs / format!("up{}", i), dim, dim / 2, 3, up_config);
            dim /= 2;
            up.push((conv, instance_norm(vs / format!("up{}_norm", i), dim)));
        }

        let head = nn::conv2d(vs / "head", dim, config.channels, 7, Default::default());

        Self {
            config,
            stem,
            stem_norm,
            down,
            blocks,
            up,
            head,
        }
    }

    /// Translate a batch of images
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch, channels, H, W) in `[-1, 1]`
    /// * `train` - Whether in training mode
    ///
    /// # Returns
    ///
    /// Tensor with the same shape as `input`, values in `[-1, 1]`
    pub fn forward_t(&self, input: &Tensor, _train: bool) -> Tensor {
        let x = input.reflection_pad2d([3, 3, 3, 3]);
        let mut x = self.stem_norm.forward(&self.stem.forward(&x)).relu();

        for (conv, norm) in &self.down {
            x = norm.forward(&conv.forward(&x)).relu();
        }

        for block in &self.blocks {
            x = block.forward(&x);
        }

        for (conv, norm) in &self.up {
            x = norm.forward(&conv.forward(&x)).relu();
        }

        let x = x.reflection_pad2d([3, 3, 3, 3]);
        self.head.forward(&x).tanh()
    }

    /// Translate in inference mode
    pub fn translate(&self, input: &Tensor) -> Tensor {
        self.forward_t(input, false)
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Generator::forward_t(self, xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    fn small_config() -> GeneratorConfig {
        GeneratorConfig {
            channels: 1,
            base_filters: 4,
            n_downsamplings: 2,
            n_blocks: 1,
        }
    }

    #[test]
    fn test_generator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(&vs.root(), small_config());

        let input = Tensor::randn([2, 1, 16, 16], (Kind::Float, Device::Cpu));
        let output = gen.forward_t(&input, true);

        assert_eq!(output.size(), vec![2, 1, 16, 16]);
    }

    #[test]
    fn test_generator_output_bounded() {
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(&vs.root(), small_config());

        let input = Tensor::rand([1, 1, 16, 16], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let output = gen.translate(&input);

        assert!(output.min().double_value(&[]) >= -1.0);
        assert!(output.max().double_value(&[]) <= 1.0);
    }
}
