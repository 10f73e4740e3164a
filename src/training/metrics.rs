//! Translation quality metrics and loss tracking
//!
//! MSE, NCC and SSIM compare a translated image with its target for human
//! monitoring only; none of them feeds back into training.

use ndarray::{s, Array2, Array3, ArrayView2};
use tch::{Kind, Tensor};

use crate::error::{Error, Result};

/// SSIM window side
/// Side of the square SSIM window
pub const SSIM_WINDOW: usize = 7;
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;
/// Images live in `[-1, 1]`
const DATA_RANGE: f64 = 2.0;

/// Drop a leading singleton batch dimension from `[1, C, H, W]`
fn squeeze_batch(t: &Tensor) -> Tensor {
    if t.dim() == 4 && t.size()[0] == 1 {
        t.squeeze_dim(0)
    } else {
        t.shallow_clone()
    }
}

/// Squeeze both images, check shapes, and flatten to `f64`
fn flatten_pair(target: &Tensor, other: &Tensor) -> Result<(Vec<i64>, Vec<f64>, Vec<f64>)> {
    let target = squeeze_batch(target);
    let other = squeeze_batch(other);

    if target.size() != other.size() {
        return Err(Error::ShapeMismatch {
            left: target.size(),
            right: other.size(),
        });
    }

    let shape = target.size();
    let a = Vec::<f64>::try_from(target.detach().to_kind(Kind::Double).flatten(0, -1))?;
    let b = Vec::<f64>::try_from(other.detach().to_kind(Kind::Double).flatten(0, -1))?;
    Ok((shape, a, b))
}

/// Mean squared error; 0 for identical images
pub fn mse(target: &Tensor, translated: &Tensor) -> Result<f64> {
    let (_, a, b) = flatten_pair(target, translated)?;
    let se: f64 = a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum();
    Ok(se / a.len() as f64)
}

/// Normalized cross-correlation: cosine of the angle between the flattened images
///
/// 1 for images equal up to a positive scale. Fails on an all-zero image.
pub fn ncc(target: &Tensor, translated: &Tensor) -> Result<f64> {
    let (_, a, b) = flatten_pair(target, translated)?;

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(&b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(Error::ZeroNorm);
    }

    Ok(dot / (norm_a * norm_b).sqrt())
}

/// Structural similarity index, averaged over channels
///
/// Uses a 7x7 uniform window with sample covariance and only windows that
/// fit entirely inside the image. Accepts `[H, W]`, `[C, H, W]` or
/// `[1, C, H, W]`.
pub fn ssim(target: &Tensor, translated: &Tensor) -> Result<f64> {
    let (shape, a, b) = flatten_pair(target, translated)?;

    let (c, h, w) = match shape.as_slice() {
        [h, w] => (1, *h as usize, *w as usize),
        [c, h, w] => (*c as usize, *h as usize, *w as usize),
        _ => return Err(Error::ImageTensorShape(shape.clone())),
    };

    if h < SSIM_WINDOW || w < SSIM_WINDOW {
        return Err(Error::WindowTooLarge {
            height: h,
            width: w,
            window: SSIM_WINDOW,
        });
    }

    let a = Array3::from_shape_vec((c, h, w), a)?;
    let b = Array3::from_shape_vec((c, h, w), b)?;

    let total: f64 = (0..c)
        .map(|ch| ssim_channel(a.slice(s![ch, .., ..]), b.slice(s![ch, .., ..])))
        .sum();
    Ok(total / c as f64)
}

fn ssim_channel(x: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
    let n = (SSIM_WINDOW * SSIM_WINDOW) as f64;
    let cov_norm = n / (n - 1.0);
    let c1 = (SSIM_K1 * DATA_RANGE).powi(2);
    let c2 = (SSIM_K2 * DATA_RANGE).powi(2);

    let (h, w) = x.dim();
    let rows = h - SSIM_WINDOW + 1;
    let cols = w - SSIM_WINDOW + 1;
    let mut map = Array2::<f64>::zeros((rows, cols));

    for i in 0..rows {
        for j in 0..cols {
            let wx = x.slice(s![i..i + SSIM_WINDOW, j..j + SSIM_WINDOW]);
            let wy = y.slice(s![i..i + SSIM_WINDOW, j..j + SSIM_WINDOW]);

            let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for (&p, &q) in wx.iter().zip(wy.iter()) {
                sx += p;
                sy += q;
                sxx += p * p;
                syy += q * q;
                sxy += p * q;
            }

            let ux = sx / n;
            let uy = sy / n;
            let vx = cov_norm * (sxx / n - ux * ux);
            let vy = cov_norm * (syy / n - uy * uy);
            let vxy = cov_norm * (sxy / n - ux * uy);

            let a1 = 2.0 * ux * uy + c1;
            let a2 = 2.0 * vxy + c2;
            let b1 = ux * ux + uy * uy + c1;
            let b2 = vx + vy + c2;
            map[[i, j]] = (a1 * a2) / (b1 * b2);
        }
    }

    map.mean().unwrap_or(0.0)
}

/// Before/after comparison of one translated test sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationReport {
    pub mse_before: f64,
    pub mse_after: f64,
    pub ncc_before: f64,
    pub ncc_after: f64,
    pub ssim_before: f64,
    pub ssim_after: f64,
}

impl TranslationReport {
    /// Compare source and translated images against the target
    pub fn compute(source: &Tensor, translated: &Tensor, target: &Tensor) -> Result<Self> {
        Ok(Self {
            mse_before: mse(target, source)?,
            mse_after: mse(target, translated)?,
            ncc_before: ncc(target, source)?,
            ncc_after: ncc(target, translated)?,
            ssim_before: ssim(target, source)?,
            ssim_after: ssim(target, translated)?,
        })
    }

    /// `(name, value)` pairs for the summary writer
    pub fn scalars(&self) -> [(&'static str, f64); 6] {
        [
            ("mse_before", self.mse_before),
            ("mse_after", self.mse_after),
            ("ncc_before", self.ncc_before),
            ("ncc_after", self.ncc_after),
            ("ssim_before", self.ssim_before),
            ("ssim_after", self.ssim_after),
        ]
    }
}

/// Per-epoch mean losses
#[derive(Debug, Clone, Default)]
pub struct LossHistory {
    /// Total generator loss per epoch
    pub gen_losses: Vec<f64>,
    /// Total discriminator loss per epoch
    pub disc_losses: Vec<f64>,
}

impl LossHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record epoch means
    pub fn record_epoch(&mut self, gen_loss: f64, disc_loss: f64) {
        self.gen_losses.push(gen_loss);
        self.disc_losses.push(disc_loss);
    }

    pub fn num_epochs(&self) -> usize {
        self.gen_losses.len()
    }

    pub fn latest_gen_loss(&self) -> Option<f64> {
        self.gen_losses.last().copied()
    }

    pub fn latest_disc_loss(&self) -> Option<f64> {
        self.disc_losses.last().copied()
    }

    /// Moving average of the generator loss over the last `window` epochs
    pub fn gen_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.gen_losses, window)
    }

    /// Moving average of the discriminator loss over the last `window` epochs
    pub fn disc_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.disc_losses, window)
    }

    /// Check if training appears to have collapsed
    ///
    /// The discriminator separating real from fake with near-zero loss while
    /// the generator loss stays high is the usual symptom.
    pub fn check_mode_collapse(&self, window: usize) -> bool {
        if self.num_epochs() < window {
            return false;
        }
        self.disc_loss_ma(window) < 0.01 && self.gen_loss_ma(window) > 5.0
    }

    /// Save history to CSV file
    pub fn save_csv(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["epoch", "gen_loss", "disc_loss"])?;

        for i in 0..self.num_epochs() {
            writer.write_record([
                (i + 1).to_string(),
                self.gen_losses[i].to_string(),
                self.disc_losses[i].to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load history from CSV file
    pub fn load_csv(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut history = Self::new();

        for result in reader.records() {
            let record = result?;
            history.gen_losses.push(record[1].parse()?);
            history.disc_losses.push(record[2].parse()?);
        }

        Ok(history)
    }
}

/// Exponential moving average tracker
#[derive(Debug)]
pub struct EMATracker {
    value: f64,
    alpha: f64,
    initialized: bool,
}

impl EMATracker {
    /// Create new EMA tracker
    ///
    /// # Arguments
    ///
    /// * `alpha` - Smoothing factor (0 < alpha <= 1). Higher = more weight on recent
    pub fn new(alpha: f64) -> Self {
        Self {
            value: 0.0,
            alpha: alpha.clamp(0.001, 1.0),
            initialized: false,
        }
    }

    pub fn update(&mut self, new_value: f64) {
        if !self.initialized {
            self.value = new_value;
            self.initialized = true;
        } else {
            self.value = self.alpha * new_value + (1.0 - self.alpha) * self.value;
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Calculate moving average of last `window` values
fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}
