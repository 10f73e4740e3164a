//! Image file discovery and preprocessing
//!
//! Every image is decoded as single-channel 8-bit, resized to the load size,
//! cropped to the crop size and mapped to `[-1, 1]`.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::GrayImage;
use rand::Rng;
use tch::Tensor;

use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// How an image is cropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// Random horizontal flip and random crop
    Train,
    /// Deterministic center crop
    Eval,
}

/// Preprocessing sizes
#[derive(Debug, Clone, Copy)]
pub struct ImageSpec {
    pub load_size: u32,
    pub crop_size: u32,
}

impl ImageSpec {
    pub fn new(load_size: u32, crop_size: u32) -> Result<Self> {
        if crop_size > load_size {
            return Err(Error::InvalidCrop {
                crop: crop_size,
                load: load_size,
            });
        }
        Ok(Self {
            load_size,
            crop_size,
        })
    }
}

/// List image files in `dir`, sorted by name
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::EmptyDataset(dir.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();

    if paths.is_empty() {
        return Err(Error::EmptyDataset(dir.to_path_buf()));
    }

    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image file as grayscale
pub fn read_gray(path: &Path) -> Result<GrayImage> {
    let img = image::open(path).map_err(|source| Error::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_luma8())
}

/// Resize, crop and flip a decoded image
pub fn preprocess<R: Rng>(
    img: &GrayImage,
    spec: ImageSpec,
    mode: CropMode,
    rng: &mut R,
) -> GrayImage {
    let mut img = if mode == CropMode::Train && rng.gen_bool(0.5) {
        imageops::flip_horizontal(img)
    } else {
        img.clone()
    };

    if img.width() != spec.load_size || img.height() != spec.load_size {
        img = imageops::resize(&img, spec.load_size, spec.load_size, FilterType::Triangle);
    }

    let margin = spec.load_size - spec.crop_size;
    let (x, y) = match mode {
        CropMode::Train => (rng.gen_range(0..=margin), rng.gen_range(0..=margin)),
        CropMode::Eval => (margin / 2, margin / 2),
    };

    imageops::crop_imm(&img, x, y, spec.crop_size, spec.crop_size).to_image()
}

/// Convert an 8-bit grayscale image to a `[1, H, W]` tensor in `[-1, 1]`
pub fn to_tensor(img: &GrayImage) -> Tensor {
    let (w, h) = img.dimensions();
    let pixels: Vec<f32> = img
        .as_raw()
        .iter()
        .map(|&p| p as f32 / 255.0 * 2.0 - 1.0)
        .collect();

    Tensor::from_slice(&pixels).view([1, h as i64, w as i64])
}

/// Load one preprocessed image tensor
pub fn load_image<R: Rng>(
    path: &Path,
    spec: ImageSpec,
    mode: CropMode,
    rng: &mut R,
) -> Result<Tensor> {
    let img = read_gray(path)?;
    Ok(to_tensor(&preprocess(&img, spec, mode, rng)))
}
