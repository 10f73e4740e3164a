//! Error types for the CycleGAN library

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Image directory missing or without usable files
    #[error("No images found in {}", .0.display())]
    EmptyDataset(PathBuf),

    /// Image could not be decoded
    #[error("Failed to decode image {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Crop larger than the loaded image
    #[error("Crop size {crop} exceeds load size {load}")]
    InvalidCrop { crop: u32, load: u32 },

    /// Two images passed to a metric have different shapes
    #[error("Shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<i64>, right: Vec<i64> },

    /// Cross-correlation of an all-zero image
    #[error("Normalized cross-correlation undefined for zero-norm image")]
    ZeroNorm,

    /// Image too small for the SSIM window
    #[error("Image {height}x{width} smaller than SSIM window {window}")]
    WindowTooLarge {
        height: usize,
        width: usize,
        window: usize,
    },

    /// Tensor cannot be written as a grayscale image
    #[error("Expected a [1, H, W] or [H, W] image tensor, got {0:?}")]
    ImageTensorShape(Vec<i64>),

    /// Array reshape error
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Tensor backend error
    #[error("Tensor error: {0}")]
    Tensor(#[from] tch::TchError),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
