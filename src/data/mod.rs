//! Data module for loading images and buffering generated samples
//!
//! This module provides:
//! - Image discovery and preprocessing (grayscale, resize, crop, `[-1, 1]`)
//! - ZipDataLoader pairing the two unaligned domains into batches
//! - ItemPool buffering generated fakes for the discriminators

mod images;
mod loader;
mod pool;

pub use images::{list_images, load_image, preprocess, read_gray, to_tensor, CropMode, ImageSpec};
pub use loader::{LoaderConfig, ZipDataLoader};
pub use pool::{ItemPool, Sample};
