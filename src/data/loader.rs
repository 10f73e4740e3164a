//! DataLoader zipping the two image domains into batches
//!
//! Provides batching for unpaired training with support for:
//! - Random shuffling of both domains every pass
//! - Cycling the shorter domain so every image of the longer one is seen
//! - Endless repetition for the test sampler

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::{Device, Tensor};

use super::images::{list_images, load_image, CropMode, ImageSpec};
use crate::error::Result;

/// Loader options
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// Samples per batch
    pub batch_size: usize,
    /// Resize and crop sizes
    pub spec: ImageSpec,
    /// Training (shuffle, random crop) or evaluation (ordered, center crop)
    pub mode: CropMode,
    /// Restart automatically after each pass
    pub repeat: bool,
    /// Seed for shuffling and cropping
    pub seed: u64,
}

/// Batches of unaligned `(A, B)` image pairs
///
/// One pass has `max(len_A, len_B) / batch_size` batches; the shorter domain
/// wraps around. The last incomplete batch is dropped.
pub struct ZipDataLoader {
    a_paths: Vec<PathBuf>,
    b_paths: Vec<PathBuf>,
    config: LoaderConfig,
    a_indices: Vec<usize>,
    b_indices: Vec<usize>,
    current_idx: usize,
    device: Device,
    rng: StdRng,
}

impl ZipDataLoader {
    /// Create a loader over two path lists
    pub fn new(
        a_paths: Vec<PathBuf>,
        b_paths: Vec<PathBuf>,
        config: LoaderConfig,
        device: Device,
    ) -> Self {
        let a_indices = (0..a_paths.len()).collect();
        let b_indices = (0..b_paths.len()).collect();

        let mut loader = Self {
            a_paths,
            b_paths,
            config,
            a_indices,
            b_indices,
            current_idx: 0,
            device,
            rng: StdRng::seed_from_u64(config.seed),
        };

        if loader.shuffles() {
            loader.shuffle_indices();
        }

        loader
    }

    /// Create a loader from two image directories
    pub fn from_dirs(
        a_dir: impl Into<PathBuf>,
        b_dir: impl Into<PathBuf>,
        config: LoaderConfig,
        device: Device,
    ) -> Result<Self> {
        let a_paths = list_images(a_dir.into())?;
        let b_paths = list_images(b_dir.into())?;
        Ok(Self::new(a_paths, b_paths, config, device))
    }

    /// Number of samples in one pass
    pub fn pass_len(&self) -> usize {
        self.a_paths.len().max(self.b_paths.len())
    }

    /// Number of batches in one pass
    pub fn num_batches(&self) -> usize {
        self.pass_len() / self.config.batch_size
    }

    /// Images in domain A
    pub fn len_a(&self) -> usize {
        self.a_paths.len()
    }

    /// Images in domain B
    pub fn len_b(&self) -> usize {
        self.b_paths.len()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn shuffles(&self) -> bool {
        self.config.mode == CropMode::Train
    }

    fn shuffle_indices(&mut self) {
        self.a_indices.shuffle(&mut self.rng);
        self.b_indices.shuffle(&mut self.rng);
    }

    /// Reset for a new pass
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffles() {
            self.shuffle_indices();
        }
    }

    /// Indices of the next batch as `(a, b)` pairs, `None` at the end of a pass
    fn next_indices(&mut self) -> Option<Vec<(usize, usize)>> {
        if self.num_batches() == 0 {
            return None;
        }

        let start = self.current_idx;
        let end = start + self.config.batch_size;

        if end > self.pass_len() {
            if !self.config.repeat {
                return None;
            }
            self.reset();
            return self.next_indices();
        }

        self.current_idx = end;
        Some(
            (start..end)
                .map(|i| {
                    (
                        self.a_indices[i % self.a_indices.len()],
                        self.b_indices[i % self.b_indices.len()],
                    )
                })
                .collect(),
        )
    }

    /// Load the next batch as `([N, 1, crop, crop], [N, 1, crop, crop])`
    ///
    /// Returns `Ok(None)` when a non-repeating pass is complete.
    pub fn next_batch(&mut self) -> Result<Option<(Tensor, Tensor)>> {
        let pairs = match self.next_indices() {
            Some(pairs) => pairs,
            None => return Ok(None),
        };

        let mut a_batch = Vec::with_capacity(pairs.len());
        let mut b_batch = Vec::with_capacity(pairs.len());

        for (a_idx, b_idx) in pairs {
            a_batch.push(load_image(
                &self.a_paths[a_idx],
                self.config.spec,
                self.config.mode,
                &mut self.rng,
            )?);
            b_batch.push(load_image(
                &self.b_paths[b_idx],
                self.config.spec,
                self.config.mode,
                &mut self.rng,
            )?);
        }

        Ok(Some((
            Tensor::stack(&a_batch, 0).to_device(self.device),
            Tensor::stack(&b_batch, 0).to_device(self.device),
        )))
    }

    /// Iterate over one pass (endless when `repeat` is set)
    pub fn iter(&mut self) -> ZipDataLoaderIter<'_> {
        self.reset();
        ZipDataLoaderIter { loader: self }
    }
}

/// Iterator adapter for ZipDataLoader
pub struct ZipDataLoaderIter<'a> {
    loader: &'a mut ZipDataLoader,
}

impl<'a> Iterator for ZipDataLoaderIter<'a> {
    type Item = Result<(Tensor, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch().transpose()
    }
}
