//! Fixed-capacity pool of previously generated images
//!
//! The discriminators see a mix of fresh fakes and fakes from earlier steps.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::Tensor;

/// Bounded buffer of generated samples
///
/// Once full, every insertion either passes the new item through (miss) or
/// swaps it with a uniformly chosen stored item and returns that one (hit),
/// each with probability 0.5.
#[derive(Debug)]
pub struct ItemPool<T, R = StdRng> {
    capacity: usize,
    items: Vec<T>,
    rng: R,
}

impl<T> ItemPool<T, StdRng> {
    /// Create a pool seeded from system entropy
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    /// Create a pool with a reproducible seed
    pub fn seeded(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }
}

impl<T, R> ItemPool<T, R> {
    /// Create a pool drawing its swap decisions from `rng`
    pub fn with_rng(capacity: usize, rng: R) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
            rng,
        }
    }

    /// Maximum number of stored items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Stored items in slot order
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Remove and return every stored item
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }
}

impl<T: Clone, R: Rng> ItemPool<T, R> {
    /// Offer a new item, get back the one to use downstream
    pub fn insert(&mut self, item: T) -> T {
        if self.capacity == 0 {
            return item;
        }

        if self.items.len() < self.capacity {
            self.items.push(item.clone());
            return item;
        }

        if self.rng.gen_bool(0.5) {
            let idx = self.rng.gen_range(0..self.items.len());
            std::mem::replace(&mut self.items[idx], item)
        } else {
            item
        }
    }
}

/// One generated image held by a pool
///
/// Cloning shares storage with the original. Samples are detached on entry
/// and never written to, so sharing is safe.
#[derive(Debug)]
pub struct Sample(Tensor);

impl Sample {
    pub fn new(tensor: &Tensor) -> Self {
        Self(tensor.detach())
    }

    pub fn tensor(&self) -> &Tensor {
        &self.0
    }

    pub fn into_tensor(self) -> Tensor {
        self.0
    }
}

impl Clone for Sample {
    fn clone(&self) -> Self {
        Self(self.0.shallow_clone())
    }
}

impl<R: Rng> ItemPool<Sample, R> {
    /// Pass every sample of a batch through the pool and restack the results
    ///
    /// `batch` has the sample index on dimension 0.
    pub fn query(&mut self, batch: &Tensor) -> Tensor {
        if self.capacity == 0 {
            return batch.detach();
        }

        let outputs: Vec<Tensor> = batch
            .unbind(0)
            .iter()
            .map(|sample| self.insert(Sample::new(sample)).into_tensor())
            .collect();

        Tensor::stack(&outputs, 0)
    }
}
