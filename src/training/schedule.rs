//! Learning-rate schedule
//!
//! Constant until the decay step, then linear down to zero at the final step.

/// Linear decay schedule driven by the optimizer step counter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDecay {
    initial_lr: f64,
    total_steps: u64,
    decay_start: u64,
}

impl LinearDecay {
    /// # Arguments
    ///
    /// * `initial_lr` - Rate used before the decay starts
    /// * `total_steps` - Step at which the rate reaches zero
    /// * `decay_start` - First step of the linear decay
    pub fn new(initial_lr: f64, total_steps: u64, decay_start: u64) -> Self {
        Self {
            initial_lr,
            total_steps,
            decay_start: decay_start.min(total_steps),
        }
    }

    /// Build from epoch counts and batches per epoch
    pub fn from_epochs(initial_lr: f64, epochs: usize, epoch_decay: usize, steps_per_epoch: usize) -> Self {
        Self::new(
            initial_lr,
            (epochs * steps_per_epoch) as u64,
            (epoch_decay * steps_per_epoch) as u64,
        )
    }

    /// Learning rate at `step`
    pub fn lr_at(&self, step: u64) -> f64 {
        if step < self.decay_start {
            return self.initial_lr;
        }

        let span = self.total_steps - self.decay_start;
        if span == 0 {
            return 0.0;
        }

        let progress = (step - self.decay_start) as f64 / span as f64;
        (self.initial_lr * (1.0 - progress)).max(0.0)
    }

    pub fn initial_lr(&self) -> f64 {
        self.initial_lr
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn decay_start(&self) -> u64 {
        self.decay_start
    }
}
