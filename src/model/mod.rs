//! Model module containing the CycleGAN architecture
//!
//! This module provides:
//! - ResNet generator translating between the two domains
//! - PatchGAN discriminator scoring image patches
//! - CycleGan wrapper owning both pairs and their variable stores

mod cyclegan;
mod discriminator;
mod generator;

pub use cyclegan::{CycleGan, Translation};
pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig};
