//! Configuration structures for autoencoder training runs.

use crate::error::{Error, Result};
use crate::types::{channels_for, Architecture, ImageSize, LossKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingConfig {
    /// Image sampling parameters
    pub sampling: SamplingConfig,
    /// Model and optimisation parameters
    pub autoencoder: AutoencoderConfig,
    /// Device selection
    #[serde(default, alias = "base")]
    pub device: DeviceConfig,
    /// On-the-fly augmentation
    #[serde(default)]
    pub augmentation: AugmentationConfig,
    /// Random seed for epoch shuffling
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Resolved run directory, filled in before the snapshot is written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_path: Option<PathBuf>,
}

fn default_seed() -> u64 {
    42
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            autoencoder: AutoencoderConfig::default(),
            device: DeviceConfig::default(),
            augmentation: AugmentationConfig::default(),
            seed: default_seed(),
            training_path: None,
        }
    }
}

/// Image sampling parameters shared with the sampling stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingConfig {
    /// Target image size after resizing
    pub target_size: ImageSize,
    /// Number of classes in the manifest
    #[serde(alias = "num_class")]
    pub num_classes: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            target_size: ImageSize::square(64),
            num_classes: 10,
        }
    }
}

/// Model and optimisation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoencoderConfig {
    /// Network family
    #[serde(alias = "architecture_type")]
    pub architecture: Architecture,
    /// Latent dimension
    pub latent_dim: usize,
    /// Train on single-channel images
    pub gray: bool,
    /// Training objective
    pub loss: LossKind,
    /// Focal loss parameters, only read when `loss` is `focal`
    #[serde(default)]
    pub focal: FocalConfig,
    /// Batch size
    pub batch_size: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// Number of training epochs
    #[serde(alias = "num_epoch")]
    pub num_epochs: usize,
    /// Save weights every N epochs
    #[serde(alias = "save_model_every_n_epoch")]
    pub save_every_n_epochs: usize,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::ConvAutoencoder,
            latent_dim: 128,
            gray: true,
            loss: LossKind::Mse,
            focal: FocalConfig::default(),
            batch_size: 32,
            learning_rate: 0.001,
            num_epochs: 50,
            save_every_n_epochs: 10,
        }
    }
}

/// Focal loss parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FocalConfig {
    pub alpha: f64,
    pub gamma: f64,
}

impl Default for FocalConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            gamma: 2.0,
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    /// Force CPU even when an accelerator is present
    #[serde(default)]
    pub cpu: bool,
    /// Accelerator ordinal
    #[serde(default)]
    pub gpu_index: usize,
}

/// Data augmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AugmentationConfig {
    /// Apply augmentation to training batches
    pub enabled: bool,
    /// Horizontal flip probability
    pub horizontal_flip_prob: f32,
    /// Random rotation range in degrees (±)
    pub rotation_degrees: f32,
    /// Maximum translation as a fraction of width/height
    pub translate: f32,
    /// Scale range (min, max)
    pub scale: (f32, f32),
    /// Shear range in degrees (±)
    pub shear_degrees: f32,
    /// Gaussian noise standard deviation on [0, 1] pixel values
    pub noise_std: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            horizontal_flip_prob: 0.5,
            rotation_degrees: 15.0,
            translate: 0.1,
            scale: (0.8, 1.2),
            shear_degrees: 15.0,
            noise_std: 0.1,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            enabled: false,
            horizontal_flip_prob: 0.0,
            rotation_degrees: 0.0,
            translate: 0.0,
            scale: (1.0, 1.0),
            shear_degrees: 0.0,
            noise_std: 0.0,
        }
    }
}

impl TrainingConfig {
    /// Number of input channels implied by the `gray` flag
    pub fn channels(&self) -> usize {
        channels_for(self.autoencoder.gray)
    }

    /// Check every value that would otherwise fail mid-run.
    pub fn validate(&self) -> Result<()> {
        let ae = &self.autoencoder;
        let size = self.sampling.target_size;

        if size.height == 0 || size.width == 0 {
            return Err(Error::Config(format!("target_size must be non-zero, got {size}")));
        }
        if self.sampling.num_classes == 0 {
            return Err(Error::Config("num_classes must be at least 1".to_string()));
        }
        if ae.latent_dim == 0 {
            return Err(Error::Config("latent_dim must be at least 1".to_string()));
        }
        if ae.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if ae.num_epochs == 0 {
            return Err(Error::Config("num_epochs must be at least 1".to_string()));
        }
        if ae.save_every_n_epochs == 0 {
            return Err(Error::Config(
                "save_every_n_epochs must be at least 1".to_string(),
            ));
        }
        if !(ae.learning_rate.is_finite() && ae.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "learning_rate must be positive, got {}",
                ae.learning_rate
            )));
        }

        match (ae.architecture, ae.loss.is_classification()) {
            (Architecture::ConvAutoencoder, true) => {
                return Err(Error::Config(format!(
                    "architecture {} reconstructs its input and requires loss mse, got {}",
                    ae.architecture, ae.loss
                )));
            }
            (Architecture::Resnet18, false) => {
                return Err(Error::Config(format!(
                    "architecture {} predicts class labels and cannot train with loss {}",
                    ae.architecture, ae.loss
                )));
            }
            _ => {}
        }

        if ae.architecture == Architecture::ConvAutoencoder
            && (size.height % 8 != 0 || size.width % 8 != 0)
        {
            return Err(Error::Config(format!(
                "conv_autoencoder needs height and width divisible by 8, got {size}"
            )));
        }

        if ae.loss == LossKind::Focal && !(ae.focal.gamma >= 0.0 && ae.focal.alpha > 0.0) {
            return Err(Error::Config(format!(
                "focal loss needs alpha > 0 and gamma >= 0, got alpha={} gamma={}",
                ae.focal.alpha, ae.focal.gamma
            )));
        }

        let (min_scale, max_scale) = self.augmentation.scale;
        if self.augmentation.enabled && !(min_scale > 0.0 && min_scale <= max_scale) {
            return Err(Error::Config(format!(
                "augmentation scale range ({min_scale}, {max_scale}) is invalid"
            )));
        }

        Ok(())
    }
}
