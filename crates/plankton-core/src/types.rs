//! Core type definitions shared by the training crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Network family trained by a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Convolutional autoencoder trained to reconstruct its input
    ConvAutoencoder,
    /// ResNet-18 style classifier with a latent projection
    #[serde(alias = "resnet_custom")]
    Resnet18,
}

impl Architecture {
    /// Whether the training target is the input batch itself.
    pub fn is_reconstruction(&self) -> bool {
        matches!(self, Architecture::ConvAutoencoder)
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Architecture::ConvAutoencoder => write!(f, "conv_autoencoder"),
            Architecture::Resnet18 => write!(f, "resnet18"),
        }
    }
}

/// Training objective.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// Plain categorical cross-entropy
    CrossEntropy,
    /// Cross-entropy weighted by inverse class frequency
    CrossEntropyWeight,
    /// Focal loss
    Focal,
    /// Mean squared reconstruction error
    Mse,
}

impl LossKind {
    /// Whether the loss consumes integer class labels.
    pub fn is_classification(&self) -> bool {
        !matches!(self, LossKind::Mse)
    }

    /// Whether the loss needs the class-weight vector.
    pub fn needs_class_weights(&self) -> bool {
        matches!(self, LossKind::CrossEntropyWeight)
    }
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LossKind::CrossEntropy => write!(f, "cross_entropy"),
            LossKind::CrossEntropyWeight => write!(f, "cross_entropy_weight"),
            LossKind::Focal => write!(f, "focal"),
            LossKind::Mse => write!(f, "mse"),
        }
    }
}

/// Image dimensions after resizing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSize {
    pub height: usize,
    pub width: usize,
}

impl ImageSize {
    /// Creates new image dimensions
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Square image of the given side length
    pub fn square(side: usize) -> Self {
        Self::new(side, side)
    }

    /// Number of pixels per channel
    pub fn num_pixels(&self) -> usize {
        self.height * self.width
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Number of image channels for the `gray` flag.
pub fn channels_for(gray: bool) -> usize {
    if gray {
        1
    } else {
        3
    }
}

/// One row of the training manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Resolved path to the image file
    pub image_path: PathBuf,
    /// Class label (index)
    pub label: usize,
    /// Sample identifier, the file stem when the manifest has no id column
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Selectors {
        architecture: Architecture,
        loss: LossKind,
    }

    #[test]
    fn test_selectors_parse_snake_case() {
        let parsed: Selectors =
            serde_yaml::from_str("architecture: conv_autoencoder\nloss: cross_entropy_weight\n")
                .unwrap();
        assert_eq!(parsed.architecture, Architecture::ConvAutoencoder);
        assert_eq!(parsed.loss, LossKind::CrossEntropyWeight);
    }

    #[test]
    fn test_resnet_custom_alias() {
        let parsed: Selectors =
            serde_yaml::from_str("architecture: resnet_custom\nloss: focal\n").unwrap();
        assert_eq!(parsed.architecture, Architecture::Resnet18);
    }

    #[test]
    fn test_unknown_selector_rejected() {
        let parsed = serde_yaml::from_str::<Selectors>("architecture: vgg16\nloss: mse\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_reconstruction_flag() {
        assert!(Architecture::ConvAutoencoder.is_reconstruction());
        assert!(!Architecture::Resnet18.is_reconstruction());
    }

    #[test]
    fn test_display_matches_serde_names() {
        for loss in [
            LossKind::CrossEntropy,
            LossKind::CrossEntropyWeight,
            LossKind::Focal,
            LossKind::Mse,
        ] {
            let yaml = serde_yaml::to_string(&loss).unwrap();
            assert_eq!(yaml.trim(), loss.to_string());
        }
    }

    #[test]
    fn test_image_size() {
        let size = ImageSize::new(64, 32);
        assert_eq!(size.num_pixels(), 2048);
        assert_eq!(size.to_string(), "64x32");
        assert_eq!(channels_for(true), 1);
        assert_eq!(channels_for(false), 3);
    }
}
