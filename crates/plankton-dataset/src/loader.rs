//! Image loading and tensor conversion.
//!
//! Images are decoded from disk, resized to the target size and flattened
//! into CHW `f32` buffers scaled to [0, 1].

use image::imageops::FilterType;
use image::DynamicImage;
use plankton_core::{channels_for, Error, ImageSize, Result};
use std::path::Path;

/// Loads manifest images as model-ready pixel buffers
#[derive(Debug, Clone, Copy)]
pub struct ImageLoader {
    size: ImageSize,
    gray: bool,
}

impl ImageLoader {
    /// Creates a new image loader
    pub fn new(size: ImageSize, gray: bool) -> Self {
        Self { size, gray }
    }

    /// Number of channels in produced buffers
    pub fn channels(&self) -> usize {
        channels_for(self.gray)
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Length of one flattened image
    pub fn item_len(&self) -> usize {
        self.channels() * self.size.num_pixels()
    }

    /// Loads an image from a path
    pub fn load_image(&self, path: &Path) -> Result<DynamicImage> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Image file not found: {}",
                path.display()
            )));
        }

        image::open(path)
            .map_err(|e| Error::Image(format!("Failed to load image {}: {}", path.display(), e)))
    }

    /// Decode, resize and flatten an image to CHW.
    pub fn load_tensor_data(&self, path: &Path) -> Result<Vec<f32>> {
        let img = self.load_image(path)?;
        Ok(self.to_tensor_data(&img))
    }

    /// Resize and flatten an already decoded image to CHW.
    pub fn to_tensor_data(&self, img: &DynamicImage) -> Vec<f32> {
        let (width, height) = (self.size.width as u32, self.size.height as u32);
        let resized = img.resize_exact(width, height, FilterType::Triangle);
        let mut data = Vec::with_capacity(self.item_len());

        if self.gray {
            let luma = resized.to_luma8();
            data.extend(luma.pixels().map(|p| p[0] as f32 / 255.0));
        } else {
            let rgb = resized.to_rgb8();
            for c in 0..3 {
                data.extend(rgb.pixels().map(|p| p[c] as f32 / 255.0));
            }
        }

        data
    }
}
