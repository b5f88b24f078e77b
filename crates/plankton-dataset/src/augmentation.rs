//! Data augmentation on flattened CHW pixel buffers.
//!
//! Each training image goes through, in order: random horizontal flip, a
//! random rotation, a random affine transform (rotation, translation, scale
//! and shear) and additive Gaussian noise. Geometric transforms share one
//! inverse-mapped bilinear resampling pass and fill uncovered pixels with 0.

use plankton_core::{AugmentationConfig, ImageSize};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// 2x2 linear part of an affine transform, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Linear2 {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
}

impl Linear2 {
    const IDENTITY: Linear2 = Linear2 {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
    };

    fn rotation(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Linear2 {
            a: cos,
            b: -sin,
            c: sin,
            d: cos,
        }
    }

    fn shear_x(degrees: f32) -> Self {
        Linear2 {
            a: 1.0,
            b: degrees.to_radians().tan(),
            c: 0.0,
            d: 1.0,
        }
    }

    fn scale(s: f32) -> Self {
        Linear2 {
            a: s,
            b: 0.0,
            c: 0.0,
            d: s,
        }
    }

    fn then(self, next: Linear2) -> Linear2 {
        // next * self
        Linear2 {
            a: next.a * self.a + next.b * self.c,
            b: next.a * self.b + next.b * self.d,
            c: next.c * self.a + next.d * self.c,
            d: next.c * self.b + next.d * self.d,
        }
    }

    fn inverse(self) -> Option<Linear2> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-8 {
            return None;
        }
        Some(Linear2 {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
        })
    }
}

/// Image augmenter that applies random transformations
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
    size: ImageSize,
    channels: usize,
}

impl Augmenter {
    /// Create a new augmenter for images of the given shape
    pub fn new(config: AugmentationConfig, size: ImageSize, channels: usize) -> Self {
        Self {
            config,
            size,
            channels,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Apply all configured augmentations to one CHW image.
    pub fn augment(&self, data: &[f32], rng: &mut ChaCha8Rng) -> Vec<f32> {
        if !self.config.enabled {
            return data.to_vec();
        }

        let mut result = data.to_vec();

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = self.flip_horizontal(&result);
        }

        let rotation = symmetric(rng, self.config.rotation_degrees);
        let affine_rotation = symmetric(rng, self.config.rotation_degrees);
        let shear = symmetric(rng, self.config.shear_degrees);
        let (min_scale, max_scale) = self.config.scale;
        let scale = if max_scale > min_scale {
            rng.gen_range(min_scale..=max_scale)
        } else {
            min_scale
        };
        let tx = symmetric(rng, self.config.translate) * self.size.width as f32;
        let ty = symmetric(rng, self.config.translate) * self.size.height as f32;

        let linear = Linear2::rotation(rotation)
            .then(Linear2::scale(scale))
            .then(Linear2::shear_x(shear))
            .then(Linear2::rotation(affine_rotation));
        result = self.warp(&result, linear, (tx, ty));

        if self.config.noise_std > 0.0 {
            result = self.apply_noise(&result, rng);
        }

        result
    }

    fn flip_horizontal(&self, data: &[f32]) -> Vec<f32> {
        let width = self.size.width;
        let mut output = Vec::with_capacity(data.len());
        for row in data.chunks(width) {
            output.extend(row.iter().rev());
        }
        output
    }

    /// Resample through `p' = c + M (p - c) + t` around the image center.
    fn warp(&self, data: &[f32], linear: Linear2, translation: (f32, f32)) -> Vec<f32> {
        if linear == Linear2::IDENTITY && translation == (0.0, 0.0) {
            return data.to_vec();
        }
        let Some(inv) = linear.inverse() else {
            return data.to_vec();
        };

        let (height, width) = (self.size.height, self.size.width);
        let plane = height * width;
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;
        let mut output = vec![0.0f32; data.len()];

        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx - translation.0;
                let dy = y as f32 - cy - translation.1;
                let src_x = cx + inv.a * dx + inv.b * dy;
                let src_y = cy + inv.c * dx + inv.d * dy;

                for c in 0..self.channels {
                    let channel = &data[c * plane..(c + 1) * plane];
                    output[c * plane + y * width + x] = bilinear_sample(channel, width, height, src_x, src_y);
                }
            }
        }

        output
    }

    fn apply_noise(&self, data: &[f32], rng: &mut ChaCha8Rng) -> Vec<f32> {
        let Ok(normal) = Normal::new(0.0f32, self.config.noise_std) else {
            return data.to_vec();
        };
        data.iter()
            .map(|v| (v + normal.sample(rng)).clamp(0.0, 1.0))
            .collect()
    }
}

fn symmetric(rng: &mut ChaCha8Rng, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}

/// Sample a pixel using bilinear interpolation, 0 outside the image.
fn bilinear_sample(channel: &[f32], width: usize, height: usize, x: f32, y: f32) -> f32 {
    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return 0.0;
    }

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let v00 = channel[y0 * width + x0];
    let v10 = channel[y0 * width + x1];
    let v01 = channel[y1 * width + x0];
    let v11 = channel[y1 * width + x1];

    v00 * (1.0 - fx) * (1.0 - fy) + v10 * fx * (1.0 - fy) + v01 * (1.0 - fx) * fy + v11 * fx * fy
}
