//! Burn dataset and batcher for manifest images.
//!
//! `PlanktonDataset` decodes images lazily on `get`; `PlanktonBatcher`
//! stacks items into `[batch, channels, height, width]` tensors and applies
//! augmentation when it is enabled.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use plankton_core::{ManifestEntry, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::marker::PhantomData;
use std::sync::Mutex;
use tracing::warn;

use crate::augmentation::Augmenter;
use crate::loader::ImageLoader;
use crate::manifest::Manifest;

/// A single decoded image with its label
#[derive(Clone, Debug)]
pub struct PlanktonItem {
    /// Flattened CHW pixels in [0, 1]
    pub image: Vec<f32>,
    /// Class label (index)
    pub label: usize,
    /// Sample identifier from the manifest
    pub id: String,
}

/// Manifest-backed dataset that decodes images on demand
#[derive(Debug, Clone)]
pub struct PlanktonDataset {
    entries: Vec<ManifestEntry>,
    loader: ImageLoader,
}

impl PlanktonDataset {
    pub fn new(manifest: &Manifest, loader: ImageLoader) -> Self {
        Self {
            entries: manifest.entries().to_vec(),
            loader,
        }
    }

    /// Decode the item at `index`, keeping the error.
    pub fn load(&self, index: usize) -> Result<PlanktonItem> {
        let entry = self.entries.get(index).ok_or_else(|| {
            plankton_core::Error::InvalidArgument(format!(
                "index {index} out of range for {} samples",
                self.entries.len()
            ))
        })?;
        let image = self.loader.load_tensor_data(&entry.image_path)?;
        Ok(PlanktonItem {
            image,
            label: entry.label,
            id: entry.id.clone(),
        })
    }
}

impl Dataset<PlanktonItem> for PlanktonDataset {
    fn get(&self, index: usize) -> Option<PlanktonItem> {
        match self.load(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Failed to load sample {index}: {e}");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A batch of plankton images for training
#[derive(Clone, Debug)]
pub struct PlanktonBatch<B: Backend> {
    /// Images with shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub labels: Tensor<B, 1, Int>,
    /// Sample identifiers in batch order
    pub ids: Vec<String>,
}

/// Stream of the run seed reserved for augmentation, apart from the shuffle.
const AUGMENTATION_STREAM: u64 = 1;

/// Batcher for creating training batches
///
/// Augmentation draws from one generator seeded with the run seed, so the
/// same seed and batch order give the same augmented tensors.
#[derive(Debug)]
pub struct PlanktonBatcher<B: Backend> {
    augmenter: Augmenter,
    channels: usize,
    height: usize,
    width: usize,
    rng: Mutex<ChaCha8Rng>,
    _backend: PhantomData<B>,
}

impl<B: Backend> PlanktonBatcher<B> {
    /// Create a batcher for images produced by `loader`
    pub fn new(loader: &ImageLoader, augmenter: Augmenter, seed: u64) -> Self {
        let size = loader.size();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(AUGMENTATION_STREAM);
        Self {
            augmenter,
            channels: loader.channels(),
            height: size.height,
            width: size.width,
            rng: Mutex::new(rng),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Clone for PlanktonBatcher<B> {
    fn clone(&self) -> Self {
        let rng = self.rng.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Self {
            augmenter: self.augmenter.clone(),
            channels: self.channels,
            height: self.height,
            width: self.width,
            rng: Mutex::new(rng),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, PlanktonItem, PlanktonBatch<B>> for PlanktonBatcher<B> {
    fn batch(&self, items: Vec<PlanktonItem>, device: &B::Device) -> PlanktonBatch<B> {
        let batch_size = items.len();
        let mut images_data =
            Vec::with_capacity(batch_size * self.channels * self.height * self.width);
        let mut labels_data = Vec::with_capacity(batch_size);
        let mut ids = Vec::with_capacity(batch_size);

        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        for item in items {
            if self.augmenter.is_enabled() {
                images_data.extend(self.augmenter.augment(&item.image, &mut rng));
            } else {
                images_data.extend(item.image);
            }
            labels_data.push(item.label as i64);
            ids.push(item.id);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(
                images_data,
                [batch_size, self.channels, self.height, self.width],
            ),
            device,
        );
        let labels =
            Tensor::<B, 1, Int>::from_data(TensorData::new(labels_data, [batch_size]), device);

        PlanktonBatch {
            images,
            labels,
            ids,
        }
    }
}
