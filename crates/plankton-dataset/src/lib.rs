//! Plankton dataset loading and batching.
//!
//! This crate reads the training manifest, computes class statistics and
//! weights, decodes and augments images and turns them into Burn batches.

pub mod augmentation;
pub mod dataset;
pub mod loader;
pub mod manifest;
pub mod statistics;

pub use augmentation::Augmenter;
pub use dataset::{PlanktonBatch, PlanktonBatcher, PlanktonDataset, PlanktonItem};
pub use loader::ImageLoader;
pub use manifest::{Manifest, MANIFEST_FILE_NAME};
pub use statistics::{class_weights, DatasetStatistics};
