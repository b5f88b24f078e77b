//! Training manifest produced by the sampling stage.
//!
//! The manifest is a CSV file with a header row. The image column may be
//! named `image_path`, `file_name`, `path` or `img_path`; the `label` column
//! holds the class index and an optional `id` column names the sample.

use plankton_core::{Error, ManifestEntry, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the manifest inside the input directory
pub const MANIFEST_FILE_NAME: &str = "sampled_images.csv";

#[derive(Debug, Deserialize)]
struct ManifestRow {
    #[serde(alias = "file_name", alias = "path", alias = "img_path")]
    image_path: String,
    label: i64,
    #[serde(default)]
    id: Option<String>,
}

/// Ordered list of labelled images, read-only after loading
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Path of the manifest inside `input_dir`.
    pub fn path_in(input_dir: &Path) -> PathBuf {
        input_dir.join(MANIFEST_FILE_NAME)
    }

    /// Load `sampled_images.csv` from `input_dir`.
    pub fn load_from_dir(input_dir: &Path) -> Result<Self> {
        let path = Self::path_in(input_dir);
        if !path.is_file() {
            return Err(Error::NotFound(format!(
                "{} does not exist in {}",
                MANIFEST_FILE_NAME,
                input_dir.display()
            )));
        }
        Self::load(&path, input_dir)
    }

    /// Load a manifest, resolving relative image paths against `root`.
    pub fn load(path: &Path, root: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| Error::Dataset(format!("Failed to open {}: {e}", path.display())))?;

        let mut entries = Vec::new();
        for (row_index, row) in reader.deserialize::<ManifestRow>().enumerate() {
            let row = row.map_err(|e| {
                Error::Dataset(format!("{} row {}: {e}", path.display(), row_index + 1))
            })?;
            let label = usize::try_from(row.label).map_err(|_| {
                Error::Dataset(format!(
                    "{} row {}: negative label {}",
                    path.display(),
                    row_index + 1,
                    row.label
                ))
            })?;

            let image_path = PathBuf::from(&row.image_path);
            let image_path = if image_path.is_absolute() {
                image_path
            } else {
                root.join(image_path)
            };
            let id = row.id.unwrap_or_else(|| {
                image_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| row.image_path.clone())
            });

            entries.push(ManifestEntry {
                image_path,
                label,
                id,
            });
        }

        info!("Loaded {} manifest rows from {}", entries.len(), path.display());
        debug!("First manifest row: {:?}", entries.first());
        Ok(Self { entries })
    }

    /// All rows in file order
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// The label column in file order
    pub fn labels(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.label).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject labels outside `[0, num_classes)`.
    pub fn check_labels(&self, num_classes: usize) -> Result<()> {
        match self.entries.iter().find(|e| e.label >= num_classes) {
            Some(entry) => Err(Error::Dataset(format!(
                "label {} of {} is outside 0..{num_classes}",
                entry.label,
                entry.image_path.display()
            ))),
            None => Ok(()),
        }
    }
}
