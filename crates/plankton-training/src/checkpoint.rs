//! Run directory layout and checkpoint bookkeeping.
//!
//! This module provides:
//! - Creation of the timestamped run directory (never reusing one)
//! - File naming for periodic and final weights
//! - The checkpoint cadence rule
//! - Training state and loss history persistence

use chrono::{DateTime, Local, Utc};
use plankton_core::{Architecture, Error, LossKind, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of every run directory name
pub const RUN_DIR_PREFIX: &str = "autoencoder_training";
/// Snapshot of the configuration used for the run
pub const CONFIG_FILE_NAME: &str = "config.yaml";
/// Per-epoch average loss as CSV
pub const LOSS_HISTORY_FILE_NAME: &str = "loss_history.csv";
/// Latest training state as JSON
pub const TRAINING_STATE_FILE_NAME: &str = "training_state.json";
/// Stem of the weights saved when training completes
pub const FINAL_WEIGHTS_STEM: &str = "model_weights_final";

/// Directory holding every artifact of one training run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// `autoencoder_training<YYYYmmddHHMMSS>` for `time`.
    pub fn name_for(time: DateTime<Local>) -> String {
        format!("{RUN_DIR_PREFIX}{}", time.format("%Y%m%d%H%M%S"))
    }

    /// Create a new run directory under `output_root`.
    ///
    /// Fails with `AlreadyExists` if the directory is already present, in
    /// which case nothing inside it is touched.
    pub fn create(output_root: &Path, time: DateTime<Local>) -> Result<Self> {
        fs::create_dir_all(output_root)?;

        let path = output_root.join(Self::name_for(time));
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(format!(
                    "run directory {} already exists",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!("Created run directory {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE_NAME)
    }

    /// Weights path for `epoch` (1-based), without the recorder extension
    pub fn epoch_weights_stem(&self, epoch: usize) -> PathBuf {
        self.path.join(format!("model_weights_epoch_{epoch}"))
    }

    /// Final weights path, without the recorder extension
    pub fn final_weights_stem(&self) -> PathBuf {
        self.path.join(FINAL_WEIGHTS_STEM)
    }

    pub fn loss_history_path(&self) -> PathBuf {
        self.path.join(LOSS_HISTORY_FILE_NAME)
    }

    pub fn training_state_path(&self) -> PathBuf {
        self.path.join(TRAINING_STATE_FILE_NAME)
    }
}

/// Whether weights are saved after `epoch` (1-based).
pub fn is_checkpoint_epoch(epoch: usize, save_every: usize) -> bool {
    save_every > 0 && epoch > 0 && epoch % save_every == 0
}

/// Progress snapshot written next to the weights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingState {
    pub architecture: Architecture,
    pub loss: LossKind,
    pub epochs_completed: usize,
    pub num_epochs: usize,
    pub loss_history: Vec<f64>,
    pub last_weights: Option<PathBuf>,
    pub completed: bool,
    pub timestamp: String,
}

impl TrainingState {
    pub fn new(architecture: Architecture, loss: LossKind, num_epochs: usize) -> Self {
        Self {
            architecture,
            loss,
            epochs_completed: 0,
            num_epochs,
            loss_history: Vec::new(),
            last_weights: None,
            completed: false,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Save state to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize training state: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct LossRow {
    epoch: usize,
    loss: f64,
}

/// Rewrite the loss history CSV with one row per completed epoch.
pub fn write_loss_history(loss_values: &[f64], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (i, &loss) in loss_values.iter().enumerate() {
        writer.serialize(LossRow { epoch: i + 1, loss })?;
    }
    writer.flush()?;
    Ok(())
}
