//! Epoch loop for autoencoder and classifier training.
//!
//! This module provides:
//! - The `TrainStep` capability the loop drives (forward, loss, backward, step)
//! - Per-epoch shuffling, batching and loss averaging
//! - Loss curve and history refresh after every epoch
//! - Periodic and final weight checkpoints

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::{backend::Backend, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use plankton_core::{Architecture, Error, LossKind, Result, TrainingConfig};
use plankton_dataset::{PlanktonBatch, PlanktonBatcher, PlanktonItem};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::checkpoint::{is_checkpoint_epoch, write_loss_history, RunDirectory, TrainingState};
use crate::loss::Target;
use crate::plot::plot_loss;

/// One optimisation step on a batch, plus weight persistence.
pub trait TrainStep<B: Backend> {
    /// Forward, loss, backward and parameter update. Returns the batch loss.
    fn step(&mut self, images: Tensor<B, 4>, target: Target<B>) -> Result<f64>;

    /// Persist current weights under `stem` and return the written path.
    fn save_weights(&self, stem: &Path) -> Result<PathBuf>;
}

/// Configuration for the trainer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub num_epochs: usize,
    pub batch_size: usize,
    pub save_frequency: usize,
    pub seed: u64,
    /// Reconstruction architectures train against their own input
    pub architecture: Architecture,
    pub loss: LossKind,
    pub show_progress: bool,
}

impl From<&TrainingConfig> for TrainerConfig {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            num_epochs: config.autoencoder.num_epochs,
            batch_size: config.autoencoder.batch_size,
            save_frequency: config.autoencoder.save_every_n_epochs,
            seed: config.seed,
            architecture: config.autoencoder.architecture,
            loss: config.autoencoder.loss,
            show_progress: true,
        }
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Initializing,
    EpochRunning { epoch: usize },
    BatchRunning { epoch: usize, batch: usize },
    Plotting { epoch: usize },
    Checkpointing { epoch: usize },
    Completed,
    Failed,
}

/// Append-only per-epoch average loss
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossHistory {
    values: Vec<f64>,
}

impl LossHistory {
    pub fn push(&mut self, loss: f64) {
        self.values.push(loss);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub loss_history: Vec<f64>,
    pub checkpoints: Vec<PathBuf>,
    pub final_weights: PathBuf,
    pub loss_plot: PathBuf,
}

pub struct Trainer {
    config: TrainerConfig,
    phase: TrainingPhase,
    history: LossHistory,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            phase: TrainingPhase::Initializing,
            history: LossHistory::default(),
        }
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    /// Run every epoch, then save the final weights.
    ///
    /// Any failing batch, checkpoint or plot aborts the run and leaves the
    /// trainer in `Failed`.
    pub fn run<B, D, S>(
        &mut self,
        dataset: &D,
        batcher: &PlanktonBatcher<B>,
        learner: &mut S,
        run_dir: &RunDirectory,
        device: &B::Device,
    ) -> Result<TrainingSummary>
    where
        B: Backend,
        D: Dataset<PlanktonItem>,
        S: TrainStep<B>,
    {
        let result = self.run_epochs(dataset, batcher, learner, run_dir, device);
        if result.is_err() {
            self.phase = TrainingPhase::Failed;
        }
        result
    }

    fn run_epochs<B, D, S>(
        &mut self,
        dataset: &D,
        batcher: &PlanktonBatcher<B>,
        learner: &mut S,
        run_dir: &RunDirectory,
        device: &B::Device,
    ) -> Result<TrainingSummary>
    where
        B: Backend,
        D: Dataset<PlanktonItem>,
        S: TrainStep<B>,
    {
        if dataset.is_empty() {
            return Err(Error::Dataset("training dataset is empty".to_string()));
        }
        if self.config.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }

        let num_epochs = self.config.num_epochs;
        let num_batches = dataset.len().div_ceil(self.config.batch_size);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let reconstruction = self.config.architecture.is_reconstruction();
        let mut state = TrainingState::new(self.config.architecture, self.config.loss, num_epochs);
        let mut checkpoints = Vec::new();

        info!(
            "Training {} with {} loss: {} samples, {} batches per epoch, {} epochs",
            self.config.architecture,
            self.config.loss,
            dataset.len(),
            num_batches,
            num_epochs
        );

        for epoch in 1..=num_epochs {
            self.phase = TrainingPhase::EpochRunning { epoch };
            let progress = self.progress_bar(num_batches as u64, epoch);

            let mut indices: Vec<usize> = (0..dataset.len()).collect();
            indices.shuffle(&mut rng);

            let mut running_loss = 0.0f64;
            for (batch_index, chunk) in indices.chunks(self.config.batch_size).enumerate() {
                self.phase = TrainingPhase::BatchRunning {
                    epoch,
                    batch: batch_index + 1,
                };

                let batch = load_batch(dataset, batcher, chunk, device)?;
                let target = if reconstruction {
                    Target::Reconstruction(batch.images.clone())
                } else {
                    Target::Labels(batch.labels)
                };

                let loss = learner.step(batch.images, target)?;
                if !loss.is_finite() {
                    return Err(Error::Training(format!(
                        "non-finite loss {loss} at epoch {epoch}, batch {}",
                        batch_index + 1
                    )));
                }
                running_loss += loss;
                progress.inc(1);
            }
            progress.finish_and_clear();

            let average = running_loss / num_batches as f64;
            self.history.push(average);
            info!("Epoch [{}/{}] - Loss: {:.4}", epoch, num_epochs, average);

            self.phase = TrainingPhase::Plotting { epoch };
            plot_loss(self.history.values(), epoch, run_dir.path())?;
            write_loss_history(self.history.values(), &run_dir.loss_history_path())?;

            state.epochs_completed = epoch;
            state.loss_history = self.history.values().to_vec();

            if is_checkpoint_epoch(epoch, self.config.save_frequency) {
                self.phase = TrainingPhase::Checkpointing { epoch };
                let path = learner.save_weights(&run_dir.epoch_weights_stem(epoch))?;
                info!("Saved checkpoint {}", path.display());
                state.last_weights = Some(path.clone());
                state.save(&run_dir.training_state_path())?;
                checkpoints.push(path);
            }
        }

        self.phase = TrainingPhase::Checkpointing { epoch: num_epochs };
        let final_weights = learner.save_weights(&run_dir.final_weights_stem())?;
        info!("Final model saved to {}", final_weights.display());

        self.phase = TrainingPhase::Plotting { epoch: num_epochs };
        let loss_plot = plot_loss(self.history.values(), num_epochs, run_dir.path())?;

        state.last_weights = Some(final_weights.clone());
        state.completed = true;
        state.save(&run_dir.training_state_path())?;

        self.phase = TrainingPhase::Completed;
        Ok(TrainingSummary {
            loss_history: self.history.values().to_vec(),
            checkpoints,
            final_weights,
            loss_plot,
        })
    }

    fn progress_bar(&self, len: u64, epoch: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix} [{bar:40.cyan/blue}] {pos}/{len} batches ({eta})")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb.set_prefix(format!("Epoch {}/{}", epoch, self.config.num_epochs));
        pb
    }
}

/// Decode the items at `indices` in parallel and stack them into a batch.
fn load_batch<B, D>(
    dataset: &D,
    batcher: &PlanktonBatcher<B>,
    indices: &[usize],
    device: &B::Device,
) -> Result<PlanktonBatch<B>>
where
    B: Backend,
    D: Dataset<PlanktonItem>,
{
    let items: Vec<Option<PlanktonItem>> = indices.par_iter().map(|&i| dataset.get(i)).collect();

    let items = items
        .into_iter()
        .zip(indices)
        .map(|(item, &index)| {
            item.ok_or_else(|| Error::Dataset(format!("failed to load sample {index}")))
        })
        .collect::<Result<Vec<_>>>()?;

    debug!("Loaded batch of {} items", items.len());
    Ok(batcher.batch(items, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;
    use chrono::Local;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use plankton_core::{AugmentationConfig, ImageSize};
    use plankton_dataset::{Augmenter, ImageLoader};
    use std::fs;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    const SIZE: usize = 4;

    /// Records what the loop hands over and returns scripted losses.
    struct RecordingStep {
        losses: Vec<f64>,
        calls: usize,
        batch_sizes: Vec<usize>,
        reconstruction_targets_match: Vec<bool>,
        label_targets: usize,
    }

    impl RecordingStep {
        fn new(losses: Vec<f64>) -> Self {
            Self {
                losses,
                calls: 0,
                batch_sizes: Vec::new(),
                reconstruction_targets_match: Vec::new(),
                label_targets: 0,
            }
        }
    }

    impl TrainStep<TestBackend> for RecordingStep {
        fn step(&mut self, images: Tensor<TestBackend, 4>, target: Target<TestBackend>) -> Result<f64> {
            self.batch_sizes.push(images.dims()[0]);
            match target {
                Target::Reconstruction(expected) => {
                    let same = images.into_data() == expected.into_data();
                    self.reconstruction_targets_match.push(same);
                }
                Target::Labels(_) => self.label_targets += 1,
            }
            let loss = self.losses[self.calls % self.losses.len()];
            self.calls += 1;
            Ok(loss)
        }

        fn save_weights(&self, stem: &Path) -> Result<PathBuf> {
            let path = stem.with_extension("mpk");
            fs::write(&path, b"weights")?;
            Ok(path)
        }
    }

    struct FailingStep;

    impl TrainStep<TestBackend> for FailingStep {
        fn step(&mut self, _: Tensor<TestBackend, 4>, _: Target<TestBackend>) -> Result<f64> {
            Err(Error::Training("device lost".to_string()))
        }

        fn save_weights(&self, stem: &Path) -> Result<PathBuf> {
            Ok(stem.to_path_buf())
        }
    }

    fn dataset(n: usize) -> InMemDataset<PlanktonItem> {
        let items = (0..n)
            .map(|i| PlanktonItem {
                image: vec![i as f32 / n as f32; SIZE * SIZE],
                label: i % 2,
                id: format!("item{i}"),
            })
            .collect();
        InMemDataset::new(items)
    }

    fn batcher() -> PlanktonBatcher<TestBackend> {
        let loader = ImageLoader::new(ImageSize::square(SIZE), true);
        let augmenter = Augmenter::new(AugmentationConfig::none(), loader.size(), 1);
        PlanktonBatcher::new(&loader, augmenter, 7)
    }

    fn trainer_config(num_epochs: usize, save_frequency: usize, reconstruction: bool) -> TrainerConfig {
        let (architecture, loss) = if reconstruction {
            (Architecture::ConvAutoencoder, LossKind::Mse)
        } else {
            (Architecture::Resnet18, LossKind::CrossEntropy)
        };
        TrainerConfig {
            num_epochs,
            batch_size: 4,
            save_frequency,
            seed: 7,
            architecture,
            loss,
            show_progress: false,
        }
    }

    fn run_dir(temp: &TempDir) -> RunDirectory {
        RunDirectory::create(temp.path(), Local::now()).unwrap()
    }

    #[test]
    fn test_history_and_checkpoint_cadence() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let run_dir = run_dir(&temp);
        let mut step = RecordingStep::new(vec![0.5]);
        let mut trainer = Trainer::new(trainer_config(12, 5, true));

        let summary = trainer.run(&dataset(10), &batcher(), &mut step, &run_dir, &NdArrayDevice::Cpu)?;

        assert_eq!(summary.loss_history.len(), 12);
        assert_eq!(trainer.phase(), TrainingPhase::Completed);
        assert_eq!(
            summary.checkpoints,
            vec![
                run_dir.path().join("model_weights_epoch_5.mpk"),
                run_dir.path().join("model_weights_epoch_10.mpk"),
            ]
        );
        assert!(run_dir.path().join("model_weights_final.mpk").exists());
        assert!(!run_dir.path().join("model_weights_epoch_12.mpk").exists());
        assert!(summary.loss_plot.exists());
        assert!(run_dir.loss_history_path().exists());

        let state: TrainingState =
            serde_json::from_str(&fs::read_to_string(run_dir.training_state_path())?)?;
        assert!(state.completed);
        assert_eq!(state.epochs_completed, 12);
        assert_eq!(state.architecture, Architecture::ConvAutoencoder);
        assert_eq!(state.loss, LossKind::Mse);
        Ok(())
    }

    #[test]
    fn test_batches_cover_dataset_each_epoch() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mut step = RecordingStep::new(vec![1.0]);
        let mut trainer = Trainer::new(trainer_config(2, 10, true));

        trainer.run(&dataset(10), &batcher(), &mut step, &run_dir(&temp), &NdArrayDevice::Cpu)?;

        // 10 samples with batch size 4: 4 + 4 + 2, twice
        assert_eq!(step.batch_sizes, vec![4, 4, 2, 4, 4, 2]);
        Ok(())
    }

    #[test]
    fn test_epoch_loss_is_mean_of_batch_losses() -> Result<()> {
        let temp = TempDir::new().unwrap();
        // Three batches per epoch: (1 + 2 + 3) / 3, then (4 + 5 + 6) / 3
        let mut step = RecordingStep::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut trainer = Trainer::new(trainer_config(2, 10, true));

        let summary =
            trainer.run(&dataset(10), &batcher(), &mut step, &run_dir(&temp), &NdArrayDevice::Cpu)?;

        assert_eq!(summary.loss_history, vec![2.0, 5.0]);
        assert_eq!(trainer.history().values(), &[2.0, 5.0]);
        Ok(())
    }

    #[test]
    fn test_reconstruction_target_is_input() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mut step = RecordingStep::new(vec![0.1]);
        let mut trainer = Trainer::new(trainer_config(1, 1, true));

        trainer.run(&dataset(6), &batcher(), &mut step, &run_dir(&temp), &NdArrayDevice::Cpu)?;

        assert_eq!(step.reconstruction_targets_match, vec![true, true]);
        assert_eq!(step.label_targets, 0);
        Ok(())
    }

    #[test]
    fn test_classifier_uses_labels() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mut step = RecordingStep::new(vec![0.1]);
        let mut trainer = Trainer::new(trainer_config(1, 1, false));

        trainer.run(&dataset(6), &batcher(), &mut step, &run_dir(&temp), &NdArrayDevice::Cpu)?;

        assert!(step.reconstruction_targets_match.is_empty());
        assert_eq!(step.label_targets, 2);
        Ok(())
    }

    #[test]
    fn test_step_failure_aborts_without_final_weights() {
        let temp = TempDir::new().unwrap();
        let run_dir = run_dir(&temp);
        let mut trainer = Trainer::new(trainer_config(3, 1, true));

        let result = trainer.run(&dataset(4), &batcher(), &mut FailingStep, &run_dir, &NdArrayDevice::Cpu);

        assert!(matches!(result, Err(Error::Training(_))));
        assert_eq!(trainer.phase(), TrainingPhase::Failed);
        assert!(trainer.history().values().is_empty());
        assert!(!run_dir.path().join("model_weights_final.mpk").exists());
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let temp = TempDir::new().unwrap();
        let mut step = RecordingStep::new(vec![f64::NAN]);
        let mut trainer = Trainer::new(trainer_config(1, 1, true));

        let result = trainer.run(&dataset(4), &batcher(), &mut step, &run_dir(&temp), &NdArrayDevice::Cpu);
        assert!(matches!(result, Err(Error::Training(_))));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let temp = TempDir::new().unwrap();
        let mut step = RecordingStep::new(vec![1.0]);
        let mut trainer = Trainer::new(trainer_config(1, 1, true));

        let result = trainer.run(&dataset(0), &batcher(), &mut step, &run_dir(&temp), &NdArrayDevice::Cpu);
        assert!(matches!(result, Err(Error::Dataset(_))));
        assert_eq!(step.calls, 0);
    }

    #[test]
    fn test_unloadable_item_aborts() {
        struct Holey;

        impl Dataset<PlanktonItem> for Holey {
            fn get(&self, index: usize) -> Option<PlanktonItem> {
                (index != 2).then(|| PlanktonItem {
                    image: vec![0.0; SIZE * SIZE],
                    label: 0,
                    id: index.to_string(),
                })
            }

            fn len(&self) -> usize {
                4
            }
        }

        let temp = TempDir::new().unwrap();
        let mut step = RecordingStep::new(vec![1.0]);
        let mut trainer = Trainer::new(trainer_config(1, 1, true));

        let result = trainer.run(&Holey, &batcher(), &mut step, &run_dir(&temp), &NdArrayDevice::Cpu);
        assert!(matches!(result, Err(Error::Dataset(_))));
    }

    #[test]
    fn test_loss_history_append_only() {
        let mut history = LossHistory::default();
        assert!(history.values().is_empty());
        history.push(0.5);
        history.push(0.25);
        assert_eq!(history.values(), &[0.5, 0.25]);
    }

    #[test]
    fn test_trainer_config_keeps_typed_selection() {
        let mut config = TrainingConfig::default();
        config.autoencoder.architecture = Architecture::Resnet18;
        config.autoencoder.loss = LossKind::Focal;

        let trainer_config = TrainerConfig::from(&config);
        assert_eq!(trainer_config.architecture, Architecture::Resnet18);
        assert_eq!(trainer_config.loss, LossKind::Focal);
        assert!(!trainer_config.architecture.is_reconstruction());
    }
}
