//! Training infrastructure for plankton autoencoders and classifiers.
//!
//! This crate provides:
//! - Model architectures (convolutional autoencoder, ResNet-18 style backbone)
//! - Loss functions including weighted cross-entropy and focal loss
//! - The epoch loop with periodic checkpoints and loss plots
//! - A one-shot memory probe around a forward pass

pub mod checkpoint;
pub mod learner;
pub mod loss;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod plot;
pub mod trainer;

pub use checkpoint::{RunDirectory, TrainingState};
pub use learner::BurnLearner;
pub use loss::{Criterion, FocalLoss, Target};
pub use memory::{probe_memory, sampler_for, MemoryReport, MemorySampler, ProbeOutcome};
pub use model::{ModelOutput, ModelSpec, PlanktonModel};
pub use pipeline::{prepare_run, run_training, PreparedRun, RunContext};
pub use plot::plot_loss;
pub use trainer::{LossHistory, TrainStep, Trainer, TrainerConfig, TrainingPhase, TrainingSummary};
