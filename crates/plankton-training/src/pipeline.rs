//! End-to-end training run.
//!
//! `prepare_run` does every check that can fail before artifacts exist;
//! `run_training` then creates the run directory and drives the epoch loop.

use burn::{
    module::Module,
    optim::AdamConfig,
    tensor::backend::{AutodiffBackend, Backend},
};
use chrono::Local;
use plankton_core::{write_yaml_snapshot, Device, Error, Result, TrainingConfig};
use plankton_dataset::{
    Augmenter, DatasetStatistics, ImageLoader, Manifest, PlanktonBatcher, PlanktonDataset,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::checkpoint::RunDirectory;
use crate::learner::BurnLearner;
use crate::loss::Criterion;
use crate::memory::{probe_memory, sampler_for};
use crate::model::{ModelSpec, PlanktonModel};
use crate::trainer::{Trainer, TrainerConfig, TrainingSummary};

/// Everything a run needs, passed explicitly instead of through globals.
#[derive(Debug, Clone)]
pub struct RunContext<B: Backend> {
    pub config: TrainingConfig,
    /// Directory holding `sampled_images.csv`
    pub input_dir: PathBuf,
    /// Parent of the timestamped run directory
    pub output_root: PathBuf,
    pub device: B::Device,
    /// Memory domain of `device`
    pub compute_device: Device,
    pub show_progress: bool,
}

/// Validated inputs of a run
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub manifest: Manifest,
    pub statistics: DatasetStatistics,
    /// Normalised inverse-frequency weight per class
    pub class_weights: Vec<f32>,
}

impl PreparedRun {
    /// Manifest images that do not exist on disk
    pub fn missing_images(&self) -> Vec<&Path> {
        self.manifest
            .entries()
            .iter()
            .map(|e| e.image_path.as_path())
            .filter(|p| !p.is_file())
            .collect()
    }
}

/// Load and check the manifest and config without writing anything.
pub fn prepare_run(config: &TrainingConfig, input_dir: &Path) -> Result<PreparedRun> {
    let manifest = Manifest::load_from_dir(input_dir)?;
    config.validate()?;

    if manifest.is_empty() {
        return Err(Error::Dataset(format!(
            "manifest in {} has no rows",
            input_dir.display()
        )));
    }

    let num_classes = config.sampling.num_classes;
    manifest.check_labels(num_classes)?;
    let statistics = DatasetStatistics::from_labels(&manifest.labels(), num_classes)?;
    info!(
        "Loaded {} samples across {} classes",
        statistics.num_samples, statistics.num_classes
    );
    debug!("Class distribution: {:?}", statistics.class_distribution);

    let class_weights = statistics.class_weights()?;
    info!("Class weights: {:?}", class_weights);

    Ok(PreparedRun {
        manifest,
        statistics,
        class_weights,
    })
}

/// Train a model end to end and return the run summary.
pub fn run_training<B: AutodiffBackend>(ctx: RunContext<B>) -> Result<TrainingSummary> {
    let RunContext {
        mut config,
        input_dir,
        output_root,
        device,
        compute_device,
        show_progress,
    } = ctx;

    info!(
        "Starting {} training with {} loss on {}",
        config.autoencoder.architecture, config.autoencoder.loss, compute_device
    );

    let prepared = prepare_run(&config, &input_dir)?;

    let spec = ModelSpec::from_config(&config);
    let model = PlanktonModel::<B>::new(&spec, &device)?;
    info!(
        "Model parameters: {:.2}M",
        model.num_params() as f64 / 1_000_000.0
    );

    let criterion = Criterion::<B>::new(
        config.autoencoder.loss,
        config
            .autoencoder
            .loss
            .needs_class_weights()
            .then_some(prepared.class_weights.as_slice()),
        config.autoencoder.focal,
        &device,
    )?;

    let run_dir = RunDirectory::create(&output_root, Local::now())?;
    config.training_path = Some(run_dir.path().to_path_buf());
    write_yaml_snapshot(&config, &run_dir.config_path())?;

    let sampler = sampler_for(compute_device);
    probe_memory(
        &model,
        &device,
        spec.channels,
        spec.image_size,
        sampler.as_ref(),
    )
    .log();

    let loader = ImageLoader::new(config.sampling.target_size, config.autoencoder.gray);
    let augmenter = Augmenter::new(config.augmentation.clone(), loader.size(), loader.channels());
    if augmenter.is_enabled() {
        debug!("Augmentation: {:?}", config.augmentation);
    }
    let dataset = PlanktonDataset::new(&prepared.manifest, loader);
    let batcher = PlanktonBatcher::<B>::new(&loader, augmenter, config.seed);

    let learning_rate = config.autoencoder.learning_rate;
    let mut learner = BurnLearner::new(model, criterion, AdamConfig::new().init(), learning_rate);

    let mut trainer_config = TrainerConfig::from(&config);
    trainer_config.show_progress = show_progress;
    let mut trainer = Trainer::new(trainer_config);

    trainer.run(&dataset, &batcher, &mut learner, &run_dir, &device)
}
