//! Burn implementation of a training step.

use burn::{
    module::Module,
    optim::{GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor},
};
use plankton_core::{Error, Result};
use std::path::{Path, PathBuf};

use crate::loss::{Criterion, Target};
use crate::model::PlanktonModel;
use crate::trainer::TrainStep;

/// Model, criterion and optimizer bound together for the epoch loop.
pub struct BurnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PlanktonModel<B>, B>,
{
    model: PlanktonModel<B>,
    criterion: Criterion<B>,
    optimizer: O,
    learning_rate: f64,
}

impl<B, O> BurnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PlanktonModel<B>, B>,
{
    pub fn new(model: PlanktonModel<B>, criterion: Criterion<B>, optimizer: O, learning_rate: f64) -> Self {
        Self {
            model,
            criterion,
            optimizer,
            learning_rate,
        }
    }
}

impl<B, O> TrainStep<B> for BurnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PlanktonModel<B>, B>,
{
    fn step(&mut self, images: Tensor<B, 4>, target: Target<B>) -> Result<f64> {
        let (output, _latent) = self.model.forward(images);
        let loss = self.criterion.forward(output, target)?;
        let loss_value: f64 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);

        Ok(loss_value)
    }

    fn save_weights(&self, stem: &Path) -> Result<PathBuf> {
        let recorder = CompactRecorder::new();
        self.model
            .clone()
            .save_file(stem.to_path_buf(), &recorder)
            .map_err(|e| Error::Model(format!("Failed to save weights to {}: {:?}", stem.display(), e)))?;
        Ok(stem.with_extension("mpk"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelOutput, ModelSpec};
    use burn::backend::Autodiff;
    use burn::optim::AdamConfig;
    use burn::tensor::{Int, TensorData};
    use burn_ndarray::{NdArray, NdArrayDevice};
    use plankton_core::{Architecture, FocalConfig, ImageSize, LossKind};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn autoencoder_spec() -> ModelSpec {
        ModelSpec {
            architecture: Architecture::ConvAutoencoder,
            num_classes: 2,
            latent_dim: 8,
            channels: 1,
            image_size: ImageSize::square(8),
        }
    }

    fn learner(
        spec: &ModelSpec,
        kind: LossKind,
    ) -> BurnLearner<TestBackend, impl Optimizer<PlanktonModel<TestBackend>, TestBackend>> {
        let device = NdArrayDevice::Cpu;
        let model = PlanktonModel::new(spec, &device).unwrap();
        let criterion = Criterion::new(kind, None, FocalConfig::default(), &device).unwrap();
        BurnLearner::new(model, criterion, AdamConfig::new().init(), 1e-2)
    }

    #[test]
    fn test_reconstruction_loss_decreases() {
        let device = NdArrayDevice::Cpu;
        let mut learner = learner(&autoencoder_spec(), LossKind::Mse);
        let images = Tensor::<TestBackend, 4>::full([2, 1, 8, 8], 0.25, &device);

        let first = learner
            .step(images.clone(), Target::Reconstruction(images.clone()))
            .unwrap();
        let mut last = first;
        for _ in 0..30 {
            last = learner
                .step(images.clone(), Target::Reconstruction(images.clone()))
                .unwrap();
        }

        assert!(first.is_finite() && last.is_finite());
        assert!(last < first, "loss went from {first} to {last}");
    }

    #[test]
    fn test_wrong_target_kind_is_error() {
        let device = NdArrayDevice::Cpu;
        let mut learner = learner(&autoencoder_spec(), LossKind::Mse);
        let images = Tensor::<TestBackend, 4>::zeros([2, 1, 8, 8], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 1], [2]), &device);

        let result = learner.step(images, Target::Labels(labels));
        assert!(matches!(result, Err(Error::Training(_))));
    }

    #[test]
    fn test_save_weights_appends_extension() {
        let temp_dir = TempDir::new().unwrap();
        let learner = learner(&autoencoder_spec(), LossKind::Mse);

        let path = learner
            .save_weights(&temp_dir.path().join("model_weights_epoch_5"))
            .unwrap();
        assert_eq!(path, temp_dir.path().join("model_weights_epoch_5.mpk"));
        assert!(path.exists());
    }

    #[test]
    fn test_step_keeps_model_usable() {
        let device = NdArrayDevice::Cpu;
        let mut learner = learner(&autoencoder_spec(), LossKind::Mse);
        let images = Tensor::<TestBackend, 4>::ones([1, 1, 8, 8], &device);
        learner
            .step(images.clone(), Target::Reconstruction(images.clone()))
            .unwrap();

        let (output, latent) = learner.model.forward(images);
        assert!(matches!(output, ModelOutput::Reconstruction(ref x) if x.dims() == [1, 1, 8, 8]));
        assert_eq!(latent.dims(), [1, 8]);
    }
}
