//! Training criteria.
//!
//! `Criterion` is built once from the configured `LossKind` and pairs the
//! model output with the right target kind: class labels for the
//! classification losses and the input batch for the reconstruction loss.

use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig, MseLoss, Reduction},
    tensor::{activation::log_softmax, backend::Backend, Int, Tensor},
};
use plankton_core::{Error, FocalConfig, LossKind, Result};

use crate::model::ModelOutput;

/// Training target for one batch
#[derive(Debug, Clone)]
pub enum Target<B: Backend> {
    /// The input batch itself
    Reconstruction(Tensor<B, 4>),
    /// Class indices `[batch]`
    Labels(Tensor<B, 1, Int>),
}

/// Focal loss: `alpha * (1 - p_t)^gamma * CE`, averaged over the batch.
#[derive(Debug, Clone, Copy)]
pub struct FocalLoss {
    pub alpha: f64,
    pub gamma: f64,
}

impl FocalLoss {
    pub fn new(config: FocalConfig) -> Self {
        Self {
            alpha: config.alpha,
            gamma: config.gamma,
        }
    }

    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [batch, _] = logits.dims();
        let log_probs = log_softmax(logits, 1);
        let log_pt: Tensor<B, 1> = log_probs
            .gather(1, targets.reshape([batch, 1]))
            .reshape([batch]);
        let pt = log_pt.clone().exp();
        let modulating = pt.neg().add_scalar(1.0).powf_scalar(self.gamma);

        (modulating * log_pt.neg()).mul_scalar(self.alpha).mean()
    }
}

/// Loss function selected for a run
#[derive(Debug)]
pub enum Criterion<B: Backend> {
    CrossEntropy(CrossEntropyLoss<B>),
    WeightedCrossEntropy(CrossEntropyLoss<B>),
    Focal(FocalLoss),
    Mse(MseLoss),
}

impl<B: Backend> Criterion<B> {
    /// Build the criterion for `kind`.
    ///
    /// `class_weights` is only read for `cross_entropy_weight` and must then
    /// hold one weight per class.
    pub fn new(
        kind: LossKind,
        class_weights: Option<&[f32]>,
        focal: FocalConfig,
        device: &B::Device,
    ) -> Result<Self> {
        let criterion = match kind {
            LossKind::CrossEntropy => Criterion::CrossEntropy(CrossEntropyLossConfig::new().init(device)),
            LossKind::CrossEntropyWeight => {
                let weights = class_weights.ok_or_else(|| {
                    Error::Config("cross_entropy_weight needs class weights".to_string())
                })?;
                if weights.is_empty() {
                    return Err(Error::Config("class weight vector is empty".to_string()));
                }
                Criterion::WeightedCrossEntropy(
                    CrossEntropyLossConfig::new()
                        .with_weights(Some(weights.to_vec()))
                        .init(device),
                )
            }
            LossKind::Focal => Criterion::Focal(FocalLoss::new(focal)),
            LossKind::Mse => Criterion::Mse(MseLoss::new()),
        };
        Ok(criterion)
    }

    /// Scalar loss for one batch.
    pub fn forward(&self, output: ModelOutput<B>, target: Target<B>) -> Result<Tensor<B, 1>> {
        match (self, output, target) {
            (Criterion::CrossEntropy(ce), ModelOutput::Logits(logits), Target::Labels(labels))
            | (
                Criterion::WeightedCrossEntropy(ce),
                ModelOutput::Logits(logits),
                Target::Labels(labels),
            ) => Ok(ce.forward(logits, labels)),
            (Criterion::Focal(focal), ModelOutput::Logits(logits), Target::Labels(labels)) => {
                Ok(focal.forward(logits, labels))
            }
            (Criterion::Mse(mse), ModelOutput::Reconstruction(x), Target::Reconstruction(y)) => {
                Ok(mse.forward(x, y, Reduction::Mean))
            }
            (criterion, output, target) => Err(Error::Training(format!(
                "{} cannot score {} against {}",
                criterion.name(),
                output_kind(&output),
                target_kind(&target)
            ))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Criterion::CrossEntropy(_) => "cross_entropy",
            Criterion::WeightedCrossEntropy(_) => "cross_entropy_weight",
            Criterion::Focal(_) => "focal",
            Criterion::Mse(_) => "mse",
        }
    }
}

fn output_kind<B: Backend>(output: &ModelOutput<B>) -> &'static str {
    match output {
        ModelOutput::Reconstruction(_) => "a reconstruction",
        ModelOutput::Logits(_) => "logits",
    }
}

fn target_kind<B: Backend>(target: &Target<B>) -> &'static str {
    match target {
        Target::Reconstruction(_) => "an image target",
        Target::Labels(_) => "class labels",
    }
}
