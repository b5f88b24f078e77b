//! Model architectures for plankton feature extraction.
//!
//! Implements:
//! - Convolutional autoencoder (reconstruction objective)
//! - ResNet-18 style classifier with a latent projection
//! - Unified `PlanktonModel` interface returning `(output, latent)`

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};
use plankton_core::{Architecture, Error, ImageSize, Result, TrainingConfig};

/// Shape parameters needed to build a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub architecture: Architecture,
    pub num_classes: usize,
    pub latent_dim: usize,
    pub channels: usize,
    pub image_size: ImageSize,
}

impl ModelSpec {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            architecture: config.autoencoder.architecture,
            num_classes: config.sampling.num_classes,
            latent_dim: config.autoencoder.latent_dim,
            channels: config.channels(),
            image_size: config.sampling.target_size,
        }
    }
}

/// Primary model output
#[derive(Debug, Clone)]
pub enum ModelOutput<B: Backend> {
    /// Reconstructed images `[batch, channels, height, width]`
    Reconstruction(Tensor<B, 4>),
    /// Class logits `[batch, num_classes]`
    Logits(Tensor<B, 2>),
}

/// Unified model interface
#[derive(Module, Debug)]
pub struct PlanktonModel<B: Backend> {
    arch: ModelArchitecture<B>,
}

/// Model architecture enum
#[derive(Module, Debug)]
pub enum ModelArchitecture<B: Backend> {
    Autoencoder(ConvAutoencoder<B>),
    ResNet(ResNetCustom<B>),
}

impl<B: Backend> PlanktonModel<B> {
    /// Build the network selected by `spec.architecture`.
    pub fn new(spec: &ModelSpec, device: &B::Device) -> Result<Self> {
        if spec.channels == 0 || spec.latent_dim == 0 {
            return Err(Error::Model(format!(
                "channels and latent_dim must be non-zero, got {} and {}",
                spec.channels, spec.latent_dim
            )));
        }

        let arch = match spec.architecture {
            Architecture::ConvAutoencoder => ModelArchitecture::Autoencoder(ConvAutoencoder::new(
                spec.channels,
                spec.latent_dim,
                spec.image_size,
                device,
            )?),
            Architecture::Resnet18 => {
                if spec.num_classes == 0 {
                    return Err(Error::Model("resnet18 needs at least one class".to_string()));
                }
                ModelArchitecture::ResNet(ResNetCustom::new(
                    spec.channels,
                    spec.latent_dim,
                    spec.num_classes,
                    device,
                ))
            }
        };

        Ok(Self { arch })
    }

    /// Forward pass returning the primary output and the latent code
    pub fn forward(&self, input: Tensor<B, 4>) -> (ModelOutput<B>, Tensor<B, 2>) {
        match &self.arch {
            ModelArchitecture::Autoencoder(model) => {
                let (reconstruction, latent) = model.forward(input);
                (ModelOutput::Reconstruction(reconstruction), latent)
            }
            ModelArchitecture::ResNet(model) => {
                let (logits, latent) = model.forward(input);
                (ModelOutput::Logits(logits), latent)
            }
        }
    }
}

/// Convolutional autoencoder
///
/// Encoder: three 3x3 stride-2 convolutions (C -> 32 -> 64 -> 128) and a
/// linear projection to the latent code. The decoder mirrors it with
/// transposed convolutions and ends in a sigmoid, so height and width must
/// be divisible by 8.
#[derive(Module, Debug)]
pub struct ConvAutoencoder<B: Backend> {
    enc_conv1: Conv2d<B>,
    enc_conv2: Conv2d<B>,
    enc_conv3: Conv2d<B>,
    to_latent: Linear<B>,
    from_latent: Linear<B>,
    dec_conv1: ConvTranspose2d<B>,
    dec_conv2: ConvTranspose2d<B>,
    dec_conv3: ConvTranspose2d<B>,
    activation: Relu,
    feature_height: usize,
    feature_width: usize,
}

const AE_WIDTHS: [usize; 3] = [32, 64, 128];

impl<B: Backend> ConvAutoencoder<B> {
    pub fn new(
        channels: usize,
        latent_dim: usize,
        image_size: ImageSize,
        device: &B::Device,
    ) -> Result<Self> {
        if image_size.height % 8 != 0 || image_size.width % 8 != 0 || image_size.num_pixels() == 0
        {
            return Err(Error::Model(format!(
                "conv_autoencoder needs height and width divisible by 8, got {image_size}"
            )));
        }

        let down = |input: usize, output: usize| {
            Conv2dConfig::new([input, output], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        let up = |input: usize, output: usize| {
            ConvTranspose2dConfig::new([input, output], [3, 3])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_padding_out([1, 1])
                .init(device)
        };

        let [w1, w2, w3] = AE_WIDTHS;
        let feature_height = image_size.height / 8;
        let feature_width = image_size.width / 8;
        let flat = w3 * feature_height * feature_width;

        Ok(Self {
            enc_conv1: down(channels, w1),
            enc_conv2: down(w1, w2),
            enc_conv3: down(w2, w3),
            to_latent: LinearConfig::new(flat, latent_dim).init(device),
            from_latent: LinearConfig::new(latent_dim, flat).init(device),
            dec_conv1: up(w3, w2),
            dec_conv2: up(w2, w1),
            dec_conv3: up(w1, channels),
            activation: Relu::new(),
            feature_height,
            feature_width,
        })
    }

    pub fn encode(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.enc_conv1.forward(input));
        let x = self.activation.forward(self.enc_conv2.forward(x));
        let x = self.activation.forward(self.enc_conv3.forward(x));
        let x: Tensor<B, 2> = x.flatten(1, 3);
        self.to_latent.forward(x)
    }

    pub fn decode(&self, latent: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, _] = latent.dims();
        let x = self.activation.forward(self.from_latent.forward(latent));
        let x: Tensor<B, 4> =
            x.reshape([batch, AE_WIDTHS[2], self.feature_height, self.feature_width]);
        let x = self.activation.forward(self.dec_conv1.forward(x));
        let x = self.activation.forward(self.dec_conv2.forward(x));
        sigmoid(self.dec_conv3.forward(x))
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 2>) {
        let latent = self.encode(input);
        let reconstruction = self.decode(latent.clone());
        (reconstruction, latent)
    }
}

/// Residual block with two 3x3 convolutions
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

/// 1x1 projection on the skip path when the shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> BasicBlock<B> {
    fn new(input: usize, output: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([input, output], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let conv2 = Conv2dConfig::new([output, output], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);

        let downsample = (stride != 1 || input != output).then(|| Downsample {
            conv: Conv2dConfig::new([input, output], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(output).init(device),
        });

        Self {
            conv1,
            bn1: BatchNormConfig::new(output).init(device),
            conv2,
            bn2: BatchNormConfig::new(output).init(device),
            downsample,
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(down) => down.bn.forward(down.conv.forward(input.clone())),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.activation.forward(x + identity)
    }
}

/// ResNet-18 style classifier
///
/// Architecture:
/// - Conv1: 7x7, stride 2, configurable input channels
/// - MaxPool: 3x3, stride 2
/// - 4 residual stages (64, 128, 256, 512), 2 blocks each
/// - Global average pooling
/// - Linear projection to the latent code, then the classifier
#[derive(Module, Debug)]
pub struct ResNetCustom<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    maxpool: MaxPool2d,
    blocks: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    fc_latent: Linear<B>,
    classifier: Linear<B>,
    activation: Relu,
}

const RESNET_WIDTHS: [usize; 4] = [64, 128, 256, 512];

impl<B: Backend> ResNetCustom<B> {
    pub fn new(channels: usize, latent_dim: usize, num_classes: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([channels, RESNET_WIDTHS[0]], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut blocks = Vec::with_capacity(8);
        let mut input = RESNET_WIDTHS[0];
        for (stage, &width) in RESNET_WIDTHS.iter().enumerate() {
            let stride = if stage == 0 { 1 } else { 2 };
            blocks.push(BasicBlock::new(input, width, stride, device));
            blocks.push(BasicBlock::new(width, width, 1, device));
            input = width;
        }

        Self {
            conv1,
            bn1: BatchNormConfig::new(RESNET_WIDTHS[0]).init(device),
            maxpool,
            blocks,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc_latent: LinearConfig::new(RESNET_WIDTHS[3], latent_dim).init(device),
            classifier: LinearConfig::new(latent_dim, num_classes).init(device),
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let mut x = self.maxpool.forward(x);

        for block in &self.blocks {
            x = block.forward(x);
        }

        // [batch, 512, 1, 1] -> [batch, 512]
        let x = self.avgpool.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x: Tensor<B, 2> = x.reshape([batch, channels]);

        let latent = self.fc_latent.forward(x);
        let logits = self.classifier.forward(latent.clone());
        (logits, latent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray;

    fn spec(architecture: Architecture, channels: usize) -> ModelSpec {
        ModelSpec {
            architecture,
            num_classes: 5,
            latent_dim: 16,
            channels,
            image_size: ImageSize::square(16),
        }
    }

    #[test]
    fn test_autoencoder_reconstructs_input_shape() {
        let device = NdArrayDevice::Cpu;
        let model =
            PlanktonModel::<TestBackend>::new(&spec(Architecture::ConvAutoencoder, 1), &device)
                .unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 1, 16, 16], &device);
        let (output, latent) = model.forward(input);

        match output {
            ModelOutput::Reconstruction(x) => assert_eq!(x.dims(), [2, 1, 16, 16]),
            ModelOutput::Logits(_) => panic!("autoencoder produced logits"),
        }
        assert_eq!(latent.dims(), [2, 16]);
    }

    #[test]
    fn test_autoencoder_rectangular_rgb() {
        let device = NdArrayDevice::Cpu;
        let ae = ConvAutoencoder::<TestBackend>::new(3, 8, ImageSize::new(8, 24), &device).unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 8, 24], &device);
        let (reconstruction, latent) = ae.forward(input);
        assert_eq!(reconstruction.dims(), [1, 3, 8, 24]);
        assert_eq!(latent.dims(), [1, 8]);
    }

    #[test]
    fn test_autoencoder_rejects_odd_size() {
        let device = NdArrayDevice::Cpu;
        let mut bad = spec(Architecture::ConvAutoencoder, 1);
        bad.image_size = ImageSize::new(12, 16);
        assert!(PlanktonModel::<TestBackend>::new(&bad, &device).is_err());
    }

    #[test]
    fn test_resnet_outputs_logits() {
        let device = NdArrayDevice::Cpu;
        let model =
            PlanktonModel::<TestBackend>::new(&spec(Architecture::Resnet18, 3), &device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let (output, latent) = model.forward(input);

        match output {
            ModelOutput::Logits(x) => assert_eq!(x.dims(), [2, 5]),
            ModelOutput::Reconstruction(_) => panic!("resnet produced a reconstruction"),
        }
        assert_eq!(latent.dims(), [2, 16]);
    }

    #[test]
    fn test_parameter_counts_differ() {
        let device = NdArrayDevice::Cpu;
        let ae = PlanktonModel::<TestBackend>::new(&spec(Architecture::ConvAutoencoder, 1), &device)
            .unwrap();
        let resnet =
            PlanktonModel::<TestBackend>::new(&spec(Architecture::Resnet18, 1), &device).unwrap();
        assert!(ae.num_params() > 0);
        assert!(resnet.num_params() > ae.num_params());
    }
}
