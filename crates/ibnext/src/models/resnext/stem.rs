//! # Input Stems
//!
//! The dataset-specific entry of the network: cifar-scale inputs get a
//! single 3x3 conv cell; image-scale datasets get the deep stem — three
//! consecutive 3x3 conv cells and a stride-2 max-pool, replacing the
//! classic 7x7 conv.

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::conv_norm_act::{
    ConvNormAct2d, ConvNormAct2dConfig, ConvNormAct2dMeta,
};
use crate::layers::norm::FeatureNormConfig;
use crate::models::resnext::util::stride_div_resolution;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::{Backend, Config, Module, Tensor};

/// The dataset families the stems are shaped for.
#[derive(Config, Debug, PartialEq)]
pub enum DatasetKind {
    /// 32x32 inputs; single-conv stem.
    Cifar10,

    /// ImageNet-scale inputs; deep stem.
    ImageNet,

    /// VGGFace2-scale inputs; deep stem.
    VggFace,

    /// MS-Celeb-1M-scale inputs; deep stem.
    MsFace,
}

impl core::str::FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cifar10" => Ok(Self::Cifar10),
            "imagenet" => Ok(Self::ImageNet),
            "vggface" => Ok(Self::VggFace),
            "msface" => Ok(Self::MsFace),
            _ => Err(format!("unsupported dataset type: {s:?}")),
        }
    }
}

impl DatasetKind {
    /// Build the stem config for this dataset kind.
    pub fn stem_config(
        &self,
        in_channels: usize,
        stem_width: usize,
        activation: ActivationConfig,
    ) -> StemConfig {
        match self {
            DatasetKind::Cifar10 => CifarStemConfig::new(stem_width)
                .with_in_channels(in_channels)
                .with_activation(activation)
                .into(),
            DatasetKind::ImageNet | DatasetKind::VggFace | DatasetKind::MsFace => {
                DeepStemConfig::new(stem_width)
                    .with_in_channels(in_channels)
                    .with_activation(activation)
                    .into()
            }
        }
    }
}

/// [`Stem`] Meta API.
pub trait StemMeta {
    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The number of output channels.
    fn out_channels(&self) -> usize;

    /// The effective stride of the stem.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// The input must be a multiple of the stride.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the stride.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_resolution(input_resolution, self.stride())
    }
}

/// Cifar-scale stem config: one 3x3 stride-1 conv cell.
#[derive(Config, Debug)]
pub struct CifarStemConfig {
    /// The width of the stem conv.
    pub stem_width: usize,

    /// The number of input channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// [`crate::layers::activation::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl CifarStemConfig {
    fn cna_config(&self) -> ConvNormAct2dConfig {
        ConvNormAct2dConfig::new(
            Conv2dConfig::new([self.in_channels, self.stem_width], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false),
            FeatureNormConfig::batch(self.stem_width),
        )
        .with_act(self.activation.clone())
    }
}

/// Deep stem config: three 3x3 conv cells (stride 1, 1, 2) and a 3x3
/// stride-2 max-pool.
#[derive(Config, Debug)]
pub struct DeepStemConfig {
    /// The width of the stem convs.
    pub stem_width: usize,

    /// The number of input channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// [`crate::layers::activation::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl DeepStemConfig {
    fn cna_config(
        &self,
        in_channels: usize,
        stride: usize,
    ) -> ConvNormAct2dConfig {
        ConvNormAct2dConfig::new(
            Conv2dConfig::new([in_channels, self.stem_width], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false),
            FeatureNormConfig::batch(self.stem_width),
        )
        .with_act(self.activation.clone())
    }

    /// Initialize a [`DeepStem`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> DeepStem<B> {
        DeepStem {
            cna1: self.cna_config(self.in_channels, 1).init(device),
            cna2: self.cna_config(self.stem_width, 1).init(device),
            cna3: self.cna_config(self.stem_width, 2).init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
        }
    }
}

/// [`Stem`] Configuration.
#[derive(Config, Debug)]
pub enum StemConfig {
    /// A cifar-scale stem.
    Cifar(CifarStemConfig),

    /// A deep stem.
    Deep(DeepStemConfig),
}

impl From<CifarStemConfig> for StemConfig {
    fn from(config: CifarStemConfig) -> Self {
        Self::Cifar(config)
    }
}

impl From<DeepStemConfig> for StemConfig {
    fn from(config: DeepStemConfig) -> Self {
        Self::Deep(config)
    }
}

impl StemMeta for StemConfig {
    fn in_channels(&self) -> usize {
        match self {
            Self::Cifar(config) => config.in_channels,
            Self::Deep(config) => config.in_channels,
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Cifar(config) => config.stem_width,
            Self::Deep(config) => config.stem_width,
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Cifar(_) => 1,
            Self::Deep(_) => 4,
        }
    }
}

impl StemConfig {
    /// Initialize a [`Stem`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Stem<B> {
        match self {
            Self::Cifar(config) => Stem::Cifar(config.cna_config().init(device)),
            Self::Deep(config) => Stem::Deep(config.init(device)),
        }
    }
}

/// Deep stem: three conv cells and a max-pool; effective stride 4.
#[derive(Module, Debug)]
pub struct DeepStem<B: Backend> {
    /// First conv cell; stride 1.
    pub cna1: ConvNormAct2d<B>,
    /// Second conv cell; stride 1.
    pub cna2: ConvNormAct2d<B>,
    /// Third conv cell; stride 2.
    pub cna3: ConvNormAct2d<B>,
    /// 3x3 stride-2 max-pool.
    pub pool: MaxPool2d,
}

impl<B: Backend> DeepStem<B> {
    /// Forward pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.cna1.forward(input);
        let x = self.cna2.forward(x);
        let x = self.cna3.forward(x);
        self.pool.forward(x)
    }
}

/// Input stem wrapper.
///
/// Implements [`StemMeta`].
#[derive(Module, Debug)]
pub enum Stem<B: Backend> {
    /// A cifar-scale stem.
    Cifar(ConvNormAct2d<B>),

    /// A deep stem.
    Deep(DeepStem<B>),
}

impl<B: Backend> StemMeta for Stem<B> {
    fn in_channels(&self) -> usize {
        match self {
            Self::Cifar(cna) => cna.in_channels(),
            Self::Deep(stem) => stem.cna1.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Cifar(cna) => cna.out_channels(),
            Self::Deep(stem) => stem.cna3.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Cifar(_) => 1,
            Self::Deep(_) => 4,
        }
    }
}

impl<B: Backend> Stem<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Cifar(cna) => cna.forward(input),
            Self::Deep(stem) => stem.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use core::str::FromStr;

    #[test]
    fn test_dataset_kind_from_str() {
        assert_eq!(DatasetKind::from_str("cifar10"), Ok(DatasetKind::Cifar10));
        assert_eq!(DatasetKind::from_str("imagenet"), Ok(DatasetKind::ImageNet));
        assert_eq!(DatasetKind::from_str("vggface"), Ok(DatasetKind::VggFace));
        assert_eq!(DatasetKind::from_str("msface"), Ok(DatasetKind::MsFace));

        let err = DatasetKind::from_str("mnist").unwrap_err();
        assert_eq!(err, "unsupported dataset type: \"mnist\"");
    }

    #[test]
    fn test_stem_config() {
        let config = DatasetKind::Cifar10.stem_config(3, 16, ActivationConfig::Relu);
        assert!(matches!(config, StemConfig::Cifar(_)));
        assert_eq!(config.in_channels(), 3);
        assert_eq!(config.out_channels(), 16);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.output_resolution([32, 32]), [32, 32]);

        let config = DatasetKind::ImageNet.stem_config(3, 64, ActivationConfig::Relu);
        assert!(matches!(config, StemConfig::Deep(_)));
        assert_eq!(config.out_channels(), 64);
        assert_eq!(config.stride(), 4);
        assert_eq!(config.output_resolution([224, 224]), [56, 56]);
    }

    #[test]
    fn test_cifar_stem_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let stem: Stem<B> = DatasetKind::Cifar10
            .stem_config(3, 16, ActivationConfig::Relu)
            .init(&device);
        assert_eq!(stem.in_channels(), 3);
        assert_eq!(stem.out_channels(), 16);
        assert_eq!(stem.stride(), 1);

        let input = Tensor::ones([2, 3, 32, 32], &device);
        let output = stem.forward(input);

        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_channels", 16),
                ("out_height", 32),
                ("out_width", 32)
            ],
        );
    }

    #[test]
    fn test_deep_stem_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let stem: Stem<B> = DatasetKind::VggFace
            .stem_config(3, 8, ActivationConfig::Relu)
            .init(&device);
        assert_eq!(stem.in_channels(), 3);
        assert_eq!(stem.out_channels(), 8);
        assert_eq!(stem.stride(), 4);

        let input = Tensor::ones([2, 3, 32, 32], &device);
        let output = stem.forward(input);

        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_channels", 8),
                ("out_height", 8),
                ("out_width", 8)
            ],
        );
    }
}
