//! # Basic Residual Unit
//!
//! [`BasicUnit`] is the non-bottleneck residual form: two 3x3
//! convolutions with no grouping and no IBN.
//!
//! [`BasicUnitMeta`] defines a common meta API for [`BasicUnit`]
//! and [`BasicUnitConfig`].

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::conv_norm_act::{
    ConvNormAct2d, ConvNormAct2dConfig, ConvNormAct2dMeta,
};
use crate::layers::norm::FeatureNormConfig;
use crate::models::resnext::shortcut::{ProjectionShortcut, ProjectionShortcutConfig};
use crate::models::resnext::util::stride_div_resolution;
use burn::nn::conv::Conv2dConfig;
use burn::nn::PaddingConfig2d;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BasicUnit`] Meta trait.
pub trait BasicUnitMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// The stride of the unit.
    ///
    /// Affects shortcut behavior.
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

/// [`BasicUnit`] Config.
///
/// Implements [`BasicUnitMeta`].
#[derive(Config, Debug)]
pub struct BasicUnitConfig {
    /// The number of input feature planes.
    pub in_planes: usize,

    /// The number of output feature planes.
    pub out_planes: usize,

    /// The stride of the unit.
    #[config(default = 1)]
    pub stride: usize,

    /// [`crate::layers::activation::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl BasicUnitMeta for BasicUnitConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.out_planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BasicUnitConfig {
    /// Initialize a [`BasicUnit`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicUnit<B> {
        let shortcut = if self.stride != 1 || self.in_planes != self.out_planes {
            Some(
                ProjectionShortcutConfig::new(self.in_planes, self.out_planes)
                    .with_stride(self.stride)
                    .init(device),
            )
        } else {
            None
        };

        let cna1 = ConvNormAct2dConfig::new(
            Conv2dConfig::new([self.in_planes, self.out_planes], [3, 3])
                .with_stride([self.stride, self.stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false),
            FeatureNormConfig::batch(self.out_planes),
        )
        .with_act(self.activation.clone());

        let cna2 = ConvNormAct2dConfig::new(
            Conv2dConfig::new([self.out_planes, self.out_planes], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false),
            FeatureNormConfig::batch(self.out_planes),
        )
        .with_act(self.activation.clone());

        BasicUnit {
            shortcut,
            cna1: cna1.init(device),
            cna2: cna2.init(device),
        }
    }
}

/// Basic residual unit.
///
/// Implements [`BasicUnitMeta`].
#[derive(Module, Debug)]
pub struct BasicUnit<B: Backend> {
    /// Optional projection layer for the residual connection.
    pub shortcut: Option<ProjectionShortcut<B>>,

    /// First conv/norm/act cell; carries the stride.
    pub cna1: ConvNormAct2d<B>,

    /// Second conv/norm/act cell; its activation runs after the
    /// identity add.
    pub cna2: ConvNormAct2d<B>,
}

impl<B: Backend> BasicUnitMeta for BasicUnit<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn out_planes(&self) -> usize {
        self.cna2.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna1.stride()[0]
    }
}

impl<B: Backend> BasicUnit<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(shortcut) => shortcut.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cna1.forward(input);
        self.cna2.hook_forward(x, |x| x + identity)
    }
}
