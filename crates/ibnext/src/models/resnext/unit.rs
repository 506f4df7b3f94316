//! # Residual Unit Wrapper

use crate::layers::activation::ActivationConfig;
use crate::models::resnext::basic::{BasicUnit, BasicUnitConfig, BasicUnitMeta};
use crate::models::resnext::bottleneck::{
    BottleneckUnit, BottleneckUnitConfig, BottleneckUnitMeta,
};
use crate::models::resnext::util::stride_div_resolution;
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`ResidualUnit`] Meta API.
pub trait ResidualUnitMeta {
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

/// [`ResidualUnit`] Config.
#[derive(Config, Debug)]
pub enum ResidualUnitConfig {
    /// A [`BasicUnit`].
    Basic(BasicUnitConfig),

    /// A [`BottleneckUnit`].
    Bottleneck(BottleneckUnitConfig),
}

impl From<BasicUnitConfig> for ResidualUnitConfig {
    fn from(config: BasicUnitConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckUnitConfig> for ResidualUnitConfig {
    fn from(config: BottleneckUnitConfig) -> Self {
        Self::Bottleneck(config)
    }
}

impl ResidualUnitMeta for ResidualUnitConfig {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.in_planes(),
            Self::Bottleneck(config) => config.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.out_planes(),
            Self::Bottleneck(config) => config.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(config) => config.stride(),
            Self::Bottleneck(config) => config.stride(),
        }
    }
}

impl ResidualUnitConfig {
    /// Build a unit config, selecting the form from the bottleneck toggle.
    ///
    /// `ibn` and `cardinality` apply to the bottleneck form only.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        in_planes: usize,
        out_planes: usize,
        stride: usize,
        bottleneck: bool,
        ibn: bool,
        cardinality: usize,
        activation: ActivationConfig,
    ) -> Self {
        if bottleneck {
            BottleneckUnitConfig::new(in_planes, out_planes)
                .with_stride(stride)
                .with_cardinality(cardinality)
                .with_ibn(ibn)
                .with_activation(activation)
                .into()
        } else {
            BasicUnitConfig::new(in_planes, out_planes)
                .with_stride(stride)
                .with_activation(activation)
                .into()
        }
    }

    /// Initialize a [`ResidualUnit`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualUnit<B> {
        match self {
            Self::Basic(config) => ResidualUnit::Basic(config.init(device)),
            Self::Bottleneck(config) => ResidualUnit::Bottleneck(config.init(device)),
        }
    }
}

/// A [`BasicUnit`] or [`BottleneckUnit`] wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualUnit<B: Backend> {
    /// A [`BasicUnit`].
    Basic(BasicUnit<B>),

    /// A [`BottleneckUnit`].
    Bottleneck(BottleneckUnit<B>),
}

impl<B: Backend> From<BasicUnit<B>> for ResidualUnit<B> {
    fn from(unit: BasicUnit<B>) -> Self {
        Self::Basic(unit)
    }
}

impl<B: Backend> From<BottleneckUnit<B>> for ResidualUnit<B> {
    fn from(unit: BottleneckUnit<B>) -> Self {
        Self::Bottleneck(unit)
    }
}

impl<B: Backend> ResidualUnitMeta for ResidualUnit<B> {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(unit) => unit.in_planes(),
            Self::Bottleneck(unit) => unit.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(unit) => unit.out_planes(),
            Self::Bottleneck(unit) => unit.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(unit) => unit.stride(),
            Self::Bottleneck(unit) => unit.stride(),
        }
    }
}

impl<B: Backend> ResidualUnit<B> {
    /// Apply the wrapped unit to the input.
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
        match self {
            Self::Basic(unit) => unit.forward(input),
            Self::Bottleneck(unit) => unit.forward(input),
        }
    }
}
