//! # Feature Normalization Wrapper
//!
//! [`FeatureNorm`] is the seam through which a residual unit picks its
//! normalization: plain [`BatchNorm`], or the [`Ibn`] split block.

use crate::layers::norm::ibn::{Ibn, IbnConfig};
use crate::layers::norm::NORM_EPSILON;
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`FeatureNorm`] Configuration.
#[derive(Config, Debug)]
pub enum FeatureNormConfig {
    /// [`BatchNorm`] Configuration.
    Batch(BatchNormConfig),

    /// [`Ibn`] Configuration.
    Ibn(IbnConfig),
}

impl From<BatchNormConfig> for FeatureNormConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<IbnConfig> for FeatureNormConfig {
    fn from(config: IbnConfig) -> Self {
        Self::Ibn(config)
    }
}

impl FeatureNormConfig {
    /// Batch norm at the family epsilon.
    pub fn batch(num_features: usize) -> Self {
        BatchNormConfig::new(num_features)
            .with_epsilon(NORM_EPSILON)
            .into()
    }

    /// IBN at the family epsilon.
    pub fn ibn(num_features: usize) -> Self {
        IbnConfig::new(num_features).into()
    }

    /// Initialize a [`FeatureNorm`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> FeatureNorm<B> {
        match self {
            FeatureNormConfig::Batch(config) => FeatureNorm::Batch(config.init(device)),
            FeatureNormConfig::Ibn(config) => FeatureNorm::Ibn(config.init(device)),
        }
    }

    /// Adjust the config to the feature size.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            FeatureNormConfig::Batch(config) => BatchNormConfig {
                num_features,
                ..config
            }
            .into(),
            FeatureNormConfig::Ibn(config) => IbnConfig {
                num_features,
                ..config
            }
            .into(),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            FeatureNormConfig::Batch(config) => config.num_features,
            FeatureNormConfig::Ibn(config) => config.num_features,
        }
    }
}

/// Feature Normalization Layer Wrapper.
#[derive(Module, Debug)]
pub enum FeatureNorm<B: Backend> {
    /// [`BatchNorm`] layer; restricted to `BatchNorm`<2>.
    Batch(BatchNorm<B, 2>),

    /// [`Ibn`] layer.
    Ibn(Ibn<B>),
}

impl<B: Backend> From<BatchNorm<B, 2>> for FeatureNorm<B> {
    fn from(layer: BatchNorm<B, 2>) -> Self {
        Self::Batch(layer)
    }
}

impl<B: Backend> From<Ibn<B>> for FeatureNorm<B> {
    fn from(layer: Ibn<B>) -> Self {
        Self::Ibn(layer)
    }
}

impl<B: Backend> FeatureNorm<B> {
    /// Applies normalization to a ``[batch, features, height, width]`` tensor.
    ///
    /// Output rank and shape match the input.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            FeatureNorm::Batch(norm) => norm.forward(input),
            FeatureNorm::Ibn(norm) => norm.forward(input),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            FeatureNorm::Batch(norm) => norm.gamma.shape().dims[0],
            FeatureNorm::Ibn(norm) => norm.num_features(),
        }
    }
}
