//! # Instance-Batch Normalization
//!
//! [`Ibn`] is the IBN-a normalization block: the channel dimension is
//! split into two contiguous halves, the first half is instance
//! normalized, the second half is batch normalized, and the halves are
//! concatenated back together.
//!
//! [`IbnConfig`] implements [`Config`], and provides [`IbnConfig::init`]
//! to initialize an [`Ibn`].

use crate::layers::norm::NORM_EPSILON;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::{BatchNorm, BatchNormConfig, InstanceNorm, InstanceNormConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Ibn`] Configuration.
#[derive(Config, Debug)]
pub struct IbnConfig {
    /// The total number of feature channels.
    pub num_features: usize,

    /// Norm epsilon.
    #[config(default = "NORM_EPSILON")]
    pub epsilon: f64,

    /// Batch norm momentum.
    #[config(default = "0.1")]
    pub momentum: f64,
}

impl IbnConfig {
    /// Channel widths of the ``(instance, batch)`` halves.
    ///
    /// The instance half is ``num_features / 2``; the batch half covers
    /// the remaining channels, so odd widths are well-formed.
    pub fn split_features(&self) -> (usize, usize) {
        let half = self.num_features / 2;
        (half, self.num_features - half)
    }

    /// Initialize an [`Ibn`] layer.
    ///
    /// # Panics
    ///
    /// If `num_features` is less than 2 (each half must be non-empty).
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Ibn<B> {
        assert!(
            self.num_features >= 2,
            "Ibn requires at least 2 features, got {}",
            self.num_features
        );

        let (instance_features, batch_features) = self.split_features();

        Ibn {
            inorm: InstanceNormConfig::new(instance_features)
                .with_epsilon(self.epsilon)
                .init(device),
            bnorm: BatchNormConfig::new(batch_features)
                .with_epsilon(self.epsilon)
                .with_momentum(self.momentum)
                .init(device),
        }
    }
}

/// Instance-Batch Normalization layer.
#[derive(Module, Debug)]
pub struct Ibn<B: Backend> {
    /// Instance norm over the leading channel half.
    pub inorm: InstanceNorm<B>,

    /// Batch norm over the trailing channel half.
    pub bnorm: BatchNorm<B, 2>,
}

impl<B: Backend> Ibn<B> {
    /// The total number of feature channels.
    pub fn num_features(&self) -> usize {
        self.instance_features() + self.batch_features()
    }

    /// The width of the instance-normalized half.
    pub fn instance_features(&self) -> usize {
        self.inorm.num_channels
    }

    /// The width of the batch-normalized half.
    pub fn batch_features(&self) -> usize {
        self.bnorm.gamma.shape().dims[0]
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, num_features, height, width]``.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "num_features", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("num_features", self.num_features())],
        );

        let instance_features = self.instance_features();
        let head = input.clone().narrow(1, 0, instance_features);
        let tail = input.narrow(1, instance_features, self.batch_features());

        let out = Tensor::cat(
            vec![self.inorm.forward(head), self.bnorm.forward(tail)],
            1,
        );

        assert_shape_contract_periodically!(
            ["batch", "num_features", "height", "width"],
            &out,
            &[
                ("batch", batch),
                ("num_features", self.num_features()),
                ("height", height),
                ("width", width)
            ],
        );

        out
    }
}
