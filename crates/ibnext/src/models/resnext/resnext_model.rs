//! # `ResNeXt-IBN` Core Model
//!
//! [`ResNeXtIbnConfig`] is the declarative surface of the family: unit
//! counts and widths per stage, cardinality, dataset stem, IBN /
//! bottleneck toggles, and the classifier dropout rate. `init` assembles
//! the module tree; [`ResNeXtIbn::forward`] maps an image batch to class
//! logits.

use crate::layers::activation::ActivationConfig;
use crate::layers::norm::NORM_EPSILON;
use crate::models::resnext::stage::{Stage, StageConfig, StageMeta};
use crate::models::resnext::stem::{DatasetKind, Stem, StemMeta};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Config, Tensor};

/// IBN is not applied to units at this width.
pub const IBN_EXCLUDED_PLANES: usize = 2048;

/// [`ResNeXtIbn`] Configuration.
#[derive(Config, Debug)]
pub struct ResNeXtIbnConfig {
    /// Number of units in each stage.
    pub units: Vec<usize>,

    /// Stem width followed by one output width per stage;
    /// ``units.len() + 1`` entries.
    pub filters: Vec<usize>,

    /// Output size of the classifier.
    pub num_classes: usize,

    /// Groups of the bottleneck 3x3 convs.
    #[config(default = 32)]
    pub cardinality: usize,

    /// Dataset the input stem is shaped for.
    #[config(default = "DatasetKind::ImageNet")]
    pub dataset: DatasetKind,

    /// The number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Probability of an element to be zeroed before the classifier.
    #[config(default = "0.0")]
    pub dropout: f64,

    /// Whether bottleneck units normalize their reduce with IBN.
    #[config(default = true)]
    pub ibn: bool,

    /// Whether to build bottleneck units rather than basic units.
    #[config(default = true)]
    pub bottleneck: bool,

    /// [`crate::layers::activation::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl ResNeXtIbnConfig {
    /// The number of stages.
    pub fn num_stages(&self) -> usize {
        self.units.len()
    }

    /// The width of the final stage.
    pub fn feature_planes(&self) -> usize {
        self.filters[self.filters.len() - 1]
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.units.is_empty() {
            return Err("units is empty".to_string());
        }
        if self.filters.len() != self.units.len() + 1 {
            return Err(format!(
                "filters has {} entries, expected units.len() + 1 = {}",
                self.filters.len(),
                self.units.len() + 1,
            ));
        }
        if self.units.contains(&0) {
            return Err(format!("every stage needs at least one unit: {:?}", self.units));
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(format!("dropout({}) is not a probability", self.dropout));
        }
        if self.bottleneck {
            if self.cardinality == 0 {
                return Err("cardinality must be non-zero".to_string());
            }
            for &out_planes in &self.filters[1..] {
                if out_planes % 2 != 0 {
                    return Err(format!("stage width {out_planes} must be even"));
                }
                let mid_planes = out_planes / 2;
                if mid_planes % self.cardinality != 0 {
                    return Err(format!(
                        "stage mid width {mid_planes} must be divisible by cardinality({})",
                        self.cardinality
                    ));
                }
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        match self.try_validate() {
            Ok(_) => (),
            Err(err) => panic!("{}", err),
        }
    }

    /// Initialize a [`ResNeXtIbn`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNeXtIbn<B> {
        self.expect_valid();

        let stem_width = self.filters[0];

        let input_norm = BatchNormConfig::new(self.in_channels)
            .with_epsilon(NORM_EPSILON)
            .init(device);

        let stem = self
            .dataset
            .stem_config(self.in_channels, stem_width, self.activation.clone())
            .init(device);

        let mut stages = Vec::with_capacity(self.num_stages());
        let mut in_planes = stem_width;
        for (i, &num_units) in self.units.iter().enumerate() {
            let out_planes = self.filters[i + 1];
            let stride = if i == 0 { 1 } else { 2 };
            let ibn = self.ibn && out_planes != IBN_EXCLUDED_PLANES;

            stages.push(
                StageConfig::build(
                    num_units,
                    in_planes,
                    out_planes,
                    stride,
                    self.bottleneck,
                    ibn,
                    self.cardinality,
                    self.activation.clone(),
                )
                .init(device),
            );
            in_planes = out_planes;
        }

        ResNeXtIbn {
            input_norm,
            stem,
            stages,

            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc: LinearConfig::new(in_planes, self.num_classes).init(device),
        }
    }
}

/// `ResNeXt-IBN` model.
#[derive(Module, Debug)]
pub struct ResNeXtIbn<B: Backend> {
    /// Norm over the raw input image.
    pub input_norm: BatchNorm<B, 2>,

    /// Dataset stem.
    pub stem: Stem<B>,

    /// Residual stages.
    pub stages: Vec<Stage<B>>,

    /// Global average pooling ``[B, C, H, W] -> [B, C, 1, 1]``.
    pub avgpool: AdaptiveAvgPool2d,

    /// Classifier dropout.
    pub dropout: Dropout,

    /// Output layer.
    pub fc: Linear<B>,
}

impl<B: Backend> ResNeXtIbn<B> {
    /// The number of input image channels.
    pub fn in_channels(&self) -> usize {
        self.input_norm.gamma.shape().dims[0]
    }

    /// The width of the final stage.
    pub fn feature_planes(&self) -> usize {
        self.fc.weight.shape().dims[0]
    }

    /// Output size of the classifier.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.shape().dims[1]
    }

    /// The number of stages.
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// The effective stride from input image to final feature map.
    pub fn stride(&self) -> usize {
        self.stages
            .iter()
            .fold(self.stem.stride(), |acc, stage| acc * stage.stride())
    }

    /// Replace the classifier with a freshly initialized one.
    ///
    /// Keeps every feature layer; used to re-head a model for a new
    /// class count.
    pub fn with_classes(
        self,
        num_classes: usize,
    ) -> Self {
        let device = self.devices()[0].clone();
        let fc = LinearConfig::new(self.feature_planes(), num_classes).init(&device);
        Self { fc, ..self }
    }

    /// `ResNeXt-IBN` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_channels, height, width]`` image batch;
    ///   the resolution must be a multiple of [`ResNeXtIbn::stride`].
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())],
        );

        let x = self.input_norm.forward(input);
        let x = self.stem.forward(x);

        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));

        let x = self.avgpool.forward(x);
        // Reshape [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);

        let x = self.dropout.forward(x);
        let x = self.fc.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnext::bottleneck::BottleneckUnitMeta;
    use crate::models::resnext::unit::ResidualUnit;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    fn tiny_cifar_config() -> ResNeXtIbnConfig {
        // Cardinality 1: grouped Conv2d is broken on ndarray in burn 0.18.
        ResNeXtIbnConfig::new(vec![1, 1, 1], vec![4, 8, 16, 32], 10)
            .with_cardinality(1)
            .with_dataset(DatasetKind::Cifar10)
            .with_dropout(0.2)
    }

    #[test]
    fn test_config_meta() {
        let config = tiny_cifar_config();
        config.expect_valid();
        assert_eq!(config.num_stages(), 3);
        assert_eq!(config.feature_planes(), 32);
    }

    #[test]
    fn test_config_validation() {
        assert!(
            ResNeXtIbnConfig::new(vec![], vec![4], 10)
                .try_validate()
                .is_err()
        );

        assert!(
            ResNeXtIbnConfig::new(vec![1, 1], vec![4, 8], 10)
                .try_validate()
                .is_err()
        );

        assert!(
            ResNeXtIbnConfig::new(vec![1, 0], vec![4, 8, 16], 10)
                .with_cardinality(1)
                .try_validate()
                .is_err()
        );

        assert!(
            tiny_cifar_config()
                .with_dropout(1.5)
                .try_validate()
                .is_err()
        );

        // 9 is not an even stage width.
        assert!(
            ResNeXtIbnConfig::new(vec![1], vec![4, 9], 10)
                .with_cardinality(1)
                .try_validate()
                .is_err()
        );

        // mid width 4 does not divide by cardinality 3.
        assert!(
            ResNeXtIbnConfig::new(vec![1], vec![4, 8], 10)
                .with_cardinality(3)
                .try_validate()
                .is_err()
        );

        // Basic units have no width constraints.
        ResNeXtIbnConfig::new(vec![1], vec![4, 9], 10)
            .with_bottleneck(false)
            .expect_valid();
    }

    #[test]
    fn test_ibn_excluded_at_cutoff_width() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNeXtIbn<B> =
            ResNeXtIbnConfig::new(vec![1, 1], vec![4, 8, IBN_EXCLUDED_PLANES], 10)
                .with_cardinality(1)
                .with_dataset(DatasetKind::Cifar10)
                .init(&device);

        let unit = |stage: usize| match &model.stages[stage].units[0] {
            ResidualUnit::Bottleneck(unit) => unit,
            _ => panic!("Unexpected unit type"),
        };

        assert!(unit(0).has_ibn());
        assert!(!unit(1).has_ibn());
    }

    #[test]
    fn test_model_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNeXtIbn<B> = tiny_cifar_config().init(&device);
        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.feature_planes(), 32);
        assert_eq!(model.num_classes(), 10);
        assert_eq!(model.num_stages(), 3);
        // Cifar stem stride 1; stages stride 1, 2, 2.
        assert_eq!(model.stride(), 4);
    }

    #[test]
    fn test_cifar_forward() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;
        let model: ResNeXtIbn<B> = tiny_cifar_config().init(&device);

        let input = Tensor::random([batch_size, 3, 16, 16], Distribution::Default, &device);
        let logits = model.forward(input);

        assert_shape_contract!(
            ["batch", "num_classes"],
            &logits,
            &[("batch", batch_size), ("num_classes", 10)],
        );
    }

    #[test]
    fn test_deep_stem_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;
        let model: ResNeXtIbn<B> = ResNeXtIbnConfig::new(vec![1, 1], vec![4, 8, 16], 10)
            .with_cardinality(1)
            .with_dataset(DatasetKind::ImageNet)
            .init(&device);

        // Deep stem stride 4; stages stride 1, 2.
        assert_eq!(model.stride(), 8);

        let input = Tensor::random([batch_size, 3, 32, 32], Distribution::Default, &device);
        let logits = model.forward(input);

        assert_shape_contract!(
            ["batch", "num_classes"],
            &logits,
            &[("batch", batch_size), ("num_classes", 10)],
        );
    }

    #[test]
    fn test_basic_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;
        let model: ResNeXtIbn<B> = ResNeXtIbnConfig::new(vec![1, 1], vec![4, 4, 8], 10)
            .with_bottleneck(false)
            .with_dataset(DatasetKind::Cifar10)
            .init(&device);

        let input = Tensor::random([batch_size, 3, 8, 8], Distribution::Default, &device);
        let logits = model.forward(input);

        assert_shape_contract!(
            ["batch", "num_classes"],
            &logits,
            &[("batch", batch_size), ("num_classes", 10)],
        );
    }

    #[test]
    fn test_with_classes() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNeXtIbn<B> = tiny_cifar_config().init(&device);
        assert_eq!(model.num_classes(), 10);

        let model = model.with_classes(5);
        assert_eq!(model.num_classes(), 5);
        assert_eq!(model.feature_planes(), 32);

        let input = Tensor::random([2, 3, 16, 16], Distribution::Default, &device);
        let logits = model.forward(input);

        assert_shape_contract!(
            ["batch", "num_classes"],
            &logits,
            &[("batch", 2), ("num_classes", 5)],
        );
    }
}
