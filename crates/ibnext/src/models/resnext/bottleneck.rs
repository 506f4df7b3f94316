//! # Bottleneck Residual Unit
//!
//! [`BottleneckUnit`] is the aggregated-transformation bottleneck:
//! a 1x1 reduce, a grouped 3x3 carrying the unit stride, and a 1x1
//! expand. When IBN is enabled, the reduce is normalized by the
//! [`crate::layers::norm::Ibn`] split block instead of plain batch norm.
//!
//! [`BottleneckUnitMeta`] defines a common meta API for
//! [`BottleneckUnit`] and [`BottleneckUnitConfig`].

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::conv_norm_act::{
    ConvNormAct2d, ConvNormAct2dConfig, ConvNormAct2dMeta,
};
use crate::layers::norm::{FeatureNorm, FeatureNormConfig};
use crate::models::resnext::shortcut::{ProjectionShortcut, ProjectionShortcutConfig};
use crate::models::resnext::util::stride_div_resolution;
use burn::nn::conv::Conv2dConfig;
use burn::nn::PaddingConfig2d;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BottleneckUnit`] Meta trait.
pub trait BottleneckUnitMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Groups of the 3x3 conv.
    fn cardinality(&self) -> usize;

    /// Whether the reduce norm is an IBN block.
    fn has_ibn(&self) -> bool;

    /// Width of the reduce and grouped convs.
    ///
    /// ``mid_planes = out_planes / 2``
    fn mid_planes(&self) -> usize {
        self.out_planes() / 2
    }

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

/// [`BottleneckUnit`] Config.
///
/// Implements [`BottleneckUnitMeta`].
#[derive(Config, Debug)]
pub struct BottleneckUnitConfig {
    /// The number of input feature planes.
    pub in_planes: usize,

    /// The number of output feature planes.
    pub out_planes: usize,

    /// The stride of the unit.
    #[config(default = 1)]
    pub stride: usize,

    /// Groups of the 3x3 conv.
    #[config(default = 32)]
    pub cardinality: usize,

    /// Whether to normalize the reduce with an IBN block.
    #[config(default = true)]
    pub ibn: bool,

    /// [`crate::layers::activation::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl BottleneckUnitMeta for BottleneckUnitConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.out_planes
    }

    fn cardinality(&self) -> usize {
        self.cardinality
    }

    fn has_ibn(&self) -> bool {
        self.ibn
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BottleneckUnitConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.cardinality == 0 {
            return Err("cardinality must be non-zero".to_string());
        }
        if self.out_planes % 2 != 0 {
            return Err(format!(
                "out_planes({}) must be even",
                self.out_planes
            ));
        }
        let mid_planes = self.mid_planes();
        if mid_planes % self.cardinality != 0 {
            return Err(format!(
                "mid_planes({mid_planes}) must be divisible by cardinality({})",
                self.cardinality
            ));
        }
        if self.ibn && mid_planes < 2 {
            return Err(format!(
                "mid_planes({mid_planes}) is too narrow for an IBN split"
            ));
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

    /// Initialize a [`BottleneckUnit`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BottleneckUnit<B> {
        self.expect_valid();

        let mid_planes = self.mid_planes();

        let shortcut = if self.stride != 1 || self.in_planes != self.out_planes {
            // Down-sampling projections go through 3x3 convs.
            let kernel_size = if self.stride == 2 { 3 } else { 1 };
            Some(
                ProjectionShortcutConfig::new(self.in_planes, self.out_planes)
                    .with_stride(self.stride)
                    .with_kernel_size(kernel_size)
                    .init(device),
            )
        } else {
            None
        };

        let reduce_norm = if self.ibn {
            FeatureNormConfig::ibn(mid_planes)
        } else {
            FeatureNormConfig::batch(mid_planes)
        };

        let cna1 = ConvNormAct2dConfig::new(
            Conv2dConfig::new([self.in_planes, mid_planes], [1, 1]).with_bias(false),
            reduce_norm,
        )
        .with_act(self.activation.clone());

        let cna2 = ConvNormAct2dConfig::new(
            Conv2dConfig::new([mid_planes, mid_planes], [3, 3])
                .with_stride([self.stride, self.stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_groups(self.cardinality)
                .with_bias(false),
            FeatureNormConfig::batch(mid_planes),
        )
        .with_act(self.activation.clone());

        let cna3 = ConvNormAct2dConfig::new(
            Conv2dConfig::new([mid_planes, self.out_planes], [1, 1]).with_bias(false),
            FeatureNormConfig::batch(self.out_planes),
        )
        .with_act(self.activation.clone());

        BottleneckUnit {
            shortcut,
            cna1: cna1.init(device),
            cna2: cna2.init(device),
            cna3: cna3.init(device),
        }
    }
}

/// Grouped bottleneck residual unit.
///
/// Implements [`BottleneckUnitMeta`].
#[derive(Module, Debug)]
pub struct BottleneckUnit<B: Backend> {
    /// Optional projection layer for the residual connection.
    pub shortcut: Option<ProjectionShortcut<B>>,

    /// 1x1 reduce; IBN-normalized when enabled.
    pub cna1: ConvNormAct2d<B>,

    /// Grouped 3x3; carries the stride.
    pub cna2: ConvNormAct2d<B>,

    /// 1x1 expand; its activation runs after the identity add.
    pub cna3: ConvNormAct2d<B>,
}

impl<B: Backend> BottleneckUnitMeta for BottleneckUnit<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn out_planes(&self) -> usize {
        self.cna3.out_channels()
    }

    fn cardinality(&self) -> usize {
        self.cna2.groups()
    }

    fn has_ibn(&self) -> bool {
        matches!(self.cna1.norm, FeatureNorm::Ibn(_))
    }

    fn mid_planes(&self) -> usize {
        self.cna2.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna2.stride()[0]
    }
}

impl<B: Backend> BottleneckUnit<B> {
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
        let x = self.cna2.forward(x);
        self.cna3.hook_forward(x, |x| x + identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnext::shortcut::ProjectionShortcutMeta;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_bottleneck_unit_config() {
        let config = BottleneckUnitConfig::new(64, 256);
        assert_eq!(config.in_planes(), 64);
        assert_eq!(config.out_planes(), 256);
        assert_eq!(config.mid_planes(), 128);
        assert_eq!(config.cardinality(), 32);
        assert!(config.has_ibn());
        assert_eq!(config.stride(), 1);
        assert_eq!(config.output_resolution([16, 16]), [16, 16]);
        config.expect_valid();

        let config = config.with_stride(2).with_ibn(false);
        assert_eq!(config.stride(), 2);
        assert!(!config.has_ibn());
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
    }

    #[test]
    fn test_bottleneck_unit_config_validation() {
        assert!(BottleneckUnitConfig::new(4, 9).try_validate().is_err());

        assert!(
            BottleneckUnitConfig::new(4, 8)
                .with_cardinality(3)
                .try_validate()
                .is_err()
        );

        assert!(
            BottleneckUnitConfig::new(2, 2)
                .with_cardinality(1)
                .try_validate()
                .is_err()
        );

        BottleneckUnitConfig::new(4, 8)
            .with_cardinality(4)
            .expect_valid();
    }

    #[test]
    #[should_panic(expected = "must be divisible by cardinality")]
    fn test_bottleneck_unit_init_invalid() {
        type B = NdArray<f32>;
        let device = Default::default();
        let _unit: BottleneckUnit<B> = BottleneckUnitConfig::new(4, 8)
            .with_cardinality(3)
            .init(&device);
    }

    #[test]
    fn test_bottleneck_unit_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let unit: BottleneckUnit<B> = BottleneckUnitConfig::new(16, 32)
            .with_cardinality(4)
            .with_stride(2)
            .init(&device);

        assert_eq!(unit.in_planes(), 16);
        assert_eq!(unit.out_planes(), 32);
        assert_eq!(unit.mid_planes(), 16);
        assert_eq!(unit.cardinality(), 4);
        assert!(unit.has_ibn());
        assert_eq!(unit.stride(), 2);
        assert_eq!(unit.output_resolution([16, 16]), [8, 8]);

        // Stride-2 projections are 3x3.
        assert_eq!(unit.shortcut.as_ref().unwrap().kernel_size(), 3);
    }

    #[test]
    fn test_bottleneck_unit_norm_selection() {
        type B = NdArray<f32>;
        let device = Default::default();

        let unit: BottleneckUnit<B> = BottleneckUnitConfig::new(16, 32)
            .with_cardinality(1)
            .init(&device);
        assert!(unit.has_ibn());
        assert!(matches!(unit.cna2.norm, FeatureNorm::Batch(_)));
        assert!(matches!(unit.cna3.norm, FeatureNorm::Batch(_)));

        let unit: BottleneckUnit<B> = BottleneckUnitConfig::new(16, 32)
            .with_cardinality(1)
            .with_ibn(false)
            .init(&device);
        assert!(!unit.has_ibn());
        assert!(matches!(unit.cna1.norm, FeatureNorm::Batch(_)));
    }

    #[test]
    fn test_bottleneck_unit_forward_identity_shortcut() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;
        let planes = 8;

        // Cardinality 1: grouped Conv2d is broken on ndarray in burn 0.18.
        let unit: BottleneckUnit<B> = BottleneckUnitConfig::new(planes, planes)
            .with_cardinality(1)
            .init(&device);
        assert!(unit.shortcut.is_none());

        let input = Tensor::ones([batch_size, planes, 8, 8], &device);
        let output = unit.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", planes),
                ("out_height", 8),
                ("out_width", 8)
            ],
        );
    }

    #[test]
    fn test_bottleneck_unit_forward_downsample() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 4;
        let out_planes = 16;

        let unit: BottleneckUnit<B> = BottleneckUnitConfig::new(in_planes, out_planes)
            .with_cardinality(1)
            .with_stride(2)
            .init(&device);

        let input = Tensor::ones([batch_size, in_planes, 8, 8], &device);
        let output = unit.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", out_planes),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }

    #[cfg(feature = "wgpu")]
    #[test]
    fn test_bottleneck_unit_forward_grouped() {
        // Conv2d with groups is broken on ndarray in burn 0.18; fixed in 0.19.
        type B = burn::backend::Wgpu;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 16;
        let out_planes = 32;

        let unit: BottleneckUnit<B> = BottleneckUnitConfig::new(in_planes, out_planes)
            .with_cardinality(4)
            .with_stride(2)
            .init(&device);

        let input = Tensor::ones([batch_size, in_planes, 8, 8], &device);
        let output = unit.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", out_planes),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }
}
