//! # Projection Shortcut
//!
//! The residual-connection projection used when a unit's input and
//! output shapes differ. Down-sampling bottleneck units project through
//! a 3x3 stride-2 convolution rather than the classic 1x1, to preserve
//! information across the resolution drop.

use crate::layers::norm::NORM_EPSILON;
use crate::models::resnext::util::stride_div_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ProjectionShortcut`] Meta trait.
pub trait ProjectionShortcutMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_planes(&self) -> usize;

    /// The kernel size of the projection conv.
    fn kernel_size(&self) -> usize;

    /// The stride of the projection.
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

/// [`ProjectionShortcut`] configuration.
///
/// Implements [`ProjectionShortcutMeta`].
#[derive(Config, Debug)]
pub struct ProjectionShortcutConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub out_planes: usize,

    /// The stride of the projection.
    #[config(default = 1)]
    pub stride: usize,

    /// The kernel size of the projection conv.
    #[config(default = 1)]
    pub kernel_size: usize,
}

impl ProjectionShortcutMeta for ProjectionShortcutConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.out_planes
    }

    fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ProjectionShortcutConfig {
    /// Initialize a [`ProjectionShortcut`] `Module`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ProjectionShortcut<B> {
        let padding = self.kernel_size / 2;

        ProjectionShortcut {
            conv: Conv2dConfig::new(
                [self.in_planes, self.out_planes],
                [self.kernel_size, self.kernel_size],
            )
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device),

            norm: BatchNormConfig::new(self.out_planes)
                .with_epsilon(NORM_EPSILON)
                .init(device),
        }
    }
}

/// Projection shortcut: conv + batch norm on the identity branch.
///
/// Maps ``[batch, in_planes, in_height, in_width]`` to
/// ``[batch, out_planes, out_height, out_width]`` tensors.
///
/// Implements [`ProjectionShortcutMeta`].
#[derive(Module, Debug)]
pub struct ProjectionShortcut<B: Backend> {
    /// Projection conv.
    pub conv: Conv2d<B>,

    /// Norm over the projected channels.
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ProjectionShortcutMeta for ProjectionShortcut<B> {
    fn in_planes(&self) -> usize {
        self.conv.weight.shape().dims[1]
    }

    fn out_planes(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> usize {
        self.conv.kernel_size[0]
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }
}

impl<B: Backend> ProjectionShortcut<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_planes, in_height=out_height*stride, in_width=out_width*stride]``
    ///
    /// # Returns
    ///
    /// ``[batch, out_planes, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_planes",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_height", "out_width"],
            &[("in_planes", self.in_planes()), ("stride", self.stride())]
        );

        let out = self.conv.forward(input);
        let out = self.norm.forward(out);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        out
    }
}
