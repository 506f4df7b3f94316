//! # `ResNeXt` Stage
//!
//! A [`Stage`] is a validated sequence of [`ResidualUnit`]s sharing an
//! output width. The first unit carries the stage stride and the channel
//! transition; the remaining units are stride-1 at the stage width.

use crate::layers::activation::ActivationConfig;
use crate::models::resnext::unit::{ResidualUnit, ResidualUnitConfig, ResidualUnitMeta};
use crate::models::resnext::util::stride_div_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`Stage`] Meta API.
pub trait StageMeta {
    /// The number of units.
    fn len(&self) -> usize;

    /// Check if the stage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the stage.
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

/// [`Stage`] Configuration.
#[derive(Config, Debug)]
pub struct StageConfig {
    /// The component units.
    pub units: Vec<ResidualUnitConfig>,
}

impl From<Vec<ResidualUnitConfig>> for StageConfig {
    fn from(units: Vec<ResidualUnitConfig>) -> Self {
        Self { units }
    }
}

impl StageMeta for StageConfig {
    fn len(&self) -> usize {
        self.units.len()
    }

    fn in_planes(&self) -> usize {
        self.units[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.units[self.units.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.units.iter().fold(1, |acc, unit| acc * unit.stride())
    }
}

impl StageConfig {
    /// Build a stage config.
    ///
    /// The first unit carries `stride` and the `in_planes → out_planes`
    /// transition; the remaining `num_units - 1` units are stride-1 at
    /// `out_planes`.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        num_units: usize,
        in_planes: usize,
        out_planes: usize,
        stride: usize,
        bottleneck: bool,
        ibn: bool,
        cardinality: usize,
        activation: ActivationConfig,
    ) -> Self {
        let units = (0..num_units)
            .map(|u| {
                if u == 0 {
                    ResidualUnitConfig::build(
                        in_planes,
                        out_planes,
                        stride,
                        bottleneck,
                        ibn,
                        cardinality,
                        activation.clone(),
                    )
                } else {
                    ResidualUnitConfig::build(
                        out_planes,
                        out_planes,
                        1,
                        bottleneck,
                        ibn,
                        cardinality,
                        activation.clone(),
                    )
                }
            })
            .collect();

        Self { units }
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("units is empty".to_string());
        }

        for idx in 1..self.units.len() {
            let prev = &self.units[idx - 1];
            let curr = &self.units[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(format!(
                    "unit[{}].out_planes({}) != unit[{}].in_planes({})\n{:#?}",
                    idx - 1,
                    prev.out_planes(),
                    idx,
                    curr.in_planes(),
                    self,
                ));
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

    /// Initialize a new [`Stage`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Stage<B> {
        self.expect_valid();

        Stage {
            units: self.units.iter().map(|unit| unit.init(device)).collect(),
        }
    }
}

/// Stage of residual units.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    /// Internal units.
    pub units: Vec<ResidualUnit<B>>,
}

impl<B: Backend> StageMeta for Stage<B> {
    fn len(&self) -> usize {
        self.units.len()
    }

    fn in_planes(&self) -> usize {
        self.units[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.units[self.units.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.units.iter().fold(1, |acc, unit| acc * unit.stride())
    }
}

impl<B: Backend> Stage<B> {
    /// Apply the stage.
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
            &[("in_planes", self.in_planes()), ("stride", self.stride())],
        );

        let x = self.units.iter().fold(input, |x, unit| unit.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnext::basic::BasicUnitConfig;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_stage_config_build() {
        let config = StageConfig::build(3, 16, 32, 2, true, true, 4, ActivationConfig::Relu);
        config.expect_valid();
        assert_eq!(config.len(), 3);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([12, 24]), [6, 12]);

        let unit1 = &config.units[0];
        assert_eq!(unit1.in_planes(), 16);
        assert_eq!(unit1.out_planes(), 32);
        assert_eq!(unit1.stride(), 2);

        let unit2 = &config.units[1];
        assert_eq!(unit2.in_planes(), 32);
        assert_eq!(unit2.out_planes(), 32);
        assert_eq!(unit2.stride(), 1);
    }

    #[test]
    fn test_stage_config_validation() {
        let config = StageConfig::from(vec![]);
        assert!(config.try_validate().is_err());

        let config = StageConfig::from(vec![
            BasicUnitConfig::new(4, 8).into(),
            BasicUnitConfig::new(4, 8).into(),
        ]);
        assert!(config.try_validate().is_err());
    }

    #[test]
    pub fn test_stage_forward() {
        type B = NdArray;
        let device = Default::default();

        let a_planes = 4;
        let b_planes = 8;
        let c_planes = 16;

        let config = StageConfig::from(vec![
            BasicUnitConfig::new(a_planes, b_planes)
                .with_stride(2)
                .into(),
            BasicUnitConfig::new(b_planes, c_planes)
                .with_stride(3)
                .into(),
        ]);

        config.expect_valid();

        assert_eq!(config.len(), 2);
        assert_eq!(config.in_planes(), a_planes);
        assert_eq!(config.out_planes(), c_planes);
        assert_eq!(config.stride(), 2 * 3);
        assert_eq!(config.output_resolution([12, 24]), [2, 4]);

        let stage: Stage<B> = config.init(&device);

        assert_eq!(stage.len(), 2);
        assert_eq!(stage.in_planes(), a_planes);
        assert_eq!(stage.out_planes(), c_planes);
        assert_eq!(stage.stride(), 2 * 3);
        assert_eq!(stage.output_resolution([12, 24]), [2, 4]);

        let batch_size = 2;
        let input = Tensor::ones([batch_size, a_planes, 12, 24], &device);

        let output = stage.forward(input.clone());
        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", c_planes),
                ("out_height", 2),
                ("out_width", 4)
            ],
        );

        let mut expected = input;
        for unit in stage.units.iter() {
            expected = unit.forward(expected);
        }
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
