#![warn(missing_docs)]
//!# ibnext - ResNeXt-IBN models for burn
//!
//! Config/module pairs describing the ResNeXt-IBN family of image
//! classification networks. The configs declare topology; `init`
//! materializes `burn` modules; execution and training belong to the
//! `burn` backend the caller picks.
//!
//! ## Notable Components
//!
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::norm`] - normalization layers.
//!     * [`layers::norm::ibn`] - the Instance-Batch Normalization layer.
//!   * [`layers::activation`] - activation layer abstraction wrapper.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::conv_norm_act`] - ``Conv2d + Norm + Act`` cell.
//! * [`models`] - complete model families.
//!   * [`models::resnext`] - `ResNeXt-IBN`.

pub mod layers;
pub mod models;
