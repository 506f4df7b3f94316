//! # `ResNeXt-IBN`
//!
//! Grouped-convolution residual networks with Instance-Batch
//! Normalization blocks, in the `w_d` variant: deep 3x3 stems, 3x3
//! stride-2 shortcut projections, and classifier dropout.

pub mod basic;
pub mod bottleneck;
pub mod prefabs;
pub mod resnext_model;
pub mod shortcut;
pub mod stage;
pub mod stem;
pub mod unit;
pub mod util;

pub use prefabs::{
    lookup_prefab, resnext29_ibn_a, resnext50_ibn_a, resnext101_ibn_a, resnext152_ibn_a,
};
pub use resnext_model::{ResNeXtIbn, ResNeXtIbnConfig};
pub use stem::DatasetKind;
