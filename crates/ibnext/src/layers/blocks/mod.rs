//! # Block Layers

pub mod conv_norm_act;
