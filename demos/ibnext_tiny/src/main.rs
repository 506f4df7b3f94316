//! Builds a `ResNeXt-IBN` prefab, reports its size, and probes a tiny
//! variant with a single forward pass on the ndarray backend.

use burn::backend::NdArray;
use burn::module::Module;
use burn::prelude::Tensor;
use burn::tensor::Distribution;
use clap::Parser;
use ibnext::models::resnext::{DatasetKind, ResNeXtIbn, ResNeXtIbnConfig, lookup_prefab};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Prefab config name.
    #[arg(long, default_value = "resnext50_ibn_a")]
    prefab: String,

    /// Number of output classes.
    #[arg(long, default_value_t = 1000)]
    num_classes: usize,

    /// Batch size of the probe input.
    #[arg(long, default_value_t = 2)]
    batch_size: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    type B = NdArray<f32>;
    let device = Default::default();

    let config = lookup_prefab(&args.prefab, args.num_classes).map_err(anyhow::Error::msg)?;
    let model: ResNeXtIbn<B> = config.init(&device);
    println!("{}: {} parameters", args.prefab, model.num_params());

    // Grouped Conv2d is broken on ndarray in burn 0.18, so the forward
    // probe runs a cardinality-1 miniature instead of the prefab.
    let config = ResNeXtIbnConfig::new(vec![1, 1, 1], vec![8, 16, 32, 64], args.num_classes)
        .with_cardinality(1)
        .with_dataset(DatasetKind::Cifar10)
        .with_dropout(0.2);
    let model: ResNeXtIbn<B> = config.init(&device);

    let input = Tensor::random(
        [args.batch_size, 3, 32, 32],
        Distribution::Default,
        &device,
    );
    let logits = model.forward(input);
    println!("probe logits: {:?}", logits.shape().dims);

    Ok(())
}
