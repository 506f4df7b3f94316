//! # `ResNeXt-IBN` Prefab Configurations
//!
//! Constructors for the published depths of the family.

use crate::models::resnext::resnext_model::ResNeXtIbnConfig;
use crate::models::resnext::stem::DatasetKind;

/// Stage units of `ResNeXt50`.
pub const RESNEXT50_UNITS: [usize; 4] = [3, 4, 6, 3];

/// Stage units of `ResNeXt101`.
pub const RESNEXT101_UNITS: [usize; 4] = [3, 4, 23, 3];

/// Stage units of `ResNeXt152`.
pub const RESNEXT152_UNITS: [usize; 4] = [3, 8, 36, 3];

/// Stage units of `ResNeXt29`.
pub const RESNEXT29_UNITS: [usize; 3] = [3, 3, 3];

/// ImageNet-scale filter list: stem width and stage widths.
pub const IMAGENET_FILTERS: [usize; 5] = [64, 256, 512, 1024, 2048];

/// Cifar-scale filter list: stem width and stage widths.
pub const CIFAR_FILTERS: [usize; 4] = [64, 256, 512, 1024];

fn imagenet_prefab(
    units: &[usize],
    num_classes: usize,
) -> ResNeXtIbnConfig {
    ResNeXtIbnConfig::new(units.to_vec(), IMAGENET_FILTERS.to_vec(), num_classes)
        .with_dropout(0.2)
}

/// `ResNeXt50-IBN-a` (32x4d) for ImageNet-scale inputs.
pub fn resnext50_ibn_a(num_classes: usize) -> ResNeXtIbnConfig {
    imagenet_prefab(&RESNEXT50_UNITS, num_classes)
}

/// `ResNeXt101-IBN-a` (32x4d) for ImageNet-scale inputs.
pub fn resnext101_ibn_a(num_classes: usize) -> ResNeXtIbnConfig {
    imagenet_prefab(&RESNEXT101_UNITS, num_classes)
}

/// `ResNeXt152-IBN-a` (32x4d) for ImageNet-scale inputs.
pub fn resnext152_ibn_a(num_classes: usize) -> ResNeXtIbnConfig {
    imagenet_prefab(&RESNEXT152_UNITS, num_classes)
}

/// `ResNeXt29-IBN-a` (16x8d) for cifar-scale inputs.
pub fn resnext29_ibn_a(num_classes: usize) -> ResNeXtIbnConfig {
    ResNeXtIbnConfig::new(RESNEXT29_UNITS.to_vec(), CIFAR_FILTERS.to_vec(), num_classes)
        .with_cardinality(16)
        .with_dataset(DatasetKind::Cifar10)
        .with_dropout(0.2)
}

/// Look up a prefab config by name.
///
/// # Returns
///
/// A `Result<ResNeXtIbnConfig, String>`; `Err` for unknown names.
pub fn lookup_prefab(
    name: &str,
    num_classes: usize,
) -> Result<ResNeXtIbnConfig, String> {
    match name {
        "resnext29_ibn_a" => Ok(resnext29_ibn_a(num_classes)),
        "resnext50_ibn_a" => Ok(resnext50_ibn_a(num_classes)),
        "resnext101_ibn_a" => Ok(resnext101_ibn_a(num_classes)),
        "resnext152_ibn_a" => Ok(resnext152_ibn_a(num_classes)),
        _ => Err(format!("unknown prefab: {name:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnext::resnext_model::IBN_EXCLUDED_PLANES;

    #[test]
    fn test_imagenet_prefabs() {
        for (name, units) in [
            ("resnext50_ibn_a", RESNEXT50_UNITS),
            ("resnext101_ibn_a", RESNEXT101_UNITS),
            ("resnext152_ibn_a", RESNEXT152_UNITS),
        ] {
            let config = lookup_prefab(name, 1000).unwrap();
            config.expect_valid();
            assert_eq!(config.units, units.to_vec());
            assert_eq!(config.filters, IMAGENET_FILTERS.to_vec());
            assert_eq!(config.num_classes, 1000);
            assert_eq!(config.cardinality, 32);
            assert_eq!(config.dataset, DatasetKind::ImageNet);
            assert_eq!(config.dropout, 0.2);
            assert!(config.ibn);
            assert!(config.bottleneck);
            assert_eq!(config.feature_planes(), IBN_EXCLUDED_PLANES);
        }
    }

    #[test]
    fn test_cifar_prefab() {
        let config = resnext29_ibn_a(10);
        config.expect_valid();
        assert_eq!(config.num_stages(), 3);
        assert_eq!(config.cardinality, 16);
        assert_eq!(config.dataset, DatasetKind::Cifar10);
        assert_eq!(config.feature_planes(), 1024);
    }

    #[test]
    fn test_lookup_prefab_unknown() {
        let err = lookup_prefab("resnext9000", 10).unwrap_err();
        assert_eq!(err, "unknown prefab: \"resnext9000\"");
    }
}
