//! # `ResNeXt` Utilities
use bimm_contracts::unpack_shape_contract;

/// Divide a spatial resolution by a stride.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in=height_out*stride, width_in=width_out*stride]``.
///
/// # Returns
///
/// ``[height_out, width_out]``
///
/// # Panics
///
/// If the input resolution is not a multiple of the stride.
#[inline(always)]
pub fn stride_div_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    unpack_shape_contract!(
        [
            "height_in" = "height_out" * "stride",
            "width_in" = "width_out" * "stride"
        ],
        &input_resolution,
        &["height_out", "width_out"],
        &[("stride", stride)]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_div_resolution() {
        assert_eq!(stride_div_resolution([12, 24], 1), [12, 24]);
        assert_eq!(stride_div_resolution([12, 24], 2), [6, 12]);
        assert_eq!(stride_div_resolution([12, 24], 4), [3, 6]);
    }

    #[test]
    #[should_panic]
    fn test_stride_div_resolution_indivisible() {
        stride_div_resolution([7, 8], 2);
    }
}
