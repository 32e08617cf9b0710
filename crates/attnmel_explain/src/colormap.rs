//! Jet colormap.

use ndarray::{Array2, Array3};

/// Map `value` in [0, 1] to jet RGB in [0, 1].
///
/// Runs dark blue, blue, cyan, yellow, red, dark red; `jet(0.0)` is
/// `(0, 0, 0.5)`.
pub fn jet(value: f32) -> [f32; 3] {
    let x = value.clamp(0.0, 1.0);
    let channel = |center: f32| (1.5 - (4.0 * x - center).abs()).clamp(0.0, 1.0);
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Quantize to 8 bits, as a byte-valued heatmap would be, then apply [`jet`].
pub fn jet_quantized(value: f32) -> [f32; 3] {
    let level = (value.clamp(0.0, 1.0) * 255.0).floor();
    jet(level / 255.0)
}

/// Colorize a (H, W) map into a (3, H, W) image.
pub fn apply_jet(map: &Array2<f32>) -> Array3<f32> {
    let (h, w) = map.dim();
    let mut out = Array3::<f32>::zeros((3, h, w));
    for ((y, x), &v) in map.indexed_iter() {
        let rgb = jet_quantized(v);
        for (c, value) in rgb.into_iter().enumerate() {
            out[[c, y, x]] = value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_jet_anchors() {
        assert_eq!(jet(0.0), [0.0, 0.0, 0.5]);
        assert_eq!(jet(0.5), [0.5, 1.0, 0.5]);
        assert_eq!(jet(1.0), [0.5, 0.0, 0.0]);
        assert_eq!(jet(-3.0), jet(0.0));
    }

    #[test]
    fn test_quantization() {
        assert_eq!(jet_quantized(0.001), jet(0.0));
        assert_relative_eq!(jet_quantized(1.0)[0], 0.5);
    }

    #[test]
    fn test_apply_jet_shape() {
        let map = Array2::from_shape_vec((1, 2), vec![0.0, 1.0]).unwrap();
        let rgb = apply_jet(&map);
        assert_eq!(rgb.dim(), (3, 1, 2));
        assert_relative_eq!(rgb[[2, 0, 0]], 0.5);
        assert_relative_eq!(rgb[[0, 0, 1]], 0.5);
    }
}
