//! Attention heatmaps blended over input images.

use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::colormap::apply_jet;
use crate::error::{ExplainError, Result};
use crate::grid::{make_grid, to_array4, GridOptions};

/// Weight of the image in the blend.
pub const IMAGE_WEIGHT: f32 = 0.4;
/// Weight of the heatmap in the blend.
pub const HEATMAP_WEIGHT: f32 = 0.6;

/// Summary statistics of an upsampled attention map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttentionStats {
    /// Largest value.
    pub max: f32,
    /// Smallest value.
    pub min: f32,
    /// Mean value.
    pub mean: f32,
}

/// A rendered attention overlay.
#[derive(Debug, Clone)]
pub struct AttentionOverlay {
    /// Blended (3, H, W) image in [0, 1].
    pub image: Array3<f32>,
    /// Statistics of the upsampled map, before per-tile scaling.
    pub stats: AttentionStats,
}

/// Factor that brings an attention map of side `map_size` to `image_size`.
///
/// # Errors
///
/// Fails when `image_size` is not a positive multiple of `map_size`.
pub fn up_factor(image_size: usize, map_size: usize) -> Result<usize> {
    if map_size == 0 || image_size % map_size != 0 {
        return Err(ExplainError::InvalidShape {
            expected: format!("a map side dividing {}", image_size),
            got: map_size.to_string(),
        });
    }
    Ok(image_size / map_size)
}

/// Overlay attention maps on an image grid.
///
/// `image_grid` is the (3, H, W) grid of the same samples built with the
/// same `options`, already in [0, 1]. `attention` has shape (N, 1, h, w)
/// and is upsampled bilinearly by `up_factor` before tiling. Each tile is
/// min-max scaled, colored with jet and blended as
/// `0.4 * image + 0.6 * heatmap`.
///
/// # Errors
///
/// Fails when the tiled heatmap and the image grid differ in size.
pub fn visualize_attention<B: Backend>(
    image_grid: &Array3<f32>,
    attention: Tensor<B, 4>,
    up_factor: usize,
    options: GridOptions,
) -> Result<AttentionOverlay> {
    let attention = if up_factor > 1 {
        let [_, _, h, w] = attention.dims();
        interpolate(
            attention,
            [h * up_factor, w * up_factor],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        )
    } else {
        attention
    };

    let stats = AttentionStats {
        max: attention.clone().max().into_scalar().elem(),
        min: attention.clone().min().into_scalar().elem(),
        mean: attention.clone().mean().into_scalar().elem(),
    };

    let maps = to_array4(attention)?;
    let grid = make_grid(&maps, options.with_scale_each(true))?;
    if grid.dim() != image_grid.dim() {
        return Err(ExplainError::InvalidShape {
            expected: format!("{:?}", image_grid.dim()),
            got: format!("{:?}", grid.dim()),
        });
    }

    // channels are replicated, any one will do
    let heatmap = apply_jet(&grid.index_axis(Axis(0), 0).to_owned());
    let image = image_grid.mapv(|v| IMAGE_WEIGHT * v) + heatmap.mapv(|v| HEATMAP_WEIGHT * v);

    tracing::trace!(max = stats.max, min = stats.min, mean = stats.mean, "attention overlay");
    Ok(AttentionOverlay { image, stats })
}

/// Tile a batch of normalized input images for display.
///
/// # Errors
///
/// Fails on an empty batch or an unsupported channel count.
pub fn image_grid<B: Backend>(images: Tensor<B, 4>, options: GridOptions) -> Result<Array3<f32>> {
    make_grid(&to_array4(images)?, options.with_scale_each(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colormap::jet;
    use approx::assert_relative_eq;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn images(n: usize, size: usize) -> Tensor<TestBackend, 4> {
        Tensor::random([n, 3, size, size], Distribution::Normal(0.0, 1.0), &Default::default())
    }

    #[test]
    fn test_up_factor() {
        assert_eq!(up_factor(256, 32).unwrap(), 8);
        assert_eq!(up_factor(256, 256).unwrap(), 1);
        assert!(up_factor(256, 30).is_err());
        assert!(up_factor(256, 0).is_err());
    }

    #[test]
    fn test_uniform_map_gives_flat_jet_baseline() {
        let device = Default::default();
        let options = GridOptions::new(2);
        let grid = image_grid(images(4, 8), options).unwrap();

        let attention = Tensor::<TestBackend, 4>::full([4, 1, 2, 2], 0.25, &device);
        let overlay = visualize_attention(&grid, attention, 4, options).unwrap();

        let base = jet(0.0);
        for ((c, y, x), &v) in overlay.image.indexed_iter() {
            let expected = IMAGE_WEIGHT * grid[[c, y, x]] + HEATMAP_WEIGHT * base[c];
            assert!((v - expected).abs() < 1e-5);
        }
        assert_relative_eq!(overlay.stats.mean, 0.25, epsilon = 1e-6);
        assert_relative_eq!(overlay.stats.max, overlay.stats.min, epsilon = 1e-6);
    }

    #[test]
    fn test_stats_of_peaked_map() {
        let device = Default::default();
        let options = GridOptions::new(1);
        let grid = image_grid(images(1, 4), options).unwrap();

        let attention = Tensor::<TestBackend, 1>::from_floats([0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0], &device)
            .reshape([1, 1, 3, 3]);
        let err = visualize_attention(&grid, attention.clone(), 1, options);
        assert!(matches!(err, Err(ExplainError::InvalidShape { .. })));

        let grid = image_grid(images(1, 3), options).unwrap();
        let overlay = visualize_attention(&grid, attention, 1, options).unwrap();
        assert_relative_eq!(overlay.stats.max, 1.0);
        assert_relative_eq!(overlay.stats.min, 0.0);
        assert_relative_eq!(overlay.stats.mean, 1.0 / 9.0, epsilon = 1e-6);
        assert!(overlay.image.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
