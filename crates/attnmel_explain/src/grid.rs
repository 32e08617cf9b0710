//! Tiling a batch of images into one grid image.

use burn::prelude::*;
use ndarray::{s, Array3, Array4, ArrayView3, Axis};

use crate::error::{ExplainError, Result};

/// Pixels between tiles and around the border.
pub const GRID_PADDING: usize = 2;

/// Added to the range when min-max scaling so flat tiles map to 0.
const RANGE_EPS: f32 = 1e-5;

/// Grid layout options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridOptions {
    /// Tiles per row.
    pub nrow: usize,
    /// Padding between tiles, filled with 0.
    pub padding: usize,
    /// Min-max scale every tile to [0, 1] on its own.
    pub scale_each: bool,
}

impl GridOptions {
    /// `nrow` tiles per row, default padding, per-tile scaling.
    #[must_use]
    pub fn new(nrow: usize) -> Self {
        Self {
            nrow,
            padding: GRID_PADDING,
            scale_each: true,
        }
    }

    /// Set the padding.
    #[must_use]
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Enable or disable per-tile scaling.
    #[must_use]
    pub fn with_scale_each(mut self, scale_each: bool) -> Self {
        self.scale_each = scale_each;
        self
    }

    /// Grid shape `(rows, cols)` for `n` tiles.
    #[must_use]
    pub fn layout(&self, n: usize) -> (usize, usize) {
        let cols = self.nrow.max(1).min(n);
        let rows = if cols == 0 { 0 } else { n.div_ceil(cols) };
        (rows, cols)
    }

    /// Pixel size `(height, width)` of the grid for `n` tiles of `h × w`.
    #[must_use]
    pub fn grid_size(&self, n: usize, h: usize, w: usize) -> (usize, usize) {
        let (rows, cols) = self.layout(n);
        (
            rows * (h + self.padding) + self.padding,
            cols * (w + self.padding) + self.padding,
        )
    }
}

/// Copy a tensor to a host array.
///
/// # Errors
///
/// Returns [`ExplainError::InvalidShape`] when the tensor data does not
/// hold `N * C * H * W` values.
pub fn to_array4<B: Backend>(tensor: Tensor<B, 4>) -> Result<Array4<f32>> {
    let [n, c, h, w] = tensor.dims();
    let values: Vec<f32> = tensor.into_data().iter::<f32>().collect();
    let len = values.len();
    Array4::from_shape_vec((n, c, h, w), values).map_err(|_| ExplainError::InvalidShape {
        expected: format!("{} values for ({}, {}, {}, {})", n * c * h * w, n, c, h, w),
        got: format!("{} values", len),
    })
}

/// Min-max scale a tile into [0, 1].
fn scale_tile(tile: ArrayView3<'_, f32>) -> Array3<f32> {
    let min = tile.iter().copied().fold(f32::INFINITY, f32::min);
    let max = tile.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    tile.mapv(|v| (v - min) / (max - min + RANGE_EPS))
}

/// Tile `images` of shape (N, C, H, W) into a (3, H', W') grid.
///
/// Single-channel images are replicated to three channels.
///
/// # Errors
///
/// Fails on an empty batch or a channel count other than 1 or 3.
pub fn make_grid(images: &Array4<f32>, options: GridOptions) -> Result<Array3<f32>> {
    let (n, c, h, w) = images.dim();
    if n == 0 {
        return Err(ExplainError::Empty("no images to tile".into()));
    }
    if c != 1 && c != 3 {
        return Err(ExplainError::InvalidShape {
            expected: "(N, 1 or 3, H, W)".into(),
            got: format!("({}, {}, {}, {})", n, c, h, w),
        });
    }

    let (_, cols) = options.layout(n);
    let (grid_h, grid_w) = options.grid_size(n, h, w);
    let pad = options.padding;
    let mut grid = Array3::<f32>::zeros((3, grid_h, grid_w));

    for (k, image) in images.axis_iter(Axis(0)).enumerate() {
        let tile = if options.scale_each {
            scale_tile(image)
        } else {
            image.to_owned()
        };
        let y = (k / cols) * (h + pad) + pad;
        let x = (k % cols) * (w + pad) + pad;

        for ch in 0..3 {
            let src = if c == 1 { 0 } else { ch };
            grid.slice_mut(s![ch, y..y + h, x..x + w])
                .assign(&tile.index_axis(Axis(0), src));
        }
    }

    Ok(grid)
}
