//! # attnmel_explain
//!
//! Attention map visualization for attnmel.
//!
//! This crate provides:
//! - Image grids of a batch, min-max scaled per tile
//! - Jet heatmaps of attention maps blended over the image grid
//! - Image sinks that persist tagged images per step

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod colormap;
mod error;
pub mod grid;
mod sink;
mod visualize;

pub use colormap::{apply_jet, jet};
pub use error::{ExplainError, Result};
pub use grid::{make_grid, to_array4, GridOptions, GRID_PADDING};
pub use sink::{to_rgb_image, ImageSink, PngDirSink};
pub use visualize::{
    image_grid, up_factor, visualize_attention, AttentionOverlay, AttentionStats, HEATMAP_WEIGHT,
    IMAGE_WEIGHT,
};
