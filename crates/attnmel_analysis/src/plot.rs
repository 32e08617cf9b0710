//! Rasterized precision-recall plot.
//!
//! Draws the curve as a post-step line over a filled area, recall on the x
//! axis in [0, 1] and precision on the y axis in [0, 1.05].

use image::{Rgb, RgbImage};

use crate::metrics::PrCurve;

/// Plot width in pixels.
pub const PLOT_WIDTH: u32 = 640;
/// Plot height in pixels.
pub const PLOT_HEIGHT: u32 = 480;
/// Upper limit of the precision axis.
pub const Y_MAX: f64 = 1.05;

const MARGIN_LEFT: u32 = 60;
const MARGIN_RIGHT: u32 = 20;
const MARGIN_TOP: u32 = 20;
const MARGIN_BOTTOM: u32 = 50;
const TICK_LEN: u32 = 5;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const CURVE: Rgb<u8> = Rgb([0, 0, 255]);
const ALPHA: f32 = 0.2;

/// Data-to-pixel mapping of the plot area.
struct Frame {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
}

impl Frame {
    fn new() -> Self {
        Self {
            x0: MARGIN_LEFT,
            y0: MARGIN_TOP,
            width: PLOT_WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
            height: PLOT_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM,
        }
    }

    fn px(&self, recall: f64) -> u32 {
        let r = recall.clamp(0.0, 1.0);
        self.x0 + (r * f64::from(self.width - 1)).round() as u32
    }

    fn py(&self, precision: f64) -> u32 {
        let p = (precision / Y_MAX).clamp(0.0, 1.0);
        self.y0 + self.height - 1 - (p * f64::from(self.height - 1)).round() as u32
    }

    fn bottom(&self) -> u32 {
        self.y0 + self.height - 1
    }

    fn right(&self) -> u32 {
        self.x0 + self.width - 1
    }
}

fn blend(image: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>, alpha: f32) {
    let pixel = image.get_pixel_mut(x, y);
    for c in 0..3 {
        let mixed = (1.0 - alpha) * f32::from(pixel[c]) + alpha * f32::from(color[c]);
        pixel[c] = mixed.round() as u8;
    }
}

fn hline(image: &mut RgbImage, x_from: u32, x_to: u32, y: u32, color: Rgb<u8>, alpha: f32) {
    for x in x_from.min(x_to)..=x_from.max(x_to) {
        blend(image, x, y, color, alpha);
    }
}

fn vline(image: &mut RgbImage, x: u32, y_from: u32, y_to: u32, color: Rgb<u8>, alpha: f32) {
    for y in y_from.min(y_to)..=y_from.max(y_to) {
        blend(image, x, y, color, alpha);
    }
}

fn draw_axes(image: &mut RgbImage, frame: &Frame) {
    hline(image, frame.x0, frame.right(), frame.bottom(), AXIS, 1.0);
    vline(image, frame.x0, frame.y0, frame.bottom(), AXIS, 1.0);

    for i in 0..=5 {
        let v = f64::from(i) * 0.2;
        let x = frame.px(v);
        vline(image, x, frame.bottom(), frame.bottom() + TICK_LEN, AXIS, 1.0);
        let y = frame.py(v);
        hline(image, frame.x0 - TICK_LEN, frame.x0, y, AXIS, 1.0);
    }
}

/// Render a precision-recall curve.
///
/// Segment `[recall[k], recall[k + 1]]` is drawn at `precision[k + 1]`, the
/// same steps [`PrCurve::average_precision`] integrates.
pub fn render_pr_curve(curve: &PrCurve) -> RgbImage {
    let mut image = RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND);
    let frame = Frame::new();

    for (k, r) in curve.recall.windows(2).enumerate() {
        let precision = curve.precision[k + 1];
        let (x_from, x_to) = (frame.px(r[0]), frame.px(r[1]));
        let y = frame.py(precision);

        // the left edge column belongs to the previous step
        let start = if k == 0 { x_from } else { x_from + 1 };
        for x in start..=x_to {
            vline(&mut image, x, y, frame.bottom(), CURVE, ALPHA);
        }

        hline(&mut image, x_from, x_to, y, CURVE, ALPHA);
        vline(&mut image, x_from, frame.py(curve.precision[k]), y, CURVE, ALPHA);
    }

    draw_axes(&mut image, &frame);
    image
}
