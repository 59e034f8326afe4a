use tracing::trace;

use crate::config::ColorRange;
use crate::frame::{Frame, Mask};

/// Common contract for the two foreground segmentation strategies.
///
/// `extract` takes `&mut self` because the adaptive variant folds every
/// observed frame into its model; the color variant simply ignores the
/// mutability.
pub trait ForegroundExtractor {
    /// Produce a foreground mask with the frame's spatial dimensions.
    fn extract(&mut self, frame: &Frame) -> Mask;

    /// Drop any accumulated model state.
    fn reset(&mut self);
}

// Smoothing pass before thresholding: 11-tap separable Gaussian,
// sigma 2.0, clamp-to-edge borders.
const BLUR_TAPS: usize = 11;
const BLUR_SIGMA: f64 = 2.0;

fn blur_kernel() -> [f64; BLUR_TAPS] {
    let half = (BLUR_TAPS / 2) as isize;
    let mut kernel = [0.0; BLUR_TAPS];
    let mut sum = 0.0;
    for (i, tap) in kernel.iter_mut().enumerate() {
        let d = (i as isize - half) as f64;
        *tap = (-d * d / (2.0 * BLUR_SIGMA * BLUR_SIGMA)).exp();
        sum += *tap;
    }
    for tap in kernel.iter_mut() {
        *tap /= sum;
    }
    kernel
}

/// Per-channel separable Gaussian blur, suppressing sensor noise ahead
/// of the color threshold.
fn gaussian_blur(frame: &Frame) -> Frame {
    let (w, h, c) = (frame.width(), frame.height(), frame.channels());
    if w == 0 || h == 0 {
        return frame.clone();
    }
    let kernel = blur_kernel();
    let half = (BLUR_TAPS / 2) as isize;

    // Horizontal pass into an f32 plane, then vertical pass back to u8.
    let mut rows = vec![0.0f32; w * h * c];
    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                let mut acc = 0.0;
                for (ki, &tap) in kernel.iter().enumerate() {
                    let sx = (x as isize + ki as isize - half).clamp(0, w as isize - 1) as usize;
                    acc += frame.pixel(sx, y)[ch] as f64 * tap;
                }
                rows[(y * w + x) * c + ch] = acc as f32;
            }
        }
    }
    let mut out = Frame::new(w, h, c);
    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                let mut acc = 0.0;
                for (ki, &tap) in kernel.iter().enumerate() {
                    let sy = (y as isize + ki as isize - half).clamp(0, h as isize - 1) as usize;
                    acc += rows[(sy * w + x) * c + ch] as f64 * tap;
                }
                out.set_channel(x, y, ch, acc.round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

/// RGB to HSV with 8-bit OpenCV-style ranges: hue in [0, 179],
/// saturation and value in [0, 255].
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = v - min;

    let s = if v == 0.0 { 0.0 } else { 255.0 * delta / v };
    let h = if delta == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / delta
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        (h / 2.0).round().min(179.0) as u8,
        s.round() as u8,
        v.round() as u8,
    ]
}

fn erode(mask: &Mask) -> Mask {
    let (w, h) = (mask.width(), mask.height());
    let mut out = Mask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) {
                continue;
            }
            let mut keep = true;
            'probe: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    // The frame edge does not erode.
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    if !mask.get(nx as usize, ny as usize) {
                        keep = false;
                        break 'probe;
                    }
                }
            }
            out.set(x, y, keep);
        }
    }
    out
}

fn dilate(mask: &Mask) -> Mask {
    let (w, h) = (mask.width(), mask.height());
    let mut out = Mask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut hit = false;
            'probe: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    if mask.get(nx as usize, ny as usize) {
                        hit = true;
                        break 'probe;
                    }
                }
            }
            out.set(x, y, hit);
        }
    }
    out
}

/// Morphological opening with a 3x3 rectangular structuring element,
/// one iteration each: removes speckle, then rejoins fragmented regions.
fn open(mask: &Mask) -> Mask {
    dilate(&erode(mask))
}

/// Thresholds a smoothed, HSV-converted frame against a low/high range.
///
/// Stateless between frames: the mask depends only on the supplied
/// frame and the configured range.
pub struct ColorRangeExtractor {
    range: ColorRange,
}

impl ColorRangeExtractor {
    pub fn new(range: ColorRange) -> Self {
        ColorRangeExtractor { range }
    }

    pub fn set_range(&mut self, range: ColorRange) {
        self.range = range;
    }

    pub fn range(&self) -> ColorRange {
        self.range
    }
}

impl ForegroundExtractor for ColorRangeExtractor {
    fn extract(&mut self, frame: &Frame) -> Mask {
        let mut mask = Mask::new(frame.width(), frame.height());
        if frame.channels() != 3 {
            // Only color input can be range-thresholded; an all-false
            // mask is a valid degenerate output.
            return mask;
        }
        let blurred = gaussian_blur(frame);
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let px = blurred.pixel(x, y);
                mask.set(x, y, self.range.contains(rgb_to_hsv(px[0], px[1], px[2])));
            }
        }
        open(&mask)
    }

    fn reset(&mut self) {}
}

// Adaptive background model tuning. Deviations are compared in units of
// the per-pixel variance, so the threshold is scale free.
const LEARNING_RATE: f32 = 0.02;
const DEVIATION_THRESHOLD: f32 = 16.0;
const INITIAL_VARIANCE: f32 = 30.0;
const MIN_VARIANCE: f32 = 4.0;

struct BackgroundModel {
    mean: Vec<f32>,
    variance: Vec<f32>,
    width: usize,
    height: usize,
}

/// Per-pixel running Gaussian background model over luminance.
///
/// Every observed frame is folded into the model, so the extractor must
/// be fed continuously while active or the model drifts away from the
/// scene. Non-outlier pixels are absorbed at a slow rate, which rides
/// out gradual illumination changes; a scene cut needs [`reset`].
///
/// [`reset`]: ForegroundExtractor::reset
pub struct AdaptiveBackgroundExtractor {
    model: Option<BackgroundModel>,
}

impl AdaptiveBackgroundExtractor {
    pub fn new() -> Self {
        AdaptiveBackgroundExtractor { model: None }
    }
}

impl Default for AdaptiveBackgroundExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundExtractor for AdaptiveBackgroundExtractor {
    fn extract(&mut self, frame: &Frame) -> Mask {
        let (w, h) = (frame.width(), frame.height());

        let needs_init = match &self.model {
            Some(m) => m.width != w || m.height != h,
            None => true,
        };
        if needs_init {
            trace!(width = w, height = h, "initializing background model");
            let mut mean = vec![0.0; w * h];
            for y in 0..h {
                for x in 0..w {
                    mean[y * w + x] = frame.luma(x, y);
                }
            }
            self.model = Some(BackgroundModel {
                mean,
                variance: vec![INITIAL_VARIANCE; w * h],
                width: w,
                height: h,
            });
            // Everything is background on the frame that seeds the model.
            return Mask::new(w, h);
        }

        let model = match self.model.as_mut() {
            Some(m) => m,
            None => return Mask::new(w, h),
        };
        let mut mask = Mask::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let idx = y * w + x;
                let deviation = frame.luma(x, y) - model.mean[idx];
                let squared = deviation * deviation;
                if squared > DEVIATION_THRESHOLD * model.variance[idx] {
                    mask.set(x, y, true);
                } else {
                    model.mean[idx] += LEARNING_RATE * deviation;
                    model.variance[idx] = (model.variance[idx]
                        + LEARNING_RATE * (squared - model.variance[idx]))
                        .max(MIN_VARIANCE);
                }
            }
        }
        open(&mask)
    }

    fn reset(&mut self) {
        self.model = None;
    }
}
