//! Gaussian-mixture background subtractor
//!
//! Per-pixel adaptive background model over grayscale frames. Each pixel
//! keeps a small set of weighted Gaussian modes; a pixel is foreground when
//! its value is not explained by any of the modes that together account for
//! the background portion of the weight mass. Shadow pixels are marked with
//! a distinct mask value when their intensity is a moderate fraction of the
//! background mean.

use image::GrayImage;
use tracing::debug;

/// Mask value for foreground pixels
pub const FOREGROUND: u8 = 255;
/// Mask value for detected shadows
pub const SHADOW: u8 = 127;

/// Modes maintained per pixel
const MODES_PER_PIXEL: usize = 4;
/// Fraction of the weight mass treated as background
const BACKGROUND_RATIO: f32 = 0.9;
/// Variance assigned to a newly created mode
const INITIAL_VARIANCE: f32 = 225.0;
/// Variance floor to keep matching numerically stable
const MIN_VARIANCE: f32 = 4.0;
/// Shadows are intensity ratios in [SHADOW_LOW, SHADOW_HIGH) of the background mean
const SHADOW_LOW: f32 = 0.5;
const SHADOW_HIGH: f32 = 0.95;

#[derive(Debug, Clone, Copy, Default)]
struct Mode {
    weight: f32,
    mean: f32,
    variance: f32,
}

/// MOG2-style background model over one stream's frames
pub struct BackgroundSubtractor {
    width: u32,
    height: u32,
    var_threshold: f32,
    detect_shadows: bool,
    /// Default learning rate derived from the history length
    default_learning_rate: f32,
    /// Flat per-pixel mode storage, `MODES_PER_PIXEL` entries per pixel
    modes: Vec<Mode>,
    /// Number of live modes per pixel
    mode_counts: Vec<u8>,
}

impl BackgroundSubtractor {
    /// Create a model for `width` x `height` frames.
    ///
    /// `history` sets the default learning rate (`1 / history`);
    /// `var_threshold` is the squared-Mahalanobis gate for matching a pixel
    /// to an existing mode.
    #[must_use]
    pub fn new(width: u32, height: u32, history: u32, var_threshold: f32, detect_shadows: bool) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            var_threshold,
            detect_shadows,
            default_learning_rate: 1.0 / history.max(1) as f32,
            modes: vec![Mode::default(); pixels * MODES_PER_PIXEL],
            mode_counts: vec![0; pixels],
        }
    }

    /// Classify one grayscale frame and adapt the model.
    ///
    /// Returns the foreground mask: [`FOREGROUND`] for moving pixels,
    /// [`SHADOW`] for shadow pixels when shadow detection is on, 0 for
    /// background. A `learning_rate` of 0 freezes the model.
    pub fn apply(&mut self, gray: &GrayImage, learning_rate: f32) -> GrayImage {
        debug_assert_eq!((gray.width(), gray.height()), (self.width, self.height));
        let alpha = if learning_rate > 0.0 {
            learning_rate
        } else {
            self.default_learning_rate
        };

        let mut mask = Vec::with_capacity(self.width as usize * self.height as usize);
        for (idx, pixel) in gray.pixels().enumerate() {
            let value = f32::from(pixel[0]);
            mask.push(self.classify_and_update(idx, value, alpha));
        }
        GrayImage::from_raw(self.width, self.height, mask)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    fn classify_and_update(&mut self, pixel_idx: usize, value: f32, alpha: f32) -> u8 {
        let base = pixel_idx * MODES_PER_PIXEL;
        let count = self.mode_counts[pixel_idx] as usize;
        let modes = &mut self.modes[base..base + MODES_PER_PIXEL];

        // Background weight mass: modes are kept sorted by weight, so the
        // first modes up to BACKGROUND_RATIO of total weight describe the
        // background.
        let total_weight: f32 = modes[..count].iter().map(|m| m.weight).sum();
        let mut background_modes = 0;
        let mut cumulative = 0.0;
        for mode in &modes[..count] {
            if cumulative > BACKGROUND_RATIO * total_weight {
                break;
            }
            cumulative += mode.weight;
            background_modes += 1;
        }

        // Find the first matching mode
        let mut matched = None;
        for (i, mode) in modes[..count].iter().enumerate() {
            let d = value - mode.mean;
            if d * d < self.var_threshold * mode.variance {
                matched = Some(i);
                break;
            }
        }

        let label = match matched {
            Some(i) if i < background_modes => 0,
            Some(_) => FOREGROUND,
            None => FOREGROUND,
        };

        // Model update
        match matched {
            Some(i) => {
                let mode = &mut modes[i];
                mode.weight += alpha * (1.0 - mode.weight);
                let rho = alpha / mode.weight.max(alpha);
                let d = value - mode.mean;
                mode.mean += rho * d;
                mode.variance = (mode.variance + rho * (d * d - mode.variance)).max(MIN_VARIANCE);
            }
            None => {
                // Replace the weakest mode (or grow the set) with a fresh one
                let slot = if count < MODES_PER_PIXEL {
                    self.mode_counts[pixel_idx] += 1;
                    count
                } else {
                    count - 1
                };
                modes[slot] = Mode {
                    weight: alpha,
                    mean: value,
                    variance: INITIAL_VARIANCE,
                };
            }
        }

        // Decay every other mode and renormalize
        let count = self.mode_counts[pixel_idx] as usize;
        let mut total = 0.0;
        for (i, mode) in modes[..count].iter_mut().enumerate() {
            if Some(i) != matched {
                mode.weight *= 1.0 - alpha;
            }
            total += mode.weight;
        }
        if total > 0.0 {
            for mode in &mut modes[..count] {
                mode.weight /= total;
            }
        }
        // Keep modes ordered by weight so the background-mass scan stays valid
        modes[..count].sort_by(|a, b| b.weight.total_cmp(&a.weight));

        // Shadow test against the dominant background mode
        if label == FOREGROUND && self.detect_shadows && count > 0 {
            let background_mean = modes[0].mean;
            if background_mean > 0.0 {
                let ratio = value / background_mean;
                if (SHADOW_LOW..SHADOW_HIGH).contains(&ratio) {
                    return SHADOW;
                }
            }
        }
        label
    }

    /// Forget everything and start from an empty model
    pub fn reset(&mut self) {
        self.modes.fill(Mode::default());
        self.mode_counts.fill(0);
        debug!("background model cleared");
    }
}
