//! Non-local means denoising for single-channel images.
//!
//! Every output pixel is a weighted average of the pixels in a
//! `search_window²` neighbourhood. A candidate's weight depends on how much
//! the `template_window²` patch around it resembles the patch around the
//! pixel being filtered:
//!
//! ```text
//! w = exp(-(SSD / template_window²) / strength²)
//! ```
//!
//! so repeated texture such as paper grain averages out while edges, whose
//! patches have no close match across the edge, are kept sharp.
//!
//! The naive form costs `search² · template²` per pixel. Here each search
//! offset is handled for a whole band of rows at once: the squared
//! differences between the image and its shifted copy are summed with a
//! sliding box, which drops the per-pixel patch cost to a constant. Bands are
//! filtered in parallel on the rayon pool.
//!
//! Borders are handled by reflecting the image (`dcb|abcd|cba`), so every
//! pixel has a full search neighbourhood.

use crate::buffer::{Layout, PixelBuffer};
use crate::config::DenoiseConfig;
use crate::error::{PipelineError, Stage};
use crate::pipeline::{ensure_present, ensure_single_channel, reflect_101, stage_output};
use rayon::prelude::*;
use tracing::debug;

/// Largest mean squared difference between two 8-bit patches.
const MAX_MEAN_SQ_DIST: usize = 255 * 255;

/// Minimum rows per parallel band.
const MIN_BAND_ROWS: usize = 8;

/// Smooth noise while keeping edges.
///
/// # Errors
/// * [`PipelineError::InvalidInput`] for an empty buffer.
/// * [`PipelineError::ShapeMismatch`] for anything but one channel.
/// * [`PipelineError::InvalidConfig`] for a non-positive strength or an even window.
pub fn denoise(buffer: &PixelBuffer, config: &DenoiseConfig) -> Result<PixelBuffer, PipelineError> {
    ensure_present(buffer, Stage::Denoise)?;
    ensure_single_channel(buffer, Stage::Denoise)?;
    config.validate()?;

    let width = buffer.width() as usize;
    let height = buffer.height() as usize;
    let params = Params::new(config);
    let padded = Padded::new(buffer.as_raw(), width, height, params.tr + params.sr);

    let band = height
        .div_ceil(rayon::current_num_threads() * 4)
        .max(MIN_BAND_ROWS);

    let mut out = vec![0u8; width * height];
    out.par_chunks_mut(band * width)
        .enumerate()
        .for_each(|(i, dst)| filter_band(&padded, &params, i * band, dst));

    debug!(
        "Denoised {}x{} (h={}, template {}, search {})",
        width, height, config.strength, config.template_window, config.search_window
    );

    stage_output(Stage::Denoise, buffer.width(), buffer.height(), Layout::Gray, out)
}

struct Params {
    /// Template radius.
    tr: usize,
    /// Search radius.
    sr: usize,
    /// Pixels per template.
    area: u64,
    /// `exp(-d / h²)` for every mean squared distance `d`.
    weights: Vec<f64>,
}

impl Params {
    fn new(config: &DenoiseConfig) -> Self {
        let tr = (config.template_window / 2) as usize;
        let sr = (config.search_window / 2) as usize;
        let tw = 2 * tr as u64 + 1;
        let h2 = config.strength * config.strength;
        let weights = (0..=MAX_MEAN_SQ_DIST)
            .map(|d| (-(d as f64) / h2).exp())
            .collect();
        Self {
            tr,
            sr,
            area: tw * tw,
            weights,
        }
    }

    fn weight(&self, ssd: u64) -> f64 {
        let mean = ((ssd + self.area / 2) / self.area) as usize;
        self.weights[mean.min(MAX_MEAN_SQ_DIST)]
    }
}

/// The source image reflected outward by `pad` pixels on every side.
struct Padded {
    data: Vec<u8>,
    stride: usize,
    width: usize,
    pad: usize,
}

impl Padded {
    fn new(src: &[u8], width: usize, height: usize, pad: usize) -> Self {
        let stride = width + 2 * pad;
        let cols: Vec<usize> = (0..stride)
            .map(|px| reflect_101(px as isize - pad as isize, width))
            .collect();
        let mut data = Vec::with_capacity(stride * (height + 2 * pad));
        for py in 0..height + 2 * pad {
            let row = &src[reflect_101(py as isize - pad as isize, height) * width..][..width];
            data.extend(cols.iter().map(|&x| row[x]));
        }
        Self {
            data,
            stride,
            width,
            pad,
        }
    }

    fn row(&self, py: usize) -> &[u8] {
        &self.data[py * self.stride..][..self.stride]
    }
}

/// Filter output rows `y0..y0 + dst.len() / width` into `dst`.
fn filter_band(padded: &Padded, params: &Params, y0: usize, dst: &mut [u8]) {
    let width = padded.width;
    let rows = dst.len() / width;
    let (tr, sr, pad) = (params.tr, params.sr, padded.pad);
    let tw = 2 * tr + 1;
    let patch_rows = rows + 2 * tr;

    let mut num = vec![0f64; rows * width];
    let mut den = vec![0f64; rows * width];
    let mut diff = vec![0u64; width + 2 * tr];
    let mut row_sums = vec![0u64; patch_rows * width];
    let mut ssd = vec![0u64; width];

    let radius = sr as isize;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            // Horizontal box sums of squared differences, one row per patch row.
            for r in 0..patch_rows {
                let py = y0 + sr + r;
                let a = &padded.row(py)[sr..];
                let b = &padded.row(py.wrapping_add_signed(dy))[sr.wrapping_add_signed(dx)..];
                for (d, (&p, &q)) in diff.iter_mut().zip(a.iter().zip(b)) {
                    let e = i64::from(p) - i64::from(q);
                    *d = (e * e) as u64;
                }
                let sums = &mut row_sums[r * width..(r + 1) * width];
                let mut s: u64 = diff[..tw].iter().sum();
                sums[0] = s;
                for x in 1..width {
                    s = s + diff[x + tw - 1] - diff[x - 1];
                    sums[x] = s;
                }
            }

            // Vertical sliding sum turns row sums into patch SSDs.
            ssd.fill(0);
            for r in 0..tw {
                for (acc, &v) in ssd.iter_mut().zip(&row_sums[r * width..(r + 1) * width]) {
                    *acc += v;
                }
            }
            for y in 0..rows {
                if y > 0 {
                    let add = &row_sums[(y + tw - 1) * width..(y + tw) * width];
                    let sub = &row_sums[(y - 1) * width..y * width];
                    for ((acc, &a), &s) in ssd.iter_mut().zip(add).zip(sub) {
                        *acc = *acc + a - s;
                    }
                }
                let cand = &padded.row((y0 + y + pad).wrapping_add_signed(dy))
                    [pad.wrapping_add_signed(dx)..][..width];
                let n = &mut num[y * width..(y + 1) * width];
                let d = &mut den[y * width..(y + 1) * width];
                for x in 0..width {
                    let w = params.weight(ssd[x]);
                    n[x] += w * f64::from(cand[x]);
                    d[x] += w;
                }
            }
        }
    }

    // The zero offset always contributes weight 1, so `den >= 1`.
    for ((out, &n), &d) in dst.iter_mut().zip(&num).zip(&den) {
        *out = (n / d).round().clamp(0.0, 255.0) as u8;
    }
}
