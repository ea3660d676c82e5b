//! Contrast Limited Adaptive Histogram Equalization on 8-bit single-channel data.
//!
//! Shared by the illumination normalizer (coarse grid) and the contrast
//! enhancer (fine grid).
//!
//! ## Algorithm
//!
//! 1. The image is virtually extended by reflection (`dcb|abcd|cba`) on the
//!    right and bottom until both sides divide evenly by the grid, so every
//!    tile has the same size and is at least one pixel even when the grid is
//!    larger than the image.
//! 2. Per tile: 256-bin histogram, bins clipped at
//!    `max(1, ⌊clip_limit · tile_area / 256⌋)`, the clipped mass spread
//!    uniformly (whole batches first, the remainder one count per bin with a
//!    fixed stride), then the cumulative sum scaled to `[0, 255]` becomes the
//!    tile's lookup table. A clip limit of 0 skips clipping.
//! 3. Per pixel: bilinear blend of the four lookup tables whose tile centres
//!    surround it. Tiles along the border use their own table on the outer
//!    side, which removes the block seams plain tiling would leave.
//!
//! Reference: Zuiderveld (1994), "Contrast Limited Adaptive Histogram
//! Equalization", Graphics Gems IV.

use crate::config::TileGrid;
use crate::error::{PipelineError, Stage};
use crate::pipeline::reflect_101;
use rayon::prelude::*;

const BINS: usize = 256;

/// Equalize `src` (`width * height` samples, row-major) and return a new plane.
///
/// A zero dimension or a sample count that disagrees with the shape is
/// reported as invalid input to `stage`.
pub(crate) fn equalize(
    stage: Stage,
    src: &[u8],
    width: usize,
    height: usize,
    clip_limit: f64,
    grid: TileGrid,
) -> Result<Vec<u8>, PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::invalid_input(
            stage,
            format!("cannot equalize a {width}x{height} plane"),
        ));
    }
    if src.len() != width * height {
        return Err(PipelineError::invalid_input(
            stage,
            format!("{width}x{height} plane needs {} samples, got {}", width * height, src.len()),
        ));
    }
    let tiles_x = grid.cols.max(1) as usize;
    let tiles_y = grid.rows.max(1) as usize;

    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);
    let tile_area = tile_w * tile_h;

    let clip = (clip_limit > 0.0).then(|| ((clip_limit * tile_area as f64 / BINS as f64) as usize).max(1));

    let luts = tile_luts(src, width, height, tiles_x, tiles_y, tile_w, tile_h, clip);

    let cols = axis_weights(width, tile_w, tiles_x);
    let rows = axis_weights(height, tile_h, tiles_y);

    let mut out = vec![0u8; width * height];
    out.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .enumerate()
        .for_each(|(y, (dst, row))| {
            let (ty1, ty2, ya) = rows[y];
            let lut_row1 = &luts[ty1 * tiles_x..(ty1 + 1) * tiles_x];
            let lut_row2 = &luts[ty2 * tiles_x..(ty2 + 1) * tiles_x];
            for (x, (d, &v)) in dst.iter_mut().zip(row).enumerate() {
                let (tx1, tx2, xa) = cols[x];
                let v = v as usize;
                let top = lut_row1[tx1][v] as f32 * (1.0 - xa) + lut_row1[tx2][v] as f32 * xa;
                let bottom = lut_row2[tx1][v] as f32 * (1.0 - xa) + lut_row2[tx2][v] as f32 * xa;
                *d = saturate(top * (1.0 - ya) + bottom * ya);
            }
        });
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn tile_luts(
    src: &[u8],
    width: usize,
    height: usize,
    tiles_x: usize,
    tiles_y: usize,
    tile_w: usize,
    tile_h: usize,
    clip: Option<usize>,
) -> Vec<[u8; BINS]> {
    let lut_scale = 255.0 / (tile_w * tile_h) as f32;

    (0..tiles_x * tiles_y)
        .into_par_iter()
        .map(|t| {
            let (tx, ty) = (t % tiles_x, t / tiles_x);
            let mut hist = [0usize; BINS];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let row = &src[reflect_101(y as isize, height) * width..][..width];
                for x in tx * tile_w..(tx + 1) * tile_w {
                    hist[row[reflect_101(x as isize, width)] as usize] += 1;
                }
            }
            if let Some(limit) = clip {
                clip_histogram(&mut hist, limit);
            }

            let mut lut = [0u8; BINS];
            let mut sum = 0usize;
            for (entry, &count) in lut.iter_mut().zip(hist.iter()) {
                sum += count;
                *entry = saturate(sum as f32 * lut_scale);
            }
            lut
        })
        .collect()
}

/// Clip every bin at `limit` and hand the excess back out evenly.
pub(crate) fn clip_histogram(hist: &mut [usize; BINS], limit: usize) {
    let mut clipped = 0;
    for bin in hist.iter_mut() {
        if *bin > limit {
            clipped += *bin - limit;
            *bin = limit;
        }
    }

    let batch = clipped / BINS;
    let residual = clipped % BINS;
    for bin in hist.iter_mut() {
        *bin += batch;
    }

    if residual != 0 {
        let step = (BINS / residual).max(1);
        for bin in hist.iter_mut().step_by(step).take(residual) {
            *bin += 1;
        }
    }
}

/// For each coordinate along one axis: the two neighbouring tile indices and
/// the blend weight towards the second one.
fn axis_weights(len: usize, tile: usize, tiles: usize) -> Vec<(usize, usize, f32)> {
    let inv = 1.0 / tile as f32;
    (0..len)
        .map(|i| {
            let f = i as f32 * inv - 0.5;
            let lo = f.floor();
            let a = f - lo;
            let t1 = (lo as isize).max(0) as usize;
            let t2 = ((lo as isize + 1).max(0) as usize).min(tiles - 1);
            (t1.min(tiles - 1), t2, a)
        })
        .collect()
}

fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
