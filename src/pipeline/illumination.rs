//! Illumination normalization: collapse to luma, then coarse CLAHE.
//!
//! Large tiles equalize each region of the page against itself, so a shadow
//! across one corner or a lamp hot-spot in the middle end up on the same
//! background level.

use crate::buffer::{Layout, PixelBuffer};
use crate::config::IlluminationConfig;
use crate::error::{PipelineError, Stage};
use crate::pipeline::{clahe, ensure_present, stage_output};
use tracing::debug;

/// Flatten uneven lighting. The result is always single-channel.
///
/// # Errors
/// * [`PipelineError::InvalidInput`] for an empty buffer.
/// * [`PipelineError::InvalidConfig`] for a negative clip limit or empty grid.
pub fn flatten_illumination(
    buffer: &PixelBuffer,
    config: &IlluminationConfig,
) -> Result<PixelBuffer, PipelineError> {
    ensure_present(buffer, Stage::Illumination)?;
    config.validate()?;

    let luma = to_luma(buffer)?;
    let (width, height) = (luma.width(), luma.height());
    let data = clahe::equalize(
        Stage::Illumination,
        luma.as_raw(),
        width as usize,
        height as usize,
        config.clip_limit,
        config.tile_grid,
    )?;

    debug!(
        "Illumination flattened {}x{} (clip {}, grid {})",
        width, height, config.clip_limit, config.tile_grid
    );

    stage_output(Stage::Illumination, width, height, Layout::Gray, data)
}

/// ITU-R BT.601 luma in 14-bit fixed point. Gray buffers are copied as is.
pub fn to_luma(buffer: &PixelBuffer) -> Result<PixelBuffer, PipelineError> {
    match buffer.layout() {
        Layout::Gray => Ok(buffer.clone()),
        Layout::Rgb => {
            let data = buffer
                .as_raw()
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect();
            stage_output(Stage::Illumination, buffer.width(), buffer.height(), Layout::Gray, data)
        }
    }
}

const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = R_WEIGHT * u32::from(r) + G_WEIGHT * u32::from(g) + B_WEIGHT * u32::from(b);
    ((y + (1 << (SHIFT - 1))) >> SHIFT) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TileGrid;

    #[test]
    fn luma_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        // 0.299 * 255 = 76.2, 0.587 * 255 = 149.7, 0.114 * 255 = 29.1
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn rgb_collapses_to_one_channel() {
        let rgb = PixelBuffer::new(3, 2, Layout::Rgb, [200u8, 40, 90].repeat(6)).unwrap();
        let out = flatten_illumination(&rgb, &IlluminationConfig::default()).unwrap();
        assert_eq!(out.layout(), Layout::Gray);
        assert_eq!((out.width(), out.height()), (3, 2));
    }

    #[test]
    fn gray_input_is_not_reconverted() {
        let gray = PixelBuffer::gray_filled(4, 4, 33);
        assert_eq!(to_luma(&gray).unwrap(), gray);
    }

    #[test]
    fn single_pixel_survives_default_grid() {
        let px = PixelBuffer::gray_filled(1, 1, 42);
        let out = flatten_illumination(&px, &IlluminationConfig::default()).unwrap();
        assert_eq!((out.width(), out.height(), out.channels()), (1, 1, 1));
    }

    #[test]
    fn shadowed_half_is_lifted() {
        // Text-like texture on a background that drops from 220 to 100 halfway.
        let (w, h) = (128u32, 64u32);
        let data: Vec<u8> = (0..h)
            .flat_map(|y| {
                (0..w).map(move |x| {
                    let background: i32 = if x < w / 2 { 220 } else { 100 };
                    let ink = if (x / 3 + y / 5) % 7 == 0 { -60 } else { 0 };
                    (background + ink) as u8
                })
            })
            .collect();
        let buf = PixelBuffer::new(w, h, Layout::Gray, data).unwrap();
        let config = IlluminationConfig {
            clip_limit: 0.0,
            tile_grid: TileGrid::new(8, 4),
        };
        let out = flatten_illumination(&buf, &config).unwrap();

        let block_mean = |b: &PixelBuffer, x0: u32| {
            let mut sum = 0u32;
            for y in 0..h {
                for x in x0..x0 + 16 {
                    sum += u32::from(b.sample(x, y, 0));
                }
            }
            f64::from(sum) / f64::from(16 * h)
        };
        let before = block_mean(&buf, 0) - block_mean(&buf, w - 16);
        let after = block_mean(&out, 0) - block_mean(&out, w - 16);
        assert!(after.abs() < before.abs() / 4.0, "before {before}, after {after}");
    }

    #[test]
    fn empty_buffer_is_invalid_input() {
        let empty = PixelBuffer::new(0, 5, Layout::Rgb, vec![]).unwrap();
        assert!(matches!(
            flatten_illumination(&empty, &IlluminationConfig::default()),
            Err(PipelineError::InvalidInput {
                stage: Stage::Illumination,
                ..
            })
        ));
    }

    #[test]
    fn negative_clip_limit_is_rejected() {
        let buf = PixelBuffer::gray_filled(2, 2, 0);
        let config = IlluminationConfig {
            clip_limit: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            flatten_illumination(&buf, &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
