//! Geometric upscaling to a minimum working width.
//!
//! The CLAHE tile grids and denoise windows are tuned for pages around
//! 1800 px wide. Narrower images are enlarged to exactly `target_width`
//! with the Catmull-Rom cubic kernel, keeping the aspect ratio up to the
//! rounding of one row. Wider images are returned untouched: detail is never
//! thrown away by downscaling.

use crate::buffer::{Layout, PixelBuffer};
use crate::config::UpscaleConfig;
use crate::error::{PipelineError, Stage};
use crate::pipeline::ensure_present;
use image::imageops::{self, FilterType};
use tracing::debug;

/// What the upscaler will do with an image of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscalePlan {
    /// Already wide enough; the input is returned as is.
    Keep,
    /// Resample to these dimensions.
    Resize { width: u32, height: u32 },
}

/// Decide between keeping and resizing.
///
/// `height` is scaled by `target_width / width` and rounded to the nearest
/// row, never below one.
pub fn plan_upscale(width: u32, height: u32, target_width: u32) -> UpscalePlan {
    if width == 0 || width >= target_width {
        return UpscalePlan::Keep;
    }
    let scale = f64::from(target_width) / f64::from(width);
    let new_height = (f64::from(height) * scale).round().max(1.0) as u32;
    UpscalePlan::Resize {
        width: target_width,
        height: new_height,
    }
}

/// Enlarge `buffer` to `config.target_width` if it is narrower.
pub fn upscale(buffer: &PixelBuffer, config: &UpscaleConfig) -> Result<PixelBuffer, PipelineError> {
    upscale_with_plan(buffer, config).map(|(out, _)| out)
}

/// Like [`upscale`], also reporting which branch was taken.
pub fn upscale_with_plan(
    buffer: &PixelBuffer,
    config: &UpscaleConfig,
) -> Result<(PixelBuffer, UpscalePlan), PipelineError> {
    ensure_present(buffer, Stage::Upscale)?;
    config.validate()?;

    let plan = plan_upscale(buffer.width(), buffer.height(), config.target_width);
    let (width, height) = match plan {
        UpscalePlan::Keep => {
            debug!(
                "Upscale skipped: width {} ≥ target {}",
                buffer.width(),
                config.target_width
            );
            return Ok((buffer.clone(), plan));
        }
        UpscalePlan::Resize { width, height } => (width, height),
    };

    let resized = match buffer.layout() {
        Layout::Gray => {
            let src = buffer
                .to_gray_image()
                .ok_or_else(|| PipelineError::Internal("gray buffer without gray view".into()))?;
            PixelBuffer::from_gray_image(imageops::resize(&src, width, height, FilterType::CatmullRom))
        }
        Layout::Rgb => {
            let src = buffer
                .to_rgb_image()
                .ok_or_else(|| PipelineError::Internal("rgb buffer without rgb view".into()))?;
            PixelBuffer::from_rgb_image(imageops::resize(&src, width, height, FilterType::CatmullRom))
        }
    };

    debug!(
        "Upscaled {}x{} → {}x{}",
        buffer.width(),
        buffer.height(),
        width,
        height
    );

    Ok((resized, plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(target_width: u32) -> UpscaleConfig {
        UpscaleConfig { target_width }
    }

    #[test]
    fn plan_keeps_wide_images() {
        assert_eq!(plan_upscale(1800, 10, 1800), UpscalePlan::Keep);
        assert_eq!(plan_upscale(4000, 3000, 1800), UpscalePlan::Keep);
    }

    #[test]
    fn plan_doubles_900x600() {
        assert_eq!(
            plan_upscale(900, 600, 1800),
            UpscalePlan::Resize {
                width: 1800,
                height: 1200
            }
        );
    }

    #[test]
    fn plan_rounds_height_to_nearest_row() {
        // 7 * 10/3 = 23.33 → 23 ; 8 * 10/3 = 26.67 → 27
        assert_eq!(
            plan_upscale(3, 7, 10),
            UpscalePlan::Resize { width: 10, height: 23 }
        );
        assert_eq!(
            plan_upscale(3, 8, 10),
            UpscalePlan::Resize { width: 10, height: 27 }
        );
    }

    #[test]
    fn plan_never_yields_zero_height() {
        assert_eq!(
            plan_upscale(1000, 1, 1001),
            UpscalePlan::Resize {
                width: 1001,
                height: 1
            }
        );
    }

    #[test]
    fn keep_branch_returns_identical_buffer() {
        let buf = PixelBuffer::gray_filled(20, 5, 77);
        let (out, plan) = upscale_with_plan(&buf, &config(20)).unwrap();
        assert_eq!(plan, UpscalePlan::Keep);
        assert_eq!(out, buf);
    }

    #[test]
    fn resize_preserves_channels_and_constant_colour() {
        let buf = PixelBuffer::new(4, 2, Layout::Rgb, [9u8, 120, 250].repeat(8)).unwrap();
        let (out, plan) = upscale_with_plan(&buf, &config(12)).unwrap();
        assert_eq!(plan, UpscalePlan::Resize { width: 12, height: 6 });
        assert_eq!((out.width(), out.height(), out.channels()), (12, 6, 3));
        for px in out.as_raw().chunks_exact(3) {
            assert_eq!(px, &[9, 120, 250]);
        }
    }

    #[test]
    fn zero_target_width_is_rejected() {
        let buf = PixelBuffer::gray_filled(2, 2, 0);
        assert!(matches!(
            upscale(&buf, &config(0)),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_buffer_is_invalid_input() {
        let buf = PixelBuffer::gray_filled(0, 3, 0);
        assert!(matches!(
            upscale(&buf, &config(10)),
            Err(PipelineError::InvalidInput {
                stage: Stage::Upscale,
                ..
            })
        ));
    }
}
