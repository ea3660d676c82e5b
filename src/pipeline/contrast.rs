//! Final local contrast pass.
//!
//! Same equalization as the illumination stage, on a finer grid and with a
//! higher clip limit, to bring back the stroke contrast the denoiser softened.

use crate::buffer::{Layout, PixelBuffer};
use crate::config::ContrastConfig;
use crate::error::{PipelineError, Stage};
use crate::pipeline::{clahe, ensure_present, ensure_single_channel, stage_output};
use tracing::debug;

/// Boost local contrast of a single-channel buffer.
///
/// # Errors
/// * [`PipelineError::InvalidInput`] for an empty buffer.
/// * [`PipelineError::ShapeMismatch`] for anything but one channel.
/// * [`PipelineError::InvalidConfig`] for a negative clip limit or empty grid.
pub fn enhance_contrast(buffer: &PixelBuffer, config: &ContrastConfig) -> Result<PixelBuffer, PipelineError> {
    ensure_present(buffer, Stage::Contrast)?;
    ensure_single_channel(buffer, Stage::Contrast)?;
    config.validate()?;

    let data = clahe::equalize(
        Stage::Contrast,
        buffer.as_raw(),
        buffer.width() as usize,
        buffer.height() as usize,
        config.clip_limit,
        config.tile_grid,
    )?;

    debug!(
        "Contrast enhanced {}x{} (clip {}, grid {})",
        buffer.width(),
        buffer.height(),
        config.clip_limit,
        config.tile_grid
    );

    stage_output(Stage::Contrast, buffer.width(), buffer.height(), Layout::Gray, data)
}
