//! Format normalization: any decoded image → canonical 8-bit, 1 or 3 channels.
//!
//! Samples that are not already `u8` are saturated, not rescaled: values
//! below 0 become 0, values above 255 become 255, everything in between is
//! rounded to the nearest integer. A 16-bit scan therefore comes out mostly
//! white. The later clip limits are tuned for this 8-bit range, so the policy
//! is kept as is rather than stretching the observed min/max.
//!
//! Alpha is dropped without compositing; the colour channels keep their values.

use crate::buffer::{Layout, PixelBuffer, RawImage, SampleData};
use crate::pipeline::stage_output;
use crate::error::{PipelineError, Stage};
use tracing::debug;

/// Convert a decoded image into the canonical 8-bit buffer.
///
/// # Errors
/// [`PipelineError::InvalidInput`] when the image has no pixels.
pub fn normalize(image: &RawImage) -> Result<PixelBuffer, PipelineError> {
    if image.is_empty() {
        return Err(PipelineError::invalid_input(
            Stage::Normalize,
            format!("buffer is empty ({}x{})", image.width(), image.height()),
        ));
    }

    let samples = saturate_samples(image.samples());

    let (layout, data) = match image.channels() {
        1 => (Layout::Gray, samples),
        3 => (Layout::Rgb, samples),
        4 => (Layout::Rgb, drop_alpha(&samples)),
        n => {
            return Err(PipelineError::invalid_input(
                Stage::Normalize,
                format!("unsupported channel count {n}"),
            ))
        }
    };

    debug!(
        "Normalized {}x{} {}ch {} → {:?} u8",
        image.width(),
        image.height(),
        image.channels(),
        image.samples().type_name(),
        layout
    );

    stage_output(Stage::Normalize, image.width(), image.height(), layout, data)
}

fn saturate_samples(samples: &SampleData) -> Vec<u8> {
    match samples {
        SampleData::U8(v) => v.clone(),
        SampleData::U16(v) => v.iter().map(|&s| s.min(255) as u8).collect(),
        SampleData::U32(v) => v.iter().map(|&s| s.min(255) as u8).collect(),
        SampleData::I16(v) => v.iter().map(|&s| s.clamp(0, 255) as u8).collect(),
        SampleData::I32(v) => v.iter().map(|&s| s.clamp(0, 255) as u8).collect(),
        SampleData::F32(v) => v.iter().map(|&s| saturate_f64(f64::from(s))).collect(),
        SampleData::F64(v) => v.iter().map(|&s| saturate_f64(s)).collect(),
    }
}

/// NaN maps to 0.
fn saturate_f64(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

fn drop_alpha(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    rgb
}
