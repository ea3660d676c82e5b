//! Pipeline stages for document image enhancement.
//!
//! Each submodule implements exactly one transformation step. Every stage
//! borrows its input and returns a freshly allocated buffer, so stages can be
//! called on their own or composed by [`crate::enhance::enhance`].
//!
//! ## Data Flow
//!
//! ```text
//! normalize ──▶ upscale ──▶ illumination ──▶ denoise ──▶ contrast
//! (8-bit,1|3ch)  (≥1800 px)   (luma + CLAHE)   (NL-means)  (CLAHE)
//! ```
//!
//! 1. [`normalize`]    — saturate samples to 8 bits and drop alpha
//! 2. [`upscale`]      — enlarge narrow images with a cubic kernel, never shrink
//! 3. [`illumination`] — collapse to one luma channel, flatten lighting with coarse CLAHE
//! 4. [`denoise`]      — patch-based non-local means, single channel only
//! 5. [`contrast`]     — finer CLAHE to restore local contrast, single channel only
//!
//! [`clahe`] holds the tiled, clipped histogram equalization shared by
//! stages 3 and 5; [`io`] adapts files to and from the `image` crate for
//! callers that do not decode themselves.

pub mod clahe;
pub mod contrast;
pub mod denoise;
pub mod illumination;
pub mod io;
pub mod normalize;
pub mod upscale;

use crate::buffer::{Layout, PixelBuffer};
use crate::error::{PipelineError, Stage};

/// Fail fast on an empty buffer.
pub(crate) fn ensure_present(buffer: &PixelBuffer, stage: Stage) -> Result<(), PipelineError> {
    if buffer.is_empty() {
        return Err(PipelineError::invalid_input(
            stage,
            format!("buffer is empty ({}x{})", buffer.width(), buffer.height()),
        ));
    }
    Ok(())
}

/// Reject anything but a single-channel buffer.
pub(crate) fn ensure_single_channel(buffer: &PixelBuffer, stage: Stage) -> Result<(), PipelineError> {
    if buffer.channels() != 1 {
        return Err(PipelineError::ShapeMismatch {
            stage,
            expected: 1,
            found: buffer.channels(),
        });
    }
    Ok(())
}

/// Wrap a stage's output plane. A length that disagrees with the shape is a
/// bug in that stage, reported against it.
pub(crate) fn stage_output(
    stage: Stage,
    width: u32,
    height: u32,
    layout: Layout,
    data: Vec<u8>,
) -> Result<PixelBuffer, PipelineError> {
    PixelBuffer::new(width, height, layout, data)
        .map_err(|e| PipelineError::Internal(format!("{stage} produced a bad buffer: {e}")))
}

/// Mirror an out-of-range index back into `0..n` without repeating the edge
/// sample (`dcb|abcd|cba`), for any distance from the border.
pub(crate) fn reflect_101(i: isize, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let i = i.rem_euclid(period);
    if i < n as isize {
        i as usize
    } else {
        (period - i) as usize
    }
}
