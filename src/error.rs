//! Error types for the docnorm library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal** for the image being processed: the buffer
//!   is missing, a stage was called out of order, a parameter is out of range,
//!   or the input file cannot be read. Returned as `Err(PipelineError)` from
//!   every stage and from [`crate::enhance::enhance`].
//!
//! * [`ImageError`] — **Non-fatal** for a batch: one image failed but all other
//!   images are fine. Stored inside [`crate::output::ImageResult`] so callers
//!   can inspect partial success rather than losing the whole batch to one bad
//!   scan.
//!
//! No stage catches or masks another stage's error, and nothing is retried:
//! every stage is a pure function, so the same input fails the same way again.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The five transforms of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Normalize,
    Upscale,
    Illumination,
    Denoise,
    Contrast,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Normalize,
        Stage::Upscale,
        Stage::Illumination,
        Stage::Denoise,
        Stage::Contrast,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Normalize => "format normalizer",
            Stage::Upscale => "geometric upscaler",
            Stage::Illumination => "illumination normalizer",
            Stage::Denoise => "denoiser",
            Stage::Contrast => "contrast enhancer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All fatal errors returned by the docnorm library.
///
/// Batch-level failures use [`ImageError`] and are stored in
/// [`crate::output::ImageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Buffer errors ─────────────────────────────────────────────────────
    /// The buffer is empty or its sample storage does not match its shape.
    #[error("Invalid input to the {stage}: {reason}")]
    InvalidInput { stage: Stage, reason: String },

    /// The buffer's channel count violates the stage's precondition.
    ///
    /// This indicates a stage invoked out of sequence (for example the
    /// denoiser fed a colour buffer) rather than missing data.
    #[error("The {stage} expects {expected}-channel input, got {found} channels")]
    ShapeMismatch {
        stage: Stage,
        expected: usize,
        found: usize,
    },

    /// Samples handed to [`crate::PixelBuffer::new`] do not fill its shape.
    #[error("A {width}x{height} buffer with {channels} channel(s) needs {expected} samples, got {found}")]
    BufferSize {
        width: u32,
        height: u32,
        channels: usize,
        expected: usize,
        found: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A stage parameter is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── File errors ───────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file was read but could not be decoded as an image.
    #[error("Failed to decode image '{path}': {detail}")]
    DecodeFailed { path: PathBuf, detail: String },

    /// Could not create or write the output image.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two inputs of one batch would be written to the same output file.
    #[error("'{first}' and '{second}' would both be written to '{path}'\nUse a different --suffix or separate output directories.")]
    DuplicateOutput {
        path: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// The output path is the input file itself.
    #[error("Output for '{path}' would overwrite the input\nUse a non-empty --suffix or a different --output-dir.")]
    OverwritesInput { path: PathBuf },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub(crate) fn invalid_input(stage: Stage, reason: impl Into<String>) -> Self {
        PipelineError::InvalidInput {
            stage,
            reason: reason.into(),
        }
    }
}

/// A non-fatal error for a single image in a batch.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ImageError {
    /// A stage returned an error for this image.
    #[error("Image {index}: {detail}")]
    Failed { index: usize, detail: String },

    /// The worker thread processing this image panicked.
    #[error("Image {index}: worker panicked: {detail}")]
    Panicked { index: usize, detail: String },
}
