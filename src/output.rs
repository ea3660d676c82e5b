//! Result types returned by the enhancement entry points.

use crate::buffer::PixelBuffer;
use crate::error::{ImageError, Stage};
use crate::pipeline::upscale::UpscalePlan;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One fully enhanced image.
#[derive(Debug, Clone)]
pub struct EnhanceOutput {
    /// Single-channel 8-bit result.
    pub image: PixelBuffer,

    /// Wall time spent in each stage.
    pub timings: StageTimings,

    /// Which branch the upscaler took.
    pub upscale: UpscalePlan,
}

impl EnhanceOutput {
    /// Whether the input was narrower than the target width and got enlarged.
    pub fn was_upscaled(&self) -> bool {
        matches!(self.upscale, UpscalePlan::Resize { .. })
    }
}

/// Per-stage wall time in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub normalize_ms: u64,
    pub upscale_ms: u64,
    pub illumination_ms: u64,
    pub denoise_ms: u64,
    pub contrast_ms: u64,
}

impl StageTimings {
    pub fn get(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Normalize => self.normalize_ms,
            Stage::Upscale => self.upscale_ms,
            Stage::Illumination => self.illumination_ms,
            Stage::Denoise => self.denoise_ms,
            Stage::Contrast => self.contrast_ms,
        }
    }

    pub(crate) fn set(&mut self, stage: Stage, ms: u64) {
        let slot = match stage {
            Stage::Normalize => &mut self.normalize_ms,
            Stage::Upscale => &mut self.upscale_ms,
            Stage::Illumination => &mut self.illumination_ms,
            Stage::Denoise => &mut self.denoise_ms,
            Stage::Contrast => &mut self.contrast_ms,
        };
        *slot = ms;
    }

    pub fn total_ms(&self) -> u64 {
        Stage::ALL.iter().map(|&s| self.get(s)).sum()
    }
}

/// Outcome for one image of a batch.
#[derive(Debug, Clone)]
pub struct ImageResult {
    /// 0-based position in the input batch.
    pub index: usize,

    /// The enhanced image, or why this image failed.
    pub result: Result<EnhanceOutput, ImageError>,

    /// Wall time for this image, including queueing on the blocking pool.
    pub duration_ms: u64,
}

impl ImageResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&ImageError> {
        self.result.as_ref().err()
    }
}

/// Summary of a file batch, printable as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Number of input files.
    pub total: usize,

    /// Files enhanced and written.
    pub succeeded: usize,

    /// Files that failed at any point (read, enhance, or write).
    pub failed: usize,

    /// Successful files that went through the upscaler's resize branch.
    pub upscaled: usize,

    /// Wall time for the whole batch in milliseconds.
    pub total_duration_ms: u64,

    /// Paths of the files written.
    pub written: Vec<PathBuf>,

    /// One entry per failed file.
    pub failures: Vec<FileFailure>,
}

/// A file that could not be enhanced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub input: PathBuf,
    pub error: String,
}
