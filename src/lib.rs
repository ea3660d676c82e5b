//! # docnorm
//!
//! Normalise scanned or photographed document images into enhanced 8-bit
//! grayscale ready for OCR.
//!
//! ## Why this crate?
//!
//! Phone photos and cheap scans of paper come in every bit depth and channel
//! layout, often small, with shadows across the page, sensor noise and washed
//! out strokes. OCR engines do much better on a clean, evenly lit, high
//! contrast grayscale page of a predictable size. This crate turns any decoded
//! raster into exactly that with a fixed, deterministic sequence of classic
//! image-processing transforms. No models, no network.
//!
//! ## Pipeline Overview
//!
//! ```text
//! decoded image (8/16/32-bit int or float, 1/3/4 channels)
//!  │
//!  ├─ 1. Normalize     saturate to 8-bit, drop alpha
//!  ├─ 2. Upscale       Catmull-Rom to ≥ 1800 px wide, never downscale
//!  ├─ 3. Illumination  BT.601 luma + coarse CLAHE (2.0, 8x8)
//!  ├─ 4. Denoise       non-local means (h = 8, 7x7 patches, 21x21 search)
//!  └─ 5. Contrast      fine CLAHE (2.5, 12x12)
//!  │
//! single-channel 8-bit image
//! ```
//!
//! Every stage is also callable on its own from [`pipeline`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docnorm::{enhance_file, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let out = enhance_file("receipt.jpg", "receipt_enhanced.png", &config).await?;
//!     eprintln!("{}x{}, denoise took {}ms",
//!         out.image.width(),
//!         out.image.height(),
//!         out.timings.denoise_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docnorm` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docnorm = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod buffer;
pub mod config;
pub mod enhance;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use buffer::{Layout, PixelBuffer, RawImage, SampleData};
pub use config::{
    ContrastConfig, DenoiseConfig, IlluminationConfig, PipelineConfig, PipelineConfigBuilder, StageConfigs,
    TileGrid, UpscaleConfig,
};
pub use enhance::{check_output_paths, enhance, enhance_batch, enhance_bytes, enhance_file, enhance_files};
pub use error::{ImageError, PipelineError, Stage};
pub use output::{BatchStats, EnhanceOutput, FileFailure, ImageResult, StageTimings};
pub use pipeline::contrast::enhance_contrast;
pub use pipeline::denoise::denoise;
pub use pipeline::illumination::flatten_illumination;
pub use pipeline::normalize::normalize;
pub use pipeline::upscale::{upscale, UpscalePlan};
pub use progress::{EnhanceProgressCallback, NoopProgressCallback, ProgressCallback};
