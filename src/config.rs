//! Configuration types for the enhancement pipeline.
//!
//! Every stage owns an explicit configuration struct whose `Default` carries
//! the tuned values ([`UpscaleConfig`], [`IlluminationConfig`],
//! [`DenoiseConfig`], [`ContrastConfig`]). Stages can be called on their own
//! with just their struct; [`PipelineConfig`] bundles all four plus the batch
//! settings and is built via its [`PipelineConfigBuilder`].
//!
//! The clip limits and window sizes are tuned for 8-bit samples at roughly
//! 1800 px working width. Changing `target_width` without retuning the tile
//! grids shifts the physical size each tile covers.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grid of CLAHE tiles: `cols` across, `rows` down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    pub cols: u32,
    pub rows: u32,
}

impl TileGrid {
    pub const fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    fn validate(&self, what: &str) -> Result<(), PipelineError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "{what} tile grid must be at least 1x1, got {self}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TileGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

impl FromStr for TileGrid {
    type Err = PipelineError;

    /// Parse `"8x8"`, `"12X12"` or a single number meaning a square grid.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let parse = |part: &str| {
            part.trim().parse::<u32>().map_err(|_| {
                PipelineError::InvalidConfig(format!("invalid tile grid '{s}', expected e.g. 8x8"))
            })
        };
        let grid = match s.split_once('x') {
            Some((cols, rows)) => TileGrid::new(parse(cols)?, parse(rows)?),
            None => {
                let n = parse(&s)?;
                TileGrid::new(n, n)
            }
        };
        grid.validate("parsed")?;
        Ok(grid)
    }
}

fn validate_clip_limit(what: &str, clip_limit: f64) -> Result<(), PipelineError> {
    if !clip_limit.is_finite() || clip_limit < 0.0 {
        return Err(PipelineError::InvalidConfig(format!(
            "{what} clip limit must be a finite value >= 0, got {clip_limit}"
        )));
    }
    Ok(())
}

// ── Per-stage configs ────────────────────────────────────────────────────

/// Geometric upscaler settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleConfig {
    /// Minimum working width in pixels. Default: 1800.
    ///
    /// Narrower images are enlarged to exactly this width; wider images are
    /// never downscaled.
    pub target_width: u32,
}

impl Default for UpscaleConfig {
    fn default() -> Self {
        Self { target_width: 1800 }
    }
}

impl UpscaleConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.target_width == 0 {
            return Err(PipelineError::InvalidConfig(
                "target width must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Illumination normalizer settings: coarse CLAHE that flattens shadows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IlluminationConfig {
    /// Histogram clip limit as a multiple of the uniform bin height. Default: 2.0.
    /// `0` disables clipping.
    pub clip_limit: f64,

    /// Tile grid. Default: 8x8.
    pub tile_grid: TileGrid,
}

impl Default for IlluminationConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tile_grid: TileGrid::new(8, 8),
        }
    }
}

impl IlluminationConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_clip_limit("illumination", self.clip_limit)?;
        self.tile_grid.validate("illumination")
    }
}

/// Denoiser settings (non-local means).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    /// Filter strength `h`. Default: 8.0.
    ///
    /// Higher values spread weight onto less similar patches and smooth more.
    pub strength: f64,

    /// Side of the square patch compared around each pixel. Odd. Default: 7.
    pub template_window: u32,

    /// Side of the square neighbourhood searched for similar patches. Odd. Default: 21.
    ///
    /// Cost grows with `search_window²`; this is the dominant term of the
    /// whole pipeline's running time.
    pub search_window: u32,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            strength: 8.0,
            template_window: 7,
            search_window: 21,
        }
    }
}

impl DenoiseConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.strength.is_finite() || self.strength <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "denoise strength must be a finite value > 0, got {}",
                self.strength
            )));
        }
        for (name, size) in [
            ("template", self.template_window),
            ("search", self.search_window),
        ] {
            if size == 0 || size % 2 == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "denoise {name} window must be odd and >= 1, got {size}"
                )));
            }
        }
        Ok(())
    }
}

/// Contrast enhancer settings: finer CLAHE that restores local legibility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastConfig {
    /// Histogram clip limit as a multiple of the uniform bin height. Default: 2.5.
    pub clip_limit: f64,

    /// Tile grid. Default: 12x12.
    pub tile_grid: TileGrid,
}

impl Default for ContrastConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.5,
            tile_grid: TileGrid::new(12, 12),
        }
    }
}

impl ContrastConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_clip_limit("contrast", self.clip_limit)?;
        self.tile_grid.validate("contrast")
    }
}

// ── Pipeline config ──────────────────────────────────────────────────────

/// The stage sections of a [`PipelineConfig`], as stored in a JSON file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfigs {
    pub upscale: UpscaleConfig,
    pub illumination: IlluminationConfig,
    pub denoise: DenoiseConfig,
    pub contrast: ContrastConfig,
}

/// Configuration for a full pipeline run or a batch of runs.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docnorm::{PipelineConfig, TileGrid};
///
/// let config = PipelineConfig::builder()
///     .target_width(2400)
///     .contrast_tile_grid(TileGrid::new(16, 16))
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.stages.upscale.target_width, 2400);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Per-stage parameters.
    pub stages: StageConfigs,

    /// Number of images enhanced at once by the batch entry points.
    /// Default: available parallelism.
    ///
    /// Stages are CPU-bound, so running more images than cores only adds
    /// memory pressure.
    pub concurrency: usize,

    /// Optional progress callback for batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: StageConfigs::default(),
            concurrency: default_concurrency(),
            progress_callback: None,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("stages", &self.stages)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn EnhanceProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load stage sections from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let stages: StageConfigs = serde_json::from_str(json)
            .map_err(|e| PipelineError::InvalidConfig(format!("config JSON: {e}")))?;
        PipelineConfig::builder().stages(stages).build()
    }

    /// Check every stage section.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.stages.upscale.validate()?;
        self.stages.illumination.validate()?;
        self.stages.denoise.validate()?;
        self.stages.contrast.validate()?;
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl fmt::Debug for PipelineConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl PipelineConfigBuilder {
    pub fn stages(mut self, stages: StageConfigs) -> Self {
        self.config.stages = stages;
        self
    }

    pub fn target_width(mut self, px: u32) -> Self {
        self.config.stages.upscale.target_width = px;
        self
    }

    pub fn illumination_clip_limit(mut self, limit: f64) -> Self {
        self.config.stages.illumination.clip_limit = limit;
        self
    }

    pub fn illumination_tile_grid(mut self, grid: TileGrid) -> Self {
        self.config.stages.illumination.tile_grid = grid;
        self
    }

    pub fn denoise_strength(mut self, h: f64) -> Self {
        self.config.stages.denoise.strength = h;
        self
    }

    pub fn template_window(mut self, size: u32) -> Self {
        self.config.stages.denoise.template_window = size;
        self
    }

    pub fn search_window(mut self, size: u32) -> Self {
        self.config.stages.denoise.search_window = size;
        self
    }

    pub fn contrast_clip_limit(mut self, limit: f64) -> Self {
        self.config.stages.contrast.clip_limit = limit;
        self
    }

    pub fn contrast_tile_grid(mut self, grid: TileGrid) -> Self {
        self.config.stages.contrast.tile_grid = grid;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating every stage section.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
