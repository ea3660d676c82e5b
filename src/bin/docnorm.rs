//! CLI binary for docnorm.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, derives output paths, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docnorm::{check_output_paths, enhance_files, EnhanceProgressCallback, PipelineConfig, ProgressCallback, TileGrid};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished image. Images finish out
/// of order when more than one runs at a time.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Display names, indexed like the batch.
    names: Vec<String>,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(names: Vec<String>) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(names.len() as u64);
        bar.set_style(style);
        bar.set_prefix("Enhancing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            names,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or("?")
    }

    fn take_elapsed_ms(&self, index: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl EnhanceProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Enhancing {total} images…"))
        ));
    }

    fn on_image_start(&self, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(self.name(index).to_string());
    }

    fn on_image_complete(&self, index: usize, total: usize, _elapsed_ms: u64) {
        let elapsed_ms = self.take_elapsed_ms(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            self.name(index),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let elapsed_ms = self.take_elapsed_ms(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per image.
        let first_line = error.lines().next().unwrap_or(error);
        let msg: String = if first_line.chars().count() > 80 {
            first_line.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            self.name(index),
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images enhanced successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images enhanced  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Enhance one photo; writes receipt_enhanced.png next to it
  docnorm receipt.jpg

  # Enhance a folder of scans into another directory
  docnorm scans/*.tiff -o enhanced/

  # Gentler denoising, finer contrast tiles
  docnorm --strength 5 --contrast-tiles 16x16 page.png

  # Stage settings from a JSON file, machine-readable summary
  docnorm --config docnorm.json --json page.png > stats.json

PIPELINE:
  1. normalize     saturate samples to 8-bit, drop alpha
  2. upscale       Catmull-Rom up to --target-width (never downscales)
  3. illumination  BT.601 luma + CLAHE (--illumination-clip, --illumination-tiles)
  4. denoise       non-local means (--strength, --template-window, --search-window)
  5. contrast      CLAHE (--contrast-clip, --contrast-tiles)

CONFIG FILE (all keys optional):
  {
    "upscale":      { "target_width": 1800 },
    "illumination": { "clip_limit": 2.0, "tile_grid": { "cols": 8, "rows": 8 } },
    "denoise":      { "strength": 8.0, "template_window": 7, "search_window": 21 },
    "contrast":     { "clip_limit": 2.5, "tile_grid": { "cols": 12, "rows": 12 } }
  }
  Flags given on the command line override the file.

OUTPUT:
  Always 8-bit grayscale PNG, written atomically. The exit status is 1 when
  any input failed; the others are still written.
"#;

/// Enhance scanned document images for OCR.
#[derive(Parser, Debug)]
#[command(
    name = "docnorm",
    version,
    about = "Normalise scanned document images into enhanced grayscale for OCR",
    long_about = "Normalise document photos and scans into enhanced 8-bit grayscale PNGs: \
bit-depth and alpha normalisation, upscaling to a working width, illumination flattening, \
non-local-means denoising and local contrast enhancement.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input images (PNG, JPEG, TIFF).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write results into this directory instead of next to each input.
    #[arg(short, long, env = "DOCNORM_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Appended to each input's file stem to name its output.
    #[arg(long, env = "DOCNORM_SUFFIX", default_value = "_enhanced")]
    suffix: String,

    /// JSON file with stage settings.
    #[arg(long, env = "DOCNORM_CONFIG")]
    config: Option<PathBuf>,

    /// Minimum working width in pixels [default: 1800].
    #[arg(long, env = "DOCNORM_TARGET_WIDTH",
          value_parser = clap::value_parser!(u32).range(1..))]
    target_width: Option<u32>,

    /// Illumination CLAHE clip limit; 0 disables clipping [default: 2.0].
    #[arg(long, env = "DOCNORM_ILLUMINATION_CLIP")]
    illumination_clip: Option<f64>,

    /// Illumination CLAHE tile grid, COLSxROWS [default: 8x8].
    #[arg(long, env = "DOCNORM_ILLUMINATION_TILES")]
    illumination_tiles: Option<TileGrid>,

    /// Non-local-means filter strength h [default: 8.0].
    #[arg(long, env = "DOCNORM_STRENGTH")]
    strength: Option<f64>,

    /// Patch size compared by the denoiser, odd [default: 7].
    #[arg(long, env = "DOCNORM_TEMPLATE_WINDOW")]
    template_window: Option<u32>,

    /// Neighbourhood searched by the denoiser, odd [default: 21].
    #[arg(long, env = "DOCNORM_SEARCH_WINDOW")]
    search_window: Option<u32>,

    /// Contrast CLAHE clip limit; 0 disables clipping [default: 2.5].
    #[arg(long, env = "DOCNORM_CONTRAST_CLIP")]
    contrast_clip: Option<f64>,

    /// Contrast CLAHE tile grid, COLSxROWS [default: 12x12].
    #[arg(long, env = "DOCNORM_CONTRAST_TILES")]
    contrast_tiles: Option<TileGrid>,

    /// Images processed at once [default: number of CPUs].
    #[arg(short, long, env = "DOCNORM_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Print the batch summary as JSON on stdout.
    #[arg(long, env = "DOCNORM_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCNORM_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCNORM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCNORM_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let pairs = output_pairs(&cli.inputs, cli.output_dir.as_deref(), &cli.suffix)?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let names = cli.inputs.iter().map(|p| display_name(p)).collect();
        Some(CliProgressCallback::new(names) as Arc<dyn EnhanceProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let stats = enhance_files(&pairs, &config).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        if !show_progress {
            for failure in &stats.failures {
                eprintln!("{} {}: {}", red("✗"), failure.input.display(), failure.error);
            }
        }
        eprintln!(
            "{}  {}/{} images  {} upscaled  {}ms",
            if stats.failed == 0 { green("✔") } else { cyan("⚠") },
            stats.succeeded,
            stats.total,
            dim(&stats.upscaled.to_string()),
            stats.total_duration_ms,
        );
        if let [only] = stats.written.as_slice() {
            eprintln!("   →  {}", bold(&only.display().to_string()));
        }
    }

    if stats.failed > 0 {
        anyhow::bail!("{} of {} images failed", stats.failed, stats.total);
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`: config file first, then flags on top.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let base = match cli.config {
        Some(ref path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            PipelineConfig::from_json_str(&json)
                .with_context(|| format!("Invalid config file {:?}", path))?
        }
        None => PipelineConfig::default(),
    };

    let mut builder = PipelineConfig::builder().stages(base.stages);

    if let Some(px) = cli.target_width {
        builder = builder.target_width(px);
    }
    if let Some(limit) = cli.illumination_clip {
        builder = builder.illumination_clip_limit(limit);
    }
    if let Some(grid) = cli.illumination_tiles {
        builder = builder.illumination_tile_grid(grid);
    }
    if let Some(h) = cli.strength {
        builder = builder.denoise_strength(h);
    }
    if let Some(size) = cli.template_window {
        builder = builder.template_window(size);
    }
    if let Some(size) = cli.search_window {
        builder = builder.search_window(size);
    }
    if let Some(limit) = cli.contrast_clip {
        builder = builder.contrast_clip_limit(limit);
    }
    if let Some(grid) = cli.contrast_tiles {
        builder = builder.contrast_tile_grid(grid);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Pair every input with its output, refusing any run that would overwrite an
/// input or write two images to one file.
fn output_pairs(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    suffix: &str,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    let pairs: Vec<(PathBuf, PathBuf)> = inputs
        .iter()
        .map(|input| (input.clone(), output_path(input, output_dir, suffix)))
        .collect();
    if let Err(e) = check_output_paths(&pairs) {
        anyhow::bail!("{e}");
    }
    Ok(pairs)
}

/// `scans/page.jpg` → `<dir or scans>/page<suffix>.png`.
fn output_path(input: &Path, output_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(format!("{stem}{suffix}.png"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
