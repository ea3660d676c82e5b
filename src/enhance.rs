//! Full-pipeline entry points.
//!
//! [`enhance`] runs the five stages on one decoded image on the calling
//! thread. The batch entry points fan images out over tokio's blocking pool,
//! at most [`PipelineConfig::concurrency`] at a time; one image failing never
//! affects the others.

use crate::buffer::RawImage;
use crate::config::PipelineConfig;
use crate::error::{ImageError, PipelineError, Stage};
use crate::output::{BatchStats, EnhanceOutput, FileFailure, ImageResult, StageTimings};
use crate::pipeline::{contrast, denoise, illumination, io, normalize, upscale};
use futures::stream::{self, StreamExt};
use std::collections::hash_map::{Entry, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run every stage on one decoded image.
///
/// # Errors
/// The first stage error, unchanged. No partial output is returned.
///
/// # Example
/// ```rust
/// use docnorm::{enhance, PipelineConfig, RawImage, SampleData};
///
/// let page = RawImage::new(64, 48, 3, SampleData::U8(vec![200; 64 * 48 * 3])).unwrap();
/// let config = PipelineConfig::builder().target_width(64).build().unwrap();
/// let out = enhance(&page, &config).unwrap();
/// assert_eq!(out.image.channels(), 1);
/// assert!(!out.was_upscaled());
/// ```
pub fn enhance(image: &RawImage, config: &PipelineConfig) -> Result<EnhanceOutput, PipelineError> {
    let stages = &config.stages;
    let mut timings = StageTimings::default();

    let normalized = timed(Stage::Normalize, &mut timings, || normalize::normalize(image))?;
    let (upscaled, plan) = timed(Stage::Upscale, &mut timings, || {
        upscale::upscale_with_plan(&normalized, &stages.upscale)
    })?;
    drop(normalized);
    let flat = timed(Stage::Illumination, &mut timings, || {
        illumination::flatten_illumination(&upscaled, &stages.illumination)
    })?;
    drop(upscaled);
    let clean = timed(Stage::Denoise, &mut timings, || denoise::denoise(&flat, &stages.denoise))?;
    drop(flat);
    let enhanced = timed(Stage::Contrast, &mut timings, || {
        contrast::enhance_contrast(&clean, &stages.contrast)
    })?;

    info!(
        "Enhanced {}x{} → {}x{} in {}ms",
        image.width(),
        image.height(),
        enhanced.width(),
        enhanced.height(),
        timings.total_ms()
    );

    Ok(EnhanceOutput {
        image: enhanced,
        timings,
        upscale: plan,
    })
}

/// Decode an in-memory PNG, JPEG or TIFF and enhance it.
pub fn enhance_bytes(bytes: &[u8], config: &PipelineConfig) -> Result<EnhanceOutput, PipelineError> {
    let image = io::decode_bytes(bytes)?;
    enhance(&image, config)
}

/// Enhance a batch of decoded images concurrently.
///
/// Results come back in input order. Each entry carries either the output or
/// the [`ImageError`] for that image.
pub async fn enhance_batch(images: Vec<RawImage>, config: &PipelineConfig) -> Vec<ImageResult> {
    let total = images.len();
    let batch_start = Instant::now();
    info!(
        "Starting batch of {} images (concurrency {})",
        total, config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut results: Vec<ImageResult> = stream::iter(images.into_iter().enumerate().map(|(index, image)| {
        let job_config = config.clone();
        async move {
            let start = Instant::now();
            let result = run_job(index, total, &job_config, {
                let config = job_config.clone();
                move || enhance(&image, &config)
            })
            .await;
            ImageResult {
                index,
                result,
                duration_ms: start.elapsed().as_millis() as u64,
            }
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    results.sort_by_key(|r| r.index);

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    info!(
        "Batch complete: {}/{} images in {}ms",
        succeeded,
        total,
        batch_start.elapsed().as_millis()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, succeeded);
    }

    results
}

/// Read an image file, enhance it, and write the result as PNG.
///
/// The output is written atomically (temp file + rename), and its parent
/// directory is created if missing.
pub async fn enhance_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<EnhanceOutput, PipelineError> {
    let input = input.as_ref().to_path_buf();
    let output = output.as_ref().to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || enhance_file_blocking(&input, &output, &config))
        .await
        .map_err(|e| PipelineError::Internal(format!("Enhance task panicked: {}", e)))?
}

/// Check that no output overwrites its own input and no two pairs share an
/// output.
///
/// # Errors
/// The first [`PipelineError::OverwritesInput`] or
/// [`PipelineError::DuplicateOutput`] found, in pair order.
pub fn check_output_paths(pairs: &[(PathBuf, PathBuf)]) -> Result<(), PipelineError> {
    match output_conflicts(pairs).into_iter().flatten().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Enhance many `(input, output)` file pairs concurrently.
///
/// Never fails as a whole: per-file problems are counted in
/// [`BatchStats::failed`] and listed in [`BatchStats::failures`]. A pair
/// whose output is its own input, or was already claimed by an earlier pair,
/// fails without being read.
pub async fn enhance_files(pairs: &[(PathBuf, PathBuf)], config: &PipelineConfig) -> BatchStats {
    let total = pairs.len();
    let batch_start = Instant::now();
    info!(
        "Starting {} files (concurrency {})",
        total, config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut outcomes: Vec<(usize, Result<EnhanceOutput, ImageError>)> =
        stream::iter(
            pairs
                .iter()
                .cloned()
                .zip(output_conflicts(pairs))
                .enumerate()
                .map(|(index, ((input, output), conflict))| {
                    let job_config = config.clone();
                    async move {
                        let result = match conflict {
                            Some(e) => reject(index, total, &job_config, e),
                            None => {
                                run_job(index, total, &job_config, {
                                    let config = job_config.clone();
                                    move || enhance_file_blocking(&input, &output, &config)
                                })
                                .await
                            }
                        };
                        (index, result)
                    }
                }),
        )
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    outcomes.sort_by_key(|(index, _)| *index);

    let mut stats = BatchStats {
        total,
        ..Default::default()
    };
    for (index, outcome) in outcomes {
        let (input, output) = &pairs[index];
        match outcome {
            Ok(out) => {
                stats.succeeded += 1;
                if out.was_upscaled() {
                    stats.upscaled += 1;
                }
                stats.written.push(output.clone());
            }
            Err(e) => {
                stats.failed += 1;
                stats.failures.push(FileFailure {
                    input: input.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    stats.total_duration_ms = batch_start.elapsed().as_millis() as u64;

    info!(
        "Files complete: {}/{} written, {} failed, {}ms total",
        stats.succeeded, total, stats.failed, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, stats.succeeded);
    }

    stats
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn timed<T>(
    stage: Stage,
    timings: &mut StageTimings,
    f: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    let start = Instant::now();
    let out = f()?;
    let ms = start.elapsed().as_millis() as u64;
    debug!("{} done in {}ms", stage, ms);
    timings.set(stage, ms);
    Ok(out)
}

/// Per pair, the reason it must not run, if any. The first pair to claim an
/// output keeps it.
fn output_conflicts(pairs: &[(PathBuf, PathBuf)]) -> Vec<Option<PipelineError>> {
    let mut claimed: HashMap<&Path, &Path> = HashMap::new();
    pairs
        .iter()
        .map(|(input, output)| {
            if input == output {
                return Some(PipelineError::OverwritesInput {
                    path: input.clone(),
                });
            }
            match claimed.entry(output.as_path()) {
                Entry::Occupied(first) => Some(PipelineError::DuplicateOutput {
                    path: output.clone(),
                    first: first.get().to_path_buf(),
                    second: input.clone(),
                }),
                Entry::Vacant(slot) => {
                    slot.insert(input.as_path());
                    None
                }
            }
        })
        .collect()
}

/// Fail a pair up front, firing the same events as a failed job.
fn reject(
    index: usize,
    total: usize,
    config: &PipelineConfig,
    error: PipelineError,
) -> Result<EnhanceOutput, ImageError> {
    let error = ImageError::Failed {
        index,
        detail: error.to_string(),
    };
    warn!("{}", error);
    if let Some(ref cb) = config.progress_callback {
        cb.on_image_start(index, total);
        cb.on_image_error(index, total, &error.to_string());
    }
    Err(error)
}

fn enhance_file_blocking(
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<EnhanceOutput, PipelineError> {
    let image = io::read_image(input)?;
    let enhanced = enhance(&image, config)?;
    io::write_png(&enhanced.image, output)?;
    Ok(enhanced)
}

/// Run one image's work on the blocking pool, firing progress events.
async fn run_job<F>(
    index: usize,
    total: usize,
    config: &PipelineConfig,
    job: F,
) -> Result<EnhanceOutput, ImageError>
where
    F: FnOnce() -> Result<EnhanceOutput, PipelineError> + Send + 'static,
{
    let start = Instant::now();
    if let Some(ref cb) = config.progress_callback {
        cb.on_image_start(index, total);
    }

    let result = match tokio::task::spawn_blocking(job).await {
        Ok(Ok(out)) => Ok(out),
        Ok(Err(e)) => Err(ImageError::Failed {
            index,
            detail: e.to_string(),
        }),
        Err(e) => Err(ImageError::Panicked {
            index,
            detail: e.to_string(),
        }),
    };

    match &result {
        Ok(_) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_image_complete(index, total, start.elapsed().as_millis() as u64);
            }
        }
        Err(e) => {
            warn!("{}", e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_image_error(index, total, &e.to_string());
            }
        }
    }

    result
}
