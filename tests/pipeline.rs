//! Integration tests for docnorm.
//!
//! Synthetic "document" images are generated in memory: dark strokes on a
//! light background, a shadow falling across the page and deterministic
//! noise. No fixtures on disk are needed.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use docnorm::pipeline::upscale::{plan_upscale, upscale_with_plan};
use docnorm::{
    denoise, enhance, enhance_batch, enhance_bytes, enhance_contrast, enhance_file, enhance_files,
    flatten_illumination, normalize, upscale, ContrastConfig, DenoiseConfig, EnhanceProgressCallback,
    IlluminationConfig, Layout, NoopProgressCallback, PipelineConfig, PipelineError, PixelBuffer,
    RawImage, SampleData, Stage, TileGrid, UpscaleConfig, UpscalePlan,
};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` shows stage timings.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An RGBA page: strokes, a left-to-right shadow, and noise.
fn synthetic_page(width: u32, height: u32) -> RawImage {
    let mut state: u32 = 0x9e37_79b9;
    let mut samples = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = ((state >> 24) % 17) as i32 - 8;
            let paper = 235 - (x * 90 / width.max(1)) as i32;
            let stroke = (y % 24 < 3 && x % 40 < 30) || (x % 40 == 5 && y % 24 < 18);
            let v = if stroke { paper - 150 } else { paper } + noise;
            let v = v.clamp(0, 255) as u8;
            samples.extend_from_slice(&[v, v.saturating_sub(4), v.saturating_sub(10), 255]);
        }
    }
    RawImage::new(width, height, 4, SampleData::U8(samples)).unwrap()
}

/// Settings that keep the expensive stages cheap on small images.
fn fast_config(target_width: u32) -> PipelineConfig {
    PipelineConfig::builder()
        .target_width(target_width)
        .template_window(3)
        .search_window(7)
        .concurrency(2)
        .build()
        .unwrap()
}

fn encode_png(image: &RawImage) -> Vec<u8> {
    let SampleData::U8(samples) = image.samples() else {
        panic!("synthetic pages are 8-bit");
    };
    let rgba = image::RgbaImage::from_raw(image.width(), image.height(), samples.clone()).unwrap();
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(rgba)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

// ── Stage properties ─────────────────────────────────────────────────────────

#[test]
fn test_wide_image_takes_keep_branch_unchanged() {
    let wide = normalize(&synthetic_page(64, 20)).unwrap();
    let (out, plan) = upscale_with_plan(&wide, &UpscaleConfig { target_width: 64 }).unwrap();
    assert_eq!(plan, UpscalePlan::Keep);
    assert_eq!(out, wide);

    let (out, plan) = upscale_with_plan(&wide, &UpscaleConfig { target_width: 10 }).unwrap();
    assert_eq!(plan, UpscalePlan::Keep);
    assert_eq!(out, wide);
}

#[test]
fn test_aspect_ratio_is_preserved_within_one_row() {
    for (w, h, target) in [(900, 600, 1800), (7, 13, 50), (333, 100, 1000), (1, 1, 19)] {
        let UpscalePlan::Resize { width, height } = plan_upscale(w, h, target) else {
            panic!("{w}x{h} should be resized to {target}");
        };
        assert_eq!(width, target);
        let ideal = f64::from(h) * f64::from(target) / f64::from(w);
        assert!(
            (f64::from(height) - ideal).abs() <= 0.5,
            "{w}x{h} → {width}x{height}, ideal height {ideal}"
        );
    }

    let small = normalize(&synthetic_page(30, 17)).unwrap();
    let out = upscale(&small, &UpscaleConfig { target_width: 90 }).unwrap();
    assert_eq!((out.width(), out.height(), out.channels()), (90, 51, 3));
}

#[test]
fn test_channel_count_collapses_once_and_stays_at_one() {
    let config = fast_config(40);
    let rgb = normalize(&synthetic_page(40, 30)).unwrap();
    assert_eq!(rgb.channels(), 3);

    let gray = flatten_illumination(&rgb, &config.stages.illumination).unwrap();
    assert_eq!(gray.channels(), 1);
    let gray = denoise(&gray, &config.stages.denoise).unwrap();
    assert_eq!(gray.channels(), 1);
    let gray = enhance_contrast(&gray, &config.stages.contrast).unwrap();
    assert_eq!(gray.channels(), 1);
    assert_eq!(gray.layout(), Layout::Gray);
}

#[test]
fn test_out_of_range_samples_saturate() {
    let raw = RawImage::new(
        3,
        1,
        3,
        SampleData::F64(vec![-1e6, 0.49, 255.5, 300.0, f64::NAN, 12.5, 1.0, 2.0, 3.0]),
    )
    .unwrap();
    let out = normalize(&raw).unwrap();
    assert_eq!(out.as_raw(), &[0, 0, 255, 255, 0, 13, 1, 2, 3]);
}

#[test]
fn test_single_channel_stages_reject_colour() {
    let rgb = PixelBuffer::new(4, 4, Layout::Rgb, vec![128; 48]).unwrap();

    let err = denoise(&rgb, &DenoiseConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ShapeMismatch {
            stage: Stage::Denoise,
            expected: 1,
            found: 3
        }
    ));

    let err = enhance_contrast(&rgb, &ContrastConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ShapeMismatch {
            stage: Stage::Contrast,
            expected: 1,
            found: 3
        }
    ));
}

#[test]
fn test_every_stage_rejects_empty_buffers() {
    let empty_raw = RawImage::new(0, 0, 4, SampleData::U16(vec![])).unwrap();
    let empty = PixelBuffer::gray_filled(0, 0, 0);

    let stages = [
        normalize(&empty_raw).map(|_| ()),
        upscale(&empty, &UpscaleConfig::default()).map(|_| ()),
        flatten_illumination(&empty, &IlluminationConfig::default()).map(|_| ()),
        denoise(&empty, &DenoiseConfig::default()).map(|_| ()),
        enhance_contrast(&empty, &ContrastConfig::default()).map(|_| ()),
    ];
    for (result, expected) in stages.into_iter().zip(Stage::ALL) {
        match result {
            Err(PipelineError::InvalidInput { stage, .. }) => assert_eq!(stage, expected),
            other => panic!("{expected}: expected InvalidInput, got {other:?}"),
        }
    }
}

#[test]
fn test_single_pixel_survives_large_tile_grids() {
    let px = PixelBuffer::gray_filled(1, 1, 77);
    let flat = flatten_illumination(&px, &IlluminationConfig::default()).unwrap();
    let out = enhance_contrast(&flat, &ContrastConfig::default()).unwrap();
    assert_eq!((out.width(), out.height(), out.channels()), (1, 1, 1));

    let wide_grid = ContrastConfig {
        clip_limit: 2.5,
        tile_grid: TileGrid::new(64, 3),
    };
    let out = enhance_contrast(&PixelBuffer::gray_filled(5, 2, 10), &wide_grid).unwrap();
    assert_eq!((out.width(), out.height()), (5, 2));
}

// ── Full pipeline ────────────────────────────────────────────────────────────

#[test]
fn test_full_pipeline_is_deterministic() {
    let page = synthetic_page(48, 36);
    let config = fast_config(96);
    let a = enhance(&page, &config).unwrap();
    let b = enhance(&page, &config).unwrap();
    assert_eq!(a.image, b.image);
    assert!(a.was_upscaled());
}

#[test]
fn test_end_to_end_900x600_rgba_with_defaults() {
    init_tracing();
    let raw = synthetic_page(900, 600);
    let config = PipelineConfig::default();
    let stages = &config.stages;
    assert_eq!((raw.width(), raw.height(), raw.channels()), (900, 600, 4));

    let normalized = normalize(&raw).unwrap();
    assert_eq!((normalized.width(), normalized.height(), normalized.channels()), (900, 600, 3));

    let (upscaled, plan) = upscale_with_plan(&normalized, &stages.upscale).unwrap();
    assert_eq!(
        plan,
        UpscalePlan::Resize {
            width: 1800,
            height: 1200
        }
    );
    assert_eq!((upscaled.width(), upscaled.height(), upscaled.channels()), (1800, 1200, 3));

    let flat = flatten_illumination(&upscaled, &stages.illumination).unwrap();
    assert_eq!((flat.width(), flat.height(), flat.channels()), (1800, 1200, 1));

    let clean = denoise(&flat, &stages.denoise).unwrap();
    assert_eq!((clean.width(), clean.height(), clean.channels()), (1800, 1200, 1));

    let enhanced = enhance_contrast(&clean, &stages.contrast).unwrap();
    assert_eq!((enhanced.width(), enhanced.height(), enhanced.channels()), (1800, 1200, 1));
    assert_eq!(enhanced.as_raw().len(), 1800 * 1200);

    // The composed entry point produces the same pixels.
    let composed = enhance(&raw, &config).unwrap();
    assert_eq!(composed.image, enhanced);
}

#[test]
fn test_enhance_bytes_decodes_png() {
    let page = synthetic_page(20, 10);
    let out = enhance_bytes(&encode_png(&page), &fast_config(40)).unwrap();
    assert_eq!((out.image.width(), out.image.height()), (40, 20));
}

// ── Batch & files ────────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingCallback {
    started: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    batch_success: AtomicUsize,
}

impl EnhanceProgressCallback for CountingCallback {
    fn on_image_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_image_complete(&self, _index: usize, _total: usize, _elapsed_ms: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_image_error(&self, _index: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, _total: usize, success_count: usize) {
        self.batch_success.store(success_count, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_batch_reports_progress_and_partial_failure() {
    let counter = Arc::new(CountingCallback::default());
    let config = PipelineConfig::builder()
        .target_width(32)
        .template_window(3)
        .search_window(5)
        .concurrency(3)
        .progress_callback(counter.clone() as Arc<dyn EnhanceProgressCallback>)
        .build()
        .unwrap();

    let images = vec![
        synthetic_page(16, 16),
        RawImage::new(0, 0, 1, SampleData::U8(vec![])).unwrap(),
        synthetic_page(40, 8),
        synthetic_page(9, 30),
    ];
    let results = enhance_batch(images, &config).await;

    assert_eq!(results.len(), 4);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(results[1].error().is_some());
    assert_eq!(counter.started.load(Ordering::SeqCst), 4);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 3);
    assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counter.batch_success.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_files_round_trip_through_disk() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let ok_a = dir.path().join("a.png");
    let ok_b = dir.path().join("b.png");
    std::fs::write(&ok_a, encode_png(&synthetic_page(24, 12))).unwrap();
    std::fs::write(&ok_b, encode_png(&synthetic_page(80, 20))).unwrap();
    let missing = dir.path().join("missing.png");

    let out_dir = dir.path().join("out");
    let pairs: Vec<(PathBuf, PathBuf)> = [&ok_a, &missing, &ok_b]
        .iter()
        .map(|p| {
            let name = format!("{}_enhanced.png", p.file_stem().unwrap().to_string_lossy());
            ((*p).clone(), out_dir.join(name))
        })
        .collect();

    let stats = enhance_files(&pairs, &fast_config(48)).await;

    assert_eq!(stats.total, 3);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.upscaled, 1);
    assert_eq!(stats.failures[0].input, missing);
    assert!(stats.failures[0].error.contains("not found"));
    assert_eq!(stats.written, vec![pairs[0].1.clone(), pairs[2].1.clone()]);

    let a = image::open(&pairs[0].1).unwrap();
    assert_eq!((a.width(), a.height()), (48, 24));
    assert_eq!(a.color(), image::ColorType::L8);
    let b = image::open(&pairs[2].1).unwrap();
    assert_eq!((b.width(), b.height()), (80, 20));

    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("\"succeeded\":2"));
}

#[tokio::test]
async fn test_files_never_share_or_overwrite_outputs() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let left = dir.path().join("left");
    let right = dir.path().join("right");
    std::fs::create_dir_all(&left).unwrap();
    std::fs::create_dir_all(&right).unwrap();
    let left_page = left.join("page.png");
    let right_page = right.join("page.png");
    let original = encode_png(&synthetic_page(16, 8));
    std::fs::write(&left_page, &original).unwrap();
    std::fs::write(&right_page, &original).unwrap();

    let shared = dir.path().join("out").join("page_enhanced.png");
    let pairs = vec![
        (left_page.clone(), shared.clone()),
        (right_page.clone(), shared.clone()),
        (right_page.clone(), right_page.clone()),
    ];
    assert!(docnorm::check_output_paths(&pairs).is_err());

    let stats = enhance_files(&pairs, &fast_config(32)).await;

    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.written, vec![shared.clone()]);
    assert_eq!(stats.failures[0].input, right_page);
    assert!(stats.failures[0].error.contains("both be written"));
    assert!(stats.failures[1].error.contains("overwrite the input"));
    assert_eq!(std::fs::read(&right_page).unwrap(), original);
    assert_eq!(image::open(&shared).unwrap().width(), 32);
}

#[tokio::test]
async fn test_enhance_file_missing_input() {
    let dir = TempDir::new().unwrap();
    let err = enhance_file(
        dir.path().join("nope.jpg"),
        dir.path().join("nope.png"),
        &PipelineConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::FileNotFound { .. }));
    assert!(!dir.path().join("nope.png").exists());
}

#[test]
fn test_config_json_overrides_only_named_fields() {
    let config = PipelineConfig::from_json_str(
        r#"{ "denoise": { "strength": 5.5 }, "contrast": { "tile_grid": { "cols": 16, "rows": 16 } } }"#,
    )
    .unwrap();
    assert_eq!(config.stages.denoise.strength, 5.5);
    assert_eq!(config.stages.denoise.search_window, 21);
    assert_eq!(config.stages.contrast.tile_grid, TileGrid::new(16, 16));
    assert_eq!(config.stages.contrast.clip_limit, 2.5);

    let err = PipelineConfig::from_json_str(r#"{ "denoise": { "search_window": 20 } }"#).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}

#[test]
fn test_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();
    assert_send_sync::<PipelineConfig>();
}
