//! Pixel buffers exchanged with the pipeline.
//!
//! Two types cover the two sides of the format normalizer:
//!
//! * [`RawImage`] — whatever an external decoder produced: 1, 3 or 4
//!   interleaved channels with 8-bit, 16-bit, 32-bit integer or floating
//!   point samples.
//! * [`PixelBuffer`] — the canonical 8-bit buffer every later stage consumes
//!   and produces. Its samples are private and only ever read, so a buffer is
//!   immutable once a stage has returned it; each stage allocates a new one.
//!
//! Colour data is interpreted in R, G, B(, A) order, which is the order the
//! `image` crate decodes into.

use crate::error::{PipelineError, Stage};
use image::{DynamicImage, GrayImage, RgbImage};

/// Decoded sample storage, interleaved and row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleData {
    pub fn len(&self) -> usize {
        match self {
            SampleData::U8(v) => v.len(),
            SampleData::U16(v) => v.len(),
            SampleData::U32(v) => v.len(),
            SampleData::I16(v) => v.len(),
            SampleData::I32(v) => v.len(),
            SampleData::F32(v) => v.len(),
            SampleData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether samples are already 8-bit integers.
    pub fn is_u8(&self) -> bool {
        matches!(self, SampleData::U8(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SampleData::U8(_) => "u8",
            SampleData::U16(_) => "u16",
            SampleData::U32(_) => "u32",
            SampleData::I16(_) => "i16",
            SampleData::I32(_) => "i32",
            SampleData::F32(_) => "f32",
            SampleData::F64(_) => "f64",
        }
    }
}

/// A decoded image as handed over by an external decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    width: u32,
    height: u32,
    channels: u8,
    samples: SampleData,
}

impl RawImage {
    /// Wrap decoded samples.
    ///
    /// Zero-sized images are accepted here and rejected by the format
    /// normalizer on entry. A sample count that disagrees with the shape, or a
    /// channel count outside {1, 3, 4}, is rejected immediately.
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        samples: SampleData,
    ) -> Result<Self, PipelineError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(PipelineError::invalid_input(
                Stage::Normalize,
                format!("unsupported channel count {channels}, expected 1, 3 or 4"),
            ));
        }
        let expected = width as usize * height as usize * channels as usize;
        if samples.len() != expected {
            return Err(PipelineError::invalid_input(
                Stage::Normalize,
                format!(
                    "{}x{}x{} image needs {} samples, got {}",
                    width,
                    height,
                    channels,
                    expected,
                    samples.len()
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            channels,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn samples(&self) -> &SampleData {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<DynamicImage> for RawImage {
    /// Adapt a decoded `image` crate buffer.
    ///
    /// Gray+alpha is widened to RGBA so the normalizer's alpha rule applies.
    /// Float variants keep their raw values: the normalizer clamps them to
    /// [0, 255] like any other out-of-range sample.
    fn from(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let (channels, samples) = match img {
            DynamicImage::ImageLuma8(b) => (1, SampleData::U8(b.into_raw())),
            DynamicImage::ImageRgb8(b) => (3, SampleData::U8(b.into_raw())),
            DynamicImage::ImageRgba8(b) => (4, SampleData::U8(b.into_raw())),
            DynamicImage::ImageLuma16(b) => (1, SampleData::U16(b.into_raw())),
            DynamicImage::ImageRgb16(b) => (3, SampleData::U16(b.into_raw())),
            DynamicImage::ImageRgba16(b) => (4, SampleData::U16(b.into_raw())),
            DynamicImage::ImageLumaA16(b) => (
                4,
                SampleData::U16(DynamicImage::ImageLumaA16(b).to_rgba16().into_raw()),
            ),
            DynamicImage::ImageRgb32F(b) => (3, SampleData::F32(b.into_raw())),
            DynamicImage::ImageRgba32F(b) => (4, SampleData::F32(b.into_raw())),
            other => (4, SampleData::U8(other.to_rgba8().into_raw())),
        };
        Self {
            width,
            height,
            channels,
            samples,
        }
    }
}

/// Channel layout of a canonical buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Gray,
    Rgb,
}

impl Layout {
    pub fn channels(self) -> usize {
        match self {
            Layout::Gray => 1,
            Layout::Rgb => 3,
        }
    }
}

/// Canonical 8-bit pixel buffer with 1 or 3 interleaved channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    layout: Layout,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap 8-bit samples. The sample count must equal `width * height * channels`.
    pub fn new(width: u32, height: u32, layout: Layout, data: Vec<u8>) -> Result<Self, PipelineError> {
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(PipelineError::BufferSize {
                width,
                height,
                channels: layout.channels(),
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Single-channel buffer filled with one value.
    pub fn gray_filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            layout: Layout::Gray,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_gray_image(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            layout: Layout::Gray,
            data: img.into_raw(),
        }
    }

    pub fn from_rgb_image(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            layout: Layout::Rgb,
            data: img.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Interleaved samples.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Sample at `(x, y)` in channel `c`.
    ///
    /// # Panics
    /// When the coordinate or channel is out of bounds.
    pub fn sample(&self, x: u32, y: u32, c: usize) -> u8 {
        assert!(x < self.width && y < self.height && c < self.channels());
        self.data[(y as usize * self.width as usize + x as usize) * self.channels() + c]
    }

    /// Copy into an `image` crate buffer for encoding.
    pub fn to_dynamic_image(&self) -> DynamicImage {
        self.clone().into_dynamic_image()
    }

    pub fn into_dynamic_image(self) -> DynamicImage {
        // Shape was checked on construction, so both from_raw calls succeed.
        match self.layout {
            Layout::Gray => GrayImage::from_raw(self.width, self.height, self.data)
                .map(DynamicImage::ImageLuma8)
                .unwrap_or_else(|| DynamicImage::new_luma8(0, 0)),
            Layout::Rgb => RgbImage::from_raw(self.width, self.height, self.data)
                .map(DynamicImage::ImageRgb8)
                .unwrap_or_else(|| DynamicImage::new_rgb8(0, 0)),
        }
    }

    /// Copy into a grayscale `image` buffer, `None` for colour buffers.
    pub(crate) fn to_gray_image(&self) -> Option<GrayImage> {
        match self.layout {
            Layout::Gray => GrayImage::from_raw(self.width, self.height, self.data.clone()),
            Layout::Rgb => None,
        }
    }

    pub(crate) fn to_rgb_image(&self) -> Option<RgbImage> {
        match self.layout {
            Layout::Rgb => RgbImage::from_raw(self.width, self.height, self.data.clone()),
            Layout::Gray => None,
        }
    }
}
