//! File adapters for callers that hand over paths or encoded bytes.
//!
//! The stages only ever see decoded buffers. Decoding and encoding go through
//! the `image` crate (PNG, JPEG and TIFF are compiled in); results are always
//! written as PNG, since the output is lossless 8-bit grayscale.
//!
//! Writes are atomic: the PNG is encoded into a temp file in the destination
//! directory and renamed over the target, so a crash never leaves a truncated
//! image behind.

use crate::buffer::{PixelBuffer, RawImage};
use crate::error::PipelineError;
use image::{ImageFormat, ImageReader};
use std::io::{self, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Read and decode an image file.
///
/// # Errors
/// * [`PipelineError::FileNotFound`] when nothing exists at `path`.
/// * [`PipelineError::PermissionDenied`] when the file cannot be opened for reading.
/// * [`PipelineError::DecodeFailed`] when the content is not a supported image.
pub fn read_image(path: &Path) -> Result<RawImage, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(PipelineError::DecodeFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            });
        }
    };

    let image = decode(&bytes, path)?;
    debug!(
        "Decoded {} ({}x{}, {} channels)",
        path.display(),
        image.width(),
        image.height(),
        image.channels()
    );
    Ok(image)
}

/// Decode an in-memory encoded image. The format is sniffed from the content.
pub fn decode_bytes(bytes: &[u8]) -> Result<RawImage, PipelineError> {
    decode(bytes, Path::new("<memory>"))
}

fn decode(bytes: &[u8], path: &Path) -> Result<RawImage, PipelineError> {
    let failed = |detail: String| PipelineError::DecodeFailed {
        path: path.to_path_buf(),
        detail,
    };
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| failed(e.to_string()))?
        .decode()
        .map_err(|e| failed(e.to_string()))?;
    Ok(RawImage::from(decoded))
}

/// Encode `buffer` as PNG and atomically replace `path` with it.
///
/// Missing parent directories are created.
pub fn write_png(buffer: &PixelBuffer, path: &Path) -> Result<(), PipelineError> {
    let write_failed = |source: io::Error| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_failed)?;

    let tmp = NamedTempFile::new_in(&dir).map_err(write_failed)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        buffer
            .to_dynamic_image()
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|e| write_failed(into_io_error(e)))?;
        writer.flush().map_err(write_failed)?;
    }
    tmp.persist(path).map_err(|e| write_failed(e.error))?;

    debug!(
        "Wrote {} ({}x{})",
        path.display(),
        buffer.width(),
        buffer.height()
    );
    Ok(())
}

fn into_io_error(e: image::ImageError) -> io::Error {
    match e {
        image::ImageError::IoError(e) => e,
        other => io::Error::other(other),
    }
}
