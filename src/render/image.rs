//! Writing rendered images to disk.

use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::Error;

/// Image format implied by the output path. Only PNG and JPEG are written.
pub fn output_format(path: &Path) -> Result<ImageFormat, Error> {
    match ImageFormat::from_path(path) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(format),
        _ => Err(Error::UnsupportedOutput(path.to_path_buf())),
    }
}

/// Encode and write the image. JPEG drops the alpha channel. The image is
/// encoded in memory first so a failed encode leaves nothing at `path`.
pub fn save(img: &RgbaImage, path: &Path, format: ImageFormat) -> anyhow::Result<()> {
    let dynamic = DynamicImage::ImageRgba8(img.clone());
    let encoded = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(dynamic.to_rgb8()),
        _ => dynamic,
    };
    let mut bytes = Cursor::new(Vec::new());
    encoded
        .write_to(&mut bytes, format)
        .with_context(|| format!("Failed to encode image: {}", path.display()))?;
    std::fs::write(path, bytes.into_inner())
        .with_context(|| format!("Failed to write image: {}", path.display()))?;
    log::info!("wrote {}x{} image to {}", img.width(), img.height(), path.display());
    Ok(())
}
