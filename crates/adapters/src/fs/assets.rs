use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use log::{debug, warn};
use psd2img_application::{ApplicationError, AssetWriter};
use psd2img_domain::{scaled_filename, ExportScale};

const PREVIEW_STEM: &str = "full_preview";
const PREVIEW_JPEG_QUALITY: u8 = 75;
/// Upper bound on the pixel count of one scaled variant (16384 x 16384).
const MAX_VARIANT_PIXELS: u64 = 16_384 * 16_384;

/// Writes PNG assets below a directory on the local file system.
#[derive(Debug, Default)]
pub struct FsAssetWriter;

impl AssetWriter for FsAssetWriter {
    fn save_scaled_variants(
        &self,
        image: &RgbaImage,
        output_dir: &Path,
        base_filename: &str,
        scales: &[ExportScale],
    ) -> Result<String, ApplicationError> {
        if scales.is_empty() {
            return Err(ApplicationError::InvalidInput(
                "at least one export scale is required".to_string(),
            ));
        }
        fs::create_dir_all(output_dir).map_err(|error| ApplicationError::Io(error.to_string()))?;

        let mut written: Vec<PathBuf> = Vec::with_capacity(scales.len());
        let mut canonical: Option<String> = None;
        for &scale in scales {
            let file_name = scaled_filename(base_filename, scale);
            let path = output_dir.join(&file_name);
            if let Err(error) = write_scaled(image, scale, &path) {
                for partial in &written {
                    let _ = fs::remove_file(partial);
                }
                return Err(error);
            }
            written.push(path);
            if scale.is_base() || canonical.is_none() {
                canonical = Some(file_name);
            }
        }

        canonical.ok_or_else(|| ApplicationError::Encode("no variant written".to_string()))
    }

    fn save_full_preview(
        &self,
        image: &RgbaImage,
        output_dir: &Path,
    ) -> Result<String, ApplicationError> {
        fs::create_dir_all(output_dir).map_err(|error| ApplicationError::Io(error.to_string()))?;

        let jpeg_name = format!("{PREVIEW_STEM}.jpg");
        let jpeg_path = output_dir.join(&jpeg_name);
        match write_jpeg(image, &jpeg_path) {
            Ok(()) => return Ok(jpeg_name),
            Err(error) => {
                warn!("jpeg preview failed, falling back to png: {error}");
                let _ = fs::remove_file(&jpeg_path);
            }
        }

        let png_name = format!("{PREVIEW_STEM}.png");
        image
            .save_with_format(output_dir.join(&png_name), ImageFormat::Png)
            .map_err(|error| ApplicationError::Encode(error.to_string()))?;
        Ok(png_name)
    }

    fn remove_dir(&self, dir: &Path) -> Result<(), ApplicationError> {
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(dir).map_err(|error| ApplicationError::Io(error.to_string()))?;
        debug!("removed {}", dir.display());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), ApplicationError> {
        if !path.is_file() {
            return Ok(());
        }
        fs::remove_file(path).map_err(|error| ApplicationError::Io(error.to_string()))?;
        debug!("removed {}", path.display());
        Ok(())
    }

    fn copy_file(&self, source: &Path, target: &Path) -> Result<bool, ApplicationError> {
        if !source.is_file() {
            return Ok(false);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| ApplicationError::Io(error.to_string()))?;
        }
        fs::copy(source, target).map_err(|error| {
            ApplicationError::Io(format!("{} -> {}: {error}", source.display(), target.display()))
        })?;
        Ok(true)
    }
}

fn write_scaled(
    image: &RgbaImage,
    scale: ExportScale,
    path: &Path,
) -> Result<(), ApplicationError> {
    let result = if scale.is_base() {
        image.save_with_format(path, ImageFormat::Png)
    } else {
        let (width, height) = scaled_dimensions(image.width(), image.height(), scale.factor())?;
        imageops::resize(image, width, height, FilterType::Lanczos3)
            .save_with_format(path, ImageFormat::Png)
    };
    result.map_err(|error| ApplicationError::Encode(format!("{}: {error}", path.display())))
}

/// Target size of a variant, refused before anything is allocated when it
/// overflows or exceeds [`MAX_VARIANT_PIXELS`].
fn scaled_dimensions(
    width: u32,
    height: u32,
    factor: u32,
) -> Result<(u32, u32), ApplicationError> {
    let too_large = || {
        ApplicationError::Encode(format!("{width}x{height} at {factor}x is too large to export"))
    };
    let scaled_width = width.checked_mul(factor).ok_or_else(too_large)?;
    let scaled_height = height.checked_mul(factor).ok_or_else(too_large)?;
    if u64::from(scaled_width) * u64::from(scaled_height) > MAX_VARIANT_PIXELS {
        return Err(too_large());
    }
    Ok((scaled_width, scaled_height))
}

fn write_jpeg(image: &RgbaImage, path: &Path) -> Result<(), ApplicationError> {
    let file = File::create(path).map_err(|error| ApplicationError::Io(error.to_string()))?;
    let mut writer = BufWriter::new(file);
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    JpegEncoder::new_with_quality(&mut writer, PREVIEW_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|error| ApplicationError::Encode(error.to_string()))
}
