//! Image derivative generation: bounded-box resize, aspect preserved, never
//! upscaled. The three serving sizes fan out concurrently in the worker; each
//! call here is one size.

use anyhow::{Context, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Long-edge bounding boxes for the three serving sizes, in pixels.
pub const BOUND_LARGE: u32 = 1920;
pub const BOUND_MEDIUM: u32 = 1080;
pub const BOUND_SMALL: u32 = 640;

/// Target dimensions for fitting `(width, height)` inside a square bounding
/// box of `bound` pixels on the long edge. Returns the input unchanged when
/// it already fits; never upscales.
pub fn fit_within(width: u32, height: u32, bound: u32) -> (u32, u32) {
    let long_edge = width.max(height);
    if long_edge <= bound {
        return (width, height);
    }
    if width >= height {
        let h = ((height as u64 * bound as u64) / width as u64).max(1) as u32;
        (bound, h)
    } else {
        let w = ((width as u64 * bound as u64) / height as u64).max(1) as u32;
        (w, bound)
    }
}

/// Image resizer backed by the `image` crate. Decode and encode are CPU-bound
/// and run on the blocking pool.
pub struct ImageDeriver;

impl ImageDeriver {
    /// Resize `input` to fit within `bound` and write a JPEG to `output`.
    /// Returns the output dimensions.
    pub async fn resize_to_bound(input: &Path, output: &Path, bound: u32) -> Result<(u32, u32)> {
        let input: PathBuf = input.to_path_buf();
        let output: PathBuf = output.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(u32, u32)> {
            let img = image::ImageReader::open(&input)
                .with_context(|| format!("failed to open image {:?}", input))?
                .with_guessed_format()
                .context("failed to guess image format")?
                .decode()
                .context("failed to decode image")?;

            let (width, height) = (img.width(), img.height());
            let (target_w, target_h) = fit_within(width, height, bound);

            let resized = if (target_w, target_h) == (width, height) {
                img
            } else {
                img.resize(target_w, target_h, image::imageops::FilterType::Lanczos3)
            };

            // JPEG output; flatten any alpha channel first.
            let rgb = resized.to_rgb8();
            let mut buffer = Vec::new();
            rgb.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Jpeg)
                .context("failed to encode JPEG")?;
            std::fs::write(&output, &buffer)
                .with_context(|| format!("failed to write {:?}", output))?;

            Ok((target_w, target_h))
        })
        .await
        .context("resize task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_within_landscape() {
        assert_eq!(fit_within(4000, 3000, 1920), (1920, 1440));
        assert_eq!(fit_within(1921, 1080, 1920), (1920, 1079));
    }

    #[test]
    fn fit_within_portrait() {
        assert_eq!(fit_within(3000, 4000, 1920), (1440, 1920));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within(640, 480, 1920), (640, 480));
        assert_eq!(fit_within(1920, 1080, 1920), (1920, 1080));
    }

    #[test]
    fn fit_within_square() {
        assert_eq!(fit_within(2000, 2000, 640), (640, 640));
    }

    #[test]
    fn fit_within_extreme_aspect_keeps_min_edge() {
        // A 10000x1 strip must not collapse to zero height.
        assert_eq!(fit_within(10_000, 1, 640), (640, 1));
    }

    #[tokio::test]
    async fn resize_writes_bounded_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.jpg");

        let img = image::RgbImage::from_fn(64, 32, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 8) as u8, 128])
        });
        img.save(&input).unwrap();

        let (w, h) = ImageDeriver::resize_to_bound(&input, &output, 16)
            .await
            .unwrap();
        assert_eq!((w, h), (16, 8));

        let written = image::ImageReader::open(&output)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!((written.width(), written.height()), (16, 8));
    }

    #[tokio::test]
    async fn resize_keeps_small_images_at_original_size() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.jpg");

        image::RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]))
            .save(&input)
            .unwrap();

        let (w, h) = ImageDeriver::resize_to_bound(&input, &output, 640)
            .await
            .unwrap();
        assert_eq!((w, h), (8, 6));
    }
}
