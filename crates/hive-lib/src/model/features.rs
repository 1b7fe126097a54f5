//! Colour histogram feature extraction

use crate::error::ClassifierError;
use image::DynamicImage;
use std::path::Path;

/// Histogram bins per RGB channel
pub const BINS_PER_CHANNEL: usize = 4;

/// Length of the feature vector
pub const FEATURE_LEN: usize = BINS_PER_CHANNEL * BINS_PER_CHANNEL * BINS_PER_CHANNEL;

/// Images are downsampled to fit this box before binning
const THUMBNAIL_SIZE: u32 = 64;

/// Load an image from disk and compute its normalized colour histogram
pub fn extract_histogram(path: &Path) -> Result<Vec<f32>, ClassifierError> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(ClassifierError::ImageNotFound(display));
    }

    let img = image::open(path).map_err(|e| ClassifierError::Decode {
        path: display,
        message: e.to_string(),
    })?;

    Ok(histogram_from_image(&img))
}

/// Normalized joint RGB histogram; bins sum to 1
pub fn histogram_from_image(img: &DynamicImage) -> Vec<f32> {
    let rgb = img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgb8();
    let mut histogram = vec![0f32; FEATURE_LEN];

    let bin = |v: u8| (v as usize * BINS_PER_CHANNEL) / 256;
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        let idx = (bin(r) * BINS_PER_CHANNEL + bin(g)) * BINS_PER_CHANNEL + bin(b);
        histogram[idx] += 1.0;
    }

    let total: f32 = histogram.iter().sum();
    if total > 0.0 {
        for v in histogram.iter_mut() {
            *v /= total;
        }
    }
    histogram
}

pub(crate) fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_solid_colour_fills_one_bin() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([255, 200, 0])));
        let histogram = histogram_from_image(&img);

        assert_eq!(histogram.len(), FEATURE_LEN);
        let idx = (3 * BINS_PER_CHANNEL + 3) * BINS_PER_CHANNEL;
        assert!((histogram[idx] - 1.0).abs() < 1e-6);
        assert!((histogram.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_missing_file() {
        let err = extract_histogram(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, ClassifierError::ImageNotFound(_)));
    }

    #[test]
    fn test_undecodable_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = extract_histogram(&path).unwrap_err();
        assert!(matches!(err, ClassifierError::Decode { .. }));
    }

    #[test]
    fn test_extract_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dark.png");
        RgbImage::from_pixel(8, 8, Rgb([10, 10, 10])).save(&path).unwrap();

        let histogram = extract_histogram(&path).unwrap();
        assert!((histogram[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0], &[1.0]), 0.0);
    }
}
