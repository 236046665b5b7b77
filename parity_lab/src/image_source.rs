//! Image corpora the experiments draw windows from.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glam::{UVec2, Vec3};
use hog_core::ImageBuffer;
use image::imageops::FilterType;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

/// Ordered, indexable set of images.
pub trait ImageSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable name of image `index`, used in logs.
    fn label(&self, index: usize) -> String;

    /// Decodes image `index` into `dst`, which is already allocated at the target size and
    /// pixel format.
    fn load_into(&mut self, index: usize, dst: &mut ImageBuffer) -> Result<()>;
}

/// Every regular file under `dir`, recursively, sorted by path. `.gitignore` files are skipped.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("image corpus {} is not a directory", dir.display());
    }
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current)
            .with_context(|| format!("failed to read directory {}", current.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to read entry in {}", current.display()))?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() && path.file_name().is_some_and(|name| name != ".gitignore") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Decodes `path` into `dst`: RGB or luma to match `dst`, resized to `dst`'s size when it
/// differs, each 8-bit sample mapped to `value / 256.0`.
pub fn decode_into(path: &Path, dst: &mut ImageBuffer) -> Result<()> {
    let decoded =
        image::open(path).with_context(|| format!("failed to decode {}", path.display()))?;
    let target = dst.size();
    let decoded = if decoded.width() != target.x || decoded.height() != target.y {
        warn!(
            path = %path.display(),
            from = ?UVec2::new(decoded.width(), decoded.height()),
            to = ?target,
            "resizing image to the configured size"
        );
        decoded.resize_exact(target.x, target.y, FilterType::Triangle)
    } else {
        decoded
    };

    let samples = match dst.channels() {
        1 => decoded.to_luma8().into_raw(),
        3 => decoded.to_rgb8().into_raw(),
        other => bail!("cannot decode into a {other}-channel buffer"),
    };
    if samples.len() != dst.as_slice().len() {
        bail!(
            "decoded {} samples from {}, expected {}",
            samples.len(),
            path.display(),
            dst.as_slice().len()
        );
    }
    for (value, sample) in dst.as_mut_slice().iter_mut().zip(samples) {
        *value = f32::from(sample) / 256.0;
    }
    Ok(())
}

/// Images read from a directory tree.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    paths: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let paths = list_images(dir)?;
        debug!(dir = %dir.display(), images = paths.len(), "listed image corpus");
        Ok(Self { paths })
    }

    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl ImageSource for DirectorySource {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn label(&self, index: usize) -> String {
        self.paths
            .get(index)
            .map(|path| path.display().to_string())
            .unwrap_or_default()
    }

    fn load_into(&mut self, index: usize, dst: &mut ImageBuffer) -> Result<()> {
        let path = self
            .paths
            .get(index)
            .with_context(|| format!("image index {index} out of range"))?;
        decode_into(path, dst)
    }
}

/// Deterministic generated corpus: a colour ramp per image with a few solid rectangles and
/// light noise, so every window carries edges at several orientations.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    count: usize,
    seed: u64,
}

impl SyntheticSource {
    pub fn new(count: usize, seed: u64) -> Self {
        Self { count, seed }
    }

    fn paint(&self, index: usize, dst: &mut ImageBuffer) {
        let stream = (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ stream);
        let size = dst.size().as_vec2();
        let base = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 0.5;
        let slope_x = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 0.4 / size.x.max(1.0);
        let slope_y = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 0.4 / size.y.max(1.0);

        let rects: Vec<(UVec2, UVec2, Vec3)> = (0..6)
            .map(|_| {
                let w = rng.gen_range(1..=dst.cols().max(2) as u32 / 2);
                let h = rng.gen_range(1..=dst.rows().max(2) as u32 / 2);
                let x = rng.gen_range(0..dst.cols().max(1) as u32);
                let y = rng.gen_range(0..dst.rows().max(1) as u32);
                let colour = Vec3::new(rng.gen(), rng.gen(), rng.gen());
                (UVec2::new(x, y), UVec2::new(x + w, y + h), colour)
            })
            .collect();

        let channels = dst.channels();
        for row in 0..dst.rows() {
            for col in 0..dst.cols() {
                let p = UVec2::new(col as u32, row as u32);
                let mut colour = base + slope_x * col as f32 + slope_y * row as f32;
                for (min, max, fill) in &rects {
                    if p.cmpge(*min).all() && p.cmplt(*max).all() {
                        colour = *fill;
                    }
                }
                let noise = rng.gen_range(-0.02f32..0.02);
                let colour = (colour + Vec3::splat(noise)).clamp(Vec3::ZERO, Vec3::splat(0.996));
                let pixel = dst.pixel_mut(row, col);
                if channels == 1 {
                    pixel[0] = colour.dot(Vec3::new(0.299, 0.587, 0.114));
                } else {
                    for (dst, src) in pixel.iter_mut().zip(colour.to_array()) {
                        *dst = src;
                    }
                }
            }
        }
    }
}

impl ImageSource for SyntheticSource {
    fn len(&self) -> usize {
        self.count
    }

    fn label(&self, index: usize) -> String {
        format!("synthetic#{index}")
    }

    fn load_into(&mut self, index: usize, dst: &mut ImageBuffer) -> Result<()> {
        if index >= self.count {
            bail!("synthetic image {index} out of range ({} images)", self.count);
        }
        if !matches!(dst.channels(), 1 | 3) {
            bail!("cannot paint a {}-channel buffer", dst.channels());
        }
        self.paint(index, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hog_core::PixelFormat;

    #[test]
    fn synthetic_images_are_deterministic_and_distinct() {
        let mut source = SyntheticSource::new(2, 7);
        let size = UVec2::new(40, 30);
        let mut a = ImageBuffer::new(size, PixelFormat::Rgb32F);
        let mut b = ImageBuffer::new(size, PixelFormat::Rgb32F);
        let mut c = ImageBuffer::new(size, PixelFormat::Rgb32F);
        source.load_into(0, &mut a).unwrap();
        source.load_into(0, &mut b).unwrap();
        source.load_into(1, &mut c).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_slice().iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn synthetic_index_out_of_range_fails() {
        let mut source = SyntheticSource::new(1, 7);
        let mut dst = ImageBuffer::new(UVec2::new(8, 8), PixelFormat::Gray32F);
        assert!(source.load_into(1, &mut dst).is_err());
    }
}
