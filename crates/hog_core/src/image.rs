//! Host-side pixel buffers handed between the harness and the backends.

use std::fmt;

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::sampler::Window;
use crate::Scalar;

/// Pixel layouts supported by the pipeline. Elements are always `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Gray32F,
    Rgb32F,
}

impl PixelFormat {
    pub const fn channels(self) -> usize {
        match self {
            PixelFormat::Gray32F => 1,
            PixelFormat::Rgb32F => 3,
        }
    }
}

/// `rows × cols × channels` triple used for shape checks and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
}

impl Shape {
    pub const fn new(rows: usize, cols: usize, channels: usize) -> Self {
        Self {
            rows,
            cols,
            channels,
        }
    }

    /// Shape of a `size.x` wide, `size.y` tall buffer in `format`.
    pub fn of(size: UVec2, format: PixelFormat) -> Self {
        Self::new(size.y as usize, size.x as usize, format.channels())
    }

    pub const fn len(&self) -> usize {
        self.rows * self.cols * self.channels
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.rows, self.cols, self.channels)
    }
}

/// Row-major, channel-interleaved `f32` matrix.
///
/// The harness allocates these once per experiment and overwrites them in place on every
/// trial, so the only way to change a buffer's shape after construction is to build a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageBuffer {
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<Scalar>,
}

impl ImageBuffer {
    /// Zero-filled buffer `size.x` columns wide and `size.y` rows tall.
    pub fn new(size: UVec2, format: PixelFormat) -> Self {
        Self::zeroed(Shape::of(size, format))
    }

    pub fn zeroed(shape: Shape) -> Self {
        Self {
            rows: shape.rows,
            cols: shape.cols,
            channels: shape.channels,
            data: vec![0.0; shape.len()],
        }
    }

    pub fn from_vec(shape: Shape, data: Vec<Scalar>) -> Result<Self> {
        if data.len() != shape.len() {
            return Err(HarnessError::ShapeMismatch {
                context: "buffer construction",
                expected: shape,
                found: Shape::new(1, data.len(), 1),
            });
        }
        Ok(Self {
            rows: shape.rows,
            cols: shape.cols,
            channels: shape.channels,
            data,
        })
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.rows, self.cols, self.channels)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Width/height as a vector (`x` = cols, `y` = rows).
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.cols as u32, self.rows as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[Scalar] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Scalar] {
        &mut self.data
    }

    pub fn row(&self, row: usize) -> &[Scalar] {
        let stride = self.cols * self.channels;
        &self.data[row * stride..(row + 1) * stride]
    }

    pub fn pixel(&self, row: usize, col: usize) -> &[Scalar] {
        let start = (row * self.cols + col) * self.channels;
        &self.data[start..start + self.channels]
    }

    pub fn pixel_mut(&mut self, row: usize, col: usize) -> &mut [Scalar] {
        let start = (row * self.cols + col) * self.channels;
        &mut self.data[start..start + self.channels]
    }

    /// Fails with `ShapeMismatch` unless this buffer has exactly `expected` shape.
    pub fn ensure_shape(&self, expected: Shape, context: &'static str) -> Result<()> {
        let found = self.shape();
        if found == expected {
            Ok(())
        } else {
            Err(HarnessError::ShapeMismatch {
                context,
                expected,
                found,
            })
        }
    }

    /// Copies the `window` sub-rectangle of `self` into `dst` without reallocating it.
    pub fn copy_window_into(&self, window: &Window, dst: &mut ImageBuffer) -> Result<()> {
        let (x, y) = (window.x as usize, window.y as usize);
        let (width, height) = (window.width as usize, window.height as usize);
        if x + width > self.cols || y + height > self.rows {
            return Err(HarnessError::ShapeMismatch {
                context: "window extraction",
                expected: Shape::new(y + height, x + width, self.channels),
                found: self.shape(),
            });
        }
        dst.ensure_shape(
            Shape::new(height, width, self.channels),
            "window destination",
        )?;

        let src_stride = self.cols * self.channels;
        let dst_stride = width * self.channels;
        for row in 0..height {
            let src_start = (y + row) * src_stride + x * self.channels;
            let dst_start = row * dst_stride;
            dst.data[dst_start..dst_start + dst_stride]
                .copy_from_slice(&self.data[src_start..src_start + dst_stride]);
        }
        Ok(())
    }

    /// Overwrites `self` with `other`; both must already have the same shape.
    pub fn copy_from(&mut self, other: &ImageBuffer) -> Result<()> {
        self.ensure_shape(other.shape(), "buffer copy")?;
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    pub fn scale(&mut self, factor: Scalar) {
        for value in &mut self.data {
            *value *= factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(size: UVec2, format: PixelFormat) -> ImageBuffer {
        let shape = Shape::of(size, format);
        let data = (0..shape.len()).map(|i| i as Scalar).collect();
        ImageBuffer::from_vec(shape, data).unwrap()
    }

    #[test]
    fn window_copy_reads_the_requested_region() {
        let image = ramp(UVec2::new(6, 5), PixelFormat::Gray32F);
        let window = Window {
            x: 1,
            y: 2,
            width: 3,
            height: 2,
        };
        let mut dst = ImageBuffer::new(window.size(), PixelFormat::Gray32F);
        image.copy_window_into(&window, &mut dst).unwrap();
        assert_eq!(dst.row(0), &[13.0, 14.0, 15.0]);
        assert_eq!(dst.row(1), &[19.0, 20.0, 21.0]);
    }

    #[test]
    fn window_copy_keeps_channels_interleaved() {
        let image = ramp(UVec2::new(4, 4), PixelFormat::Rgb32F);
        let window = Window {
            x: 2,
            y: 1,
            width: 1,
            height: 1,
        };
        let mut dst = ImageBuffer::new(window.size(), PixelFormat::Rgb32F);
        image.copy_window_into(&window, &mut dst).unwrap();
        assert_eq!(dst.pixel(0, 0), image.pixel(1, 2));
    }

    #[test]
    fn window_copy_rejects_wrong_destination() {
        let image = ramp(UVec2::new(8, 8), PixelFormat::Rgb32F);
        let window = Window {
            x: 1,
            y: 1,
            width: 4,
            height: 4,
        };
        let mut dst = ImageBuffer::new(UVec2::new(3, 4), PixelFormat::Rgb32F);
        let err = image.copy_window_into(&window, &mut dst).unwrap_err();
        assert!(matches!(err, HarnessError::ShapeMismatch { .. }));
    }

    #[test]
    fn from_vec_checks_length() {
        let err = ImageBuffer::from_vec(Shape::new(2, 2, 1), vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, HarnessError::ShapeMismatch { .. }));
    }
}
