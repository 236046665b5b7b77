//! Contract every pipeline implementation under test fulfils.

use glam::UVec2;

use crate::completion::Notifier;
use crate::config::HogSettings;
use crate::error::Result;
use crate::image::{ImageBuffer, PixelFormat, Shape};

/// Completion handle for an asynchronous stage call.
pub type StageNotifier<T> = Notifier<Result<T>>;

/// Buffers handed back once an asynchronous gradient call completes.
#[derive(Debug)]
pub struct GradientOutput {
    pub image: ImageBuffer,
    pub magnitude: ImageBuffer,
    pub phase: ImageBuffer,
}

/// Buffers handed back once an asynchronous descriptor call completes.
#[derive(Debug)]
pub struct DescriptorOutput {
    pub magnitude: ImageBuffer,
    pub phase: ImageBuffer,
    pub descriptor: ImageBuffer,
}

/// Fixed window and descriptor geometry a backend instance is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineGeometry {
    pub window: UVec2,
    pub format: PixelFormat,
    pub hog: HogSettings,
}

impl PipelineGeometry {
    pub fn new(window: UVec2, format: PixelFormat, hog: HogSettings) -> Result<Self> {
        hog.validate_window(window)?;
        Ok(Self {
            window,
            format,
            hog,
        })
    }

    pub fn image_shape(&self) -> Shape {
        Shape::of(self.window, self.format)
    }

    /// Magnitude and phase are single-channel maps over the window.
    pub fn gradient_shape(&self) -> Shape {
        Shape::of(self.window, PixelFormat::Gray32F)
    }

    /// The descriptor is a single row vector.
    pub fn descriptor_shape(&self) -> Shape {
        Shape::new(1, self.descriptor_length(), 1)
    }

    pub fn descriptor_length(&self) -> usize {
        self.hog.descriptor_length(self.window)
    }

    pub fn check_normalize(&self, image: &ImageBuffer) -> Result<()> {
        image.ensure_shape(self.image_shape(), "normalize input")
    }

    pub fn check_gradient(
        &self,
        image: &ImageBuffer,
        magnitude: &ImageBuffer,
        phase: &ImageBuffer,
    ) -> Result<()> {
        image.ensure_shape(self.image_shape(), "gradient input")?;
        magnitude.ensure_shape(self.gradient_shape(), "gradient magnitude")?;
        phase.ensure_shape(self.gradient_shape(), "gradient phase")
    }

    pub fn check_descriptor(
        &self,
        magnitude: &ImageBuffer,
        phase: &ImageBuffer,
        descriptor: &ImageBuffer,
    ) -> Result<()> {
        magnitude.ensure_shape(self.gradient_shape(), "descriptor magnitude")?;
        phase.ensure_shape(self.gradient_shape(), "descriptor phase")?;
        descriptor.ensure_shape(self.descriptor_shape(), "descriptor output")
    }
}

/// One normalization → gradient → descriptor implementation.
///
/// Synchronous calls return once the destination buffers are populated. Asynchronous calls take
/// ownership of the buffers they touch and hand them back through the notifier exactly once, so
/// no buffer can be reached by two in-flight calls. The default asynchronous implementations
/// run the synchronous call inline and notify before returning.
pub trait Backend: Send {
    fn name(&self) -> &str;

    fn geometry(&self) -> &PipelineGeometry;

    fn descriptor_length(&self) -> usize {
        self.geometry().descriptor_length()
    }

    /// Allocates a zeroed host buffer; called once per experiment and then reused.
    fn alloc_buffer(&self, size: UVec2, format: PixelFormat) -> ImageBuffer {
        ImageBuffer::new(size, format)
    }

    fn normalize(&mut self, image: &mut ImageBuffer) -> Result<()>;

    fn compute_gradient(
        &mut self,
        image: &ImageBuffer,
        magnitude: &mut ImageBuffer,
        phase: &mut ImageBuffer,
    ) -> Result<()>;

    fn compute_descriptor(
        &mut self,
        magnitude: &ImageBuffer,
        phase: &ImageBuffer,
        descriptor: &mut ImageBuffer,
    ) -> Result<()>;

    /// Lets pending asynchronous work advance. Called by waiters between completion polls.
    fn make_progress(&mut self) {}

    fn normalize_async(&mut self, mut image: ImageBuffer, done: StageNotifier<ImageBuffer>) {
        let result = self.normalize(&mut image).map(|()| image);
        done.notify(result);
    }

    fn compute_gradient_async(
        &mut self,
        image: ImageBuffer,
        mut magnitude: ImageBuffer,
        mut phase: ImageBuffer,
        done: StageNotifier<GradientOutput>,
    ) {
        let result = self
            .compute_gradient(&image, &mut magnitude, &mut phase)
            .map(|()| GradientOutput {
                image,
                magnitude,
                phase,
            });
        done.notify(result);
    }

    fn compute_descriptor_async(
        &mut self,
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        mut descriptor: ImageBuffer,
        done: StageNotifier<DescriptorOutput>,
    ) {
        let result = self
            .compute_descriptor(&magnitude, &phase, &mut descriptor)
            .map(|()| DescriptorOutput {
                magnitude,
                phase,
                descriptor,
            });
        done.notify(result);
    }
}
