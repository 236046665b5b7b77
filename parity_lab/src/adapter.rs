//! Uniform synchronous façade over a backend's sync or async calling convention.

use std::mem;

use hog_core::{
    completion_pair, Backend, Backoff, Completion, ExecutionMode, HarnessError, ImageBuffer,
    PixelFormat, Result, Stage, StageTimer,
};

/// Working buffers for one backend, allocated once per experiment and reused by every trial.
#[derive(Debug, Clone)]
pub struct StageBuffers {
    pub window: ImageBuffer,
    pub magnitude: ImageBuffer,
    pub phase: ImageBuffer,
    pub descriptor: ImageBuffer,
}

impl StageBuffers {
    pub fn allocate(backend: &dyn Backend) -> Self {
        let geometry = *backend.geometry();
        let descriptor_size = glam::UVec2::new(backend.descriptor_length() as u32, 1);
        Self {
            window: backend.alloc_buffer(geometry.window, geometry.format),
            magnitude: backend.alloc_buffer(geometry.window, PixelFormat::Gray32F),
            phase: backend.alloc_buffer(geometry.window, PixelFormat::Gray32F),
            descriptor: backend.alloc_buffer(descriptor_size, PixelFormat::Gray32F),
        }
    }
}

/// Drives one backend stage by stage. Every call returns only once the stage output is in the
/// caller's buffers, whichever convention the backend is driven through.
pub struct PipelineAdapter<'a> {
    backend: &'a mut dyn Backend,
    mode: ExecutionMode,
    backoff: Backoff,
    in_flight: usize,
}

impl<'a> PipelineAdapter<'a> {
    pub fn new(backend: &'a mut dyn Backend, mode: ExecutionMode) -> Self {
        Self {
            backend,
            mode,
            backoff: Backoff::default(),
            in_flight: 0,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn allocate(&self) -> StageBuffers {
        StageBuffers::allocate(&*self.backend)
    }

    pub fn normalize(&mut self, image: &mut ImageBuffer) -> Result<()> {
        match self.mode {
            ExecutionMode::Sync => self.backend.normalize(image),
            ExecutionMode::Async => {
                let (notifier, completion) = completion_pair();
                self.begin()?;
                self.backend.normalize_async(mem::take(image), notifier);
                *image = self.rendezvous(completion)?;
                Ok(())
            }
        }
    }

    pub fn compute_gradient(
        &mut self,
        image: &mut ImageBuffer,
        magnitude: &mut ImageBuffer,
        phase: &mut ImageBuffer,
    ) -> Result<()> {
        match self.mode {
            ExecutionMode::Sync => self.backend.compute_gradient(image, magnitude, phase),
            ExecutionMode::Async => {
                let (notifier, completion) = completion_pair();
                self.begin()?;
                self.backend.compute_gradient_async(
                    mem::take(image),
                    mem::take(magnitude),
                    mem::take(phase),
                    notifier,
                );
                let output = self.rendezvous(completion)?;
                *image = output.image;
                *magnitude = output.magnitude;
                *phase = output.phase;
                Ok(())
            }
        }
    }

    pub fn compute_descriptor(
        &mut self,
        magnitude: &mut ImageBuffer,
        phase: &mut ImageBuffer,
        descriptor: &mut ImageBuffer,
    ) -> Result<()> {
        match self.mode {
            ExecutionMode::Sync => self.backend.compute_descriptor(magnitude, phase, descriptor),
            ExecutionMode::Async => {
                let (notifier, completion) = completion_pair();
                self.begin()?;
                self.backend.compute_descriptor_async(
                    mem::take(magnitude),
                    mem::take(phase),
                    mem::take(descriptor),
                    notifier,
                );
                let output = self.rendezvous(completion)?;
                *magnitude = output.magnitude;
                *phase = output.phase;
                *descriptor = output.descriptor;
                Ok(())
            }
        }
    }

    /// Normalize, gradient and descriptor over `buffers.window`, in place.
    pub fn run_pipeline(&mut self, buffers: &mut StageBuffers) -> Result<()> {
        self.normalize(&mut buffers.window)?;
        self.compute_gradient(
            &mut buffers.window,
            &mut buffers.magnitude,
            &mut buffers.phase,
        )?;
        self.compute_descriptor(
            &mut buffers.magnitude,
            &mut buffers.phase,
            &mut buffers.descriptor,
        )
    }

    /// Same as [`run_pipeline`](Self::run_pipeline), with each stage bracketed by `timer`.
    pub fn run_timed(&mut self, buffers: &mut StageBuffers, timer: &mut StageTimer) -> Result<()> {
        timer.measure(Stage::Normalization, || self.normalize(&mut buffers.window))?;
        timer.measure(Stage::Gradient, || {
            self.compute_gradient(
                &mut buffers.window,
                &mut buffers.magnitude,
                &mut buffers.phase,
            )
        })?;
        timer.measure(Stage::Descriptor, || {
            self.compute_descriptor(
                &mut buffers.magnitude,
                &mut buffers.phase,
                &mut buffers.descriptor,
            )
        })
    }

    /// Rejects a submission while an earlier async call is still outstanding.
    fn begin(&mut self) -> Result<()> {
        if self.in_flight > 0 {
            return Err(HarnessError::backend(
                self.backend.name(),
                "stage submitted while another call is still in flight",
            ));
        }
        self.in_flight += 1;
        Ok(())
    }

    /// Blocks until `completion` fires, letting the backend make progress between polls.
    fn rendezvous<T>(&mut self, completion: Completion<Result<T>>) -> Result<T> {
        let backend = &mut *self.backend;
        let outcome = completion.wait_with(&self.backoff, || backend.make_progress());
        self.in_flight -= 1;
        outcome.unwrap_or_else(|| {
            Err(HarnessError::backend(
                self.backend.name(),
                "completion dropped without a result",
            ))
        })
    }
}
