//! CPU reference implementation of the HOG stages.

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use hog_core::{
    backend::{DescriptorOutput, GradientOutput, PipelineGeometry, StageNotifier},
    Backend, HarnessError, ImageBuffer, Result,
};
use tracing::debug;

pub mod descriptor;
pub mod gradient;
pub mod normalize;

pub type Scalar = f32;

pub use descriptor::{descriptor, orientation_bin};
pub use gradient::{fold_angle, gradient};
pub use normalize::sqrt_normalize;

/// Shape-checked stage kernels plus the scratch space they reuse.
#[derive(Debug, Clone)]
struct CpuKernels {
    geometry: PipelineGeometry,
    scratch: Vec<Scalar>,
}

impl CpuKernels {
    fn new(geometry: PipelineGeometry) -> Self {
        Self {
            geometry,
            scratch: Vec::with_capacity(geometry.hog.block_len()),
        }
    }

    fn normalize(&mut self, image: &mut ImageBuffer) -> Result<()> {
        self.geometry.check_normalize(image)?;
        sqrt_normalize(image.as_mut_slice());
        Ok(())
    }

    fn gradient(
        &mut self,
        image: &ImageBuffer,
        magnitude: &mut ImageBuffer,
        phase: &mut ImageBuffer,
    ) -> Result<()> {
        self.geometry.check_gradient(image, magnitude, phase)?;
        gradient(
            image.as_slice(),
            image.cols(),
            image.rows(),
            image.channels(),
            magnitude.as_mut_slice(),
            phase.as_mut_slice(),
        );
        Ok(())
    }

    fn descriptor(
        &mut self,
        magnitude: &ImageBuffer,
        phase: &ImageBuffer,
        out: &mut ImageBuffer,
    ) -> Result<()> {
        self.geometry.check_descriptor(magnitude, phase, out)?;
        descriptor(
            &self.geometry.hog,
            self.geometry.window,
            magnitude.as_slice(),
            phase.as_slice(),
            out.as_mut_slice(),
            &mut self.scratch,
        );
        Ok(())
    }
}

/// Asynchronous stage call queued for the worker thread.
enum Job {
    Normalize {
        image: ImageBuffer,
        done: StageNotifier<ImageBuffer>,
    },
    Gradient {
        image: ImageBuffer,
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        done: StageNotifier<GradientOutput>,
    },
    Descriptor {
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        descriptor: ImageBuffer,
        done: StageNotifier<DescriptorOutput>,
    },
}

impl Job {
    fn run(self, kernels: &mut CpuKernels) {
        match self {
            Job::Normalize { mut image, done } => {
                done.notify(kernels.normalize(&mut image).map(|()| image));
            }
            Job::Gradient {
                image,
                mut magnitude,
                mut phase,
                done,
            } => {
                let result = kernels
                    .gradient(&image, &mut magnitude, &mut phase)
                    .map(|()| GradientOutput {
                        image,
                        magnitude,
                        phase,
                    });
                done.notify(result);
            }
            Job::Descriptor {
                magnitude,
                phase,
                mut descriptor,
                done,
            } => {
                let result = kernels
                    .descriptor(&magnitude, &phase, &mut descriptor)
                    .map(|()| DescriptorOutput {
                        magnitude,
                        phase,
                        descriptor,
                    });
                done.notify(result);
            }
        }
    }

    fn fail(self, err: HarnessError) {
        match self {
            Job::Normalize { done, .. } => done.notify(Err(err)),
            Job::Gradient { done, .. } => done.notify(Err(err)),
            Job::Descriptor { done, .. } => done.notify(Err(err)),
        }
    }
}

/// Persistent thread running queued jobs in submission order. Joined on drop.
struct Worker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(mut kernels: CpuKernels) -> std::io::Result<Self> {
        let (jobs, queue) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("cpu-hog-worker".into())
            .spawn(move || {
                for job in queue {
                    job.run(&mut kernels);
                }
            })?;
        Ok(Self {
            jobs: Some(jobs),
            handle: Some(handle),
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Reference backend. Synchronous calls run on the caller's thread; asynchronous ones are
/// handed to a worker thread started on first use.
pub struct CpuHog {
    name: String,
    kernels: CpuKernels,
    worker: Option<Worker>,
}

impl CpuHog {
    pub fn new(geometry: PipelineGeometry) -> Self {
        Self {
            name: "cpu".to_string(),
            kernels: CpuKernels::new(geometry),
            worker: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn submit(&mut self, job: Job) {
        if self.worker.is_none() {
            match Worker::spawn(self.kernels.clone()) {
                Ok(worker) => {
                    debug!(backend = %self.name, "started cpu worker thread");
                    self.worker = Some(worker);
                }
                Err(err) => {
                    let message = format!("failed to start worker thread: {err}");
                    job.fail(HarnessError::backend(self.name.clone(), message));
                    return;
                }
            }
        }
        let sent = self
            .worker
            .as_ref()
            .and_then(|worker| worker.jobs.as_ref())
            .map(|jobs| jobs.send(job));
        match sent {
            Some(Ok(())) => {}
            Some(Err(mpsc::SendError(job))) => {
                job.fail(HarnessError::backend(self.name.clone(), "worker thread exited"));
            }
            None => {}
        }
    }
}

impl Backend for CpuHog {
    fn name(&self) -> &str {
        &self.name
    }

    fn geometry(&self) -> &PipelineGeometry {
        &self.kernels.geometry
    }

    fn normalize(&mut self, image: &mut ImageBuffer) -> Result<()> {
        self.kernels.normalize(image)
    }

    fn compute_gradient(
        &mut self,
        image: &ImageBuffer,
        magnitude: &mut ImageBuffer,
        phase: &mut ImageBuffer,
    ) -> Result<()> {
        self.kernels.gradient(image, magnitude, phase)
    }

    fn compute_descriptor(
        &mut self,
        magnitude: &ImageBuffer,
        phase: &ImageBuffer,
        descriptor: &mut ImageBuffer,
    ) -> Result<()> {
        self.kernels.descriptor(magnitude, phase, descriptor)
    }

    fn normalize_async(&mut self, image: ImageBuffer, done: StageNotifier<ImageBuffer>) {
        self.submit(Job::Normalize { image, done });
    }

    fn compute_gradient_async(
        &mut self,
        image: ImageBuffer,
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        done: StageNotifier<GradientOutput>,
    ) {
        self.submit(Job::Gradient {
            image,
            magnitude,
            phase,
            done,
        });
    }

    fn compute_descriptor_async(
        &mut self,
        magnitude: ImageBuffer,
        phase: ImageBuffer,
        descriptor: ImageBuffer,
        done: StageNotifier<DescriptorOutput>,
    ) {
        self.submit(Job::Descriptor {
            magnitude,
            phase,
            descriptor,
            done,
        });
    }
}
