//! Core HOG harness logic that remains independent of GPU backends or CLI shells.
//!
//! This crate hosts:
//! - the image/window data model shared by every backend
//! - the backend contract (sync + async stage calls) and its one-shot completion channel
//! - window sampling, buffer comparison, statistics and stage timing used by the harness

pub mod backend;
pub mod completion;
pub mod config;
pub mod error;
pub mod image;
pub mod metrics;
pub mod sampler;
pub mod stats;
pub mod timing;

/// Convenience re-export for the element type stored in every pipeline buffer.
pub type Scalar = f32;

pub use backend::{Backend, DescriptorOutput, GradientOutput, PipelineGeometry, StageNotifier};
pub use completion::{completion_pair, Backoff, Completion, Notifier, Pending};
pub use config::{sweep_window, ExecutionMode, ExperimentConfig, HogKernelParams, HogSettings};
pub use error::{HarnessError, Result};
pub use image::{ImageBuffer, PixelFormat, Shape};
pub use metrics::Metric;
pub use sampler::{Window, WindowSampler};
pub use stats::{MetricSample, SampleLog, Stage, StageReport, StatReport};
pub use timing::{StageTimer, TimingDiscipline};
