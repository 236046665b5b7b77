//! Parity Lab: HOG backend parity and timing harness.
//!
//! The CPU reference lives under `cpu/`; the wgpu backend comes from `hog_gfx`. Experiments
//! drive either through [`adapter::PipelineAdapter`] and reduce their samples into
//! [`report::ExperimentReport`]s.

#[path = "../cpu/mod.rs"]
pub mod cpu;

pub mod adapter;
pub mod backends;
pub mod experiment;
pub mod image_source;
pub mod report;

pub use adapter::{PipelineAdapter, StageBuffers};
pub use backends::{build_backend, BackendKind};
pub use experiment::{
    geometry_for, run_combined_experiment, run_equivalence_experiment, run_timing_experiment,
    run_window_sweep, Phase,
};
pub use image_source::{DirectorySource, ImageSource, SyntheticSource};
pub use report::{write_reports_json, ExperimentKind, ExperimentReport};
