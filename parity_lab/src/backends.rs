//! Backend selection by name.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use hog_core::{Backend, PipelineGeometry};
use hog_gfx::GpuHog;

use crate::cpu::CpuHog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Gpu,
}

impl BackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Gpu => "gpu",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cpu" => Ok(BackendKind::Cpu),
            "gpu" | "wgpu" => Ok(BackendKind::Gpu),
            other => bail!("unknown backend `{other}` (expected cpu or gpu)"),
        }
    }
}

/// Builds a fresh backend instance for `geometry`. The GPU backend brings up its own device.
pub fn build_backend(kind: BackendKind, geometry: PipelineGeometry) -> Result<Box<dyn Backend>> {
    Ok(match kind {
        BackendKind::Cpu => Box::new(CpuHog::new(geometry)),
        BackendKind::Gpu => Box::new(GpuHog::create(geometry)?),
    })
}
