//! Experiment configuration shared by the orchestrator, the backends and the CLI.

use std::path::PathBuf;

use glam::UVec2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::image::PixelFormat;
use crate::metrics::Metric;
use crate::sampler::WindowSampler;
use crate::timing::TimingDiscipline;

/// Largest per-block histogram (`block_cells² × num_bins`) the compute kernels can hold.
pub const MAX_BLOCK_HISTOGRAM: u32 = 256;

/// How the adapter drives backend stage calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

/// Descriptor geometry: square cells, square blocks sliding one cell at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HogSettings {
    /// Cell edge in pixels; also the block stride.
    pub cell_size: u32,
    /// Block edge in cells.
    pub block_cells: u32,
    /// Orientation bins over `[0, π)`.
    pub num_bins: u32,
}

impl Default for HogSettings {
    fn default() -> Self {
        Self {
            cell_size: 8,
            block_cells: 2,
            num_bins: 9,
        }
    }
}

impl HogSettings {
    pub fn cells(&self, window: UVec2) -> UVec2 {
        window / self.cell_size.max(1)
    }

    pub fn blocks(&self, window: UVec2) -> UVec2 {
        let cells = self.cells(window);
        UVec2::new(
            (cells.x + 1).saturating_sub(self.block_cells),
            (cells.y + 1).saturating_sub(self.block_cells),
        )
    }

    pub fn block_len(&self) -> usize {
        (self.block_cells * self.block_cells * self.num_bins) as usize
    }

    pub fn descriptor_length(&self, window: UVec2) -> usize {
        let blocks = self.blocks(window);
        blocks.x as usize * blocks.y as usize * self.block_len()
    }

    pub fn validate_window(&self, window: UVec2) -> Result<()> {
        if self.cell_size == 0 || self.block_cells == 0 || self.num_bins == 0 {
            return Err(HarnessError::invalid(format!(
                "hog geometry {self:?} has a zero field"
            )));
        }
        if window.x % self.cell_size != 0 || window.y % self.cell_size != 0 {
            return Err(HarnessError::invalid(format!(
                "window {}x{} is not a multiple of the {}px cell",
                window.x, window.y, self.cell_size
            )));
        }
        let cells = self.cells(window);
        if cells.x < self.block_cells || cells.y < self.block_cells {
            return Err(HarnessError::invalid(format!(
                "window {}x{} holds fewer than one {}x{} cell block",
                window.x, window.y, self.block_cells, self.block_cells
            )));
        }
        if self.block_len() > MAX_BLOCK_HISTOGRAM as usize {
            return Err(HarnessError::invalid(format!(
                "block histogram of {} bins exceeds {MAX_BLOCK_HISTOGRAM}",
                self.block_len()
            )));
        }
        Ok(())
    }

    /// Packs the geometry for `window` into the uniform block the compute kernels read.
    pub fn kernel_params(&self, window: UVec2, format: PixelFormat) -> HogKernelParams {
        let blocks = self.blocks(window);
        HogKernelParams {
            width: window.x,
            height: window.y,
            channels: format.channels() as u32,
            cell_size: self.cell_size,
            block_cells: self.block_cells,
            num_bins: self.num_bins,
            blocks_x: blocks.x,
            blocks_y: blocks.y,
        }
    }
}

/// Uniform payload shared by every HOG kernel (32 bytes, matches the WGSL `Params` struct).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct HogKernelParams {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub cell_size: u32,
    pub block_cells: u32,
    pub num_bins: u32,
    pub blocks_x: u32,
    pub blocks_y: u32,
}

/// Window used at `scale` by the timing sweep: `128·s` wide, `72·s` tall.
pub fn sweep_window(scale: u32) -> UVec2 {
    UVec2::new(8 * 16 * scale, 8 * 9 * scale)
}

/// Parameters of one harness run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Directory scanned recursively for images.
    pub image_corpus: PathBuf,
    /// Size every decoded image is brought to (`x` = width).
    pub image_size: UVec2,
    pub window_size: UVec2,
    pub pixel_format: PixelFormat,
    pub trial_count: usize,
    /// Discarded trials per backend before sampling starts.
    pub warmup_trials: usize,
    pub seed: u64,
    pub timing: TimingDiscipline,
    pub execution: ExecutionMode,
    pub metric: Metric,
    /// Largest acceptable deviation from a perfect score in equivalence runs.
    pub tolerance: Option<f64>,
    /// Trial whose stage buffers get checksummed into the debug log.
    pub debug_trial: Option<usize>,
    /// Scales swept by the window timing sweep; empty disables it.
    pub sweep_scales: Vec<u32>,
    pub hog: HogSettings,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            image_corpus: PathBuf::from("resources/images"),
            image_size: UVec2::new(640, 480),
            window_size: UVec2::new(64, 128),
            pixel_format: PixelFormat::Rgb32F,
            trial_count: 100,
            warmup_trials: 10,
            seed: 0x5EED,
            timing: TimingDiscipline::default(),
            execution: ExecutionMode::default(),
            metric: Metric::default(),
            tolerance: None,
            debug_trial: None,
            sweep_scales: Vec::new(),
            hog: HogSettings::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| HarnessError::invalid(err.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| HarnessError::invalid(err.to_string()))
    }

    /// Checks everything that can be rejected before a single trial runs.
    pub fn validate(&self) -> Result<()> {
        if self.trial_count == 0 {
            return Err(HarnessError::invalid("trial_count must be at least 1"));
        }
        self.sampler()?;
        self.hog.validate_window(self.window_size)?;
        if let Some(tolerance) = self.tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(HarnessError::invalid(format!(
                    "tolerance {tolerance} must be a non-negative finite number"
                )));
            }
        }
        if let Some(trial) = self.debug_trial {
            if trial >= self.trial_count {
                return Err(HarnessError::invalid(format!(
                    "debug_trial {trial} is past the last trial ({})",
                    self.trial_count - 1
                )));
            }
        }
        if self.sweep_scales.contains(&0) {
            return Err(HarnessError::invalid("sweep scales start at 1"));
        }
        Ok(())
    }

    pub fn sampler(&self) -> Result<WindowSampler> {
        WindowSampler::new(self.image_size, self.window_size)
    }

    /// Fresh generator for this run. Create it once and thread it through every experiment.
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn default_geometry_matches_pedestrian_window() {
        let hog = HogSettings::default();
        let window = UVec2::new(64, 128);
        assert_eq!(hog.cells(window), UVec2::new(8, 16));
        assert_eq!(hog.blocks(window), UVec2::new(7, 15));
        assert_eq!(hog.block_len(), 36);
        assert_eq!(hog.descriptor_length(window), 3780);
        assert!(hog.validate_window(window).is_ok());
    }

    #[test]
    fn geometry_rejects_unaligned_or_tiny_windows() {
        let hog = HogSettings::default();
        assert!(hog.validate_window(UVec2::new(60, 128)).is_err());
        assert!(hog.validate_window(UVec2::new(8, 8)).is_err());
        let wide = HogSettings {
            num_bins: 65,
            ..HogSettings::default()
        };
        assert!(wide.validate_window(UVec2::new(64, 64)).is_err());
    }

    #[test]
    fn kernel_params_are_32_bytes() {
        assert_eq!(core::mem::size_of::<HogKernelParams>(), 32);
        let params = HogSettings::default().kernel_params(UVec2::new(64, 128), PixelFormat::Rgb32F);
        assert_eq!((params.blocks_x, params.blocks_y), (7, 15));
        assert_eq!(params.channels, 3);
    }

    #[test]
    fn zero_trials_is_invalid() {
        let config = ExperimentConfig {
            trial_count: 0,
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HarnessError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn oversized_window_is_invalid() {
        let config = ExperimentConfig {
            image_size: UVec2::new(64, 128),
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HarnessError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn bad_tolerance_and_debug_trial_are_invalid() {
        let negative = ExperimentConfig {
            tolerance: Some(-1.0),
            ..ExperimentConfig::default()
        };
        assert!(negative.validate().is_err());
        let late = ExperimentConfig {
            trial_count: 5,
            debug_trial: Some(5),
            ..ExperimentConfig::default()
        };
        assert!(late.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ExperimentConfig::from_toml_str(
            r#"
            trial_count = 12
            seed = 7
            window_size = [32, 64]
            execution = "async"
            metric = "cosine"

            [hog]
            num_bins = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.trial_count, 12);
        assert_eq!(config.window_size, UVec2::new(32, 64));
        assert_eq!(config.execution, ExecutionMode::Async);
        assert_eq!(config.metric, Metric::Cosine);
        assert_eq!(config.hog.num_bins, 6);
        assert_eq!(config.hog.cell_size, 8);
        assert_eq!(config.warmup_trials, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_round_trip_preserves_config() {
        let config = ExperimentConfig {
            tolerance: Some(1e-4),
            sweep_scales: vec![1, 2],
            ..ExperimentConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(ExperimentConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn unknown_metric_is_rejected() {
        let err = ExperimentConfig::from_toml_str("metric = \"manhattan\"").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfiguration(_)));
    }

    #[test]
    fn rng_restarts_from_seed() {
        let config = ExperimentConfig::default();
        let a: u64 = config.rng().gen();
        let b: u64 = config.rng().gen();
        assert_eq!(a, b);
    }

    #[test]
    fn sweep_windows_scale_linearly() {
        assert_eq!(sweep_window(1), UVec2::new(128, 72));
        assert_eq!(sweep_window(15), UVec2::new(1920, 1080));
    }
}
