//! Timing and equivalence experiments over sampled windows.
//!
//! Every experiment walks the same phases: warm-up on the first image, then one sampled window
//! per trial for every image in the corpus, then reduction of the collected samples into
//! per-stage reports. The generator is borrowed from the caller so consecutive experiments keep
//! drawing from one stream.

use anyhow::{bail, Context, Result};
use hog_core::{
    metrics, sweep_window, Backend, ExperimentConfig, HarnessError, ImageBuffer, PipelineGeometry,
    SampleLog, Stage, StageTimer, Window, WindowSampler,
};
use rand::Rng;
use tracing::{debug, info};

use crate::adapter::{PipelineAdapter, StageBuffers};
use crate::image_source::ImageSource;
use crate::report::{ExperimentKind, ExperimentReport};

/// Seconds to milliseconds.
pub const TIMING_RATIO: f64 = 1000.0;
pub const TIMING_UNIT: &str = "milliseconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    WarmUp,
    Sampling,
    Reporting,
}

impl Phase {
    /// Forward through a run, or back to `Idle` once reporting is done.
    pub fn can_enter(self, next: Phase) -> bool {
        next > self || (self == Phase::Reporting && next == Phase::Idle)
    }
}

/// Logs phase transitions for one experiment run.
#[derive(Debug)]
struct PhaseLog {
    experiment: &'static str,
    phase: Phase,
}

impl PhaseLog {
    fn new(experiment: &'static str) -> Self {
        Self {
            experiment,
            phase: Phase::Idle,
        }
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(self.phase.can_enter(next), "{:?} -> {:?}", self.phase, next);
        info!(experiment = self.experiment, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }
}

/// Geometry a backend must be built with to take part in an experiment on `config`.
pub fn geometry_for(config: &ExperimentConfig) -> Result<PipelineGeometry> {
    Ok(PipelineGeometry::new(
        config.window_size,
        config.pixel_format,
        config.hog,
    )?)
}

fn prepare(config: &ExperimentConfig, source: &dyn ImageSource) -> Result<WindowSampler> {
    config.validate()?;
    if source.is_empty() {
        return Err(HarnessError::invalid("image corpus is empty").into());
    }
    Ok(config.sampler()?)
}

fn check_backend(config: &ExperimentConfig, backend: &dyn Backend) -> Result<()> {
    let expected = geometry_for(config)?;
    let found = backend.geometry();
    if *found != expected {
        return Err(HarnessError::invalid(format!(
            "backend `{}` was built for {:?}, the experiment needs {:?}",
            backend.name(),
            found,
            expected
        ))
        .into());
    }
    Ok(())
}

fn load(source: &mut dyn ImageSource, index: usize, image: &mut ImageBuffer) -> Result<()> {
    source
        .load_into(index, image)
        .with_context(|| format!("failed to load image {}", source.label(index)))
}

fn trace_buffers(
    backend: &str,
    image: usize,
    trial: usize,
    window: &Window,
    buffers: &StageBuffers,
) {
    debug!(
        backend,
        image,
        trial,
        x = window.x,
        y = window.y,
        window_sum = metrics::checksum(&buffers.window),
        magnitude_sum = metrics::checksum(&buffers.magnitude),
        phase_sum = metrics::checksum(&buffers.phase),
        descriptor_sum = metrics::checksum(&buffers.descriptor),
        "stage checksums"
    );
}

/// Times every stage of `backend` over `trial_count` windows per image.
///
/// Stage samples are recorded in seconds and reported in milliseconds; each trial also yields
/// a `Total` sample derived by the configured timing discipline.
pub fn run_timing_experiment<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    source: &mut dyn ImageSource,
    backend: &mut dyn Backend,
    rng: &mut R,
) -> Result<ExperimentReport> {
    let sampler = prepare(config, &*source)?;
    check_backend(config, &*backend)?;
    let mut phases = PhaseLog::new("timing");
    let mut image = ImageBuffer::new(config.image_size, config.pixel_format);
    let mut adapter = PipelineAdapter::new(backend, config.execution);
    let mut buffers = adapter.allocate();
    let name = adapter.backend_name().to_string();

    if config.warmup_trials > 0 {
        phases.enter(Phase::WarmUp);
        load(source, 0, &mut image)?;
        for _ in 0..config.warmup_trials {
            let window = sampler.sample(rng);
            image.copy_window_into(&window, &mut buffers.window)?;
            adapter.run_pipeline(&mut buffers)?;
        }
    }

    phases.enter(Phase::Sampling);
    let mut log = SampleLog::with_capacity(source.len() * config.trial_count * 4);
    for index in 0..source.len() {
        load(source, index, &mut image)?;
        for trial in 0..config.trial_count {
            let window = sampler.sample(rng);
            image.copy_window_into(&window, &mut buffers.window)?;
            let mut timer = StageTimer::start(config.timing);
            adapter.run_timed(&mut buffers, &mut timer)?;
            for (stage, elapsed) in timer.finish() {
                log.push(stage, index, trial, elapsed.as_secs_f64());
            }
            if config.debug_trial == Some(trial) {
                trace_buffers(&name, index, trial, &window, &buffers);
            }
        }
    }

    phases.enter(Phase::Reporting);
    let stages = log.reports(TIMING_RATIO)?;
    let report = ExperimentReport {
        kind: ExperimentKind::Timing,
        backends: vec![name],
        unit: TIMING_UNIT.to_string(),
        ratio: TIMING_RATIO,
        execution: config.execution,
        timing: config.timing,
        metric: config.metric,
        window: config.window_size,
        images: source.len(),
        trials: config.trial_count,
        stages,
        tolerance: None,
        within_tolerance: None,
    };
    phases.enter(Phase::Idle);
    Ok(report)
}

/// Scores `candidate` against `reference` stage by stage.
///
/// Each trial first compares the stages in isolation: after every stage the candidate's
/// outputs are overwritten with the reference's, so a divergence is charged to the stage that
/// caused it. The same window is then run end to end through both backends and the final
/// descriptors are compared as `Total`.
pub fn run_equivalence_experiment<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    source: &mut dyn ImageSource,
    reference: &mut dyn Backend,
    candidate: &mut dyn Backend,
    rng: &mut R,
) -> Result<ExperimentReport> {
    let sampler = prepare(config, &*source)?;
    check_backend(config, &*reference)?;
    check_backend(config, &*candidate)?;
    let metric = config.metric;
    let mut phases = PhaseLog::new("equivalence");
    let mut image = ImageBuffer::new(config.image_size, config.pixel_format);
    let mut a = PipelineAdapter::new(reference, config.execution);
    let mut b = PipelineAdapter::new(candidate, config.execution);
    let mut ra = a.allocate();
    let mut rb = b.allocate();
    let names = vec![a.backend_name().to_string(), b.backend_name().to_string()];

    if config.warmup_trials > 0 {
        phases.enter(Phase::WarmUp);
        load(source, 0, &mut image)?;
        for _ in 0..config.warmup_trials {
            let window = sampler.sample(rng);
            image.copy_window_into(&window, &mut ra.window)?;
            rb.window.copy_from(&ra.window)?;
            a.run_pipeline(&mut ra)?;
            b.run_pipeline(&mut rb)?;
        }
    }

    phases.enter(Phase::Sampling);
    let mut log = SampleLog::with_capacity(source.len() * config.trial_count * 5);
    for index in 0..source.len() {
        load(source, index, &mut image)?;
        for trial in 0..config.trial_count {
            let window = sampler.sample(rng);
            image.copy_window_into(&window, &mut ra.window)?;
            rb.window.copy_from(&ra.window)?;

            a.normalize(&mut ra.window)?;
            b.normalize(&mut rb.window)?;
            log.push(
                Stage::Normalization,
                index,
                trial,
                metric.compare(&ra.window, &rb.window)?,
            );
            rb.window.copy_from(&ra.window)?;

            a.compute_gradient(&mut ra.window, &mut ra.magnitude, &mut ra.phase)?;
            b.compute_gradient(&mut rb.window, &mut rb.magnitude, &mut rb.phase)?;
            log.push(
                Stage::GradientMagnitude,
                index,
                trial,
                metric.compare(&ra.magnitude, &rb.magnitude)?,
            );
            log.push(
                Stage::GradientPhase,
                index,
                trial,
                metric.compare(&ra.phase, &rb.phase)?,
            );
            rb.magnitude.copy_from(&ra.magnitude)?;
            rb.phase.copy_from(&ra.phase)?;

            a.compute_descriptor(&mut ra.magnitude, &mut ra.phase, &mut ra.descriptor)?;
            b.compute_descriptor(&mut rb.magnitude, &mut rb.phase, &mut rb.descriptor)?;
            log.push(
                Stage::Descriptor,
                index,
                trial,
                metric.compare(&ra.descriptor, &rb.descriptor)?,
            );

            image.copy_window_into(&window, &mut ra.window)?;
            image.copy_window_into(&window, &mut rb.window)?;
            a.run_pipeline(&mut ra)?;
            b.run_pipeline(&mut rb)?;
            log.push(
                Stage::Total,
                index,
                trial,
                metric.compare(&ra.descriptor, &rb.descriptor)?,
            );

            if config.debug_trial == Some(trial) {
                trace_buffers(&names[0], index, trial, &window, &ra);
                trace_buffers(&names[1], index, trial, &window, &rb);
            }
        }
    }

    phases.enter(Phase::Reporting);
    let stages = log.reports(1.0)?;
    let mut report = ExperimentReport {
        kind: ExperimentKind::Equivalence,
        backends: names,
        unit: metric.unit().to_string(),
        ratio: 1.0,
        execution: config.execution,
        timing: config.timing,
        metric,
        window: config.window_size,
        images: source.len(),
        trials: config.trial_count,
        stages,
        tolerance: config.tolerance,
        within_tolerance: None,
    };
    if let Some(tolerance) = config.tolerance {
        let worst = report.worst_deviation().unwrap_or(0.0);
        report.within_tolerance = Some(worst <= tolerance);
    }
    phases.enter(Phase::Idle);
    Ok(report)
}

/// Times both backends, then compares them, all on one generator stream.
pub fn run_combined_experiment<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    source: &mut dyn ImageSource,
    reference: &mut dyn Backend,
    candidate: &mut dyn Backend,
    rng: &mut R,
) -> Result<Vec<ExperimentReport>> {
    let reference_timing = run_timing_experiment(config, source, reference, rng)?;
    let candidate_timing = run_timing_experiment(config, source, candidate, rng)?;
    let equivalence = run_equivalence_experiment(config, source, reference, candidate, rng)?;
    Ok(vec![reference_timing, candidate_timing, equivalence])
}

/// Timing runs over `128·s × 72·s` windows for every configured scale `s`.
///
/// Backends are built per window by `make_backend`. A window that does not fit the configured
/// image size aborts the sweep before anything is built for it.
pub fn run_window_sweep<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    source: &mut dyn ImageSource,
    make_backend: &mut dyn FnMut(PipelineGeometry) -> Result<Box<dyn Backend>>,
    rng: &mut R,
) -> Result<Vec<ExperimentReport>> {
    if config.sweep_scales.is_empty() {
        bail!("window sweep needs at least one scale");
    }
    let mut reports = Vec::with_capacity(config.sweep_scales.len());
    for &scale in &config.sweep_scales {
        let mut scaled = config.clone();
        scaled.window_size = sweep_window(scale);
        scaled
            .validate()
            .with_context(|| format!("sweep scale {scale} is not usable"))?;
        let mut backend = make_backend(geometry_for(&scaled)?)?;
        info!(
            scale,
            width = scaled.window_size.x,
            height = scaled.window_size.y,
            backend = backend.name(),
            "sweep window"
        );
        reports.push(run_timing_experiment(
            &scaled,
            source,
            backend.as_mut(),
            rng,
        )?);
    }
    Ok(reports)
}
