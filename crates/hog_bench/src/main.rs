//! Command-line runner for HOG backend timing and equivalence experiments.

use std::{env, fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use glam::UVec2;
use hog_core::{
    sweep_window, Backend, ExecutionMode, ExperimentConfig, Metric, PixelFormat, TimingDiscipline,
    WindowSampler,
};
use parity_lab::{
    build_backend, geometry_for, run_combined_experiment, run_equivalence_experiment,
    run_timing_experiment, run_window_sweep, write_reports_json, BackendKind, DirectorySource,
    ExperimentReport, ImageSource, SyntheticSource,
};
use tracer::init_tracing;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Timing,
    Equivalence,
    Both,
    Sweep,
}

#[derive(Debug, Default)]
struct ConfigOverrides {
    trials: Option<usize>,
    warmup: Option<usize>,
    seed: Option<u64>,
    window: Option<UVec2>,
    image_size: Option<UVec2>,
    format: Option<PixelFormat>,
    execution: Option<ExecutionMode>,
    timing: Option<TimingDiscipline>,
    metric: Option<Metric>,
    tolerance: Option<f64>,
    debug_trial: Option<usize>,
    sweep: Option<Vec<u32>>,
}

struct CliOptions {
    config_path: Option<PathBuf>,
    images: Option<PathBuf>,
    synthetic: Option<usize>,
    mode: Mode,
    backend: BackendKind,
    reference: BackendKind,
    candidate: BackendKind,
    report_json: Option<PathBuf>,
    overrides: ConfigOverrides,
}

fn main() -> Result<()> {
    init_tracing();
    let options = parse_options(env::args().skip(1))?;

    let mut config = load_config(options.config_path.as_ref())?;
    apply_overrides(&mut config, options.overrides);
    if options.mode == Mode::Sweep {
        prepare_sweep(&mut config);
    }
    config.validate().context("invalid experiment configuration")?;

    let mut source = open_source(options.images, options.synthetic, &config)?;
    println!(
        "Running {:?} on {} images, {} trials per image, window {}x{}, seed=0x{:X}",
        options.mode,
        source.len(),
        config.trial_count,
        config.window_size.x,
        config.window_size.y,
        config.seed
    );

    let mut rng = config.rng();
    let reports = match options.mode {
        Mode::Timing => {
            let mut backend = build_backend(options.backend, geometry_for(&config)?)?;
            vec![run_timing_experiment(
                &config,
                source.as_mut(),
                backend.as_mut(),
                &mut rng,
            )?]
        }
        Mode::Equivalence => {
            let (mut reference, mut candidate) =
                build_pair(options.reference, options.candidate, &config)?;
            vec![run_equivalence_experiment(
                &config,
                source.as_mut(),
                reference.as_mut(),
                candidate.as_mut(),
                &mut rng,
            )?]
        }
        Mode::Both => {
            let (mut reference, mut candidate) =
                build_pair(options.reference, options.candidate, &config)?;
            run_combined_experiment(
                &config,
                source.as_mut(),
                reference.as_mut(),
                candidate.as_mut(),
                &mut rng,
            )?
        }
        Mode::Sweep => {
            let kind = options.backend;
            run_window_sweep(
                &config,
                source.as_mut(),
                &mut |geometry| build_backend(kind, geometry),
                &mut rng,
            )?
        }
    };

    for report in &reports {
        println!("{report}");
    }

    if let Some(ref path) = options.report_json {
        write_reports_json(&reports, path)?;
        println!("Exported {} report(s) to {}", reports.len(), path.display());
    }

    if reports.iter().any(|report| !report.passed()) {
        let worst = reports
            .iter()
            .filter_map(ExperimentReport::worst_deviation)
            .fold(0.0, f64::max);
        bail!("equivalence results diverged beyond tolerance (worst deviation {worst:.3e})");
    }

    Ok(())
}

fn parse_options(args: impl IntoIterator<Item = String>) -> Result<CliOptions> {
    let mut opts = CliOptions {
        config_path: None,
        images: None,
        synthetic: None,
        mode: Mode::Both,
        backend: BackendKind::Cpu,
        reference: BackendKind::Cpu,
        candidate: BackendKind::Gpu,
        report_json: None,
        overrides: ConfigOverrides::default(),
    };
    let o = &mut opts.overrides;

    for arg in args {
        if let Some(value) = arg.strip_prefix("--config=") {
            opts.config_path = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--images=") {
            opts.images = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--synthetic=") {
            opts.synthetic = Some(value.parse().context("invalid --synthetic value")?);
        } else if let Some(value) = arg.strip_prefix("--mode=") {
            opts.mode = parse_mode(value)?;
        } else if let Some(value) = arg.strip_prefix("--backend=") {
            opts.backend = value.parse().context("invalid --backend value")?;
        } else if let Some(value) = arg.strip_prefix("--reference=") {
            opts.reference = value.parse().context("invalid --reference value")?;
        } else if let Some(value) = arg.strip_prefix("--candidate=") {
            opts.candidate = value.parse().context("invalid --candidate value")?;
        } else if let Some(value) = arg.strip_prefix("--report-json=") {
            opts.report_json = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--trials=") {
            o.trials = Some(value.parse().context("invalid --trials value")?);
        } else if let Some(value) = arg.strip_prefix("--warmup=") {
            o.warmup = Some(value.parse().context("invalid --warmup value")?);
        } else if let Some(value) = arg.strip_prefix("--seed=") {
            o.seed = Some(parse_seed(value).context("invalid --seed value")?);
        } else if let Some(value) = arg.strip_prefix("--window=") {
            o.window = Some(parse_size(value).context("invalid --window value")?);
        } else if let Some(value) = arg.strip_prefix("--image-size=") {
            o.image_size = Some(parse_size(value).context("invalid --image-size value")?);
        } else if let Some(value) = arg.strip_prefix("--format=") {
            o.format = Some(match value {
                "rgb" => PixelFormat::Rgb32F,
                "gray" => PixelFormat::Gray32F,
                other => bail!("invalid --format value `{other}` (expected rgb or gray)"),
            });
        } else if let Some(value) = arg.strip_prefix("--metric=") {
            o.metric = Some(match value {
                "euclidean" => Metric::NormalizedEuclidean,
                "cosine" => Metric::Cosine,
                other => bail!("invalid --metric value `{other}` (expected euclidean or cosine)"),
            });
        } else if let Some(value) = arg.strip_prefix("--tolerance=") {
            o.tolerance = Some(value.parse().context("invalid --tolerance value")?);
        } else if let Some(value) = arg.strip_prefix("--debug-trial=") {
            o.debug_trial = Some(value.parse().context("invalid --debug-trial value")?);
        } else if let Some(value) = arg.strip_prefix("--sweep=") {
            let scales = value
                .split(',')
                .map(|scale| scale.trim().parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .context("invalid --sweep value")?;
            o.sweep = Some(scales);
            opts.mode = Mode::Sweep;
        } else if arg == "--async" {
            o.execution = Some(ExecutionMode::Async);
        } else if arg == "--cumulative" {
            o.timing = Some(TimingDiscipline::Cumulative);
        } else {
            bail!("unrecognized argument: {arg}");
        }
    }

    if opts.images.is_some() && opts.synthetic.is_some() {
        bail!("--images and --synthetic are mutually exclusive");
    }
    Ok(opts)
}

fn parse_mode(value: &str) -> Result<Mode> {
    Ok(match value {
        "timing" => Mode::Timing,
        "equivalence" => Mode::Equivalence,
        "both" => Mode::Both,
        "sweep" => Mode::Sweep,
        other => bail!("invalid --mode value `{other}` (expected timing, equivalence, both or sweep)"),
    })
}

fn parse_seed(value: &str) -> Result<u64> {
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).map_err(|err| anyhow::anyhow!(err))
    } else {
        value.parse::<u64>().map_err(|err| anyhow::anyhow!(err))
    }
}

/// `WIDTHxHEIGHT`, e.g. `64x128`.
fn parse_size(value: &str) -> Result<UVec2> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    Ok(UVec2::new(width.trim().parse()?, height.trim().parse()?))
}

fn load_config(path: Option<&PathBuf>) -> Result<ExperimentConfig> {
    let Some(path) = path else {
        return Ok(ExperimentConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = ExperimentConfig::from_toml_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    info!(path = %path.display(), "loaded experiment config");
    Ok(config)
}

fn apply_overrides(config: &mut ExperimentConfig, o: ConfigOverrides) {
    if let Some(trials) = o.trials {
        config.trial_count = trials;
    }
    if let Some(warmup) = o.warmup {
        config.warmup_trials = warmup;
    }
    if let Some(seed) = o.seed {
        config.seed = seed;
    }
    if let Some(window) = o.window {
        config.window_size = window;
    }
    if let Some(image_size) = o.image_size {
        config.image_size = image_size;
    }
    if let Some(format) = o.format {
        config.pixel_format = format;
    }
    if let Some(execution) = o.execution {
        config.execution = execution;
    }
    if let Some(timing) = o.timing {
        config.timing = timing;
    }
    if let Some(metric) = o.metric {
        config.metric = metric;
    }
    if o.tolerance.is_some() {
        config.tolerance = o.tolerance;
    }
    if o.debug_trial.is_some() {
        config.debug_trial = o.debug_trial;
    }
    if let Some(scales) = o.sweep {
        config.sweep_scales = scales;
    }
}

/// Every sweep scale whose window still fits `image` with the sampling margin.
fn fitting_sweep_scales(image: UVec2) -> Vec<u32> {
    (1..)
        .take_while(|&scale| WindowSampler::new(image, sweep_window(scale)).is_ok())
        .collect()
}

/// Fills in the default scales and validates against the first sweep window, since the base
/// window is never run in sweep mode.
fn prepare_sweep(config: &mut ExperimentConfig) {
    if config.sweep_scales.is_empty() {
        config.sweep_scales = fitting_sweep_scales(config.image_size);
    }
    if let Some(&first) = config.sweep_scales.first() {
        config.window_size = sweep_window(first);
    }
}

fn open_source(
    images: Option<PathBuf>,
    synthetic: Option<usize>,
    config: &ExperimentConfig,
) -> Result<Box<dyn ImageSource>> {
    if let Some(count) = synthetic {
        return Ok(Box::new(SyntheticSource::new(count, config.seed)));
    }
    let dir = images.unwrap_or_else(|| config.image_corpus.clone());
    let source = DirectorySource::open(&dir)
        .with_context(|| format!("failed to open image corpus {}", dir.display()))?;
    Ok(Box::new(source))
}

fn build_pair(
    reference: BackendKind,
    candidate: BackendKind,
    config: &ExperimentConfig,
) -> Result<(Box<dyn Backend>, Box<dyn Backend>)> {
    let geometry = geometry_for(config)?;
    let reference = build_backend(reference, geometry).context("failed to build reference")?;
    let candidate = build_backend(candidate, geometry).context("failed to build candidate")?;
    Ok((reference, candidate))
}

mod tracer {
    use tracing_subscriber::EnvFilter;

    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn seeds_accept_hex_and_decimal() {
        assert_eq!(parse_seed("0xA11CE").unwrap(), 0xA11CE);
        assert_eq!(parse_seed("42").unwrap(), 42);
        assert!(parse_seed("0xZZ").is_err());
    }

    #[test]
    fn sizes_parse_as_width_by_height() {
        assert_eq!(parse_size("64x128").unwrap(), UVec2::new(64, 128));
        assert!(parse_size("64").is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let options = parse_options(args(&[
            "--trials=7",
            "--seed=0x10",
            "--window=32x64",
            "--async",
            "--cumulative",
            "--metric=cosine",
            "--tolerance=0.01",
        ]))
        .unwrap();
        let mut config = ExperimentConfig::default();
        apply_overrides(&mut config, options.overrides);
        assert_eq!(config.trial_count, 7);
        assert_eq!(config.seed, 16);
        assert_eq!(config.window_size, UVec2::new(32, 64));
        assert_eq!(config.execution, ExecutionMode::Async);
        assert_eq!(config.timing, TimingDiscipline::Cumulative);
        assert_eq!(config.metric, Metric::Cosine);
        assert_eq!(config.tolerance, Some(0.01));
    }

    #[test]
    fn sweep_flag_selects_sweep_mode() {
        let options = parse_options(args(&["--sweep=1,2"])).unwrap();
        assert_eq!(options.mode, Mode::Sweep);
        assert_eq!(options.overrides.sweep, Some(vec![1, 2]));
    }

    #[test]
    fn default_sweep_stops_at_the_image_edge() {
        assert_eq!(fitting_sweep_scales(UVec2::new(640, 480)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn sweep_ignores_a_base_window_that_does_not_fit() {
        let options = parse_options(args(&["--mode=sweep", "--image-size=140x80"])).unwrap();
        let mut config = ExperimentConfig::default();
        apply_overrides(&mut config, options.overrides);
        assert!(config.validate().is_err());

        prepare_sweep(&mut config);
        assert_eq!(config.sweep_scales, vec![1]);
        assert_eq!(config.window_size, sweep_window(1));
        config.validate().unwrap();
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(parse_options(args(&["--frobnicate"])).is_err());
        assert!(parse_options(args(&["--images=a", "--synthetic=3"])).is_err());
    }
}
