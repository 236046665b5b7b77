use glam::UVec2;
use hog_core::{ExecutionMode, ExperimentConfig, HarnessError, Stage, TimingDiscipline};
use parity_lab::{
    cpu::CpuHog, geometry_for, run_combined_experiment, run_equivalence_experiment,
    run_timing_experiment, ExperimentKind, SyntheticSource,
};

fn config() -> ExperimentConfig {
    ExperimentConfig {
        image_size: UVec2::new(96, 64),
        window_size: UVec2::new(32, 16),
        trial_count: 4,
        warmup_trials: 2,
        seed: 0xA11CE,
        ..ExperimentConfig::default()
    }
}

fn cpu(config: &ExperimentConfig) -> CpuHog {
    CpuHog::new(geometry_for(config).unwrap())
}

fn invalid(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::InvalidConfiguration(_))
    )
}

#[test]
fn zero_trials_is_rejected_before_sampling() {
    let config = ExperimentConfig {
        trial_count: 0,
        ..config()
    };
    let mut source = SyntheticSource::new(1, 1);
    let mut backend = CpuHog::new(geometry_for(&self::config()).unwrap());
    let err = run_timing_experiment(&config, &mut source, &mut backend, &mut config.rng())
        .unwrap_err();
    assert!(invalid(&err), "{err:#}");
}

#[test]
fn empty_corpus_is_rejected() {
    let config = config();
    let mut source = SyntheticSource::new(0, 1);
    let mut reference = cpu(&config);
    let mut candidate = cpu(&config);
    let err = run_equivalence_experiment(
        &config,
        &mut source,
        &mut reference,
        &mut candidate,
        &mut config.rng(),
    )
    .unwrap_err();
    assert!(invalid(&err), "{err:#}");
}

#[test]
fn window_larger_than_image_is_rejected() {
    let config = ExperimentConfig {
        window_size: UVec2::new(96, 64),
        ..config()
    };
    let mut source = SyntheticSource::new(1, 1);
    let mut backend = CpuHog::new(geometry_for(&self::config()).unwrap());
    let err = run_timing_experiment(&config, &mut source, &mut backend, &mut config.rng())
        .unwrap_err();
    assert!(invalid(&err), "{err:#}");
}

#[test]
fn cumulative_total_is_the_last_stage_mark() {
    let config = ExperimentConfig {
        timing: TimingDiscipline::Cumulative,
        ..config()
    };
    let mut source = SyntheticSource::new(2, 9);
    let mut backend = cpu(&config);
    let report =
        run_timing_experiment(&config, &mut source, &mut backend, &mut config.rng()).unwrap();
    let total = report.stage(Stage::Total).unwrap();
    let descriptor = report.stage(Stage::Descriptor).unwrap();
    assert_eq!(total.report, descriptor.report);
    assert!(descriptor.report.min >= report.stage(Stage::Gradient).unwrap().report.min);
}

#[test]
fn per_stage_total_is_the_sum_of_stages() {
    let config = config();
    let mut source = SyntheticSource::new(1, 9);
    let mut backend = cpu(&config);
    let report =
        run_timing_experiment(&config, &mut source, &mut backend, &mut config.rng()).unwrap();
    let summed: f64 = [Stage::Normalization, Stage::Gradient, Stage::Descriptor]
        .iter()
        .map(|stage| report.stage(*stage).unwrap().report.total)
        .sum();
    let total = report.stage(Stage::Total).unwrap().report.total;
    assert!((summed - total).abs() <= 1e-6 * total.max(1.0), "{summed} vs {total}");
    assert_eq!(report.stage(Stage::Total).unwrap().samples, 4);
}

#[test]
fn sync_and_async_reference_backends_agree_exactly() {
    let mut source = SyntheticSource::new(2, 11);
    let sync_config = ExperimentConfig {
        tolerance: Some(0.0),
        ..config()
    };
    let async_config = ExperimentConfig {
        execution: ExecutionMode::Async,
        ..sync_config.clone()
    };
    for config in [sync_config, async_config] {
        let mut reference = cpu(&config);
        let mut candidate = cpu(&config).with_name("cpu-worker");
        let report = run_equivalence_experiment(
            &config,
            &mut source,
            &mut reference,
            &mut candidate,
            &mut config.rng(),
        )
        .unwrap();
        assert!(report.passed(), "{report}");
        assert_eq!(report.stage(Stage::Total).unwrap().samples, 8);
    }
}

#[test]
fn combined_experiment_times_both_then_compares() {
    let config = config();
    let mut source = SyntheticSource::new(1, 13);
    let mut reference = cpu(&config);
    let mut candidate = cpu(&config).with_name("cpu-b");
    let reports = run_combined_experiment(
        &config,
        &mut source,
        &mut reference,
        &mut candidate,
        &mut config.rng(),
    )
    .unwrap();
    let kinds: Vec<_> = reports.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ExperimentKind::Timing,
            ExperimentKind::Timing,
            ExperimentKind::Equivalence
        ]
    );
    assert_eq!(reports[1].backends, vec!["cpu-b"]);
    assert_eq!(reports[2].within_tolerance, None);
}
