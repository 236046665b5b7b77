use glam::UVec2;
use hog_core::{ExperimentConfig, Stage};
use hog_gfx::GpuHog;
use parity_lab::{cpu::CpuHog, geometry_for, run_equivalence_experiment, SyntheticSource};

#[test]
fn gpu_backend_tracks_cpu_reference() {
    let config = ExperimentConfig {
        image_size: UVec2::new(160, 160),
        window_size: UVec2::new(64, 128),
        trial_count: 3,
        warmup_trials: 1,
        ..ExperimentConfig::default()
    };
    let geometry = geometry_for(&config).unwrap();
    let mut gpu = match GpuHog::create(geometry) {
        Ok(gpu) => gpu,
        Err(err) => {
            eprintln!("skipping gpu parity: {err:#}");
            return;
        }
    };
    let mut cpu = CpuHog::new(geometry);
    let mut source = SyntheticSource::new(2, 0xC0FFEE);

    let report = run_equivalence_experiment(
        &config,
        &mut source,
        &mut cpu,
        &mut gpu,
        &mut config.rng(),
    )
    .unwrap();
    println!("{report}");

    for stage in [Stage::Normalization, Stage::GradientMagnitude] {
        let worst = report.stage(stage).unwrap().report.max;
        assert!(worst < 1e-4, "{stage} diverged: {worst}");
    }
    let descriptor = report.stage(Stage::Descriptor).unwrap().report.max;
    assert!(descriptor < 5e-2, "descriptor diverged: {descriptor}");
}
