//! Experiment results in printable and serializable form.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::UVec2;
use hog_core::{ExecutionMode, Metric, Stage, StageReport, TimingDiscipline};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    Timing,
    Equivalence,
}

/// Outcome of one timing or equivalence run, already scaled into `unit`.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub kind: ExperimentKind,
    /// One name for timing runs; reference then candidate for equivalence runs.
    pub backends: Vec<String>,
    pub unit: String,
    pub ratio: f64,
    pub execution: ExecutionMode,
    pub timing: TimingDiscipline,
    pub metric: Metric,
    pub window: UVec2,
    pub images: usize,
    pub trials: usize,
    pub stages: Vec<StageReport>,
    pub tolerance: Option<f64>,
    pub within_tolerance: Option<bool>,
}

impl ExperimentReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    /// Largest distance from a perfect score across every compared stage.
    pub fn worst_deviation(&self) -> Option<f64> {
        if self.kind != ExperimentKind::Equivalence {
            return None;
        }
        self.stages
            .iter()
            .flat_map(|s| [s.report.max, s.report.min])
            .map(|score| self.metric.deviation(score))
            .reduce(f64::max)
    }

    pub fn passed(&self) -> bool {
        self.within_tolerance.unwrap_or(true)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize experiment report")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))
    }
}

/// Writes every report of one invocation as a pretty JSON array.
pub fn write_reports_json(reports: &[ExperimentReport], path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(reports).context("failed to serialize experiment reports")?;
    fs::write(path, json).with_context(|| format!("failed to write reports to {}", path.display()))
}

impl fmt::Display for ExperimentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ExperimentKind::Timing => writeln!(
                f,
                "== timing: {} ({:?}, {} images x {} trials, window {}x{}) ==",
                self.backends.join(", "),
                self.execution,
                self.images,
                self.trials,
                self.window.x,
                self.window.y
            )?,
            ExperimentKind::Equivalence => writeln!(
                f,
                "== equivalence: {} ({} images x {} trials, window {}x{}) ==",
                self.backends.join(" vs "),
                self.images,
                self.trials,
                self.window.x,
                self.window.y
            )?,
        }
        for stage in &self.stages {
            match self.kind {
                ExperimentKind::Timing => writeln!(f, "Time spent on {}:", stage.stage)?,
                ExperimentKind::Equivalence => {
                    writeln!(f, "Comparison of {} ({}):", stage.stage, self.unit)?
                }
            }
            writeln!(f, "{}", stage.report.describe(&self.unit))?;
        }
        if let (Some(tolerance), Some(within)) = (self.tolerance, self.within_tolerance) {
            let verdict = if within { "within" } else { "OUTSIDE" };
            writeln!(
                f,
                "worst deviation {:.3e} is {verdict} tolerance {tolerance:.3e}",
                self.worst_deviation().unwrap_or(0.0)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hog_core::StatReport;

    fn equivalence(scores: &[f64]) -> ExperimentReport {
        ExperimentReport {
            kind: ExperimentKind::Equivalence,
            backends: vec!["cpu".into(), "gpu".into()],
            unit: Metric::Cosine.unit().into(),
            ratio: 1.0,
            execution: ExecutionMode::Sync,
            timing: TimingDiscipline::PerStage,
            metric: Metric::Cosine,
            window: UVec2::new(64, 128),
            images: 1,
            trials: scores.len(),
            stages: vec![StageReport {
                stage: Stage::Descriptor,
                samples: scores.len(),
                report: StatReport::from_samples(scores).unwrap(),
            }],
            tolerance: Some(1e-3),
            within_tolerance: Some(true),
        }
    }

    #[test]
    fn worst_deviation_uses_metric_direction() {
        let report = equivalence(&[1.0, 0.998, 0.9995]);
        let worst = report.worst_deviation().unwrap();
        assert!((worst - 0.002).abs() < 1e-12, "worst = {worst}");
    }

    #[test]
    fn console_rendering_lists_every_stage() {
        let text = equivalence(&[1.0, 1.0]).to_string();
        assert!(text.contains("cpu vs gpu"));
        assert!(text.contains("Comparison of descriptor (cosine similarity):"));
        assert!(text.contains("Average: 1 cosine similarity"));
        assert!(text.contains("within tolerance"));
    }

    #[test]
    fn json_report_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        equivalence(&[1.0]).write_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["kind"], "equivalence");
        assert_eq!(value["stages"][0]["stage"], "descriptor");
        assert_eq!(value["metric"], "cosine");
    }
}
