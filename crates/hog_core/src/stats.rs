//! Summary statistics over per-stage sample vectors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Pipeline stage a sample was taken at. Ordering is the reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalization,
    /// Fused gradient call, used when timing.
    Gradient,
    GradientMagnitude,
    GradientPhase,
    Descriptor,
    Total,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Normalization => "normalization",
            Stage::Gradient => "gradient",
            Stage::GradientMagnitude => "gradient_magnitude",
            Stage::GradientPhase => "gradient_phase",
            Stage::Descriptor => "descriptor",
            Stage::Total => "total",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scalar measurement taken during a trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSample {
    pub stage: Stage,
    pub image_index: usize,
    pub trial_index: usize,
    pub value: f64,
}

/// Five-number summary over one stage's samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatReport {
    pub average: f64,
    pub stddev: f64,
    pub max: f64,
    pub min: f64,
    pub total: f64,
}

impl StatReport {
    /// Two-pass reduction: extremes and total first, then the squared deviations.
    pub fn from_samples(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(HarnessError::EmptyInput("statistics".into()));
        }

        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        let mut total = 0.0;
        for &value in values {
            max = max.max(value);
            min = min.min(value);
            total += value;
        }
        let count = values.len();
        let average = total / count as f64;

        let stddev = if count < 2 {
            0.0
        } else {
            let squares: f64 = values.iter().map(|v| (v - average).powi(2)).sum();
            (squares / (count - 1) as f64).sqrt()
        };

        Ok(Self {
            average,
            stddev,
            max,
            min,
            total,
        })
    }

    /// Rescales every field by `ratio` (e.g. `1000.0` to turn seconds into milliseconds).
    pub fn scaled(&self, ratio: f64) -> Self {
        Self {
            average: self.average * ratio,
            stddev: self.stddev * ratio,
            max: self.max * ratio,
            min: self.min * ratio,
            total: self.total * ratio,
        }
    }

    /// Multi-line rendering used by the console sink.
    pub fn describe(&self, unit: &str) -> String {
        format!(
            "Average: {} {unit}\nStandard deviation: {}\nMax: {} {unit}\nMin: {} {unit}\nTotal: {} {unit}",
            self.average, self.stddev, self.max, self.min, self.total
        )
    }
}

/// Report for a single stage, already scaled into presentation units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub samples: usize,
    pub report: StatReport,
}

/// Growing collection of samples for one experiment phase.
#[derive(Debug, Default, Clone)]
pub struct SampleLog {
    samples: Vec<MetricSample>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, stage: Stage, image_index: usize, trial_index: usize, value: f64) {
        self.samples.push(MetricSample {
            stage,
            image_index,
            trial_index,
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Values recorded for `stage`, in insertion order.
    pub fn values(&self, stage: Stage) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.value)
            .collect()
    }

    /// One report per distinct stage, in stage order, scaled by `ratio`.
    pub fn reports(&self, ratio: f64) -> Result<Vec<StageReport>> {
        if self.samples.is_empty() {
            return Err(HarnessError::EmptyInput("sample log".into()));
        }
        let mut by_stage: BTreeMap<Stage, Vec<f64>> = BTreeMap::new();
        for sample in &self.samples {
            by_stage.entry(sample.stage).or_default().push(sample.value);
        }
        by_stage
            .into_iter()
            .map(|(stage, values)| {
                let report = StatReport::from_samples(&values)
                    .map_err(|_| HarnessError::EmptyInput(stage.to_string()))?;
                Ok(StageReport {
                    stage,
                    samples: values.len(),
                    report: report.scaled(ratio),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sequence() {
        let report = StatReport::from_samples(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!((report.average - 3.0).abs() < 1e-12);
        assert_eq!(report.max, 5.0);
        assert_eq!(report.min, 1.0);
        assert_eq!(report.total, 15.0);
        assert!((report.stddev - 2.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constant_sequence_has_no_spread() {
        for count in [2usize, 3, 17] {
            let values = vec![0.75; count];
            let report = StatReport::from_samples(&values).unwrap();
            assert_eq!(report.average, 0.75);
            assert_eq!(report.stddev, 0.0);
            assert_eq!(report.max, 0.75);
            assert_eq!(report.min, 0.75);
            assert!((report.total - 0.75 * count as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn negative_values_keep_true_extremes() {
        let report = StatReport::from_samples(&[-3.0, -1.0, -2.0]).unwrap();
        assert_eq!(report.max, -1.0);
        assert_eq!(report.min, -3.0);
    }

    #[test]
    fn single_sample_has_zero_stddev() {
        let report = StatReport::from_samples(&[42.0]).unwrap();
        assert_eq!(report.stddev, 0.0);
        assert_eq!(report.average, 42.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = StatReport::from_samples(&[]).unwrap_err();
        assert!(matches!(err, HarnessError::EmptyInput(_)));
        assert!(SampleLog::new().reports(1.0).is_err());
    }

    #[test]
    fn ratio_scales_every_field() {
        let report = StatReport::from_samples(&[0.001, 0.002, 0.003]).unwrap();
        let ms = report.scaled(1000.0);
        assert!((ms.average - 2.0).abs() < 1e-9);
        assert!((ms.stddev - 1.0).abs() < 1e-9);
        assert!((ms.max - 3.0).abs() < 1e-9);
        assert!((ms.min - 1.0).abs() < 1e-9);
        assert!((ms.total - 6.0).abs() < 1e-9);
    }

    #[test]
    fn log_groups_by_stage_in_order() {
        let mut log = SampleLog::new();
        log.push(Stage::Total, 0, 0, 4.0);
        log.push(Stage::Normalization, 0, 0, 1.0);
        log.push(Stage::Normalization, 0, 1, 3.0);
        log.push(Stage::Descriptor, 0, 0, 2.0);

        let reports = log.reports(1.0).unwrap();
        let stages: Vec<_> = reports.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Normalization, Stage::Descriptor, Stage::Total]
        );
        assert_eq!(reports[0].samples, 2);
        assert_eq!(reports[0].report.average, 2.0);
        assert_eq!(log.values(Stage::Normalization), vec![1.0, 3.0]);
    }
}
