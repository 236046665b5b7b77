//! Stage-boundary wall-clock measurement.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::stats::Stage;

/// How a stage's duration is measured within one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingDiscipline {
    /// Each stage is bracketed on its own; the trial total is the sum of the stages.
    #[default]
    PerStage,
    /// Every stage is measured from the trial start marker; the total is the last mark.
    Cumulative,
}

/// Collects stage durations for a single trial.
#[derive(Debug)]
pub struct StageTimer {
    discipline: TimingDiscipline,
    origin: Instant,
    marks: Vec<(Stage, Duration)>,
}

impl StageTimer {
    /// Places the shared start marker for the trial.
    pub fn start(discipline: TimingDiscipline) -> Self {
        Self {
            discipline,
            origin: Instant::now(),
            marks: Vec::with_capacity(4),
        }
    }

    pub fn discipline(&self) -> TimingDiscipline {
        self.discipline
    }

    /// Runs `f` as `stage` and records its duration under the active discipline.
    pub fn measure<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let bracket = Instant::now();
        let output = f();
        let end = Instant::now();
        let elapsed = match self.discipline {
            TimingDiscipline::PerStage => end.duration_since(bracket),
            TimingDiscipline::Cumulative => end.duration_since(self.origin),
        };
        self.marks.push((stage, elapsed));
        output
    }

    pub fn marks(&self) -> &[(Stage, Duration)] {
        &self.marks
    }

    /// Derived trial total.
    pub fn total(&self) -> Duration {
        match self.discipline {
            TimingDiscipline::PerStage => self.marks.iter().map(|(_, d)| *d).sum(),
            TimingDiscipline::Cumulative => self
                .marks
                .last()
                .map(|(_, d)| *d)
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Stage marks followed by the derived `Total` entry.
    pub fn finish(self) -> Vec<(Stage, Duration)> {
        let total = self.total();
        let mut marks = self.marks;
        marks.push((Stage::Total, total));
        marks
    }
}
