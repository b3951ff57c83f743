use std::fmt;
use std::time::{Duration, Instant};

/// Named pipeline stages that are timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Canvas,
    Layout,
    Edges,
    Render,
}

impl Stage {
    /// What the stage does, as printed after "Time to".
    pub fn label(self) -> &'static str {
        match self {
            Stage::Load => "load data",
            Stage::Canvas => "create canvas",
            Stage::Layout => "compute layout",
            Stage::Edges => "compute edges",
            Stage::Render => "create image",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Durations of the stages a pipeline ran, in order.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    stages: Vec<(Stage, Duration)>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, record how long it took under `stage` and pass its output on.
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        let elapsed = start.elapsed();
        log::debug!("{stage} took {elapsed:?}");
        self.stages.push((stage, elapsed));
        out
    }

    pub fn stages(&self) -> &[(Stage, Duration)] {
        &self.stages
    }

    pub fn get(&self, stage: Stage) -> Option<Duration> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, d)| *d)
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (stage, d) in &self.stages {
            writeln!(f, "Time to {stage}: {:.4} seconds", d.as_secs_f64())?;
        }
        write!(f, "Total time: {:.4} seconds", self.total().as_secs_f64())
    }
}
