//! Phase timing for compilation and streaming.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// One timing sample, possibly with sub-samples.
#[derive(Debug, Clone)]
pub struct Sample {
    pub label: String,
    pub duration: Duration,
    pub columns: Vec<String>,
    pub samples: Vec<Sample>,
}

impl Sample {
    /// Add an absolute sub-sample.
    pub fn sub_sample(&mut self, label: impl Into<String>, duration: Duration) {
        self.samples.push(Sample {
            label: label.into(),
            duration,
            columns: Vec::new(),
            samples: Vec::new(),
        });
    }
}

/// Records labelled samples between consecutive calls and renders a
/// profiling report.
#[derive(Debug)]
pub struct Timing {
    start: Instant,
    last: Instant,
    samples: Vec<Sample>,
}

impl Default for Timing {
    fn default() -> Timing {
        Timing::new()
    }
}

impl Timing {
    pub fn new() -> Timing {
        let now = Instant::now();
        Timing {
            start: now,
            last: now,
            samples: Vec::new(),
        }
    }

    /// Record the time since the previous sample.
    pub fn sample(&mut self, label: impl Into<String>, columns: Vec<String>) -> &mut Sample {
        let now = Instant::now();
        self.samples.push(Sample {
            label: label.into(),
            duration: now - self.last,
            columns,
            samples: Vec::new(),
        });
        self.last = now;
        self.samples.last_mut().unwrap()
    }

    pub fn total(&self) -> Duration {
        self.last - self.start
    }

    /// Render the report, one line per sample with percentages of the
    /// total.
    pub fn report(&self) -> String {
        let total = self.total().as_secs_f64().max(f64::EPSILON);
        let mut out = String::new();
        for sample in &self.samples {
            let share = sample.duration.as_secs_f64() / total * 100.0;
            let _ = write!(out, "{:>7.2}% {:<12} {:?}", share, sample.label, sample.duration);
            for col in &sample.columns {
                let _ = write!(out, " {col}");
            }
            let _ = writeln!(out);
            for sub in &sample.samples {
                let _ = writeln!(out, "         - {:<10} {:?}", sub.label, sub.duration);
            }
        }
        let _ = writeln!(out, "  total {:?}", self.total());
        out
    }
}
