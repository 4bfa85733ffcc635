use std::collections::VecDeque;
use std::time::Duration;

/// Content hash of a script's source, for hosts whose resolver does not
/// already supply one.
pub fn content_hash(code: &str) -> String {
    blake3::hash(code.as_bytes()).to_hex().to_string()
}

#[allow(clippy::cast_precision_loss)]
pub fn duration_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Mean over the most recent `window` samples.
#[derive(Debug, Clone)]
pub struct RollingAverage {
    samples: VecDeque<f64>,
    window: usize,
    sum: f64,
}

impl RollingAverage {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            sum: 0.0,
        }
    }

    pub fn record(&mut self, sample: f64) {
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }
}
