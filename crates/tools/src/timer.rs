/// Ring buffer of recent tick durations, in seconds.
#[derive(Debug, Clone)]
pub struct TickTimer {
    history: Vec<f64>,
    index: usize,
    filled: bool,
    total_ticks: u64,
}

impl TickTimer {
    /// A timer keeping the last `capacity` ticks (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            history: vec![0.0; capacity.max(1)],
            index: 0,
            filled: false,
            total_ticks: 0,
        }
    }

    pub fn record(&mut self, seconds: f64) {
        self.history[self.index] = seconds;
        self.index = (self.index + 1) % self.history.len();
        if self.index == 0 {
            self.filled = true;
        }
        self.total_ticks += 1;
    }

    fn recent(&self) -> &[f64] {
        if self.filled {
            &self.history
        } else {
            &self.history[..self.index]
        }
    }

    pub fn average(&self) -> f64 {
        let recent = self.recent();
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().sum::<f64>() / recent.len() as f64
    }

    pub fn max(&self) -> f64 {
        self.recent().iter().copied().fold(0.0, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.recent()
            .iter()
            .copied()
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Ticks currently held in the buffer.
    pub fn count(&self) -> usize {
        self.recent().len()
    }

    /// Ticks recorded since creation, including ones already overwritten.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new(120)
    }
}
