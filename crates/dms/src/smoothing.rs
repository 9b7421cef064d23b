//! EAR smoothing window

use ring_buffer::RingBuffer;

/// Rolling mean over the last few ratios.
///
/// Cleared on every frame without a signal so smoothing never spans a
/// detection gap.
#[derive(Debug, Clone)]
pub struct SmoothedSignal {
    window: RingBuffer<f64>,
}

impl SmoothedSignal {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RingBuffer::new(capacity),
        }
    }

    /// Feed one frame's ratio and return the smoothed value
    pub fn update(&mut self, value: Option<f64>) -> Option<f64> {
        match value {
            Some(v) => {
                self.window.push(v);
                self.window.mean()
            }
            None => {
                self.window.clear();
                None
            }
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.window.mean()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_last_three() {
        let mut signal = SmoothedSignal::new(3);
        assert_eq!(signal.update(Some(0.3)), Some(0.3));
        signal.update(Some(0.3));
        signal.update(Some(0.3));
        let v = signal.update(Some(0.0)).unwrap();
        assert!((v - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_gap_clears_window() {
        let mut signal = SmoothedSignal::new(3);
        signal.update(Some(0.3));
        signal.update(Some(0.3));
        assert_eq!(signal.update(None), None);
        assert_eq!(signal.value(), None);
        assert_eq!(signal.update(Some(0.12)), Some(0.12));
    }
}
