/// Rolling time-windowed price tracker, one instance per instrument.
///
/// Eviction is measured against the newest epoch seen, never wall-clock, so
/// replayed or out-of-order feeds behave deterministically.
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RollingWindow {
    /// (price, epoch seconds) pairs in arrival order
    entries: VecDeque<(f64, i64)>,
    /// Time-based lookback in seconds
    lookback_secs: i64,
    /// Optional hard cap on entry count (front-evicted)
    max_entries: Option<usize>,
    /// Newest epoch observed so far
    latest_epoch: i64,
}

impl RollingWindow {
    pub fn new(lookback_secs: i64) -> Self {
        Self {
            entries: VecDeque::new(),
            lookback_secs,
            max_entries: None,
            latest_epoch: i64::MIN,
        }
    }

    /// Cap the window at a fixed entry count in addition to the time bound.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Append a price observation and evict everything that has aged out of
    /// the lookback relative to the newest epoch seen.
    pub fn record(&mut self, price: f64, epoch: i64) {
        self.entries.push_back((price, epoch));
        self.latest_epoch = self.latest_epoch.max(epoch);

        let horizon = self.latest_epoch - self.lookback_secs;
        while let Some((_, front_epoch)) = self.entries.front() {
            if *front_epoch < horizon {
                self.entries.pop_front();
            } else {
                break;
            }
        }

        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                self.entries.pop_front();
            }
        }
    }

    /// Prices currently in the window, in arrival order.
    pub fn prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(price, _)| *price)
    }

    pub fn low(&self) -> Option<f64> {
        self.prices().min_by(|a, b| a.total_cmp(b))
    }

    pub fn high(&self) -> Option<f64> {
        self.prices().max_by(|a, b| a.total_cmp(b))
    }

    pub fn latest_price(&self) -> Option<f64> {
        self.entries.back().map(|(price, _)| *price)
    }

    pub fn latest_epoch(&self) -> Option<i64> {
        (self.latest_epoch != i64::MIN).then_some(self.latest_epoch)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.latest_epoch = i64::MIN;
    }

    /// Age in seconds of the oldest retained entry relative to the newest
    /// epoch seen. Used by the eviction tests.
    pub fn oldest_age(&self) -> Option<i64> {
        self.entries
            .front()
            .map(|(_, epoch)| self.latest_epoch - epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_bounds() {
        let mut window = RollingWindow::new(3600);
        window.record(100.0, 1_000);
        window.record(101.0, 1_010);
        window.record(99.0, 1_020);

        assert_eq!(window.len(), 3);
        assert_eq!(window.low(), Some(99.0));
        assert_eq!(window.high(), Some(101.0));
        assert_eq!(window.latest_price(), Some(99.0));
        assert_eq!(window.latest_epoch(), Some(1_020));
    }

    #[test]
    fn test_time_eviction_invariant() {
        let mut window = RollingWindow::new(100);
        for i in 0..50 {
            window.record(100.0 + i as f64, 1_000 + i * 10);
            // No retained entry may be older than the lookback relative to
            // the newest epoch seen.
            assert!(window.oldest_age().unwrap() <= 100);
        }
        // 100s lookback over 10s ticks keeps 11 entries (inclusive horizon)
        assert_eq!(window.len(), 11);
    }

    #[test]
    fn test_out_of_order_epochs_use_newest_seen() {
        let mut window = RollingWindow::new(100);
        window.record(100.0, 1_000);
        window.record(101.0, 1_050);
        // Stale epoch arrives late: must not rewind the horizon
        window.record(102.0, 1_020);
        assert_eq!(window.len(), 3);
        assert_eq!(window.latest_epoch(), Some(1_050));

        // Advancing past the horizon drops the two oldest
        window.record(103.0, 1_130);
        assert_eq!(window.len(), 2);
        assert_eq!(window.low(), Some(102.0));
    }

    #[test]
    fn test_count_cap() {
        let mut window = RollingWindow::new(i64::MAX / 2).with_max_entries(3);
        for i in 0..5 {
            window.record(i as f64, 1_000 + i);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.low(), Some(2.0));
        assert_eq!(window.high(), Some(4.0));
    }

    #[test]
    fn test_clear() {
        let mut window = RollingWindow::new(60);
        window.record(100.0, 1_000);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.latest_epoch(), None);
        assert_eq!(window.low(), None);
    }
}
