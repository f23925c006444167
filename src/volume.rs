/// Volume confirmation gate.
///
/// Keeps the latest candle per (instrument, timeframe) and checks candle
/// volumes against a threshold before a signal is allowed through. Both gate
/// policies observed in the field are supported: relaxed (any configured
/// timeframe meets the threshold) and strict (all of them do, and a missing
/// candle fails the gate).
use crate::protocol::Timeframe;
use std::collections::HashMap;

/// Latest candle summary for one (instrument, timeframe) slot. Overwritten on
/// every update, no history retained.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timeframe: Timeframe,
    pub close: f64,
    pub volume: f64,
    pub epoch: i64,
}

/// Per-instrument candle slots.
#[derive(Debug, Default)]
pub struct CandleStore {
    slots: HashMap<Timeframe, Candle>,
}

impl CandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, candle: Candle) {
        self.slots.insert(candle.timeframe, candle);
    }

    pub fn latest(&self, timeframe: Timeframe) -> Option<&Candle> {
        self.slots.get(&timeframe)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Gate policy across the configured timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumePolicy {
    /// Relaxed: at least one configured timeframe meets the threshold
    Any,
    /// Strict: every configured timeframe is present and meets the threshold
    All,
}

impl VolumePolicy {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "any" | "relaxed" => Some(VolumePolicy::Any),
            "all" | "strict" => Some(VolumePolicy::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VolumeGate {
    threshold: f64,
    policy: VolumePolicy,
    timeframes: Vec<Timeframe>,
}

impl VolumeGate {
    pub fn new(threshold: f64, policy: VolumePolicy, timeframes: Vec<Timeframe>) -> Self {
        Self {
            threshold,
            policy,
            timeframes,
        }
    }

    /// Gate verdict for one instrument's candle slots.
    ///
    /// An empty timeframe list disables the gate entirely.
    pub fn confirm(&self, store: &CandleStore) -> bool {
        if self.timeframes.is_empty() {
            return true;
        }

        let meets = |timeframe: Timeframe| {
            store
                .latest(timeframe)
                .map(|candle| candle.volume >= self.threshold)
                .unwrap_or(false)
        };

        match self.policy {
            VolumePolicy::Any => self.timeframes.iter().copied().any(meets),
            VolumePolicy::All => self.timeframes.iter().copied().all(meets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(timeframe: Timeframe, volume: f64) -> Candle {
        Candle {
            timeframe,
            close: 100.0,
            volume,
            epoch: 1_700_000_000,
        }
    }

    fn all_timeframes() -> Vec<Timeframe> {
        vec![Timeframe::M15, Timeframe::H4, Timeframe::D1]
    }

    #[test]
    fn test_strict_requires_every_timeframe_present() {
        let gate = VolumeGate::new(10.0, VolumePolicy::All, all_timeframes());
        let mut store = CandleStore::new();

        // Only 2 of 3 timeframes have candles: strict gate must fail
        store.update(candle(Timeframe::M15, 50.0));
        store.update(candle(Timeframe::H4, 50.0));
        assert!(!gate.confirm(&store));

        // Third candle arrives and meets the threshold: gate opens
        store.update(candle(Timeframe::D1, 50.0));
        assert!(gate.confirm(&store));

        // One timeframe dropping below the threshold closes it again
        store.update(candle(Timeframe::H4, 5.0));
        assert!(!gate.confirm(&store));
    }

    #[test]
    fn test_relaxed_needs_one_timeframe() {
        let gate = VolumeGate::new(10.0, VolumePolicy::Any, all_timeframes());
        let mut store = CandleStore::new();

        assert!(!gate.confirm(&store));

        store.update(candle(Timeframe::D1, 9.9));
        assert!(!gate.confirm(&store));

        store.update(candle(Timeframe::M15, 10.0));
        assert!(gate.confirm(&store));
    }

    #[test]
    fn test_empty_timeframes_disable_gate() {
        let gate = VolumeGate::new(10.0, VolumePolicy::All, vec![]);
        assert!(gate.confirm(&CandleStore::new()));
    }

    #[test]
    fn test_policy_parse() {
        struct TestCase {
            input: &'static str,
            expected: Option<VolumePolicy>,
        }

        let tests = vec![
            // TC0
            TestCase {
                input: "any",
                expected: Some(VolumePolicy::Any),
            },
            // TC1
            TestCase {
                input: "STRICT",
                expected: Some(VolumePolicy::All),
            },
            // TC2
            TestCase {
                input: " relaxed ",
                expected: Some(VolumePolicy::Any),
            },
            // TC3
            TestCase {
                input: "sometimes",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(VolumePolicy::parse(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_store_overwrites_slot() {
        let mut store = CandleStore::new();
        store.update(candle(Timeframe::M15, 1.0));
        store.update(candle(Timeframe::M15, 2.0));
        assert_eq!(store.latest(Timeframe::M15).unwrap().volume, 2.0);
        assert!(store.latest(Timeframe::H4).is_none());
    }
}
