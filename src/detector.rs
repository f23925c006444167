/// Support/resistance signal detector.
///
/// Derives a dynamic band from the rolling window's bounds and counts
/// repeated touches of the quantized low/high. A level becomes actionable
/// once its hit count reaches the strength threshold, emits at most once per
/// process lifetime, and is bounded by a per-day signal quota.
use crate::{protocol::Side, window::RollingWindow};
use chrono::{DateTime, NaiveDate};
use std::collections::{HashMap, HashSet};

/// Which band a tick touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    Support,
    Resistance,
}

impl LevelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelKind::Support => "SUPPORT",
            LevelKind::Resistance => "RESISTANCE",
        }
    }

    /// Mean-reversion side: buy bounces off support, sell rejections off
    /// resistance.
    pub fn side(&self) -> Side {
        match self {
            LevelKind::Support => Side::Buy,
            LevelKind::Resistance => Side::Sell,
        }
    }
}

impl std::fmt::Display for LevelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A confirmed level touch that crossed the strength threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub kind: LevelKind,
    /// Tick price that triggered the emission
    pub price: f64,
    /// Quantized window bound the hit counter is keyed by
    pub level: f64,
    /// Hit count at the moment of emission
    pub strength: u32,
    pub window_low: f64,
    pub window_high: f64,
    pub epoch: i64,
}

/// Detector tuning. Defaults mirror the values the bot ships with.
#[derive(Debug, Clone)]
pub struct DetectorParams {
    /// Fraction of the window range above the low that counts as the support zone
    pub support_pct: f64,
    /// Fraction of the window range below the high that counts as the resistance zone
    pub resistance_pct: f64,
    /// Touches required before a level is actionable
    pub strength_threshold: u32,
    /// Per-instrument emission quota per UTC day
    pub max_signals_per_day: u32,
    /// Minimum window entries before any evaluation
    pub min_window_len: usize,
    /// Whether a volume-gated touch still strengthens the level
    pub count_gated_hits: bool,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            support_pct: 0.10,
            resistance_pct: 0.10,
            strength_threshold: 3,
            max_signals_per_day: 5,
            min_window_len: 10,
            count_gated_hits: true,
        }
    }
}

/// Quantize a level price to integer hundredths for use as a counter key.
fn level_key(level: f64) -> i64 {
    (level * 100.0).round() as i64
}

/// Per-instrument detector state. Hit counters only ever grow; the emitted
/// set lives for the whole process; the daily quota resets on UTC rollover.
#[derive(Debug)]
pub struct LevelDetector {
    params: DetectorParams,
    hit_counts: HashMap<i64, u32>,
    emitted: HashSet<i64>,
    signals_today: u32,
    current_day: Option<NaiveDate>,
}

impl LevelDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self {
            params,
            hit_counts: HashMap::new(),
            emitted: HashSet::new(),
            signals_today: 0,
            current_day: None,
        }
    }

    /// Evaluate one tick against the current window.
    ///
    /// `volume_ok` is the volume gate verdict for this instrument. A failed
    /// gate always suppresses emission; whether it also skips the counter
    /// increment depends on `count_gated_hits`.
    pub fn evaluate(
        &mut self,
        symbol: &str,
        price: f64,
        epoch: i64,
        window: &RollingWindow,
        volume_ok: bool,
    ) -> Option<Signal> {
        if window.len() < self.params.min_window_len {
            return None;
        }

        let low = window.low()?;
        let high = window.high()?;
        let range = high - low;
        // Flat window: zones collapse onto the boundary price, no decision
        if range <= 0.0 {
            return None;
        }

        self.roll_day(epoch);

        let support_zone = low + range * self.params.support_pct;
        let resistance_zone = high - range * self.params.resistance_pct;

        // Support is evaluated first and wins degenerate overlaps
        let (kind, level) = if price <= support_zone {
            (LevelKind::Support, low)
        } else if price >= resistance_zone {
            (LevelKind::Resistance, high)
        } else {
            return None;
        };

        if !volume_ok && !self.params.count_gated_hits {
            return None;
        }

        let key = level_key(level);
        let count = self.hit_counts.entry(key).or_insert(0);
        *count += 1;
        let strength = *count;

        if !volume_ok {
            return None;
        }

        if strength < self.params.strength_threshold
            || self.emitted.contains(&key)
            || self.signals_today >= self.params.max_signals_per_day
        {
            return None;
        }

        self.emitted.insert(key);
        self.signals_today += 1;

        Some(Signal {
            symbol: symbol.to_string(),
            kind,
            price,
            level: key as f64 / 100.0,
            strength,
            window_low: low,
            window_high: high,
            epoch,
        })
    }

    /// Hit count currently recorded for a level price.
    pub fn hits_for(&self, level: f64) -> u32 {
        self.hit_counts
            .get(&level_key(level))
            .copied()
            .unwrap_or(0)
    }

    /// Signals emitted so far in the current UTC day.
    pub fn signals_today(&self) -> u32 {
        self.signals_today
    }

    fn roll_day(&mut self, epoch: i64) {
        let day = DateTime::from_timestamp(epoch, 0)
            .map(|dt| dt.date_naive())
            .unwrap_or_default();
        if self.current_day != Some(day) {
            self.current_day = Some(day);
            self.signals_today = 0;
        }
    }
}
