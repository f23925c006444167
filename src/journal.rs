/// Append-only CSV journal.
///
/// Two files: one row per emitted signal, one row per trade outcome. Both are
/// truncated and re-headered at process start and flushed after every row so
/// a crash loses at most nothing.
use crate::error::SentinelError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;

#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub level_type: String,
    pub strength: u32,
    pub window_low: f64,
    pub window_high: f64,
    pub volume_ok: bool,
    /// What was done with the signal: "trade", "simulated", or "failed"
    pub action: String,
    pub trade_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub trade_id: String,
    pub symbol: String,
    pub side: String,
    pub entry_price: f64,
    pub stake: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub duration_min: u32,
    /// "open", "win", "loss", "expired", "unknown", or "failed"
    pub result: String,
    pub payout: f64,
}

const SIGNAL_HEADER: [&str; 10] = [
    "timestamp",
    "symbol",
    "price",
    "level_type",
    "strength",
    "window_low",
    "window_high",
    "volume_ok",
    "action",
    "trade_id",
];

const TRADE_HEADER: [&str; 11] = [
    "timestamp",
    "trade_id",
    "symbol",
    "side",
    "entry_price",
    "stake",
    "stop_loss",
    "take_profit",
    "duration_min",
    "result",
    "payout",
];

pub struct Journal {
    signals: csv::Writer<File>,
    trades: csv::Writer<File>,
}

impl Journal {
    /// Truncate both files and write headers immediately, so the files are
    /// well-formed even before the first event.
    pub fn create(signals_path: &str, trades_path: &str) -> Result<Self, SentinelError> {
        let mut signals = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(signals_path)?;
        signals.write_record(SIGNAL_HEADER)?;
        signals.flush()?;

        let mut trades = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(trades_path)?;
        trades.write_record(TRADE_HEADER)?;
        trades.flush()?;

        Ok(Self { signals, trades })
    }

    pub fn record_signal(&mut self, record: &SignalRecord) -> Result<(), SentinelError> {
        self.signals.serialize(record)?;
        self.signals.flush()?;
        Ok(())
    }

    pub fn record_trade(&mut self, record: &TradeRecord) -> Result<(), SentinelError> {
        self.trades.serialize(record)?;
        self.trades.flush()?;
        Ok(())
    }
}
