/// Signal engine.
///
/// Owns all per-instrument state and processes the single market event
/// stream strictly in arrival order: record tick, detect level touch, apply
/// the volume gate, journal, hand confirmed intents to the executor. No state
/// is shared across instruments and nothing here is globally mutable.
use crate::{
    config::SentinelConfig,
    detector::{LevelDetector, Signal},
    error::SentinelError,
    executor::{risk_levels, TradeIntent, TradeUpdate},
    feed::FeedEvent,
    journal::{Journal, SignalRecord, TradeRecord},
    protocol::{Side, TickUpdate},
    volume::{Candle, CandleStore, VolumeGate},
    window::RollingWindow,
};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Metadata for the instrument's single open trade.
#[derive(Debug, Clone)]
struct OpenTrade {
    trade_id: String,
    side: Side,
    entry_price: f64,
    stake: f64,
    stop_loss: f64,
    take_profit: f64,
    duration_min: u32,
}

/// One instrument's trade slot. While it is occupied (either awaiting the
/// buy response or holding an open contract) no new signal may fire.
#[derive(Debug, Clone)]
enum TradeSlot {
    Awaiting { side: Side, price: f64 },
    Open(OpenTrade),
}

/// All mutable state for one instrument.
struct InstrumentState {
    window: RollingWindow,
    detector: LevelDetector,
    candles: CandleStore,
    slot: Option<TradeSlot>,
}

impl InstrumentState {
    fn new(config: &SentinelConfig) -> Self {
        Self {
            window: RollingWindow::new(config.window_secs)
                .with_max_entries(config.window_max_ticks),
            detector: LevelDetector::new(config.detector_params()),
            candles: CandleStore::new(),
            slot: None,
        }
    }
}

pub struct Engine {
    trading_enabled: bool,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    gate: VolumeGate,
    states: HashMap<String, InstrumentState>,
    journal: Journal,
    intent_tx: mpsc::Sender<TradeIntent>,
}

impl Engine {
    pub fn new(
        config: &SentinelConfig,
        journal: Journal,
        intent_tx: mpsc::Sender<TradeIntent>,
    ) -> Self {
        let states = config
            .symbols
            .iter()
            .map(|symbol| (symbol.clone(), InstrumentState::new(config)))
            .collect();

        Self {
            trading_enabled: config.trading_enabled,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            gate: config.volume_gate(),
            states,
            journal,
            intent_tx,
        }
    }

    /// Drive the engine until either input closes. The feed closing means
    /// the session is over; the executor closing means trades can no longer
    /// be placed, which is equally terminal.
    pub async fn run(
        mut self,
        mut feed_rx: mpsc::Receiver<FeedEvent>,
        mut update_rx: mpsc::Receiver<TradeUpdate>,
    ) -> Result<(), SentinelError> {
        loop {
            tokio::select! {
                maybe_event = feed_rx.recv() => {
                    let Some(event) = maybe_event else {
                        return Err(SentinelError::Transport(
                            "market feed terminated".to_string(),
                        ));
                    };
                    self.handle_feed_event(event)?;
                }
                maybe_update = update_rx.recv() => {
                    let Some(update) = maybe_update else {
                        return Err(SentinelError::Transport(
                            "trade executor terminated".to_string(),
                        ));
                    };
                    self.handle_trade_update(update)?;
                }
            }
        }
    }

    pub fn handle_feed_event(&mut self, event: FeedEvent) -> Result<(), SentinelError> {
        match event {
            FeedEvent::Candle { symbol, candle } => self.handle_candle(&symbol, candle),
            FeedEvent::Tick(tick) => self.handle_tick(tick)?,
        }
        Ok(())
    }

    fn handle_candle(&mut self, symbol: &str, candle: Candle) {
        let Some(state) = self.states.get_mut(symbol) else {
            debug!(%symbol, "candle for unsubscribed symbol");
            return;
        };
        debug!(
            %symbol,
            timeframe = %candle.timeframe,
            volume = candle.volume,
            "candle updated"
        );
        state.candles.update(candle);
    }

    fn handle_tick(&mut self, tick: TickUpdate) -> Result<(), SentinelError> {
        let gate = &self.gate;
        let Some(state) = self.states.get_mut(&tick.symbol) else {
            debug!(symbol = %tick.symbol, "tick for unsubscribed symbol");
            return Ok(());
        };

        state.window.record(tick.quote, tick.epoch);

        // Ticks accumulate while a trade is open, but no new signal may fire
        if state.slot.is_some() {
            return Ok(());
        }

        let volume_ok = gate.confirm(&state.candles);
        let Some(signal) =
            state
                .detector
                .evaluate(&tick.symbol, tick.quote, tick.epoch, &state.window, volume_ok)
        else {
            return Ok(());
        };

        info!(
            symbol = %signal.symbol,
            kind = %signal.kind,
            price = signal.price,
            level = signal.level,
            strength = signal.strength,
            "signal emitted"
        );

        let intent = TradeIntent {
            symbol: signal.symbol.clone(),
            side: signal.kind.side(),
            price: signal.price,
        };

        let (action, trade_id) = match self.intent_tx.try_send(intent.clone()) {
            Ok(()) => {
                state.slot = Some(TradeSlot::Awaiting {
                    side: intent.side,
                    price: intent.price,
                });
                if self.trading_enabled {
                    ("trade", String::new())
                } else {
                    ("simulated", String::new())
                }
            }
            Err(error) => {
                warn!(%error, "could not submit trade intent");
                ("failed", String::new())
            }
        };

        self.journal
            .record_signal(&signal_record(&signal, volume_ok, action, trade_id))?;
        Ok(())
    }

    pub fn handle_trade_update(&mut self, update: TradeUpdate) -> Result<(), SentinelError> {
        match update {
            TradeUpdate::Opened {
                symbol,
                trade_id,
                side,
                entry_price,
                stake,
                stop_loss,
                take_profit,
                duration_min,
            } => {
                let open = OpenTrade {
                    trade_id: trade_id.clone(),
                    side,
                    entry_price,
                    stake,
                    stop_loss,
                    take_profit,
                    duration_min,
                };
                self.journal.record_trade(&TradeRecord {
                    timestamp: Utc::now(),
                    trade_id,
                    symbol: symbol.clone(),
                    side: side.to_string(),
                    entry_price,
                    stake,
                    stop_loss,
                    take_profit,
                    duration_min,
                    result: "open".to_string(),
                    payout: 0.0,
                })?;
                if let Some(state) = self.states.get_mut(&symbol) {
                    state.slot = Some(TradeSlot::Open(open));
                }
            }
            TradeUpdate::Settled {
                symbol,
                trade_id,
                result,
                profit,
                payout,
            } => {
                let Some(state) = self.states.get_mut(&symbol) else {
                    return Ok(());
                };
                let open = match state.slot.take() {
                    Some(TradeSlot::Open(open)) if open.trade_id == trade_id => open,
                    other => {
                        // Settlement for a trade we no longer track: release
                        // the slot regardless
                        warn!(%symbol, %trade_id, ?other, "unmatched settlement");
                        return Ok(());
                    }
                };
                info!(
                    %symbol,
                    %trade_id,
                    result = result.as_str(),
                    profit,
                    "trade settled"
                );
                self.journal.record_trade(&TradeRecord {
                    timestamp: Utc::now(),
                    trade_id,
                    symbol,
                    side: open.side.to_string(),
                    entry_price: open.entry_price,
                    stake: open.stake,
                    stop_loss: open.stop_loss,
                    take_profit: open.take_profit,
                    duration_min: open.duration_min,
                    result: result.as_str().to_string(),
                    payout,
                })?;
            }
            TradeUpdate::Failed {
                symbol,
                side,
                price,
                error,
            } => {
                warn!(%symbol, %error, "trade failed");
                let (stop_loss, take_profit) =
                    risk_levels(price, side, self.stop_loss_pct, self.take_profit_pct);
                self.journal.record_trade(&TradeRecord {
                    timestamp: Utc::now(),
                    trade_id: "-".to_string(),
                    symbol: symbol.clone(),
                    side: side.to_string(),
                    entry_price: price,
                    stake: 0.0,
                    stop_loss,
                    take_profit,
                    duration_min: 0,
                    result: "failed".to_string(),
                    payout: 0.0,
                })?;
                // Release the slot so the instrument can signal again
                if let Some(state) = self.states.get_mut(&symbol) {
                    state.slot = None;
                }
            }
        }
        Ok(())
    }

    /// True while the instrument's trade slot is occupied.
    pub fn has_open_trade(&self, symbol: &str) -> bool {
        self.states
            .get(symbol)
            .map(|state| state.slot.is_some())
            .unwrap_or(false)
    }
}

fn signal_record(signal: &Signal, volume_ok: bool, action: &str, trade_id: String) -> SignalRecord {
    SignalRecord {
        timestamp: Utc::now(),
        symbol: signal.symbol.clone(),
        price: signal.price,
        level_type: signal.kind.as_str().to_string(),
        strength: signal.strength,
        window_low: signal.window_low,
        window_high: signal.window_high,
        volume_ok,
        action: action.to_string(),
        trade_id,
    }
}
