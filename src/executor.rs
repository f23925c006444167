/// Trade executor.
///
/// Runs on its own WebSocket connection, independent of the market feed.
/// Consumes confirmed trade intents from the engine and reports back opened /
/// settled / failed updates over a channel. When trading is disabled every
/// intent gets a simulated identifier and no network effect.
use crate::{
    config::SentinelConfig,
    error::SentinelError,
    protocol::{ApiMessage, BuyRequest, PingRequest, Side},
    transport::{self, send_json},
};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// A confirmed signal the engine wants executed.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: Side,
    /// Entry price at signal time (last tick)
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeResult {
    Win,
    Loss,
    Expired,
    /// The settlement subscription died with the connection; the contract's
    /// real outcome was never observed
    Unknown,
}

impl TradeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeResult::Win => "win",
            TradeResult::Loss => "loss",
            TradeResult::Expired => "expired",
            TradeResult::Unknown => "unknown",
        }
    }
}

/// Executor-to-engine updates.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeUpdate {
    Opened {
        symbol: String,
        trade_id: String,
        side: Side,
        entry_price: f64,
        stake: f64,
        stop_loss: f64,
        take_profit: f64,
        duration_min: u32,
    },
    Settled {
        symbol: String,
        trade_id: String,
        result: TradeResult,
        profit: f64,
        payout: f64,
    },
    Failed {
        symbol: String,
        side: Side,
        price: f64,
        error: String,
    },
}

/// Stop-loss / take-profit prices as fixed percent offsets from entry.
/// Computed for the journal; nothing monitors them after entry.
pub fn risk_levels(entry: f64, side: Side, stop_loss_pct: f64, take_profit_pct: f64) -> (f64, f64) {
    match side {
        Side::Buy => (
            entry * (1.0 - stop_loss_pct / 100.0),
            entry * (1.0 + take_profit_pct / 100.0),
        ),
        Side::Sell => (
            entry * (1.0 + stop_loss_pct / 100.0),
            entry * (1.0 - take_profit_pct / 100.0),
        ),
    }
}

#[derive(Debug, Clone)]
struct ExecutorConfig {
    endpoint: String,
    api_token: String,
    trading_enabled: bool,
    stake: f64,
    duration_min: u32,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    ping_timeout: Duration,
    reconnect_delay: Duration,
}

pub struct TradeExecutor {
    config: ExecutorConfig,
    intent_tx: mpsc::Sender<TradeIntent>,
    intent_rx: mpsc::Receiver<TradeIntent>,
    update_tx: mpsc::Sender<TradeUpdate>,
    update_rx: mpsc::Receiver<TradeUpdate>,
}

impl TradeExecutor {
    pub fn new(config: &SentinelConfig) -> Self {
        let (intent_tx, intent_rx) = mpsc::channel(100);
        let (update_tx, update_rx) = mpsc::channel(100);

        Self {
            config: ExecutorConfig {
                endpoint: config.endpoint(),
                api_token: config.api_token.clone(),
                trading_enabled: config.trading_enabled,
                stake: config.stake,
                duration_min: config.duration_min,
                stop_loss_pct: config.stop_loss_pct,
                take_profit_pct: config.take_profit_pct,
                ping_timeout: config.ping_timeout,
                reconnect_delay: config.reconnect_delay,
            },
            intent_tx,
            intent_rx,
            update_tx,
            update_rx,
        }
    }

    /// Spawn the executor task. Returns the intent sender and the update
    /// receiver.
    pub fn start(self) -> (mpsc::Sender<TradeIntent>, mpsc::Receiver<TradeUpdate>) {
        let config = self.config.clone();
        let intent_rx = self.intent_rx;
        let update_tx = self.update_tx.clone();

        tokio::spawn(async move {
            if config.trading_enabled {
                run_live_loop(config, intent_rx, update_tx).await;
            } else {
                run_simulated_loop(config, intent_rx, update_tx).await;
            }
        });

        (self.intent_tx, self.update_rx)
    }
}

/// Trading disabled: fabricate identifiers, settle when the contract duration
/// elapses, touch no network.
async fn run_simulated_loop(
    config: ExecutorConfig,
    mut intent_rx: mpsc::Receiver<TradeIntent>,
    update_tx: mpsc::Sender<TradeUpdate>,
) {
    info!("trade executor running in simulated mode");
    let mut next_id: u64 = 1;

    while let Some(intent) = intent_rx.recv().await {
        let trade_id = format!("SIM-{next_id}");
        next_id += 1;

        let (stop_loss, take_profit) = risk_levels(
            intent.price,
            intent.side,
            config.stop_loss_pct,
            config.take_profit_pct,
        );

        info!(
            symbol = %intent.symbol,
            side = %intent.side,
            price = intent.price,
            %trade_id,
            "simulated trade opened"
        );

        let opened = TradeUpdate::Opened {
            symbol: intent.symbol.clone(),
            trade_id: trade_id.clone(),
            side: intent.side,
            entry_price: intent.price,
            stake: config.stake,
            stop_loss,
            take_profit,
            duration_min: config.duration_min,
        };
        if update_tx.send(opened).await.is_err() {
            return;
        }

        // Settle when the would-be contract expires so the engine's one-open-
        // trade-per-instrument lock releases on the same schedule as live mode
        let settle_after = Duration::from_secs(u64::from(config.duration_min) * 60);
        let update_tx = update_tx.clone();
        let symbol = intent.symbol;
        tokio::spawn(async move {
            tokio::time::sleep(settle_after).await;
            let _ = update_tx
                .send(TradeUpdate::Settled {
                    symbol,
                    trade_id,
                    result: TradeResult::Expired,
                    profit: 0.0,
                    payout: 0.0,
                })
                .await;
        });
    }
}

/// Live trading: own connection, reconnect forever with a fixed delay. Buy
/// responses are correlated to intents in FIFO order (the engine guarantees
/// at most one in-flight trade per instrument).
async fn run_live_loop(
    config: ExecutorConfig,
    mut intent_rx: mpsc::Receiver<TradeIntent>,
    update_tx: mpsc::Sender<TradeUpdate>,
) {
    info!("trade executor running in live mode");

    loop {
        match run_live_session(&config, &mut intent_rx, &update_tx).await {
            Ok(()) => return,
            Err(error) if error.is_fatal() => {
                warn!(%error, "fatal trade connection error, stopping executor");
                return;
            }
            Err(error) => {
                warn!(%error, "trade connection lost, will reconnect");
            }
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

async fn run_live_session(
    config: &ExecutorConfig,
    intent_rx: &mut mpsc::Receiver<TradeIntent>,
    update_tx: &mpsc::Sender<TradeUpdate>,
) -> Result<(), SentinelError> {
    let (mut write, mut read) = transport::connect(&config.endpoint).await?;
    transport::authorize(&mut write, &mut read, &config.api_token).await?;

    // Intents awaiting their buy response, FIFO
    let mut pending: VecDeque<TradeIntent> = VecDeque::new();
    // contract_id -> symbol, for routing settlement updates
    let mut contracts: HashMap<u64, String> = HashMap::new();

    let mut keep_alive = tokio::time::interval(config.ping_timeout);
    keep_alive.reset();

    let result = loop {
        tokio::select! {
            maybe_intent = intent_rx.recv() => {
                let Some(intent) = maybe_intent else {
                    // Engine gone, clean shutdown
                    break Ok(());
                };
                let request = BuyRequest::new(
                    &intent.symbol,
                    intent.side,
                    config.stake,
                    config.duration_min,
                );
                info!(
                    symbol = %intent.symbol,
                    side = %intent.side,
                    stake = config.stake,
                    "sending buy request"
                );
                if let Err(error) = send_json(&mut write, &request).await {
                    report_failed(update_tx, &intent, &error.to_string()).await;
                    break Err(error);
                }
                pending.push_back(intent);
            }

            _ = keep_alive.tick() => {
                if let Err(error) = send_json(&mut write, &PingRequest::default()).await {
                    break Err(error);
                }
            }

            frame = read.next() => {
                let message = match frame {
                    None => break Err(SentinelError::Transport("stream ended".to_string())),
                    Some(Err(error)) => break Err(error.into()),
                    Some(Ok(message)) => message,
                };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(frame) => {
                        break Err(SentinelError::Transport(format!(
                            "server closed connection: {frame:?}"
                        )));
                    }
                    _ => continue,
                };
                let parsed = match serde_json::from_str::<ApiMessage>(&text) {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        warn!(%error, "discarding malformed trade message");
                        continue;
                    }
                };
                handle_trade_message(
                    config,
                    parsed,
                    &mut pending,
                    &mut contracts,
                    update_tx,
                )
                .await;
            }
        }
    };

    drain_lost_session(pending, contracts, update_tx).await;

    result
}

/// Report everything the session still tracked when the connection died.
/// Pending intents never got a buy response and are failed; tracked contracts
/// keep running server-side, but their settlement subscription is gone, so a
/// synthetic settlement releases those instruments in the engine.
async fn drain_lost_session(
    pending: VecDeque<TradeIntent>,
    contracts: HashMap<u64, String>,
    update_tx: &mpsc::Sender<TradeUpdate>,
) {
    for intent in pending {
        report_failed(update_tx, &intent, "connection lost before buy response").await;
    }
    for (contract_id, symbol) in contracts {
        warn!(%symbol, contract_id, "settlement subscription lost, releasing trade");
        let _ = update_tx
            .send(TradeUpdate::Settled {
                symbol,
                trade_id: contract_id.to_string(),
                result: TradeResult::Unknown,
                profit: 0.0,
                payout: 0.0,
            })
            .await;
    }
}

async fn handle_trade_message(
    config: &ExecutorConfig,
    message: ApiMessage,
    pending: &mut VecDeque<TradeIntent>,
    contracts: &mut HashMap<u64, String>,
    update_tx: &mpsc::Sender<TradeUpdate>,
) {
    match message {
        ApiMessage::Buy(response) => {
            let Some(intent) = pending.pop_front() else {
                warn!(contract_id = response.contract_id, "buy response with no pending intent");
                return;
            };
            // The API reports the actual purchase price; fall back to the
            // signal price if absent
            let entry_price = if response.buy_price > 0.0 {
                response.buy_price
            } else {
                intent.price
            };
            let (stop_loss, take_profit) = risk_levels(
                intent.price,
                intent.side,
                config.stop_loss_pct,
                config.take_profit_pct,
            );
            contracts.insert(response.contract_id, intent.symbol.clone());
            info!(
                symbol = %intent.symbol,
                contract_id = response.contract_id,
                entry_price,
                "trade opened"
            );
            let _ = update_tx
                .send(TradeUpdate::Opened {
                    symbol: intent.symbol,
                    trade_id: response.contract_id.to_string(),
                    side: intent.side,
                    entry_price,
                    stake: config.stake,
                    stop_loss,
                    take_profit,
                    duration_min: config.duration_min,
                })
                .await;
        }
        ApiMessage::OpenContract(update) if update.is_settled() => {
            let Some(symbol) = contracts.remove(&update.contract_id) else {
                debug!(contract_id = update.contract_id, "settlement for unknown contract");
                return;
            };
            let result = if update.profit >= 0.0 {
                TradeResult::Win
            } else {
                TradeResult::Loss
            };
            info!(
                %symbol,
                contract_id = update.contract_id,
                result = result.as_str(),
                profit = update.profit,
                "trade settled"
            );
            let _ = update_tx
                .send(TradeUpdate::Settled {
                    symbol,
                    trade_id: update.contract_id.to_string(),
                    result,
                    profit: update.profit,
                    payout: update.payout,
                })
                .await;
        }
        ApiMessage::OpenContract(_) => {
            // Still running, nothing to do until it settles
        }
        ApiMessage::Error(error) => {
            if let Some(intent) = pending.pop_front() {
                warn!(code = %error.code, message = %error.message, "buy request rejected");
                report_failed(
                    update_tx,
                    &intent,
                    &format!("[{}] {}", error.code, error.message),
                )
                .await;
            } else {
                warn!(code = %error.code, message = %error.message, "trade API error");
            }
        }
        ApiMessage::Pong => debug!("trade keep-alive pong"),
        _ => {}
    }
}

async fn report_failed(update_tx: &mpsc::Sender<TradeUpdate>, intent: &TradeIntent, error: &str) {
    let _ = update_tx
        .send(TradeUpdate::Failed {
            symbol: intent.symbol.clone(),
            side: intent.side,
            price: intent.price,
            error: error.to_string(),
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_levels() {
        struct TestCase {
            entry: f64,
            side: Side,
            expected_stop: f64,
            expected_take: f64,
        }

        let tests = vec![
            // TC0: long entry, stop below, target above
            TestCase {
                entry: 100.0,
                side: Side::Buy,
                expected_stop: 98.0,
                expected_take: 104.0,
            },
            // TC1: short entry, stop above, target below
            TestCase {
                entry: 100.0,
                side: Side::Sell,
                expected_stop: 102.0,
                expected_take: 96.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (stop, take) = risk_levels(test.entry, test.side, 2.0, 4.0);
            assert!(
                (stop - test.expected_stop).abs() < 1e-9,
                "TC{} failed on stop",
                index
            );
            assert!(
                (take - test.expected_take).abs() < 1e-9,
                "TC{} failed on take",
                index
            );
        }
    }

    #[tokio::test]
    async fn test_session_drain_releases_pending_and_open() {
        let (update_tx, mut update_rx) = mpsc::channel(10);

        let mut pending = VecDeque::new();
        pending.push_back(TradeIntent {
            symbol: "R_50".to_string(),
            side: Side::Sell,
            price: 50.0,
        });
        let mut contracts = HashMap::new();
        contracts.insert(987_654_321u64, "R_100".to_string());

        drain_lost_session(pending, contracts, &update_tx).await;

        match update_rx.recv().await.expect("failed update") {
            TradeUpdate::Failed { symbol, side, .. } => {
                assert_eq!(symbol, "R_50");
                assert_eq!(side, Side::Sell);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        // The still-open contract gets a synthetic settlement so the engine
        // can release its instrument
        match update_rx.recv().await.expect("settled update") {
            TradeUpdate::Settled {
                symbol,
                trade_id,
                result,
                ..
            } => {
                assert_eq!(symbol, "R_100");
                assert_eq!(trade_id, "987654321");
                assert_eq!(result, TradeResult::Unknown);
            }
            other => panic!("expected Settled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_simulated_executor_opens_and_settles() {
        let config = SentinelConfig {
            trading_enabled: false,
            duration_min: 0, // settle immediately
            stake: 2.0,
            ..SentinelConfig::default()
        };

        let (intent_tx, mut update_rx) = TradeExecutor::new(&config).start();

        intent_tx
            .send(TradeIntent {
                symbol: "R_100".to_string(),
                side: Side::Buy,
                price: 90.5,
            })
            .await
            .unwrap();

        let opened = update_rx.recv().await.expect("opened update");
        match opened {
            TradeUpdate::Opened {
                symbol,
                trade_id,
                side,
                entry_price,
                stake,
                ..
            } => {
                assert_eq!(symbol, "R_100");
                assert_eq!(trade_id, "SIM-1");
                assert_eq!(side, Side::Buy);
                assert_eq!(entry_price, 90.5);
                assert_eq!(stake, 2.0);
            }
            other => panic!("expected Opened, got {other:?}"),
        }

        let settled = update_rx.recv().await.expect("settled update");
        match settled {
            TradeUpdate::Settled {
                trade_id, result, ..
            } => {
                assert_eq!(trade_id, "SIM-1");
                assert_eq!(result, TradeResult::Expired);
            }
            other => panic!("expected Settled, got {other:?}"),
        }

        // Identifiers increment per trade
        intent_tx
            .send(TradeIntent {
                symbol: "R_50".to_string(),
                side: Side::Sell,
                price: 50.0,
            })
            .await
            .unwrap();
        match update_rx.recv().await.expect("second opened") {
            TradeUpdate::Opened { trade_id, .. } => assert_eq!(trade_id, "SIM-2"),
            other => panic!("expected Opened, got {other:?}"),
        }
    }
}
