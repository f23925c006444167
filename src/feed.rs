/// Market data feed client.
///
/// Owns the market-data WebSocket connection: connect, authorize, subscribe
/// to ticks and candles for every configured symbol, then pump events into an
/// mpsc channel. Reconnects forever with a fixed delay; only an authorization
/// rejection ends the loop.
use crate::{
    config::SentinelConfig,
    error::SentinelError,
    protocol::{
        ApiMessage, CandleHistory, CandleSubscription, OhlcUpdate, PingRequest, TickSubscription,
        TickUpdate, Timeframe,
    },
    transport::{self, send_json},
    volume::Candle,
};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Normalised events the engine consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Tick(TickUpdate),
    Candle { symbol: String, candle: Candle },
}

/// Connection status updates for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
    /// Fatal failure (authorization rejected): the feed will not reconnect
    Failed,
}

#[derive(Debug, Clone)]
struct FeedConfig {
    endpoint: String,
    api_token: String,
    symbols: Vec<String>,
    timeframes: Vec<Timeframe>,
    ping_timeout: Duration,
    reconnect_delay: Duration,
}

/// Market feed handle. `start` spawns the connection loop and hands back the
/// event and status receivers.
pub struct MarketFeed {
    config: FeedConfig,
    event_tx: mpsc::Sender<FeedEvent>,
    event_rx: mpsc::Receiver<FeedEvent>,
    status_tx: mpsc::Sender<ConnectionStatus>,
    status_rx: mpsc::Receiver<ConnectionStatus>,
}

impl MarketFeed {
    pub fn new(config: &SentinelConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1000);
        let (status_tx, status_rx) = mpsc::channel(10);

        Self {
            config: FeedConfig {
                endpoint: config.endpoint(),
                api_token: config.api_token.clone(),
                symbols: config.symbols.clone(),
                timeframes: config.timeframes.clone(),
                ping_timeout: config.ping_timeout,
                reconnect_delay: config.reconnect_delay,
            },
            event_tx,
            event_rx,
            status_tx,
            status_rx,
        }
    }

    /// Spawn the connection loop. Returns the market event receiver and the
    /// connection status receiver.
    pub fn start(
        self,
    ) -> (
        mpsc::Receiver<FeedEvent>,
        mpsc::Receiver<ConnectionStatus>,
    ) {
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let status_tx = self.status_tx.clone();

        tokio::spawn(async move {
            run_feed_loop(config, event_tx, status_tx).await;
        });

        (self.event_rx, self.status_rx)
    }
}

/// Outer reconnect loop: fixed delay, unbounded retries, never recursion.
async fn run_feed_loop(
    config: FeedConfig,
    event_tx: mpsc::Sender<FeedEvent>,
    status_tx: mpsc::Sender<ConnectionStatus>,
) {
    info!(endpoint = %config.endpoint, "starting market feed");

    loop {
        let _ = status_tx.send(ConnectionStatus::Reconnecting).await;

        match connect_and_stream(&config, &event_tx, &status_tx).await {
            Ok(()) => {
                debug!("feed consumer dropped, stopping market feed");
                return;
            }
            Err(error) if error.is_fatal() => {
                warn!(%error, "fatal feed error, stopping market feed");
                let _ = status_tx.send(ConnectionStatus::Failed).await;
                return;
            }
            Err(error) => {
                warn!(%error, "feed connection lost, will reconnect");
                let _ = status_tx.send(ConnectionStatus::Disconnected).await;
            }
        }

        if event_tx.is_closed() {
            return;
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

/// One connection lifetime: connect, authorize, subscribe, receive until the
/// connection drops. Returns Ok(()) only when the event receiver is gone.
async fn connect_and_stream(
    config: &FeedConfig,
    event_tx: &mpsc::Sender<FeedEvent>,
    status_tx: &mpsc::Sender<ConnectionStatus>,
) -> Result<(), SentinelError> {
    let (mut write, mut read) = transport::connect(&config.endpoint).await?;

    transport::authorize(&mut write, &mut read, &config.api_token).await?;
    let _ = status_tx.send(ConnectionStatus::Connected).await;

    for symbol in &config.symbols {
        send_json(&mut write, &TickSubscription::new(symbol)).await?;
        for timeframe in &config.timeframes {
            send_json(&mut write, &CandleSubscription::new(symbol, *timeframe)).await?;
        }
    }
    info!(
        symbols = config.symbols.len(),
        timeframes = config.timeframes.len(),
        "market data subscriptions sent"
    );

    loop {
        let message = match tokio::time::timeout(config.ping_timeout, read.next()).await {
            // Idle: keep the connection alive with an application ping
            Err(_) => {
                debug!("receive timeout, sending keep-alive ping");
                send_json(&mut write, &PingRequest::default()).await?;
                continue;
            }
            Ok(None) => return Err(SentinelError::Transport("stream ended".to_string())),
            Ok(Some(Err(error))) => return Err(error.into()),
            Ok(Some(Ok(message))) => message,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                return Err(SentinelError::Transport(format!(
                    "server closed connection: {frame:?}"
                )));
            }
            // Protocol-level heartbeats are handled by tungstenite
            _ => continue,
        };

        let parsed = match serde_json::from_str::<ApiMessage>(&text) {
            Ok(parsed) => parsed,
            Err(error) => {
                // Malformed message: log, discard, keep receiving
                warn!(%error, "discarding malformed feed message");
                continue;
            }
        };

        for event in events_from(parsed) {
            if event_tx.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
}

/// Convert one parsed API message into zero or more feed events.
fn events_from(message: ApiMessage) -> Vec<FeedEvent> {
    match message {
        ApiMessage::Tick(tick) => vec![FeedEvent::Tick(tick)],
        ApiMessage::Ohlc(ohlc) => candle_from_ohlc(&ohlc).into_iter().collect(),
        ApiMessage::CandleHistory(history) => candle_from_history(&history).into_iter().collect(),
        ApiMessage::Error(error) => {
            warn!(code = %error.code, message = %error.message, "feed API error");
            vec![]
        }
        ApiMessage::Pong => {
            debug!("keep-alive pong");
            vec![]
        }
        _ => vec![],
    }
}

/// The initial `candles` snapshot carries history; only the newest bucket is
/// relevant to the gate.
fn candle_from_history(history: &CandleHistory) -> Option<FeedEvent> {
    let timeframe = Timeframe::from_secs(history.granularity)?;
    let latest = history.candles.last()?;
    Some(FeedEvent::Candle {
        symbol: history.symbol.clone(),
        candle: Candle {
            timeframe,
            close: latest.close,
            volume: latest.volume,
            epoch: latest.epoch,
        },
    })
}

fn candle_from_ohlc(ohlc: &OhlcUpdate) -> Option<FeedEvent> {
    let timeframe = Timeframe::from_secs(ohlc.granularity)?;
    Some(FeedEvent::Candle {
        symbol: ohlc.symbol.clone(),
        candle: Candle {
            timeframe,
            close: ohlc.close,
            volume: ohlc.volume,
            epoch: ohlc.epoch,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CandleData;

    #[test]
    fn test_candle_from_history_takes_latest() {
        let history = CandleHistory {
            symbol: "R_100".to_string(),
            granularity: 900,
            candles: vec![
                CandleData {
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close: 1.5,
                    epoch: 100,
                    volume: 10.0,
                },
                CandleData {
                    open: 1.5,
                    high: 2.5,
                    low: 1.0,
                    close: 2.0,
                    epoch: 1_000,
                    volume: 20.0,
                },
            ],
        };

        let event = candle_from_history(&history).expect("known granularity");
        match event {
            FeedEvent::Candle { symbol, candle } => {
                assert_eq!(symbol, "R_100");
                assert_eq!(candle.timeframe, Timeframe::M15);
                assert_eq!(candle.close, 2.0);
                assert_eq!(candle.volume, 20.0);
                assert_eq!(candle.epoch, 1_000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_candle_from_history_unknown_granularity() {
        let history = CandleHistory {
            symbol: "R_100".to_string(),
            granularity: 60,
            candles: vec![],
        };
        assert!(candle_from_history(&history).is_none());
    }

    #[test]
    fn test_candle_from_ohlc() {
        let ohlc = OhlcUpdate {
            symbol: "R_50".to_string(),
            granularity: 86_400,
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close: 105.0,
            epoch: 1_700_000_000,
            volume: 0.0,
        };

        let event = candle_from_ohlc(&ohlc).expect("known granularity");
        match event {
            FeedEvent::Candle { symbol, candle } => {
                assert_eq!(symbol, "R_50");
                assert_eq!(candle.timeframe, Timeframe::D1);
                assert_eq!(candle.close, 105.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_events_from_ignores_noise() {
        assert!(events_from(ApiMessage::Ignore).is_empty());
        assert!(events_from(ApiMessage::Pong).is_empty());
    }
}
