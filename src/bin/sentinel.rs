/// Sentinel trading bot.
///
/// Wires the market feed, signal engine, and trade executor together and
/// supervises the session: transient failures restart the whole session after
/// a fixed delay, authorization failure and operator interrupt are the only
/// ways out.
use deriv_sentinel::{
    ConnectionStatus, Engine, Journal, MarketFeed, SentinelConfig, SentinelError, TradeExecutor,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SentinelConfig::from_env();
    if let Err(error) = config.validate() {
        error!(%error, "invalid configuration");
        std::process::exit(1);
    }

    info!(
        symbols = ?config.symbols,
        trading_enabled = config.trading_enabled,
        stake = config.stake,
        duration_min = config.duration_min,
        strength = config.strength_threshold,
        max_signals_per_day = config.max_signals_per_day,
        "starting deriv-sentinel"
    );

    loop {
        let session = run_session(&config);
        tokio::select! {
            result = session => match result {
                Ok(()) => {
                    info!("session ended cleanly");
                    return;
                }
                Err(error) if error.is_fatal() => {
                    error!(%error, "fatal error, shutting down");
                    std::process::exit(1);
                }
                Err(error) => {
                    warn!(
                        %error,
                        delay_secs = config.restart_delay.as_secs(),
                        "session failed, restarting"
                    );
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                return;
            }
        }

        tokio::time::sleep(config.restart_delay).await;
    }
}

/// One full session: fresh journal, fresh connections, fresh state.
async fn run_session(config: &SentinelConfig) -> Result<(), SentinelError> {
    let journal = Journal::create(&config.signals_path, &config.trades_path)?;

    let (feed_rx, mut status_rx) = MarketFeed::new(config).start();
    let (intent_tx, update_rx) = TradeExecutor::new(config).start();
    let engine = Engine::new(config, journal, intent_tx);

    // A failing feed both reports `Failed` and drops its event channel, which
    // makes both arms ready at once. The status watcher is polled first and
    // a transient error is re-checked against the queued statuses afterwards,
    // so the fatal classification always wins that race.
    let result = tokio::select! {
        biased;
        error = watch_for_fatal(&mut status_rx) => Err(error),
        result = engine.run(feed_rx, update_rx) => result,
    };

    match result {
        Err(error) if !error.is_fatal() => Err(upgrade_feed_loss(&mut status_rx, error)),
        other => other,
    }
}

/// Surface a fatal feed failure (authorization rejection) to the supervisor;
/// everything else the feed handles itself by reconnecting.
async fn watch_for_fatal(status_rx: &mut mpsc::Receiver<ConnectionStatus>) -> SentinelError {
    while let Some(status) = status_rx.recv().await {
        match status {
            ConnectionStatus::Failed => {
                return SentinelError::Authorization("market feed authorization rejected".to_string());
            }
            ConnectionStatus::Connected => info!("market feed connected"),
            ConnectionStatus::Reconnecting => info!("market feed reconnecting"),
            ConnectionStatus::Disconnected => warn!("market feed disconnected"),
        }
    }
    SentinelError::Transport("market feed status channel closed".to_string())
}

/// The feed queues `Failed` before it drops the event channel, so if the
/// engine observed the closure first the authoritative status is already
/// waiting here. Anything else keeps its transient classification.
fn upgrade_feed_loss(
    status_rx: &mut mpsc::Receiver<ConnectionStatus>,
    error: SentinelError,
) -> SentinelError {
    while let Ok(status) = status_rx.try_recv() {
        if status == ConnectionStatus::Failed {
            return SentinelError::Authorization("market feed authorization rejected".to_string());
        }
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_status_is_fatal() {
        let (status_tx, mut status_rx) = mpsc::channel(10);
        status_tx.try_send(ConnectionStatus::Connected).unwrap();
        status_tx.try_send(ConnectionStatus::Disconnected).unwrap();
        status_tx.try_send(ConnectionStatus::Failed).unwrap();

        let error = watch_for_fatal(&mut status_rx).await;
        assert!(matches!(error, SentinelError::Authorization(_)));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_feed_loss_upgraded_when_failed_queued() {
        let (status_tx, mut status_rx) = mpsc::channel(10);
        status_tx.try_send(ConnectionStatus::Reconnecting).unwrap();
        status_tx.try_send(ConnectionStatus::Failed).unwrap();

        let error = upgrade_feed_loss(
            &mut status_rx,
            SentinelError::Transport("market feed terminated".to_string()),
        );
        assert!(error.is_fatal());
    }

    #[test]
    fn test_feed_loss_stays_transient_without_failed() {
        let (status_tx, mut status_rx) = mpsc::channel(10);
        status_tx.try_send(ConnectionStatus::Disconnected).unwrap();

        let error = upgrade_feed_loss(
            &mut status_rx,
            SentinelError::Transport("market feed terminated".to_string()),
        );
        assert!(!error.is_fatal());
    }
}
