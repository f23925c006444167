/// Shared WebSocket plumbing for the market-data and trade connections.
///
/// Both connections follow the same ritual: connect, exchange a single
/// authorize request/response, then diverge. Market data and trade execution
/// deliberately use independent connections so a slow trade round-trip never
/// blocks tick ingestion.
use crate::{
    error::SentinelError,
    protocol::{ApiMessage, AuthorizeRequest, AuthorizeResponse},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// How long to wait for the authorize response before giving up on the
/// connection attempt.
pub const AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(15);

pub async fn connect(endpoint: &str) -> Result<(WsWriter, WsReader), SentinelError> {
    let (ws_stream, _) = connect_async(endpoint).await?;
    Ok(ws_stream.split())
}

pub async fn send_json<T: Serialize>(
    write: &mut WsWriter,
    payload: &T,
) -> Result<(), SentinelError> {
    let text = serde_json::to_string(payload)?;
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(SentinelError::from)
}

/// Single request/response authorization exchange. An API error here is
/// fatal to the session; transport hiccups are not.
pub async fn authorize(
    write: &mut WsWriter,
    read: &mut WsReader,
    token: &str,
) -> Result<(), SentinelError> {
    send_json(write, &AuthorizeRequest::new(token)).await?;

    let deadline = tokio::time::Instant::now() + AUTHORIZE_TIMEOUT;
    loop {
        let message = tokio::time::timeout_at(deadline, read.next())
            .await
            .map_err(|_| SentinelError::Transport("authorize timed out".to_string()))?
            .ok_or_else(|| SentinelError::Transport("stream ended during authorize".to_string()))?
            .map_err(SentinelError::from)?;

        let Message::Text(text) = message else {
            continue;
        };

        if let Some(verdict) = authorize_verdict(&text) {
            let auth = verdict?;
            info!(
                loginid = auth.loginid.as_deref().unwrap_or("?"),
                balance = auth.balance,
                "authorized"
            );
            return Ok(());
        }
    }
}

/// Classify one text frame received while waiting for the authorize
/// response. `None` means keep waiting: unrelated and malformed frames are
/// skipped here the same way the steady-state receive loops skip them.
fn authorize_verdict(text: &str) -> Option<Result<AuthorizeResponse, SentinelError>> {
    match serde_json::from_str::<ApiMessage>(text) {
        Ok(ApiMessage::Authorize(auth)) => Some(Ok(auth)),
        Ok(ApiMessage::Error(error)) => Some(Err(SentinelError::Authorization(error.message))),
        Ok(other) => {
            debug!(?other, "ignoring pre-authorize message");
            None
        }
        Err(error) => {
            warn!(%error, "discarding malformed frame during authorize");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_verdict() {
        // Malformed frame: skipped, the wait continues
        assert!(authorize_verdict("{not json").is_none());

        // Unrelated message: skipped
        let tick = r#"{"msg_type": "tick", "tick": {"symbol": "R_100", "quote": 1.0, "epoch": 1}}"#;
        assert!(authorize_verdict(tick).is_none());

        // Success ends the wait
        let ok = r#"{"msg_type": "authorize", "authorize": {"loginid": "CR1", "balance": 10.0, "currency": "USD"}}"#;
        assert!(authorize_verdict(ok).expect("verdict").is_ok());

        // Rejection ends the wait with a fatal error
        let rejected = r#"{"error": {"code": "InvalidToken", "message": "The token is invalid."}}"#;
        let error = authorize_verdict(rejected).expect("verdict").unwrap_err();
        assert!(error.is_fatal());
    }
}
