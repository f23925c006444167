use thiserror::Error;

/// All errors generated in `deriv-sentinel`.
#[derive(Debug, Error)]
pub enum SentinelError {
    /// Authorization rejected by the API. Fatal to the session: the token is
    /// wrong and no amount of reconnecting will fix it.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Connection-level failure (drop, handshake failure, send on closed
    /// socket). Triggers a fixed-delay reconnect.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single message that could not be decoded. Logged and discarded, the
    /// receive loop continues.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The trade API rejected a buy request. The signal is journaled as
    /// failed; no retry.
    #[error("trade request failed [{code}]: {message}")]
    TradeRequest { code: String, message: String },

    /// Journal file I/O failure.
    #[error("journal error: {0}")]
    Journal(String),

    /// Invalid configuration detected at startup.
    #[error("config error: {0}")]
    Config(String),
}

impl SentinelError {
    /// Determine if an error terminates the whole session rather than a
    /// single connection attempt or message.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SentinelError::Authorization(_) | SentinelError::Config(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SentinelError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        SentinelError::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(error: serde_json::Error) -> Self {
        SentinelError::MalformedMessage(error.to_string())
    }
}

impl From<csv::Error> for SentinelError {
    fn from(error: csv::Error) -> Self {
        SentinelError::Journal(error.to_string())
    }
}

impl From<std::io::Error> for SentinelError {
    fn from(error: std::io::Error) -> Self {
        SentinelError::Journal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        struct TestCase {
            input: SentinelError,
            expected: bool,
        }

        let tests = vec![
            // TC0: authorization failure is fatal
            TestCase {
                input: SentinelError::Authorization("InvalidToken".to_string()),
                expected: true,
            },
            // TC1: transport failure is recoverable via reconnect
            TestCase {
                input: SentinelError::Transport("connection reset".to_string()),
                expected: false,
            },
            // TC2: malformed message is recoverable
            TestCase {
                input: SentinelError::MalformedMessage("bad json".to_string()),
                expected: false,
            },
            // TC3: trade rejection is recoverable
            TestCase {
                input: SentinelError::TradeRequest {
                    code: "InsufficientBalance".to_string(),
                    message: "not enough funds".to_string(),
                },
                expected: false,
            },
            // TC4: bad config is fatal
            TestCase {
                input: SentinelError::Config("stake must be positive".to_string()),
                expected: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.is_fatal(), test.expected, "TC{} failed", index);
        }
    }
}
