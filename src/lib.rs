/// Deriv Sentinel - Shared Library
///
/// Automated support/resistance level trading bot for Deriv volatility
/// indices. The library provides:
/// - Deriv WebSocket API v3 wire types and the market feed client
/// - The rolling-window support/resistance signal detector
/// - The volume confirmation gate
/// - A trade executor (live or simulated) on an independent connection
/// - Append-only CSV journals for signals and trade outcomes
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod executor;
pub mod feed;
pub mod journal;
pub mod protocol;
pub mod transport;
pub mod volume;
pub mod window;

// Re-export commonly used types for convenience
pub use config::SentinelConfig;
pub use detector::{DetectorParams, LevelDetector, LevelKind, Signal};
pub use engine::Engine;
pub use error::SentinelError;
pub use executor::{TradeExecutor, TradeIntent, TradeResult, TradeUpdate};
pub use feed::{ConnectionStatus, FeedEvent, MarketFeed};
pub use journal::{Journal, SignalRecord, TradeRecord};
pub use protocol::{Side, Timeframe};
pub use volume::{Candle, CandleStore, VolumeGate, VolumePolicy};
pub use window::RollingWindow;
