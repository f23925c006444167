/// Bot configuration.
///
/// Everything has a sensible default, every field has a `with_*` builder, and
/// `from_env` layers environment overrides on top for headless deployment.
use crate::{
    detector::DetectorParams,
    error::SentinelError,
    protocol::Timeframe,
    volume::{VolumeGate, VolumePolicy},
};
use std::time::Duration;

/// Read an env var and parse it, falling back to the given default.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    /// WebSocket endpoint; the app id is appended as a query parameter
    pub ws_url: String,
    /// Deriv application id
    pub app_id: String,
    /// Opaque API credential, exchanged once per connection
    pub api_token: String,
    /// Instruments to monitor
    pub symbols: Vec<String>,
    /// Candle timeframes subscribed and checked by the volume gate
    pub timeframes: Vec<Timeframe>,

    /// Rolling window lookback in seconds
    pub window_secs: i64,
    /// Hard cap on retained ticks per instrument
    pub window_max_ticks: usize,
    /// Minimum ticks in the window before the detector evaluates
    pub min_window_len: usize,

    pub support_pct: f64,
    pub resistance_pct: f64,
    pub strength_threshold: u32,
    pub max_signals_per_day: u32,
    pub count_gated_hits: bool,

    pub volume_threshold: f64,
    pub volume_policy: VolumePolicy,

    /// When false, orders are simulated and nothing hits the trade API
    pub trading_enabled: bool,
    /// Stake per contract, USD
    pub stake: f64,
    /// Contract duration in minutes
    pub duration_min: u32,
    /// Stop-loss offset as a percent of entry price (journaled only)
    pub stop_loss_pct: f64,
    /// Take-profit offset as a percent of entry price (journaled only)
    pub take_profit_pct: f64,

    /// Idle timeout before a keep-alive ping is sent
    pub ping_timeout: Duration,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Fixed delay before a full session restart after an unexpected failure
    pub restart_delay: Duration,

    pub signals_path: String,
    pub trades_path: String,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.derivws.com/websockets/v3".to_string(),
            app_id: "1089".to_string(),
            api_token: String::new(),
            symbols: vec!["R_100".to_string()],
            timeframes: vec![Timeframe::M15, Timeframe::H4, Timeframe::D1],
            window_secs: 86_400,
            window_max_ticks: 900,
            min_window_len: 10,
            support_pct: 0.10,
            resistance_pct: 0.10,
            strength_threshold: 3,
            max_signals_per_day: 5,
            count_gated_hits: true,
            volume_threshold: 0.0,
            volume_policy: VolumePolicy::Any,
            trading_enabled: false,
            stake: 1.0,
            duration_min: 60,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            ping_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            restart_delay: Duration::from_secs(30),
            signals_path: "signals.csv".to_string(),
            trades_path: "trades.csv".to_string(),
        }
    }
}

impl SentinelConfig {
    /// Defaults overridden by `SENTINEL_*` / `DERIV_*` environment variables.
    pub fn from_env() -> Self {
        let base = Self::default();

        let symbols = std::env::var("SENTINEL_SYMBOLS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(base.symbols);

        let timeframes = std::env::var("SENTINEL_TIMEFRAMES")
            .map(|raw| raw.split(',').filter_map(Timeframe::parse).collect())
            .unwrap_or(base.timeframes);

        let volume_policy = std::env::var("SENTINEL_VOLUME_POLICY")
            .ok()
            .and_then(|raw| VolumePolicy::parse(&raw))
            .unwrap_or(base.volume_policy);

        Self {
            ws_url: env_string("DERIV_WS_URL", &base.ws_url),
            app_id: env_string("DERIV_APP_ID", &base.app_id),
            api_token: env_string("DERIV_API_TOKEN", ""),
            symbols,
            timeframes,
            window_secs: env_parse("SENTINEL_WINDOW_SECS", base.window_secs),
            window_max_ticks: env_parse("SENTINEL_WINDOW_MAX_TICKS", base.window_max_ticks),
            min_window_len: env_parse("SENTINEL_MIN_WINDOW", base.min_window_len),
            support_pct: env_parse("SENTINEL_SUPPORT_PCT", base.support_pct),
            resistance_pct: env_parse("SENTINEL_RESISTANCE_PCT", base.resistance_pct),
            strength_threshold: env_parse("SENTINEL_STRENGTH", base.strength_threshold),
            max_signals_per_day: env_parse("SENTINEL_MAX_SIGNALS_PER_DAY", base.max_signals_per_day),
            count_gated_hits: env_parse("SENTINEL_COUNT_GATED_HITS", base.count_gated_hits),
            volume_threshold: env_parse("SENTINEL_VOLUME_THRESHOLD", base.volume_threshold),
            volume_policy,
            trading_enabled: env_parse("SENTINEL_TRADING_ENABLED", base.trading_enabled),
            stake: env_parse("SENTINEL_STAKE", base.stake),
            duration_min: env_parse("SENTINEL_DURATION_MIN", base.duration_min),
            stop_loss_pct: env_parse("SENTINEL_STOP_LOSS_PCT", base.stop_loss_pct),
            take_profit_pct: env_parse("SENTINEL_TAKE_PROFIT_PCT", base.take_profit_pct),
            ping_timeout: Duration::from_secs(env_parse(
                "SENTINEL_PING_TIMEOUT_SECS",
                base.ping_timeout.as_secs(),
            )),
            reconnect_delay: Duration::from_secs(env_parse(
                "SENTINEL_RECONNECT_DELAY_SECS",
                base.reconnect_delay.as_secs(),
            )),
            restart_delay: Duration::from_secs(env_parse(
                "SENTINEL_RESTART_DELAY_SECS",
                base.restart_delay.as_secs(),
            )),
            signals_path: env_string("SENTINEL_SIGNALS_CSV", &base.signals_path),
            trades_path: env_string("SENTINEL_TRADES_CSV", &base.trades_path),
        }
    }

    /// Endpoint with the app id applied.
    pub fn endpoint(&self) -> String {
        format!("{}?app_id={}", self.ws_url, self.app_id)
    }

    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            support_pct: self.support_pct,
            resistance_pct: self.resistance_pct,
            strength_threshold: self.strength_threshold,
            max_signals_per_day: self.max_signals_per_day,
            min_window_len: self.min_window_len,
            count_gated_hits: self.count_gated_hits,
        }
    }

    pub fn volume_gate(&self) -> VolumeGate {
        VolumeGate::new(
            self.volume_threshold,
            self.volume_policy,
            self.timeframes.clone(),
        )
    }

    /// Startup sanity checks. Violations are fatal (no session can succeed).
    pub fn validate(&self) -> Result<(), SentinelError> {
        if self.symbols.is_empty() {
            return Err(SentinelError::Config("no symbols configured".to_string()));
        }
        if self.api_token.is_empty() {
            return Err(SentinelError::Config(
                "DERIV_API_TOKEN is not set".to_string(),
            ));
        }
        if self.stake <= 0.0 {
            return Err(SentinelError::Config("stake must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.support_pct) || !(0.0..1.0).contains(&self.resistance_pct) {
            return Err(SentinelError::Config(
                "support/resistance percents must be in [0, 1)".to_string(),
            ));
        }
        if self.support_pct + self.resistance_pct >= 1.0 {
            return Err(SentinelError::Config(
                "support_pct + resistance_pct must be < 1 so the zones cannot invert".to_string(),
            ));
        }
        if self.window_secs <= 0 || self.window_max_ticks == 0 {
            return Err(SentinelError::Config(
                "window bounds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = token.into();
        self
    }

    pub fn with_timeframes(mut self, timeframes: Vec<Timeframe>) -> Self {
        self.timeframes = timeframes;
        self
    }

    pub fn with_trading_enabled(mut self, enabled: bool) -> Self {
        self.trading_enabled = enabled;
        self
    }

    pub fn with_stake(mut self, stake: f64) -> Self {
        self.stake = stake;
        self
    }

    pub fn with_volume_policy(mut self, policy: VolumePolicy) -> Self {
        self.volume_policy = policy;
        self
    }

    pub fn with_journal_paths(
        mut self,
        signals: impl Into<String>,
        trades: impl Into<String>,
    ) -> Self {
        self.signals_path = signals.into();
        self.trades_path = trades.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SentinelConfig::default();
        assert_eq!(config.symbols, vec!["R_100".to_string()]);
        assert_eq!(config.strength_threshold, 3);
        assert_eq!(config.max_signals_per_day, 5);
        assert_eq!(config.ping_timeout, Duration::from_secs(30));
        assert!(!config.trading_enabled);
        assert_eq!(
            config.endpoint(),
            "wss://ws.derivws.com/websockets/v3?app_id=1089"
        );
    }

    #[test]
    fn test_builder() {
        let config = SentinelConfig::default()
            .with_symbols(vec!["R_50".to_string(), "R_75".to_string()])
            .with_api_token("token")
            .with_trading_enabled(true)
            .with_stake(2.5)
            .with_volume_policy(VolumePolicy::All);

        assert_eq!(config.symbols.len(), 2);
        assert!(config.trading_enabled);
        assert_eq!(config.stake, 2.5);
        assert_eq!(config.volume_policy, VolumePolicy::All);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        struct TestCase {
            input: SentinelConfig,
            expected_ok: bool,
        }

        let valid = SentinelConfig::default().with_api_token("token");

        let tests = vec![
            // TC0: valid baseline
            TestCase {
                input: valid.clone(),
                expected_ok: true,
            },
            // TC1: missing token
            TestCase {
                input: SentinelConfig::default(),
                expected_ok: false,
            },
            // TC2: empty symbol list
            TestCase {
                input: valid.clone().with_symbols(vec![]),
                expected_ok: false,
            },
            // TC3: non-positive stake
            TestCase {
                input: valid.clone().with_stake(0.0),
                expected_ok: false,
            },
            // TC4: zone percents that would invert the band
            TestCase {
                input: SentinelConfig {
                    support_pct: 0.6,
                    resistance_pct: 0.6,
                    ..valid.clone()
                },
                expected_ok: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(
                test.input.validate().is_ok(),
                test.expected_ok,
                "TC{} failed",
                index
            );
        }
    }
}
