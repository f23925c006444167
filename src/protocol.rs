/// Deriv WebSocket API v3 wire types.
///
/// Requests are plain serde structs serialized to JSON text frames. Responses
/// arrive as JSON objects distinguished by their `msg_type` field; anything
/// unknown decodes to [`ApiMessage::Ignore`] so the receive loop can skip it.
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Candle timeframes the bot understands, expressed in seconds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    M15,
    H4,
    D1,
}

impl Timeframe {
    /// Granularity in seconds, as sent in `ticks_history` subscriptions.
    pub const fn secs(&self) -> u32 {
        match self {
            Timeframe::M15 => 900,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Reverse-map a wire granularity to a known timeframe.
    pub fn from_secs(secs: u32) -> Option<Self> {
        match secs {
            900 => Some(Timeframe::M15),
            14_400 => Some(Timeframe::H4),
            86_400 => Some(Timeframe::D1),
            _ => None,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Parse a human label ("15m", "4h", "1d"), case-insensitive.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "15m" => Some(Timeframe::M15),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Deriv contract type for a rise/fall contract on this side.
    pub fn contract_type(&self) -> &'static str {
        match self {
            Side::Buy => "CALL",
            Side::Sell => "PUT",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Single request/response authorization exchange.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRequest {
    pub authorize: String,
}

impl AuthorizeRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            authorize: token.into(),
        }
    }
}

/// Subscribe to real-time ticks for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct TickSubscription {
    pub ticks: String,
    pub subscribe: u8,
}

impl TickSubscription {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            ticks: symbol.into(),
            subscribe: 1,
        }
    }
}

/// Subscribe to the latest candle for one (symbol, granularity).
#[derive(Debug, Clone, Serialize)]
pub struct CandleSubscription {
    pub ticks_history: String,
    pub end: String,
    pub count: u32,
    pub style: String,
    pub granularity: u32,
    pub subscribe: u8,
}

impl CandleSubscription {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            ticks_history: symbol.into(),
            end: "latest".to_string(),
            count: 1,
            style: "candles".to_string(),
            granularity: timeframe.secs(),
            subscribe: 1,
        }
    }
}

/// Keep-alive ping, sent when the receive loop times out with no message.
#[derive(Debug, Clone, Serialize)]
pub struct PingRequest {
    pub ping: u8,
}

impl Default for PingRequest {
    fn default() -> Self {
        Self { ping: 1 }
    }
}

/// Contract purchase request, subscribed so settlement updates arrive on the
/// same connection.
#[derive(Debug, Clone, Serialize)]
pub struct BuyRequest {
    pub buy: u8,
    pub price: f64,
    pub parameters: ContractParameters,
    pub subscribe: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractParameters {
    pub contract_type: String,
    pub symbol: String,
    pub amount: f64,
    pub basis: String,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
}

impl BuyRequest {
    /// Build a stake-basis rise/fall purchase with a duration in minutes.
    pub fn new(symbol: impl Into<String>, side: Side, stake: f64, duration_min: u32) -> Self {
        Self {
            buy: 1,
            price: stake,
            parameters: ContractParameters {
                contract_type: side.contract_type().to_string(),
                symbol: symbol.into(),
                amount: stake,
                basis: "stake".to_string(),
                currency: "USD".to_string(),
                duration: duration_min,
                duration_unit: "m".to_string(),
            },
            subscribe: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Deserialize a number that the API may encode as either a JSON number or a
/// string (candle OHLC values arrive as strings).
pub(crate) fn de_flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(num) => Ok(num),
        NumOrStr::Str(raw) => raw.parse().map_err(de::Error::custom),
    }
}

fn de_flexible_f64_default<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Maybe {
        Num(f64),
        Str(String),
        Null,
    }

    match Maybe::deserialize(deserializer)? {
        Maybe::Num(num) => Ok(num),
        Maybe::Str(raw) => raw.parse().map_err(de::Error::custom),
        Maybe::Null => Ok(0.0),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorizeResponse {
    #[serde(default)]
    pub loginid: Option<String>,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Single real-time price update for an instrument.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickUpdate {
    pub symbol: String,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub quote: f64,
    pub epoch: i64,
}

/// One OHLC bucket from a candle history snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CandleData {
    #[serde(deserialize_with = "de_flexible_f64")]
    pub open: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub high: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub low: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub close: f64,
    pub epoch: i64,
    // Synthetic indices report no transaction volume; treat absent as zero.
    #[serde(default, deserialize_with = "de_flexible_f64_default")]
    pub volume: f64,
}

/// Initial `style: candles` history snapshot. Symbol and granularity live in
/// the echoed request, not the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleHistory {
    pub symbol: String,
    pub granularity: u32,
    pub candles: Vec<CandleData>,
}

/// Streaming per-candle update after the initial snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OhlcUpdate {
    pub symbol: String,
    pub granularity: u32,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub open: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub high: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub low: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub close: f64,
    pub epoch: i64,
    #[serde(default, deserialize_with = "de_flexible_f64_default")]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuyResponse {
    pub contract_id: u64,
    #[serde(default)]
    pub buy_price: f64,
    #[serde(default)]
    pub longcode: Option<String>,
}

/// Settlement update pushed for a subscribed contract.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OpenContractUpdate {
    pub contract_id: u64,
    #[serde(default)]
    pub underlying: Option<String>,
    #[serde(default)]
    pub is_sold: u8,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub payout: f64,
}

impl OpenContractUpdate {
    pub fn is_settled(&self) -> bool {
        self.is_sold == 1
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Every message the API can push, dispatched by `msg_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiMessage {
    Authorize(AuthorizeResponse),
    Tick(TickUpdate),
    CandleHistory(CandleHistory),
    Ohlc(OhlcUpdate),
    Buy(BuyResponse),
    OpenContract(OpenContractUpdate),
    Pong,
    Error(ApiError),
    Ignore,
}

impl<'de> Deserialize<'de> for ApiMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        // An error object trumps whatever msg_type the envelope claims.
        if let Some(error) = value.get("error") {
            let error: ApiError =
                serde_json::from_value(error.clone()).map_err(de::Error::custom)?;
            return Ok(ApiMessage::Error(error));
        }

        let msg_type = value.get("msg_type").and_then(Value::as_str);

        fn field<T: serde::de::DeserializeOwned, E: de::Error>(
            value: &Value,
            name: &str,
        ) -> Result<T, E> {
            let inner = value
                .get(name)
                .cloned()
                .ok_or_else(|| E::custom(format!("missing `{name}` payload")))?;
            serde_json::from_value(inner).map_err(E::custom)
        }

        match msg_type {
            Some("authorize") => Ok(ApiMessage::Authorize(field(&value, "authorize")?)),
            Some("tick") => Ok(ApiMessage::Tick(field(&value, "tick")?)),
            Some("ohlc") => Ok(ApiMessage::Ohlc(field(&value, "ohlc")?)),
            Some("buy") => Ok(ApiMessage::Buy(field(&value, "buy")?)),
            Some("proposal_open_contract") => Ok(ApiMessage::OpenContract(field(
                &value,
                "proposal_open_contract",
            )?)),
            Some("candles") => {
                let candles: Vec<CandleData> = field(&value, "candles")?;
                let symbol = value
                    .pointer("/echo_req/ticks_history")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let granularity = value
                    .pointer("/echo_req/granularity")
                    .and_then(Value::as_u64)
                    .unwrap_or_default() as u32;
                Ok(ApiMessage::CandleHistory(CandleHistory {
                    symbol,
                    granularity,
                    candles,
                }))
            }
            Some("ping") => Ok(ApiMessage::Pong),
            _ => Ok(ApiMessage::Ignore),
        }
    }
}
