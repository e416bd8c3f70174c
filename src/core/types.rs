use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

/// Time in force for futures orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till cancel.
    GTC,
    /// Immediate or cancel.
    IOC,
    /// Fill or kill.
    FOK,
    /// Good till crossing (post-only).
    GTX,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GTC => "GTC",
            Self::IOC => "IOC",
            Self::FOK => "FOK",
            Self::GTX => "GTX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlineInterval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FourHours,
    OneDay,
    OneWeek,
    OneMonth,
}

impl KlineInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1M",
        }
    }
}

/// Convert a standard symbol (`BTCUSDT`) to the wire format (`btc_usdt`).
///
/// Known quote assets are split off the tail; anything unrecognized passes
/// through lowercased so new listings still work.
#[must_use]
pub fn to_wire_symbol(symbol: &str) -> String {
    if symbol.contains('_') {
        return symbol.to_lowercase();
    }
    let upper = symbol.to_uppercase();
    for quote in ["USDT", "USDC", "USD", "BTC", "ETH"] {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{}_{}", base.to_lowercase(), quote.to_lowercase());
            }
        }
    }
    symbol.to_lowercase()
}

/// Convert a wire symbol (`btc_usdt`) back to the standard form (`BTCUSDT`).
#[must_use]
pub fn from_wire_symbol(symbol: &str) -> String {
    symbol.replace('_', "").to_uppercase()
}

/// Deserialize a numeric field that may arrive as a JSON number or a string.
pub fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Like [`flexible_f64`] but tolerant of absent/null fields.
pub fn flexible_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Maybe {
        Number(f64),
        String(String),
        Null,
    }

    match Option::<Maybe>::deserialize(deserializer)? {
        None | Some(Maybe::Null) => Ok(None),
        Some(Maybe::Number(n)) => Ok(Some(n)),
        Some(Maybe::String(s)) if s.is_empty() => Ok(None),
        Some(Maybe::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Deserialize an integer field that may arrive as a JSON number or a string.
pub fn flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Number(i64),
        String(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Number(n) => Ok(n),
        IntOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
