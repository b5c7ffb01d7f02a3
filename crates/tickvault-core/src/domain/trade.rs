use serde::{Deserialize, Serialize};

/// Column order of trade rows, both in day archives and on the live stream.
pub const TRADE_COLUMNS: [&str; 13] = [
    "ticker",
    "conditions",
    "correction",
    "exchange",
    "id",
    "participant_timestamp",
    "price",
    "sequence_number",
    "sip_timestamp",
    "size",
    "tape",
    "trf_id",
    "trf_timestamp",
];

/// A single trade print.
///
/// Field renames follow the streaming feed; the REST adapter maps its own
/// wire names onto the same type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "c", default)]
    pub conditions: Vec<i32>,
    /// Only present on historical trades.
    #[serde(default)]
    pub correction: Option<i64>,
    #[serde(rename = "x")]
    pub exchange: Option<i64>,
    #[serde(rename = "i")]
    pub id: Option<String>,
    /// Only present on historical trades.
    #[serde(default)]
    pub participant_timestamp: Option<i64>,
    #[serde(rename = "p")]
    pub price: Option<f64>,
    #[serde(rename = "q")]
    pub sequence_number: Option<i64>,
    /// SIP timestamp: Unix milliseconds on the stream, nanoseconds in history.
    #[serde(rename = "t")]
    pub timestamp: Option<i64>,
    #[serde(rename = "s")]
    pub size: Option<i64>,
    #[serde(rename = "z")]
    pub tape: Option<i64>,
    #[serde(rename = "trfi")]
    pub trf_id: Option<i64>,
    #[serde(rename = "trft")]
    pub trf_timestamp: Option<i64>,
}

impl TradeEvent {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Flattens the trade into [`TRADE_COLUMNS`] order.
    ///
    /// Conditions share one comma-joined field. Absent numbers render `0`,
    /// an absent id or participant timestamp renders empty.
    pub fn to_row(&self) -> [String; 13] {
        let conditions = self
            .conditions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        [
            self.symbol.clone(),
            conditions,
            int(self.correction),
            int(self.exchange),
            self.id.clone().unwrap_or_default(),
            self.participant_timestamp
                .map(|value| value.to_string())
                .unwrap_or_default(),
            self.price
                .map_or_else(|| String::from("0"), |price| price.to_string()),
            int(self.sequence_number),
            int(self.timestamp),
            int(self.size),
            int(self.tape),
            int(self.trf_id),
            int(self.trf_timestamp),
        ]
    }
}

fn int(value: Option<i64>) -> String {
    value.unwrap_or(0).to_string()
}
