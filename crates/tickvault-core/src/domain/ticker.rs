use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Column order of every day archive.
pub const TICKER_COLUMNS: [&str; 30] = [
    "ticker",
    "ticker_root",
    "ticker_suffix",
    "active",
    "name",
    "primary_exchange",
    "list_date",
    "delisted_utc",
    "description",
    "homepage_url",
    // address
    "address1",
    "address2",
    "city",
    "state",
    "country",
    "postal_code",
    // branding
    "icon_url",
    "logo_url",
    "accent_color",
    "light_color",
    "dark_color",
    "cik",
    "composite_figi",
    "phone_number",
    "share_class_figi",
    "share_class_shares_outstanding",
    "sic_code",
    "sic_description",
    "total_employees",
    "weighted_shares_outstanding",
];

/// One entry of a day's ticker universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerSummary {
    pub ticker: String,
}

impl TickerSummary {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branding {
    pub icon_url: Option<String>,
    pub logo_url: Option<String>,
    pub accent_color: Option<String>,
    pub light_color: Option<String>,
    pub dark_color: Option<String>,
}

/// Reference data for one ticker as of one day.
///
/// Fields the provider sends beyond these are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub ticker: String,
    pub ticker_root: Option<String>,
    pub ticker_suffix: Option<String>,
    pub active: Option<bool>,
    pub name: Option<String>,
    pub primary_exchange: Option<String>,
    pub list_date: Option<String>,
    pub delisted_utc: Option<String>,
    pub description: Option<String>,
    pub homepage_url: Option<String>,
    pub address: Option<Address>,
    pub branding: Option<Branding>,
    pub cik: Option<String>,
    pub composite_figi: Option<String>,
    pub phone_number: Option<String>,
    pub share_class_figi: Option<String>,
    pub share_class_shares_outstanding: Option<f64>,
    pub sic_code: Option<String>,
    pub sic_description: Option<String>,
    pub total_employees: Option<i64>,
    pub weighted_shares_outstanding: Option<f64>,
}

impl TickerRecord {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            ..Self::default()
        }
    }

    /// Flattens the record into [`TICKER_COLUMNS`] order. Absent values, including
    /// every column of an absent `address` or `branding` group, render empty.
    pub fn to_row(&self) -> [String; 30] {
        let address = self.address.clone().unwrap_or_default();
        let branding = self.branding.clone().unwrap_or_default();

        [
            self.ticker.clone(),
            cell(&self.ticker_root),
            cell(&self.ticker_suffix),
            cell(&self.active),
            cell(&self.name),
            cell(&self.primary_exchange),
            cell(&self.list_date),
            cell(&self.delisted_utc),
            cell(&self.description),
            cell(&self.homepage_url),
            cell(&address.address1),
            cell(&address.address2),
            cell(&address.city),
            cell(&address.state),
            cell(&address.country),
            cell(&address.postal_code),
            cell(&branding.icon_url),
            cell(&branding.logo_url),
            cell(&branding.accent_color),
            cell(&branding.light_color),
            cell(&branding.dark_color),
            cell(&self.cik),
            cell(&self.composite_figi),
            cell(&self.phone_number),
            cell(&self.share_class_figi),
            cell(&self.share_class_shares_outstanding),
            cell(&self.sic_code),
            cell(&self.sic_description),
            cell(&self.total_employees),
            cell(&self.weighted_shares_outstanding),
        ]
    }
}

fn cell<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}
