#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use std::fmt;
use std::str::FromStr;

use phf::phf_map;
use strum_macros::{Display, IntoStaticStr};

use crate::Result;
use crate::error::Error;

/// Kinds of trade channel offered by the feed.
///
/// [`Display`](fmt::Display) renders the wire token used in channel names.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum SubscriptionKind {
    /// Trades for one market, qualified by market name (e.g. `btc-usdt`)
    #[strum(serialize = "trades/market")]
    TradesByMarket,
    /// Trades on one exchange, qualified by exchange name
    #[strum(serialize = "trades/exchange")]
    TradesByExchange,
    /// Every trade; takes no qualifier
    #[strum(serialize = "trades/all")]
    AllTrades,
}

static KINDS: phf::Map<&'static str, SubscriptionKind> = phf_map! {
    "trades_by_market" => SubscriptionKind::TradesByMarket,
    "trades_by_exchange" => SubscriptionKind::TradesByExchange,
    "all_trades" => SubscriptionKind::AllTrades,
};

impl SubscriptionKind {
    pub const ALL: [Self; 3] = [
        Self::TradesByMarket,
        Self::TradesByExchange,
        Self::AllTrades,
    ];

    /// Wire token, e.g. `trades/market`.
    #[must_use]
    pub fn token(self) -> &'static str {
        self.into()
    }

    /// Symbolic name, e.g. `trades_by_market`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TradesByMarket => "trades_by_market",
            Self::TradesByExchange => "trades_by_exchange",
            Self::AllTrades => "all_trades",
        }
    }

    /// The fixed name → wire token mapping.
    pub fn mapping() -> impl Iterator<Item = (&'static str, &'static str)> {
        Self::ALL.into_iter().map(|kind| (kind.name(), kind.token()))
    }
}

impl FromStr for SubscriptionKind {
    type Err = Error;

    /// Accepts a symbolic name (any case) or a wire token.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        KINDS
            .get(s.to_ascii_lowercase().as_str())
            .copied()
            .or_else(|| Self::ALL.into_iter().find(|kind| kind.token() == s))
            .ok_or_else(|| Error::validation(format!("unknown subscription kind: {s}")))
    }
}

/// Derives the wire channel for `kind` qualified by `name`.
///
/// An empty `name` counts as absent.
///
/// # Errors
///
/// Returns a validation error when [`SubscriptionKind::AllTrades`] is given a name, or when any
/// other kind is given none.
pub fn channel_name(kind: SubscriptionKind, name: Option<&str>) -> Result<String> {
    #[cfg(feature = "tracing")]
    tracing::debug!(%kind, ?name, "get channel name");

    match (kind, name.filter(|n| !n.is_empty())) {
        (SubscriptionKind::AllTrades, Some(_)) => Err(Error::validation(
            "name invalid when using ALL qualifier",
        )),
        (SubscriptionKind::AllTrades, None) => Ok(kind.to_string()),
        (_, Some(name)) => Ok(format!("{kind}/{name}")),
        (_, None) => Err(Error::validation(format!(
            "name invalid: {} requires a name qualifier",
            kind.name()
        ))),
    }
}

/// A validated subscription target.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    kind: SubscriptionKind,
    name: Option<String>,
    channel: String,
}

impl Subscription {
    pub fn new(kind: SubscriptionKind, name: Option<&str>) -> Result<Self> {
        let channel = channel_name(kind, name)?;
        Ok(Self {
            kind,
            name: name.filter(|n| !n.is_empty()).map(str::to_owned),
            channel,
        })
    }

    pub fn market(name: &str) -> Result<Self> {
        Self::new(SubscriptionKind::TradesByMarket, Some(name))
    }

    pub fn exchange(name: &str) -> Result<Self> {
        Self::new(SubscriptionKind::TradesByExchange, Some(name))
    }

    #[must_use]
    pub fn all_trades() -> Self {
        Self {
            kind: SubscriptionKind::AllTrades,
            name: None,
            channel: SubscriptionKind::AllTrades.to_string(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Wire channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel)
    }
}

impl FromStr for Subscription {
    type Err = Error;

    /// Parses `kind` or `kind:name`, e.g. `trades_by_market:btc-usdt` or `all_trades`.
    fn from_str(s: &str) -> Result<Self> {
        let (kind, name) = match s.split_once(':') {
            Some((kind, name)) => (kind, Some(name.trim())),
            None => (s, None),
        };
        Self::new(kind.parse()?, name)
    }
}
