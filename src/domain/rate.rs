use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Currency;

/// Decimal places kept on derived cross rates.
const RATE_SCALE: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RateSource {
    Live,
    Static,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Live => "LIVE",
            RateSource::Static => "STATIC",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LIVE" => Some(RateSource::Live),
            "STATIC" => Some(RateSource::Static),
            _ => None,
        }
    }
}

/// An exchange rate frozen at a point in time. Once attached to a
/// transaction it is never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub from: Currency,
    pub to: Currency,
    pub rate: Decimal,
    pub source: RateSource,
    pub captured_at: DateTime<Utc>,
}

impl RateSnapshot {
    /// The implicit 1.0 rate of a same-currency movement.
    pub fn identity(currency: Currency, at: DateTime<Utc>) -> Self {
        Self {
            from: currency,
            to: currency,
            rate: Decimal::ONE,
            source: RateSource::Static,
            captured_at: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    #[error("no exchange rate available for {from} to {to}")]
    Unavailable { from: Currency, to: Currency },

    #[error("rate provider does not accept live quotes")]
    ReadOnly,
}

/// Supplies point-in-time exchange rates. Implementations are external
/// collaborators; the orchestrator only ever asks for a snapshot.
pub trait RateProvider: Send + Sync {
    fn snapshot(&self, from: Currency, to: Currency) -> Result<RateSnapshot, RateError>;

    /// Current rate table for display.
    fn table(&self) -> RateTableView;

    /// Replace live quotes from USD-based quotes (units of currency per 1 USD).
    fn publish_usd_quotes(&self, _quotes: &HashMap<Currency, Decimal>, _at: DateTime<Utc>) -> Result<(), RateError> {
        Err(RateError::ReadOnly)
    }

    /// Drop every live quote.
    fn clear_live_quotes(&self) -> Result<(), RateError> {
        Err(RateError::ReadOnly)
    }
}

/// Rate table as presented to clients, keyed `FROM_TO`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateTableView {
    pub source: RateSource,
    pub last_updated: Option<DateTime<Utc>>,
    pub rates: BTreeMap<String, Decimal>,
}

fn pair_key(from: Currency, to: Currency) -> String {
    format!("{}_{}", from, to)
}

#[derive(Debug, Default)]
struct RateState {
    fallback: HashMap<(Currency, Currency), Decimal>,
    live: HashMap<(Currency, Currency), Decimal>,
    live_updated: Option<DateTime<Utc>>,
}

/// In-process rate table: a static fallback set plus optional live quotes
/// pushed in by a feed. Live quotes win while present.
#[derive(Debug, Default)]
pub struct RateTable {
    state: RwLock<RateState>,
}

impl RateTable {
    /// A table with no rates at all; every cross-currency lookup fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in fallback rates.
    pub fn with_static_rates() -> Self {
        let table = Self::empty();
        let fixed: [(Currency, Currency, &str); 12] = [
            (Currency::Usd, Currency::Eur, "0.92"),
            (Currency::Usd, Currency::Gbp, "0.79"),
            (Currency::Usd, Currency::Jpy, "149.50"),
            (Currency::Eur, Currency::Usd, "1.09"),
            (Currency::Eur, Currency::Gbp, "0.86"),
            (Currency::Eur, Currency::Jpy, "162.50"),
            (Currency::Gbp, Currency::Usd, "1.27"),
            (Currency::Gbp, Currency::Eur, "1.16"),
            (Currency::Gbp, Currency::Jpy, "189.00"),
            (Currency::Jpy, Currency::Usd, "0.0067"),
            (Currency::Jpy, Currency::Eur, "0.0062"),
            (Currency::Jpy, Currency::Gbp, "0.0053"),
        ];
        {
            let mut state = table.state.write().unwrap_or_else(PoisonError::into_inner);
            for (from, to, rate) in fixed {
                if let Ok(rate) = rate.parse::<Decimal>() {
                    state.fallback.insert((from, to), rate);
                }
            }
        }
        table
    }

    pub fn set_static_rate(&self, from: Currency, to: Currency, rate: Decimal) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.fallback.insert((from, to), rate);
    }

    /// Replace live quotes with the given pair rates.
    pub fn update_live(
        &self,
        rates: impl IntoIterator<Item = ((Currency, Currency), Decimal)>,
        at: DateTime<Utc>,
    ) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.live = rates.into_iter().filter(|(_, rate)| *rate > Decimal::ZERO).collect();
        state.live_updated = Some(at);
    }

    /// Replace live quotes from USD-based quotes (units of currency per 1 USD),
    /// deriving every cross rate as `to / from`, rounded to six places.
    pub fn update_live_from_usd(&self, quotes: &HashMap<Currency, Decimal>, at: DateTime<Utc>) {
        let per_usd = |currency: Currency| match currency {
            Currency::Usd => Some(Decimal::ONE),
            other => quotes.get(&other).copied().filter(|q| *q > Decimal::ZERO),
        };

        let mut rates = Vec::new();
        for from in Currency::ALL {
            for to in Currency::ALL {
                if from == to {
                    continue;
                }
                if let (Some(f), Some(t)) = (per_usd(from), per_usd(to)) {
                    if let Some(cross) = t.checked_div(f) {
                        let cross = cross
                            .round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointAwayFromZero);
                        rates.push(((from, to), cross));
                    }
                }
            }
        }
        self.update_live(rates, at);
    }

    /// Drop live quotes, falling back to static rates.
    pub fn clear_live(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.live.clear();
        state.live_updated = None;
    }
}

impl RateProvider for RateTable {
    fn snapshot(&self, from: Currency, to: Currency) -> Result<RateSnapshot, RateError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        if from == to {
            return Ok(RateSnapshot::identity(from, now));
        }
        if let Some(rate) = state.live.get(&(from, to)) {
            return Ok(RateSnapshot {
                from,
                to,
                rate: *rate,
                source: RateSource::Live,
                captured_at: state.live_updated.unwrap_or(now),
            });
        }
        state
            .fallback
            .get(&(from, to))
            .map(|rate| RateSnapshot {
                from,
                to,
                rate: *rate,
                source: RateSource::Static,
                captured_at: now,
            })
            .ok_or(RateError::Unavailable { from, to })
    }

    fn table(&self) -> RateTableView {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let live = !state.live.is_empty();
        // Live quotes overlay the fallback set, matching what snapshot() resolves
        let mut rates: BTreeMap<String, Decimal> = state
            .fallback
            .iter()
            .chain(state.live.iter())
            .map(|((from, to), rate)| (pair_key(*from, *to), *rate))
            .collect();
        for currency in Currency::ALL {
            rates.insert(pair_key(currency, currency), Decimal::ONE);
        }

        RateTableView {
            source: if live { RateSource::Live } else { RateSource::Static },
            last_updated: if live { state.live_updated } else { None },
            rates,
        }
    }

    fn publish_usd_quotes(&self, quotes: &HashMap<Currency, Decimal>, at: DateTime<Utc>) -> Result<(), RateError> {
        self.update_live_from_usd(quotes, at);
        Ok(())
    }

    fn clear_live_quotes(&self) -> Result<(), RateError> {
        self.clear_live();
        Ok(())
    }
}
