use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Currency, LimitPeriod, MinorUnits, SpendWindow};

pub type WalletId = Uuid;
pub type OwnerId = Uuid;

/// A single-currency wallet. `balance` is a cache of the ledger sum; the
/// ledger stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: OwnerId,
    pub currency: Currency,
    /// Cached balance in minor units
    pub balance: MinorUnits,
    pub daily_limit: MinorUnits,
    pub spent_in_period: MinorUnits,
    pub period_start: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(
        owner_id: OwnerId,
        currency: Currency,
        daily_limit: MinorUnits,
        now: DateTime<Utc>,
        period: LimitPeriod,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            currency,
            balance: 0,
            daily_limit,
            spent_in_period: 0,
            period_start: period.start_of(now),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// The wallet's stored spend window, before any lazy reset.
    pub fn spend_window(&self) -> SpendWindow {
        SpendWindow {
            limit: self.daily_limit,
            spent: self.spent_in_period,
            period_start: self.period_start,
        }
    }

    /// The spend window as of `now`.
    pub fn current_window(&self, now: DateTime<Utc>, period: LimitPeriod) -> SpendWindow {
        self.spend_window().rolled(now, period)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
