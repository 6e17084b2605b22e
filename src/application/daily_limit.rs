use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{Authorization, LimitPeriod, MinorUnits, SpendWindow, Wallet, format_minor};

use super::{AppError, Clock};

/// Authorizes spend against each wallet's periodic cap. Windows roll lazily
/// on read; there is no background reset.
#[derive(Clone)]
pub struct DailyLimitEnforcer {
    clock: Arc<dyn Clock>,
    period: LimitPeriod,
}

impl DailyLimitEnforcer {
    pub fn new(clock: Arc<dyn Clock>, period: LimitPeriod) -> Self {
        Self { clock, period }
    }

    pub fn period(&self) -> LimitPeriod {
        self.period
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The wallet's window as of now, reset if its period has ended.
    pub fn current_window(&self, wallet: &Wallet) -> SpendWindow {
        wallet.current_window(self.clock.now(), self.period)
    }

    /// Check a spend. On success returns the window with the spend recorded,
    /// ready to be persisted in the commit.
    pub fn authorize(&self, wallet: &Wallet, amount: MinorUnits) -> Result<SpendWindow, AppError> {
        let mut window = self.current_window(wallet);
        match window.authorize(amount) {
            Authorization::Allowed => {
                window.record(amount);
                Ok(window)
            }
            Authorization::Denied { remaining } => Err(AppError::DailyLimitExceeded {
                wallet_id: wallet.id,
                remaining,
                requested: amount,
            }),
        }
    }

    /// Validate a new limit for the wallet and return the window to store.
    pub fn with_new_limit(&self, wallet: &Wallet, limit: MinorUnits) -> Result<SpendWindow, AppError> {
        if limit < 0 {
            return Err(AppError::Validation("daily limit cannot be negative".to_string()));
        }
        let mut window = self.current_window(wallet);
        if limit < window.spent {
            return Err(AppError::Validation(format!(
                "daily limit {} is below the {} already spent this period",
                format_minor(limit, wallet.currency),
                format_minor(window.spent, wallet.currency)
            )));
        }
        window.limit = limit;
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::application::ManualClock;
    use crate::domain::Currency;

    fn setup() -> (Arc<ManualClock>, DailyLimitEnforcer, Wallet) {
        let start = DateTime::parse_from_rfc3339("2024-06-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = Arc::new(ManualClock::new(start));
        let enforcer = DailyLimitEnforcer::new(clock.clone(), LimitPeriod::CalendarDay);
        let wallet = Wallet::new(Uuid::new_v4(), Currency::Usd, 1500, start, LimitPeriod::CalendarDay);
        (clock, enforcer, wallet)
    }

    #[test]
    fn test_denies_spend_over_remaining() {
        let (_clock, enforcer, wallet) = setup();
        let err = enforcer.authorize(&wallet, 2000).unwrap_err();
        assert!(matches!(
            err,
            AppError::DailyLimitExceeded {
                remaining: 1500,
                requested: 2000,
                ..
            }
        ));
    }

    #[test]
    fn test_authorized_spend_is_recorded() {
        let (_clock, enforcer, wallet) = setup();
        let window = enforcer.authorize(&wallet, 1000).unwrap();
        assert_eq!(window.spent, 1000);
        assert_eq!(window.remaining(), 500);
    }

    #[test]
    fn test_window_resets_on_next_day() {
        let (clock, enforcer, mut wallet) = setup();
        wallet.spent_in_period = 1500;
        assert!(enforcer.authorize(&wallet, 1).is_err());

        clock.advance(Duration::days(1));
        let window = enforcer.authorize(&wallet, 1500).unwrap();
        assert_eq!(window.spent, 1500);
    }

    #[test]
    fn test_limit_cannot_drop_below_spend() {
        let (_clock, enforcer, mut wallet) = setup();
        wallet.spent_in_period = 1000;
        assert!(matches!(
            enforcer.with_new_limit(&wallet, 999),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            enforcer.with_new_limit(&wallet, -1),
            Err(AppError::Validation(_))
        ));
        assert_eq!(enforcer.with_new_limit(&wallet, 1000).unwrap().limit, 1000);
    }
}
