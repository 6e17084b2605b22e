use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use super::Currency;

/// Money is stored as an integer count of the currency's minor unit.
/// For USD, 1 unit = 100 minor units, so $50.00 = 5000. JPY has no minor unit.
pub type MinorUnits = i64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("{amount} has more than {digits} decimal places for {currency}")]
    ExcessPrecision {
        amount: Decimal,
        currency: Currency,
        digits: u32,
    },

    #[error("amount {0} is out of range")]
    OutOfRange(Decimal),
}

/// Convert a decimal amount in major units into minor units.
/// Rejects amounts carrying more precision than the currency allows; trailing
/// zeros are not counted, so "30.000" is a valid USD amount.
pub fn to_minor(amount: Decimal, currency: Currency) -> Result<MinorUnits, MoneyError> {
    let digits = currency.minor_units();
    let mut scaled = amount.normalize();
    if scaled.scale() > digits {
        return Err(MoneyError::ExcessPrecision {
            amount,
            currency,
            digits,
        });
    }
    scaled.rescale(digits);
    i64::try_from(scaled.mantissa()).map_err(|_| MoneyError::OutOfRange(amount))
}

/// Convert minor units back into a decimal with the currency's scale.
/// Example: (2760, EUR) -> 27.60
pub fn from_minor(amount: MinorUnits, currency: Currency) -> Decimal {
    Decimal::new(amount, currency.minor_units())
}

/// Apply an exchange rate to an amount, rounding half-up to the target
/// currency's minor units.
pub fn convert(
    amount: MinorUnits,
    from: Currency,
    to: Currency,
    rate: Decimal,
) -> Result<MinorUnits, MoneyError> {
    let source = from_minor(amount, from);
    let target = source
        .checked_mul(rate)
        .ok_or(MoneyError::OutOfRange(source))?
        .round_dp_with_strategy(to.minor_units(), RoundingStrategy::MidpointAwayFromZero);
    to_minor(target, to)
}

/// Format minor units as a human-readable amount with the currency code.
/// Example: (-1234, USD) -> "-12.34 USD"
pub fn format_minor(amount: MinorUnits, currency: Currency) -> String {
    format!("{} {}", from_minor(amount, currency), currency)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_to_minor() {
        assert_eq!(to_minor(dec("50.00"), Currency::Usd), Ok(5000));
        assert_eq!(to_minor(dec("50"), Currency::Usd), Ok(5000));
        assert_eq!(to_minor(dec("12.5"), Currency::Eur), Ok(1250));
        assert_eq!(to_minor(dec("0.01"), Currency::Gbp), Ok(1));
        assert_eq!(to_minor(dec("30.000"), Currency::Usd), Ok(3000));
        assert_eq!(to_minor(dec("1500"), Currency::Jpy), Ok(1500));
        assert_eq!(to_minor(dec("-7.25"), Currency::Usd), Ok(-725));
    }

    #[test]
    fn test_to_minor_rejects_excess_precision() {
        assert!(matches!(
            to_minor(dec("100.999"), Currency::Usd),
            Err(MoneyError::ExcessPrecision { digits: 2, .. })
        ));
        assert!(matches!(
            to_minor(dec("10.5"), Currency::Jpy),
            Err(MoneyError::ExcessPrecision { digits: 0, .. })
        ));
    }

    #[test]
    fn test_from_minor_keeps_currency_scale() {
        assert_eq!(from_minor(2760, Currency::Eur).to_string(), "27.60");
        assert_eq!(from_minor(0, Currency::Usd).to_string(), "0.00");
        assert_eq!(from_minor(1495, Currency::Jpy).to_string(), "1495");
    }

    #[test]
    fn test_convert_rounds_half_up() {
        assert_eq!(convert(3000, Currency::Usd, Currency::Eur, dec("0.92")), Ok(2760));
        // 0.01 * 0.5 = 0.005 -> 0.01
        assert_eq!(convert(1, Currency::Usd, Currency::Eur, dec("0.5")), Ok(1));
        // 0.01 * 0.4 = 0.004 -> 0.00
        assert_eq!(convert(1, Currency::Usd, Currency::Eur, dec("0.4")), Ok(0));
    }

    #[test]
    fn test_convert_across_minor_unit_counts() {
        // 10.00 USD at 149.50 -> 1495 JPY
        assert_eq!(convert(1000, Currency::Usd, Currency::Jpy, dec("149.50")), Ok(1495));
        // 1000 JPY at 0.0067 -> 6.70 USD
        assert_eq!(convert(1000, Currency::Jpy, Currency::Usd, dec("0.0067")), Ok(670));
    }

    #[test]
    fn test_format_minor() {
        assert_eq!(format_minor(5000, Currency::Usd), "50.00 USD");
        assert_eq!(format_minor(-1, Currency::Eur), "-0.01 EUR");
        assert_eq!(format_minor(300, Currency::Jpy), "300 JPY");
    }
}
