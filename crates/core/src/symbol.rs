//! Symbol normalization and exchange-increment arithmetic.

use rust_decimal::Decimal;

/// Quote currencies recognized when splitting a compact symbol into a pair.
const KNOWN_QUOTES: [&str; 5] = ["USDT", "BTC", "ETH", "EUR", "KCS"];

/// Canonical symbol form: uppercase, no separator (`BTC-USDT` → `BTCUSDT`).
#[must_use]
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .trim()
        .to_uppercase()
        .replace(['-', '/'], "")
}

/// Exchange pair form: `BTCUSDT` → `BTC-USDT`.
///
/// Symbols already containing a dash are only uppercased. A symbol whose
/// quote currency is not recognized is returned in normalized form.
#[must_use]
pub fn format_pair(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    if upper.contains('-') {
        return upper;
    }
    let norm = normalize_symbol(&upper);
    for quote in KNOWN_QUOTES {
        if let Some(base) = norm.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{base}-{quote}");
            }
        }
    }
    norm
}

/// Rounds `value` down to the nearest multiple of `step`.
///
/// A zero or negative step returns the value unchanged, matching how
/// exchanges report a missing increment.
#[must_use]
pub fn quantize_down(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        assert_eq!(normalize_symbol("btc-usdt"), "BTCUSDT");
        assert_eq!(normalize_symbol("ETH/USDT"), "ETHUSDT");
        assert_eq!(normalize_symbol(" SOLUSDT "), "SOLUSDT");
    }

    #[test]
    fn format_pair_splits_on_known_quote() {
        assert_eq!(format_pair("BTCUSDT"), "BTC-USDT");
        assert_eq!(format_pair("adabtc"), "ADA-BTC");
        assert_eq!(format_pair("SOL-USDT"), "SOL-USDT");
    }

    #[test]
    fn format_pair_leaves_unknown_quote_alone() {
        assert_eq!(format_pair("FOOBAR"), "FOOBAR");
    }

    #[test]
    fn quantize_down_floors_to_step() {
        assert_eq!(quantize_down(dec!(1.2345), dec!(0.01)), dec!(1.23));
        assert_eq!(quantize_down(dec!(0.00099), dec!(0.0001)), dec!(0.0009));
        assert_eq!(quantize_down(dec!(5), dec!(1)), dec!(5));
    }

    #[test]
    fn quantize_down_ignores_missing_step() {
        assert_eq!(quantize_down(dec!(1.234), Decimal::ZERO), dec!(1.234));
    }
}
