//! Fixed-point money amount
//!
//! Prices carry exactly two decimal places and are stored as integer
//! cents. At most 8 digits in total, 6 of them before the point.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest representable price: 999999.99
pub const MAX_CENTS: i64 = 99_999_999;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(i64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("Enter a number.")]
    Invalid,
    #[error("Ensure that there are no more than 2 decimal places.")]
    TooManyDecimals,
    #[error("Ensure that there are no more than 6 digits before the decimal point.")]
    TooManyDigits,
}

impl Price {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Sum of a list of prices
    pub fn sum<'a>(prices: impl IntoIterator<Item = &'a Price>) -> Price {
        Price(prices.into_iter().map(|p| p.0).sum())
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        let whole = if whole.is_empty() && !frac.is_empty() { "0" } else { whole };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PriceError::Invalid);
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PriceError::Invalid);
        }
        if frac.len() > 2 {
            return Err(PriceError::TooManyDecimals);
        }

        let whole = whole.trim_start_matches('0');
        if whole.len() > 6 {
            return Err(PriceError::TooManyDigits);
        }

        let units: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| PriceError::Invalid)?
        };
        let cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| PriceError::Invalid)? * 10,
            _ => frac.parse().map_err(|_| PriceError::Invalid)?,
        };

        Ok(Price(units * 100 + cents))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PriceVisitor;

        impl<'de> de::Visitor<'de> for PriceVisitor {
            type Value = Price;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal price such as \"12.50\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Price, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Price, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Price, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Price, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(PriceVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("123".parse::<Price>().unwrap().cents(), 12300);
        assert_eq!("123.4".parse::<Price>().unwrap().cents(), 12340);
        assert_eq!("123.45".parse::<Price>().unwrap().cents(), 12345);
        assert_eq!(".5".parse::<Price>().unwrap().cents(), 50);
        assert_eq!("0".parse::<Price>().unwrap().cents(), 0);
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!("".parse::<Price>(), Err(PriceError::Invalid));
        assert_eq!("abc".parse::<Price>(), Err(PriceError::Invalid));
        assert_eq!("-1".parse::<Price>(), Err(PriceError::Invalid));
        assert_eq!("1.234".parse::<Price>(), Err(PriceError::TooManyDecimals));
        assert_eq!("1234567".parse::<Price>(), Err(PriceError::TooManyDigits));
        assert_eq!("999999.99".parse::<Price>().unwrap().cents(), MAX_CENTS);
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_cents(199900).to_string(), "1999.00");
        assert_eq!(Price::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&Price::from_cents(12345)).unwrap();
        assert_eq!(json, "\"123.45\"");

        let p: Price = serde_json::from_str("\"10.5\"").unwrap();
        assert_eq!(p.cents(), 1050);
        let p: Price = serde_json::from_str("199").unwrap();
        assert_eq!(p.cents(), 19900);
        let p: Price = serde_json::from_str("2.25").unwrap();
        assert_eq!(p.cents(), 225);
        assert!(serde_json::from_str::<Price>("2.255").is_err());
    }

    #[test]
    fn test_sum() {
        let prices = [Price::from_cents(100), Price::from_cents(250)];
        assert_eq!(Price::sum(&prices).cents(), 350);
        assert_eq!(Price::sum(&[]).cents(), 0);
    }

    proptest! {
        #[test]
        fn display_parses_back(cents in 0i64..=MAX_CENTS) {
            let price = Price::from_cents(cents);
            prop_assert_eq!(price.to_string().parse::<Price>().unwrap(), price);
        }
    }
}
