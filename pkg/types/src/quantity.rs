//! Fixed-point resource quantities.
//!
//! A `Quantity` is stored in milli-units so that `"500m"` of CPU and
//! `"1Gi"` of memory share one exact integer representation.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use pkg_constants::resources::MILLIS_PER_UNIT;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantity(i64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * MILLIS_PER_UNIT)
    }

    pub const fn millis(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_add(rhs.0).map(Quantity)
    }

    pub fn checked_sub(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_sub(rhs.0).map(Quantity)
    }

    pub fn checked_mul(self, factor: i64) -> Option<Quantity> {
        self.0.checked_mul(factor).map(Quantity)
    }

    pub fn saturating_add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(rhs.0))
    }

    /// `self − rhs`, or zero when `rhs` is larger.
    pub fn saturating_excess(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(rhs.0).max(0))
    }

    /// Parse `"2"`, `"500m"`, `"1.5"`, `"1Gi"`, `"10k"` ...
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);
        if number.is_empty() {
            return Err(Error::invalid(format!("quantity '{}' has no number", s)));
        }

        // scale of one unit of the suffix, in millis
        let scale: i128 = match suffix {
            "" => 1_000,
            "m" => 1,
            "k" => 1_000_000,
            "M" => 1_000_000_000,
            "G" => 1_000_000_000_000,
            "T" => 1_000_000_000_000_000,
            "Ki" => 1_024_000,
            "Mi" => 1_048_576_000,
            "Gi" => 1_073_741_824_000,
            "Ti" => 1_099_511_627_776_000,
            other => {
                return Err(Error::invalid(format!(
                    "quantity '{}' has unknown suffix '{}'",
                    s, other
                )));
            }
        };

        let (negative, digits) = match number.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, number.strip_prefix('+').unwrap_or(number)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        let bad = || Error::invalid(format!("quantity '{}' is not a number", s));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        let int: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| bad())?
        };
        let mut millis = int.checked_mul(scale).ok_or_else(bad)?;
        if !frac_part.is_empty() {
            let frac: i128 = frac_part.parse().map_err(|_| bad())?;
            let denom = 10i128
                .checked_pow(frac_part.len() as u32)
                .ok_or_else(bad)?;
            let scaled = frac.checked_mul(scale).ok_or_else(bad)?;
            if scaled % denom != 0 {
                return Err(Error::invalid(format!(
                    "quantity '{}' is finer than one milli-unit",
                    s
                )));
            }
            millis += scaled / denom;
        }
        if negative {
            millis = -millis;
        }
        i64::try_from(millis)
            .map(Quantity)
            .map_err(|_| Error::invalid(format!("quantity '{}' is out of range", s)))
    }
}

/// Whole units, e.g. `Quantity::from(5)` is five CPUs.
impl From<i64> for Quantity {
    fn from(units: i64) -> Self {
        Quantity::from_units(units)
    }
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 % MILLIS_PER_UNIT == 0 {
            write!(f, "{}", self.0 / MILLIS_PER_UNIT)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 - rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        self.0 -= rhs.0;
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuantityVisitor;

        impl Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a quantity such as 2, \"500m\" or \"1Gi\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
                Quantity::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
                v.checked_mul(MILLIS_PER_UNIT)
                    .map(Quantity)
                    .ok_or_else(|| E::custom("quantity out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(|v| v.checked_mul(MILLIS_PER_UNIT))
                    .map(Quantity)
                    .ok_or_else(|| E::custom("quantity out of range"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
                Quantity::parse(&v.to_string()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_milli() {
        assert_eq!(Quantity::parse("5").unwrap(), Quantity::from_units(5));
        assert_eq!(Quantity::parse("500m").unwrap(), Quantity::from_millis(500));
        assert_eq!(Quantity::parse("1.5").unwrap(), Quantity::from_millis(1500));
        assert_eq!(Quantity::parse("0").unwrap(), Quantity::ZERO);
    }

    #[test]
    fn parse_suffixes() {
        assert_eq!(
            Quantity::parse("1Gi").unwrap(),
            Quantity::from_units(1024 * 1024 * 1024)
        );
        assert_eq!(Quantity::parse("2k").unwrap(), Quantity::from_units(2000));
        assert_eq!(Quantity::parse("1Ki").unwrap(), Quantity::from_units(1024));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Quantity::parse("").is_err());
        assert!(Quantity::parse("abc").is_err());
        assert!(Quantity::parse("1Xi").is_err());
        assert!(Quantity::parse("0.0001").is_err());
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(Quantity::from_units(7).to_string(), "7");
        assert_eq!(Quantity::from_millis(250).to_string(), "250m");
    }

    #[test]
    fn serde_accepts_strings_and_integers() {
        let q: Quantity = serde_json::from_str("\"1500m\"").unwrap();
        assert_eq!(q, Quantity::from_millis(1500));
        let q: Quantity = serde_json::from_str("3").unwrap();
        assert_eq!(q, Quantity::from_units(3));
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"3\"");
    }

    #[test]
    fn excess_never_negative() {
        let a = Quantity::from_units(7);
        let b = Quantity::from_units(5);
        assert_eq!(a.saturating_excess(b), Quantity::from_units(2));
        assert_eq!(b.saturating_excess(a), Quantity::ZERO);
        let max = Quantity::from_millis(i64::MAX);
        assert_eq!(max.saturating_excess(Quantity::from_millis(-1)), max);
    }

    #[test]
    fn checked_ops_report_overflow() {
        let max = Quantity::from_millis(i64::MAX);
        assert!(max.checked_add(Quantity::from_millis(1)).is_none());
        assert!(Quantity::parse("4Ti").unwrap().checked_mul(3000).is_none());
        assert_eq!(max.saturating_add(max), max);
    }
}
