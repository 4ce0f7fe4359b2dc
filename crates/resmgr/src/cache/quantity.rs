//! Kubernetes resource quantities.
//!
//! A [`Quantity`] is kept as an exact signed count of nano-units, which covers
//! every decimal SI suffix down to `n` and every binary suffix up to `Ei`
//! without loss. Inputs finer than one nano-unit are rounded up.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Largest power of ten that fits an i128.
const MAX_POW10: i32 = 38;

/// Errors produced while parsing a quantity string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid quantity number in {value:?}")]
    InvalidNumber { value: String },
    #[error("unsupported quantity suffix {suffix:?} in {value:?}")]
    InvalidSuffix { value: String, suffix: String },
    #[error("quantity {value:?} is out of range")]
    OutOfRange { value: String },
}

/// A resource amount such as `100m`, `64Mi`, `1.5` or `2e3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    nanos: i128,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity { nanos: 0 };

    pub const fn from_nanos(nanos: i128) -> Self {
        Self { nanos }
    }

    /// Whole units, e.g. bytes for memory.
    pub const fn from_units(units: i64) -> Self {
        Self {
            nanos: units as i128 * NANOS_PER_UNIT,
        }
    }

    pub const fn nanos(&self) -> i128 {
        self.nanos
    }

    /// Value in thousandths of a unit, rounded up.
    pub fn milli_value(&self) -> i128 {
        ceil_div(self.nanos, 1_000_000)
    }

    /// Value in whole units, rounded up.
    pub fn value(&self) -> i128 {
        ceil_div(self.nanos, NANOS_PER_UNIT)
    }

    pub const fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.nanos > 0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.nanos.checked_add(other.nanos).map(Quantity::from_nanos)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, other: Quantity) -> Quantity {
        Quantity::from_nanos(self.nanos.saturating_add(other.nanos))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.nanos;
        if nanos % NANOS_PER_UNIT == 0 {
            write!(f, "{}", nanos / NANOS_PER_UNIT)
        } else if nanos % 1_000_000 == 0 {
            write!(f, "{}m", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            write!(f, "{}u", nanos / 1_000)
        } else {
            write!(f, "{nanos}n")
        }
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_quantity(value).map(Quantity::from_nanos)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNumber {
            String(String),
            Int(i64),
            Float(f64),
        }

        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(s) => s.parse::<Quantity>().map_err(serde::de::Error::custom),
            StringOrNumber::Int(i) => Ok(Quantity::from_units(i)),
            StringOrNumber::Float(f) => f
                .to_string()
                .parse::<Quantity>()
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Division rounding towards positive infinity; `divisor` must be positive.
fn ceil_div(value: i128, divisor: i128) -> i128 {
    value.div_euclid(divisor) + i128::from(value.rem_euclid(divisor) != 0)
}

/// Returns (binary multiplier, decimal exponent) for a suffix.
fn parse_suffix(value: &str, suffix: &str) -> Result<(i128, i32), QuantityError> {
    let scale = match suffix {
        "" => (1, 0),
        "Ki" => (1 << 10, 0),
        "Mi" => (1 << 20, 0),
        "Gi" => (1 << 30, 0),
        "Ti" => (1 << 40, 0),
        "Pi" => (1 << 50, 0),
        "Ei" => (1 << 60, 0),
        "n" => (1, -9),
        "u" => (1, -6),
        "m" => (1, -3),
        "k" => (1, 3),
        "M" => (1, 6),
        "G" => (1, 9),
        "T" => (1, 12),
        "P" => (1, 15),
        "E" => (1, 18),
        _ => {
            let exponent = suffix
                .strip_prefix(['e', 'E'])
                .and_then(|exp| exp.parse::<i32>().ok())
                .ok_or_else(|| QuantityError::InvalidSuffix {
                    value: value.to_string(),
                    suffix: suffix.to_string(),
                })?;
            (1, exponent)
        }
    };
    Ok(scale)
}

fn parse_quantity(value: &str) -> Result<i128, QuantityError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (negative, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    let invalid_number = || QuantityError::InvalidNumber {
        value: value.to_string(),
    };
    let out_of_range = || QuantityError::OutOfRange {
        value: value.to_string(),
    };

    let (integral, fraction) = match number.split_once('.') {
        Some((integral, fraction)) => (integral, fraction),
        None => (number, ""),
    };
    if (integral.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(invalid_number());
    }

    let (binary, exponent) = parse_suffix(value, suffix)?;

    let mut mantissa: i128 = 0;
    for digit in integral.bytes().chain(fraction.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit - b'0')))
            .ok_or_else(out_of_range)?;
    }
    mantissa = mantissa.checked_mul(binary).ok_or_else(out_of_range)?;
    if negative {
        mantissa = -mantissa;
    }
    if mantissa == 0 {
        return Ok(0);
    }

    let fraction_len = i32::try_from(fraction.len()).map_err(|_| out_of_range())?;
    let shift = exponent
        .checked_add(9)
        .and_then(|s| s.checked_sub(fraction_len))
        .ok_or_else(out_of_range)?;

    if shift >= 0 {
        if shift > MAX_POW10 {
            return Err(out_of_range());
        }
        mantissa
            .checked_mul(10_i128.pow(shift as u32))
            .ok_or_else(out_of_range)
    } else if -shift > MAX_POW10 {
        // below one nano-unit; round towards positive infinity
        Ok(if mantissa > 0 { 1 } else { 0 })
    } else {
        Ok(ceil_div(mantissa, 10_i128.pow((-shift) as u32)))
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn q(value: &str) -> Quantity {
        value.parse().expect("valid quantity")
    }

    #[test]
    fn parse_plain_and_decimal_suffixes() {
        assert_eq!(q("1").nanos(), 1_000_000_000);
        assert_eq!(q("100m").milli_value(), 100);
        assert_eq!(q("1.5").milli_value(), 1500);
        assert_eq!(q("2k").value(), 2000);
        assert_eq!(q("3M").value(), 3_000_000);
        assert_eq!(q("5n").nanos(), 5);
        assert_eq!(q("7u").nanos(), 7000);
    }

    #[test]
    fn parse_binary_suffixes() {
        assert_eq!(q("1Ki").value(), 1024);
        assert_eq!(q("64Mi").value(), 64 * 1024 * 1024);
        assert_eq!(q("2Gi").value(), 2 * 1024 * 1024 * 1024);
        assert_eq!(q("1Ei").value(), 1_i128 << 60);
    }

    #[test]
    fn parse_exponents() {
        assert_eq!(q("2e3").value(), 2000);
        assert_eq!(q("1E6").value(), 1_000_000);
        assert_eq!(q("5e-3").milli_value(), 5);
    }

    #[test]
    fn equivalent_spellings_compare_equal() {
        assert_eq!(q("100m"), q("0.1"));
        assert_eq!(q("1Gi"), q("1024Mi"));
        assert_eq!(q("1k"), q("1000"));
        assert_eq!(q("+1"), q("1"));
        assert!(q("200m") > q("100m"));
    }

    #[test]
    fn zero_and_sign() {
        assert!(q("0").is_zero());
        assert!(q("0m").is_zero());
        assert!(!q("0Mi").is_positive());
        assert!(q("-1").nanos() < 0);
        assert!(q("1n").is_positive());
    }

    #[test]
    fn sub_nano_values_round_up() {
        assert_eq!(q("0.0000000001").nanos(), 1);
        assert_eq!(q("1.0000000001").nanos(), 1_000_000_001);
        assert_eq!(q("-0.0000000001").nanos(), 0);
    }

    #[test]
    fn negative_values_round_towards_positive_infinity() {
        assert_eq!(q("-1.5").value(), -1);
        assert_eq!(q("-1500u").milli_value(), -1);
        assert_eq!(q("-2").value(), -2);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let min = Quantity::from_nanos(i128::MIN);
        assert_eq!(min.value(), i128::MIN / NANOS_PER_UNIT);
        assert_eq!(min.milli_value(), i128::MIN / 1_000_000);

        let saturated = min + Quantity::from_nanos(-1);
        assert_eq!(saturated.nanos(), i128::MIN);
        assert!(saturated.value() < 0);
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!("".parse::<Quantity>(), Err(QuantityError::Empty));
        assert!(matches!(
            "abc".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber { .. })
        ));
        assert!(matches!(
            "1.2.3".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber { .. })
        ));
        assert!(matches!(
            "10Xi".parse::<Quantity>(),
            Err(QuantityError::InvalidSuffix { .. })
        ));
        assert!(matches!(
            "1e".parse::<Quantity>(),
            Err(QuantityError::InvalidSuffix { .. })
        ));
        assert!(matches!(
            "1e40".parse::<Quantity>(),
            Err(QuantityError::OutOfRange { .. })
        ));
    }

    #[test]
    fn addition_is_exact() {
        assert_eq!(q("100m") + q("900m"), q("1"));
        assert_eq!(q("512Mi") + q("512Mi"), q("1Gi"));
        assert_eq!(q("1").checked_add(q("250m")), Some(q("1250m")));
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(q("1").to_string(), "1");
        assert_eq!(q("100m").to_string(), "100m");
        assert_eq!(q("1.5").to_string(), "1500m");
        assert_eq!(q("1Ki").to_string(), "1024");
        assert_eq!(q("3u").to_string(), "3u");
        assert_eq!(q("3n").to_string(), "3n");
    }

    #[test]
    fn deserialize_strings_and_numbers() {
        let values: Vec<Quantity> =
            serde_json::from_str(r#"["250m", 2, 0.5, "1Gi"]"#).expect("should deserialize");
        assert_eq!(values, vec![q("250m"), q("2"), q("500m"), q("1Gi")]);

        assert!(serde_json::from_str::<Quantity>(r#""lots""#).is_err());
    }
}
