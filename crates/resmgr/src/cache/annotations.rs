//! Label and annotation access with typed annotation decoding.
//!
//! Built-in decoders are picked statically by the target type through
//! [`AnnotationValue`]: strings are taken verbatim, booleans and integers use
//! Go `strconv` syntax (integers accept `0x`, `0o`, `0b` and leading-zero
//! octal prefixes), and anything else is decoded as JSON through [`Json`].
//! A caller-supplied decoder can replace the built-in one for a single lookup.

use std::collections::HashMap;

use error_stack::Report;
use error_stack::ResultExt;
use serde::de::DeserializeOwned;
use tracing::error;

use super::error::DecodeError;

/// Error type returned by custom annotation decoders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A value that can be decoded from a raw annotation string.
pub trait AnnotationValue: Sized {
    fn decode_annotation(raw: &str) -> Result<Self, Report<DecodeError>>;
}

/// Structured (JSON) annotation payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> AnnotationValue for Json<T> {
    fn decode_annotation(raw: &str) -> Result<Self, Report<DecodeError>> {
        serde_json::from_str(raw)
            .map(Json)
            .change_context(DecodeError::InvalidJson)
    }
}

impl AnnotationValue for String {
    fn decode_annotation(raw: &str) -> Result<Self, Report<DecodeError>> {
        Ok(raw.to_string())
    }
}

impl AnnotationValue for bool {
    fn decode_annotation(raw: &str) -> Result<Self, Report<DecodeError>> {
        match raw {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            _ => Err(Report::new(DecodeError::InvalidBool {
                value: raw.to_string(),
            })),
        }
    }
}

/// Splits a base prefix off `digits`, returning (radix, body, prefixed).
fn split_radix(digits: &str) -> (u32, &str, bool) {
    let lower = digits.get(..2).map(str::to_ascii_lowercase);
    match lower.as_deref() {
        Some("0x") => (16, &digits[2..], true),
        Some("0o") => (8, &digits[2..], true),
        Some("0b") => (2, &digits[2..], true),
        _ if digits.len() > 1 && digits.starts_with('0') => (8, &digits[1..], true),
        _ => (10, digits, false),
    }
}

/// Parses an integer with automatic base detection into (negative, magnitude).
fn parse_integer(raw: &str, signed: bool) -> Result<(bool, u128), Report<DecodeError>> {
    let invalid = || {
        Report::new(DecodeError::InvalidInteger {
            value: raw.to_string(),
        })
    };

    let (negative, digits) = match raw.as_bytes().first() {
        Some(b'-') if signed => (true, &raw[1..]),
        Some(b'+') if signed => (false, &raw[1..]),
        _ => (false, raw),
    };

    let (radix, body, prefixed) = split_radix(digits);

    // underscores may only separate digits, and only after a base prefix
    if body.contains('_') && (!prefixed || body.contains("__") || body.ends_with('_')) {
        return Err(invalid());
    }
    let body: String = body.chars().filter(|c| *c != '_').collect();
    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }

    let magnitude = u128::from_str_radix(&body, radix).map_err(|_| invalid())?;
    Ok((negative, magnitude))
}

macro_rules! impl_signed_annotation_value {
    ($($ty:ty),*) => {$(
        impl AnnotationValue for $ty {
            fn decode_annotation(raw: &str) -> Result<Self, Report<DecodeError>> {
                let (negative, magnitude) = parse_integer(raw, true)?;
                i128::try_from(magnitude)
                    .ok()
                    .map(|m| if negative { -m } else { m })
                    .and_then(|value| <$ty>::try_from(value).ok())
                    .ok_or_else(|| {
                        Report::new(DecodeError::IntegerOutOfRange {
                            value: raw.to_string(),
                            target: stringify!($ty),
                        })
                    })
            }
        }
    )*};
}

macro_rules! impl_unsigned_annotation_value {
    ($($ty:ty),*) => {$(
        impl AnnotationValue for $ty {
            fn decode_annotation(raw: &str) -> Result<Self, Report<DecodeError>> {
                let (_, magnitude) = parse_integer(raw, false)?;
                <$ty>::try_from(magnitude).map_err(|_| {
                    Report::new(DecodeError::IntegerOutOfRange {
                        value: raw.to_string(),
                        target: stringify!($ty),
                    })
                })
            }
        }
    )*};
}

impl_signed_annotation_value!(isize, i64);
impl_unsigned_annotation_value!(usize, u64);

/// Label and annotation queries shared by pods and containers.
pub trait Metadata {
    /// Entity kind used in log messages.
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn labels(&self) -> &HashMap<String, String>;
    fn annotations(&self) -> &HashMap<String, String>;

    /// Keys of all labels, in no particular order.
    fn label_keys(&self) -> Vec<&str> {
        self.labels().keys().map(String::as_str).collect()
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.labels().get(key).map(String::as_str)
    }

    /// Keys of all annotations, in no particular order.
    fn annotation_keys(&self) -> Vec<&str> {
        self.annotations().keys().map(String::as_str).collect()
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(String::as_str)
    }

    /// Get and decode an annotation with the default decoder for `T`.
    ///
    /// Returns `Ok(None)` if the annotation is not present.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::Annotation`] if the value cannot be decoded into `T`
    fn annotation_object<T: AnnotationValue>(
        &self,
        key: &str,
    ) -> Result<Option<T>, Report<DecodeError>> {
        let Some(value) = self.annotation(key) else {
            return Ok(None);
        };

        T::decode_annotation(value).map(Some).map_err(|report| {
            error!(
                kind = Self::KIND,
                id = %self.id(),
                "failed to decode annotation {key} ({value}): {report:?}"
            );
            report.change_context(DecodeError::Annotation {
                key: key.to_string(),
            })
        })
    }

    /// Get and decode an annotation with a caller-supplied decoder.
    ///
    /// Returns `Ok(None)` if the annotation is not present.
    fn annotation_object_with<T, F>(
        &self,
        key: &str,
        decode: F,
    ) -> Result<Option<T>, Report<DecodeError>>
    where
        F: FnOnce(&[u8]) -> Result<T, BoxError>,
    {
        let Some(value) = self.annotation(key) else {
            return Ok(None);
        };

        decode(value.as_bytes()).map(Some).map_err(|e| {
            error!(
                kind = Self::KIND,
                id = %self.id(),
                "failed to decode annotation {key} ({value}): {e}"
            );
            Report::new(DecodeError::Custom {
                message: e.to_string(),
            })
            .change_context(DecodeError::Annotation {
                key: key.to_string(),
            })
        })
    }
}
