//! Scalar codec - text conversion for path, form, and header values.
//!
//! [`TextCodec`] is the text-encoding capability of the binding engine:
//! any type implementing it can live in a `path`, `form`, or `header`
//! location. The built-in scalars (integers of every width, floats, bool,
//! `String`, RFC-3339 timestamps) implement it, and user types implement
//! the same trait, so custom conversions take part in binding on equal
//! terms.
//!
//! Decode failures produce `cannot parse <literal> into <type>: <reason>`
//! so a bad query parameter can be diagnosed from the error alone.
//!
//! # Example
//!
//! ```
//! use httpbind::codec::TextCodec;
//!
//! assert_eq!(42i32.encode_text().unwrap(), "42");
//! let n = i32::decode_text("42").unwrap();
//! assert_eq!(n, 42);
//! assert!(i32::decode_text("not a number").is_err());
//! ```

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Text-encoding capability for scalar wire values.
pub trait TextCodec: Sized {
    /// Render the value as its wire text.
    fn encode_text(&self) -> Result<String>;

    /// Parse the value from its wire text.
    fn decode_text(text: &str) -> Result<Self>;

    /// Whether the value counts as empty for `omitempty`.
    ///
    /// Defaults to `false`; the built-in scalars report their natural zero
    /// (empty string, numeric zero, `false`).
    fn is_empty_value(&self) -> bool {
        false
    }
}

fn parse_error(literal: &str, target: &'static str, reason: impl ToString) -> Error {
    Error::ParseValue {
        literal: literal.to_string(),
        target,
        reason: reason.to_string(),
    }
}

impl TextCodec for String {
    fn encode_text(&self) -> Result<String> {
        Ok(self.clone())
    }

    fn decode_text(text: &str) -> Result<Self> {
        Ok(text.to_string())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl TextCodec for bool {
    fn encode_text(&self) -> Result<String> {
        Ok(if *self { "true" } else { "false" }.to_string())
    }

    fn decode_text(text: &str) -> Result<Self> {
        text.parse()
            .map_err(|e| parse_error(text, "bool", e))
    }

    fn is_empty_value(&self) -> bool {
        !*self
    }
}

macro_rules! impl_number_codec {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl TextCodec for $ty {
                fn encode_text(&self) -> Result<String> {
                    Ok(self.to_string())
                }

                fn decode_text(text: &str) -> Result<Self> {
                    text.parse().map_err(|e| parse_error(text, $name, e))
                }

                fn is_empty_value(&self) -> bool {
                    *self == 0 as $ty
                }
            }
        )*
    };
}

impl_number_codec! {
    i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64", i128 => "i128",
    u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64", u128 => "u128",
    isize => "isize", usize => "usize",
    f32 => "f32", f64 => "f64",
}

/// Timestamps render as RFC-3339 in UTC, with sub-second digits included
/// only when non-zero.
impl TextCodec for DateTime<Utc> {
    fn encode_text(&self) -> Result<String> {
        Ok(self.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn decode_text(text: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| parse_error(text, "timestamp", e))
    }
}
