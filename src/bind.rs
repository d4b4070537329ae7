//! Record binding declarations.
//!
//! A record type opts into HTTP binding by implementing [`Bindable`]: it
//! names its route (if it has one) and lists one [`Field`] per bound field.
//! Each field declaration carries the tag string - the same grammar the
//! wire format is specified in - plus typed accessors; the constructor
//! chosen selects the codec:
//!
//! - [`Field::text`] - scalar via the [`TextCodec`] capability
//! - [`Field::optional`] - `Option<V>`; `None` is omitted / left unset
//! - [`Field::repeated`] - `Vec<V>`; repeated form or header values
//! - [`Field::display`] - encode-only, via `Display`
//! - [`Field::json`] / [`Field::optional_json`] - the JSON body
//!
//! Declarations are validated and compiled into a cached binding plan the
//! first time the type is used; see the `plan` module.
//!
//! # Example
//!
//! ```
//! use httpbind::{Bindable, Field};
//!
//! #[derive(Default)]
//! struct ListReq {
//!     user: String,
//!     limit: Option<u32>,
//! }
//!
//! impl Bindable for ListReq {
//!     fn route() -> Option<&'static str> {
//!         Some("GET /users/:user/items")
//!     }
//!
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![
//!             Field::text("user", ",path", |r: &Self| &r.user, |r, v| r.user = v),
//!             Field::optional("limit", "limit,form", |r: &Self| &r.limit, |r, v| {
//!                 r.limit = Some(v)
//!             }),
//!         ]
//!     }
//! }
//! ```

use std::fmt;

use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::TextCodec;
use crate::error::{Error, Result};

/// A record type whose fields bind to HTTP locations.
///
/// `Default` provides the zero-valued record the unmarshaller populates.
pub trait Bindable: Default + Send + 'static {
    /// The record's route tag, e.g. `"GET /m1/:p"`.
    ///
    /// A method-only tag (`"GET"`) is allowed for records that are driven
    /// by an explicit URL template. `None` means the record has no route of
    /// its own.
    fn route() -> Option<&'static str> {
        None
    }

    /// The field binding declarations.
    fn fields() -> Vec<Field<Self>>;

    /// Hook invoked on the fully built request after marshalling, letting
    /// the record adjust headers directly.
    fn set_headers(&self, _headers: &mut HeaderMap) {}
}

/// How a field's value is shaped on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Scalar,
    Optional,
    Repeated,
    Json,
}

/// An encoded field value, ready for placement.
pub(crate) enum Encoded {
    /// Nothing to place (`None` values).
    Absent,
    /// A single text value; `empty` feeds the `omitempty` rule.
    Text { value: String, empty: bool },
    /// Repeated text values for form or header locations.
    Repeated(Vec<String>),
    /// JSON bytes for the body.
    Json(Vec<u8>),
}

/// A wire value handed to a field decoder.
pub(crate) enum Decoded<'a> {
    Text(&'a str),
    Repeated(&'a [String]),
    Json(&'a [u8]),
}

pub(crate) type EncodeFn<T> = Box<dyn Fn(&T) -> Result<Encoded> + Send + Sync>;
pub(crate) type DecodeFn<T> = Box<dyn Fn(&mut T, Decoded<'_>) -> Result<()> + Send + Sync>;

fn shape_mismatch() -> Error {
    Error::msg("field decoder received a value of the wrong shape")
}

/// A single field binding declaration for a record of type `T`.
///
/// Constructed through the typed constructors; the tag string is parsed and
/// validated when the record's binding plan is built.
pub struct Field<T: ?Sized> {
    pub(crate) name: &'static str,
    pub(crate) tag: &'static str,
    pub(crate) shape: Shape,
    pub(crate) encode: EncodeFn<T>,
    pub(crate) decode: Option<DecodeFn<T>>,
}

impl<T: 'static> Field<T> {
    /// A scalar field using the [`TextCodec`] capability.
    pub fn text<V>(
        name: &'static str,
        tag: &'static str,
        get: fn(&T) -> &V,
        set: fn(&mut T, V),
    ) -> Self
    where
        V: TextCodec + 'static,
    {
        Field {
            name,
            tag,
            shape: Shape::Scalar,
            encode: Box::new(move |record| {
                let value = get(record);
                Ok(Encoded::Text {
                    empty: value.is_empty_value(),
                    value: value.encode_text()?,
                })
            }),
            decode: Some(Box::new(move |record, wire| match wire {
                Decoded::Text(text) => {
                    set(record, V::decode_text(text)?);
                    Ok(())
                }
                _ => Err(shape_mismatch()),
            })),
        }
    }

    /// An optional scalar. `None` encodes as absent; an absent wire value
    /// leaves the field untouched on decode.
    pub fn optional<V>(
        name: &'static str,
        tag: &'static str,
        get: fn(&T) -> &Option<V>,
        set: fn(&mut T, V),
    ) -> Self
    where
        V: TextCodec + 'static,
    {
        Field {
            name,
            tag,
            shape: Shape::Optional,
            encode: Box::new(move |record| match get(record) {
                None => Ok(Encoded::Absent),
                Some(value) => Ok(Encoded::Text {
                    empty: value.is_empty_value(),
                    value: value.encode_text()?,
                }),
            }),
            decode: Some(Box::new(move |record, wire| match wire {
                Decoded::Text(text) => {
                    set(record, V::decode_text(text)?);
                    Ok(())
                }
                _ => Err(shape_mismatch()),
            })),
        }
    }

    /// A repeated scalar, valid at form and header locations.
    pub fn repeated<V>(
        name: &'static str,
        tag: &'static str,
        get: fn(&T) -> &Vec<V>,
        set: fn(&mut T, Vec<V>),
    ) -> Self
    where
        V: TextCodec + 'static,
    {
        Field {
            name,
            tag,
            shape: Shape::Repeated,
            encode: Box::new(move |record| {
                let values = get(record)
                    .iter()
                    .map(|v| v.encode_text())
                    .collect::<Result<Vec<_>>>()?;
                Ok(Encoded::Repeated(values))
            }),
            decode: Some(Box::new(move |record, wire| match wire {
                Decoded::Repeated(values) => {
                    let decoded = values
                        .iter()
                        .map(|v| V::decode_text(v))
                        .collect::<Result<Vec<_>>>()?;
                    set(record, decoded);
                    Ok(())
                }
                _ => Err(shape_mismatch()),
            })),
        }
    }

    /// An encode-only scalar rendered through `Display`.
    ///
    /// Records with a display field can be marshalled but not unmarshalled;
    /// building a decoding plan for them fails at plan time. Display values
    /// are never considered empty.
    pub fn display<V>(name: &'static str, tag: &'static str, get: fn(&T) -> &V) -> Self
    where
        V: fmt::Display + 'static,
    {
        Field {
            name,
            tag,
            shape: Shape::Scalar,
            encode: Box::new(move |record| {
                Ok(Encoded::Text {
                    value: get(record).to_string(),
                    empty: false,
                })
            }),
            decode: None,
        }
    }

    /// The JSON body field.
    pub fn json<V>(
        name: &'static str,
        tag: &'static str,
        get: fn(&T) -> &V,
        set: fn(&mut T, V),
    ) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
    {
        Field {
            name,
            tag,
            shape: Shape::Json,
            encode: Box::new(move |record| {
                let bytes = serde_json::to_vec(get(record))
                    .map_err(|e| Error::msg(format!("cannot marshal request body: {e}")))?;
                Ok(Encoded::Json(bytes))
            }),
            decode: Some(Box::new(move |record, wire| match wire {
                Decoded::Json(bytes) => {
                    let value: V = serde_json::from_slice(bytes)
                        .map_err(|e| Error::BadBody(e.to_string()))?;
                    set(record, value);
                    Ok(())
                }
                _ => Err(shape_mismatch()),
            })),
        }
    }

    /// An optional JSON body. `None` sends no body at all.
    pub fn optional_json<V>(
        name: &'static str,
        tag: &'static str,
        get: fn(&T) -> &Option<V>,
        set: fn(&mut T, V),
    ) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
    {
        Field {
            name,
            tag,
            shape: Shape::Json,
            encode: Box::new(move |record| match get(record) {
                None => Ok(Encoded::Absent),
                Some(value) => {
                    let bytes = serde_json::to_vec(value)
                        .map_err(|e| Error::msg(format!("cannot marshal request body: {e}")))?;
                    Ok(Encoded::Json(bytes))
                }
            }),
            decode: Some(Box::new(move |record, wire| match wire {
                Decoded::Json(bytes) => {
                    let value: V = serde_json::from_slice(bytes)
                        .map_err(|e| Error::BadBody(e.to_string()))?;
                    set(record, value);
                    Ok(())
                }
                _ => Err(shape_mismatch()),
            })),
        }
    }

    /// The field's Rust name, used in diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The raw tag string.
    #[inline]
    pub fn tag(&self) -> &'static str {
        self.tag
    }
}
