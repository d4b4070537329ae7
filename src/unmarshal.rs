//! Unmarshalling - populating a record from an incoming request.
//!
//! [`IncomingRequest`] wraps a buffered `http::Request<Bytes>`; the request
//! form (query string plus urlencoded body) is parsed once at construction
//! and the result - value pairs or the parse failure - is cached, so the
//! unmarshaller and handler code observe the same form regardless of how
//! often it is read.
//!
//! Unmarshal rules per location:
//!
//! - `path`: looked up in the router-provided variables; catch-all values
//!   lose their leading `/`,
//! - `form`/`header`: first value wins for scalars, every value populates a
//!   repeated field, missing values leave the zero value in place,
//! - `body`: JSON-decoded once, requiring an `application/json` content
//!   type (charset parameters accepted).
//!
//! Bounding the request body is the transport adapter's responsibility;
//! by the time an `IncomingRequest` exists the body is already in memory.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Uri};

use crate::bind::{Bindable, Decoded, Shape};
use crate::error::{Error, Result};
use crate::marshal::{CONTENT_TYPE_FORM, CONTENT_TYPE_JSON};
use crate::path::PathVar;
use crate::plan::plan_for;
use crate::tag::Location;

/// A buffered incoming request with its form parsed once.
pub struct IncomingRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    form: std::result::Result<Vec<(String, String)>, String>,
}

impl IncomingRequest {
    /// Wrap a buffered request, parsing the query string and - for
    /// urlencoded requests - the body form.
    pub fn new(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let mut form = parts
            .uri
            .query()
            .map_or_else(|| Ok(Vec::new()), parse_form);
        if form.is_ok() && content_type_is(&parts.headers, CONTENT_TYPE_FORM) {
            let body_form = match std::str::from_utf8(&body) {
                Ok(text) => parse_form(text),
                Err(e) => Err(e.to_string()),
            };
            match body_form {
                Err(e) => form = Err(e),
                Ok(more) => {
                    if let Ok(pairs) = &mut form {
                        pairs.extend(more);
                    }
                }
            }
        }
        IncomingRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            form,
        }
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The buffered request body.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The cached form pairs (query first, then body form).
    pub fn form(&self) -> Result<&[(String, String)]> {
        match &self.form {
            Ok(pairs) => Ok(pairs),
            Err(reason) => Err(Error::BadForm(reason.clone())),
        }
    }
}

/// Populate a fresh record from the request and its path variables.
///
/// # Errors
///
/// Plan errors for invalid declarations (including encode-only fields),
/// [`Error::BadForm`] for a malformed form, and
/// [`Error::UnmarshalField`] naming the field for every value failure. All
/// of these are classified by [`Error::is_unmarshal`], which the default
/// error mapper renders as a 400.
pub fn unmarshal<T: Bindable>(request: &IncomingRequest, path_vars: &[PathVar]) -> Result<T> {
    let plan = plan_for::<T>()?;
    plan.require_decodable()?;
    let form = request.form()?;

    let mut record = T::default();
    for binding in &plan.bindings {
        let decode = binding.decode.as_ref().ok_or_else(|| Error::BadType {
            type_name: std::any::type_name::<T>(),
            message: format!("field {} is encode-only and cannot be unmarshalled", binding.field),
        })?;
        let fail = |source: Error| Error::UnmarshalField {
            field: binding.field,
            source: Box::new(source),
        };

        match binding.location {
            Location::Path => {
                let var = path_vars.iter().find(|v| v.name == binding.name);
                match var {
                    Some(var) => {
                        let value = if plan
                            .template()
                            .is_some_and(|t| t.is_catch_all(&binding.name))
                        {
                            var.value.strip_prefix('/').unwrap_or(&var.value)
                        } else {
                            &var.value
                        };
                        decode(&mut record, Decoded::Text(value)).map_err(fail)?;
                    }
                    None if binding.shape == Shape::Optional => {}
                    None => {
                        return Err(fail(Error::MissingPathParam(binding.name.clone())));
                    }
                }
            }
            Location::Form => {
                apply_values(
                    &mut record,
                    decode,
                    binding.shape,
                    form.iter()
                        .filter(|(k, _)| *k == binding.name)
                        .map(|(_, v)| v.clone())
                        .collect(),
                )
                .map_err(fail)?;
            }
            Location::Header => {
                let values: Vec<String> = request
                    .headers
                    .get_all(binding.name.as_str())
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect();
                apply_values(&mut record, decode, binding.shape, values).map_err(fail)?;
            }
            Location::Body => {
                if request.body.is_empty() && binding.shape == Shape::Optional {
                    continue;
                }
                if !content_type_is(&request.headers, CONTENT_TYPE_JSON) {
                    let ct = request
                        .headers
                        .get(CONTENT_TYPE)
                        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                        .unwrap_or_default();
                    return Err(fail(Error::BadBody(format!(
                        "unexpected content type {}; want {}",
                        if ct.is_empty() { "none" } else { &ct },
                        CONTENT_TYPE_JSON,
                    ))));
                }
                decode(&mut record, Decoded::Json(&request.body)).map_err(fail)?;
            }
        }
    }
    Ok(record)
}

fn apply_values<T>(
    record: &mut T,
    decode: &crate::bind::DecodeFn<T>,
    shape: Shape,
    values: Vec<String>,
) -> Result<()> {
    match shape {
        Shape::Repeated => {
            if !values.is_empty() {
                decode(record, Decoded::Repeated(&values))?;
            }
        }
        _ => {
            if let Some(first) = values.first() {
                decode(record, Decoded::Text(first))?;
            }
        }
    }
    Ok(())
}

/// Whether the `Content-Type` header names the given media type, ignoring
/// any parameters such as `charset`.
pub(crate) fn content_type_is(headers: &HeaderMap, want: &str) -> bool {
    media_type(headers).is_some_and(|mt| mt.eq_ignore_ascii_case(want))
}

/// The media type of the `Content-Type` header, without parameters.
pub(crate) fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?;
    let text = value.to_str().ok()?;
    Some(text.split(';').next().unwrap_or("").trim().to_string())
}

/// Strict urlencoded form parsing.
///
/// `form_urlencoded` decodes leniently; requests with malformed percent
/// escapes must instead surface `cannot parse HTTP request form`, so the
/// escapes are validated here.
fn parse_form(text: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    for piece in text.split('&') {
        if piece.is_empty() {
            continue;
        }
        let (key, value) = piece.split_once('=').unwrap_or((piece, ""));
        pairs.push((decode_component(key)?, decode_component(value)?));
    }
    Ok(pairs)
}

fn decode_component(text: &str) -> std::result::Result<String, String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let valid = i + 2 < bytes.len()
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit();
                if !valid {
                    let end = (i + 3).min(bytes.len());
                    return Err(format!(
                        "invalid URL escape {:?}",
                        String::from_utf8_lossy(&bytes[i..end])
                    ));
                }
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("00");
                out.push(u8::from_str_radix(hex, 16).unwrap_or(0));
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}
