//! Marshalling - turning a record into an HTTP request.
//!
//! The URL argument is a template: its path may contain `:name` and
//! `*name` variables, which are filled from the record's `path` fields.
//! Query parameters already present on the template keep their position
//! ahead of the record's `form` fields. A `body` field is JSON-encoded;
//! `inbody` form fields are urlencoded into the body instead of the query
//! string. Exactly one `Content-Type` is set when, and only when, a body
//! is produced.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Method, Request};
use url::form_urlencoded;

use crate::bind::{Bindable, Encoded};
use crate::error::{Error, Result};
use crate::path::PathTemplate;
use crate::plan::plan_for;
use crate::tag::Location;
use crate::urls;

/// JSON body content type.
pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
/// Urlencoded form body content type.
pub(crate) const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Marshal `record` into an HTTP request for the given URL template.
///
/// The template may be absolute, relative, or empty; callers resolving
/// against a base URL apply [`crate::append_url`] first (as the client
/// does).
///
/// # Errors
///
/// Plan errors for invalid declarations, value-encoding failures
/// (`cannot marshal field: …`), unset or malformed path parameters, and
/// URL parse failures.
pub fn marshal<T: Bindable>(url: &str, method: Method, record: &T) -> Result<Request<Bytes>> {
    let plan = plan_for::<T>()?;
    let parts = urls::split_url(url);
    validate_path_escapes(url, &parts.path)?;
    let template = PathTemplate::parse(&parts.path)?;

    let mut path_values: HashMap<String, String> = HashMap::new();
    let mut query: Vec<(String, String)> = Vec::new();
    let mut body_form: Vec<(String, String)> = Vec::new();
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut body: Option<Vec<u8>> = None;

    for binding in &plan.bindings {
        let encoded = (binding.encode)(record).map_err(|e| Error::MarshalField(e.to_string()))?;
        match binding.location {
            Location::Path => {
                if let Encoded::Text { value, .. } = encoded {
                    path_values.insert(binding.name.clone(), value);
                }
            }
            Location::Form => {
                let out = if binding.inbody { &mut body_form } else { &mut query };
                append_text(out, &binding.name, encoded, binding.omitempty);
            }
            Location::Header => {
                append_text(&mut headers, &binding.name, encoded, binding.omitempty);
            }
            Location::Body => {
                if let Encoded::Json(bytes) = encoded {
                    body = Some(bytes);
                }
            }
        }
    }

    let path = template.substitute(&path_values)?;
    let mut target = format!("{}{}", parts.prefix, path);
    let rendered_query = serialize_form(&query);
    match (parts.query, rendered_query) {
        (Some(base), Some(extra)) => {
            target.push('?');
            target.push_str(&base);
            target.push('&');
            target.push_str(&extra);
        }
        (Some(q), None) | (None, Some(q)) => {
            target.push('?');
            target.push_str(&q);
        }
        (None, None) => {}
    }

    let uri = match http::Uri::try_from(target.as_str()) {
        Ok(uri) => uri,
        Err(e) => {
            return Err(Error::InvalidUrl {
                url: target,
                reason: e.to_string(),
            })
        }
    };

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::new())
        .map_err(|e| Error::InvalidUrl {
            url: target,
            reason: e.to_string(),
        })?;

    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::MarshalField(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| Error::MarshalField(format!("invalid header value: {e}")))?;
        request.headers_mut().append(name, value);
    }

    if let Some(bytes) = body {
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        *request.body_mut() = Bytes::from(bytes);
    } else if plan.has_inbody {
        let encoded = serialize_form(&body_form).unwrap_or_default();
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_FORM));
        *request.body_mut() = Bytes::from(encoded.into_bytes());
    }

    record.set_headers(request.headers_mut());
    Ok(request)
}

fn append_text(out: &mut Vec<(String, String)>, name: &str, encoded: Encoded, omitempty: bool) {
    match encoded {
        Encoded::Absent => {}
        Encoded::Text { value, empty } => {
            if !(omitempty && empty) {
                out.push((name.to_string(), value));
            }
        }
        Encoded::Repeated(values) => {
            for value in values {
                out.push((name.to_string(), value));
            }
        }
        Encoded::Json(_) => {}
    }
}

fn serialize_form(pairs: &[(String, String)]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    Some(serializer.finish())
}

/// Reject malformed percent escapes in the template path, mirroring what a
/// URL parser would refuse.
fn validate_path_escapes(url: &str, path: &str) -> Result<()> {
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(Error::InvalidUrl {
                    url: url.to_string(),
                    reason: format!(
                        "invalid URL escape {:?}",
                        String::from_utf8_lossy(&bytes[i..end])
                    ),
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}
