//! Tag grammar for field and route declarations.
//!
//! Field tags follow:
//!
//! ```text
//! field-tag := NAME "," LOC ("," FLAG)*
//! LOC       := "path" | "form" | "header" | "body"
//! FLAG      := "omitempty" | "inbody"
//! ```
//!
//! The name may be empty, in which case the record field's own name is used
//! on the wire. Route tags are `"<METHOD> <PATH-TEMPLATE>"`, or just
//! `"<METHOD>"` for records driven by an explicit URL template.
//!
//! Parsing here is purely syntactic; cross-field rules (one body field,
//! inbody vs body exclusivity, path/template agreement) are enforced when
//! the binding plan is built.

use http::Method;

/// Where a field lives on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    /// A `:name` or `*name` segment of the path template.
    Path,
    /// Query string, or the urlencoded body when the `inbody` flag is set.
    Form,
    /// A request header, canonicalized by name.
    Header,
    /// The JSON request body.
    Body,
}

/// A parsed field tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldTag {
    /// Wire name; `None` means "use the field's own name".
    pub name: Option<String>,
    pub location: Location,
    pub omitempty: bool,
    pub inbody: bool,
}

/// Parse a field tag. The returned error is the bare reason; callers wrap
/// it with the field name and the tag text.
pub(crate) fn parse_field_tag(tag: &str) -> Result<FieldTag, String> {
    let mut parts = tag.split(',');
    let name = parts.next().unwrap_or_default();
    let name = if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    };

    let mut location = None;
    let mut omitempty = false;
    let mut inbody = false;
    for flag in parts {
        let loc = match flag {
            "path" => Some(Location::Path),
            "form" => Some(Location::Form),
            "header" => Some(Location::Header),
            "body" => Some(Location::Body),
            "omitempty" => {
                omitempty = true;
                None
            }
            "inbody" => {
                inbody = true;
                None
            }
            _ => return Err(format!("unknown tag flag {flag:?}")),
        };
        if let Some(loc) = loc {
            if location.is_some() {
                return Err("more than one location specified".to_string());
            }
            location = Some(loc);
        }
    }
    let location = location.ok_or_else(|| "missing location".to_string())?;

    if omitempty && !matches!(location, Location::Form | Location::Header) {
        return Err("can only use omitempty with form or header fields".to_string());
    }
    if inbody && location != Location::Form {
        return Err("can only use inbody with form fields".to_string());
    }
    Ok(FieldTag {
        name,
        location,
        omitempty,
        inbody,
    })
}

/// A parsed route tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RouteTag {
    pub method: Method,
    /// Path template; `None` for method-only routes.
    pub path: Option<String>,
}

/// The closed set of methods a route tag may name.
const METHODS: [Method; 8] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::TRACE,
];

/// Parse a route tag. As with field tags, the error is the bare reason.
pub(crate) fn parse_route_tag(tag: &str) -> Result<RouteTag, String> {
    let mut parts = tag.split_whitespace();
    let method = match parts.next() {
        Some(m) => m,
        None => return Err("no route specified".to_string()),
    };
    let path = parts.next().map(str::to_string);
    if parts.next().is_some() {
        return Err("wrong field count".to_string());
    }

    let method = method.to_ascii_uppercase();
    let method = METHODS
        .iter()
        .find(|m| m.as_str() == method)
        .cloned()
        .ok_or_else(|| "invalid method".to_string())?;
    Ok(RouteTag { method, path })
}
