//! Path templates.
//!
//! A template is a `/`-separated pattern where `:name` captures one segment
//! and `*name`, allowed only as the final segment, captures the rest of the
//! path. Templates are used in three places:
//!
//! - marshalling substitutes encoded field values into the template,
//! - handler registration validates that every template variable is bound
//!   by a record field,
//! - routers match concrete request paths and extract [`PathVar`]s.
//!
//! Matching is segment-wise: literal segments compare exactly, `:name`
//! captures the decoded segment, and a catch-all captures the remainder
//! including its leading `/`.

use std::collections::HashMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{Error, Result};

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

/// A named path variable extracted by a router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathVar {
    /// Template variable name (without the `:` or `*` marker).
    pub name: String,
    /// Captured value. For catch-alls this keeps the leading `/`.
    pub value: String,
}

impl PathVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        PathVar {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `:name`; an empty name is only diagnosed when a value is substituted.
    Param(String),
    CatchAll(String),
}

/// A parsed path template.
///
/// Routers integrating a [`Handler`](crate::Handler) list can parse the
/// handler's path with [`PathTemplate::parse`] and resolve incoming
/// requests with [`PathTemplate::match_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a template. Rejects `*name` anywhere but the final segment.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        let parts: Vec<&str> = if trimmed.is_empty() && !raw.starts_with('/') {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if i != parts.len() - 1 {
                    return Err(Error::StarNotAtEnd);
                }
                Segment::CatchAll(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }
        Ok(PathTemplate {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The template text as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `name` is bound by a `*name` catch-all segment.
    pub(crate) fn is_catch_all(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::CatchAll(n) if n == name))
    }

    /// Names of all `:name` and `*name` variables, in template order.
    pub(crate) fn variables(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(n) | Segment::CatchAll(n) => Some(n.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute encoded field values into the template, producing the
    /// concrete request path.
    ///
    /// Values are percent-encoded per segment. A catch-all value must start
    /// with `/`; the slash is consumed by the join, so `/u/*name` with
    /// `name = "/x/y"` renders `/u/x/y`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyPathParam`] for a bare `:`,
    /// [`Error::MissingPathParam`] when a variable has no value, and
    /// [`Error::CatchAllSlash`] for a catch-all missing its leading slash.
    pub(crate) fn substitute(&self, values: &HashMap<String, String>) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => {
                    out.push('/');
                    out.push_str(lit);
                }
                Segment::Param(name) => {
                    if name.is_empty() {
                        return Err(Error::EmptyPathParam);
                    }
                    let value = values
                        .get(name)
                        .ok_or_else(|| Error::MissingPathParam(name.clone()))?;
                    out.push('/');
                    out.push_str(&utf8_percent_encode(value, SEGMENT).to_string());
                }
                Segment::CatchAll(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| Error::MissingPathParam(name.clone()))?;
                    let rest = value.strip_prefix('/').ok_or_else(|| Error::CatchAllSlash {
                        name: name.clone(),
                        value: value.clone(),
                    })?;
                    for part in rest.split('/') {
                        out.push('/');
                        out.push_str(&utf8_percent_encode(part, SEGMENT).to_string());
                    }
                }
            }
        }
        if out.is_empty() && self.raw.starts_with('/') {
            out.push('/');
        }
        Ok(out)
    }

    /// Match a concrete path against the template, extracting variables.
    ///
    /// Returns `None` on mismatch. Captured segments are percent-decoded;
    /// a catch-all keeps its leading `/`.
    pub fn match_path(&self, path: &str) -> Option<Vec<PathVar>> {
        let trimmed = path.strip_prefix('/')?;
        let parts: Vec<&str> = trimmed.split('/').collect();
        let mut vars = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let part = parts.get(i)?;
                    vars.push(PathVar::new(name.clone(), decode_segment(part)));
                }
                Segment::CatchAll(name) => {
                    if parts.len() < i + 1 {
                        return None;
                    }
                    let rest: Vec<String> = parts[i..].iter().map(|p| decode_segment(p)).collect();
                    vars.push(PathVar::new(name.clone(), format!("/{}", rest.join("/"))));
                    return Some(vars);
                }
            }
        }
        if parts.len() != self.segments.len() {
            return None;
        }
        Some(vars)
    }
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_and_variables() {
        let t = PathTemplate::parse("/m1/:p/rest/*tail").unwrap();
        assert_eq!(t.variables(), vec!["p", "tail"]);
        assert_eq!(t.as_str(), "/m1/:p/rest/*tail");
    }

    #[test]
    fn test_star_must_be_last() {
        let err = PathTemplate::parse("/u/*name/document").unwrap_err();
        assert_eq!(err.to_string(), "star path parameter is not at end of path");
    }

    #[test]
    fn test_substitute_literal_and_param() {
        let t = PathTemplate::parse("/m1/:p").unwrap();
        let path = t.substitute(&values(&[("p", "foo")])).unwrap();
        assert_eq!(path, "/m1/foo");
    }

    #[test]
    fn test_substitute_escapes_segments() {
        let t = PathTemplate::parse("/u/:name").unwrap();
        let path = t.substitute(&values(&[("name", "some random user")])).unwrap();
        assert_eq!(path, "/u/some%20random%20user");
    }

    #[test]
    fn test_substitute_missing_value() {
        let t = PathTemplate::parse("/u/:username").unwrap();
        let err = t.substitute(&values(&[])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing value for path parameter \"username\""
        );
    }

    #[test]
    fn test_substitute_empty_param() {
        let t = PathTemplate::parse("/u/:").unwrap();
        let err = t.substitute(&values(&[])).unwrap_err();
        assert_eq!(err.to_string(), "empty path parameter");
    }

    #[test]
    fn test_substitute_catch_all() {
        let t = PathTemplate::parse("/u/*name").unwrap();
        let path = t.substitute(&values(&[("name", "/x/y")])).unwrap();
        assert_eq!(path, "/u/x/y");

        let path = t.substitute(&values(&[("name", "/test")])).unwrap();
        assert_eq!(path, "/u/test");
    }

    #[test]
    fn test_substitute_catch_all_requires_leading_slash() {
        let t = PathTemplate::parse("/u/*name").unwrap();
        let err = t.substitute(&values(&[("name", "test")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value \"test\" for path parameter \"*name\" does not start with required /"
        );
    }

    #[test]
    fn test_substitute_preserves_empty_segments() {
        let t = PathTemplate::parse("/m2/foo//").unwrap();
        let path = t.substitute(&HashMap::new()).unwrap();
        assert_eq!(path, "/m2/foo//");
    }

    #[test]
    fn test_match_literal() {
        let t = PathTemplate::parse("/api/health").unwrap();
        assert_eq!(t.match_path("/api/health"), Some(vec![]));
        assert_eq!(t.match_path("/api/healthz"), None);
        assert_eq!(t.match_path("/api"), None);
        assert_eq!(t.match_path("/api/health/x"), None);
    }

    #[test]
    fn test_match_params() {
        let t = PathTemplate::parse("/users/:user_id/posts/:post_id").unwrap();
        let vars = t.match_path("/users/7/posts/99").unwrap();
        assert_eq!(vars[0], PathVar::new("user_id", "7"));
        assert_eq!(vars[1], PathVar::new("post_id", "99"));
    }

    #[test]
    fn test_match_decodes_segments() {
        let t = PathTemplate::parse("/u/:name").unwrap();
        let vars = t.match_path("/u/some%20random%20user").unwrap();
        assert_eq!(vars[0].value, "some random user");
    }

    #[test]
    fn test_match_catch_all_keeps_leading_slash() {
        let t = PathTemplate::parse("/u/*name").unwrap();
        let vars = t.match_path("/u/x/y").unwrap();
        assert_eq!(vars[0], PathVar::new("name", "/x/y"));
    }

    #[test]
    fn test_match_too_few_segments() {
        let t = PathTemplate::parse("/users/:id/posts").unwrap();
        assert_eq!(t.match_path("/users/42"), None);
    }

    #[test]
    fn test_substitute_round_trips_through_match() {
        let t = PathTemplate::parse("/m1/:p").unwrap();
        let path = t.substitute(&values(&[("p", "hello world")])).unwrap();
        let vars = t.match_path(&path).unwrap();
        assert_eq!(vars[0].value, "hello world");
    }
}
