//! URL assembly.
//!
//! [`append_url`] resolves a relative URL template against a base URL:
//! paths are joined with exactly one `/`, the base's query keeps its
//! position ahead of the relative part's query, and the relative part's
//! fragment wins. The result may itself be relative (an empty base is
//! allowed), which is why the assembler works on URL text rather than a
//! parsed absolute-URL type.

use url::Url;

use crate::error::{Error, Result};

/// A URL split into the pieces the assembler manipulates.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct UrlParts {
    /// `scheme://authority`, or empty for relative URLs.
    pub prefix: String,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl UrlParts {
    fn assemble(&self) -> String {
        let mut out = format!("{}{}", self.prefix, self.path);
        if let Some(q) = &self.query {
            out.push('?');
            out.push_str(q);
        }
        if let Some(f) = &self.fragment {
            out.push('#');
            out.push_str(f);
        }
        out
    }
}

/// Split a URL string textually. No validation beyond locating the
/// authority; the caller decides what an authority means for it.
pub(crate) fn split_url(s: &str) -> UrlParts {
    let (rest, fragment) = match s.split_once('#') {
        Some((r, f)) => (r, Some(f.to_string())),
        None => (s, None),
    };
    let (rest, query) = match rest.split_once('?') {
        Some((r, q)) => (r, Some(q.to_string())),
        None => (rest, None),
    };
    let (prefix, path) = match rest.find("://") {
        Some(idx) => {
            let after = &rest[idx + 3..];
            match after.find('/') {
                Some(slash) => (
                    rest[..idx + 3 + slash].to_string(),
                    after[slash..].to_string(),
                ),
                None => (rest.to_string(), String::new()),
            }
        }
        None => (String::new(), rest.to_string()),
    };
    UrlParts {
        prefix,
        path,
        query,
        fragment,
    }
}

fn has_authority(s: &str) -> bool {
    let end = s.find(['?', '#']).unwrap_or(s.len());
    let head = &s[..end];
    head.starts_with("//") || head.contains("://")
}

/// Resolve `rel` against `base` and return the assembled URL text.
///
/// Rules:
///
/// - either part may be empty; an empty base yields a relative result,
/// - `rel` must not name a host,
/// - paths join with exactly one `/` (one trailing and one leading slash
///   collapse); an empty `rel` path leaves the base path unchanged,
/// - the base's query comes first, `rel`'s query is appended verbatim,
///   duplicates preserved,
/// - `rel`'s fragment wins when present.
///
/// # Errors
///
/// [`Error::RelativeUrlWithHost`] when `rel` carries a host, and
/// [`Error::InvalidUrl`] when a non-empty base is neither absolute nor
/// path-relative.
pub fn append_url(base: &str, rel: &str) -> Result<String> {
    if has_authority(rel) {
        return Err(Error::RelativeUrlWithHost);
    }
    if !base.is_empty() && !has_authority(base) && !base.starts_with(['/', '?', '#']) {
        let reason = match Url::parse(base) {
            Err(e) => e.to_string(),
            Ok(_) => "relative URL without a base".to_string(),
        };
        return Err(Error::InvalidUrl {
            url: base.to_string(),
            reason,
        });
    }

    let base = split_url(base);
    let rel = split_url(rel);

    let path = if rel.path.is_empty() {
        base.path
    } else {
        let head = base.path.strip_suffix('/').unwrap_or(&base.path);
        let tail = rel.path.strip_prefix('/').unwrap_or(&rel.path);
        format!("{head}/{tail}")
    };

    let query = match (base.query, rel.query) {
        (Some(b), Some(r)) => Some(format!("{b}&{r}")),
        (q @ Some(_), None) | (None, q @ Some(_)) => q,
        (None, None) => None,
    };

    let assembled = UrlParts {
        prefix: base.prefix,
        path,
        query,
        fragment: rel.fragment.or(base.fragment),
    };
    Ok(assembled.assemble())
}
