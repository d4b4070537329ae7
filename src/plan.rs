//! Binding plans.
//!
//! A plan is the compiled form of a record type's declarations: tags parsed,
//! cross-field rules checked, route validated against the declared path
//! fields. Marshal, unmarshal, and handler synthesis all run off the same
//! plan, so every operation on a given type agrees about the wire layout.
//!
//! Plans are built on first use and cached by `TypeId`. The cache is
//! shared process-wide; each entry is built at most once, concurrent
//! builders coalesce on the entry's `OnceLock`, and published plans are
//! immutable. A failed build is cached too - every later use of the type
//! replays the same diagnostic instead of rebuilding.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use http::Method;
use parking_lot::RwLock;

use crate::bind::{Bindable, DecodeFn, EncodeFn, Shape};
use crate::error::{Error, Result};
use crate::path::PathTemplate;
use crate::tag::{self, Location};

/// A validated route: method plus optional path template.
pub(crate) struct Route {
    pub method: Method,
    pub template: Option<PathTemplate>,
}

/// One compiled field binding.
pub(crate) struct Binding<T> {
    /// Rust field name, for diagnostics.
    pub field: &'static str,
    /// Wire name (defaults to the field name).
    pub name: String,
    pub location: Location,
    pub omitempty: bool,
    pub inbody: bool,
    pub shape: Shape,
    pub encode: EncodeFn<T>,
    pub decode: Option<DecodeFn<T>>,
}

/// The compiled binding plan for a record type.
pub(crate) struct Plan<T> {
    pub route: Option<Route>,
    pub bindings: Vec<Binding<T>>,
    pub has_inbody: bool,
}

impl<T> std::fmt::Debug for Plan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("has_inbody", &self.has_inbody)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl<T> Plan<T> {
    /// Check that every field can be decoded, which unmarshalling and
    /// handler synthesis require. Encode-only (display) fields fail here.
    pub(crate) fn require_decodable(&self) -> Result<()> {
        for binding in &self.bindings {
            if binding.decode.is_none() {
                return Err(Error::BadType {
                    type_name: type_name::<T>(),
                    message: format!(
                        "field {} is encode-only and cannot be unmarshalled",
                        binding.field
                    ),
                });
            }
        }
        Ok(())
    }

    /// The route's path template, if the record declares one.
    pub(crate) fn template(&self) -> Option<&PathTemplate> {
        self.route.as_ref().and_then(|r| r.template.as_ref())
    }
}

/// A cloneable plan-build failure, replayed on every use of the type.
#[derive(Debug, Clone)]
pub(crate) struct PlanError {
    type_name: &'static str,
    message: String,
}

impl From<PlanError> for Error {
    fn from(err: PlanError) -> Self {
        Error::BadType {
            type_name: err.type_name,
            message: err.message,
        }
    }
}

type PlanResult<T> = std::result::Result<Arc<Plan<T>>, PlanError>;

static CACHE: OnceLock<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> = OnceLock::new();

fn cell_for<T: Bindable>() -> Arc<OnceLock<PlanResult<T>>> {
    let cache = CACHE.get_or_init(|| RwLock::new(HashMap::new()));
    if let Some(entry) = cache.read().get(&TypeId::of::<T>()) {
        if let Ok(cell) = entry.clone().downcast::<OnceLock<PlanResult<T>>>() {
            return cell;
        }
    }
    let mut cache = cache.write();
    let entry = cache
        .entry(TypeId::of::<T>())
        .or_insert_with(|| Arc::new(OnceLock::<PlanResult<T>>::new()))
        .clone();
    entry
        .downcast::<OnceLock<PlanResult<T>>>()
        .unwrap_or_else(|_| Arc::new(OnceLock::new()))
}

/// The cached plan for `T`, building it on first use.
pub(crate) fn plan_for<T: Bindable>() -> Result<Arc<Plan<T>>> {
    let cell = cell_for::<T>();
    match cell.get_or_init(|| build::<T>().map(Arc::new)) {
        Ok(plan) => Ok(plan.clone()),
        Err(err) => Err(err.clone().into()),
    }
}

fn build<T: Bindable>() -> std::result::Result<Plan<T>, PlanError> {
    let fail = |message: String| PlanError {
        type_name: type_name::<T>(),
        message,
    };

    let route = match T::route() {
        None => None,
        Some(tag_text) => {
            let parsed = tag::parse_route_tag(tag_text)
                .map_err(|reason| fail(format!("bad route tag {tag_text:?}: {reason}")))?;
            let template = match parsed.path {
                None => None,
                Some(path) => Some(
                    PathTemplate::parse(&path)
                        .map_err(|e| fail(format!("bad route tag {tag_text:?}: {e}")))?,
                ),
            };
            Some(Route {
                method: parsed.method,
                template,
            })
        }
    };

    let mut bindings = Vec::new();
    let mut has_body = false;
    let mut has_inbody = false;
    for field in T::fields() {
        let parsed = tag::parse_field_tag(field.tag).map_err(|reason| {
            fail(format!(
                "bad tag {:?} in field {}: {}",
                field.tag, field.name, reason
            ))
        })?;

        match (parsed.location, field.shape) {
            (Location::Path, Shape::Repeated) => {
                return Err(fail(format!(
                    "invalid target type for path parameter in field {}",
                    field.name
                )));
            }
            (Location::Body, shape) if shape != Shape::Json => {
                return Err(fail(format!(
                    "field {} at body location must use a json codec",
                    field.name
                )));
            }
            (location, Shape::Json) if location != Location::Body => {
                return Err(fail(format!(
                    "json field {} must use the body location",
                    field.name
                )));
            }
            _ => {}
        }

        if parsed.location == Location::Body {
            if has_body {
                return Err(fail("more than one body field specified".to_string()));
            }
            has_body = true;
        }
        if parsed.inbody {
            has_inbody = true;
        }

        bindings.push(Binding {
            field: field.name,
            name: parsed
                .name
                .unwrap_or_else(|| field.name.to_string()),
            location: parsed.location,
            omitempty: parsed.omitempty,
            inbody: parsed.inbody,
            shape: field.shape,
            encode: field.encode,
            decode: field.decode,
        });
    }

    if has_body && has_inbody {
        return Err(fail(
            "cannot specify inbody field with a body field".to_string(),
        ));
    }

    // A declared template and the path fields must agree exactly.
    if let Some(Route {
        template: Some(template),
        ..
    }) = &route
    {
        let variables = template.variables();
        for variable in &variables {
            let bound = bindings
                .iter()
                .any(|b| b.location == Location::Path && b.name == *variable);
            if !bound {
                return Err(fail(format!(
                    "path parameter {variable:?} is not bound by any field"
                )));
            }
        }
        for binding in bindings.iter().filter(|b| b.location == Location::Path) {
            if !variables.iter().any(|v| *v == binding.name) {
                return Err(fail(format!(
                    "field {} has no path parameter {:?} in route",
                    binding.field, binding.name
                )));
            }
        }
    }

    Ok(Plan {
        route,
        bindings,
        has_inbody,
    })
}
