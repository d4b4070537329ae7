//! # httpbind
//!
//! Typed, bidirectional binding between Rust records and HTTP requests.
//!
//! A record declares - through the [`Bindable`] trait - how each of its
//! fields maps onto one HTTP location: a `:name` path segment, a query or
//! form parameter, a header, or the JSON body. The same declarations drive
//! everything:
//!
//! - **Marshalling**: [`Client`] turns a record into a request, resolves
//!   the URL template, and decodes the JSON response (or the structured
//!   [`RemoteError`] a server answered with).
//! - **Unmarshalling**: [`unmarshal`] populates a record from an incoming
//!   request plus the router's path variables.
//! - **Handler derivation**: [`Server::handle`] (and friends) adapt user
//!   functions into route handlers - decoding the request record,
//!   encoding results, and mapping errors to HTTP responses - while
//!   [`Server::handlers`] derives a whole handler set from a receiver
//!   value.
//!
//! Binding declarations are compiled into a per-type plan on first use and
//! cached; invalid declarations surface once, with a diagnostic naming the
//! field and tag, and every later operation on the type replays it.
//!
//! The HTTP transport is pluggable: the client executes requests through
//! the [`Doer`] trait and the server-side handlers work against an
//! in-memory [`server::ResponseSink`], so both ends can be exercised
//! without sockets.
//!
//! ## Example
//!
//! ```
//! use http::Method;
//! use httpbind::{marshal, Bindable, Field};
//!
//! #[derive(Default)]
//! struct ListItems {
//!     user: String,
//!     limit: Option<u32>,
//! }
//!
//! impl Bindable for ListItems {
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
//!
//! let record = ListItems {
//!     user: "bob".into(),
//!     limit: Some(50),
//! };
//! let request = marshal("http://example.com/users/:user/items", Method::GET, &record).unwrap();
//! assert_eq!(
//!     request.uri().to_string(),
//!     "http://example.com/users/bob/items?limit=50"
//! );
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod codec;
pub mod error;
pub mod path;
pub mod server;

mod bind;
mod client;
mod context;
mod marshal;
mod plan;
mod tag;
mod unmarshal;
mod urls;

pub use bind::{Bindable, Field};
pub use client::{
    decode_json_response, Client, ClientBuilder, Doer, UnmarshalErrorFn,
    DEFAULT_MAX_ERROR_BODY_SIZE,
};
pub use context::Context;
pub use error::{codes, DecodeResponseError, Error, RemoteError, Result};
pub use marshal::marshal;
pub use path::PathVar;
pub use server::{Handler, HandlerSet, Params, Server};
pub use unmarshal::{unmarshal, IncomingRequest};
pub use urls::append_url;

/// Boxed future type used by handler and executor adapters.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
