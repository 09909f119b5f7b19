#![forbid(unsafe_code)]
#![deny(future_incompatible, nonstandard_style)]
//! Client-side HTTP session middleware: a response cache with conditional
//! revalidation, a cookie jar with domain/path scoping, and a
//! redirect-memoizing layer, composed around a generic [`Transport`].
//!
//! Three managers, one pipeline, per-session key isolation on a shared
//! [`KeyValueStore`]:
//!
//! - [`cache::CacheManager`] serves fresh responses and runs the 304-merge
//!   protocol.
//! - [`cookie::CookieManager`] selects and ingests cookies.
//! - [`redirect::RedirectManager`] short-circuits memoized 301 chains.
//!
//! [`session::Session`] composes the three around one [`Transport`] call
//! per the control flow documented on [`session::Session::request`].

mod api;
mod cache;
mod clock;
mod cookie;
mod defaults;
mod error;
mod headers;
mod keys;
mod redirect;
mod request;
mod response;
mod session;
mod store;

pub use api::{delete, get, head, options, patch, post, put, request};
pub use clock::{Clock, SystemClock, TestClock};
pub use defaults::{
    get_default_cache_store, get_default_cookie_store, get_default_redirect_store,
    set_default_cache_store, set_default_cookie_store, set_default_redirect_store, StoreHandle,
};
pub use error::{Error, Result};
pub use headers::HeaderMap;
pub use request::Request;
pub use response::{HistoryEntry, Response};
pub use session::{RequestOpts, ResponseSink, Session, SessionBuilder, Transport};
pub use store::{KeyValueStore, MemoryStore};

#[cfg(feature = "test-util")]
pub use store::test_util::TestStore;
