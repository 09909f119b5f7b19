//! Module-level free functions over a process-wide default [`Session`].
//!
//! `examples/original_source/dogbutler/sessions.py` exposes this as a
//! bare `session()` helper plus top-level `requests`-style functions, all
//! sharing one dynamically-typed default. Rust has no dynamically-typed
//! transport to default to, so the default session here is one-per-
//! concrete-`Transport` type: each monomorphization of [`default_session`]
//! gets its own `OnceLock<Session<T>>`, built from the process-wide
//! default stores (`defaults.rs`) the first time it's used for that `T`.
//! Recorded as an open design question in DESIGN.md.

use std::sync::OnceLock;

use url::Url;

use crate::defaults::{get_default_cache_store, get_default_cookie_store, get_default_redirect_store};
use crate::response::Response;
use crate::session::{RequestOpts, Session, SessionBuilder, Transport};
use crate::Result;

fn default_session<T: Transport + Default + 'static>() -> &'static Session<T> {
    static CELL: OnceLock<Box<dyn std::any::Any + Send + Sync>> = OnceLock::new();
    let cell = CELL.get_or_init(|| {
        let mut builder = SessionBuilder::new(T::default());
        if let Some(store) = get_default_cache_store() {
            builder = builder.cache_store(store);
        }
        if let Some(store) = get_default_cookie_store() {
            builder = builder.cookie_store(store);
        }
        if let Some(store) = get_default_redirect_store() {
            builder = builder.redirect_store(store);
        }
        Box::new(builder.build())
    });
    cell.downcast_ref::<Session<T>>().expect("one default session per Transport type")
}

pub async fn request<T: Transport + Default + 'static>(
    method: &str,
    url: Url,
    opts: RequestOpts<'_>,
) -> Result<Response> {
    default_session::<T>().request(method, url, opts).await
}

pub async fn get<T: Transport + Default + 'static>(url: Url, opts: RequestOpts<'_>) -> Result<Response> {
    default_session::<T>().get(url, opts).await
}

pub async fn head<T: Transport + Default + 'static>(url: Url, opts: RequestOpts<'_>) -> Result<Response> {
    default_session::<T>().head(url, opts).await
}

pub async fn post<T: Transport + Default + 'static>(url: Url, opts: RequestOpts<'_>) -> Result<Response> {
    default_session::<T>().post(url, opts).await
}

pub async fn put<T: Transport + Default + 'static>(url: Url, opts: RequestOpts<'_>) -> Result<Response> {
    default_session::<T>().put(url, opts).await
}

pub async fn patch<T: Transport + Default + 'static>(url: Url, opts: RequestOpts<'_>) -> Result<Response> {
    default_session::<T>().patch(url, opts).await
}

pub async fn delete<T: Transport + Default + 'static>(url: Url, opts: RequestOpts<'_>) -> Result<Response> {
    default_session::<T>().delete(url, opts).await
}

pub async fn options<T: Transport + Default + 'static>(url: Url, opts: RequestOpts<'_>) -> Result<Response> {
    default_session::<T>().options(url, opts).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::request::Request;

    use super::*;

    #[derive(Debug, Default)]
    struct CountingTransport {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn execute(&self, request: &Request) -> Result<Response> {
            *self.calls.lock().unwrap() += 1;
            Ok(Response::new(200, request.url.clone()))
        }
    }

    #[tokio::test]
    async fn free_functions_reach_the_transport_through_the_default_session() {
        let url = Url::parse("http://example.test/").unwrap();
        let response = get::<CountingTransport>(url, RequestOpts::default()).await.unwrap();
        assert_eq!(response.status, 200);
    }
}
