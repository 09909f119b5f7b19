#![forbid(unsafe_code)]
//! [`reqcache::Transport`] implemented over [`reqwest::Client`].
//!
//! reqwest's built-in redirect-following hides the intermediate hops, but
//! `RedirectManager::record` needs every 301 in the chain to memoize it. So
//! this transport disables reqwest's automatic redirects and follows the
//! chain itself, building `Response::history` from each hop — grounded in
//! the conversion-function pattern in
//! `examples/matt-phylum-http-cache/http-cache-reqwest/src/lib.rs`
//! (`convert_to_reqwest_response`/`convert_from_reqwest_response`), adapted
//! to this crate's plain `Transport` trait rather than a
//! `reqwest_middleware::Middleware`.

use async_trait::async_trait;
use reqcache::{HistoryEntry, Request, Response, Transport};
use reqwest::redirect::Policy;
use tracing::trace;
use url::Url;

const MAX_REDIRECTS: usize = 20;

/// A [`Transport`] backed by a [`reqwest::Client`] configured to never
/// follow redirects on its own.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing client, forcing its redirect policy off so this
    /// transport can observe and record every hop.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        let client =
            reqwest::Client::builder().redirect(Policy::none()).build().expect("default reqwest client");
        Self { client }
    }
}

fn to_transport_error(err: reqwest::Error) -> reqcache::Error {
    reqcache::Error::Transport(Box::new(err))
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &Request) -> reqcache::Result<Response> {
        let mut url = request.url.clone();
        let mut history = Vec::new();

        loop {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .unwrap_or(reqwest::Method::GET);
            let mut builder = self.client.request(method, url.clone());
            for (name, value) in request.headers.iter() {
                builder = builder.header(name, value);
            }
            if !request.cookies.is_empty() {
                let cookie_header = request
                    .cookies
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                builder = builder.header(reqwest::header::COOKIE, cookie_header);
            }

            let response = builder.send().await.map_err(to_transport_error)?;
            let status = response.status().as_u16();
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            let is_redirect = (301..=308).contains(&status) && status != 304;
            if is_redirect && location.is_some() && history.len() < MAX_REDIRECTS {
                let location = location.unwrap();
                history.push(HistoryEntry { status, url: url.clone(), location: Some(location.clone()) });
                trace!(%status, %location, "following transport-level redirect");
                url = resolve_location(&url, &location)?;
                continue;
            }

            return build_response(status, url, response, history).await;
        }
    }
}

fn resolve_location(base: &Url, location: &str) -> reqcache::Result<Url> {
    match Url::parse(location) {
        Ok(url) => Ok(url),
        Err(_) => base.join(location).map_err(reqcache::Error::from),
    }
}

async fn build_response(
    status: u16,
    url: Url,
    response: reqwest::Response,
    history: Vec<HistoryEntry>,
) -> reqcache::Result<Response> {
    let mut out = Response::new(status, url);
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            out.headers.insert(name.as_str(), value);
        }
    }
    out.history = history;
    out.body = response.bytes().await.map_err(to_transport_error)?.to_vec();
    Ok(out)
}
