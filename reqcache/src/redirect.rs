//! `RedirectManager`: memoized-301-chain rewrite with cycle detection, and
//! recording 301s observed in a response's `history`.
//!
//! Grounded in `examples/original_source/dogbutler/redirect.py`
//! (`process_request`/`process_response`), carried over unchanged in
//! meaning: chain-follow with a seen-set for cycle detection, record only
//! status-301 hops with a ~10-year TTL.

use std::{collections::HashSet, sync::Arc, time::Duration};

use tracing::{debug, trace};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::store::KeyValueStore;
use crate::Result;

/// ~10 years, matching the original's `DEFAULT_REDIRECT_MAX_AGE`.
const REDIRECT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

/// Rewrites a request's URL through a memoized chain of permanent
/// redirects, and records newly observed 301s.
#[derive(Debug, Clone)]
pub struct RedirectManager {
    store: Option<Arc<dyn KeyValueStore>>,
    prefix: String,
}

impl RedirectManager {
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, prefix: impl Into<String>) -> Self {
        Self { store, prefix: prefix.into() }
    }

    fn cache_key(&self, url: &str) -> String {
        format!("{}.redirect.{url}", self.prefix)
    }

    /// Follows the memoized chain for `request.url` to its final
    /// destination, erroring if it cycles back on itself.
    pub async fn rewrite(&self, request: &mut Request) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };

        let mut url = request.url.to_string();
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(url.clone()) {
                return Err(Error::TooManyRedirects { url });
            }
            let key = self.cache_key(&url);
            match store.get(&key).await? {
                Some(bytes) => {
                    url = String::from_utf8_lossy(&bytes).into_owned();
                }
                None => break,
            }
        }
        if url != request.url.as_str() {
            trace!(from = %request.url, to = %url, "redirect rewrite");
            request.url = url::Url::parse(&url)?;
        }
        Ok(())
    }

    /// Advances `request.url` to the response's final URL and memoizes any
    /// 301 hops in its history.
    pub async fn record(&self, request: &mut Request, response: &Response) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        if response.history.is_empty() {
            return Ok(());
        }
        request.url = response.url.clone();
        for hop in &response.history {
            if hop.status != 301 {
                continue;
            }
            let Some(location) = &hop.location else { continue };
            let key = self.cache_key(hop.url.as_str());
            store.set(&key, location.clone().into_bytes(), REDIRECT_TTL).await?;
            debug!(from = %hop.url, to = location, "redirect memoized");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use crate::clock::TestClock;
    use crate::response::HistoryEntry;
    use crate::store::test_util::TestStore;

    use super::*;

    fn req(url: &str) -> Request {
        Request::new("GET", Url::parse(url).unwrap())
    }

    fn manager() -> RedirectManager {
        let clock = Arc::new(TestClock::new());
        RedirectManager::new(Some(Arc::new(TestStore::new(clock))), "s1")
    }

    #[tokio::test]
    async fn no_record_leaves_url_unchanged() {
        let rm = manager();
        let mut request = req("http://x.com/a");
        rm.rewrite(&mut request).await.unwrap();
        assert_eq!(request.url.as_str(), "http://x.com/a");
    }

    #[tokio::test]
    async fn chain_collapses_to_final_url() {
        let rm = manager();
        let store = rm.store.clone().unwrap();
        store.set(&rm.cache_key("http://x.com/a"), b"http://x.com/b".to_vec(), REDIRECT_TTL).await.unwrap();
        store.set(&rm.cache_key("http://x.com/b"), b"http://x.com/c".to_vec(), REDIRECT_TTL).await.unwrap();
        store.set(&rm.cache_key("http://x.com/c"), b"http://x.com/d".to_vec(), REDIRECT_TTL).await.unwrap();

        let mut request = req("http://x.com/a");
        rm.rewrite(&mut request).await.unwrap();
        assert_eq!(request.url.as_str(), "http://x.com/d");

        let mut request_b = req("http://x.com/b");
        rm.rewrite(&mut request_b).await.unwrap();
        assert_eq!(request_b.url.as_str(), "http://x.com/d");
    }

    #[tokio::test]
    async fn cycle_is_detected() {
        let rm = manager();
        let store = rm.store.clone().unwrap();
        store.set(&rm.cache_key("http://x.com/a"), b"http://x.com/b".to_vec(), REDIRECT_TTL).await.unwrap();
        store.set(&rm.cache_key("http://x.com/b"), b"http://x.com/a".to_vec(), REDIRECT_TTL).await.unwrap();

        let mut request = req("http://x.com/a");
        let err = rm.rewrite(&mut request).await.unwrap_err();
        assert!(matches!(err, Error::TooManyRedirects { .. }));
    }

    #[tokio::test]
    async fn only_301_hops_are_recorded() {
        let rm = manager();
        let mut request = req("http://x.com/a");
        let mut response = Response::new(200, Url::parse("http://x.com/d").unwrap());
        response.history = vec![
            HistoryEntry {
                status: 301,
                url: Url::parse("http://x.com/a").unwrap(),
                location: Some("http://x.com/b".to_owned()),
            },
            HistoryEntry {
                status: 302,
                url: Url::parse("http://x.com/b").unwrap(),
                location: Some("http://x.com/c".to_owned()),
            },
        ];
        rm.record(&mut request, &response).await.unwrap();
        assert_eq!(request.url.as_str(), "http://x.com/d");

        let store = rm.store.clone().unwrap();
        assert!(store.get(&rm.cache_key("http://x.com/a")).await.unwrap().is_some());
        assert!(store.get(&rm.cache_key("http://x.com/b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_store_is_a_no_op() {
        let rm = RedirectManager::new(None, "s1");
        let mut request = req("http://x.com/a");
        rm.rewrite(&mut request).await.unwrap();
        assert_eq!(request.url.as_str(), "http://x.com/a");
    }
}
