//! `CacheManager`: two-phase VaryIndex lookup, Cache-Control parsing,
//! conditional-header synthesis, and the 304-merge protocol.
//!
//! Grounded in `HttpCache::before_request`/`after_remote_fetch` staging
//! (`examples/matt-phylum-http-cache/http-cache/src/lib.rs`), but this
//! crate computes its own simplified freshness/storability policy rather
//! than delegating to `http-cache-semantics`'s full RFC 7234 engine
//! (dropped dependency — see DESIGN.md).
//!
//! A note on freshness vs. physical storage: `CacheEntry` carries both
//! `stored_at` and `ttl_seconds` as distinct concepts. Freshness is
//! `stored_at + ttl_seconds > now`, checked against the injected [`Clock`].
//! The underlying [`KeyValueStore`] entry is kept alive somewhat longer than
//! that — see [`REVALIDATION_GRACE`] — purely so a stale entry's validators
//! remain available to synthesize a conditional request; once the grace
//! window also elapses the entry is gone and the next request is a plain,
//! unconditional miss (see DESIGN.md).

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::headers::HeaderMap;
use crate::keys::{base_key, content_key, split_header_list};
use crate::request::Request;
use crate::response::Response;
use crate::store::KeyValueStore;
use crate::Result;

/// Headers meaningful only for a single transport hop. Stripped
/// from stored responses, hence absent on cache hits and present on misses.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// How much longer than its freshness `ttl_seconds` a stale entry's
/// validators stay retrievable in the backing store, to support conditional
/// revalidation after the entry has gone stale.
pub const REVALIDATION_GRACE: Duration = Duration::from_secs(300);

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn millis_since_epoch(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug, Clone, Default)]
struct Validators {
    etag: Option<String>,
    last_modified: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    response: Response,
    stored_at_millis: u64,
    ttl_seconds: u64,
    varying_header_names: Vec<String>,
    etag: Option<String>,
    last_modified: Option<String>,
}

impl CacheEntry {
    fn validators(&self) -> Validators {
        Validators { etag: self.etag.clone(), last_modified: self.last_modified.clone() }
    }

    fn is_fresh(&self, now: SystemTime) -> bool {
        let stored_at = UNIX_EPOCH + Duration::from_millis(self.stored_at_millis);
        match stored_at.checked_add(Duration::from_secs(self.ttl_seconds)) {
            Some(expiry) => expiry > now,
            None => true,
        }
    }
}

/// Parsed `Cache-Control` directives relevant to this spec (max-age, and
/// bare-or-parameterized no-cache). Anything else is ignored.
#[derive(Debug, Default, Clone, Copy)]
struct CacheControl {
    max_age: Option<u64>,
    no_cache: bool,
}

fn parse_cache_control(value: &str) -> CacheControl {
    let mut cc = CacheControl::default();
    for token in value.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let mut parts = token.splitn(2, '=');
        let directive = parts.next().unwrap_or("").trim();
        let arg = parts.next().map(str::trim);
        match directive.to_ascii_lowercase().as_str() {
            // Bare "no-cache" and parameterized "no-cache=field" both
            // disable storage.
            "no-cache" => cc.no_cache = true,
            "max-age" => {
                if let Some(n) = arg.and_then(|a| a.parse::<u64>().ok()) {
                    cc.max_age = Some(n);
                }
            }
            _ => {}
        }
    }
    cc
}

fn request_has_no_cache(request: &Request) -> bool {
    request
        .headers
        .get("cache-control")
        .map(|v| parse_cache_control(v).no_cache)
        .unwrap_or(false)
}

/// Serves fresh cached responses, injects conditional headers, and merges
/// 304 revalidations back into the cache. Keys are scoped under `prefix` so
/// unrelated sessions sharing one backing store never see each other's
/// entries, the same isolation `CookieManager`/`RedirectManager` apply.
#[derive(Debug, Clone)]
pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
}

impl CacheManager {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, prefix: impl Into<String>) -> Self {
        Self { store, clock, prefix: prefix.into() }
    }

    fn cache_key(&self, base: &str) -> String {
        format!("{}.cache.{base}", self.prefix)
    }

    fn vary_key(&self, base: &str) -> String {
        format!("{}.cache.vary.{base}", self.prefix)
    }

    /// Looks up a fresh or revalidatable cached response for `request`.
    pub async fn lookup(&self, request: &mut Request) -> Result<Option<Response>> {
        if !request.is_get() {
            request.update_cache_allowed = false;
            return Ok(None);
        }
        if request_has_no_cache(request) {
            trace!(url = %request.url, "cache lookup skipped: request sent no-cache");
            request.update_cache_allowed = true;
            return Ok(None);
        }
        request.update_cache_allowed = true;

        let base = base_key("GET", &request.url);
        let entry = match self.read_entry(&base, &request.headers).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(err) => {
                trace!(url = %request.url, %err, "cache read failed, treating as miss");
                return Ok(None);
            }
        };

        let now = self.clock.now();
        if entry.is_fresh(now) {
            debug!(url = %request.url, "cache hit");
            let mut response = entry.response.clone();
            strip_hop_by_hop(&mut response.headers);
            return Ok(Some(response));
        }

        trace!(url = %request.url, "cache entry stale: synthesizing conditionals");
        self.synthesize_conditionals(request, &entry.validators());
        Ok(None)
    }

    /// Reads the entry for `base` via the two-phase VaryIndex lookup.
    async fn read_entry(&self, base: &str, headers: &HeaderMap) -> Result<Option<CacheEntry>> {
        let content = self.resolve_content_key(base, headers).await?;
        match self.store.get(&content).await? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn resolve_content_key(&self, base: &str, headers: &HeaderMap) -> Result<String> {
        match self.store.get(&self.vary_key(base)).await? {
            Some(bytes) => {
                let vary_names: Vec<String> = bincode::deserialize(&bytes)?;
                Ok(content_key(&self.cache_key(base), &vary_names, headers))
            }
            None => Ok(self.cache_key(base)),
        }
    }

    /// Reads whatever entry currently triggers a conditional for this
    /// request (used by the 304-merge protocol, which needs the
    /// pre-conditional entry back by its content key).
    async fn read_entry_for_request(&self, request: &Request) -> Result<Option<(String, CacheEntry)>> {
        let base = base_key("GET", &request.url);
        let content = self.resolve_content_key(&base, &request.headers).await?;
        match self.store.get(&content).await? {
            Some(bytes) => Ok(Some((content, bincode::deserialize(&bytes)?))),
            None => Ok(None),
        }
    }

    fn synthesize_conditionals(&self, request: &mut Request, validators: &Validators) {
        if let Some(etag) = &validators.etag {
            request.headers.insert_if_absent("If-None-Match", etag.clone());
        }
        if let Some(last_modified) = &validators.last_modified {
            request.headers.insert_if_absent("If-Modified-Since", last_modified.clone());
        }
    }

    /// Stores a cacheable response for `request`, gated on Cache-Control.
    /// A failure to write through to the backing store is logged and
    /// swallowed: a successful HTTP exchange must not fail just because
    /// caching it did.
    pub async fn store(&self, request: &Request, response: &Response) -> Result<()> {
        if !request.is_get() {
            return Ok(());
        }
        let Some(cc) = response.headers.get("cache-control").map(parse_cache_control) else {
            trace!(url = %request.url, "not cacheable: no Cache-Control header");
            return Ok(());
        };
        if cc.no_cache {
            trace!(url = %request.url, "not cacheable: no-cache directive present");
            return Ok(());
        }
        let Some(max_age) = cc.max_age.filter(|n| *n > 0) else {
            trace!(url = %request.url, "not cacheable: max-age absent or zero");
            return Ok(());
        };

        let mut stored = response.clone();
        strip_hop_by_hop(&mut stored.headers);

        let base = base_key("GET", &request.url);
        let physical_ttl = Duration::from_secs(max_age) + REVALIDATION_GRACE;

        let vary_names = match stored.headers.get("vary") {
            Some(v) => split_header_list(v),
            None => {
                if let Err(err) = self.store.delete(&self.vary_key(&base)).await {
                    trace!(url = %request.url, %err, "cache store failed: could not clear vary index");
                }
                Vec::new()
            }
        };

        let content = if vary_names.is_empty() {
            self.cache_key(&base)
        } else {
            let vary_bytes = match bincode::serialize(&vary_names) {
                Ok(bytes) => bytes,
                Err(err) => {
                    trace!(url = %request.url, %err, "cache store failed: vary index encoding");
                    return Ok(());
                }
            };
            if let Err(err) = self.store.set(&self.vary_key(&base), vary_bytes, physical_ttl).await {
                trace!(url = %request.url, %err, "cache store failed: could not write vary index");
            }
            content_key(&self.cache_key(&base), &vary_names, &request.headers)
        };

        let entry = CacheEntry {
            response: stored,
            stored_at_millis: millis_since_epoch(self.clock.now()),
            ttl_seconds: max_age,
            varying_header_names: vary_names,
            etag: response.headers.get("etag").map(str::to_owned),
            last_modified: response.headers.get("last-modified").map(str::to_owned),
        };
        let entry_bytes = match bincode::serialize(&entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                trace!(url = %request.url, %err, "cache store failed: entry encoding");
                return Ok(());
            }
        };
        match self.store.set(&content, entry_bytes, physical_ttl).await {
            Ok(()) => debug!(url = %request.url, max_age, "response stored in cache"),
            Err(err) => trace!(url = %request.url, %err, "cache store failed: could not write entry"),
        }
        Ok(())
    }

    /// Layers a fresh 304's headers over the cached body. Returns the
    /// merged response to hand
    /// back to the caller, or `None` if no cached entry could be found (the
    /// pipeline must then strip the conditionals it injected and retry
    /// unconditionally).
    pub async fn merge_304(&self, request: &Request, fresh_304: &Response) -> Result<Option<Response>> {
        let (content_key, mut entry) = match self.read_entry_for_request(request).await {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(None),
            Err(err) => {
                trace!(url = %request.url, %err, "304 merge failed: could not read cached entry");
                return Ok(None);
            }
        };

        let mut merged_headers = entry.response.headers.clone();
        for (name, value) in fresh_304.headers.iter() {
            merged_headers.insert(name.to_owned(), value.to_owned());
        }

        let mut merged = entry.response.clone();
        merged.status = 304;
        merged.headers = merged_headers;

        let new_ttl = merged
            .headers
            .get("cache-control")
            .map(parse_cache_control)
            .and_then(|cc| cc.max_age)
            .unwrap_or(entry.ttl_seconds);

        entry.response = merged.clone();
        entry.stored_at_millis = millis_since_epoch(self.clock.now());
        entry.ttl_seconds = new_ttl;
        entry.etag = merged.headers.get("etag").map(str::to_owned).or(entry.etag);
        entry.last_modified =
            merged.headers.get("last-modified").map(str::to_owned).or(entry.last_modified);

        let physical_ttl = Duration::from_secs(new_ttl) + REVALIDATION_GRACE;
        match bincode::serialize(&entry) {
            Ok(bytes) => match self.store.set(&content_key, bytes, physical_ttl).await {
                Ok(()) => debug!(url = %request.url, new_ttl, "304 merged into cache entry"),
                Err(err) => trace!(url = %request.url, %err, "304 merge failed: could not persist entry"),
            },
            Err(err) => trace!(url = %request.url, %err, "304 merge failed: entry encoding"),
        }
        Ok(Some(merged))
    }
}

/// Headers the pipeline injected as conditionals and must strip before an
/// unconditional retry, unless the *user* supplied the same header — the
/// 304-merge fallback for when no cached entry could be found.
pub fn strip_injected_conditionals(request: &mut Request, user_supplied: &HeaderMap) {
    for name in ["If-None-Match", "If-Modified-Since"] {
        if !user_supplied.contains(name) {
            request.headers.remove(name);
        }
    }
}
