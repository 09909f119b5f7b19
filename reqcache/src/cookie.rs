//! `CookieManager`: Set-Cookie ingest with Domain/Path/Expires/
//! Max-Age scoping, and selection of applicable cookies on request inject.
//!
//! Grounded in the shape of `examples/original_source/dogbutler` (no
//! `cookie.py` survived distillation into `original_source/`, so this is
//! built directly from the `TestCookie` scenarios in
//! `examples/original_source/dogbutler/tests/test_api.py`), in the
//! manager idiom demonstrated elsewhere in this crate (`async_trait`, `Arc<dyn KeyValueStore>`,
//! `tracing` at decision points).

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clock::Clock;
use crate::request::Request;
use crate::response::Response;
use crate::store::KeyValueStore;
use crate::Result;

/// A cookie kept "for the life of the session" (no `Expires`/`Max-Age`):
/// physically capped at this TTL in the backing store, since the store has
/// no notion of "no expiry".
const SESSION_COOKIE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CookieRecord {
    name: String,
    value: String,
    domain: String,
    path: String,
    /// `None` means "for the session" (no explicit expiry was given).
    expires_at_millis: Option<u64>,
    /// Monotonically increasing write sequence, for last-written tiebreak
    /// among equally specific candidates.
    written_at_millis: u64,
    is_domain_cookie: bool,
}

impl CookieRecord {
    fn is_expired(&self, now: SystemTime) -> bool {
        match self.expires_at_millis {
            Some(millis) => UNIX_EPOCH + Duration::from_millis(millis) <= now,
            None => false,
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path.trim_end_matches('/').to_owned()
    } else {
        path.to_owned()
    }
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == "/" || cookie_path.is_empty() {
        return true;
    }
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && request_path[cookie_path.len()..].starts_with('/'))
}

fn domain_matches(host: &str, cookie_domain: &str, is_domain_cookie: bool) -> bool {
    let host = host.to_ascii_lowercase();
    let cookie_domain = cookie_domain.to_ascii_lowercase();
    if is_domain_cookie {
        host == cookie_domain || host.ends_with(&format!(".{cookie_domain}"))
    } else {
        host == cookie_domain
    }
}

/// One `name=value; attr=val; attr` definition parsed out of a `Set-Cookie`
/// header. The header is split on commas at the top level — a known
/// ambiguity when `Expires` values themselves contain commas, not
/// addressed here (see DESIGN.md).
struct ParsedCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<i64>,
    expires: Option<SystemTime>,
}

fn parse_set_cookie(header: &str) -> Vec<ParsedCookie> {
    header.split(',').filter_map(parse_one_cookie).collect()
}

fn parse_one_cookie(chunk: &str) -> Option<ParsedCookie> {
    let mut parts = chunk.split(';');
    let first = parts.next()?.trim();
    let mut eq = first.splitn(2, '=');
    let name = eq.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let value = eq.next().unwrap_or("").trim();

    let mut cookie = ParsedCookie {
        name: name.to_owned(),
        value: value.to_owned(),
        domain: None,
        path: None,
        max_age: None,
        expires: None,
    };
    for attr in parts {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let mut kv = attr.splitn(2, '=');
        let key = kv.next().unwrap_or("").trim();
        let val = kv.next().map(str::trim);
        match key.to_ascii_lowercase().as_str() {
            "domain" => cookie.domain = val.filter(|v| !v.is_empty()).map(str::to_owned),
            "path" => cookie.path = val.filter(|v| !v.is_empty()).map(str::to_owned),
            "max-age" => cookie.max_age = val.and_then(|v| v.parse::<i64>().ok()),
            "expires" => cookie.expires = val.and_then(|v| httpdate::parse_http_date(v).ok()),
            _ => {}
        }
    }
    Some(cookie)
}

/// Ingests `Set-Cookie` and selects cookies applicable to a request,
/// scoped by domain/path within one session's key-prefix.
#[derive(Debug, Clone)]
pub struct CookieManager {
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    prefix: String,
}

impl CookieManager {
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, clock: Arc<dyn Clock>, prefix: impl Into<String>) -> Self {
        Self { store, clock, prefix: prefix.into() }
    }

    fn record_key(&self, domain: &str, path: &str, name: &str) -> String {
        format!("{}.cookie.{domain}.{path}.{name}", self.prefix)
    }

    async fn all_records(&self, store: &Arc<dyn KeyValueStore>, host: &str) -> Result<Vec<CookieRecord>> {
        // KeyValueStore has no key-enumeration primitive, so a
        // process-local index of keys-by-host is kept alongside the
        // records themselves, under a fixed index key per host.
        let index_key = format!("{}.cookie-index.{}", self.prefix, host.to_ascii_lowercase());
        let Some(bytes) = store.get(&index_key).await? else { return Ok(Vec::new()) };
        let keys: Vec<String> = bincode::deserialize(&bytes)?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = store.get(&key).await? {
                records.push(bincode::deserialize::<CookieRecord>(&bytes)?);
            }
        }
        Ok(records)
    }

    async fn remember_key(&self, store: &Arc<dyn KeyValueStore>, host: &str, key: &str) -> Result<()> {
        let index_key = format!("{}.cookie-index.{}", self.prefix, host.to_ascii_lowercase());
        let mut keys: Vec<String> = match store.get(&index_key).await? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => Vec::new(),
        };
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_owned());
        }
        store.set(&index_key, bincode::serialize(&keys)?, SESSION_COOKIE_TTL).await?;
        Ok(())
    }

    /// Parses and stores any `Set-Cookie` headers on `response`.
    pub async fn ingest(&self, request: &Request, response: &Response) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let Some(header) = response.headers.get("set-cookie") else { return Ok(()) };

        let host = request.url.host_str().unwrap_or("").to_ascii_lowercase();
        let now = self.clock.now();
        let now_millis = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;

        for parsed in parse_set_cookie(header) {
            let is_domain_cookie = parsed.domain.is_some();
            let domain = parsed.domain.unwrap_or_else(|| host.clone());
            let path = normalize_path(&parsed.path.unwrap_or_else(|| "/".to_owned()));

            let expires_at = match (parsed.max_age, parsed.expires) {
                (Some(secs), _) => Some(now + Duration::from_secs(secs.max(0) as u64)),
                (None, Some(instant)) => Some(instant),
                (None, None) => None,
            };

            let key = self.record_key(&domain, &path, &parsed.name);

            if let Some(expiry) = expires_at {
                if expiry <= now {
                    trace!(name = %parsed.name, "cookie already expired on ingest, deleting");
                    store.delete(&key).await?;
                    continue;
                }
            }
            // Max-Age=0 deletes outright; an empty value with no expiry is
            // still a valid (delete-shaped) overwrite, stored as-is (spec
            // §4.3/§9).
            if parsed.max_age == Some(0) {
                store.delete(&key).await?;
                continue;
            }

            let record = CookieRecord {
                name: parsed.name,
                value: parsed.value,
                domain: domain.clone(),
                path,
                expires_at_millis: expires_at
                    .map(|t| t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64),
                written_at_millis: now_millis,
                is_domain_cookie,
            };
            let ttl = expires_at
                .map(|t| t.duration_since(now).unwrap_or_default())
                .unwrap_or(SESSION_COOKIE_TTL);
            store.set(&key, bincode::serialize(&record)?, ttl).await?;
            self.remember_key(store, &domain, &key).await?;
            // Origin cookies are also scoped for lookup by the exact host,
            // which for a non-domain cookie is the same string as `domain`
            // here, so no extra index entry is required.
        }
        Ok(())
    }

    /// Selects applicable stored cookies and attaches them to `request`.
    pub async fn inject(&self, request: &mut Request) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let host = request.url.host_str().unwrap_or("").to_ascii_lowercase();
        let path = request.url.path();
        let now = self.clock.now();

        // Domain cookies may be filed under any ancestor domain, not just
        // the exact host, so every dotted suffix of `host` is consulted.
        let mut candidates = self.all_records(store, &host).await?;
        let mut suffix = host.as_str();
        while let Some((_, rest)) = suffix.split_once('.') {
            candidates.extend(self.all_records(store, rest).await?);
            suffix = rest;
        }

        let mut selected: std::collections::HashMap<String, (&CookieRecord, usize)> =
            std::collections::HashMap::new();
        for record in &candidates {
            if record.is_expired(now) {
                continue;
            }
            if !domain_matches(&host, &record.domain, record.is_domain_cookie) {
                continue;
            }
            if !path_matches(&record.path, path) {
                continue;
            }
            let specificity = record.path.len() * 2 + if record.is_domain_cookie { 0 } else { 1 };
            match selected.get(&record.name) {
                Some((existing, existing_spec)) => {
                    let more_specific = specificity > *existing_spec
                        || (specificity == *existing_spec
                            && record.written_at_millis >= existing.written_at_millis);
                    if more_specific {
                        selected.insert(record.name.clone(), (record, specificity));
                    }
                }
                None => {
                    selected.insert(record.name.clone(), (record, specificity));
                }
            }
        }

        for (name, (record, _)) in selected {
            // User-supplied cookies always win.
            request.cookies.entry(name).or_insert_with(|| record.value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use crate::clock::TestClock;
    use crate::store::test_util::TestStore;

    use super::*;

    fn req(url: &str) -> Request {
        Request::new("GET", Url::parse(url).unwrap())
    }

    fn resp(url: &str, set_cookie: &str) -> Response {
        let mut r = Response::new(200, Url::parse(url).unwrap());
        r.headers.insert("Set-Cookie", set_cookie);
        r
    }

    fn manager() -> (CookieManager, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let store: Arc<dyn KeyValueStore> = Arc::new(TestStore::new(clock.clone()));
        (CookieManager::new(Some(store), clock.clone(), "s1"), clock)
    }

    #[tokio::test]
    async fn origin_cookie_not_sent_to_other_host() {
        let (cm, _clock) = manager();
        let request = req("http://fruits.com/p");
        let response = resp("http://fruits.com/p", "a=apple; max-age=20");
        cm.ingest(&request, &response).await.unwrap();

        let mut same_host = req("http://fruits.com/q");
        cm.inject(&mut same_host).await.unwrap();
        assert_eq!(same_host.cookies.get("a"), Some(&"apple".to_owned()));

        let mut sub_host = req("http://sub.fruits.com/q");
        cm.inject(&mut sub_host).await.unwrap();
        assert_eq!(sub_host.cookies.get("a"), None);
    }

    #[tokio::test]
    async fn domain_cookie_sent_to_subdomains_not_unrelated_hosts() {
        let (cm, _clock) = manager();
        let request = req("http://mediterranean.fruits.com/p");
        let response = resp(
            "http://mediterranean.fruits.com/p",
            "a=apple; Domain=fruits.com,m=mango; Domain=tropical.fruits.com",
        );
        cm.ingest(&request, &response).await.unwrap();

        let mut tropical = req("http://tropical.fruits.com/q");
        cm.inject(&mut tropical).await.unwrap();
        assert_eq!(tropical.cookies.get("a"), Some(&"apple".to_owned()));
        assert_eq!(tropical.cookies.get("m"), Some(&"mango".to_owned()));

        let mut unrelated = req("http://animals.com/q");
        cm.inject(&mut unrelated).await.unwrap();
        assert!(unrelated.cookies.is_empty());
    }

    #[tokio::test]
    async fn user_supplied_cookie_wins_over_stored() {
        let (cm, _clock) = manager();
        let request = req("http://x.com/p");
        let response = resp("http://x.com/p", "a=apple; max-age=20, b=banana; max-age=20");
        cm.ingest(&request, &response).await.unwrap();

        let mut next = req("http://x.com/p");
        next.cookies.insert("a".to_owned(), "anchovies".to_owned());
        cm.inject(&mut next).await.unwrap();
        assert_eq!(next.cookies.get("a"), Some(&"anchovies".to_owned()));
        assert_eq!(next.cookies.get("b"), Some(&"banana".to_owned()));
    }

    #[tokio::test]
    async fn max_age_zero_deletes_cookie() {
        let (cm, _clock) = manager();
        let request = req("http://x.com/p");
        let response = resp("http://x.com/p", "a=apple; max-age=20");
        cm.ingest(&request, &response).await.unwrap();

        let delete_response = resp("http://x.com/p", "a=; max-age=0");
        cm.ingest(&request, &delete_response).await.unwrap();

        let mut next = req("http://x.com/p");
        cm.inject(&mut next).await.unwrap();
        assert_eq!(next.cookies.get("a"), None);
    }

    #[tokio::test]
    async fn expired_cookie_is_not_injected() {
        let (cm, clock) = manager();
        let request = req("http://x.com/p");
        let response = resp("http://x.com/p", "a=apple; max-age=1");
        cm.ingest(&request, &response).await.unwrap();

        clock.advance(Duration::from_secs(2));
        let mut next = req("http://x.com/p");
        cm.inject(&mut next).await.unwrap();
        assert_eq!(next.cookies.get("a"), None);
    }

    #[tokio::test]
    async fn path_scoped_cookie_only_matches_subpath() {
        let (cm, _clock) = manager();
        let request = req("http://x.com/app/");
        let mut response = Response::new(200, request.url.clone());
        response.headers.insert("Set-Cookie", "a=apple; Path=/app/; max-age=20");
        cm.ingest(&request, &response).await.unwrap();

        let mut under_app = req("http://x.com/app/sub");
        cm.inject(&mut under_app).await.unwrap();
        assert_eq!(under_app.cookies.get("a"), Some(&"apple".to_owned()));

        let mut outside = req("http://x.com/other");
        cm.inject(&mut outside).await.unwrap();
        assert_eq!(outside.cookies.get("a"), None);
    }

    #[tokio::test]
    async fn disabled_store_is_a_no_op() {
        let clock = Arc::new(TestClock::new());
        let cm = CookieManager::new(None, clock, "s1");
        let request = req("http://x.com/p");
        let response = resp("http://x.com/p", "a=apple; max-age=20");
        cm.ingest(&request, &response).await.unwrap();
        let mut next = req("http://x.com/p");
        cm.inject(&mut next).await.unwrap();
        assert!(next.cookies.is_empty());
    }
}
