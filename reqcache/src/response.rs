use serde::{Deserialize, Serialize};
use url::Url;

use crate::headers::HeaderMap;

/// One entry in a response's redirect `history`: the status and URL of an
/// intermediate hop, plus its `Location` header so `RedirectManager::record`
/// can memoize 301s without re-parsing headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: u16,
    pub url: Url,
    pub location: Option<String>,
}

/// An immutable response snapshot. `url` is the final URL after
/// any transport-level redirects; `history` lists the intermediate hops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: HeaderMap,
    pub url: Url,
    pub history: Vec<HistoryEntry>,
}

impl Response {
    pub fn new(status: u16, url: Url) -> Self {
        Self { status, body: Vec::new(), headers: HeaderMap::new(), url, history: Vec::new() }
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}
