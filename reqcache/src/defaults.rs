//! Process-wide default store configuration: three independently-settable
//! [`KeyValueStore`] handles — one per manager — each either enabled or an
//! explicit "disabled" sentinel.
//!
//! Grounded in `examples/original_source/dogbutler/sessions.py`'s use of
//! `get_default_cache()`/`get_default_cookie_cache()`/
//! `get_default_redirect_cache()` (imported from a `defaults` module not
//! retained in full by the distillation) — here a `OnceLock<Mutex<StoreHandle>>`
//! per manager, since `OnceLock` alone cannot be re-set after first use and
//! these setters are meant to be callable more than once (e.g. by test
//! harnesses).

use std::sync::{Arc, Mutex, OnceLock};

use crate::store::{KeyValueStore, MemoryStore};

/// A process-wide default store slot: either a concrete store, or the
/// explicit "disabled" sentinel under which the owning manager becomes a
/// no-op.
#[derive(Clone)]
pub enum StoreHandle {
    Enabled(Arc<dyn KeyValueStore>),
    Disabled,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled(_) => f.write_str("StoreHandle::Enabled"),
            Self::Disabled => f.write_str("StoreHandle::Disabled"),
        }
    }
}

impl StoreHandle {
    fn as_option(&self) -> Option<Arc<dyn KeyValueStore>> {
        match self {
            Self::Enabled(store) => Some(store.clone()),
            Self::Disabled => None,
        }
    }
}

fn cache_slot() -> &'static Mutex<StoreHandle> {
    static SLOT: OnceLock<Mutex<StoreHandle>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(StoreHandle::Enabled(Arc::new(MemoryStore::new()))))
}

fn cookie_slot() -> &'static Mutex<StoreHandle> {
    static SLOT: OnceLock<Mutex<StoreHandle>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(StoreHandle::Enabled(Arc::new(MemoryStore::new()))))
}

fn redirect_slot() -> &'static Mutex<StoreHandle> {
    static SLOT: OnceLock<Mutex<StoreHandle>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(StoreHandle::Enabled(Arc::new(MemoryStore::new()))))
}

pub fn get_default_cache_store() -> Option<Arc<dyn KeyValueStore>> {
    cache_slot().lock().unwrap().as_option()
}

pub fn set_default_cache_store(handle: StoreHandle) {
    *cache_slot().lock().unwrap() = handle;
}

pub fn get_default_cookie_store() -> Option<Arc<dyn KeyValueStore>> {
    cookie_slot().lock().unwrap().as_option()
}

pub fn set_default_cookie_store(handle: StoreHandle) {
    *cookie_slot().lock().unwrap() = handle;
}

pub fn get_default_redirect_store() -> Option<Arc<dyn KeyValueStore>> {
    redirect_slot().lock().unwrap().as_option()
}

pub fn set_default_redirect_store(handle: StoreHandle) {
    *redirect_slot().lock().unwrap() = handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_a_default_store_clears_it() {
        set_default_cookie_store(StoreHandle::Disabled);
        assert!(get_default_cookie_store().is_none());
        set_default_cookie_store(StoreHandle::Enabled(Arc::new(MemoryStore::new())));
        assert!(get_default_cookie_store().is_some());
    }
}
