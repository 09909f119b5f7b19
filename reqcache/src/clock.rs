//! An injectable time source: cache freshness checks and cookie expiry
//! both read "now" through a [`Clock`] instead of the wall clock directly,
//! so tests can advance time monotonically without sleeping.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

pub trait Clock: std::fmt::Debug + Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real wall clock, used everywhere outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually advanceable clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct TestClock {
    micros_since_epoch: Arc<AtomicU64>,
}

impl TestClock {
    pub fn new() -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_micros() as u64;
        Self { micros_since_epoch: Arc::new(AtomicU64::new(now)) }
    }

    pub fn advance(&self, by: Duration) {
        self.micros_since_epoch.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_micros(self.micros_since_epoch.load(Ordering::SeqCst))
    }
}
