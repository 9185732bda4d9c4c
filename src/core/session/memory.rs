//! In-memory metadata session for testing.

use super::{Credentials, LookupQuery, MetadataSession, RawFileRecord};
use crate::error::SessionError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters describing how a session was used.
///
/// Shared through an `Arc` so tests can inspect a session after the
/// pipeline has taken ownership of it.
#[derive(Debug, Default)]
pub struct SessionActivity {
    pub connects: AtomicUsize,
    pub lookups: AtomicUsize,
    pub logouts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SessionActivity {
    /// Highest number of lookups observed running at the same time
    pub fn max_concurrent_lookups(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Session answering from a fixed table of records
///
/// Records are keyed by `(size, hash)`; the hash is compared
/// case-insensitively.
pub struct InMemorySession {
    records: HashMap<(u64, String), RawFileRecord>,
    failing: HashSet<(u64, String)>,
    activity: Arc<SessionActivity>,
    username: Option<String>,
    reject_login: bool,
    lookup_delay: Option<Duration>,
    connected: bool,
}

impl InMemorySession {
    /// Create an empty session that accepts any login
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            failing: HashSet::new(),
            activity: Arc::new(SessionActivity::default()),
            username: None,
            reject_login: false,
            lookup_delay: None,
            connected: false,
        }
    }

    /// Register a record for `(size, hash)`
    pub fn with_record(mut self, size: u64, hash: &str, record: RawFileRecord) -> Self {
        self.records.insert((size, hash.to_lowercase()), record);
        self
    }

    /// Answer lookups for `(size, hash)` with a 600 server error
    pub fn failing_lookup_for(mut self, size: u64, hash: &str) -> Self {
        self.failing.insert((size, hash.to_lowercase()));
        self
    }

    /// Fail every login with a 500 response
    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Sleep during each lookup, to widen race windows in tests
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    /// Shared usage counters
    pub fn activity(&self) -> Arc<SessionActivity> {
        Arc::clone(&self.activity)
    }

    /// User name of the last successful login
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSession for InMemorySession {
    fn connect(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        self.activity.connects.fetch_add(1, Ordering::SeqCst);
        if self.reject_login {
            return Err(SessionError::Auth {
                code: 500,
                message: "LOGIN FAILED".to_string(),
            });
        }
        self.username = Some(credentials.username.clone());
        self.connected = true;
        Ok(())
    }

    fn lookup(&mut self, query: &LookupQuery<'_>) -> Result<Option<RawFileRecord>, SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }

        let running = self.activity.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.activity.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.activity.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.lookup_delay {
            std::thread::sleep(delay);
        }

        let key = (query.size, query.hash.to_lowercase());
        let outcome = if self.failing.contains(&key) {
            Err(SessionError::Protocol {
                code: 600,
                message: "INTERNAL SERVER ERROR".to_string(),
            })
        } else {
            Ok(self.records.get(&key).cloned())
        };

        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn logout(&mut self) -> Result<(), SessionError> {
        self.activity.logouts.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        Ok(())
    }
}
