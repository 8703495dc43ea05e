//! Reconnection bookkeeping for persistent outbound links.
//!
//! A node remembers every address it dialled with auto-reconnect. Each poll
//! of the monitor compares those entries with the live outbound set: a
//! present link resets the entry's trial count, a missing one increments it
//! and, once the backoff delay has passed, schedules a redial.

use std::time::{Duration, Instant};

/// Backoff schedule for redialling lost peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first redial after a failure.
    pub base_delay: Duration,
    /// Upper bound on the delay between redials.
    pub max_delay: Duration,
    /// Drop the entry once its trial count exceeds this. `None` never gives up.
    pub max_trials: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_trials: None,
        }
    }
}

impl ReconnectPolicy {
    /// Redial on every poll with no delay and no cap.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_trials: None,
        }
    }

    /// Delay after `failures` consecutive failed redials.
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// One remembered address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectEntry {
    pub host: String,
    pub port: u16,
    /// Consecutive polls that found no outbound link to this address.
    pub trials: u32,
    failures: u32,
    not_before: Option<Instant>,
}

impl ReconnectEntry {
    fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            trials: 0,
            failures: 0,
            not_before: None,
        }
    }

    fn matches(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }
}

/// What a poll decided for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Redial this address.
    Attempt { host: String, port: u16, trials: u32 },
    /// The trial cap was exceeded; the entry has been removed.
    GiveUp { host: String, port: u16, trials: u32 },
}

/// The set of remembered addresses, at most one entry per host:port.
#[derive(Debug, Default)]
pub struct ReconnectRegistry {
    policy: ReconnectPolicy,
    entries: Vec<ReconnectEntry>,
}

impl ReconnectRegistry {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            entries: Vec::new(),
        }
    }

    /// Remember an address. Returns false if it was already registered.
    pub fn register(&mut self, host: &str, port: u16) -> bool {
        if self.entries.iter().any(|e| e.matches(host, port)) {
            return false;
        }
        self.entries.push(ReconnectEntry::new(host.to_owned(), port));
        true
    }

    /// Forget an address.
    pub fn remove(&mut self, host: &str, port: u16) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !e.matches(host, port));
        self.entries.len() != before
    }

    pub fn entries(&self) -> &[ReconnectEntry] {
        &self.entries
    }

    pub fn get(&self, host: &str, port: u16) -> Option<&ReconnectEntry> {
        self.entries.iter().find(|e| e.matches(host, port))
    }

    /// Run one monitor cycle.
    ///
    /// `is_connected` reports whether an outbound link to host:port exists.
    pub fn poll(
        &mut self,
        now: Instant,
        is_connected: impl Fn(&str, u16) -> bool,
    ) -> Vec<ReconnectAction> {
        let mut actions = Vec::new();
        let max_trials = self.policy.max_trials;

        self.entries.retain_mut(|entry| {
            if is_connected(&entry.host, entry.port) {
                entry.trials = 0;
                entry.failures = 0;
                entry.not_before = None;
                return true;
            }

            entry.trials = entry.trials.saturating_add(1);

            if max_trials.is_some_and(|max| entry.trials > max) {
                actions.push(ReconnectAction::GiveUp {
                    host: entry.host.clone(),
                    port: entry.port,
                    trials: entry.trials,
                });
                return false;
            }

            if entry.not_before.map_or(true, |at| now >= at) {
                actions.push(ReconnectAction::Attempt {
                    host: entry.host.clone(),
                    port: entry.port,
                    trials: entry.trials,
                });
            }
            true
        });

        actions
    }

    /// A redial succeeded: clear the entry's counters.
    pub fn record_success(&mut self, host: &str, port: u16) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.matches(host, port)) {
            entry.trials = 0;
            entry.failures = 0;
            entry.not_before = None;
        }
    }

    /// A redial failed: hold off the next one per the policy.
    pub fn record_failure(&mut self, host: &str, port: u16, now: Instant) {
        let policy = &self.policy;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.matches(host, port)) {
            entry.failures = entry.failures.saturating_add(1);
            entry.not_before = Some(now + policy.delay_after(entry.failures));
        }
    }
}
