//! Counters exposed by the status page.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Process-wide adapter counters. Cheap to bump from any task.
#[derive(Debug)]
pub struct Stats {
    started: Instant,
    requests: AtomicU64,
    packets_in: AtomicU64,
    registrations_in: AtomicU64,
    acks: AtomicU64,
    nacks: AtomicU64,
    timeouts: AtomicU64,
    broadcasts: AtomicU64,
    broadcast_errors: AtomicU64,
}

/// Point-in-time copy of [`Stats`], serialized as the status page body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub packets_in: u64,
    pub registrations_in: u64,
    pub acks: u64,
    pub nacks: u64,
    pub timeouts: u64,
    pub broadcasts: u64,
    pub broadcast_errors: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            packets_in: AtomicU64::new(0),
            registrations_in: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            nacks: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            broadcast_errors: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet(&self) {
        self.packets_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registration(&self) {
        self.registrations_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nack(&self) {
        self.nacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, failed: bool) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.broadcast_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            packets_in: self.packets_in.load(Ordering::Relaxed),
            registrations_in: self.registrations_in.load(Ordering::Relaxed),
            acks: self.acks.load(Ordering::Relaxed),
            nacks: self.nacks.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            broadcast_errors: self.broadcast_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
