//! Per-device correlation between 16-bit wire sequences and platform
//! request ids.
//!
//! The wire sequence field is two bytes; platform request ids are arbitrary
//! strings. When a request goes out, the cache hands the channel a fresh
//! sequence and remembers the request id under it. When the matching reply
//! comes back, the sequence resolves to the original id exactly once.
//! Unanswered entries expire after a short TTL, and whole device partitions
//! are dropped after hours of inactivity to bound memory.

use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Wire sentinel meaning "no reply correlation requested"
pub const NO_CORRELATION: u16 = u16::MAX;

const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(30);
const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
struct PendingEntry {
    request_id: String,
    created_at: Instant,
}

#[derive(Debug)]
struct DevicePending {
    next_seq: u16,
    pending: HashMap<u16, PendingEntry>,
    last_activity: Instant,
}

impl DevicePending {
    fn new() -> Self {
        Self {
            next_seq: 0,
            pending: HashMap::new(),
            last_activity: Instant::now(),
        }
    }

    fn allocate(&mut self, request_id: &str, ttl: Duration) -> u16 {
        self.last_activity = Instant::now();
        self.pending.retain(|_, entry| entry.created_at.elapsed() <= ttl);

        loop {
            self.next_seq = self.next_seq.wrapping_add(1);
            // 0 reads as "no id" on the peer and 0xFFFF is the sentinel
            if self.next_seq == 0 || self.next_seq == NO_CORRELATION {
                self.next_seq = 1;
            }
            if !self.pending.contains_key(&self.next_seq) {
                break;
            }
        }

        self.pending.insert(
            self.next_seq,
            PendingEntry {
                request_id: request_id.to_string(),
                created_at: Instant::now(),
            },
        );
        self.next_seq
    }

    fn resolve(&mut self, sequence: u16, ttl: Duration) -> Option<String> {
        self.last_activity = Instant::now();
        let entry = self.pending.remove(&sequence)?;
        if entry.created_at.elapsed() > ttl {
            return None;
        }
        Some(entry.request_id)
    }
}

/// Maps outbound wire sequence numbers back to platform request ids, one
/// independent partition per device id.
///
/// Allocation and resolution for the same device are linearized by the
/// partition's map entry; distinct devices never share a lock.
#[derive(Debug)]
pub struct CorrelationCache {
    devices: DashMap<String, DevicePending>,
    entry_ttl: Duration,
    idle_ttl: Duration,
}

impl CorrelationCache {
    /// Cache with the default TTLs: 30 s per entry, 1 h per idle partition
    pub fn new() -> Self {
        Self::with_ttls(DEFAULT_ENTRY_TTL, DEFAULT_IDLE_TTL)
    }

    /// Cache with explicit entry and partition-idle TTLs
    pub fn with_ttls(entry_ttl: Duration, idle_ttl: Duration) -> Self {
        Self {
            devices: DashMap::new(),
            entry_ttl,
            idle_ttl,
        }
    }

    /// Allocate the next free sequence for `device_id` and store
    /// `request_id` under it. Returns [`NO_CORRELATION`] — and stores
    /// nothing — when no reply correlation is needed.
    pub fn allocate(&self, device_id: &str, request_id: Option<&str>) -> u16 {
        let Some(request_id) = request_id else {
            return NO_CORRELATION;
        };
        let mut partition = self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(DevicePending::new);
        partition.allocate(request_id, self.entry_ttl)
    }

    /// Remove and return the request id stored under `sequence`, if it has
    /// not expired. A miss is the degraded mode, not an error: callers fall
    /// back to the numeric sequence itself.
    pub fn resolve(&self, device_id: &str, sequence: u16) -> Option<String> {
        let mut partition = self.devices.get_mut(device_id)?;
        partition.resolve(sequence, self.entry_ttl)
    }

    /// Drop partitions for devices with no recent activity
    pub fn purge_idle(&self) {
        self.devices
            .retain(|_, partition| partition.last_activity.elapsed() <= self.idle_ttl);
    }

    /// Number of live device partitions
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl Default for CorrelationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_distinct() {
        let cache = CorrelationCache::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            let seq = cache.allocate("dev-1", Some(&format!("req-{i}")));
            assert!(seen.insert(seq), "sequence {seq} was handed out twice");
        }
    }

    #[test]
    fn test_resolve_returns_request_id_exactly_once() {
        let cache = CorrelationCache::new();
        let seq = cache.allocate("dev-1", Some("req-abc"));
        assert_eq!(cache.resolve("dev-1", seq), Some("req-abc".to_string()));
        assert_eq!(cache.resolve("dev-1", seq), None);
    }

    #[test]
    fn test_fire_and_forget_stores_nothing() {
        let cache = CorrelationCache::new();
        assert_eq!(cache.allocate("dev-1", None), NO_CORRELATION);
        assert_eq!(cache.device_count(), 0);
    }

    #[test]
    fn test_expired_entries_never_resolve() {
        let cache = CorrelationCache::with_ttls(
            Duration::from_millis(20),
            Duration::from_secs(3600),
        );
        let seq = cache.allocate("dev-1", Some("req-late"));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.resolve("dev-1", seq), None);

        // the number itself is recyclable afterwards
        let recycled = cache.allocate("dev-1", Some("req-new"));
        assert_eq!(cache.resolve("dev-1", recycled), Some("req-new".to_string()));
    }

    #[test]
    fn test_devices_do_not_share_sequences() {
        let cache = CorrelationCache::new();
        let a = cache.allocate("dev-a", Some("req-a"));
        let b = cache.allocate("dev-b", Some("req-b"));
        assert_eq!(a, b, "fresh partitions start from the same counter");
        assert_eq!(cache.resolve("dev-a", a), Some("req-a".to_string()));
        assert_eq!(cache.resolve("dev-b", b), Some("req-b".to_string()));
    }

    #[test]
    fn test_idle_partitions_are_purged() {
        let cache = CorrelationCache::with_ttls(
            Duration::from_secs(30),
            Duration::from_millis(10),
        );
        cache.allocate("dev-1", Some("req"));
        assert_eq!(cache.device_count(), 1);
        std::thread::sleep(Duration::from_millis(30));
        cache.purge_idle();
        assert_eq!(cache.device_count(), 0);
    }

    #[test]
    fn test_concurrent_allocations_stay_unique() {
        let cache = std::sync::Arc::new(CorrelationCache::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = std::sync::Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                (0..100)
                    .map(|i| cache.allocate("dev-1", Some(&format!("req-{t}-{i}"))))
                    .collect::<Vec<u16>>()
            }));
        }
        let mut all = std::collections::HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(all.insert(seq), "sequence {seq} issued to two callers");
            }
        }
    }
}
