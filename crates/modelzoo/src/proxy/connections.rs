//! Least-connections counter: the proxy's single contested structure. One
//! mutex around find-min+increment and decrement keeps both atomic with
//! respect to each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct ConnectionCounter {
    counts: Mutex<HashMap<String, u32>>,
}

/// RAII guard releasing its `target_url`'s slot on drop, so the decrement
/// survives every exit path (transport error before first byte, client disconnect
/// mid-stream, adapter failure) without a hand-written `finally`. Owns an
/// `Arc` rather than borrowing so it can ride along inside a streamed
/// response body, which outlives the handler's stack frame.
pub struct ConnectionGuard {
    counter: Arc<ConnectionCounter>,
    target_url: String,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.decrement(&self.target_url);
    }
}

impl ConnectionCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Picks the candidate URL with the smallest live count, increments it,
    /// and returns a guard that decrements it again on drop. Ties break in
    /// iteration order (first-seen wins), spreading load evenly across a
    /// pair of equally-loaded backends.
    pub fn acquire_least_loaded(
        self: &Arc<Self>,
        candidates: &[String],
    ) -> Option<(String, ConnectionGuard)> {
        if candidates.is_empty() {
            return None;
        }
        let mut counts = self.counts.lock().unwrap();
        let chosen = candidates
            .iter()
            .min_by_key(|url| *counts.get(*url).unwrap_or(&0))
            .cloned()?;
        *counts.entry(chosen.clone()).or_insert(0) += 1;
        drop(counts);
        Some((
            chosen.clone(),
            ConnectionGuard {
                counter: self.clone(),
                target_url: chosen,
            },
        ))
    }

    fn decrement(&self, target_url: &str) {
        let mut counts = self.counts.lock().unwrap();
        if let Some(count) = counts.get_mut(target_url) {
            *count = count.saturating_sub(1);
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.counts.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_least_loaded_and_increments() {
        let counter = ConnectionCounter::new();
        let candidates = vec!["a".to_string(), "b".to_string()];

        let (first, _g1) = counter.acquire_least_loaded(&candidates).unwrap();
        assert_eq!(first, "a");
        let (second, _g2) = counter.acquire_least_loaded(&candidates).unwrap();
        assert_eq!(second, "b");

        let snap = counter.snapshot();
        assert_eq!(snap["a"], 1);
        assert_eq!(snap["b"], 1);
    }

    #[test]
    fn guard_drop_releases_the_slot() {
        let counter = ConnectionCounter::new();
        let candidates = vec!["a".to_string()];
        {
            let (_url, _guard) = counter.acquire_least_loaded(&candidates).unwrap();
            assert_eq!(counter.snapshot()["a"], 1);
        }
        assert_eq!(counter.snapshot()["a"], 0);
    }

    #[test]
    fn conservation_holds_after_many_acquire_release_cycles() {
        let counter = ConnectionCounter::new();
        let candidates = vec!["a".to_string(), "b".to_string()];
        for _ in 0..50 {
            let (_url, _guard) = counter.acquire_least_loaded(&candidates).unwrap();
        }
        let snap = counter.snapshot();
        assert_eq!(snap.values().sum::<u32>(), 0);
    }
}
