//! Keyed mutual exclusion for the engine's critical sections.
//!
//! The engine serializes three domains: per-attack-vector during campaign
//! matching (so concurrent incidents destined for the same new campaign
//! cannot both create one), per-campaign during aggregate recomputation,
//! and per-organization during budget updates. `KeyedMutex` provides all
//! three as string-keyed async locks.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A registry of named async mutexes, created on first use.
///
/// Guards are owned, so they can be held across `.await` points for the
/// duration of a critical section. Lock entries are retained for the
/// lifetime of the registry; the key space here (attack vectors, campaign
/// ids, organization ids) is small and bounded.
#[derive(Default)]
pub struct KeyedMutex {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

/// Key for the campaign-matching critical section of an attack vector.
pub fn vector_key(vector: impl std::fmt::Display) -> String {
    format!("vector:{vector}")
}

/// Key for the aggregate-recompute critical section of a campaign.
pub fn campaign_key(id: impl std::fmt::Display) -> String {
    format!("campaign:{id}")
}

/// Key for the budget critical section of an organization.
pub fn org_key(id: &str) -> String {
    format!("org:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn same_key_serializes_critical_sections() {
        let keyed = Arc::new(KeyedMutex::new());
        let in_section = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let keyed = keyed.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = keyed.lock("vector:ai_phishing").await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let keyed = KeyedMutex::new();
        let _a = keyed.lock("org:alpha").await;
        // Acquiring a different key while `org:alpha` is held must not deadlock.
        let _b = keyed.lock("org:beta").await;
    }

    #[test]
    fn key_helpers_are_namespaced() {
        assert_eq!(org_key("alpha"), "org:alpha");
        assert!(vector_key("ai_phishing").starts_with("vector:"));
        assert!(campaign_key("123").starts_with("campaign:"));
    }
}
