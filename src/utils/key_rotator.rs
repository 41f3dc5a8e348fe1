//! Round-robin API key rotation for rate-limited services.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Rotates through a fixed list of API keys.
///
/// Purely a stateful counter with no failure awareness: callers decide when
/// to rotate (the PubMed adapter pulls a fresh key on every attempt, so a
/// 429 retry naturally lands on the next key).
#[derive(Debug, Default)]
pub struct KeyRotator {
    keys: Vec<String>,
    index: AtomicUsize,
}

impl KeyRotator {
    /// Build a rotator from a key list, dropping empty entries.
    pub fn new(keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keys,
            index: AtomicUsize::new(0),
        }
    }

    /// Build from a comma-separated environment-variable value.
    pub fn from_env_value(value: &str) -> Self {
        Self::new(value.split(',').map(|s| s.to_string()).collect())
    }

    /// The next key in round-robin order, or `None` when no keys are
    /// configured.
    pub fn next(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let i = self.index.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        tracing::debug!(key_index = i, "rotating api key");
        Some(self.keys[i].clone())
    }

    /// Number of keys available for rotation.
    pub fn count(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_order() {
        let rotator = KeyRotator::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(rotator.next().as_deref(), Some("a"));
        assert_eq!(rotator.next().as_deref(), Some("b"));
        assert_eq!(rotator.next().as_deref(), Some("c"));
        assert_eq!(rotator.next().as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_list_yields_none() {
        let rotator = KeyRotator::new(vec![]);
        assert_eq!(rotator.next(), None);
        assert_eq!(rotator.count(), 0);
    }

    #[test]
    fn test_blank_keys_filtered() {
        let rotator = KeyRotator::from_env_value("key1, ,key2,");
        assert_eq!(rotator.count(), 2);
        assert_eq!(rotator.next().as_deref(), Some("key1"));
        assert_eq!(rotator.next().as_deref(), Some("key2"));
    }
}
