//! Egress identity rotation. Round-robin over the live (non-failed) subset;
//! once everything has failed, `next` returns None until an explicit
//! `reset` or `add` — failed identities are never silently reused.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::info;

/// A network exit point (proxy address) handed to one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EgressIdentity {
    pub address: String,
}

pub struct EgressRotator {
    inner: Mutex<RotatorState>,
}

struct RotatorState {
    addresses: Vec<String>,
    failed: HashSet<String>,
    cursor: usize,
}

impl EgressRotator {
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            inner: Mutex::new(RotatorState {
                addresses,
                failed: HashSet::new(),
                cursor: 0,
            }),
        }
    }

    /// Next live identity, advancing the cursor. One critical section covers
    /// the cursor advance and the failed-set check, so concurrent callers
    /// can't hand out a failed identity.
    pub fn next(&self) -> Option<EgressIdentity> {
        let mut state = self.inner.lock().expect("rotator mutex poisoned");
        if state.addresses.is_empty() {
            return None;
        }
        for _ in 0..state.addresses.len() {
            let address = state.addresses[state.cursor].clone();
            state.cursor = (state.cursor + 1) % state.addresses.len();
            if !state.failed.contains(&address) {
                return Some(EgressIdentity { address });
            }
        }
        None
    }

    /// Exclude an identity from rotation. Idempotent.
    pub fn mark_failed(&self, identity: &EgressIdentity) {
        let mut state = self.inner.lock().expect("rotator mutex poisoned");
        if state.failed.insert(identity.address.clone()) {
            info!(address = %identity.address, "Egress identity marked failed");
        }
    }

    /// Clear the failed set, returning every identity to rotation.
    pub fn reset(&self) {
        let mut state = self.inner.lock().expect("rotator mutex poisoned");
        state.failed.clear();
    }

    /// Add fresh identities to the rotation.
    pub fn add(&self, addresses: Vec<String>) {
        let mut state = self.inner.lock().expect("rotator mutex poisoned");
        state.addresses.extend(addresses);
    }

    /// How many identities are currently usable.
    pub fn live_count(&self) -> usize {
        let state = self.inner.lock().expect("rotator mutex poisoned");
        state
            .addresses
            .iter()
            .filter(|a| !state.failed.contains(*a))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotator(n: usize) -> EgressRotator {
        EgressRotator::new((0..n).map(|i| format!("http://proxy{i}:8080")).collect())
    }

    #[test]
    fn round_robins_over_live_identities() {
        let rotator = rotator(3);
        let a = rotator.next().unwrap();
        let b = rotator.next().unwrap();
        let c = rotator.next().unwrap();
        let again = rotator.next().unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a, again);
    }

    #[test]
    fn never_returns_a_failed_identity() {
        let rotator = rotator(3);
        let first = rotator.next().unwrap();
        rotator.mark_failed(&first);
        for _ in 0..10 {
            assert_ne!(rotator.next().unwrap(), first);
        }
    }

    #[test]
    fn exhaustion_returns_none_until_reset() {
        let rotator = rotator(2);
        rotator.mark_failed(&EgressIdentity {
            address: "http://proxy0:8080".to_string(),
        });
        rotator.mark_failed(&EgressIdentity {
            address: "http://proxy1:8080".to_string(),
        });
        assert!(rotator.next().is_none());
        assert_eq!(rotator.live_count(), 0);

        rotator.reset();
        assert!(rotator.next().is_some());
    }

    #[test]
    fn add_revives_an_exhausted_rotator() {
        let rotator = rotator(1);
        rotator.mark_failed(&EgressIdentity {
            address: "http://proxy0:8080".to_string(),
        });
        assert!(rotator.next().is_none());

        rotator.add(vec!["http://proxy9:8080".to_string()]);
        assert_eq!(
            rotator.next().unwrap().address,
            "http://proxy9:8080".to_string()
        );
    }

    #[test]
    fn mark_failed_is_idempotent() {
        let rotator = rotator(2);
        let id = EgressIdentity {
            address: "http://proxy0:8080".to_string(),
        };
        rotator.mark_failed(&id);
        rotator.mark_failed(&id);
        assert_eq!(rotator.live_count(), 1);
    }

    #[test]
    fn empty_rotator_returns_none() {
        let rotator = EgressRotator::new(Vec::new());
        assert!(rotator.next().is_none());
    }
}
