//! Logout epoch
//!
//! A counter advanced every time the redirect debouncer clears credentials.
//! A renewal episode records the epoch it started in and refuses to write its
//! result once the epoch has moved on, so a late renewal can never bring a
//! logged-out session back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared logout counter. Clones observe the same epoch.
#[derive(Debug, Clone, Default)]
pub struct LogoutEpoch {
    counter: Arc<AtomicU64>,
}

impl LogoutEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Start a new epoch. Call before clearing credentials.
    pub fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_counter() {
        let epoch = LogoutEpoch::new();
        let observer = epoch.clone();
        let start = observer.current();

        assert_eq!(epoch.advance(), start + 1);
        assert!(!observer.is_current(start));
        assert!(observer.is_current(start + 1));
    }
}
