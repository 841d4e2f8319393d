//! Remote typing indicators with expiry

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Tracks which remote users are typing.
///
/// A `true` flag is trusted only for `timeout`; a peer that disconnects
/// mid-word never sends the closing `false`.
#[derive(Debug)]
pub struct TypingTracker {
    timeout: Duration,
    since: HashMap<String, Instant>,
}

impl TypingTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            since: HashMap::new(),
        }
    }

    pub fn set(&mut self, user_id: &str, is_typing: bool, now: Instant) {
        if is_typing {
            self.since.insert(user_id.to_string(), now);
        } else {
            self.since.remove(user_id);
        }
    }

    pub fn is_typing(&self, user_id: &str, now: Instant) -> bool {
        self.since
            .get(user_id)
            .is_some_and(|at| now.saturating_duration_since(*at) < self.timeout)
    }

    /// Users currently typing, sorted.
    pub fn active(&self, now: Instant) -> Vec<String> {
        let mut users: Vec<String> = self
            .since
            .keys()
            .filter(|u| self.is_typing(u, now))
            .cloned()
            .collect();
        users.sort();
        users
    }

    pub fn clear(&mut self) {
        self.since.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_expires_after_timeout() {
        let start = Instant::now();
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        tracker.set("w1", true, start);

        assert!(tracker.is_typing("w1", start + Duration::from_secs(4)));
        assert!(!tracker.is_typing("w1", start + Duration::from_secs(5)));
        assert!(tracker.active(start + Duration::from_secs(6)).is_empty());
    }

    #[test]
    fn test_false_clears_and_true_renews() {
        let start = Instant::now();
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        tracker.set("w1", true, start);
        tracker.set("u2", true, start);
        tracker.set("w1", false, start);
        assert_eq!(tracker.active(start), vec!["u2".to_string()]);

        tracker.set("u2", true, start + Duration::from_secs(4));
        assert!(tracker.is_typing("u2", start + Duration::from_secs(8)));
    }
}
