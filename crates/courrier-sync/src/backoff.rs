//! Exponential backoff for the outbound queue.
//!
//! Delays double per attempt from a 1 s base and cap at 32 s
//! (1, 2, 4, 8, 16, 32). After [`RETRY_CEILING`] attempts the entry is
//! marked failed and kept until the user discards or retries it.

use chrono::{DateTime, Duration, Utc};

use courrier_shared::constants::{RETRY_BASE_SECS, RETRY_CEILING, RETRY_MAX_BACKOFF_SECS};
use courrier_store::QueueEntry;

/// Delay imposed before the next attempt, given the number of attempts
/// already made. Zero attempts means immediately eligible.
pub fn backoff_delay(retries: u32) -> Duration {
    if retries == 0 {
        return Duration::zero();
    }
    let exp = (retries - 1).min(31);
    let secs = RETRY_BASE_SECS
        .saturating_mul(1u64 << exp)
        .min(RETRY_MAX_BACKOFF_SECS);
    Duration::seconds(secs as i64)
}

/// Whether another attempt would exceed the retry ceiling.
pub fn at_ceiling(retries: u32) -> bool {
    retries >= RETRY_CEILING
}

/// Whether the entry may be attempted at `now`.
///
/// Failed entries are never organically eligible; they wait for an explicit
/// user retry, which resets the attempt clock.
pub fn is_eligible(entry: &QueueEntry, now: DateTime<Utc>) -> bool {
    if entry.failed {
        return false;
    }
    match entry.last_attempt {
        None => true,
        Some(attempted_at) => attempted_at + backoff_delay(entry.retries) <= now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courrier_shared::{ConversationId, MessageBody};

    #[test]
    fn delay_sequence_doubles_and_caps() {
        let secs: Vec<i64> = (1..=8).map(|r| backoff_delay(r).num_seconds()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 32, 32]);
    }

    #[test]
    fn delay_is_monotone() {
        for r in 0..100 {
            assert!(backoff_delay(r + 1) >= backoff_delay(r));
        }
    }

    #[test]
    fn eligibility_respects_backoff_window() {
        let now = Utc::now();
        let mut entry = QueueEntry::new(ConversationId::new(), MessageBody::text("x"));
        assert!(is_eligible(&entry, now));

        entry.retries = 3; // next window: 4 s
        entry.last_attempt = Some(now - Duration::seconds(3));
        assert!(!is_eligible(&entry, now));

        entry.last_attempt = Some(now - Duration::seconds(4));
        assert!(is_eligible(&entry, now));
    }

    #[test]
    fn failed_entries_are_never_eligible() {
        let now = Utc::now();
        let mut entry = QueueEntry::new(ConversationId::new(), MessageBody::text("x"));
        entry.failed = true;
        assert!(!is_eligible(&entry, now));
    }

    #[test]
    fn ceiling_is_six_attempts() {
        assert!(!at_ceiling(5));
        assert!(at_ceiling(6));
    }
}
