//! Debounced typing signal with writer- and reader-side TTL.
//!
//! The writer arms a debounce before the first `typing: true` write, then
//! refreshes the record at most once per debounce interval while typing
//! continues, so a keystroke burst is throttled without ever letting the
//! record's `updated_at` fall behind the TTL. The signal clears on send or
//! after a pause. Readers independently suppress records older than the
//! TTL: the writer's final `typing: false` can be lost to a crash, and a
//! stale `true` must never render.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use courrier_shared::constants::{TYPING_DEBOUNCE_MS, TYPING_TTL_MS};
use courrier_shared::{ConversationId, UserId};

use crate::remote::EphemeralSync;

/// Per-(conversation, user) typing signal. Written only by its owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingRecord {
    pub typing: bool,
    pub updated_at: DateTime<Utc>,
}

impl TypingRecord {
    pub fn started_now() -> Self {
        Self {
            typing: true,
            updated_at: Utc::now(),
        }
    }

    pub fn stopped_now() -> Self {
        Self {
            typing: false,
            updated_at: Utc::now(),
        }
    }

    /// Reader-side TTL enforcement: a stored `true` older than the TTL is
    /// treated as not-typing regardless of its value.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.typing
            && (now - self.updated_at) <= chrono::Duration::milliseconds(TYPING_TTL_MS as i64)
    }
}

enum TypingEvent {
    Keystroke,
    Sent,
}

/// Handle held by the compose box of one open conversation.
///
/// Dropping it shuts the writer task down, clearing the signal if it was
/// still active.
#[derive(Clone)]
pub struct TypingPublisher {
    tx: mpsc::Sender<TypingEvent>,
}

impl TypingPublisher {
    /// Notify the writer of a keystroke. Non-blocking: a full channel just
    /// drops the event, the active window is extended by the next one.
    pub fn keystroke(&self) {
        let _ = self.tx.try_send(TypingEvent::Keystroke);
    }

    /// The message was sent: clear the signal immediately.
    pub fn sent(&self) {
        let _ = self.tx.try_send(TypingEvent::Sent);
    }
}

#[derive(Clone, Copy)]
enum WriterState {
    Idle,
    /// Debounce armed, `typing: true` not yet written.
    Arming { deadline: Instant },
    /// `typing: true` written; clears when `expires` passes untouched.
    /// `last_write` throttles the keystroke-driven refreshes that keep the
    /// remote record younger than the TTL.
    Active { expires: Instant, last_write: Instant },
}

/// Spawn the typing writer task for one conversation.
pub fn spawn_typing(
    conversation: ConversationId,
    user: UserId,
    ephemeral: Arc<dyn EphemeralSync>,
) -> TypingPublisher {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(writer_loop(conversation, user, ephemeral, rx));
    TypingPublisher { tx }
}

async fn writer_loop(
    conversation: ConversationId,
    user: UserId,
    ephemeral: Arc<dyn EphemeralSync>,
    mut rx: mpsc::Receiver<TypingEvent>,
) {
    let debounce = Duration::from_millis(TYPING_DEBOUNCE_MS);
    let ttl = Duration::from_millis(TYPING_TTL_MS);
    let mut state = WriterState::Idle;

    loop {
        // Deadline copied out so the timer future does not borrow `state`.
        let deadline = match state {
            WriterState::Idle => None,
            WriterState::Arming { deadline } => Some(deadline),
            WriterState::Active { expires, .. } => Some(expires),
        };
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(TypingEvent::Keystroke) => {
                        state = match state {
                            // First keystroke arms the debounce.
                            WriterState::Idle => WriterState::Arming {
                                deadline: Instant::now() + debounce,
                            },
                            // Still debouncing: keep the original deadline.
                            arming @ WriterState::Arming { .. } => arming,
                            // Already visible: extend the active window and
                            // refresh the remote record, at most once per
                            // debounce interval, so its updated_at never
                            // ages past the TTL during continued typing.
                            WriterState::Active { last_write, .. } => {
                                let now = Instant::now();
                                let last_write = if now.duration_since(last_write) >= debounce {
                                    write_signal(&ephemeral, conversation, &user, true).await;
                                    now
                                } else {
                                    last_write
                                };
                                WriterState::Active {
                                    expires: now + ttl,
                                    last_write,
                                }
                            }
                        };
                    }
                    Some(TypingEvent::Sent) => {
                        if matches!(state, WriterState::Active { .. }) {
                            write_signal(&ephemeral, conversation, &user, false).await;
                        }
                        state = WriterState::Idle;
                    }
                    None => {
                        // Publisher dropped: clear a still-visible signal.
                        if matches!(state, WriterState::Active { .. }) {
                            write_signal(&ephemeral, conversation, &user, false).await;
                        }
                        debug!(conversation = %conversation, "typing writer stopped");
                        return;
                    }
                }
            }
            _ = timer => {
                state = match state {
                    WriterState::Arming { .. } => {
                        write_signal(&ephemeral, conversation, &user, true).await;
                        let now = Instant::now();
                        WriterState::Active { expires: now + ttl, last_write: now }
                    }
                    WriterState::Active { .. } => {
                        write_signal(&ephemeral, conversation, &user, false).await;
                        WriterState::Idle
                    }
                    WriterState::Idle => WriterState::Idle,
                };
            }
        }
    }
}

async fn write_signal(
    ephemeral: &Arc<dyn EphemeralSync>,
    conversation: ConversationId,
    user: &UserId,
    typing: bool,
) {
    let record = if typing {
        TypingRecord::started_now()
    } else {
        TypingRecord::stopped_now()
    };
    if let Err(e) = ephemeral.set_typing(conversation, user, record).await {
        // Best effort: a lost write is covered by the reader-side TTL.
        warn!(conversation = %conversation, error = %e, "typing write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryEphemeral;

    /// Real time rather than the paused clock: readers judge staleness by
    /// wall-clock `updated_at`.
    #[tokio::test]
    async fn continuous_typing_stays_visible_past_the_ttl() {
        let ephemeral = Arc::new(MemoryEphemeral::new());
        let conversation = ConversationId::new();
        let user = UserId::new("alice");
        let publisher = spawn_typing(conversation, user.clone(), ephemeral.clone());

        // Steady keystrokes for 3 s, well past the 2 s TTL.
        for _ in 0..30 {
            publisher.keystroke();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // Still typing: the record must have been refreshed recently enough
        // to survive every reader's TTL check.
        let record = ephemeral
            .typing(conversation, &user)
            .await
            .unwrap()
            .expect("typing record written");
        assert!(record.typing);
        assert!(record.is_active(Utc::now()));
    }

    #[test]
    fn reader_suppresses_stale_records() {
        let now = Utc::now();
        let fresh = TypingRecord {
            typing: true,
            updated_at: now - chrono::Duration::milliseconds(500),
        };
        let stale = TypingRecord {
            typing: true,
            updated_at: now - chrono::Duration::milliseconds(TYPING_TTL_MS as i64 + 1),
        };
        let stopped = TypingRecord {
            typing: false,
            updated_at: now,
        };

        assert!(fresh.is_active(now));
        assert!(!stale.is_active(now));
        assert!(!stopped.is_active(now));
    }
}
