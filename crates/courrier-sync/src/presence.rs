//! Heartbeat-based presence signal.
//!
//! While foregrounded the coordinator rewrites `{online: true, last_active:
//! now}` on a fixed interval. A disconnect-write registered with the
//! ephemeral service flips the record offline if the client vanishes
//! without a clean shutdown; prolonged inactivity or backgrounding writes
//! it offline directly. Readers additionally apply a staleness threshold to
//! `last_active`, so a crashed peer whose disconnect-write was also lost
//! still renders offline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use courrier_shared::constants::{
    PRESENCE_HEARTBEAT_SECS, PRESENCE_IDLE_SECS, PRESENCE_STALE_SECS,
};
use courrier_shared::UserId;

use crate::remote::EphemeralSync;

/// Per-user presence record, written only by its owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    pub online: bool,
    pub last_active: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn online_now() -> Self {
        Self {
            online: true,
            last_active: Utc::now(),
        }
    }

    pub fn offline_now() -> Self {
        Self {
            online: false,
            last_active: Utc::now(),
        }
    }

    /// Reader-side staleness check: an `online` record whose heartbeat
    /// stopped is treated as offline.
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        self.online
            && (now - self.last_active) <= chrono::Duration::seconds(PRESENCE_STALE_SECS as i64)
    }
}

enum PresenceEvent {
    /// Any user interaction: resets the idle clock.
    Touch,
    /// App moved to the background.
    Background,
    /// App returned to the foreground.
    Foreground,
    Shutdown,
}

/// Handle to the presence coordinator task.
#[derive(Clone)]
pub struct PresenceHandle {
    tx: mpsc::Sender<PresenceEvent>,
}

impl PresenceHandle {
    pub fn touch(&self) {
        let _ = self.tx.try_send(PresenceEvent::Touch);
    }

    pub fn background(&self) {
        let _ = self.tx.try_send(PresenceEvent::Background);
    }

    pub fn foreground(&self) {
        let _ = self.tx.try_send(PresenceEvent::Foreground);
    }

    /// Write a final offline record and stop the task.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(PresenceEvent::Shutdown).await;
    }
}

/// Spawn the presence coordinator for the signed-in user.
pub fn spawn_presence(user: UserId, ephemeral: Arc<dyn EphemeralSync>) -> PresenceHandle {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(coordinator_loop(user, ephemeral, rx));
    PresenceHandle { tx }
}

async fn coordinator_loop(
    user: UserId,
    ephemeral: Arc<dyn EphemeralSync>,
    mut rx: mpsc::Receiver<PresenceEvent>,
) {
    // Crash/network-loss fallback: the service flips us offline if the
    // connection drops. Best effort.
    if let Err(e) = ephemeral
        .register_disconnect_write(&user, PresenceRecord::offline_now())
        .await
    {
        warn!(user = %user, error = %e, "disconnect-write registration failed");
    }

    write_presence(&ephemeral, &user, true).await;
    info!(user = %user, "presence coordinator started");

    let mut heartbeat = tokio::time::interval(Duration::from_secs(PRESENCE_HEARTBEAT_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let idle_after = Duration::from_secs(PRESENCE_IDLE_SECS);

    let mut last_interaction = Instant::now();
    let mut foreground = true;
    // Whether our last write said online; avoids rewriting offline per tick.
    let mut visible_online = true;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !foreground {
                    continue;
                }
                if last_interaction.elapsed() >= idle_after {
                    if visible_online {
                        debug!(user = %user, "idle, writing offline");
                        write_presence(&ephemeral, &user, false).await;
                        visible_online = false;
                    }
                } else {
                    write_presence(&ephemeral, &user, true).await;
                    visible_online = true;
                }
            }
            event = rx.recv() => {
                match event {
                    Some(PresenceEvent::Touch) => {
                        last_interaction = Instant::now();
                        if foreground && !visible_online {
                            write_presence(&ephemeral, &user, true).await;
                            visible_online = true;
                        }
                    }
                    Some(PresenceEvent::Background) => {
                        foreground = false;
                        write_presence(&ephemeral, &user, false).await;
                        visible_online = false;
                    }
                    Some(PresenceEvent::Foreground) => {
                        foreground = true;
                        last_interaction = Instant::now();
                        write_presence(&ephemeral, &user, true).await;
                        visible_online = true;
                    }
                    Some(PresenceEvent::Shutdown) | None => {
                        write_presence(&ephemeral, &user, false).await;
                        info!(user = %user, "presence coordinator stopped");
                        return;
                    }
                }
            }
        }
    }
}

async fn write_presence(ephemeral: &Arc<dyn EphemeralSync>, user: &UserId, online: bool) {
    let record = if online {
        PresenceRecord::online_now()
    } else {
        PresenceRecord::offline_now()
    };
    if let Err(e) = ephemeral.set_presence(user, record).await {
        warn!(user = %user, online, error = %e, "presence write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_online_record_reads_as_offline() {
        let now = Utc::now();
        let fresh = PresenceRecord {
            online: true,
            last_active: now - chrono::Duration::seconds(5),
        };
        let stale = PresenceRecord {
            online: true,
            last_active: now - chrono::Duration::seconds(PRESENCE_STALE_SECS as i64 + 1),
        };
        let offline = PresenceRecord {
            online: false,
            last_active: now,
        };

        assert!(fresh.is_online(now));
        assert!(!stale.is_online(now));
        assert!(!offline.is_online(now));
    }
}
