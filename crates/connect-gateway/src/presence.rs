use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use connect_types::models::{CustomStatus, ExpiresIn, Presence, PresenceStatus};

/// In-memory presence state. There is no sweep task: expiry of a custom
/// status is evaluated on every read, so a stale entry left in the map is
/// indistinguishable from a cleared one.
pub struct PresenceTracker {
    statuses: RwLock<HashMap<Uuid, PresenceStatus>>,
    custom: RwLock<HashMap<Uuid, CustomStatus>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            custom: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_status(&self, user_id: Uuid, status: PresenceStatus) {
        self.statuses
            .write()
            .expect("presence lock poisoned")
            .insert(user_id, status);
    }

    /// A fresh connection puts the user online unless they already carry an
    /// explicit status like dnd or away.
    pub fn connected(&self, user_id: Uuid) {
        let mut statuses = self.statuses.write().expect("presence lock poisoned");
        let entry = statuses.entry(user_id).or_insert(PresenceStatus::Offline);
        if *entry == PresenceStatus::Offline {
            *entry = PresenceStatus::Online;
        }
    }

    pub fn disconnected(&self, user_id: Uuid) {
        self.statuses
            .write()
            .expect("presence lock poisoned")
            .insert(user_id, PresenceStatus::Offline);
    }

    /// Converts the expiry option to an absolute deadline immediately.
    /// Storing the raw duration and re-deriving "today" at read time would
    /// change meaning across midnight.
    pub fn set_custom_status(
        &self,
        user_id: Uuid,
        emoji: String,
        text: String,
        expires_in: ExpiresIn,
        now: DateTime<Utc>,
    ) {
        let status = CustomStatus {
            emoji,
            text,
            expires_at: expires_in.deadline_from(now),
        };
        self.custom
            .write()
            .expect("presence lock poisoned")
            .insert(user_id, status);
    }

    pub fn clear_custom_status(&self, user_id: Uuid) {
        self.custom
            .write()
            .expect("presence lock poisoned")
            .remove(&user_id);
    }

    /// Current presence for one user, with the read-time expiry check
    /// applied. Unknown users read as offline.
    pub fn get(&self, user_id: Uuid, now: DateTime<Utc>) -> Presence {
        let status = self
            .statuses
            .read()
            .expect("presence lock poisoned")
            .get(&user_id)
            .copied()
            .unwrap_or(PresenceStatus::Offline);

        let custom_status = self
            .custom
            .read()
            .expect("presence lock poisoned")
            .get(&user_id)
            .filter(|s| !s.is_expired(now))
            .cloned();

        Presence {
            user_id,
            status,
            custom_status,
        }
    }

    /// Everyone currently not offline — what a freshly connected client is
    /// sent before it starts receiving live updates.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<Presence> {
        let user_ids: Vec<Uuid> = self
            .statuses
            .read()
            .expect("presence lock poisoned")
            .iter()
            .filter(|(_, status)| **status != PresenceStatus::Offline)
            .map(|(id, _)| *id)
            .collect();

        user_ids.into_iter().map(|id| self.get(id, now)).collect()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn unknown_user_reads_as_offline() {
        let tracker = PresenceTracker::new();
        let presence = tracker.get(Uuid::new_v4(), Utc::now());
        assert_eq!(presence.status, PresenceStatus::Offline);
        assert!(presence.custom_status.is_none());
    }

    #[test]
    fn connect_marks_online_but_keeps_explicit_status() {
        let tracker = PresenceTracker::new();
        let fresh = Uuid::new_v4();
        let busy = Uuid::new_v4();
        let now = Utc::now();

        tracker.connected(fresh);
        assert_eq!(tracker.get(fresh, now).status, PresenceStatus::Online);

        tracker.set_status(busy, PresenceStatus::Dnd);
        tracker.connected(busy);
        assert_eq!(tracker.get(busy, now).status, PresenceStatus::Dnd);
    }

    #[test]
    fn disconnect_reads_as_offline() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        tracker.connected(user);
        tracker.disconnected(user);
        assert_eq!(tracker.get(user, Utc::now()).status, PresenceStatus::Offline);
    }

    #[test]
    fn custom_status_expires_at_read_time_without_clear() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let set_at = Utc::now();

        tracker.set_custom_status(
            user,
            "🍜".into(),
            "Lunch".into(),
            ExpiresIn::Minutes30,
            set_at,
        );

        let before = tracker.get(user, set_at + Duration::minutes(29));
        assert_eq!(before.custom_status.as_ref().unwrap().text, "Lunch");

        // Past the deadline the status reads as absent, no sweep involved
        let after = tracker.get(user, set_at + Duration::minutes(31));
        assert!(after.custom_status.is_none());
    }

    #[test]
    fn never_expiring_status_persists() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let set_at = Utc::now();

        tracker.set_custom_status(user, "🌴".into(), "OOO".into(), ExpiresIn::Never, set_at);

        let later = tracker.get(user, set_at + Duration::days(90));
        assert_eq!(later.custom_status.unwrap().text, "OOO");
    }

    #[test]
    fn clear_custom_status_is_unconditional() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        tracker.set_custom_status(user, "🎧".into(), "Focus".into(), ExpiresIn::Hours4, now);
        tracker.clear_custom_status(user);
        assert!(tracker.get(user, now).custom_status.is_none());
    }

    #[test]
    fn snapshot_skips_offline_users_and_expired_statuses() {
        let tracker = PresenceTracker::new();
        let online = Uuid::new_v4();
        let offline = Uuid::new_v4();
        let set_at = Utc::now();

        tracker.connected(online);
        tracker.connected(offline);
        tracker.disconnected(offline);
        tracker.set_custom_status(
            online,
            "🍜".into(),
            "Lunch".into(),
            ExpiresIn::Minutes30,
            set_at,
        );

        let snapshot = tracker.snapshot(set_at + chrono::Duration::hours(1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, online);
        assert!(snapshot[0].custom_status.is_none());
    }
}
