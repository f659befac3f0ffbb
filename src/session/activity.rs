//! Process-wide activity tracking, shared by request handlers and the idle
//! reaper.
//!
//! Single-writer-per-field discipline: turn handling only resets
//! `last_activity` and clears `idle`; the reaper only sets `idle`. The
//! idle transition is a compare-and-set under the map entry's lock, which
//! is what makes "exactly once per idle epoch" hold.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Activity state for one user.
#[derive(Debug, Clone, Copy)]
pub struct ActivityRecord {
    pub last_activity: DateTime<Utc>,
    pub idle: bool,
}

/// Synchronized map from user id to activity state.
#[derive(Default)]
pub struct ActivityTracker {
    records: DashMap<String, ActivityRecord>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity: resets the timestamp and clears the idle flag,
    /// implicitly starting a new idle-detection epoch.
    pub fn touch(&self, user_id: &str, now: DateTime<Utc>) {
        self.records
            .entry(user_id.to_string())
            .and_modify(|record| {
                record.last_activity = now;
                record.idle = false;
            })
            .or_insert(ActivityRecord {
                last_activity: now,
                idle: false,
            });
    }

    /// All user ids currently tracked.
    pub fn tracked_users(&self) -> Vec<String> {
        self.records.iter().map(|e| e.key().clone()).collect()
    }

    /// Transition `user_id` to idle if it is active and its inactivity
    /// exceeds `threshold`. Returns true only for the poll that performed
    /// the transition; repeated polls while the user stays idle return
    /// false until `touch` starts a new epoch.
    pub fn begin_idle(&self, user_id: &str, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.records.get_mut(user_id) {
            Some(mut record) => {
                let elapsed = (now - record.last_activity).to_std().unwrap_or_default();
                if !record.idle && elapsed > threshold {
                    record.idle = true;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    pub fn is_idle(&self, user_id: &str) -> bool {
        self.records.get(user_id).map(|r| r.idle).unwrap_or(false)
    }
}
