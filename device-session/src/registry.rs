//! One session per device
//!
//! Discovery may report the same device many times. The registry hands back
//! the session already built for a device id instead of creating another one.

use dashmap::DashMap;

use crate::error::Result;
use crate::session::DeviceSession;

/// Thread-safe map of device id → session
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, DeviceSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `device_id`, building it with `create` if absent
    ///
    /// The second element is `true` when a new session was created.
    pub fn get_or_insert_with<F>(&self, device_id: &str, create: F) -> Result<(DeviceSession, bool)>
    where
        F: FnOnce() -> Result<DeviceSession>,
    {
        if let Some(existing) = self.sessions.get(device_id) {
            return Ok((existing.clone(), false));
        }

        match self.sessions.entry(device_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok((entry.get().clone(), false)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let session = create()?;
                entry.insert(session.clone());
                Ok((session, true))
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceSession> {
        self.sessions.get(device_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, device_id: &str) -> Option<DeviceSession> {
        self.sessions.remove(device_id).map(|(_, session)| session)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.sessions.contains_key(device_id)
    }

    /// Display names of every registered session
    pub fn names(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
