//! In-crate test doubles

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::message::Command;

/// Connection that records every command and never replies on its own
#[derive(Debug, Default)]
pub(crate) struct RecordingConnection {
    sent: Mutex<Vec<Command>>,
    connects: AtomicUsize,
    failure: Option<ConnectionError>,
}

impl RecordingConnection {
    pub fn failing(error: ConnectionError) -> Self {
        Self {
            failure: Some(error),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    pub fn sent_ids(&self) -> Vec<u32> {
        self.sent.lock().iter().map(|c| c.id).collect()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connection for RecordingConnection {
    fn connect(&self) -> Result<(), ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, command: &Command) -> Result<(), ConnectionError> {
        self.sent.lock().push(command.clone());
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
