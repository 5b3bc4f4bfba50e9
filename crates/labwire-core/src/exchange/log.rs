//! Bounded message log
//!
//! Every byte buffer that crosses a transport, in either direction, is
//! recorded here. The log is append-only with front eviction; the background
//! dispatch thread appends while the application reads snapshots.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::Serialize;

/// Maximum records kept before the oldest is evicted
pub const MAX_LOG_RECORDS: usize = 1000;

/// Direction of a logged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDirection {
    Sent,
    Received,
}

/// One logged message
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub direction: LogDirection,
    /// Protocol label at the time of logging (`HL7`, `ASTM`, `RAW`, ...)
    pub protocol: String,
    pub size: usize,
    /// Lossy UTF-8 copy of the payload
    pub data: String,
}

/// Shared handle to the bounded log
#[derive(Clone, Default)]
pub struct MessageLog {
    records: Arc<Mutex<VecDeque<LogRecord>>>,
}

impl MessageLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a record, evicting the oldest once the capacity is reached
    pub fn push(&self, direction: LogDirection, protocol: &str, data: &[u8]) {
        let record = LogRecord {
            timestamp: Local::now(),
            direction,
            protocol: protocol.to_string(),
            size: data.len(),
            data: String::from_utf8_lossy(data).into_owned(),
        };
        let mut records = self.lock();
        if records.len() >= MAX_LOG_RECORDS {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy out the most recent records (all of them when `limit` is `None`)
    pub fn snapshot(&self, limit: Option<usize>) -> Vec<LogRecord> {
        let records = self.lock();
        let skip = match limit {
            Some(limit) => records.len().saturating_sub(limit),
            None => 0,
        };
        records.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
