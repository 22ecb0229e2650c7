//! Process-wide unique ID generation.
//!
//! # Responsibility
//! - Produce monotonic 64-bit identifiers composed of timestamp, node and
//!   sequence bits (snowflake layout).
//!
//! # Invariants
//! - No duplicate ID is ever produced within a process.
//! - Instances configured with distinct node identifiers never collide.
//! - Generation is safe under concurrent invocation.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

// 2010-11-04T01:42:54.657Z, the conventional snowflake epoch.
const EPOCH_MS: i64 = 1_288_834_974_657;

const WORKER_ID_BITS: u8 = 5;
const DATACENTER_ID_BITS: u8 = 5;
const SEQUENCE_BITS: u8 = 12;

const WORKER_SHIFT: u8 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u8 = SEQUENCE_BITS + WORKER_ID_BITS;
const TIMESTAMP_SHIFT: u8 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

/// Largest valid worker/datacenter identifier (5 bits each).
pub const MAX_NODE_ID: u8 = (1 << WORKER_ID_BITS) - 1;

struct IdState {
    last_timestamp: i64,
    sequence: i64,
}

/// Snowflake-style ID source. One per runtime, mutex-guarded.
pub struct IdMaker {
    worker_id: i64,
    datacenter_id: i64,
    state: Mutex<IdState>,
}

impl IdMaker {
    /// Creates a generator for the given node identity. Callers validate the
    /// 5-bit range beforehand (see `DbConfig::validate`).
    pub fn new(worker_id: u8, datacenter_id: u8) -> Self {
        debug_assert!(worker_id <= MAX_NODE_ID && datacenter_id <= MAX_NODE_ID);
        Self {
            worker_id: i64::from(worker_id),
            datacenter_id: i64::from(datacenter_id),
            state: Mutex::new(IdState {
                last_timestamp: -1,
                sequence: 0,
            }),
        }
    }

    /// Returns the next unique identifier.
    pub fn next_id(&self) -> i64 {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut now = current_millis();
        if now < state.last_timestamp {
            // Clock regression: keep issuing against the last observed tick
            // rather than going backwards.
            now = state.last_timestamp;
        }

        if now == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = wait_next_millis(state.last_timestamp);
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = now;

        ((now - EPOCH_MS) << TIMESTAMP_SHIFT)
            | (self.datacenter_id << DATACENTER_SHIFT)
            | (self.worker_id << WORKER_SHIFT)
            | state.sequence
    }
}

fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn wait_next_millis(last: i64) -> i64 {
    let mut now = current_millis();
    while now <= last {
        now = current_millis();
    }
    now
}
