//! Single-flight registry.
//!
//! At most one computation per key is in flight at any instant. The first
//! caller for a key becomes the leader and runs the compute call; callers
//! that arrive while it is outstanding become followers and receive the
//! leader's result over a broadcast-once channel. The registry lock covers
//! only handle insert/remove, never the compute call itself.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::debug;

use crate::sync::mutex_lock;

const SOURCE: &str = "strato::cache::flight";

/// Failure of a caller-supplied compute function. Cloneable so every waiter
/// of the same flight observes the identical failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ComputeError {
    pub message: String,
}

impl ComputeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type FlightResult = Result<Value, ComputeError>;

struct Flight {
    tx: broadcast::Sender<FlightResult>,
    started_at: OffsetDateTime,
}

/// Outcome of joining a key's flight.
pub enum FlightRole {
    /// No computation was outstanding; the caller must compute and then
    /// call [`FlightGroup::complete`] exactly once, success or failure.
    Leader,
    /// A computation is outstanding; await the shared result.
    Follower(broadcast::Receiver<FlightResult>),
}

pub struct FlightGroup {
    inflight: Mutex<HashMap<String, Flight>>,
}

impl FlightGroup {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn join(&self, key: &str) -> FlightRole {
        let mut inflight = mutex_lock(&self.inflight, SOURCE, "join");
        if let Some(flight) = inflight.get(key) {
            return FlightRole::Follower(flight.tx.subscribe());
        }
        let (tx, _rx) = broadcast::channel(1);
        inflight.insert(
            key.to_string(),
            Flight {
                tx,
                started_at: OffsetDateTime::now_utc(),
            },
        );
        FlightRole::Leader
    }

    /// Removes the flight and fans the result out to all followers.
    /// Followers may all have gone away; an undelivered send is not an error.
    pub fn complete(&self, key: &str, result: FlightResult) {
        let flight = mutex_lock(&self.inflight, SOURCE, "complete").remove(key);
        if let Some(flight) = flight {
            let elapsed = OffsetDateTime::now_utc() - flight.started_at;
            debug!(
                target: "strato::cache::flight",
                key,
                elapsed_ms = elapsed.whole_milliseconds() as i64,
                followers = flight.tx.receiver_count(),
                "flight completed"
            );
            let _ = flight.tx.send(result);
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inflight, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FlightGroup {
    fn default() -> Self {
        Self::new()
    }
}
