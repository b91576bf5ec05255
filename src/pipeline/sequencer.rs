//! Result sequencing
//!
//! Workers finish out of submission order. The sequencer keeps the latest
//! accepted frame number and the submission time of every frame in flight
//! behind one lock, so results reach the transport at most once and in
//! increasing frame order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Outcome of applying one worker result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Newer than anything applied so far
    Accepted {
        /// Time since submission, if the frame was registered
        latency: Option<Duration>,
    },
    /// Not newer than the latest accepted frame, must not be forwarded
    Stale,
}

/// Counters kept by the sequencer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerStats {
    pub latest_accepted: u64,
    pub accepted: u64,
    /// Stale results discarded ("last frame error" count)
    pub stale: u64,
    pub in_flight: usize,
    pub total_latency: Duration,
}

#[derive(Debug, Default)]
struct SequencerState {
    /// 0 until the first frame is accepted, frame numbers start at 1
    latest_accepted: u64,
    /// Timing ledger: submission time per frame in flight
    ledger: HashMap<u64, Instant>,
    accepted: u64,
    stale: u64,
    total_latency: Duration,
}

#[derive(Debug, Default)]
pub struct ResultSequencer {
    state: Mutex<SequencerState>,
}

impl ResultSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the submission time of `frame_number`
    pub fn register(&self, frame_number: u64) {
        self.state.lock().ledger.insert(frame_number, Instant::now());
    }

    /// Drop the ledger entry of a frame that will never produce a result
    pub fn abandon(&self, frame_number: u64) {
        self.state.lock().ledger.remove(&frame_number);
    }

    /// Compare `frame_number` against the latest accepted frame, update the
    /// state and run `forward` with the outcome, all under the result lock.
    pub fn apply<R>(&self, frame_number: u64, forward: impl FnOnce(Applied) -> R) -> R {
        let mut state = self.state.lock();
        let started = state.ledger.remove(&frame_number);

        if frame_number <= state.latest_accepted {
            state.stale += 1;
            tracing::debug!(
                "Discarding stale result for frame {} (latest {})",
                frame_number,
                state.latest_accepted
            );
            return forward(Applied::Stale);
        }

        state.latest_accepted = frame_number;
        state.accepted += 1;
        let latency = started.map(|t| t.elapsed());
        if let Some(latency) = latency {
            state.total_latency += latency;
        }
        forward(Applied::Accepted { latency })
    }

    pub fn latest_accepted(&self) -> u64 {
        self.state.lock().latest_accepted
    }

    pub fn stale_count(&self) -> u64 {
        self.state.lock().stale
    }

    pub fn stats(&self) -> SequencerStats {
        let state = self.state.lock();
        SequencerStats {
            latest_accepted: state.latest_accepted,
            accepted: state.accepted,
            stale: state.stale,
            in_flight: state.ledger.len(),
            total_latency: state.total_latency,
        }
    }
}
