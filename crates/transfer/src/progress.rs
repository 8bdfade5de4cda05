use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::TransferError;

/// Default window over which throughput is averaged.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default maximum number of retained samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

// ---------------------------------------------------------------------------
// BandwidthTracker
// ---------------------------------------------------------------------------

struct TransferSample {
    bytes: u64,
    elapsed: Duration,
    finished_at: Instant,
}

struct ActiveTransfer {
    generation: u64,
    bytes: u64,
}

struct TrackerInner {
    active: Option<ActiveTransfer>,
    next_generation: u64,
    samples: VecDeque<TransferSample>,
    max_samples: usize,
    window: Duration,
}

/// Tracks the single in-flight transfer and the throughput of finished ones.
///
/// Holding an [`InFlight`] token is the only way to be "uploading"; the
/// token releases the slot when dropped, whatever the outcome was.
#[derive(Clone)]
pub struct BandwidthTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl Default for BandwidthTracker {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl BandwidthTracker {
    /// Creates a new tracker.
    ///
    /// - `window`: time window for throughput averaging (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner {
                active: None,
                next_generation: 0,
                samples: VecDeque::new(),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES),
                window: window.unwrap_or(DEFAULT_WINDOW),
            })),
        }
    }

    /// Claims the in-flight slot for a transfer of `bytes`.
    ///
    /// Fails with [`TransferError::AlreadyUploading`] if another transfer
    /// holds the slot.
    pub fn start_upload(&self, bytes: u64) -> Result<InFlight, TransferError> {
        let mut s = self.inner.lock().unwrap();
        if s.active.is_some() {
            return Err(TransferError::AlreadyUploading);
        }
        let generation = s.next_generation;
        s.next_generation += 1;
        let started_at = Instant::now();
        s.active = Some(ActiveTransfer { generation, bytes });
        Ok(InFlight {
            tracker: Arc::clone(&self.inner),
            generation,
            bytes,
            started_at,
            completed: false,
        })
    }

    /// Clears the in-flight slot. Calling it while idle does nothing.
    pub fn end_upload(&self) {
        self.inner.lock().unwrap().active = None;
    }

    /// Returns `true` while a transfer holds the slot.
    pub fn is_uploading(&self) -> bool {
        self.inner.lock().unwrap().active.is_some()
    }

    /// Bytes of the transfer currently in flight, 0 when idle.
    pub fn in_flight_bytes(&self) -> u64 {
        self.inner.lock().unwrap().active.as_ref().map_or(0, |a| a.bytes)
    }

    /// Throughput of completed transfers within the window, in kilobits
    /// per second. Returns 0.0 before any transfer completed.
    pub fn kbps(&self) -> f64 {
        let mut s = self.inner.lock().unwrap();
        prune(&mut s, Instant::now());

        let bytes: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        let elapsed: Duration = s.samples.iter().map(|sample| sample.elapsed).sum();
        if bytes == 0 || elapsed.is_zero() {
            return 0.0;
        }
        (bytes as f64 * 8.0 / 1000.0) / elapsed.as_secs_f64()
    }
}

fn prune(s: &mut TrackerInner, now: Instant) {
    let window = s.window;
    s.samples
        .retain(|sample| now.saturating_duration_since(sample.finished_at) <= window);
    while s.samples.len() > s.max_samples {
        s.samples.pop_front();
    }
}

// ---------------------------------------------------------------------------
// InFlight
// ---------------------------------------------------------------------------

/// Scoped claim on the tracker's in-flight slot.
///
/// Dropping the token releases the slot. Only transfers marked with
/// [`complete`](Self::complete) contribute to throughput.
pub struct InFlight {
    tracker: Arc<Mutex<TrackerInner>>,
    generation: u64,
    bytes: u64,
    started_at: Instant,
    completed: bool,
}

impl InFlight {
    /// Marks the transfer as successfully acknowledged.
    pub fn complete(mut self) {
        self.completed = true;
    }

    /// Bytes covered by this transfer.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut s = match self.tracker.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };

        // The slot may have been force-cleared by `end_upload` and reused.
        if s.active.as_ref().is_some_and(|a| a.generation == self.generation) {
            s.active = None;
        }

        if self.completed {
            let now = Instant::now();
            s.samples.push_back(TransferSample {
                bytes: self.bytes,
                elapsed: now.duration_since(self.started_at),
                finished_at: now,
            });
            prune(&mut s, now);
        }
    }
}
