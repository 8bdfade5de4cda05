//! The upload engine.
//!
//! A single poll loop drives the queue. Each tick looks at the record with
//! the smallest key and sends at most one chunk of it; the response, handled
//! on its own task, advances and persists the offset. Server errors widen
//! the poll period until the next success.

use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use upqueue_filters::{FilterPipeline, UploadFilter};
use upqueue_store::RecordStore;
use upqueue_transfer::{
    BandwidthTracker, ChunkRange, InFlight, QueueIndex, RecordKey, UploadRecord, chunk_count,
    parse_key, validate_filename,
};

use crate::config::EngineConfig;
use crate::error::UploadError;
use crate::source::FileSource;
use crate::transport::{
    ChunkRequest, HttpTransport, TransferOutcome, chunk_url, header_value, validate_endpoint,
};
use crate::types::{RecordProgress, UploadEvent};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Resumable chunked uploader over a persistent record store.
///
/// Methods that start background work (`enqueue`, `upload`) must be called
/// from within a tokio runtime.
pub struct UploadEngine {
    inner: Arc<EngineInner>,
    events_rx: Mutex<Option<mpsc::Receiver<UploadEvent>>>,
}

struct EngineInner {
    config: EngineConfig,
    endpoint: RwLock<String>,
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn HttpTransport>,
    filters: Mutex<FilterPipeline>,
    tracker: BandwidthTracker,
    index: Mutex<QueueIndex>,
    timer: Mutex<Option<PollTimer>>,
    poll_lock: tokio::sync::Mutex<()>,
    events_tx: mpsc::Sender<UploadEvent>,
}

/// Handle on the running poll loop.
struct PollTimer {
    cancel: CancellationToken,
    period: watch::Sender<Duration>,
}

impl UploadEngine {
    /// Creates an engine over `store`, resuming whatever it already holds.
    ///
    /// Records left without data by a previous process are removed, as are
    /// records that fail to decode; each is reported as
    /// [`UploadEvent::Failed`].
    ///
    /// Fails with [`UploadError::InvalidEndpoint`] unless the configured
    /// endpoint is an http(s) URL.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, UploadError> {
        validate_endpoint(&config.endpoint)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let index = QueueIndex::scan(store.as_ref())?;

        let inner = Arc::new(EngineInner {
            endpoint: RwLock::new(config.endpoint.clone()),
            config,
            store,
            transport,
            filters: Mutex::new(FilterPipeline::new()),
            tracker: BandwidthTracker::default(),
            index: Mutex::new(index),
            timer: Mutex::new(None),
            poll_lock: tokio::sync::Mutex::new(()),
            events_tx,
        });
        inner.recover()?;

        Ok(Self {
            inner,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// Queues `file` and returns its record key.
    ///
    /// The record is persisted before this returns; the file is read and
    /// filtered in the background and only becomes eligible for transfer
    /// once its data is stored.
    pub fn enqueue(&self, file: impl FileSource + 'static) -> Result<RecordKey, UploadError> {
        validate_filename(file.name())?;
        let file: Arc<dyn FileSource> = Arc::new(file);

        let record = {
            let mut index = self.inner.index.lock().unwrap();
            let key = index.reserve();
            let mut record = UploadRecord::new(key);
            record.set_filename(file.name());
            record.set_mime_type(file.mime_type());
            if let Err(e) = record.save(self.inner.store.as_ref()) {
                index.remove(key);
                return Err(e.into());
            }
            record
        };

        let key = record.key();
        info!(key, filename = file.name(), mime_type = file.mime_type(), "file queued");

        let filters = self.inner.filters.lock().unwrap().clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.load_data(record, file, filters).await });

        Ok(key)
    }

    /// Starts the poll loop. Does nothing if it is already running.
    pub fn upload(&self) {
        let mut timer = self.inner.timer.lock().unwrap();
        if timer.is_some() {
            return;
        }
        let period = self.inner.config.poll_interval();
        *timer = Some(spawn_poll_loop(&self.inner, period));
        info!(period_ms = period.as_millis() as u64, "upload started");
    }

    /// Stops the poll loop. A chunk already in flight still completes.
    pub fn stop(&self) {
        self.inner.stop_timer();
    }

    /// Runs one poll step.
    ///
    /// Returns without doing anything if a chunk is in flight or another
    /// poll is running.
    pub async fn poll(&self) {
        self.inner.poll().await;
    }

    /// Removes every queued record. Returns how many were removed.
    ///
    /// A chunk in flight for a removed record is reported as orphaned when
    /// its response arrives.
    pub fn clear(&self) -> Result<usize, UploadError> {
        let mut index = self.inner.index.lock().unwrap();
        index.drain();

        let mut removed = 0;
        for key in self.inner.store.keys()? {
            if parse_key(&key).is_some() {
                self.inner.store.remove(&key)?;
                removed += 1;
            }
        }
        info!(removed, "upload queue cleared");
        Ok(removed)
    }

    /// Changes the base URL for subsequent chunks.
    ///
    /// An invalid URL is rejected and the current endpoint is kept.
    pub fn set_endpoint(&self, endpoint: impl Into<String>) -> Result<(), UploadError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;
        debug!(endpoint = %endpoint, "upload endpoint changed");
        *self.inner.endpoint.write().unwrap() = endpoint;
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        self.inner.endpoint.read().unwrap().clone()
    }

    /// Registers a filter for files enqueued from now on.
    ///
    /// Returns `false` if this instance is already registered.
    pub fn add_filter(&self, filter: Arc<dyn UploadFilter>) -> bool {
        self.inner.filters.lock().unwrap().add(filter)
    }

    /// Recent throughput in kilobits per second.
    pub fn kbps(&self) -> f64 {
        self.inner.tracker.kbps()
    }

    /// Returns `true` while the poll loop is armed.
    pub fn is_running(&self) -> bool {
        self.inner.timer.lock().unwrap().is_some()
    }

    /// Returns `true` while a chunk request is in flight.
    pub fn is_uploading(&self) -> bool {
        self.inner.tracker.is_uploading()
    }

    /// Number of records waiting in the queue, including any being read.
    pub fn queue_len(&self) -> usize {
        self.inner.index.lock().unwrap().len()
    }

    /// Current poll period, or `None` when stopped.
    pub fn current_interval(&self) -> Option<Duration> {
        self.inner
            .timer
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| *t.period.borrow())
    }

    /// Snapshot of the queue in upload order.
    pub fn queued(&self) -> Result<Vec<RecordProgress>, UploadError> {
        let keys: Vec<RecordKey> = self.inner.index.lock().unwrap().keys().collect();
        let mut queued = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = UploadRecord::find(self.inner.store.as_ref(), key)? {
                queued.push(RecordProgress::from(&record));
            }
        }
        Ok(queued)
    }
}

impl Drop for UploadEngine {
    fn drop(&mut self) {
        self.inner.stop_timer();
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

fn spawn_poll_loop(inner: &Arc<EngineInner>, period: Duration) -> PollTimer {
    let cancel = CancellationToken::new();
    let (period_tx, mut period_rx) = watch::channel(period);
    let engine: Weak<EngineInner> = Arc::downgrade(inner);
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut ticker = new_ticker(period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = period_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let period = *period_rx.borrow_and_update();
                    ticker = new_ticker(period);
                }
                _ = ticker.tick() => {
                    let Some(inner) = engine.upgrade() else {
                        break;
                    };
                    inner.poll().await;
                }
            }
        }
        trace!("poll loop exited");
    });

    PollTimer {
        cancel,
        period: period_tx,
    }
}

/// Interval whose first tick is one full period away.
fn new_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl EngineInner {
    fn stop_timer(&self) {
        if let Some(timer) = self.timer.lock().unwrap().take() {
            timer.cancel.cancel();
            info!("upload stopped");
        }
    }

    /// Switches the poll period. Has no effect while stopped.
    fn set_interval(&self, period: Duration) {
        if let Some(timer) = self.timer.lock().unwrap().as_ref() {
            let changed = timer.period.send_if_modified(|current| {
                if *current == period {
                    return false;
                }
                *current = period;
                true
            });
            if changed {
                debug!(period_ms = period.as_millis() as u64, "poll period changed");
            }
        }
    }

    async fn poll(self: &Arc<Self>) {
        let Ok(_guard) = self.poll_lock.try_lock() else {
            return;
        };
        if self.tracker.is_uploading() {
            return;
        }

        let Some(key) = self.index.lock().unwrap().min_key() else {
            if self.config.stop_when_empty {
                debug!("queue empty");
                self.stop_timer();
            }
            return;
        };

        let record = match UploadRecord::find(self.store.as_ref(), key) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(key, "queued record missing from store, skipping");
                self.index.lock().unwrap().remove(key);
                return;
            }
            Err(e) if e.is_corrupt() => {
                self.abandon(key, None, e.to_string());
                return;
            }
            Err(e) => {
                error!(key, error = %e, "failed to load record");
                return;
            }
        };

        if !record.is_loaded() {
            trace!(key, "record data not ready");
            return;
        }

        let Some(range) = record.next_range(self.config.chunk_size()) else {
            self.finish(record);
            return;
        };
        let Some(body) = record.chunk(&range) else {
            return;
        };
        let Ok(token) = self.tracker.start_upload(range.len()) else {
            return;
        };

        let request = self.build_request(&record, &range, body.to_vec());
        debug!(
            key,
            url = %request.url,
            range = %range.content_range(),
            "sending chunk"
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.send_chunk(key, request, token).await });
    }

    fn build_request(&self, record: &UploadRecord, range: &ChunkRange, body: Vec<u8>) -> ChunkRequest {
        let filename = record.filename().unwrap_or_default();
        let endpoint = self.endpoint.read().unwrap().clone();

        ChunkRequest {
            method: self.config.method,
            url: chunk_url(&endpoint, filename),
            headers: vec![
                (self.config.filename_header.clone(), header_value(filename)),
                ("Content-Range".into(), range.content_range()),
                ("Content-Type".into(), record.mime_type().to_string()),
            ],
            body,
        }
    }

    async fn send_chunk(&self, key: RecordKey, request: ChunkRequest, token: InFlight) {
        let timeout = self.config.request_timeout();
        let outcome = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(key, timeout_secs = timeout.as_secs(), "chunk request timed out");
                TransferOutcome::Aborted
            }
        };

        match outcome {
            outcome if outcome.is_success() => self.chunk_acknowledged(key, token),
            TransferOutcome::Status(status) => {
                warn!(key, status, "server rejected chunk, backing off");
                self.set_interval(self.config.error_interval());
                drop(token);
                self.emit(UploadEvent::Progress(self.active_progress()));
            }
            TransferOutcome::Failed(reason) => {
                warn!(key, error = %reason, "chunk request failed");
            }
            TransferOutcome::Aborted => {
                debug!(key, "chunk request aborted");
            }
        }
    }

    fn chunk_acknowledged(&self, key: RecordKey, token: InFlight) {
        // Held until the new position is saved so a concurrent `clear()`
        // cannot be undone by the write.
        let mut index = self.index.lock().unwrap();
        let found = if index.contains(key) {
            UploadRecord::find(self.store.as_ref(), key)
        } else {
            Ok(None)
        };

        let mut record = match found {
            Ok(Some(record)) => record,
            Ok(None) => {
                index.remove(key);
                drop(index);
                warn!(key, "response for a record that is no longer queued");
                drop(token);
                self.emit(UploadEvent::Orphaned { key });
                return;
            }
            Err(e) => {
                drop(index);
                error!(key, error = %e, "failed to reload record after chunk");
                return;
            }
        };

        record.set_position(record.position() + self.config.chunk_size());
        let saved = record.save(self.store.as_ref());
        drop(index);
        if let Err(e) = saved {
            error!(key, error = %e, "failed to save upload position");
            return;
        }

        let bytes = token.bytes();
        token.complete();

        trace!(
            key,
            bytes,
            position = record.position(),
            length = record.length(),
            "chunk acknowledged"
        );
        self.set_interval(self.config.poll_interval());
        self.emit(UploadEvent::Progress(Some(RecordProgress::from(&record))));
    }

    /// Removes a fully acknowledged record.
    fn finish(&self, record: UploadRecord) {
        let key = record.key();
        if let Err(e) = record.free(self.store.as_ref()) {
            error!(key, error = %e, "failed to remove completed record");
            return;
        }
        self.index.lock().unwrap().remove(key);
        info!(key, filename = ?record.filename(), length = record.length(), "upload complete");

        self.emit(UploadEvent::Progress(self.active_progress()));
        self.emit(UploadEvent::FileComplete {
            key,
            filename: record.filename().map(str::to_string),
        });
    }

    /// Drops a record that can never be uploaded.
    fn abandon(&self, key: RecordKey, filename: Option<String>, error: String) {
        {
            let mut index = self.index.lock().unwrap();
            if let Err(e) = self.store.remove(&key.to_string()) {
                error!(key, error = %e, "failed to remove abandoned record");
            }
            index.remove(key);
        }
        warn!(key, filename = ?filename, error = %error, "upload abandoned");
        self.emit(UploadEvent::Failed {
            key,
            filename,
            error,
        });
    }

    fn active_progress(&self) -> Option<RecordProgress> {
        let key = self.index.lock().unwrap().min_key()?;
        match UploadRecord::find(self.store.as_ref(), key) {
            Ok(record) => record.as_ref().map(RecordProgress::from),
            Err(e) => {
                debug!(key, error = %e, "cannot report progress");
                None
            }
        }
    }

    fn emit(&self, event: UploadEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events_tx.try_send(event) {
            debug!(?event, "event channel full, dropping event");
        }
    }

    // -----------------------------------------------------------------------
    // File data
    // -----------------------------------------------------------------------

    async fn load_data(
        self: Arc<Self>,
        mut record: UploadRecord,
        file: Arc<dyn FileSource>,
        filters: FilterPipeline,
    ) {
        let key = record.key();
        let attempts = self.config.read_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match read_filtered(file.as_ref(), &filters).await {
                Ok(data) => {
                    let length = data.len();
                    record.set_data(data);

                    let index = self.index.lock().unwrap();
                    if !index.contains(key) {
                        debug!(key, "record removed before its data was read");
                        return;
                    }
                    match record.save(self.store.as_ref()) {
                        Ok(()) => {
                            let chunks = chunk_count(length as u64, self.config.chunk_size());
                            debug!(key, length, chunks, "file data stored");
                            return;
                        }
                        Err(e) => {
                            last_error = e.to_string();
                            drop(index);
                            error!(key, error = %e, "failed to store file data");
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(key, attempt, attempts, error = %e, "failed to read file");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.error_interval()).await;
                    }
                }
            }
        }

        if self.index.lock().unwrap().contains(key) {
            self.abandon(key, record.filename().map(str::to_string), last_error);
        }
    }

    /// Removes records that can no longer be uploaded.
    fn recover(&self) -> Result<(), UploadError> {
        let keys: Vec<RecordKey> = self.index.lock().unwrap().keys().collect();
        for key in keys {
            match UploadRecord::find(self.store.as_ref(), key) {
                Ok(Some(record)) if record.is_loaded() => {
                    debug!(key, position = record.position(), length = record.length(), "resuming record");
                }
                Ok(Some(record)) => {
                    let filename = record.filename().map(str::to_string);
                    self.abandon(key, filename, "file data was never stored".into());
                }
                Ok(None) => {
                    self.index.lock().unwrap().remove(key);
                }
                Err(e) if e.is_corrupt() => self.abandon(key, None, e.to_string()),
                Err(e) => return Err(e.into()),
            }
        }

        let pending = self.index.lock().unwrap().len();
        if pending > 0 {
            info!(pending, "resuming queued uploads");
        }
        Ok(())
    }
}

async fn read_filtered(
    file: &dyn FileSource,
    filters: &FilterPipeline,
) -> Result<Vec<u8>, UploadError> {
    let data = file.read().await?;
    Ok(filters.run(data).await?)
}
