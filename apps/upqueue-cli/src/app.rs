//! Wires the store, transport and engine together and drains the queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, error, info, warn};
use upqueue_filters::ResizeFilter;
use upqueue_store::DirStore;
use upqueue_uploader::{LocalFile, ReqwestTransport, UploadEngine, UploadEvent};

use crate::config::Config;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Queues `files` and uploads until the queue is empty or the user
/// interrupts.
pub async fn run(config: Config, files: Vec<PathBuf>, clear: bool) -> anyhow::Result<()> {
    let store = Arc::new(DirStore::open(&config.store_dir)?);
    let transport = Arc::new(ReqwestTransport::new()?);
    let engine = UploadEngine::new(config.engine.clone(), store, transport)?;
    let mut events = engine
        .take_events()
        .ok_or_else(|| anyhow!("event stream already taken"))?;

    if clear {
        let removed = engine.clear()?;
        info!(removed, "queue cleared");
        return Ok(());
    }

    if let Some(resize) = config.resize {
        engine.add_filter(Arc::new(ResizeFilter::new(
            resize.max_width,
            resize.max_height,
        )));
    }

    for path in files {
        let key = engine.enqueue(LocalFile::new(&path)?)?;
        info!(key, path = %path.display(), "queued");
    }

    if engine.queue_len() == 0 {
        info!("nothing to upload");
        return Ok(());
    }

    engine.upload();
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                if log_event(event) && engine.queue_len() == 0 {
                    info!("all uploads finished");
                    break;
                }
            }
            _ = status.tick() => {
                info!(
                    queued = engine.queue_len(),
                    kbps = %format!("{:.1}", engine.kbps()),
                    "uploading"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, progress is saved and will resume on next run");
                break;
            }
        }
    }

    engine.stop();
    Ok(())
}

/// Logs `event`. Returns `true` if a record left the queue.
fn log_event(event: UploadEvent) -> bool {
    match event {
        UploadEvent::Progress(Some(p)) => {
            debug!(
                key = p.key,
                filename = ?p.filename,
                position = p.position,
                length = p.length,
                percent = %format!("{:.1}", p.fraction() * 100.0),
                "progress"
            );
            false
        }
        UploadEvent::Progress(None) => false,
        UploadEvent::FileComplete { key, filename } => {
            info!(key, filename = ?filename, "upload finished");
            true
        }
        UploadEvent::Failed {
            key,
            filename,
            error,
        } => {
            error!(key, filename = ?filename, error = %error, "upload failed");
            true
        }
        UploadEvent::Orphaned { key } => {
            warn!(key, "response arrived for a removed upload");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upqueue_uploader::RecordProgress;

    #[test]
    fn progress_does_not_leave_queue() {
        let p = RecordProgress {
            key: 1,
            filename: Some("a.bin".into()),
            position: 10,
            length: 20,
        };
        assert!(!log_event(UploadEvent::Progress(Some(p))));
        assert!(!log_event(UploadEvent::Progress(None)));
    }

    #[test]
    fn terminal_events_leave_queue() {
        assert!(log_event(UploadEvent::FileComplete {
            key: 1,
            filename: None
        }));
        assert!(log_event(UploadEvent::Failed {
            key: 2,
            filename: Some("b.bin".into()),
            error: "gone".into()
        }));
        assert!(log_event(UploadEvent::Orphaned { key: 3 }));
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("photo.jpg");
        std::fs::write(&data, b"not really a jpeg").unwrap();

        let config = Config {
            store_dir: tmp.path().join("queue"),
            ..Config::default()
        };

        {
            let store = Arc::new(DirStore::open(&config.store_dir).unwrap());
            let transport = Arc::new(ReqwestTransport::new().unwrap());
            let engine = UploadEngine::new(config.engine.clone(), store, transport).unwrap();
            engine.enqueue(LocalFile::new(&data).unwrap()).unwrap();
            assert_eq!(engine.queue_len(), 1);

            // Let the background read finish before the engine goes away.
            while engine.queued().unwrap()[0].length == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        run(config.clone(), Vec::new(), true).await.unwrap();

        let store = Arc::new(DirStore::open(&config.store_dir).unwrap());
        let transport = Arc::new(ReqwestTransport::new().unwrap());
        let engine = UploadEngine::new(config.engine, store, transport).unwrap();
        assert_eq!(engine.queue_len(), 0);
    }

    #[tokio::test]
    async fn nothing_queued_returns() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            store_dir: tmp.path().join("queue"),
            ..Config::default()
        };
        run(config, Vec::new(), false).await.unwrap();
    }
}
