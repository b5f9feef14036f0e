//! Persists every bus event as a line-delimited JSON log, one file per
//! project, alongside the structured `tracing` output. This is the durable
//! audit trail a `--stream` CLI invocation tails live.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::bus::EventBus;
use super::types::ObraEvent;

pub struct EventLogger {
    path: PathBuf,
}

impl EventLogger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Spawns a background task that drains `bus` and appends each event as
    /// one JSON line. Runs until the bus is dropped or the process exits;
    /// intended to be fire-and-forget from `main`.
    pub fn spawn(self, bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        let path = self.path;
        tokio::spawn(async move {
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await;
            let mut file = match file {
                Ok(f) => f,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "event logger: could not open log file");
                    return;
                }
            };
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = write_line(&mut file, &event).await {
                            warn!(error = %e, "event logger: write failed");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event logger: receiver lagged, some events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

async fn write_line(file: &mut tokio::fs::File, event: &ObraEvent) -> std::io::Result<()> {
    let mut line = serde_json::to_string(event).unwrap_or_default();
    line.push('\n');
    file.write_all(line.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::EventBus;

    #[tokio::test]
    async fn logged_events_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let bus = EventBus::new();
        let handle = EventLogger::new(path.clone()).spawn(&bus);

        bus.emit(ObraEvent::TaskCancelled { task_id: "t1".into() });
        // Give the background task a chance to drain and write.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(bus);
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("task_cancelled"));
    }
}
