//! Persistent usage tracker.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    hookrelay_common::types::now_ms,
    tokio::{sync::broadcast::error::RecvError, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use hookrelay_metrics::{counter, labels, usage as usage_metrics};

use crate::{
    error::{Error, Result},
    event::{UsageEvent, UsageEventBus},
    types::{Period, TokenUsageData, UsageSummary},
};

/// What [`TokenUsageTracker::load`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    /// The file existed but could not be read or parsed; counting starts fresh.
    Discarded,
}

struct TrackerState {
    data: TokenUsageData,
    /// Bumped on every mutation; a save only clears `dirty` if nothing changed
    /// while it was writing.
    generation: u64,
    dirty: bool,
}

/// Background tasks of one `start`..`stop` run.
struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    path: PathBuf,
    autosave_interval: Duration,
    state: Mutex<TrackerState>,
    running: Mutex<Option<Running>>,
}

/// In-memory usage aggregate with periodic JSON persistence.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TokenUsageTracker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenUsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenUsageTracker")
            .field("path", &self.inner.path)
            .field("autosave_interval", &self.inner.autosave_interval)
            .finish_non_exhaustive()
    }
}

impl TokenUsageTracker {
    pub fn new(path: impl Into<PathBuf>, autosave_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                autosave_interval,
                state: Mutex::new(TrackerState {
                    data: TokenUsageData::new(now_ms()),
                    generation: 0,
                    dirty: false,
                }),
                running: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Replace in-memory state with the snapshot on disk, applying window
    /// expiry. A missing or unreadable file leaves a fresh aggregate.
    pub async fn load(&self) -> LoadOutcome {
        let path = &self.inner.path;
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no usage snapshot yet");
                self.replace(TokenUsageData::new(now_ms()), false);
                return LoadOutcome::Missing;
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read usage snapshot, starting fresh");
                self.replace(TokenUsageData::new(now_ms()), false);
                return LoadOutcome::Discarded;
            },
        };

        match serde_json::from_str::<TokenUsageData>(&raw) {
            Ok(mut data) => {
                let expired = data.expire_stale(now_ms());
                if !expired.is_empty() {
                    debug!(?expired, "usage windows expired while offline");
                }
                self.replace(data, !expired.is_empty());
                LoadOutcome::Loaded
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed usage snapshot, starting fresh");
                self.replace(TokenUsageData::new(now_ms()), false);
                LoadOutcome::Discarded
            },
        }
    }

    fn replace(&self, data: TokenUsageData, dirty: bool) {
        let mut state = self.lock_state();
        state.data = data;
        state.generation += 1;
        state.dirty = dirty;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fold one event into every window.
    pub fn record(&self, event: &UsageEvent) {
        self.record_at(event, now_ms());
    }

    pub fn record_at(&self, event: &UsageEvent, now: i64) {
        {
            let mut state = self.lock_state();
            state.data.record(event, now);
            state.generation += 1;
            state.dirty = true;
        }

        #[cfg(feature = "metrics")]
        {
            counter!(usage_metrics::EVENTS_TOTAL, labels::PROVIDER => event.provider.clone())
                .increment(1);
            counter!(
                usage_metrics::TOKENS_TOTAL,
                labels::PROVIDER => event.provider.clone(),
                labels::KIND => "total"
            )
            .increment(event.total_tokens());
        }
    }

    /// Deep copy of the current aggregate.
    #[must_use]
    pub fn get_data(&self) -> TokenUsageData {
        self.lock_state().data.clone()
    }

    #[must_use]
    pub fn summary(&self) -> UsageSummary {
        self.lock_state().data.summary()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.lock_state().dirty
    }

    /// Write the whole aggregate to disk (temp file, then rename).
    pub async fn save(&self) -> Result<()> {
        let (snapshot, generation) = {
            let state = self.lock_state();
            (state.data.clone(), state.generation)
        };

        let result = write_snapshot(&self.inner.path, &snapshot).await;

        #[cfg(feature = "metrics")]
        counter!(usage_metrics::SAVES_TOTAL, labels::SUCCESS => result.is_ok().to_string())
            .increment(1);

        result?;
        let mut state = self.lock_state();
        if state.generation == generation {
            state.dirty = false;
        }
        Ok(())
    }

    /// Save only when something changed since the last successful save.
    pub async fn save_if_dirty(&self) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }

    /// Clear one window, or everything, and persist immediately.
    pub async fn reset(&self, period: Option<Period>) -> Result<()> {
        {
            let mut state = self.lock_state();
            state.data.reset(period, now_ms());
            state.generation += 1;
            state.dirty = true;
        }
        info!(period = period.map_or("all", Period::as_str), "usage counters reset");
        self.save().await
    }

    /// Subscribe to `bus` and start the autosave timer.
    ///
    /// A no-op while already running. After [`stop`](Self::stop) the tracker
    /// can be started again.
    pub fn start(&self, bus: &UsageEventBus) {
        let mut running = self.inner.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let mut rx = bus.subscribe();
        let listener = {
            let tracker = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        received = rx.recv() => match received {
                            Ok(event) => tracker.record(&event),
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "usage tracker lagged behind the event bus");
                            },
                            Err(RecvError::Closed) => break,
                        },
                    }
                }
                // Fold events emitted before the cancel into the final save.
                while let Ok(event) = rx.try_recv() {
                    tracker.record(&event);
                }
            })
        };

        let autosave = {
            let tracker = self.clone();
            let cancel = cancel.clone();
            let period = self.inner.autosave_interval.max(Duration::from_millis(10));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = tracker.save_if_dirty().await {
                                warn!(error = %e, "usage autosave failed");
                            }
                        },
                    }
                }
            })
        };

        *running = Some(Running {
            cancel,
            tasks: vec![listener, autosave],
        });
    }

    /// Whether the bus listener and autosave timer are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Stop listening and autosaving, then flush once if dirty. Idempotent.
    pub async fn stop(&self) {
        let running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(running) = running {
            running.cancel.cancel();
            for task in running.tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "usage tracker task ended abnormally");
                }
            }
        }

        match self.save_if_dirty().await {
            Ok(true) => debug!(path = %self.inner.path.display(), "usage snapshot flushed"),
            Ok(false) => {},
            Err(e) => warn!(error = %e, "final usage save failed"),
        }
    }
}

async fn write_snapshot(path: &Path, data: &TokenUsageData) -> Result<()> {
    let json = serde_json::to_vec_pretty(data)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::write(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| Error::write(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::write(path, e))?;
    Ok(())
}
