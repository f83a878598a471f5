use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::try_join_all;
use thiserror::Error;
use tokio::sync::watch;

use crate::dictionary::{Cursor, Dictionary};
use crate::requester::{Fetch, RequestError, Response};
use crate::scanner::Scanner;

#[derive(Debug, Error)]
pub enum FuzzerError {
    #[error("failed to calibrate scanner for suffix '{suffix}': {source}")]
    ClassifierSetup {
        suffix: String,
        #[source]
        source: RequestError,
    },
}

/// One classified dictionary entry. `status` is `None` when the path was
/// judged not found.
#[derive(Clone, Debug)]
pub struct ScanPath {
    pub path: String,
    pub status: Option<u16>,
    pub response: Response,
}

pub type PathCallback = Arc<dyn Fn(&ScanPath) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Ordered callback lists, run synchronously on the worker that produced
/// the result.
#[derive(Clone, Default)]
pub struct Callbacks {
    matched: Vec<PathCallback>,
    not_found: Vec<PathCallback>,
    errors: Vec<ErrorCallback>,
}

impl Callbacks {
    pub fn on_match<C>(&mut self, callback: C) -> &mut Self
    where
        C: Fn(&ScanPath) + Send + Sync + 'static,
    {
        self.matched.push(Arc::new(callback));
        self
    }

    pub fn on_not_found<C>(&mut self, callback: C) -> &mut Self
    where
        C: Fn(&ScanPath) + Send + Sync + 'static,
    {
        self.not_found.push(Arc::new(callback));
        self
    }

    /// `callback(path, message)` for requests that failed for good.
    pub fn on_error<C>(&mut self, callback: C) -> &mut Self
    where
        C: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.errors.push(Arc::new(callback));
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct PoolOptions {
    pub threads: usize,
    pub failed_path: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Running,
    Paused,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default)]
struct RunState {
    started: bool,
    running: bool,
    paused: bool,
    active: usize,
    parked: usize,
}

struct Scanners {
    default: Scanner,
    dirs: Scanner,
    extensions: Vec<Scanner>,
}

impl Scanners {
    fn for_path(&self, path: &str) -> &Scanner {
        if path.ends_with('/') {
            return &self.dirs;
        }
        self.extensions
            .iter()
            .find(|s| path.ends_with(s.suffix()))
            .unwrap_or(&self.default)
    }
}

struct Worker<F> {
    fetcher: Arc<F>,
    dictionary: Arc<Dictionary>,
    scanners: Scanners,
    callbacks: Callbacks,
    state: Arc<watch::Sender<RunState>>,
    matches: Arc<Mutex<Vec<String>>>,
}

/// Decrements the active worker count however the worker ends.
struct ActiveGuard(Arc<watch::Sender<RunState>>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.send_modify(|s| s.active = s.active.saturating_sub(1));
    }
}

/// Fans the dictionary out to a set of workers for one base path.
pub struct WorkerPool<F: Fetch> {
    fetcher: Arc<F>,
    dictionary: Arc<Dictionary>,
    options: PoolOptions,
    callbacks: Callbacks,
    state: Arc<watch::Sender<RunState>>,
    matches: Arc<Mutex<Vec<String>>>,
}

impl<F: Fetch> WorkerPool<F> {
    pub fn new(
        fetcher: Arc<F>,
        dictionary: Arc<Dictionary>,
        options: PoolOptions,
        callbacks: Callbacks,
    ) -> Self {
        let (state, _) = watch::channel(RunState::default());
        Self {
            fetcher,
            dictionary,
            options,
            callbacks,
            state: Arc::new(state),
            matches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Calibrates one scanner per suffix class, then spawns the workers.
    pub async fn start(&self) -> Result<(), FuzzerError> {
        let fetcher = self.fetcher.as_ref();
        let failed_path = self.options.failed_path.as_deref();
        let calibrate = move |suffix: String| async move {
            Scanner::calibrate(fetcher, failed_path, &suffix)
                .await
                .map_err(|e| FuzzerError::ClassifierSetup { suffix, source: e })
        };
        let extensions = self
            .dictionary
            .extensions()
            .iter()
            .filter(|ext| !ext.trim().is_empty())
            .map(|ext| calibrate(format!(".{ext}")));
        let (default, dirs, extensions) = futures::try_join!(
            calibrate(String::new()),
            calibrate("/".to_string()),
            try_join_all(extensions),
        )?;
        let scanners = Scanners {
            default,
            dirs,
            extensions,
        };

        self.dictionary.reset_cursor();
        let workers = self.options.threads.max(1).min(self.dictionary.len());
        self.state.send_modify(|s| {
            *s = RunState {
                started: true,
                running: true,
                paused: true,
                active: workers,
                parked: 0,
            }
        });

        let worker = Arc::new(Worker {
            fetcher: Arc::clone(&self.fetcher),
            dictionary: Arc::clone(&self.dictionary),
            scanners,
            callbacks: self.callbacks.clone(),
            state: Arc::clone(&self.state),
            matches: Arc::clone(&self.matches),
        });
        for _ in 0..workers {
            tokio::spawn(work(Arc::clone(&worker)));
        }
        tracing::debug!(workers, entries = self.dictionary.len(), "worker pool started");

        self.state.send_modify(|s| s.paused = false);
        Ok(())
    }

    /// Returns once every live worker is parked at the gate.
    pub async fn pause(&self) {
        self.state.send_modify(|s| s.paused = true);
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|s| !s.running || s.parked >= s.active)
            .await
            .map(|_| ());
    }

    pub fn resume(&self) {
        self.state.send_modify(|s| s.paused = false);
    }

    pub fn stop(&self) {
        self.state.send_modify(|s| {
            s.running = false;
            s.paused = false;
        });
    }

    /// `true` once all workers have exited, `false` if `timeout` elapsed first.
    pub async fn await_completion(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|s| s.active == 0))
            .await
            .is_ok_and(|waited| waited.is_ok())
    }

    pub fn state(&self) -> PoolState {
        let s = *self.state.borrow();
        if !s.started {
            PoolState::Idle
        } else if !s.running || s.active == 0 {
            PoolState::Stopped
        } else if s.paused {
            PoolState::Paused
        } else {
            PoolState::Running
        }
    }

    pub fn matches(&self) -> Vec<String> {
        match self.matches.lock() {
            Ok(matches) => matches.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

async fn work<F: Fetch>(worker: Arc<Worker<F>>) {
    let _guard = ActiveGuard(Arc::clone(&worker.state));
    let mut rx = worker.state.subscribe();
    loop {
        if !pass_gate(&worker.state, &mut rx).await {
            break;
        }
        let path = match worker.dictionary.next_entry() {
            Cursor::Next { path, .. } => path.to_string(),
            Cursor::Exhausted => break,
        };
        let scanner = worker.scanners.for_path(&path);

        let response = match worker.fetcher.fetch(&path).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%path, error = %err, "request failed");
                let message = err.to_string();
                for callback in worker.callbacks.errors.iter() {
                    callback(&path, &message);
                }
                continue;
            }
        };

        let matched = scanner.is_match(&response) && response.status != 404;
        let result = ScanPath {
            status: matched.then_some(response.status),
            path,
            response,
        };
        if matched {
            if let Ok(mut matches) = worker.matches.lock() {
                matches.push(result.path.clone());
            }
            for callback in worker.callbacks.matched.iter() {
                callback(&result);
            }
        } else {
            for callback in worker.callbacks.not_found.iter() {
                callback(&result);
            }
        }
    }
}

/// Parks while the pool is paused. `false` means the worker should exit.
async fn pass_gate(state: &watch::Sender<RunState>, rx: &mut watch::Receiver<RunState>) -> bool {
    let snapshot = *rx.borrow_and_update();
    if !snapshot.running {
        return false;
    }
    if !snapshot.paused {
        return true;
    }
    state.send_modify(|s| s.parked += 1);
    let running = rx
        .wait_for(|s| !s.paused || !s.running)
        .await
        .map(|s| s.running)
        .unwrap_or(false);
    state.send_modify(|s| s.parked = s.parked.saturating_sub(1));
    running
}
