pub mod filters;
pub mod interrupt;
pub mod reports;

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

use crate::dictionary::{Dictionary, DictionaryError, DictionaryOptions};
use crate::fuzzer::{Callbacks, PoolOptions, WorkerPool};
use crate::output::{CliOutput, ReportController, ReportError, ReportFormat};
use crate::requester::{RequestError, Requester, RequesterOptions, Response};

pub use filters::MatchFilter;
pub use interrupt::{parse_choice, InterruptAction};
pub use reports::ErrorLog;

const DEFAULT_WORDLIST: &str = include_str!("../../db/dicc.txt");
const POLL_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("--exclude-subdirs only makes sense together with --recursive")]
    RecursionExclusionConflict,
    #[error("no target URL given")]
    NoTargets,
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("failed to open error log {path}: {source}")]
    ErrorLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a scan run needs, resolved from flags, config file and defaults.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub urls: Vec<String>,
    /// Bundled wordlist when `None`.
    pub wordlist: Option<PathBuf>,
    pub dictionary: DictionaryOptions,
    pub threads: usize,
    pub recursive: bool,
    pub exclude_subdirs: Vec<String>,
    pub subdirs: Vec<String>,
    pub exclude_status: HashSet<u16>,
    pub suppress_empty: bool,
    pub failed_path: Option<String>,
    pub requester: RequesterOptions,
    pub random_agents: bool,
    pub simple_report: Option<PathBuf>,
    pub plain_report: Option<PathBuf>,
    pub json_report: Option<PathBuf>,
    pub autosave: bool,
    pub autosave_format: ReportFormat,
    /// Root of `reports/` and `logs/`.
    pub save_dir: PathBuf,
    pub data_dir: Option<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            wordlist: None,
            dictionary: DictionaryOptions::default(),
            threads: 10,
            recursive: false,
            exclude_subdirs: Vec::new(),
            subdirs: Vec::new(),
            exclude_status: HashSet::new(),
            suppress_empty: false,
            failed_path: None,
            requester: RequesterOptions::default(),
            random_agents: false,
            simple_report: None,
            plain_report: None,
            json_report: None,
            autosave: true,
            autosave_format: ReportFormat::Plain,
            save_dir: PathBuf::from("."),
            data_dir: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetOutcome {
    Completed,
    Skipped,
    Exit,
}

#[derive(Clone, Debug, Default)]
pub struct ScanSummary {
    pub targets_scanned: usize,
    pub targets_skipped: usize,
    pub directories: usize,
    pub matches: usize,
    pub errors: usize,
    pub reports: Vec<PathBuf>,
    pub cancelled: bool,
}

/// Per-target state touched from worker callbacks.
struct TargetScan {
    url: String,
    reports: ReportController,
    queue: Mutex<VecDeque<String>>,
    found: AtomicUsize,
    report_error: Mutex<Option<ReportError>>,
}

impl TargetScan {
    fn queue(&self) -> MutexGuard<'_, VecDeque<String>> {
        match self.queue.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, path: &str, status: u16, response: &Response) {
        self.found.fetch_add(1, Ordering::Relaxed);
        self.reports.add_path(path, status, response);
        if let Err(e) = self.reports.save() {
            if let Ok(mut slot) = self.report_error.lock() {
                slot.get_or_insert(e);
            }
        }
    }

    fn take_report_error(&self) -> Option<ReportError> {
        self.report_error.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// `admin` and `/admin/` both become `admin/`.
fn normalize_subdir(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Walks every target breadth first, one worker pool per directory.
pub struct Controller {
    options: ScanOptions,
    output: Arc<CliOutput>,
    dictionary: Arc<Dictionary>,
    filter: Arc<MatchFilter>,
    error_log: Arc<ErrorLog>,
}

impl Controller {
    pub async fn new(mut options: ScanOptions, output: Arc<CliOutput>) -> Result<Self, ScanError> {
        if options.urls.is_empty() {
            return Err(ScanError::NoTargets);
        }
        if !options.exclude_subdirs.is_empty() && !options.recursive {
            return Err(ScanError::RecursionExclusionConflict);
        }

        let dictionary = match options.wordlist.as_ref() {
            Some(path) => Dictionary::from_file(path, &options.dictionary).await?,
            None => Dictionary::build(
                DEFAULT_WORDLIST.lines().filter(|line| !line.trim().is_empty()),
                &options.dictionary,
            ),
        };

        let data_dir = options.data_dir.clone();
        let blacklists = filters::load_blacklists(data_dir.as_deref()).await;
        if options.random_agents {
            options.requester.random_agents = filters::load_user_agents(data_dir.as_deref()).await;
            if options.requester.random_agents.is_empty() {
                output.warning("No user agents found, sending the default one");
            }
        }
        options.subdirs = options
            .subdirs
            .iter()
            .map(|dir| normalize_subdir(dir))
            .filter(|dir| !dir.is_empty())
            .collect();

        let error_log = ErrorLog::create(&options.save_dir)?;
        let filter = MatchFilter {
            exclude_status: options.exclude_status.clone(),
            blacklists,
            suppress_empty: options.suppress_empty,
            recursive: options.recursive,
            exclude_subdirs: options.exclude_subdirs.clone(),
        };

        Ok(Self {
            options,
            output,
            dictionary: Arc::new(dictionary),
            filter: Arc::new(filter),
            error_log: Arc::new(error_log),
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    pub async fn run(&self) -> Result<ScanSummary, ScanError> {
        self.output.config(
            self.dictionary.extensions(),
            self.options.threads,
            self.dictionary.len(),
        );
        let batch_dir = if self.options.autosave && self.options.urls.len() > 1 {
            let dir = reports::create_batch_dir(&self.options.save_dir, &self.options.urls)?;
            self.output
                .line(&format!("\nAutosave path: {}", dir.display()));
            Some(dir)
        } else {
            None
        };
        self.output.start_progress();

        let mut summary = ScanSummary::default();
        for url in self.options.urls.iter() {
            match self.scan_target(url, batch_dir.as_deref(), &mut summary).await? {
                TargetOutcome::Completed => summary.targets_scanned += 1,
                TargetOutcome::Skipped => summary.targets_skipped += 1,
                TargetOutcome::Exit => {
                    summary.cancelled = true;
                    break;
                }
            }
        }

        if summary.cancelled {
            self.output.error("Scanning canceled by the user");
        } else {
            self.output.warning("\nScanning completed");
        }
        self.output.finish();
        Ok(summary)
    }

    async fn connect(&self, url: &str) -> Result<Requester, RequestError> {
        let requester = Requester::resolve(url, &self.options.requester).await?;
        requester.request("/").await?;
        Ok(requester)
    }

    async fn scan_target(
        &self,
        url: &str,
        batch_dir: Option<&std::path::Path>,
        summary: &mut ScanSummary,
    ) -> Result<TargetOutcome, ScanError> {
        let requester = match self.connect(url).await {
            Ok(requester) => requester,
            Err(e) => {
                tracing::debug!(%url, error = ?e, "target unreachable");
                self.output.error(&e.to_string());
                return Ok(TargetOutcome::Skipped);
            }
        };

        let (reports, autosaved) = reports::open_reports(&self.options, requester.target(), batch_dir)?;
        self.output.target(url);
        let autosaved = autosaved.map(|p| p.display().to_string());
        self.output.paths(
            autosaved.as_deref(),
            &self.error_log.path().display().to_string(),
        );
        self.output.reset_errors();

        let target = Arc::new(TargetScan {
            url: url.to_string(),
            reports,
            queue: Mutex::new(VecDeque::new()),
            found: AtomicUsize::new(0),
            report_error: Mutex::new(None),
        });
        {
            let mut queue = target.queue();
            if self.options.subdirs.is_empty() {
                queue.push_back(String::new());
            } else {
                queue.extend(self.options.subdirs.iter().cloned());
            }
        }

        let outcome = self.walk(&requester, &target, summary).await;
        let saved = target.reports.save();
        summary.matches += target.found.load(Ordering::Relaxed);
        summary.errors += self.output.errors();
        summary.reports.extend(target.reports.outputs());
        let outcome = outcome?;
        saved?;
        Ok(outcome)
    }

    async fn walk(
        &self,
        requester: &Requester,
        target: &Arc<TargetScan>,
        summary: &mut ScanSummary,
    ) -> Result<TargetOutcome, ScanError> {
        loop {
            let Some(dir) = target.queue().pop_front() else {
                return Ok(TargetOutcome::Completed);
            };
            self.output.warning(&format!(
                "[{}] Starting: {}",
                chrono::Local::now().format("%H:%M:%S"),
                dir
            ));
            let scoped = requester.scoped(&dir);
            self.output.set_base_path(scoped.base_path());

            let pool = WorkerPool::new(
                Arc::new(scoped),
                Arc::clone(&self.dictionary),
                PoolOptions {
                    threads: self.options.threads,
                    failed_path: self.options.failed_path.clone(),
                },
                self.callbacks(target, &dir),
            );
            if let Err(e) = pool.start().await {
                self.output
                    .error(&format!("Fatal error during directory scanning: {e}"));
                return Ok(TargetOutcome::Skipped);
            }
            summary.directories += 1;

            if let Some(outcome) = self.supervise(&pool, target).await? {
                return Ok(outcome);
            }
        }
    }

    /// Waits for the pool while watching for CTRL+C. `Some` ends the target.
    async fn supervise(
        &self,
        pool: &WorkerPool<Requester>,
        target: &TargetScan,
    ) -> Result<Option<TargetOutcome>, ScanError> {
        let multi_target = self.options.urls.len() > 1;
        let mut signals = true;
        loop {
            let (done, interrupted) = tokio::select! {
                done = pool.await_completion(POLL_INTERVAL) => (done, false),
                res = tokio::signal::ctrl_c(), if signals => match res {
                    Ok(()) => (false, true),
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot listen for CTRL+C");
                        signals = false;
                        (false, false)
                    }
                },
            };
            if let Some(e) = target.take_report_error() {
                drain(pool).await;
                return Err(e.into());
            }
            if done {
                return Ok(None);
            }
            if !interrupted {
                continue;
            }

            self.output
                .warning("CTRL+C detected: pausing workers, please wait...");
            pool.pause().await;
            let queue_pending = !target.queue().is_empty();
            match interrupt::ask(&self.output, queue_pending, multi_target).await {
                InterruptAction::Continue => pool.resume(),
                InterruptAction::NextDirectory => pool.stop(),
                InterruptAction::Exit => {
                    drain(pool).await;
                    return Ok(Some(TargetOutcome::Exit));
                }
                InterruptAction::SkipTarget => {
                    drain(pool).await;
                    return Ok(Some(TargetOutcome::Skipped));
                }
            }
        }
    }

    fn callbacks(&self, target: &Arc<TargetScan>, dir: &str) -> Callbacks {
        let mut callbacks = Callbacks::default();
        let index = Arc::new(AtomicUsize::new(0));
        let total = self.dictionary.len();

        let (output, filter, scan, current, seen) = (
            Arc::clone(&self.output),
            Arc::clone(&self.filter),
            Arc::clone(target),
            dir.to_string(),
            Arc::clone(&index),
        );
        callbacks.on_match(move |found| {
            seen.fetch_add(1, Ordering::Relaxed);
            let Some(status) = found.status else {
                return;
            };
            if !filter.accepts(found) {
                return;
            }
            output.status_report(&found.path, &found.response);
            let full = format!("{current}{}", found.path);
            if filter.descends_into(&found.path) {
                scan.queue().push_back(full.clone());
            }
            scan.record(&full, status, &found.response);
        });

        let output = Arc::clone(&self.output);
        callbacks.on_not_found(move |missing| {
            let done = index.fetch_add(1, Ordering::Relaxed) + 1;
            output.last_path(&missing.path, done, total);
        });

        let (output, log, url) = (
            Arc::clone(&self.output),
            Arc::clone(&self.error_log),
            target.url.clone(),
        );
        callbacks.on_error(move |path, message| {
            output.add_connection_error();
            log.append(&url, path, message);
        });
        callbacks
    }
}

/// Stops the pool and waits for in-flight requests to finish.
async fn drain(pool: &WorkerPool<Requester>) {
    pool.stop();
    while !pool.await_completion(POLL_INTERVAL).await {}
}
