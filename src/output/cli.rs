use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::requester::Response;
use crate::utils;

const BANNER: &str = r#"
     _ _          _  __ _
  __| (_)_ __ ___(_)/ _| |_
 / _` | | '__/ __| | |_| __|
| (_| | | |  \__ \ |  _| |_
 \__,_|_|_|  |___/_|_|  \__|
"#;

/// Terminal output shared by the controller and every worker callback.
///
/// Status lines are printed above a single live progress line.
pub struct CliOutput {
    pb: ProgressBar,
    errors: AtomicUsize,
    base_path: Mutex<String>,
}

impl CliOutput {
    pub fn new() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            pb.set_style(style);
        }
        Self::with_bar(pb)
    }

    /// Output that prints nothing, used by tests and library callers.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(pb: ProgressBar) -> Self {
        Self {
            pb,
            errors: AtomicUsize::new(0),
            base_path: Mutex::new(String::new()),
        }
    }

    pub fn banner(&self) {
        self.pb.println(format!("{}", BANNER.bold().magenta()));
        self.pb.println(format!(
            "{}",
            format!("v{}", env!("CARGO_PKG_VERSION")).bold().blue()
        ));
    }

    pub fn config(&self, extensions: &[String], threads: usize, wordlist_size: usize) {
        let sep = " | ".magenta();
        self.pb.println(format!(
            "{} {}{}{} {}{}{} {}",
            "Extensions:".bold().yellow(),
            extensions.join(", ").cyan(),
            sep,
            "Threads:".bold().yellow(),
            threads.to_string().cyan(),
            sep,
            "Wordlist size:".bold().yellow(),
            wordlist_size.to_string().cyan(),
        ));
    }

    pub fn paths(&self, report: Option<&str>, error_log: &str) {
        if let Some(report) = report {
            self.pb
                .println(format!("{} {}", "Report path:".bold().yellow(), report.cyan()));
        }
        self.pb.println(format!(
            "{} {}\n",
            "Error log path:".bold().yellow(),
            error_log.cyan()
        ));
    }

    pub fn target(&self, url: &str) {
        self.pb
            .println(format!("\n{} {}\n", "Target:".bold().yellow(), url.cyan()));
    }

    pub fn set_base_path(&self, base_path: &str) {
        if let Ok(mut current) = self.base_path.lock() {
            *current = base_path.to_string();
        }
    }

    pub fn reset_errors(&self) {
        self.errors.store(0, Ordering::Relaxed);
    }

    pub fn add_connection_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// `[HH:MM:SS] 200 -   4 KB - /admin/  ->  /login`
    pub fn status_report(&self, path: &str, response: &Response) {
        let base = self
            .base_path
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default();
        let shown = format!("/{}{}", base.trim_start_matches('/'), path);
        let line = format!(
            "[{}] {} - {:>6} - {}",
            chrono::Local::now().format("%H:%M:%S"),
            response.status,
            utils::size_iec(response.content_length()),
            shown
        );
        let line = match response.status {
            200 => line.green().to_string(),
            401 => line.yellow().to_string(),
            403 => line.red().to_string(),
            301 | 302 | 307 => match response.redirect() {
                Some(location) => format!("{}  ->  {}", line.cyan(), location),
                None => line,
            },
            _ => line,
        };
        self.pb.println(line);
    }

    pub fn last_path(&self, path: &str, index: usize, total: usize) {
        let pct = if total == 0 {
            100.0
        } else {
            index as f64 / total as f64 * 100.0
        };
        let errors = self.errors();
        let msg = if errors > 0 {
            format!(
                "{pct:.2}% - {} - Last request to: {path}",
                format!("Errors: {errors}").bold().red()
            )
        } else {
            format!("{pct:.2}% - Last request to: {path}")
        };
        self.pb.set_message(msg);
        self.pb.tick();
    }

    pub fn warning(&self, message: &str) {
        self.pb.println(format!("{}", message.bold().yellow()));
    }

    pub fn error(&self, message: &str) {
        self.pb
            .println(format!("{}", message.trim().bold().white().on_red()));
    }

    /// Prints `message` and leaves the cursor on the same line for input.
    pub fn prompt(&self, message: &str) {
        self.pb.suspend(|| {
            eprint!("{message}");
        });
    }

    pub fn line(&self, message: &str) {
        self.pb.println(message);
    }

    pub fn start_progress(&self) {
        self.pb.enable_steady_tick(Duration::from_millis(200));
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl Default for CliOutput {
    fn default() -> Self {
        Self::new()
    }
}
