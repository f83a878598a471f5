use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ScanError, ScanOptions};
use crate::output::{Report, ReportController, ReportError, ReportFormat};
use crate::requester::Target;

const TIMESTAMP: &str = "%y-%m-%d_%H-%M-%S";

fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP).to_string()
}

/// Appends `_2`, `_3`, ... until the path is free.
fn dedup(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let mut i = 2usize;
    loop {
        let mut candidate = path.clone().into_os_string();
        candidate.push(format!("_{i}"));
        let candidate = PathBuf::from(candidate);
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

/// `/app/v1/` becomes `app.v1`, the root becomes an empty string.
fn dotted_base_path(base_path: &str) -> String {
    base_path.trim_matches('/').replace('/', ".")
}

/// Where the autosaved report of `target` goes.
///
/// Batch runs write one file per host into the batch folder. Single runs
/// write `<save>/reports/<host>/<base>_<timestamp>`.
pub fn autosave_path(save_dir: &Path, target: &Target, batch_dir: Option<&Path>) -> PathBuf {
    let path = match batch_dir {
        Some(dir) => dir.join(&target.host),
        None => {
            let base = dotted_base_path(&target.base_path);
            let name = if base.is_empty() {
                timestamp()
            } else {
                format!("{base}_{}", timestamp())
            };
            save_dir.join("reports").join(&target.host).join(name)
        }
    };
    dedup(path)
}

/// Creates `<save>/reports/Batch-<timestamp>` and records the target list in it.
pub fn create_batch_dir(save_dir: &Path, urls: &[String]) -> Result<PathBuf, ScanError> {
    let dir = save_dir.join("reports").join(format!("Batch-{}", timestamp()));
    fs::create_dir_all(&dir).map_err(|source| ScanError::Io {
        path: dir.clone(),
        source,
    })?;
    let list = dir.join("Target-URL-List.txt");
    let mut contents = urls.join("\n");
    contents.push('\n');
    fs::write(&list, contents).map_err(|source| ScanError::Io { path: list, source })?;
    Ok(dir)
}

/// Opens every sink configured for one target. Returns the autosave path
/// as well, when autosave is on.
pub fn open_reports(
    options: &ScanOptions,
    target: &Target,
    batch_dir: Option<&Path>,
) -> Result<(ReportController, Option<PathBuf>), ReportError> {
    let reports = ReportController::new();
    let mut autosaved = None;
    if options.autosave {
        let path = autosave_path(&options.save_dir, target, batch_dir);
        reports.add_report(Report::create(options.autosave_format, target, &path)?);
        autosaved = Some(path);
    }
    let explicit = [
        (ReportFormat::Simple, options.simple_report.as_ref()),
        (ReportFormat::Plain, options.plain_report.as_ref()),
        (ReportFormat::Json, options.json_report.as_ref()),
    ];
    for (format, path) in explicit {
        if let Some(path) = path {
            reports.add_report(Report::create(format, target, path)?);
        }
    }
    Ok((reports, autosaved))
}

/// `<save>/logs/errors-<timestamp>.log`, shared by every target of a run.
pub struct ErrorLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ErrorLog {
    pub fn create(save_dir: &Path) -> Result<Self, ScanError> {
        let path = save_dir
            .join("logs")
            .join(format!("errors-{}.log", timestamp()));
        let open = || -> std::io::Result<File> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
        };
        let file = open().map_err(|source| ScanError::ErrorLog {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `[%y-%m-%d %H:%M:%S] - <url> - <path> - <message>`
    pub fn append(&self, url: &str, path: &str, message: &str) {
        let line = format!(
            "[{}] - {url} - {path} - {message}\n",
            chrono::Local::now().format("%y-%m-%d %H:%M:%S")
        );
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append to error log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("dirsift-save-{}", utils::rand_string(10, "")))
    }

    fn target(base: &str) -> Target {
        Target {
            scheme: "http".to_string(),
            host: "example.com".to_string(),
            port: 80,
            base_path: base.to_string(),
            ip: None,
        }
    }

    #[test]
    fn base_paths_are_dotted() {
        assert_eq!(dotted_base_path("/"), "");
        assert_eq!(dotted_base_path("/app/v1/"), "app.v1");
    }

    #[test]
    fn autosave_paths_are_unique() {
        let save = temp_dir();
        let first = autosave_path(&save, &target("/app/"), None);
        assert!(first.starts_with(save.join("reports").join("example.com")));
        assert!(first
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("app_")));

        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::write(&first, "").unwrap();
        let second = autosave_path(&save, &target("/app/"), None);
        assert_eq!(second, PathBuf::from(format!("{}_2", first.display())));
        let _ = fs::remove_dir_all(&save);
    }

    #[test]
    fn batch_dir_lists_targets() {
        let save = temp_dir();
        let urls = vec!["http://a.test/".to_string(), "http://b.test/".to_string()];
        let dir = create_batch_dir(&save, &urls).unwrap();
        assert!(dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("Batch-")));
        let listed = fs::read_to_string(dir.join("Target-URL-List.txt")).unwrap();
        assert_eq!(listed, "http://a.test/\nhttp://b.test/\n");
        assert_eq!(autosave_path(&save, &target("/"), Some(&dir)), dir.join("example.com"));
        let _ = fs::remove_dir_all(&save);
    }

    #[test]
    fn error_log_appends_lines() {
        let save = temp_dir();
        let log = ErrorLog::create(&save).unwrap();
        log.append("http://example.com/", "admin", "connection refused");
        log.append("http://example.com/", "login", "timed out");
        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] - http://example.com/ - admin - connection refused"));
        assert!(lines[1].ends_with(" - http://example.com/ - login - timed out"));
        let _ = fs::remove_dir_all(&save);
    }
}
