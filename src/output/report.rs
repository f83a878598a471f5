use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

use crate::requester::{Response, Target};
use crate::utils;

#[derive(Debug, Error)]
#[error("failed to write report {path}: {source}")]
pub struct ReportError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Simple,
    Plain,
    Json,
}

impl ReportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "plain" | "text" | "txt" => Some(Self::Plain),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    pub path: String,
    pub status: u16,
    pub content_length: u64,
    pub redirect: Option<String>,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    #[serde(rename = "content-length")]
    content_length: u64,
    path: &'a str,
    redirect: Option<&'a str>,
    status: u16,
}

/// One output file holding every match found on a target so far.
#[derive(Debug)]
pub struct Report {
    format: ReportFormat,
    scheme: String,
    host: String,
    port: u16,
    base_path: String,
    output: PathBuf,
    entries: Vec<ReportEntry>,
}

impl Report {
    /// Creates (or truncates) `output`, creating missing parent directories.
    pub fn create(format: ReportFormat, target: &Target, output: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let output = output.into();
        let io_err = |source| ReportError {
            path: output.clone(),
            source,
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&output, b"").map_err(io_err)?;
        Ok(Self {
            format,
            scheme: target.scheme.clone(),
            host: target.host.clone(),
            port: target.port,
            base_path: target.base_path.trim_matches('/').to_string(),
            output,
            entries: Vec::new(),
        })
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn add_path(&mut self, path: &str, status: u16, response: &Response) {
        self.entries.push(ReportEntry {
            path: path.to_string(),
            status,
            content_length: response.content_length(),
            redirect: response.redirect().map(str::to_string),
        });
    }

    /// Rewrites the whole file from the entries collected so far.
    pub fn save(&self) -> Result<(), ReportError> {
        fs::write(&self.output, self.render()).map_err(|source| ReportError {
            path: self.output.clone(),
            source,
        })
    }

    pub fn render(&self) -> String {
        match self.format {
            ReportFormat::Simple => self
                .entries
                .iter()
                .map(|e| format!("{}\n", self.url_for(&e.path)))
                .collect(),
            ReportFormat::Plain => self
                .entries
                .iter()
                .map(|e| {
                    format!(
                        "{}  {:>6}  {}\n",
                        e.status,
                        utils::size_iec(e.content_length),
                        self.url_for(&e.path)
                    )
                })
                .collect(),
            ReportFormat::Json => self.render_json(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        if self.base_path.is_empty() {
            format!("{}://{}:{}/{}", self.scheme, self.host, self.port, path)
        } else {
            format!(
                "{}://{}:{}/{}/{}",
                self.scheme, self.host, self.port, self.base_path, path
            )
        }
    }

    fn render_json(&self) -> String {
        let header = format!(
            "{}://{}:{}/{}",
            self.scheme, self.host, self.port, self.base_path
        );
        let entries: Vec<JsonEntry<'_>> = self
            .entries
            .iter()
            .map(|e| JsonEntry {
                content_length: e.content_length,
                path: &e.path,
                redirect: e.redirect.as_deref(),
                status: e.status,
            })
            .collect();
        let mut record = BTreeMap::new();
        record.insert(header, entries);

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        if record.serialize(&mut ser).is_err() {
            return "{}".to_string();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Fans every recorded path out to all reports of the current target.
#[derive(Debug, Default)]
pub struct ReportController {
    reports: Mutex<Vec<Report>>,
}

impl ReportController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_report(&self, report: Report) {
        self.lock().push(report);
    }

    pub fn add_path(&self, path: &str, status: u16, response: &Response) {
        for report in self.lock().iter_mut() {
            report.add_path(path, status, response);
        }
    }

    pub fn save(&self) -> Result<(), ReportError> {
        for report in self.lock().iter() {
            report.save()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        self.lock().iter().map(|r| r.output.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Report>> {
        match self.reports.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{redirect, response};

    fn target(base: &str) -> Target {
        Target {
            scheme: "http".to_string(),
            host: "example.com".to_string(),
            port: 8080,
            base_path: base.to_string(),
            ip: None,
        }
    }

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("dirsift-report-{}", utils::rand_string(10, "")))
            .join(name)
    }

    #[test]
    fn parse_formats() {
        assert_eq!(ReportFormat::parse("JSON"), Some(ReportFormat::Json));
        assert_eq!(ReportFormat::parse("plain"), Some(ReportFormat::Plain));
        assert_eq!(ReportFormat::parse("simple"), Some(ReportFormat::Simple));
        assert_eq!(ReportFormat::parse("xml"), None);
    }

    #[test]
    fn simple_and_plain_render_full_urls() {
        let out = temp_file("simple.txt");
        let mut simple = Report::create(ReportFormat::Simple, &target("/app/"), &out).unwrap();
        simple.add_path("admin/", 200, &response(200, "hello"));
        simple.add_path("login.php", 302, &redirect(302, "/home"));
        assert_eq!(
            simple.render(),
            "http://example.com:8080/app/admin/\nhttp://example.com:8080/app/login.php\n"
        );

        let mut plain = Report::create(ReportFormat::Plain, &target("/"), temp_file("plain.txt")).unwrap();
        let mut big = response(200, "");
        big.headers.insert("content-length".to_string(), "4096".to_string());
        plain.add_path("admin", 200, &big);
        assert_eq!(plain.render(), "200    4 KB  http://example.com:8080/admin\n");
    }

    #[test]
    fn json_is_keyed_by_target_with_sorted_fields() {
        let mut report = Report::create(ReportFormat::Json, &target("/app/"), temp_file("r.json")).unwrap();
        report.add_path("old", 301, &redirect(301, "/new"));
        report.add_path("admin", 200, &response(200, "abc"));
        let value: serde_json::Value = serde_json::from_str(&report.render()).unwrap();
        let entries = value["http://example.com:8080/app"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["redirect"], "/new");
        assert_eq!(entries[1]["redirect"], serde_json::Value::Null);
        assert_eq!(entries[1]["content-length"], 3);

        let rendered = report.render();
        let cl = rendered.find("content-length").unwrap();
        let path = rendered.find("\"path\"").unwrap();
        let status = rendered.find("\"status\"").unwrap();
        assert!(cl < path && path < status);
    }

    #[test]
    fn controller_writes_every_sink_on_save() {
        let a = temp_file("a.txt");
        let b = temp_file("b.json");
        let controller = ReportController::new();
        controller.add_report(Report::create(ReportFormat::Simple, &target("/"), &a).unwrap());
        controller.add_report(Report::create(ReportFormat::Json, &target("/"), &b).unwrap());
        controller.add_path("admin", 200, &response(200, "x"));
        controller.save().unwrap();
        controller.save().unwrap();

        assert_eq!(controller.len(), 2);
        assert_eq!(fs::read_to_string(&a).unwrap(), "http://example.com:8080/admin\n");
        assert!(fs::read_to_string(&b).unwrap().contains("\"admin\""));
    }
}
