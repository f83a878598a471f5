use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use httptest::responders::{self, status_code, Responder};
use httptest::{matchers::*, Expectation, Server, ServerBuilder};

use crate::controller::{Controller, ScanOptions, ScanSummary};
use crate::dictionary::DictionaryOptions;
use crate::output::CliOutput;
use crate::requester::{Fetch, RequestError, RequesterOptions, Response};
use crate::utils;

/// In-memory fetcher answering from a closure.
pub(crate) struct FnFetch<H>(pub H);

impl<H> Fetch for FnFetch<H>
where
    H: Fn(&str) -> Result<Response, RequestError> + Send + Sync + 'static,
{
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Response, RequestError>> + Send {
        let result = (self.0)(path);
        async move { result }
    }
}

/// Like `FnFetch`, but every request takes a while.
pub(crate) struct SlowFetch<H>(pub Duration, pub H);

impl<H> Fetch for SlowFetch<H>
where
    H: Fn(&str) -> Result<Response, RequestError> + Send + Sync + 'static,
{
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Response, RequestError>> + Send {
        let delay = self.0;
        let result = (self.1)(path);
        async move {
            tokio::time::sleep(delay).await;
            result
        }
    }
}

pub(crate) fn response(status: u16, body: &str) -> Response {
    Response {
        status,
        body: body.as_bytes().to_vec(),
        ..Response::default()
    }
}

pub(crate) fn redirect(status: u16, location: &str) -> Response {
    let mut response = response(status, "");
    response
        .headers
        .insert("location".to_string(), location.to_string());
    response
}

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("dirsift-e2e-{}", utils::rand_string(12, "")))
}

fn write_wordlist(dir: &Path, words: &[&str]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("words.txt");
    std::fs::write(&path, words.join("\n")).unwrap();
    path
}

fn scan_options(url: String, dir: &Path, words: &[&str]) -> ScanOptions {
    ScanOptions {
        urls: vec![url],
        wordlist: Some(write_wordlist(dir, words)),
        threads: 4,
        requester: RequesterOptions {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            ..RequesterOptions::default()
        },
        autosave: false,
        json_report: Some(dir.join("found.json")),
        save_dir: dir.to_path_buf(),
        ..ScanOptions::default()
    }
}

async fn scan(options: ScanOptions) -> ScanSummary {
    let controller = Controller::new(options, Arc::new(CliOutput::hidden()))
        .await
        .unwrap();
    controller.run().await.unwrap()
}

/// `(path, status)` pairs of the single target in a JSON report.
fn json_records(path: &Path) -> Vec<(String, u64)> {
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let target = value.as_object().unwrap().values().next().unwrap();
    target
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["path"].as_str().unwrap().to_string(),
                e["status"].as_u64().unwrap(),
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn finds_existing_path_among_expanded_entries() {
    let server = ServerBuilder::new()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .run()
        .unwrap();
    server.expect(
        Expectation::matching(request::method_path("GET", "/admin"))
            .times(1)
            .respond_with(status_code(200).body("admin panel")),
    );
    server.expect(
        Expectation::matching(request::path(not(matches("^/admin$"))))
            .times(..)
            .respond_with(status_code(404)),
    );

    let dir = scratch_dir();
    let mut options = scan_options(server.url_str("/"), &dir, &["admin", "config.%EXT%"]);
    options.dictionary = DictionaryOptions {
        extensions: vec!["php".to_string()],
        ..DictionaryOptions::default()
    };
    options.autosave = true;

    let summary = scan(options).await;
    assert_eq!(summary.targets_scanned, 1);
    assert_eq!(summary.directories, 1);
    assert_eq!(summary.matches, 1);
    assert_eq!(json_records(&dir.join("found.json")), vec![("admin".to_string(), 200)]);

    let autosaved: Vec<&PathBuf> = summary
        .reports
        .iter()
        .filter(|p| p.starts_with(dir.join("reports").join("127.0.0.1")))
        .collect();
    assert_eq!(autosaved.len(), 1);
    let plain = std::fs::read_to_string(autosaved[0]).unwrap();
    assert_eq!(plain.lines().count(), 1);
    assert!(plain.contains("/admin"));
    let _ = std::fs::remove_dir_all(&dir);
}

fn soft_404_page(stamp: &str) -> String {
    format!(
        "<html><head><title>Page not available</title></head><body>\
         <div class=\"notice\">We could not find the page you were looking for on this server.</div>\
         <p>Request reference: {stamp}</p>\
         <p>Please check the address or go back to the home page and try again later.</p>\
         </body></html>"
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sees_through_soft_404_pages_with_timestamps() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/secret"))
            .times(1)
            .respond_with(
                status_code(200)
                    .body("<html><body><h1>Internal documents</h1><ul><li>budget.xlsx</li></ul></body></html>"),
            ),
    );
    let pages: Vec<Box<dyn Responder>> = ["Q81c7-20a1", "w3T0z-99bX", "k7Ma2-51nE", "R0pd4-73qJ", "f9Ly1-08sW"]
        .iter()
        .map(|stamp| Box::new(status_code(200).body(soft_404_page(stamp))) as Box<dyn Responder>)
        .collect();
    server.expect(
        Expectation::matching(request::path(not(matches("^/secret$"))))
            .times(..)
            .respond_with(responders::cycle(pages)),
    );

    let dir = scratch_dir();
    let options = scan_options(
        server.url_str("/"),
        &dir,
        &["alpha", "secret", "beta", "gamma", "delta"],
    );
    let summary = scan(options).await;
    assert_eq!(summary.matches, 1);
    assert_eq!(json_records(&dir.join("found.json")), vec![("secret".to_string(), 200)]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recursion_walks_discovered_directories() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/admin/"))
            .times(1)
            .respond_with(status_code(200).body("admin index")),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/admin/login"))
            .times(1)
            .respond_with(status_code(200).body("login form")),
    );
    server.expect(
        Expectation::matching(request::path(not(matches("^/admin/(login)?$"))))
            .times(..)
            .respond_with(status_code(404)),
    );

    let dir = scratch_dir();
    let mut options = scan_options(server.url_str("/"), &dir, &["admin/", "login"]);
    options.recursive = true;

    let summary = scan(options).await;
    assert_eq!(summary.directories, 2);
    assert_eq!(summary.matches, 2);
    let mut records = json_records(&dir.join("found.json"));
    records.sort();
    assert_eq!(
        records,
        vec![("admin/".to_string(), 200), ("admin/login".to_string(), 200)]
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn excluded_directories_are_not_entered() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/images/"))
            .times(1)
            .respond_with(status_code(200).body("listing")),
    );
    server.expect(
        Expectation::matching(request::path(not(matches("^/images/$"))))
            .times(..)
            .respond_with(status_code(404)),
    );

    let dir = scratch_dir();
    let mut options = scan_options(server.url_str("/"), &dir, &["images/", "thumbs"]);
    options.recursive = true;
    options.exclude_subdirs = vec!["images".to_string()];

    let summary = scan(options).await;
    assert_eq!(summary.directories, 1);
    assert_eq!(summary.matches, 1);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_target_is_skipped() {
    let dir = scratch_dir();
    let mut options = scan_options("http://127.0.0.1:1/".to_string(), &dir, &["admin"]);
    options.requester.timeout = Duration::from_secs(2);

    let summary = scan(options).await;
    assert_eq!(summary.targets_skipped, 1);
    assert_eq!(summary.targets_scanned, 0);
    assert_eq!(summary.matches, 0);
    let _ = std::fs::remove_dir_all(&dir);
}
