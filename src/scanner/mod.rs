pub mod dynamic;
pub mod similarity;

use regex::Regex;

use crate::requester::{Fetch, RequestError, Response};
use crate::utils;

pub use dynamic::DynamicContent;

pub const DEFAULT_RATIO: f64 = 0.98;

const REDIRECT_STATUSES: [u16; 3] = [301, 302, 307];
const PROBE_LENGTH: usize = 12;
const SHORT_BODY: usize = 2000;

/// Decides whether a response is a real resource or the server's flavour of
/// "not found" for one suffix class (`""`, `"/"` or `".ext"`).
#[derive(Debug)]
pub struct Scanner {
    suffix: String,
    invalid_status: u16,
    redirect_regex: Option<Regex>,
    dynamic: Option<DynamicContent>,
    ratio: f64,
}

impl Scanner {
    /// Probes paths that cannot exist and learns what the server answers.
    pub async fn calibrate<F: Fetch>(
        fetcher: &F,
        failed_path: Option<&str>,
        suffix: &str,
    ) -> Result<Self, RequestError> {
        let first_path = match failed_path.filter(|p| !p.is_empty()) {
            Some(path) => path.to_string(),
            None => utils::rand_string(PROBE_LENGTH, ""),
        };
        let first = fetcher.fetch(&format!("{first_path}{suffix}")).await?;

        let mut scanner = Self {
            suffix: suffix.to_string(),
            invalid_status: first.status,
            redirect_regex: None,
            dynamic: None,
            ratio: DEFAULT_RATIO,
        };
        if first.status == 404 {
            tracing::debug!(suffix, "server answers 404 for missing paths");
            return Ok(scanner);
        }

        let second_path = utils::rand_string(PROBE_LENGTH, &first_path);
        let second = fetcher.fetch(&format!("{second_path}{suffix}")).await?;

        if let (true, Some(a), Some(b)) = (
            REDIRECT_STATUSES.contains(&first.status) && REDIRECT_STATUSES.contains(&second.status),
            first.redirect(),
            second.redirect(),
        ) {
            scanner.redirect_regex = redirect_pattern(a, b);
        }

        let dynamic = DynamicContent::new(&first.body, &second.body);
        let mut base_ratio = round2(dynamic.ratio());
        if first.len() < SHORT_BODY {
            base_ratio -= 0.1;
        }
        if base_ratio <= 0.0 {
            tracing::warn!(
                suffix,
                ratio = dynamic.ratio(),
                "not-found pages share almost nothing, similarity filter disabled"
            );
        }
        scanner.ratio = base_ratio.clamp(0.0, DEFAULT_RATIO);
        scanner.dynamic = Some(dynamic);

        tracing::debug!(
            suffix,
            invalid_status = scanner.invalid_status,
            redirect = ?scanner.redirect_regex.as_ref().map(Regex::as_str),
            ratio = scanner.ratio,
            "calibrated scanner"
        );
        Ok(scanner)
    }

    pub fn is_match(&self, response: &Response) -> bool {
        if response.status != self.invalid_status {
            return true;
        }
        if self.invalid_status == 404 {
            return false;
        }

        let mut redirect_to_invalid = false;
        if let (Some(pattern), Some(location)) = (self.redirect_regex.as_ref(), response.redirect()) {
            redirect_to_invalid = pattern.is_match(location);
            if !redirect_to_invalid {
                return true;
            }
        }

        let ratio = match self.dynamic.as_ref() {
            Some(dynamic) => dynamic.compare_to(&response.body),
            None => 0.0,
        };
        if ratio >= self.ratio {
            return false;
        }
        !(redirect_to_invalid && ratio >= self.ratio - 0.15)
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn invalid_status(&self) -> u16 {
        self.invalid_status
    }

    pub fn redirect_regex(&self) -> Option<&Regex> {
        self.redirect_regex.as_ref()
    }

    pub fn threshold(&self) -> f64 {
        self.ratio
    }
}

/// `^.*<block>.*<block>...*$` over the common blocks of two redirect targets.
pub fn redirect_pattern(first: &str, second: &str) -> Option<Regex> {
    let marks: Vec<String> = similarity::matching_blocks(first, second)
        .iter()
        .map(|m| regex::escape(m))
        .collect();
    Regex::new(&format!("^.*{}.*$", marks.join(".*"))).ok()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::tests::{redirect, response, FnFetch};

    #[tokio::test]
    async fn clean_404_server_needs_one_probe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let fetcher = FnFetch(move |path: &str| {
            log.lock().unwrap().push(path.to_string());
            Ok(response(404, "nope"))
        });
        let scanner = Scanner::calibrate(&fetcher, None, "/").await.unwrap();
        assert_eq!(scanner.invalid_status(), 404);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(seen.lock().unwrap()[0].ends_with('/'));

        assert!(!scanner.is_match(&response(404, "other body entirely")));
        assert!(scanner.is_match(&response(200, "nope")));
        assert!(scanner.is_match(&response(403, "")));
        assert!(scanner.is_match(&response(500, "")));
    }

    #[tokio::test]
    async fn probes_use_marker_then_disjoint_random_path() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let fetcher = FnFetch(move |path: &str| {
            log.lock().unwrap().push(path.to_string());
            Ok(response(200, "generic page"))
        });
        Scanner::calibrate(&fetcher, Some("nonexistent"), ".php").await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "nonexistent.php");
        let random = seen[1].strip_suffix(".php").unwrap();
        assert_eq!(random.len(), 12);
        assert!(random.chars().all(|c| !"nonexistent".contains(c)));
    }

    #[tokio::test]
    async fn threshold_is_lowered_for_short_bodies_and_capped() {
        let short = FnFetch(|_: &str| Ok(response(200, "tiny error page")));
        let scanner = Scanner::calibrate(&short, None, "").await.unwrap();
        assert!((scanner.threshold() - 0.9).abs() < 1e-9);

        let long_body = "x".repeat(4000);
        let long = FnFetch(move |_: &str| Ok(response(200, &long_body)));
        let scanner = Scanner::calibrate(&long, None, "").await.unwrap();
        assert!((scanner.threshold() - DEFAULT_RATIO).abs() < 1e-9);
    }

    #[test]
    fn redirect_pattern_absorbs_variable_ids() {
        let pattern = redirect_pattern("/error?id=X123abc", "/error?id=Y987xyz").unwrap();
        assert!(pattern.is_match("/error?id=Z555qqq"));
        assert!(!pattern.is_match("/success"));
    }

    #[tokio::test]
    async fn redirect_to_error_page_is_not_a_match() {
        let ids = Arc::new(Mutex::new(vec!["Y987xyz", "X123abc"]));
        let fetcher = FnFetch(move |_: &str| {
            let id = ids.lock().unwrap().pop().unwrap_or("Q000000");
            Ok(redirect(302, &format!("/error?id={id}")))
        });
        let scanner = Scanner::calibrate(&fetcher, None, "").await.unwrap();
        assert!(scanner.redirect_regex().is_some());

        assert!(!scanner.is_match(&redirect(302, "/error?id=Z555qqq")));
        assert!(scanner.is_match(&redirect(302, "/dashboard/")));
        assert!(scanner.is_match(&response(200, "")));
    }

    #[tokio::test]
    async fn redirect_pattern_requires_both_probes_to_redirect() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let fetcher = FnFetch(move |_: &str| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Ok(redirect(302, "/error"))
            } else {
                Ok(response(200, ""))
            }
        });
        let scanner = Scanner::calibrate(&fetcher, None, "").await.unwrap();
        assert!(scanner.redirect_regex().is_none());
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    fn minified_not_found(path: &str) -> String {
        let filler = "<span class=\"hint\">Check the spelling of the address or return to the start page.</span>"
            .repeat(14);
        let trace: String = path.chars().rev().collect();
        format!(
            "<html><head><title>404 /{path}</title></head><body><div class=\"error\">{filler}</div>\
             <p>trace {trace}</p></body></html>"
        )
    }

    #[tokio::test]
    async fn single_line_soft_404_pages_are_recognised() {
        let fetcher = FnFetch(|path: &str| Ok(response(200, &minified_not_found(path))));
        let scanner = Scanner::calibrate(&fetcher, None, "").await.unwrap();
        assert!(scanner.threshold() > 0.5, "threshold {}", scanner.threshold());

        assert!(!scanner.is_match(&response(200, &minified_not_found("backup-2024"))));
        let secret = "<html><body><h1>Internal documents</h1><ul><li>budget.xlsx</li></ul></body></html>";
        assert!(scanner.is_match(&response(200, secret)));
    }

    #[tokio::test]
    async fn threshold_never_drops_below_zero() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let fetcher = FnFetch(move |_: &str| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            Ok(response(200, if *n == 1 { "aaaaaaaa" } else { "zzzzzzzz" }))
        });
        let scanner = Scanner::calibrate(&fetcher, None, "").await.unwrap();
        assert_eq!(scanner.threshold(), 0.0);
    }

    #[tokio::test]
    async fn probe_failure_is_propagated() {
        let fetcher = FnFetch(|path: &str| {
            Err(RequestError::ConnectionFailed {
                path: path.to_string(),
            })
        });
        let err = Scanner::calibrate(&fetcher, None, "").await.unwrap_err();
        assert!(matches!(err, RequestError::ConnectionFailed { .. }));
    }
}
