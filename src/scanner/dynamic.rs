//! Removal of regions that change between two renderings of the same page.

use std::borrow::Cow;

use regex::{NoExpand, Regex};

use super::similarity;

/// Bodies are only compared up to this many bytes.
pub const MAX_COMPARED_BYTES: usize = 32 * 1024;

// Matching blocks this short are too weak to anchor a marking.
const MARK_LENGTH: usize = 32;

#[derive(Debug)]
struct Marking {
    pattern: Regex,
    replacement: String,
}

/// Baseline built from two not-found bodies. Text between unchanged anchors
/// is stripped before comparing a new body against the first one.
#[derive(Debug)]
pub struct DynamicContent {
    markings: Vec<Marking>,
    clean_page: String,
    ratio: f64,
}

impl DynamicContent {
    pub fn new(first: &[u8], second: &[u8]) -> Self {
        let first = comparable(first);
        let second = comparable(second);
        let ratio = similarity::ratio(&first, &second);

        let anchors: Vec<similarity::Block<'_>> = similarity::blocks(&first, &second)
            .into_iter()
            .filter(|b| b.text.chars().count() > MARK_LENGTH)
            .collect();

        let mut markings = Vec::new();
        for i in 0..=anchors.len() {
            let before = i.checked_sub(1).and_then(|j| anchors.get(j));
            let after = anchors.get(i);
            match (before, after) {
                (None, None) => {}
                (None, Some(next)) if next.start == 0 => {}
                (Some(prev), None) if prev.end() >= first.len() => {}
                (prev, next) => {
                    let prefix = prev.map(|b| tail(b.text, MARK_LENGTH / 2));
                    let suffix = next.map(|b| head(b.text, MARK_LENGTH / 2));
                    if let Some(marking) = Marking::new(prefix, suffix) {
                        markings.push(marking);
                    }
                }
            }
        }

        let clean_page = clean(&first, &markings).into_owned();
        tracing::trace!(markings = markings.len(), ratio, "built dynamic content baseline");
        Self {
            markings,
            clean_page,
            ratio,
        }
    }

    /// Similarity of the two bodies the baseline was built from.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn compare_to(&self, body: &[u8]) -> f64 {
        let page = comparable(body);
        let cleaned = clean(&page, &self.markings);
        similarity::ratio(&self.clean_page, &cleaned)
    }
}

impl Marking {
    fn new(prefix: Option<&str>, suffix: Option<&str>) -> Option<Self> {
        let (pattern, replacement) = match (prefix, suffix) {
            (None, None) => return None,
            (None, Some(suffix)) => (format!("(?s)^.*?{}", regex::escape(suffix)), suffix.to_string()),
            (Some(prefix), None) => (format!("(?s){}.*$", regex::escape(prefix)), prefix.to_string()),
            (Some(prefix), Some(suffix)) => (
                format!("(?s){}.*?{}", regex::escape(prefix), regex::escape(suffix)),
                format!("{prefix}{suffix}"),
            ),
        };
        let pattern = Regex::new(&pattern).ok()?;
        Some(Self {
            pattern,
            replacement,
        })
    }
}

fn clean<'a>(page: &'a str, markings: &[Marking]) -> Cow<'a, str> {
    let mut out = Cow::Borrowed(page);
    for marking in markings {
        let replaced = marking
            .pattern
            .replace_all(&out, NoExpand(&marking.replacement))
            .into_owned();
        out = Cow::Owned(replaced);
    }
    out
}

fn comparable(body: &[u8]) -> String {
    let end = body.len().min(MAX_COMPARED_BYTES);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

fn head(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn tail(text: &str, chars: usize) -> &str {
    let count = text.chars().count();
    if count <= chars {
        return text;
    }
    match text.char_indices().nth(count - chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_page(stamp: &str, path: &str) -> String {
        format!(
            "<html><head><title>Page not found on this lovely server</title></head>\
             <body><h1>Sorry, the page you requested could not be located</h1>\
             <p>Request id {stamp}</p><p>Requested resource: {path}</p>\
             <footer>Generated by a web framework with a rather long footer line</footer></body></html>"
        )
    }

    #[test]
    fn head_and_tail_respect_char_boundaries() {
        assert_eq!(head("héllo", 2), "hé");
        assert_eq!(tail("héllo", 3), "llo");
        assert_eq!(tail("ab", 5), "ab");
    }

    #[test]
    fn changing_regions_are_stripped_before_comparison() {
        let first = error_page("1700000001-aa91f", "/Xk2ja9QmPz1B");
        let second = error_page("1700000777-c2d0e", "/rTvW4uE3sNfD");
        let baseline = DynamicContent::new(first.as_bytes(), second.as_bytes());
        assert!(!baseline.markings.is_empty());
        assert!(baseline.ratio() < 1.0);

        let third = error_page("1700000123-bbbb1", "/admin");
        assert!(baseline.compare_to(third.as_bytes()) > 0.98);

        let real = "<html><body><h1>Welcome to the secret area</h1></body></html>";
        assert!(baseline.compare_to(real.as_bytes()) < 0.7);
    }

    #[test]
    fn identical_bodies_need_no_markings() {
        let page = error_page("static", "/nothing");
        let baseline = DynamicContent::new(page.as_bytes(), page.as_bytes());
        assert!(baseline.markings.is_empty());
        assert_eq!(baseline.ratio(), 1.0);
        assert_eq!(baseline.compare_to(page.as_bytes()), 1.0);
    }

    #[test]
    fn bodies_are_truncated() {
        let big = vec![b'a'; MAX_COMPARED_BYTES * 2];
        assert_eq!(comparable(&big).len(), MAX_COMPARED_BYTES);
    }
}
