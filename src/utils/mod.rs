use std::collections::HashSet;
use std::path::Path;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// everything but ascii alphanumerics and `_.-~:/?%&+=$`
const QUOTE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'%')
    .remove(b'&')
    .remove(b'+')
    .remove(b'=')
    .remove(b'$');

pub fn parse_u16_set_csv(value: &str) -> Result<HashSet<u16>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("list is empty".to_string());
    }
    let mut out = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let code: u16 = item
            .parse()
            .map_err(|_| format!("invalid status code '{item}'"))?;
        out.insert(code);
    }
    if out.is_empty() {
        return Err("list is empty".to_string());
    }
    Ok(out)
}

pub fn parse_extensions_csv(value: &str) -> Result<Vec<String>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let cleaned = item.trim_start_matches('.');
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_ascii_lowercase();
        if seen.insert(key) {
            out.push(cleaned.to_string());
        }
    }
    if out.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    Ok(out)
}

/// Splits a comma separated directory list, strips leading and trailing
/// slashes and drops duplicates while keeping the first occurrence.
pub fn parse_dir_list_csv(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in value.split(',') {
        let item = part.trim().trim_matches('/');
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.to_string()) {
            out.push(item.to_string());
        }
    }
    out
}

pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("invalid header '{raw}', expected 'Key: Value'")),
    }
}

/// Random alphanumeric string of `len` characters that shares no character
/// with `omit`.
pub fn rand_string(len: usize, omit: &str) -> String {
    let mut scope: Vec<u8> = ALPHANUMERIC
        .iter()
        .copied()
        .filter(|c| !omit.as_bytes().contains(c))
        .collect();
    if scope.is_empty() {
        scope = ALPHANUMERIC.to_vec();
    }
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| scope[rng.gen_range(0..scope.len())] as char)
        .collect()
}

pub fn pick_random<'a>(pool: &'a [String]) -> Option<&'a String> {
    pool.choose(&mut rand::thread_rng())
}

/// Percent-encodes everything except ascii alphanumerics and `_.-~:/?%&+=$`.
pub fn url_quote(value: &str) -> String {
    utf8_percent_encode(value, QUOTE_SET).to_string()
}

/// Reads a text file line by line, dropping blank lines.
pub async fn read_lines(path: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
    let handle = File::open(path).await?;
    let mut lines = BufReader::new(handle).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            out.push(line.to_string());
        }
    }
    Ok(out)
}

/// Human readable size using 1024 based units, e.g. `  4 KB`.
pub fn size_iec(bytes: u64) -> String {
    let mut num = bytes as f64;
    for unit in ["B ", "KB", "MB", "GB"] {
        if num < 1024.0 {
            return format!("{num:3.0} {unit}");
        }
        num /= 1024.0;
    }
    format!("{num:3.0} TB")
}
