//! Structural similarity of two texts based on their longest common blocks.

use difference::{Changeset, Difference};

// Upper bound on the LCS table built by a single diff.
const MAX_DIFF_CELLS: usize = 250_000;

/// A run of text shared by both inputs. `start` is its byte offset in the
/// first input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block<'a> {
    pub start: usize,
    pub text: &'a str,
}

impl Block<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Ordered common fragments of `a` and `b`.
pub fn matching_blocks(a: &str, b: &str) -> Vec<String> {
    blocks(a, b).into_iter().map(|b| b.text.to_string()).collect()
}

/// `2 * M / T` in characters, where `M` counts characters inside matching
/// blocks and `T` is the combined length. Two empty strings are identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    let matched: usize = blocks(a, b).iter().map(|b| b.text.chars().count()).sum();
    (2 * matched) as f64 / total as f64
}

pub fn blocks<'a>(a: &'a str, b: &str) -> Vec<Block<'a>> {
    let mut out = Vec::new();
    collect_blocks(a, b, 0, 0, &mut out);
    out
}

// Token separators tried in turn when a character diff would be too big.
const SEPARATORS: [char; 2] = ['\n', ' '];

// Size in characters of the pieces aligned when no separator helps.
const CHUNK_CHARS: usize = 500;

fn collect_blocks<'a>(a: &'a str, b: &str, base: usize, level: usize, out: &mut Vec<Block<'a>>) {
    let prefix = common_prefix(a, b);
    let suffix = common_suffix(&a[prefix..], &b[prefix..]);
    let (mid_a, mid_b) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);

    push(out, base, &a[..prefix]);
    if !mid_a.is_empty() && !mid_b.is_empty() {
        diff_middle(mid_a, mid_b, base + prefix, level, out);
    }
    push(out, base + a.len() - suffix, &a[a.len() - suffix..]);
}

/// Character diff when the table is small enough, otherwise the first
/// separator from `level` on that keeps the token table small, otherwise
/// aligned chunks.
fn diff_middle<'a>(a: &'a str, b: &str, base: usize, level: usize, out: &mut Vec<Block<'a>>) {
    if a.chars().count() * b.chars().count() <= MAX_DIFF_CELLS {
        char_blocks(a, b, base, out);
        return;
    }
    for (i, &sep) in SEPARATORS.iter().enumerate().skip(level) {
        if !a.contains(sep) || !b.contains(sep) {
            continue;
        }
        if a.split(sep).count() * b.split(sep).count() <= MAX_DIFF_CELLS {
            token_blocks(a, b, sep, base, i + 1, out);
            return;
        }
    }
    chunk_blocks(a, b, base, out);
}

fn char_blocks<'a>(a: &'a str, b: &str, base: usize, out: &mut Vec<Block<'a>>) {
    let mut offset = 0;
    for diff in Changeset::new(a, b, "").diffs {
        match diff {
            Difference::Same(text) => {
                push(out, base + offset, &a[offset..offset + text.len()]);
                offset += text.len();
            }
            Difference::Rem(text) => offset += text.len(),
            Difference::Add(_) => {}
        }
    }
}

/// Diffs `sep`-separated tokens, then refines every replaced run at the
/// next level.
fn token_blocks<'a>(a: &'a str, b: &str, sep: char, base: usize, next: usize, out: &mut Vec<Block<'a>>) {
    let split = sep.to_string();
    let step = sep.len_utf8();
    let mut offset = 0;
    // Replaced token runs waiting to be refined.
    let mut removed: Option<(usize, usize)> = None;
    let mut added = String::new();

    let flush = |removed: &mut Option<(usize, usize)>, added: &mut String, out: &mut Vec<Block<'a>>| {
        if let Some((start, end)) = removed.take() {
            if !added.is_empty() {
                collect_blocks(&a[start..end], added.as_str(), base + start, next, out);
            }
        }
        added.clear();
    };

    for diff in Changeset::new(a, b, &split).diffs {
        match diff {
            Difference::Same(text) => {
                flush(&mut removed, &mut added, out);
                push(out, base + offset, &a[offset..offset + text.len()]);
                offset = (offset + text.len() + step).min(a.len());
            }
            Difference::Rem(text) => {
                let start = removed.map(|(start, _)| start).unwrap_or(offset);
                removed = Some((start, offset + text.len()));
                offset = (offset + text.len() + step).min(a.len());
            }
            Difference::Add(text) => {
                if !added.is_empty() {
                    added.push(sep);
                }
                added.push_str(&text);
            }
        }
    }
    flush(&mut removed, &mut added, out);
}

/// Cuts both texts into the same number of pieces of at most `CHUNK_CHARS`
/// characters and diffs the pieces pairwise.
fn chunk_blocks<'a>(a: &'a str, b: &str, base: usize, out: &mut Vec<Block<'a>>) {
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    let pieces = len_a.max(len_b).div_ceil(CHUNK_CHARS).max(1);
    let chunks_a = split_even(a, len_a, pieces);
    let chunks_b = split_even(b, len_b, pieces);
    for ((start, piece_a), (_, piece_b)) in chunks_a.into_iter().zip(chunks_b) {
        if !piece_a.is_empty() && !piece_b.is_empty() {
            collect_blocks(piece_a, piece_b, base + start, SEPARATORS.len(), out);
        }
    }
}

/// `pieces` consecutive slices of `text` with near-equal character counts,
/// paired with their byte offsets.
fn split_even(text: &str, chars: usize, pieces: usize) -> Vec<(usize, &str)> {
    let mut bounds: Vec<usize> = (1..pieces)
        .map(|i| {
            let nth = chars * i / pieces;
            text.char_indices().nth(nth).map_or(text.len(), |(idx, _)| idx)
        })
        .collect();
    bounds.insert(0, 0);
    bounds.push(text.len());
    bounds.windows(2).map(|w| (w[0], &text[w[0]..w[1]])).collect()
}

fn push<'a>(out: &mut Vec<Block<'a>>, start: usize, text: &'a str) {
    if !text.is_empty() {
        out.push(Block { start, text });
    }
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((idx, _), _)| idx)
        .unwrap_or_else(|| a.len().min(b.len()))
}

fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(ca, cb)| ca == cb)
        .map(|(ca, _)| ca.len_utf8())
        .sum()
}
