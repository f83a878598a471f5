use std::path::{Path, PathBuf};
use std::sync::Mutex;

use itertools::Itertools;
use thiserror::Error;

use crate::utils;

const EXT_TOKEN: &str = "%EXT%";

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read wordlist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, Default)]
pub struct DictionaryOptions {
    pub extensions: Vec<String>,
    pub lowercase: bool,
    pub force_extensions: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Cursor<'a> {
    Next { index: usize, path: &'a str },
    Exhausted,
}

/// Expanded wordlist with a single cursor shared by every worker.
#[derive(Debug)]
pub struct Dictionary {
    entries: Vec<String>,
    extensions: Vec<String>,
    cursor: Mutex<usize>,
}

impl Dictionary {
    pub fn build<I, S>(lines: I, options: &DictionaryOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut expanded: Vec<String> = Vec::new();
        for line in lines {
            let line = line.as_ref();
            if line.trim_start().starts_with('#') {
                continue;
            }
            if line.contains(EXT_TOKEN) {
                for ext in options.extensions.iter() {
                    expanded.push(utils::url_quote(&line.replace(EXT_TOKEN, ext)));
                }
            } else if options.force_extensions && !line.trim_end().ends_with('/') {
                let quoted = utils::url_quote(line);
                expanded.push(quoted.clone());
                for ext in options.extensions.iter() {
                    if ext.trim().is_empty() {
                        expanded.push(quoted.clone());
                    } else {
                        expanded.push(format!("{quoted}.{ext}"));
                    }
                }
                if !quoted.trim().is_empty() {
                    expanded.push(format!("{quoted}/"));
                }
            } else {
                expanded.push(utils::url_quote(line));
            }
        }

        let entries = if options.lowercase {
            expanded.into_iter().map(|e| e.to_lowercase()).unique().collect()
        } else {
            expanded.into_iter().unique().collect()
        };

        Self {
            entries,
            extensions: options.extensions.clone(),
            cursor: Mutex::new(0),
        }
    }

    pub async fn from_file(
        path: impl AsRef<Path>,
        options: &DictionaryOptions,
    ) -> Result<Self, DictionaryError> {
        let path = path.as_ref();
        let lines = utils::read_lines(path)
            .await
            .map_err(|e| DictionaryError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
        let dictionary = Self::build(lines, options);
        tracing::debug!(path = %path.display(), entries = dictionary.len(), "loaded wordlist");
        Ok(dictionary)
    }

    /// Hands out the entry under the cursor and advances it.
    pub fn next_entry(&self) -> Cursor<'_> {
        let mut cursor = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match self.entries.get(*cursor) {
            Some(path) => {
                *cursor += 1;
                Cursor::Next {
                    index: *cursor,
                    path,
                }
            }
            None => Cursor::Exhausted,
        }
    }

    pub fn reset_cursor(&self) {
        let mut cursor = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
