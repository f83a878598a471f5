use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::fuzzer::ScanPath;
use crate::utils;

const BLACKLIST_400: &str = include_str!("../../db/400_blacklist.txt");
const BLACKLIST_403: &str = include_str!("../../db/403_blacklist.txt");
const BLACKLIST_500: &str = include_str!("../../db/500_blacklist.txt");
const USER_AGENTS: &str = include_str!("../../db/user-agents.txt");

pub const BLACKLIST_STATUSES: [u16; 3] = [400, 403, 500];

/// Non-blank lines of a bundled list, `#` comments dropped.
fn list_lines<'a>(text: &'a str) -> impl Iterator<Item = String> + 'a {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(str::to_string)
}

fn bundled_blacklist(status: u16) -> &'static str {
    match status {
        400 => BLACKLIST_400,
        403 => BLACKLIST_403,
        _ => BLACKLIST_500,
    }
}

/// Reads `name` from `data_dir`, or the bundled copy when no directory is
/// configured. A missing file in `data_dir` reads as empty.
async fn data_file(data_dir: Option<&Path>, name: &str, bundled: &str) -> Vec<String> {
    let Some(dir) = data_dir else {
        return list_lines(bundled).collect();
    };
    let path = dir.join(name);
    match utils::read_lines(&path).await {
        Ok(lines) => lines
            .into_iter()
            .filter(|line| !line.trim_start().starts_with('#'))
            .collect(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "data file unavailable");
            Vec::new()
        }
    }
}

pub async fn load_blacklists(data_dir: Option<&Path>) -> HashMap<u16, HashSet<String>> {
    let mut blacklists = HashMap::new();
    for status in BLACKLIST_STATUSES {
        let name = format!("{status}_blacklist.txt");
        let lines = data_file(data_dir, &name, bundled_blacklist(status)).await;
        blacklists.insert(status, lines.into_iter().collect());
    }
    blacklists
}

pub async fn load_user_agents(data_dir: Option<&Path>) -> Vec<String> {
    data_file(data_dir, "user-agents.txt", USER_AGENTS).await
}

/// Decides which matches reach the terminal and the reports, and which
/// of them are queued for recursion.
#[derive(Clone, Debug, Default)]
pub struct MatchFilter {
    pub exclude_status: HashSet<u16>,
    pub blacklists: HashMap<u16, HashSet<String>>,
    pub suppress_empty: bool,
    pub recursive: bool,
    pub exclude_subdirs: Vec<String>,
}

impl MatchFilter {
    pub fn accepts(&self, found: &ScanPath) -> bool {
        let Some(status) = found.status else {
            return false;
        };
        if self.exclude_status.contains(&status) {
            return false;
        }
        if self
            .blacklists
            .get(&status)
            .is_some_and(|list| list.contains(&found.path))
        {
            return false;
        }
        !(self.suppress_empty && found.response.is_empty())
    }

    pub fn descends_into(&self, path: &str) -> bool {
        if !self.recursive || !path.ends_with('/') {
            return false;
        }
        let name = path.trim_matches('/');
        !self
            .exclude_subdirs
            .iter()
            .any(|excluded| excluded.trim_matches('/') == name)
    }
}
