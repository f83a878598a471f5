use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConfigFile {
    pub urls: Option<Vec<String>>,
    #[serde(alias = "input_file")]
    pub url_list: Option<String>,
    pub extensions: Option<String>,
    pub wordlist: Option<String>,
    pub threads: Option<usize>,
    pub workers: Option<usize>,
    pub recursive: Option<bool>,
    pub exclude_subdirs: Option<String>,
    pub subdirs: Option<String>,
    pub exclude_status: Option<String>,
    pub suppress_empty: Option<bool>,
    pub lowercase: Option<bool>,
    pub force_extensions: Option<bool>,
    pub timeout: Option<u64>,
    pub ip: Option<String>,
    pub proxy: Option<String>,
    pub max_retries: Option<usize>,
    pub request_by_hostname: Option<bool>,
    pub delay: Option<f64>,
    pub rate: Option<u32>,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub random_agents: Option<bool>,
    pub follow_redirects: Option<bool>,
    pub headers: Option<Vec<String>>,
    pub simple_report: Option<String>,
    pub plain_report: Option<String>,
    pub json_report: Option<String>,
    pub autosave: Option<bool>,
    pub autosave_format: Option<String>,
    pub save_home: Option<bool>,
    pub failed_path: Option<String>,
    pub data_dir: Option<String>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

/// `~/.dirsift`, where the config file and home-saved reports live.
pub fn home_save_dir() -> Option<PathBuf> {
    Some(home_dir()?.join(".dirsift"))
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_save_dir()?.join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(ConfigFile::default()),
        Ok(contents) => serde_yaml::from_str::<ConfigFile>(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

fn default_config_yaml() -> String {
    r#"# dirsift config
#
# Location (default):
#   ~/.dirsift/config.yml
#
# Every key mirrors a command line flag. Flags given on the command line win.

# Targets
# urls:
#   - https://example.com/
# url_list: ./targets.txt

# Dictionary
# wordlist: ./db/dicc.txt
# extensions: php,asp,html
lowercase: false
force_extensions: false

# Performance
threads: 10
# workers: 4
# rate: 50
# delay: 0.0

# HTTP
timeout: 30
max_retries: 5
follow_redirects: false
request_by_hostname: false
random_agents: false
# proxy: http://127.0.0.1:8080
# cookie: "session=abc"
# user_agent: "Mozilla/5.0"
# headers:
#   - "X-Forwarded-For: 127.0.0.1"

# Traversal
recursive: false
# exclude_subdirs: images,css
# subdirs: admin,api
# failed_path: this-does-not-exist

# Filters
# exclude_status: 500,503
suppress_empty: false

# Reports
autosave: true
autosave_format: plain
save_home: false
# simple_report: ./found.txt
# plain_report: ./found-plain.txt
# json_report: ./found.json

# Output styling
no_color: false
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    std::fs::write(path, default_config_yaml())
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_yaml_parses() {
        let cfg: ConfigFile = serde_yaml::from_str(&default_config_yaml()).unwrap();
        assert_eq!(cfg.threads, Some(10));
        assert_eq!(cfg.timeout, Some(30));
        assert_eq!(cfg.max_retries, Some(5));
        assert_eq!(cfg.autosave_format.as_deref(), Some("plain"));
        assert_eq!(cfg.urls, None);
    }

    #[test]
    fn load_config_handles_missing_files() {
        let missing = std::env::temp_dir().join("dirsift-no-such-config.yml");
        assert_eq!(load_config(&missing, true).unwrap(), ConfigFile::default());
        assert!(load_config(&missing, false).is_err());
    }

    #[test]
    fn ensure_default_config_file_writes_once() {
        let dir = std::env::temp_dir().join(format!("dirsift-cfg-{}", crate::utils::rand_string(10, "")));
        let path = dir.join("config.yml");
        ensure_default_config_file(&path).unwrap();
        std::fs::write(&path, "threads: 3\n").unwrap();
        ensure_default_config_file(&path).unwrap();
        let cfg = load_config(&path, false).unwrap();
        assert_eq!(cfg.threads, Some(3));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("./x.yml"), PathBuf::from("./x.yml"));
    }
}
