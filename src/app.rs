use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use itertools::Itertools;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::controller::{Controller, ScanOptions};
use crate::dictionary::DictionaryOptions;
use crate::output::{CliOutput, ReportFormat};
use crate::requester::RequesterOptions;

#[derive(Clone, Debug)]
struct RunConfig {
    scan: ScanOptions,
    workers: usize,
    no_color: bool,
    verbose: u8,
}

fn read_url_list(path: &str) -> Result<Vec<String>, String> {
    let path = config::expand_tilde(path);
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| format!("failed to read url list '{}': {e}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn collect_targets(args: &CliArgs, cfg: &ConfigFile) -> Result<Vec<String>, String> {
    let mut urls: Vec<String> = args
        .url
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if let Some(list) = args.url_list.as_deref().or(cfg.url_list.as_deref()) {
        urls.extend(read_url_list(list)?);
    }
    if urls.is_empty() {
        urls = cfg.urls.clone().unwrap_or_default();
    }
    let urls: Vec<String> = urls.into_iter().unique().collect();
    if urls.is_empty() {
        return Err("URL target is missing, try using -u <url> or -l <file>".to_string());
    }
    Ok(urls)
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let urls = collect_targets(&args, &cfg)?;
    let no_color = args.no_color || cfg.no_color.unwrap_or(false);

    let extensions_raw = args
        .extensions
        .clone()
        .or(cfg.extensions.clone())
        .ok_or_else(|| "no extension specified, you must give at least one with -e".to_string())?;
    let extensions = crate::utils::parse_extensions_csv(&extensions_raw)
        .map_err(|e| format!("invalid extensions '{extensions_raw}': {e}"))?;
    let dictionary = DictionaryOptions {
        extensions,
        lowercase: args.lowercase || cfg.lowercase.unwrap_or(false),
        force_extensions: args.force_extensions || cfg.force_extensions.unwrap_or(false),
    };
    let wordlist = args
        .wordlist
        .clone()
        .or(cfg.wordlist.clone())
        .map(|p| config::expand_tilde(&p));

    let threads = args.threads.or(cfg.threads).unwrap_or(10);
    if threads == 0 {
        return Err("threads must be a positive integer".to_string());
    }
    let workers = args.workers.or(cfg.workers).unwrap_or(10).max(1);

    let recursive = args.recursive || cfg.recursive.unwrap_or(false);
    let exclude_subdirs = args
        .exclude_subdirs
        .clone()
        .or(cfg.exclude_subdirs.clone())
        .map(|raw| crate::utils::parse_dir_list_csv(&raw))
        .unwrap_or_default();
    if !exclude_subdirs.is_empty() && !recursive {
        return Err("--exclude-subdirs requires --recursive".to_string());
    }
    let subdirs = args
        .subdirs
        .clone()
        .or(cfg.subdirs.clone())
        .map(|raw| crate::utils::parse_dir_list_csv(&raw))
        .unwrap_or_default();

    let exclude_status = match args.exclude_status.clone().or(cfg.exclude_status.clone()) {
        Some(raw) => crate::utils::parse_u16_set_csv(&raw)
            .map_err(|e| format!("invalid exclude status '{raw}': {e}"))?,
        None => Default::default(),
    };

    let ip = match args.ip.clone().or(cfg.ip.clone()) {
        Some(raw) => Some(
            raw.trim()
                .parse::<IpAddr>()
                .map_err(|_| format!("invalid ip '{raw}'"))?,
        ),
        None => None,
    };
    let delay = args.delay.or(cfg.delay).unwrap_or(0.0);
    if !delay.is_finite() || delay < 0.0 {
        return Err(format!("invalid delay '{delay}'"));
    }
    let raw_headers = if args.header.is_empty() {
        cfg.headers.clone().unwrap_or_default()
    } else {
        args.header.clone()
    };
    let headers = raw_headers
        .iter()
        .map(|h| crate::utils::parse_header(h))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid header: {e}"))?;
    let timeout = args.timeout.or(cfg.timeout).unwrap_or(30);
    let requester = RequesterOptions {
        timeout: Duration::from_secs(timeout.max(1)),
        ip,
        proxy: args
            .proxy
            .clone()
            .or(cfg.proxy.clone())
            .filter(|p| !p.trim().is_empty()),
        max_retries: args.max_retries.or(cfg.max_retries).unwrap_or(5),
        request_by_hostname: args.request_by_hostname || cfg.request_by_hostname.unwrap_or(false),
        delay: Duration::from_secs_f64(delay),
        rate: args.rate.or(cfg.rate).filter(|r| *r > 0),
        cookie: args.cookie.clone().or(cfg.cookie.clone()),
        user_agent: args.user_agent.clone().or(cfg.user_agent.clone()),
        random_agents: Vec::new(),
        headers,
        follow_redirects: args.follow_redirects || cfg.follow_redirects.unwrap_or(false),
    };

    let autosave_format = match args.autosave_format.clone().or(cfg.autosave_format.clone()) {
        Some(raw) => ReportFormat::parse(&raw)
            .ok_or_else(|| format!("invalid autosave format '{raw}', expected simple, plain or json"))?,
        None => ReportFormat::Plain,
    };
    let save_dir = if args.save_home || cfg.save_home.unwrap_or(false) {
        config::home_save_dir().ok_or_else(|| "cannot locate the home directory".to_string())?
    } else {
        PathBuf::from(".")
    };
    let path_option = |cli: &Option<String>, file: &Option<String>| {
        cli.clone().or(file.clone()).map(|p| config::expand_tilde(&p))
    };

    let scan = ScanOptions {
        urls,
        wordlist,
        dictionary,
        threads,
        recursive,
        exclude_subdirs,
        subdirs,
        exclude_status,
        suppress_empty: args.suppress_empty || cfg.suppress_empty.unwrap_or(false),
        failed_path: args.failed_path.clone().or(cfg.failed_path.clone()),
        requester,
        random_agents: args.random_agents || cfg.random_agents.unwrap_or(false),
        simple_report: path_option(&args.simple_report, &cfg.simple_report),
        plain_report: path_option(&args.plain_report, &cfg.plain_report),
        json_report: path_option(&args.json_report, &cfg.json_report),
        autosave: args.autosave.or(cfg.autosave).unwrap_or(true),
        autosave_format,
        save_dir,
        data_dir: path_option(&args.data_dir, &cfg.data_dir),
    };

    Ok(RunConfig {
        scan,
        workers,
        no_color,
        verbose: args.verbose,
    })
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("warn,dirsift={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    let output = Arc::new(CliOutput::new());
    output.banner();

    let controller = Controller::new(run.scan, Arc::clone(&output))
        .await
        .map_err(|e| e.to_string())?;
    let summary = controller.run().await.map_err(|e| e.to_string())?;
    tracing::debug!(
        targets = summary.targets_scanned,
        skipped = summary.targets_skipped,
        directories = summary.directories,
        matches = summary.matches,
        errors = summary.errors,
        "scan finished"
    );
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = e.print();
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => {
                if let Err(e) = config::ensure_default_config_file(&path) {
                    eprintln!("warning: {e}");
                }
                config::load_config(&path, true)?
            }
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    init_tracing(run.verbose);
    if run.no_color {
        colored::control::set_override(false);
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(run.workers)
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    let result = rt.block_on(run_async(run));
    // a pending stdin read from the interrupt prompt would otherwise block shutdown
    rt.shutdown_timeout(Duration::from_millis(250));
    result
}
