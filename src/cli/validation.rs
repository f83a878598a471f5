use std::net::IpAddr;

use crate::cli::args::CliArgs;
use crate::output::ReportFormat;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err("invalid --threads, expected positive integer".to_string());
        }
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err("invalid --workers, expected positive integer".to_string());
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid --timeout, expected positive integer".to_string());
        }
    }
    if let Some(delay) = args.delay {
        if !delay.is_finite() || delay < 0.0 {
            return Err(format!("invalid --delay '{delay}', expected seconds >= 0"));
        }
    }
    if let Some(raw) = args.exclude_status.as_deref() {
        crate::utils::parse_u16_set_csv(raw)
            .map_err(|e| format!("invalid --exclude-status '{raw}': {e}"))?;
    }
    if let Some(raw) = args.extensions.as_deref() {
        crate::utils::parse_extensions_csv(raw)
            .map_err(|e| format!("invalid --extensions '{raw}': {e}"))?;
    }
    if let Some(raw) = args.ip.as_deref() {
        raw.trim()
            .parse::<IpAddr>()
            .map_err(|_| format!("invalid --ip '{raw}', expected an IP address"))?;
    }
    if let Some(raw) = args.autosave_format.as_deref() {
        if ReportFormat::parse(raw).is_none() {
            return Err(format!(
                "invalid --autosave-format '{raw}', expected simple, plain or json"
            ));
        }
    }
    for raw in args.header.iter() {
        crate::utils::parse_header(raw).map_err(|e| format!("invalid --header: {e}"))?;
    }
    if args.exclude_subdirs.is_some() && !args.recursive {
        return Err("--exclude-subdirs requires --recursive".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["dirsift", "-u", "http://example.com/", "-e", "php"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn accepts_defaults() {
        assert!(validate(&parse(&[])).is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(validate(&parse(&["-t", "0"])).is_err());
        assert!(validate(&parse(&["-x", "abc"])).is_err());
        assert!(validate(&parse(&["--ip", "not-an-ip"])).is_err());
        assert!(validate(&parse(&["--autosave-format", "xml"])).is_err());
        assert!(validate(&parse(&["-H", "novalue"])).is_err());
        assert!(validate(&parse(&["--delay", "-1"])).is_err());
    }

    #[test]
    fn exclusions_need_recursion() {
        assert!(validate(&parse(&["--exclude-subdirs", "images"])).is_err());
        assert!(validate(&parse(&["--exclude-subdirs", "images", "-r"])).is_ok());
    }
}
