use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dirsift",
    version,
    about = "web path scanner that sees through soft-404 pages",
    long_about = "dirsift brute-forces paths on web servers and tells real resources apart from the server's way of saying \"not found\", even when it answers 200 or redirects everything to an error page.\n\nExamples:\n  dirsift -u https://target.tld/ -e php,html\n  dirsift -u https://target.tld/ -e php -w ./db/dicc.txt -r --exclude-subdirs images,css\n  dirsift -l targets.txt -e php --json-report found.json\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv, -vvv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "no-color",
        visible_alias = "nc",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'u',
        long = "url",
        value_name = "URL",
        action = ArgAction::Append,
        help_heading = "Mandatory",
        help = "Target URL (repeatable)."
    )]
    pub url: Vec<String>,

    #[arg(
        short = 'l',
        long = "url-list",
        visible_alias = "input-file",
        value_name = "FILE",
        help_heading = "Mandatory",
        help = "Load target URLs from a file (one per line)."
    )]
    pub url_list: Option<String>,

    #[arg(
        short = 'e',
        long = "extensions",
        visible_alias = "ext",
        value_name = "EXTENSIONS",
        help_heading = "Mandatory",
        help = "Extension list separated by commas (e.g. php,asp)."
    )]
    pub extensions: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Mandatory",
        help = "Path to config file (defaults to ~/.dirsift/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'w',
        long = "wordlist",
        value_name = "FILE",
        help_heading = "Dictionary",
        help = "Wordlist file path (one word per line, %EXT% expands to each extension)."
    )]
    pub wordlist: Option<String>,

    #[arg(
        long = "lowercase",
        visible_alias = "lc",
        help_heading = "Dictionary",
        help = "Lowercase every dictionary entry."
    )]
    pub lowercase: bool,

    #[arg(
        short = 'f',
        long = "force-extensions",
        help_heading = "Dictionary",
        help = "Append every extension to each entry that is not a directory, and add a directory variant."
    )]
    pub force_extensions: bool,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of concurrent scan workers (default 10)."
    )]
    pub threads: Option<usize>,

    #[arg(
        long = "workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of runtime worker threads."
    )]
    pub workers: Option<usize>,

    #[arg(
        long = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Request rate limit (requests per second)."
    )]
    pub rate: Option<u32>,

    #[arg(
        long = "delay",
        value_name = "SECONDS",
        help_heading = "Performance",
        help = "Delay after each request, fractional seconds allowed."
    )]
    pub delay: Option<f64>,

    #[arg(
        short = 'r',
        long = "recursive",
        help_heading = "Traversal",
        help = "Scan discovered directories recursively."
    )]
    pub recursive: bool,

    #[arg(
        long = "exclude-subdirs",
        value_name = "DIRS",
        help_heading = "Traversal",
        help = "Directories never entered during recursion, separated by commas."
    )]
    pub exclude_subdirs: Option<String>,

    #[arg(
        long = "subdirs",
        value_name = "DIRS",
        help_heading = "Traversal",
        help = "Start scanning from these sub directories instead of the base path, separated by commas."
    )]
    pub subdirs: Option<String>,

    #[arg(
        long = "failed-path",
        value_name = "PATH",
        help_heading = "Traversal",
        help = "Path known not to exist, used to calibrate not-found detection."
    )]
    pub failed_path: Option<String>,

    #[arg(
        short = 'x',
        long = "exclude-status",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Hide matches with these status codes, separated by commas (e.g. 301,500)."
    )]
    pub exclude_status: Option<String>,

    #[arg(
        long = "suppress-empty",
        help_heading = "Filters",
        help = "Hide matches with an empty body."
    )]
    pub suppress_empty: bool,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "HTTP",
        help = "Per-request timeout in seconds (default 30)."
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "ip",
        value_name = "IP",
        help_heading = "HTTP",
        help = "Connect to this IP instead of resolving the target host."
    )]
    pub ip: Option<String>,

    #[arg(
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "HTTP proxy (e.g. 127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        long = "max-retries",
        value_name = "N",
        help_heading = "HTTP",
        help = "Retries after a connection error or timeout (default 5)."
    )]
    pub max_retries: Option<usize>,

    #[arg(
        short = 'b',
        long = "request-by-hostname",
        help_heading = "HTTP",
        help = "Let the HTTP client resolve the hostname instead of pinning the resolved IP."
    )]
    pub request_by_hostname: bool,

    #[arg(
        long = "cookie",
        value_name = "COOKIE",
        help_heading = "HTTP",
        help = "Cookie header sent with every request."
    )]
    pub cookie: Option<String>,

    #[arg(
        long = "user-agent",
        visible_alias = "ua",
        value_name = "AGENT",
        help_heading = "HTTP",
        help = "User-Agent sent with every request."
    )]
    pub user_agent: Option<String>,

    #[arg(
        long = "random-agents",
        visible_alias = "random-user-agents",
        help_heading = "HTTP",
        help = "Pick a random User-Agent for every request."
    )]
    pub random_agents: bool,

    #[arg(
        short = 'F',
        long = "follow-redirects",
        help_heading = "HTTP",
        help = "Follow HTTP redirects."
    )]
    pub follow_redirects: bool,

    #[arg(
        short = 'H',
        long = "header",
        value_name = "HEADER",
        action = ArgAction::Append,
        help_heading = "HTTP",
        help = "Add a header to all requests (format: 'Key: Value', repeatable)."
    )]
    pub header: Vec<String>,

    #[arg(
        long = "simple-report",
        value_name = "FILE",
        help_heading = "Reports",
        help = "Write found URLs to a file, one per line."
    )]
    pub simple_report: Option<String>,

    #[arg(
        long = "plain-report",
        value_name = "FILE",
        help_heading = "Reports",
        help = "Write status, size and URL of every match to a file."
    )]
    pub plain_report: Option<String>,

    #[arg(
        long = "json-report",
        value_name = "FILE",
        help_heading = "Reports",
        help = "Write matches to a JSON file."
    )]
    pub json_report: Option<String>,

    #[arg(
        long = "autosave",
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "BOOL",
        help_heading = "Reports",
        help = "Save a report for every target under <save dir>/reports (default true)."
    )]
    pub autosave: Option<bool>,

    #[arg(
        long = "autosave-format",
        value_name = "FORMAT",
        help_heading = "Reports",
        help = "Format of autosaved reports: simple, plain or json (default plain)."
    )]
    pub autosave_format: Option<String>,

    #[arg(
        long = "save-home",
        help_heading = "Reports",
        help = "Save reports and error logs under ~/.dirsift instead of the current directory."
    )]
    pub save_home: bool,

    #[arg(
        long = "data-dir",
        value_name = "DIR",
        help_heading = "Reports",
        help = "Directory holding user-agents.txt and the status blacklists (built-in lists when unset)."
    )]
    pub data_dir: Option<String>,
}
