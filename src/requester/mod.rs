use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect;
use thiserror::Error;

use crate::utils;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:64.0) Gecko/20100101 Firefox/64.0";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("couldn't resolve DNS for {host}")]
    DnsResolutionFailed { host: String },

    #[error("connection timeout, a problem occurred during the request to: {path}")]
    ConnectionFailed { path: String },

    #[error("error with the proxy: {message}")]
    ProxyError { message: String },

    #[error("SSL error connecting to server: {message} (try --request-by-hostname)")]
    TlsError { message: String },

    #[error("too many redirects: {message}")]
    TooManyRedirects { message: String },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("invalid header: {header}")]
    InvalidHeader { header: String },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

/// A fully read HTTP response.
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn redirect(&self) -> Option<&str> {
        self.headers.get("location").map(String::as_str)
    }

    /// `Content-Length` when the server sent a parsable one, else the body size.
    pub fn content_length(&self) -> u64 {
        self.headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(self.body.len() as u64)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Something that can GET a path relative to a scan base.
///
/// The worker pool and the calibration probes only need this, which keeps
/// them testable without a network.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Response, RequestError>> + Send;
}

/// Connection details of a scan target, parsed once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Always starts and ends with `/`.
    pub base_path: String,
    pub ip: Option<IpAddr>,
}

impl Target {
    pub fn parse(url: &str) -> Result<Self, RequestError> {
        let mut raw = url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let lower = raw.to_ascii_lowercase();
        if !lower.starts_with("http://") && !lower.starts_with("https://") {
            raw = match raw.split_once("://") {
                Some((_, rest)) => format!("http://{rest}"),
                None => format!("http://{raw}"),
            };
        }
        let parsed = reqwest::Url::parse(&raw).map_err(|_| RequestError::InvalidUrl {
            url: url.to_string(),
        })?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RequestError::InvalidUrl {
                url: url.to_string(),
            })?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| RequestError::InvalidUrl {
                url: url.to_string(),
            })?;
        let mut base_path = parsed.path().to_string();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }
        Ok(Self {
            scheme: parsed.scheme().to_string(),
            host,
            port,
            base_path,
            ip: None,
        })
    }

    /// `scheme://host:port/`
    pub fn root_url(&self) -> String {
        format!("{}://{}:{}/", self.scheme, self.host, self.port)
    }
}

#[derive(Clone, Debug)]
pub struct RequesterOptions {
    pub timeout: Duration,
    pub ip: Option<IpAddr>,
    pub proxy: Option<String>,
    pub max_retries: usize,
    pub request_by_hostname: bool,
    pub delay: Duration,
    /// Requests per second, unlimited when `None`.
    pub rate: Option<u32>,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub random_agents: Vec<String>,
    pub headers: Vec<(String, String)>,
    pub follow_redirects: bool,
}

impl Default for RequesterOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            ip: None,
            proxy: None,
            max_retries: 5,
            request_by_hostname: false,
            delay: Duration::ZERO,
            rate: None,
            cookie: None,
            user_agent: None,
            random_agents: Vec::new(),
            headers: Vec::new(),
            follow_redirects: false,
        }
    }
}

struct Settings {
    max_retries: usize,
    delay: Duration,
    proxied: bool,
    random_agents: Vec<String>,
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

/// Issues GET requests against one resolved target.
///
/// Cloning is cheap; clones share the connection pool and rate limiter.
#[derive(Clone)]
pub struct Requester {
    target: Arc<Target>,
    base_path: String,
    client: reqwest::Client,
    settings: Arc<Settings>,
}

impl Requester {
    pub async fn resolve(url: &str, options: &RequesterOptions) -> Result<Self, RequestError> {
        let mut target = Target::parse(url)?;
        target.ip = match options.ip {
            Some(ip) => Some(ip),
            None if options.request_by_hostname => None,
            None => Some(lookup(&target.host, target.port).await?),
        };

        let client = build_client(&target, options)?;
        let limiter = options
            .rate
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        tracing::debug!(
            host = %target.host,
            ip = ?target.ip,
            port = target.port,
            base = %target.base_path,
            "resolved target"
        );

        Ok(Self {
            base_path: target.base_path.clone(),
            target: Arc::new(target),
            client,
            settings: Arc::new(Settings {
                max_retries: options.max_retries,
                delay: options.delay,
                proxied: options.proxy.as_deref().is_some_and(|p| !p.trim().is_empty()),
                random_agents: options.random_agents.clone(),
                limiter,
            }),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Same connection, with `sub_dir` appended to the target's base path.
    pub fn scoped(&self, sub_dir: &str) -> Self {
        let mut base_path = format!("{}{}", self.target.base_path, sub_dir.trim_start_matches('/'));
        if !base_path.ends_with('/') {
            base_path.push('/');
        }
        Self {
            target: Arc::clone(&self.target),
            base_path,
            client: self.client.clone(),
            settings: Arc::clone(&self.settings),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!(
            "{}://{}:{}{}{}",
            self.target.scheme, self.target.host, self.target.port, self.base_path, path
        )
    }

    /// GETs `path`, retrying silently on connection errors and timeouts.
    pub async fn request(&self, path: &str) -> Result<Response, RequestError> {
        let url = self.url_for(path);
        let mut attempt = 0usize;
        loop {
            if let Some(limiter) = self.settings.limiter.as_ref() {
                limiter.until_ready().await;
            }
            let result = self.send(&url).await;
            if !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay).await;
            }
            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            if let Some(fatal) = classify_failure(&err, self.settings.proxied) {
                return Err(fatal);
            }
            if attempt >= self.settings.max_retries {
                return Err(RequestError::ConnectionFailed {
                    path: path.to_string(),
                });
            }
            attempt += 1;
            tracing::debug!(%url, attempt, error = %err, "retrying request");
        }
    }

    async fn send(&self, url: &str) -> Result<Response, reqwest::Error> {
        let mut builder = self.client.get(url);
        if let Some(agent) = utils::pick_random(&self.settings.random_agents) {
            builder = builder.header(reqwest::header::USER_AGENT, agent.as_str());
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let headers = header_map_to_hashmap(resp.headers());
        let body = resp.bytes().await?.to_vec();
        Ok(Response {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

impl Fetch for Requester {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Response, RequestError>> + Send {
        self.request(path)
    }
}

async fn lookup(host: &str, port: u16) -> Result<IpAddr, RequestError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let failed = || RequestError::DnsResolutionFailed {
        host: host.to_string(),
    };
    let mut addrs = tokio::net::lookup_host((bare, port))
        .await
        .map_err(|_| failed())?;
    addrs.next().map(|addr| addr.ip()).ok_or_else(failed)
}

fn build_client(target: &Target, options: &RequesterOptions) -> Result<reqwest::Client, RequestError> {
    let mut headers = HeaderMap::new();
    let user_agent = options.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    let defaults = [
        ("User-Agent", user_agent),
        ("Accept-Language", "en-us"),
        ("Accept-Encoding", "identity"),
        ("Cache-Control", "max-age=0"),
    ];
    let mut pairs: Vec<(&str, &str)> = defaults.to_vec();
    if let Some(cookie) = options.cookie.as_deref() {
        pairs.push(("Cookie", cookie));
    }
    for (k, v) in options.headers.iter() {
        pairs.push((k.as_str(), v.as_str()));
    }
    for (k, v) in pairs {
        let invalid = || RequestError::InvalidHeader {
            header: format!("{k}: {v}"),
        };
        let key = HeaderName::from_str(k.trim()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(v.trim()).map_err(|_| invalid())?;
        headers.insert(key, value);
    }

    let redirect_policy = if options.follow_redirects {
        redirect::Policy::limited(10)
    } else {
        redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .redirect(redirect_policy)
        .timeout(options.timeout)
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);

    if let Some(ip) = target.ip.filter(|_| !options.request_by_hostname) {
        builder = builder.resolve(&target.host, SocketAddr::new(ip, target.port));
    }

    if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        let proxy_url = if proxy.contains("://") {
            proxy.to_string()
        } else {
            format!("http://{proxy}")
        };
        let proxy = reqwest::Proxy::all(&proxy_url).map_err(|e| RequestError::ProxySetup {
            proxy: proxy_url.clone(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| RequestError::ClientBuild { source: e })
}

fn header_map_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (k, v) in headers.iter() {
        if let Ok(v) = v.to_str() {
            out.insert(k.as_str().to_lowercase(), v.to_string());
        }
    }
    out
}

/// Maps a transport error to the error surfaced to callers, or `None` when
/// the request should be retried.
fn classify_failure(err: &reqwest::Error, proxied: bool) -> Option<RequestError> {
    if err.is_redirect() {
        return Some(RequestError::TooManyRedirects {
            message: err.to_string(),
        });
    }
    if let Some(message) = tls_failure(err) {
        return Some(RequestError::TlsError { message });
    }
    if err.is_connect() && proxied {
        return Some(RequestError::ProxyError {
            message: err.to_string(),
        });
    }
    None
}

/// Message of the TLS error behind `err`, if the handshake is what failed.
fn tls_failure(err: &reqwest::Error) -> Option<String> {
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        if let Some(tls) = e.downcast_ref::<native_tls::Error>() {
            return Some(tls.to_string());
        }
        source = e.source();
    }
    None
}
