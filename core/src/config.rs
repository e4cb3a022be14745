//! Session configuration.
//!
//! # Design
//! `RequestConfig` is plain data with owned fields. It derives serde traits so
//! a host application can load it from whatever format it likes; the crate
//! itself never reads configuration files. Every field has a default, so a
//! partial document deserializes cleanly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ACCEPT: &str = "image/gif, image/x-xbitmap, image/jpeg, image/pjpeg, */*";
pub const DEFAULT_MAX_LENGTH: usize = 500_000;
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Encoding used for form submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitType {
    #[default]
    UrlEncoded,
    Multipart,
}

impl SubmitType {
    pub fn mime(self) -> &'static str {
        match self {
            SubmitType::UrlEncoded => "application/x-www-form-urlencoded",
            SubmitType::Multipart => "multipart/form-data",
        }
    }
}

/// HTTP method used by `Agent::submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmitMethod {
    #[default]
    Post,
    Put,
}

/// Mutable session state shared by every request of a fetch chain.
///
/// `scheme`, `host` and `port` describe the origin of the most recent request
/// and are rewritten by the agent as it follows redirects to other origins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,

    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub proxy_user: Option<String>,
    pub proxy_pass: Option<String>,

    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub accept: Option<String>,
    pub use_gzip: bool,
    /// Extra headers sent verbatim, in order. A `Host` entry replaces the
    /// generated one.
    pub raw_headers: Vec<(String, String)>,

    pub user: Option<String>,
    pub pass: Option<String>,

    pub submit_method: SubmitMethod,
    pub submit_type: SubmitType,

    pub ca_file: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    /// Accept any server certificate and host name. Off unless set.
    pub insecure_skip_verify: bool,

    pub connect_timeout: Duration,
    /// `None` waits forever for each read.
    pub read_timeout: Option<Duration>,

    /// Body bytes kept per response; anything past this is never read.
    pub max_length: usize,
    pub max_redirects: u32,
    pub max_frames: u32,
    pub offsite_ok: bool,
    pub expand_links: bool,
    pub pass_cookies: bool,

    pub http_version: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: String::new(),
            port: 80,
            proxy_host: None,
            proxy_port: None,
            proxy_user: None,
            proxy_pass: None,
            user_agent: Some(concat!("courier/", env!("CARGO_PKG_VERSION")).to_string()),
            referer: None,
            accept: Some(DEFAULT_ACCEPT.to_string()),
            use_gzip: true,
            raw_headers: Vec::new(),
            user: None,
            pass: None,
            submit_method: SubmitMethod::Post,
            submit_type: SubmitType::UrlEncoded,
            ca_file: None,
            ca_path: None,
            insecure_skip_verify: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            max_length: DEFAULT_MAX_LENGTH,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_frames: 0,
            offsite_ok: true,
            expand_links: true,
            pass_cookies: true,
            http_version: "HTTP/1.0".to_string(),
        }
    }
}

impl RequestConfig {
    /// The proxy endpoint, when both host and port are configured.
    pub fn proxy(&self) -> Option<(&str, u16)> {
        match (self.proxy_host.as_deref(), self.proxy_port) {
            (Some(host), Some(port)) if !host.is_empty() => Some((host, port)),
            _ => None,
        }
    }

    /// Look up a raw header override by name, ignoring case.
    pub fn raw_header(&self, name: &str) -> Option<&str> {
        self.raw_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
