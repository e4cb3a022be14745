//! HTTP/1.0 request construction.
//!
//! # Design
//! `HttpRequest` is plain data: method, request target, ordered header list
//! and optional body. `HttpRequest::build` derives it from the session
//! configuration in a fixed header order so the wire bytes are predictable,
//! and `to_bytes` serializes it. Nothing here touches the network.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::info;

use crate::config::{RequestConfig, SubmitMethod};
use crate::cookies::CookieJar;
use crate::form::FormBody;
use crate::target::Target;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

impl From<SubmitMethod> for HttpMethod {
    fn from(method: SubmitMethod) -> Self {
        match method {
            SubmitMethod::Post => HttpMethod::Post,
            SubmitMethod::Put => HttpMethod::Put,
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Origin-form (`/path?query`) or, through a proxy, absolute-form URI.
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Assemble the request for `target` from the session state.
    ///
    /// Credentials embedded in the URI win over configured ones.
    pub fn build(
        method: HttpMethod,
        target: &Target,
        config: &RequestConfig,
        cookies: &CookieJar,
        body: Option<&FormBody>,
    ) -> Self {
        let request_target = if config.proxy().is_some() {
            target.absolute()
        } else {
            target.request_uri()
        };

        let mut headers: Vec<(String, String)> = Vec::new();
        let mut push = |name: &str, value: String| headers.push((name.to_string(), value));

        if config.raw_header("Host").is_none() {
            push("Host", target.authority());
        }
        if let Some(agent) = non_empty(&config.user_agent) {
            push("User-Agent", agent.to_string());
        }
        if let Some(accept) = non_empty(&config.accept) {
            push("Accept", accept.to_string());
        }
        if config.use_gzip {
            if cfg!(feature = "gzip") {
                push("Accept-Encoding", "gzip".to_string());
            } else {
                info!("gzip requested but not compiled in; requesting identity encoding");
            }
        }
        if let Some(referer) = non_empty(&config.referer) {
            push("Referer", referer.to_string());
        }
        if let Some(cookie) = cookies.header_value() {
            push("Cookie", cookie);
        }
        for (name, value) in &config.raw_headers {
            push(name.as_str(), value.clone());
        }
        if let Some(body) = body {
            push("Content-Type", body.content_type());
            if !body.bytes.is_empty() {
                push("Content-Length", body.bytes.len().to_string());
            }
        }

        let (user, pass) = match &target.user {
            Some(user) => (Some(user.as_str()), target.pass.as_deref()),
            None => (non_empty(&config.user), non_empty(&config.pass)),
        };
        if user.is_some() || pass.is_some() {
            push("Authorization", basic(user.unwrap_or_default(), pass.unwrap_or_default()));
        }
        if let Some(proxy_user) = non_empty(&config.proxy_user) {
            let proxy_pass = config.proxy_pass.as_deref().unwrap_or_default();
            push("Proxy-Authorization", basic(proxy_user, proxy_pass));
        }

        Self {
            method,
            target: request_target,
            version: config.http_version.clone(),
            headers,
            body: body.filter(|b| !b.bytes.is_empty()).map(|b| b.bytes.clone()),
        }
    }

    /// First header with `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Wire form: request line, headers, blank line, body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("{} {} {}\r\n", self.method.as_str(), self.target, self.version);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        if let Some(body) = &self.body {
            bytes.extend_from_slice(body);
        }
        bytes
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}
