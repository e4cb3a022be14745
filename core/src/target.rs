//! Parsed request targets and redirect-location resolution.

use url::{Host, Url};

use crate::error::AgentError;

/// A parsed `http`/`https` URI, derived once per request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: String,
    /// Host as it appears in a URI (IPv6 literals keep their brackets).
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    url: Url,
}

fn supported(scheme: &str) -> bool {
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

impl Target {
    /// Parse `uri`, rejecting every scheme except `http` and `https`.
    pub fn parse(uri: &str) -> Result<Self, AgentError> {
        let url = match Url::parse(uri.trim()) {
            Ok(url) => url,
            Err(err) => {
                let scheme = uri.split_once("://").map(|(s, _)| s).unwrap_or_default();
                if !supported(scheme) {
                    return Err(AgentError::InvalidProtocol {
                        scheme: scheme.to_string(),
                    });
                }
                return Err(AgentError::InvalidUrl {
                    url: uri.to_string(),
                    reason: err.to_string(),
                });
            }
        };
        if !supported(url.scheme()) {
            return Err(AgentError::InvalidProtocol {
                scheme: url.scheme().to_string(),
            });
        }
        let host = url.host_str().ok_or_else(|| AgentError::InvalidUrl {
            url: uri.to_string(),
            reason: "missing host".to_string(),
        })?;
        let user = match url.username() {
            "" => None,
            name => Some(decode(name)),
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port_or_known_default().unwrap_or(80),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
            user,
            pass: url.password().map(decode),
            url,
        })
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    pub fn has_default_port(&self) -> bool {
        self.url.port().is_none()
    }

    /// Host name suitable for DNS resolution and TLS SNI.
    pub fn connect_host(&self) -> String {
        match self.url.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => self.host.clone(),
        }
    }

    /// `host[:port]`, omitting the port when it is the scheme default.
    pub fn authority(&self) -> String {
        if self.has_default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Origin-form request target: path plus query.
    pub fn request_uri(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        match &self.query {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        }
    }

    /// Absolute-form request target, as sent to a proxy. Userinfo and
    /// fragment are left out.
    pub fn absolute(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), self.request_uri())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the absolute `address` names this host, compared without
    /// case. Any scheme is accepted, so the off-site policy can be applied
    /// before the address is validated as a fetch target.
    pub fn same_host(&self, address: &str) -> bool {
        Url::parse(address)
            .ok()
            .and_then(|url| url.host_str().map(|host| host.eq_ignore_ascii_case(&self.host)))
            .unwrap_or(false)
    }

    /// Turn a `Location:` value into an absolute address.
    ///
    /// Missing scheme, host and path are taken from this target. A
    /// non-default port carries over only when the location names the same
    /// scheme and host without a port of its own.
    pub fn resolve_location(&self, location: &str) -> Option<String> {
        let location = location.trim();
        if location.is_empty() {
            return None;
        }
        match Url::parse(location) {
            Ok(mut absolute) => {
                let same_origin = absolute.scheme() == self.scheme
                    && absolute
                        .host_str()
                        .is_some_and(|host| host.eq_ignore_ascii_case(&self.host));
                if same_origin && absolute.port().is_none() && !self.has_default_port() {
                    // Only fails for cannot-be-a-base URLs, which never match an http origin.
                    let _ = absolute.set_port(Some(self.port));
                }
                Some(absolute.into())
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.url.join(location).ok().map(Into::into)
            }
            Err(_) => None,
        }
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
