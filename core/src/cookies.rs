//! Session cookie jar.
//!
//! Cookies are stored by name only. Expiry, domain and path attributes are
//! ignored, so every cookie is sent to every host for the life of the agent.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use url::form_urlencoded;

#[allow(clippy::expect_used)]
static SET_COOKIE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^set-cookie:\s+([^=]+)=([^;]+)").expect("set-cookie regex is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.cookies.remove(name)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Pick up every `Set-Cookie` line from a response header sequence.
    /// Values are URL-decoded; later lines overwrite earlier ones.
    pub fn absorb(&mut self, headers: &[String]) {
        for line in headers {
            if let Some(caps) = SET_COOKIE.captures(line) {
                let name = caps[1].trim().to_string();
                self.cookies.insert(name, url_decode(&caps[2]));
            }
        }
    }

    /// Value for a `Cookie` request header, or `None` when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| {
                let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
                format!("{name}={encoded}")
            })
            .collect();
        Some(pairs.join("; "))
    }
}

fn url_decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(value) => value.into_owned(),
        Err(_) => spaced,
    }
}
