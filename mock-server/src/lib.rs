//! HTTP fixture site used to drive the agent over real sockets.
//!
//! Every route serves one behaviour the client has to cope with: redirect
//! chains and loops, off-site redirects, frames, meta refresh, gzip, oversize
//! bodies, cookies, POST redirects and slow answers. Requests are counted per
//! path so tests can assert what the client actually fetched.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use flate2::{write::GzEncoder, Compression};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::debug;

/// Plain text served gzip-encoded by `/gzip`.
pub const GZIP_TEXT: &str = "The quick brown fox jumps over the lazy dog.\n\
                             Compressed on the wire, identical once decoded.\n";

/// Length of the body served by `/big`.
pub const BIG_BODY_LEN: usize = 10_000;

/// How long `/slow` waits before answering.
pub const SLOW_DELAY: Duration = Duration::from_secs(2);

/// Shared site state: a request counter per path.
#[derive(Debug, Default)]
pub struct SiteState {
    hits: Mutex<HashMap<String, usize>>,
}

impl SiteState {
    /// Number of requests seen for `path`.
    pub fn hits(&self, path: &str) -> usize {
        let hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.get(path).copied().unwrap_or(0)
    }

    /// Requests seen across every path.
    pub fn total_hits(&self) -> usize {
        let hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.values().sum()
    }

    fn record(&self, path: &str) {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        *hits.entry(path.to_string()).or_default() += 1;
    }
}

pub type Site = Arc<SiteState>;

pub fn app() -> Router {
    app_with_state(Site::default())
}

pub fn app_with_state(site: Site) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/echo", any(echo))
        .route("/redirect/{n}", get(redirect_n))
        .route("/loop", any(redirect_loop))
        .route("/redirect-to", any(redirect_to))
        .route("/frames/{count}", get(frameset))
        .route("/frame/{i}", get(frame))
        .route("/meta-refresh", get(meta_refresh))
        .route("/gzip", get(gzip))
        .route("/big", get(big))
        .route("/set-cookie", get(set_cookie))
        .route("/post-redirect", post(post_redirect))
        .route("/resubmit", post(resubmit))
        .route("/slow", get(slow))
        .route("/links", get(links))
        .route("/form-page", get(form_page))
        .layer(middleware::from_fn_with_state(site.clone(), count_hits))
        .with_state(site)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, Site::default()).await
}

pub async fn serve(listener: TcpListener, site: Site) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(site)).await
}

async fn count_hits(State(site): State<Site>, request: Request, next: Next) -> Response {
    debug!(method = %request.method(), uri = %request.uri(), "request");
    site.record(request.uri().path());
    next.run(request).await
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

async fn hello() -> &'static str {
    "hello world"
}

/// Request line, headers (lowercase names) and body, as plain text.
async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> String {
    let mut out = format!("{method} {uri}\n");
    for (name, value) in &headers {
        out.push_str(&format!("{name}: {}\n", String::from_utf8_lossy(value.as_bytes())));
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&body));
    out
}

async fn redirect_n(Path(n): Path<u32>) -> Response {
    match n {
        0 => "done".into_response(),
        n => found(&format!("/redirect/{}", n - 1)),
    }
}

async fn redirect_loop() -> Response {
    found("/loop")
}

#[derive(Deserialize)]
struct RedirectTarget {
    url: String,
}

async fn redirect_to(Query(target): Query<RedirectTarget>) -> Response {
    found(&target.url)
}

async fn frameset(Path(count): Path<usize>) -> Html<String> {
    let frames: String = (0..count)
        .map(|i| format!("<frame src=\"/frame/{i}\">"))
        .collect();
    Html(format!("<html><frameset rows=\"*\">{frames}</frameset></html>"))
}

async fn frame(Path(i): Path<usize>) -> Html<String> {
    Html(format!("<p>frame {i}</p>"))
}

async fn meta_refresh() -> Html<&'static str> {
    Html(r#"<html><head><meta http-equiv="refresh" content="0; URL=/hello"></head></html>"#)
}

async fn gzip() -> Result<Response, StatusCode> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(GZIP_TEXT.as_bytes())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let body = encoder.finish().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(([(header::CONTENT_ENCODING, "gzip")], body).into_response())
}

async fn big() -> String {
    "x".repeat(BIG_BODY_LEN)
}

async fn set_cookie() -> Response {
    (
        StatusCode::FOUND,
        [
            (header::SET_COOKIE, "session=abc%20123; Path=/"),
            (header::LOCATION, "/echo"),
        ],
    )
        .into_response()
}

async fn post_redirect() -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, "/echo?from=post")]).into_response()
}

async fn resubmit() -> Response {
    found("/echo")
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_DELAY).await;
    "finally"
}

async fn links() -> Html<&'static str> {
    Html(
        r#"<html><body>
<a href="/hello">hello</a>
<a href='frame/1'>relative</a>
<a href="http://other.example/x">elsewhere</a>
</body></html>"#,
    )
}

async fn form_page() -> Html<&'static str> {
    Html(
        r#"<html><body><h1>Sign in</h1>
<form action="/echo" method="post">
<input type="text" name="user">
<select name="lang"><option value="en">English</option></select>
<textarea name="note"></textarea>
</form></body></html>"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_start_at_zero_and_count_per_path() {
        let site = SiteState::default();
        assert_eq!(site.hits("/hello"), 0);
        site.record("/hello");
        site.record("/hello");
        site.record("/loop");
        assert_eq!(site.hits("/hello"), 2);
        assert_eq!(site.total_hits(), 3);
    }

    #[test]
    fn found_sets_location() {
        let response = found("/next");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/next");
    }
}
