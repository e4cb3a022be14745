//! The session agent: fetch, submit and head with redirect/frame following.
//!
//! # Design
//! `Agent` owns the session (configuration, cookie jar, observables) and is
//! driven through `&mut self`, one call at a time. Each public call resets a
//! `Chain` holding the per-call counters and the stack of pending frame URLs,
//! then runs an explicit loop: one round trip per iteration, each on its own
//! connection, closed before the next decision is made.

use std::io::BufReader;

use tracing::{debug, info, instrument, warn};

use crate::config::{RequestConfig, SubmitType};
use crate::cookies::CookieJar;
use crate::error::AgentError;
use crate::extract;
use crate::form::{self, FormBody};
use crate::http::{HttpMethod, HttpRequest};
use crate::response::{self, ResponseState};
use crate::target::Target;
use crate::transport::{CancelToken, Connection};
use crate::types::{FileUploads, FormData, Response, Results};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Fetch,
    Submit,
    Head,
}

/// Per-call redirect and frame bookkeeping.
#[derive(Debug, Default)]
struct Chain {
    redirect_depth: u32,
    frame_depth: u32,
    /// Top of the stack is the next frame to fetch.
    pending_frames: Vec<String>,
    last_redirect: Option<String>,
    results: Results<Vec<u8>>,
}

impl Chain {
    fn fold(&mut self, body: Vec<u8>, frames: Vec<String>) {
        if !frames.is_empty() {
            self.results.push(body);
            self.pending_frames.extend(frames.into_iter().rev());
        } else if self.results.is_frames() {
            if !body.is_empty() {
                self.results.push(body);
            }
        } else {
            self.results = Results::Single(body);
        }
    }
}

/// A stateful HTTP/1.0 client session.
#[derive(Debug, Default)]
pub struct Agent {
    config: RequestConfig,
    cookies: CookieJar,
    cancel: CancelToken,
    status: i32,
    status_line: String,
    headers: Vec<String>,
    last_redirect: Option<String>,
    timed_out: bool,
    last_error: Option<String>,
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RequestConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// GET `uri`, following redirects and frames as configured.
    pub fn fetch(&mut self, uri: &str) -> Result<Response, AgentError> {
        self.run(uri, Operation::Fetch, None)
    }

    /// HEAD `uri`. Redirects are followed with further HEAD requests.
    pub fn head(&mut self, uri: &str) -> Result<Response, AgentError> {
        self.run(uri, Operation::Head, None)
    }

    /// Submit `form` and `files` to `uri` with the configured method and
    /// encoding. Redirects re-submit the same body unless the new address
    /// carries a query string, in which case it is fetched instead.
    pub fn submit(
        &mut self,
        uri: &str,
        form: &FormData,
        files: &FileUploads,
    ) -> Result<Response, AgentError> {
        let body = form::encode(self.config.submit_type, form, files);
        self.run(uri, Operation::Submit, Some(&body))
    }

    /// Fetch `uri` and return the links of every document.
    pub fn fetch_links(&mut self, uri: &str) -> Result<Results<Vec<String>>, AgentError> {
        let response = self.fetch(uri)?;
        Ok(self.links(&response, uri))
    }

    /// Fetch `uri` and return the form markup of every document.
    pub fn fetch_form(&mut self, uri: &str) -> Result<Results<String>, AgentError> {
        let response = self.fetch(uri)?;
        Ok(response.text().map(|document| extract::strip_form(&document)))
    }

    /// Fetch `uri` and return the text of every document.
    pub fn fetch_text(&mut self, uri: &str) -> Result<Results<String>, AgentError> {
        let response = self.fetch(uri)?;
        Ok(response.text().map(|document| extract::strip_text(&document)))
    }

    pub fn submit_links(
        &mut self,
        uri: &str,
        form: &FormData,
        files: &FileUploads,
    ) -> Result<Results<Vec<String>>, AgentError> {
        let response = self.submit(uri, form, files)?;
        Ok(self.links(&response, uri))
    }

    pub fn submit_text(
        &mut self,
        uri: &str,
        form: &FormData,
        files: &FileUploads,
    ) -> Result<Results<String>, AgentError> {
        let response = self.submit(uri, form, files)?;
        Ok(response.text().map(|document| extract::strip_text(&document)))
    }

    /// Encode later submissions as `multipart/form-data`.
    pub fn set_submit_multipart(&mut self) {
        self.config.submit_type = SubmitType::Multipart;
    }

    /// Encode later submissions as `application/x-www-form-urlencoded`.
    pub fn set_submit_normal(&mut self) {
        self.config.submit_type = SubmitType::UrlEncoded;
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RequestConfig {
        &mut self.config
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    /// A handle that aborts the current and every later call until reset.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Status code of the last response, or the error status of a failed call.
    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Header lines of the last response read.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn last_redirect(&self) -> Option<&str> {
        self.last_redirect.as_deref()
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn links(&self, response: &Response, uri: &str) -> Results<Vec<String>> {
        let base = response.last_redirect.as_deref().unwrap_or(uri);
        let expand = self.config.expand_links;
        response.text().map(|document| {
            let links = extract::strip_links(&document);
            if expand {
                extract::expand_links(&links, base)
            } else {
                links
            }
        })
    }

    fn run(
        &mut self,
        uri: &str,
        operation: Operation,
        body: Option<&FormBody>,
    ) -> Result<Response, AgentError> {
        self.status = 0;
        self.status_line.clear();
        self.headers.clear();
        self.last_redirect = None;
        self.timed_out = false;
        self.last_error = None;

        let result = self.follow(uri, operation, body);
        if let Err(err) = &result {
            warn!(uri, error = %err, "request failed");
            self.status = err.status();
            self.timed_out = matches!(err, AgentError::ReadTimeout);
            self.last_error = Some(err.to_string());
        }
        result
    }

    fn follow(
        &mut self,
        uri: &str,
        operation: Operation,
        body: Option<&FormBody>,
    ) -> Result<Response, AgentError> {
        let mut chain = Chain::default();
        let mut next = Some((uri.to_string(), operation));

        loop {
            let (address, operation) = match next.take() {
                Some(work) => work,
                None => match self.next_frame(&mut chain) {
                    Some(frame) => (frame, Operation::Fetch),
                    None => break,
                },
            };

            let target = Target::parse(&address)?;
            let collect_frames = chain.frame_depth < self.config.max_frames;
            let state = self.round_trip(operation, &target, body, collect_frames)?;
            self.status = state.status;
            self.status_line = state.status_line.clone();
            self.headers = state.headers.clone();

            next = self.redirect(&mut chain, &target, operation, &state)?;
            chain.fold(state.body, state.frames);
        }

        self.last_redirect = chain.last_redirect.clone();
        Ok(Response {
            results: chain.results,
            status: self.status,
            status_line: self.status_line.clone(),
            headers: self.headers.clone(),
            last_redirect: chain.last_redirect,
        })
    }

    /// Decide whether to follow the redirect announced by `state`.
    fn redirect(
        &mut self,
        chain: &mut Chain,
        current: &Target,
        operation: Operation,
        state: &ResponseState,
    ) -> Result<Option<(String, Operation)>, AgentError> {
        let Some(location) = state.redirect.as_deref() else {
            return Ok(None);
        };
        if self.config.pass_cookies {
            self.cookies.absorb(&state.headers);
        }
        if chain.redirect_depth >= self.config.max_redirects {
            debug!(location, depth = chain.redirect_depth, "redirect limit reached");
            return Ok(None);
        }
        if !self.config.offsite_ok && !current.same_host(location) {
            debug!(location, "dropping off-site redirect");
            return Ok(None);
        }
        let next = Target::parse(location)?;

        chain.redirect_depth += 1;
        chain.last_redirect = Some(location.to_string());
        let operation = match operation {
            Operation::Submit if next.query.is_some() => Operation::Fetch,
            other => other,
        };
        info!(location, depth = chain.redirect_depth, ?operation, "following redirect");
        Ok(Some((location.to_string(), operation)))
    }

    fn next_frame(&self, chain: &mut Chain) -> Option<String> {
        if chain.frame_depth < self.config.max_frames {
            if let Some(frame) = chain.pending_frames.pop() {
                chain.frame_depth += 1;
                return Some(frame);
            }
        } else if !chain.pending_frames.is_empty() {
            debug!(discarded = chain.pending_frames.len(), "frame limit reached");
            chain.pending_frames.clear();
        }
        None
    }

    #[instrument(skip_all, fields(method = ?operation, uri = %target.absolute()))]
    fn round_trip(
        &mut self,
        operation: Operation,
        target: &Target,
        body: Option<&FormBody>,
        collect_frames: bool,
    ) -> Result<ResponseState, AgentError> {
        self.cancel.check()?;
        self.config.scheme = target.scheme.clone();
        self.config.host = target.host.clone();
        self.config.port = target.port;

        let (method, body) = match operation {
            Operation::Fetch => (HttpMethod::Get, None),
            Operation::Head => (HttpMethod::Head, None),
            Operation::Submit => (HttpMethod::from(self.config.submit_method), body),
        };
        let request = HttpRequest::build(method, target, &self.config, &self.cookies, body);

        let mut conn = Connection::open(target, &self.config, &self.cancel)?;
        conn.send(&request.to_bytes())?;
        let state = response::read_response(
            &mut BufReader::new(&mut conn),
            target,
            self.config.max_length,
            collect_frames,
            &self.cancel,
        );
        conn.disconnect();
        state
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    /// Answer exactly one connection with `response` and hand back the request head.
    fn serve_once(response: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn invalid_protocol_is_recorded() {
        let mut agent = Agent::new();
        let err = agent.fetch("ftp://example.com/file").unwrap_err();
        assert!(matches!(err, AgentError::InvalidProtocol { .. }));
        assert_eq!(agent.last_error(), Some("invalid protocol \"ftp\""));
        assert_eq!(agent.status(), 0);
    }

    #[test]
    fn single_fetch_records_observables() {
        let (base, server) = serve_once("HTTP/1.0 200 OK\r\nX-Test: yes\r\n\r\nhello");
        let mut agent = Agent::new();
        let response = agent.fetch(&format!("{base}/page?x=1")).unwrap();

        assert_eq!(response.results, Results::Single(b"hello".to_vec()));
        assert_eq!(agent.status(), 200);
        assert_eq!(agent.status_line(), "HTTP/1.0 200 OK");
        assert_eq!(agent.headers(), ["HTTP/1.0 200 OK", "X-Test: yes"]);
        assert!(agent.last_redirect().is_none());
        assert_eq!(agent.config().host, "127.0.0.1");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /page?x=1 HTTP/1.0\r\n"));
    }

    #[test]
    fn head_sends_head() {
        let (base, server) = serve_once("HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\n");
        let mut agent = Agent::new();
        let response = agent.head(&base).unwrap();
        assert_eq!(response.results, Results::Single(Vec::new()));
        assert!(server.join().unwrap().starts_with("HEAD / HTTP/1.0\r\n"));
    }

    #[test]
    fn fetch_text_strips_markup() {
        let (base, _server) = serve_once("HTTP/1.0 200 OK\r\n\r\n<p>Fish &amp; Chips</p>");
        let mut agent = Agent::new();
        assert_eq!(
            agent.fetch_text(&base).unwrap(),
            Results::Single("Fish & Chips".to_string())
        );
    }

    #[test]
    fn offsite_redirect_to_another_scheme_is_dropped() {
        let (base, _server) = serve_once(
            "HTTP/1.0 302 Found\r\nLocation: ftp://files.example.org/x\r\n\r\nlanding",
        );
        let mut agent = Agent::with_config(RequestConfig {
            offsite_ok: false,
            ..Default::default()
        });
        let response = agent.fetch(&base).unwrap();
        assert_eq!(response.results, Results::Single(b"landing".to_vec()));
        assert_eq!(response.status, 302);
        assert!(agent.last_redirect().is_none());
        assert!(agent.last_error().is_none());
    }

    #[test]
    fn followed_redirect_to_another_scheme_is_an_error() {
        let (base, _server) = serve_once(
            "HTTP/1.0 302 Found\r\nLocation: ftp://files.example.org/x\r\n\r\nlanding",
        );
        let mut agent = Agent::new();
        let err = agent.fetch(&base).unwrap_err();
        assert!(matches!(err, AgentError::InvalidProtocol { ref scheme } if scheme == "ftp"));
    }

    #[test]
    fn dropped_redirect_still_sets_cookies() {
        let (base, _server) = serve_once(
            "HTTP/1.0 302 Found\r\nSet-Cookie: session=kept; Path=/\r\n\
             Location: http://elsewhere.example/\r\n\r\nstay",
        );
        let mut agent = Agent::with_config(RequestConfig {
            offsite_ok: false,
            ..Default::default()
        });
        agent.fetch(&base).unwrap();
        assert_eq!(agent.cookies().get("session"), Some("kept"));

        let (base, _server) = serve_once(
            "HTTP/1.0 302 Found\r\nSet-Cookie: depth=zero\r\nLocation: /again\r\n\r\n",
        );
        agent.config_mut().max_redirects = 0;
        agent.fetch(&base).unwrap();
        assert_eq!(agent.cookies().get("depth"), Some("zero"));
    }

    #[test]
    fn cancel_interrupts_a_stalled_fetch() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(3));
            drop(stream);
        });

        let mut agent = Agent::new();
        assert!(agent.config().read_timeout.is_none());
        let token = agent.cancel_token();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            token.cancel();
        });

        let started = Instant::now();
        let err = agent.fetch(&base).unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!agent.timed_out());
        canceller.join().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn submit_type_toggles() {
        let mut agent = Agent::new();
        agent.set_submit_multipart();
        assert_eq!(agent.config().submit_type, SubmitType::Multipart);
        agent.set_submit_normal();
        assert_eq!(agent.config().submit_type, SubmitType::UrlEncoded);
    }

    #[test]
    fn cancelled_agent_does_not_connect() {
        let mut agent = Agent::new();
        agent.cancel_token().cancel();
        let err = agent.fetch("http://127.0.0.1:9/").unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        agent.cancel_token().reset();
        assert!(!agent.cancel_token().is_cancelled());
    }

    #[test]
    fn chain_fold_switches_to_frames_and_stays() {
        let mut chain = Chain::default();
        chain.fold(b"top".to_vec(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(chain.results, Results::Frames(vec![b"top".to_vec()]));
        assert_eq!(chain.pending_frames.pop().as_deref(), Some("a"));

        chain.fold(Vec::new(), Vec::new());
        chain.fold(b"frame".to_vec(), Vec::new());
        assert_eq!(
            chain.results,
            Results::Frames(vec![b"top".to_vec(), b"frame".to_vec()])
        );
    }

    #[test]
    fn chain_fold_replaces_single_body() {
        let mut chain = Chain::default();
        chain.fold(b"redirecting".to_vec(), Vec::new());
        chain.fold(b"final".to_vec(), Vec::new());
        assert_eq!(chain.results, Results::Single(b"final".to_vec()));
    }
}
