//! Response parsing: status line and headers, then the capped body.
//!
//! # Design
//! `read_response` consumes one response from any `BufRead`, so the parser is
//! exercised in tests with in-memory cursors and in production with the
//! buffered socket. Everything the controller needs to decide its next step
//! (redirect target, frame URLs) is returned in `ResponseState`; nothing is
//! followed here.

use std::io::{self, BufRead, ErrorKind, Read};

use tracing::debug;

use crate::error::AgentError;
use crate::extract;
use crate::target::Target;
use crate::transport::CancelToken;

/// Longest header line kept. The rest of a longer line is read and dropped.
pub const MAX_LINE_LENGTH: u64 = 4096;

const READ_CHUNK: usize = 8192;

/// Transient state of one request attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseState {
    /// Every header line, status line included, without its terminator.
    pub headers: Vec<String>,
    pub status: i32,
    pub status_line: String,
    pub gzip: bool,
    pub chunked: bool,
    /// Absolute redirect target from `Location:`/`URI:` or a meta refresh.
    pub redirect: Option<String>,
    /// Absolute frame URLs in document order.
    pub frames: Vec<String>,
    /// Decoded body.
    pub body: Vec<u8>,
}

/// Read one response.
///
/// At most `max_length` raw body bytes are read, and a gzip body never
/// inflates past `max_length` either. Frame URLs are only collected when
/// `collect_frames` is set.
pub fn read_response<R: BufRead>(
    reader: &mut R,
    target: &Target,
    max_length: usize,
    collect_frames: bool,
    cancel: &CancelToken,
) -> Result<ResponseState, AgentError> {
    let mut state = ResponseState::default();
    read_headers(reader, target, cancel, &mut state)?;

    let raw = read_body(reader, max_length, cancel)?;
    let body = if state.chunked { dechunk(&raw)? } else { raw };
    state.body = if state.gzip && !body.is_empty() {
        gunzip(&body, max_length)?
    } else {
        body
    };

    scan_document(&mut state, target, collect_frames);
    Ok(state)
}

fn read_headers<R: BufRead>(
    reader: &mut R,
    target: &Target,
    cancel: &CancelToken,
    state: &mut ResponseState,
) -> Result<(), AgentError> {
    let mut raw = Vec::new();
    loop {
        cancel.check()?;
        if !read_line(reader, &mut raw).map_err(|err| read_error(err, cancel))? {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        classify(line, target, state);
        state.headers.push(line.to_string());
    }
    Ok(())
}

/// Read one whole line into `line`, keeping at most `MAX_LINE_LENGTH` bytes of
/// it. Returns `false` at end of input.
fn read_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<bool> {
    let limit = MAX_LINE_LENGTH as usize;
    let mut piece = Vec::new();
    let mut seen = false;
    line.clear();
    loop {
        piece.clear();
        let read = reader
            .by_ref()
            .take(MAX_LINE_LENGTH)
            .read_until(b'\n', &mut piece)?;
        if read == 0 {
            return Ok(seen);
        }
        seen = true;
        let room = limit.saturating_sub(line.len());
        line.extend_from_slice(&piece[..piece.len().min(room)]);
        if piece.ends_with(b"\n") {
            return Ok(true);
        }
    }
}

fn read_error(err: io::Error, cancel: &CancelToken) -> AgentError {
    if cancel.is_cancelled() {
        AgentError::Cancelled
    } else {
        AgentError::from_read(err)
    }
}

fn classify(line: &str, target: &Target, state: &mut ResponseState) {
    if starts_with_ignore_case(line, "HTTP/") {
        state.status = line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        state.status_line = line.to_string();
        debug!(status_line = line, "status received");
        return;
    }
    let Some((name, value)) = line.split_once(':') else {
        return;
    };
    let value = value.trim();
    if name.eq_ignore_ascii_case("location") || name.eq_ignore_ascii_case("uri") {
        state.redirect = target.resolve_location(value);
    } else if name.eq_ignore_ascii_case("content-encoding") {
        state.gzip = value.eq_ignore_ascii_case("gzip");
    } else if name.eq_ignore_ascii_case("transfer-encoding") {
        state.chunked = value.eq_ignore_ascii_case("chunked");
    }
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn read_body<R: Read>(
    reader: &mut R,
    max_length: usize,
    cancel: &CancelToken,
) -> Result<Vec<u8>, AgentError> {
    let mut body = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    while body.len() < max_length {
        cancel.check()?;
        let want = (max_length - body.len()).min(READ_CHUNK);
        match reader.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(read_error(err, cancel)),
        }
    }
    Ok(body)
}

/// Strip chunked transfer framing. A body cut short by the length cap yields
/// whatever complete data precedes the cut.
pub fn dechunk(raw: &[u8]) -> Result<Vec<u8>, AgentError> {
    let mut out = Vec::new();
    let mut rest = raw;
    while let Some(eol) = find_crlf(rest) {
        let size_line = String::from_utf8_lossy(&rest[..eol]);
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| AgentError::Decode(format!("bad chunk size {size_hex:?}")))?;
        rest = &rest[eol + 2..];
        if size == 0 {
            break;
        }
        let take = size.min(rest.len());
        out.extend_from_slice(&rest[..take]);
        rest = &rest[take..];
        if take < size {
            break;
        }
        rest = rest.strip_prefix(b"\r\n").unwrap_or(rest);
    }
    Ok(out)
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|pair| pair == b"\r\n")
}

#[cfg(feature = "gzip")]
fn gunzip(body: &[u8], max_length: usize) -> Result<Vec<u8>, AgentError> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(body)
        .take(max_length as u64)
        .read_to_end(&mut out)
        .map_err(|e| AgentError::Decode(format!("gzip: {e}")))?;
    Ok(out)
}

#[cfg(not(feature = "gzip"))]
fn gunzip(_body: &[u8], _max_length: usize) -> Result<Vec<u8>, AgentError> {
    Err(AgentError::Decode(
        "gzip-encoded response but gzip support is not compiled in".to_string(),
    ))
}

fn scan_document(state: &mut ResponseState, target: &Target, collect_frames: bool) {
    if state.body.is_empty() {
        return;
    }
    let document = String::from_utf8_lossy(&state.body);
    if let Some(refresh) = extract::meta_refresh(&document) {
        let url = extract::expand_link(refresh, target.url());
        debug!(%url, "meta refresh");
        state.redirect = Some(url);
    }
    if collect_frames {
        state.frames = extract::frame_sources(&document)
            .into_iter()
            .map(|src| extract::expand_link(src, target.url()))
            .collect();
        if !state.frames.is_empty() {
            debug!(count = state.frames.len(), "frames discovered");
        }
    }
}
