//! Plain and TLS stream sockets, one per request/response round trip.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::RequestConfig;
use crate::error::{AgentError, ConnectError};
use crate::target::Target;
use crate::tls::{self, TlsStream};

/// Shared flag that aborts an in-flight chain.
///
/// A read blocked on a silent peer notices the flag within `POLL_INTERVAL`,
/// whether or not a read timeout is configured. Connecting and the TLS
/// handshake are not interrupted. Once cancelled, every later call fails with
/// `AgentError::Cancelled` until `reset` is called.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), AgentError> {
        if self.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Socket read timeout while waiting for data, so a cancel is seen promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

/// An open connection to the origin (or proxy).
pub struct Connection {
    stream: Option<Stream>,
    cancel: CancelToken,
    /// Longest a single read may wait. `None` waits until cancelled.
    read_timeout: Option<Duration>,
}

impl Connection {
    /// Connect to `target`, or to the configured proxy.
    ///
    /// HTTPS through a proxy is refused before any socket is opened.
    pub fn open(
        target: &Target,
        config: &RequestConfig,
        cancel: &CancelToken,
    ) -> Result<Self, AgentError> {
        let (host, port) = match config.proxy() {
            Some(_) if target.is_https() => {
                return Err(AgentError::Config(
                    "HTTPS connections over a proxy are not supported".to_string(),
                ))
            }
            Some((host, port)) => (host.to_string(), port),
            None => (target.connect_host(), target.port),
        };

        debug!(%host, port, "connecting");
        let addrs: Vec<_> = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| ConnectError::dns(format!("{host}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectError::dns(format!("{host}: no addresses")).into());
        }

        let mut last_err = None;
        let mut tcp = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, config.connect_timeout) {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }
        let tcp = match (tcp, last_err) {
            (Some(tcp), _) => tcp,
            (None, Some(err)) => return Err(ConnectError::from_io(&err).into()),
            (None, None) => return Err(ConnectError::dns(format!("{host}: no addresses")).into()),
        };

        let read_timeout = config.read_timeout.filter(|t| !t.is_zero());
        tcp.set_read_timeout(read_timeout)
            .map_err(|e| ConnectError::from_io(&e))?;
        // Latency only; failure here is harmless.
        let _ = tcp.set_nodelay(true);

        let stream = if target.is_https() {
            Stream::Tls(Box::new(tls::handshake(
                tcp,
                &target.connect_host(),
                config,
            )?))
        } else {
            Stream::Plain(tcp)
        };

        let poll = read_timeout.map_or(POLL_INTERVAL, |limit| limit.min(POLL_INTERVAL));
        let socket = match &stream {
            Stream::Plain(tcp) => tcp,
            Stream::Tls(tls) => &tls.sock,
        };
        socket
            .set_read_timeout(Some(poll))
            .map_err(|e| ConnectError::from_io(&e))?;

        Ok(Self {
            stream: Some(stream),
            cancel: cancel.clone(),
            read_timeout,
        })
    }

    /// Write the whole request.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), AgentError> {
        let result = match self.stream.as_mut() {
            Some(Stream::Plain(tcp)) => tcp.write_all(bytes).and_then(|_| tcp.flush()),
            Some(Stream::Tls(tls)) => tls.write_all(bytes).and_then(|_| tls.flush()),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        };
        result.map_err(|e| ConnectError::from_io(&e).into())
    }

    /// Close the socket. Safe to call more than once.
    pub fn disconnect(&mut self) {
        match self.stream.take() {
            Some(Stream::Plain(tcp)) => {
                let _ = tcp.shutdown(Shutdown::Both);
            }
            Some(Stream::Tls(mut tls)) => {
                tls.conn.send_close_notify();
                let _ = tls.flush();
                let _ = tls.sock.shutdown(Shutdown::Both);
            }
            None => {}
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Reads wake every `POLL_INTERVAL`. A cancelled token ends the read with an
/// error; otherwise the read keeps waiting until the configured read timeout
/// has elapsed, and then reports the socket's timeout error.
impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let started = Instant::now();
        loop {
            let result = match self.stream.as_mut() {
                Some(Stream::Plain(tcp)) => tcp.read(buf),
                Some(Stream::Tls(tls)) => tls.read(buf),
                None => Ok(0),
            };
            match result {
                Err(err) if is_timeout(&err) => {
                    if self.cancel.is_cancelled() {
                        return Err(io::Error::other("request cancelled"));
                    }
                    if self.read_timeout.is_some_and(|limit| started.elapsed() >= limit) {
                        return Err(err);
                    }
                }
                other => return other,
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
