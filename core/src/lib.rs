//! Minimal HTTP/1.0 client agent.
//!
//! # Overview
//! `Agent` fetches a resource, submits forms (URL-encoded or multipart),
//! follows HTTP and meta-refresh redirects and HTML frames within configured
//! depth limits, and can post-process bodies into links, form markup or text.
//! The connection and response handling are blocking and self-contained: one
//! socket per round trip, HTTP/1.0, bodies buffered up to a cap.
//!
//! # Design
//! - `Agent` owns the session (`RequestConfig`, `CookieJar`, last-call
//!   observables) and is used through `&mut self`.
//! - Request construction (`http`), response parsing (`response`) and the
//!   socket layer (`transport`, `tls`) are separate modules with plain-data
//!   seams, so each is tested on its own.
//! - HTML scanning (`extract`) is a lexical regex pass behind a small
//!   text-in/values-out interface.

pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod form;
pub mod http;
pub mod response;
pub mod target;
pub mod tls;
pub mod transport;
pub mod types;

pub use client::Agent;
pub use config::{RequestConfig, SubmitMethod, SubmitType};
pub use cookies::CookieJar;
pub use error::{AgentError, ConnectError, ConnectErrorKind, STATUS_READ_TIMEOUT};
pub use form::FormBody;
pub use http::{HttpMethod, HttpRequest};
pub use target::Target;
pub use transport::CancelToken;
pub use types::{FileUploads, FormData, FormValue, Response, Results};
