//! Form submission bodies: URL-encoded and multipart.

use std::fs;

use tracing::warn;
use url::form_urlencoded;
use uuid::Uuid;

use crate::config::SubmitType;
use crate::types::{FileUploads, FormData, FormValue};

/// An encoded submission ready to be attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormBody {
    pub submit_type: SubmitType,
    pub boundary: Option<String>,
    pub bytes: Vec<u8>,
}

impl FormBody {
    /// Value of the `Content-Type` header for this body.
    pub fn content_type(&self) -> String {
        match &self.boundary {
            Some(boundary) => format!("{}; boundary={boundary}", self.submit_type.mime()),
            None => self.submit_type.mime().to_string(),
        }
    }
}

/// Encode `form` (and, for multipart, `files`) according to `submit_type`.
///
/// With no fields and no files the body is empty and carries no boundary.
/// URL-encoded submissions ignore `files`.
pub fn encode(submit_type: SubmitType, form: &FormData, files: &FileUploads) -> FormBody {
    if form.is_empty() && files.is_empty() {
        return FormBody {
            submit_type,
            boundary: None,
            bytes: Vec::new(),
        };
    }
    match submit_type {
        SubmitType::UrlEncoded => FormBody {
            submit_type,
            boundary: None,
            bytes: encode_urlencoded(form).into_bytes(),
        },
        SubmitType::Multipart => {
            let boundary = new_boundary();
            let bytes = encode_multipart(form, files, &boundary);
            FormBody {
                submit_type,
                boundary: Some(boundary),
                bytes,
            }
        }
    }
}

/// `key=value` pairs joined by `&`; list values repeat `key[]`.
pub fn encode_urlencoded(form: &FormData) -> String {
    let mut pairs = Vec::new();
    for (key, value) in form.iter() {
        match value {
            FormValue::Scalar(value) => pairs.push(format!("{}={}", escape(key), escape(value))),
            FormValue::List(values) => {
                for value in values {
                    pairs.push(format!("{}[]={}", escape(key), escape(value)));
                }
            }
        }
    }
    pairs.join("&")
}

fn escape(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// A fresh boundary for one submission.
pub fn new_boundary() -> String {
    format!("courier{}", Uuid::new_v4().simple())
}

/// Multipart body: one part per field value, then one per readable file,
/// then the closing delimiter. Files that cannot be read are skipped.
pub fn encode_multipart(form: &FormData, files: &FileUploads, boundary: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, value) in form.iter() {
        match value {
            FormValue::Scalar(value) => push_part(&mut body, boundary, key, None, value.as_bytes()),
            FormValue::List(values) => {
                let key = format!("{key}[]");
                for value in values {
                    push_part(&mut body, boundary, &key, None, value.as_bytes());
                }
            }
        }
    }

    for (field, paths) in files.iter() {
        for path in paths {
            let content = match fs::read(path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable upload");
                    continue;
                }
            };
            let base_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            push_part(&mut body, boundary, field, Some(&base_name), &content);
        }
    }

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

fn push_part(
    body: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    filename: Option<&str>,
    content: &[u8],
) {
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    let disposition = match filename {
        Some(filename) => format!(
            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\r\n"
        ),
        None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
    };
    body.extend_from_slice(disposition.as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");
}
