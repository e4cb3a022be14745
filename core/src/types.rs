//! Value types exchanged with callers.
//!
//! # Design
//! A fetch chain yields either one body or, once frame content shows up, an
//! ordered list of bodies. `Results` models that as an enum instead of a
//! string-or-array, and the post processors map over it so link/text
//! extraction keeps the same shape.

use std::path::PathBuf;

/// One body, or one body per document when frames were followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Results<T> {
    Single(T),
    Frames(Vec<T>),
}

impl<T: Default> Default for Results<T> {
    fn default() -> Self {
        Results::Single(T::default())
    }
}

impl<T> Results<T> {
    /// Append a document. A `Single` value is replaced by a one-element
    /// `Frames` list, and from then on the list only grows.
    pub fn push(&mut self, item: T) {
        match self {
            Results::Single(_) => *self = Results::Frames(vec![item]),
            Results::Frames(items) => items.push(item),
        }
    }

    pub fn is_frames(&self) -> bool {
        matches!(self, Results::Frames(_))
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Results::Single(item) => std::slice::from_ref(item),
            Results::Frames(items) => items,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn single(&self) -> Option<&T> {
        match self {
            Results::Single(item) => Some(item),
            Results::Frames(_) => None,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Results<U> {
        match self {
            Results::Single(item) => Results::Single(f(item)),
            Results::Frames(items) => Results::Frames(items.into_iter().map(f).collect()),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Results::Single(item) => vec![item],
            Results::Frames(items) => items,
        }
    }
}

/// Outcome of a completed fetch chain.
///
/// `status`, `status_line` and `headers` describe the last response read;
/// `results` accumulates across redirects and frames.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub results: Results<Vec<u8>>,
    pub status: i32,
    pub status_line: String,
    pub headers: Vec<String>,
    pub last_redirect: Option<String>,
}

impl Response {
    /// Bodies decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Results<String> {
        self.results
            .clone()
            .map(|body| String::from_utf8_lossy(&body).into_owned())
    }
}

/// A form variable: one value, or several sent as `key[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Scalar(String),
    List(Vec<String>),
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Scalar(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Scalar(value)
    }
}

impl From<Vec<String>> for FormValue {
    fn from(values: Vec<String>) -> Self {
        FormValue::List(values)
    }
}

impl From<Vec<&str>> for FormValue {
    fn from(values: Vec<&str>) -> Self {
        FormValue::List(values.into_iter().map(str::to_string).collect())
    }
}

/// Form variables in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FormValue>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<FormValue>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Files to upload, keyed by form field. A field may carry several files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUploads {
    files: Vec<(String, Vec<PathBuf>)>,
}

impl FileUploads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let field = field.into();
        let path = path.into();
        match self.files.iter_mut().find(|(name, _)| *name == field) {
            Some((_, paths)) => paths.push(path),
            None => self.files.push((field, vec![path])),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.files
            .iter()
            .map(|(field, paths)| (field.as_str(), paths.as_slice()))
    }
}
