//! Message Model
//!
//! Immutable value types for one request or response: headers, optional body,
//! request method and response status.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::MessageError;

/// Header map with case-sensitive, unique names and text values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert a header, validating the name and trimming the value.
    pub(crate) fn insert(&mut self, name: String, value: &str) -> Result<(), MessageError> {
        if name.is_empty() {
            return Err(MessageError::EmptyHeaderName);
        }
        self.0.insert(name, value.trim().to_string());
        Ok(())
    }

    pub(crate) fn set(&mut self, name: &str, value: String) {
        self.0.insert(name.to_string(), value);
    }
}

/// An HTTP-like message: headers plus an optional body.
///
/// A missing body means "no body" on the request side and "stream the body"
/// when passed to [`Request::respond`](crate::Request::respond).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a message from raw engine headers, rejecting values that are not text.
    pub fn from_raw<I, K, V>(headers: I, body: Option<&[u8]>) -> Result<Self, MessageError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let mut map = Headers::new();
        for (name, value) in headers {
            let name = name.into();
            let value = std::str::from_utf8(value.as_ref())
                .map_err(|_| MessageError::InvalidHeaderValue { name: name.clone() })?;
            map.insert(name, value)?;
        }

        Ok(Self {
            headers: map,
            body: body.map(<[u8]>::to_vec),
        })
    }

    /// Build a message from text headers.
    pub fn with_headers<I, K, V>(headers: I) -> Result<Self, MessageError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut map = Headers::new();
        for (name, value) in headers {
            map.insert(name.into(), value.as_ref())?;
        }
        Ok(Self {
            headers: map,
            body: None,
        })
    }

    /// Add a single header.
    pub fn header(
        mut self,
        name: impl Into<String>,
        value: impl AsRef<str>,
    ) -> Result<Self, MessageError> {
        self.headers.insert(name.into(), value.as_ref())?;
        Ok(self)
    }

    /// Set the body. The bytes are owned by the message from here on.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn into_parts(self) -> (Headers, Option<Vec<u8>>) {
        (self.headers, self.body)
    }

    pub(crate) fn from_parts(headers: Headers, body: Option<Vec<u8>>) -> Self {
        Self { headers, body }
    }
}

/// Request method as decoded from the engine's operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Head,
    Get,
    Put,
    Post,
    Delete,
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Custom(verb) => verb,
        }
    }
}

impl From<&str> for Method {
    fn from(verb: &str) -> Self {
        match verb.to_ascii_uppercase().as_str() {
            "HEAD" => Method::Head,
            "GET" => Method::Get,
            "PUT" => Method::Put,
            "POST" => Method::Post,
            "DELETE" => Method::Delete,
            _ => Method::Custom(verb.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason phrase for a status code, empty when the code is not known.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        406 => "Not Acceptable",
        410 => "Gone",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Response status: code plus reason phrase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: u16,
    reason: String,
}

impl Status {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            reason: reason_phrase(code).to_string(),
        }
    }

    pub fn with_reason(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::new(200)
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        Status::new(code)
    }
}

impl From<(u16, &str)> for Status {
    fn from((code, reason): (u16, &str)) -> Self {
        Status::with_reason(code, reason)
    }
}

impl FromStr for Status {
    type Err = std::num::ParseIntError;

    /// Parses `"404"` or `"404 Not Found"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(' ') {
            Some((code, reason)) => Ok(Status::with_reason(code.parse()?, reason.trim())),
            None => Ok(Status::new(s.parse()?)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.reason)
        }
    }
}

/// Guess a content type from a file name's extension.
pub fn guess_content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
