use bytes::Bytes;
use std::collections::BTreeMap;

/// Header naming the payload's media type.
pub const CONTENT_TYPE: &str = "contentType";

/// Media type of JSON-encoded span batches.
pub const APPLICATION_JSON: &str = "application/json";

/// Message headers.
pub type MessageHeaders = BTreeMap<String, String>;

/// A payload with headers, as carried by a [`MessageChannel`](crate::MessageChannel).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    headers: MessageHeaders,
    payload: Bytes,
}

impl Message {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            headers: MessageHeaders::new(),
            payload: payload.into(),
        }
    }

    pub fn from_parts(headers: MessageHeaders, payload: Bytes) -> Self {
        Self { headers, payload }
    }

    /// Adds (or replaces) a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    pub fn into_parts(self) -> (MessageHeaders, Bytes) {
        (self.headers, self.payload)
    }
}
