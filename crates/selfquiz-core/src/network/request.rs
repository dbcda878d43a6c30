use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Only responses with this status are ever cached.
pub const CACHEABLE_STATUS: u16 = 200;

/// How the request was issued. Only top-level page loads are `Navigate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// What the requested resource will be used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Font,
    Style,
    Script,
    Image,
    Manifest,
    Worker,
    #[default]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub mode: RequestMode,
    pub destination: Destination,
}

impl Request {
    /// A plain subresource request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RequestMode::default(),
            destination: Destination::default(),
        }
    }

    /// A top-level page load.
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RequestMode::Navigate,
            destination: Destination::Document,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub url: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_cacheable(&self) -> bool {
        self.status == CACHEABLE_STATUS
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
