use std::fmt;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::{AccessToken, TrackerSettings};
use crate::error::{ConfigError, FetchError};

/// Opaque token the tracker hands out: ticket ids and page cursors are
/// numbers on sourcehut but nothing here relies on that.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(untagged)]
pub enum OpaqueId {
    Number(i64),
    Text(String),
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

pub type TicketId = OpaqueId;
pub type Cursor = OpaqueId;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
}

/// Only `event_type` is required up front. The comment payload is decoded
/// once the event is known to be a comment, so odd payloads on other event
/// kinds never fail a page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    pub event_type: Value,
    #[serde(default)]
    pub comment: Option<Value>,
}

impl Event {
    /// Exactly `["comment"]`; events that carry more than one type, or a
    /// non-list type, are not treated as comments.
    pub fn is_comment(&self) -> bool {
        matches!(
            self.event_type.as_array().map(Vec::as_slice),
            Some([Value::String(kind)]) if kind == "comment"
        )
    }

    pub fn decode_comment(&self) -> Option<Result<EventComment, serde_json::Error>> {
        self.comment
            .as_ref()
            .map(|payload| EventComment::deserialize(payload))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventComment {
    pub submitter: Submitter,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Submitter {
    pub canonical_name: String,
}

/// Read access to a ticket tracker, one page per call.
pub trait TrackerReadApi {
    fn get_tickets_page(&mut self, cursor: Option<&Cursor>) -> Result<Page<Ticket>, FetchError>;
    fn get_events_page(
        &mut self,
        ticket: &TicketId,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Event>, FetchError>;
    fn request_count(&self) -> usize;
}

pub struct TrackerClient {
    client: Client,
    settings: TrackerSettings,
    token: AccessToken,
    request_count: usize,
}

impl TrackerClient {
    pub fn new(settings: TrackerSettings, token: AccessToken) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            settings,
            token,
            request_count: 0,
        })
    }

    fn request_page<T: DeserializeOwned>(&mut self, url: Url) -> Result<Page<T>, FetchError> {
        self.request_count += 1;
        debug!(url = %url, "requesting tracker page");

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.settings.user_agent.clone())
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, self.token.authorization_header())
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        decode_page(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

impl TrackerReadApi for TrackerClient {
    fn get_tickets_page(&mut self, cursor: Option<&Cursor>) -> Result<Page<Ticket>, FetchError> {
        let url = page_url(&self.settings.api_url, &["tickets"], cursor);
        self.request_page(url)
    }

    fn get_events_page(
        &mut self,
        ticket: &TicketId,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Event>, FetchError> {
        let ticket = ticket.to_string();
        let url = page_url(
            &self.settings.api_url,
            &["tickets", ticket.as_str(), "events"],
            cursor,
        );
        self.request_page(url)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub fn decode_page<T: DeserializeOwned>(body: &str) -> Result<Page<T>, serde_json::Error> {
    serde_json::from_str(body)
}

/// Append `segments` to the tracker base and attach `start=<cursor>` when
/// continuing a listing.
pub fn page_url(base: &Url, segments: &[&str], cursor: Option<&Cursor>) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    if let Some(cursor) = cursor {
        url.query_pairs_mut()
            .append_pair("start", &cursor.to_string());
    }
    url
}
