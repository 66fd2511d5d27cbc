//! [`OpenHabClient`] – openHAB REST access.
//!
//! The poll loop and the command router talk to the source system only
//! through the [`SourceClient`] trait, so both can be exercised against an
//! in-memory fake.  [`OpenHabClient`] is the production implementation on
//! top of `reqwest`:
//!
//! | Operation | Request |
//! |---|---|
//! | [`fetch_group`](SourceClient::fetch_group) | `GET /rest/items/{group}` |
//! | [`send_command`](SourceClient::send_command) | `POST /rest/items/{item}` (text body) |
//! | [`set_state`](SourceClient::set_state) | `PUT /rest/items/{item}/state` (text body) |
//!
//! Every failure is mapped onto the closed [`BridgeError`] taxonomy before it
//! leaves this module.

use std::time::Duration;

use async_trait::async_trait;
use ohros_types::{BridgeError, ItemUpdate};
use reqwest::{StatusCode, Url, header};
use serde::Deserialize;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Read and write access to the home-automation registry.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch every member of `group` as `(name, state)` pairs.
    async fn fetch_group(&self, group: &str) -> Result<Vec<ItemUpdate>, BridgeError>;

    /// Send a device command to `item`.
    async fn send_command(&self, item: &str, value: &str) -> Result<(), BridgeError>;

    /// Overwrite the reported state of `item` without commanding the device.
    async fn set_state(&self, item: &str, value: &str) -> Result<(), BridgeError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// How the read path waits for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollMode {
    /// The server holds the request open until a group member changes.
    #[default]
    LongPoll,
    /// Plain request; the engine paces cycles itself.
    ShortPoll,
}

/// Connection parameters for [`OpenHabClient`].
pub struct SourceSettings {
    pub host: String,
    pub port: u16,
    /// Empty disables Basic-Auth.
    pub username: String,
    pub password: Zeroizing<String>,
    pub mode: PollMode,
    pub request_timeout: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GroupResponse {
    members: Vec<Member>,
}

#[derive(Deserialize)]
struct Member {
    name: String,
    state: String,
}

/// Decode a group item body into its members.
///
/// Fields other than `members[].name` and `members[].state` are ignored.
///
/// # Errors
///
/// [`BridgeError::MalformedResponse`] if the body is not JSON or any of the
/// expected fields is missing.
pub fn parse_group_snapshot(body: &str) -> Result<Vec<ItemUpdate>, BridgeError> {
    let response: GroupResponse = serde_json::from_str(body)
        .map_err(|e| BridgeError::MalformedResponse(e.to_string()))?;
    Ok(response
        .members
        .into_iter()
        .map(|m| ItemUpdate::new(m.name, m.state))
        .collect())
}

/// Map a `reqwest` failure onto the bridge taxonomy.
pub fn classify_reqwest_error(e: &reqwest::Error) -> BridgeError {
    if let Some(status) = e.status() {
        BridgeError::Protocol {
            status: status.as_u16(),
        }
    } else if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
        BridgeError::Transport(e.to_string())
    } else if e.is_decode() {
        BridgeError::MalformedResponse(e.to_string())
    } else {
        BridgeError::Unexpected(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenHabClient
// ─────────────────────────────────────────────────────────────────────────────

/// `reqwest`-backed [`SourceClient`].
///
/// Construct once; the inner connection pool is reused across cycles.
pub struct OpenHabClient {
    items_url: Url,
    username: String,
    password: Zeroizing<String>,
    mode: PollMode,
    client: reqwest::Client,
}

impl OpenHabClient {
    /// Build a client for `http://{host}:{port}/rest/items/`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unexpected`] if the host does not form a valid URL or
    /// the HTTP client cannot be built.
    pub fn new(settings: SourceSettings) -> Result<Self, BridgeError> {
        let items_url = Url::parse(&format!(
            "http://{}:{}/rest/items/",
            settings.host, settings.port
        ))
        .map_err(|e| BridgeError::Unexpected(format!("invalid openHAB address: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| BridgeError::Unexpected(format!("http client: {e}")))?;

        Ok(Self {
            items_url,
            username: settings.username,
            password: settings.password,
            mode: settings.mode,
            client,
        })
    }

    /// URL of `item`, optionally followed by extra path segments.
    fn item_url(&self, item: &str, suffix: Option<&str>) -> Result<Url, BridgeError> {
        let mut url = self.items_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| BridgeError::Unexpected("openHAB URL cannot be a base".into()))?;
            segments.pop_if_empty().push(item);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(self.password.as_str()))
        }
    }

    async fn write(&self, request: reqwest::RequestBuilder, value: &str) -> Result<(), BridgeError> {
        let response = self
            .authorize(request)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Protocol {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SourceClient for OpenHabClient {
    #[instrument(skip(self))]
    async fn fetch_group(&self, group: &str) -> Result<Vec<ItemUpdate>, BridgeError> {
        let url = self.item_url(group, None)?;
        let mut request = self
            .authorize(self.client.get(url))
            .header(header::ACCEPT, "application/json");
        if self.mode == PollMode::LongPoll {
            request = request.header("X-Atmosphere-Transport", "long-polling");
        }

        let response = request.send().await.map_err(|e| classify_reqwest_error(&e))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(BridgeError::Protocol {
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(|e| classify_reqwest_error(&e))?;
        let members = parse_group_snapshot(&body)?;
        debug!(members = members.len(), "group snapshot received");
        Ok(members)
    }

    #[instrument(skip(self))]
    async fn send_command(&self, item: &str, value: &str) -> Result<(), BridgeError> {
        let url = self.item_url(item, None)?;
        self.write(self.client.post(url), value).await
    }

    #[instrument(skip(self))]
    async fn set_state(&self, item: &str, value: &str) -> Result<(), BridgeError> {
        let url = self.item_url(item, Some("state"))?;
        self.write(self.client.put(url), value).await
    }
}
