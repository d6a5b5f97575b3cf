use crate::error::{CrawlError, Result};
use crate::graph::User;
use crate::session::SessionData;
use crate::task::Direction;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.instagram.com";
const APP_ID: &str = "936619743392459";

/// Fixed by the remote service.
pub const FOLLOWER_PAGE_SIZE: usize = 25;
pub const FOLLOWING_PAGE_SIZE: usize = 200;

/// One account as listed on a followers/following page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedProfile {
    pub id: u64,
    pub name: String,
    pub username: String,
    pub image: Option<String>,
    pub is_private: bool,
    /// `is_private`, except that the session owner is never private to
    /// itself.
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub profiles: Vec<FetchedProfile>,
    /// Cursor of the next page; `None` on the last one.
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    fn user_id(&self) -> Result<u64> {
        match self {
            WireId::Number(id) => Ok(*id),
            WireId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| CrawlError::Protocol(format!("non-numeric user id '{}'", text))),
        }
    }

    fn into_cursor(self) -> Option<String> {
        match self {
            WireId::Number(n) => Some(n.to_string()),
            WireId::Text(text) if text.is_empty() => None,
            WireId::Text(text) => Some(text),
        }
    }
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    data: ProfileData,
}

#[derive(Deserialize)]
struct ProfileData {
    user: Option<WireProfile>,
}

#[derive(Deserialize)]
struct WireProfile {
    id: WireId,
    #[serde(default)]
    full_name: Option<String>,
    username: String,
    #[serde(default)]
    profile_pic_url: Option<String>,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    followed_by_viewer: bool,
    #[serde(default)]
    is_business_account: bool,
    #[serde(default)]
    is_professional_account: bool,
}

#[derive(Deserialize)]
struct WirePage {
    users: Vec<WireUser>,
    #[serde(default)]
    next_max_id: Option<WireId>,
}

#[derive(Deserialize)]
struct WireUser {
    id: WireId,
    #[serde(default)]
    full_name: Option<String>,
    username: String,
    #[serde(default)]
    profile_pic_url: Option<String>,
    #[serde(default)]
    is_private: bool,
}

/// Client for the two endpoints a crawl needs: profile lookup and
/// followers/following pages.
#[derive(Clone)]
pub struct InstagramClient {
    client: Client,
    base_url: Url,
    session: Option<SessionData>,
}

impl InstagramClient {
    pub fn new(session: Option<SessionData>) -> Result<Self> {
        Self::with_timeout(session, 30)
    }

    pub fn with_timeout(session: Option<SessionData>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; followgraph/0.1)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs / 2))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", DEFAULT_BASE_URL, e)))?;

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn session(&self) -> Option<&SessionData> {
        self.session.as_ref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// Resolve a username to a user record.
    pub async fn fetch_user(&self, username: &str) -> Result<User> {
        let username = username.trim();
        let mut url = self.endpoint("/api/v1/users/web_profile_info/")?;
        url.query_pairs_mut().append_pair("username", username);

        debug!("Looking up profile {}", username);
        let body = self.get_json(url).await?;

        let envelope: ProfileEnvelope = serde_json::from_value(body)
            .map_err(|e| CrawlError::Protocol(format!("profile lookup: {}", e)))?;
        let wire = envelope
            .data
            .user
            .ok_or_else(|| CrawlError::Protocol(format!("no such user '{}'", username)))?;

        let id = wire.id.user_id()?;
        Ok(User {
            id,
            profile: crate::graph::Profile {
                name: wire.full_name.unwrap_or_default(),
                username: wire.username,
                image: wire.profile_pic_url.filter(|u| !u.is_empty()),
            },
            follower_ids: Vec::new(),
            following_count: 0,
            private: wire.is_private && !wire.followed_by_viewer && !self.is_session_owner(id),
            public: !wire.is_private,
            personal: Some(!(wire.is_business_account || wire.is_professional_account)),
        })
    }

    /// Fetch one page of `target`'s followers or followed accounts.
    pub async fn fetch_page(
        &self,
        target: u64,
        direction: Direction,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let mut url = self.endpoint(&format!(
            "/api/v1/friendships/{}/{}/",
            target,
            direction.as_path()
        ))?;
        url.query_pairs_mut().append_pair("max_id", cursor.unwrap_or(""));

        debug!("Fetching {} of {} (cursor {:?})", direction, target, cursor);
        let body = self.get_json(url).await?;

        let wire: WirePage = serde_json::from_value(body)
            .map_err(|e| CrawlError::Protocol(format!("{} page of {}: {}", direction, target, e)))?;

        let profiles = wire
            .users
            .into_iter()
            .map(|user| {
                let id = user.id.user_id()?;
                Ok(FetchedProfile {
                    id,
                    name: user.full_name.unwrap_or_default(),
                    username: user.username,
                    image: user.profile_pic_url.filter(|u| !u.is_empty()),
                    is_private: user.is_private,
                    private: user.is_private && !self.is_session_owner(id),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            profiles,
            next_cursor: wire.next_max_id.and_then(WireId::into_cursor),
        })
    }

    fn is_session_owner(&self, id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.user.id == id)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CrawlError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    fn request(&self, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .get(url)
            .header("Sec-Fetch-Site", "same-origin")
            .header("X-IG-App-ID", APP_ID);

        match &self.session {
            Some(session) => builder.header(reqwest::header::COOKIE, session.cookie_header()),
            None => builder,
        }
    }

    async fn get_json(&self, url: Url) -> Result<serde_json::Value> {
        let response = self.request(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CrawlError::Auth(format!("HTTP {}", status)));
        }

        let value: serde_json::Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(CrawlError::Protocol(format!("HTTP {}", status)));
            }
            Err(_) => {
                return Err(CrawlError::Protocol("response body is not JSON".to_string()));
            }
        };

        if let Some(reason) = login_required(&value) {
            return Err(CrawlError::Auth(reason));
        }

        if !status.is_success() {
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("no message");
            return Err(CrawlError::Protocol(format!("HTTP {}: {}", status, message)));
        }

        Ok(value)
    }
}

/// Does the body say the session is no longer usable?
fn login_required(body: &serde_json::Value) -> Option<String> {
    if body.get("require_login").and_then(|v| v.as_bool()) == Some(true) {
        return Some("login required".to_string());
    }

    match body.get("message").and_then(|m| m.as_str()) {
        Some(message @ ("login_required" | "checkpoint_required")) => Some(message.to_string()),
        _ => None,
    }
}
