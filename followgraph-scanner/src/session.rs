use crate::error::{CrawlError, Result};
use serde::{Deserialize, Serialize};

/// The account a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Opaque session handed over by whatever performed the login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,
    pub user: SessionUser,
}

impl SessionData {
    pub fn new(id: impl Into<String>, user_id: u64) -> Self {
        Self {
            id: id.into(),
            user: SessionUser {
                id: user_id,
                username: None,
            },
        }
    }

    /// Build a session from a raw `sessionid` cookie value.
    ///
    /// The cookie starts with the owner's numeric user id, followed by a
    /// `%`-encoded separator (`%3A`). Only the leading digits are used.
    pub fn from_session_id(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();

        let user_id = digits
            .parse::<u64>()
            .map_err(|_| CrawlError::InvalidSession("missing leading user id".to_string()))?;

        Ok(Self::new(raw, user_id))
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.user.username = Some(username.into());
        self
    }

    /// Value of the `Cookie` header attached to every request.
    pub fn cookie_header(&self) -> String {
        format!("sessionid={}; ds_user_id={}", self.id, self.user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_format() {
        let session = SessionData::new("abc", 42);
        assert_eq!(session.cookie_header(), "sessionid=abc; ds_user_id=42");
    }

    #[test]
    fn test_from_session_id_takes_leading_digits() {
        let session = SessionData::from_session_id("1234567%3AxYz%3A27").unwrap();
        assert_eq!(session.user.id, 1234567);
        assert_eq!(session.id, "1234567%3AxYz%3A27");
    }

    #[test]
    fn test_from_session_id_trims_whitespace() {
        let session = SessionData::from_session_id("  99%3Aabc \n").unwrap();
        assert_eq!(session.user.id, 99);
        assert_eq!(session.id, "99%3Aabc");
    }

    #[test]
    fn test_from_session_id_rejects_missing_user_id() {
        let result = SessionData::from_session_id("%3Aabc");
        assert!(matches!(result, Err(CrawlError::InvalidSession(_))));
    }

    #[test]
    fn test_with_username() {
        let session = SessionData::new("abc", 1).with_username("owner");
        assert_eq!(session.user.username.as_deref(), Some("owner"));
    }
}
