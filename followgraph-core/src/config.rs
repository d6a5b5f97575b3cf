use anyhow::{Context, Result};
use followgraph_scanner::{Limits, SessionData};
use std::fs;
use std::path::PathBuf;

/// Environment variable holding the `sessionid` cookie value.
pub const SESSION_ENV: &str = "FOLLOWGRAPH_SESSION_ID";

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Load limits from a JSON file. Missing keys keep their defaults; no path
/// means all defaults.
pub fn load_limits(path: Option<&str>) -> Result<Limits> {
    let Some(path) = path else {
        return Ok(Limits::default());
    };

    let path = expand_path(path);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read limits file {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Invalid limits file {}", path.display()))
}

/// Command-line adjustments applied on top of the loaded limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitOverrides {
    pub generations: Option<u32>,
    pub followers: Option<usize>,
    pub threads: Option<usize>,
    pub include_following: bool,
}

impl LimitOverrides {
    pub fn apply(&self, mut limits: Limits) -> Limits {
        if let Some(generations) = self.generations {
            limits = limits.with_generations(generations);
        }
        if let Some(followers) = self.followers {
            limits = limits.with_follower_cap(followers);
        }
        if let Some(threads) = self.threads {
            limits = limits.with_parallel_tasks(threads);
        }
        if self.include_following {
            limits = limits.with_following(true);
        }
        limits
    }
}

/// Parse a raw `sessionid` value. Blank input means an anonymous crawl.
pub fn parse_session(raw: Option<&str>) -> Result<Option<SessionData>> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => SessionData::from_session_id(raw)
            .map(Some)
            .context("Invalid session id"),
    }
}
