use crate::graph::{User, UserGraph};
use crate::rate::RateLimit;
use crate::task::Direction;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Users whose harvesting is complete.
    pub done: usize,
}

/// What one merge added to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Added {
    pub followers: Vec<u64>,
    pub users: Vec<User>,
    pub progress: Progress,
}

/// Progress reported while a crawl runs. Each event carries a snapshot of
/// the graph at the time it was produced; snapshots only ever grow.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlEvent {
    Update {
        user: u64,
        graph: Arc<UserGraph>,
        added: Added,
    },
    RateLimitBatch {
        user: u64,
        graph: Arc<UserGraph>,
        #[serde(serialize_with = "as_millis")]
        delay: Duration,
    },
    RateLimitDaily {
        user: u64,
        graph: Arc<UserGraph>,
        #[serde(serialize_with = "as_millis")]
        delay: Duration,
    },
    DepthLimitFollower {
        user: u64,
        graph: Arc<UserGraph>,
        amount: usize,
    },
    DepthLimitFollowing {
        user: u64,
        graph: Arc<UserGraph>,
        amount: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Update,
    RateLimitBatch,
    RateLimitDaily,
    DepthLimitFollower,
    DepthLimitFollowing,
}

impl CrawlEvent {
    pub fn rate_limit(user: u64, graph: Arc<UserGraph>, limit: RateLimit) -> Self {
        match limit {
            RateLimit::Batch(delay) => CrawlEvent::RateLimitBatch { user, graph, delay },
            RateLimit::Daily(delay) => CrawlEvent::RateLimitDaily { user, graph, delay },
        }
    }

    pub fn depth_limit(user: u64, graph: Arc<UserGraph>, direction: Direction, amount: usize) -> Self {
        match direction {
            Direction::Follower => CrawlEvent::DepthLimitFollower {
                user,
                graph,
                amount,
            },
            Direction::Following => CrawlEvent::DepthLimitFollowing {
                user,
                graph,
                amount,
            },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            CrawlEvent::Update { .. } => EventKind::Update,
            CrawlEvent::RateLimitBatch { .. } => EventKind::RateLimitBatch,
            CrawlEvent::RateLimitDaily { .. } => EventKind::RateLimitDaily,
            CrawlEvent::DepthLimitFollower { .. } => EventKind::DepthLimitFollower,
            CrawlEvent::DepthLimitFollowing { .. } => EventKind::DepthLimitFollowing,
        }
    }

    pub fn user(&self) -> u64 {
        match self {
            CrawlEvent::Update { user, .. }
            | CrawlEvent::RateLimitBatch { user, .. }
            | CrawlEvent::RateLimitDaily { user, .. }
            | CrawlEvent::DepthLimitFollower { user, .. }
            | CrawlEvent::DepthLimitFollowing { user, .. } => *user,
        }
    }

    pub fn graph(&self) -> &Arc<UserGraph> {
        match self {
            CrawlEvent::Update { graph, .. }
            | CrawlEvent::RateLimitBatch { graph, .. }
            | CrawlEvent::RateLimitDaily { graph, .. }
            | CrawlEvent::DepthLimitFollower { graph, .. }
            | CrawlEvent::DepthLimitFollowing { graph, .. } => graph,
        }
    }
}

fn as_millis<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(delay.as_millis() as u64)
}
