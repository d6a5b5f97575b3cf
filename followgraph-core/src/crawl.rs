use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use followgraph_scanner::{
    CrawlError, CrawlEvent, Crawler, InstagramClient, Limits, SessionData, User, UserGraph,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Options for configuring a crawl operation
pub struct CrawlOptions {
    pub username: String,
    pub limits: Limits,
    pub session: Option<SessionData>,
    pub base_url: Option<Url>,
    pub download_images: bool,
    pub show_progress_bars: bool,
    /// Cancel the crawl on Ctrl-C instead of letting the process die.
    pub handle_ctrl_c: bool,
}

/// Callback invoked for every event the crawl produces
pub type CrawlEventCallback = Arc<dyn Fn(&CrawlEvent) + Send + Sync>;

/// Everything a finished (or stopped) crawl produced
pub struct CrawlReport {
    pub root: User,
    pub graph: UserGraph,
    pub done: HashSet<u64>,
    /// Users whose harvest lost a page to a network error.
    pub incomplete: HashSet<u64>,
    /// Downloaded profile pictures; `None` where the download failed.
    pub images: BTreeMap<u64, Option<Vec<u8>>>,
    pub generations: u32,
    pub cancelled: bool,
    /// Fatal error that stopped the crawl.
    pub error: Option<String>,
    /// Page fetches that failed without stopping the crawl.
    pub failures: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrawlReport {
    pub fn status(&self) -> &'static str {
        if self.error.is_some() {
            "failed"
        } else if self.cancelled {
            "cancelled"
        } else {
            "complete"
        }
    }
}

pub fn build_client(session: Option<SessionData>, base_url: Option<&Url>) -> Result<InstagramClient> {
    let client = InstagramClient::new(session).context("Failed to build HTTP client")?;
    Ok(match base_url {
        Some(url) => client.with_base_url(url.clone()),
        None => client,
    })
}

/// Look up a single profile by username
pub async fn lookup_profile(
    username: &str,
    session: Option<SessionData>,
    base_url: Option<&Url>,
) -> Result<User> {
    build_client(session, base_url)?
        .fetch_user(username)
        .await
        .with_context(|| format!("Failed to look up '{}'", username))
}

/// Human readable duration, coarsest two units
pub fn format_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// One-line progress message for an event
pub fn describe_event(event: &CrawlEvent) -> String {
    match event {
        CrawlEvent::Update { graph, added, .. } => format!(
            "Crawling... {} users found, {} done",
            graph.len(),
            added.progress.done
        ),
        CrawlEvent::RateLimitBatch { delay, .. } => {
            format!("Batch limit reached, resuming in {}", format_delay(*delay))
        }
        CrawlEvent::RateLimitDaily { delay, .. } => {
            format!("Daily limit reached, resuming in {}", format_delay(*delay))
        }
        CrawlEvent::DepthLimitFollower { user, amount, .. } => {
            format!("Kept {} followers of {}", amount, user)
        }
        CrawlEvent::DepthLimitFollowing { user, amount, .. } => {
            format!("Kept {} accounts followed by {}", amount, user)
        }
    }
}

/// Execute a crawl with the given options
/// Returns the crawl report, including partial results if the crawl was
/// cancelled or stopped by an error
pub async fn execute_crawl(
    options: CrawlOptions,
    event_callback: Option<CrawlEventCallback>,
) -> Result<CrawlReport> {
    let CrawlOptions {
        username,
        limits,
        session,
        base_url,
        download_images,
        show_progress_bars,
        handle_ctrl_c,
    } = options;

    let started_at = Utc::now();
    let client = build_client(session, base_url.as_ref())?;
    let root = client
        .fetch_user(&username)
        .await
        .with_context(|| format!("Failed to look up '{}'", username))?;
    info!("Resolved {} to user {}", username, root.id);

    let mut crawler = Crawler::new(client).with_limits(limits);
    if !download_images {
        crawler = crawler.without_images();
    }

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .context("Invalid progress template")?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Starting crawl of {}...", username));
        Some(pb)
    } else {
        None
    };

    let mut crawl = crawler.crawl(root.clone());

    let interrupt = handle_ctrl_c.then(|| {
        let token = crawl.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping crawl");
                token.cancel();
            }
        })
    });

    let mut error = None;
    let mut failures = Vec::new();
    while let Some(item) = crawl.next_event().await {
        match item {
            Ok(event) => {
                if let Some(ref pb) = progress_bar {
                    pb.set_message(describe_event(&event));
                }
                if let Some(ref callback) = event_callback {
                    callback(&event);
                }
            }
            Err(e @ CrawlError::Network(_)) => {
                warn!("Page fetch failed, continuing: {}", e);
                failures.push(e.to_string());
            }
            Err(e) => {
                warn!("Crawl stopped: {}", e);
                error = Some(e.to_string());
            }
        }
    }

    let outcome = crawl.finish().await.context("Crawl task failed")?;
    if let Some(handle) = interrupt {
        handle.abort();
    }

    let images = if outcome.images.is_empty() {
        BTreeMap::new()
    } else {
        if let Some(ref pb) = progress_bar {
            pb.set_message(format!(
                "Downloading {} profile pictures...",
                outcome.images.len()
            ));
        }
        outcome.images.settle().await
    };

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "Crawl finished: {} users, {} done",
            outcome.graph.len(),
            outcome.done.len()
        ));
    }

    Ok(CrawlReport {
        root,
        graph: outcome.graph,
        done: outcome.done,
        incomplete: outcome.incomplete,
        images,
        generations: outcome.generations,
        cancelled: outcome.cancelled,
        error,
        failures,
        started_at,
        finished_at: Utc::now(),
    })
}
