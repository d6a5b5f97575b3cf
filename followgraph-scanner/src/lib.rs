pub mod client;
pub mod crawler;
pub mod depth;
pub mod error;
pub mod event;
pub mod graph;
pub mod images;
pub mod limits;
pub mod rate;
pub mod session;
pub mod task;

pub use client::{FetchedProfile, InstagramClient, Page};
pub use crawler::{Crawl, CrawlOutcome, Crawler};
pub use error::CrawlError;
pub use event::{Added, CrawlEvent, EventKind, Progress};
pub use graph::{MergeDelta, Profile, User, UserGraph};
pub use images::{HttpImageSource, ImageDownloads, ImageSource};
pub use limits::{BatchLimits, DelayLimits, DelayRange, DepthLimits, Limits, RateLimits};
pub use rate::RateLimit;
pub use session::{SessionData, SessionUser};
pub use task::{Direction, Task};
