// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{init_tracing, log_filter, output_report, resolve_limits};

// Re-export crawl functionality from followgraph-core
pub use followgraph_core::crawl::{CrawlOptions, CrawlReport, execute_crawl, lookup_profile};
