// Report generation from a finished crawl

use crate::crawl::CrawlReport;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use colored::Colorize;
use followgraph_scanner::User;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// Embed picture bytes as a `data:` URL
pub fn image_data_url(bytes: &[u8]) -> String {
    let mime = if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"RIFF") {
        "image/webp"
    } else {
        "image/jpeg"
    };
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Users ordered by known followers, most first
fn ranked_users(report: &CrawlReport) -> Vec<&User> {
    let mut users: Vec<&User> = report.graph.users().collect();
    users.sort_by(|a, b| {
        b.follower_ids
            .len()
            .cmp(&a.follower_ids.len())
            .then(a.id.cmp(&b.id))
    });
    users
}

pub fn generate_json_report(report: &CrawlReport) -> Result<String, serde_json::Error> {
    let mut graph = serde_json::to_value(&report.graph)?;

    // Downloaded pictures replace their URL; failed downloads become null.
    if let Value::Object(users) = &mut graph {
        for (id, user) in users.iter_mut() {
            let Some(image) = id.parse::<u64>().ok().and_then(|id| report.images.get(&id)) else {
                continue;
            };
            user["profile"]["image"] = match image {
                Some(bytes) => Value::String(image_data_url(bytes)),
                None => Value::Null,
            };
        }
    }

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "followgraph",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "crawl": {
                "root": report.root.id,
                "username": report.root.profile.username,
                "status": report.status(),
                "error": report.error,
                "failures": report.failures,
                "start_time": report.started_at.to_rfc3339(),
                "end_time": report.finished_at.to_rfc3339(),
                "duration_seconds": (report.finished_at - report.started_at).num_seconds(),
                "generations": report.generations
            },
            "summary": {
                "users": report.graph.len(),
                "edges": report.graph.edge_count(),
                "done": report.done.len(),
                "incomplete": report.incomplete.len(),
                "images": report.images.values().filter(|image| image.is_some()).count()
            },
            "graph": graph
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_text_report(report: &CrawlReport) -> String {
    let mut out = String::new();
    out.push_str(&"━".repeat(52));
    out.push_str("\n\n# Summary:\n");
    out.push_str(&format!(
        "  Root: @{} ({})\n",
        report.root.profile.username.bright_white().bold(),
        report.root.id
    ));

    let status = match report.status() {
        "complete" => report.status().green().bold(),
        "cancelled" => report.status().yellow().bold(),
        _ => report.status().red().bold(),
    };
    out.push_str(&format!("  Status: {}\n", status));
    if let Some(ref error) = report.error {
        out.push_str(&format!("  Error: {}\n", error.red()));
    }

    out.push_str(&format!("  Users found: {}\n", report.graph.len()));
    out.push_str(&format!("  Follower edges: {}\n", report.graph.edge_count()));
    out.push_str(&format!("  Users completed: {}\n", report.done.len()));
    if !report.incomplete.is_empty() {
        out.push_str(&format!(
            "  Users incomplete: {} ({} failed page fetches)\n",
            report.incomplete.len(),
            report.failures.len()
        ));
    }
    out.push_str(&format!("  Generations: {}\n", report.generations));
    if !report.images.is_empty() {
        let downloaded = report.images.values().filter(|image| image.is_some()).count();
        out.push_str(&format!(
            "  Pictures downloaded: {}/{}\n",
            downloaded,
            report.images.len()
        ));
    }
    out.push_str(&format!(
        "  Duration: {}s\n",
        (report.finished_at - report.started_at).num_seconds()
    ));

    out.push('\n');
    out.push_str(&"━".repeat(52));
    out.push_str("\n\n## Users\n");

    for user in ranked_users(report) {
        let mut line = format!(
            "  {:>6} {} {}",
            user.follower_ids.len().to_string().cyan(),
            user.profile.username,
            format!("({})", user.id).dimmed()
        );
        if user.following_count > 0 {
            line.push_str(&format!(" follows {}", user.following_count));
        }
        if user.private {
            line.push_str(&format!(" {}", "private".yellow()));
        }
        if report.incomplete.contains(&user.id) {
            line.push_str(&format!(" {}", "incomplete".red()));
        } else if !report.done.contains(&user.id) {
            line.push_str(&format!(" {}", "pending".dimmed()));
        }
        out.push_str(&line);
        out.push('\n');
    }

    out
}
