use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use followgraph_core::config::{LimitOverrides, load_limits, parse_session};
use followgraph_core::crawl::{CrawlOptions, execute_crawl, lookup_profile};
use followgraph_core::report::{ReportFormat, generate_json_report, generate_text_report};
use followgraph_scanner::{Limits, SessionData};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Log level for a `-v` count
pub fn log_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over `-v`.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load limits from an optional file and apply command-line overrides
pub fn resolve_limits(path: Option<&str>, overrides: &LimitOverrides) -> Result<Limits> {
    Ok(overrides.apply(load_limits(path)?))
}

/// Write a report to `output`, or to stdout when no path is given
pub fn output_report(report: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, report)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", report),
    }
    Ok(())
}

fn limits_from_args(args: &ArgMatches) -> Result<Limits> {
    let overrides = LimitOverrides {
        generations: args.get_one::<u32>("generations").copied(),
        followers: args.get_one::<usize>("followers").copied(),
        threads: args.get_one::<usize>("threads").copied(),
        include_following: args.get_flag("include-following"),
    };
    resolve_limits(args.get_one::<String>("limits").map(String::as_str), &overrides)
}

fn session_from_args(args: &ArgMatches) -> Result<Option<SessionData>> {
    parse_session(args.get_one::<String>("session-id").map(String::as_str))
}

fn username_from_args(args: &ArgMatches) -> Result<&str> {
    args.get_one::<String>("USERNAME")
        .map(|name| name.trim().trim_start_matches('@'))
        .filter(|name| !name.is_empty())
        .context("A username is required")
}

pub async fn handle_profile(args: &ArgMatches) -> Result<()> {
    let username = username_from_args(args)?;
    let session = session_from_args(args)?;
    let base_url = args.get_one::<Url>("base-url");

    let user = lookup_profile(username, session, base_url).await?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

pub async fn handle_crawl(args: &ArgMatches) -> Result<()> {
    let username = username_from_args(args)?;
    let limits = limits_from_args(args)?;
    debug!("Resolved limits: {:?}", limits);
    let session = session_from_args(args)?;
    let base_url = args.get_one::<Url>("base-url").cloned();
    let output = args.get_one::<PathBuf>("output");
    let quiet = args.get_flag("quiet");
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);

    // Print crawl configuration
    if !quiet {
        eprintln!("\n{} Crawling @{}", "→".blue(), username.bright_white().bold());
        eprintln!("Workers: {}", limits.worker_count());
        eprintln!("Generations: {}", limits.depth.generations);
        let cap = match limits.depth.followers {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        };
        eprintln!("Followers per account: {}", cap);
        eprintln!("Include following: {}", limits.include_following);
        let account = session
            .as_ref()
            .map(|s| format!("user {}", s.user.id))
            .unwrap_or_else(|| "anonymous".to_string());
        eprintln!("Session: {}\n", account);
    }

    let options = CrawlOptions {
        username: username.to_string(),
        limits,
        session,
        base_url,
        download_images: !args.get_flag("no-images"),
        show_progress_bars: !quiet,
        handle_ctrl_c: true,
    };

    let report = execute_crawl(options, None).await?;

    if !quiet {
        match report.status() {
            "complete" => eprintln!("\n{} Crawl complete!\n", "✓".green().bold()),
            "cancelled" => eprintln!("\n{} Crawl cancelled, reporting partial results\n", "⚠".yellow().bold()),
            _ => eprintln!("\n{} Crawl stopped early, reporting partial results\n", "✗".red().bold()),
        }
        if !report.incomplete.is_empty() {
            eprintln!(
                "{} {} accounts lost pages to network errors and are marked incomplete\n",
                "⚠".yellow().bold(),
                report.incomplete.len()
            );
        }
    }

    let rendered = match format {
        ReportFormat::Text => generate_text_report(&report),
        ReportFormat::Json => {
            generate_json_report(&report).context("Failed to serialize report")?
        }
    };
    output_report(&rendered, output.map(PathBuf::as_path))?;

    if let Some(error) = report.error {
        bail!("Crawl failed: {}", error);
    }
    Ok(())
}
