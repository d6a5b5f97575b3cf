use followgraph::handlers::*;
use followgraph_core::config::LimitOverrides;
use std::io::Write;
use tempfile::{NamedTempFile, tempdir};

#[test]
fn test_log_filter_levels() {
    assert_eq!(log_filter(0), "warn");
    assert_eq!(log_filter(1), "info");
    assert_eq!(log_filter(2), "debug");
    assert_eq!(log_filter(3), "trace");
    assert_eq!(log_filter(9), "trace");
}

#[test]
fn test_resolve_limits_file_then_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(
        temp_file,
        r#"{{ "depth": {{ "generations": 4 }}, "rate": {{ "parallelTasks": 3 }} }}"#
    )?;

    let overrides = LimitOverrides {
        generations: Some(1),
        ..Default::default()
    };
    let limits = resolve_limits(temp_file.path().to_str(), &overrides)?;

    assert_eq!(limits.depth.generations, 1);
    assert_eq!(limits.rate.parallel_tasks, 3);
    assert_eq!(limits.depth.followers, 1000);

    Ok(())
}

#[test]
fn test_resolve_limits_without_file() {
    let overrides = LimitOverrides {
        include_following: true,
        ..Default::default()
    };
    let limits = resolve_limits(None, &overrides).unwrap();
    assert!(limits.include_following);
    assert_eq!(limits.depth.generations, 1);
}

#[test]
fn test_resolve_limits_bad_file() {
    let result = resolve_limits(Some("/nonexistent/limits.json"), &LimitOverrides::default());
    assert!(result.is_err());
}

#[test]
fn test_output_report_to_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("report.json");

    output_report("{\"ok\": true}", Some(&path))?;
    assert_eq!(std::fs::read_to_string(&path)?, "{\"ok\": true}");

    Ok(())
}

#[test]
fn test_output_report_unwritable_path() {
    let result = output_report("x", Some(std::path::Path::new("/nonexistent/dir/report.txt")));
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("Failed to write report"));
}
