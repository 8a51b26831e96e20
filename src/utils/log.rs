// src/utils/log.rs

//! Console report helpers with server-style formatting.
//!
//! Library code logs through the `log` facade; these helpers print the
//! human-facing run report of the CLI.

use std::sync::OnceLock;

use chrono::Local;

use crate::models::Summary;

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Current report level
static LOG_LEVEL: OnceLock<LogLevel> = OnceLock::new();

/// Set the report level once; later calls are ignored.
pub fn init(level: &str) {
    let _ = LOG_LEVEL.set(LogLevel::parse(level));
}

fn should_log(level: LogLevel) -> bool {
    let current = LOG_LEVEL.get().copied().unwrap_or(LogLevel::Info);
    level >= current
}

/// Format a log message with timestamp and level
fn format_log(level: LogLevel, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, level.as_str(), message)
}

/// Log a separator line
pub fn separator() {
    if should_log(LogLevel::Info) {
        println!("{}", format_log(LogLevel::Info, &"─".repeat(60)));
    }
}

/// Log a header
pub fn header(title: &str) {
    if should_log(LogLevel::Info) {
        let border = "═".repeat(60);
        println!("{}", format_log(LogLevel::Info, &border));
        println!("{}", format_log(LogLevel::Info, &format!("  {}", title)));
        println!("{}", format_log(LogLevel::Info, &border));
    }
}

fn indented(level: LogLevel, message: &str) {
    if should_log(level) {
        let msg = format!("    {}", message);
        println!("{}", format_log(level, &msg));
    }
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    indented(LogLevel::Info, message);
}

/// Log an indented warning
pub fn warn_item(message: &str) {
    indented(LogLevel::Warn, message);
}

/// Log an indented error
pub fn error_item(message: &str) {
    indented(LogLevel::Error, message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    if should_log(LogLevel::Info) {
        println!();
        let title_msg = format!("[SUMMARY] {}", title);
        println!("{}", format_log(LogLevel::Info, &title_msg));

        for (key, value) in items {
            let item_msg = format!("    {}: {}", key, value);
            println!("{}", format_log(LogLevel::Info, &item_msg));
        }
    }
}

/// One report line per source invocation.
pub fn summary_line(s: &Summary) -> String {
    let status = match &s.error {
        None => "ok".to_string(),
        Some(failure) => format!("FAILED {:?} while {:?}", failure.kind, failure.phase),
    };
    format!(
        "{:<20} {:>4} new {:>4} dup {:>4} skip {:>4} fail  {:>6}ms  {}",
        s.source_id,
        s.inserted,
        s.duplicate,
        s.skipped,
        s.failed,
        s.elapsed_ms(),
        status
    )
}

/// Report lines for one invocation with the level each is printed at.
pub fn report_lines(s: &Summary) -> Vec<(LogLevel, String)> {
    let mut lines = vec![(LogLevel::Info, summary_line(s))];
    lines.extend(
        s.feed_errors
            .iter()
            .map(|feed| (LogLevel::Warn, format!("  feed: {feed}"))),
    );
    if let Some(failure) = &s.error {
        lines.push((LogLevel::Error, format!("  error: {}", failure.message)));
    }
    lines
}

/// Print the report for a batch of invocations.
pub fn run_report(summaries: &[Summary]) {
    header("Ingestion report");
    for s in summaries {
        for (level, line) in report_lines(s) {
            match level {
                LogLevel::Warn => warn_item(&line),
                LogLevel::Error => error_item(&line),
                _ => sub_item(&line),
            }
        }
    }
    separator();

    let total = |f: fn(&Summary) -> usize| summaries.iter().map(f).sum::<usize>().to_string();
    summary(
        "Totals",
        &[
            ("Sources", summaries.len().to_string()),
            (
                "Failed sources",
                summaries.iter().filter(|s| !s.is_success()).count().to_string(),
            ),
            ("Inserted", total(|s| s.inserted)),
            ("Duplicate", total(|s| s.duplicate)),
            ("Skipped", total(|s| s.skipped)),
            ("Failed items", total(|s| s.failed)),
        ],
    );
}
