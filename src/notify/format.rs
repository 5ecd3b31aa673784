//! Message text for change and baseline notifications.

use crate::calendar::Snapshot;
use crate::diff::ChangeEvent;

use chrono::{Datelike, NaiveDate, Weekday};
use regex::Regex;
use std::sync::OnceLock;

/// Most change lines a single message carries.
pub const MAX_CHANGE_LINES: usize = 20;

/// Longest target shown in a message header. Keeps a full batch of change
/// lines and the summary line inside a webhook's content limit.
pub const MAX_TARGET_CHARS: usize = 300;

/// Render one change as a history/message line.
pub fn describe(event: &ChangeEvent) -> String {
    let date = event.date().format("%Y-%m-%d");
    match event {
        ChangeEvent::Appeared { code, .. } => format!("🆕 {}: {}", date, code.glyph()),
        ChangeEvent::Transitioned { from, to, .. } => {
            format!("📅 {}: {} ➡ {}", date, from.glyph(), to.glyph())
        }
    }
}

/// Whether a change line is about a Saturday or Sunday.
///
/// Lines without a parseable `YYYY-MM-DD` token are not weekend changes.
pub fn is_weekend_change(line: &str) -> bool {
    static DATE_TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = DATE_TOKEN.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid regex"));

    re.find(line)
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
        .is_some_and(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
}

/// Build the notification for a batch of changes.
///
/// `lines` are the rendered changes in diff order. Only the first
/// [`MAX_CHANGE_LINES`] are included, followed by a count of the rest.
pub fn format_change_message(target: &str, lines: &[String]) -> String {
    let shown = &lines[..lines.len().min(MAX_CHANGE_LINES)];
    let weekend = lines.iter().filter(|l| is_weekend_change(l)).count();

    let mut message = String::from("**🔄 Status Changed!**");
    if weekend > 0 {
        message.push_str(&format!(" ({} weekend)", weekend));
    }
    message.push('\n');
    message.push_str(&shorten_target(target));
    message.push_str("\n\n");

    let body: Vec<String> = shown
        .iter()
        .map(|line| {
            if is_weekend_change(line) {
                format!("**{}** 🎉", line)
            } else {
                line.clone()
            }
        })
        .collect();
    message.push_str(&body.join("\n"));

    if lines.len() > MAX_CHANGE_LINES {
        message.push_str(&format!("\n...and {} more.", lines.len() - MAX_CHANGE_LINES));
    }

    message
}

/// Build the notification sent when a watch records its first snapshot.
pub fn format_started_message(target: &str, snapshot: &Snapshot) -> String {
    format!(
        "**Started monitoring** {}\nFound {} dates.",
        shorten_target(target),
        snapshot.len()
    )
}

fn shorten_target(target: &str) -> String {
    if target.chars().count() <= MAX_TARGET_CHARS {
        return target.to_string();
    }
    let mut short: String = target.chars().take(MAX_TARGET_CHARS - 1).collect();
    short.push('…');
    short
}
