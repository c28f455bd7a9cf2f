//! Copying a project's log to the system clipboard.

use anyhow::{Context, Result};
use chrono::Local;

use crate::output::{sanitize_text, LogEntry};

/// Renders entries as plain text, one `HH:MM:SS text` line each.
pub fn render_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> String {
    entries
        .into_iter()
        .map(|entry| {
            format!(
                "{} {}",
                entry.at.with_timezone(&Local).format("%H:%M:%S"),
                sanitize_text(&entry.text, true)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Copies the entries to the clipboard. Returns how many lines were copied.
pub fn copy_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Result<usize> {
    let text = render_entries(entries);
    if text.is_empty() {
        return Ok(0);
    }
    let count = text.lines().count();
    let mut clipboard = arboard::Clipboard::new().context("failed to access clipboard")?;
    clipboard
        .set_text(text)
        .context("failed to set clipboard text")?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Severity;

    fn entry(id: u64, text: &str) -> LogEntry {
        LogEntry {
            id,
            at: chrono::Utc::now(),
            text: text.to_string(),
            severity: Severity::Info,
        }
    }

    #[test]
    fn renders_one_line_per_entry() {
        let entries = vec![entry(1, "first"), entry(2, "\u{1b}[32msecond\u{1b}[0m")];
        let text = render_entries(&entries);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second"));
        assert_eq!(lines[0].len(), "00:00:00 first".len());
    }

    #[test]
    fn empty_log_copies_nothing() {
        assert_eq!(copy_entries(&Vec::<LogEntry>::new()).unwrap(), 0);
    }
}
