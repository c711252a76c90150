//! Recent gateway logs from whichever source has them.
//!
//! Lookup order: the systemd journal (unix only), the log files, then the
//! output the supervisor captured from the process it launched.

use std::path::PathBuf;

use tracing::debug;

use deck_types::gateway::LogExcerpt;

pub const DEFAULT_JOURNAL_UNIT: &str = "openclaw-gateway";
pub const NO_LOGS: &str = "(no logs yet)";

#[cfg(unix)]
const JOURNAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LogSources {
    /// systemd unit to query; `None` skips the journal.
    pub journal_unit: Option<String>,
    pub files: Vec<PathBuf>,
}

impl LogSources {
    pub fn new(journal_unit: Option<String>, files: Vec<PathBuf>) -> Self {
        Self {
            journal_unit,
            files,
        }
    }

    /// The last `lines` lines from the first source that has any.
    pub async fn recent(&self, lines: usize, captured: Vec<String>) -> LogExcerpt {
        if let Some(unit) = &self.journal_unit {
            if let Some(content) = read_journal(unit, lines).await {
                return LogExcerpt {
                    source: "journal".to_string(),
                    content,
                };
            }
        }

        for path in &self.files {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    return LogExcerpt {
                        source: format!("file:{}", path.display()),
                        content: tail_lines(&text, lines),
                    };
                }
                Err(e) => debug!(path = %path.display(), "Log file unavailable: {e}"),
            }
        }

        if !captured.is_empty() {
            return LogExcerpt {
                source: "captured".to_string(),
                content: captured.join("\n"),
            };
        }

        LogExcerpt {
            source: "none".to_string(),
            content: NO_LOGS.to_string(),
        }
    }
}

#[cfg(unix)]
async fn read_journal(unit: &str, lines: usize) -> Option<String> {
    let count = lines.to_string();
    let out = crate::cmd::run_with_timeout(
        "journalctl",
        &["-u", unit, "--no-pager", "-n", &count],
        JOURNAL_TIMEOUT,
    )
    .await
    .map_err(|e| debug!("journalctl unavailable: {e}"))
    .ok()?;

    let text = out.stdout.trim_end();
    if out.success && !text.is_empty() && !text.contains("No entries") {
        Some(text.to_string())
    } else {
        None
    }
}

#[cfg(not(unix))]
async fn read_journal(_unit: &str, _lines: usize) -> Option<String> {
    None
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end_matches('\n').lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 5), "");
    }

    #[tokio::test]
    async fn first_existing_file_wins() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("logs").join("gateway.log");
        let present = dir.path().join("gateway.log");
        std::fs::write(&present, "one\ntwo\nthree\n").unwrap();

        let sources = LogSources::new(None, vec![missing, present.clone()]);
        let excerpt = sources.recent(2, vec!["captured".into()]).await;
        assert_eq!(excerpt.source, format!("file:{}", present.display()));
        assert_eq!(excerpt.content, "two\nthree");
    }

    #[tokio::test]
    async fn invalid_utf8_in_log_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gateway.log");
        std::fs::write(&path, b"line one\nbad \xff byte\nline three\n").unwrap();

        let sources = LogSources::new(None, vec![path.clone()]);
        let excerpt = sources.recent(10, Vec::new()).await;
        assert_eq!(excerpt.source, format!("file:{}", path.display()));
        assert_eq!(excerpt.content, "line one\nbad \u{fffd} byte\nline three");
    }

    #[tokio::test]
    async fn falls_back_to_captured_then_placeholder() {
        let sources = LogSources::new(None, vec![PathBuf::from("/nonexistent/gateway.log")]);

        let excerpt = sources.recent(10, vec!["a".into(), "b".into()]).await;
        assert_eq!(excerpt.source, "captured");
        assert_eq!(excerpt.content, "a\nb");

        let excerpt = sources.recent(10, Vec::new()).await;
        assert_eq!(excerpt.source, "none");
        assert_eq!(excerpt.content, NO_LOGS);
    }
}
