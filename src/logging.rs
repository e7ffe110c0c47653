//! Logging setup and the log query service behind the HTTP log endpoints.
//!
//! Output goes to stderr and to a daily-rolling file under the data
//! directory. The query service reads those files back for the API:
//! paginated listing, level filtering, incremental reads and clearing.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "aurwatch.log";

/// Install the global subscriber. The returned guard must stay alive for
/// the process lifetime or buffered file output is lost.
pub fn init(log_level: &str, log_dir: &PathBuf) -> anyhow::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("aurwatch={log_level},info")));

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok(guard)
}

/// One parsed log line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub message: String,
}

/// A page of log entries plus the total number matching the filter.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub entries: Vec<LogEntry>,
}

/// Reads the rolling log files back for the HTTP API.
pub struct LogQuery {
    dir: PathBuf,
}

impl LogQuery {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// All entries at or above nothing in particular — the filter is a
    /// plain level-name match, not a severity threshold, mirroring the
    /// query parameter the API accepts.
    fn read_all(&self, level: Option<&str>) -> Vec<LogEntry> {
        let mut files: Vec<PathBuf> = match fs::read_dir(&self.dir) {
            Ok(dir) => dir
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
                })
                .collect(),
            Err(_) => return Vec::new(),
        };
        // Daily files sort chronologically by name.
        files.sort();

        let wanted = level.map(str::to_ascii_uppercase);
        let mut entries = Vec::new();
        for file in files {
            let Ok(content) = fs::read_to_string(&file) else {
                continue;
            };
            for line in content.lines() {
                if let Some(entry) = parse_line(line) {
                    if wanted.as_deref().is_none_or(|w| entry.level == w) {
                        entries.push(entry);
                    }
                }
            }
        }
        entries
    }

    /// Paginated query, newest entries first.
    pub fn query(&self, level: Option<&str>, page: usize, page_size: usize) -> LogPage {
        let mut entries = self.read_all(level);
        entries.reverse();

        let total = entries.len();
        let page = page.max(1);
        let page_size = page_size.clamp(1, 1000);
        let start = (page - 1) * page_size;
        let entries = entries.into_iter().skip(start).take(page_size).collect();

        LogPage {
            total,
            page,
            page_size,
            entries,
        }
    }

    /// Entries strictly newer than `since_time` (RFC 3339 comparison works
    /// lexicographically on the timestamp prefix).
    pub fn latest(&self, since_time: Option<&str>, level: Option<&str>) -> Vec<LogEntry> {
        self.read_all(level)
            .into_iter()
            .filter(|entry| since_time.is_none_or(|since| entry.time.as_str() > since))
            .collect()
    }

    /// Delete every log file.
    pub fn clear(&self) -> std::io::Result<()> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in dir.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
            if is_log {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Parse a fmt-layer line: `<timestamp> <LEVEL> <target>: <message>`.
fn parse_line(line: &str) -> Option<LogEntry> {
    let mut parts = line.split_whitespace();
    let time = parts.next()?;
    let level = parts.next()?;
    if !matches!(level, "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR") {
        return None;
    }
    let message = line
        .split_once(level)
        .map(|(_, rest)| rest.trim().to_string())?;
    Some(LogEntry {
        time: time.to_string(),
        level: level.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_log(dir: &std::path::Path, name: &str, lines: &[&str]) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn sample_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_log(
            dir.path(),
            "aurwatch.log.2026-08-01",
            &[
                "2026-08-01T10:00:00.000000Z  INFO aurwatch::scheduler: scheduler started",
                "2026-08-01T10:00:01.000000Z ERROR aurwatch::checker: check failed",
            ],
        );
        write_log(
            dir.path(),
            "aurwatch.log.2026-08-02",
            &["2026-08-02T09:00:00.000000Z  INFO aurwatch::server: listening"],
        );
        dir
    }

    #[test]
    fn query_paginates_newest_first() {
        let dir = sample_dir();
        let query = LogQuery::new(dir.path().to_path_buf());

        let page = query.query(None, 1, 2);
        assert_eq!(page.total, 3);
        assert_eq!(page.entries.len(), 2);
        assert!(page.entries[0].message.contains("listening"));

        let page2 = query.query(None, 2, 2);
        assert_eq!(page2.entries.len(), 1);
    }

    #[test]
    fn level_filter_matches_exactly() {
        let dir = sample_dir();
        let query = LogQuery::new(dir.path().to_path_buf());

        let errors = query.query(Some("error"), 1, 10);
        assert_eq!(errors.total, 1);
        assert_eq!(errors.entries[0].level, "ERROR");
    }

    #[test]
    fn latest_returns_only_entries_after_the_cursor() {
        let dir = sample_dir();
        let query = LogQuery::new(dir.path().to_path_buf());

        let recent = query.latest(Some("2026-08-01T23:59:59Z"), None);
        assert_eq!(recent.len(), 1);
        assert!(recent[0].message.contains("listening"));

        let all = query.latest(None, None);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn clear_removes_log_files_only() {
        let dir = sample_dir();
        fs::write(dir.path().join("keep.txt"), "unrelated").unwrap();
        let query = LogQuery::new(dir.path().to_path_buf());

        query.clear().unwrap();
        assert_eq!(query.query(None, 1, 10).total, 0);
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_log(
            dir.path(),
            "aurwatch.log.2026-08-02",
            &["not a log line", "2026-08-02T09:00:00Z  WARN target: slow"],
        );
        let query = LogQuery::new(dir.path().to_path_buf());
        let page = query.query(None, 1, 10);
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].level, "WARN");
    }
}
