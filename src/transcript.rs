use chrono::{DateTime, Local};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::warn;

/// Prefix stamped on every transcript line, e.g. `03/04/2023 | 14:05:09 -> `.
pub const DATE_TIME_FORMAT: &str = "%m/%d/%Y | %H:%M:%S -> ";
/// Date key used in log and data file names.
pub const FILE_DATE_FORMAT: &str = "%m-%d-%y";
pub const SESSION_END: &str = "-------------------";

pub fn stamp(now: DateTime<Local>) -> String {
    now.format(DATE_TIME_FORMAT).to_string()
}

/// `system{MM-dd-yy}.txt` inside `dir`.
pub fn log_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("system{}.txt", now.format(FILE_DATE_FORMAT)))
}

/// On-screen scrollback mirrored to a daily append-only log file.
#[derive(Debug)]
pub struct Transcript {
    lines: Vec<String>,
    log_dir: PathBuf,
}

impl Transcript {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            lines: Vec::new(),
            log_dir: log_dir.into(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Append `text` behind the current timestamp.
    pub fn record(&mut self, text: &str) {
        let now = Local::now();
        self.push(format!("{}{text}", stamp(now)), now);
    }

    /// Append `text` verbatim, for session markers that carry their own time.
    pub fn mark(&mut self, text: &str) {
        self.push(text.to_string(), Local::now());
    }

    pub fn start_session(&mut self) {
        let now = Local::now();
        self.push(format!("NEW SESSION: {}", now.format("%H:%M:%S")), now);
    }

    pub fn end_session(&mut self) {
        self.mark(SESSION_END);
    }

    fn push(&mut self, line: String, now: DateTime<Local>) {
        if let Err(e) = self.append_to_file(&line, now) {
            warn!("could not write session log in {}: {e}", self.log_dir.display());
        }
        self.lines.push(line);
    }

    fn append_to_file(&self, line: &str, now: DateTime<Local>) -> io::Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path(&self.log_dir, now))?;
        writeln!(file, "{line}")
    }
}
