// Session log files for the framesync tools. Library code logs through the
// macros at the bottom, which always emit a tracing event and additionally
// land in the session file once `init_logger` has been called.
use anyhow::Result;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG: ",
            Level::Info => "",
            Level::Warn => "WARN: ",
            Level::Error => "ERROR: ",
        }
    }
}

pub struct SessionLogger {
    log_buffer: Mutex<Vec<String>>,
    log_path: PathBuf,
    log_dir: PathBuf,
    retention_count: usize,
    app_name: String,
    stream_to_file: bool,
    verbose: bool,
}

impl SessionLogger {
    pub fn new(
        log_dir: PathBuf,
        app_name: &str,
        retention_count: usize,
        stream_to_file: bool,
        verbose: bool,
    ) -> Result<Self> {
        fs::create_dir_all(&log_dir)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("{}_{}.log", app_name, timestamp));

        let logger = Self {
            log_buffer: Mutex::new(Vec::new()),
            log_path,
            log_dir,
            retention_count,
            app_name: app_name.to_string(),
            stream_to_file,
            verbose,
        };

        logger.clean_old_logs()?;
        logger.write(Level::Info, &format!("=== {} session started ===", app_name));

        Ok(logger)
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn write(&self, level: Level, message: &str) {
        // Debug lines only reach the file in verbose sessions
        if level == Level::Debug && !self.verbose {
            return;
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{}] {}{}", timestamp, level.tag(), message);

        if self.stream_to_file {
            let _ = self.append_lines(std::slice::from_ref(&line));
        } else {
            self.log_buffer.lock().push(line);
        }
    }

    fn append_lines(&self, lines: &[String]) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        Ok(())
    }

    fn clean_old_logs(&self) -> Result<()> {
        let prefix = format!("{}_", self.app_name);
        let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.log_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_ours = path.extension().and_then(|s| s.to_str()) == Some("log")
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&prefix));
                if !is_ours {
                    continue;
                }
                if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                    log_files.push((path, modified));
                }
            }
        }

        // Newest first; the session about to start counts as one of the kept files
        log_files.sort_by(|a, b| b.1.cmp(&a.1));
        let keep = self.retention_count.saturating_sub(1);
        for (path, _) in log_files.iter().skip(keep) {
            let _ = fs::remove_file(path);
        }

        Ok(())
    }

    pub fn flush_to_disk(&self) -> Result<()> {
        let mut buffer = self.log_buffer.lock();
        if buffer.is_empty() {
            return Ok(());
        }
        self.append_lines(&buffer)?;
        buffer.clear();
        Ok(())
    }

    pub fn finalize(&self) -> Result<()> {
        self.write(Level::Info, &format!("=== {} session ended ===", self.app_name));
        self.flush_to_disk()
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        let _ = self.flush_to_disk();
    }
}

static LOGGER: once_cell::sync::OnceCell<SessionLogger> = once_cell::sync::OnceCell::new();

pub fn init_logger(
    log_dir: PathBuf,
    app_name: &str,
    retention_count: usize,
    stream_to_file: bool,
    verbose: bool,
) -> Result<()> {
    let logger = SessionLogger::new(log_dir, app_name, retention_count, stream_to_file, verbose)?;
    LOGGER
        .set(logger)
        .map_err(|_| anyhow::anyhow!("Logger already initialized"))?;
    Ok(())
}

/// Forwards a formatted line to the session file, if one is installed.
pub fn session_write(level: Level, message: &str) {
    if let Some(logger) = LOGGER.get() {
        logger.write(level, message);
    }
}

pub fn finalize_logs() -> Result<()> {
    if let Some(logger) = LOGGER.get() {
        logger.finalize()?;
    }
    Ok(())
}

pub fn get_log_path() -> Option<PathBuf> {
    LOGGER.get().map(|logger| logger.log_path.clone())
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        ::tracing::debug!("{}", message);
        $crate::logger::session_write($crate::logger::Level::Debug, &message);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        ::tracing::info!("{}", message);
        $crate::logger::session_write($crate::logger::Level::Info, &message);
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        ::tracing::warn!("{}", message);
        $crate::logger::session_write($crate::logger::Level::Warn, &message);
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        ::tracing::error!("{}", message);
        $crate::logger::session_write($crate::logger::Level::Error, &message);
    }};
}
