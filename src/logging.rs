//! Facilities for configuring logging and creating loggers, all using slog.
//! None of these are required to use this crate, but they're provided because
//! they're commonly wanted by consumers.

use camino::Utf8PathBuf;
use serde::Deserialize;
use serde::Serialize;
use slog::Drain;
use slog::Level;
use slog::Logger;
use std::fs::OpenOptions;
use std::io;
use std::io::LineWriter;
use std::path::Path;

/// Logging configuration for a server.  This is expected to be a top-level
/// block in a TOML config file, although that's not required.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ConfigLogging {
    /// Pretty-printed output to stderr, assumed to support terminal escapes.
    StderrTerminal { level: ConfigLoggingLevel },
    /// Bunyan-formatted output to a specified file.
    File {
        level: ConfigLoggingLevel,
        path: Utf8PathBuf,
        if_exists: ConfigLoggingIfExists,
    },
}

/// Log messages have a level that's used for filtering in the usual way.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl From<&ConfigLoggingLevel> for Level {
    fn from(config_level: &ConfigLoggingLevel) -> Level {
        match config_level {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

/// Specifies the behavior when logging to a file that already exists.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingIfExists {
    /// Fail to create the log
    Fail,
    /// Truncate the existing file
    Truncate,
    /// Append to the existing file
    Append,
}

impl ConfigLogging {
    /// Create a root logger based on the requested configuration.
    pub fn to_logger<S: AsRef<str>>(
        &self,
        log_name: S,
    ) -> Result<Logger, io::Error> {
        match self {
            ConfigLogging::StderrTerminal { level } => {
                let decorator = slog_term::TermDecorator::new().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                Ok(async_root_logger(level, drain))
            }

            ConfigLogging::File { level, path, if_exists } => {
                let mut open_options = OpenOptions::new();
                open_options.write(true);
                open_options.create(true);

                match if_exists {
                    ConfigLoggingIfExists::Fail => {
                        open_options.create_new(true);
                    }
                    ConfigLoggingIfExists::Append => {
                        open_options.append(true);
                    }
                    ConfigLoggingIfExists::Truncate => {
                        open_options.truncate(true);
                    }
                }

                let drain = log_drain_for_file(
                    &open_options,
                    Path::new(path),
                    log_name.as_ref().to_string(),
                )?;
                Ok(async_root_logger(level, drain))
            }
        }
    }
}

// We use an async drain to take care of synchronization.  The other
// documented options use a std::sync::Mutex, which is not futures-aware and
// would foul up our executor.
fn async_root_logger<T>(level: &ConfigLoggingLevel, drain: T) -> slog::Logger
where
    T: slog::Drain + Send + 'static,
    <T as slog::Drain>::Err: std::fmt::Debug,
{
    let level_drain = slog::LevelFilter(drain, Level::from(level)).fuse();
    let async_drain =
        slog_async::Async::new(level_drain).chan_size(1024).build().fuse();
    slog::Logger::root(async_drain, o!())
}

fn log_drain_for_file(
    open_options: &OpenOptions,
    path: &Path,
    log_name: String,
) -> Result<slog::Fuse<slog_json::Json<LineWriter<std::fs::File>>>, io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Buffer writes to the file around newlines to minimize syscalls.
    let file = LineWriter::new(open_options.open(path)?);

    // The bunyan interface requires a `&'static str` for the logger's name,
    // but the name here is dynamic (it generally includes the server name).
    // Leaking the string is the accepted workaround; loggers are created a
    // handful of times per process.
    // TODO-cleanup fix the slog-bunyan interface to accept owned names.
    let log_name_box = Box::new(log_name);
    let log_name_leaked = Box::leak(log_name_box);
    Ok(slog_bunyan::with_name(log_name_leaked, file).build().fuse())
}

#[cfg(test)]
mod test {
    use super::ConfigLogging;
    use super::ConfigLoggingIfExists;
    use super::ConfigLoggingLevel;

    #[test]
    fn test_config_from_toml() {
        let config: ConfigLogging = toml::from_str(
            r#"
            mode = "stderr-terminal"
            level = "info"
            "#,
        )
        .unwrap();
        assert_eq!(
            config,
            ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Info }
        );
    }

    #[test]
    fn test_file_logger_writes_bunyan_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        let config = ConfigLogging::File {
            level: ConfigLoggingLevel::Debug,
            path: camino::Utf8PathBuf::from_path_buf(path.clone()).unwrap(),
            if_exists: ConfigLoggingIfExists::Truncate,
        };

        {
            let log = config.to_logger("test-logger").unwrap();
            info!(log, "hello from the test");
            // Dropping the logger flushes the async drain.
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let record: serde_json::Value =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(record["msg"], "hello from the test");
        assert_eq!(record["name"], "test-logger");
    }

    #[test]
    fn test_file_logger_fails_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.log");
        std::fs::write(&path, "already here").unwrap();
        let config = ConfigLogging::File {
            level: ConfigLoggingLevel::Info,
            path: camino::Utf8PathBuf::from_path_buf(path).unwrap(),
            if_exists: ConfigLoggingIfExists::Fail,
        };
        assert!(config.to_logger("test-logger").is_err());
    }
}
