use std::path::{Path, PathBuf};

use log::LevelFilter;
use log4rs::{
    append::{
        console::ConsoleAppender,
        rolling_file::{
            policy::compound::{roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy},
            RollingFileAppender,
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config, Handle,
};
use thiserror::Error;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:5})} {t} - {m}{n}";
const LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;
const LOG_FILE_COUNT: u32 = 5;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Log appender {}: {reason}", .path.display())]
    Appender { path: PathBuf, reason: String },
    #[error(transparent)]
    Config(#[from] log4rs::config::runtime::ConfigErrors),
    #[error(transparent)]
    Init(#[from] log::SetLoggerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: LevelFilter::Info, file: None }
    }
}

impl LogConfig {
    /// `stdout` and `stderr` mean console only.
    pub fn from_flags(log: Option<&Path>, quiet: bool) -> Self {
        let file = log
            .filter(|p| !matches!(p.to_str(), Some("") | Some("stdout") | Some("stderr")))
            .map(Path::to_path_buf);
        let level = if quiet { LevelFilter::Warn } else { LevelFilter::Info };

        Self { level, file }
    }

    pub fn setup(&self, name: &str) -> Result<Handle, LogError> {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();

        let mut config = Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
        let mut root = Root::builder().appender("stdout");

        if let Some(path) = &self.file {
            let appender_error = |reason: String| LogError::Appender { path: path.clone(), reason };

            let roller = FixedWindowRoller::builder()
                .build(&format!("{}.{{}}", path.display()), LOG_FILE_COUNT)
                .map_err(|e| appender_error(e.to_string()))?;
            let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(LOG_FILE_SIZE)), Box::new(roller));
            let logfile = RollingFileAppender::builder()
                .encoder(Box::new(PatternEncoder::new(&format!("{} {}", name, PATTERN))))
                .build(path, Box::new(policy))
                .map_err(|e| appender_error(e.to_string()))?;

            config = config.appender(Appender::builder().build("logfile", Box::new(logfile)));
            root = root.appender("logfile");
        }

        let config = config.build(root.build(self.level))?;

        Ok(log4rs::init_config(config)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_logs_to_console_by_default() {
        assert_eq!(LogConfig::from_flags(None, false), LogConfig::default());
        assert_eq!(LogConfig::from_flags(Some(Path::new("stdout")), false).file, None);
        assert_eq!(LogConfig::from_flags(Some(Path::new("stderr")), false).file, None);
    }

    #[test]
    fn it_logs_to_a_file() {
        let cfg = LogConfig::from_flags(Some(Path::new("/var/log/caddy.log")), false);
        assert_eq!(cfg.file, Some(PathBuf::from("/var/log/caddy.log")));
    }

    #[test]
    fn it_quiets_to_warnings() {
        assert_eq!(LogConfig::from_flags(None, true).level, LevelFilter::Warn);
    }
}
