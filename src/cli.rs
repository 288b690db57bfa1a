use std::{ffi::OsString, fmt::Display, path::PathBuf};

use clap::{ArgAction, CommandFactory, FromArgMatches, Parser, ValueEnum};

use crate::{logging::LogConfig, service::descriptor};

/// Run Caddy as an operating system service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Caddy's service name
    #[arg(long, default_value = "caddy")]
    pub name: String,

    /// Install, uninstall, start, stop, restart or query the service
    #[arg(long, value_enum)]
    pub service: Option<Action>,

    #[command(flatten)]
    pub server: ServerOptions,

    /// Non-default flags, reconstructed for the service launch command.
    #[arg(skip)]
    pub arguments: Vec<String>,
}

/// Flags of the managed HTTP server.
#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct ServerOptions {
    /// Config file to load (or 'stdin')
    #[arg(long)]
    pub conf: Option<String>,

    /// Type of server to run
    #[arg(long = "type", default_value = "http")]
    pub server_type: String,

    /// Default host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Default port
    #[arg(long, default_value_t = 2015)]
    pub port: u16,

    /// Root path of default site
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Process log file
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Path to write pid file
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Quiet mode (warnings and errors only)
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = false, default_missing_value = "true")]
    pub quiet: bool,

    /// Maximum seconds to wait for a graceful shutdown
    #[arg(long, default_value_t = 5)]
    pub grace: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
    Start,
    Stop,
    Restart,
    Status,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{:?}", self),
        }
    }
}

impl Cli {
    pub fn init() -> Self {
        match Self::try_parse_from_args(std::env::args_os()) {
            Ok(cli) => cli,
            Err(e) => e.exit(),
        }
    }

    pub fn try_parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut command = Self::command();
        let matches = command.try_get_matches_from_mut(normalize_args(args))?;

        let mut cli = Self::from_arg_matches(&matches)?;
        cli.arguments = descriptor::collect_arguments(&command, &matches);

        Ok(cli)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::from_flags(self.server.log.as_deref(), self.server.quiet)
    }
}

/// Rewrite single-dash long flags (`-port=9000`) to the `--port=9000` form.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut normalized: Vec<OsString> = args.next().into_iter().collect();
    let mut flags_done = false;

    for arg in args {
        if flags_done {
            normalized.push(arg);
            continue;
        }

        let rewritten = match arg.to_str() {
            Some("--") => {
                flags_done = true;
                None
            }
            Some(s) if is_single_dash_long(s) => Some(OsString::from(format!("-{}", s))),
            _ => None,
        };
        normalized.push(rewritten.unwrap_or(arg));
    }

    normalized
}

fn is_single_dash_long(arg: &str) -> bool {
    let Some(flag) = arg.strip_prefix('-') else {
        return false;
    };
    if flag.starts_with('-') {
        return false;
    }
    let name = flag.split('=').next().unwrap_or_default();

    name.len() > 1 && name.starts_with(|c: char| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_defaults() {
        let cli = Cli::try_parse_from_args(["caddy-service"]).unwrap();
        assert_eq!(cli.name, "caddy");
        assert_eq!(cli.service, None);
        assert_eq!(cli.server.server_type, "http");
        assert_eq!(cli.server.port, 2015);
        assert!(!cli.server.quiet);
        assert!(cli.arguments.is_empty());
    }

    #[test]
    fn it_parses_single_dash_flags() {
        let cli = Cli::try_parse_from_args(["caddy-service", "-name=myapp", "-service=install", "-port=9000"]).unwrap();
        assert_eq!(cli.name, "myapp");
        assert_eq!(cli.service, Some(Action::Install));
        assert_eq!(cli.server.port, 9000);
    }

    #[test]
    fn it_parses_separate_values() {
        let cli = Cli::try_parse_from_args(["caddy-service", "-service", "status", "--root", "/srv/www"]).unwrap();
        assert_eq!(cli.service, Some(Action::Status));
        assert_eq!(cli.server.root, PathBuf::from("/srv/www"));
    }

    #[test]
    fn it_parses_bool_flags_with_and_without_value() {
        let cli = Cli::try_parse_from_args(["caddy-service", "-quiet"]).unwrap();
        assert!(cli.server.quiet);
        let cli = Cli::try_parse_from_args(["caddy-service", "-quiet=false"]).unwrap();
        assert!(!cli.server.quiet);
    }

    #[test]
    fn it_rejects_unknown_actions() {
        assert!(Cli::try_parse_from_args(["caddy-service", "-service=explode"]).is_err());
    }

    #[test]
    fn it_normalizes_only_long_flags() {
        let args = normalize_args(["bin", "-port=1", "-h", "--host", "x", "-", "-9", "--", "-root"]);
        assert_eq!(args, vec!["bin", "--port=1", "-h", "--host", "x", "-", "-9", "--", "-root"]);
    }

    #[test]
    fn it_displays_actions_like_the_flag() {
        assert_eq!(Action::Uninstall.to_string(), "uninstall");
        assert_eq!(Action::Status.to_string(), "status");
    }
}
